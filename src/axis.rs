use crate::error::{Advisory, PlateCqError, Result};
use std::collections::HashSet;

/// An ordered label set for one plate axis (rows or columns).
///
/// Label order is semantically meaningful: it is the canonical order for
/// sorting, display, and "first N wells" slicing, and it is NOT
/// lexicographic (column "10" comes after "2" on a numeric axis). Every
/// join against an axis re-types foreign labels into this order explicitly
/// instead of relying on implicit coercion.
#[derive(Clone, Debug, PartialEq)]
pub struct Axis {
    name: String,
    labels: Vec<String>,
}

impl Axis {
    pub fn new<S: AsRef<str>>(name: &str, labels: &[S]) -> Result<Self> {
        if labels.is_empty() {
            return Err(PlateCqError::InvalidGeometry(format!(
                "{name} axis has no labels"
            )));
        }
        let mut seen = HashSet::new();
        for label in labels {
            if !seen.insert(label.as_ref()) {
                return Err(PlateCqError::InvalidGeometry(format!(
                    "{name} axis label '{}' is duplicated",
                    label.as_ref()
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
        })
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline(always)]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Re-types a foreign label vector against this axis: every label is
    /// resolved to its canonical axis position. A label outside the axis is
    /// a hard error rather than a silently dropped row. When the supplied
    /// order disagrees with the canonical order an advisory is returned so
    /// the caller knows an implicit re-ordering took place.
    pub fn retype<S: AsRef<str>>(&self, labels: &[S]) -> Result<(Vec<usize>, Option<Advisory>)> {
        let mut positions = Vec::with_capacity(labels.len());
        for label in labels {
            let label = label.as_ref();
            let pos = self.index_of(label).ok_or_else(|| {
                PlateCqError::JoinKey(format!(
                    "label '{label}' is not a level of the {} axis",
                    self.name
                ))
            })?;
            positions.push(pos);
        }
        let advisory = if positions.windows(2).any(|w| w[0] >= w[1]) {
            Some(Advisory::AxisRetyped {
                axis: self.name.clone(),
                detail: "supplied label order differs from the grid's canonical order".to_string(),
            })
        } else {
            None
        };
        Ok((positions, advisory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_and_duplicate() {
        let empty: &[&str] = &[];
        assert!(matches!(
            Axis::new("row", empty),
            Err(PlateCqError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Axis::new("row", &["A", "B", "A"]),
            Err(PlateCqError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_numeric_like_labels_keep_input_order() {
        let axis = Axis::new("col", &["1", "2", "10"]).unwrap();
        assert_eq!(axis.index_of("10"), Some(2));
        assert_eq!(axis.index_of("2"), Some(1));
    }

    #[test]
    fn test_retype_flags_reordered_labels() {
        let axis = Axis::new("col", &["1", "2", "10"]).unwrap();
        // Lexicographic order of these labels is "1", "10", "2".
        let (positions, advisory) = axis.retype(&["1", "10", "2"]).unwrap();
        assert_eq!(positions, vec![0, 2, 1]);
        assert!(advisory.is_some());

        let (_, advisory) = axis.retype(&["1", "2", "10"]).unwrap();
        assert!(advisory.is_none());
    }

    #[test]
    fn test_retype_fails_hard_on_foreign_label() {
        let axis = Axis::new("row", &["A", "B"]).unwrap();
        assert!(matches!(
            axis.retype(&["A", "C"]),
            Err(PlateCqError::JoinKey(_))
        ));
    }
}
