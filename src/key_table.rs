use crate::error::{PlateCqError, Result};
use crate::table::Cell;
use std::collections::HashSet;

/// Per-row or per-column metadata: exactly one entry per axis label, each
/// carrying an arbitrary set of named attributes (target_id, sample_id,
/// dilution, replicate tags, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct KeyTable {
    axis_name: String,
    labels: Vec<String>,
    attributes: Vec<(String, Vec<Cell>)>,
}

impl KeyTable {
    pub fn new<S: AsRef<str>>(axis_name: &str, labels: &[S]) -> Result<Self> {
        if labels.is_empty() {
            return Err(PlateCqError::InvalidGeometry(format!(
                "{axis_name} key has no axis labels"
            )));
        }
        let mut seen = HashSet::new();
        for label in labels {
            if !seen.insert(label.as_ref()) {
                return Err(PlateCqError::InvalidGeometry(format!(
                    "{axis_name} key label '{}' is duplicated",
                    label.as_ref()
                )));
            }
        }
        Ok(Self {
            axis_name: axis_name.to_string(),
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
            attributes: vec![],
        })
    }

    /// Attaches an attribute whose values are tiled across the axis: a
    /// vector of length L covering an axis of length L*k is repeated as a
    /// whole k times (pattern replay, not element-wise recycling), so axis
    /// position i receives `values[i % L]`.
    pub fn add_replicated_attribute(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        if self.attributes.iter().any(|(n, _)| n == name) {
            return Err(PlateCqError::String(format!(
                "attribute '{name}' already exists on the {} key",
                self.axis_name
            )));
        }
        let axis_len = self.labels.len();
        if values.is_empty() || axis_len % values.len() != 0 {
            return Err(PlateCqError::LengthMismatch {
                attribute: name.to_string(),
                attribute_len: values.len(),
                axis_len,
            });
        }
        let tiled: Vec<Cell> = (0..axis_len).map(|i| values[i % values.len()].clone()).collect();
        self.attributes.push((name.to_string(), tiled));
        Ok(())
    }

    #[inline(always)]
    pub fn axis_name(&self) -> &str {
        &self.axis_name
    }

    #[inline(always)]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline(always)]
    pub fn attributes(&self) -> &[(String, Vec<Cell>)] {
        &self.attributes
    }
}

/// One-call constructor covering the common case: labels plus a set of
/// attribute vectors, each tiled to the axis length.
pub fn build_replicated_key<S: AsRef<str>>(
    axis_name: &str,
    labels: &[S],
    attributes: Vec<(&str, Vec<Cell>)>,
) -> Result<KeyTable> {
    let mut key = KeyTable::new(axis_name, labels)?;
    for (name, values) in attributes {
        key.add_replicated_attribute(name, values)?;
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::COL_SAMPLE_ID;

    #[test]
    fn test_tiling_replays_full_pattern() {
        // Axis of length 16, pattern of length 4: positions 0..3, 4..7, ...
        // each replay the full pattern.
        let labels: Vec<String> = (1..=16).map(|i| i.to_string()).collect();
        let pattern = vec![
            Cell::text("s1"),
            Cell::text("s2"),
            Cell::text("s3"),
            Cell::text("s4"),
        ];
        let key =
            build_replicated_key("col", &labels, vec![(COL_SAMPLE_ID, pattern.clone())]).unwrap();
        let (_, tiled) = &key.attributes()[0];
        for (i, cell) in tiled.iter().enumerate() {
            assert_eq!(cell, &pattern[i % 4], "axis position {i}");
        }
    }

    #[test]
    fn test_exact_length_vector_is_kept_as_is() {
        let values = vec![Cell::num(1.0), Cell::num(0.1), Cell::num(0.01)];
        let key =
            build_replicated_key("col", &["1", "2", "3"], vec![("dilution", values.clone())])
                .unwrap();
        assert_eq!(key.attributes()[0].1, values);
    }

    #[test]
    fn test_non_dividing_length_rejected() {
        let result = build_replicated_key(
            "row",
            &["A", "B", "C", "D", "E"],
            vec![("target_id", vec![Cell::text("t1"), Cell::text("t2")])],
        );
        assert!(matches!(
            result,
            Err(PlateCqError::LengthMismatch {
                attribute_len: 2,
                axis_len: 5,
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(matches!(
            KeyTable::new("row", &["A", "A"]),
            Err(PlateCqError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let mut key = KeyTable::new("row", &["A", "B"]).unwrap();
        key.add_replicated_attribute("target_id", vec![Cell::text("t1")])
            .unwrap();
        assert!(key
            .add_replicated_attribute("target_id", vec![Cell::text("t2")])
            .is_err());
    }
}
