use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Errors that abort the operation that raised them. No partial table is
/// ever returned alongside one of these.
#[derive(Debug)]
pub enum PlateCqError {
    InvalidGeometry(String),
    LengthMismatch {
        attribute: String,
        attribute_len: usize,
        axis_len: usize,
    },
    JoinKey(String),
    MissingColumn(String),
    ShapeMismatch(String),
    String(String),
    Io(std::io::Error),
    Serde(serde_json::Error),
    Csv(csv::Error),
}

impl Error for PlateCqError {}

impl fmt::Display for PlateCqError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlateCqError::InvalidGeometry(msg) => write!(f, "invalid plate geometry: {msg}"),
            PlateCqError::LengthMismatch {
                attribute,
                attribute_len,
                axis_len,
            } => write!(
                f,
                "attribute '{attribute}' has length {attribute_len}, which does not divide the axis length {axis_len}"
            ),
            PlateCqError::JoinKey(msg) => write!(f, "join key error: {msg}"),
            PlateCqError::MissingColumn(name) => write!(f, "required column '{name}' is absent"),
            PlateCqError::ShapeMismatch(msg) => write!(f, "table shape mismatch: {msg}"),
            PlateCqError::String(msg) => write!(f, "{msg}"),
            PlateCqError::Io(e) => write!(f, "I/O error: {e}"),
            PlateCqError::Serde(e) => write!(f, "JSON error: {e}"),
            PlateCqError::Csv(e) => write!(f, "CSV error: {e}"),
        }
    }
}

impl From<String> for PlateCqError {
    fn from(err: String) -> Self {
        PlateCqError::String(err)
    }
}

impl From<std::io::Error> for PlateCqError {
    fn from(err: std::io::Error) -> Self {
        PlateCqError::Io(err)
    }
}

impl From<serde_json::Error> for PlateCqError {
    fn from(err: serde_json::Error) -> Self {
        PlateCqError::Serde(err)
    }
}

impl From<csv::Error> for PlateCqError {
    fn from(err: csv::Error) -> Self {
        PlateCqError::Csv(err)
    }
}

pub type Result<T> = std::result::Result<T, PlateCqError>;

/// Non-fatal diagnostic attached to the output of a layout or join step.
/// Advisories never abort the operation; callers inspect them after the
/// fact (missing semantic columns, implicit re-ordering, collisions).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Advisory {
    /// One of `sample_id` / `target_id` / `prep_type` is absent from the
    /// final column set. Downstream normalization will need it.
    MissingSemanticColumn(String),
    /// A key table's axis labels were supplied in an order that differs
    /// from the grid's canonical axis order and were re-typed against it.
    AxisRetyped { axis: String, detail: String },
    /// A merge overwrote an existing column (last write wins).
    ColumnCollision(String),
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Advisory::MissingSemanticColumn(name) => write!(
                f,
                "column '{name}' is not present; downstream normalization requires it"
            ),
            Advisory::AxisRetyped { axis, detail } => {
                write!(f, "{axis} axis labels re-typed to grid order: {detail}")
            }
            Advisory::ColumnCollision(name) => {
                write!(f, "column '{name}' already existed and was overwritten")
            }
        }
    }
}
