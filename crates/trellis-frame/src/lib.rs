#![forbid(unsafe_code)]

//! Labeled containers.
//!
//! [`Vector`] pairs a [`trellis_column::Column`] with an
//! [`trellis_index::Index`]; [`Table`] holds a set of equally long columns
//! sharing one row index. Binary operations between labeled containers
//! align on the sorted union of their key sets before touching storage,
//! so positions never line up by accident.
//!
//! Row indices are held behind `Arc` and shared across derived containers;
//! every transforming operation returns a new container.

use std::cmp::Ordering;

use thiserror::Error;
use trellis_column::ColumnError;
use trellis_index::{IndexError, Key};
use trellis_types::{TypeError, Value};

mod table;
mod vector;
mod view;

pub use table::{ColumnAssignment, DropMissing, RowSelection, Table};
pub use vector::{Selected, Vector};
pub use view::{ColumnView, ColumnViewMut};

// The container layer is where the lower error taxonomies meet.
pub use trellis_column::{BinOp, CmpOp, MissingPolicy};
pub use trellis_index::Index;
pub use trellis_types::{Kind, Reduction};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("column {name:?} not found")]
    ColumnNotFound { name: String },
    #[error("column {name:?} already exists")]
    DuplicateColumn { name: String },
    #[error("position {position} out of bounds for length {len}")]
    PositionOutOfBounds { position: i64, len: usize },
    #[error("{0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Column(#[from] ColumnError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Tie handling for [`Vector::rank`]. Ranks are 1-based floats; missing
/// cells keep a missing rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMethod {
    /// Mean of the positional ranks the tie would occupy (the default).
    Average,
    Min,
    Max,
    /// Order of appearance breaks the tie.
    First,
    /// Consecutive group numbers without gaps.
    Dense,
}

/// One sort criterion for [`Table::sort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

impl SortKey {
    #[must_use]
    pub fn ascending(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            ascending: true,
        }
    }

    #[must_use]
    pub fn descending(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Rows,
    Columns,
}

/// Gap handling for [`Table::reindex`]: holes left by labels absent from
/// the source can copy the nearest present neighbor along the new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMethod {
    None,
    Forward,
    Backward,
}

/// Resolve a possibly negative position against `len`. `-1` is the last
/// element.
pub(crate) fn normalize_position(position: i64, len: usize) -> Result<usize, FrameError> {
    let resolved = if position < 0 {
        let back = position.unsigned_abs() as usize;
        if back > len {
            return Err(FrameError::PositionOutOfBounds { position, len });
        }
        len - back
    } else {
        position as usize
    };
    if resolved >= len {
        return Err(FrameError::PositionOutOfBounds { position, len });
    }
    Ok(resolved)
}

/// Number of leading rows `head(n)` keeps. A negative `n` keeps everything
/// but the last `|n|` rows.
pub(crate) fn head_count(n: i64, len: usize) -> usize {
    if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub((n.unsigned_abs() as usize).min(len))
    }
}

/// Start offset of the window `tail(n)` keeps.
pub(crate) fn tail_start(n: i64, len: usize) -> usize {
    if n >= 0 {
        len.saturating_sub((n as usize).min(len))
    } else {
        (n.unsigned_abs() as usize).min(len)
    }
}

/// Total order over cells for sorting: missing sorts after everything,
/// text compares lexicographically, the rest numerically.
pub(crate) fn compare_values_missing_last(a: &Value, b: &Value) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match (a, b) {
            (Value::Text(x), Value::Text(y)) => x.cmp(y),
            _ => {
                let x = a.as_float().unwrap_or(f64::NAN);
                let y = b.as_float().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
    }
}

/// Turn a cell value into an index key, for `set_index` and value counts.
pub(crate) fn value_to_key(value: &Value) -> Result<Key, FrameError> {
    match value {
        Value::Missing => Err(FrameError::InvalidArgument(
            "a missing value cannot become a label".to_owned(),
        )),
        Value::Int(v) => Ok(Key::Int(*v)),
        Value::Text(v) => Ok(Key::Text(v.clone())),
        Value::Bool(v) => Ok(Key::Text(v.to_string())),
        Value::Float(v) => {
            if v.is_nan() {
                Err(FrameError::InvalidArgument(
                    "a missing value cannot become a label".to_owned(),
                ))
            } else if v.is_finite() && *v == v.trunc() {
                Ok(Key::Int(*v as i64))
            } else {
                Ok(Key::Text(value.render()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_values_missing_last, head_count, normalize_position, tail_start, value_to_key};
    use std::cmp::Ordering;
    use trellis_index::Key;
    use trellis_types::Value;

    #[test]
    fn negative_positions_count_from_the_end() {
        assert_eq!(normalize_position(-1, 4).unwrap(), 3);
        assert_eq!(normalize_position(0, 4).unwrap(), 0);
        assert!(normalize_position(4, 4).is_err());
        assert!(normalize_position(-5, 4).is_err());
    }

    #[test]
    fn head_and_tail_accept_negative_counts() {
        assert_eq!(head_count(2, 5), 2);
        assert_eq!(head_count(-2, 5), 3);
        assert_eq!(head_count(9, 5), 5);
        assert_eq!(tail_start(2, 5), 3);
        assert_eq!(tail_start(-2, 5), 2);
        assert_eq!(tail_start(9, 5), 0);
    }

    #[test]
    fn missing_sorts_last() {
        assert_eq!(
            compare_values_missing_last(&Value::Missing, &Value::Int(1)),
            Ordering::Greater
        );
        assert_eq!(
            compare_values_missing_last(&Value::Int(1), &Value::Float(f64::NAN)),
            Ordering::Less
        );
        assert_eq!(
            compare_values_missing_last(&Value::Int(1), &Value::Float(1.5)),
            Ordering::Less
        );
    }

    #[test]
    fn keys_from_values_preserve_integral_floats() {
        assert_eq!(value_to_key(&Value::Float(3.0)).unwrap(), Key::Int(3));
        assert_eq!(value_to_key(&Value::Int(3)).unwrap(), Key::Int(3));
        assert!(value_to_key(&Value::Missing).is_err());
    }
}
