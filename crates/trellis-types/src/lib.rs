#![forbid(unsafe_code)]

//! Scalar value model for trellis containers.
//!
//! A cell holds a [`Value`]: a tagged variant over the supported logical
//! kinds plus a dedicated missing sentinel. Missing values are excluded
//! from reductions by default; every reduction kernel takes an explicit
//! `skip_missing` flag to force propagation instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical kind of a value or a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Missing,
    Bool,
    Int,
    Float,
    Text,
}

/// A single cell value.
///
/// `Missing` is a first-class sentinel: it is never equal to any domain
/// value, and a `Float` NaN is treated as missing as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Missing => Kind::Missing,
            Self::Bool(_) => Kind::Bool,
            Self::Int(_) => Kind::Int,
            Self::Float(_) => Kind::Float,
            Self::Text(_) => Kind::Text,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Float(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Equality that treats two missing cells as equal and compares NaN to
    /// NaN as equal. Plain `==` keeps IEEE semantics for floats.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Self::Missing, Self::Float(v)) | (Self::Float(v), Self::Missing) => v.is_nan(),
            _ => self == other,
        }
    }

    /// Pick `self` unless it is missing, in which case pick `other`.
    #[must_use]
    pub fn coalesce(&self, other: &Self) -> Self {
        if self.is_missing() {
            other.clone()
        } else {
            self.clone()
        }
    }

    /// Numeric view of the value. Bools count as 0/1.
    pub fn as_float(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int(v) => Ok(*v as f64),
            Self::Float(v) => Ok(*v),
            Self::Missing => Err(TypeError::MissingOperand),
            Self::Text(_) => Err(TypeError::NonNumeric { kind: Kind::Text }),
        }
    }

    /// Textual rendering used by the promotion lattice and CSV export.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Missing => String::new(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => {
                if v.is_nan() {
                    String::new()
                } else {
                    v.to_string()
                }
            }
            Self::Text(v) => v.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("kinds {left:?} and {right:?} have no common kind")]
    IncompatibleKinds { left: Kind, right: Kind },
    #[error("cannot cast {from:?} to {to:?}")]
    InvalidCast { from: Kind, to: Kind },
    #[error("cannot cast float {value} to int without loss")]
    LossyFloatToInt { value: f64 },
    #[error("operand of kind {kind:?} is not numeric")]
    NonNumeric { kind: Kind },
    #[error("operand is missing")]
    MissingOperand,
}

/// Strict common kind for column storage: numeric kinds widen to each
/// other, text stays text, nothing crosses the numeric/text boundary.
pub fn common_kind(left: Kind, right: Kind) -> Result<Kind, TypeError> {
    use Kind::{Bool, Float, Int, Missing};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Missing, other) | (other, Missing) => other,
        (Bool, Int) | (Int, Bool) => Int,
        (Bool, Float) | (Float, Bool) | (Int, Float) | (Float, Int) => Float,
        _ => return Err(TypeError::IncompatibleKinds { left, right }),
    };

    Ok(out)
}

/// Promotion lattice with `Text` at the top. Used where heterogeneous
/// values must share one column (transpose, describe), never for ordinary
/// column construction.
#[must_use]
pub fn most_general(left: Kind, right: Kind) -> Kind {
    common_kind(left, right).unwrap_or(Kind::Text)
}

/// Infer the strict storage kind of a value slice.
pub fn infer_kind(values: &[Value]) -> Result<Kind, TypeError> {
    let mut current = Kind::Missing;
    for value in values {
        current = common_kind(current, value.kind())?;
    }
    Ok(current)
}

/// Cast a value to a target kind, taking ownership to skip the clone when
/// the value already matches.
pub fn cast_value(value: Value, target: Kind) -> Result<Value, TypeError> {
    let from = value.kind();
    if value.is_missing() {
        return Ok(Value::Missing);
    }
    if from == target {
        return Ok(value);
    }

    match target {
        Kind::Missing => Ok(Value::Missing),
        Kind::Bool => match &value {
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Int => match &value {
            Value::Bool(v) => Ok(Value::Int(i64::from(*v))),
            Value::Float(v) => {
                if !v.is_finite() || *v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                if *v < i64::MIN as f64 || *v > i64::MAX as f64 {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                Ok(Value::Int(*v as i64))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Float => match &value {
            Value::Bool(v) => Ok(Value::Float(if *v { 1.0 } else { 0.0 })),
            Value::Int(v) => Ok(Value::Float(*v as f64)),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        Kind::Text => Err(TypeError::InvalidCast { from, to: target }),
    }
}

// ── Missing-aware reduction kernels ────────────────────────────────────

/// Reduction selector shared by vectors, tables, and grouped reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Count,
    Std,
    Var,
}

/// Collect numeric inputs for a reduction.
///
/// Returns `Ok(None)` when missing values must propagate (`skip_missing`
/// is false and at least one input is missing). Text inputs fail with
/// [`TypeError::NonNumeric`] regardless of the flag.
fn numeric_inputs(values: &[Value], skip_missing: bool) -> Result<Option<Vec<f64>>, TypeError> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if value.is_missing() {
            if !skip_missing {
                return Ok(None);
            }
            continue;
        }
        out.push(value.as_float()?);
    }
    Ok(Some(out))
}

pub fn reduce(values: &[Value], reduction: Reduction, skip_missing: bool) -> Result<Value, TypeError> {
    if matches!(reduction, Reduction::Count) {
        let n = values.iter().filter(|v| !v.is_missing()).count();
        return Ok(Value::Int(n as i64));
    }

    let nums = match numeric_inputs(values, skip_missing)? {
        Some(nums) => nums,
        None => return Ok(Value::Missing),
    };

    Ok(match reduction {
        Reduction::Sum => Value::Float(nums.iter().sum()),
        Reduction::Mean => {
            if nums.is_empty() {
                Value::Missing
            } else {
                Value::Float(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Reduction::Min => nums
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .map_or(Value::Missing, Value::Float),
        Reduction::Max => nums
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .map_or(Value::Missing, Value::Float),
        Reduction::Median => median(&nums).map_or(Value::Missing, Value::Float),
        Reduction::Var => variance(&nums, 1).map_or(Value::Missing, Value::Float),
        Reduction::Std => variance(&nums, 1).map_or(Value::Missing, |v| Value::Float(v.sqrt())),
        Reduction::Count => unreachable!("handled above"),
    })
}

fn median(nums: &[f64]) -> Option<f64> {
    if nums.is_empty() {
        return None;
    }
    let mut sorted = nums.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

fn variance(nums: &[f64], ddof: usize) -> Option<f64> {
    if nums.len() <= ddof {
        return None;
    }
    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    let sum_sq: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    Some(sum_sq / (nums.len() - ddof) as f64)
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[Value], q: f64, skip_missing: bool) -> Result<Value, TypeError> {
    let nums = match numeric_inputs(values, skip_missing)? {
        Some(nums) => nums,
        None => return Ok(Value::Missing),
    };
    if nums.is_empty() {
        return Ok(Value::Missing);
    }
    let mut sorted = nums;
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Ok(Value::Float(interpolated_quantile(&sorted, q)))
}

/// `sorted` must be ascending and non-empty.
pub fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}
