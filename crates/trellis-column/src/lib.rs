#![forbid(unsafe_code)]

//! Dense single-kind storage.
//!
//! A [`Column`] owns a `Vec<Value>` coerced to one storage [`Kind`] and a
//! packed [`Presence`] bitmask marking which cells hold a real value. The
//! column layer knows nothing about labels; alignment hands it position
//! vectors and it materializes the reordered (and possibly gap-filled)
//! storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trellis_types::{cast_value, common_kind, infer_kind, most_general, Kind, TypeError, Value};

/// Packed per-cell presence bits. A set bit means the cell is present
/// (not missing).
#[derive(Debug, Clone, Eq)]
pub struct Presence {
    words: Vec<u64>,
    len: usize,
}

impl Presence {
    #[must_use]
    pub fn from_values(values: &[Value]) -> Self {
        let len = values.len();
        let mut words = vec![0_u64; len.div_ceil(64)];
        for (idx, value) in values.iter().enumerate() {
            if !value.is_missing() {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Self { words, len }
    }

    #[must_use]
    pub fn present(&self, idx: usize) -> bool {
        idx < self.len && (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub fn mark(&mut self, idx: usize, present: bool) {
        if idx >= self.len {
            return;
        }
        if present {
            self.words[idx / 64] |= 1_u64 << (idx % 64);
        } else {
            self.words[idx / 64] &= !(1_u64 << (idx % 64));
        }
    }

    #[must_use]
    pub fn count_present(&self) -> usize {
        let full = self.len / 64;
        let mut count: u32 = self.words[..full].iter().map(|w| w.count_ones()).sum();
        let tail = self.len % 64;
        if tail > 0 && full < self.words.len() {
            count += (self.words[full] & ((1_u64 << tail) - 1)).count_ones();
        }
        count as usize
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(|idx| self.present(idx))
    }
}

impl PartialEq for Presence {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bits().eq(other.bits())
    }
}

impl Serialize for Presence {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let bits: Vec<bool> = self.bits().collect();
        let mut state = serializer.serialize_struct("Presence", 1)?;
        state.serialize_field("bits", &bits)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Presence {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            bits: Vec<bool>,
        }
        let raw = Raw::deserialize(deserializer)?;
        let len = raw.bits.len();
        let mut words = vec![0_u64; len.div_ceil(64)];
        for (idx, &present) in raw.bits.iter().enumerate() {
            if present {
                words[idx / 64] |= 1_u64 << (idx % 64);
            }
        }
        Ok(Self { words, len })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

/// How a binary operation treats a position missing on one side.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingPolicy {
    /// The output cell is missing (the default alignment semantics).
    Propagate,
    /// Substitute the fill value for the missing side before applying the
    /// operator. Positions missing on both sides stay missing.
    Fill(Value),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column length mismatch: left={left}, right={right}")]
    LengthMismatch { left: usize, right: usize },
    #[error(transparent)]
    Type(#[from] TypeError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    kind: Kind,
    values: Vec<Value>,
    presence: Presence,
}

impl Column {
    /// Construct a column, coercing every value to `kind`. Missing cells
    /// pass through unchanged.
    pub fn with_kind(kind: Kind, values: Vec<Value>) -> Result<Self, ColumnError> {
        let coerced = values
            .into_iter()
            .map(|value| cast_value(value, kind))
            .collect::<Result<Vec<_>, _>>()?;
        let presence = Presence::from_values(&coerced);
        Ok(Self {
            kind,
            values: coerced,
            presence,
        })
    }

    /// Construct with the strict inferred kind.
    pub fn from_values(values: Vec<Value>) -> Result<Self, ColumnError> {
        let kind = infer_kind(&values)?;
        Self::with_kind(kind, values)
    }

    /// Construct with most-general promotion: heterogeneous inputs fall
    /// back to text rather than failing. Used by transpose and describe,
    /// where a row of mixed kinds becomes one column.
    #[must_use]
    pub fn from_values_promoted(values: Vec<Value>) -> Self {
        let kind = values
            .iter()
            .map(Value::kind)
            .fold(Kind::Missing, most_general);
        let coerced: Vec<Value> = values
            .into_iter()
            .map(|value| {
                if value.is_missing() {
                    Value::Missing
                } else {
                    match cast_value(value.clone(), kind) {
                        Ok(cast) => cast,
                        Err(_) => Value::Text(value.render()),
                    }
                }
            })
            .collect();
        let presence = Presence::from_values(&coerced);
        Self {
            kind,
            values: coerced,
            presence,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    #[must_use]
    pub fn count_present(&self) -> usize {
        self.presence.count_present()
    }

    /// Overwrite one cell in place, keeping presence in sync. The value is
    /// coerced to the column kind.
    pub fn set(&mut self, idx: usize, value: Value) -> Result<(), ColumnError> {
        let cast = cast_value(value, self.kind)?;
        let present = !cast.is_missing();
        self.values[idx] = cast;
        self.presence.mark(idx, present);
        Ok(())
    }

    /// Materialize storage for an alignment position vector: `Some(p)`
    /// pulls the source cell at `p`, `None` becomes a missing cell.
    #[must_use]
    pub fn take(&self, positions: &[Option<usize>]) -> Self {
        let values: Vec<Value> = positions
            .iter()
            .map(|slot| match slot {
                Some(p) => self.values[*p].clone(),
                None => Value::Missing,
            })
            .collect();
        let presence = Presence::from_values(&values);
        Self {
            kind: self.kind,
            values,
            presence,
        }
    }

    /// Positional gather without gaps.
    #[must_use]
    pub fn take_dense(&self, positions: &[usize]) -> Self {
        let values: Vec<Value> = positions.iter().map(|&p| self.values[p].clone()).collect();
        let presence = Presence::from_values(&values);
        Self {
            kind: self.kind,
            values,
            presence,
        }
    }

    /// Elementwise arithmetic against an equal-length column.
    ///
    /// Missing handling follows `policy`; `Div` always produces floats,
    /// the other operators keep `Int` when both sides are integral.
    pub fn binary(&self, other: &Self, op: BinOp, policy: &MissingPolicy) -> Result<Self, ColumnError> {
        if self.len() != other.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }

        let value_kind = common_kind(self.kind, other.kind)?;
        if matches!(value_kind, Kind::Text) {
            return Err(ColumnError::Type(TypeError::NonNumeric { kind: Kind::Text }));
        }
        let int_result = matches!(value_kind, Kind::Int | Kind::Bool) && !matches!(op, BinOp::Div);

        let mut out = Vec::with_capacity(self.len());
        for (left, right) in self.values.iter().zip(other.values.iter()) {
            let (left, right) = match (left.is_missing(), right.is_missing()) {
                (false, false) => (left, right),
                (true, true) => {
                    out.push(Value::Missing);
                    continue;
                }
                (true, false) => match policy {
                    MissingPolicy::Propagate => {
                        out.push(Value::Missing);
                        continue;
                    }
                    MissingPolicy::Fill(fill) => (fill, right),
                },
                (false, true) => match policy {
                    MissingPolicy::Propagate => {
                        out.push(Value::Missing);
                        continue;
                    }
                    MissingPolicy::Fill(fill) => (left, fill),
                },
            };

            if int_result {
                if let (Some(l), Some(r)) = (int_cell(left), int_cell(right)) {
                    let applied = match op {
                        BinOp::Add => Some(l.wrapping_add(r)),
                        BinOp::Sub => Some(l.wrapping_sub(r)),
                        BinOp::Mul => Some(l.wrapping_mul(r)),
                        BinOp::Div => None,
                    };
                    if let Some(exact) = applied {
                        out.push(Value::Int(exact));
                        continue;
                    }
                }
            }

            let l = left.as_float()?;
            let r = right.as_float()?;
            let applied = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
            };
            out.push(Value::Float(applied));
        }

        Self::from_values(out)
    }

    /// Elementwise comparison against an equal-length column. Missing on
    /// either side propagates to a missing output cell.
    pub fn compare(&self, other: &Self, op: CmpOp) -> Result<Self, ColumnError> {
        if self.len() != other.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        let out = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(left, right)| compare_cells(left, right, op))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_kind(Kind::Bool, out)?)
    }

    /// Compare every cell against one scalar.
    pub fn compare_value(&self, scalar: &Value, op: CmpOp) -> Result<Self, ColumnError> {
        let out = self
            .values
            .iter()
            .map(|left| compare_cells(left, scalar, op))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::with_kind(Kind::Bool, out)?)
    }

    /// Keep only the positions where `mask` is true.
    pub fn filter(&self, mask: &[bool]) -> Result<Self, ColumnError> {
        if mask.len() != self.len() {
            return Err(ColumnError::LengthMismatch {
                left: self.len(),
                right: mask.len(),
            });
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &keep)| keep.then_some(idx))
            .collect();
        Ok(self.take_dense(&positions))
    }

    pub fn fill_missing(&self, fill: &Value) -> Result<Self, ColumnError> {
        let values: Vec<Value> = self
            .values
            .iter()
            .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
            .collect();
        Self::from_values(values)
    }

    /// Positions of the present cells, for drop-missing at the container
    /// level where the index must be filtered in lockstep.
    #[must_use]
    pub fn present_positions(&self) -> Vec<usize> {
        (0..self.len()).filter(|&i| self.presence.present(i)).collect()
    }

    #[must_use]
    pub fn missing_mask(&self) -> Vec<bool> {
        self.values.iter().map(Value::is_missing).collect()
    }

    /// Cell-wise equality treating missing as equal to missing.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| a.same_as(b))
    }
}

fn int_cell(value: &Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(*v),
        Value::Bool(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn compare_cells(left: &Value, right: &Value, op: CmpOp) -> Result<Value, ColumnError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Value::Missing);
    }

    if let (Value::Text(a), Value::Text(b)) = (left, right) {
        return Ok(Value::Bool(match op {
            CmpOp::Gt => a > b,
            CmpOp::Lt => a < b,
            CmpOp::Ge => a >= b,
            CmpOp::Le => a <= b,
            CmpOp::Eq => a == b,
            CmpOp::Ne => a != b,
        }));
    }

    let l = left.as_float().map_err(ColumnError::from)?;
    let r = right.as_float().map_err(ColumnError::from)?;
    Ok(Value::Bool(match op {
        CmpOp::Gt => l > r,
        CmpOp::Lt => l < r,
        CmpOp::Ge => l >= r,
        CmpOp::Le => l <= r,
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
    }))
}
