//! One-dimensional labeled data.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trellis_column::{BinOp, CmpOp, Column, MissingPolicy};
use trellis_index::{align_sorted, Index, Key};
use trellis_types::{cast_value, Kind, Reduction, TypeError, Value};

use crate::{
    compare_values_missing_last, head_count, normalize_position, tail_start, value_to_key,
    FrameError, RankMethod,
};

/// Result of a label lookup: a unique label yields one value, a repeated
/// label yields the sub-vector of every match.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected {
    One(Value),
    Many(Vector),
}

impl Selected {
    /// The single value, if the lookup was unique.
    #[must_use]
    pub fn single(self) -> Option<Value> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(_) => None,
        }
    }

    /// The matched values regardless of multiplicity.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(vector) => vector.values().to_vec(),
        }
    }
}

/// A column of values keyed by an ordered label index.
///
/// The index is shared by reference; deriving a vector from another never
/// copies the labels unless the label set itself changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    name: Option<String>,
    index: Arc<Index>,
    column: Column,
}

impl Vector {
    pub fn new(name: Option<String>, index: Index, column: Column) -> Result<Self, FrameError> {
        Self::with_shared_index(name, Arc::new(index), column)
    }

    pub fn with_shared_index(
        name: Option<String>,
        index: Arc<Index>,
        column: Column,
    ) -> Result<Self, FrameError> {
        if index.len() != column.len() {
            return Err(FrameError::LengthMismatch {
                expected: index.len(),
                actual: column.len(),
            });
        }
        Ok(Self {
            name,
            index,
            column,
        })
    }

    /// Length agreement already established by the caller.
    pub(crate) fn from_parts(name: Option<String>, index: Arc<Index>, column: Column) -> Self {
        Self {
            name,
            index,
            column,
        }
    }

    pub fn from_values(
        name: Option<&str>,
        keys: Vec<Key>,
        values: Vec<Value>,
    ) -> Result<Self, FrameError> {
        let column = Column::from_values(values)?;
        Self::new(name.map(str::to_owned), Index::new(keys), column)
    }

    /// Default integer labeling `0..n`.
    pub fn from_plain(name: Option<&str>, values: Vec<Value>) -> Result<Self, FrameError> {
        let index = Index::from_range(0, values.len() as i64, 1);
        let column = Column::from_values(values)?;
        Self::new(name.map(str::to_owned), index, column)
    }

    /// Build from key/value pairs. The labels come out sorted ascending,
    /// matching construction from a mapping.
    pub fn from_map(name: Option<&str>, pairs: Vec<(Key, Value)>) -> Result<Self, FrameError> {
        let mut pairs = pairs;
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let (keys, values): (Vec<Key>, Vec<Value>) = pairs.into_iter().unzip();
        Self::from_values(name, keys, values)
    }

    /// One value repeated under every key.
    pub fn broadcast(name: Option<&str>, value: Value, keys: Vec<Key>) -> Result<Self, FrameError> {
        let values = vec![value; keys.len()];
        Self::from_values(name, keys, values)
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn rename(&self, name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_owned),
            index: Arc::clone(&self.index),
            column: self.column.clone(),
        }
    }

    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn shared_index(&self) -> &Arc<Index> {
        &self.index
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        self.column.values()
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.column.kind()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    fn derive(&self, index: Index, column: Column) -> Self {
        Self {
            name: self.name.clone(),
            index: Arc::new(index),
            column,
        }
    }

    /// Look up by label. A unique label yields the value; a repeated label
    /// yields every match as a sub-vector. On a hierarchical index a
    /// partial key selects the matching rows and drops the matched
    /// leading levels.
    pub fn get(&self, key: &Key) -> Result<Selected, FrameError> {
        if key.arity() < self.index.arity() {
            let (residual, positions) = self.index.prefix_select(key)?;
            let column = self.column.take_dense(&positions);
            return Ok(Selected::Many(self.derive(residual, column)));
        }

        let positions = self.index.lookup(key)?.to_vec();
        if positions.len() == 1 {
            let value = self.column.values()[positions[0]].clone();
            return Ok(Selected::One(value));
        }
        let index = self.index.take(&positions);
        let column = self.column.take_dense(&positions);
        Ok(Selected::Many(self.derive(index, column)))
    }

    /// Access by position; negative positions count from the end.
    pub fn get_at(&self, position: i64) -> Result<Value, FrameError> {
        let resolved = normalize_position(position, self.len())?;
        Ok(self.column.values()[resolved].clone())
    }

    /// Overwrite every cell carrying `key`. The column kind widens when
    /// the new value does not fit the current storage kind.
    pub fn set(&mut self, key: &Key, value: Value) -> Result<(), FrameError> {
        let positions = self.index.lookup(key)?.to_vec();
        if cast_value(value.clone(), self.column.kind()).is_ok() {
            for position in positions {
                self.column.set(position, value.clone())?;
            }
            return Ok(());
        }
        let mut values = self.column.values().to_vec();
        for position in positions {
            values[position] = value.clone();
        }
        self.column = Column::from_values(values)?;
        Ok(())
    }

    /// Inclusive label-range slice; requires a monotonic index.
    pub fn label_range(&self, start: &Key, stop: &Key) -> Result<Self, FrameError> {
        let range = self.index.label_range(start, stop)?;
        let positions: Vec<usize> = range.clone().collect();
        let index = self.index.slice(range);
        let column = self.column.take_dense(&positions);
        Ok(self.derive(index, column))
    }

    #[must_use]
    pub fn head(&self, n: i64) -> Self {
        let count = head_count(n, self.len());
        let positions: Vec<usize> = (0..count).collect();
        self.derive(self.index.slice(0..count), self.column.take_dense(&positions))
    }

    #[must_use]
    pub fn tail(&self, n: i64) -> Self {
        let start = tail_start(n, self.len());
        let positions: Vec<usize> = (start..self.len()).collect();
        self.derive(
            self.index.slice(start..self.len()),
            self.column.take_dense(&positions),
        )
    }

    fn shares_index(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.index, &other.index) || self.index == other.index
    }

    fn result_name(&self, other: &Self) -> Option<String> {
        if self.name == other.name {
            self.name.clone()
        } else {
            None
        }
    }

    /// Label-aligned elementwise arithmetic.
    ///
    /// The output index is the sorted union of both key sets; what happens
    /// at labels present on only one side is decided by `policy`.
    pub fn binary_with(
        &self,
        other: &Self,
        op: BinOp,
        policy: &MissingPolicy,
    ) -> Result<Self, FrameError> {
        let name = self.result_name(other);
        if self.shares_index(other) {
            let column = self.column.binary(&other.column, op, policy)?;
            return Ok(Self {
                name,
                index: Arc::clone(&self.index),
                column,
            });
        }

        let plan = align_sorted(&self.index, &other.index);
        plan.validate()?;
        let left = self.column.take(&plan.left_positions);
        let right = other.column.take(&plan.right_positions);
        let column = left.binary(&right, op, policy)?;
        Ok(Self {
            name,
            index: Arc::new(plan.union),
            column,
        })
    }

    pub fn add(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_with(other, BinOp::Add, &MissingPolicy::Propagate)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_with(other, BinOp::Sub, &MissingPolicy::Propagate)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_with(other, BinOp::Mul, &MissingPolicy::Propagate)
    }

    pub fn div(&self, other: &Self) -> Result<Self, FrameError> {
        self.binary_with(other, BinOp::Div, &MissingPolicy::Propagate)
    }

    /// Elementwise arithmetic against a broadcast scalar.
    pub fn apply_scalar(&self, value: &Value, op: BinOp) -> Result<Self, FrameError> {
        let scalar = Column::from_values(vec![value.clone(); self.len()])?;
        let column = self.column.binary(&scalar, op, &MissingPolicy::Propagate)?;
        Ok(Self {
            name: self.name.clone(),
            index: Arc::clone(&self.index),
            column,
        })
    }

    /// Label-aligned elementwise comparison; missing on either side stays
    /// missing in the boolean output.
    pub fn compare(&self, other: &Self, op: CmpOp) -> Result<Self, FrameError> {
        let name = self.result_name(other);
        if self.shares_index(other) {
            let column = self.column.compare(&other.column, op)?;
            return Ok(Self {
                name,
                index: Arc::clone(&self.index),
                column,
            });
        }
        let plan = align_sorted(&self.index, &other.index);
        plan.validate()?;
        let left = self.column.take(&plan.left_positions);
        let right = other.column.take(&plan.right_positions);
        let column = left.compare(&right, op)?;
        Ok(Self {
            name,
            index: Arc::new(plan.union),
            column,
        })
    }

    /// Boolean mask from comparing every cell against one scalar.
    pub fn compare_scalar(&self, value: &Value, op: CmpOp) -> Result<Self, FrameError> {
        let column = self.column.compare_value(value, op)?;
        Ok(Self {
            name: self.name.clone(),
            index: Arc::clone(&self.index),
            column,
        })
    }

    pub fn gt(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Gt)
    }

    pub fn lt(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Lt)
    }

    pub fn ge(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Ge)
    }

    pub fn le(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Le)
    }

    pub fn eq_value(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Eq)
    }

    pub fn ne_value(&self, value: &Value) -> Result<Self, FrameError> {
        self.compare_scalar(value, CmpOp::Ne)
    }

    /// Keep the positions where the boolean mask vector is true. The mask
    /// applies positionally and must match in length; a missing mask cell
    /// drops the row.
    pub fn filter(&self, mask: &Self) -> Result<Self, FrameError> {
        self.filter_mask(&mask_bools(mask)?)
    }

    pub fn filter_mask(&self, mask: &[bool]) -> Result<Self, FrameError> {
        if mask.len() != self.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.len(),
                actual: mask.len(),
            });
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, &keep)| keep.then_some(idx))
            .collect();
        Ok(self.derive(
            self.index.take(&positions),
            self.column.take_dense(&positions),
        ))
    }

    pub fn reduce(&self, reduction: Reduction, skip_missing: bool) -> Result<Value, FrameError> {
        Ok(trellis_types::reduce(
            self.column.values(),
            reduction,
            skip_missing,
        )?)
    }

    pub fn sum(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Sum, true)
    }

    pub fn mean(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Mean, true)
    }

    pub fn min(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Min, true)
    }

    pub fn max(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Max, true)
    }

    pub fn median(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Median, true)
    }

    pub fn std(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Std, true)
    }

    pub fn var(&self) -> Result<Value, FrameError> {
        self.reduce(Reduction::Var, true)
    }

    /// Present (non-missing) cell count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.column.count_present()
    }

    pub fn quantile(&self, q: f64, skip_missing: bool) -> Result<Value, FrameError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(FrameError::InvalidArgument(format!(
                "quantile {q} outside [0, 1]"
            )));
        }
        Ok(trellis_types::quantile(self.column.values(), q, skip_missing)?)
    }

    /// Ascending 1-based ranks as floats. Missing cells rank as missing.
    pub fn rank(&self, method: RankMethod) -> Result<Self, FrameError> {
        if self.column.kind() == Kind::Text {
            return Err(TypeError::NonNumeric { kind: Kind::Text }.into());
        }
        let values = self.column.values();
        let mut order: Vec<usize> = (0..values.len())
            .filter(|&i| !values[i].is_missing())
            .collect();
        order.sort_by(|&a, &b| {
            compare_values_missing_last(&values[a], &values[b]).then(a.cmp(&b))
        });

        let mut out = vec![Value::Missing; values.len()];
        let mut start = 0;
        let mut dense = 0.0;
        while start < order.len() {
            let mut stop = start + 1;
            while stop < order.len() && values[order[stop]].same_as(&values[order[start]]) {
                stop += 1;
            }
            dense += 1.0;
            for (offset, &position) in order[start..stop].iter().enumerate() {
                let rank = match method {
                    RankMethod::Average => (start + stop + 1) as f64 / 2.0,
                    RankMethod::Min => (start + 1) as f64,
                    RankMethod::Max => stop as f64,
                    RankMethod::First => (start + offset + 1) as f64,
                    RankMethod::Dense => dense,
                };
                out[position] = Value::Float(rank);
            }
            start = stop;
        }

        let column = Column::with_kind(Kind::Float, out)?;
        Ok(Self {
            name: self.name.clone(),
            index: Arc::clone(&self.index),
            column,
        })
    }

    /// Numeric pairs present on both sides after label alignment.
    fn paired(&self, other: &Self) -> Result<Vec<(f64, f64)>, FrameError> {
        let (left, right) = if self.shares_index(other) {
            (self.column.clone(), other.column.clone())
        } else {
            let plan = align_sorted(&self.index, &other.index);
            plan.validate()?;
            (
                self.column.take(&plan.left_positions),
                other.column.take(&plan.right_positions),
            )
        };
        let mut pairs = Vec::new();
        for (a, b) in left.values().iter().zip(right.values().iter()) {
            if a.is_missing() || b.is_missing() {
                continue;
            }
            pairs.push((a.as_float()?, b.as_float()?));
        }
        Ok(pairs)
    }

    /// Sample covariance over mutually present pairs; missing when fewer
    /// than two pairs survive.
    pub fn cov(&self, other: &Self) -> Result<Value, FrameError> {
        let pairs = self.paired(other)?;
        if pairs.len() < 2 {
            return Ok(Value::Missing);
        }
        let n = pairs.len() as f64;
        let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
        let cov = pairs
            .iter()
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum::<f64>()
            / (n - 1.0);
        Ok(Value::Float(cov))
    }

    /// Pearson correlation over mutually present pairs.
    pub fn corr(&self, other: &Self) -> Result<Value, FrameError> {
        let pairs = self.paired(other)?;
        if pairs.len() < 2 {
            return Ok(Value::Missing);
        }
        let n = pairs.len() as f64;
        let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
        let mut sxy = 0.0;
        let mut sxx = 0.0;
        let mut syy = 0.0;
        for (x, y) in &pairs {
            sxy += (x - mean_x) * (y - mean_y);
            sxx += (x - mean_x).powi(2);
            syy += (y - mean_y).powi(2);
        }
        let denom = (sxx * syy).sqrt();
        if denom == 0.0 {
            return Ok(Value::Missing);
        }
        Ok(Value::Float(sxy / denom))
    }

    /// Boolean vector marking the missing cells.
    pub fn is_missing(&self) -> Result<Self, FrameError> {
        let values: Vec<Value> = self
            .column
            .values()
            .iter()
            .map(|v| Value::Bool(v.is_missing()))
            .collect();
        let column = Column::with_kind(Kind::Bool, values)?;
        Ok(Self {
            name: self.name.clone(),
            index: Arc::clone(&self.index),
            column,
        })
    }

    pub fn fill_missing(&self, fill: &Value) -> Result<Self, FrameError> {
        let column = self.column.fill_missing(fill)?;
        Ok(Self {
            name: self.name.clone(),
            index: Arc::clone(&self.index),
            column,
        })
    }

    #[must_use]
    pub fn drop_missing(&self) -> Self {
        let positions = self.column.present_positions();
        self.derive(
            self.index.take(&positions),
            self.column.take_dense(&positions),
        )
    }

    /// Distinct values in order of first appearance; a missing cell
    /// contributes one missing entry.
    #[must_use]
    pub fn unique(&self) -> Vec<Value> {
        let mut seen: Vec<Value> = Vec::new();
        for value in self.column.values() {
            if !seen.iter().any(|v| v.same_as(value)) {
                seen.push(value.clone());
            }
        }
        seen
    }

    /// Occurrence counts of the present values, most frequent first; ties
    /// break on ascending key order.
    pub fn value_counts(&self) -> Result<Self, FrameError> {
        let mut counts: BTreeMap<Key, i64> = BTreeMap::new();
        for value in self.column.values() {
            if value.is_missing() {
                continue;
            }
            *counts.entry(value_to_key(value)?).or_insert(0) += 1;
        }
        let mut entries: Vec<(Key, i64)> = counts.into_iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        let (keys, values): (Vec<Key>, Vec<Value>) = entries
            .into_iter()
            .map(|(key, count)| (key, Value::Int(count)))
            .unzip();
        Self::from_values(Some("count"), keys, values)
    }

    /// Reorder by ascending (or descending) labels; stable for ties.
    #[must_use]
    pub fn sort_index(&self, ascending: bool) -> Self {
        let mut order = self.index.sorted_order();
        if !ascending {
            order.reverse();
        }
        self.derive(self.index.take(&order), self.column.take_dense(&order))
    }

    #[must_use]
    pub fn to_pairs(&self) -> Vec<(Key, Value)> {
        self.index
            .keys()
            .iter()
            .cloned()
            .zip(self.column.values().iter().cloned())
            .collect()
    }

    /// Cell-wise equality treating missing as equal to missing.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
            && *self.index == *other.index
            && self.column.same_as(&other.column)
    }
}

/// Boolean cells of a mask vector; missing means "drop".
pub(crate) fn mask_bools(mask: &Vector) -> Result<Vec<bool>, FrameError> {
    if !matches!(mask.kind(), Kind::Bool | Kind::Missing) {
        return Err(FrameError::InvalidArgument(format!(
            "filter mask must be boolean, got {:?}",
            mask.kind()
        )));
    }
    Ok(mask
        .values()
        .iter()
        .map(|v| matches!(v, Value::Bool(true)))
        .collect())
}
