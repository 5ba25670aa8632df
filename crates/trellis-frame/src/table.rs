//! Two-dimensional labeled data.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use trellis_column::Column;
use trellis_index::{Index, Key};
use trellis_types::{Kind, Reduction, TypeError, Value};

use crate::vector::mask_bools;
use crate::{
    compare_values_missing_last, head_count, normalize_position, tail_start, value_to_key, Axis,
    ColumnView, ColumnViewMut, FillMethod, FrameError, SortKey, Vector,
};

/// What goes into a column slot on assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnAssignment {
    /// Positional values; the length must match the row count exactly.
    Values(Vec<Value>),
    /// A labeled vector, aligned to the table's row index. Rows the vector
    /// does not cover become missing; vector labels outside the table are
    /// dropped.
    Aligned(Vector),
    /// One value broadcast down the whole column.
    Scalar(Value),
}

/// Result of a row lookup: a unique label yields the row as a record
/// vector, a repeated (or partial hierarchical) label yields a sub-table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelection {
    Record(Vector),
    Rows(Table),
}

/// Row-dropping policy for [`Table::drop_missing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropMissing {
    /// Drop a row if any cell is missing.
    Any,
    /// Drop a row only if every cell is missing.
    All,
}

/// Columns of equal length sharing one row index.
///
/// Column order is insertion order and survives every transformation.
/// [`Table::column`] hands out a borrowed view aliasing the table's own
/// storage; [`Table::vector`] is the explicit owned copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index: Arc<Index>,
    order: Vec<String>,
    columns: BTreeMap<String, Column>,
}

impl Table {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            index: Arc::new(Index::new(Vec::new())),
            order: Vec::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn new(index: Index, columns: Vec<(String, Column)>) -> Result<Self, FrameError> {
        Self::with_shared_index(Arc::new(index), columns)
    }

    pub fn with_shared_index(
        index: Arc<Index>,
        columns: Vec<(String, Column)>,
    ) -> Result<Self, FrameError> {
        let mut order = Vec::with_capacity(columns.len());
        let mut stored = BTreeMap::new();
        for (name, column) in columns {
            if column.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    expected: index.len(),
                    actual: column.len(),
                });
            }
            if stored.contains_key(&name) {
                return Err(FrameError::DuplicateColumn { name });
            }
            order.push(name.clone());
            stored.insert(name, column);
        }
        Ok(Self {
            index,
            order,
            columns: stored,
        })
    }

    /// Assemble a table from named vectors, aligning them on the sorted
    /// union of their indices when they disagree.
    pub fn from_vectors(vectors: Vec<Vector>) -> Result<Self, FrameError> {
        if vectors.is_empty() {
            return Ok(Self::empty());
        }
        let shared = vectors
            .iter()
            .all(|vector| vector.index() == vectors[0].index());
        let index = if shared {
            Arc::clone(vectors[0].shared_index())
        } else {
            let mut union = vectors[0].index().clone();
            for vector in &vectors[1..] {
                union = union.union_sorted(vector.index());
            }
            Arc::new(union)
        };

        let mut columns = Vec::with_capacity(vectors.len());
        for (position, vector) in vectors.iter().enumerate() {
            let name = vector.name().map(str::to_owned).ok_or_else(|| {
                FrameError::InvalidArgument(format!(
                    "vector {position} needs a name to become a column"
                ))
            })?;
            let column = if shared {
                vector.column().clone()
            } else {
                vector.column().take(&vector.index().indexer_first(&index))
            };
            columns.push((name, column));
        }
        Self::with_shared_index(index, columns)
    }

    /// Build from row records (field/value pairs). Column order follows
    /// first appearance; absent fields become missing. Rows get the
    /// default integer labeling.
    pub fn from_records(records: Vec<Vec<(String, Value)>>) -> Result<Self, FrameError> {
        let mut order: Vec<String> = Vec::new();
        for record in &records {
            for (name, _) in record {
                if !order.contains(name) {
                    order.push(name.clone());
                }
            }
        }
        let mut columns = Vec::with_capacity(order.len());
        for name in &order {
            let values: Vec<Value> = records
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .find(|(field, _)| field == name)
                        .map_or(Value::Missing, |(_, value)| value.clone())
                })
                .collect();
            columns.push((name.clone(), Column::from_values(values)?));
        }
        let index = Index::from_range(0, records.len() as i64, 1);
        Self::new(index, columns)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
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
    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn column_ref(&self, name: &str) -> Result<&Column, FrameError> {
        self.columns.get(name).ok_or_else(|| FrameError::ColumnNotFound {
            name: name.to_owned(),
        })
    }

    /// Borrowed read view aliasing the table's storage.
    pub fn column(&self, name: &str) -> Result<ColumnView<'_>, FrameError> {
        let (stored_name, column) =
            self.columns
                .get_key_value(name)
                .ok_or_else(|| FrameError::ColumnNotFound {
                    name: name.to_owned(),
                })?;
        Ok(ColumnView {
            name: stored_name,
            index: &self.index,
            column,
        })
    }

    /// Write-through view: mutations land in the table's storage.
    pub fn column_mut(&mut self, name: &str) -> Result<ColumnViewMut<'_>, FrameError> {
        let index = &self.index;
        let column = self
            .columns
            .get_mut(name)
            .ok_or_else(|| FrameError::ColumnNotFound {
                name: name.to_owned(),
            })?;
        Ok(ColumnViewMut { index, column })
    }

    /// Owned copy of one column as a vector, detached from the table.
    pub fn vector(&self, name: &str) -> Result<Vector, FrameError> {
        Ok(self.column(name)?.to_vector())
    }

    /// Views over every column in order.
    pub fn views(&self) -> impl Iterator<Item = ColumnView<'_>> {
        self.order.iter().map(|name| ColumnView {
            name,
            index: &self.index,
            column: &self.columns[name],
        })
    }

    /// Insert or replace a column in place. A replaced column keeps its
    /// position; a new one appends.
    pub fn set_column(
        &mut self,
        name: &str,
        assignment: ColumnAssignment,
    ) -> Result<(), FrameError> {
        let column = match assignment {
            ColumnAssignment::Values(values) => {
                if self.order.is_empty() && self.index.is_empty() {
                    self.index = Arc::new(Index::from_range(0, values.len() as i64, 1));
                }
                if values.len() != self.len() {
                    return Err(FrameError::LengthMismatch {
                        expected: self.len(),
                        actual: values.len(),
                    });
                }
                Column::from_values(values)?
            }
            ColumnAssignment::Aligned(vector) => {
                if self.order.is_empty() && self.index.is_empty() {
                    self.index = Arc::clone(vector.shared_index());
                    vector.column().clone()
                } else {
                    vector
                        .column()
                        .take(&vector.index().indexer_first(&self.index))
                }
            }
            ColumnAssignment::Scalar(value) => {
                Column::from_values(vec![value; self.len()])?
            }
        };
        if !self.columns.contains_key(name) {
            self.order.push(name.to_owned());
        }
        self.columns.insert(name.to_owned(), column);
        Ok(())
    }

    pub fn drop_columns(&self, names: &[&str]) -> Result<Self, FrameError> {
        for name in names {
            self.column_ref(name)?;
        }
        let order: Vec<String> = self
            .order
            .iter()
            .filter(|name| !names.contains(&name.as_str()))
            .cloned()
            .collect();
        let columns = order
            .iter()
            .map(|name| (name.clone(), self.columns[name].clone()))
            .collect();
        Ok(Self {
            index: Arc::clone(&self.index),
            order,
            columns,
        })
    }

    pub fn rename_columns(&self, mapping: &[(&str, &str)]) -> Result<Self, FrameError> {
        for (from, _) in mapping {
            self.column_ref(from)?;
        }
        let rename = |name: &str| -> String {
            mapping
                .iter()
                .find(|(from, _)| *from == name)
                .map_or_else(|| name.to_owned(), |(_, to)| (*to).to_owned())
        };
        let order: Vec<String> = self.order.iter().map(|name| rename(name)).collect();
        let mut columns = BTreeMap::new();
        for name in &self.order {
            let renamed = rename(name);
            if columns.insert(renamed.clone(), self.columns[name].clone()).is_some() {
                return Err(FrameError::DuplicateColumn { name: renamed });
            }
        }
        Ok(Self {
            index: Arc::clone(&self.index),
            order,
            columns,
        })
    }

    fn subset_by_positions(&self, positions: &[usize]) -> Self {
        let index = Arc::new(self.index.take(positions));
        let columns = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.take_dense(positions)))
            .collect();
        Self {
            index,
            order: self.order.clone(),
            columns,
        }
    }

    /// Look up rows by label. A unique label yields the row as a record
    /// vector (cells promoted to their most general common kind); a
    /// repeated label yields the matching sub-table. On a hierarchical
    /// index a partial key selects rows and drops the matched levels.
    pub fn row(&self, key: &Key) -> Result<RowSelection, FrameError> {
        if key.arity() < self.index.arity() {
            let (residual, positions) = self.index.prefix_select(key)?;
            let mut sub = self.subset_by_positions(&positions);
            sub.index = Arc::new(residual);
            return Ok(RowSelection::Rows(sub));
        }

        let positions = self.index.lookup(key)?.to_vec();
        if positions.len() == 1 {
            return Ok(RowSelection::Record(self.record_at(positions[0], key)));
        }
        Ok(RowSelection::Rows(self.subset_by_positions(&positions)))
    }

    fn record_at(&self, position: usize, key: &Key) -> Vector {
        let cells: Vec<Value> = self
            .order
            .iter()
            .map(|name| self.columns[name].values()[position].clone())
            .collect();
        let column = Column::from_values_promoted(cells);
        let index = Arc::new(Index::from_text(self.order.clone()));
        Vector::from_parts(Some(key.to_string()), index, column)
    }

    /// One row by position as a record vector.
    pub fn row_at(&self, position: i64) -> Result<Vector, FrameError> {
        let resolved = normalize_position(position, self.len())?;
        let key = self.index.keys()[resolved].clone();
        Ok(self.record_at(resolved, &key))
    }

    pub fn rows_at(&self, positions: &[i64]) -> Result<Self, FrameError> {
        let resolved = positions
            .iter()
            .map(|&p| normalize_position(p, self.len()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.subset_by_positions(&resolved))
    }

    /// Every match of every requested label, in request order.
    pub fn rows_by_label(&self, keys: &[Key]) -> Result<Self, FrameError> {
        let mut positions = Vec::new();
        for key in keys {
            positions.extend_from_slice(self.index.lookup(key)?);
        }
        Ok(self.subset_by_positions(&positions))
    }

    /// Inclusive label-range slice of the rows; requires a monotonic index.
    pub fn rows_range(&self, start: &Key, stop: &Key) -> Result<Self, FrameError> {
        let range = self.index.label_range(start, stop)?;
        let positions: Vec<usize> = range.collect();
        Ok(self.subset_by_positions(&positions))
    }

    #[must_use]
    pub fn head(&self, n: i64) -> Self {
        let positions: Vec<usize> = (0..head_count(n, self.len())).collect();
        self.subset_by_positions(&positions)
    }

    #[must_use]
    pub fn tail(&self, n: i64) -> Self {
        let positions: Vec<usize> = (tail_start(n, self.len())..self.len()).collect();
        self.subset_by_positions(&positions)
    }

    /// Keep the rows where the boolean mask vector is true; the mask
    /// applies positionally and must match the row count.
    pub fn filter_rows(&self, mask: &Vector) -> Result<Self, FrameError> {
        self.filter_rows_mask(&mask_bools(mask)?)
    }

    pub fn filter_rows_mask(&self, mask: &[bool]) -> Result<Self, FrameError> {
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
        Ok(self.subset_by_positions(&positions))
    }

    /// Drop every occurrence of the given row labels. Absent labels fail.
    pub fn drop_rows(&self, keys: &[Key]) -> Result<Self, FrameError> {
        let mut dropped = BTreeSet::new();
        for key in keys {
            dropped.extend(self.index.lookup(key)?.iter().copied());
        }
        let positions: Vec<usize> = (0..self.len()).filter(|p| !dropped.contains(p)).collect();
        Ok(self.subset_by_positions(&positions))
    }

    /// Append one row. Cells for unnamed columns become missing; a cell
    /// naming an unknown column fails. Column kinds widen as needed.
    pub fn insert_row(&self, key: Key, cells: &[(String, Value)]) -> Result<Self, FrameError> {
        for (name, _) in cells {
            self.column_ref(name)?;
        }
        let mut columns = Vec::with_capacity(self.width());
        for name in &self.order {
            let mut values = self.columns[name].values().to_vec();
            let cell = cells
                .iter()
                .find(|(field, _)| field == name)
                .map_or(Value::Missing, |(_, value)| value.clone());
            values.push(cell);
            columns.push((name.clone(), Column::from_values(values)?));
        }
        let mut keys = self.index.keys().to_vec();
        keys.push(key);
        let index = Index::new(keys).named(self.index.names().to_vec());
        Self::new(index, columns)
    }

    /// Conform the table to a new index along one axis.
    ///
    /// Labels absent from the source produce holes; `method` can fill a
    /// hole from the nearest source label in key order (preceding for
    /// forward fill, following for backward fill), and `fill` plugs
    /// whatever is still open. Row reindexing requires a unique source
    /// index.
    pub fn reindex(
        &self,
        target: &Index,
        axis: Axis,
        method: FillMethod,
        fill: Option<&Value>,
    ) -> Result<Self, FrameError> {
        match axis {
            Axis::Rows => self.reindex_rows(target, method, fill),
            Axis::Columns => self.reindex_columns(target, method, fill),
        }
    }

    fn reindex_rows(
        &self,
        target: &Index,
        method: FillMethod,
        fill: Option<&Value>,
    ) -> Result<Self, FrameError> {
        self.index.require_unique("reindex")?;
        let positions = fill_positions(&self.index, target, method);
        let mut columns = Vec::with_capacity(self.width());
        for name in &self.order {
            let source = &self.columns[name];
            let values: Vec<Value> = positions
                .iter()
                .map(|slot| match slot {
                    Some(p) => source.values()[*p].clone(),
                    None => fill.cloned().unwrap_or(Value::Missing),
                })
                .collect();
            columns.push((name.clone(), Column::from_values(values)?));
        }
        Self::new(target.clone(), columns)
    }

    fn reindex_columns(
        &self,
        target: &Index,
        method: FillMethod,
        fill: Option<&Value>,
    ) -> Result<Self, FrameError> {
        let names: Vec<String> = target
            .keys()
            .iter()
            .map(|key| match key {
                Key::Text(name) => Ok(name.clone()),
                other => Err(FrameError::InvalidArgument(format!(
                    "column labels must be text, got {other}"
                ))),
            })
            .collect::<Result<_, _>>()?;
        let source = Index::from_text(self.order.clone());
        let positions = fill_positions(&source, target, method);
        let mut columns = Vec::with_capacity(names.len());
        for (name, slot) in names.into_iter().zip(&positions) {
            let column = match slot {
                Some(p) => self.columns[&self.order[*p]].clone(),
                None => {
                    Column::from_values(vec![fill.cloned().unwrap_or(Value::Missing); self.len()])?
                }
            };
            columns.push((name, column));
        }
        Self::with_shared_index(Arc::clone(&self.index), columns)
    }

    /// Stable multi-criterion row sort. Missing cells sort last under
    /// either direction.
    pub fn sort(&self, by: &[SortKey]) -> Result<Self, FrameError> {
        let mut criteria = Vec::with_capacity(by.len());
        for sort_key in by {
            criteria.push((self.column_ref(&sort_key.column)?, sort_key.ascending));
        }
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| {
            for (column, ascending) in &criteria {
                let left = &column.values()[a];
                let right = &column.values()[b];
                let ord = match (left.is_missing(), right.is_missing()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => {
                        let ord = compare_values_missing_last(left, right);
                        if *ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    }
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(self.subset_by_positions(&order))
    }

    /// Reorder rows by ascending (or descending) labels; stable for ties.
    #[must_use]
    pub fn sort_index(&self, ascending: bool) -> Self {
        let mut order = self.index.sorted_order();
        if !ascending {
            order.reverse();
        }
        self.subset_by_positions(&order)
    }

    /// Group rows by the given index levels and reduce every numeric
    /// column within each group. Group keys come out sorted.
    pub fn group_reduce(
        &self,
        levels: &[usize],
        reduction: Reduction,
    ) -> Result<Self, FrameError> {
        if levels.is_empty() {
            return Err(FrameError::InvalidArgument(
                "grouping needs at least one level".to_owned(),
            ));
        }
        let level_values: Vec<Vec<Key>> = levels
            .iter()
            .map(|&level| self.index.level_keys(level))
            .collect::<Result<_, _>>()?;

        let mut groups: BTreeMap<Key, Vec<usize>> = BTreeMap::new();
        for row in 0..self.len() {
            let parts: Vec<Key> = level_values.iter().map(|keys| keys[row].clone()).collect();
            groups.entry(Key::compound(parts)).or_default().push(row);
        }

        let kept: Vec<String> = self
            .order
            .iter()
            .filter(|name| self.columns[*name].kind() != Kind::Text)
            .cloned()
            .collect();
        if kept.is_empty() && !self.order.is_empty() {
            return Err(TypeError::NonNumeric { kind: Kind::Text }.into());
        }

        let names: Vec<Option<String>> = levels
            .iter()
            .map(|&level| self.index.names().get(level).cloned().unwrap_or(None))
            .collect();
        let index = Index::new(groups.keys().cloned().collect()).named(names);

        let mut columns = Vec::with_capacity(kept.len());
        for name in kept {
            let source = &self.columns[&name];
            let mut out = Vec::with_capacity(groups.len());
            for rows in groups.values() {
                let cells: Vec<Value> = rows
                    .iter()
                    .map(|&row| source.values()[row].clone())
                    .collect();
                out.push(trellis_types::reduce(&cells, reduction, true)?);
            }
            columns.push((name, Column::from_values(out)?));
        }
        Self::new(index, columns)
    }

    /// Reduce every applicable column to one value. Text columns are
    /// skipped for numeric reductions; `Count` covers every column.
    pub fn aggregate(
        &self,
        reduction: Reduction,
        skip_missing: bool,
    ) -> Result<Vector, FrameError> {
        let include: Vec<String> = if matches!(reduction, Reduction::Count) {
            self.order.clone()
        } else {
            self.order
                .iter()
                .filter(|name| self.columns[*name].kind() != Kind::Text)
                .cloned()
                .collect()
        };
        if include.is_empty() && !self.order.is_empty() {
            return Err(TypeError::NonNumeric { kind: Kind::Text }.into());
        }
        let mut values = Vec::with_capacity(include.len());
        for name in &include {
            values.push(trellis_types::reduce(
                self.columns[name].values(),
                reduction,
                skip_missing,
            )?);
        }
        let keys = include.into_iter().map(Key::Text).collect();
        Vector::from_values(None, keys, values)
    }

    /// Present-cell count per column, over every column.
    pub fn count(&self) -> Result<Vector, FrameError> {
        let values: Vec<Value> = self
            .order
            .iter()
            .map(|name| Value::Int(self.columns[name].count_present() as i64))
            .collect();
        let keys = self.order.iter().cloned().map(Key::Text).collect();
        Vector::from_values(Some("count"), keys, values)
    }

    /// Summary statistics per column.
    ///
    /// With at least one numeric column the summary covers the numeric
    /// columns: count, mean, std, min, quartiles, max. A table of only
    /// text columns gets the categorical summary instead (count, unique,
    /// top, freq).
    pub fn describe(&self) -> Result<Self, FrameError> {
        let numeric: Vec<String> = self
            .order
            .iter()
            .filter(|name| self.columns[*name].kind() != Kind::Text)
            .cloned()
            .collect();

        if !numeric.is_empty() {
            let stats = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
            let index = Index::from_text(stats.iter().map(|s| (*s).to_owned()).collect());
            let mut columns = Vec::with_capacity(numeric.len());
            for name in numeric {
                let source = &self.columns[&name];
                let cells = source.values();
                let out = vec![
                    Value::Float(source.count_present() as f64),
                    trellis_types::reduce(cells, Reduction::Mean, true)?,
                    trellis_types::reduce(cells, Reduction::Std, true)?,
                    trellis_types::reduce(cells, Reduction::Min, true)?,
                    trellis_types::quantile(cells, 0.25, true)?,
                    trellis_types::quantile(cells, 0.50, true)?,
                    trellis_types::quantile(cells, 0.75, true)?,
                    trellis_types::reduce(cells, Reduction::Max, true)?,
                ];
                columns.push((name, Column::from_values(out)?));
            }
            return Self::new(index, columns);
        }

        let stats = ["count", "unique", "top", "freq"];
        let index = Index::from_text(stats.iter().map(|s| (*s).to_owned()).collect());
        let mut columns = Vec::with_capacity(self.width());
        for name in &self.order {
            let source = &self.columns[name];
            let (top, freq) = most_frequent(source.values());
            let out = vec![
                Value::Int(source.count_present() as i64),
                Value::Int(distinct_present(source.values()) as i64),
                top,
                freq,
            ];
            columns.push((name.clone(), Column::from_values_promoted(out)));
        }
        Self::new(index, columns)
    }

    /// Swap rows and columns. Row keys become column names; each former
    /// row becomes a column promoted to the most general common kind.
    /// Requires unique row labels.
    pub fn transpose(&self) -> Result<Self, FrameError> {
        self.index.require_unique("transpose")?;
        let index = Index::from_text(self.order.clone());
        let mut columns = Vec::with_capacity(self.len());
        for (row, key) in self.index.keys().iter().enumerate() {
            let name = key.to_string();
            let cells: Vec<Value> = self
                .order
                .iter()
                .map(|column| self.columns[column].values()[row].clone())
                .collect();
            columns.push((name, Column::from_values_promoted(cells)));
        }
        Self::new(index, columns)
    }

    /// Pairwise Pearson correlation matrix of the numeric columns,
    /// computed over mutually present rows per pair.
    pub fn corr(&self) -> Result<Self, FrameError> {
        let numeric: Vec<String> = self
            .order
            .iter()
            .filter(|name| self.columns[*name].kind() != Kind::Text)
            .cloned()
            .collect();
        let index = Index::from_text(numeric.clone());
        let mut columns = Vec::with_capacity(numeric.len());
        for right in &numeric {
            let mut out = Vec::with_capacity(numeric.len());
            for left in &numeric {
                out.push(pearson(&self.columns[left], &self.columns[right])?);
            }
            columns.push((right.clone(), Column::from_values(out)?));
        }
        Self::new(index, columns)
    }

    pub fn fill_missing(&self, fill: &Value) -> Result<Self, FrameError> {
        let columns = self
            .order
            .iter()
            .map(|name| Ok((name.clone(), self.columns[name].fill_missing(fill)?)))
            .collect::<Result<Vec<_>, FrameError>>()?;
        Self::with_shared_index(Arc::clone(&self.index), columns)
    }

    #[must_use]
    pub fn drop_missing(&self, how: DropMissing) -> Self {
        if self.order.is_empty() {
            return self.clone();
        }
        let positions: Vec<usize> = (0..self.len())
            .filter(|&row| {
                let missing = self
                    .order
                    .iter()
                    .filter(|name| self.columns[*name].values()[row].is_missing())
                    .count();
                match how {
                    DropMissing::Any => missing == 0,
                    DropMissing::All => missing < self.width(),
                }
            })
            .collect();
        self.subset_by_positions(&positions)
    }

    /// Promote a column to the row index. Its values become the labels
    /// (and may repeat); missing cells cannot label a row.
    pub fn set_index(&self, column: &str, keep_column: bool) -> Result<Self, FrameError> {
        let source = self.column_ref(column)?;
        let keys = source
            .values()
            .iter()
            .map(value_to_key)
            .collect::<Result<Vec<_>, _>>()?;
        let index = Index::new(keys).named(vec![Some(column.to_owned())]);
        let order: Vec<String> = self
            .order
            .iter()
            .filter(|name| keep_column || name.as_str() != column)
            .cloned()
            .collect();
        let columns = order
            .iter()
            .map(|name| (name.clone(), self.columns[name].clone()))
            .collect();
        Self::new(index, columns)
    }

    /// Demote the index levels to leading columns and relabel the rows
    /// with the default integer index.
    pub fn reset_index(&self) -> Result<Self, FrameError> {
        let arity = self.index.arity();
        let mut columns = Vec::with_capacity(arity + self.width());
        for level in 0..arity {
            let name = self
                .index
                .names()
                .get(level)
                .cloned()
                .flatten()
                .unwrap_or_else(|| {
                    if arity == 1 {
                        "index".to_owned()
                    } else {
                        format!("level_{level}")
                    }
                });
            if self.columns.contains_key(&name) {
                return Err(FrameError::DuplicateColumn { name });
            }
            let values: Vec<Value> = self
                .index
                .level_keys(level)?
                .into_iter()
                .map(key_to_value)
                .collect();
            columns.push((name, Column::from_values(values)?));
        }
        for name in &self.order {
            columns.push((name.clone(), self.columns[name].clone()));
        }
        let index = Index::from_range(0, self.len() as i64, 1);
        Self::new(index, columns)
    }

    /// Cell-wise equality treating missing as equal to missing.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.order == other.order
            && *self.index == *other.index
            && self
                .order
                .iter()
                .all(|name| self.columns[name].same_as(&other.columns[name]))
    }
}

/// Position of each target label in `source`, with holes resolved
/// against the source labels in key order: forward fill takes the
/// nearest preceding source label, backward fill the nearest following
/// one. A source label absent from the target still contributes.
fn fill_positions(source: &Index, target: &Index, method: FillMethod) -> Vec<Option<usize>> {
    let mut positions = source.indexer_first(target);
    if matches!(method, FillMethod::None) {
        return positions;
    }
    let order = source.sorted_order();
    let keys = source.keys();
    for (label, slot) in target.keys().iter().zip(positions.iter_mut()) {
        if slot.is_some() {
            continue;
        }
        let cut = order.partition_point(|&p| keys[p] < *label);
        *slot = match method {
            FillMethod::Forward => cut.checked_sub(1).map(|i| order[i]),
            _ => order.get(cut).copied(),
        };
    }
    positions
}

fn key_to_value(key: Key) -> Value {
    match key {
        Key::Int(v) => Value::Int(v),
        Key::Text(v) => Value::Text(v),
        compound @ Key::Compound(_) => Value::Text(compound.to_string()),
    }
}

/// Most frequent present value and its count; ties break on first
/// appearance. All-missing input yields a missing pair.
fn most_frequent(values: &[Value]) -> (Value, Value) {
    let mut tally: Vec<(&Value, i64)> = Vec::new();
    for value in values {
        if value.is_missing() {
            continue;
        }
        match tally.iter_mut().find(|(seen, _)| seen.same_as(value)) {
            Some(entry) => entry.1 += 1,
            None => tally.push((value, 1)),
        }
    }
    let mut best: Option<(&Value, i64)> = None;
    for (value, count) in &tally {
        if best.map_or(true, |(_, top)| *count > top) {
            best = Some((value, *count));
        }
    }
    match best {
        Some((value, count)) => (value.clone(), Value::Int(count)),
        None => (Value::Missing, Value::Missing),
    }
}

fn distinct_present(values: &[Value]) -> usize {
    let mut seen: Vec<&Value> = Vec::new();
    for value in values {
        if value.is_missing() {
            continue;
        }
        if !seen.iter().any(|v| v.same_as(value)) {
            seen.push(value);
        }
    }
    seen.len()
}

/// Pearson correlation of two equal-length columns over mutually present
/// cells.
fn pearson(left: &Column, right: &Column) -> Result<Value, FrameError> {
    let mut pairs = Vec::new();
    for (a, b) in left.values().iter().zip(right.values().iter()) {
        if a.is_missing() || b.is_missing() {
            continue;
        }
        pairs.push((a.as_float()?, b.as_float()?));
    }
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

#[cfg(test)]
mod tests {
    use super::{ColumnAssignment, DropMissing, RowSelection, Table};
    use crate::{Axis, FillMethod, FrameError, SortKey, Vector};
    use trellis_index::{Index, Key};
    use trellis_types::{Kind, Reduction, Value};

    fn key(s: &str) -> Key {
        Key::from(s)
    }

    fn microbiome() -> Table {
        let index = Index::from_text(vec![
            "Firmicutes".to_owned(),
            "Proteobacteria".to_owned(),
            "Actinobacteria".to_owned(),
            "Bacteroidetes".to_owned(),
        ]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "counts",
                ColumnAssignment::Values(vec![
                    Value::Int(632),
                    Value::Int(1638),
                    Value::Int(569),
                    Value::Int(115),
                ]),
            )
            .unwrap();
        table
            .set_column(
                "site",
                ColumnAssignment::Values(vec![
                    Value::Text("gut".into()),
                    Value::Text("gut".into()),
                    Value::Text("skin".into()),
                    Value::Text("gut".into()),
                ]),
            )
            .unwrap();
        table
    }

    #[test]
    fn construction_rejects_ragged_columns() {
        let index = Index::from_ints(vec![0, 1]);
        let column = trellis_column::Column::from_values(vec![Value::Int(1)]).unwrap();
        let err = Table::new(index, vec![("a".to_owned(), column)]).expect_err("ragged");
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn column_order_follows_insertion() {
        let table = microbiome();
        assert_eq!(table.column_names(), &["counts".to_owned(), "site".to_owned()]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn from_vectors_aligns_on_the_sorted_union() {
        let a = Vector::from_values(
            Some("a"),
            vec![key("x"), key("y")],
            vec![Value::Int(1), Value::Int(2)],
        )
        .unwrap();
        let b = Vector::from_values(
            Some("b"),
            vec![key("y"), key("z")],
            vec![Value::Int(10), Value::Int(20)],
        )
        .unwrap();
        let table = Table::from_vectors(vec![a, b]).unwrap();
        assert_eq!(table.index().keys(), &[key("x"), key("y"), key("z")]);
        assert!(table.column("a").unwrap().values()[2].is_missing());
        assert!(table.column("b").unwrap().values()[0].is_missing());
    }

    #[test]
    fn from_vectors_requires_names() {
        let anonymous = Vector::from_values(None, vec![key("x")], vec![Value::Int(1)]).unwrap();
        assert!(matches!(
            Table::from_vectors(vec![anonymous]),
            Err(FrameError::InvalidArgument(_))
        ));
    }

    #[test]
    fn from_records_fills_absent_fields() {
        let table = Table::from_records(vec![
            vec![("a".to_owned(), Value::Int(1)), ("b".to_owned(), Value::Int(2))],
            vec![("a".to_owned(), Value::Int(3))],
        ])
        .unwrap();
        assert_eq!(table.column_names(), &["a".to_owned(), "b".to_owned()]);
        assert!(table.column("b").unwrap().values()[1].is_missing());
        assert_eq!(table.index().keys(), &[Key::Int(0), Key::Int(1)]);
    }

    #[test]
    fn value_assignment_must_match_row_count() {
        let mut table = microbiome();
        let err = table
            .set_column("bad", ColumnAssignment::Values(vec![Value::Int(1)]))
            .expect_err("short");
        assert_eq!(
            err,
            FrameError::LengthMismatch {
                expected: 4,
                actual: 1
            }
        );
    }

    #[test]
    fn aligned_assignment_introduces_missing_for_uncovered_rows() {
        let mut table = microbiome();
        let partial = Vector::from_values(
            Some("year"),
            vec![key("Proteobacteria"), key("Euryarchaeota")],
            vec![Value::Int(2013), Value::Int(2014)],
        )
        .unwrap();
        table
            .set_column("year", ColumnAssignment::Aligned(partial))
            .unwrap();
        let year = table.column("year").unwrap();
        assert!(year.values()[0].is_missing());
        assert_eq!(year.values()[1], Value::Int(2013));
        // the label unknown to the table is dropped
        assert_eq!(year.len(), 4);
    }

    #[test]
    fn scalar_assignment_broadcasts() {
        let mut table = microbiome();
        table
            .set_column("flag", ColumnAssignment::Scalar(Value::Bool(true)))
            .unwrap();
        assert_eq!(table.column("flag").unwrap().values().len(), 4);
        assert_eq!(table.column("flag").unwrap().kind(), Kind::Bool);
    }

    #[test]
    fn replacing_a_column_keeps_its_position() {
        let mut table = microbiome();
        table
            .set_column("counts", ColumnAssignment::Scalar(Value::Int(0)))
            .unwrap();
        assert_eq!(table.column_names()[0], "counts");
    }

    #[test]
    fn views_alias_and_copies_detach() {
        let mut table = microbiome();
        let copy = table.vector("counts").unwrap();

        let mut view = table.column_mut("counts").unwrap();
        view.set(&key("Firmicutes"), Value::Int(700)).unwrap();

        // the table storage changed under the view
        assert_eq!(
            table.column("counts").unwrap().get(&key("Firmicutes")).unwrap(),
            &Value::Int(700)
        );
        // the earlier owned copy did not
        assert_eq!(copy.get_at(0).unwrap(), Value::Int(632));
    }

    #[test]
    fn unique_row_label_yields_a_promoted_record() {
        let table = microbiome();
        match table.row(&key("Actinobacteria")).unwrap() {
            RowSelection::Record(record) => {
                assert_eq!(record.name(), Some("Actinobacteria"));
                assert_eq!(record.index().keys(), &[key("counts"), key("site")]);
                // int and text cells share one promoted text column
                assert_eq!(record.kind(), Kind::Text);
                assert_eq!(record.values()[0], Value::Text("569".into()));
                assert_eq!(record.values()[1], Value::Text("skin".into()));
            }
            RowSelection::Rows(_) => panic!("expected a record"),
        }
    }

    #[test]
    fn repeated_row_label_yields_a_sub_table() {
        let index = Index::from_text(vec!["a".to_owned(), "b".to_owned(), "a".to_owned()]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            )
            .unwrap();
        match table.row(&key("a")).unwrap() {
            RowSelection::Rows(sub) => {
                assert_eq!(sub.len(), 2);
                assert_eq!(
                    sub.column("v").unwrap().values(),
                    &[Value::Int(1), Value::Int(3)]
                );
            }
            RowSelection::Record(_) => panic!("expected a sub-table"),
        }
    }

    #[test]
    fn partial_key_on_hierarchical_rows_drops_matched_levels() {
        let index = Index::from_tuples(vec![
            vec![key("gut"), key("Firmicutes")],
            vec![key("gut"), key("Proteobacteria")],
            vec![key("skin"), key("Actinobacteria")],
        ]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "counts",
                ColumnAssignment::Values(vec![Value::Int(632), Value::Int(1638), Value::Int(569)]),
            )
            .unwrap();
        match table.row(&key("gut")).unwrap() {
            RowSelection::Rows(sub) => {
                assert_eq!(sub.index().keys(), &[key("Firmicutes"), key("Proteobacteria")]);
            }
            RowSelection::Record(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn filtering_rows_with_a_comparison_mask() {
        let table = microbiome();
        let mask = table.vector("counts").unwrap().gt(&Value::Int(1000)).unwrap();
        let big = table.filter_rows(&mask).unwrap();
        assert_eq!(big.index().keys(), &[key("Proteobacteria")]);
        assert_eq!(big.column("counts").unwrap().values(), &[Value::Int(1638)]);
    }

    #[test]
    fn drop_then_insert_restores_the_row() {
        let table = microbiome();
        let dropped = table.drop_rows(&[key("Proteobacteria")]).unwrap();
        assert_eq!(dropped.len(), 3);
        assert!(table.drop_rows(&[key("Euryarchaeota")]).is_err());

        let back = dropped
            .insert_row(
                key("Proteobacteria"),
                &[
                    ("counts".to_owned(), Value::Int(1638)),
                    ("site".to_owned(), Value::Text("gut".into())),
                ],
            )
            .unwrap();
        assert_eq!(back.len(), 4);
        match back.row(&key("Proteobacteria")).unwrap() {
            RowSelection::Record(record) => {
                assert_eq!(record.values()[0], Value::Text("1638".into()));
            }
            RowSelection::Rows(_) => panic!("expected one row back"),
        }
    }

    #[test]
    fn insert_row_leaves_unnamed_columns_missing() {
        let table = microbiome();
        let grown = table
            .insert_row(key("Euryarchaeota"), &[("counts".to_owned(), Value::Int(88))])
            .unwrap();
        assert!(grown.column("site").unwrap().values()[4].is_missing());
        assert!(table
            .insert_row(key("x"), &[("nope".to_owned(), Value::Int(1))])
            .is_err());
    }

    #[test]
    fn reindex_rows_with_forward_fill() {
        let index = Index::from_ints(vec![10, 20, 30]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            )
            .unwrap();

        let target = Index::from_ints(vec![10, 15, 20, 25, 35]);
        let filled = table
            .reindex(&target, Axis::Rows, FillMethod::Forward, None)
            .unwrap();
        assert_eq!(
            filled.column("v").unwrap().values(),
            &[
                Value::Int(1),
                Value::Int(1),
                Value::Int(2),
                Value::Int(2),
                Value::Int(3)
            ]
        );

        let holes = table
            .reindex(&target, Axis::Rows, FillMethod::None, None)
            .unwrap();
        assert!(holes.column("v").unwrap().values()[1].is_missing());

        let plugged = table
            .reindex(&target, Axis::Rows, FillMethod::None, Some(&Value::Int(0)))
            .unwrap();
        assert_eq!(plugged.column("v").unwrap().values()[1], Value::Int(0));
    }

    #[test]
    fn reindex_rows_with_backward_fill() {
        let index = Index::from_ints(vec![10, 20, 30]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            )
            .unwrap();

        // 5 and 25 pull from source labels 10 and 30, neither of which
        // appears in the target; 35 has no following source label.
        let target = Index::from_ints(vec![5, 15, 25, 35]);
        let filled = table
            .reindex(&target, Axis::Rows, FillMethod::Backward, None)
            .unwrap();
        assert_eq!(
            filled.column("v").unwrap().values(),
            &[Value::Int(1), Value::Int(2), Value::Int(3), Value::Missing]
        );
    }

    #[test]
    fn reindex_requires_a_unique_source_index() {
        let index = Index::from_ints(vec![1, 1]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Int(2)]),
            )
            .unwrap();
        let target = Index::from_ints(vec![1, 2]);
        assert!(matches!(
            table.reindex(&target, Axis::Rows, FillMethod::None, None),
            Err(FrameError::Index(_))
        ));
    }

    #[test]
    fn reindex_columns_adds_and_reorders() {
        let table = microbiome();
        let target = Index::from_text(vec!["site".to_owned(), "counts".to_owned(), "year".to_owned()]);
        let out = table
            .reindex(&target, Axis::Columns, FillMethod::None, None)
            .unwrap();
        assert_eq!(
            out.column_names(),
            &["site".to_owned(), "counts".to_owned(), "year".to_owned()]
        );
        assert!(out.column("year").unwrap().values()[0].is_missing());
    }

    #[test]
    fn sort_is_stable_and_keeps_missing_last() {
        let index = Index::from_ints(vec![0, 1, 2, 3]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "grp",
                ColumnAssignment::Values(vec![
                    Value::Text("b".into()),
                    Value::Text("a".into()),
                    Value::Text("b".into()),
                    Value::Text("a".into()),
                ]),
            )
            .unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![
                    Value::Int(2),
                    Value::Missing,
                    Value::Int(1),
                    Value::Int(9),
                ]),
            )
            .unwrap();

        let sorted = table
            .sort(&[SortKey::ascending("grp"), SortKey::descending("v")])
            .unwrap();
        assert_eq!(
            sorted.index().keys(),
            &[Key::Int(3), Key::Int(1), Key::Int(0), Key::Int(2)]
        );
    }

    #[test]
    fn group_reduce_sums_within_each_level_key() {
        let index = Index::from_tuples(vec![
            vec![key("gut"), key("Firmicutes")],
            vec![key("gut"), key("Proteobacteria")],
            vec![key("skin"), key("Actinobacteria")],
            vec![key("skin"), key("Firmicutes")],
        ])
        .named(vec![Some("site".to_owned()), Some("phylum".to_owned())]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "counts",
                ColumnAssignment::Values(vec![
                    Value::Int(632),
                    Value::Int(1638),
                    Value::Int(569),
                    Value::Int(115),
                ]),
            )
            .unwrap();

        let grouped = table.group_reduce(&[0], Reduction::Sum).unwrap();
        assert_eq!(grouped.index().keys(), &[key("gut"), key("skin")]);
        assert_eq!(grouped.index().names(), &[Some("site".to_owned())]);
        assert_eq!(
            grouped.column("counts").unwrap().values(),
            &[Value::Float(2270.0), Value::Float(684.0)]
        );
    }

    #[test]
    fn aggregate_skips_text_columns() {
        let table = microbiome();
        let sums = table.aggregate(Reduction::Sum, true).unwrap();
        assert_eq!(sums.index().keys(), &[key("counts")]);
        assert_eq!(sums.values(), &[Value::Float(2954.0)]);

        let counts = table.aggregate(Reduction::Count, true).unwrap();
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn aggregate_on_all_text_columns_fails() {
        let index = Index::from_ints(vec![0]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column("t", ColumnAssignment::Values(vec![Value::Text("x".into())]))
            .unwrap();
        assert!(matches!(
            table.aggregate(Reduction::Mean, true),
            Err(FrameError::Type(_))
        ));
    }

    #[test]
    fn describe_orders_the_quartiles() {
        let table = microbiome();
        let summary = table.describe().unwrap();
        assert_eq!(summary.column_names(), &["counts".to_owned()]);
        let stats = summary.column("counts").unwrap();
        assert_eq!(stats.get(&key("count")).unwrap(), &Value::Float(4.0));
        assert_eq!(stats.get(&key("mean")).unwrap(), &Value::Float(738.5));
        assert_eq!(stats.get(&key("50%")).unwrap(), &Value::Float(600.5));

        let quartiles: Vec<f64> = ["min", "25%", "50%", "75%", "max"]
            .iter()
            .map(|stat| match stats.get(&key(stat)).unwrap() {
                Value::Float(v) => *v,
                other => panic!("expected float, got {other:?}"),
            })
            .collect();
        assert!(quartiles.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn describe_of_text_columns_is_categorical() {
        let index = Index::from_ints(vec![0, 1, 2]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "site",
                ColumnAssignment::Values(vec![
                    Value::Text("gut".into()),
                    Value::Text("gut".into()),
                    Value::Text("skin".into()),
                ]),
            )
            .unwrap();
        let summary = table.describe().unwrap();
        let stats = summary.column("site").unwrap();
        assert_eq!(stats.get(&key("top")).unwrap(), &Value::Text("gut".into()));
        assert_eq!(stats.get(&key("unique")).unwrap(), &Value::Text("2".into()));
    }

    #[test]
    fn transpose_promotes_mixed_rows_to_text() {
        let table = microbiome();
        let flipped = table.transpose().unwrap();
        assert_eq!(flipped.len(), 2);
        assert_eq!(flipped.width(), 4);
        assert_eq!(flipped.index().keys(), &[key("counts"), key("site")]);
        let col = flipped.column("Firmicutes").unwrap();
        assert_eq!(col.kind(), Kind::Text);
        assert_eq!(col.values()[0], Value::Text("632".into()));
    }

    #[test]
    fn transpose_requires_unique_row_labels() {
        let index = Index::from_ints(vec![1, 1]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Int(2)]),
            )
            .unwrap();
        assert!(table.transpose().is_err());
    }

    #[test]
    fn correlation_matrix_has_a_unit_diagonal() {
        let index = Index::from_ints(vec![0, 1, 2]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "x",
                ColumnAssignment::Values(vec![
                    Value::Float(1.0),
                    Value::Float(2.0),
                    Value::Float(3.0),
                ]),
            )
            .unwrap();
        table
            .set_column(
                "y",
                ColumnAssignment::Values(vec![
                    Value::Float(6.0),
                    Value::Float(4.0),
                    Value::Float(2.0),
                ]),
            )
            .unwrap();
        let matrix = table.corr().unwrap();
        match matrix.column("x").unwrap().get(&key("x")).unwrap() {
            Value::Float(v) => assert!((v - 1.0).abs() < 1e-12),
            other => panic!("expected float, got {other:?}"),
        }
        match matrix.column("y").unwrap().get(&key("x")).unwrap() {
            Value::Float(v) => assert!((v + 1.0).abs() < 1e-12),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn drop_missing_any_versus_all() {
        let index = Index::from_ints(vec![0, 1, 2]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "a",
                ColumnAssignment::Values(vec![Value::Int(1), Value::Missing, Value::Missing]),
            )
            .unwrap();
        table
            .set_column(
                "b",
                ColumnAssignment::Values(vec![Value::Int(4), Value::Int(5), Value::Missing]),
            )
            .unwrap();
        assert_eq!(table.drop_missing(DropMissing::Any).len(), 1);
        assert_eq!(table.drop_missing(DropMissing::All).len(), 2);
    }

    #[test]
    fn set_index_and_reset_index_round_trip() {
        let table = microbiome();
        let by_site = table.set_index("site", false).unwrap();
        assert!(!by_site.index().is_unique());
        assert_eq!(by_site.column_names(), &["counts".to_owned()]);
        assert_eq!(by_site.index().names(), &[Some("site".to_owned())]);

        let back = by_site.reset_index().unwrap();
        assert_eq!(back.column_names(), &["site".to_owned(), "counts".to_owned()]);
        assert_eq!(back.index().keys()[0], Key::Int(0));
    }

    #[test]
    fn label_range_and_positional_windows() {
        let index = Index::from_ints(vec![10, 20, 30, 40]);
        let mut table = Table::new(index, Vec::new()).unwrap();
        table
            .set_column(
                "v",
                ColumnAssignment::Values(vec![
                    Value::Int(1),
                    Value::Int(2),
                    Value::Int(3),
                    Value::Int(4),
                ]),
            )
            .unwrap();
        let middle = table.rows_range(&Key::Int(20), &Key::Int(30)).unwrap();
        assert_eq!(middle.len(), 2);
        assert_eq!(table.head(2).len(), 2);
        assert_eq!(table.tail(-3).len(), 1);
        assert_eq!(
            table.rows_at(&[-1, 0]).unwrap().index().keys(),
            &[Key::Int(40), Key::Int(10)]
        );
    }

    #[test]
    fn rename_rejects_collisions() {
        let table = microbiome();
        let renamed = table.rename_columns(&[("counts", "abundance")]).unwrap();
        assert_eq!(
            renamed.column_names(),
            &["abundance".to_owned(), "site".to_owned()]
        );
        assert!(table.rename_columns(&[("counts", "site")]).is_err());
        assert!(table.rename_columns(&[("nope", "x")]).is_err());
    }
}
