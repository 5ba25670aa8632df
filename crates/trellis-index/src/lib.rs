#![forbid(unsafe_code)]

//! Ordered label indices.
//!
//! An [`Index`] is an immutable, ordered sequence of [`Key`]s with optional
//! per-level names. Keys need not be unique: a lookup on a repeated key
//! returns every matching position. Hierarchical indices are plain indices
//! whose keys are [`Key::Compound`] tuples; a prefix lookup collapses the
//! matched leading levels.
//!
//! All transforming operations return a new `Index`, so one index can be
//! shared by reference across containers without aliasing hazards.

use std::cell::OnceCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A label. Scalar keys are `Int` or `Text`; hierarchical indices use
/// fixed-arity `Compound` tuples.
///
/// The derived ordering (variant first, then value) is the deterministic
/// order used for sorted unions and grouped output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Key {
    Int(i64),
    Text(String),
    Compound(Vec<Key>),
}

impl Key {
    /// Number of levels this key spans.
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Compound(parts) => parts.len(),
            _ => 1,
        }
    }

    /// View the key as a slice of levels.
    #[must_use]
    pub fn levels(&self) -> &[Key] {
        match self {
            Self::Compound(parts) => parts,
            _ => std::slice::from_ref(self),
        }
    }

    /// Build a compound key, unwrapping the degenerate one-level case.
    #[must_use]
    pub fn compound(parts: Vec<Key>) -> Self {
        let mut parts = parts;
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Self::Compound(parts)
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Compound(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum IndexError {
    #[error("key {key} not found in index")]
    KeyNotFound { key: Key },
    #[error("{operation} requires a unique index")]
    NonUnique { operation: String },
    #[error("label-range slicing requires a monotonic index")]
    NotMonotonic,
    #[error("level {level} out of bounds for index of arity {arity}")]
    LevelOutOfBounds { level: usize, arity: usize },
    #[error("alignment plan is internally inconsistent")]
    InvalidAlignmentPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    keys: Vec<Key>,
    names: Vec<Option<String>>,
    #[serde(skip)]
    position_cache: OnceCell<HashMap<Key, Vec<usize>>>,
    #[serde(skip)]
    monotonic_cache: OnceCell<bool>,
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.names == other.names
    }
}

impl Eq for Index {}

impl Index {
    #[must_use]
    pub fn new(keys: Vec<Key>) -> Self {
        let names = vec![None; keys.first().map_or(1, Key::arity)];
        Self {
            keys,
            names,
            position_cache: OnceCell::new(),
            monotonic_cache: OnceCell::new(),
        }
    }

    /// Attach level names, producing a new index.
    #[must_use]
    pub fn named(self, names: Vec<Option<String>>) -> Self {
        Self {
            keys: self.keys,
            names,
            position_cache: OnceCell::new(),
            monotonic_cache: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn from_ints(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(Key::from).collect())
    }

    #[must_use]
    pub fn from_text(values: Vec<String>) -> Self {
        Self::new(values.into_iter().map(Key::from).collect())
    }

    /// Half-open integer range index, the default row labeling for imports.
    #[must_use]
    pub fn from_range(start: i64, stop: i64, step: i64) -> Self {
        let mut keys = Vec::new();
        let mut val = start;
        if step > 0 {
            while val < stop {
                keys.push(Key::Int(val));
                val += step;
            }
        } else if step < 0 {
            while val > stop {
                keys.push(Key::Int(val));
                val += step;
            }
        }
        Self::new(keys)
    }

    /// Hierarchical index from per-row level tuples.
    #[must_use]
    pub fn from_tuples(rows: Vec<Vec<Key>>) -> Self {
        Self::new(rows.into_iter().map(Key::compound).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    #[must_use]
    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }

    /// Arity of the keys (1 for flat indices). Keys are assumed uniform;
    /// the first key decides.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.keys.first().map_or(1, Key::arity)
    }

    fn positions_by_key(&self) -> &HashMap<Key, Vec<usize>> {
        self.position_cache.get_or_init(|| {
            let mut map: HashMap<Key, Vec<usize>> = HashMap::with_capacity(self.keys.len());
            for (pos, key) in self.keys.iter().enumerate() {
                map.entry(key.clone()).or_default().push(pos);
            }
            map
        })
    }

    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.positions_by_key().len() == self.keys.len()
    }

    /// Keys are non-decreasing under the deterministic key order.
    #[must_use]
    pub fn is_monotonic(&self) -> bool {
        *self
            .monotonic_cache
            .get_or_init(|| self.keys.windows(2).all(|w| w[0] <= w[1]))
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.positions_by_key().contains_key(key)
    }

    /// All positions carrying `key`, in order of appearance.
    pub fn lookup(&self, key: &Key) -> Result<&[usize], IndexError> {
        self.positions_by_key()
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| IndexError::KeyNotFound { key: key.clone() })
    }

    /// First position carrying `key`, if any.
    #[must_use]
    pub fn first_position(&self, key: &Key) -> Option<usize> {
        self.positions_by_key()
            .get(key)
            .and_then(|positions| positions.first().copied())
    }

    /// First-match position of every key of `target` in `self`.
    #[must_use]
    pub fn indexer_first(&self, target: &Index) -> Vec<Option<usize>> {
        target
            .keys
            .iter()
            .map(|key| self.first_position(key))
            .collect()
    }

    pub fn require_unique(&self, operation: &str) -> Result<(), IndexError> {
        if self.is_unique() {
            Ok(())
        } else {
            Err(IndexError::NonUnique {
                operation: operation.to_owned(),
            })
        }
    }

    /// Positional range covered by the inclusive label range
    /// `start_key..=stop_key`. Unlike positional slicing, both endpoints
    /// are included when present. Requires a monotonic index.
    pub fn label_range(&self, start_key: &Key, stop_key: &Key) -> Result<Range<usize>, IndexError> {
        if !self.is_monotonic() {
            return Err(IndexError::NotMonotonic);
        }
        let from = self.keys.partition_point(|key| key < start_key);
        let to = self.keys.partition_point(|key| key <= stop_key);
        if from >= to {
            return Ok(from..from);
        }
        Ok(from..to)
    }

    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        let keys = positions.iter().map(|&p| self.keys[p].clone()).collect();
        Self::new(keys).named(self.names.clone())
    }

    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.keys.len());
        let start = range.start.min(end);
        Self::new(self.keys[start..end].to_vec()).named(self.names.clone())
    }

    /// Stable order that sorts the keys ascending.
    #[must_use]
    pub fn sorted_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.keys.len()).collect();
        order.sort_by(|&a, &b| self.keys[a].cmp(&self.keys[b]));
        order
    }

    /// Distinct keys of both indices in sorted order.
    #[must_use]
    pub fn union_sorted(&self, other: &Self) -> Self {
        let keys: BTreeSet<&Key> = self.keys.iter().chain(other.keys.iter()).collect();
        Self::new(keys.into_iter().cloned().collect())
    }

    /// Every key of `level` across the index, for level-wise grouping.
    pub fn level_keys(&self, level: usize) -> Result<Vec<Key>, IndexError> {
        let arity = self.arity();
        if level >= arity {
            return Err(IndexError::LevelOutOfBounds { level, arity });
        }
        Ok(self.keys.iter().map(|key| key.levels()[level].clone()).collect())
    }

    /// Select all rows whose key starts with `prefix`, dropping the matched
    /// leading levels from the surviving keys.
    ///
    /// Returns the residual sub-index and the matched positions. A full-width
    /// prefix is a plain [`lookup`](Self::lookup) and is rejected here.
    pub fn prefix_select(&self, prefix: &Key) -> Result<(Self, Vec<usize>), IndexError> {
        let prefix_levels = prefix.levels();
        let mut residual_keys = Vec::new();
        let mut positions = Vec::new();

        for (pos, key) in self.keys.iter().enumerate() {
            let levels = key.levels();
            if levels.len() <= prefix_levels.len() {
                continue;
            }
            if &levels[..prefix_levels.len()] == prefix_levels {
                residual_keys.push(Key::compound(levels[prefix_levels.len()..].to_vec()));
                positions.push(pos);
            }
        }

        if positions.is_empty() {
            return Err(IndexError::KeyNotFound {
                key: prefix.clone(),
            });
        }

        let residual_names = if self.names.len() > prefix_levels.len() {
            self.names[prefix_levels.len()..].to_vec()
        } else {
            vec![None]
        };
        Ok((Self::new(residual_keys).named(residual_names), positions))
    }
}

/// Result of aligning two indices: the sorted union of their distinct keys
/// plus, for each side, the first-match source position of every union key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignPlan {
    pub union: Index,
    pub left_positions: Vec<Option<usize>>,
    pub right_positions: Vec<Option<usize>>,
}

impl AlignPlan {
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.left_positions.len() != self.union.len()
            || self.right_positions.len() != self.union.len()
        {
            return Err(IndexError::InvalidAlignmentPlan);
        }
        Ok(())
    }
}

/// Union-align two indices for a binary operation.
///
/// The output index is the sorted union of both key sets; keys present on
/// only one side map to `None` on the other, which the column layer turns
/// into missing values.
#[must_use]
pub fn align_sorted(left: &Index, right: &Index) -> AlignPlan {
    let union = left.union_sorted(right);
    let left_positions = left.indexer_first(&union);
    let right_positions = right.indexer_first(&union);
    AlignPlan {
        union,
        left_positions,
        right_positions,
    }
}

#[cfg(test)]
mod tests {
    use super::{align_sorted, Index, IndexError, Key};

    fn key(s: &str) -> Key {
        Key::from(s)
    }

    #[test]
    fn lookup_returns_construction_positions() {
        let index = Index::new(vec![key("a"), key("b"), key("c")]);
        assert_eq!(index.lookup(&key("b")).unwrap(), &[1]);
        assert_eq!(index.lookup(&key("c")).unwrap(), &[2]);
    }

    #[test]
    fn lookup_on_absent_key_fails() {
        let index = Index::from_ints(vec![1, 2, 3]);
        let err = index.lookup(&Key::Int(9)).expect_err("absent");
        assert_eq!(err, IndexError::KeyNotFound { key: Key::Int(9) });
    }

    #[test]
    fn non_unique_lookup_returns_all_matches() {
        let index = Index::new(vec![key("a"), key("b"), key("a")]);
        assert!(!index.is_unique());
        assert_eq!(index.lookup(&key("a")).unwrap(), &[0, 2]);
    }

    #[test]
    fn require_unique_rejects_duplicates() {
        let index = Index::from_ints(vec![1, 1, 2]);
        let err = index.require_unique("reindex").expect_err("dup");
        assert_eq!(
            err,
            IndexError::NonUnique {
                operation: "reindex".to_owned()
            }
        );
    }

    #[test]
    fn label_range_is_inclusive_of_both_endpoints() {
        let index = Index::from_ints(vec![10, 20, 30, 40, 50]);
        let range = index.label_range(&Key::Int(20), &Key::Int(40)).unwrap();
        assert_eq!(range, 1..4);
    }

    #[test]
    fn label_range_tolerates_absent_endpoints() {
        let index = Index::from_ints(vec![10, 20, 40, 50]);
        let range = index.label_range(&Key::Int(15), &Key::Int(45)).unwrap();
        assert_eq!(range, 1..3);
    }

    #[test]
    fn label_range_requires_monotonic_keys() {
        let index = Index::from_ints(vec![30, 10, 20]);
        let err = index
            .label_range(&Key::Int(10), &Key::Int(20))
            .expect_err("unsorted");
        assert_eq!(err, IndexError::NotMonotonic);
    }

    #[test]
    fn monotonic_allows_repeated_keys() {
        let index = Index::from_ints(vec![1, 2, 2, 3]);
        assert!(index.is_monotonic());
        assert_eq!(index.label_range(&Key::Int(2), &Key::Int(2)).unwrap(), 1..3);
    }

    #[test]
    fn union_alignment_is_sorted_and_marks_one_sided_keys() {
        let left = Index::new(vec![key("b"), key("d")]);
        let right = Index::new(vec![key("c"), key("a")]);

        let plan = align_sorted(&left, &right);
        plan.validate().expect("plan is consistent");
        assert_eq!(
            plan.union.keys(),
            &[key("a"), key("b"), key("c"), key("d")]
        );
        assert_eq!(plan.left_positions, vec![None, Some(0), None, Some(1)]);
        assert_eq!(plan.right_positions, vec![Some(1), None, Some(0), None]);
    }

    #[test]
    fn disjoint_alignment_has_no_shared_positions() {
        let left = Index::from_ints(vec![1, 2]);
        let right = Index::from_ints(vec![3, 4]);
        let plan = align_sorted(&left, &right);
        for (l, r) in plan.left_positions.iter().zip(&plan.right_positions) {
            assert!(l.is_none() || r.is_none());
        }
    }

    #[test]
    fn indexer_first_uses_first_match_for_duplicates() {
        let index = Index::new(vec![key("a"), key("a"), key("b")]);
        let target = Index::new(vec![key("a"), key("b"), key("z")]);
        assert_eq!(index.indexer_first(&target), vec![Some(0), Some(2), None]);
    }

    #[test]
    fn from_range_matches_half_open_semantics() {
        let index = Index::from_range(0, 5, 2);
        assert_eq!(index.keys(), &[Key::Int(0), Key::Int(2), Key::Int(4)]);
        assert!(Index::from_range(0, 5, 0).is_empty());
        assert_eq!(Index::from_range(3, 0, -1).len(), 3);
    }

    #[test]
    fn sorted_order_is_stable() {
        let index = Index::from_ints(vec![2, 1, 2, 1]);
        assert_eq!(index.sorted_order(), vec![1, 3, 0, 2]);
    }

    // ── Hierarchical keys ──────────────────────────────────────────────

    fn taxon_index() -> Index {
        Index::from_tuples(vec![
            vec![key("gut"), key("Firmicutes")],
            vec![key("gut"), key("Proteobacteria")],
            vec![key("skin"), key("Firmicutes")],
            vec![key("skin"), key("Actinobacteria")],
        ])
        .named(vec![Some("site".to_owned()), Some("phylum".to_owned())])
    }

    #[test]
    fn prefix_select_drops_matched_levels() {
        let index = taxon_index();
        let (residual, positions) = index.prefix_select(&key("gut")).unwrap();
        assert_eq!(positions, vec![0, 1]);
        assert_eq!(residual.keys(), &[key("Firmicutes"), key("Proteobacteria")]);
        assert_eq!(residual.names(), &[Some("phylum".to_owned())]);
        assert_eq!(residual.arity(), 1);
    }

    #[test]
    fn prefix_select_on_absent_prefix_fails() {
        let index = taxon_index();
        let err = index.prefix_select(&key("soil")).expect_err("absent");
        assert!(matches!(err, IndexError::KeyNotFound { .. }));
    }

    #[test]
    fn level_keys_extracts_one_level() {
        let index = taxon_index();
        let sites = index.level_keys(0).unwrap();
        assert_eq!(sites, vec![key("gut"), key("gut"), key("skin"), key("skin")]);
        let err = index.level_keys(2).expect_err("out of bounds");
        assert_eq!(err, IndexError::LevelOutOfBounds { level: 2, arity: 2 });
    }

    #[test]
    fn compound_unwraps_single_level() {
        assert_eq!(Key::compound(vec![key("x")]), key("x"));
        assert_eq!(
            Key::compound(vec![key("x"), key("y")]).arity(),
            2
        );
    }

    #[test]
    fn take_and_slice_preserve_names() {
        let index = Index::from_ints(vec![10, 20, 30]).named(vec![Some("id".to_owned())]);
        assert_eq!(index.take(&[2, 0]).names(), index.names());
        assert_eq!(index.slice(0..2).names(), index.names());
        assert_eq!(index.slice(1..99).len(), 2);
    }
}
