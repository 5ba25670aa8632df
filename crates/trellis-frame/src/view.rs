//! Borrowed column handles.
//!
//! A [`ColumnView`] aliases table storage: it costs nothing to obtain and
//! reads whatever the table currently holds. [`ColumnViewMut`] writes
//! straight through to the table. Taking an independent copy is a separate,
//! explicit step ([`ColumnView::to_vector`]), so a reader can tell at the
//! type level whether an operation can observe later table mutations.

use std::sync::Arc;

use trellis_column::Column;
use trellis_index::{Index, Key};
use trellis_types::{cast_value, Kind, Value};

use crate::{FrameError, Vector};

/// Read-only handle onto one table column and the shared row index.
#[derive(Debug, Clone, Copy)]
pub struct ColumnView<'a> {
    pub(crate) name: &'a str,
    pub(crate) index: &'a Arc<Index>,
    pub(crate) column: &'a Column,
}

impl<'a> ColumnView<'a> {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name
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

    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        self.column.values()
    }

    #[must_use]
    pub fn index(&self) -> &'a Index {
        self.index
    }

    /// First cell carrying `key`.
    pub fn get(&self, key: &Key) -> Result<&'a Value, FrameError> {
        let position = self.index.lookup(key)?[0];
        Ok(&self.column.values()[position])
    }

    /// Detach an owned vector. The copy shares the row index by reference
    /// but owns its cells; later table mutations do not reach it.
    #[must_use]
    pub fn to_vector(&self) -> Vector {
        Vector::from_parts(
            Some(self.name.to_owned()),
            Arc::clone(self.index),
            self.column.clone(),
        )
    }
}

/// Write-through handle onto one table column.
#[derive(Debug)]
pub struct ColumnViewMut<'a> {
    pub(crate) index: &'a Arc<Index>,
    pub(crate) column: &'a mut Column,
}

impl ColumnViewMut<'_> {
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.column.kind()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.column.len()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        self.column.values()
    }

    /// Overwrite every cell carrying `key`, in the table's own storage.
    /// Widens the column kind when the value does not fit it.
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
        *self.column = Column::from_values(values)?;
        Ok(())
    }

    /// Overwrite one cell by position.
    pub fn set_at(&mut self, position: usize, value: Value) -> Result<(), FrameError> {
        if position >= self.column.len() {
            return Err(FrameError::PositionOutOfBounds {
                position: position as i64,
                len: self.column.len(),
            });
        }
        self.column.set(position, value)?;
        Ok(())
    }

    pub fn fill_missing(&mut self, fill: &Value) -> Result<(), FrameError> {
        *self.column = self.column.fill_missing(fill)?;
        Ok(())
    }
}
