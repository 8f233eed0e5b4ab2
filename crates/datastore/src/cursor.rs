//! Lazy cursors over query results.
//!
//! A query goes through two steps, like rusqlite itself: [crate::RecordStore::find_by_equality] prepares a
//! [FindStatement], and [FindStatement::cursor] starts reading it.  The cursor pulls one row per
//! [ResultCursor::advance] and decodes it positionally against the table's fields.
//!
//! Cursors are forward-only and can't be restarted.  Once a cursor reports exhaustion (or is closed) it has released
//! the statement, and advancing it again is an error.
use std::marker::PhantomData;
use std::sync::Arc;

use crate::descriptor::TableDefinition;
use crate::errors::*;
use crate::record::Record;
use crate::types::{storage_to_native, FieldValue, StorageValue};

/// A prepared select, with its parameters.
pub struct FindStatement<'conn> {
    statement: rusqlite::CachedStatement<'conn>,
    params: Vec<StorageValue>,
    table: Arc<TableDefinition>,
}

pub struct ResultCursor<'stmt> {
    /// `None` once closed.
    rows: Option<rusqlite::Rows<'stmt>>,
    table: Arc<TableDefinition>,
}

impl<'conn> FindStatement<'conn> {
    pub(crate) fn new(
        statement: rusqlite::CachedStatement<'conn>,
        params: Vec<StorageValue>,
        table: Arc<TableDefinition>,
    ) -> Self {
        Self {
            statement,
            params,
            table,
        }
    }

    pub fn get_table(&self) -> &TableDefinition {
        &self.table
    }

    /// Run the query, returning a cursor over its rows.
    pub fn cursor(&mut self) -> Result<ResultCursor<'_>> {
        let rows = self
            .statement
            .query(rusqlite::params_from_iter(self.params.iter()))?;
        Ok(ResultCursor {
            rows: Some(rows),
            table: self.table.clone(),
        })
    }
}

/// Decode a raw row: column `i` is field `i`.
fn decode_row(table: &TableDefinition, row: &rusqlite::Row) -> Result<Vec<FieldValue>> {
    table
        .iter_fields()
        .enumerate()
        .map(|(i, field)| {
            let raw = StorageValue::try_from(row.get_ref(i)?)?;
            storage_to_native(raw, field.get_type_tag(), field.is_optional())
        })
        .collect()
}

impl<'stmt> ResultCursor<'stmt> {
    /// Pull the next row.
    ///
    /// Returns `Ok(None)` exactly once, when the rows run out, closing the cursor.  A row which fails to decode is an
    /// error for that row only; storage errors close the cursor.
    pub fn advance(&mut self) -> Result<Option<Vec<FieldValue>>> {
        let table = &self.table;
        let next = match self.rows.as_mut() {
            Some(rows) => rows.next().map(|r| r.map(|row| decode_row(table, row))),
            None => return Err(Error::CursorClosed),
        };

        match next {
            Ok(Some(decoded)) => decoded.map(Some),
            Ok(None) => {
                self.rows = None;
                Ok(None)
            }
            Err(e) => {
                self.rows = None;
                Err(e.into())
            }
        }
    }

    pub fn close(&mut self) {
        self.rows = None;
    }

    pub fn is_closed(&self) -> bool {
        self.rows.is_none()
    }
}

impl<'stmt> Iterator for ResultCursor<'stmt> {
    type Item = Result<Vec<FieldValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.advance().transpose()
    }
}

/// A [FindStatement] whose rows decode to `R`.
pub struct RecordQuery<'conn, R> {
    statement: FindStatement<'conn>,
    _record: PhantomData<fn() -> R>,
}

pub struct RecordCursor<'stmt, R> {
    cursor: ResultCursor<'stmt>,
    _record: PhantomData<fn() -> R>,
}

impl<'conn, R: Record> RecordQuery<'conn, R> {
    pub(crate) fn new(statement: FindStatement<'conn>) -> Self {
        Self {
            statement,
            _record: PhantomData,
        }
    }

    pub fn cursor(&mut self) -> Result<RecordCursor<'_, R>> {
        Ok(RecordCursor {
            cursor: self.statement.cursor()?,
            _record: PhantomData,
        })
    }

    /// Run the query and read every row.
    pub fn fetch_all(&mut self) -> Result<Vec<R>> {
        self.cursor()?.collect()
    }
}

impl<'stmt, R: Record> RecordCursor<'stmt, R> {
    pub fn advance(&mut self) -> Result<Option<R>> {
        self.cursor
            .advance()?
            .map(R::from_field_values)
            .transpose()
    }

    pub fn close(&mut self) {
        self.cursor.close();
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }
}

impl<'stmt, R: Record> Iterator for RecordCursor<'stmt, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.advance().transpose()
    }
}
