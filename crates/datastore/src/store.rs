//! The record store wraps a rusqlite connection and the registry of tables stored in it.
use std::path::Path;
use std::sync::Arc;

use log::*;

use crate::cursor::{FindStatement, RecordQuery};
use crate::descriptor::{FieldDescriptor, TableBuilder, TableDefinition, TableRegistry};
use crate::errors::*;
use crate::record::Record;
use crate::statements::{build_select_equals, build_upsert, create_table_statement, Binding, Filter};
use crate::types::FieldValue;

/// Owns the one connection the process uses.
///
/// Writes don't commit: they open a transaction if there isn't one, and stay pending until [RecordStore::commit].
/// Dropping the store with pending writes discards them.
///
/// Queries borrow the store and writes need it mutably, so a write can't be issued while a query's cursor is still
/// alive; drain (or drop) cursors before writing.
pub struct RecordStore {
    conn: rusqlite::Connection,
    registry: TableRegistry,
    pending_writes: usize,
}

/// SQL that we run as part of opening a connection.
///
/// - Enables the busy timeout.
/// - Enables foreign key enforcement (though we don't expect foreign keys to be used).
/// - Raises the default cache size.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA cache_size = -100000;
PRAGMA foreign_keys = 1;
"#;

/// Only meaningful for stores backed by a file.
const FILE_SQL: &str = r#"
pragma journal_mode = WAL;
"#;

impl RecordStore {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening record store at {}", path.display());
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(FILE_SQL)?;
        RecordStore::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        RecordStore::with_connection(rusqlite::Connection::open_in_memory()?)
    }

    /// Build a store from an already-existing connection.
    pub fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(INITIAL_SQL)?;
        Ok(RecordStore {
            conn,
            registry: TableRegistry::new(),
            pending_writes: 0,
        })
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TableDefinition>> {
        self.registry.lookup(name)
    }

    /// Register a table and create it if it doesn't exist.
    ///
    /// The table is only registered once its `CREATE TABLE` has succeeded.
    pub fn register_table(
        &mut self,
        name: &str,
        fields: Vec<FieldDescriptor>,
        key_fields: &[&str],
    ) -> Result<Arc<TableDefinition>> {
        if let Ok(existing) = self.registry.lookup(name) {
            debug!("{} is already registered", name);
            return Ok(existing);
        }
        self.create_and_register(TableDefinition::new(name.to_string(), fields, key_fields)?)
    }

    /// Register the table of a record type and create it if it doesn't exist.
    pub fn register<R: Record>(&mut self) -> Result<Arc<TableDefinition>> {
        if let Ok(existing) = self.registry.lookup(R::TABLE_NAME) {
            debug!("{} is already registered", R::TABLE_NAME);
            return Ok(existing);
        }

        let mut builder = TableBuilder::new(R::TABLE_NAME.to_string());
        R::declare(&mut builder)?;
        self.create_and_register(builder.build()?)
    }

    fn create_and_register(&mut self, def: TableDefinition) -> Result<Arc<TableDefinition>> {
        use itertools::Itertools;

        self.execute_ddl(&def)?;
        debug!(
            "Table {} has fields {} and key {}",
            def.get_name(),
            def.iter_fields().map(|f| f.get_name()).join(", "),
            def.iter_key_fields().join(", ")
        );
        self.registry.register_definition(def)
    }

    /// Create the table if it doesn't already exist.
    pub fn execute_ddl(&mut self, def: &TableDefinition) -> Result<()> {
        self.conn.execute_batch(&create_table_statement(def)?)?;
        Ok(())
    }

    /// Insert or update one row, given as values in field order.
    pub fn save(&mut self, def: &TableDefinition, values: &[FieldValue]) -> Result<()> {
        // Build first: a statement that can't be built shouldn't open a transaction.
        let stmt = build_upsert(def, values, Binding::Numbered)?;

        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }

        self.conn
            .prepare_cached(&stmt.sql)?
            .execute(rusqlite::params_from_iter(stmt.params.iter()))?;
        self.pending_writes += 1;
        Ok(())
    }

    pub fn save_record<R: Record>(&mut self, record: &R) -> Result<()> {
        let def = self.registry.lookup(R::TABLE_NAME)?;
        self.save(&def, &record.field_values())
    }

    /// Prepare the select for rows equal to `filter`.  Nothing is read until a cursor is opened on the result.
    pub fn find_by_equality(&self, def: &Arc<TableDefinition>, filter: &Filter) -> Result<FindStatement<'_>> {
        let stmt = build_select_equals(def, filter, Binding::Numbered)?;
        let prepared = self.conn.prepare_cached(&stmt.sql)?;
        Ok(FindStatement::new(prepared, stmt.params, def.clone()))
    }

    pub fn find_records<R: Record>(&self, filter: &Filter) -> Result<RecordQuery<'_, R>> {
        let def = self.registry.lookup(R::TABLE_NAME)?;
        Ok(RecordQuery::new(self.find_by_equality(&def, filter)?))
    }

    /// Number of writes since the last commit or rollback.
    pub fn pending_writes(&self) -> usize {
        self.pending_writes
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }

        self.conn.execute_batch("COMMIT")?;
        debug!("Committed {} writes", self.pending_writes);
        self.pending_writes = 0;
        Ok(())
    }

    /// Discard everything written since the last commit.
    pub fn rollback(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }

        self.conn.execute_batch("ROLLBACK")?;
        debug!("Rolled back {} writes", self.pending_writes);
        self.pending_writes = 0;
        Ok(())
    }
}
