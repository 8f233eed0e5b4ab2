//! The datastore crate.
//!
//! This crate maps typed records onto tables in an sqlite database.  The pieces, leaf-first:
//!
//! - [types]: coercion between declared field types, native values, and what sqlite stores.
//! - [descriptor]: table definitions, a builder for them, and the registry which owns them.
//! - [statements]: generation of `CREATE TABLE`, upsert, and select sql from a table definition.
//! - [RecordStore]: owns the connection; creates tables, saves rows, runs queries, commits.
//! - [cursor]: lazy, forward-only decoding of query results.
//! - [Record]: the trait record types implement to get `save` and `find_by_equality`.
//!
//! Everything is synchronous and single-threaded.  Writes are never committed implicitly: the caller decides where the
//! commit boundaries are, and anything not committed is lost if the process goes away, which is fine for a cache that
//! can be rebuilt from its source.
mod errors;

pub mod cursor;
pub mod descriptor;
pub mod record;
pub mod statements;
mod store;
pub mod types;

pub use cursor::*;
pub use descriptor::*;
pub use errors::{Error, Result};
pub use record::*;
pub use statements::{
    create_table_statement, select_equals_statement, upsert_statement, Filter,
};
pub use store::*;
pub use types::{DeclaredType, FieldValue, StorageKind, StorageValue, TypeTag};
