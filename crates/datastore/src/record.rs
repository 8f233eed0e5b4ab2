//! The [Record] trait: what a type needs to be saved to and loaded from a [RecordStore].
use crate::cursor::RecordQuery;
use crate::descriptor::TableBuilder;
use crate::errors::*;
use crate::statements::Filter;
use crate::store::RecordStore;
use crate::types::FieldValue;

/// A type stored as rows of one table.
///
/// Implementors declare their table once (it is registered with [RecordStore::register]), and convert to and from
/// values in the declared field order.  `save` and `find_by_equality` come for free.
pub trait Record: Sized {
    /// Name of the table, which is also how the store finds the table's definition.
    const TABLE_NAME: &'static str;

    /// Add this record's fields and key fields to the builder.
    fn declare(table: &mut TableBuilder) -> Result<()>;

    /// The values of this record, in field order.
    fn field_values(&self) -> Vec<FieldValue>;

    /// Build a record from values in field order.  See [FieldReader].
    fn from_field_values(values: Vec<FieldValue>) -> Result<Self>;

    fn save(&self, store: &mut RecordStore) -> Result<()> {
        store.save_record(self)
    }

    fn find_by_equality<'s>(store: &'s RecordStore, filter: &Filter) -> Result<RecordQuery<'s, Self>> {
        store.find_records(filter)
    }

    /// The first record matching `filter`, if any.
    fn find_first(store: &RecordStore, filter: &Filter) -> Result<Option<Self>> {
        let mut query = Self::find_by_equality(store, filter)?;
        let mut cursor = query.cursor()?;
        cursor.advance()
    }
}

/// Pulls typed values off the front of a row, for implementing [Record::from_field_values].
pub struct FieldReader {
    table: &'static str,
    position: usize,
    values: std::vec::IntoIter<FieldValue>,
}

macro_rules! reader_methods {
    ($($name:ident, $optional_name:ident, $variant:ident, $t:ty;)*) => {
        $(
            pub fn $name(&mut self) -> Result<$t> {
                match self.next_value()? {
                    FieldValue::$variant(v) => Ok(v),
                    other => self.mismatch(stringify!($variant), &other),
                }
            }

            pub fn $optional_name(&mut self) -> Result<Option<$t>> {
                match self.next_value()? {
                    FieldValue::Absent => Ok(None),
                    FieldValue::$variant(v) => Ok(Some(v)),
                    other => self.mismatch(stringify!($variant), &other),
                }
            }
        )*
    };
}

impl FieldReader {
    pub fn new(table: &'static str, values: Vec<FieldValue>) -> Self {
        Self {
            table,
            position: 0,
            values: values.into_iter(),
        }
    }

    fn next_value(&mut self) -> Result<FieldValue> {
        let v = self.values.next().ok_or_else(|| {
            Error::Schema(format!(
                "{}: row ran out of values at position {}",
                self.table, self.position
            ))
        })?;
        self.position += 1;
        Ok(v)
    }

    fn mismatch<T>(&self, expected: &str, got: &FieldValue) -> Result<T> {
        unsupported!(
            "{}: expected {} at position {}, got {}",
            self.table,
            expected,
            self.position - 1,
            got.kind_name()
        )
    }

    reader_methods! {
        text, optional_text, Text, String;
        integer, optional_integer, Integer, i64;
        real, optional_real, Real, f64;
        boolean, optional_boolean, Boolean, bool;
        timestamp, optional_timestamp, Timestamp, time::PrimitiveDateTime;
    }

    /// Check that every value was consumed.
    pub fn finish(mut self) -> Result<()> {
        if self.values.next().is_some() {
            schema_bail!(
                "{}: row has more values than the {} read",
                self.table,
                self.position
            );
        }
        Ok(())
    }
}
