//! Table definitions and the registry which owns them.
//!
//! A table is an ordered list of fields plus zero or more key fields.  The field order is fixed when the table is
//! built: positional value tuples, generated column lists, and the decoding of query results all use it, so nothing
//! may reorder it afterward.
use std::collections::HashMap;
use std::sync::Arc;

use log::*;

use crate::errors::*;
use crate::types::{resolve_declared_type, DeclaredType, TypeTag};

/// A field of a table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldDescriptor {
    name: String,
    type_tag: TypeTag,
    optional: bool,
}

/// Description of a table.
#[derive(Debug, Eq, PartialEq)]
pub struct TableDefinition {
    name: String,
    fields: Vec<FieldDescriptor>,
    /// Names of the key fields, in field order.
    key_fields: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: String, type_tag: TypeTag, optional: bool) -> Result<Self> {
        if name.is_empty() {
            schema_bail!("Field names may not be empty");
        }

        Ok(Self {
            name,
            type_tag,
            optional,
        })
    }

    /// Build a descriptor from a declared type, which may be an optional.
    pub fn from_declared(name: String, declared: &DeclaredType) -> Result<Self> {
        let (type_tag, optional) = resolve_declared_type(declared)?;
        FieldDescriptor::new(name, type_tag, optional)
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl TableDefinition {
    /// Build a table, checking that the key fields are declared, non-optional fields and that field names are unique.
    ///
    /// Key fields may be given in any order; they're stored in field order.
    pub fn new(name: String, fields: Vec<FieldDescriptor>, key_fields: &[&str]) -> Result<Self> {
        if name.is_empty() {
            schema_bail!("Table names may not be empty");
        }

        if fields.is_empty() {
            schema_bail!("{}: tables need at least one field", name);
        }

        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|x| x.get_name() == f.get_name()) {
                schema_bail!("{}: duplicate field {}", name, f.get_name());
            }
        }

        for k in key_fields {
            let field = match fields.iter().find(|f| f.get_name() == *k) {
                Some(f) => f,
                None => schema_bail!("{}: key field {} isn't a field of the table", name, k),
            };

            if field.is_optional() {
                schema_bail!("{}: key field {} may not be optional", name, k);
            }
        }

        let key_fields = fields
            .iter()
            .map(|f| f.get_name())
            .filter(|n| key_fields.contains(n))
            .map(|n| n.to_string())
            .collect();

        Ok(Self {
            name,
            fields,
            key_fields,
        })
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.get_name() == name)
    }

    pub fn iter_key_fields(&self) -> impl Iterator<Item = &str> {
        self.key_fields.iter().map(|x| x.as_str())
    }

    pub fn has_keys(&self) -> bool {
        !self.key_fields.is_empty()
    }

    pub fn is_key_field(&self, name: &str) -> bool {
        self.key_fields.iter().any(|k| k == name)
    }
}

/// A helper to build tables.
pub struct TableBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
    key_fields: Vec<String>,
}

impl TableBuilder {
    pub fn new(name: String) -> Self {
        Self {
            name,
            fields: vec![],
            key_fields: vec![],
        }
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.fields.iter().map(|x| x.get_name()).any(|x| x == name) {
            schema_bail!("Duplicate field names not allowed: {}", name);
        }
        Ok(())
    }

    pub fn add_field(&mut self, name: &str, declared: impl Into<DeclaredType>) -> Result<&mut Self> {
        self.check_name(name)?;
        self.fields
            .push(FieldDescriptor::from_declared(name.to_string(), &declared.into())?);
        Ok(self)
    }

    pub fn add_column(&mut self, name: &str, type_tag: TypeTag, optional: bool) -> Result<&mut Self> {
        self.check_name(name)?;
        self.fields
            .push(FieldDescriptor::new(name.to_string(), type_tag, optional)?);
        Ok(self)
    }

    /// Mark a field as part of the primary key.  The field may be added before or after this call.
    pub fn add_key_field(&mut self, name: &str) -> &mut Self {
        if !self.key_fields.iter().any(|k| k == name) {
            self.key_fields.push(name.to_string());
        }
        self
    }

    pub fn build(self) -> Result<TableDefinition> {
        let keys = self.key_fields.iter().map(|x| x.as_str()).collect::<Vec<_>>();
        TableDefinition::new(self.name, self.fields, &keys[..])
    }
}

/// Maps table names to their definitions.
///
/// Definitions are registered once, at startup, and never change afterward.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: HashMap<String, Arc<TableDefinition>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a table.
    ///
    /// If a table of this name is already registered, the stored definition is returned and the new one is ignored.
    pub fn register(
        &mut self,
        name: &str,
        fields: Vec<FieldDescriptor>,
        key_fields: &[&str],
    ) -> Result<Arc<TableDefinition>> {
        if let Some(existing) = self.tables.get(name) {
            debug!("{} is already registered", name);
            return Ok(existing.clone());
        }

        self.register_definition(TableDefinition::new(name.to_string(), fields, key_fields)?)
    }

    /// Register an already-built definition, with the same first-wins behavior as [TableRegistry::register].
    pub fn register_definition(&mut self, definition: TableDefinition) -> Result<Arc<TableDefinition>> {
        let entry = self
            .tables
            .entry(definition.get_name().to_string())
            .or_insert_with(|| Arc::new(definition));
        Ok(entry.clone())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TableDefinition>> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownSchema(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TableDefinition>> {
        self.tables.values()
    }
}
