//! Generation of sql text from table definitions.
//!
//! Every builder here is pure.  Each can render values two ways: inline as sqlite literals, which is what
//! [create_table_statement], [upsert_statement], and [select_equals_statement] return, or as numbered parameters, which
//! is what the store actually executes.  Both come out of the same templates, so the shape of the sql doesn't depend on
//! which one is used.
use log::*;
use smallvec::SmallVec;

use crate::descriptor::TableDefinition;
use crate::errors::*;
use crate::types::{native_value_to_storage, FieldValue, StorageValue};

/// How values end up in the sql text.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Binding {
    /// Values are embedded as literals.
    Inline,
    /// Values are `?N` placeholders, and returned as the statement's parameters.
    Numbered,
}

/// A built statement.  `params` is empty for [Binding::Inline].
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<StorageValue>,
}

/// A conjunction of equality predicates, in the order they were added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: SmallVec<[(String, FieldValue); 4]>,
}

impl Filter {
    /// The empty filter, which matches everything.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.conditions.iter().map(|(c, v)| (c.as_str(), v))
    }
}

/// Accumulates rendered values and, for numbered binding, the parameters behind them.
struct ValueRenderer {
    binding: Binding,
    params: Vec<StorageValue>,
}

impl ValueRenderer {
    fn new(binding: Binding) -> Self {
        Self {
            binding,
            params: vec![],
        }
    }

    fn render(&mut self, value: StorageValue) -> String {
        match self.binding {
            Binding::Inline => value.to_literal(),
            Binding::Numbered => {
                self.params.push(value);
                format!("?{}", self.params.len())
            }
        }
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

const CREATE_TEMPLATE: &str = "CREATE TABLE IF NOT EXISTS {{ table }} ({{ columns | join(sep=\", \") }}\
{% if has_keys %}, PRIMARY KEY ({{ keys | join(sep=\", \") }}){% endif %})";

const UPSERT_TEMPLATE: &str = "INSERT INTO {{ table }} ({{ columns | join(sep=\", \") }}) \
VALUES ({{ values | join(sep=\", \") }})\
{% if has_keys %} ON CONFLICT ({{ keys | join(sep=\", \") }}) \
{% if has_updates %}DO UPDATE SET {{ updates | join(sep=\", \") }}{% else %}DO NOTHING{% endif %}\
{% endif %}";

const SELECT_TEMPLATE: &str = "SELECT {{ columns | join(sep=\", \") }} FROM {{ table }}\
{% if has_conditions %} WHERE {{ conditions | join(sep=\" AND \") }}{% endif %}";

/// Context entries every template uses.
fn base_context(def: &TableDefinition) -> tera::Context {
    let mut context = tera::Context::new();
    context.insert("table", def.get_name());
    context.insert(
        "columns",
        &def.iter_fields().map(|f| f.get_name()).collect::<Vec<_>>(),
    );
    context.insert("keys", &def.iter_key_fields().collect::<Vec<_>>());
    context.insert("has_keys", &def.has_keys());
    context
}

fn render(template: &str, context: &tera::Context) -> Result<String> {
    Ok(tera::Tera::one_off(template, context, false)?)
}

/// `CREATE TABLE IF NOT EXISTS`, one column per field in field order.
pub fn create_table_statement(def: &TableDefinition) -> Result<String> {
    let columns = def
        .iter_fields()
        .map(|f| {
            let mut col = format!(
                "{} {}",
                f.get_name(),
                f.get_type_tag().storage_kind().sql_type()
            );
            if !f.is_optional() {
                col.push_str(" NOT NULL");
            }
            col
        })
        .collect::<Vec<_>>();

    let mut context = base_context(def);
    context.insert("columns", &columns);
    let stmt = render(CREATE_TEMPLATE, &context)?;
    debug!("Create statement for {}: {}", def.get_name(), stmt);
    Ok(stmt)
}

/// Build the insert-or-update statement for a full row of values in field order.
pub fn build_upsert(def: &TableDefinition, values: &[FieldValue], binding: Binding) -> Result<Statement> {
    if values.len() != def.field_count() {
        schema_bail!(
            "{} has {} fields but got {} values",
            def.get_name(),
            def.field_count(),
            values.len()
        );
    }

    // Coerce everything up front so that a failure leaves nothing half-built.
    let mut stored = Vec::with_capacity(values.len());
    for (field, value) in def.iter_fields().zip(values.iter()) {
        if value.is_absent() && !field.is_optional() {
            return Err(Error::MissingValue {
                field: field.get_name().to_string(),
            });
        }
        stored.push(native_value_to_storage(value, field.get_type_tag())?);
    }

    let mut renderer = ValueRenderer::new(binding);
    let rendered = stored
        .into_iter()
        .map(|v| renderer.render(v))
        .collect::<Vec<_>>();

    // Updates reuse the rendered values, so numbered parameters are bound once and referenced twice.
    let updates = def
        .iter_fields()
        .zip(rendered.iter())
        .filter(|(f, _)| !def.is_key_field(f.get_name()))
        .map(|(f, v)| format!("{}={}", f.get_name(), v))
        .collect::<Vec<_>>();

    let mut context = base_context(def);
    context.insert("values", &rendered);
    context.insert("has_updates", &!updates.is_empty());
    context.insert("updates", &updates);
    let sql = render(UPSERT_TEMPLATE, &context)?;
    trace!("Upsert statement for {}: {}", def.get_name(), sql);
    Ok(renderer.finish(sql))
}

/// Build the select for all columns in field order, filtered by equality on `filter`.
pub fn build_select_equals(def: &TableDefinition, filter: &Filter, binding: Binding) -> Result<Statement> {
    let mut renderer = ValueRenderer::new(binding);
    let mut conditions = vec![];

    for (column, value) in filter.iter() {
        let field = match def.get_field(column) {
            Some(f) => f,
            None => schema_bail!("{} has no field {} to filter on", def.get_name(), column),
        };

        // `= NULL` never matches anything.
        if value.is_absent() {
            conditions.push(format!("{} IS NULL", column));
            continue;
        }

        let stored = native_value_to_storage(value, field.get_type_tag())?;
        conditions.push(format!("{}={}", column, renderer.render(stored)));
    }

    let mut context = base_context(def);
    context.insert("has_conditions", &!conditions.is_empty());
    context.insert("conditions", &conditions);
    let sql = render(SELECT_TEMPLATE, &context)?;
    trace!("Select statement for {}: {}", def.get_name(), sql);
    Ok(renderer.finish(sql))
}

/// Insert-or-update with values inline.
pub fn upsert_statement(def: &TableDefinition, values: &[FieldValue]) -> Result<String> {
    Ok(build_upsert(def, values, Binding::Inline)?.sql)
}

/// Select with values inline.
pub fn select_equals_statement(def: &TableDefinition, filter: &Filter) -> Result<String> {
    Ok(build_select_equals(def, filter, Binding::Inline)?.sql)
}
