//! Map API payloads to records.
//!
//! The REST API and the GraphQL API spell things differently: REST uses `id`/`updated_at` with numeric ids, GraphQL
//! uses `_id`/`updatedAt` with ids as strings.  Both are accepted wherever they show up.
use anyhow::{Context, Result};
use serde_json::Value;
use time::PrimitiveDateTime;

use crate::schema::{Course, ExternalUrl, File, Folder};

/// Parse an API timestamp, dropping any offset (`Z` or `+hh:mm`) without converting.
pub fn naive_datetime(text: &str) -> Result<PrimitiveDateTime> {
    let trimmed = text.trim_end_matches('Z');
    if let Ok(ts) = canvas_datastore::types::parse_timestamp(trimmed) {
        return Ok(ts);
    }

    let with_offset = time::OffsetDateTime::parse(text, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("Invalid date format: {}", text))?;
    Ok(PrimitiveDateTime::new(with_offset.date(), with_offset.time()))
}

fn field<'a>(element: &'a Value, key: &str) -> Result<&'a Value> {
    element
        .get(key)
        .with_context(|| format!("Payload is missing {}", key))
}

fn str_field<'a>(element: &'a Value, key: &str) -> Result<&'a str> {
    field(element, key)?
        .as_str()
        .with_context(|| format!("{} should be a string", key))
}

/// Ids may be numbers or numeric strings.
fn id_value(value: &Value, key: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .with_context(|| format!("{} isn't representable as i64", key)),
        Value::String(s) => s
            .parse()
            .with_context(|| format!("{} should be numeric, got {:?}", key, s)),
        _ => anyhow::bail!("{} should be an id, got {}", key, value),
    }
}

fn id_field(element: &Value, key: &str) -> Result<i64> {
    id_value(field(element, key)?, key)
}

fn optional_id_field(element: &Value, key: &str) -> Result<Option<i64>> {
    match element.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(id_value(v, key)?)),
    }
}

fn time_field(element: &Value, key: &str) -> Result<PrimitiveDateTime> {
    naive_datetime(str_field(element, key)?).with_context(|| format!("Bad timestamp in {}", key))
}

/// The id of an entry of the REST favorites listing.
pub fn favorite_id(element: &Value) -> Result<i64> {
    id_field(element, "id")
}

/// A course from the GraphQL course listing.  Courses start out as non-favorites.
pub fn course(element: &Value) -> Result<Course> {
    Ok(Course {
        id: id_field(element, "_id")?,
        updated_at: time_field(element, "updatedAt")?,
        name: str_field(element, "name")?.to_string(),
        term: str_field(field(element, "term")?, "name")?.to_string(),
        code: str_field(element, "courseCode")?.to_string(),
        is_favorite: false,
    })
}

/// A folder from the REST API.
pub fn folder(element: &Value, course_id: i64) -> Result<Folder> {
    Ok(Folder {
        id: id_field(element, "id")?,
        updated_at: time_field(element, "updated_at")?,
        full_name: str_field(element, "full_name")?.replace("course files/", ""),
        files_count: id_field(element, "files_count")?,
        course_id,
        parent_id: optional_id_field(element, "parent_folder_id")?,
    })
}

/// A file from the REST API's folder listing.
pub fn file(element: &Value, course_id: i64) -> Result<File> {
    Ok(File {
        id: id_field(element, "id")?,
        updated_at: time_field(element, "updated_at")?,
        downloaded_at: None,
        filename: str_field(element, "filename")?.trim().to_string(),
        download_url: str_field(element, "url")?.to_string(),
        folder_id: optional_id_field(element, "folder_id")?,
        course_id,
    })
}

/// A file found as the content of a module item.
pub fn file_gql(element: &Value, course_id: i64) -> Result<File> {
    Ok(File {
        id: id_field(element, "_id")?,
        updated_at: time_field(element, "updatedAt")?,
        downloaded_at: None,
        filename: str_field(element, "displayName")?.to_string(),
        download_url: str_field(element, "url")?.to_string(),
        folder_id: None,
        course_id,
    })
}

/// An external link found as the content of a module item.
pub fn ext_url(element: &Value, course_id: i64) -> Result<ExternalUrl> {
    Ok(ExternalUrl {
        id: id_field(element, "_id")?,
        updated_at: time_field(element, "updatedAt")?,
        downloaded_at: None,
        url: str_field(element, "url")?.to_string(),
        title: str_field(element, "title")?.to_string(),
        course_id,
    })
}
