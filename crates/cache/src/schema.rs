//! The tables of the cache.
//!
//! Every table is keyed on the id the API gives the object.  Timestamps are naive: the API's offsets are dropped when
//! payloads are mapped, see [crate::mappers].
use canvas_datastore::{
    DeclaredType, FieldReader, FieldValue, Record, RecordStore, Result, TableBuilder, TypeTag,
};
use time::PrimitiveDateTime;

#[derive(Clone, Debug, PartialEq)]
pub struct Course {
    pub id: i64,
    pub updated_at: PrimitiveDateTime,
    pub name: String,
    pub term: String,
    pub code: String,
    pub is_favorite: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Folder {
    pub id: i64,
    pub updated_at: PrimitiveDateTime,
    /// Path of the folder inside the course's files, e.g. `week 1/slides`.
    pub full_name: String,
    pub files_count: i64,
    pub course_id: i64,
    pub parent_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct File {
    pub id: i64,
    pub updated_at: PrimitiveDateTime,
    pub downloaded_at: Option<PrimitiveDateTime>,
    pub filename: String,
    pub download_url: String,
    /// Files found through modules don't know their folder.
    pub folder_id: Option<i64>,
    pub course_id: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternalUrl {
    pub id: i64,
    pub updated_at: PrimitiveDateTime,
    pub downloaded_at: Option<PrimitiveDateTime>,
    pub url: String,
    pub title: String,
    pub course_id: i64,
}

impl Record for Course {
    const TABLE_NAME: &'static str = "Course";

    fn declare(table: &mut TableBuilder) -> Result<()> {
        table
            .add_field("id", TypeTag::Integer)?
            .add_field("updated_at", TypeTag::Timestamp)?
            .add_field("name", TypeTag::Text)?
            .add_field("term", TypeTag::Text)?
            .add_field("code", TypeTag::Text)?
            .add_field("is_favorite", TypeTag::Boolean)?
            .add_key_field("id");
        Ok(())
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.updated_at.into(),
            self.name.clone().into(),
            self.term.clone().into(),
            self.code.clone().into(),
            self.is_favorite.into(),
        ]
    }

    fn from_field_values(values: Vec<FieldValue>) -> Result<Self> {
        let mut r = FieldReader::new(Self::TABLE_NAME, values);
        let ret = Course {
            id: r.integer()?,
            updated_at: r.timestamp()?,
            name: r.text()?,
            term: r.text()?,
            code: r.text()?,
            is_favorite: r.boolean()?,
        };
        r.finish()?;
        Ok(ret)
    }
}

impl Record for Folder {
    const TABLE_NAME: &'static str = "Folder";

    fn declare(table: &mut TableBuilder) -> Result<()> {
        table
            .add_field("id", TypeTag::Integer)?
            .add_field("updated_at", TypeTag::Timestamp)?
            .add_field("full_name", TypeTag::Text)?
            .add_field("files_count", TypeTag::Integer)?
            .add_field("course_id", TypeTag::Integer)?
            .add_field("parent_id", DeclaredType::optional(TypeTag::Integer))?
            .add_key_field("id");
        Ok(())
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.updated_at.into(),
            self.full_name.clone().into(),
            self.files_count.into(),
            self.course_id.into(),
            self.parent_id.into(),
        ]
    }

    fn from_field_values(values: Vec<FieldValue>) -> Result<Self> {
        let mut r = FieldReader::new(Self::TABLE_NAME, values);
        let ret = Folder {
            id: r.integer()?,
            updated_at: r.timestamp()?,
            full_name: r.text()?,
            files_count: r.integer()?,
            course_id: r.integer()?,
            parent_id: r.optional_integer()?,
        };
        r.finish()?;
        Ok(ret)
    }
}

impl Record for File {
    const TABLE_NAME: &'static str = "File";

    fn declare(table: &mut TableBuilder) -> Result<()> {
        table
            .add_field("id", TypeTag::Integer)?
            .add_field("updated_at", TypeTag::Timestamp)?
            .add_field("downloaded_at", DeclaredType::optional(TypeTag::Timestamp))?
            .add_field("filename", TypeTag::Text)?
            .add_field("download_url", TypeTag::Text)?
            .add_field("folder_id", DeclaredType::optional(TypeTag::Integer))?
            .add_field("course_id", TypeTag::Integer)?
            .add_key_field("id");
        Ok(())
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.updated_at.into(),
            self.downloaded_at.into(),
            self.filename.clone().into(),
            self.download_url.clone().into(),
            self.folder_id.into(),
            self.course_id.into(),
        ]
    }

    fn from_field_values(values: Vec<FieldValue>) -> Result<Self> {
        let mut r = FieldReader::new(Self::TABLE_NAME, values);
        let ret = File {
            id: r.integer()?,
            updated_at: r.timestamp()?,
            downloaded_at: r.optional_timestamp()?,
            filename: r.text()?,
            download_url: r.text()?,
            folder_id: r.optional_integer()?,
            course_id: r.integer()?,
        };
        r.finish()?;
        Ok(ret)
    }
}

impl Record for ExternalUrl {
    const TABLE_NAME: &'static str = "ExternalUrl";

    fn declare(table: &mut TableBuilder) -> Result<()> {
        table
            .add_field("id", TypeTag::Integer)?
            .add_field("updated_at", TypeTag::Timestamp)?
            .add_field("downloaded_at", DeclaredType::optional(TypeTag::Timestamp))?
            .add_field("url", TypeTag::Text)?
            .add_field("title", TypeTag::Text)?
            .add_field("course_id", TypeTag::Integer)?
            .add_key_field("id");
        Ok(())
    }

    fn field_values(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.updated_at.into(),
            self.downloaded_at.into(),
            self.url.clone().into(),
            self.title.clone().into(),
            self.course_id.into(),
        ]
    }

    fn from_field_values(values: Vec<FieldValue>) -> Result<Self> {
        let mut r = FieldReader::new(Self::TABLE_NAME, values);
        let ret = ExternalUrl {
            id: r.integer()?,
            updated_at: r.timestamp()?,
            downloaded_at: r.optional_timestamp()?,
            url: r.text()?,
            title: r.text()?,
            course_id: r.integer()?,
        };
        r.finish()?;
        Ok(ret)
    }
}

/// Whether something last fetched at `downloaded_at` is stale.
fn is_stale(downloaded_at: Option<PrimitiveDateTime>, updated_at: PrimitiveDateTime) -> bool {
    match downloaded_at {
        Some(d) => d < updated_at,
        None => true,
    }
}

impl File {
    pub fn needs_download(&self) -> bool {
        is_stale(self.downloaded_at, self.updated_at)
    }
}

impl ExternalUrl {
    pub fn needs_download(&self) -> bool {
        is_stale(self.downloaded_at, self.updated_at)
    }
}

/// Register and create every table of the cache.
pub fn register_tables(store: &mut RecordStore) -> Result<()> {
    store.register::<Course>()?;
    store.register::<Folder>()?;
    store.register::<File>()?;
    store.register::<ExternalUrl>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use canvas_datastore::{create_table_statement, Filter};
    use pretty_assertions::assert_eq;
    use time::macros::datetime;

    fn file(id: i64) -> File {
        File {
            id,
            updated_at: datetime!(2022-02-01 10:00:00),
            downloaded_at: None,
            filename: "notes.pdf".into(),
            download_url: "https://example.com/files/1".into(),
            folder_id: Some(3),
            course_id: 7,
        }
    }

    #[test]
    fn test_file_table() {
        let mut store = RecordStore::open_in_memory().unwrap();
        register_tables(&mut store).unwrap();
        assert_eq!(
            create_table_statement(&store.lookup("File").unwrap()).unwrap(),
            "CREATE TABLE IF NOT EXISTS File (id INTEGER NOT NULL, updated_at TEXT NOT NULL, \
downloaded_at TEXT, filename TEXT NOT NULL, download_url TEXT NOT NULL, folder_id INTEGER, \
course_id INTEGER NOT NULL, PRIMARY KEY (id))"
        );
    }

    #[test]
    fn test_round_trips_through_store() {
        let mut store = RecordStore::open_in_memory().unwrap();
        register_tables(&mut store).unwrap();

        let mut f = file(1);
        f.save(&mut store).unwrap();
        f.downloaded_at = Some(datetime!(2022-02-02 09:30:00.123456));
        f.folder_id = None;
        f.save(&mut store).unwrap();

        let folder = Folder {
            id: 3,
            updated_at: datetime!(2022-01-01 00:00:00),
            full_name: "week 1".into(),
            files_count: 1,
            course_id: 7,
            parent_id: None,
        };
        folder.save(&mut store).unwrap();
        store.commit().unwrap();

        assert_eq!(
            File::find_first(&store, &Filter::new().eq("id", 1i64)).unwrap(),
            Some(f)
        );
        assert_eq!(
            Folder::find_by_equality(&store, &Filter::new().eq("course_id", 7i64))
                .unwrap()
                .fetch_all()
                .unwrap(),
            vec![folder]
        );
    }

    #[test]
    fn test_needs_download() {
        let mut f = file(1);
        assert!(f.needs_download());
        f.downloaded_at = Some(datetime!(2022-02-01 09:00:00));
        assert!(f.needs_download());
        f.downloaded_at = Some(datetime!(2022-02-01 10:00:00));
        assert!(!f.needs_download());
    }
}
