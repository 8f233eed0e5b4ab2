//! One synchronization pass.
//!
//! A pass refreshes every favorite course whose cached copy is older than what the API reports, then downloads every
//! file whose `downloaded_at` is older than its `updated_at`.  Fetching payloads and writing bytes are left to a
//! [CanvasSource] and a [Downloader], so nothing here touches the network.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use canvas_datastore::{Filter, Record, RecordStore};
use log::*;
use serde_json::Value;
use time::PrimitiveDateTime;

use crate::config::Config;
use crate::mappers;
use crate::paths;
use crate::schema::{register_tables, Course, ExternalUrl, File, Folder};

/// Where payloads come from.  Every method returns the API's JSON elements as-is.
pub trait CanvasSource {
    /// GraphQL course listing.
    fn all_courses(&self) -> Result<Vec<Value>>;

    /// REST favorites listing; only `id` is read.
    fn favorite_courses(&self) -> Result<Vec<Value>>;

    /// GraphQL modules, each with a `moduleItems` array.
    fn modules_with_items(&self, course_id: i64) -> Result<Vec<Value>>;

    fn folders(&self, course_id: i64) -> Result<Vec<Value>>;

    fn files(&self, folder_id: i64) -> Result<Vec<Value>>;
}

pub trait Downloader {
    /// Fetch `url` and write it to `path`, creating parent directories as needed.
    fn download(&mut self, url: &str, path: &Path) -> Result<()>;
}

/// What a pass did.
#[derive(Debug, Default, PartialEq)]
pub struct SyncReport {
    /// Ids of the courses whose modules and folders were fetched again.
    pub courses_refreshed: Vec<i64>,
    pub downloaded: Vec<PathBuf>,
    /// Where links found in modules would go.  Links aren't fetched.
    pub links: Vec<PathBuf>,
}

pub struct Synchronizer {
    store: RecordStore,
    download_root: PathBuf,
}

impl Synchronizer {
    /// Wrap a store.  The cache tables are registered (and created) if they aren't yet.
    pub fn new(mut store: RecordStore, download_root: PathBuf) -> Result<Self> {
        register_tables(&mut store).context("Could not create the cache tables")?;
        Ok(Self {
            store,
            download_root,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let store = RecordStore::open(&config.database)
            .with_context(|| format!("Could not open {}", config.database.display()))?;
        Self::new(store, config.download_root.clone())
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Run one pass.  On error, whatever the pass hadn't committed yet is rolled back.
    pub fn run_once(
        &mut self,
        source: &dyn CanvasSource,
        downloader: &mut dyn Downloader,
        now: PrimitiveDateTime,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        if let Err(e) = self.run_pass(source, downloader, now, &mut report) {
            if let Err(rollback_error) = self.store.rollback() {
                warn!("Could not roll back the failed pass: {}", rollback_error);
            }
            return Err(e);
        }
        Ok(report)
    }

    fn run_pass(
        &mut self,
        source: &dyn CanvasSource,
        downloader: &mut dyn Downloader,
        now: PrimitiveDateTime,
        report: &mut SyncReport,
    ) -> Result<()> {
        self.refresh_favorites(source, report)?;
        self.download_files(downloader, now, report)?;
        self.collect_links(report)
    }

    fn refresh_favorites(&mut self, source: &dyn CanvasSource, report: &mut SyncReport) -> Result<()> {
        let favorites = source
            .favorite_courses()?
            .iter()
            .map(mappers::favorite_id)
            .collect::<Result<Vec<_>>>()?;

        for payload in source.all_courses()? {
            let mut course = mappers::course(&payload)?;
            if !favorites.contains(&course.id) {
                continue;
            }
            course.is_favorite = true;

            let cached = Course::find_first(&self.store, &Filter::new().eq("id", course.id))?;
            if cached.map_or(true, |c| c.updated_at < course.updated_at) {
                info!("Refreshing course {} ({})", course.name, course.id);
                self.refresh_course(source, &course)?;
                report.courses_refreshed.push(course.id);
            }
            course.save(&mut self.store)?;
        }
        self.store.commit()?;
        Ok(())
    }

    fn refresh_course(&mut self, source: &dyn CanvasSource, course: &Course) -> Result<()> {
        for module in source.modules_with_items(course.id)? {
            let items = module
                .get("moduleItems")
                .and_then(Value::as_array)
                .context("Module is missing moduleItems")?;
            for content in items.iter().filter_map(|i| i.get("content")) {
                match content.get("type").and_then(Value::as_str) {
                    Some("ExternalUrl") => self.save_link(mappers::ext_url(content, course.id)?)?,
                    Some("File") => self.save_file(mappers::file_gql(content, course.id)?)?,
                    _ => {}
                }
            }
        }

        for payload in source.folders(course.id)? {
            let folder = mappers::folder(&payload, course.id)?;
            let cached = Folder::find_first(&self.store, &Filter::new().eq("id", folder.id))?;
            if cached.map_or(true, |f| f.updated_at < folder.updated_at) {
                for file in source.files(folder.id)? {
                    self.save_file(mappers::file(&file, course.id)?)?;
                }
            }
            folder.save(&mut self.store)?;
        }
        Ok(())
    }

    /// Save a file, keeping what the cache already knows that the payload doesn't.
    fn save_file(&mut self, mut file: File) -> Result<()> {
        if let Some(cached) = File::find_first(&self.store, &Filter::new().eq("id", file.id))? {
            file.downloaded_at = cached.downloaded_at;
            file.folder_id = file.folder_id.or(cached.folder_id);
        }
        file.save(&mut self.store)?;
        Ok(())
    }

    fn save_link(&mut self, mut link: ExternalUrl) -> Result<()> {
        if let Some(cached) = ExternalUrl::find_first(&self.store, &Filter::new().eq("id", link.id))? {
            link.downloaded_at = cached.downloaded_at;
        }
        link.save(&mut self.store)?;
        Ok(())
    }

    fn course_of(&self, course_id: i64) -> Result<Course> {
        Course::find_first(&self.store, &Filter::new().eq("id", course_id))?
            .with_context(|| format!("Course {} isn't cached", course_id))
    }

    fn download_files(
        &mut self,
        downloader: &mut dyn Downloader,
        now: PrimitiveDateTime,
        report: &mut SyncReport,
    ) -> Result<()> {
        // Read everything first: the store can't be written while a cursor is open.
        let files = File::find_by_equality(&self.store, &Filter::new())?.fetch_all()?;

        for mut file in files.into_iter().filter(File::needs_download) {
            let course = self.course_of(file.course_id)?;
            let folder = match file.folder_id {
                Some(id) => {
                    let folder = Folder::find_first(&self.store, &Filter::new().eq("id", id))?;
                    if folder.is_none() {
                        warn!("Folder {} of file {} isn't cached", id, file.id);
                    }
                    folder
                }
                None => None,
            };
            let path = paths::file_path(&self.download_root, &course, folder.as_ref(), &file);

            debug!("Downloading {} to {}", file.download_url, path.display());
            downloader
                .download(&file.download_url, &path)
                .with_context(|| format!("Could not download {}", file.download_url))?;

            file.downloaded_at = Some(now);
            file.save(&mut self.store)?;
            self.store.commit()?;
            report.downloaded.push(path);
        }
        Ok(())
    }

    fn collect_links(&self, report: &mut SyncReport) -> Result<()> {
        let links = ExternalUrl::find_by_equality(&self.store, &Filter::new())?.fetch_all()?;
        for link in links.iter().filter(|l| l.needs_download()) {
            let course = self.course_of(link.course_id)?;
            let path = paths::external_url_path(&self.download_root, &course, link);
            info!("Link {} belongs at {}", link.url, path.display());
            report.links.push(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use time::macros::datetime;

    #[derive(Default)]
    struct FakeSource {
        courses: Vec<Value>,
        favorites: Vec<Value>,
        modules: HashMap<i64, Vec<Value>>,
        folders: HashMap<i64, Vec<Value>>,
        files: HashMap<i64, Vec<Value>>,
    }

    impl CanvasSource for FakeSource {
        fn all_courses(&self) -> Result<Vec<Value>> {
            Ok(self.courses.clone())
        }

        fn favorite_courses(&self) -> Result<Vec<Value>> {
            Ok(self.favorites.clone())
        }

        fn modules_with_items(&self, course_id: i64) -> Result<Vec<Value>> {
            Ok(self.modules.get(&course_id).cloned().unwrap_or_default())
        }

        fn folders(&self, course_id: i64) -> Result<Vec<Value>> {
            Ok(self.folders.get(&course_id).cloned().unwrap_or_default())
        }

        fn files(&self, folder_id: i64) -> Result<Vec<Value>> {
            Ok(self.files.get(&folder_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeDownloader {
        fetched: Vec<(String, PathBuf)>,
        fail: bool,
    }

    impl Downloader for FakeDownloader {
        fn download(&mut self, url: &str, path: &Path) -> Result<()> {
            if self.fail {
                anyhow::bail!("connection reset");
            }
            self.fetched.push((url.to_string(), path.to_path_buf()));
            Ok(())
        }
    }

    fn course_payload(id: i64, name: &str, updated_at: &str) -> Value {
        json!({
            "_id": id.to_string(),
            "updatedAt": updated_at,
            "name": name,
            "term": {"name": "Spring 2022"},
            "courseCode": format!("C{}", id),
        })
    }

    fn source() -> FakeSource {
        let mut source = FakeSource {
            courses: vec![
                course_payload(1, "Intro to Rust", "2022-01-05T10:00:00Z"),
                course_payload(2, "Art History", "2022-01-05T10:00:00Z"),
            ],
            favorites: vec![json!({"id": 1})],
            ..Default::default()
        };
        source.modules.insert(
            1,
            vec![json!({
                "name": "Week 1",
                "moduleItems": [
                    {"content": {
                        "type": "File",
                        "_id": "20",
                        "updatedAt": "2022-01-04T09:00:00Z",
                        "displayName": "syllabus.pdf",
                        "url": "https://example.com/files/20/download",
                    }},
                    {"content": {
                        "type": "ExternalUrl",
                        "_id": "30",
                        "updatedAt": "2022-01-04T09:00:00Z",
                        "url": "https://doc.rust-lang.org/book/",
                        "title": "The Book",
                    }},
                    {"content": {"type": "Page"}},
                    {"content": null},
                ],
            })],
        );
        source.folders.insert(
            1,
            vec![json!({
                "id": 10,
                "updated_at": "2022-01-03T08:00:00Z",
                "full_name": "course files/Week 1",
                "files_count": 1,
                "parent_folder_id": null,
            })],
        );
        source.files.insert(
            10,
            vec![json!({
                "id": 21,
                "updated_at": "2022-01-03T08:00:00Z",
                "filename": "notes.pdf",
                "url": "https://example.com/files/21/download",
                "folder_id": 10,
            })],
        );
        source
    }

    fn synchronizer() -> Synchronizer {
        let store = RecordStore::open_in_memory().unwrap();
        Synchronizer::new(store, "canvas".into()).unwrap()
    }

    #[test]
    fn test_first_pass() {
        let mut sync = synchronizer();
        let mut downloader = FakeDownloader::default();
        let now = datetime!(2022-03-01 00:00:00);

        let mut report = sync.run_once(&source(), &mut downloader, now).unwrap();
        report.downloaded.sort();

        assert_eq!(
            report,
            SyncReport {
                courses_refreshed: vec![1],
                downloaded: vec![
                    PathBuf::from("canvas/intro to rust/syllabus.pdf"),
                    PathBuf::from("canvas/intro to rust/week 1/notes.pdf"),
                ],
                links: vec![PathBuf::from("canvas/intro to rust/modules/the book")],
            }
        );
        assert_eq!(downloader.fetched.len(), 2);

        let course = Course::find_first(sync.store(), &Filter::new().eq("id", 1i64))
            .unwrap()
            .unwrap();
        assert!(course.is_favorite);
        assert_eq!(
            Course::find_first(sync.store(), &Filter::new().eq("id", 2i64)).unwrap(),
            None
        );

        let notes = File::find_first(sync.store(), &Filter::new().eq("id", 21i64))
            .unwrap()
            .unwrap();
        assert_eq!(notes.downloaded_at, Some(now));
        assert_eq!(notes.folder_id, Some(10));
    }

    #[test]
    fn test_second_pass_is_quiet() {
        let mut sync = synchronizer();
        let mut downloader = FakeDownloader::default();
        sync.run_once(&source(), &mut downloader, datetime!(2022-03-01 00:00:00))
            .unwrap();

        let mut downloader = FakeDownloader::default();
        let report = sync
            .run_once(&source(), &mut downloader, datetime!(2022-03-02 00:00:00))
            .unwrap();
        assert_eq!(report.courses_refreshed, Vec::<i64>::new());
        assert_eq!(report.downloaded, Vec::<PathBuf>::new());
        assert!(downloader.fetched.is_empty());

        // Links are reported until something fetches them.
        assert_eq!(report.links.len(), 1);
    }

    #[test]
    fn test_updated_course_keeps_download_state() {
        let mut sync = synchronizer();
        let first = datetime!(2022-03-01 00:00:00);
        sync.run_once(&source(), &mut FakeDownloader::default(), first)
            .unwrap();

        let mut source = source();
        source.courses[0] = course_payload(1, "Intro to Rust", "2022-03-05T10:00:00Z");
        let mut downloader = FakeDownloader::default();
        let report = sync
            .run_once(&source, &mut downloader, datetime!(2022-03-06 00:00:00))
            .unwrap();

        assert_eq!(report.courses_refreshed, vec![1]);
        assert!(downloader.fetched.is_empty());
        let syllabus = File::find_first(sync.store(), &Filter::new().eq("id", 20i64))
            .unwrap()
            .unwrap();
        assert_eq!(syllabus.downloaded_at, Some(first));
    }

    #[test]
    fn test_failed_download() {
        let mut sync = synchronizer();
        let mut downloader = FakeDownloader {
            fail: true,
            ..Default::default()
        };
        let err = sync
            .run_once(&source(), &mut downloader, datetime!(2022-03-01 00:00:00))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("connection reset"));

        let pending = File::find_by_equality(sync.store(), &Filter::new())
            .unwrap()
            .fetch_all()
            .unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(File::needs_download));
    }

    #[test]
    fn test_failed_refresh_leaves_nothing_pending() {
        let mut sync = synchronizer();
        let mut source = source();
        source
            .folders
            .insert(1, vec![json!({"id": 10, "full_name": "no timestamp"})]);

        let err = sync
            .run_once(&source, &mut FakeDownloader::default(), datetime!(2022-03-01 00:00:00))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("updated_at"));
        assert_eq!(sync.store().pending_writes(), 0);

        // The module file and link were saved before the folder failed; they're gone.
        assert_eq!(
            File::find_first(sync.store(), &Filter::new().eq("id", 20i64)).unwrap(),
            None
        );
        assert_eq!(
            ExternalUrl::find_first(sync.store(), &Filter::new().eq("id", 30i64)).unwrap(),
            None
        );

        // A later pass with good payloads starts clean.
        let report = sync
            .run_once(&self::source(), &mut FakeDownloader::default(), datetime!(2022-03-01 00:00:00))
            .unwrap();
        assert_eq!(report.courses_refreshed, vec![1]);
    }

    #[test]
    fn test_bad_payload() {
        let mut sync = synchronizer();
        let mut source = source();
        source.modules.insert(1, vec![json!({"name": "no items"})]);
        assert!(sync
            .run_once(&source, &mut FakeDownloader::default(), datetime!(2022-03-01 00:00:00))
            .is_err());
    }
}
