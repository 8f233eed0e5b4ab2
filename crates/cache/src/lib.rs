//! The course cache built on [canvas_datastore].
//!
//! Records for courses, folders, files, and links found in modules, the mapping from API payloads to them, the layout
//! of downloads on disk, and a synchronization pass which ties these together.
pub mod config;
pub mod mappers;
pub mod paths;
pub mod schema;
pub mod sync;

pub use config::Config;
pub use schema::{Course, ExternalUrl, File, Folder};
pub use sync::{CanvasSource, Downloader, SyncReport, Synchronizer};
