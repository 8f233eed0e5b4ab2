//! Where things land on disk.
//!
//! Files go to `<root>/<course>/<folder path>/<filename>`, with every component slugified.  Links found in modules are
//! laid out as `<root>/<course>/modules/<title>`.
use std::path::{Path, PathBuf};

use crate::schema::{Course, ExternalUrl, File, Folder};

lazy_static::lazy_static! {
    static ref DASHES: regex::Regex = regex::Regex::new("-+").unwrap();
}

/// Make a string usable as one path component.
///
/// Non-ascii characters are dropped, path separators become dashes, runs of dashes collapse, and `_`, `-`, and `.` are
/// trimmed from the ends.
pub fn slugify(value: &str) -> String {
    let ascii = value
        .chars()
        .filter(|c| c.is_ascii())
        .collect::<String>()
        .to_lowercase()
        .replace('/', "-")
        .replace('\\', "-")
        .replace('*', "");
    DASHES
        .replace_all(&ascii, "-")
        .trim_matches(|c| c == '_' || c == '-' || c == '.')
        .to_string()
}

pub fn file_path(root: &Path, course: &Course, folder: Option<&Folder>, file: &File) -> PathBuf {
    let mut path = root.join(slugify(&course.name));
    if let Some(folder) = folder {
        for part in folder.full_name.split('/').filter(|p| !p.is_empty()) {
            path.push(slugify(part));
        }
    }
    path.push(slugify(&file.filename));
    path
}

pub fn external_url_path(root: &Path, course: &Course, url: &ExternalUrl) -> PathBuf {
    root.join(slugify(&course.name))
        .join("modules")
        .join(slugify(&url.title))
}
