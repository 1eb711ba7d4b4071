//! Virtual folders derived from file path strings.
//!
//! Folders are never stored. A file carries a `/`-delimited folder path and
//! the hierarchy is rebuilt on read by prefix matching.

use std::collections::BTreeSet;
use std::fmt;

use super::types::StoredFile;
use crate::{DriveError, Result};

/// Display form of the root folder.
pub const ROOT: &str = "/";

/// Maximum folder depth (levels).
pub const MAX_FOLDER_DEPTH: usize = 32;

/// A canonical folder path.
///
/// The root is stored as `NULL`; every other path is stored as
/// `/seg1/seg2/` with a leading and trailing slash and no empty segments,
/// so that prefix matching never confuses `/a/` with `/ab/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FolderPath(Option<String>);

impl FolderPath {
    /// The root folder.
    pub fn root() -> Self {
        Self(None)
    }

    /// Parse and normalize caller input.
    ///
    /// `""`, `"/"` and `"root"` all mean the root. Duplicate and surrounding
    /// slashes are collapsed. `.` and `..` segments are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == ROOT || trimmed.eq_ignore_ascii_case("root") {
            return Ok(Self::root());
        }

        let segments: Vec<&str> = trimmed
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if segments.is_empty() {
            return Ok(Self::root());
        }
        if segments.len() > MAX_FOLDER_DEPTH {
            return Err(DriveError::Validation(format!(
                "folder path deeper than {MAX_FOLDER_DEPTH} levels"
            )));
        }
        if let Some(bad) = segments.iter().find(|s| **s == "." || **s == "..") {
            return Err(DriveError::Validation(format!(
                "invalid folder segment '{bad}'"
            )));
        }

        Ok(Self(Some(format!("/{}/", segments.join("/")))))
    }

    /// Wrap a value read back from the store, which is already canonical.
    pub fn from_stored(stored: Option<String>) -> Self {
        Self(stored.filter(|s| !s.is_empty() && s != ROOT))
    }

    /// Whether this is the root.
    pub fn is_root(&self) -> bool {
        self.0.is_none()
    }

    /// Column value: `None` for the root.
    pub fn as_stored(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Path as shown to users; `/` for the root.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or(ROOT)
    }

    /// Path segments from the top.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.as_str().split('/').filter(|s| !s.is_empty())
    }

    /// The child folder `name` inside this one.
    pub fn child(&self, name: &str) -> Result<Self> {
        Self::parse(&format!("{}{}", self.as_str(), name))
    }

    /// Whether `other` is this folder or lies anywhere beneath it.
    pub fn contains(&self, other: &FolderPath) -> bool {
        other.as_str().starts_with(self.as_str())
    }

    /// The first segment of `other` below this folder, if `other` is a strict descendant.
    pub fn immediate_child_of<'a>(&self, other: &'a FolderPath) -> Option<&'a str> {
        if other == self {
            return None;
        }
        other
            .as_str()
            .strip_prefix(self.as_str())?
            .split('/')
            .find(|s| !s.is_empty())
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which files a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderScope {
    /// Every file of the user, regardless of folder.
    All,
    /// Only files directly in the root.
    Root,
    /// Only files whose folder is exactly this path.
    Exact(FolderPath),
}

impl FolderScope {
    /// Interpret a listing query value.
    ///
    /// Absent or `"all"` lists everything; `"root"`, `"/"` or empty selects the root only.
    pub fn from_query(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None => Ok(FolderScope::All),
            Some(s) if s.eq_ignore_ascii_case("all") => Ok(FolderScope::All),
            Some(s) => {
                let path = FolderPath::parse(s)?;
                if path.is_root() {
                    Ok(FolderScope::Root)
                } else {
                    Ok(FolderScope::Exact(path))
                }
            }
        }
    }
}

/// What a folder shows: its own files and the names of its subfolders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderView {
    /// Files directly inside the folder, in input order.
    pub files: Vec<StoredFile>,
    /// Distinct immediate subfolder names, sorted.
    pub folders: Vec<String>,
}

/// Build the view of `current` from a user's full file list.
pub fn resolve(files: &[StoredFile], current: &FolderPath) -> FolderView {
    let mut folders = BTreeSet::new();
    let mut direct = Vec::new();

    for file in files {
        let path = file.folder_path();
        if &path == current {
            direct.push(file.clone());
        } else if let Some(child) = current.immediate_child_of(&path) {
            folders.insert(child.to_string());
        }
    }

    FolderView {
        files: direct,
        folders: folders.into_iter().collect(),
    }
}
