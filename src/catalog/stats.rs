//! Storage usage summary.

use serde::Serialize;

use super::types::StoredFile;

/// Coarse content category used in usage summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Other,
}

impl FileCategory {
    fn from_top_level(mime: &str) -> Option<Self> {
        let top = mime.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "image" => Some(FileCategory::Image),
            "video" => Some(FileCategory::Video),
            "audio" => Some(FileCategory::Audio),
            _ => None,
        }
    }
}

/// Categorize a file by its declared MIME type, falling back to the name's extension.
pub fn classify(mime_type: &str, name: &str) -> FileCategory {
    if let Some(category) = FileCategory::from_top_level(mime_type) {
        return category;
    }
    mime_guess::from_path(name)
        .first_raw()
        .and_then(FileCategory::from_top_level)
        .unwrap_or(FileCategory::Other)
}

/// Count and bytes for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryUsage {
    pub count: u64,
    pub bytes: i64,
}

impl CategoryUsage {
    fn add(&mut self, size: i64) {
        self.count += 1;
        self.bytes += size;
    }
}

/// Storage usage for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: u64,
    pub total_bytes: i64,
    pub images: CategoryUsage,
    pub videos: CategoryUsage,
    pub audio: CategoryUsage,
    pub other: CategoryUsage,
}

impl StorageStats {
    /// Usage for one category.
    pub fn category(&self, category: FileCategory) -> CategoryUsage {
        match category {
            FileCategory::Image => self.images,
            FileCategory::Video => self.videos,
            FileCategory::Audio => self.audio,
            FileCategory::Other => self.other,
        }
    }
}

/// Summarize a file list.
pub fn summarize(files: &[StoredFile]) -> StorageStats {
    let mut stats = StorageStats::default();
    for file in files {
        stats.total_files += 1;
        stats.total_bytes += file.size;
        let bucket = match classify(&file.mime_type, &file.name) {
            FileCategory::Image => &mut stats.images,
            FileCategory::Video => &mut stats.videos,
            FileCategory::Audio => &mut stats.audio,
            FileCategory::Other => &mut stats.other,
        };
        bucket.add(file.size);
    }
    stats
}
