use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A planned time slice of an item's audio, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64, // exclusive
}

impl Window {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// An exported window on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub item_id: String,
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub media_path: PathBuf,
}

impl Segment {
    pub fn new(item_id: &str, window: &Window, media_path: PathBuf) -> Self {
        Self {
            item_id: item_id.to_string(),
            index: window.index,
            start_ms: window.start_ms,
            end_ms: window.end_ms,
            media_path,
        }
    }
}

/// `<item_id>_chunk_<index>.<ext>`; the index is the segment's position.
pub fn indexed_file_name(item_id: &str, index: usize, extension: &str) -> String {
    format!("{}_chunk_{}.{}", item_id, index, extension)
}

/// Inverse of [`indexed_file_name`].
pub fn parse_index(item_id: &str, file_name: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(item_id)?.strip_prefix("_chunk_")?;
    let digits = rest.split('.').next()?;
    digits.parse().ok()
}

/// Find `<item_id>_chunk_<n>.*` files in `dir` and return them in index order.
///
/// Indices must be contiguous from 0; a gap means a lost segment and is an
/// error rather than something to paper over.
pub fn discover_indexed_files(dir: &Path, item_id: &str) -> Result<Vec<PathBuf>> {
    let mut found: Vec<(usize, PathBuf)> = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.context(format!("Failed to list directory: {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if let Some(index) = parse_index(item_id, &name) {
            found.push((index, entry.into_path()));
        }
    }

    found.sort_by_key(|(index, _)| *index);

    for (expected, (index, path)) in found.iter().enumerate() {
        if *index != expected {
            anyhow::bail!(
                "Segment files in {:?} are not contiguous: expected index {}, found {:?}",
                dir,
                expected,
                path
            );
        }
    }

    Ok(found.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_round_trip() {
        let name = indexed_file_name("vid", 12, "mp4");
        assert_eq!(name, "vid_chunk_12.mp4");
        assert_eq!(parse_index("vid", &name), Some(12));
        assert_eq!(parse_index("other", &name), None);
        assert_eq!(parse_index("vid", "vid_chunk_x.mp4"), None);
    }

    #[test]
    fn test_ids_with_underscores_parse() {
        assert_eq!(parse_index("a_b", "a_b_chunk_3.txt"), Some(3));
    }

    #[test]
    fn test_discovery_orders_numerically() {
        let tmp = tempfile::tempdir().unwrap();
        for i in [10, 2, 0, 1, 3, 4, 5, 6, 7, 8, 9] {
            std::fs::write(tmp.path().join(indexed_file_name("vid", i, "mp4")), b"x").unwrap();
        }
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let files = discover_indexed_files(tmp.path(), "vid").unwrap();
        let indices: Vec<usize> = files
            .iter()
            .map(|p| parse_index("vid", &p.file_name().unwrap().to_string_lossy()).unwrap())
            .collect();
        assert_eq!(indices, (0..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_discovery_rejects_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(indexed_file_name("vid", 0, "mp4")), b"x").unwrap();
        std::fs::write(tmp.path().join(indexed_file_name("vid", 2, "mp4")), b"x").unwrap();

        assert!(discover_indexed_files(tmp.path(), "vid").is_err());
    }
}
