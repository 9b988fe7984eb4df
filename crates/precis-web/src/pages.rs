//! Page sources: where summarizable content comes from.
//!
//! A [`PageSource`] enumerates candidate targets and extracts their text.
//! [`DirPageSource`] serves text files from a directory (the file stem is
//! the target id); [`MemoryPageSource`] holds pages in memory for tests and
//! embedding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extensions [`DirPageSource`] treats as text.
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Longest title derived from a file's first line.
const MAX_TITLE_CHARS: usize = 120;

/// A summarizable target.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("no target with id '{0}'")]
    NotFound(String),

    #[error("failed to read page: {0}")]
    Io(#[from] std::io::Error),
}

pub type PageFuture<'a, T> = BoxFuture<'a, Result<T, PageError>>;

pub trait PageSource: Send + Sync {
    fn list_targets(&self) -> PageFuture<'_, Vec<Target>>;

    /// Text of the target. May be empty.
    fn extract_text<'a>(&'a self, target_id: &'a str) -> PageFuture<'a, String>;
}

/// Pages held in memory, listed in id order.
#[derive(Debug, Default)]
pub struct MemoryPageSource {
    pages: Mutex<BTreeMap<String, (Target, String)>>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: Target, text: impl Into<String>) {
        self.pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(target.id.clone(), (target, text.into()));
    }

    pub fn with_page(self, target: Target, text: impl Into<String>) -> Self {
        self.insert(target, text);
        self
    }
}

impl PageSource for MemoryPageSource {
    fn list_targets(&self) -> PageFuture<'_, Vec<Target>> {
        let targets = self
            .pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|(t, _)| t.clone())
            .collect();
        Box::pin(async move { Ok(targets) })
    }

    fn extract_text<'a>(&'a self, target_id: &'a str) -> PageFuture<'a, String> {
        let text = self
            .pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(target_id)
            .map(|(_, text)| text.clone());
        Box::pin(async move { text.ok_or_else(|| PageError::NotFound(target_id.to_string())) })
    }
}

/// Text files in one directory (not recursive).
#[derive(Debug, Clone)]
pub struct DirPageSource {
    dir: PathBuf,
}

impl DirPageSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Text files in the directory as `(id, path)`, sorted by id.
    async fn text_files(&self) -> Result<Vec<(String, PathBuf)>, PageError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !is_text_file(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                files.push((stem.to_string(), path));
            }
        }
        files.sort();
        Ok(files)
    }

    async fn find(&self, target_id: &str) -> Result<PathBuf, PageError> {
        if target_id.is_empty() || target_id.contains(['/', '\\']) || target_id.contains("..") {
            return Err(PageError::NotFound(target_id.to_string()));
        }
        self.text_files()
            .await?
            .into_iter()
            .find(|(id, _)| id == target_id)
            .map(|(_, path)| path)
            .ok_or_else(|| PageError::NotFound(target_id.to_string()))
    }
}

impl PageSource for DirPageSource {
    fn list_targets(&self) -> PageFuture<'_, Vec<Target>> {
        Box::pin(async move {
            let files = self.text_files().await?;
            let mut targets = Vec::with_capacity(files.len());
            for (id, path) in files {
                let text = tokio::fs::read_to_string(&path).await?;
                let absolute = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
                targets.push(Target {
                    title: title_from(&text).unwrap_or_else(|| id.clone()),
                    url: format!("file://{}", absolute.display()),
                    id,
                });
            }
            debug!("{} targets in {}", targets.len(), self.dir.display());
            Ok(targets)
        })
    }

    fn extract_text<'a>(&'a self, target_id: &'a str) -> PageFuture<'a, String> {
        Box::pin(async move {
            let path = self.find(target_id).await?;
            Ok(tokio::fs::read_to_string(path).await?)
        })
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(e)))
}

/// First non-empty line, without a leading Markdown heading marker.
fn title_from(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = line.trim_start_matches('#').trim();
    (!title.is_empty()).then(|| title.chars().take(MAX_TITLE_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str) -> Target {
        Target {
            id: id.into(),
            url: format!("https://example.com/{id}"),
            title: id.to_uppercase(),
        }
    }

    #[tokio::test]
    async fn memory_source_lists_in_id_order() {
        let source = MemoryPageSource::new()
            .with_page(target("b"), "bee")
            .with_page(target("a"), "ay");
        let ids: Vec<String> = source
            .list_targets()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(source.extract_text("b").await.unwrap(), "bee");
        assert!(matches!(
            source.extract_text("c").await,
            Err(PageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dir_source_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("rust.md"), "# The Rust Language\n\nFast.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "\n\nplain notes").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(dir.path().join("sub.txt")).unwrap();

        let source = DirPageSource::new(dir.path());
        let targets = source.list_targets().await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "notes");
        assert_eq!(targets[0].title, "plain notes");
        assert_eq!(targets[1].id, "rust");
        assert_eq!(targets[1].title, "The Rust Language");
        assert!(targets[1].url.starts_with("file://"));

        assert_eq!(
            source.extract_text("rust").await.unwrap(),
            "# The Rust Language\n\nFast."
        );
    }

    #[tokio::test]
    async fn dir_source_rejects_unknown_and_path_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let source = DirPageSource::new(dir.path());
        for id in ["missing", "../a", "sub/a", ""] {
            assert!(
                matches!(source.extract_text(id).await, Err(PageError::NotFound(_))),
                "{id}"
            );
        }
    }

    #[test]
    fn titles() {
        assert_eq!(title_from("  \n## Heading \nbody").as_deref(), Some("Heading"));
        assert_eq!(title_from("   "), None);
        assert_eq!(title_from("x".repeat(500).as_str()).unwrap().len(), MAX_TITLE_CHARS);
    }
}
