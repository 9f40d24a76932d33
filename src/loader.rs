//! Knowledge-directory loading.
//!
//! A [`LoaderRegistry`] maps file extensions to [`DocumentLoader`]
//! implementations, so new formats can be added without touching the
//! dispatch logic. Files directly under the knowledge directory with an
//! unrecognized extension are silently skipped; a file that fails to load
//! is logged and skipped without aborting the rest of the scan.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use crate::models::SourceDocument;

/// Loads one file into raw text units.
///
/// Paged formats may return multiple [`SourceDocument`]s per file, all
/// carrying the same origin identifier.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>>;
}

/// Loader for plain-text formats (`.txt`, `.md`): the whole file is one
/// source document.
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(vec![SourceDocument {
            origin: file_name(path),
            page: None,
            body,
        }])
    }
}

/// PDF loader: one source document per page, all tagging the file name as
/// origin, so provenance stays at file granularity while content chunks at
/// page granularity.
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<SourceDocument>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .with_context(|| format!("Failed to extract text from {}", path.display()))?;
        let origin = file_name(path);
        let docs: Vec<SourceDocument> = pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| SourceDocument {
                origin: origin.clone(),
                page: Some(i),
                body: text,
            })
            .collect();
        if docs.is_empty() {
            tracing::warn!(file = %origin, "PDF contained no extractable text");
        }
        Ok(docs)
    }
}

/// Extension → loader dispatch table.
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Registry with the standard formats: `txt`, `md`, `pdf`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let text: Arc<dyn DocumentLoader> = Arc::new(PlainTextLoader);
        registry.register("txt", Arc::clone(&text));
        registry.register("md", text);
        registry.register("pdf", Arc::new(PdfLoader));
        registry
    }

    /// Register a loader for an extension (without the leading dot).
    pub fn register(&mut self, extension: &str, loader: Arc<dyn DocumentLoader>) {
        self.loaders.insert(extension.to_lowercase(), loader);
    }

    fn loader_for(&self, path: &Path) -> Option<&Arc<dyn DocumentLoader>> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.loaders.get(&ext)
    }

    /// Enumerate files directly under `dir` and load every recognized one.
    ///
    /// Results are ordered by file name for deterministic chunking and
    /// indexing. A single unreadable or corrupt file, or an unreadable
    /// directory entry, never aborts the whole load.
    pub fn load_dir(&self, dir: &Path) -> Result<Vec<SourceDocument>> {
        if !dir.exists() {
            bail!("Knowledge directory does not exist: {}", dir.display());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                }
            }
        }
        paths.sort();

        let mut docs = Vec::new();
        for path in &paths {
            let Some(loader) = self.loader_for(path) else {
                tracing::debug!(file = %path.display(), "skipping unrecognized extension");
                continue;
            };
            match loader.load(path) {
                Ok(loaded) => docs.extend(loaded),
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable file");
                }
            }
        }

        Ok(docs)
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
