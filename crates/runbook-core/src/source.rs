use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::markdown::{first_h1, front_matter_title};
use crate::types::{Document, SourceType};

const EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Markdown/text files under one directory, read as documents of one project.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    project: String,
    source_type: SourceType,
    base_url: Option<String>,
    excludes: Vec<glob::Pattern>,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>, project: impl Into<String>, source_type: SourceType) -> Self {
        Self { root: root.into(), project: project.into(), source_type, base_url: None, excludes: Vec::new() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Skip paths matching any of `patterns`, relative to the root
    /// (`**/node_modules/**`, `drafts/*`). Excluded directories are not walked.
    pub fn with_excludes<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compiled = glob::Pattern::new(pattern)
                .map_err(|e| Error::InvalidConfig(format!("exclude pattern {pattern:?}: {e}")))?;
            self.excludes.push(compiled);
        }
        Ok(self)
    }

    pub fn source_id(&self) -> String {
        format!("{}-{}", self.project, self.source_type)
    }

    /// Documents in path order. Files that are not valid UTF-8 are skipped.
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!("docs directory {}", self.root.display())));
        }
        let mut documents = Vec::new();
        for path in self.list_files() {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            let rel = relative.to_string_lossy().replace('\\', "/");
            documents.push(Document::new(
                format!("{}:{}", self.source_id(), rel),
                self.source_type,
                self.project.clone(),
                self.url_for(relative),
                title_for(&content, &path),
                content,
            ));
        }
        Ok(documents)
    }

    fn list_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
            .collect();
        files.sort();
        files
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else { return false };
        if relative.as_os_str().is_empty() {
            return false;
        }
        let matched = self.excludes.iter().any(|p| p.matches_path(relative));
        if matched {
            debug!(path = %relative.display(), "excluded");
        }
        matched
    }

    fn url_for(&self, relative: &Path) -> String {
        match &self.base_url {
            Some(base) => {
                let without_ext = relative.with_extension("");
                format!("{}/{}", base.trim_end_matches('/'), without_ext.to_string_lossy().replace('\\', "/"))
            }
            None => format!("file://{}", self.root.join(relative).display()),
        }
    }
}

fn title_for(content: &str, path: &Path) -> String {
    if let Some(title) = first_h1(content).or_else(|| front_matter_title(content)) {
        return title;
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    humanize(&stem)
}

/// `disk-pressure_eviction` → `Disk Pressure Eviction`.
fn humanize(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
