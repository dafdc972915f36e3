//! Resource resolution
//!
//! Requested paths are joined beneath the document root component by
//! component. Any `..`, absolute or prefix component is rejected before the
//! filesystem is touched, and the final canonical path must still lie inside
//! the canonical root so symlinks cannot lead out of it either.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::config::StaticFilesConfig;
use crate::http::mime::{self, ContentTypeFn};

/// Body served when even the fallback resource cannot be read.
pub const BUILTIN_NOT_FOUND_BODY: &[u8] = b"<h1>Not found : (</h1>";
pub const BUILTIN_NOT_FOUND_TYPE: &str = "text/html";

/// A file loaded from disk, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("path escapes the document root: {0}")]
    Traversal(String),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct Resolver {
    root: PathBuf,
    index_file: String,
    not_found_path: PathBuf,
    content_type: ContentTypeFn,
}

impl Resolver {
    pub fn new(config: &StaticFilesConfig) -> Self {
        Self {
            root: config.root.clone(),
            index_file: config.index_file.clone(),
            not_found_path: config.not_found_root.join(&config.not_found_file),
            content_type: mime::content_type_for,
        }
    }

    /// Replaces the extension based content type inference.
    pub fn with_content_type(mut self, content_type: ContentTypeFn) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a request path onto a filesystem path beneath the root.
    ///
    /// Pure path arithmetic; nothing is read from disk.
    pub fn map_path(&self, requested: &str) -> Result<PathBuf, ResolveError> {
        if requested.contains('\0') {
            return Err(ResolveError::NotFound(requested.to_string()));
        }

        let relative = requested.trim_start_matches('/');
        let mut path = self.root.clone();

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ResolveError::Traversal(requested.to_string()));
                }
            }
        }

        Ok(path)
    }

    /// Resolves a request path to an existing regular file and loads it.
    pub async fn resolve(&self, requested: &str) -> Result<Resource, ResolveError> {
        let mut path = self.map_path(requested)?;

        let mut metadata = stat(&path, requested).await?;
        if metadata.is_dir() {
            path.push(&self.index_file);
            metadata = stat(&path, requested).await?;
        }

        if !metadata.is_file() {
            return Err(ResolveError::NotFound(requested.to_string()));
        }

        self.ensure_within_root(&path, requested).await?;

        let body = tokio::fs::read(&path)
            .await
            .map_err(|source| classify(source, &path, requested))?;

        Ok(Resource {
            content_type: (self.content_type)(&path),
            path,
            body,
        })
    }

    /// Loads the fallback resource.
    ///
    /// Never fails: if the fallback file itself is unreadable the built-in
    /// body is returned instead.
    pub async fn not_found(&self) -> Resource {
        match tokio::fs::read(&self.not_found_path).await {
            Ok(body) => Resource {
                content_type: (self.content_type)(&self.not_found_path),
                path: self.not_found_path.clone(),
                body,
            },
            Err(e) => {
                tracing::error!(
                    path = %self.not_found_path.display(),
                    error = %e,
                    "Fallback resource unavailable, using built-in body"
                );
                Resource {
                    path: self.not_found_path.clone(),
                    content_type: BUILTIN_NOT_FOUND_TYPE,
                    body: BUILTIN_NOT_FOUND_BODY.to_vec(),
                }
            }
        }
    }

    async fn ensure_within_root(&self, path: &Path, requested: &str) -> Result<(), ResolveError> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|source| classify(source, &self.root, requested))?;
        let target = tokio::fs::canonicalize(path)
            .await
            .map_err(|source| classify(source, path, requested))?;

        if target.starts_with(&root) {
            Ok(())
        } else {
            Err(ResolveError::Traversal(requested.to_string()))
        }
    }
}

async fn stat(path: &Path, requested: &str) -> Result<std::fs::Metadata, ResolveError> {
    tokio::fs::metadata(path)
        .await
        .map_err(|source| classify(source, path, requested))
}

/// Missing files are the common case and not an I/O fault.
fn classify(source: std::io::Error, path: &Path, requested: &str) -> ResolveError {
    match source.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => {
            ResolveError::NotFound(requested.to_string())
        }
        _ => ResolveError::Io {
            path: path.to_path_buf(),
            source,
        },
    }
}
