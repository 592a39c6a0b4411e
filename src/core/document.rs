//! Workflow documents: loading from disk and turning them into models

use crate::core::builder::{build_model, ModelError};
use crate::core::model::WorkflowModel;
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Why a single document could not be evaluated
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read document: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid YAML syntax: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failure to load the input set as a whole
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("directory not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("no workflow documents found in {0}")]
    NoDocuments(PathBuf),

    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("document loading was interrupted: {0}")]
    Interrupted(String),
}

/// Raw contents of one workflow file
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub source: Arc<str>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, source: impl Into<Arc<str>>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Read a document from disk
    pub async fn read(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let source = tokio::fs::read_to_string(&path).await?;
        Ok(Self::new(path, source))
    }

    /// Parse the raw text into a document tree
    pub fn parse(&self) -> Result<Value, DocumentError> {
        Ok(serde_yaml::from_str(&self.source)?)
    }

    /// Parse and build the typed model
    pub fn to_model(&self) -> Result<WorkflowModel, DocumentError> {
        let tree = self.parse()?;
        Ok(build_model(&self.path, self.source.clone(), &tree)?)
    }
}

/// A document that was not evaluated, and why
#[derive(Debug)]
pub struct ExcludedDocument {
    pub path: PathBuf,
    pub error: DocumentError,
}

/// Outcome of loading one input file
#[derive(Debug)]
pub enum LoadedDocument {
    Model(Arc<WorkflowModel>),
    Excluded(ExcludedDocument),
}

impl LoadedDocument {
    /// Build a loaded document from raw text
    pub fn from_document(document: &Document) -> Self {
        match document.to_model() {
            Ok(model) => LoadedDocument::Model(Arc::new(model)),
            Err(error) => {
                warn!("Excluding {}: {}", document.path.display(), error);
                LoadedDocument::Excluded(ExcludedDocument {
                    path: document.path.clone(),
                    error,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            LoadedDocument::Model(model) => &model.path,
            LoadedDocument::Excluded(excluded) => &excluded.path,
        }
    }
}

/// List workflow files directly inside `dir` whose extension is one of
/// `extensions`, sorted by path
pub async fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, LoadError> {
    let metadata = match tokio::fs::metadata(dir).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LoadError::NotFound(dir.to_path_buf()))
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    if !metadata.is_dir() {
        return Err(LoadError::NotADirectory(dir.to_path_buf()));
    }

    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !matches_extension {
            continue;
        }

        let mut file_type = entry.file_type().await.map_err(io_err)?;
        if file_type.is_symlink() {
            // Follow the link; a dangling one is skipped
            match tokio::fs::metadata(&path).await {
                Ok(target) => file_type = target.file_type(),
                Err(_) => continue,
            }
        }
        if file_type.is_file() {
            paths.push(path);
        }
    }

    paths.sort();
    debug!("Discovered {} documents in {}", paths.len(), dir.display());
    Ok(paths)
}

/// Read and model every workflow file in `dir`.
///
/// Files are read and modelled concurrently. A document that fails to read,
/// parse or model is returned as [`LoadedDocument::Excluded`] and never stops
/// the others. The result is ordered by path. A directory without any
/// workflow file is [`LoadError::NoDocuments`].
pub async fn load_directory(dir: &Path, extensions: &[String]) -> Result<Vec<LoadedDocument>, LoadError> {
    let paths = discover(dir, extensions).await?;
    if paths.is_empty() {
        return Err(LoadError::NoDocuments(dir.to_path_buf()));
    }

    let mut tasks = JoinSet::new();
    for (position, path) in paths.into_iter().enumerate() {
        tasks.spawn(async move {
            let loaded = match Document::read(&path).await {
                Ok(document) => {
                    tokio::task::spawn_blocking(move || LoadedDocument::from_document(&document))
                        .await
                        .map_err(|e| LoadError::Interrupted(e.to_string()))?
                }
                Err(error) => {
                    warn!("Excluding {}: {}", path.display(), error);
                    LoadedDocument::Excluded(ExcludedDocument { path, error })
                }
            };
            Ok::<_, LoadError>((position, loaded))
        });
    }

    let mut loaded = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(|e| LoadError::Interrupted(e.to_string()))?;
        loaded.push(result?);
    }
    loaded.sort_by_key(|(position, _)| *position);

    info!("Loaded {} documents from {}", loaded.len(), dir.display());
    Ok(loaded.into_iter().map(|(_, document)| document).collect())
}
