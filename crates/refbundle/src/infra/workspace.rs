//! Content access: reading documents by URI.

use std::fs;
use std::path::{Path, PathBuf};

use url::Url;

/// Encoding of a document's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Yaml,
}

impl ContentKind {
    /// `.json` files are JSON, everything else is treated as YAML.
    pub fn from_path(path: &str) -> Self {
        if path.to_ascii_lowercase().ends_with(".json") {
            ContentKind::Json
        } else {
            ContentKind::Yaml
        }
    }
}

/// Raw text of a document together with how it should be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContent {
    pub data: String,
    pub kind: ContentKind,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("unsupported URL scheme `{scheme}` for `{url}`")]
    UnsupportedScheme { scheme: String, url: Url },
    #[error("invalid file URL: {0}")]
    InvalidFileUrl(Url),
    #[error("workspace root {} cannot be expressed as a URL", .0.display())]
    InvalidRoot(PathBuf),
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

/// Capability to fetch documents referenced during bundling.
pub trait Workspace {
    fn read(&self, uri: &Url) -> Result<WorkspaceContent, WorkspaceError>;

    fn exists(&self, uri: &Url) -> Result<bool, WorkspaceError>;
}

/// Filesystem-backed workspace rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    base: Url,
}

impl FsWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root).map_err(|error| WorkspaceError::Io {
            path: root.to_path_buf(),
            error,
        })?;
        let base = Url::from_directory_path(&root)
            .map_err(|()| WorkspaceError::InvalidRoot(root.clone()))?;
        Ok(Self { base })
    }

    /// URL of a workspace-relative filename.
    pub fn resolve(&self, filename: &str) -> Result<Url, url::ParseError> {
        self.base.join(filename)
    }

    /// Workspace-relative form of `url`, when it lies under the workspace root.
    pub fn relativize(&self, url: &Url) -> Option<String> {
        self.base.make_relative(url)
    }

    fn path_of(&self, uri: &Url) -> Result<PathBuf, WorkspaceError> {
        if uri.scheme() != "file" {
            return Err(WorkspaceError::UnsupportedScheme {
                scheme: uri.scheme().to_owned(),
                url: uri.clone(),
            });
        }
        uri.to_file_path()
            .map_err(|()| WorkspaceError::InvalidFileUrl(uri.clone()))
    }
}

impl Workspace for FsWorkspace {
    fn read(&self, uri: &Url) -> Result<WorkspaceContent, WorkspaceError> {
        let path = self.path_of(uri)?;
        let data = fs::read_to_string(&path).map_err(|error| WorkspaceError::Io {
            path: path.clone(),
            error,
        })?;
        Ok(WorkspaceContent {
            data,
            kind: ContentKind::from_path(uri.path()),
        })
    }

    fn exists(&self, uri: &Url) -> Result<bool, WorkspaceError> {
        Ok(self.path_of(uri)?.is_file())
    }
}
