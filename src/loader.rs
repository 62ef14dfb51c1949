//! Loading API descriptions from disk.
//!
//! Markdown descriptions (`*.md`, `*.apib`) are converted by the external
//! `drafter` parser; pre-parsed AST files (`*.json`) are read directly.

use crate::error::LoadError;
use crate::model::Blueprint;
use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Turns one description file into a tree.
#[async_trait]
pub trait DescriptionLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Blueprint, LoadError>;
}

/// Pipes markdown through `drafter --format json`.
#[derive(Debug, Clone)]
pub struct DrafterLoader {
    program: String,
}

impl DrafterLoader {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DescriptionLoader for DrafterLoader {
    async fn load(&self, path: &Path) -> Result<Blueprint, LoadError> {
        let source = read(path).await?;

        let mut child = Command::new(&self.program)
            .args(["--format", "json"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LoadError::ParserNotFound {
                    program: self.program.clone(),
                },
                _ => LoadError::Io {
                    path: PathBuf::from(&self.program),
                    source: e,
                },
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(&source).await,
                None => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|e| LoadError::Io {
            path: PathBuf::from(&self.program),
            source: e,
        })?;
        if !output.status.success() {
            return Err(LoadError::ParserFailed {
                path: path.to_path_buf(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        // The parser may exit before draining stdin; only its exit status matters then.
        if let Err(e) = fed {
            if e.kind() != ErrorKind::BrokenPipe {
                return Err(LoadError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        }

        parse_blueprint(path, &output.stdout)
    }
}

/// Reads an already-parsed AST.
#[derive(Debug, Clone, Default)]
pub struct JsonLoader;

#[async_trait]
impl DescriptionLoader for JsonLoader {
    async fn load(&self, path: &Path) -> Result<Blueprint, LoadError> {
        let bytes = read(path).await?;
        parse_blueprint(path, &bytes)
    }
}

/// A description file together with its parsed tree.
#[derive(Debug, Clone)]
pub struct LoadedDescription {
    pub path: PathBuf,
    pub blueprint: Blueprint,
}

/// Load every description in `dir`, in path order.
///
/// The first failure aborts loading; nothing is served from a partial set.
pub async fn load_directory(
    dir: &Path,
    drafter: &str,
) -> Result<Vec<LoadedDescription>, LoadError> {
    let markdown = Glob::new("*.{md,apib}")?.compile_matcher();
    let json = Glob::new("*.json")?.compile_matcher();

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| LoadError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| LoadError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        let path = entry.path();
        if path.is_file() && (is_match(&markdown, &path) || is_match(&json, &path)) {
            paths.push(path);
        }
    }
    paths.sort();

    if paths.is_empty() {
        warn!(directory = %dir.display(), "No API descriptions found");
    }

    let drafter = DrafterLoader::new(drafter);
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        info!(path = %path.display(), "Reading API description");
        let blueprint = if is_match(&json, &path) {
            JsonLoader.load(&path).await?
        } else {
            drafter.load(&path).await?
        };
        debug!(
            path = %path.display(),
            name = %blueprint.name,
            resources = blueprint.resources().count(),
            "Loaded API description"
        );
        loaded.push(LoadedDescription { path, blueprint });
    }

    Ok(loaded)
}

fn is_match(matcher: &GlobMatcher, path: &Path) -> bool {
    path.file_name().is_some_and(|name| matcher.is_match(name))
}

async fn read(path: &Path) -> Result<Vec<u8>, LoadError> {
    tokio::fs::read(path).await.map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_blueprint(path: &Path, bytes: &[u8]) -> Result<Blueprint, LoadError> {
    serde_json::from_slice(bytes).map_err(|e| LoadError::InvalidJson {
        path: path.to_path_buf(),
        source: e,
    })
}
