//! Shared helpers for integration tests

#![allow(dead_code)]

use lh_config::{ResolveOptions, Resolver};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Temporary directory holding config documents and unit manifests
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` at `relative`, creating parent directories
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Resolver anchored at this workspace
    pub fn resolver(&self) -> Resolver {
        self.resolver_with(ResolveOptions::default())
    }

    pub fn resolver_with(&self, options: ResolveOptions) -> Resolver {
        Resolver::new(ResolveOptions {
            working_dir: self.path().to_path_buf(),
            ..options
        })
        .expect("Failed to build resolver")
    }
}
