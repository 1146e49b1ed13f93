//! core::project
//!
//! Project descriptor (`package.json`) model.
//!
//! Only the two parts the dispatcher cares about are read:
//! - `dependencies`, to detect which reporting package is declared
//! - `jsreport.entryPoint`, the optional custom entry-point file
//!
//! Every other key is ignored.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File name of the project descriptor.
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Errors from reading the project descriptor.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `jsreport` block of the descriptor.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JsreportSection {
    /// Entry-point file, relative to the project directory.
    #[serde(rename = "entryPoint", default)]
    pub entry_point: Option<String>,
}

/// Parsed project descriptor.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub dependencies: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub jsreport: Option<JsreportSection>,
}

impl ProjectDescriptor {
    /// Read the descriptor in `dir`.
    ///
    /// Returns `Ok(None)` when the directory has no descriptor file.
    pub fn read(dir: &Path) -> Result<Option<Self>, ProjectError> {
        let path = dir.join(DESCRIPTOR_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ProjectError::Read { path, source }),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| ProjectError::Parse { path, source })
    }

    /// Whether `package` is declared with a non-empty version.
    pub fn declares(&self, package: &str) -> bool {
        match self.dependencies.get(package) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(version)) => !version.is_empty(),
            Some(_) => true,
        }
    }

    /// Custom entry point, if one is declared.
    pub fn entry_point(&self) -> Option<&str> {
        self.jsreport
            .as_ref()
            .and_then(|section| section.entry_point.as_deref())
            .filter(|entry| !entry.is_empty())
    }
}
