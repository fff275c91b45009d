//! Playbook definition files.
//!
//! A file holds either a single definition or a list of them, as YAML
//! (`.yaml`, `.yml`) or JSON (`.json`). Every definition is validated before
//! it is returned, so a bad file never registers half of its playbooks.

use crate::error::{AppError, Result};
use crate::models::PlaybookDefinition;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Supported definition file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionFormat {
    Yaml,
    Json,
}

impl DefinitionFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<PlaybookDefinition>),
    One(Box<PlaybookDefinition>),
}

impl DefinitionFile {
    fn into_definitions(self) -> Vec<PlaybookDefinition> {
        match self {
            DefinitionFile::Many(definitions) => definitions,
            DefinitionFile::One(definition) => vec![*definition],
        }
    }
}

/// Parse and validate definitions from text
pub fn parse_definitions(content: &str, format: DefinitionFormat) -> Result<Vec<PlaybookDefinition>> {
    let file: DefinitionFile = match format {
        DefinitionFormat::Yaml => serde_yaml::from_str(content)?,
        DefinitionFormat::Json => serde_json::from_str(content)?,
    };

    let definitions = file.into_definitions();
    for definition in &definitions {
        definition.check().map_err(|e| {
            AppError::Validation(format!("Playbook '{}': {}", definition.name, e))
        })?;
    }

    Ok(definitions)
}

/// Load all definitions from one file
pub fn load_definitions(path: &Path) -> Result<Vec<PlaybookDefinition>> {
    let format = DefinitionFormat::from_path(path).ok_or_else(|| {
        AppError::Validation(format!(
            "{}: unsupported playbook file extension (expected .yaml, .yml or .json)",
            path.display()
        ))
    })?;

    let content = fs::read_to_string(path)?;
    let definitions = parse_definitions(&content, format).map_err(|e| match e {
        AppError::Validation(msg) => AppError::Validation(format!("{}: {}", path.display(), msg)),
        AppError::Serialization(msg) => {
            AppError::Serialization(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;

    debug!(path = %path.display(), count = definitions.len(), "Loaded playbook file");
    Ok(definitions)
}

/// Load every definition file in `dir`, in file-name order.
///
/// Files with other extensions are skipped. A missing directory yields no
/// definitions; any unreadable or invalid file fails the whole load.
pub fn load_definitions_dir(dir: &Path) -> Result<Vec<PlaybookDefinition>> {
    if !dir.exists() {
        warn!(dir = %dir.display(), "Playbook directory does not exist");
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut definitions = Vec::new();
    for path in paths {
        if DefinitionFormat::from_path(&path).is_none() {
            debug!(path = %path.display(), "Skipping non-playbook file");
            continue;
        }
        definitions.extend(load_definitions(&path)?);
    }

    info!(dir = %dir.display(), count = definitions.len(), "Loaded playbook definitions");
    Ok(definitions)
}
