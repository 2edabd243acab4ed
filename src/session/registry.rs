use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::utils::color::{is_valid_hex, DEFAULT_PALETTE};

/// Upper bound on tracked projects. Further entries in the config are ignored.
pub const MAX_PROJECTS: usize = 20;

pub const DEFAULT_CONFIG: &str = r##"# Projects are listed in display order. At most 20 are used.
[[projects]]
name = "Development"
color = "#1f77b4"

[[projects]]
name = "Meetings"

[[projects]]
name = "Admin"

[output]
# Write weekly exports as percentages instead of minutes.
percentage = false
"##;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: Arc<str>,
    pub color: String,
    pub order_index: usize,
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("configuration file {0:?} not found, run `projtrack init` to create one")]
    Missing(PathBuf),
    #[error("failed to read configuration {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration has no [[projects]] section")]
    NoProjectsSection,
    #[error("configuration lists no projects")]
    NoProjects,
    #[error("project name {0:?} is empty or contains a comma or line break")]
    InvalidName(String),
    #[error("project {0:?} is listed twice")]
    DuplicateName(String),
    #[error("project {name:?} has invalid color {color:?}, expected #RRGGBB")]
    InvalidColor { name: String, color: String },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    projects: Option<Vec<ProjectEntry>>,
    #[serde(default)]
    output: OutputSection,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectEntry {
    name: String,
    color: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputSection {
    #[serde(default)]
    percentage: bool,
}

/// Ordered list of projects that can be tracked, loaded once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
    output_percentage: bool,
}

/// Result of loading a registry. `dropped` counts projects past [MAX_PROJECTS] the caller should
/// tell the user about.
#[derive(Debug)]
pub struct RegistryLoad {
    pub registry: ProjectRegistry,
    pub dropped: usize,
}

impl ProjectRegistry {
    pub fn new(projects: Vec<Project>, output_percentage: bool) -> Self {
        Self {
            projects,
            output_percentage,
        }
    }

    pub fn load(path: &Path) -> Result<RegistryLoad, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RegistryError::Missing(path.to_owned())
            } else {
                RegistryError::Io {
                    path: path.to_owned(),
                    source,
                }
            }
        })?;
        let load = Self::from_toml(&content)?;
        info!(
            "Loaded {} projects from {path:?}",
            load.registry.projects.len()
        );
        Ok(load)
    }

    pub fn from_toml(content: &str) -> Result<RegistryLoad, RegistryError> {
        let file: ConfigFile = toml::from_str(content)?;
        let entries = file.projects.ok_or(RegistryError::NoProjectsSection)?;
        if entries.is_empty() {
            return Err(RegistryError::NoProjects);
        }

        let dropped = entries.len().saturating_sub(MAX_PROJECTS);
        if dropped > 0 {
            warn!("Only {MAX_PROJECTS} projects are used, ignoring {dropped}");
        }

        let mut seen = HashSet::new();
        let mut projects = Vec::with_capacity(entries.len().min(MAX_PROJECTS));
        for (order_index, entry) in entries.into_iter().take(MAX_PROJECTS).enumerate() {
            if entry.name.trim().is_empty() || entry.name.contains([',', '\n', '\r']) {
                return Err(RegistryError::InvalidName(entry.name));
            }
            if !seen.insert(entry.name.clone()) {
                return Err(RegistryError::DuplicateName(entry.name));
            }
            let color = match entry.color {
                Some(color) if is_valid_hex(&color) => color,
                Some(color) => {
                    return Err(RegistryError::InvalidColor {
                        name: entry.name,
                        color,
                    })
                }
                None => DEFAULT_PALETTE[order_index].to_string(),
            };
            projects.push(Project {
                name: entry.name.into(),
                color,
                order_index,
            });
        }

        Ok(RegistryLoad {
            registry: Self::new(projects, file.output.percentage),
            dropped,
        })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, index: usize) -> Option<&Project> {
        self.projects.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| &*p.name == name)
    }

    pub fn output_percentage(&self) -> bool {
        self.output_percentage
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
