//! Compiled and YAML addons

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::manifest::{parse_data, DataRecord, Manifest};
use crate::odm::RegistryBuilder;
use crate::types::{OlafError, Result};

pub const MANIFEST_FILE: &str = "manifest.yml";

/// An installable unit of models and data
pub trait Addon: Send + Sync {
    fn manifest(&self) -> &Manifest;

    /// Register the addon's models
    fn register(&self, registry: &mut RegistryBuilder) -> Result<()>;

    /// Records to upsert by external id once every model is registered
    fn data(&self) -> Result<Vec<DataRecord>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        &self.manifest().name
    }
}

/// Addon declared entirely in YAML: a directory holding `manifest.yml`
/// and the data files it lists
#[derive(Debug, Clone)]
pub struct YamlAddon {
    manifest: Manifest,
    path: PathBuf,
}

impl YamlAddon {
    pub fn new(manifest: Manifest, path: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            path: path.into(),
        }
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let manifest = Manifest::from_file(&dir.join(MANIFEST_FILE))?;
        Ok(Self::new(manifest, dir))
    }
}

impl Addon for YamlAddon {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn register(&self, registry: &mut RegistryBuilder) -> Result<()> {
        for model in self.manifest.model_definitions()? {
            registry.add(model);
        }
        Ok(())
    }

    fn data(&self) -> Result<Vec<DataRecord>> {
        let mut records = Vec::new();
        for file in &self.manifest.data {
            let path = self.path.join(file);
            let content = std::fs::read_to_string(&path).map_err(|e| {
                OlafError::Config(format!("Failed to read data file {}: {}", path.display(), e))
            })?;
            let parsed = parse_data(&content).map_err(|e| {
                OlafError::Config(format!("Invalid data file {}: {}", path.display(), e))
            })?;
            debug!(addon = %self.manifest.name, file = %file, records = parsed.len(), "Data file parsed");
            records.extend(parsed);
        }
        Ok(records)
    }
}

/// Every subdirectory of `root` holding a manifest, sorted by directory name
pub fn discover_addons(root: &Path) -> Result<Vec<YamlAddon>> {
    let entries = std::fs::read_dir(root).map_err(|e| {
        OlafError::Config(format!("Failed to read addons path {}: {}", root.display(), e))
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    let mut addons = Vec::new();
    for dir in dirs {
        if !dir.join(MANIFEST_FILE).is_file() {
            warn!(path = %dir.display(), "Skipping directory without manifest");
            continue;
        }
        let addon = YamlAddon::open(&dir)?;
        info!(addon = %addon.manifest.name, version = %addon.manifest.version, "Addon found");
        addons.push(addon);
    }
    Ok(addons)
}
