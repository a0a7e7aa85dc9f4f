//! Addons, dependency ordering and bootstrap

pub mod addon;
pub mod bootstrap;
pub mod manifest;
pub mod toposort;

pub use addon::{discover_addons, Addon, YamlAddon};
pub use bootstrap::{bootstrap, build_registry, ensure_root_user, ROOT_EMAIL};
pub use manifest::{DataRecord, FieldSpec, Manifest, ModelSpec};
pub use toposort::toposort_modules;
