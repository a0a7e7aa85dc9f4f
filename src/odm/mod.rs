//! Object-document mapper
//!
//! Models are declared at runtime as [`ModelDefinition`]s, collected into a
//! [`ModelRegistry`] and queried through [`DocSet`]s bound to an
//! [`Environment`].

pub mod commands;
pub mod convert;
pub mod docset;
pub mod environment;
pub mod fields;
pub mod ids;
pub mod load;
pub mod model;
pub mod registry;

pub use commands::X2ManyCommand;
pub use docset::DocSet;
pub use environment::{root_uid, Environment};
pub use fields::{Field, FieldKind, OnDelete};
pub use ids::IntoIds;
pub use load::{LoadError, LoadOutcome};
pub use model::{ModelDefinition, ModelMethod};
pub use registry::{ModelRegistry, RegistryBuilder};

/// Collection mapping external ids to records
pub const XID_MODEL: &str = "base.model.data";
