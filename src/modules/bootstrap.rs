//! Startup: install addons into a store
//!
//! Order of operations:
//! 1. sort addons by dependency
//! 2. register their models and build the registry
//! 3. create unique indexes
//! 4. make sure the root user exists with the configured password
//! 5. record installed modules in `base.module`
//! 6. upsert addon data by external id

use std::sync::Arc;

use bson::{doc, Document};
use tracing::{debug, info, warn};

use super::addon::Addon;
use super::toposort::toposort_modules;
use crate::addons::base::MODULE_MODEL;
use crate::auth::hash_password;
use crate::db::DocumentStore;
use crate::odm::{root_uid, Environment, ModelRegistry, RegistryBuilder};
use crate::security::USER_MODEL;
use crate::types::{OlafError, Result};

/// Email of the root user, used to request tokens
pub const ROOT_EMAIL: &str = "root";

/// Sort, register and build. No store access.
pub fn build_registry(addons: &[Box<dyn Addon>]) -> Result<(ModelRegistry, Vec<String>)> {
    let mut seen: Vec<&str> = Vec::new();
    for addon in addons {
        if seen.contains(&addon.name()) {
            return Err(OlafError::Config(format!(
                "Addon '{}' is provided twice",
                addon.name()
            )));
        }
        seen.push(addon.name());
    }

    let graph: Vec<(&str, Vec<&str>)> = addons
        .iter()
        .map(|addon| {
            let manifest = addon.manifest();
            (
                manifest.name.as_str(),
                manifest.depends.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let order = toposort_modules(&graph)?;

    let mut builder = RegistryBuilder::new();
    for name in &order {
        if let Some(addon) = addons.iter().find(|a| a.name() == name.as_str()) {
            addon.register(&mut builder)?;
            debug!(addon = %name, "Addon registered");
        }
    }
    Ok((builder.build()?, order))
}

/// Install `addons` into `store` and return the frozen registry
pub async fn bootstrap(
    store: Arc<dyn DocumentStore>,
    addons: Vec<Box<dyn Addon>>,
    root_password: &str,
) -> Result<Arc<ModelRegistry>> {
    info!(addons = addons.len(), "Bootstrapping");
    let (registry, order) = build_registry(&addons)?;
    let registry = Arc::new(registry);

    for name in registry.names() {
        let model = registry.get(name)?;
        for field in model.writable_fields().filter(|f| f.unique) {
            store.ensure_index(name, &field.name, true).await?;
        }
    }

    ensure_root_user(store.as_ref(), root_password).await?;

    let env = Environment::root(registry.clone(), store.clone());
    let modules = env.model(MODULE_MODEL)?;
    for name in &order {
        let Some(addon) = addons.iter().find(|a| a.name() == name.as_str()) else {
            continue;
        };
        let values = doc! {
            "name": name.as_str(),
            "version": addon.manifest().version.as_str(),
            "status": "installed",
        };
        let existing = modules.search(doc! { "name": name.as_str() }).await?;
        if existing.is_empty() {
            modules.create(values).await?;
        } else {
            existing.write(values).await?;
        }
    }

    for name in &order {
        let Some(addon) = addons.iter().find(|a| a.name() == name.as_str()) else {
            continue;
        };
        let records = addon.data()?;
        for record in &records {
            env.model(&record.model)?
                .upsert_xid(&record.id, record.values()?)
                .await?;
        }
        if !records.is_empty() {
            info!(addon = %name, records = records.len(), "Addon data loaded");
        }
    }

    info!(models = registry.len(), modules = order.len(), "System ready");
    Ok(registry)
}

/// Create the root user, or reset its password when it already exists
pub async fn ensure_root_user(store: &dyn DocumentStore, password: &str) -> Result<()> {
    let uid = root_uid();
    let hashed = hash_password(password)?;
    let now = bson::DateTime::now();

    if store.count(USER_MODEL, doc! { "_id": uid }).await? == 0 {
        warn!("Root user is not present, creating it");
        let mut user = Document::new();
        user.insert("_id", uid);
        user.insert("name", "Root");
        user.insert("email", ROOT_EMAIL);
        user.insert("password", hashed);
        user.insert("create_date", now);
        user.insert("write_date", now);
        user.insert("create_uid", uid);
        user.insert("write_uid", uid);
        store.insert_one(USER_MODEL, user).await?;
    } else {
        info!("Overwriting root user password");
        store
            .update_many(
                USER_MODEL,
                doc! { "_id": uid },
                doc! { "$set": { "password": hashed, "write_date": now } },
            )
            .await?;
    }
    Ok(())
}
