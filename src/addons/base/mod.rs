//! The `base` addon: users, groups, access rules, external ids and the
//! module list. Every other addon depends on it.

use bson::{doc, Bson};

use crate::modules::{Addon, Manifest};
use crate::odm::{DocSet, Field, ModelDefinition, OnDelete, RegistryBuilder, XID_MODEL};
use crate::security::{
    ACL_MODEL, DLS_MODEL, GROUP_DLS_REL, GROUP_MODEL, USER_GROUP_REL, USER_MODEL,
};
use crate::types::{OlafError, Result};

pub const MODULE_MODEL: &str = "base.module";

const MANIFEST: &str = include_str!("manifest.yml");

/// DLS queries are JSON documents and easily outgrow a default char field
const QUERY_LENGTH: usize = 4096;

pub struct BaseAddon {
    manifest: Manifest,
}

impl BaseAddon {
    pub fn new() -> Result<Self> {
        Ok(Self {
            manifest: Manifest::from_yaml(MANIFEST)?,
        })
    }
}

impl Addon for BaseAddon {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn register(&self, registry: &mut RegistryBuilder) -> Result<()> {
        registry
            .add(user())
            .add(group())
            .add(acl())
            .add(dls())
            .add(model_data())
            .add(module());
        Ok(())
    }
}

fn user() -> ModelDefinition {
    ModelDefinition::new(USER_MODEL)
        .describe("Users")
        .field(Field::char("name").required())
        .field(Field::char("email").required().unique())
        .field(Field::password("password"))
        .field(Field::many2many(
            "group_ids",
            GROUP_MODEL,
            USER_GROUP_REL,
            "user_oid",
            "group_oid",
        ))
        .method("change_password", change_password)
}

fn group() -> ModelDefinition {
    ModelDefinition::new(GROUP_MODEL)
        .describe("Groups")
        .field(Field::char("name").required().unique())
        .field(Field::one2many("acl_ids", ACL_MODEL, "group_id"))
        .field(Field::many2many(
            "dls_ids",
            DLS_MODEL,
            GROUP_DLS_REL,
            "group_oid",
            "dls_oid",
        ))
        .field(Field::many2many(
            "user_ids",
            USER_MODEL,
            USER_GROUP_REL,
            "group_oid",
            "user_oid",
        ))
}

fn acl() -> ModelDefinition {
    ModelDefinition::new(ACL_MODEL)
        .describe("Access control rules")
        .field(Field::char("name"))
        .field(Field::char("model").required())
        .field(Field::many2one("group_id", GROUP_MODEL).ondelete(OnDelete::Cascade))
        .field(Field::boolean("allow_read").required().default(false))
        .field(Field::boolean("allow_write").required().default(false))
        .field(Field::boolean("allow_create").required().default(false))
        .field(Field::boolean("allow_unlink").required().default(false))
}

fn dls() -> ModelDefinition {
    ModelDefinition::new(DLS_MODEL)
        .describe("Document level security rules")
        .field(Field::char("name").required())
        .field(Field::char("model").required())
        .field(Field::char("query").required().max_length(QUERY_LENGTH))
        .field(Field::many2many(
            "group_ids",
            GROUP_MODEL,
            GROUP_DLS_REL,
            "dls_oid",
            "group_oid",
        ))
        .field(Field::boolean("on_read").required().default(true))
        .field(Field::boolean("on_write").required().default(true))
        .field(Field::boolean("on_create").required().default(true))
        .field(Field::boolean("on_unlink").required().default(true))
}

fn model_data() -> ModelDefinition {
    ModelDefinition::new(XID_MODEL)
        .describe("External identifiers")
        .field(Field::char("name").required())
        .field(Field::char("model").required())
        .field(Field::identifier("res_id").required())
}

fn module() -> ModelDefinition {
    ModelDefinition::new(MODULE_MODEL)
        .describe("Installed modules")
        .field(Field::char("name").required().unique())
        .field(Field::char("version"))
        .field(Field::selection("status", ["installed", "uninstalled"]).default("installed"))
}

/// `change_password` on a single user: `{"old": ..., "new": ...}`.
///
/// Users may change their own password without write access on users.
async fn change_password(records: DocSet, args: Bson) -> Result<Bson> {
    let args = args
        .as_document()
        .ok_or_else(|| OlafError::BadRequest("Expected {\"old\": ..., \"new\": ...}".into()))?;
    let old = args
        .get_str("old")
        .map_err(|_| OlafError::BadRequest("Missing 'old' password".into()))?;
    let new = args
        .get_str("new")
        .map_err(|_| OlafError::BadRequest("Missing 'new' password".into()))?;

    let id = records.id()?;
    let target = if records.env().uid() == id {
        records.sudo()
    } else {
        records
    };
    if !target.sudo().check_password(old).await? {
        return Err(OlafError::AccessDenied("Current password does not match".into()));
    }
    target.write(doc! { "password": new }).await?;
    Ok(Bson::Boolean(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_manifest() {
        let manifest = Manifest::from_yaml(MANIFEST).unwrap();
        assert_eq!(manifest.name, "base");
        assert!(manifest.depends.is_empty());
    }

    #[test]
    fn test_base_registry_builds() {
        let mut builder = RegistryBuilder::new();
        BaseAddon::new().unwrap().register(&mut builder).unwrap();
        let registry = builder.build().unwrap();
        for model in [USER_MODEL, GROUP_MODEL, ACL_MODEL, DLS_MODEL, XID_MODEL, MODULE_MODEL] {
            assert!(registry.contains(model), "{} missing", model);
        }
        assert!(registry
            .get(USER_MODEL)
            .unwrap()
            .get_method("change_password")
            .is_some());
        assert_eq!(registry.constraints_on(GROUP_MODEL).len(), 1);
    }

    #[test]
    fn test_addon_carries_embedded_manifest() {
        let addon = BaseAddon::new().unwrap();
        assert_eq!(addon.name(), "base");
        assert!(addon.manifest().depends.is_empty());
    }
}
