//! Shared fixtures for the integration tests
//!
//! Every test gets its own in-memory store bootstrapped with the `base`
//! addon plus a small `test` addon modelling partners, their addresses,
//! tags, categories, invoices and deliveries.

#![allow(dead_code)]

use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson};
use olaf::db::{DocumentStore, MemoryStore};
use olaf::modules::{bootstrap, Addon, Manifest};
use olaf::odm::{OnDelete, RegistryBuilder};
use olaf::{Environment, Field, ModelDefinition, Result};

pub const ROOT_PASSWORD: &str = "integration-root";

pub const PARTNER: &str = "test.partner";
pub const ADDRESS: &str = "test.address";
pub const TAG: &str = "test.tag";
pub const CATEGORY: &str = "test.category";
pub const INVOICE: &str = "test.invoice";
pub const DELIVERY: &str = "test.delivery";

pub struct TestAddon {
    manifest: Manifest,
}

impl TestAddon {
    pub fn new() -> Self {
        Self {
            manifest: Manifest {
                name: "test".into(),
                version: "1.0.0".into(),
                description: Some("Integration test models".into()),
                depends: vec!["base".into()],
                models: Vec::new(),
                data: Vec::new(),
            },
        }
    }
}

impl Addon for TestAddon {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn register(&self, registry: &mut RegistryBuilder) -> Result<()> {
        registry
            .add(
                ModelDefinition::new(PARTNER)
                    .field(Field::char("name").required().max_length(10))
                    .field(Field::char("ref").default("Default"))
                    .field(Field::integer("age"))
                    .field(Field::many2one("category_id", CATEGORY).ondelete(OnDelete::SetNull))
                    .field(Field::one2many("address_ids", ADDRESS, "partner_id"))
                    .field(Field::many2many(
                        "tag_ids",
                        TAG,
                        "test.partner.tag.rel",
                        "partner_oid",
                        "tag_oid",
                    ))
                    .method("greet", |records, _| async move {
                        let name = records.field("name").await?;
                        Ok::<_, olaf::OlafError>(Bson::String(format!(
                            "Hello {}",
                            name.as_str().unwrap_or_default()
                        )))
                    }),
            )
            .add(
                ModelDefinition::new(ADDRESS)
                    .field(Field::char("street"))
                    .field(Field::many2one("partner_id", PARTNER).ondelete(OnDelete::Cascade)),
            )
            .add(
                ModelDefinition::new(TAG)
                    .field(Field::char("name"))
                    .field(Field::many2many(
                        "partner_ids",
                        PARTNER,
                        "test.partner.tag.rel",
                        "tag_oid",
                        "partner_oid",
                    )),
            )
            .add(ModelDefinition::new(CATEGORY).field(Field::char("name").unique()))
            .add(
                ModelDefinition::new(INVOICE)
                    .field(Field::float("amount"))
                    .field(Field::many2one("partner_id", PARTNER).ondelete(OnDelete::Restrict)),
            )
            .add(
                ModelDefinition::new(DELIVERY)
                    .field(Field::char("name"))
                    .field(Field::many2one("address_id", ADDRESS).ondelete(OnDelete::Restrict)),
            );
        Ok(())
    }
}

/// Root environment over a freshly bootstrapped in-memory store, and the
/// store itself
pub async fn setup() -> (Environment, Arc<dyn DocumentStore>) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut addons = olaf::addons::builtin().unwrap();
    addons.push(Box::new(TestAddon::new()));
    let registry = bootstrap(store.clone(), addons, ROOT_PASSWORD)
        .await
        .unwrap();
    (Environment::root(registry, store.clone()), store)
}

pub async fn root_env() -> Environment {
    setup().await.0
}

pub async fn partner(env: &Environment, name: &str) -> olaf::DocSet {
    env.model(PARTNER)
        .unwrap()
        .create(doc! { "name": name })
        .await
        .unwrap()
}

/// Access flags for one model: read, write, create, unlink
pub type Grant<'a> = (&'a str, [bool; 4]);

/// Create a user in a new group holding the given grants and returns the
/// user's environment and group id
pub async fn user_with_grants(env: &Environment, login: &str, grants: &[Grant<'_>]) -> (Environment, ObjectId) {
    let users = env.model("base.user").unwrap();
    let user = users
        .create(doc! {
            "name": login,
            "email": format!("{}@example.com", login),
            "password": "secret",
        })
        .await
        .unwrap();
    let uid = user.id().unwrap();

    let acls: Vec<Bson> = grants
        .iter()
        .map(|(model, [read, write, create, unlink])| {
            Bson::Array(vec![
                Bson::from("create"),
                Bson::Document(doc! {
                    "name": format!("{} {}", login, model),
                    "model": *model,
                    "allow_read": *read,
                    "allow_write": *write,
                    "allow_create": *create,
                    "allow_unlink": *unlink,
                }),
            ])
        })
        .collect();

    let group = env
        .model("base.group")
        .unwrap()
        .create(doc! {
            "name": format!("{} group", login),
            "user_ids": [["add", uid]],
            "acl_ids": acls,
        })
        .await
        .unwrap();

    (env.with_uid(uid), group.id().unwrap())
}

/// Attach a document level rule to a group
pub async fn add_rule(env: &Environment, group: ObjectId, model: &str, query: &str) -> ObjectId {
    let rule = env
        .model("base.dls")
        .unwrap()
        .create(doc! {
            "name": format!("rule on {}", model),
            "model": model,
            "query": query,
            "group_ids": [["add", group]],
        })
        .await
        .unwrap();
    rule.id().unwrap()
}

pub const FULL: [bool; 4] = [true, true, true, true];
pub const READ_ONLY: [bool; 4] = [true, false, false, false];
