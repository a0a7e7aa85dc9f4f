//! Record sets
//!
//! A [`DocSet`] is an ordered list of record ids of one model, bound to an
//! [`Environment`]. Every public operation goes through access control for
//! the environment's user; internal bookkeeping (cascades, relation rows,
//! external ids) runs as root.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use bson::{doc, oid::ObjectId, Bson, Document};
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info};

use super::commands::X2ManyCommand;
use super::convert::{is_password, normalize_filter};
use super::environment::Environment;
use super::fields::{is_magic, to_object_id, Field, FieldKind, OnDelete};
use super::ids::{dedup, IntoIds};
use super::model::ModelDefinition;
use super::registry::DeletionConstraint;
use super::XID_MODEL;
use crate::auth::password::verify_password;
use crate::db::{filter, DocumentStore, FindSpec};
use crate::security::{self, Operation};
use crate::types::{OlafError, Result};

#[derive(Clone)]
pub struct DocSet {
    env: Environment,
    model: Arc<ModelDefinition>,
    ids: Vec<ObjectId>,
}

impl fmt::Debug for DocSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids.iter().map(|id| id.to_hex()).collect();
        write!(f, "{}({})", self.model.name(), ids.join(", "))
    }
}

/// Two sets are equal when they hold the same records of the same model,
/// in any order
impl PartialEq for DocSet {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name()
            && self.ids.iter().collect::<HashSet<_>>() == other.ids.iter().collect::<HashSet<_>>()
    }
}

impl Eq for DocSet {}

/// A singleton becomes its id, any other set a list of ids
impl From<&DocSet> for Bson {
    fn from(records: &DocSet) -> Self {
        match records.ids.as_slice() {
            [id] => Bson::ObjectId(*id),
            ids => Bson::Array(ids.iter().map(|id| Bson::ObjectId(*id)).collect()),
        }
    }
}

impl DocSet {
    pub(crate) fn new(env: Environment, model: Arc<ModelDefinition>, ids: Vec<ObjectId>) -> Self {
        Self { env, model, ids }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    /// Model name, also the collection name
    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.ids.contains(id)
    }

    /// One singleton set per record
    pub fn iter(&self) -> impl Iterator<Item = DocSet> + '_ {
        self.ids.iter().map(move |id| self.with_ids(vec![*id]))
    }

    /// Same model and environment, other ids. No access check.
    pub(crate) fn with_ids(&self, ids: Vec<ObjectId>) -> DocSet {
        Self::new(self.env.clone(), self.model.clone(), ids)
    }

    /// Same records seen by another user
    pub fn with_uid(&self, uid: ObjectId) -> DocSet {
        Self::new(self.env.with_uid(uid), self.model.clone(), self.ids.clone())
    }

    pub fn sudo(&self) -> DocSet {
        Self::new(self.env.sudo(), self.model.clone(), self.ids.clone())
    }

    /// Id of a singleton
    pub fn id(&self) -> Result<ObjectId> {
        match self.ids.as_slice() {
            [id] => Ok(*id),
            ids => Err(OlafError::SingletonExpected(ids.len())),
        }
    }

    fn store(&self) -> &dyn DocumentStore {
        self.env.store()
    }

    fn id_filter(&self) -> Document {
        doc! { "_id": { "$in": self.ids.clone() } }
    }

    fn unknown_field(&self, name: &str) -> OlafError {
        OlafError::Validation(format!(
            "Unknown field '{}' on model '{}'",
            name,
            self.name()
        ))
    }

    async fn check(&self, op: Operation) -> Result<()> {
        security::check_access(&self.env, self.name(), op).await
    }

    pub(crate) async fn rules(&self, op: Operation) -> Result<Option<Document>> {
        security::rule_filter(&self.env, &self.model, op).await
    }

    /// Fail unless every existing record among `ids` passes the document
    /// level rules for `op`
    pub(crate) async fn check_rules(&self, op: Operation, ids: &[ObjectId]) -> Result<()> {
        let Some(rule) = self.rules(op).await? else {
            return Ok(());
        };
        let ids_filter = doc! { "_id": { "$in": ids.to_vec() } };
        let existing = self.store().count(self.name(), ids_filter.clone()).await?;
        let allowed = self
            .store()
            .count(self.name(), doc! { "$and": [ids_filter, rule] })
            .await?;
        if allowed < existing {
            return Err(OlafError::AccessDenied(format!(
                "Document level rules forbid {} on {} record(s) of '{}'",
                op,
                existing - allowed,
                self.name()
            )));
        }
        Ok(())
    }

    /// User filter combined with the read rules of the current user
    async fn scoped_filter(&self, filter: Document, op: Operation) -> Result<Document> {
        let filter = normalize_filter(&self.model, &filter)?;
        Ok(match self.rules(op).await? {
            Some(rule) if filter.is_empty() => rule,
            Some(rule) => doc! { "$and": [filter, rule] },
            None => filter,
        })
    }

    /// Ids of this set still present in the store, in set order
    pub(crate) async fn existing_ids(&self) -> Result<Vec<ObjectId>> {
        Ok(self
            .fetch()
            .await?
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect())
    }

    /// Raw documents of this set, in set order, skipping deleted records
    pub(crate) async fn fetch(&self) -> Result<Vec<Document>> {
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self
            .store()
            .find(self.name(), self.id_filter(), FindSpec::new())
            .await?;
        let mut by_id: HashMap<ObjectId, Document> = docs
            .into_iter()
            .filter_map(|d| Some((d.get_object_id("_id").ok()?, d)))
            .collect();
        Ok(self.ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Number of records of this set that still exist
    pub async fn count(&self) -> Result<u64> {
        self.check(Operation::Read).await?;
        if self.ids.is_empty() {
            return Ok(0);
        }
        self.store().count(self.name(), self.id_filter()).await
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    /// Fail unless exactly one record of this set exists
    pub async fn ensure_one(&self) -> Result<()> {
        match self.count().await? {
            1 => Ok(()),
            n => Err(OlafError::SingletonExpected(n as usize)),
        }
    }

    pub async fn search(&self, filter: Document) -> Result<DocSet> {
        self.search_with(filter, FindSpec::new()).await
    }

    pub async fn search_with(&self, filter: Document, spec: FindSpec) -> Result<DocSet> {
        self.check(Operation::Read).await?;
        if let Some(key) = spec
            .sort
            .iter()
            .flat_map(|sort| sort.keys())
            .find(|key| is_password(&self.model, key))
        {
            return Err(OlafError::Validation(format!(
                "Field '{}' of '{}' cannot be used to sort",
                key,
                self.name()
            )));
        }
        let filter = self.scoped_filter(filter, Operation::Read).await?;
        let docs = self.store().find(self.name(), filter, spec).await?;
        let ids = docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect();
        Ok(self.with_ids(ids))
    }

    pub async fn search_count(&self, filter: Document) -> Result<u64> {
        self.check(Operation::Read).await?;
        let filter = self.scoped_filter(filter, Operation::Read).await?;
        self.store().count(self.name(), filter).await
    }

    /// Record set for known ids. Ids hidden by document level rules are
    /// refused.
    pub async fn browse(&self, ids: impl IntoIds) -> Result<DocSet> {
        let records = self.with_ids(dedup(ids.into_ids()?));
        self.check(Operation::Read).await?;
        if !records.is_empty() {
            records.check_rules(Operation::Read, &records.ids).await?;
        }
        Ok(records)
    }

    /// Value of one field of a singleton. Relational fields yield ids.
    pub async fn field(&self, name: &str) -> Result<Bson> {
        let id = self.id()?;
        let field = self
            .model
            .get_field(name)
            .ok_or_else(|| self.unknown_field(name))?;
        self.check(Operation::Read).await?;

        if field.is_x2many() {
            let links = self.x2many_links(field, &[id]).await?;
            let targets = links.get(&id).cloned().unwrap_or_default();
            return Ok(Bson::Array(targets.into_iter().map(Bson::ObjectId).collect()));
        }

        let doc = self
            .store()
            .find_one(self.name(), doc! { "_id": id })
            .await?
            .ok_or_else(|| {
                OlafError::NotFound(format!("Record {} of '{}' does not exist", id, self.name()))
            })?;
        Ok(doc.get(name).cloned().unwrap_or(Bson::Null))
    }

    /// Records a relational field of a singleton points to
    pub async fn related(&self, name: &str) -> Result<DocSet> {
        let field = self
            .model
            .get_field(name)
            .ok_or_else(|| self.unknown_field(name))?;
        let comodel = field.comodel().ok_or_else(|| {
            OlafError::Validation(format!("Field '{}' of '{}' is not relational", name, self.name()))
        })?;
        let target = self.env.model(comodel)?;
        let ids = match self.field(name).await? {
            Bson::ObjectId(id) => vec![id],
            Bson::Array(items) => items.iter().filter_map(Bson::as_object_id).collect(),
            _ => Vec::new(),
        };
        Ok(target.with_ids(ids))
    }

    /// Write one field on every record of the set
    pub async fn set(&self, name: &str, value: impl Into<Bson>) -> Result<()> {
        let mut values = Document::new();
        values.insert(name, value.into());
        self.write(values).await
    }

    /// Read records as documents. An empty `fields` reads every field.
    ///
    /// Many2one values come back as `[id, name]`, x2many values as a list of
    /// such pairs. Password fields are never returned.
    pub async fn read(&self, fields: &[&str]) -> Result<Vec<Document>> {
        self.check(Operation::Read).await?;

        let selected: Vec<&Field> = if fields.is_empty() {
            self.model.fields().iter().collect()
        } else {
            fields
                .iter()
                .map(|name| self.model.get_field(name).ok_or_else(|| self.unknown_field(name)))
                .collect::<Result<_>>()?
        };

        let docs = self.fetch().await?;
        let record_ids: Vec<ObjectId> = docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok())
            .collect();

        let mut relational: HashMap<&str, HashMap<ObjectId, Bson>> = HashMap::new();
        for field in &selected {
            match &field.kind {
                FieldKind::Many2one { comodel, .. } => {
                    let targets: Vec<ObjectId> = docs
                        .iter()
                        .filter_map(|d| d.get_object_id(&field.name).ok())
                        .collect();
                    let names = self.display_names(comodel, &targets).await?;
                    let values = docs
                        .iter()
                        .filter_map(|d| {
                            let id = d.get_object_id("_id").ok()?;
                            let value = match d.get_object_id(&field.name) {
                                Ok(target) => name_pair(target, &names),
                                Err(_) => Bson::Null,
                            };
                            Some((id, value))
                        })
                        .collect();
                    relational.insert(field.name.as_str(), values);
                }
                FieldKind::One2many { comodel, .. } | FieldKind::Many2many { comodel, .. } => {
                    let links = self.x2many_links(field, &record_ids).await?;
                    let all: Vec<ObjectId> = links.values().flatten().copied().collect();
                    let names = self.display_names(comodel, &all).await?;
                    let values = links
                        .into_iter()
                        .map(|(id, targets)| {
                            let pairs = targets.iter().map(|t| name_pair(*t, &names)).collect();
                            (id, Bson::Array(pairs))
                        })
                        .collect();
                    relational.insert(field.name.as_str(), values);
                }
                _ => {}
            }
        }

        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            let Ok(id) = doc.get_object_id("_id") else {
                continue;
            };
            let mut record = doc! { "_id": id };
            for field in &selected {
                if field.name == "_id" || field.kind == FieldKind::Password {
                    continue;
                }
                let value = if field.is_relational() {
                    relational
                        .get(field.name.as_str())
                        .and_then(|values| values.get(&id))
                        .cloned()
                        .unwrap_or_else(|| {
                            if field.is_x2many() {
                                Bson::Array(Vec::new())
                            } else {
                                Bson::Null
                            }
                        })
                } else {
                    doc.get(&field.name).cloned().unwrap_or(Bson::Null)
                };
                record.insert(field.name.clone(), value);
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Display names of `ids` in `comodel`: the `name` field when the model
    /// has one, otherwise the hex id
    async fn display_names(&self, comodel: &str, ids: &[ObjectId]) -> Result<HashMap<ObjectId, Bson>> {
        let ids = dedup(ids.to_vec());
        let mut names: HashMap<ObjectId, Bson> = ids
            .iter()
            .map(|id| (*id, Bson::String(id.to_hex())))
            .collect();
        if ids.is_empty() {
            return Ok(names);
        }

        let definition = self.env.registry().get(comodel)?;
        if let Some(rec_name) = definition.rec_name() {
            let docs = self
                .store()
                .find(comodel, doc! { "_id": { "$in": ids } }, FindSpec::new())
                .await?;
            for d in docs {
                if let Ok(id) = d.get_object_id("_id") {
                    names.insert(id, d.get(rec_name).cloned().unwrap_or(Bson::Null));
                }
            }
        }
        Ok(names)
    }

    /// Target ids of an x2many field, per record
    pub(crate) async fn x2many_links(
        &self,
        field: &Field,
        record_ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, Vec<ObjectId>>> {
        let mut links: HashMap<ObjectId, Vec<ObjectId>> =
            record_ids.iter().map(|id| (*id, Vec::new())).collect();

        match &field.kind {
            FieldKind::One2many { comodel, inverse } => {
                let inverse = inverse.as_str();
                let docs = self
                    .store()
                    .find(
                        comodel,
                        doc! { inverse: { "$in": record_ids.to_vec() } },
                        FindSpec::new().with_sort(doc! { "_id": 1 }),
                    )
                    .await?;
                for d in docs {
                    if let (Ok(id), Ok(owner)) = (d.get_object_id("_id"), d.get_object_id(inverse)) {
                        links.entry(owner).or_default().push(id);
                    }
                }
            }
            FieldKind::Many2many {
                relation,
                field_a,
                field_b,
                ..
            } => {
                let field_a = field_a.as_str();
                let rows = self
                    .store()
                    .find(
                        relation,
                        doc! { field_a: { "$in": record_ids.to_vec() } },
                        FindSpec::new(),
                    )
                    .await?;
                for row in rows {
                    if let (Ok(owner), Ok(target)) = (row.get_object_id(field_a), row.get_object_id(field_b)) {
                        links.entry(owner).or_default().push(target);
                    }
                }
            }
            _ => {}
        }
        Ok(links)
    }

    /// Reject values already used by another record on unique fields
    async fn check_unique(&self, values: &Document, exclude: &[ObjectId]) -> Result<()> {
        for field in self.model.writable_fields().filter(|f| f.unique) {
            let Some(value) = values.get(&field.name) else {
                continue;
            };
            if matches!(value, Bson::Null) {
                continue;
            }
            if exclude.len() > 1 {
                return Err(OlafError::Validation(format!(
                    "Unique field '{}' of '{}' cannot take the same value on {} records",
                    field.name,
                    self.name(),
                    exclude.len()
                )));
            }
            let key = field.name.as_str();
            let clash = doc! { key: value.clone(), "_id": { "$nin": exclude.to_vec() } };
            if self.store().count(self.name(), clash).await? > 0 {
                return Err(OlafError::Validation(format!(
                    "Value {} of unique field '{}' already exists in '{}'",
                    value,
                    field.name,
                    self.name()
                )));
            }
        }
        Ok(())
    }

    /// Create one record and return it as a singleton set.
    ///
    /// Defaults fill missing values, required fields must end up non-null,
    /// and x2many values are applied as commands once the record exists.
    /// Keys that are not fields of the model are ignored.
    pub fn create(&self, values: Document) -> BoxFuture<'_, Result<DocSet>> {
        async move {
            self.check(Operation::Create).await?;
            let model = self.name();

            let id = match values.get("_id") {
                None | Some(Bson::Null) => ObjectId::new(),
                Some(value) => to_object_id(value)?,
            };
            let mut record = doc! { "_id": id };

            for field in self.model.writable_fields() {
                let value = match values.get(&field.name) {
                    None | Some(Bson::Null) => field.default.clone(),
                    Some(value) => Some(value.clone()),
                };
                let stored = match value {
                    Some(value) => field.convert(model, &value)?,
                    None => Bson::Null,
                };
                if field.required && matches!(stored, Bson::Null) {
                    return Err(OlafError::RequiredField {
                        model: model.to_string(),
                        field: field.name.clone(),
                    });
                }
                record.insert(field.name.clone(), stored);
            }

            let now = bson::DateTime::now();
            let uid = self.env.uid();
            record.insert("create_date", now);
            record.insert("write_date", now);
            record.insert("create_uid", uid);
            record.insert("write_uid", uid);

            let mut commands = Vec::new();
            for field in self.model.x2many_fields() {
                if let Some(value) = values.get(&field.name) {
                    let parsed = X2ManyCommand::parse_many(value)?;
                    if !parsed.is_empty() {
                        commands.push((field, parsed));
                    }
                }
            }

            for key in values.keys().filter(|k| !self.model.has_field(k)) {
                debug!(model, field = %key, "Ignoring unknown field on create");
            }

            self.check_unique(&record, &[]).await?;

            if let Some(rule) = self.rules(Operation::Create).await? {
                if !filter::matches(&record, &rule)? {
                    return Err(OlafError::AccessDenied(format!(
                        "Document level rules forbid creating this '{}' record",
                        model
                    )));
                }
            }

            self.store().insert_one(model, record).await?;
            let created = self.with_ids(vec![id]);
            for (field, parsed) in &commands {
                created.apply_commands(field, parsed).await?;
            }

            debug!(model, id = %id, "Record created");
            Ok(created)
        }
        .boxed()
    }

    /// Write the same values on every record of the set
    pub fn write(&self, values: Document) -> BoxFuture<'_, Result<()>> {
        async move {
            self.check(Operation::Write).await?;
            if self.ids.is_empty() {
                return Ok(());
            }
            let model = self.name();

            let mut set = Document::new();
            let mut commands = Vec::new();
            for (key, value) in &values {
                let Some(field) = self.model.get_field(key) else {
                    debug!(model, field = %key, "Ignoring unknown field on write");
                    continue;
                };
                if is_magic(key) {
                    return Err(OlafError::Validation(format!(
                        "Field '{}' of '{}' is read only",
                        key, model
                    )));
                }
                if field.is_x2many() {
                    commands.push((field, X2ManyCommand::parse_many(value)?));
                    continue;
                }
                let stored = field.convert(model, value)?;
                if field.required && matches!(stored, Bson::Null) {
                    return Err(OlafError::RequiredField {
                        model: model.to_string(),
                        field: field.name.clone(),
                    });
                }
                set.insert(key.clone(), stored);
            }

            self.check_rules(Operation::Write, &self.ids).await?;
            self.check_unique(&set, &self.ids).await?;

            set.insert("write_date", bson::DateTime::now());
            set.insert("write_uid", self.env.uid());
            self.store()
                .update_many(model, self.id_filter(), doc! { "$set": set })
                .await?;

            for record in self.iter() {
                for (field, parsed) in &commands {
                    record.apply_commands(field, parsed).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Delete the records of the set and return how many were removed.
    ///
    /// Cascading references are followed first to find every record the
    /// deletion reaches. A restricting reference to any of them aborts the
    /// whole deletion before anything is removed. Nullable references are
    /// cleared once the records are gone.
    pub fn unlink(&self) -> BoxFuture<'_, Result<u64>> {
        async move {
            self.check(Operation::Unlink).await?;
            let ids = self.existing_ids().await?;
            if ids.is_empty() {
                return Ok(0);
            }
            self.check_rules(Operation::Unlink, &ids).await?;

            let model = self.name();
            let requested = ids.len() as u64;
            let registry = self.env.registry().clone();
            let store = self.store();
            let plan = self.deletion_plan(ids).await?;

            for (target, target_ids) in &plan.models {
                for constraint in registry
                    .constraints_on(target)
                    .iter()
                    .filter(|c| c.ondelete == OnDelete::Restrict)
                {
                    let filter =
                        referencing_filter(constraint, target_ids, plan.ids_of(&constraint.model));
                    let count = store.count(&constraint.model, filter).await?;
                    if count > 0 {
                        return Err(OlafError::DeletionConstraint(format!(
                            "{} record(s) of '{}' still reference '{}' through '{}'",
                            count, constraint.model, target, constraint.field
                        )));
                    }
                }
            }

            for (target, target_ids) in &plan.models {
                let count = store
                    .delete_many(target, doc! { "_id": { "$in": target_ids.clone() } })
                    .await?;
                for rc in registry.relation_columns(target) {
                    let column = rc.column.as_str();
                    store
                        .delete_many(&rc.relation, doc! { column: { "$in": target_ids.clone() } })
                        .await?;
                }
                store
                    .delete_many(
                        XID_MODEL,
                        doc! { "model": target.as_str(), "res_id": { "$in": target_ids.clone() } },
                    )
                    .await?;
                debug!(model = %target, count, "Records deleted");
            }

            for (target, target_ids) in &plan.models {
                for constraint in registry
                    .constraints_on(target)
                    .iter()
                    .filter(|c| c.ondelete == OnDelete::SetNull)
                {
                    let field = constraint.field.as_str();
                    store
                        .update_many(
                            &constraint.model,
                            doc! { field: { "$in": target_ids.clone() } },
                            doc! { "$set": { field: Bson::Null } },
                        )
                        .await?;
                }
            }

            info!(model, count = requested, total = plan.len(), "Records deleted");
            Ok(requested)
        }
        .boxed()
    }

    /// Every record reached by deleting `ids`, following cascades
    async fn deletion_plan(&self, ids: Vec<ObjectId>) -> Result<DeletionPlan> {
        let registry = self.env.registry();
        let mut plan = DeletionPlan::default();
        let mut queue = vec![(self.name().to_string(), plan.add(self.name(), ids))];

        while let Some((target, target_ids)) = queue.pop() {
            for constraint in registry
                .constraints_on(&target)
                .iter()
                .filter(|c| c.ondelete == OnDelete::Cascade)
            {
                let filter =
                    referencing_filter(constraint, &target_ids, plan.ids_of(&constraint.model));
                let refs = self
                    .store()
                    .find(&constraint.model, filter, FindSpec::new())
                    .await?;
                let ref_ids = refs
                    .iter()
                    .filter_map(|d| d.get_object_id("_id").ok())
                    .collect();
                let added = plan.add(&constraint.model, ref_ids);
                if !added.is_empty() {
                    queue.push((constraint.model.clone(), added));
                }
            }
        }
        Ok(plan)
    }

    /// Invoke a method registered on the model
    pub async fn call(&self, method: &str, args: Bson) -> Result<Bson> {
        let handler = self.model.get_method(method).cloned().ok_or_else(|| {
            OlafError::NotFound(format!(
                "Method '{}' not found on model '{}'",
                method,
                self.name()
            ))
        })?;
        handler(self.clone(), args).await
    }

    /// Compare a plaintext password with the stored hash of a singleton
    pub async fn check_password(&self, password: &str) -> Result<bool> {
        let field = self
            .model
            .fields()
            .iter()
            .find(|f| f.kind == FieldKind::Password)
            .ok_or_else(|| {
                OlafError::Validation(format!("Model '{}' has no password field", self.name()))
            })?;
        let id = self.id()?;
        let doc = self
            .store()
            .find_one(self.name(), doc! { "_id": id })
            .await?
            .ok_or_else(|| {
                OlafError::NotFound(format!("Record {} of '{}' does not exist", id, self.name()))
            })?;
        match doc.get_str(&field.name) {
            Ok(hash) => verify_password(password, hash),
            Err(_) => Ok(false),
        }
    }
}

fn name_pair(id: ObjectId, names: &HashMap<ObjectId, Bson>) -> Bson {
    Bson::Array(vec![
        Bson::ObjectId(id),
        names.get(&id).cloned().unwrap_or(Bson::Null),
    ])
}

/// Records of `constraint.model` pointing at `ids`, leaving out the ones
/// in `excluded`
fn referencing_filter(
    constraint: &DeletionConstraint,
    ids: &[ObjectId],
    excluded: &[ObjectId],
) -> Document {
    let field = constraint.field.as_str();
    let mut filter = doc! { field: { "$in": ids.to_vec() } };
    if !excluded.is_empty() {
        filter.insert("_id", doc! { "$nin": excluded.to_vec() });
    }
    filter
}

/// Records to delete, grouped by model in discovery order. Each model
/// appears once and each record once.
#[derive(Debug, Default)]
struct DeletionPlan {
    models: Vec<(String, Vec<ObjectId>)>,
}

impl DeletionPlan {
    /// Record `ids` under `model` and return the ones not seen before
    fn add(&mut self, model: &str, ids: Vec<ObjectId>) -> Vec<ObjectId> {
        if ids.is_empty() {
            return ids;
        }
        let index = match self.models.iter().position(|(name, _)| name == model) {
            Some(index) => index,
            None => {
                self.models.push((model.to_string(), Vec::new()));
                self.models.len() - 1
            }
        };
        let known = &mut self.models[index].1;
        let mut added = Vec::new();
        for id in ids {
            if !known.contains(&id) {
                known.push(id);
                added.push(id);
            }
        }
        added
    }

    fn ids_of(&self, model: &str) -> &[ObjectId] {
        self.models
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    fn len(&self) -> usize {
        self.models.iter().map(|(_, ids)| ids.len()).sum()
    }
}
