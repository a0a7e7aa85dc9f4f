//! Bulk import with external ids
//!
//! `load` takes a header of column names and rows of values. The `id`
//! column carries the external id of each record; relational fields are
//! referenced through `field/id` (external id) and `field/name` (display
//! name) sub-columns. A row whose plain columns are all empty continues the
//! previous record and only adds x2many links.
//!
//! Every row is converted and checked before anything is written: required
//! and unique values, external ids used twice, document level rules and
//! the comodel records references would create. Any problem aborts the
//! import and is reported per row.

use std::collections::HashMap;

use bson::{doc, oid::ObjectId, Bson, Document};
use serde::Serialize;
use tracing::{debug, info};

use super::commands::X2ManyCommand;
use super::docset::DocSet;
use super::fields::{Field, FieldKind};
use super::model::ModelDefinition;
use super::XID_MODEL;
use crate::db::filter;
use crate::security::{self, Operation};
use crate::types::{OlafError, Result};

/// Prefix of external ids generated for rows without one
pub const IMPORT_PREFIX: &str = "__import__";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadError {
    /// Zero based row index
    pub row: usize,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    /// Ids of the imported records, one per record in row order
    pub ids: Vec<ObjectId>,
    pub errors: Vec<LoadError>,
}

impl LoadOutcome {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubKey {
    Id,
    Name,
}

#[derive(Debug)]
enum Column<'m> {
    Xid,
    Value(&'m Field),
    Sub(&'m Field, SubKey),
}

impl Column<'_> {
    fn is_plain(&self) -> bool {
        !matches!(self, Column::Sub(..))
    }
}

/// Comodel record referenced by a sub-column pair
#[derive(Debug, Clone, Default)]
struct Reference {
    xid: Option<String>,
    name: Option<Bson>,
}

#[derive(Debug)]
struct PendingRecord<'m> {
    row: usize,
    xid: Option<String>,
    existing: Option<ObjectId>,
    values: Document,
    links: Vec<(&'m Field, Reference)>,
}

fn parse_columns<'m>(model: &'m ModelDefinition, names: &[&str]) -> Result<Vec<Column<'m>>> {
    let unknown = |name: &str| {
        OlafError::Validation(format!(
            "Unknown column '{}' for model '{}'",
            name,
            model.name()
        ))
    };

    names
        .iter()
        .map(|name| {
            if *name == "id" {
                return Ok(Column::Xid);
            }
            if let Some((field_name, key)) = name.split_once('/') {
                let field = model.get_field(field_name).ok_or_else(|| unknown(name))?;
                if !field.is_relational() {
                    return Err(OlafError::Validation(format!(
                        "Column '{}': '{}' is not relational",
                        name, field_name
                    )));
                }
                let key = match key {
                    "id" => SubKey::Id,
                    "name" => SubKey::Name,
                    _ => return Err(unknown(name)),
                };
                return Ok(Column::Sub(field, key));
            }
            let field = model.get_field(name).ok_or_else(|| unknown(name))?;
            if field.is_x2many() {
                return Err(OlafError::Validation(format!(
                    "Column '{}' must be imported through '{}/id' or '{}/name'",
                    name, name, name
                )));
            }
            if field.name == "_id" {
                return Err(OlafError::Validation(
                    "Column '_id' cannot be imported, use 'id'".into(),
                ));
            }
            Ok(Column::Value(field))
        })
        .collect()
}

fn is_empty_cell(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) => true,
        Some(Bson::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

fn cell_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Group the sub-column values of one row by field
fn row_references<'m>(columns: &[Column<'m>], row: &[Bson]) -> Vec<(&'m Field, Reference)> {
    let mut refs: Vec<(&'m Field, Reference)> = Vec::new();
    for (column, value) in columns.iter().zip(row) {
        let Column::Sub(field, key) = column else {
            continue;
        };
        if is_empty_cell(Some(value)) {
            continue;
        }
        let index = match refs.iter().position(|(f, _)| f.name == field.name) {
            Some(index) => index,
            None => {
                refs.push((*field, Reference::default()));
                refs.len() - 1
            }
        };
        match key {
            SubKey::Id => refs[index].1.xid = Some(cell_text(value)),
            SubKey::Name => refs[index].1.name = Some(value.clone()),
        }
    }
    refs
}

impl DocSet {
    /// Import rows. See the module documentation for the column format.
    pub async fn load(&self, fields: &[&str], rows: &[Vec<Bson>]) -> Result<LoadOutcome> {
        security::check_access(self.env(), self.name(), Operation::Create).await?;
        security::check_access(self.env(), self.name(), Operation::Write).await?;

        let model = self.model();
        let columns = parse_columns(model, fields)?;
        let mut errors = Vec::new();
        let mut pending: Vec<PendingRecord<'_>> = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            if row.len() > columns.len() {
                errors.push(LoadError {
                    row: index,
                    field: None,
                    message: format!(
                        "Row has {} values but there are {} columns",
                        row.len(),
                        columns.len()
                    ),
                });
                continue;
            }

            let continuation = columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_plain())
                .all(|(i, _)| is_empty_cell(row.get(i)));

            if continuation {
                let Some(record) = pending.last_mut() else {
                    errors.push(LoadError {
                        row: index,
                        field: None,
                        message: "Continuation row without a record to continue".into(),
                    });
                    continue;
                };
                for (field, reference) in row_references(&columns, row) {
                    if !field.is_x2many() {
                        errors.push(LoadError {
                            row: index,
                            field: Some(field.name.clone()),
                            message: "A continuation row can only add x2many links".into(),
                        });
                        continue;
                    }
                    record.links.push((field, reference));
                }
                continue;
            }

            let mut record = PendingRecord {
                row: index,
                xid: None,
                existing: None,
                values: Document::new(),
                links: row_references(&columns, row),
            };
            for (column, value) in columns.iter().zip(row) {
                match column {
                    Column::Xid if !is_empty_cell(Some(value)) => {
                        record.xid = Some(cell_text(value));
                    }
                    Column::Value(field) => {
                        let value = if is_empty_cell(Some(value)) {
                            Bson::Null
                        } else {
                            value.clone()
                        };
                        match field.convert(self.name(), &value) {
                            Ok(stored) => {
                                record.values.insert(field.name.clone(), stored);
                            }
                            Err(e) => errors.push(LoadError {
                                row: index,
                                field: Some(field.name.clone()),
                                message: e.to_string(),
                            }),
                        }
                    }
                    _ => {}
                }
            }
            pending.push(record);
        }

        let mut xid_rows: HashMap<String, usize> = HashMap::new();
        let mut unique_seen: Vec<(String, Bson, usize)> = Vec::new();
        for record in &mut pending {
            if let Some(xid) = &record.xid {
                if let Some(first) = xid_rows.get(xid) {
                    errors.push(LoadError {
                        row: record.row,
                        field: Some("id".into()),
                        message: format!("External id '{}' is already used on row {}", xid, first),
                    });
                } else {
                    xid_rows.insert(xid.clone(), record.row);
                }
                record.existing = self.xid_lookup(self.name(), xid).await?;
            }
            self.validate_pending(record, &mut unique_seen, &mut errors).await?;
        }

        if !errors.is_empty() {
            debug!(model = self.name(), errors = errors.len(), "Import rejected");
            return Ok(LoadOutcome {
                ids: Vec::new(),
                errors,
            });
        }

        let mut ids = Vec::with_capacity(pending.len());
        for record in pending {
            ids.push(self.write_pending(record).await?);
        }
        info!(model = self.name(), count = ids.len(), "Records imported");
        Ok(LoadOutcome {
            ids,
            errors: Vec::new(),
        })
    }

    /// Everything that would make writing `record` fail: required and
    /// unique fields, document level rules, and references that cannot be
    /// resolved or created
    async fn validate_pending(
        &self,
        record: &PendingRecord<'_>,
        unique_seen: &mut Vec<(String, Bson, usize)>,
        errors: &mut Vec<LoadError>,
    ) -> Result<()> {
        let row_error = |field: Option<&str>, message: String| LoadError {
            row: record.row,
            field: field.map(str::to_string),
            message,
        };
        let linked: Vec<&str> = record.links.iter().map(|(f, _)| f.name.as_str()).collect();

        for field in self.model().writable_fields().filter(|f| f.required) {
            let missing = match record.values.get(&field.name) {
                Some(Bson::Null) => record.existing.is_some() || field.default.is_none(),
                Some(_) => false,
                None => record.existing.is_none() && field.default.is_none(),
            };
            if missing && !linked.contains(&field.name.as_str()) {
                let err = OlafError::RequiredField {
                    model: self.name().to_string(),
                    field: field.name.clone(),
                };
                errors.push(row_error(Some(field.name.as_str()), err.to_string()));
            }
        }

        for field in self.model().writable_fields().filter(|f| f.unique) {
            let Some(value) = record.values.get(&field.name) else {
                continue;
            };
            if matches!(value, Bson::Null) {
                continue;
            }
            if let Some((_, _, first)) = unique_seen
                .iter()
                .find(|(name, seen, _)| *name == field.name && seen == value)
            {
                errors.push(row_error(
                    Some(field.name.as_str()),
                    format!("Value {} of unique field '{}' is also on row {}", value, field.name, first),
                ));
                continue;
            }
            unique_seen.push((field.name.clone(), value.clone(), record.row));

            let key = field.name.as_str();
            let mut clash = doc! { key: value.clone() };
            if let Some(id) = record.existing {
                clash.insert("_id", doc! { "$ne": id });
            }
            if self.env().store().count(self.name(), clash).await? > 0 {
                errors.push(row_error(
                    Some(field.name.as_str()),
                    format!("Value {} of unique field '{}' already exists", value, field.name),
                ));
            }
        }

        let mut seen_many2one: Vec<&str> = Vec::new();
        let mut resolved: Vec<(&str, ObjectId)> = Vec::new();
        for (field, reference) in &record.links {
            if matches!(field.kind, FieldKind::Many2one { .. }) {
                if seen_many2one.contains(&field.name.as_str()) {
                    errors.push(row_error(
                        Some(field.name.as_str()),
                        "Many2one takes a single reference".into(),
                    ));
                }
                seen_many2one.push(field.name.as_str());
            }
            let comodel = field.comodel().unwrap_or_default();
            match self.find_reference(field, reference).await? {
                Some(id) => resolved.push((field.name.as_str(), id)),
                None => match (&reference.xid, &reference.name) {
                    (Some(xid), None) => errors.push(row_error(
                        Some(field.name.as_str()),
                        format!("External id '{}' not found in '{}'", xid, comodel),
                    )),
                    _ => {
                        if let Some(problem) = self.creation_problem(field, reference).await? {
                            errors.push(row_error(Some(field.name.as_str()), problem));
                        }
                    }
                },
            }
        }

        match record.existing {
            Some(id) => match self.check_rules(Operation::Write, &[id]).await {
                Err(OlafError::AccessDenied(message)) => errors.push(row_error(None, message)),
                other => other?,
            },
            None => {
                if let Some(rule) = self.rules(Operation::Create).await? {
                    let mut preview = self.preview(record)?;
                    for (name, id) in resolved {
                        if matches!(self.model().get_field(name).map(|f| &f.kind), Some(FieldKind::Many2one { .. })) {
                            preview.insert(name, id);
                        }
                    }
                    if !filter::matches(&preview, &rule)? {
                        errors.push(row_error(
                            None,
                            format!("Document level rules forbid creating this '{}' record", self.name()),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// The document `create` would store for a new record, Many2one
    /// references aside
    fn preview(&self, record: &PendingRecord<'_>) -> Result<Document> {
        let mut preview = doc! { "_id": ObjectId::new() };
        for field in self.model().writable_fields() {
            let value = match record.values.get(&field.name) {
                None | Some(Bson::Null) => match &field.default {
                    Some(default) => field.convert(self.name(), default)?,
                    None => Bson::Null,
                },
                Some(value) => value.clone(),
            };
            preview.insert(field.name.clone(), value);
        }
        let now = bson::DateTime::now();
        let uid = self.env().uid();
        preview.insert("create_date", now);
        preview.insert("write_date", now);
        preview.insert("create_uid", uid);
        preview.insert("write_uid", uid);
        Ok(preview)
    }

    /// Why the comodel record a reference asks for could not be created
    async fn creation_problem(&self, field: &Field, reference: &Reference) -> Result<Option<String>> {
        let comodel_name = field.comodel().unwrap_or_default();
        match security::check_access(self.env(), comodel_name, Operation::Create).await {
            Err(OlafError::AccessDenied(message)) => return Ok(Some(message)),
            other => other?,
        }

        let definition = self.env().registry().get(comodel_name)?;
        let rec_name = definition.rec_name();
        for required in definition.writable_fields().filter(|f| f.required && f.default.is_none()) {
            let named = reference.name.is_some() && rec_name == Some(required.name.as_str());
            if !named {
                return Ok(Some(format!(
                    "Cannot create a '{}' record from this reference: '{}' is required",
                    comodel_name, required.name
                )));
            }
        }

        let (Some(name), Some(rec_name)) = (&reference.name, rec_name) else {
            return Ok(None);
        };
        let Some(name_field) = definition.get_field(rec_name) else {
            return Ok(None);
        };
        let stored = match name_field.convert(comodel_name, name) {
            Ok(stored) => stored,
            Err(e) => return Ok(Some(e.to_string())),
        };
        if name_field.unique
            && self
                .env()
                .store()
                .count(comodel_name, doc! { rec_name: stored.clone() })
                .await?
                > 0
        {
            return Ok(Some(format!(
                "Value {} of unique field '{}' already exists in '{}'",
                stored, rec_name, comodel_name
            )));
        }
        Ok(None)
    }

    async fn write_pending(&self, record: PendingRecord<'_>) -> Result<ObjectId> {
        let mut values = record.values;
        let mut commands: HashMap<&str, Vec<Bson>> = HashMap::new();
        for (field, reference) in &record.links {
            let target = self.resolve_reference(field, reference).await?;
            if field.is_x2many() {
                commands
                    .entry(field.name.as_str())
                    .or_default()
                    .push(X2ManyCommand::Add(target).into());
            } else {
                values.insert(field.name.clone(), target);
            }
        }
        for (name, list) in commands {
            values.insert(name, Bson::Array(list));
        }

        if let Some(id) = record.existing {
            self.with_ids(vec![id]).write(values).await?;
            return Ok(id);
        }

        let id = ObjectId::new();
        values.insert("_id", id);
        self.create(values).await?;
        let xid = record
            .xid
            .unwrap_or_else(|| format!("{}.{}", IMPORT_PREFIX, id.to_hex()));
        self.register_xid(self.name(), &xid, id).await?;
        Ok(id)
    }

    /// Existing comodel record a reference points to
    async fn find_reference(&self, field: &Field, reference: &Reference) -> Result<Option<ObjectId>> {
        let comodel_name = field.comodel().unwrap_or_default();
        if let Some(xid) = &reference.xid {
            return self.xid_lookup(comodel_name, xid).await;
        }
        let comodel = self.env().model(comodel_name)?;
        if let (Some(name), Some(rec_name)) = (&reference.name, comodel.model().rec_name()) {
            let mut filter = Document::new();
            filter.insert(rec_name, name.clone());
            return Ok(comodel.search(filter).await?.ids().first().copied());
        }
        Ok(None)
    }

    /// Id of the comodel record a reference points to, creating it when
    /// it does not exist yet
    async fn resolve_reference(&self, field: &Field, reference: &Reference) -> Result<ObjectId> {
        if let Some(id) = self.find_reference(field, reference).await? {
            return Ok(id);
        }
        let comodel_name = field.comodel().unwrap_or_default();
        let comodel = self.env().model(comodel_name)?;
        let rec_name = comodel.model().rec_name().map(str::to_string);

        let mut values = Document::new();
        if let (Some(name), Some(rec_name)) = (&reference.name, &rec_name) {
            values.insert(rec_name.as_str(), name.clone());
        }
        let created = comodel.create(values).await?;
        let id = created.id()?;
        let xid = reference
            .xid
            .clone()
            .unwrap_or_else(|| format!("{}.{}", IMPORT_PREFIX, id.to_hex()));
        self.register_xid(comodel_name, &xid, id).await?;
        Ok(id)
    }

    /// Create or update the record known by an external id
    pub async fn upsert_xid(&self, xid: &str, values: Document) -> Result<DocSet> {
        if let Some(id) = self.xid_lookup(self.name(), xid).await? {
            let record = self.with_ids(vec![id]);
            if !record.existing_ids().await?.is_empty() {
                record.write(values).await?;
                return Ok(record);
            }
            self.env()
                .store()
                .delete_many(XID_MODEL, doc! { "name": xid, "model": self.name() })
                .await?;
        }
        let created = self.create(values).await?;
        self.register_xid(self.name(), xid, created.id()?).await?;
        Ok(created)
    }

    /// Record known by an external id
    pub async fn by_xid(&self, xid: &str) -> Result<DocSet> {
        let id = self.xid_lookup(self.name(), xid).await?.ok_or_else(|| {
            OlafError::NotFound(format!(
                "External id '{}' not found in '{}'",
                xid,
                self.name()
            ))
        })?;
        self.browse(id).await
    }

    pub(crate) async fn xid_lookup(&self, model: &str, xid: &str) -> Result<Option<ObjectId>> {
        let found = self
            .env()
            .store()
            .find_one(XID_MODEL, doc! { "name": xid, "model": model })
            .await?;
        Ok(found.and_then(|d| d.get_object_id("res_id").ok()))
    }

    /// Point the external id `xid` of `model` at `id`, replacing any
    /// previous target
    pub(crate) async fn register_xid(&self, model: &str, xid: &str, id: ObjectId) -> Result<()> {
        let now = bson::DateTime::now();
        let uid = self.env().uid();
        let store = self.env().store();
        let key = doc! { "name": xid, "model": model };
        let matched = store
            .update_many(
                XID_MODEL,
                key,
                doc! { "$set": { "res_id": id, "write_date": now, "write_uid": uid } },
            )
            .await?;
        if matched == 0 {
            store
                .insert_one(
                    XID_MODEL,
                    doc! {
                        "_id": ObjectId::new(),
                        "name": xid,
                        "model": model,
                        "res_id": id,
                        "create_date": now,
                        "write_date": now,
                        "create_uid": uid,
                        "write_uid": uid,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelDefinition {
        ModelDefinition::new("test.load")
            .field(Field::char("name"))
            .field(Field::integer("age"))
            .field(Field::many2one("partner_id", "test.partner"))
            .field(Field::many2many(
                "tag_ids",
                "test.tag",
                "test.load.tag.rel",
                "load_oid",
                "tag_oid",
            ))
    }

    #[test]
    fn test_parse_columns() {
        let model = model();
        let columns =
            parse_columns(&model, &["id", "name", "partner_id/id", "tag_ids/name"]).unwrap();
        assert!(matches!(columns[0], Column::Xid));
        assert!(matches!(columns[1], Column::Value(f) if f.name == "name"));
        assert!(matches!(columns[2], Column::Sub(f, SubKey::Id) if f.name == "partner_id"));
        assert!(matches!(columns[3], Column::Sub(f, SubKey::Name) if f.name == "tag_ids"));
    }

    #[test]
    fn test_parse_columns_rejects() {
        let model = model();
        assert!(parse_columns(&model, &["nope"]).is_err());
        assert!(parse_columns(&model, &["name/id"]).is_err());
        assert!(parse_columns(&model, &["partner_id/email"]).is_err());
        assert!(parse_columns(&model, &["tag_ids"]).is_err());
        assert!(parse_columns(&model, &["_id"]).is_err());
    }

    #[test]
    fn test_row_references_groups_by_field() {
        let model = model();
        let columns =
            parse_columns(&model, &["name", "tag_ids/id", "tag_ids/name", "partner_id/id"]).unwrap();
        let row = vec![
            Bson::from("x"),
            Bson::from("tag_1"),
            Bson::from("Tag One"),
            Bson::from(""),
        ];
        let refs = row_references(&columns, &row);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0.name, "tag_ids");
        assert_eq!(refs[0].1.xid.as_deref(), Some("tag_1"));
        assert_eq!(refs[0].1.name, Some(Bson::from("Tag One")));
    }

    #[test]
    fn test_empty_cells() {
        assert!(is_empty_cell(None));
        assert!(is_empty_cell(Some(&Bson::Null)));
        assert!(is_empty_cell(Some(&Bson::from("  "))));
        assert!(!is_empty_cell(Some(&Bson::Int32(0))));
    }

    #[tokio::test]
    async fn test_register_xid_replaces_target() {
        use std::sync::Arc;

        use crate::db::{DocumentStore, MemoryStore};
        use crate::odm::Environment;

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let registry = crate::modules::bootstrap(store.clone(), crate::addons::builtin().unwrap(), "pw")
            .await
            .unwrap();
        let groups = Environment::root(registry, store.clone())
            .model("base.group")
            .unwrap();

        let first = ObjectId::new();
        let second = ObjectId::new();
        groups.register_xid("base.group", "base.staff", first).await.unwrap();
        groups.register_xid("base.group", "base.staff", second).await.unwrap();

        let rows = store
            .count(XID_MODEL, doc! { "name": "base.staff", "model": "base.group" })
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(
            groups.xid_lookup("base.group", "base.staff").await.unwrap(),
            Some(second)
        );
    }
}
