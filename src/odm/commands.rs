//! x2many write commands
//!
//! One2many and Many2many fields are written with commands instead of
//! plain values:
//!
//! ```text
//! ["create", {values}]     ["write", id, {values}]    ["purge", id]
//! ["remove", id]           ["add", id]                "clear"
//! ["replace", [ids]]
//! ```
//!
//! A field value is either one command or a list of commands.

use bson::{doc, oid::ObjectId, Bson, Document};

use super::docset::DocSet;
use super::fields::{to_object_id, Field, FieldKind};
use crate::types::{OlafError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum X2ManyCommand {
    /// Create a related record and link it
    Create(Document),
    /// Update a related record
    Write(ObjectId, Document),
    /// Delete a related record
    Purge(ObjectId),
    /// Unlink a related record without deleting it
    Remove(ObjectId),
    /// Link an existing record
    Add(ObjectId),
    /// Unlink every related record
    Clear,
    /// Unlink everything, then link exactly these records
    Replace(Vec<ObjectId>),
}

impl X2ManyCommand {
    /// Parse a field value holding one command or a list of commands
    pub fn parse_many(value: &Bson) -> Result<Vec<Self>> {
        match value {
            Bson::Null => Ok(Vec::new()),
            Bson::String(_) => Ok(vec![Self::parse(value)?]),
            Bson::Array(items) if matches!(items.first(), Some(Bson::String(_))) => {
                Ok(vec![Self::parse(value)?])
            }
            Bson::Array(items) => items.iter().map(Self::parse).collect(),
            other => Err(invalid(format!(
                "expected a command or a list of commands, got {}",
                other
            ))),
        }
    }

    /// Parse a single command
    pub fn parse(value: &Bson) -> Result<Self> {
        let (name, args): (&str, &[Bson]) = match value {
            Bson::String(name) => (name, &[]),
            Bson::Array(items) => match items.split_first() {
                Some((Bson::String(name), args)) => (name, args),
                _ => return Err(invalid(format!("{} is not a command", value))),
            },
            other => return Err(invalid(format!("{} is not a command", other))),
        };

        let arg = |index: usize| {
            args.get(index)
                .ok_or_else(|| invalid(format!("'{}' is missing argument {}", name, index + 1)))
        };
        let values = |index: usize| match arg(index)? {
            Bson::Document(values) => Ok(values.clone()),
            other => Err(invalid(format!("'{}' expects values, got {}", name, other))),
        };

        match name {
            "create" => Ok(Self::Create(values(0)?)),
            "write" => Ok(Self::Write(to_object_id(arg(0)?)?, values(1)?)),
            "purge" => Ok(Self::Purge(to_object_id(arg(0)?)?)),
            "remove" => Ok(Self::Remove(to_object_id(arg(0)?)?)),
            "add" => Ok(Self::Add(to_object_id(arg(0)?)?)),
            "clear" => Ok(Self::Clear),
            "replace" => match arg(0)? {
                Bson::Array(ids) => Ok(Self::Replace(
                    ids.iter().map(to_object_id).collect::<Result<_>>()?,
                )),
                other => Err(invalid(format!("'replace' expects a list of ids, got {}", other))),
            },
            other => Err(invalid(format!("unknown command '{}'", other))),
        }
    }
}

impl From<X2ManyCommand> for Bson {
    fn from(command: X2ManyCommand) -> Self {
        let items = match command {
            X2ManyCommand::Create(values) => vec![Bson::from("create"), Bson::Document(values)],
            X2ManyCommand::Write(id, values) => {
                vec![Bson::from("write"), Bson::ObjectId(id), Bson::Document(values)]
            }
            X2ManyCommand::Purge(id) => vec![Bson::from("purge"), Bson::ObjectId(id)],
            X2ManyCommand::Remove(id) => vec![Bson::from("remove"), Bson::ObjectId(id)],
            X2ManyCommand::Add(id) => vec![Bson::from("add"), Bson::ObjectId(id)],
            X2ManyCommand::Clear => vec![Bson::from("clear")],
            X2ManyCommand::Replace(ids) => vec![
                Bson::from("replace"),
                Bson::Array(ids.into_iter().map(Bson::ObjectId).collect()),
            ],
        };
        Bson::Array(items)
    }
}

fn invalid(detail: String) -> OlafError {
    OlafError::Validation(format!("Invalid x2many command: {}", detail))
}

impl DocSet {
    /// Apply commands to an x2many field of a singleton
    pub(crate) async fn apply_commands(&self, field: &Field, commands: &[X2ManyCommand]) -> Result<()> {
        let id = self.id()?;
        let comodel_name = field.comodel().unwrap_or_default();
        let comodel = self.env().model(comodel_name)?;

        match &field.kind {
            FieldKind::One2many { inverse, .. } => {
                let inverse = inverse.as_str();
                for command in commands {
                    match command {
                        X2ManyCommand::Create(values) => {
                            let mut values = values.clone();
                            values.insert(inverse, id);
                            comodel.create(values).await?;
                        }
                        X2ManyCommand::Write(target, values) => {
                            comodel.with_ids(vec![*target]).write(values.clone()).await?
                        }
                        X2ManyCommand::Purge(target) => {
                            comodel.with_ids(vec![*target]).unlink().await?;
                        }
                        X2ManyCommand::Remove(target) => {
                            comodel
                                .with_ids(vec![*target])
                                .write(doc! { inverse: Bson::Null })
                                .await?
                        }
                        X2ManyCommand::Add(target) => {
                            comodel.with_ids(vec![*target]).write(doc! { inverse: id }).await?
                        }
                        X2ManyCommand::Clear => self.clear_one2many(field, &comodel, inverse).await?,
                        X2ManyCommand::Replace(targets) => {
                            self.clear_one2many(field, &comodel, inverse).await?;
                            comodel
                                .with_ids(targets.clone())
                                .write(doc! { inverse: id })
                                .await?
                        }
                    }
                }
            }
            FieldKind::Many2many {
                relation,
                field_a,
                field_b,
                ..
            } => {
                let (a, b) = (field_a.as_str(), field_b.as_str());
                let store = self.env().store();
                for command in commands {
                    match command {
                        X2ManyCommand::Create(values) => {
                            let created = comodel.create(values.clone()).await?;
                            self.link(&comodel, relation, a, b, created.id()?).await?;
                        }
                        X2ManyCommand::Write(target, values) => {
                            comodel.with_ids(vec![*target]).write(values.clone()).await?
                        }
                        X2ManyCommand::Purge(target) => {
                            comodel.with_ids(vec![*target]).unlink().await?;
                        }
                        X2ManyCommand::Remove(target) => {
                            store.delete_many(relation, doc! { a: id, b: *target }).await?;
                        }
                        X2ManyCommand::Add(target) => {
                            self.link(&comodel, relation, a, b, *target).await?
                        }
                        X2ManyCommand::Clear => {
                            store.delete_many(relation, doc! { a: id }).await?;
                        }
                        X2ManyCommand::Replace(targets) => {
                            store.delete_many(relation, doc! { a: id }).await?;
                            for target in targets {
                                self.link(&comodel, relation, a, b, *target).await?;
                            }
                        }
                    }
                }
            }
            _ => {
                return Err(OlafError::Validation(format!(
                    "Field '{}' of '{}' does not take x2many commands",
                    field.name,
                    self.name()
                )))
            }
        }
        Ok(())
    }

    async fn clear_one2many(&self, field: &Field, comodel: &DocSet, inverse: &str) -> Result<()> {
        let id = self.id()?;
        let linked = self
            .x2many_links(field, &[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        if linked.is_empty() {
            return Ok(());
        }
        comodel
            .with_ids(linked)
            .write(doc! { inverse: Bson::Null })
            .await
    }

    /// Insert a relation row unless it already exists
    async fn link(
        &self,
        comodel: &DocSet,
        relation: &str,
        a: &str,
        b: &str,
        target: ObjectId,
    ) -> Result<()> {
        let id = self.id()?;
        let store = self.env().store();
        if store.count(comodel.name(), doc! { "_id": target }).await? == 0 {
            return Err(OlafError::NotFound(format!(
                "Record {} of '{}' does not exist",
                target,
                comodel.name()
            )));
        }
        if store.count(relation, doc! { a: id, b: target }).await? == 0 {
            store
                .insert_one(relation, doc! { "_id": ObjectId::new(), a: id, b: target })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_list() {
        let id = ObjectId::new();
        let single = Bson::Array(vec![Bson::from("add"), Bson::ObjectId(id)]);
        assert_eq!(
            X2ManyCommand::parse_many(&single).unwrap(),
            vec![X2ManyCommand::Add(id)]
        );

        let list = Bson::Array(vec![
            Bson::Array(vec![Bson::from("create"), Bson::Document(doc! { "name": "x" })]),
            Bson::from("clear"),
            Bson::Array(vec![Bson::from("write"), Bson::from(id.to_hex()), Bson::Document(doc! {})]),
        ]);
        assert_eq!(
            X2ManyCommand::parse_many(&list).unwrap(),
            vec![
                X2ManyCommand::Create(doc! { "name": "x" }),
                X2ManyCommand::Clear,
                X2ManyCommand::Write(id, doc! {}),
            ]
        );
        assert!(X2ManyCommand::parse_many(&Bson::Array(vec![])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(X2ManyCommand::parse(&Bson::from("explode")).is_err());
        assert!(X2ManyCommand::parse(&Bson::Array(vec![Bson::from("add")])).is_err());
        assert!(X2ManyCommand::parse(&Bson::Array(vec![
            Bson::from("create"),
            Bson::from("not values")
        ]))
        .is_err());
        assert!(X2ManyCommand::parse_many(&Bson::Int32(4)).is_err());
    }

    #[test]
    fn test_bson_form_parses_back() {
        let ids = vec![ObjectId::new(), ObjectId::new()];
        let command = X2ManyCommand::Replace(ids.clone());
        let parsed = X2ManyCommand::parse(&Bson::from(command.clone())).unwrap();
        assert_eq!(parsed, command);
    }
}
