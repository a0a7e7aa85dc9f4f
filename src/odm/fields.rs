//! Field definitions and value conversion
//!
//! A field knows how to turn whatever a caller hands it (JSON-ish input,
//! import cells, typed BSON) into the value stored in MongoDB.

use std::fmt;
use std::str::FromStr;

use bson::{oid::ObjectId, Bson};
use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::auth::password::{hash_password, is_password_hash};
use crate::types::{OlafError, Result};

/// Default maximum length of `Char` fields
pub const DEFAULT_CHAR_LENGTH: usize = 255;

/// Fields every model carries, maintained by the ODM itself
pub const MAGIC_FIELDS: [&str; 5] = ["_id", "create_date", "write_date", "create_uid", "write_uid"];

pub fn is_magic(name: &str) -> bool {
    MAGIC_FIELDS.contains(&name)
}

/// What happens to referencing records when the target of a Many2one is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum OnDelete {
    #[serde(rename = "cascade", alias = "CASCADE")]
    Cascade,
    #[serde(rename = "restrict", alias = "RESTRICT")]
    Restrict,
    #[default]
    #[serde(rename = "set null", alias = "SET NULL", alias = "set_null")]
    SetNull,
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cascade => "cascade",
            Self::Restrict => "restrict",
            Self::SetNull => "set null",
        })
    }
}

impl FromStr for OnDelete {
    type Err = OlafError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', " ").as_str() {
            "cascade" => Ok(Self::Cascade),
            "restrict" => Ok(Self::Restrict),
            "set null" => Ok(Self::SetNull),
            other => Err(OlafError::Validation(format!("Unknown ondelete policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Identifier,
    Char { max_length: usize },
    Integer,
    Float,
    Boolean,
    DateTime,
    Selection { choices: Vec<String> },
    Password,
    Many2one { comodel: String, ondelete: OnDelete },
    One2many { comodel: String, inverse: String },
    Many2many {
        comodel: String,
        relation: String,
        field_a: String,
        field_b: String,
    },
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::Char { .. } => "char",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "datetime",
            Self::Selection { .. } => "selection",
            Self::Password => "password",
            Self::Many2one { .. } => "many2one",
            Self::One2many { .. } => "one2many",
            Self::Many2many { .. } => "many2many",
        }
    }
}

/// One field of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    pub default: Option<Bson>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            default: None,
        }
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Identifier)
    }

    pub fn char(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Char {
                max_length: DEFAULT_CHAR_LENGTH,
            },
        )
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn password(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Password)
    }

    pub fn selection<S: Into<String>>(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Selection {
                choices: choices.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn many2one(name: impl Into<String>, comodel: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Many2one {
                comodel: comodel.into(),
                ondelete: OnDelete::default(),
            },
        )
    }

    pub fn one2many(
        name: impl Into<String>,
        comodel: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::One2many {
                comodel: comodel.into(),
                inverse: inverse.into(),
            },
        )
    }

    pub fn many2many(
        name: impl Into<String>,
        comodel: impl Into<String>,
        relation: impl Into<String>,
        field_a: impl Into<String>,
        field_b: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Many2many {
                comodel: comodel.into(),
                relation: relation.into(),
                field_a: field_a.into(),
                field_b: field_b.into(),
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Only meaningful on `Char` fields
    pub fn max_length(mut self, length: usize) -> Self {
        if let FieldKind::Char { max_length } = &mut self.kind {
            *max_length = length;
        }
        self
    }

    /// Only meaningful on `Many2one` fields
    pub fn ondelete(mut self, policy: OnDelete) -> Self {
        if let FieldKind::Many2one { ondelete, .. } = &mut self.kind {
            *ondelete = policy;
        }
        self
    }

    /// One2many and Many2many values live outside the record document
    pub fn is_stored(&self) -> bool {
        !self.is_x2many()
    }

    pub fn is_x2many(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::One2many { .. } | FieldKind::Many2many { .. }
        )
    }

    pub fn is_relational(&self) -> bool {
        self.comodel().is_some()
    }

    pub fn comodel(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Many2one { comodel, .. }
            | FieldKind::One2many { comodel, .. }
            | FieldKind::Many2many { comodel, .. } => Some(comodel),
            _ => None,
        }
    }

    /// Convert an incoming value to its stored form. `Null` passes through;
    /// required checks belong to the caller.
    pub fn convert(&self, model: &str, value: &Bson) -> Result<Bson> {
        if matches!(value, Bson::Null) {
            return Ok(Bson::Null);
        }
        let invalid = |detail: String| {
            OlafError::Validation(format!(
                "Field '{}' of model '{}': {}",
                self.name, model, detail
            ))
        };

        match &self.kind {
            FieldKind::Identifier => to_object_id(value)
                .map(Bson::ObjectId)
                .map_err(|e| invalid(e.to_string())),
            FieldKind::Char { max_length } => {
                let text = match value {
                    Bson::String(s) => s.clone(),
                    Bson::Int32(i) => i.to_string(),
                    Bson::Int64(i) => i.to_string(),
                    Bson::Double(d) => d.to_string(),
                    Bson::Boolean(b) => b.to_string(),
                    Bson::ObjectId(oid) => oid.to_hex(),
                    other => return Err(invalid(format!("expected text, got {}", other))),
                };
                if text.chars().count() > *max_length {
                    return Err(invalid(format!(
                        "value exceeds maximum length of {}",
                        max_length
                    )));
                }
                Ok(Bson::String(text))
            }
            FieldKind::Integer => match value {
                Bson::Int32(i) => Ok(Bson::Int64(*i as i64)),
                Bson::Int64(i) => Ok(Bson::Int64(*i)),
                Bson::Double(d) if d.is_finite() => Ok(Bson::Int64(d.trunc() as i64)),
                Bson::Boolean(b) => Ok(Bson::Int64(*b as i64)),
                Bson::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Bson::Int64)
                    .map_err(|_| invalid(format!("'{}' is not an integer", s))),
                other => Err(invalid(format!("expected integer, got {}", other))),
            },
            FieldKind::Float => match value {
                Bson::Int32(i) => Ok(Bson::Double(*i as f64)),
                Bson::Int64(i) => Ok(Bson::Double(*i as f64)),
                Bson::Double(d) => Ok(Bson::Double(*d)),
                Bson::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Bson::Double)
                    .map_err(|_| invalid(format!("'{}' is not a number", s))),
                other => Err(invalid(format!("expected number, got {}", other))),
            },
            FieldKind::Boolean => match value {
                Bson::Boolean(b) => Ok(Bson::Boolean(*b)),
                Bson::Int32(i) => Ok(Bson::Boolean(*i != 0)),
                Bson::Int64(i) => Ok(Bson::Boolean(*i != 0)),
                Bson::Double(d) => Ok(Bson::Boolean(*d != 0.0)),
                Bson::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(Bson::Boolean(true)),
                    "false" | "0" | "no" | "" => Ok(Bson::Boolean(false)),
                    _ => Err(invalid(format!("'{}' is not a boolean", s))),
                },
                other => Err(invalid(format!("expected boolean, got {}", other))),
            },
            FieldKind::DateTime => match value {
                Bson::DateTime(dt) => Ok(Bson::DateTime(*dt)),
                Bson::Int64(millis) => Ok(Bson::DateTime(bson::DateTime::from_millis(*millis))),
                Bson::String(s) => parse_datetime(s)
                    .map(Bson::DateTime)
                    .ok_or_else(|| invalid(format!("'{}' is not a date and time", s))),
                other => Err(invalid(format!("expected datetime, got {}", other))),
            },
            FieldKind::Selection { choices } => match value {
                Bson::String(s) if choices.iter().any(|c| c == s) => Ok(Bson::String(s.clone())),
                other => Err(invalid(format!(
                    "{} is not one of [{}]",
                    other,
                    choices.join(", ")
                ))),
            },
            FieldKind::Password => match value {
                Bson::String(s) if is_password_hash(s) => Ok(Bson::String(s.clone())),
                Bson::String(s) if !s.is_empty() => Ok(Bson::String(hash_password(s)?)),
                _ => Err(invalid("password must be a non-empty string".into())),
            },
            FieldKind::Many2one { .. } => match value {
                Bson::String(s) if s.is_empty() => Ok(Bson::Null),
                // `[id, name]` pairs as produced by `read`
                Bson::Array(pair) if !pair.is_empty() => to_object_id(&pair[0])
                    .map(Bson::ObjectId)
                    .map_err(|e| invalid(e.to_string())),
                other => to_object_id(other)
                    .map(Bson::ObjectId)
                    .map_err(|e| invalid(e.to_string())),
            },
            FieldKind::One2many { .. } | FieldKind::Many2many { .. } => Err(invalid(
                "x2many values must be written with commands".into(),
            )),
        }
    }
}

/// Accept an ObjectId or its 24-character hex form
pub fn to_object_id(value: &Bson) -> Result<ObjectId> {
    match value {
        Bson::ObjectId(oid) => Ok(*oid),
        Bson::String(s) => parse_object_id(s),
        Bson::Document(d) => match d.get_str("$oid") {
            Ok(hex) => parse_object_id(hex),
            Err(_) => Err(OlafError::InvalidId(format!("{} is not an ObjectId", value))),
        },
        other => Err(OlafError::InvalidId(format!("{} is not an ObjectId", other))),
    }
}

pub fn parse_object_id(s: &str) -> Result<ObjectId> {
    ObjectId::parse_str(s.trim())
        .map_err(|_| OlafError::InvalidId(format!("'{}' is not a valid ObjectId", s)))
}

fn parse_datetime(s: &str) -> Option<bson::DateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(bson::DateTime::from_chrono(dt.with_timezone(&Utc)));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| bson::DateTime::from_chrono(Utc.from_utc_datetime(&naive)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: &str = "test.model";

    #[test]
    fn test_char_length() {
        let f = Field::char("code").max_length(4);
        assert_eq!(f.convert(M, &Bson::from("abcd")).unwrap(), Bson::from("abcd"));
        assert!(matches!(
            f.convert(M, &Bson::from("abcde")),
            Err(OlafError::Validation(_))
        ));
        assert_eq!(f.convert(M, &Bson::Int32(12)).unwrap(), Bson::from("12"));

        let long = "x".repeat(DEFAULT_CHAR_LENGTH + 1);
        assert!(Field::char("name").convert(M, &Bson::from(long)).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        let f = Field::integer("age");
        assert_eq!(f.convert(M, &Bson::from("32")).unwrap(), Bson::Int64(32));
        assert_eq!(f.convert(M, &Bson::Double(31.4)).unwrap(), Bson::Int64(31));
        assert_eq!(f.convert(M, &Bson::Int32(7)).unwrap(), Bson::Int64(7));
        assert!(f.convert(M, &Bson::from("Thirtytwo")).is_err());
        assert_eq!(f.convert(M, &Bson::Null).unwrap(), Bson::Null);
    }

    #[test]
    fn test_boolean_coercion() {
        let f = Field::boolean("active");
        assert_eq!(f.convert(M, &Bson::Int32(1)).unwrap(), Bson::Boolean(true));
        assert_eq!(f.convert(M, &Bson::from("0")).unwrap(), Bson::Boolean(false));
        assert_eq!(f.convert(M, &Bson::from("True")).unwrap(), Bson::Boolean(true));
        assert!(f.convert(M, &Bson::from("maybe")).is_err());
    }

    #[test]
    fn test_datetime_parsing() {
        let f = Field::datetime("when");
        let parsed = f.convert(M, &Bson::from("2024-03-01T10:00:00Z")).unwrap();
        let Bson::DateTime(dt) = parsed else {
            panic!("expected datetime");
        };
        assert_eq!(dt.to_chrono().to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(f.convert(M, &Bson::from("2024-03-01 10:00:00")).is_ok());
        assert!(f.convert(M, &Bson::from("yesterday")).is_err());
    }

    #[test]
    fn test_selection() {
        let f = Field::selection("state", ["draft", "done"]);
        assert!(f.convert(M, &Bson::from("draft")).is_ok());
        assert!(f.convert(M, &Bson::from("cancel")).is_err());
    }

    #[test]
    fn test_many2one_accepts_ids() {
        let f = Field::many2one("partner_id", "res.partner");
        let id = ObjectId::new();
        assert_eq!(f.convert(M, &Bson::from(id.to_hex())).unwrap(), Bson::ObjectId(id));
        assert_eq!(
            f.convert(M, &Bson::Array(vec![Bson::ObjectId(id), Bson::from("Name")]))
                .unwrap(),
            Bson::ObjectId(id)
        );
        assert_eq!(f.convert(M, &Bson::from("")).unwrap(), Bson::Null);
        assert!(f.convert(M, &Bson::from("not-an-id")).is_err());
    }

    #[test]
    fn test_password_is_hashed_once() {
        let f = Field::password("password");
        let Bson::String(hash) = f.convert(M, &Bson::from("Apple")).unwrap() else {
            panic!("expected string");
        };
        assert!(is_password_hash(&hash));
        assert_eq!(f.convert(M, &Bson::from(hash.clone())).unwrap(), Bson::from(hash));

        // Looks like a hash but is not one: stored hashed like any password
        let fake = "$argon2-but-not-really";
        let Bson::String(stored) = f.convert(M, &Bson::from(fake)).unwrap() else {
            panic!("expected string");
        };
        assert_ne!(stored, fake);
        assert!(crate::auth::verify_password(fake, &stored).unwrap());
    }

    #[test]
    fn test_ondelete_parse() {
        assert_eq!("CASCADE".parse::<OnDelete>().unwrap(), OnDelete::Cascade);
        assert_eq!("set_null".parse::<OnDelete>().unwrap(), OnDelete::SetNull);
        assert!("ignore".parse::<OnDelete>().is_err());
        assert_eq!(
            Field::many2one("x", "y").ondelete(OnDelete::Restrict).kind,
            FieldKind::Many2one {
                comodel: "y".into(),
                ondelete: OnDelete::Restrict
            }
        );
    }
}
