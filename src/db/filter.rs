//! MongoDB query evaluation against in-memory documents
//!
//! Used by [`MemoryStore`](super::MemoryStore) for every query and by the
//! security layer to test a document that is not stored yet.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::RegexBuilder;

use crate::types::{OlafError, Result};

/// True if `doc` satisfies `filter`
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_filters(key, condition)? {
                    if matches(doc, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(OlafError::BadRequest(format!(
                    "Unsupported query operator {}",
                    op
                )))
            }
            path => match_field(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolve a dotted path such as `partner.address.city`
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Ordering used by `$gt`/`$lt` and by sorts. `None` when the types differ.
pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Sort documents in place following a MongoDB sort document
pub fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (key, direction) in sort {
            let descending = as_f64(direction).map(|d| d < 0.0).unwrap_or(false);
            let ordering = match (lookup(a, key), lookup(b, key)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = if descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn sub_filters<'a>(op: &str, condition: &'a Bson) -> Result<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(OlafError::BadRequest(format!("{} expects an array", op)));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(OlafError::BadRequest(format!(
                "{} expects an array of documents",
                op
            ))),
        })
        .collect()
}

fn match_field(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    match condition {
        Bson::Document(ops) if is_operator_doc(ops) => {
            for (op, arg) in ops {
                if op == "$options" {
                    continue;
                }
                if !apply_operator(value, op, arg, ops)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Bson::RegularExpression(re) => regex_match(value, &re.pattern, &re.options),
        _ => Ok(equals(value, condition)),
    }
}

fn is_operator_doc(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

fn apply_operator(value: Option<&Bson>, op: &str, arg: &Bson, ops: &Document) -> Result<bool> {
    Ok(match op {
        "$eq" => equals(value, arg),
        "$ne" => !equals(value, arg),
        "$gt" => compare_with(value, arg, |o| o == Ordering::Greater),
        "$gte" => compare_with(value, arg, |o| o != Ordering::Less),
        "$lt" => compare_with(value, arg, |o| o == Ordering::Less),
        "$lte" => compare_with(value, arg, |o| o != Ordering::Greater),
        "$in" => in_list(value, op, arg)?,
        "$nin" => !in_list(value, op, arg)?,
        "$exists" => value.is_some() == truthy(arg),
        "$size" => match (value, as_f64(arg)) {
            (Some(Bson::Array(items)), Some(n)) => items.len() as f64 == n,
            _ => false,
        },
        "$regex" => {
            let options = ops.get_str("$options").unwrap_or_default();
            match arg {
                Bson::String(pattern) => regex_match(value, pattern, options)?,
                Bson::RegularExpression(re) => {
                    let options = if options.is_empty() {
                        re.options.as_str()
                    } else {
                        options
                    };
                    regex_match(value, &re.pattern, options)?
                }
                _ => return Err(OlafError::BadRequest("$regex expects a string".into())),
            }
        }
        "$not" => match arg {
            Bson::Document(inner) if is_operator_doc(inner) => !match_field(value, arg)?,
            Bson::RegularExpression(re) => !regex_match(value, &re.pattern, &re.options)?,
            _ => {
                return Err(OlafError::BadRequest(
                    "$not expects an operator document or a regex".into(),
                ))
            }
        },
        other => {
            return Err(OlafError::BadRequest(format!(
                "Unsupported query operator {}",
                other
            )))
        }
    })
}

fn in_list(value: Option<&Bson>, op: &str, arg: &Bson) -> Result<bool> {
    let Bson::Array(candidates) = arg else {
        return Err(OlafError::BadRequest(format!("{} expects an array", op)));
    };
    for candidate in candidates {
        let hit = match candidate {
            Bson::RegularExpression(re) => regex_match(value, &re.pattern, &re.options)?,
            _ => equals(value, candidate),
        };
        if hit {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Equality with MongoDB array semantics: an array field matches if any
/// element (or the whole array) equals the expected value. A missing field
/// equals null.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) => {
            bson_eq(&Bson::Array(items.clone()), expected)
                || items.iter().any(|item| bson_eq(item, expected))
        }
        Some(v) => bson_eq(v, expected),
    }
}

fn bson_eq(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_with(value: Option<&Bson>, arg: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, arg).map(&accept).unwrap_or(false)),
        Some(v) => compare(v, arg).map(accept).unwrap_or(false),
    }
}

fn regex_match(value: Option<&Bson>, pattern: &str, options: &str) -> Result<bool> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| OlafError::BadRequest(format!("Invalid regex '{}': {}", pattern, e)))?;

    Ok(match value {
        Some(Bson::String(s)) => re.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if re.is_match(s))),
        _ => false,
    })
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map(|n| n != 0.0).unwrap_or(true),
    }
}
