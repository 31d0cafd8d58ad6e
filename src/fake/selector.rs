//! Label and field selector matching for the fake client

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::In(k, vs) => labels.get(k).is_some_and(|v| vs.contains(v)),
            Requirement::NotIn(k, vs) => labels.get(k).map_or(true, |v| !vs.contains(v)),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

/// Parsed `ListParams::label_selector`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector such as `app=web,tier!=db,env in (prod,staging),!legacy`
    pub fn parse(selector: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::InvalidObject(format!("invalid label selector {:?}: {}", selector, reason))
        };

        if selector.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut requirements = Vec::new();
        for term in split_terms(selector).map_err(|reason| invalid(reason))? {
            let term = term.trim();
            if term.is_empty() {
                return Err(invalid("empty requirement"));
            }

            let requirement = if let Some(key) = term.strip_prefix('!') {
                Requirement::DoesNotExist(label_key(key).ok_or_else(|| invalid("bad key"))?)
            } else if let Some(open) = term.find('(') {
                let values = term[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("unterminated value set"))?
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .collect::<Vec<_>>();

                let mut head = term[..open].split_whitespace();
                let (key, op) = match (head.next(), head.next(), head.next()) {
                    (Some(key), Some(op), None) => (key, op),
                    _ => return Err(invalid("expected `<key> in (...)` or `<key> notin (...)`")),
                };
                let key = label_key(key).ok_or_else(|| invalid("bad key"))?;
                match op {
                    "in" => Requirement::In(key, values),
                    "notin" => Requirement::NotIn(key, values),
                    other => return Err(invalid(&format!("unknown operator {:?}", other))),
                }
            } else if let Some((k, v)) = term.split_once("!=") {
                Requirement::NotEquals(
                    label_key(k).ok_or_else(|| invalid("bad key"))?,
                    v.trim().to_string(),
                )
            } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                Requirement::Equals(
                    label_key(k).ok_or_else(|| invalid("bad key"))?,
                    v.trim().to_string(),
                )
            } else {
                Requirement::Exists(label_key(term).ok_or_else(|| invalid("bad key"))?)
            };

            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }

    /// True when every requirement holds for the object's labels
    pub fn matches(&self, obj: &Value) -> bool {
        if self.requirements.is_empty() {
            return true;
        }

        let labels: BTreeMap<String, String> = obj
            .pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        self.requirements.iter().all(|r| r.matches(&labels))
    }
}

/// Parsed `ListParams::field_selector`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldSelector {
    // (dotted path, expected value, negated)
    requirements: Vec<(String, String, bool)>,
}

impl FieldSelector {
    /// Parse a selector such as `metadata.name=web,status.phase!=Failed`
    pub fn parse(selector: &str) -> Result<Self> {
        if selector.trim().is_empty() {
            return Ok(Self::default());
        }

        let mut requirements = Vec::new();
        for term in selector.split(',') {
            let term = term.trim();
            let (path, value, negated) = if let Some((p, v)) = term.split_once("!=") {
                (p, v, true)
            } else if let Some((p, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                (p, v, false)
            } else {
                return Err(Error::InvalidObject(format!(
                    "invalid field selector {:?}: {:?} has no operator",
                    selector, term
                )));
            };

            let path = path.trim();
            if path.is_empty() || path.contains(char::is_whitespace) {
                return Err(Error::InvalidObject(format!(
                    "invalid field selector {:?}: bad field {:?}",
                    selector, path
                )));
            }

            requirements.push((path.to_string(), value.trim().to_string(), negated));
        }

        Ok(Self { requirements })
    }

    /// True when every field comparison holds; missing fields compare as empty
    pub fn matches(&self, obj: &Value) -> bool {
        self.requirements.iter().all(|(path, expected, negated)| {
            let actual = field_value(obj, path);
            (actual == *expected) != *negated
        })
    }
}

fn field_value(obj: &Value, path: &str) -> String {
    let mut current = obj;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }

    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn label_key(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() || key.contains(|c: char| c.is_whitespace() || "=!(),".contains(c)) {
        None
    } else {
        Some(key.to_string())
    }
}

/// Split on commas that are not inside a value set
fn split_terms(selector: &str) -> std::result::Result<Vec<&str>, &'static str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or("unbalanced parentheses")?,
            ',' if depth == 0 => {
                terms.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unbalanced parentheses");
    }
    terms.push(&selector[start..]);
    Ok(terms)
}
