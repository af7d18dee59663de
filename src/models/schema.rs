use std::collections::BTreeMap;
use std::fmt;

use bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::models::{NewRecord, RecordPatch};
use crate::error::AppError;

/// Fields a client may never set directly.
const RESERVED_FIELDS: &[&str] = &["id", "_id", "owner", "revision"];

/// JSON type accepted for a kind-specific field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    StringList,
    Object,
    Any,
}

impl FieldKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList => "list of strings",
            FieldKind::Object => "object",
            FieldKind::Any => "any value",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

/// The kind-specific part of a record body.
///
/// The common fields (`title`, `editors`, `viewers`, `visible`) are always
/// accepted; anything else must be declared here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSchema {
    pub fields: BTreeMap<String, FieldSpec>,
}

impl RecordSchema {
    /// Validate a create body. Null values count as absent.
    pub fn validate_new(&self, body: Value) -> Result<NewRecord, AppError> {
        let mut body = into_object(body)?;
        reject_reserved(&body)?;

        let title = match take_non_null(&mut body, "title") {
            Some(value) => parse_title(value)?,
            None => return Err(AppError::Validation("Field 'title' is required".into())),
        };
        let editors = take_non_null(&mut body, "editors")
            .map(|v| parse_usernames("editors", v))
            .transpose()?
            .unwrap_or_default();
        let viewers = take_non_null(&mut body, "viewers")
            .map(|v| parse_usernames("viewers", v))
            .transpose()?
            .unwrap_or_default();
        let visible = take_non_null(&mut body, "visible")
            .map(parse_visible)
            .transpose()?;

        for (name, spec) in &self.fields {
            if spec.required && body.get(name).map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("Field '{name}' is required")));
            }
        }

        Ok(NewRecord {
            title,
            editors,
            viewers,
            visible,
            fields: self.schema_fields(body)?,
        })
    }

    /// Validate an update body. Null values mean "leave unchanged".
    pub fn validate_patch(&self, body: Value) -> Result<RecordPatch, AppError> {
        let mut body = into_object(body)?;
        reject_reserved(&body)?;

        Ok(RecordPatch {
            title: take_non_null(&mut body, "title")
                .map(parse_title)
                .transpose()?,
            editors: take_non_null(&mut body, "editors")
                .map(|v| parse_usernames("editors", v))
                .transpose()?,
            viewers: take_non_null(&mut body, "viewers")
                .map(|v| parse_usernames("viewers", v))
                .transpose()?,
            visible: take_non_null(&mut body, "visible")
                .map(parse_visible)
                .transpose()?,
            fields: self.schema_fields(body)?,
        })
    }

    /// Type-check the remaining (kind-specific) fields and convert them to BSON.
    fn schema_fields(&self, body: Map<String, Value>) -> Result<Document, AppError> {
        let mut fields = Document::new();
        for (name, value) in body {
            let spec = self.fields.get(&name).ok_or_else(|| {
                AppError::Validation(format!("Unknown field '{name}'"))
            })?;
            if value.is_null() {
                continue;
            }
            if !spec.kind.accepts(&value) {
                return Err(AppError::Validation(format!(
                    "Field '{name}' must be a {}",
                    spec.kind
                )));
            }
            let value = bson::to_bson(&value).map_err(|e| {
                AppError::Validation(format!("Field '{name}' cannot be stored: {e}"))
            })?;
            fields.insert(name, value);
        }
        Ok(fields)
    }
}

fn into_object(body: Value) -> Result<Map<String, Value>, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Validation("Request body must be a JSON object".into())),
    }
}

fn reject_reserved(body: &Map<String, Value>) -> Result<(), AppError> {
    match RESERVED_FIELDS.iter().find(|f| body.contains_key(**f)) {
        Some(field) => Err(AppError::Validation(format!(
            "Field '{field}' cannot be set by clients"
        ))),
        None => Ok(()),
    }
}

fn take_non_null(body: &mut Map<String, Value>, key: &str) -> Option<Value> {
    body.remove(key).filter(|v| !v.is_null())
}

fn parse_title(value: Value) -> Result<String, AppError> {
    match value {
        Value::String(title) if !title.is_empty() => Ok(title),
        Value::String(_) => Err(AppError::Validation("Field 'title' cannot be empty".into())),
        _ => Err(AppError::Validation("Field 'title' must be a string".into())),
    }
}

fn parse_visible(value: Value) -> Result<bool, AppError> {
    value
        .as_bool()
        .ok_or_else(|| AppError::Validation("Field 'visible' must be a boolean".into()))
}

fn parse_usernames(field: &str, value: Value) -> Result<Vec<String>, AppError> {
    let invalid = || AppError::Validation(format!("Field '{field}' must be a list of usernames"));
    let Value::Array(items) = value else {
        return Err(invalid());
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::String(name) if !name.is_empty() => Ok(name),
            _ => Err(invalid()),
        })
        .collect()
}
