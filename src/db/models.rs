use bson::oid::ObjectId;
use bson::{Bson, Document};
use serde::{Deserialize, Deserializer, Serialize};

/// A shared record as stored in one of the record collections.
///
/// Access is governed by three roles: the single `owner`, the ordered
/// `editors` (the front entry inherits ownership on delete) and the
/// `viewers`, who may see the record even when it is not `visible`.
/// Kind-specific schema fields live in `fields` and are stored inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned identifier. `None` only before the first insert.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub owner: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub editors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub viewers: Vec<String>,
    /// Public listing flag. An absent value means visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Concurrency token, bumped on every conditional write.
    /// Legacy documents without it read as revision 0.
    #[serde(default)]
    pub revision: i64,
    #[serde(flatten)]
    pub fields: Document,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Record {
    pub fn is_owned_by(&self, username: &str) -> bool {
        self.owner == username
    }

    /// Owners and editors may change the record's content.
    pub fn is_editable_by(&self, username: &str) -> bool {
        self.is_owned_by(username) || self.editors.iter().any(|e| e == username)
    }

    /// True when the user holds any role on the record, viewer included.
    pub fn is_member(&self, username: &str) -> bool {
        self.is_editable_by(username) || self.viewers.iter().any(|v| v == username)
    }

    pub fn is_public(&self) -> bool {
        self.visible.unwrap_or(true)
    }

    /// Opaque string form of the identifier.
    pub fn id_hex(&self) -> String {
        self.id.map(|id| id.to_hex()).unwrap_or_default()
    }
}

/// Validated payload for creating a record. The owner is supplied separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub title: String,
    pub editors: Vec<String>,
    pub viewers: Vec<String>,
    pub visible: Option<bool>,
    pub fields: Document,
}

impl NewRecord {
    pub fn into_record(self, owner: &str) -> Record {
        Record {
            id: None,
            title: self.title,
            owner: owner.to_string(),
            editors: self.editors,
            viewers: self.viewers,
            visible: Some(self.visible.unwrap_or(true)),
            revision: 0,
            fields: self.fields,
        }
    }
}

/// Validated partial update. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub editors: Option<Vec<String>>,
    pub viewers: Option<Vec<String>>,
    pub visible: Option<bool>,
    pub fields: Document,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.editors.is_none()
            && self.viewers.is_none()
            && self.visible.is_none()
            && self.fields.is_empty()
    }

    /// Top-level fields to `$set` on the stored document.
    pub fn into_changes(self) -> Document {
        let mut changes = Document::new();
        if let Some(title) = self.title {
            changes.insert("title", title);
        }
        if let Some(editors) = self.editors {
            changes.insert("editors", editors);
        }
        if let Some(viewers) = self.viewers {
            changes.insert("viewers", viewers);
        }
        if let Some(visible) = self.visible {
            changes.insert("visible", visible);
        }
        for (key, value) in self.fields {
            changes.insert(key, value);
        }
        changes
    }
}

/// API representation of a record: the identifier is an opaque string and
/// schema fields are rendered as relaxed extended JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    pub id: String,
    pub title: String,
    pub owner: String,
    pub editors: Vec<String>,
    pub viewers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    pub revision: i64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        let id = record.id_hex();
        let fields = match Bson::Document(record.fields).into_relaxed_extjson() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id,
            title: record.title,
            owner: record.owner,
            editors: record.editors,
            viewers: record.viewers,
            visible: record.visible,
            revision: record.revision,
            fields,
        }
    }
}
