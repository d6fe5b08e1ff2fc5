//! Common types used throughout bwkit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Kind of object exposed by the vault service.
///
/// The vault addresses single objects by a singular name (`org-collection`)
/// and lists by a plural name (`org-collections`). Only some kinds can be
/// listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    Item,
    Username,
    Password,
    Uri,
    Totp,
    Notes,
    Exposed,
    Attachment,
    Folder,
    Collection,
    OrgCollection,
    Organization,
    OrgMember,
    Template,
    Fingerprint,
    Send,
}

impl ObjectKind {
    /// Every known kind.
    pub const ALL: [ObjectKind; 16] = [
        ObjectKind::Item,
        ObjectKind::Username,
        ObjectKind::Password,
        ObjectKind::Uri,
        ObjectKind::Totp,
        ObjectKind::Notes,
        ObjectKind::Exposed,
        ObjectKind::Attachment,
        ObjectKind::Folder,
        ObjectKind::Collection,
        ObjectKind::OrgCollection,
        ObjectKind::Organization,
        ObjectKind::OrgMember,
        ObjectKind::Template,
        ObjectKind::Fingerprint,
        ObjectKind::Send,
    ];

    /// Singular name used by `get` and `edit`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Item => "item",
            ObjectKind::Username => "username",
            ObjectKind::Password => "password",
            ObjectKind::Uri => "uri",
            ObjectKind::Totp => "totp",
            ObjectKind::Notes => "notes",
            ObjectKind::Exposed => "exposed",
            ObjectKind::Attachment => "attachment",
            ObjectKind::Folder => "folder",
            ObjectKind::Collection => "collection",
            ObjectKind::OrgCollection => "org-collection",
            ObjectKind::Organization => "organization",
            ObjectKind::OrgMember => "org-member",
            ObjectKind::Template => "template",
            ObjectKind::Fingerprint => "fingerprint",
            ObjectKind::Send => "send",
        }
    }

    /// Plural name used by `list`, if the kind can be listed.
    pub fn list_name(&self) -> Option<&'static str> {
        match self {
            ObjectKind::Item => Some("items"),
            ObjectKind::Folder => Some("folders"),
            ObjectKind::Collection => Some("collections"),
            ObjectKind::OrgCollection => Some("org-collections"),
            ObjectKind::Organization => Some("organizations"),
            ObjectKind::OrgMember => Some("org-members"),
            _ => None,
        }
    }

    /// Whether the sidecar wraps this kind as a single-object envelope.
    ///
    /// Organization members only ever come back inside lists.
    pub fn is_single_object(&self) -> bool {
        !matches!(self, ObjectKind::OrgMember)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = crate::Error;

    /// Accepts both the singular and the list name.
    fn from_str(s: &str) -> crate::Result<Self> {
        ObjectKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s || kind.list_name() == Some(s))
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown object kind: {}", s)))
    }
}

/// A vault object as returned by the vault service.
///
/// The payload shape belongs to the vault; only `id`, `name`, `users` and
/// `groups` are ever inspected here. Everything else round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultObject(Map<String, Value>);

impl VaultObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value.
    ///
    /// # Errors
    /// - Returns a decode error if the value is not a JSON object
    pub fn from_value(value: Value) -> crate::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(crate::Error::Decode(format!(
                "Expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Convert a JSON array into a list of objects.
    pub fn list_from_value(value: Value) -> crate::Result<Vec<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            other => Err(crate::Error::Decode(format!(
                "Expected a JSON array, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Object identifier.
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Object display name.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The `object` tag the vault puts on every payload.
    pub fn object_tag(&self) -> Option<&str> {
        self.0.get("object").and_then(Value::as_str)
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Field access for sequence fields such as `users` and `groups`.
    pub fn get_array(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }

    /// Replace a field wholesale.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Compact single-line JSON, as required by the encode step.
    pub fn to_compact_json(&self) -> crate::Result<String> {
        serde_json::to_string(&self.0).map_err(Into::into)
    }
}

impl From<Map<String, Value>> for VaultObject {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Sensitive string that zeroizes on drop and never prints its content.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Wrap a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the cleartext. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {} chars])", self.0.chars().count())
    }
}

/// Opaque session token handed out by the vault on login or unlock.
#[derive(Clone)]
pub struct SessionToken(Secret);

impl SessionToken {
    /// Capture a token from raw command output.
    ///
    /// Surrounding whitespace is trimmed; the rest is kept verbatim. Blank
    /// output yields no token.
    pub fn from_output(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(Secret::new(trimmed)))
        }
    }

    /// Access the token. Callers must not log it.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}
