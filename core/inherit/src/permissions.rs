//! Permission sets supplied by the operator.

use serde_json::Value;

use bwkit_common::{Error, Result, VaultObject};

/// Ordered permission entries for one dimension (users or groups).
///
/// Entries are kept as the vault represents them (`{"id": .., "readOnly": ..}`
/// and so on); only their shape as a list of objects is checked. An empty set
/// means "leave this dimension alone".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionSet {
    entries: Vec<Value>,
}

impl PermissionSet {
    /// A set that overrides nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of objects.
    ///
    /// # Errors
    /// - Invalid input if the text is not a JSON array of objects
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("Permissions are not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate an already parsed value.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(entries) = value else {
            return Err(Error::InvalidInput(
                "Permissions must be a JSON array".to_string(),
            ));
        };
        if let Some(position) = entries.iter().position(|entry| !entry.is_object()) {
            return Err(Error::InvalidInput(format!(
                "Permission entry {} is not an object",
                position
            )));
        }
        Ok(Self { entries })
    }

    /// Current permissions of a collection for `field` (`users` or `groups`).
    ///
    /// Missing or malformed fields give an empty set.
    pub fn from_collection(collection: &VaultObject, field: &str) -> Self {
        collection
            .get(field)
            .cloned()
            .and_then(|value| Self::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Check if this set overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The entries, in order.
    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// JSON array of the entries.
    pub fn to_value(&self) -> Value {
        Value::Array(self.entries.clone())
    }

    /// Replace `field` of `collection` wholesale, unless this set is empty.
    ///
    /// Returns whether the collection was changed.
    pub fn apply(&self, collection: &mut VaultObject, field: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        collection.set(field, self.to_value());
        true
    }
}
