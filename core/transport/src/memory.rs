//! In-memory transport for testing.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use bwkit_common::{Error, ObjectKind, Result, VaultObject};

use crate::provider::{list_name, require_id, ObjectQuery, VaultTransport};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// `list`, `get` or `edit`.
    pub operation: &'static str,
    /// Kind addressed.
    pub kind: ObjectKind,
    /// Object id, empty for lists.
    pub id: String,
}

/// In-memory vault.
///
/// Useful for testing. Objects are keyed by kind and id; failures can be
/// injected per id to simulate an unreachable or rejecting vault.
#[derive(Default)]
pub struct MemoryTransport {
    objects: RwLock<HashMap<(ObjectKind, String), VaultObject>>,
    failing_gets: RwLock<HashSet<String>>,
    failing_edits: RwLock<HashSet<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MemoryTransport {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object under its `id`.
    ///
    /// # Errors
    /// - Invalid input if the object has no id
    pub fn insert(&self, kind: ObjectKind, object: VaultObject) -> Result<()> {
        let id = object
            .id()
            .ok_or_else(|| Error::InvalidInput("Object has no id".to_string()))?
            .to_string();
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, id), object);
        Ok(())
    }

    /// Store a JSON value.
    ///
    /// # Errors
    /// - Decode error if the value is not an object
    /// - Invalid input if the object has no id
    pub fn insert_value(&self, kind: ObjectKind, value: Value) -> Result<()> {
        self.insert(kind, VaultObject::from_value(value)?)
    }

    /// Current stored version of an object.
    pub fn object(&self, kind: ObjectKind, id: &str) -> Option<VaultObject> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, id.to_string()))
            .cloned()
    }

    /// Make every `get` of `id` fail as unreachable.
    pub fn fail_get(&self, id: impl Into<String>) {
        self.failing_gets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Make every `edit` of `id` fail.
    pub fn fail_edit(&self, id: impl Into<String>) {
        self.failing_edits
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, operation: &'static str, kind: ObjectKind, id: &str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                operation,
                kind,
                id: id.to_string(),
            });
    }
}

fn field_matches(object: &VaultObject, field: &str, expected: Option<&str>) -> bool {
    match expected {
        Some(expected) => object.get(field).and_then(Value::as_str) == Some(expected),
        None => true,
    }
}

#[async_trait]
impl VaultTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, kind: ObjectKind, query: &ObjectQuery) -> Result<Vec<VaultObject>> {
        list_name(kind)?;
        self.record("list", kind, "");

        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut results: Vec<VaultObject> = objects
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, object)| object)
            .filter(|object| field_matches(object, "organizationId", query.organization_id.as_deref()))
            .filter(|object| field_matches(object, "folderId", query.folder_id.as_deref()))
            .filter(|object| match &query.search {
                Some(term) => object.name().is_some_and(|name| name.contains(term.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.name().cmp(&b.name()));
        Ok(results)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        id: &str,
        _organization_id: Option<&str>,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        self.record("get", kind, id);

        if self
            .failing_gets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(Error::Transport(format!("Vault unreachable for {}", id)));
        }

        self.object(kind, id)
            .ok_or_else(|| Error::NotFound(format!("{} {}", kind, id)))
    }

    async fn edit(
        &self,
        kind: ObjectKind,
        id: &str,
        _organization_id: Option<&str>,
        data: &VaultObject,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        self.record("edit", kind, id);

        if self
            .failing_edits
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
        {
            return Err(Error::Transport(format!("Vault rejected update of {}", id)));
        }

        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let key = (kind, id.to_string());
        if !objects.contains_key(&key) {
            return Err(Error::NotFound(format!("{} {}", kind, id)));
        }
        let mut stored = data.clone();
        stored.set("id", Value::String(id.to_string()));
        objects.insert(key, stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_filters_by_kind_and_organization() {
        let vault = MemoryTransport::new();
        vault.insert_value(ObjectKind::Organization, json!({"id": "org-1", "name": "One"})).unwrap();
        vault.insert_value(
            ObjectKind::OrgCollection,
            json!({"id": "c1", "name": "Parent", "organizationId": "org-1"}),
        ).unwrap();
        vault.insert_value(
            ObjectKind::OrgCollection,
            json!({"id": "c9", "name": "Other", "organizationId": "org-2"}),
        ).unwrap();

        let query = ObjectQuery::new().organization("org-1");
        let found = vault.list(ObjectKind::OrgCollection, &query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), Some("c1"));

        let orgs = vault.list(ObjectKind::Organization, &ObjectQuery::new()).await.unwrap();
        assert_eq!(orgs.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let vault = MemoryTransport::new();
        vault.insert_value(ObjectKind::OrgCollection, json!({"id": "c1", "name": "A"})).unwrap();
        vault.fail_get("c1");
        assert!(matches!(
            vault.get(ObjectKind::OrgCollection, "c1", None).await,
            Err(Error::Transport(_))
        ));
        assert!(matches!(
            vault.get(ObjectKind::OrgCollection, "nope", None).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_replaces_object_and_records_calls() {
        let vault = MemoryTransport::new();
        vault.insert_value(ObjectKind::OrgCollection, json!({"id": "c1", "name": "A", "users": []})).unwrap();

        let mut data = vault.object(ObjectKind::OrgCollection, "c1").unwrap();
        data.set("users", json!([{"id": "u1"}]));
        vault.edit(ObjectKind::OrgCollection, "c1", None, &data).await.unwrap();

        let stored = vault.object(ObjectKind::OrgCollection, "c1").unwrap();
        assert_eq!(stored.get_array("users").unwrap().len(), 1);
        assert_eq!(vault.calls().last().unwrap().operation, "edit");
    }

    #[test]
    fn test_insert_value_rejects_malformed_fixtures() {
        let vault = MemoryTransport::new();
        assert!(matches!(
            vault.insert_value(ObjectKind::Item, json!(["not", "an", "object"])),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            vault.insert_value(ObjectKind::Item, json!({"name": "no id"})),
            Err(Error::InvalidInput(_))
        ));
        assert!(vault.calls().is_empty());
    }
}
