//! Transport trait definition.

use async_trait::async_trait;

use bwkit_common::{Error, ObjectKind, Result, VaultObject};

/// Optional filters for `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectQuery {
    /// Free-text search term.
    pub search: Option<String>,
    /// Restrict to one organization.
    pub organization_id: Option<String>,
    /// Restrict to one folder.
    pub folder_id: Option<String>,
}

impl ObjectQuery {
    /// No filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search term.
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set the organization filter.
    pub fn organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Set the folder filter.
    pub fn folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }
}

/// A way of carrying vault operations.
///
/// Every variant returns the same logical shapes; request building is the
/// only thing that differs between them. Implementations report failures as
/// errors and leave the "no result" policy to the object client.
#[async_trait]
pub trait VaultTransport: Send + Sync {
    /// Short variant name for logs ("process", "rest", "memory").
    fn name(&self) -> &str;

    /// List objects of a listable kind.
    ///
    /// # Errors
    /// - Invalid input if the kind cannot be listed
    /// - Transport or decode failures
    async fn list(&self, kind: ObjectKind, query: &ObjectQuery) -> Result<Vec<VaultObject>>;

    /// Fetch one object.
    async fn get(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
    ) -> Result<VaultObject>;

    /// Replace one object with `data`.
    async fn edit(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
        data: &VaultObject,
    ) -> Result<VaultObject>;
}

/// Plural name of a listable kind.
pub(crate) fn list_name(kind: ObjectKind) -> Result<&'static str> {
    kind.list_name()
        .ok_or_else(|| Error::InvalidInput(format!("Objects of kind '{}' cannot be listed", kind)))
}

/// Reject blank identifiers before anything is spawned or sent.
pub(crate) fn require_id(kind: ObjectKind, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidInput(format!(
            "An id is required to address a '{}'",
            kind
        )));
    }
    Ok(())
}
