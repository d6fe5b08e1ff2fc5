//! Object client implementation.

use std::sync::Arc;

use tracing::{debug, error};

use bwkit_common::{ObjectKind, Result, SharedSession, VaultObject};
use bwkit_transport::{BwCli, ObjectQuery, ProcessTransport, RestClient, RestTransport, VaultTransport};

/// Client for vault objects.
#[derive(Clone)]
pub struct VaultClient {
    transport: Arc<dyn VaultTransport>,
}

impl VaultClient {
    /// Create a client over any transport.
    pub fn new(transport: Arc<dyn VaultTransport>) -> Self {
        Self { transport }
    }

    /// Client that spawns the vault executable for every call.
    pub fn process(cli: Arc<BwCli>, session: SharedSession) -> Self {
        Self::new(Arc::new(ProcessTransport::new(cli, session)))
    }

    /// Client that talks to a running sidecar.
    pub fn rest(client: RestClient, session: SharedSession) -> Self {
        Self::new(Arc::new(RestTransport::new(client, session)))
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// List objects of `kind`.
    ///
    /// # Errors
    /// - Invalid input if `kind` cannot be listed
    pub async fn list(
        &self,
        kind: ObjectKind,
        query: &ObjectQuery,
    ) -> Result<Option<Vec<VaultObject>>> {
        let result = self.transport.list(kind, query).await;
        settle("list", kind, "", result)
    }

    /// Fetch one object.
    ///
    /// # Errors
    /// - Invalid input if `id` is blank
    pub async fn get(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
    ) -> Result<Option<VaultObject>> {
        let result = self.transport.get(kind, id, organization_id).await;
        settle("get", kind, id, result)
    }

    /// Replace one object with `data`.
    ///
    /// # Errors
    /// - Invalid input if `id` is blank
    pub async fn edit(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
        data: &VaultObject,
    ) -> Result<Option<VaultObject>> {
        let result = self.transport.edit(kind, id, organization_id, data).await;
        settle("edit", kind, id, result)
    }

    /// Organizations the account belongs to.
    pub async fn organizations(&self, search: Option<&str>) -> Result<Option<Vec<VaultObject>>> {
        self.list(ObjectKind::Organization, &query(search)).await
    }

    /// Collections visible to the account.
    pub async fn collections(&self, search: Option<&str>) -> Result<Option<Vec<VaultObject>>> {
        self.list(ObjectKind::Collection, &query(search)).await
    }

    /// One collection.
    pub async fn collection(&self, id: &str) -> Result<Option<VaultObject>> {
        self.get(ObjectKind::Collection, id, None).await
    }

    /// Vault items.
    pub async fn items(&self, search: Option<&str>) -> Result<Option<Vec<VaultObject>>> {
        self.list(ObjectKind::Item, &query(search)).await
    }

    /// Folders.
    pub async fn folders(&self, search: Option<&str>) -> Result<Option<Vec<VaultObject>>> {
        self.list(ObjectKind::Folder, &query(search)).await
    }

    /// Collections of one organization, including their permissions.
    pub async fn org_collections(
        &self,
        organization_id: &str,
        search: Option<&str>,
    ) -> Result<Option<Vec<VaultObject>>> {
        let query = query(search).organization(organization_id);
        self.list(ObjectKind::OrgCollection, &query).await
    }

    /// Fetch an organization collection, or replace it when `data` is given.
    pub async fn org_collection(
        &self,
        organization_id: &str,
        collection_id: &str,
        data: Option<&VaultObject>,
    ) -> Result<Option<VaultObject>> {
        match data {
            Some(data) => {
                self.edit(ObjectKind::OrgCollection, collection_id, Some(organization_id), data)
                    .await
            }
            None => {
                self.get(ObjectKind::OrgCollection, collection_id, Some(organization_id))
                    .await
            }
        }
    }

    /// Members of one organization.
    pub async fn org_members(
        &self,
        organization_id: &str,
        search: Option<&str>,
    ) -> Result<Option<Vec<VaultObject>>> {
        let query = query(search).organization(organization_id);
        self.list(ObjectKind::OrgMember, &query).await
    }
}

fn query(search: Option<&str>) -> ObjectQuery {
    match search {
        Some(term) => ObjectQuery::new().search(term),
        None => ObjectQuery::new(),
    }
}

/// Apply the error policy: programmer errors propagate, everything else is
/// logged and becomes `None`.
fn settle<T>(operation: &str, kind: ObjectKind, id: &str, result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => {
            debug!(operation, kind = %kind, id, "Vault call succeeded");
            Ok(Some(value))
        }
        Err(e) if e.is_programmer_error() => Err(e),
        Err(e) => {
            error!(operation, kind = %kind, id, error = %e, "Vault call failed");
            Ok(None)
        }
    }
}
