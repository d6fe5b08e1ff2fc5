//! Vault operations carried by the vault executable.

use std::sync::Arc;

use async_trait::async_trait;

use bwkit_common::{ObjectKind, Result, SharedSession, VaultObject};

use crate::cli::{BwCli, ScopedEnv};
use crate::provider::{list_name, require_id, ObjectQuery, VaultTransport};

/// Process-mode transport.
///
/// Holds the session read lock for the whole of each operation, so no
/// login, unlock or logout can interleave with it.
pub struct ProcessTransport {
    cli: Arc<BwCli>,
    session: SharedSession,
}

impl ProcessTransport {
    /// Create a transport over a shared session.
    pub fn new(cli: Arc<BwCli>, session: SharedSession) -> Self {
        Self { cli, session }
    }

    /// Arguments for `list`.
    pub fn list_args(kind: ObjectKind, query: &ObjectQuery) -> Result<Vec<String>> {
        let mut args = vec!["list".to_string(), list_name(kind)?.to_string()];
        if let Some(search) = &query.search {
            args.push(format!("--search={}", search));
        }
        if let Some(org) = &query.organization_id {
            args.push(format!("--organizationid={}", org));
        }
        if let Some(folder) = &query.folder_id {
            args.push(format!("--folderid={}", folder));
        }
        Ok(args)
    }

    /// Arguments for `get`.
    pub fn get_args(kind: ObjectKind, id: &str, organization_id: Option<&str>) -> Vec<String> {
        let mut args = vec!["get".to_string(), kind.to_string(), id.to_string()];
        if let Some(org) = organization_id {
            args.push(format!("--organizationid={}", org));
        }
        args
    }

    /// Arguments for `edit`; `encoded` is the output of the encode step.
    pub fn edit_args(
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
        encoded: String,
    ) -> Vec<String> {
        let mut args = vec!["edit".to_string(), kind.to_string(), id.to_string()];
        if let Some(org) = organization_id {
            args.push(format!("--organizationid={}", org));
        }
        args.push(encoded);
        args
    }
}

#[async_trait]
impl VaultTransport for ProcessTransport {
    fn name(&self) -> &str {
        "process"
    }

    async fn list(&self, kind: ObjectKind, query: &ObjectQuery) -> Result<Vec<VaultObject>> {
        let args = Self::list_args(kind, query)?;
        let session = self.session.read().await;
        let value = self
            .cli
            .run_json(&args, &ScopedEnv::session(session.token()))
            .await?;
        VaultObject::list_from_value(value)
    }

    async fn get(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        let args = Self::get_args(kind, id, organization_id);
        let session = self.session.read().await;
        let value = self
            .cli
            .run_json(&args, &ScopedEnv::session(session.token()))
            .await?;
        VaultObject::from_value(value)
    }

    async fn edit(
        &self,
        kind: ObjectKind,
        id: &str,
        organization_id: Option<&str>,
        data: &VaultObject,
    ) -> Result<VaultObject> {
        require_id(kind, id)?;
        let session = self.session.read().await;

        // The executable only accepts the payload in its encoded form.
        let encoded = self.cli.encode(&data.to_compact_json()?).await?;
        let args = Self::edit_args(kind, id, organization_id, encoded);
        let value = self
            .cli
            .run_json(&args, &ScopedEnv::session(session.token()))
            .await?;
        VaultObject::from_value(value)
    }
}
