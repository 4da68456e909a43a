//! Collaborator interfaces consumed by the scheduler.

use anyhow::Result;
use async_trait::async_trait;

use crate::custody::CustodyWallet;
use crate::middleware::ServiceRecord;
use crate::types::DeploymentStatus;

/// Deployment control surface of the middleware.
#[async_trait]
pub trait DeploymentApi: Send + Sync {
    /// All services currently known to the middleware.
    async fn list_services(&self) -> Result<Vec<ServiceRecord>>;

    async fn get_status(&self, service_id: &str) -> Result<DeploymentStatus>;

    async fn start(&self, service_id: &str) -> Result<()>;

    async fn stop(&self, service_id: &str) -> Result<()>;

    /// Patch the service template with the given partial object.
    async fn update_config(
        &self,
        service_id: &str,
        partial: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()>;
}

/// Custody (multisig) wallet surface.
#[async_trait]
pub trait CustodyApi: Send + Sync {
    /// Address of the user's own primary signer, if one exists.
    async fn primary_signer(&self) -> Result<Option<String>>;

    async fn list_wallets(&self) -> Result<Vec<CustodyWallet>>;

    async fn create_wallet(&self, chain_id: &str, backup_signer: &str) -> Result<()>;
}
