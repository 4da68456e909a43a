//! Middleware API client for deployments and custody wallets.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::custody::CustodyWallet;
use crate::middleware::{CustodyApi, DeploymentApi, ServiceRecord};
use crate::types::DeploymentStatus;

/// `getOwners()` selector on the multisig contract.
const GET_OWNERS_SELECTOR: &str = "0xa0e67e2b";

/// Local middleware client.
#[derive(Debug, Clone)]
pub struct MiddlewareClient {
    base_url: String,
    /// JSON-RPC endpoints keyed by middleware chain name.
    rpc_urls: BTreeMap<String, String>,
    http: reqwest::Client,
}

// -- Request / response types -----------------------------------------------

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    status: DeploymentStatus,
}

#[derive(Debug, Deserialize)]
struct WalletResponse {
    address: String,
    #[serde(default)]
    safes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct CreateSafeRequest<'a> {
    chain: &'a str,
    backup_owner: &'a str,
    transfer_excess_assets: bool,
}

impl MiddlewareClient {
    /// Create a new middleware client.
    pub fn new(base_url: &str, rpc_urls: BTreeMap<String, String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            rpc_urls,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn get_wallets(&self) -> Result<Vec<WalletResponse>> {
        let resp = self
            .http
            .get(self.url("wallet"))
            .send()
            .await
            .context("Wallet list request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Wallet list failed ({}): {}", status, body);
        }

        resp.json().await.context("Failed to parse wallet list")
    }

    /// Read the owner set of a multisig through `eth_call`.
    async fn safe_owners(&self, chain: &str, safe: &str) -> Result<Vec<String>> {
        let Some(rpc_url) = self.rpc_urls.get(chain) else {
            bail!("No RPC endpoint configured for chain {}", chain);
        };

        let resp = self
            .http
            .post(rpc_url)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_call",
                "params": [{ "to": safe, "data": GET_OWNERS_SELECTOR }, "latest"],
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("getOwners call failed on {chain}"))?;

        let body: serde_json::Value = resp.json().await?;
        if let Some(err) = body.get("error") {
            bail!("getOwners returned error on {}: {}", chain, err);
        }
        let result = body["result"].as_str().unwrap_or("0x");
        decode_address_array(result)
    }
}

/// Decode an ABI-encoded `address[]` return value.
fn decode_address_array(result: &str) -> Result<Vec<String>> {
    let data = hex::decode(result.strip_prefix("0x").unwrap_or(result))
        .context("getOwners result is not valid hex")?;

    let offset = abi_usize(abi_word(&data, 0)?)? / 32;
    let len = abi_usize(abi_word(&data, offset)?)?;

    let mut owners = Vec::new();
    for i in 0..len {
        let index = offset
            .checked_add(1)
            .and_then(|first| first.checked_add(i))
            .context("Array element out of range")?;
        let word = abi_word(&data, index)?;
        owners.push(format!("0x{}", hex::encode(&word[12..])));
    }
    Ok(owners)
}

/// The `index`-th 32-byte word of ABI data.
fn abi_word(data: &[u8], index: usize) -> Result<&[u8]> {
    index
        .checked_mul(32)
        .and_then(|start| data.get(start..start.checked_add(32)?))
        .with_context(|| format!("getOwners result has no word {index}"))
}

/// A uint256 word that must fit in `usize`.
fn abi_usize(word: &[u8]) -> Result<usize> {
    let (high, low) = word.split_at(24);
    if high.iter().any(|b| *b != 0) {
        bail!("ABI integer out of range");
    }
    let low: [u8; 8] = low.try_into().context("ABI word is not 32 bytes")?;
    usize::try_from(u64::from_be_bytes(low)).context("ABI integer out of range")
}

#[async_trait]
impl DeploymentApi for MiddlewareClient {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        let resp = self
            .http
            .get(self.url("v2/services"))
            .send()
            .await
            .context("Service list request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Service list failed ({}): {}", status, body);
        }

        resp.json().await.context("Failed to parse service list")
    }

    async fn get_status(&self, service_id: &str) -> Result<DeploymentStatus> {
        let resp = self
            .http
            .get(self.url(&format!("v2/service/{service_id}/deployment")))
            .send()
            .await
            .context("Deployment status request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Deployment status failed ({}): {}", status, body);
        }

        let body: DeploymentResponse = resp.json().await.context("Failed to parse deployment")?;
        debug!("Deployment {} status: {}", service_id, body.status);
        Ok(body.status)
    }

    async fn start(&self, service_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("v2/service/{service_id}")))
            .send()
            .await
            .context("Service start request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Service start failed ({}): {}", status, body);
        }
        Ok(())
    }

    async fn stop(&self, service_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("v2/service/{service_id}/deployment/stop")))
            .send()
            .await
            .context("Deployment stop request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Deployment stop failed ({}): {}", status, body);
        }
        Ok(())
    }

    async fn update_config(
        &self,
        service_id: &str,
        partial: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let resp = self
            .http
            .patch(self.url(&format!("v2/service/{service_id}")))
            .json(partial)
            .send()
            .await
            .context("Service update request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Service update failed ({}): {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl CustodyApi for MiddlewareClient {
    async fn primary_signer(&self) -> Result<Option<String>> {
        let wallets = self.get_wallets().await?;
        Ok(wallets.into_iter().next().map(|w| w.address))
    }

    async fn list_wallets(&self) -> Result<Vec<CustodyWallet>> {
        let mut custody = Vec::new();
        for wallet in self.get_wallets().await? {
            for (chain, safe) in wallet.safes {
                let owners = self.safe_owners(&chain, &safe).await?;
                custody.push(CustodyWallet {
                    address: safe,
                    chain_id: chain,
                    owners,
                });
            }
        }
        Ok(custody)
    }

    async fn create_wallet(&self, chain_id: &str, backup_signer: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("wallet/safe"))
            .json(&CreateSafeRequest {
                chain: chain_id,
                backup_owner: backup_signer,
                transfer_excess_assets: true,
            })
            .send()
            .await
            .context("Safe creation request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Safe creation failed ({}): {}", status, body);
        }
        Ok(())
    }
}
