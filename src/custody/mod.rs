//! Custody prerequisite resolution.
//!
//! An agent can only start on a chain that has a custody multisig, or on which
//! one can be created reusing the single backup signer already shared by the
//! custody wallets on every other chain.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::error::AutoRunError;
use crate::middleware::CustodyApi;
use crate::types::reason;

/// A custody multisig on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyWallet {
    pub address: String,
    pub chain_id: String,
    pub owners: Vec<String>,
}

/// Loaded custody data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustodySnapshot {
    pub primary_signer: Option<String>,
    pub wallets: Vec<CustodyWallet>,
}

/// Outcome of resolving the custody prerequisite for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodyVerdict {
    /// A custody wallet already exists on the chain.
    Exists,
    /// A wallet can be created with this backup signer.
    Create { backup_signer: String },
    /// Not feasible right now.
    Blocked(&'static str),
}

impl CustodyVerdict {
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Blocked(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Decide whether a custody wallet can be used or created on `chain_id`.
///
/// `None` means the custody data has not loaded yet.
pub fn resolve(chain_id: &str, snapshot: Option<&CustodySnapshot>) -> CustodyVerdict {
    let Some(snapshot) = snapshot else {
        return CustodyVerdict::Blocked(reason::SAFE_DATA_LOADING);
    };

    if snapshot.wallets.iter().any(|w| w.chain_id == chain_id) {
        return CustodyVerdict::Exists;
    }

    let primary = snapshot.primary_signer.as_deref().map(str::to_lowercase);

    // Keyed by lowercase address so checksum casing does not count as a second signer.
    let mut backup_signers: BTreeMap<String, &str> = BTreeMap::new();
    for owner in snapshot
        .wallets
        .iter()
        .filter(|w| w.chain_id != chain_id)
        .flat_map(|w| w.owners.iter())
    {
        let key = owner.to_lowercase();
        if primary.as_deref() == Some(key.as_str()) {
            continue;
        }
        backup_signers.entry(key).or_insert(owner.as_str());
    }

    match backup_signers.len() {
        0 => CustodyVerdict::Blocked(reason::BACKUP_SIGNER_REQUIRED),
        1 => CustodyVerdict::Create {
            backup_signer: backup_signers
                .into_values()
                .next()
                .map(str::to_string)
                .unwrap_or_default(),
        },
        _ => CustodyVerdict::Blocked(reason::MULTIPLE_BACKUP_SIGNERS),
    }
}

/// Fetch the primary signer and every custody wallet.
pub async fn load_snapshot(api: &dyn CustodyApi) -> Result<CustodySnapshot> {
    let primary_signer = api.primary_signer().await?;
    let wallets = api.list_wallets().await?;
    Ok(CustodySnapshot {
        primary_signer,
        wallets,
    })
}

/// Create the custody wallet for `chain_id` when it is missing and creatable.
///
/// Returns `true` when a wallet was created.
pub async fn ensure_custody(
    api: &dyn CustodyApi,
    chain_id: &str,
    snapshot: Option<&CustodySnapshot>,
) -> Result<bool> {
    match resolve(chain_id, snapshot) {
        CustodyVerdict::Exists => Ok(false),
        CustodyVerdict::Create { backup_signer } => {
            info!("Creating custody wallet on {} with backup signer {}", chain_id, backup_signer);
            api.create_wallet(chain_id, &backup_signer).await?;
            Ok(true)
        }
        CustodyVerdict::Blocked(r) if r == reason::SAFE_DATA_LOADING => {
            Err(AutoRunError::CustodyNotLoaded.into())
        }
        CustodyVerdict::Blocked(r) if r == reason::MULTIPLE_BACKUP_SIGNERS => {
            Err(AutoRunError::MultipleBackupSigners(chain_id.to_string()).into())
        }
        CustodyVerdict::Blocked(_) => Err(AutoRunError::BackupSignerRequired(chain_id.to_string()).into()),
    }
}
