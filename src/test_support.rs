//! In-memory collaborators for unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::custody::CustodyWallet;
use crate::middleware::{CustodyApi, DeploymentApi, ServiceRecord};
use crate::notify::{AuditSink, Notifier};
use crate::state::StateStore;
use crate::types::DeploymentStatus;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap()
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Make every later `set` fail.
    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("store is read-only"));
        }
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// How a scripted `start` call behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Request succeeds and the service reaches Deployed.
    Deploy,
    /// Request fails.
    Fail,
    /// Request succeeds but the service stays Deploying.
    Hang,
}

#[derive(Default)]
struct DeploymentState {
    services: Vec<ServiceRecord>,
    statuses: HashMap<String, DeploymentStatus>,
    start_script: HashMap<String, VecDeque<StartOutcome>>,
    stuck: HashSet<String>,
    events: Vec<String>,
}

/// Deployment API that records calls and follows per-service scripts.
///
/// Services start out Stopped. Unscripted starts deploy.
#[derive(Default)]
pub struct FakeDeployment {
    state: Mutex<DeploymentState>,
}

impl FakeDeployment {
    pub fn with_services(services: Vec<ServiceRecord>) -> Self {
        let fake = Self::default();
        lock(&fake.state).services = services;
        fake
    }

    pub fn set_status(&self, service_id: &str, status: DeploymentStatus) {
        lock(&self.state).statuses.insert(service_id.to_string(), status);
    }

    pub fn script_starts(&self, service_id: &str, outcomes: &[StartOutcome]) {
        lock(&self.state)
            .start_script
            .insert(service_id.to_string(), outcomes.iter().copied().collect());
    }

    /// Stop requests for this service are accepted but never take effect.
    pub fn stick(&self, service_id: &str) {
        lock(&self.state).stuck.insert(service_id.to_string());
    }

    /// Every call in order, e.g. `start:sc-a`, `stop:sc-b`, `update:sc-a`.
    pub fn events(&self) -> Vec<String> {
        lock(&self.state).events.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        let prefix = format!("{call}:");
        lock(&self.state)
            .events
            .iter()
            .filter(|e| e.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl DeploymentApi for FakeDeployment {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        Ok(lock(&self.state).services.clone())
    }

    async fn get_status(&self, service_id: &str) -> Result<DeploymentStatus> {
        Ok(lock(&self.state)
            .statuses
            .get(service_id)
            .copied()
            .unwrap_or(DeploymentStatus::Stopped))
    }

    async fn start(&self, service_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.events.push(format!("start:{service_id}"));
        let outcome = state
            .start_script
            .get_mut(service_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(StartOutcome::Deploy);
        match outcome {
            StartOutcome::Deploy => {
                state.statuses.insert(service_id.to_string(), DeploymentStatus::Deployed);
                Ok(())
            }
            StartOutcome::Hang => {
                state.statuses.insert(service_id.to_string(), DeploymentStatus::Deploying);
                Ok(())
            }
            StartOutcome::Fail => Err(anyhow!("start request failed for {service_id}")),
        }
    }

    async fn stop(&self, service_id: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.events.push(format!("stop:{service_id}"));
        if !state.stuck.contains(service_id) {
            state.statuses.insert(service_id.to_string(), DeploymentStatus::Stopped);
        }
        Ok(())
    }

    async fn update_config(
        &self,
        service_id: &str,
        _partial: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        lock(&self.state).events.push(format!("update:{service_id}"));
        Ok(())
    }
}

#[derive(Default)]
struct CustodyState {
    primary: Option<String>,
    wallets: Vec<CustodyWallet>,
    created: Vec<(String, String)>,
}

/// Custody API over an in-memory wallet list; created wallets become visible.
#[derive(Default)]
pub struct FakeCustody {
    state: Mutex<CustodyState>,
}

impl FakeCustody {
    pub fn new(primary: &str, wallets: Vec<CustodyWallet>) -> Self {
        Self {
            state: Mutex::new(CustodyState {
                primary: Some(primary.to_string()),
                wallets,
                created: Vec::new(),
            }),
        }
    }

    /// `(chain_id, backup_signer)` of every wallet created.
    pub fn created(&self) -> Vec<(String, String)> {
        lock(&self.state).created.clone()
    }
}

#[async_trait]
impl CustodyApi for FakeCustody {
    async fn primary_signer(&self) -> Result<Option<String>> {
        Ok(lock(&self.state).primary.clone())
    }

    async fn list_wallets(&self) -> Result<Vec<CustodyWallet>> {
        Ok(lock(&self.state).wallets.clone())
    }

    async fn create_wallet(&self, chain_id: &str, backup_signer: &str) -> Result<()> {
        let mut state = lock(&self.state);
        let mut owners: Vec<String> = state.primary.iter().cloned().collect();
        owners.push(backup_signer.to_string());
        state.wallets.push(CustodyWallet {
            address: format!("0xsafe-{chain_id}"),
            chain_id: chain_id.to_string(),
            owners,
        });
        state
            .created
            .push((chain_id.to_string(), backup_signer.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Option<String>)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, body: Option<&str>) {
        lock(&self.sent).push((title.to_string(), body.map(str::to_string)));
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    lines: Mutex<Vec<String>>,
}

impl RecordingAudit {
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|l| l.contains(needle))
    }
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn log(&self, message: &str) {
        lock(&self.lines).push(message.to_string());
    }
}
