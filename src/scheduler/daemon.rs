//! Refresh loop driving the coordinator.
//!
//! Every tick rebuilds the configured agents from the deployment list, gathers
//! a fresh signal snapshot, publishes the recomputed eligibility view, detects
//! the running agent and then evaluates the rotation triggers.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AutoRunConfig;
use crate::custody;
use crate::eligibility::EligibilityView;
use crate::lifecycle::Collaborators;
use crate::middleware::services::configured_agents;
use crate::scheduler::Coordinator;
use crate::signals::{SignalSnapshot, SignalSource};
use crate::state::AutoRunStore;
use crate::types::{AgentMeta, AgentType};

/// Long-running auto-run daemon.
pub struct AutoRunDaemon {
    config: AutoRunConfig,
    deps: Collaborators,
    signals: Arc<dyn SignalSource>,
    coordinator: Coordinator,
    rotation: Option<JoinHandle<()>>,
}

impl AutoRunDaemon {
    pub fn new(
        config: AutoRunConfig,
        store: AutoRunStore,
        deps: Collaborators,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        let coordinator = Coordinator::new(store, deps.clone(), config.timing.clone());
        Self {
            config,
            deps,
            signals,
            coordinator,
            rotation: None,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Run until `cancel` fires. An in-flight rotation is awaited before returning.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            "Auto-run daemon started ({} catalog agents, refresh every {}s)",
            self.config.agents.len(),
            self.config.refresh_interval().as_secs()
        );

        let interval = self.config.refresh_interval();
        loop {
            if let Err(e) = self.tick().await {
                error!("Auto-run tick failed: {e:#}");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {
                    info!("Auto-run daemon shutting down");
                    self.finish_rotation().await;
                    return Ok(());
                }
            }
        }
    }

    /// One refresh: publish a new view, then observe and evaluate.
    pub async fn tick(&mut self) -> Result<()> {
        let view = self.collect_view().await?;
        let running = self.detect_running(&view.agents).await;

        self.coordinator.apply_view(view);
        self.coordinator.sync_agents().await?;
        self.coordinator.observe_running(running).await?;

        if let Some(handle) = self.coordinator.evaluate_triggers().await? {
            debug!("Rotation task spawned");
            self.rotation = Some(handle);
        }
        Ok(())
    }

    /// Wait for the last spawned rotation so it is not dropped between stop and start.
    async fn finish_rotation(&mut self) {
        let Some(handle) = self.rotation.take() else {
            return;
        };
        if handle.is_finished() {
            return;
        }
        warn!("Waiting for the rotation in progress to finish");
        if let Err(e) = handle.await {
            error!("Rotation task failed: {e}");
        }
    }

    /// Configured agents and their eligibility as of now.
    ///
    /// Only the deployment list is required; signal and custody failures
    /// degrade to "not loaded".
    pub async fn collect_view(&self) -> Result<EligibilityView> {
        let services = self
            .deps
            .deployments
            .list_services()
            .await
            .context("Failed to list services")?;
        let agents = configured_agents(&services, &self.config.agents);
        let snapshot = self.snapshot().await;
        Ok(EligibilityView::compute(agents, &snapshot))
    }

    async fn snapshot(&self) -> SignalSnapshot {
        let mut snapshot = match self.signals.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Signals unavailable: {e:#}");
                SignalSnapshot {
                    now: chrono::Utc::now().timestamp(),
                    ..SignalSnapshot::default()
                }
            }
        };

        snapshot.custody = match custody::load_snapshot(self.deps.custody.as_ref()).await {
            Ok(custody) => Some(custody),
            Err(e) => {
                warn!("Custody wallets unavailable: {e:#}");
                None
            }
        };
        snapshot
    }

    /// First configured agent whose deployment is up or coming up.
    async fn detect_running(&self, agents: &[AgentMeta]) -> Option<AgentType> {
        for meta in agents {
            match self.deps.deployments.get_status(&meta.service_id).await {
                Ok(status) if status.is_running() => return Some(meta.agent_type.clone()),
                Ok(_) => {}
                Err(e) => debug!("Status of {} unavailable: {e}", meta.agent_type),
            }
        }
        None
    }
}
