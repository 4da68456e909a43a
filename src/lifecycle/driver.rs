//! Lifecycle driver: bounded stop and start-with-retries.
//!
//! Status polls, cooldowns and backoffs are plain `tokio::time::sleep` calls, so
//! the driver only ever suspends and never blocks a runtime thread.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::TimingConfig;
use crate::custody;
use crate::eligibility::EligibilityView;
use crate::error::AutoRunError;
use crate::lifecycle::template::template_patch;
use crate::lifecycle::Collaborators;
use crate::notify::start_failed_message;
use crate::rotation::SkipNotifier;
use crate::types::{AgentMeta, AgentType, DeploymentStatus};

pub struct LifecycleDriver {
    deps: Collaborators,
    skips: Arc<SkipNotifier>,
    view: watch::Receiver<Arc<EligibilityView>>,
    timing: TimingConfig,
}

impl LifecycleDriver {
    pub fn new(
        deps: Collaborators,
        skips: Arc<SkipNotifier>,
        view: watch::Receiver<Arc<EligibilityView>>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            deps,
            skips,
            view,
            timing,
        }
    }

    /// Latest published eligibility view.
    pub fn latest_view(&self) -> Arc<EligibilityView> {
        self.view.borrow().clone()
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Poll until `done` accepts the deployment status or the status timeout elapses.
    pub async fn wait_for_status<F>(&self, service_id: &str, done: F) -> bool
    where
        F: Fn(DeploymentStatus) -> bool,
    {
        let poll = self.timing.poll_interval();
        let deadline = Instant::now() + self.timing.status_timeout();

        loop {
            match self.deps.deployments.get_status(service_id).await {
                Ok(status) if done(status) => return true,
                Ok(status) => debug!("{} is {}", service_id, status),
                Err(e) => {
                    self.deps
                        .audit
                        .log(&format!("deployment status check failed: {e}"))
                        .await
                }
            }

            if Instant::now() + poll > deadline {
                return false;
            }
            sleep(poll).await;
        }
    }

    /// Stop a service and wait until it is stopped.
    ///
    /// Already-stopped services succeed without a stop request. A failed stop
    /// request is logged and the status is still polled.
    pub async fn stop_agent(&self, service_id: &str) -> bool {
        if let Ok(status) = self.deps.deployments.get_status(service_id).await {
            if status.is_stopped() {
                debug!("{} already {}", service_id, status);
                return true;
            }
        }

        self.deps.audit.log(&format!("stopping {service_id}")).await;
        if let Err(e) = self.deps.deployments.stop(service_id).await {
            self.deps
                .audit
                .log(&format!("stop failed for {service_id}: {e}"))
                .await;
        }

        self.wait_for_status(service_id, DeploymentStatus::is_stopped)
            .await
    }

    /// Start an agent, retrying with backoff.
    ///
    /// Eligibility is re-checked against the latest view first. Returns `true`
    /// once the service reports Deployed.
    pub async fn start_agent_with_retries(&self, agent_type: &AgentType) -> bool {
        let view = self.latest_view();
        let Some(meta) = view.meta(agent_type) else {
            self.deps
                .audit
                .log(&format!("start error for {agent_type}: {}", AutoRunError::UnknownAgent(agent_type.clone())))
                .await;
            return false;
        };
        let name = meta.display_name();

        let eligibility = view.get(agent_type);
        if !eligibility.is_some_and(|e| e.can_run) {
            let reason = eligibility.and_then(|e| e.reason.as_deref());
            self.skips.notify_skip_once(agent_type, name, reason).await;
            return false;
        }

        let backoff: Vec<_> = self.timing.backoff().collect();
        for (index, delay) in backoff.iter().enumerate() {
            let attempt = index + 1;
            self.deps
                .audit
                .log(&format!("starting {agent_type} (attempt {attempt})"))
                .await;

            match self.start_once(meta).await {
                Ok(true) => {
                    self.deps.audit.log(&format!("started {agent_type}")).await;
                    return true;
                }
                Ok(false) => {
                    self.deps
                        .audit
                        .log(&format!("start timeout for {agent_type} (attempt {attempt})"))
                        .await;
                }
                Err(e) => {
                    self.deps
                        .audit
                        .log(&format!("start error for {agent_type}: {e:#}"))
                        .await;
                    let structural = e
                        .downcast_ref::<AutoRunError>()
                        .is_some_and(AutoRunError::is_structural);
                    if structural {
                        break;
                    }
                }
            }

            sleep(*delay).await;
        }

        let (title, body) = start_failed_message(name);
        self.deps.notifier.notify(&title, Some(body)).await;
        false
    }

    /// One attempt: custody, config reconciliation, start request, deploy wait.
    async fn start_once(&self, meta: &AgentMeta) -> Result<bool> {
        let custody_api = self.deps.custody.as_ref();
        let snapshot = custody::load_snapshot(custody_api).await?;
        if custody::ensure_custody(custody_api, &meta.chain_id, Some(&snapshot)).await? {
            self.deps
                .audit
                .log(&format!("created custody wallet on {} for {}", meta.chain_id, meta.agent_type))
                .await;
        }

        let patch = template_patch(meta)?;
        if !patch.is_empty() {
            self.deps
                .deployments
                .update_config(&meta.service_id, &patch)
                .await?;
            self.deps
                .audit
                .log(&format!("updated {} config ({} fields)", meta.agent_type, patch.len()))
                .await;
        }

        self.deps.deployments.start(&meta.service_id).await?;
        Ok(self
            .wait_for_status(&meta.service_id, |s| s == DeploymentStatus::Deployed)
            .await)
    }
}
