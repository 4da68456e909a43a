//! Scheduler coordinator: triggers, single-flight rotation and failover.
//!
//! The coordinator itself runs on the daemon task. A rotation runs as its own
//! task holding a [`RotationPermit`]; the guard is taken before the task is
//! spawned and released when the permit drops, however the task ends.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::TimingConfig;
use crate::eligibility::EligibilityView;
use crate::lifecycle::{Collaborators, LifecycleDriver};
use crate::notify::AuditSink;
use crate::rotation::{find_next_eligible_agent, SkipNotifier};
use crate::scheduler::commands::{AutoRunStatus, Commands};
use crate::scheduler::guard::{RotationGuard, RotationPermit};
use crate::state::{membership, AutoRunStore};
use crate::types::{AgentType, EligibilityMap};

pub struct Coordinator {
    store: AutoRunStore,
    commands: Commands,
    audit: Arc<dyn AuditSink>,
    skips: Arc<SkipNotifier>,
    driver: Arc<LifecycleDriver>,
    guard: RotationGuard,
    gates: Arc<RetryGates>,
    publish: watch::Sender<Arc<EligibilityView>>,
    running: Option<AgentType>,
    /// Set once a run is observed while enabled; cleared whenever disabled.
    activated: bool,
}

impl Coordinator {
    pub fn new(store: AutoRunStore, deps: Collaborators, timing: TimingConfig) -> Self {
        let (publish, view) = watch::channel(Arc::new(EligibilityView::default()));
        let skips = Arc::new(SkipNotifier::new(deps.notifier.clone(), deps.audit.clone()));
        let audit = deps.audit.clone();
        let driver = Arc::new(LifecycleDriver::new(deps, skips.clone(), view, timing));
        Self {
            commands: Commands::new(store.clone(), audit.clone()),
            store,
            audit,
            skips,
            driver,
            guard: RotationGuard::default(),
            gates: Arc::default(),
            publish,
            running: None,
            activated: false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<EligibilityView>> {
        self.publish.subscribe()
    }

    /// Replace the published view as a whole.
    pub fn apply_view(&self, view: EligibilityView) {
        self.publish.send_replace(Arc::new(view));
    }

    pub fn view(&self) -> Arc<EligibilityView> {
        self.publish.borrow().clone()
    }

    pub fn eligibility(&self) -> EligibilityMap {
        self.view().eligibility.clone()
    }

    pub fn is_rotating(&self) -> bool {
        self.guard.is_held()
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn running(&self) -> Option<&AgentType> {
        self.running.as_ref()
    }

    pub async fn status(&self) -> Result<AutoRunStatus> {
        self.commands.status(&self.view().agent_types()).await
    }

    pub async fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if !enabled {
            self.activated = false;
            self.gates.clear();
        }
        self.commands.set_enabled(enabled).await
    }

    pub async fn include_agent(&self, agent_type: &AgentType) -> Result<bool> {
        self.commands
            .include_agent(agent_type, &self.view().agent_types())
            .await
    }

    pub async fn exclude_agent(&self, agent_type: &AgentType) -> Result<bool> {
        self.commands.exclude_agent(agent_type).await
    }

    /// Register configured agents; returns the ones newly appended to the rotation.
    pub async fn sync_agents(&self) -> Result<Vec<AgentType>> {
        let configured = self.view().agent_types();
        if configured.is_empty() {
            return Ok(Vec::new());
        }
        let appended = self.store.sync_discovered(&configured).await?;
        for agent in &appended {
            self.audit.log(&format!("added {agent} to rotation")).await;
        }
        Ok(appended)
    }

    /// Record the agent currently deployed, maintaining the activation latch
    /// and keeping the persisted current agent in step.
    pub async fn observe_running(&mut self, running: Option<AgentType>) -> Result<()> {
        let state = self.store.load().await?;
        self.running = running;

        if !state.enabled {
            self.activated = false;
            self.gates.clear();
            return Ok(());
        }
        let Some(running) = self.running.clone() else {
            return Ok(());
        };

        if !self.activated {
            self.activated = true;
            self.audit.log(&format!("activated by running {running}")).await;
        }

        // A rotation owns the current agent until it finishes.
        if !self.guard.is_held() && state.current_agent.as_ref() != Some(&running) {
            self.store.set_current_agent(Some(&running)).await?;
            self.audit.log(&format!("current agent set to {running}")).await;
        }
        Ok(())
    }

    /// Start a rotation if one is warranted and none is in flight.
    pub async fn evaluate_triggers(&self) -> Result<Option<JoinHandle<()>>> {
        if !self.activated || self.guard.is_held() {
            return Ok(None);
        }
        let state = self.store.load().await?;
        if !state.enabled {
            return Ok(None);
        }
        let now = Instant::now();
        if self.gates.rescan_pending(now) {
            return Ok(None);
        }

        let view = self.view();
        let ordered: Vec<AgentType> =
            membership::ordered_included(&state.included_agents, &view.agent_types())
                .into_iter()
                .map(|i| i.agent_type)
                .collect();

        let (stop, from) = match &self.running {
            Some(running) => {
                let saturated = view
                    .get(running)
                    .is_some_and(|e| e.is_eligible_for_rewards == Some(true));
                if !saturated {
                    return Ok(None);
                }
                if self.gates.stop_deferred(running, now) {
                    debug!("Stop of {} deferred after an earlier timeout", running);
                    return Ok(None);
                }
                (Some(running.clone()), Some(running.clone()))
            }
            None => (None, state.current_agent.clone()),
        };

        let Some(next) = select_next(&self.skips, from.as_ref(), &ordered, &view).await else {
            debug!("No eligible agent to rotate to");
            return Ok(None);
        };
        let Some(permit) = self.guard.try_acquire() else {
            return Ok(None);
        };

        match &stop {
            Some(running) => {
                self.audit
                    .log(&format!("rotation triggered: {running} earned rewards, next {next}"))
                    .await
            }
            None => self.audit.log(&format!("no agent running, next {next}")).await,
        }

        let rotation = Rotation {
            driver: self.driver.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
            skips: self.skips.clone(),
            gates: self.gates.clone(),
            ordered,
        };
        Ok(Some(tokio::spawn(rotation.run(permit, stop, next))))
    }
}

/// Deadlines that hold triggers back after a rotation that started nothing.
#[derive(Debug, Default)]
struct RetryGates {
    inner: Mutex<GateState>,
}

#[derive(Debug, Default)]
struct GateState {
    stop_until: HashMap<AgentType, Instant>,
    rescan_at: Option<Instant>,
}

impl RetryGates {
    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn defer_stop(&self, agent: AgentType, until: Instant) {
        self.state().stop_until.insert(agent, until);
    }

    fn stop_deferred(&self, agent: &AgentType, now: Instant) -> bool {
        self.state().stop_until.get(agent).is_some_and(|until| now < *until)
    }

    fn defer_rescan(&self, until: Instant) {
        self.state().rescan_at = Some(until);
    }

    fn rescan_pending(&self, now: Instant) -> bool {
        self.state().rescan_at.is_some_and(|at| now < at)
    }

    fn clear(&self) {
        let mut state = self.state();
        state.stop_until.clear();
        state.rescan_at = None;
    }
}

/// How a rotation ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Started,
    StopTimedOut(AgentType),
    Exhausted,
}

/// Run the rotation policy and surface its skips.
async fn select_next(
    skips: &SkipNotifier,
    current: Option<&AgentType>,
    ordered: &[AgentType],
    view: &EligibilityView,
) -> Option<AgentType> {
    let selection = find_next_eligible_agent(current, ordered, &view.eligibility);
    for (agent, reason) in &selection.skipped {
        skips
            .notify_skip_once(agent, &view.display_name(agent), Some(reason))
            .await;
    }
    selection.next
}

/// One rotation attempt including failover.
struct Rotation {
    driver: Arc<LifecycleDriver>,
    store: AutoRunStore,
    audit: Arc<dyn AuditSink>,
    skips: Arc<SkipNotifier>,
    gates: Arc<RetryGates>,
    ordered: Vec<AgentType>,
}

impl Rotation {
    async fn run(self, _permit: RotationPermit, stop: Option<AgentType>, first: AgentType) {
        let timing = self.driver.timing();
        match self.rotate(stop, first).await {
            Ok(Outcome::Started) => self.gates.clear(),
            Ok(Outcome::StopTimedOut(agent)) => {
                let delay = timing.stop_retry_backoff();
                self.gates.defer_stop(agent.clone(), Instant::now() + delay);
                self.audit
                    .log(&format!("next stop of {agent} in {}s", delay.as_secs()))
                    .await;
            }
            Ok(Outcome::Exhausted) => {
                let delay = timing.rescan_delay();
                self.gates.defer_rescan(Instant::now() + delay);
                self.audit
                    .log(&format!("rescan in {}s", delay.as_secs()))
                    .await;
            }
            Err(e) => self.audit.log(&format!("rotation error: {e:#}")).await,
        }
    }

    /// stop → cooldown → start, then fail over to untried candidates.
    async fn rotate(&self, mut stop: Option<AgentType>, first: AgentType) -> Result<Outcome> {
        let cooldown = self.driver.timing().cooldown();
        let mut tried: HashSet<AgentType> = stop.iter().cloned().collect();
        let mut candidate = first;

        loop {
            if let Some(agent) = stop.take() {
                let service_id = self
                    .driver
                    .latest_view()
                    .meta(&agent)
                    .map(|m| m.service_id.clone());
                if let Some(service_id) = service_id {
                    if !self.driver.stop_agent(&service_id).await {
                        self.audit
                            .log(&format!("stop timeout for {agent}, aborting rotation"))
                            .await;
                        return Ok(Outcome::StopTimedOut(agent));
                    }
                }
            }

            self.audit
                .log(&format!("cooldown {}s", cooldown.as_secs()))
                .await;
            sleep(cooldown).await;

            tried.insert(candidate.clone());
            self.store.set_current_agent(Some(&candidate)).await?;
            if self.driver.start_agent_with_retries(&candidate).await {
                info!("Rotation finished on {}", candidate);
                return Ok(Outcome::Started);
            }

            let view = self.driver.latest_view();
            let remaining: Vec<AgentType> = self
                .ordered
                .iter()
                .filter(|a| **a == candidate || !tried.contains(*a))
                .cloned()
                .collect();

            match select_next(&self.skips, Some(&candidate), &remaining, &view).await {
                Some(next) => {
                    self.audit
                        .log(&format!("failing over from {candidate} to {next}"))
                        .await;
                    stop = Some(candidate);
                    candidate = next;
                }
                None => {
                    self.audit
                        .log(&format!("no untried candidate after {candidate}, rotation ended"))
                        .await;
                    return Ok(Outcome::Exhausted);
                }
            }
        }
    }
}
