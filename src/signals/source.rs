//! Signal sources polled by the daemon.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::signals::{AgentSignals, FundingSignals, GeoEligibility, SignalSnapshot};
use crate::types::AgentType;

/// Produces a fresh snapshot of staking, rewards, geo and funding signals.
///
/// Custody data is filled in separately by the caller.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch(&self) -> Result<SignalSnapshot>;
}

/// Payload served by the control panel's signal cache.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignalFeed {
    agents: BTreeMap<AgentType, AgentSignals>,
    funding: Option<FundingSignals>,
}

/// HTTP signal source reading the control-panel cache and the geo lookup.
#[derive(Debug, Clone)]
pub struct HttpSignalSource {
    signals_url: String,
    geo_url: String,
    http: reqwest::Client,
}

impl HttpSignalSource {
    pub fn new(signals_url: &str, geo_url: &str) -> Self {
        Self {
            signals_url: signals_url.to_string(),
            geo_url: geo_url.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn fetch_feed(&self) -> Result<SignalFeed> {
        let resp = self
            .http
            .get(&self.signals_url)
            .send()
            .await
            .context("Signal feed request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Signal feed failed ({}): {}", status, body);
        }

        resp.json().await.context("Failed to parse signal feed")
    }

    async fn fetch_geo(&self) -> Result<GeoEligibility> {
        let resp = self
            .http
            .get(&self.geo_url)
            .header("accept", "application/json")
            .send()
            .await
            .context("Geo eligibility request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Failed to fetch geo eligibility: {}", status);
        }

        resp.json().await.context("Failed to parse geo eligibility")
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn fetch(&self) -> Result<SignalSnapshot> {
        let feed = self.fetch_feed().await?;

        // Geo data is non-critical: a failed lookup leaves it unloaded.
        let geo = if self.geo_url.is_empty() {
            None
        } else {
            match self.fetch_geo().await {
                Ok(geo) => Some(geo),
                Err(e) => {
                    warn!("Geo eligibility unavailable: {e}");
                    None
                }
            }
        };

        debug!("Fetched signals for {} agents", feed.agents.len());
        Ok(SignalSnapshot {
            agents: feed.agents,
            geo,
            funding: feed.funding,
            custody: None,
            now: chrono::Utc::now().timestamp(),
        })
    }
}
