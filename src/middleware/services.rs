//! Service records reported by the middleware and their mapping to agents.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::AgentConfig;
use crate::types::{AgentMeta, AgentType};

/// One service as listed by `GET /api/v2/services`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceRecord {
    pub service_config_id: String,
    pub service_public_id: String,
    pub home_chain: String,
    #[serde(default)]
    pub chain_configs: BTreeMap<String, ChainConfig>,
    #[serde(default)]
    pub env_variables: BTreeMap<String, EnvVariable>,
    /// Remaining template fields (name, hash, agent_release, ...).
    #[serde(flatten)]
    pub template: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub chain_data: ChainData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainData {
    pub multisig: Option<String>,
    pub token: Option<i64>,
    #[serde(default)]
    pub user_params: UserParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserParams {
    pub staking_program_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvVariable {
    #[serde(default)]
    pub value: Option<String>,
}

/// Catalog entry matching a service by public id and home chain.
pub fn catalog_entry<'a>(service: &ServiceRecord, catalog: &'a [AgentConfig]) -> Option<&'a AgentConfig> {
    catalog.iter().find(|agent| {
        agent.service_public_id == service.service_public_id && agent.home_chain == service.home_chain
    })
}

/// Build agent metadata for every service that maps onto the catalog.
///
/// Services without an enabled catalog entry or without a home-chain config are ignored.
/// The first service wins when several map to the same agent type.
pub fn configured_agents(services: &[ServiceRecord], catalog: &[AgentConfig]) -> Vec<AgentMeta> {
    let mut metas: Vec<AgentMeta> = Vec::new();

    for service in services {
        let Some(config) = catalog_entry(service, catalog).filter(|c| c.enabled) else {
            continue;
        };
        let Some(chain_config) = service.chain_configs.get(&service.home_chain) else {
            continue;
        };
        if metas.iter().any(|m| m.agent_type == config.agent_type) {
            continue;
        }

        let chain_data = &chain_config.chain_data;
        let staking_program_id = chain_data
            .user_params
            .staking_program_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| config.default_staking_program_id.clone());

        let env = service
            .env_variables
            .iter()
            .filter_map(|(k, v)| v.value.clone().map(|value| (k.clone(), value)))
            .collect();

        metas.push(AgentMeta {
            agent_type: config.agent_type.clone(),
            config: config.clone(),
            service_id: service.service_config_id.clone(),
            chain_id: service.home_chain.clone(),
            staking_program_id,
            multisig: chain_data.multisig.clone().filter(|m| !m.is_empty()),
            token_id: chain_data.token.and_then(|t| u64::try_from(t).ok()),
            env,
            template: service.template.clone(),
        });
    }

    metas
}
