//! Reconciling a deployed service with its catalog template.

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::error::AutoRunError;
use crate::types::AgentMeta;

/// Template fields whose deployed value differs from the catalog.
///
/// Empty when the service already matches. Agents without a catalog template
/// cannot be reconciled and yield [`AutoRunError::MissingTemplate`].
pub fn template_patch(meta: &AgentMeta) -> Result<Map<String, Value>> {
    let template = meta
        .config
        .template
        .as_ref()
        .ok_or_else(|| AutoRunError::MissingTemplate(meta.agent_type.clone()))?;

    let desired = match serde_json::to_value(template)
        .with_context(|| format!("Invalid template for {}", meta.agent_type))?
    {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    Ok(desired
        .into_iter()
        .filter(|(key, value)| meta.template.get(key) != Some(value))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn meta(template: Option<&str>, deployed: Value) -> AgentMeta {
        AgentMeta {
            agent_type: "trader".into(),
            config: AgentConfig {
                agent_type: "trader".into(),
                template: template.map(|t| toml::from_str(t).unwrap()),
                ..AgentConfig::default()
            },
            service_id: "sc-trader".into(),
            chain_id: "gnosis".into(),
            staking_program_id: "pearl_beta".into(),
            multisig: None,
            token_id: None,
            env: BTreeMap::new(),
            template: match deployed {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }

    #[test]
    fn test_only_changed_fields_are_patched() {
        let m = meta(
            Some(
                r#"
                hash = "bafy-new"
                agent_release = "v0.4.0"
                description = "Trader agent"
                "#,
            ),
            json!({ "hash": "bafy-old", "agent_release": "v0.4.0", "description": "Trader agent" }),
        );
        let patch = template_patch(&m).unwrap();
        assert_eq!(Value::Object(patch), json!({ "hash": "bafy-new" }));
    }

    #[test]
    fn test_matching_service_needs_no_patch() {
        let m = meta(Some("hash = \"bafy\""), json!({ "hash": "bafy", "name": "Trader" }));
        assert!(template_patch(&m).unwrap().is_empty());
    }

    #[test]
    fn test_missing_template_is_structural() {
        let m = meta(None, json!({}));
        let err = template_patch(&m).unwrap_err();
        let err = err.downcast_ref::<AutoRunError>().unwrap();
        assert!(matches!(err, AutoRunError::MissingTemplate(_)));
        assert!(err.is_structural());
    }
}
