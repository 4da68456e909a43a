pub mod schema;

pub use schema::{AgentConfig, AutoRunConfig, TimingConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default autorun home directory (~/.autorun).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".autorun"))
        .unwrap_or_else(|| PathBuf::from(".autorun"))
}

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<AutoRunConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read autorun config file")?;
        let config: AutoRunConfig =
            toml::from_str(&contents).context("Failed to parse autorun config (TOML)")?;
        Ok(config)
    } else {
        Ok(AutoRunConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &AutoRunConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentType;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("autorun.toml")).unwrap();
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.timing.retry_backoff_secs, vec![15, 30, 60]);
        assert!(config.agents.is_empty());
    }

    #[test]
    fn test_parses_agent_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autorun.toml");
        std::fs::write(
            &path,
            r#"
middleware_url = "http://127.0.0.1:8765"

[timing]
cooldown_secs = 10

[[agents]]
agent_type = "trader"
display_name = "Omenstrat"
service_public_id = "valory/trader_pearl:0.1.0"
home_chain = "gnosis"
default_staking_program_id = "pearl_beta"

[[agents]]
agent_type = "memeooorr"
service_public_id = "dvilela/memeooorr:0.1.0"
home_chain = "base"
required_env = ["TWEEPY_BEARER_TOKEN"]

[agents.template]
agent_release = "v0.5.1"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.middleware_url, "http://127.0.0.1:8765");
        assert_eq!(config.timing.cooldown_secs, 10);
        assert_eq!(config.timing.poll_interval_secs, 5);
        assert_eq!(config.agents.len(), 2);

        let meme = config.agent(&AgentType::new("memeooorr")).unwrap();
        assert!(meme.enabled);
        assert_eq!(meme.required_env, vec!["TWEEPY_BEARER_TOKEN".to_string()]);
        assert!(meme.template.as_ref().unwrap().contains_key("agent_release"));
    }

    #[test]
    fn test_save_then_load_keeps_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("autorun.toml");
        let mut config = AutoRunConfig::default();
        config.agents.push(AgentConfig {
            agent_type: AgentType::new("optimus"),
            home_chain: "optimism".into(),
            ..AgentConfig::default()
        });

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.agents, config.agents);
    }
}
