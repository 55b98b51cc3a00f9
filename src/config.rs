use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Agent configuration ───────────────────────────────────────────────────────

/// The four values that identify one Copilot Studio agent and the app
/// registration used to sign in. All are required before connecting; they are
/// editable only while disconnected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Power Platform environment ID (admin center → environment details)
    #[serde(default)]
    pub environment_id: String,
    /// Agent schema name from Copilot Studio settings (not the display name)
    #[serde(default)]
    pub agent_id: String,
    /// Entra ID tenant ID
    #[serde(default)]
    pub tenant_id: String,
    /// Client ID of the app registration used for sign-in
    #[serde(default)]
    pub client_id: String,
}

impl AgentConfig {
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of fields still empty, in display order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.environment_id.trim().is_empty() {
            out.push("environment id");
        }
        if self.agent_id.trim().is_empty() {
            out.push("agent schema name");
        }
        if self.tenant_id.trim().is_empty() {
            out.push("tenant id");
        }
        if self.client_id.trim().is_empty() {
            out.push("client id");
        }
        out
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub agent: AgentConfig,
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)?;
        Ok(path)
    }
}

/// Merge the config file with per-invocation overrides.
/// Priority: CLI args > env vars (handled by clap) > config file.
pub fn resolve(
    file: &ConfigFile,
    environment_id: Option<&str>,
    agent_id: Option<&str>,
    tenant_id: Option<&str>,
    client_id: Option<&str>,
) -> AgentConfig {
    AgentConfig {
        environment_id: environment_id
            .map(str::to_string)
            .unwrap_or_else(|| file.agent.environment_id.clone()),
        agent_id: agent_id
            .map(str::to_string)
            .unwrap_or_else(|| file.agent.agent_id.clone()),
        tenant_id: tenant_id
            .map(str::to_string)
            .unwrap_or_else(|| file.agent.tenant_id.clone()),
        client_id: client_id
            .map(str::to_string)
            .unwrap_or_else(|| file.agent.client_id.clone()),
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_path() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("copichat")
        .join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config on Linux/macOS
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# copichat configuration
# Run `copichat --init` to regenerate this file.
#
# All four values are required before connecting. Each can also be supplied
# per-invocation via COPICHAT_ENVIRONMENT_ID, COPICHAT_AGENT_ID,
# COPICHAT_TENANT_ID and COPICHAT_CLIENT_ID, or edited in the Config tab.

[agent]
# Environment ID — Power Platform admin center, environment details
environment_id = ""
# Agent schema name — Copilot Studio agent settings (not the display name)
agent_id = ""
# Tenant ID — Entra ID overview page
tenant_id = ""
# Client ID — the app registration used for sign-in
client_id = ""
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_reported_in_display_order() {
        let config = AgentConfig {
            environment_id: "env".to_string(),
            tenant_id: "  ".to_string(),
            ..Default::default()
        };
        assert!(!config.is_complete());
        assert_eq!(
            config.missing_fields(),
            vec!["agent schema name", "tenant id", "client id"]
        );
    }

    #[test]
    fn overrides_win_over_file_values() {
        let file = ConfigFile {
            agent: AgentConfig {
                environment_id: "file-env".to_string(),
                agent_id: "file-agent".to_string(),
                tenant_id: "file-tenant".to_string(),
                client_id: "file-client".to_string(),
            },
        };
        let resolved = resolve(&file, Some("cli-env"), None, Some("cli-tenant"), None);
        assert_eq!(resolved.environment_id, "cli-env");
        assert_eq!(resolved.agent_id, "file-agent");
        assert_eq!(resolved.tenant_id, "cli-tenant");
        assert_eq!(resolved.client_id, "file-client");
    }

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ConfigFile::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(loaded.agent, AgentConfig::default());
    }

    #[test]
    fn config_file_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let file = ConfigFile {
            agent: AgentConfig {
                environment_id: "11111111-2222-3333-4444-555555555555".to_string(),
                agent_id: "cr123_myAgent".to_string(),
                tenant_id: "tenant".to_string(),
                client_id: "client".to_string(),
            },
        };
        fs::write(&path, toml::to_string(&file).unwrap()).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded.agent, file.agent);
    }

    #[test]
    fn default_template_parses() {
        let parsed: ConfigFile = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed.agent, AgentConfig::default());
    }
}
