use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default = "default_static_registries")]
    pub static_registries: Vec<StaticRegistryConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: ConsoleConfig::default(),
            workspace: WorkspaceConfig::default(),
            discovery: DiscoveryConfig::default(),
            static_registries: default_static_registries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the console API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Organization ids to authenticate against. Empty disables the
    /// organization registry kind.
    #[serde(default)]
    pub organizations: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            organizations: Vec::new(),
        }
    }
}

fn default_api_base() -> String {
    "https://console.snowplowanalytics.com/api/msc/v1".to_string()
}
fn default_api_key_env() -> String {
    "SNOWPLOW_CONSOLE_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    /// Polling interval for the change watcher; 0 disables polling.
    #[serde(default)]
    pub watch_poll_secs: u64,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            watch_poll_secs: 0,
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Soft deadline before `discover()` triggers a fresh pass.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

fn default_deadline_ms() -> u64 {
    1000
}
fn default_http_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StaticRegistryConfig {
    pub name: String,
    pub base_url: String,
    /// Manifest path relative to `base_url`; empty means the base URL
    /// itself serves the manifest.
    #[serde(default)]
    pub manifest: String,
}

fn default_static_registries() -> Vec<StaticRegistryConfig> {
    vec![StaticRegistryConfig {
        name: "Iglu Central".to_string(),
        base_url: "http://iglucentral.com/schemas".to_string(),
        manifest: String::new(),
    }]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate discovery
    if config.discovery.deadline_ms == 0 {
        anyhow::bail!("discovery.deadline_ms must be > 0");
    }
    if config.discovery.http_timeout_secs == 0 {
        anyhow::bail!("discovery.http_timeout_secs must be > 0");
    }

    // Validate static registries
    for registry in &config.static_registries {
        if registry.name.trim().is_empty() {
            anyhow::bail!("static registry name must not be empty");
        }
        if !registry.base_url.starts_with("http://") && !registry.base_url.starts_with("https://") {
            anyhow::bail!(
                "static registry '{}' base_url must start with http:// or https://",
                registry.name
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_iglu_central_and_cwd() {
        let config = Config::default();
        assert_eq!(config.static_registries.len(), 1);
        assert_eq!(config.static_registries[0].name, "Iglu Central");
        assert_eq!(config.workspace.roots, vec![PathBuf::from(".")]);
        assert_eq!(config.discovery.deadline_ms, 1000);
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
[console]
api_base = "https://console.example.com/api/msc/v1"
api_key_env = "EXAMPLE_KEY"
organizations = ["11111111-1111-1111-1111-111111111111"]

[workspace]
roots = ["schemas", "more-schemas"]
watch_poll_secs = 5

[discovery]
deadline_ms = 250
http_timeout_secs = 10

[[static_registries]]
name = "Iglu Central"
base_url = "http://iglucentral.com/schemas"
manifest = ""

[[static_registries]]
name = "Mirror"
base_url = "https://mirror.example.com/schemas"
manifest = "manifest.json"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.console.organizations.len(), 1);
        assert_eq!(config.workspace.roots.len(), 2);
        assert_eq!(config.static_registries.len(), 2);
        assert_eq!(config.static_registries[1].manifest, "manifest.json");
    }

    #[test]
    fn rejects_zero_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iglu.toml");
        std::fs::write(&path, "[discovery]\ndeadline_ms = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_schemeless_static_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iglu.toml");
        std::fs::write(
            &path,
            "[[static_registries]]\nname = \"Bad\"\nbase_url = \"iglucentral.com\"\n",
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }
}
