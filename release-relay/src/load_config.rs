/// `load_config` module: loads the static YAML config and the environment secrets into one
/// immutable [`CliConfig`] for the run.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`RelayConfig`] (serde defaults fill every flow option)
/// - Read tokens, credentials and per-run values from the environment exactly once
/// - Fail before any network call when a required value is missing or only partially configured
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{anyhow, Result};
use release_relay_core::config::RelayConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug)]
pub struct CliConfig {
    pub relay: RelayConfig,
    pub env: EnvSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZulipSettings {
    pub site: String,
    pub bot_email: String,
    pub bot_api_key: String,
    pub stream: String,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
}

/// Values taken from the environment at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSettings {
    /// `PAT_TOKEN`: writes to the documentation repository.
    pub repo_token: Option<String>,
    /// `GITHUB_TOKEN`, falling back to `PAT_TOKEN`: writes to the release repository.
    pub release_token: Option<String>,
    /// `SIGNING_TOKEN`: bearer token for the signed package download.
    pub signing_token: Option<String>,
    /// `VERSION`: candidate version; the storefront is queried when absent.
    pub version: Option<String>,
    /// `DOWNLOAD_URL`: signed package location.
    pub download_url: Option<String>,
    pub zulip: Option<ZulipSettings>,
    /// `SOCIAL_WEBHOOK_URL`
    pub social_webhook: Option<String>,
    /// `GITHUB_OUTPUT` on GitHub Actions runners.
    pub pipeline_output: Option<PathBuf>,
    /// Object store credentials keyed by env prefix (`S3`, `MINIO`, ...).
    pub stores: Vec<(String, StoreCredentials)>,
}

impl EnvSettings {
    pub fn from_env(store_prefixes: &[String]) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), store_prefixes)
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F, store_prefixes: &[String]) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let repo_token = get("PAT_TOKEN");
        let release_token = get("GITHUB_TOKEN").or_else(|| repo_token.clone());

        let zulip = group(
            &get,
            "Zulip",
            &[
                "ZULIP_SITE",
                "ZULIP_BOT_EMAIL",
                "ZULIP_BOT_API_KEY",
                "ZULIP_STREAM",
                "ZULIP_TOPIC",
            ],
        )?
        .map(|mut v| ZulipSettings {
            topic: v.remove(4),
            stream: v.remove(3),
            bot_api_key: v.remove(2),
            bot_email: v.remove(1),
            site: v.remove(0),
        });

        let mut stores = Vec::new();
        for prefix in store_prefixes {
            let keys = [
                format!("{prefix}_ACCESS_KEY"),
                format!("{prefix}_SECRET_KEY"),
                format!("{prefix}_ENDPOINT"),
            ];
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            if let Some(mut v) = group(&get, prefix, &keys)? {
                stores.push((
                    prefix.clone(),
                    StoreCredentials {
                        endpoint: v.remove(2),
                        secret_key: v.remove(1),
                        access_key: v.remove(0),
                    },
                ));
            }
        }

        let settings = EnvSettings {
            repo_token,
            release_token,
            signing_token: get("SIGNING_TOKEN"),
            version: get("VERSION"),
            download_url: get("DOWNLOAD_URL"),
            zulip,
            social_webhook: get("SOCIAL_WEBHOOK_URL"),
            pipeline_output: get("GITHUB_OUTPUT").map(PathBuf::from),
            stores,
        };
        info!(
            repo_token_set = settings.repo_token.is_some(),
            release_token_set = settings.release_token.is_some(),
            signing_token_set = settings.signing_token.is_some(),
            version = ?settings.version,
            download_url_set = settings.download_url.is_some(),
            zulip = settings.zulip.is_some(),
            social_webhook = settings.social_webhook.is_some(),
            stores = settings.stores.len(),
            "Environment settings loaded"
        );
        Ok(settings)
    }

    pub fn require_repo_token(&self) -> Result<&str> {
        self.repo_token
            .as_deref()
            .ok_or_else(|| anyhow!("Configuration error: PAT_TOKEN is not set"))
    }

    pub fn require_release_token(&self) -> Result<&str> {
        self.release_token
            .as_deref()
            .ok_or_else(|| anyhow!("Configuration error: neither GITHUB_TOKEN nor PAT_TOKEN is set"))
    }

    pub fn require_signing_token(&self) -> Result<&str> {
        self.signing_token.as_deref().ok_or_else(|| {
            anyhow!("Configuration error: SIGNING_TOKEN must be set when DOWNLOAD_URL is set")
        })
    }

    pub fn store_credentials(&self, prefix: &str) -> Result<&StoreCredentials> {
        self.stores
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, c)| c)
            .ok_or_else(|| {
                anyhow!(
                    "Configuration error: {prefix}_ACCESS_KEY, {prefix}_SECRET_KEY and {prefix}_ENDPOINT must be set"
                )
            })
    }
}

/// All-or-nothing lookup of a group of keys. `None` when none are set, error when only some are.
fn group<G>(get: &G, label: &str, keys: &[&str]) -> Result<Option<Vec<String>>>
where
    G: Fn(&str) -> Option<String>,
{
    let values: Vec<Option<String>> = keys.iter().map(|k| get(k)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    let missing: Vec<&str> = keys
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        error!(group = label, ?missing, "Partially configured environment group");
        return Err(anyhow!(
            "Configuration error: {label} is partially configured, missing {}",
            missing.join(", ")
        ));
    }
    Ok(Some(values.into_iter().flatten().collect()))
}

/// Parse the YAML file only.
pub fn load_relay_config<P: AsRef<Path>>(path: P) -> Result<RelayConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    match serde_yaml::from_str::<RelayConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// Load the YAML config and inject environment settings.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let relay = load_relay_config(path)?;
    let prefixes: Vec<String> = relay
        .object_stores
        .iter()
        .map(|s| s.env_prefix.clone())
        .collect();
    let env = EnvSettings::from_env(&prefixes)?;
    Ok(CliConfig { relay, env })
}
