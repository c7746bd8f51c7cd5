use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::readiness::TitleCheck;

/// A GitHub-style `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(RepoRef::new(owner, name))
            }
            _ => Err(RelayError::config(format!(
                "repository must be written as owner/name, got {s:?}"
            ))),
        }
    }
}

impl TryFrom<String> for RepoRef {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoRef> for String {
    fn from(value: RepoRef) -> Self {
        value.to_string()
    }
}

/// Which pull request and issue the readiness gate looks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub docs_repo: RepoRef,
    pub main_repo: RepoRef,
    #[serde(default = "default_docs_label")]
    pub docs_label: String,
    #[serde(default = "default_publish_label")]
    pub publish_label: String,
    #[serde(default = "default_true")]
    pub require_publish_issue: bool,
    #[serde(default)]
    pub title_check: TitleCheck,
    /// Raise instead of exiting quietly when no documentation PR is open yet.
    #[serde(default)]
    pub fail_when_not_ready: bool,
}

/// Where the update logs live and how the release notes are decorated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogConfig {
    #[serde(default = "default_en_log_path")]
    pub en_log_path: String,
    #[serde(default = "default_zh_log_path")]
    pub zh_log_path: String,
    #[serde(default = "default_badge_marker")]
    pub badge_marker: String,
    #[serde(default = "default_faq_footer")]
    pub faq_footer: Option<String>,
    #[serde(default)]
    pub mirror_links: Vec<MirrorLink>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            en_log_path: default_en_log_path(),
            zh_log_path: default_zh_log_path(),
            badge_marker: default_badge_marker(),
            faq_footer: default_faq_footer(),
            mirror_links: Vec::new(),
        }
    }
}

/// A download mirror listed under the release notes. `{version}` and `{asset}` are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorLink {
    pub label: String,
    pub url: String,
}

/// Release host settings and the local artifacts the run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub repo: RepoRef,
    #[serde(default = "default_web_base")]
    pub web_base: String,
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default = "default_true")]
    pub make_latest: bool,
    #[serde(default = "default_true")]
    pub create_release: bool,
    #[serde(default = "default_true")]
    pub merge_docs: bool,
    #[serde(default = "default_true")]
    pub checksum: bool,
    #[serde(default = "default_asset_name_template")]
    pub asset_name_template: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_checksum_file")]
    pub checksum_file: String,
    #[serde(default = "default_body_path")]
    pub body_path: PathBuf,
}

impl ReleaseConfig {
    /// Public web page of the release repository, e.g. `https://github.com/owner/name`.
    pub fn repo_page(&self) -> String {
        format!("{}/{}", self.web_base.trim_end_matches('/'), self.repo)
    }
}

/// Storefront listing query used to discover a candidate version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorefrontConfig {
    pub endpoint: String,
    pub product_id: String,
    #[serde(default = "default_ring")]
    pub ring: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Package family prefix of the file name, e.g. `60568DGPStudio.SnapHutao`.
    pub package: String,
    #[serde(default = "default_arch")]
    pub arch: String,
}

/// One S3-compatible bucket the `upload` step pushes to. Credentials come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub name: String,
    pub bucket: String,
    /// Environment variable prefix, e.g. `S3` for `S3_ACCESS_KEY`/`S3_SECRET_KEY`/`S3_ENDPOINT`.
    pub env_prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
}

/// Static, secret-free configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub gate: GateConfig,
    pub release: ReleaseConfig,
    #[serde(default)]
    pub changelog: ChangelogConfig,
    #[serde(default)]
    pub storefront: Option<StorefrontConfig>,
    /// Defaults to the R2 distribution bucket and the MinIO mirror.
    #[serde(default = "default_object_stores")]
    pub object_stores: Vec<ObjectStoreConfig>,
}

impl RelayConfig {
    pub fn trace_loaded(&self) {
        info!(
            docs_repo = %self.gate.docs_repo,
            main_repo = %self.gate.main_repo,
            release_repo = %self.release.repo,
            storefront = self.storefront.is_some(),
            object_stores = self.object_stores.len(),
            "Loaded RelayConfig"
        );
        debug!(?self, "RelayConfig loaded (full debug)");
    }
}

fn default_true() -> bool {
    true
}

fn default_docs_label() -> String {
    "Document Updates".to_string()
}

fn default_publish_label() -> String {
    "Publish".to_string()
}

fn default_en_log_path() -> String {
    "docs/en/statements/update-log.md".to_string()
}

fn default_zh_log_path() -> String {
    "docs/zh/statements/update-log.md".to_string()
}

fn default_badge_marker() -> String {
    "<Badge text=".to_string()
}

fn default_faq_footer() -> Option<String> {
    Some(
        "如果你安装过程中出现问题，请阅读我们的 [FAQ 文档](https://hut.ao/zh/advanced/FAQ.html)以获取解决方案\n\
         If you have any issue during the installation, please check our \
         [FAQ document](https://hut.ao/en/advanced/FAQ.html) for solutions"
            .to_string(),
    )
}

fn default_web_base() -> String {
    "https://github.com".to_string()
}

fn default_target_branch() -> String {
    "main".to_string()
}

fn default_asset_name_template() -> String {
    "Snap.Hutao.{version}.msix".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_checksum_file() -> String {
    "SHA512SUM".to_string()
}

fn default_body_path() -> PathBuf {
    PathBuf::from("release_body.md")
}

fn default_ring() -> String {
    "RP".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_arch() -> String {
    "x64".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_object_stores() -> Vec<ObjectStoreConfig> {
    vec![
        ObjectStoreConfig {
            name: "r2".to_string(),
            bucket: "hutao-distribute".to_string(),
            env_prefix: "S3".to_string(),
            region: default_region(),
        },
        ObjectStoreConfig {
            name: "minio".to_string(),
            bucket: "hutao".to_string(),
            env_prefix: "MINIO".to_string(),
            region: default_region(),
        },
    ]
}
