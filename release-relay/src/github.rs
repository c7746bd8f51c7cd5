//! GitHub REST client implementing both [`ReleaseHost`] and [`DocsRepository`].
//!
//! One instance per token: the release repository and the documentation repository are usually
//! written with different credentials.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use release_relay_core::config::RepoRef;
use release_relay_core::contract::{
    AssetUpload, CreatedRelease, DocsRepository, Issue, MergeResult, NewRelease, PullRequest,
    ReleaseHost,
};
use release_relay_core::HostError;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const ACCEPT: &str = "application/vnd.github.v3+json";
const API_VERSION: &str = "2022-11-28";

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    raw_base: String,
    token: Option<String>,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, token: Option<String>, timeout: Duration) -> Self {
        Self {
            http,
            api_base: API_BASE.to_string(),
            raw_base: RAW_BASE.to_string(),
            token,
            timeout,
        }
    }

    /// Point the client at a different API/raw host (GitHub Enterprise, test servers).
    pub fn with_bases(mut self, api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.raw_base = raw_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, repo: &RepoRef, tail: &str) -> String {
        format!("{}/repos/{}/{}", self.api_base, repo, tail)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .timeout(self.timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn write_request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, HostError> {
        if self.token.is_none() {
            tracing::error!(url, "Write request attempted without a GitHub token");
            return Err(HostError::Transport(format!(
                "no GitHub token configured for write request to {url}"
            )));
        }
        Ok(self.request(method, url))
    }
}

/// Turn a non-success response into [`HostError::Rejected`] carrying status and body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    tracing::error!(status = %status, body = %body, "GitHub API returned error");
    Err(HostError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Strip the RFC 6570 suffix (`{?name,label}`) from a release upload URL.
pub fn upload_endpoint(template: &str) -> &str {
    match template.find('{') {
        Some(i) => &template[..i],
        None => template,
    }
}

#[derive(Debug, Deserialize)]
struct RawLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawHead {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    title: String,
    head: RawHead,
    #[serde(default)]
    labels: Vec<RawLabel>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    labels: Vec<RawLabel>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    id: u64,
    tag_name: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct RawMerge {
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    async fn latest_release_tag(&self, repo: &RepoRef) -> Result<String, HostError> {
        let url = self.api_url(repo, "releases/latest");
        tracing::info!(url = %url, "Fetching latest release");
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let release: RawRelease = ensure_success(response).await?.json().await?;
        tracing::info!(tag = %release.tag_name, "Latest published release");
        Ok(release.tag_name)
    }

    async fn create_release(
        &self,
        repo: &RepoRef,
        release: &NewRelease,
    ) -> Result<CreatedRelease, HostError> {
        let url = self.api_url(repo, "releases");
        let payload = serde_json::json!({
            "tag_name": release.tag_name,
            "target_commitish": release.target_commitish,
            "name": release.name,
            "body": release.body,
            "draft": release.draft,
            "prerelease": release.prerelease,
            "make_latest": if release.make_latest { "true" } else { "false" },
        });
        tracing::info!(url = %url, tag = %release.tag_name, "Creating GitHub release");
        let response = self
            .write_request(reqwest::Method::POST, &url)?
            .json(&payload)
            .send()
            .await?;
        let created: RawRelease = ensure_success(response).await?.json().await?;
        Ok(CreatedRelease {
            id: created.id,
            html_url: created.html_url,
            upload_url: created.upload_url,
        })
    }

    async fn upload_asset(
        &self,
        release: &CreatedRelease,
        asset: &AssetUpload,
    ) -> Result<(), HostError> {
        let url = upload_endpoint(&release.upload_url).to_string();
        let bytes = tokio::fs::read(&asset.path)
            .await
            .map_err(|e| HostError::Transport(format!("{}: {e}", asset.path.display())))?;
        tracing::info!(
            url = %url,
            asset = %asset.name,
            bytes = bytes.len(),
            content_type = %asset.content_type,
            "Uploading release asset"
        );
        // Asset uploads can be large; no request timeout here.
        let mut builder = self
            .http
            .post(&url)
            .query(&[("name", asset.name.as_str())])
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(reqwest::header::CONTENT_TYPE, asset.content_type.as_str())
            .body(bytes);
        match &self.token {
            Some(token) => builder = builder.bearer_auth(token),
            None => {
                return Err(HostError::Transport(
                    "no GitHub token configured for asset upload".to_string(),
                ))
            }
        }
        ensure_success(builder.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl DocsRepository for GitHubClient {
    async fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> Result<Vec<PullRequest>, HostError> {
        let url = self.api_url(repo, "pulls");
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("state", "open"), ("per_page", "100")])
            .send()
            .await?;
        let raw: Vec<RawPullRequest> = ensure_success(response).await?.json().await?;
        tracing::debug!(url = %url, count = raw.len(), "Fetched open pull requests");
        Ok(raw
            .into_iter()
            .map(|pr| PullRequest {
                number: pr.number,
                title: pr.title,
                head_ref: pr.head.ref_name,
                labels: pr.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }

    async fn list_open_issues(&self, repo: &RepoRef, label: &str) -> Result<Vec<Issue>, HostError> {
        let url = self.api_url(repo, "issues");
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("state", "open"), ("labels", label), ("per_page", "100")])
            .send()
            .await?;
        let raw: Vec<RawIssue> = ensure_success(response).await?.json().await?;
        tracing::debug!(url = %url, label, count = raw.len(), "Fetched open issues");
        Ok(raw
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .map(|issue| Issue {
                number: issue.number,
                title: issue.title,
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
            })
            .collect())
    }

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<MergeResult, HostError> {
        let url = self.api_url(repo, &format!("pulls/{number}/merge"));
        tracing::info!(url = %url, "Merging pull request");
        let response = self
            .write_request(reqwest::Method::PUT, &url)?
            .send()
            .await?;
        let merged: RawMerge = ensure_success(response).await?.json().await?;
        Ok(MergeResult {
            merged: merged.merged,
            sha: merged.sha,
            message: merged.message,
        })
    }

    async fn fetch_raw_file(
        &self,
        repo: &RepoRef,
        reference: &str,
        path: &str,
    ) -> Result<String, HostError> {
        let url = format!(
            "{}/{}/{}/{}",
            self.raw_base,
            repo,
            reference,
            path.trim_start_matches('/')
        );
        tracing::info!(url = %url, "Fetching raw file");
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await?;
        Ok(ensure_success(response).await?.text().await?)
    }
}
