//! # contract: ports to every external system the release pipeline talks to
//!
//! The pipeline never builds an HTTP request itself (the streaming asset download aside).
//! Each collaborator sits behind one of the traits below:
//!
//! - [`ReleaseHost`]: reads the latest published tag, creates releases and uploads assets.
//! - [`DocsRepository`]: lists open pull requests and issues, merges a pull request and serves
//!   raw file content at a branch ref.
//! - [`Storefront`]: returns the HTML listing page that a candidate version is scraped from.
//! - [`Notifier`]: best-effort announcement channel (chat stream, social webhook).
//! - [`ObjectStore`]: S3-compatible bucket the package is mirrored to.
//!
//! ## Mocking & Testing
//! - All traits are annotated for `mockall`; the mocks are exported under the
//!   `test-export-mocks` feature so integration tests can drive the whole pipeline offline.
//!
//! ## Errors
//! - Implementations map transport and status failures into [`HostError`]. A read timeout must
//!   surface as [`HostError::Timeout`]; the merge step relies on it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use mockall::automock;

use crate::changelog::ChangelogBundle;
use crate::config::RepoRef;
use crate::error::HostError;

/// An open pull request in the documentation repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Name of the source branch, used to fetch raw changelog files.
    pub head_ref: String,
    pub labels: Vec<String>,
}

/// An open issue in the main repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub labels: Vec<String>,
}

/// Everything needed to create a release record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub body: String,
    pub draft: bool,
    pub prerelease: bool,
    pub make_latest: bool,
}

/// The release record returned by the host after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRelease {
    pub id: u64,
    pub html_url: String,
    /// Upload URL template as returned by the host (may carry a `{?name,label}` suffix).
    pub upload_url: String,
}

/// A local file to attach to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpload {
    pub path: PathBuf,
    pub name: String,
    pub content_type: String,
}

/// Result of merging a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: bool,
    pub sha: Option<String>,
    pub message: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Tag name of the release currently marked as latest.
    async fn latest_release_tag(&self, repo: &RepoRef) -> Result<String, HostError>;

    /// Create a release record. Validation and not-found responses come back as
    /// [`HostError::Rejected`].
    async fn create_release(
        &self,
        repo: &RepoRef,
        release: &NewRelease,
    ) -> Result<CreatedRelease, HostError>;

    /// Upload one asset to a release created by [`ReleaseHost::create_release`].
    async fn upload_asset(
        &self,
        release: &CreatedRelease,
        asset: &AssetUpload,
    ) -> Result<(), HostError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocsRepository: Send + Sync {
    /// All open pull requests, labels included.
    async fn list_open_pull_requests(&self, repo: &RepoRef)
        -> Result<Vec<PullRequest>, HostError>;

    /// Open issues carrying `label`.
    async fn list_open_issues(&self, repo: &RepoRef, label: &str)
        -> Result<Vec<Issue>, HostError>;

    async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<MergeResult, HostError>;

    /// Text content of `path` at branch or ref `reference`.
    async fn fetch_raw_file(
        &self,
        repo: &RepoRef,
        reference: &str,
        path: &str,
    ) -> Result<String, HostError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Storefront: Send + Sync {
    /// HTML of the package listing page.
    async fn fetch_listing(&self) -> Result<String, HostError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> String;

    async fn notify(&self, bundle: &ChangelogBundle) -> Result<(), HostError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> String;

    /// Store the file at `path` under object key `key`.
    async fn put_file(&self, path: &Path, key: &str) -> Result<(), HostError>;
}
