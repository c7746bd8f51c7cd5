//! Publication coordinator: the side-effecting half of a release run.
//!
//! Runs, in order:
//!   1. asset acquisition (download from the signing service, or a local file)
//!   2. SHA-512 checksum sidecar
//!   3. release creation on the host, then upload of the asset and its checksum
//!   4. merge of the documentation pull request (one lookup-and-retry on timeout)
//!   5. best-effort notifications
//!   6. release body written to disk and, on CI, to the step output file
//!
//! [`publish`] takes an already composed [`ChangelogBundle`], so the documentation merge can never
//! happen before the release notes exist.
//!
//! # Error Handling
//! Steps 1-4 and 6 abort the run on failure. There is no rollback: a release created before a
//! failed asset upload stays on the host and has to be fixed by hand. Notification failures are
//! logged and counted in the report, nothing more.

use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::assets::{self, AssetSet};
use crate::changelog::ChangelogBundle;
use crate::config::{GateConfig, RepoRef};
use crate::contract::{
    AssetUpload, CreatedRelease, DocsRepository, MergeResult, NewRelease, Notifier, ReleaseHost,
};
use crate::error::Result;
use crate::readiness::{self, NotReadyReason, Readiness, ReadinessRecord};
use crate::version::VersionTag;

/// Where the package binary comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Fetch from the signing/distribution service, optionally with a bearer token.
    Download { url: String, bearer: Option<String> },
    /// Use a file that is already on disk.
    Local(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSettings {
    pub repo: RepoRef,
    pub target_branch: String,
    pub draft: bool,
    pub prerelease: bool,
    pub make_latest: bool,
}

/// Which publication steps run, and where their artifacts go.
#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub asset: Option<AssetSource>,
    /// Asset file name with a `{version}` placeholder.
    pub asset_name_template: String,
    pub cache_dir: PathBuf,
    /// File name of the checksum sidecar inside `cache_dir`; `None` skips the checksum.
    pub checksum_file: Option<String>,
    /// `None` skips release creation (the release is created elsewhere, e.g. by CI).
    pub release: Option<ReleaseSettings>,
    pub merge_docs: bool,
    pub body_path: PathBuf,
    /// GitHub Actions step output file (`GITHUB_OUTPUT`).
    pub pipeline_output: Option<PathBuf>,
}

/// External collaborators used while publishing.
pub struct PublishPorts<'a> {
    pub host: &'a dyn ReleaseHost,
    pub docs: &'a dyn DocsRepository,
    pub notifiers: &'a [Box<dyn Notifier>],
    pub http: &'a reqwest::Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(MergeResult),
    /// The pull request disappeared after a timed-out merge; assumed merged by a concurrent run.
    AlreadyMerged,
    Skipped,
}

#[derive(Debug)]
pub struct PublishReport {
    pub assets: Option<AssetSet>,
    pub release: Option<CreatedRelease>,
    pub uploaded: Vec<String>,
    pub merge: MergeOutcome,
    pub notified: Vec<String>,
    pub failed_notifications: Vec<String>,
    pub body_path: PathBuf,
}

pub async fn publish(
    plan: &PublishPlan,
    gate: &GateConfig,
    candidate: &VersionTag,
    record: &ReadinessRecord,
    bundle: &ChangelogBundle,
    ports: &PublishPorts<'_>,
) -> Result<PublishReport> {
    info!(version = %candidate, pr = record.number, "[PUBLISH] Starting publication");

    // --- Step 1-2: Assets ---
    let assets = match &plan.asset {
        Some(source) => {
            let name = assets::asset_name(&plan.asset_name_template, candidate.as_str());
            Some(prepare_assets(plan, source, name, ports.http).await?)
        }
        None => None,
    };

    // --- Step 3: Release ---
    let mut uploaded = Vec::new();
    let release = match &plan.release {
        Some(settings) => {
            let created = create_release(settings, candidate, bundle, ports.host).await?;
            if let Some(set) = &assets {
                uploaded = upload_assets(&created, set, ports.host).await?;
            }
            Some(created)
        }
        None => {
            info!("[PUBLISH] Release creation disabled, skipping");
            None
        }
    };

    // --- Step 4: Documentation merge ---
    let merge = if plan.merge_docs {
        merge_with_retry(ports.docs, gate, record).await?
    } else {
        MergeOutcome::Skipped
    };

    // --- Step 5: Notifications ---
    let (notified, failed_notifications) = notify_all(ports.notifiers, bundle).await;

    // --- Step 6: Persist release body ---
    write_release_body(&plan.body_path, &bundle.generic).await?;
    if let Some(output) = &plan.pipeline_output {
        append_pipeline_output(output, "release_body", &bundle.generic).await?;
    }

    info!(
        version = %candidate,
        uploaded = uploaded.len(),
        merge = ?merge,
        notified = notified.len(),
        failed_notifications = failed_notifications.len(),
        "[PUBLISH] Publication complete"
    );
    Ok(PublishReport {
        assets,
        release,
        uploaded,
        merge,
        notified,
        failed_notifications,
        body_path: plan.body_path.clone(),
    })
}

async fn prepare_assets(
    plan: &PublishPlan,
    source: &AssetSource,
    name: String,
    http: &reqwest::Client,
) -> Result<AssetSet> {
    let binary = match source {
        AssetSource::Download { url, bearer } => {
            let dest = plan.cache_dir.join(&name);
            assets::download_asset(http, url, bearer.as_deref(), &dest).await?;
            dest
        }
        AssetSource::Local(path) => path.clone(),
    };

    let checksum = match &plan.checksum_file {
        Some(file_name) => {
            fs::create_dir_all(&plan.cache_dir).await?;
            let dest = plan.cache_dir.join(file_name);
            let line = assets::write_checksum_file(&binary, &name, &dest).await?;
            info!(dest = %dest.display(), checksum = %line, "[PUBLISH] Checksum sidecar written");
            Some(dest)
        }
        None => None,
    };

    Ok(AssetSet {
        name,
        binary,
        checksum,
    })
}

async fn create_release(
    settings: &ReleaseSettings,
    candidate: &VersionTag,
    bundle: &ChangelogBundle,
    host: &dyn ReleaseHost,
) -> Result<CreatedRelease> {
    let request = NewRelease {
        tag_name: candidate.to_string(),
        target_commitish: settings.target_branch.clone(),
        name: candidate.to_string(),
        body: bundle.generic.clone(),
        draft: settings.draft,
        prerelease: settings.prerelease,
        make_latest: settings.make_latest,
    };
    info!(
        repo = %settings.repo,
        tag = %request.tag_name,
        draft = request.draft,
        prerelease = request.prerelease,
        "[PUBLISH] Creating release"
    );
    match host.create_release(&settings.repo, &request).await {
        Ok(created) => {
            info!(id = created.id, url = %created.html_url, "[PUBLISH] Release created");
            Ok(created)
        }
        Err(e) => {
            error!(repo = %settings.repo, error = %e, "[PUBLISH][ERROR] Release creation failed");
            Err(e.into())
        }
    }
}

async fn upload_assets(
    release: &CreatedRelease,
    set: &AssetSet,
    host: &dyn ReleaseHost,
) -> Result<Vec<String>> {
    let mut uploads = vec![AssetUpload {
        path: set.binary.clone(),
        name: set.name.clone(),
        content_type: assets::content_type_for(&set.name).to_string(),
    }];
    if let Some(checksum) = &set.checksum {
        let name = checksum
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "SHA512SUM".to_string());
        uploads.push(AssetUpload {
            path: checksum.clone(),
            name,
            content_type: "text/plain".to_string(),
        });
    }

    let mut uploaded = Vec::new();
    for upload in &uploads {
        if let Err(e) = host.upload_asset(release, upload).await {
            error!(
                release = release.id,
                asset = %upload.name,
                error = %e,
                "[PUBLISH][ERROR] Asset upload failed; release exists without all assets, fix manually"
            );
            return Err(e.into());
        }
        info!(release = release.id, asset = %upload.name, "[PUBLISH] Asset uploaded");
        uploaded.push(upload.name.clone());
    }
    Ok(uploaded)
}

/// Merge the documentation pull request.
///
/// A read timeout triggers one fresh lookup of the labelled pull requests. The publish issue is
/// not consulted again. An empty lookup is taken to mean that a concurrent run already merged the
/// pull request and is reported as success. This is an assumption, not something the host
/// confirms. A fresh match is merged once more; any other outcome returns the original timeout.
pub async fn merge_with_retry(
    docs: &dyn DocsRepository,
    gate: &GateConfig,
    record: &ReadinessRecord,
) -> Result<MergeOutcome> {
    info!(repo = %gate.docs_repo, pr = record.number, "[PUBLISH] Merging documentation pull request");
    let original = match docs.merge_pull_request(&gate.docs_repo, record.number).await {
        Ok(result) => {
            info!(pr = record.number, merged = result.merged, message = %result.message, "[PUBLISH] Merge response");
            return Ok(MergeOutcome::Merged(result));
        }
        Err(e) if e.is_timeout() => e,
        Err(e) => {
            error!(pr = record.number, error = %e, "[PUBLISH][ERROR] Merge failed");
            return Err(e.into());
        }
    };

    warn!(pr = record.number, error = %original, "[PUBLISH] Merge timed out, re-checking open pull requests");
    let lookup = docs
        .list_open_pull_requests(&gate.docs_repo)
        .await
        .map(|prs| readiness::select_pull_request(prs, &gate.docs_label));
    match lookup {
        Ok(Readiness::NotReady(NotReadyReason::NoPullRequest)) => {
            info!(pr = record.number, "[PUBLISH] Pull request no longer open, assuming already merged");
            Ok(MergeOutcome::AlreadyMerged)
        }
        Ok(Readiness::Ready(fresh)) => {
            match docs.merge_pull_request(&gate.docs_repo, fresh.number).await {
                Ok(result) => {
                    info!(pr = fresh.number, merged = result.merged, "[PUBLISH] Merge retry succeeded");
                    Ok(MergeOutcome::Merged(result))
                }
                Err(retry) => {
                    error!(pr = fresh.number, error = %retry, "[PUBLISH][ERROR] Merge retry failed");
                    Err(original.into())
                }
            }
        }
        Ok(Readiness::NotReady(reason)) => {
            error!(%reason, "[PUBLISH][ERROR] Re-check after merge timeout failed");
            Err(original.into())
        }
        Err(e) => {
            error!(error = %e, "[PUBLISH][ERROR] Re-check after merge timeout failed");
            Err(original.into())
        }
    }
}

/// Send the announcement to every notifier. Failures are logged and returned by name.
pub async fn notify_all(
    notifiers: &[Box<dyn Notifier>],
    bundle: &ChangelogBundle,
) -> (Vec<String>, Vec<String>) {
    let mut notified = Vec::new();
    let mut failed = Vec::new();
    for notifier in notifiers {
        let name = notifier.name();
        match notifier.notify(bundle).await {
            Ok(()) => {
                info!(channel = %name, "[PUBLISH] Notification sent");
                notified.push(name);
            }
            Err(e) => {
                warn!(channel = %name, error = %e, "[PUBLISH] Notification failed, continuing");
                failed.push(name);
            }
        }
    }
    (notified, failed)
}

pub async fn write_release_body(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(path, body.as_bytes()).await?;
    info!(path = %path.display(), bytes = body.len(), "[PUBLISH] Release body written");
    Ok(())
}

/// Append a multi-line `key` to a GitHub Actions output file.
pub async fn append_pipeline_output(path: &Path, key: &str, value: &str) -> Result<()> {
    let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
    let mut entry = format!("{key}<<{delimiter}\n{value}");
    if !value.ends_with('\n') {
        entry.push('\n');
    }
    entry.push_str(&delimiter);
    entry.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(entry.as_bytes()).await?;
    file.flush().await?;
    info!(path = %path.display(), key, "[PUBLISH] Pipeline output appended");
    Ok(())
}

