///
/// This module implements the CLI interface for release-relay: command parsing, wiring of the
/// concrete clients into the core pipeline, and user-visible output.
///
/// All pipeline logic (version resolution, readiness gate, changelog, publication) lives in the
/// [`release-relay-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `release`: full run; resolve, gate, compose, publish.
/// - `check`: dry run; resolve, gate, compose and print the three artifacts.
/// - `merge-docs`: gate and merge the documentation pull request only.
/// - `upload`: mirror a file to the configured object stores.
///
/// [`release-relay-core`]: ../../release-relay-core/
use crate::github::GitHubClient;
use crate::load_config::{load_config, CliConfig, EnvSettings};
use crate::notify::{WebhookNotifier, ZulipNotifier};
use crate::s3::S3Store;
use crate::store::StoreClient;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use release_relay_core::contract::{Notifier, ObjectStore, Storefront};
use release_relay_core::publish::{self, AssetSource, MergeOutcome, PublishPlan, ReleaseSettings};
use release_relay_core::readiness::{self, Readiness};
use release_relay_core::release::{self, CandidateSource, Ports, Preparation, ReleaseOutcome};
use release_relay_core::upload::upload_to_stores;
use release_relay_core::RelayError;
use std::path::PathBuf;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI for release-relay: publish a release once its documentation is ready.
#[derive(Parser)]
#[clap(
    name = "release-relay",
    version,
    about = "Publish a release, its assets and announcements once the documentation pull request is ready"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the candidate version, check documentation readiness and publish
    Release {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Candidate version (overrides VERSION; the storefront is queried when neither is set)
        #[clap(long)]
        tag: Option<String>,
    },
    /// Dry run: print the release notes, announcement and metadata without publishing
    Check {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Candidate version (overrides VERSION)
        #[clap(long)]
        tag: Option<String>,
    },
    /// Merge the pending documentation pull request
    MergeDocs {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Upload a file to every configured object store
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// File to upload; stored under its file name
        file: PathBuf,
    },
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("release-relay/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))
}

fn candidate_source(tag: Option<String>, env: &EnvSettings) -> CandidateSource {
    match tag.or_else(|| env.version.clone()) {
        Some(v) => CandidateSource::Explicit(v),
        None => CandidateSource::Storefront,
    }
}

fn notifiers(env: &EnvSettings, http: &reqwest::Client) -> Vec<Box<dyn Notifier>> {
    let mut out: Vec<Box<dyn Notifier>> = Vec::new();
    if let Some(zulip) = &env.zulip {
        out.push(Box::new(ZulipNotifier::new(http.clone(), zulip.clone())));
    }
    if let Some(url) = &env.social_webhook {
        out.push(Box::new(WebhookNotifier::new(http.clone(), url.clone())));
    }
    out
}

/// Build the publication plan from config and environment. Checks required tokens up front.
pub fn publish_plan(cfg: &CliConfig) -> Result<PublishPlan> {
    let release = &cfg.relay.release;
    if release.create_release {
        cfg.env.require_release_token()?;
    }
    if release.merge_docs {
        cfg.env.require_repo_token()?;
    }
    let asset = match &cfg.env.download_url {
        Some(url) => Some(AssetSource::Download {
            url: url.clone(),
            bearer: Some(cfg.env.require_signing_token()?.to_string()),
        }),
        None => None,
    };
    Ok(PublishPlan {
        asset,
        asset_name_template: release.asset_name_template.clone(),
        cache_dir: release.cache_dir.clone(),
        checksum_file: release.checksum.then(|| release.checksum_file.clone()),
        release: release.create_release.then(|| ReleaseSettings {
            repo: release.repo.clone(),
            target_branch: release.target_branch.clone(),
            draft: release.draft,
            prerelease: release.prerelease,
            make_latest: release.make_latest,
        }),
        merge_docs: release.merge_docs,
        body_path: release.body_path.clone(),
        pipeline_output: cfg.env.pipeline_output.clone(),
    })
}

async fn release_command(cfg: CliConfig, tag: Option<String>, dry_run: bool) -> Result<()> {
    cfg.relay.trace_loaded();
    let http = http_client()?;
    let host = GitHubClient::new(http.clone(), cfg.env.release_token.clone(), HTTP_TIMEOUT);
    let docs = GitHubClient::new(http.clone(), cfg.env.repo_token.clone(), HTTP_TIMEOUT);
    let store = cfg
        .relay
        .storefront
        .clone()
        .map(|c| StoreClient::new(http.clone(), c, HTTP_TIMEOUT));
    let notifiers = if dry_run { Vec::new() } else { notifiers(&cfg.env, &http) };
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: store.as_ref().map(|s| s as &dyn Storefront),
        notifiers: &notifiers,
        http: &http,
    };
    let candidate = candidate_source(tag, &cfg.env);

    if dry_run {
        return match release::prepare(&cfg.relay, &candidate, &ports).await? {
            Preparation::UpToDate(resolution) => {
                println!(
                    "Up to date: published {} >= candidate {}",
                    resolution.published(),
                    resolution.candidate()
                );
                Ok(())
            }
            Preparation::NotReady(reason) => {
                println!("Documentation not ready: {reason}");
                Ok(())
            }
            Preparation::Ready(prepared) => {
                println!("=== generic ===\n{}", prepared.bundle.generic);
                println!("=== social ===\n{}", prepared.bundle.social);
                println!("=== ann_meta ===\n{}", prepared.bundle.ann_meta);
                Ok(())
            }
        };
    }

    let plan = publish_plan(&cfg)?;
    match release::reconcile(&cfg.relay, &candidate, plan, &ports).await? {
        ReleaseOutcome::UpToDate(resolution) => {
            println!(
                "Up to date: published {} >= candidate {}",
                resolution.published(),
                resolution.candidate()
            );
        }
        ReleaseOutcome::NotReady(reason) => {
            println!("Documentation not ready: {reason}");
        }
        ReleaseOutcome::Published { prepared, report } => {
            println!("Release {} complete.\nReport:", prepared.resolution.candidate());
            println!("{:#?}", report);
        }
    }
    Ok(())
}

async fn merge_docs_command(cfg: CliConfig) -> Result<()> {
    cfg.env.require_repo_token()?;
    let http = http_client()?;
    let docs = GitHubClient::new(http, cfg.env.repo_token.clone(), HTTP_TIMEOUT);
    let gate = &cfg.relay.gate;

    let record = match readiness::evaluate(&docs, gate).await? {
        Readiness::Ready(record) => record,
        Readiness::NotReady(reason) if reason.is_ambiguous() || gate.fail_when_not_ready => {
            return Err(RelayError::Precondition(reason).into());
        }
        Readiness::NotReady(reason) => {
            println!("Documentation not ready: {reason}");
            return Ok(());
        }
    };
    match publish::merge_with_retry(&docs, gate, &record).await? {
        MergeOutcome::Merged(result) => println!("Merged #{}: {}", record.number, result.message),
        MergeOutcome::AlreadyMerged => println!("PR already merged."),
        MergeOutcome::Skipped => {}
    }
    Ok(())
}

async fn upload_command(cfg: CliConfig, file: PathBuf) -> Result<()> {
    if cfg.relay.object_stores.is_empty() {
        return Err(anyhow!("Configuration error: no object_stores configured"));
    }
    let mut stores: Vec<Box<dyn ObjectStore>> = Vec::new();
    for store in &cfg.relay.object_stores {
        let creds = cfg.env.store_credentials(&store.env_prefix)?;
        stores.push(Box::new(S3Store::new(store, creds)?));
    }
    let done = upload_to_stores(&stores, &file).await?;
    println!("Uploaded {} to {}", file.display(), done.join(", "));
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let result = match cli.command {
        Commands::Release { config, tag } => {
            tracing::info!(command = "release", "Starting release reconciliation");
            let cfg = load_config(config)?;
            release_command(cfg, tag, false).await
        }
        Commands::Check { config, tag } => {
            tracing::info!(command = "check", "Starting dry run");
            let cfg = load_config(config)?;
            release_command(cfg, tag, true).await
        }
        Commands::MergeDocs { config } => {
            tracing::info!(command = "merge-docs", "Starting documentation merge");
            let cfg = load_config(config)?;
            merge_docs_command(cfg).await
        }
        Commands::Upload { config, file } => {
            tracing::info!(command = "upload", file = %file.display(), "Starting object store upload");
            let cfg = load_config(config)?;
            upload_command(cfg, file).await
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}
