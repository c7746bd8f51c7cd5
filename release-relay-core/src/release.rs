//! Release-state reconciliation: the top-level pipeline.
//!
//! Version resolution → readiness gate → title check → update log fetch → changelog composition
//! → publication. The first three decide whether anything happens at all; an up-to-date version or
//! a docs repository with no pending pull request ends the run without side effects.

use tracing::{info, warn};

use crate::assets::asset_name;
use crate::changelog::{self, ChangelogBundle, ChangelogSettings, ComposeInput};
use crate::config::RelayConfig;
use crate::contract::{DocsRepository, Notifier, ReleaseHost, Storefront};
use crate::error::{RelayError, Result};
use crate::publish::{self, AssetSource, PublishPlan, PublishPorts, PublishReport};
use crate::readiness::{self, NotReadyReason, Readiness, ReadinessRecord};
use crate::version::{self, Resolution, StoreListing, StorePattern};

/// Where the candidate version comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSource {
    Explicit(String),
    Storefront,
}

/// All external collaborators of a run.
pub struct Ports<'a> {
    pub host: &'a dyn ReleaseHost,
    pub docs: &'a dyn DocsRepository,
    pub storefront: Option<&'a dyn Storefront>,
    pub notifiers: &'a [Box<dyn Notifier>],
    pub http: &'a reqwest::Client,
}

/// Everything decided before the first side effect.
#[derive(Debug, Clone)]
pub struct PreparedRelease {
    pub resolution: Resolution,
    pub record: ReadinessRecord,
    pub bundle: ChangelogBundle,
    pub listing: Option<StoreListing>,
}

#[derive(Debug, Clone)]
pub enum Preparation {
    UpToDate(Resolution),
    NotReady(NotReadyReason),
    Ready(PreparedRelease),
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    UpToDate(Resolution),
    NotReady(NotReadyReason),
    Published {
        prepared: PreparedRelease,
        report: PublishReport,
    },
}

/// Find the candidate version on the storefront listing page.
pub async fn discover_candidate(
    config: &RelayConfig,
    storefront: Option<&dyn Storefront>,
) -> Result<StoreListing> {
    let (store_config, storefront) = match (&config.storefront, storefront) {
        (Some(c), Some(s)) => (c, s),
        _ => {
            return Err(RelayError::config(
                "no candidate version given and no storefront configured",
            ))
        }
    };
    let pattern = StorePattern::new(&store_config.package, &store_config.arch)?;
    let html = storefront.fetch_listing().await?;
    version::parse_store_listing(&html, &pattern)
}

/// Resolve, gate and compose. No side effects beyond read-only queries.
pub async fn prepare(
    config: &RelayConfig,
    candidate: &CandidateSource,
    ports: &Ports<'_>,
) -> Result<Preparation> {
    // --- Step 1: Version ---
    let published = ports.host.latest_release_tag(&config.release.repo).await?;
    let (candidate, listing) = match candidate {
        CandidateSource::Explicit(v) => (v.clone(), None),
        CandidateSource::Storefront => {
            let listing = discover_candidate(config, ports.storefront).await?;
            (listing.version.to_string(), Some(listing))
        }
    };
    let resolution = version::resolve(&published, &candidate)?;
    if !resolution.is_newer() {
        info!(published = %resolution.published(), candidate = %resolution.candidate(), "[RELEASE] Nothing newer to publish");
        return Ok(Preparation::UpToDate(resolution));
    }
    let candidate = resolution.candidate().clone();

    // --- Step 2: Readiness gate ---
    let record = match readiness::evaluate(ports.docs, &config.gate).await? {
        Readiness::Ready(record) => record,
        Readiness::NotReady(reason) if reason.is_ambiguous() || config.gate.fail_when_not_ready => {
            return Err(RelayError::Precondition(reason));
        }
        Readiness::NotReady(reason) => {
            warn!(%reason, "[RELEASE] Documentation not ready yet, nothing to do");
            return Ok(Preparation::NotReady(reason));
        }
    };
    readiness::check_title(&record, candidate.as_str(), &config.gate.title_check)?;

    // --- Step 3: Changelog ---
    let (en_log, zh_log) = changelog::fetch_update_logs(
        ports.docs,
        &config.gate.docs_repo,
        &record.head_ref,
        &config.changelog,
    )
    .await?;
    let settings = ChangelogSettings {
        repo_page: config.release.repo_page(),
        asset_name: asset_name(&config.release.asset_name_template, candidate.as_str()),
        faq_footer: config.changelog.faq_footer.clone(),
        mirror_links: config.changelog.mirror_links.clone(),
    };
    let bundle = changelog::compose(
        &ComposeInput {
            en_log: &en_log,
            zh_log: &zh_log,
            candidate: candidate.as_str(),
            published: resolution.published().as_str(),
        },
        &settings,
    )?;
    info!(version = %candidate, pr = record.number, "[RELEASE] Release prepared");

    Ok(Preparation::Ready(PreparedRelease {
        resolution,
        record,
        bundle,
        listing,
    }))
}

/// Full run: prepare, then publish according to `plan`.
///
/// When the plan names no asset source and the candidate came from the storefront, the listing's
/// download link is used as the asset source.
pub async fn reconcile(
    config: &RelayConfig,
    candidate: &CandidateSource,
    plan: PublishPlan,
    ports: &Ports<'_>,
) -> Result<ReleaseOutcome> {
    info!(candidate = ?candidate, "[RELEASE] Starting release reconciliation");
    let prepared = match prepare(config, candidate, ports).await? {
        Preparation::UpToDate(resolution) => return Ok(ReleaseOutcome::UpToDate(resolution)),
        Preparation::NotReady(reason) => return Ok(ReleaseOutcome::NotReady(reason)),
        Preparation::Ready(prepared) => prepared,
    };

    let mut plan = plan;
    if plan.asset.is_none() {
        if let Some(listing) = &prepared.listing {
            plan.asset = Some(AssetSource::Download {
                url: listing.download_url.clone(),
                bearer: None,
            });
        }
    }

    let publish_ports = PublishPorts {
        host: ports.host,
        docs: ports.docs,
        notifiers: ports.notifiers,
        http: ports.http,
    };
    let report = publish::publish(
        &plan,
        &config.gate,
        prepared.resolution.candidate(),
        &prepared.record,
        &prepared.bundle,
        &publish_ports,
    )
    .await?;
    Ok(ReleaseOutcome::Published { prepared, report })
}
