//! Readiness gate: is the documentation for a release prepared and uniquely identifiable?
//!
//! The gate looks for exactly one open pull request carrying the docs label in the
//! documentation repository and, when the flow asks for it, exactly one open issue carrying the
//! publish label in the main repository. Anything else is reported as [`Readiness::NotReady`];
//! the caller decides whether that means "nothing to do yet" or "stop and ask a human".

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::GateConfig;
use crate::contract::{DocsRepository, PullRequest};
use crate::error::{RelayError, Result};

/// The documentation pull request selected as authoritative for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessRecord {
    pub number: u64,
    pub title: String,
    pub head_ref: String,
    pub labels: Vec<String>,
}

impl From<PullRequest> for ReadinessRecord {
    fn from(pr: PullRequest) -> Self {
        Self {
            number: pr.number,
            title: pr.title,
            head_ref: pr.head_ref,
            labels: pr.labels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    NoPullRequest,
    AmbiguousPullRequests(usize),
    NoPublishIssue,
    AmbiguousPublishIssues(usize),
}

impl NotReadyReason {
    /// More than one candidate: an operator has to resolve it, re-running will not help.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            NotReadyReason::AmbiguousPullRequests(_) | NotReadyReason::AmbiguousPublishIssues(_)
        )
    }
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::NoPullRequest => {
                write!(f, "no open pull request with the documentation label")
            }
            NotReadyReason::AmbiguousPullRequests(n) => write!(
                f,
                "{n} open pull requests with the documentation label, expected exactly one"
            ),
            NotReadyReason::NoPublishIssue => {
                write!(f, "no open issue with the publish label in the main repository")
            }
            NotReadyReason::AmbiguousPublishIssues(n) => write!(
                f,
                "{n} open issues with the publish label in the main repository, expected exactly one"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(ReadinessRecord),
    NotReady(NotReadyReason),
}

impl Readiness {
    /// Treat any `NotReady` as a hard precondition failure.
    pub fn into_record(self) -> Result<ReadinessRecord> {
        match self {
            Readiness::Ready(record) => Ok(record),
            Readiness::NotReady(reason) => Err(RelayError::Precondition(reason)),
        }
    }
}

/// How strictly the pull request title must name the candidate version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TitleCheck {
    /// The title contains the version string anywhere.
    #[default]
    Contains,
    /// The title equals `template` with `{version}` substituted.
    Exact { template: String },
}

/// Pick the single labelled pull request out of `prs`.
pub fn select_pull_request(prs: Vec<PullRequest>, label: &str) -> Readiness {
    let mut matching: Vec<PullRequest> = prs
        .into_iter()
        .filter(|pr| pr.labels.iter().any(|l| l == label))
        .collect();
    match matching.len() {
        0 => Readiness::NotReady(NotReadyReason::NoPullRequest),
        1 => Readiness::Ready(matching.remove(0).into()),
        n => Readiness::NotReady(NotReadyReason::AmbiguousPullRequests(n)),
    }
}

/// Query the documentation and main repositories and apply the cardinality rules.
pub async fn evaluate(docs: &dyn DocsRepository, gate: &GateConfig) -> Result<Readiness> {
    if gate.require_publish_issue {
        let issues = docs
            .list_open_issues(&gate.main_repo, &gate.publish_label)
            .await?;
        let reason = match issues.len() {
            0 => Some(NotReadyReason::NoPublishIssue),
            1 => None,
            n => Some(NotReadyReason::AmbiguousPublishIssues(n)),
        };
        if let Some(reason) = reason {
            warn!(repo = %gate.main_repo, label = %gate.publish_label, %reason, "[GATE] Publish issue check failed");
            return Ok(Readiness::NotReady(reason));
        }
        info!(repo = %gate.main_repo, issue = issues[0].number, "[GATE] Found publish issue");
    }

    let prs = docs.list_open_pull_requests(&gate.docs_repo).await?;
    let total = prs.len();
    let readiness = select_pull_request(prs, &gate.docs_label);
    match &readiness {
        Readiness::Ready(record) => info!(
            repo = %gate.docs_repo,
            number = record.number,
            title = %record.title,
            head_ref = %record.head_ref,
            "[GATE] Found documentation pull request"
        ),
        Readiness::NotReady(reason) => warn!(
            repo = %gate.docs_repo,
            label = %gate.docs_label,
            open_pull_requests = total,
            %reason,
            "[GATE] Documentation pull request check failed"
        ),
    }
    Ok(readiness)
}

/// Verify the pull request title names `version` according to `check`.
pub fn check_title(record: &ReadinessRecord, version: &str, check: &TitleCheck) -> Result<()> {
    let (ok, expected) = match check {
        TitleCheck::Contains => (record.title.contains(version), version.to_string()),
        TitleCheck::Exact { template } => {
            let expected = template.replace("{version}", version);
            (record.title == expected, expected)
        }
    };
    if ok {
        Ok(())
    } else {
        warn!(title = %record.title, expected = %expected, "[GATE] Wrong version in pull request title");
        Err(RelayError::TitleMismatch {
            title: record.title.clone(),
            expected,
        })
    }
}
