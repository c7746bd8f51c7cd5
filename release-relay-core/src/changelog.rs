//! Changelog composition: turns the two localized update logs into release notes, a social
//! announcement and announcement metadata.
//!
//! Everything here apart from [`fetch_update_logs`] is pure string work; identical inputs
//! produce byte-identical output.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::config::{ChangelogConfig, MirrorLink, RepoRef};
use crate::contract::DocsRepository;
use crate::error::{RelayError, Result};

/// The three rendered artifacts of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogBundle {
    /// Release notes body.
    pub generic: String,
    /// Announcement message; embeds `generic`.
    pub social: String,
    /// Pretty-printed JSON of [`AnnouncementMeta`].
    pub ann_meta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnouncementMeta {
    pub title: String,
    pub description: String,
    pub url: String,
}

impl AnnouncementMeta {
    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.description.trim().is_empty() {
            return Err(RelayError::changelog("announcement title and description must not be empty"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(RelayError::changelog(format!(
                "announcement url {:?} is not absolute",
                self.url
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub body: String,
}

/// Release notes as ordered sections plus an optional footer below a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseNotes {
    pub sections: Vec<Section>,
    pub footer: Option<String>,
}

impl ReleaseNotes {
    pub fn section(mut self, heading: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push(Section {
            heading: heading.into(),
            body: body.into(),
        });
        self
    }

    fn validate(&self) -> Result<()> {
        if self.sections.is_empty() {
            return Err(RelayError::changelog("release notes have no sections"));
        }
        for section in &self.sections {
            if section.heading.trim().is_empty() || section.heading.contains('\n') {
                return Err(RelayError::changelog(format!(
                    "invalid section heading {:?}",
                    section.heading
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ReleaseNotes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            write!(f, "## {}\n\n{}", section.heading, section.body.trim_matches('\n'))?;
        }
        if let Some(footer) = &self.footer {
            write!(f, "\n\n---\n{}", footer.trim_matches('\n'))?;
        }
        f.write_str("\n")
    }
}

/// Inputs that vary per release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInput<'a> {
    pub en_log: &'a str,
    pub zh_log: &'a str,
    pub candidate: &'a str,
    pub published: &'a str,
}

/// Inputs fixed per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogSettings {
    /// Public page of the release repository, e.g. `https://github.com/DGP-Studio/Snap.Hutao`.
    pub repo_page: String,
    pub asset_name: String,
    pub faq_footer: Option<String>,
    pub mirror_links: Vec<MirrorLink>,
}

/// Text of the first `##` section with badge lines removed.
pub fn extract_first_section(markdown: &str, badge_marker: &str) -> Result<String> {
    let section = markdown
        .split("##")
        .nth(1)
        .ok_or_else(|| RelayError::changelog("update log has no '##' section"))?;
    Ok(section
        .split('\n')
        .filter(|line| !line.contains(badge_marker))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Collapse every run of two or more blank lines into one empty line.
pub fn collapse_blank_lines(text: &str) -> String {
    static BLANK_RUN: OnceLock<Regex> = OnceLock::new();
    let blank_run =
        BLANK_RUN.get_or_init(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("static regex"));
    blank_run.replace_all(text, "\n\n").into_owned()
}

/// Fetch both update logs from the pull request branch and cut out their newest section.
/// Returns `(en_log, zh_log)`.
pub async fn fetch_update_logs(
    docs: &dyn DocsRepository,
    repo: &RepoRef,
    head_ref: &str,
    config: &ChangelogConfig,
) -> Result<(String, String)> {
    let en_raw = docs
        .fetch_raw_file(repo, head_ref, &config.en_log_path)
        .await?;
    let en_log = extract_first_section(&en_raw, &config.badge_marker)?;
    debug!(path = %config.en_log_path, log = %en_log, "[CHANGELOG] En update log");

    let zh_raw = docs
        .fetch_raw_file(repo, head_ref, &config.zh_log_path)
        .await?;
    let zh_log = extract_first_section(&zh_raw, &config.badge_marker)?;
    debug!(path = %config.zh_log_path, log = %zh_log, "[CHANGELOG] Zh update log");

    info!(%repo, head_ref, "[CHANGELOG] Fetched update logs");
    Ok((en_log, zh_log))
}

/// Render the changelog bundle.
pub fn compose(input: &ComposeInput<'_>, settings: &ChangelogSettings) -> Result<ChangelogBundle> {
    let v = input.candidate;
    let page = settings.repo_page.trim_end_matches('/');
    let release_page = format!("{page}/releases/tag/{v}");

    let mut notes = ReleaseNotes::default()
        .section("更新日志", input.zh_log)
        .section("Update Log", input.en_log)
        .section(
            "完整更新日志/What's Changed",
            format!(
                "Full Changelog: [{p}...{v}]({page}/compare/{p}...{v})",
                p = input.published
            ),
        );
    if !settings.mirror_links.is_empty() {
        let links = settings
            .mirror_links
            .iter()
            .map(|link| {
                let url = link
                    .url
                    .replace("{version}", v)
                    .replace("{asset}", &settings.asset_name);
                format!("- [{}]({url})", link.label)
            })
            .collect::<Vec<_>>()
            .join("\n");
        notes = notes.section("镜像下载/Mirror Downloads", links);
    }
    notes.footer = settings.faq_footer.clone();
    notes.validate()?;
    let generic = collapse_blank_lines(&notes.to_string());

    let social = format!(
        "{v} 版本已发布/ Version {v} is released\n\n\
         Release Page: {release_page}\n\
         Direct Download: {page}/releases/download/{v}/{asset}\n\n\
         {generic}",
        asset = settings.asset_name,
    );

    let meta = AnnouncementMeta {
        title: format!("{v} 版本已发布/Version {v} is Live"),
        description: format!(
            "{v} 版本已发布，请及时更新，点击查看详情可阅读完整更新日志\n\
             Version {v} is released, please update as soon as possible. \
             Click to view details to read the full changelog"
        ),
        url: release_page,
    };
    meta.validate()?;
    let ann_meta = serde_json::to_string_pretty(&meta)?;

    Ok(ChangelogBundle {
        generic,
        social,
        ann_meta,
    })
}
