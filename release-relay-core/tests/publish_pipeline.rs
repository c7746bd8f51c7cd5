use mockall::Sequence;
use release_relay_core::changelog::ChangelogBundle;
use release_relay_core::config::{GateConfig, RelayConfig};
use release_relay_core::contract::{
    CreatedRelease, MergeResult, MockDocsRepository, MockNotifier, MockReleaseHost,
    MockStorefront, Notifier, PullRequest, Storefront,
};
use release_relay_core::publish::{
    append_pipeline_output, merge_with_retry, notify_all, publish, AssetSource, MergeOutcome,
    PublishPlan, PublishPorts, ReleaseSettings,
};
use release_relay_core::readiness::{NotReadyReason, ReadinessRecord};
use release_relay_core::release::{
    prepare, reconcile, CandidateSource, Ports, Preparation, ReleaseOutcome,
};
use release_relay_core::version::VersionTag;
use release_relay_core::{HostError, RelayError};
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

const DOCS_LABEL: &str = "Document Updates";

fn relay_config(work: &Path) -> RelayConfig {
    serde_json::from_value(json!({
        "gate": {
            "docs_repo": "DGP-Studio/Snap.Hutao.Docs",
            "main_repo": "DGP-Studio/Snap.Hutao",
            "require_publish_issue": false
        },
        "release": {
            "repo": "DGP-Studio/Snap.Hutao",
            "cache_dir": work.join("cache"),
            "body_path": work.join("release_body.md")
        },
        "storefront": {
            "endpoint": "https://store.example.com/api/GetFiles",
            "product_id": "9PH4NXJ2JN52",
            "package": "60568DGPStudio.SnapHutao"
        }
    }))
    .expect("test config should deserialize")
}

fn gate(work: &Path) -> GateConfig {
    relay_config(work).gate
}

fn docs_pr() -> PullRequest {
    PullRequest {
        number: 42,
        title: "Update to 1.10.0".into(),
        head_ref: "release/1.10.0".into(),
        labels: vec![DOCS_LABEL.into()],
    }
}

fn record() -> ReadinessRecord {
    docs_pr().into()
}

fn merged() -> MergeResult {
    MergeResult {
        merged: true,
        sha: Some("6dcb09b5b57875f334f61aebed695e2e4193db5e".into()),
        message: "Pull Request successfully merged".into(),
    }
}

fn created() -> CreatedRelease {
    CreatedRelease {
        id: 1,
        html_url: "https://github.com/DGP-Studio/Snap.Hutao/releases/tag/1.10.0".into(),
        upload_url:
            "https://uploads.github.com/repos/DGP-Studio/Snap.Hutao/releases/1/assets{?name,label}"
                .into(),
    }
}

fn bundle() -> ChangelogBundle {
    ChangelogBundle {
        generic: "## Update Log\n\n- Fixed a bug\n".into(),
        social: "1.10.0 is released".into(),
        ann_meta: "{}".into(),
    }
}

fn timeout() -> HostError {
    HostError::Timeout("operation timed out".into())
}

fn notifier(name: &'static str, ok: bool) -> Box<dyn Notifier> {
    let mut n = MockNotifier::new();
    n.expect_name().return_const(name.to_string());
    n.expect_notify().times(1).returning(move |_| {
        if ok {
            Ok(())
        } else {
            Err(HostError::Rejected {
                status: 500,
                body: "boom".into(),
            })
        }
    });
    Box::new(n)
}

fn expect_update_logs(docs: &mut MockDocsRepository) {
    docs.expect_fetch_raw_file()
        .withf(|_, reference, path| reference == "release/1.10.0" && path.starts_with("docs/en/"))
        .times(1)
        .returning(|_, _, _| Ok("# Update Log\n##\n- Fixed a bug\n".into()));
    docs.expect_fetch_raw_file()
        .withf(|_, reference, path| reference == "release/1.10.0" && path.starts_with("docs/zh/"))
        .times(1)
        .returning(|_, _, _| Ok("# 更新日志\n##\n- 修复了一个问题\n".into()));
}

// --- Documentation merge ---

#[tokio::test]
async fn test_merge_timeout_then_empty_lookup_is_silent_success() {
    let dir = tempdir().unwrap();
    let mut docs = MockDocsRepository::new();
    docs.expect_merge_pull_request()
        .times(1)
        .returning(|_, _| Err(timeout()));
    docs.expect_list_open_pull_requests()
        .times(1)
        .returning(|_| Ok(vec![]));

    let outcome = merge_with_retry(&docs, &gate(dir.path()), &record())
        .await
        .expect("empty lookup after timeout counts as merged");
    assert_eq!(outcome, MergeOutcome::AlreadyMerged);
}

#[tokio::test]
async fn test_merge_timeout_lookup_ignores_closed_publish_issue() {
    let dir = tempdir().unwrap();
    let mut gate = gate(dir.path());
    gate.require_publish_issue = true;

    let mut docs = MockDocsRepository::new();
    docs.expect_merge_pull_request()
        .times(1)
        .returning(|_, _| Err(timeout()));
    // The publish issue may already be closed by the concurrent run.
    docs.expect_list_open_issues().times(0);
    docs.expect_list_open_pull_requests()
        .times(1)
        .returning(|_| Ok(vec![]));

    let outcome = merge_with_retry(&docs, &gate, &record())
        .await
        .expect("a closed publish issue must not fail the retry");
    assert_eq!(outcome, MergeOutcome::AlreadyMerged);
}

#[tokio::test]
async fn test_merge_timeout_then_fresh_pull_request_is_merged_once_more() {
    let dir = tempdir().unwrap();
    let mut docs = MockDocsRepository::new();
    let mut calls = 0;
    docs.expect_merge_pull_request()
        .withf(|repo, number| repo.name == "Snap.Hutao.Docs" && *number == 42)
        .times(2)
        .returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(timeout())
            } else {
                Ok(merged())
            }
        });
    docs.expect_list_open_pull_requests()
        .times(1)
        .returning(|_| Ok(vec![docs_pr()]));

    let outcome = merge_with_retry(&docs, &gate(dir.path()), &record())
        .await
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Merged(merged()));
}

#[tokio::test]
async fn test_merge_timeout_then_failed_retry_returns_original_error() {
    let dir = tempdir().unwrap();
    let mut docs = MockDocsRepository::new();
    let mut calls = 0;
    docs.expect_merge_pull_request()
        .times(2)
        .returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(timeout())
            } else {
                Err(HostError::Rejected {
                    status: 409,
                    body: "Head branch was modified".into(),
                })
            }
        });
    docs.expect_list_open_pull_requests()
        .times(1)
        .returning(|_| Ok(vec![docs_pr()]));

    let err = merge_with_retry(&docs, &gate(dir.path()), &record())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Host(HostError::Timeout(_))), "{err:?}");
}

#[tokio::test]
async fn test_merge_timeout_then_ambiguous_lookup_is_fatal() {
    let dir = tempdir().unwrap();
    let mut docs = MockDocsRepository::new();
    docs.expect_merge_pull_request()
        .times(1)
        .returning(|_, _| Err(timeout()));
    docs.expect_list_open_pull_requests().times(1).returning(|_| {
        let mut other = docs_pr();
        other.number = 43;
        Ok(vec![docs_pr(), other])
    });

    let err = merge_with_retry(&docs, &gate(dir.path()), &record())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Host(HostError::Timeout(_))));
}

#[tokio::test]
async fn test_merge_rejection_is_fatal_without_lookup() {
    let dir = tempdir().unwrap();
    let mut docs = MockDocsRepository::new();
    docs.expect_merge_pull_request().times(1).returning(|_, _| {
        Err(HostError::Rejected {
            status: 405,
            body: "Pull Request is not mergeable".into(),
        })
    });
    docs.expect_list_open_pull_requests().times(0);

    let err = merge_with_retry(&docs, &gate(dir.path()), &record())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RelayError::Host(HostError::Rejected { status: 405, .. })
    ));
}

// --- Notifications ---

#[tokio::test]
async fn test_notification_failure_is_swallowed() {
    let notifiers = vec![
        notifier("zulip:Snap Hutao/Release", false),
        notifier("social-webhook", true),
    ];
    let (notified, failed) = notify_all(&notifiers, &bundle()).await;
    assert_eq!(notified, vec!["social-webhook".to_string()]);
    assert_eq!(failed, vec!["zulip:Snap Hutao/Release".to_string()]);
}

// --- Publication ---

fn plan(work: &Path, binary: &Path) -> PublishPlan {
    PublishPlan {
        asset: Some(AssetSource::Local(binary.to_path_buf())),
        asset_name_template: "Snap.Hutao.{version}.msix".into(),
        cache_dir: work.join("cache"),
        checksum_file: Some("SHA512SUM".into()),
        release: Some(ReleaseSettings {
            repo: "DGP-Studio/Snap.Hutao".parse().unwrap(),
            target_branch: "main".into(),
            draft: false,
            prerelease: false,
            make_latest: true,
        }),
        merge_docs: true,
        body_path: work.join("release_body.md"),
        pipeline_output: Some(work.join("github_output")),
    }
}

#[tokio::test]
async fn test_publish_runs_steps_in_order() {
    let dir = tempdir().unwrap();
    let binary = dir.path().join("Snap.Hutao.1.10.0.msix");
    std::fs::write(&binary, b"abc").unwrap();

    let mut seq = Sequence::new();
    let mut host = MockReleaseHost::new();
    let mut docs = MockDocsRepository::new();
    host.expect_create_release()
        .withf(|repo, release| {
            repo.to_string() == "DGP-Studio/Snap.Hutao"
                && release.tag_name == "1.10.0"
                && release.name == "1.10.0"
                && release.target_commitish == "main"
                && release.body == "## Update Log\n\n- Fixed a bug\n"
                && release.make_latest
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(created()));
    host.expect_upload_asset()
        .withf(|release, asset| {
            release.id == 1
                && asset.name == "Snap.Hutao.1.10.0.msix"
                && asset.content_type == "application/msix"
        })
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    host.expect_upload_asset()
        .withf(|_, asset| asset.name == "SHA512SUM" && asset.content_type == "text/plain")
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    docs.expect_merge_pull_request()
        .withf(|_, number| *number == 42)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(merged()));

    let notifiers = vec![notifier("social-webhook", true)];
    let http = reqwest::Client::new();
    let ports = PublishPorts {
        host: &host,
        docs: &docs,
        notifiers: &notifiers,
        http: &http,
    };
    let candidate = VersionTag::parse("1.10.0").unwrap();

    let report = publish(
        &plan(dir.path(), &binary),
        &gate(dir.path()),
        &candidate,
        &record(),
        &bundle(),
        &ports,
    )
    .await
    .expect("publication should succeed");

    assert_eq!(report.uploaded, vec!["Snap.Hutao.1.10.0.msix", "SHA512SUM"]);
    assert_eq!(report.merge, MergeOutcome::Merged(merged()));
    assert_eq!(report.notified, vec!["social-webhook"]);
    assert!(report.failed_notifications.is_empty());

    let checksum = std::fs::read_to_string(dir.path().join("cache/SHA512SUM")).unwrap();
    assert!(checksum.ends_with(" Snap.Hutao.1.10.0.msix"));
    let body = std::fs::read_to_string(dir.path().join("release_body.md")).unwrap();
    assert_eq!(body, "## Update Log\n\n- Fixed a bug\n");
    let output = std::fs::read_to_string(dir.path().join("github_output")).unwrap();
    assert!(output.starts_with("release_body<<ghadelimiter_"));
}

#[tokio::test]
async fn test_release_rejection_stops_before_merge() {
    let dir = tempdir().unwrap();
    let binary = dir.path().join("Snap.Hutao.1.10.0.msix");
    std::fs::write(&binary, b"abc").unwrap();

    let mut host = MockReleaseHost::new();
    host.expect_create_release().times(1).returning(|_, _| {
        Err(HostError::Rejected {
            status: 422,
            body: r#"{"message":"Validation Failed","errors":[{"code":"already_exists"}]}"#.into(),
        })
    });
    host.expect_upload_asset().times(0);
    let mut docs = MockDocsRepository::new();
    docs.expect_merge_pull_request().times(0);

    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = PublishPorts {
        host: &host,
        docs: &docs,
        notifiers: &notifiers,
        http: &http,
    };
    let candidate = VersionTag::parse("1.10.0").unwrap();

    let err = publish(
        &plan(dir.path(), &binary),
        &gate(dir.path()),
        &candidate,
        &record(),
        &bundle(),
        &ports,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        RelayError::Host(HostError::Rejected { status: 422, .. })
    ));
    assert!(!dir.path().join("release_body.md").exists());
}

#[tokio::test]
async fn test_pipeline_output_uses_unique_delimiter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("github_output");
    std::fs::write(&path, "existing=1\n").unwrap();

    append_pipeline_output(&path, "release_body", "line one\nline two")
        .await
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "existing=1");
    let delimiter = lines[1]
        .strip_prefix("release_body<<")
        .expect("heredoc header");
    assert!(delimiter.starts_with("ghadelimiter_"));
    assert_eq!(&lines[2..4], &["line one", "line two"]);
    assert_eq!(lines[4], delimiter);
    assert!(content.ends_with('\n'));
}

// --- Reconciliation ---

#[tokio::test]
async fn test_reconcile_end_to_end() {
    let dir = tempdir().unwrap();
    let binary = dir.path().join("package.msix");
    std::fs::write(&binary, b"abc").unwrap();
    let config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .times(1)
        .returning(|_| Ok("1.9.0".into()));
    host.expect_create_release()
        .withf(|_, release| {
            release.body.starts_with("## 更新日志\n\n- 修复了一个问题\n\n## Update Log\n\n- Fixed a bug\n")
                && release.body.contains("[1.9.0...1.10.0]")
        })
        .times(1)
        .returning(|_, _| Ok(created()));
    host.expect_upload_asset().times(2).returning(|_, _| Ok(()));

    let mut docs = MockDocsRepository::new();
    docs.expect_list_open_pull_requests()
        .times(1)
        .returning(|_| Ok(vec![docs_pr()]));
    expect_update_logs(&mut docs);
    docs.expect_merge_pull_request()
        .times(1)
        .returning(|_, _| Ok(merged()));

    let notifiers = vec![notifier("zulip:Snap Hutao/Release", true)];
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: None,
        notifiers: &notifiers,
        http: &http,
    };

    let outcome = reconcile(
        &config,
        &CandidateSource::Explicit("1.10.0".into()),
        plan(dir.path(), &binary),
        &ports,
    )
    .await
    .expect("reconcile should publish");

    match outcome {
        ReleaseOutcome::Published { prepared, report } => {
            assert_eq!(prepared.resolution.candidate().as_str(), "1.10.0");
            assert_eq!(prepared.record.head_ref, "release/1.10.0");
            assert!(prepared.bundle.social.starts_with("1.10.0 版本已发布/ Version 1.10.0 is released"));
            assert_eq!(report.uploaded.len(), 2);
            assert_eq!(report.notified, vec!["zulip:Snap Hutao/Release"]);
        }
        other => panic!("expected Published, got {other:?}"),
    }

    let sidecar = std::fs::read_to_string(dir.path().join("cache").join("SHA512SUM")).unwrap();
    assert!(sidecar.ends_with(" Snap.Hutao.1.10.0.msix"), "{sidecar}");
    assert!(!sidecar.contains("package.msix"));
}

#[tokio::test]
async fn test_reconcile_up_to_date_has_no_side_effects() {
    let dir = tempdir().unwrap();
    let binary = dir.path().join("package.msix");
    let config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .times(1)
        .returning(|_| Ok("1.10.0".into()));
    host.expect_create_release().times(0);
    host.expect_upload_asset().times(0);
    // Any docs call would panic on the bare mock.
    let docs = MockDocsRepository::new();

    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: None,
        notifiers: &notifiers,
        http: &http,
    };

    let outcome = reconcile(
        &config,
        &CandidateSource::Explicit("1.10.0".into()),
        plan(dir.path(), &binary),
        &ports,
    )
    .await
    .unwrap();

    assert!(matches!(outcome, ReleaseOutcome::UpToDate(ref r) if !r.is_newer()));
    assert!(!dir.path().join("release_body.md").exists());
    assert!(!dir.path().join("cache").exists());
}

#[tokio::test]
async fn test_prepare_without_docs_pull_request() {
    let dir = tempdir().unwrap();
    let mut config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .returning(|_| Ok("1.9.0".into()));
    let mut docs = MockDocsRepository::new();
    docs.expect_list_open_pull_requests().returning(|_| Ok(vec![]));
    docs.expect_fetch_raw_file().times(0);

    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: None,
        notifiers: &notifiers,
        http: &http,
    };
    let candidate = CandidateSource::Explicit("1.10.0".into());

    let preparation = prepare(&config, &candidate, &ports).await.unwrap();
    assert!(matches!(
        preparation,
        Preparation::NotReady(NotReadyReason::NoPullRequest)
    ));

    config.gate.fail_when_not_ready = true;
    let err = prepare(&config, &candidate, &ports).await.unwrap_err();
    assert!(matches!(
        err,
        RelayError::Precondition(NotReadyReason::NoPullRequest)
    ));
}

#[tokio::test]
async fn test_prepare_rejects_mismatched_title() {
    let dir = tempdir().unwrap();
    let config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .returning(|_| Ok("1.9.0".into()));
    let mut docs = MockDocsRepository::new();
    docs.expect_list_open_pull_requests()
        .returning(|_| Ok(vec![docs_pr()]));
    docs.expect_fetch_raw_file().times(0);

    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: None,
        notifiers: &notifiers,
        http: &http,
    };

    let err = prepare(&config, &CandidateSource::Explicit("1.11.0".into()), &ports)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::TitleMismatch { .. }));
}

#[tokio::test]
async fn test_prepare_discovers_candidate_from_storefront() {
    let dir = tempdir().unwrap();
    let config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .returning(|_| Ok("1.9.0".into()));
    let mut docs = MockDocsRepository::new();
    docs.expect_list_open_pull_requests()
        .returning(|_| Ok(vec![docs_pr()]));
    expect_update_logs(&mut docs);
    let mut store = MockStorefront::new();
    store.expect_fetch_listing().times(1).returning(|| {
        Ok(r#"<tr><td><a href="http://dl.example.com/files/bbb?P1=1&amp;P2=2" rel="noreferrer">60568DGPStudio.SnapHutao_1.10.0.0_x64__wbnnev551gwxy.msix</a></td></tr>"#.into())
    });

    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: Some(&store as &dyn Storefront),
        notifiers: &notifiers,
        http: &http,
    };

    match prepare(&config, &CandidateSource::Storefront, &ports).await.unwrap() {
        Preparation::Ready(prepared) => {
            assert_eq!(prepared.resolution.candidate().as_str(), "1.10.0");
            let listing = prepared.listing.expect("listing kept for the asset download");
            assert_eq!(listing.download_url, "http://dl.example.com/files/bbb?P1=1&P2=2");
        }
        other => panic!("expected Ready, got {other:?}"),
    }
}

#[tokio::test]
async fn test_storefront_candidate_requires_storefront() {
    let dir = tempdir().unwrap();
    let config = relay_config(dir.path());

    let mut host = MockReleaseHost::new();
    host.expect_latest_release_tag()
        .returning(|_| Ok("1.9.0".into()));
    let docs = MockDocsRepository::new();
    let notifiers: Vec<Box<dyn Notifier>> = Vec::new();
    let http = reqwest::Client::new();
    let ports = Ports {
        host: &host,
        docs: &docs,
        storefront: None,
        notifiers: &notifiers,
        http: &http,
    };

    let err = prepare(&config, &CandidateSource::Storefront, &ports)
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Config(_)));
}
