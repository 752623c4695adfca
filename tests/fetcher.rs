use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use release_fetch::{
    Arch, Artifact, FetchConfig, FetchContext, FetchError, FetchEvent, FetchResult, Fetcher, Os,
    PlatformKey, Release, ReleaseCatalog, Result, Warning,
};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Catalog over a fixed list of releases; the first one is the latest
#[derive(Clone, Default)]
struct FakeCatalog {
    releases: Vec<Release>,
}

impl FakeCatalog {
    fn with(releases: Vec<Release>) -> Self {
        Self { releases }
    }
}

impl ReleaseCatalog for FakeCatalog {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<Release> {
        self.releases
            .first()
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                owner: owner.into(),
                repo: repo.into(),
                tag: None,
            })
    }

    async fn release_by_tag(&self, owner: &str, repo: &str, tag: &str) -> Result<Release> {
        self.releases
            .iter()
            .find(|release| release.tag == tag)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                owner: owner.into(),
                repo: repo.into(),
                tag: Some(tag.into()),
            })
    }
}

fn release(tag: &str, server: &MockServer, names: &[&str]) -> Release {
    Release {
        tag: tag.into(),
        display_name: tag.into(),
        artifacts: names
            .iter()
            .map(|name| Artifact::new(*name, 0, format!("{}/download/{name}", server.uri())))
            .collect(),
    }
}

async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, *name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn gz(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn config(root: &Path, server: &MockServer) -> FetchConfig {
    FetchConfig::default()
        .with_cache_dir(root.join("cache"))
        .with_host(server.uri())
        .with_buffer_size(4096)
}

fn fetcher(config: FetchConfig, catalog: FakeCatalog) -> Fetcher<FakeCatalog> {
    Fetcher::with_catalog(config, catalog)
        .unwrap()
        .with_platform(PlatformKey::new(Os::Linux, Arch::Amd64))
}

fn delivery(result: FetchResult) -> release_fetch::Delivery {
    match result {
        FetchResult::Fetched(delivery) => delivery,
        other => panic!("expected a download, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_release_falls_back_to_source_archive() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/acme/tool/archive/refs/tags/v1.0.0.tar.gz",
        tar_gz(&[("tool-1.0.0/README.md", b"hello")]),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");

    let raw = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v1.0.0", &server, &[])]),
    );
    let result = delivery(raw.download_latest_release("acme", "tool").await.unwrap());
    assert_eq!(result.path, cache.join("acme-tool-v1.0.0.tar.gz"));
    assert!(result.path.is_file());
    assert_eq!(result.tag, "v1.0.0");

    let extracting = fetcher(
        config(dir.path(), &server)
            .with_auto_extract(true)
            .with_check_latest(false),
        FakeCatalog::with(vec![release("v1.0.0", &server, &[])]),
    );
    let result = delivery(extracting.download_latest_release("acme", "tool").await.unwrap());
    assert_eq!(result.path, cache.join("acme-tool-v1.0.0"));
    assert_eq!(
        fs::read(result.path.join("tool-1.0.0/README.md")).unwrap(),
        b"hello"
    );
}

#[tokio::test]
async fn empty_release_without_source_fallback_is_an_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server).with_download_source(false),
        FakeCatalog::with(vec![release("v1.0.0", &server, &[])]),
    );

    let err = fetcher
        .download_specific_release("acme", "tool", "v1.0.0")
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NoArtifacts { .. }));
}

#[tokio::test]
async fn unmatched_artifacts_fall_back_to_first() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-windows-arm64.zip", b"first".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release(
            "v1.0.0",
            &server,
            &["tool-windows-arm64.zip", "tool-darwin-arm64.tar.gz"],
        )]),
    );

    let result = delivery(
        fetcher
            .download_specific_release("acme", "tool", "v1.0.0")
            .await
            .unwrap(),
    );

    assert_eq!(result.path, fetcher.cache_root().join("tool-windows-arm64.zip"));
    assert_eq!(fs::read(&result.path).unwrap(), b"first");
    assert_eq!(
        result.warnings,
        vec![Warning::FallbackSelection {
            artifact: "tool-windows-arm64.zip".into()
        }]
    );
}

#[tokio::test]
async fn recorded_latest_short_circuits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/tool-linux-amd64.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gz(b"binary")))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v3.1.0", &server, &["tool-linux-amd64.gz"])]),
    );

    let first = fetcher.download_latest_release("acme", "tool").await.unwrap();
    assert!(matches!(first, FetchResult::Fetched(_)));
    assert!(fetcher.cache().is_up_to_date("acme", "tool", "v3.1.0"));

    let second = fetcher.download_latest_release("acme", "tool").await.unwrap();
    assert_eq!(
        second,
        FetchResult::UpToDate {
            tag: "v3.1.0".into(),
            path: fetcher.cache_root().to_path_buf(),
        }
    );
}

#[tokio::test]
async fn specific_release_does_not_touch_version_record() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-linux-amd64.gz", gz(b"binary")).await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v3.1.0", &server, &["tool-linux-amd64.gz"])]),
    );

    fetcher
        .download_specific_release("acme", "tool", "v3.1.0")
        .await
        .unwrap();

    assert_eq!(fetcher.cache().cached_tag("acme", "tool"), None);
}

#[tokio::test]
async fn several_artifacts_land_in_release_directory() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/download/tool_linux_amd64.tar.gz",
        tar_gz(&[("tool", b"#!/bin/sh")]),
    )
    .await;
    serve(
        &server,
        "/download/tool_linux_amd64.tar.gz.sha256",
        b"abc123".to_vec(),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server).with_auto_extract(true),
        FakeCatalog::with(vec![release(
            "v2.0.0",
            &server,
            &[
                "tool_linux_amd64.tar.gz",
                "tool_darwin_amd64.tar.gz",
                "tool_linux_amd64.tar.gz.sha256",
            ],
        )]),
    );

    let result = delivery(fetcher.download_latest_release("acme", "tool").await.unwrap());

    let bundle = fetcher.cache_root().join("acme-tool-v2.0.0");
    assert_eq!(result.path, bundle);
    assert!(bundle.join("tool_linux_amd64.tar.gz").is_file());
    assert_eq!(
        fs::read(bundle.join("tool_linux_amd64.tar.gz.sha256")).unwrap(),
        b"abc123"
    );
    assert_eq!(
        fs::read(bundle.join("tool_linux_amd64/tool")).unwrap(),
        b"#!/bin/sh"
    );
    // the checksum file is not an archive
    assert!(matches!(
        result.warnings.as_slice(),
        [Warning::Extraction { .. }]
    ));
}

#[tokio::test]
async fn slashed_tag_bundle_is_a_single_directory() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool_linux_amd64.gz", gz(b"ELF")).await;
    serve(&server, "/download/tool_linux_amd64.gz.sha256", b"abc123".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("bin");
    let fetcher = fetcher(
        config(dir.path(), &server).with_target_dir(&target),
        FakeCatalog::with(vec![release(
            "release/1.0",
            &server,
            &["tool_linux_amd64.gz", "tool_linux_amd64.gz.sha256"],
        )]),
    );

    let result = delivery(
        fetcher
            .download_specific_release("acme", "tool", "release/1.0")
            .await
            .unwrap(),
    );

    let bundle = target.join("acme-tool-release-1.0");
    assert_eq!(result.path, bundle);
    assert_eq!(result.tag, "release/1.0");
    assert!(bundle.join("tool_linux_amd64.gz").is_file());
    assert!(bundle.join("tool_linux_amd64.gz.sha256").is_file());
    assert!(!target.join("acme-tool-release").exists());
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn result_is_moved_into_target_dir() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-linux-x86_64.gz", gz(b"ELF")).await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("bin");
    let fetcher = fetcher(
        config(dir.path(), &server)
            .with_auto_extract(true)
            .with_target_dir(&target),
        FakeCatalog::with(vec![release(
            "v1.2.0",
            &server,
            &["tool-linux-x86_64.gz", "tool-darwin-x86_64.gz"],
        )]),
    );

    let result = delivery(fetcher.download_latest_release("acme", "tool").await.unwrap());

    assert_eq!(result.path, target.join("tool-linux-x86_64"));
    assert_eq!(fs::read(&result.path).unwrap(), b"ELF");
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[tokio::test]
async fn broken_archive_is_returned_unextracted() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-linux-amd64.zip", b"not a zip".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server).with_auto_extract(true),
        FakeCatalog::with(vec![release("v1.0.0", &server, &["tool-linux-amd64.zip"])]),
    );

    let result = delivery(fetcher.download_latest_release("acme", "tool").await.unwrap());

    assert_eq!(result.path, fetcher.cache_root().join("tool-linux-amd64.zip"));
    assert!(matches!(
        result.warnings.as_slice(),
        [Warning::Extraction { .. }]
    ));
}

#[tokio::test]
async fn failed_sibling_download_is_a_warning() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-linux-amd64", b"ok".to_vec()).await;
    Mock::given(method("GET"))
        .and(path("/download/tool-linux-amd64.sig"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release(
            "v1.0.0",
            &server,
            &["tool-linux-amd64", "tool-linux-amd64.sig"],
        )]),
    );

    let result = delivery(fetcher.download_latest_release("acme", "tool").await.unwrap());

    assert_eq!(result.path, fetcher.cache_root().join("tool-linux-amd64"));
    match result.warnings.as_slice() {
        [Warning::PartialDownload { artifact, .. }] => {
            assert_eq!(artifact, "tool-linux-amd64.sig")
        }
        other => panic!("unexpected warnings {other:?}"),
    }
}

#[tokio::test]
async fn all_downloads_failing_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v1.0.0", &server, &["tool-linux-amd64.gz"])]),
    );

    let err = fetcher.download_latest_release("acme", "tool").await.unwrap_err();

    assert!(matches!(err, FetchError::AllDownloadsFailed { total: 1, .. }));
    assert_eq!(fetcher.cache().cached_tag("acme", "tool"), None);
}

#[tokio::test]
async fn source_download_uses_resolved_tag() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/acme/tool/archive/refs/tags/v4.0.0.tar.gz",
        tar_gz(&[("tool-4.0.0/Cargo.toml", b"[package]")]),
    )
    .await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v4.0.0", &server, &["tool.zip"])]),
    );

    let result = delivery(fetcher.download_source_code("acme", "tool", "").await.unwrap());

    assert_eq!(result.tag, "v4.0.0");
    assert_eq!(result.path, fetcher.cache_root().join("acme-tool-v4.0.0.tar.gz"));
}

#[tokio::test]
async fn latest_version_check_ignores_v_prefix() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v1.4.2", &server, &[])]),
    );

    assert!(fetcher.is_latest_version("acme", "tool", "1.4.2").await.unwrap());
    assert!(fetcher.is_latest_version("acme", "tool", "v1.4.2").await.unwrap());
    assert!(!fetcher.is_latest_version("acme", "tool", "1.4.1").await.unwrap());
}

#[tokio::test]
async fn missing_release_is_not_found() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(config(dir.path(), &server), FakeCatalog::default());

    assert!(
        fetcher
            .download_latest_release("acme", "tool")
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(
        fetcher
            .download_specific_release("acme", "tool", "v0.0.1")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn events_trace_the_fetch() {
    let server = MockServer::start().await;
    serve(&server, "/download/tool-linux-amd64", b"bin".to_vec()).await;
    let dir = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let fetcher = fetcher(
        config(dir.path(), &server),
        FakeCatalog::with(vec![release("v1.0.0", &server, &["tool-linux-amd64"])]),
    )
    .with_context(FetchContext::new().with_events(tx));

    fetcher.download_latest_release("acme", "tool").await.unwrap();
    drop(fetcher);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(
        events.first(),
        Some(&FetchEvent::ReleaseResolved {
            owner: "acme".into(),
            repo: "tool".into(),
            tag: "v1.0.0".into(),
        })
    );
    assert!(events.contains(&FetchEvent::DownloadStarted {
        artifact: "tool-linux-amd64".into()
    }));
    assert_eq!(
        events.last(),
        Some(&FetchEvent::VersionRecorded {
            tag: "v1.0.0".into()
        })
    );
}
