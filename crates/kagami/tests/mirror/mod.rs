use std::sync::Arc;

use kagami::{
    util::path::original_path, FailureKind, FileStore, HttpClient, MemoryStore, Mirror,
    ResourceRole, Url,
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::{fast_retry, list_files, mapped, mirror_to, AssertWrapper, MirrorMock};

const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1000000
a/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2000000
b/index.m3u8
";

fn media(segments: &[&str]) -> String {
    let mut playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n".to_string();
    for segment in segments {
        playlist.push_str(&format!("#EXTINF:4.0,\n{segment}\n"));
    }
    playlist.push_str("#EXT-X-ENDLIST\n");
    playlist
}

#[tokio::test]
async fn test_failed_variant_is_isolated() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    // a/index.m3u8 is not mocked and answers 404
    server
        .mock("/live/master.m3u8", MASTER)
        .await
        .mock("/live/b/index.m3u8", media(&["seg-0.ts", "seg-1.ts"]))
        .await
        .mock_media("/live/b")
        .await;
    let dir = tempfile::tempdir()?;

    let url = format!("{}/live/master.m3u8", server.uri());
    let report = mirror_to(dir.path(), &url).await;
    assert!(!report.is_success());
    assert_eq!(report.manifests, 2);
    assert_eq!(report.resources, 2);
    assert_eq!(report.failed.len(), 1);

    let failed = &report.failed[0];
    assert_eq!(failed.kind, FailureKind::Fetch);
    assert_eq!(failed.role, ResourceRole::SubManifest);
    assert_eq!(failed.url.path(), "/live/a/index.m3u8");
    assert!(failed.reason.contains("404"), "{}", failed.reason);

    let rewritten = std::fs::read_to_string(dir.path().join(mapped(&url)))?;
    assert_eq!(rewritten, MASTER);
    assert!(dir
        .path()
        .join(mapped(&format!("{}/live/b/seg-1.ts", server.uri())))
        .is_file());
    Ok(())
}

#[tokio::test]
async fn test_shared_segment_fetched_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/live/master.m3u8", MASTER)
        .await
        .mock("/live/a/index.m3u8", media(&["../common/intro.ts", "a-0.ts"]))
        .await
        .mock("/live/b/index.m3u8", media(&["../common/intro.ts", "b-0.ts"]))
        .await;
    Mock::given(method("GET"))
        .and(path("/live/common/intro.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("intro"))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    server.mock_media("/live").await;

    let store = MemoryStore::new();
    let mirror = Mirror::builder(HttpClient::default(), store.clone())
        .retry_policy(fast_retry())
        .build();
    let report = mirror
        .run(Url::parse(&format!("{}/live/master.m3u8", server.uri()))?)
        .await
        .assert_success();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources, 3);
    let intro = store
        .get(mapped(&format!("{}/live/common/intro.ts", server.uri())))
        .assert_success();
    assert_eq!(&intro[..], b"intro");
    Ok(())
}

#[tokio::test]
async fn test_second_run_is_idempotent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/live/master.m3u8", MASTER)
        .await
        .mock("/live/a/index.m3u8", media(&["a-0.ts"]))
        .await
        .mock("/live/b/index.m3u8", media(&["b-0.ts"]))
        .await;
    Mock::given(method("GET"))
        .and(path("/live/a/a-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live/b/b-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("b"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir()?;
    let url = format!("{}/live/master.m3u8", server.uri());

    let first = mirror_to(dir.path(), &url).await;
    assert!(first.is_success(), "{first:?}");
    assert_eq!(first.resources, 2);
    let files = list_files(dir.path());
    let master = std::fs::read(dir.path().join(mapped(&url)))?;

    let second = mirror_to(dir.path(), &url).await;
    assert!(second.is_success(), "{second:?}");
    assert_eq!(second.manifests, 3);
    assert_eq!(second.resources, 0);
    assert_eq!(second.skipped, 2);

    assert_eq!(list_files(dir.path()), files);
    assert_eq!(std::fs::read(dir.path().join(mapped(&url)))?, master);
    assert_eq!(
        std::fs::read_to_string(dir.path().join(original_path(&mapped(&url))))?,
        MASTER
    );
    // no temporary file is left behind
    assert!(files
        .iter()
        .all(|f| !f.to_string_lossy().contains(".kagami-")));
    Ok(())
}

#[tokio::test]
async fn test_retry_transient_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/live/index.m3u8", media(&["seg-0.ts"]))
        .await;
    Mock::given(method("GET"))
        .and(path("/live/seg-0.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live/seg-0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("seg"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir()?;

    let report = mirror_to(dir.path(), &format!("{}/live/index.m3u8", server.uri())).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources, 1);
    Ok(())
}

#[tokio::test]
async fn test_cookies_are_kept_across_requests() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/index.m3u8"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=1; Path=/")
                .set_body_string(media(&["seg-0.ts"])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live/seg-0.ts"))
        .and(header("cookie", "session=1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("seg"))
        .expect(1)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir()?;

    let report = mirror_to(dir.path(), &format!("{}/live/index.m3u8", server.uri())).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources, 1);
    Ok(())
}

#[tokio::test]
async fn test_cancel_before_start() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir()?;

    let token = CancellationToken::new();
    let mirror = Mirror::builder(Arc::new(HttpClient::default()), FileStore::new(dir.path()))
        .cancellation_token(token.clone())
        .build();
    token.cancel();

    let report = mirror
        .run(Url::parse(&format!("{}/live/master.m3u8", server.uri()))?)
        .await?;
    assert!(report.cancelled);
    assert!(list_files(dir.path()).is_empty());
    Ok(())
}
