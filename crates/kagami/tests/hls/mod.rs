use kagami::{util::path::original_path, ManifestFormat};
use wiremock::MockServer;

use crate::{assert_resolves_locally, mapped, mirror_to, MirrorMock};

const MASTER: &str = include_str!("../fixtures/hls/master.m3u8");

async fn setup_mock_server() -> MockServer {
    let server = MockServer::start().await;
    server
        .mock("/hls/master.m3u8", MASTER)
        .await
        .mock("/hls/video/720p.m3u8", include_str!("../fixtures/hls/720p.m3u8"))
        .await
        .mock("/hls/video/1080p.m3u8", include_str!("../fixtures/hls/1080p.m3u8"))
        .await
        .mock("/hls/audio/en.m3u8", include_str!("../fixtures/hls/audio.m3u8"))
        .await
        .mock("/hls/subs/en.m3u8", include_str!("../fixtures/hls/subs.m3u8"))
        .await
        .mock_media("/hls")
        .await;
    server
}

#[tokio::test]
async fn test_mirror_hls() -> anyhow::Result<()> {
    let server = setup_mock_server().await;
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let report = mirror_to(root, &format!("{}/hls/master.m3u8", server.uri())).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.manifests, 5);
    assert_eq!(report.resources, 11);

    let master = mapped(&format!("{}/hls/master.m3u8", server.uri()));
    assert_eq!(assert_resolves_locally(root, &master, ManifestFormat::Hls), 4);
    assert_eq!(
        std::fs::read_to_string(root.join(original_path(&master)))?,
        MASTER
    );

    let rewritten = std::fs::read_to_string(root.join(&master))?;
    assert!(rewritten.lines().any(|line| line == "video/1080p.m3u8"));
    let variant = mapped(&format!("{}/hls/video/720p.m3u8?token=abc", server.uri()));
    let variant_name = variant.file_name().unwrap().to_string_lossy();
    assert!(rewritten
        .lines()
        .any(|line| line == format!("video/{variant_name}")));

    let media = [
        (variant, 5),
        (mapped(&format!("{}/hls/video/1080p.m3u8", server.uri())), 3),
        (mapped(&format!("{}/hls/audio/en.m3u8", server.uri())), 2),
        (mapped(&format!("{}/hls/subs/en.m3u8", server.uri())), 1),
    ];
    for (playlist, count) in media {
        assert_eq!(
            assert_resolves_locally(root, &playlist, ManifestFormat::Hls),
            count,
            "{}",
            playlist.display()
        );
    }

    let key = mapped(&format!("{}/hls/keys/k1.key", server.uri()));
    assert_eq!(std::fs::read_to_string(root.join(key))?, "/hls/keys/k1.key");

    Ok(())
}

#[tokio::test]
async fn test_rewritten_media_playlist() -> anyhow::Result<()> {
    let server = setup_mock_server().await;
    let dir = tempfile::tempdir()?;

    mirror_to(dir.path(), &format!("{}/hls/video/1080p.m3u8", server.uri())).await;

    let playlist = mapped(&format!("{}/hls/video/1080p.m3u8", server.uri()));
    // every uri is already a plain relative path
    assert_eq!(
        std::fs::read_to_string(dir.path().join(playlist))?,
        include_str!("../fixtures/hls/1080p.m3u8")
    );
    Ok(())
}
