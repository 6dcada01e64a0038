use kagami::ManifestFormat;
use wiremock::{
    matchers::{method, path_regex},
    Mock, MockServer, ResponseTemplate,
};

use crate::{assert_resolves_locally, mapped, mirror_to, MirrorMock};

#[tokio::test]
async fn test_mirror_dash() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock("/dash/manifest.mpd", include_str!("../fixtures/dash/static.mpd"))
        .await
        .mock_media("/dash")
        .await;
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    let url = format!("{}/dash/manifest.mpd", server.uri());
    let report = mirror_to(root, &url).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.manifests, 1);
    // video: init + 5 numbered segments, audio: init + 3 timeline segments, one text track
    assert_eq!(report.resources, 11);

    for path in [
        "/dash/content/v720/init.mp4",
        "/dash/content/v720/seg-00001.m4s",
        "/dash/content/v720/seg-00005.m4s",
        "/dash/content/audio/init-128000.mp4",
        "/dash/content/audio/t4000.m4s",
        "/dash/content/audio/t8000.m4s",
        "/dash/content/subs/en.vtt",
    ] {
        let local = root.join(mapped(&format!("{}{path}", server.uri())));
        assert_eq!(std::fs::read_to_string(local)?, path);
    }

    assert_eq!(
        assert_resolves_locally(root, &mapped(&url), ManifestFormat::Dash),
        11
    );
    Ok(())
}

#[tokio::test]
async fn test_end_number() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    server
        .mock(
            "/dash/end.mpd",
            r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <Period>
    <AdaptationSet mimeType="video/mp4">
      <SegmentTemplate media="seg-$Number$.m4s" startNumber="1" endNumber="5"/>
      <Representation id="v" bandwidth="1"/>
    </AdaptationSet>
  </Period>
</MPD>"#,
        )
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/dash/seg-[1-5]\.m4s$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"m4s".to_vec()))
        .expect(5)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let report = mirror_to(dir.path(), &format!("{}/dash/end.mpd", server.uri())).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources, 5);
    Ok(())
}

#[tokio::test]
async fn test_base_url_chain() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    let url = format!("{}/dash/chain.mpd", server.uri());
    server
        .mock(
            "/dash/chain.mpd",
            format!(
                r#"<?xml version="1.0"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static">
  <BaseURL>{}/cdn/</BaseURL>
  <Period>
    <AdaptationSet mimeType="audio/mp4">
      <BaseURL>a/</BaseURL>
      <Representation id="r" bandwidth="1">
        <BaseURL>b/</BaseURL>
        <SegmentTemplate media="seg-$Number$.m4s" endNumber="2"/>
      </Representation>
    </AdaptationSet>
  </Period>
</MPD>"#,
                server.uri()
            ),
        )
        .await
        .mock_media("/cdn")
        .await;

    let dir = tempfile::tempdir()?;
    let report = mirror_to(dir.path(), &url).await;
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.resources, 2);

    let segment = mapped(&format!("{}/cdn/a/b/seg-2.m4s", server.uri()));
    assert_eq!(
        std::fs::read_to_string(dir.path().join(segment))?,
        "/cdn/a/b/seg-2.m4s"
    );

    let rewritten = std::fs::read_to_string(dir.path().join(mapped(&url)))?;
    assert!(rewritten.contains("<BaseURL>../cdn/</BaseURL>"), "{rewritten}");
    assert_eq!(
        assert_resolves_locally(dir.path(), &mapped(&url), ManifestFormat::Dash),
        2
    );
    Ok(())
}
