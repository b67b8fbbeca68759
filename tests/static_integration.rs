//! Static-mode runs against a mocked embed endpoint.

#![allow(clippy::unwrap_used)]

mod support;

use std::path::Path;
use std::time::Duration;

use scribd_core::{
    CancellationToken, EngineConfig, EventBus, Mode, OutputArtifact, Reporter, RunOutcome,
    RunRequest, Severity, run,
};
use support::fake_browser::FakeLauncher;
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOC_URL: &str = "https://www.scribd.com/document/42/My-Title";

async fn mount(server: &MockServer, route: &str, status: u16, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

fn callback(page: u32, markup: &str) -> String {
    format!(
        "window.page{page}_callback([{}]);",
        serde_json::to_string(markup).unwrap()
    )
}

/// Embed page naming `pages` as payloads on the mock host.
async fn mount_embed(server: &MockServer, title: &str, pages: &[u32]) {
    let scripts: String = pages
        .iter()
        .map(|n| {
            format!(
                r#"docManager.addPage({{id: {n}, contentUrl: "{}/pages/{n}.jsonp"}});"#,
                server.uri()
            )
        })
        .collect();
    let body = format!(
        "<html><head><title>{title}</title></head><body><script>{scripts}</script></body></html>"
    );
    mount(server, "/embeds/42/content", 200, body).await;
}

async fn run_static(server: &MockServer, mode: Mode, dir: &Path, reporter: &Reporter) -> RunOutcome {
    let config = EngineConfig::without_delays().with_endpoint_base(server.uri());
    let request = RunRequest::new(DOC_URL, mode).with_output_dir(dir);
    run(
        &request,
        &config,
        &FakeLauncher::unavailable(),
        reporter,
        &CancellationToken::new(),
    )
    .await
}

#[tokio::test]
async fn test_text_mode_writes_span_text_in_page_order() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "My Title: Vol 1", &[1, 2]).await;
    mount(
        &server,
        "/pages/1.jsonp",
        200,
        callback(1, r#"<span class="a">Hello</span><span class="a">World</span>"#),
    )
    .await;
    mount(
        &server,
        "/pages/2.jsonp",
        200,
        callback(2, r#"<span class="b">ignored</span><span class="a">Bye</span>"#),
    )
    .await;
    let dir = TempDir::new().unwrap();

    let outcome = run_static(&server, Mode::Text, dir.path(), &Reporter::silent()).await;

    let expected = dir.path().join("My_Title__Vol_1.txt");
    assert_eq!(outcome, RunOutcome::Succeeded(OutputArtifact::Text(expected.clone())));
    assert_eq!(
        std::fs::read_to_string(expected).unwrap(),
        "Hello\nWorld\nBye\n"
    );
}

#[tokio::test]
async fn test_failing_page_is_skipped_and_reported() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "Doc", &[1, 2, 3]).await;
    mount(&server, "/pages/1.jsonp", 200, callback(1, r#"<span class="a">one</span>"#)).await;
    mount(&server, "/pages/2.jsonp", 404, Vec::new()).await;
    mount(&server, "/pages/3.jsonp", 200, callback(3, r#"<span class="a">three</span>"#)).await;
    let dir = TempDir::new().unwrap();
    let bus = EventBus::new();
    let mut events = bus.subscribe();

    let outcome = run_static(&server, Mode::Text, dir.path(), &bus.reporter()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("Doc.txt")).unwrap(),
        "one\nthree\n"
    );

    let mut warnings = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.severity == Severity::Warning {
            warnings.push(event.message);
        }
    }
    assert!(
        warnings.iter().any(|m| m.starts_with("Page 2 skipped")),
        "{warnings:?}"
    );
}

#[tokio::test]
async fn test_every_page_failing_is_a_failed_run() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "Doc", &[1]).await;
    mount(&server, "/pages/1.jsonp", 200, "not a callback").await;
    let dir = TempDir::new().unwrap();

    let outcome = run_static(&server, Mode::Text, dir.path(), &Reporter::silent()).await;

    assert_eq!(
        outcome,
        RunOutcome::Failed("no content could be retrieved".to_string())
    );
    assert!(!dir.path().join("Doc.txt").exists());
}

#[tokio::test]
async fn test_images_mode_saves_one_file_per_page() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "Scan", &[1, 2]).await;
    mount(&server, "/images/1.jpg", 200, vec![0xFF, 0xD8, 0x01]).await;
    mount(&server, "/images/2.jpg", 200, vec![0xFF, 0xD8, 0x02]).await;
    let dir = TempDir::new().unwrap();

    let outcome = run_static(&server, Mode::Images, dir.path(), &Reporter::silent()).await;

    let first = dir.path().join("Scan_1.jpg");
    let second = dir.path().join("Scan_2.jpg");
    assert_eq!(
        outcome,
        RunOutcome::Succeeded(OutputArtifact::Images(vec![first.clone(), second.clone()]))
    );
    assert_eq!(std::fs::read(first).unwrap(), vec![0xFF, 0xD8, 0x01]);
    assert_eq!(std::fs::read(second).unwrap(), vec![0xFF, 0xD8, 0x02]);
}

#[tokio::test]
async fn test_html_static_mode_inlines_images() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "Deck", &[1]).await;
    mount(
        &server,
        "/pages/1.jsonp",
        200,
        callback(1, r#"<div class="newpage"><img src="/img/1.png"></div>"#),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/img/1.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(b"ABC".to_vec()),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let outcome = run_static(&server, Mode::HtmlStatic, dir.path(), &Reporter::silent()).await;

    let expected = dir.path().join("Deck.html");
    assert_eq!(outcome, RunOutcome::Succeeded(OutputArtifact::Html(expected.clone())));
    let html = std::fs::read_to_string(expected).unwrap();
    assert!(html.contains("data:image/png;base64,QUJD"));
    assert!(html.ends_with("</html>"));
}

#[tokio::test]
async fn test_html_static_stop_closes_document() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_embed(&server, "Deck", &[1, 2]).await;
    Mock::given(method("GET"))
        .and(path("/pages/1.jsonp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(callback(1, "<p>first</p>"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    mount(&server, "/pages/2.jsonp", 200, callback(2, "<p>second</p>")).await;
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let config = EngineConfig::without_delays().with_endpoint_base(server.uri());
    let request = RunRequest::new(DOC_URL, Mode::HtmlStatic).with_output_dir(dir.path());
    let stopper = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });

    let outcome = run(
        &request,
        &config,
        &FakeLauncher::unavailable(),
        &Reporter::silent(),
        &token,
    )
    .await;

    assert_eq!(outcome, RunOutcome::Stopped);
    let html = std::fs::read_to_string(dir.path().join("Deck.html")).unwrap();
    assert!(html.contains("outer_page_1"));
    assert!(!html.contains("outer_page_2"));
    assert!(html.ends_with("</html>"));
    let requests = server.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/pages/2.jsonp"));
}

#[tokio::test]
async fn test_stop_before_start_is_stopped_without_requests() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let config = EngineConfig::without_delays().with_endpoint_base(server.uri());
    let request = RunRequest::new(DOC_URL, Mode::Text).with_output_dir(dir.path());

    let outcome = run(
        &request,
        &config,
        &FakeLauncher::unavailable(),
        &Reporter::silent(),
        &token,
    )
    .await;

    assert_eq!(outcome, RunOutcome::Stopped);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_reference_fails_without_requests() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = EngineConfig::without_delays().with_endpoint_base(server.uri());
    let request =
        RunRequest::new("https://www.scribd.com/user/42/someone", Mode::Text).with_output_dir(dir.path());

    let outcome = run(
        &request,
        &config,
        &FakeLauncher::unavailable(),
        &Reporter::silent(),
        &CancellationToken::new(),
    )
    .await;

    match outcome {
        RunOutcome::Failed(reason) => assert!(reason.contains("invalid document reference")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}
