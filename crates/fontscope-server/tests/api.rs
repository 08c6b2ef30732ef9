use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fontscope::{Acquired, Acquisition, Error, Fetcher, NoDocument, Result, ScanSettings, Scanner};
use fontscope_server::routes::build_router;
use serde_json::{Value, json};
use url::Url;

const PAGE: &str = r#"<html><head>
<link rel="stylesheet" href="https://fonts.googleapis.com/css?family=Lato|Merriweather:700">
<style>
  @font-face { font-family: "House Sans"; src: url(/fonts/house.woff2) format("woff2"); }
  body { font-family: "House Sans", Arial, sans-serif; }
</style>
</head><body></body></html>"#;

/// Serves `PAGE` for `*.test` hosts, fails everything else
struct CannedAcquisition {
    calls: Arc<AtomicUsize>,
}

impl Acquisition for CannedAcquisition {
    type Document = NoDocument;

    const KIND: &'static str = "static";

    async fn fetch_markup(&self, url: &Url) -> Result<Acquired<NoDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url.host_str().is_some_and(|host| host.ends_with(".test")) {
            Ok(Acquired {
                html: PAGE.to_string(),
                final_url: url.clone(),
                document: None,
            })
        } else {
            Err(Error::PrimaryFetch {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }
}

async fn spawn_api() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let settings = ScanSettings::default();
    let scanner = Scanner::new(
        CannedAcquisition {
            calls: calls.clone(),
        },
        Fetcher::new(&settings).unwrap(),
        settings,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(Arc::new(scanner));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), calls)
}

#[test_log::test(tokio::test)]
async fn post_returns_the_catalog() {
    let (base, calls) = spawn_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/fonts"))
        .json(&json!({ "url": "fonts.test/landing" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["page"]["url"], "https://fonts.test/landing");
    assert_eq!(body["page"]["acquisition"], "static");
    assert_eq!(body["service_families"][0]["name"], "Lato");
    assert_eq!(body["service_families"][1]["name"], "Merriweather");
    assert_eq!(body["font_faces"][0]["family"], "House Sans");
    assert_eq!(body["font_faces"][0]["weight"], "normal");
    assert_eq!(body["font_files"][0]["url"], "https://fonts.test/fonts/house.woff2");
    assert_eq!(body["computed_fonts"], json!(["House Sans, Arial"]));
    assert_eq!(body["system_stacks"], json!(["House Sans, Arial, sans-serif"]));
    assert_eq!(body["stylesheets"][0]["kind"], "inline");
    assert!(body["stylesheets"][0].get("text").is_none());
    assert_eq!(body["runtime_fetches"], json!([]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn get_accepts_a_query_parameter() {
    let (base, _) = spawn_api().await;

    let response = reqwest::get(format!("{base}/api/fonts?url=https%3A%2F%2Fwww.fonts.test%2F"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["page"]["url"], "https://www.fonts.test/");
}

#[test_log::test(tokio::test)]
async fn missing_url_is_a_bad_request() {
    let (base, calls) = spawn_api().await;
    let client = reqwest::Client::new();

    for body in [json!({}), json!({ "url": "" }), json!({ "url": "   " })] {
        let response = client
            .post(format!("{base}/api/fonts"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "body {body}");
        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string());
    }

    let response = reqwest::get(format!("{base}/api/fonts")).await.unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{base}/api/fonts"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn unreachable_page_is_a_bad_gateway() {
    let (base, _) = spawn_api().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/fonts"))
        .json(&json!({ "url": "https://unreachable.example/" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let error: Value = response.json().await.unwrap();
    assert!(
        error["error"]
            .as_str()
            .unwrap()
            .contains("connection refused")
    );
}

#[test_log::test(tokio::test)]
async fn health_is_ok() {
    let (base, _) = spawn_api().await;
    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}
