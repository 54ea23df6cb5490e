//! End-to-end page and slide workflows over a scripted transport.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};

use copydesk::config::{ClientConfig, SiteConfig, StoreConfig};
use copydesk::models::{SegmentUpdate, SlideEntry};
use copydesk::store::{
    Method, RemoteStore, Transport, TransportError, TransportRequest, TransportResponse,
};
use copydesk::{pages, slides};

/// Minimal scripted transport: responses play back in order, every request
/// is recorded, running past the script is a test bug.
struct ScriptedTransport {
    script: Mutex<VecDeque<TransportResponse>>,
    log: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<TransportResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
            log: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(response) => Ok(response),
            None => panic!("unscripted request: {} {}", request.method, request.url),
        }
    }
}

fn ok_json(body: Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        headers: HashMap::from([(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        )]),
        body: body.to_string(),
    }
}

fn not_found() -> TransportResponse {
    TransportResponse {
        status: 404,
        headers: HashMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]),
        body: json!({"message": "Not Found"}).to_string(),
    }
}

fn file_json(content: &str, sha: &str) -> Value {
    json!({
        "sha": sha,
        "content": BASE64.encode(content.as_bytes()),
        "encoding": "base64",
    })
}

fn site() -> SiteConfig {
    SiteConfig {
        locales: vec!["en".to_string(), "sv".to_string()],
        default_locale: "en".to_string(),
        pages_root: "src/content/pages".to_string(),
        home: HashMap::from([
            ("en".to_string(), "src/site/index.html".to_string()),
            ("sv".to_string(), "src/site/sv/index.html".to_string()),
        ]),
        include_globs: vec!["*.html".to_string()],
        slides_dir: "src/site/images/slide".to_string(),
        slides_manifest: "src/site/images/slide/slides.json".to_string(),
        max_upload_bytes: 10 * 1024 * 1024,
    }
}

fn make_store(transport: Arc<ScriptedTransport>) -> RemoteStore {
    let store = StoreConfig {
        repo: "acme/site".to_string(),
        branch: "main".to_string(),
        api_base: "https://store.test".to_string(),
    };
    RemoteStore::with_transport(store, ClientConfig::default(), transport)
}

fn put_content(request: &TransportRequest) -> String {
    let encoded = request
        .body
        .as_ref()
        .and_then(|b| b.get("content"))
        .and_then(Value::as_str)
        .expect("PUT body carries content");
    String::from_utf8(BASE64.decode(encoded).expect("valid base64")).expect("utf8 content")
}

const ABOUT_EN: &str = "<main><h1>Welcome</h1><p>Old copy here</p></main>";

#[tokio::test(start_paused = true)]
async fn extract_edit_save_round_trip() {
    let transport = ScriptedTransport::new(vec![
        // pages::page_segments
        ok_json(file_json(ABOUT_EN, "sha1")),
        // pages::save_segments: fingerprint check, token fetch, write
        ok_json(file_json(ABOUT_EN, "sha1")),
        ok_json(file_json(ABOUT_EN, "sha1")),
        ok_json(json!({"content": {"path": "src/content/pages/about.en.html"}})),
    ]);
    let store = make_store(transport.clone());
    let site = site();

    let page = pages::page_segments(&store, &site, "about", "en").await.unwrap();
    assert_eq!(page.path, "src/content/pages/about.en.html");
    assert_eq!(page.segments.len(), 2);

    let body = page.segments.iter().find(|s| s.text == "Old copy here").unwrap();
    let updates = vec![SegmentUpdate {
        id: body.id.clone(),
        text: "Fresh copy".to_string(),
    }];

    pages::save_segments(
        &store,
        &site,
        "about",
        "en",
        &updates,
        Some(&page.fingerprint),
    )
    .await
    .unwrap();

    let log = transport.requests();
    let put = log.iter().find(|r| r.method == Method::Put).unwrap();
    assert_eq!(
        put_content(put),
        "<main><h1>Welcome</h1><p>Fresh copy</p></main>"
    );
    let message = put.body.as_ref().unwrap()["message"].as_str().unwrap();
    assert_eq!(message, "chore(admin): update text segments for about.en");
}

#[tokio::test(start_paused = true)]
async fn save_refuses_a_drifted_page() {
    let transport = ScriptedTransport::new(vec![
        // The page changed between extraction and save.
        ok_json(file_json("<main><p>Someone else edited this</p></main>", "sha2")),
    ]);
    let store = make_store(transport.clone());
    let site = site();

    let stale_fingerprint = copydesk::segments::document_fingerprint(ABOUT_EN);
    let err = pages::save_segments(
        &store,
        &site,
        "about",
        "en",
        &[SegmentUpdate {
            id: "0/0/0".to_string(),
            text: "lost".to_string(),
        }],
        Some(&stale_fingerprint),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("changed since"), "{}", err);
    // Nothing was written.
    assert!(transport.requests().iter().all(|r| r.method == Method::Get));
}

#[tokio::test(start_paused = true)]
async fn list_pages_collects_slugs_across_locales() {
    let transport = ScriptedTransport::new(vec![ok_json(json!([
        {"name": "about.en.html", "path": "p", "sha": "s", "size": 1, "type": "file"},
        {"name": "about.sv.html", "path": "p", "sha": "s", "size": 1, "type": "file"},
        {"name": "contact.en.html", "path": "p", "sha": "s", "size": 1, "type": "file"},
        {"name": "styles.css", "path": "p", "sha": "s", "size": 1, "type": "file"},
        {"name": "drafts", "path": "p", "sha": "s", "size": 0, "type": "dir"},
    ]))]);
    let store = make_store(transport.clone());

    let index = pages::list_pages(&store, &site()).await.unwrap();
    assert_eq!(index.slugs, vec!["about", "contact"]);
    assert_eq!(index.home, vec!["index"]);
}

#[tokio::test(start_paused = true)]
async fn home_page_resolves_through_the_locale_map() {
    let transport = ScriptedTransport::new(vec![ok_json(file_json(
        "<h1>Hem</h1>",
        "sha1",
    ))]);
    let store = make_store(transport.clone());

    let page = pages::page_segments(&store, &site(), "index", "sv").await.unwrap();
    assert_eq!(page.path, "src/site/sv/index.html");
    assert!(transport.requests()[0]
        .url
        .contains("/contents/src/site/sv/index.html"));
}

#[tokio::test(start_paused = true)]
async fn slide_upload_validates_before_touching_the_store() {
    let transport = ScriptedTransport::new(vec![]);
    let store = make_store(transport.clone());
    let mut site = site();
    site.max_upload_bytes = 8;

    let err = slides::upload_slide(&store, &site, "../evil.webp", b"123")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid slide name"), "{}", err);

    let err = slides::upload_slide(&store, &site, "notes.txt", b"123")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not a supported image"), "{}", err);

    let err = slides::upload_slide(&store, &site, "big.webp", b"123456789")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("byte limit"), "{}", err);

    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slide_delete_prunes_the_manifest() {
    let manifest = json!([
        {"filename": "a.webp", "caption": "Spring"},
        {"filename": "b.webp", "caption": "Autumn"},
    ])
    .to_string();

    let transport = ScriptedTransport::new(vec![
        // delete_file: token fetch + delete
        ok_json(file_json("binary", "sha-slide")),
        ok_json(json!({"ok": true})),
        // prune: read manifest, token fetch, write
        ok_json(file_json(&manifest, "sha-m")),
        ok_json(file_json(&manifest, "sha-m")),
        ok_json(json!({"ok": true})),
    ]);
    let store = make_store(transport.clone());

    slides::delete_slide(&store, &site(), "a.webp").await.unwrap();

    let log = transport.requests();
    let delete = log.iter().find(|r| r.method == Method::Delete).unwrap();
    assert!(delete.url.contains("/contents/src/site/images/slide/a.webp"));
    assert_eq!(delete.body.as_ref().unwrap()["sha"], json!("sha-slide"));

    let put = log.iter().find(|r| r.method == Method::Put).unwrap();
    let pruned: Vec<SlideEntry> = serde_json::from_str(&put_content(put)).unwrap();
    assert_eq!(pruned.len(), 1);
    assert_eq!(pruned[0].filename, "b.webp");
    assert_eq!(pruned[0].extra["caption"], json!("Autumn"));
}

#[tokio::test(start_paused = true)]
async fn missing_manifest_is_an_empty_slideshow() {
    let transport = ScriptedTransport::new(vec![
        ok_json(json!([
            {"name": "a.webp", "path": "p", "sha": "s", "size": 1, "type": "file"},
            {"name": "README.md", "path": "p", "sha": "s", "size": 1, "type": "file"},
        ])),
        not_found(),
    ]);
    let store = make_store(transport.clone());

    let slideshow = slides::list_slides(&store, &site()).await.unwrap();
    assert_eq!(slideshow.files, vec!["a.webp"]);
    assert!(slideshow.manifest.is_empty());
}
