use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sitesearch_core::{Document, EngineConfig, SearchEngine};
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;

fn tiny_engine() -> SearchEngine {
    let engine = SearchEngine::new(EngineConfig::default());
    let docs = [
        (1, "Admissions", "RVCE admission process 2024"),
        (2, "Hostel", "Hostel admission <b>fees</b> & rules"),
        (3, "Library", "Library hours for students"),
        (4, "Exams", "Exam schedule and admission tickets"),
    ];
    for (id, title, body) in docs {
        engine.put(Document::new(id, format!("https://rvce.edu.in/{id}"), title, body), false).unwrap();
    }
    engine
}

async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let app = server::app(Arc::new(tiny_engine()));
    let (status, json) = call(app, "/search?query=admission").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalMatches"], 3);
    assert_eq!(json["timedOut"], false);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 3);
    // title match ranks first
    assert_eq!(arr[0]["docId"], 1);
    assert_eq!(arr[0]["url"], "https://rvce.edu.in/1");
    assert_eq!(arr[0]["snippet"], "RVCE <em>admission</em> process 2024");
    assert_eq!(arr[0]["highlights"][0]["start"], 5);
    assert_eq!(arr[0]["highlights"][0]["end"], 14);
}

#[tokio::test]
async fn snippet_markup_is_escaped() {
    let app = server::app(Arc::new(tiny_engine()));
    let (_, json) = call(app, "/search?query=fees").await;
    let hit = &json["results"][0];
    assert_eq!(hit["docId"], 2);
    let snippet = hit["snippet"].as_str().unwrap();
    assert!(snippet.contains("&lt;b&gt;<em>fees</em>&lt;/b&gt; &amp; rules"));
    assert_eq!(hit["excerpt"], "Hostel admission <b>fees</b> & rules");
}

#[tokio::test]
async fn paging_parameters_slice_results() {
    let engine = Arc::new(tiny_engine());
    let (_, all) = call(server::app(engine.clone()), "/search?query=admission").await;
    let (_, second) = call(server::app(engine), "/search?query=admission&page=1&pageSize=2").await;
    assert_eq!(second["totalMatches"], 3);
    let arr = second["results"].as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["docId"], all["results"][2]["docId"]);
}

#[tokio::test]
async fn empty_query_is_not_an_error() {
    let app = server::app(Arc::new(tiny_engine()));
    let (status, json) = call(app, "/search?query=").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalMatches"], 0);
    assert_eq!(json["results"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn bad_paging_is_a_client_error() {
    let engine = Arc::new(tiny_engine());
    for uri in ["/search?query=admission&page=-1", "/search?query=admission&pageSize=0", "/search?query=admission&page=two"] {
        let (status, json) = call(server::app(engine.clone()), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"], "InvalidPage");
    }
}

#[tokio::test]
async fn oversized_query_is_rejected() {
    let app = server::app(Arc::new(tiny_engine()));
    let uri = format!("/search?query={}", "a".repeat(server::MAX_QUERY_CHARS + 1));
    let (status, json) = call(app, &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidQuery");
}

#[tokio::test]
async fn doc_lookup_and_not_found() {
    let engine = Arc::new(tiny_engine());
    let (status, json) = call(server::app(engine.clone()), "/doc/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["title"], "Library");
    let (status, json) = call(server::app(engine), "/doc/99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "NotFound");
}

#[tokio::test]
async fn serves_a_flushed_index_from_disk() {
    let dir = tempdir().unwrap();
    let engine = SearchEngine::open(dir.path(), EngineConfig::default()).unwrap();
    engine.put(Document::new(0, "https://rvce.edu.in/rust", "Rust", "Rust is great. rust systems programming."), false).unwrap();
    engine.put(Document::new(1, "https://rvce.edu.in/learn", "Learning", "Learning rust."), false).unwrap();
    engine.close().unwrap();

    let app = server::build_app(&dir.path().to_string_lossy(), EngineConfig::default()).unwrap();
    let (status, json) = call(app, "/search?q=rust&pageSize=2").await;
    assert_eq!(status, StatusCode::OK);
    let arr = json["results"].as_array().unwrap();
    assert_eq!(arr.len(), 2);
    assert_eq!(arr[0]["docId"], 0);
    assert_eq!(arr[1]["docId"], 1);
}
