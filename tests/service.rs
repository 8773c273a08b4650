//! End-to-end pipeline tests against both backends and the HTTP surface.

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use chrono::Duration as ChronoDuration;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use logger_export::config::{LocalStorageConfig, PolicyConfig, RemoteStorageConfig, TableConfig};
use logger_export::connector_drive::{DriveBackend, TokenSource};
use logger_export::connector_fs::LocalBackend;
use logger_export::directory::Directory;
use logger_export::error::ExportError;
use logger_export::models::{DateRange, DeviceEntry, DeviceId, ExportFormat};
use logger_export::preview::NO_DATA_NOTICE;
use logger_export::server::{build_router, AppState};
use logger_export::service::ExportService;
use logger_export::session::SessionGate;
use logger_export::traits::StorageBackend;

/// Two readings per day for 2024-01-01..=2024-01-10, plus one malformed row.
fn ten_day_csv() -> String {
    let mut csv = String::from("date_time,temperature,note\n");
    for day in 1..=10 {
        csv.push_str(&format!("{:02}/01/24 08:00,{}.5,morning\n", day, 10 + day));
        csv.push_str(&format!("{:02}/01/24 20:00,{}.0,evening\n", day, 5 + day));
    }
    csv.push_str("31/02/24 08:00,0,impossible date\n");
    csv
}

fn directory() -> Arc<Directory> {
    Arc::new(Directory::from_entries(vec![
        DeviceEntry {
            group: "station_a".to_string(),
            device_id: DeviceId::parse("ABC123").unwrap(),
            display_name: "Roof logger".to_string(),
        },
        DeviceEntry {
            group: "station_a".to_string(),
            device_id: DeviceId::parse("LONG01").unwrap(),
            display_name: "Long logger".to_string(),
        },
    ]))
}

fn local_store() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let nested = tmp.path().join("2024").join("january");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("ABC123_enriched.csv"), ten_day_csv()).unwrap();

    let mut long = String::from("date_time,reading,comment\n");
    for i in 0..60 {
        long.push_str(&format!(
            "05/03/24 {:02}:{:02},{},a comment that is far too long\n",
            i / 60,
            i % 60,
            i
        ));
    }
    fs::write(tmp.path().join("LONG01_enriched.csv"), long).unwrap();
    tmp
}

fn service_over(backend: Arc<dyn StorageBackend>, timeout: Duration) -> ExportService {
    ExportService::with_policy(
        backend,
        directory(),
        TableConfig::default(),
        PolicyConfig::default(),
        timeout,
    )
}

fn local_service(root: &Path) -> ExportService {
    let backend = LocalBackend::new(LocalStorageConfig {
        root: root.to_path_buf(),
        follow_symlinks: false,
    })
    .unwrap();
    service_over(Arc::new(backend), Duration::from_secs(10))
}

fn range(start: &str, end: &str) -> DateRange {
    DateRange::parse(Some(start), Some(end)).unwrap()
}

fn csv_rows(bytes: &[u8]) -> Vec<String> {
    String::from_utf8(bytes.to_vec())
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

fn sheet_xml(bytes: Vec<u8>) -> String {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut sheet = String::new();
    archive
        .by_name("xl/worksheets/sheet1.xml")
        .unwrap()
        .read_to_string(&mut sheet)
        .unwrap();
    sheet
}

/// Every `Tj` string in the document, in page order.
fn pdf_text(bytes: &[u8]) -> Vec<String> {
    let doc = lopdf::Document::load_mem(bytes).unwrap();
    let mut text = Vec::new();
    for page_id in doc.get_pages().into_values() {
        let content =
            lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        for op in content.operations.iter().filter(|op| op.operator == "Tj") {
            text.push(String::from_utf8_lossy(op.operands[0].as_str().unwrap()).into_owned());
        }
    }
    text
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============ Scenarios over the local backend ============

#[tokio::test]
async fn test_short_range_previews_everything() {
    let store = local_store();
    let svc = local_service(store.path());
    let r = range("2024-01-03", "2024-01-06");

    let preview = svc.preview("ABC123", &r).await.unwrap();
    assert_eq!(preview.dates.len(), 4);
    assert_eq!(preview.rows, 8);
    assert!(!preview.truncated);

    let artifact = svc.export("ABC123", &r, ExportFormat::Csv).await.unwrap();
    let rows = csv_rows(&artifact.bytes);
    assert_eq!(rows.len(), 8);
    assert_eq!(rows[0], "03/01/24 08:00,13.5,morning");
    assert_eq!(rows[7], "06/01/24 20:00,11.0,evening");
}

#[tokio::test]
async fn test_long_range_preview_truncated_export_complete() {
    let store = local_store();
    let svc = local_service(store.path());
    let r = range("2024-01-01", "2024-01-10");

    let preview = svc.preview("ABC123", &r).await.unwrap();
    assert!(preview.truncated);
    let shown: Vec<String> = preview.dates.iter().map(|d| d.to_string()).collect();
    assert_eq!(
        shown,
        vec!["2024-01-07", "2024-01-08", "2024-01-09", "2024-01-10"]
    );
    assert!(!preview.html.contains("06/01/24"));

    let artifact = svc.export("ABC123", &r, ExportFormat::Csv).await.unwrap();
    assert_eq!(artifact.file_name, "ABC123_2024-01-01_to_2024-01-10.csv");
    assert_eq!(csv_rows(&artifact.bytes).len(), 20);

    let artifact = svc.export("ABC123", &r, ExportFormat::Xlsx).await.unwrap();
    assert_eq!(artifact.file_name, "ABC123_2024-01-01_to_2024-01-10.xlsx");
    let sheet = sheet_xml(artifact.bytes);
    assert_eq!(sheet.matches("<row ").count(), 21);
    assert!(sheet.contains("01/01/24 08:00"));

    let artifact = svc.export("ABC123", &r, ExportFormat::Pdf).await.unwrap();
    assert_eq!(artifact.file_name, "ABC123_2024-01-01_to_2024-01-10.pdf");
    let text = pdf_text(&artifact.bytes);
    assert!(text.iter().any(|t| t == "01/01/24 08:00"));
    assert!(text.iter().any(|t| t == "10/01/24 20:00"));
}

#[tokio::test]
async fn test_unknown_device_is_not_found() {
    let store = local_store();
    let svc = local_service(store.path());
    let r = range("2024-01-01", "2024-01-10");

    let err = svc.preview("doesnotexist", &r).await.unwrap_err();
    assert!(matches!(err, ExportError::NotFound(_)));
    let err = svc
        .export("doesnotexist", &r, ExportFormat::Pdf)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::NotFound(_)));
}

#[tokio::test]
async fn test_range_without_rows() {
    let store = local_store();
    let svc = local_service(store.path());
    let r = range("2023-06-01", "2023-06-30");

    let preview = svc.preview("ABC123", &r).await.unwrap();
    assert!(preview.html.contains(NO_DATA_NOTICE));

    let err = svc.export("ABC123", &r, ExportFormat::Xlsx).await.unwrap_err();
    assert!(matches!(err, ExportError::EmptyResult { .. }));
}

#[tokio::test]
async fn test_pdf_export_caps_rows_and_pages() {
    let store = local_store();
    let svc = local_service(store.path());
    let artifact = svc
        .export("LONG01", &range("2024-03-05", "2024-03-05"), ExportFormat::Pdf)
        .await
        .unwrap();
    assert_eq!(artifact.mime_type, "application/pdf");

    // 40 rows at 20pt on letter paper: 34 on the first page, 6 on the second.
    let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[tokio::test]
async fn test_xlsx_export_keeps_every_row() {
    let store = local_store();
    let svc = local_service(store.path());
    let artifact = svc
        .export("LONG01", &range("2024-03-05", "2024-03-05"), ExportFormat::Xlsx)
        .await
        .unwrap();

    let sheet = sheet_xml(artifact.bytes);
    assert_eq!(sheet.matches("<row ").count(), 61);
    assert!(sheet.contains("a comment that is far too long"));
}

// ============ Remote backend against a drive double ============

#[derive(Clone)]
struct DriveDouble {
    /// file name → (file id, body)
    files: Arc<HashMap<String, (String, String)>>,
    delay: Duration,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer test-token")
}

async fn drive_list(
    State(double): State<DriveDouble>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    tokio::time::sleep(double.delay).await;
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let q = params.get("q").ok_or(StatusCode::BAD_REQUEST)?;
    if !q.contains("'folder-1' in parents") {
        return Ok(Json(serde_json::json!({ "files": [] })));
    }
    let name = q
        .strip_prefix("name = '")
        .and_then(|rest| rest.split('\'').next())
        .ok_or(StatusCode::BAD_REQUEST)?;
    if name == "BROKEN_enriched.csv" {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let files: Vec<Value> = double
        .files
        .get(name)
        .map(|(id, _)| serde_json::json!({ "id": id, "name": name, "trashed": false }))
        .into_iter()
        .collect();
    Ok(Json(serde_json::json!({ "files": files })))
}

async fn drive_media(
    State(double): State<DriveDouble>,
    headers: HeaderMap,
    UrlPath(id): UrlPath<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String, StatusCode> {
    if !authorized(&headers) || params.get("alt").map(String::as_str) != Some("media") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    double
        .files
        .values()
        .find(|(file_id, _)| *file_id == id)
        .map(|(_, body)| body.clone())
        .ok_or(StatusCode::NOT_FOUND)
}

async fn drive_service(delay: Duration, timeout: Duration) -> ExportService {
    let mut files = HashMap::new();
    files.insert(
        "ABC123_enriched.csv".to_string(),
        ("file-abc".to_string(), ten_day_csv()),
    );
    let double = DriveDouble {
        files: Arc::new(files),
        delay,
    };
    let router = Router::new()
        .route("/drive/v3/files", get(drive_list))
        .route("/drive/v3/files/{id}", get(drive_media))
        .with_state(double);
    let base = spawn(router).await;

    let config = RemoteStorageConfig {
        folder_id: "folder-1".to_string(),
        credentials_file: None,
        access_token_env: Some("UNUSED".to_string()),
        api_base: base,
    };
    let backend = DriveBackend::new(
        config,
        TokenSource::Static("test-token".to_string()),
        Duration::from_secs(10),
    )
    .unwrap();
    service_over(Arc::new(backend), timeout)
}

#[tokio::test]
async fn test_remote_backend_matches_local_results() {
    let svc = drive_service(Duration::ZERO, Duration::from_secs(10)).await;
    let r = range("2024-01-01", "2024-01-10");

    let preview = svc.preview("ABC123", &r).await.unwrap();
    assert_eq!(preview.dates.len(), 4);

    let artifact = svc.export("ABC123", &r, ExportFormat::Csv).await.unwrap();
    assert_eq!(csv_rows(&artifact.bytes).len(), 20);

    let store = local_store();
    let local = local_service(store.path())
        .export("ABC123", &r, ExportFormat::Csv)
        .await
        .unwrap();
    assert_eq!(artifact.bytes, local.bytes);
}

#[tokio::test]
async fn test_remote_unknown_device_is_not_found() {
    let svc = drive_service(Duration::ZERO, Duration::from_secs(10)).await;
    let err = svc.available_dates("doesnotexist").await.unwrap_err();
    assert!(matches!(err, ExportError::NotFound(_)));
}

#[tokio::test]
async fn test_remote_failure_is_load_error() {
    let svc = drive_service(Duration::ZERO, Duration::from_secs(10)).await;
    let err = svc.available_dates("BROKEN").await.unwrap_err();
    assert!(matches!(err, ExportError::Load { .. }));
}

#[tokio::test]
async fn test_remote_slow_source_times_out() {
    let svc = drive_service(Duration::from_secs(3), Duration::from_millis(300)).await;
    let err = svc.available_dates("ABC123").await.unwrap_err();
    assert!(matches!(err, ExportError::SourceUnavailable { .. }));
}

// ============ HTTP surface ============

struct TestServer {
    base: String,
    client: reqwest::Client,
    _store: TempDir,
}

async fn http_server() -> TestServer {
    let store = local_store();
    let service = local_service(store.path());
    let gate = SessionGate::new(
        "0123456789abcdef0123",
        ChronoDuration::minutes(30),
        "admin",
        "s3cret",
    );
    let router = build_router(AppState::new(Arc::new(service), Some(Arc::new(gate))));
    TestServer {
        base: spawn(router).await,
        client: reqwest::Client::new(),
        _store: store,
    }
}

impl TestServer {
    async fn login(&self) -> String {
        let resp = self
            .client
            .post(format!("{}/login", self.base))
            .json(&serde_json::json!({ "username": "admin", "password": "s3cret" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let set_cookie = resp
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(format!("{}{}", self.base, path));
        if let Some(cookie) = cookie {
            req = req.header("cookie", cookie);
        }
        req.send().await.unwrap()
    }
}

async fn error_code(resp: reqwest::Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let server = http_server().await;
    let resp = server.get("/health", None).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_routes_require_session() {
    let server = http_server().await;
    let resp = server.get("/groups", None).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(error_code(resp).await, "unauthorized");

    let resp = server
        .get("/groups", Some("session=admin.99999999999.deadbeef"))
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let server = http_server().await;
    let resp = server
        .client
        .post(format!("{}/login", server.base))
        .json(&serde_json::json!({ "username": "admin", "password": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert!(resp.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn test_directory_routes() {
    let server = http_server().await;
    let cookie = server.login().await;

    let body: Value = server
        .get("/groups", Some(cookie.as_str()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["groups"], serde_json::json!(["station_a"]));

    let body: Value = server
        .get("/select?device_id=ABC123", Some(cookie.as_str()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["group"], "station_a");
    assert_eq!(body["selected"]["display_name"], "Roof logger");
    assert_eq!(body["devices"].as_array().unwrap().len(), 2);

    let resp = server.get("/select", Some(cookie.as_str())).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_dates_and_preview_routes() {
    let server = http_server().await;
    let cookie = server.login().await;

    let body: Value = server
        .get("/devices/ABC123/dates", Some(cookie.as_str()))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["dates"].as_array().unwrap().len(), 10);
    assert_eq!(body["dates"][0], "2024-01-01");

    let resp = server
        .get(
            "/devices/ABC123/preview?start_date=2024-01-01&end_date=2024-01-10",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("<td>10/01/24 20:00</td>"));
    assert!(!html.contains("05/01/24"));
}

#[tokio::test]
async fn test_download_route() {
    let server = http_server().await;
    let cookie = server.login().await;

    let resp = server
        .get(
            "/download/ABC123/csv?start_date=2024-01-03&end_date=2024-01-06",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/csv");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"ABC123_2024-01-03_to_2024-01-06.csv\""
    );
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(csv_rows(&bytes).len(), 8);
}

#[tokio::test]
async fn test_download_error_mapping() {
    let server = http_server().await;
    let cookie = server.login().await;

    let resp = server
        .get("/download/ABC123/csv?start_date=2024-01-03", Some(cookie.as_str()))
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "bad_request");

    let resp = server
        .get(
            "/download/ABC123/docx?start_date=2024-01-03&end_date=2024-01-06",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_code(resp).await, "unsupported_format");

    let resp = server
        .get(
            "/download/doesnotexist/csv?start_date=2024-01-03&end_date=2024-01-06",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");

    // A malformed id is answered like an unknown one.
    let resp = server
        .get(
            "/download/bad-id/csv?start_date=2024-01-01&end_date=2024-01-02",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");

    let resp = server
        .get("/devices/bad.id/dates", Some(cookie.as_str()))
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "not_found");

    let resp = server
        .get(
            "/download/ABC123/pdf?start_date=2023-01-01&end_date=2023-01-02",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 404);
    assert_eq!(error_code(resp).await, "no_data");

    let resp = server
        .get(
            "/download/ABC123/csv?start_date=03-01-2024&end_date=2024-01-06",
            Some(cookie.as_str()),
        )
        .await;
    assert_eq!(resp.status(), 400);
}
