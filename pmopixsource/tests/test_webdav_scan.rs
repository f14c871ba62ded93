//! Scans against a stub WebDAV server (axum answering PROPFIND).

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use pmopixsource::{backend_for, scan_all, SourceConfig};

const ROOT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/photos/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/photos/a.jpg</D:href>
    <D:propstat><D:prop>
      <D:resourcetype/>
      <D:getcontentlength>2048</D:getcontentlength>
      <D:getlastmodified>Fri, 12 Jan 2024 10:00:00 GMT</D:getlastmodified>
    </D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/photos/b.txt</D:href>
    <D:propstat><D:prop><D:resourcetype/><D:getcontentlength>7</D:getcontentlength></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/photos/sub/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;

const SUB_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/photos/sub/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/photos/sub/c.png</D:href>
    <D:propstat><D:prop>
      <D:resourcetype/>
      <D:getcontentlength>4096</D:getcontentlength>
      <D:getlastmodified>Sat, 13 Jan 2024 08:30:00 GMT</D:getlastmodified>
    </D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;

async fn handler(req: axum::extract::Request) -> Response {
    let path = req.uri().path().to_string();
    match (req.method().as_str(), path.as_str()) {
        ("PROPFIND", "/photos/" | "/photos") => xml_response(ROOT_XML),
        ("PROPFIND", "/photos/sub/" | "/photos/sub") => xml_response(SUB_XML),
        ("GET", "/photos/a.jpg") => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(&b"fake jpeg"[..]))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}

fn xml_response(xml: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "application/xml; charset=utf-8")
        .body(Body::from(xml))
        .unwrap()
}

async fn spawn_stub() -> String {
    let app = Router::new().fallback(handler);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_recursive_webdav_scan_walks_collections() {
    let base = spawn_stub().await;
    let config = SourceConfig::webdav(&base, "photos", "demo", "secret");

    let mut references = backend_for(&config).scan().await.unwrap();
    references.sort_by(|a, b| a.locator.cmp(&b.locator));

    assert_eq!(references.len(), 2);
    assert!(references[0].locator.ends_with("/photos/a.jpg"));
    assert_eq!(references[0].byte_size, 2048);
    assert_eq!(references[0].last_modified, 1705053600000);
    assert!(references[1].locator.ends_with("/photos/sub/c.png"));
    assert_eq!(references[1].byte_size, 4096);
}

#[tokio::test]
async fn test_non_recursive_webdav_scan_lists_once() {
    let base = spawn_stub().await;
    let config = SourceConfig::webdav(&base, "photos", "", "").with_recursive(false);

    let references = backend_for(&config).scan().await.unwrap();
    assert_eq!(references.len(), 1);
    assert!(references[0].locator.ends_with("/photos/a.jpg"));
}

#[tokio::test]
async fn test_list_folders_returns_sorted_directories() {
    let base = spawn_stub().await;
    let config = SourceConfig::webdav(&base, "photos", "", "");

    let folders = backend_for(&config).list_folders("photos").await.unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, "sub");
    assert!(folders[0].is_directory);
}

#[tokio::test]
async fn test_list_folders_propagates_connection_errors() {
    // Rien n'écoute sur ce port : le picker doit voir l'erreur
    let config = SourceConfig::webdav("http://127.0.0.1:1", "", "", "");
    assert!(backend_for(&config).list_folders("").await.is_err());
}

#[tokio::test]
async fn test_unreachable_source_does_not_abort_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("ok.jpg"), b"x").unwrap();

    let configs = vec![
        SourceConfig::smb("127.0.0.1", "share", "", "", ""),
        SourceConfig::webdav("http://127.0.0.1:1", "photos", "", ""),
        SourceConfig::local(dir.path().to_string_lossy()),
    ];

    let references = scan_all(&configs).await;
    assert_eq!(references.len(), 1);
    assert!(references[0].locator.ends_with("ok.jpg"));
}

#[cfg(feature = "smb")]
#[tokio::test]
async fn test_unreachable_smb_host_scans_empty() {
    let config = SourceConfig::smb("127.0.0.1", "noshare", "", "guest", "");
    assert!(backend_for(&config).scan().await.is_err());

    let references = scan_all(std::slice::from_ref(&config)).await;
    assert!(references.is_empty());
}
