//! Pipeline complet contre un backend HTTP simulé (axum).

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use pmopixcache::{fingerprint, CacheStore};
use pmopixfetch::Fetcher;
use pmopixsource::{ImageRef, SourceConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Clone)]
struct StubState {
    hits: Arc<AtomicUsize>,
    png: Arc<Vec<u8>>,
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

async fn handler(State(state): State<StubState>, req: Request) -> Response {
    match req.uri().path() {
        "/img.png" => {
            state.hits.fetch_add(1, Ordering::SeqCst);
            Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(state.png.as_ref().clone()))
                .unwrap()
        }
        "/zero.png" => Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .unwrap(),
        "/bad.jpg" => Response::builder()
            .status(StatusCode::OK)
            .body(Body::from(&b"this is not an image"[..]))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap(),
    }
}

async fn spawn_stub(png: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = StubState {
        hits: hits.clone(),
        png: Arc::new(png),
    };
    let app = Router::new().fallback(handler).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), hits)
}

fn create_fetcher(max_dimension: u32) -> (TempDir, Fetcher) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::new(temp_dir.path(), 1024 * 1024).unwrap());
    (temp_dir, Fetcher::with_limits(store, max_dimension, 80.0))
}

fn remote_ref(base: &str, file: &str) -> ImageRef {
    let config = Arc::new(SourceConfig::webdav(base, "", "", ""));
    ImageRef::new(
        format!("{base}/{file}"),
        config,
        1_700_000_000_000,
        2048,
    )
}

fn no_tmp_left(fetcher: &Fetcher) -> bool {
    std::fs::read_dir(fetcher.cache().dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .all(|entry| !entry.file_name().to_string_lossy().ends_with(".tmp"))
}

#[tokio::test]
async fn test_fetch_downloads_transcodes_and_commits() {
    let (base, hits) = spawn_stub(png_bytes(64, 48)).await;
    let (_temp_dir, fetcher) = create_fetcher(16);
    let reference = remote_ref(&base, "img.png");

    let artifact = fetcher.materialize(&reference).await.unwrap();

    assert!(artifact.starts_with(fetcher.cache().dir()));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // L'artefact est un WebP réduit sous la borne demandée
    let (width, height) = image::image_dimensions(&artifact).unwrap();
    assert_eq!((width, height), (16, 12));

    // Aucun transitoire ne survit au succès
    assert!(no_tmp_left(&fetcher));
    assert_eq!(fetcher.cache().len().await, 1);
}

#[tokio::test]
async fn test_second_fetch_hits_cache_without_download() {
    let (base, hits) = spawn_stub(png_bytes(32, 32)).await;
    let (_temp_dir, fetcher) = create_fetcher(1920);
    let reference = remote_ref(&base, "img.png");

    let first = fetcher.materialize(&reference).await.unwrap();
    let second = fetcher.materialize(&reference).await.unwrap();

    assert_eq!(first, second);
    // Le second accès passe entièrement par le cache
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_zero_byte_download_cleans_up_and_reports_absence() {
    let (base, _hits) = spawn_stub(png_bytes(8, 8)).await;
    let (_temp_dir, fetcher) = create_fetcher(1920);
    let reference = remote_ref(&base, "zero.png");

    assert!(fetcher.materialize(&reference).await.is_none());

    let key = fingerprint(&reference.locator, reference.last_modified, reference.byte_size);
    assert!(!fetcher.cache().dir().join(format!("{key}_raw.tmp")).exists());
    assert!(!fetcher
        .cache()
        .dir()
        .join(format!("{key}_processed.tmp"))
        .exists());
    assert_eq!(fetcher.cache().len().await, 0);
}

#[tokio::test]
async fn test_undecodable_payload_reports_absence() {
    let (base, _hits) = spawn_stub(png_bytes(8, 8)).await;
    let (_temp_dir, fetcher) = create_fetcher(1920);
    let reference = remote_ref(&base, "bad.jpg");

    assert!(fetcher.materialize(&reference).await.is_none());
    assert!(no_tmp_left(&fetcher));
    assert_eq!(fetcher.cache().len().await, 0);
}

#[tokio::test]
async fn test_http_error_reports_absence() {
    let (base, _hits) = spawn_stub(png_bytes(8, 8)).await;
    let (_temp_dir, fetcher) = create_fetcher(1920);
    let reference = remote_ref(&base, "does-not-exist.png");

    assert!(fetcher.materialize(&reference).await.is_none());
    assert!(no_tmp_left(&fetcher));
}

#[tokio::test]
async fn test_local_reference_short_circuits_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let local_image = dir.path().join("wall.jpg");
    std::fs::write(&local_image, b"raw jpeg").unwrap();

    let (_cache_dir, fetcher) = create_fetcher(1920);
    let config = Arc::new(SourceConfig::local(dir.path().to_string_lossy()));
    let reference = ImageRef::new(local_image.to_string_lossy(), config, 0, 8);

    let artifact = fetcher.materialize(&reference).await.unwrap();
    assert_eq!(artifact, local_image);
    // Les fichiers locaux sont affichés directement, jamais copiés en cache
    assert_eq!(fetcher.cache().len().await, 0);
}

#[tokio::test]
async fn test_corrupt_cached_artifact_is_replaced() {
    let (base, hits) = spawn_stub(png_bytes(24, 24)).await;
    let (_temp_dir, fetcher) = create_fetcher(1920);
    let reference = remote_ref(&base, "img.png");

    // Un artefact corrompu préexiste sous la clé de cette référence
    let key = fingerprint(&reference.locator, reference.last_modified, reference.byte_size);
    let mut garbage = std::io::Cursor::new(b"corrupted artifact".to_vec());
    fetcher.cache().put_from_stream(&key, &mut garbage).await.unwrap();
    assert!(fetcher.cache().has(&key).await);

    let artifact = fetcher.materialize(&reference).await.unwrap();

    // Le corrompu a été jeté puis remplacé par un vrai téléchargement
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(image::image_dimensions(&artifact).is_ok());
    assert_eq!(fetcher.cache().len().await, 1);
}
