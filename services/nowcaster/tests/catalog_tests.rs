//! Catalog lookback behavior against a stub archive index.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};

use nowcaster::catalog::CatalogClient;

struct Archive {
    hits: AtomicUsize,
    /// Day of month whose index has entries; all other days look empty.
    populated_day: u32,
}

async fn listing(
    State(archive): State<Arc<Archive>>,
    Path((_year, _month, day)): Path<(i32, u32, u32)>,
) -> String {
    archive.hits.fetch_add(1, Ordering::SeqCst);
    if day == archive.populated_day {
        concat!(
            "<html><body>",
            "<a href=\"grid_202505091145.nc\">grid_202505091145.nc</a>\n",
            "<a href=\"grid_202505091130.nc\">grid_202505091130.nc</a>\n",
            "</body></html>",
        )
        .to_string()
    } else {
        "<html><body>Index of day</body></html>".to_string()
    }
}

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn catalog(base_url: String, lookback_hours: u32) -> CatalogClient {
    CatalogClient::new(
        reqwest::Client::new(),
        base_url,
        "user".to_string(),
        "secret".to_string(),
        lookback_hours,
    )
}

#[tokio::test]
async fn test_lookback_walks_to_previous_day() {
    let archive = Arc::new(Archive {
        hits: AtomicUsize::new(0),
        populated_day: 9,
    });
    let router = Router::new()
        .route("/:year/:month/:day/", get(listing))
        .with_state(archive.clone());
    let base_url = spawn(router).await;
    let catalog = catalog(base_url, 12);

    let now = Utc.with_ymd_and_hms(2025, 5, 10, 5, 30, 0).unwrap();
    let listing = catalog
        .find_latest(now)
        .await
        .unwrap()
        .expect("day 9 has data");

    assert_eq!((listing.year, listing.month, listing.day), (2025, 5, 9));
    assert_eq!(
        listing.files,
        vec!["grid_202505091130.nc", "grid_202505091145.nc"]
    );
    // Six hourly probes land on day 10, the seventh crosses midnight into
    // day 9 and stops the walk.
    assert_eq!(archive.hits.load(Ordering::SeqCst), 7);
}

#[tokio::test]
async fn test_lookback_exhausts_after_configured_hours() {
    let archive = Arc::new(Archive {
        hits: AtomicUsize::new(0),
        populated_day: 0,
    });
    let router = Router::new()
        .route("/:year/:month/:day/", get(listing))
        .with_state(archive.clone());
    let base_url = spawn(router).await;
    let catalog = catalog(base_url, 12);

    let now = Utc.with_ymd_and_hms(2025, 5, 10, 5, 30, 0).unwrap();
    let result = catalog.find_latest(now).await.unwrap();

    assert!(result.is_none());
    assert_eq!(archive.hits.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn test_absent_day_lists_empty() {
    // No routes at all: every listing request is a 404.
    let base_url = spawn(Router::new()).await;
    let catalog = catalog(base_url, 12);

    let files = catalog.list_files(2025, 5, 10).await.unwrap();
    assert!(files.is_empty());
}
