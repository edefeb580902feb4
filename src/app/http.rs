use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::app::model::ImportOptions;
use crate::app::service::ImportService;
use crate::catalog::{EntryFilter, ReadStatus};
use crate::error::CatalogError;
use crate::resolver::ResolveOptions;
use crate::series::VolumeEntry;

pub const OWNER_HEADER: &str = "x-owner-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImportService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/imports", post(start_import))
        .route("/imports/:job_id", get(get_import).delete(delete_import))
        .route("/books", get(list_books).post(register_book))
        .route(
            "/books/:isbn",
            get(get_book).patch(update_book).delete(delete_book),
        )
        .route("/books/resolve/:isbn", get(resolve_book))
        .route("/series", get(list_series))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn missing_owner() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: format!("missing {OWNER_HEADER} header"),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let status = match &err {
            CatalogError::InvalidIdentifier(_) | CatalogError::EmptyBatch => {
                StatusCode::BAD_REQUEST
            }
            CatalogError::NotFound(_)
            | CatalogError::EntryNotFound(_)
            | CatalogError::JobNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::DuplicateEntry(_) => StatusCode::CONFLICT,
            CatalogError::Upstream { .. } | CatalogError::DownloadFailure(_) => {
                StatusCode::BAD_GATEWAY
            }
            CatalogError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %format!("{err:#}"), "request failed");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

fn owner(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(ApiError::missing_owner)
}

async fn start_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(options): Query<ImportOptions>,
    body: String,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let started = state.service.start_import(&owner, &body, options).await?;
    Ok((StatusCode::ACCEPTED, Json(started)).into_response())
}

async fn get_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let job = state.service.progress(&owner, job_id.trim()).await?;
    Ok(Json(job).into_response())
}

/// 204 whether or not the caller owned a job with this id.
async fn delete_import(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = owner(&headers)?;
    state.service.cleanup(&owner, job_id.trim()).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve_book(
    State(state): State<AppState>,
    Path(isbn): Path<String>,
    Query(options): Query<ResolveOptions>,
) -> Result<Response, ApiError> {
    let record = state.service.resolve(&isbn, options).await?;
    Ok(Json(record).into_response())
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    isbn: String,
    #[serde(default)]
    download_cover: bool,
}

async fn register_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let options = ResolveOptions {
        download_cover: req.download_cover,
    };
    let entry = state.service.register(&owner, &req.isbn, options).await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn list_books(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<EntryFilter>,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let books = state
        .service
        .search(&owner, &filter)
        .await?
        .into_iter()
        .map(|entry| VolumeEntry {
            volume: entry.volume(),
            entry,
        })
        .collect::<Vec<_>>();
    Ok(Json(books).into_response())
}

async fn get_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(isbn): Path<String>,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let entry = state.service.get(&owner, &isbn).await?;
    Ok(Json(VolumeEntry {
        volume: entry.volume(),
        entry,
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    read_status: ReadStatus,
}

async fn update_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(isbn): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    let entry = state
        .service
        .set_read_status(&owner, &isbn, req.read_status)
        .await?;
    Ok(Json(entry).into_response())
}

async fn delete_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(isbn): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = owner(&headers)?;
    state.service.delete(&owner, &isbn).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_series(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    Ok(Json(state.service.series(&owner).await?).into_response())
}

async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let owner = owner(&headers)?;
    Ok(Json(state.service.stats(&owner).await?).into_response())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt as _;

    use super::*;
    use crate::catalog::InMemoryCatalogStore;
    use crate::config::ImportConfig;
    use crate::resolver::cover::{CoverFetcher, FetchedImage};
    use crate::resolver::{MetadataResolver, MetadataSource, SourceHit, SourceRole};

    const KNOWN: &str = "9784063842760";

    struct OneBook;

    #[async_trait]
    impl MetadataSource for OneBook {
        fn name(&self) -> &'static str {
            "one-book"
        }

        fn role(&self) -> SourceRole {
            SourceRole::Bibliographic
        }

        async fn lookup(&self, isbn: &str) -> anyhow::Result<Option<SourceHit>> {
            Ok((isbn == KNOWN).then(|| SourceHit {
                title: Some("進撃の巨人 第1巻".to_string()),
                series: Some("進撃の巨人".to_string()),
                ..SourceHit::default()
            }))
        }
    }

    struct NoCovers;

    #[async_trait]
    impl CoverFetcher for NoCovers {
        async fn fetch(&self, url: &str, _max_bytes: usize) -> crate::error::Result<FetchedImage> {
            Err(CatalogError::DownloadFailure(url.to_string()))
        }
    }

    fn app() -> Router {
        app_with_delay(Duration::ZERO)
    }

    fn app_with_delay(inter_item_delay: Duration) -> Router {
        let sources: Vec<Arc<dyn MetadataSource>> = vec![Arc::new(OneBook)];
        let resolver = MetadataResolver::new(sources, Arc::new(NoCovers), 1024);
        let config = ImportConfig {
            inter_item_delay,
            ..ImportConfig::default()
        };
        let service = ImportService::new(
            Arc::new(InMemoryCatalogStore::new()),
            Arc::new(resolver),
            config,
        );
        router(AppState {
            service: Arc::new(service),
        })
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn get_as(uri: &str, owner: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(OWNER_HEADER, owner)
            .body(Body::empty())
            .unwrap()
    }

    fn request_as(method: &str, uri: &str, owner: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(OWNER_HEADER, owner)
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    fn register_req(isbn: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/books")
            .header(OWNER_HEADER, "owner-1")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"isbn":"{isbn}"}}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz() {
        let resp = app()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_then_duplicate() {
        let app = app();
        let (status, body) = send(&app, register_req("978-4-06-384276-0")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["isbn"], KNOWN);
        assert_eq!(body["read_status"], "unread");

        let (status, body) = send(&app, register_req(KNOWN)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "already registered");

        let (status, body) = send(&app, get_as("/books", "owner-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["volume"], 1);

        let (_, body) = send(&app, get_as("/stats", "owner-1")).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["unread"], 1);

        let (_, body) = send(&app, get_as("/series", "owner-1")).await;
        assert_eq!(body[0]["series_name"], "進撃の巨人");

        let (_, body) = send(&app, get_as("/stats", "owner-2")).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn maps_lookup_errors() {
        let app = app();
        let (status, _) = send(&app, register_req("9780000000002")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, get_as("/books/resolve/not-an-isbn", "owner-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid ISBN"));

        let (status, body) = send(&app, get_as("/books/resolve/4063842762", "owner-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isbn"], KNOWN);
    }

    #[tokio::test]
    async fn requires_owner_header() {
        let (status, _) = send(
            &app(),
            Request::get("/books").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn import_lifecycle() {
        let app = app();
        let req = Request::post("/imports")
            .header(OWNER_HEADER, "owner-1")
            .body(Body::from("no isbns here\n"))
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = Request::post("/imports")
            .header(OWNER_HEADER, "owner-1")
            .body(Body::from(format!("{KNOWN}\n9780000000002\n")))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["total"], 2);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let mut snapshot = Value::Null;
        for _ in 0..100 {
            let (status, body) = send(&app, get_as(&format!("/imports/{job_id}"), "owner-1")).await;
            assert_eq!(status, StatusCode::OK);
            snapshot = body;
            if snapshot["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(snapshot["status"], "completed");
        assert_eq!(snapshot["progress"]["succeeded"], 1);
        assert_eq!(snapshot["progress"]["failed"], 1);

        let uri = format!("/imports/{job_id}");
        let delete = || request_as("DELETE", &uri, "owner-1", Body::empty());
        assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, get_as(&format!("/imports/{job_id}"), "owner-1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn imports_are_scoped_to_their_owner() {
        let app = app_with_delay(Duration::from_millis(100));
        let req = request_as(
            "POST",
            "/imports",
            "alice",
            Body::from(format!("{KNOWN}\n{KNOWN}\n{KNOWN}\n{KNOWN}\n")),
        );
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let uri = format!("/imports/{}", body["job_id"].as_str().unwrap());

        let (status, _) = send(&app, get_as(&uri, "mallory")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, request_as("DELETE", &uri, "mallory", Body::empty())).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Request::delete(&uri).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, get_as(&uri, "alice")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "processing");

        let mut snapshot = Value::Null;
        for _ in 0..100 {
            let (status, body) = send(&app, get_as(&uri, "alice")).await;
            assert_eq!(status, StatusCode::OK);
            snapshot = body;
            if snapshot["status"] != "processing" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(snapshot["status"], "completed");
        assert_eq!(snapshot["progress"]["processed"], 4);
        assert_eq!(snapshot["progress"]["succeeded"], 1);
    }

    #[tokio::test]
    async fn books_can_be_marked_read_filtered_and_removed() {
        let app = app();
        assert_eq!(send(&app, register_req(KNOWN)).await.0, StatusCode::CREATED);
        let book = "/books/978-4-06-384276-0";

        let (status, body) = send(&app, get_as(book, "owner-1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isbn"], KNOWN);
        assert_eq!(body["volume"], 1);
        let (status, _) = send(&app, get_as(book, "owner-2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let read = || Body::from(r#"{"read_status":"read"}"#);
        let (status, body) = send(&app, request_as("PATCH", book, "owner-1", read())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["read_status"], "read");
        let (status, body) = send(&app, request_as("PATCH", book, "owner-2", read())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not in catalog"));

        let (_, body) = send(&app, get_as("/stats", "owner-1")).await;
        assert_eq!(body["read"], 1);
        assert_eq!(body["unread"], 0);

        let count = |body: Value| body.as_array().map(Vec::len);
        let (_, body) = send(&app, get_as("/books?status=read", "owner-1")).await;
        assert_eq!(count(body), Some(1));
        let (_, body) = send(&app, get_as("/books?status=unread", "owner-1")).await;
        assert_eq!(count(body), Some(0));
        // "巨人"
        let (_, body) = send(&app, get_as("/books?search=%E5%B7%A8%E4%BA%BA", "owner-1")).await;
        assert_eq!(count(body), Some(1));
        let (_, body) = send(&app, get_as("/books?search=naruto", "owner-1")).await;
        assert_eq!(count(body), Some(0));

        let delete = || request_as("DELETE", book, "owner-1", Body::empty());
        assert_eq!(send(&app, delete()).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, delete()).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, get_as(book, "owner-1")).await.0, StatusCode::NOT_FOUND);
        assert_eq!(send(&app, register_req(KNOWN)).await.0, StatusCode::CREATED);

        let (status, _) = send(&app, get_as("/books/not-an-isbn", "owner-1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
