use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{error, info};

use crate::etl::Operation;
use crate::runner::{RunId, RunnerError, TaskRunner};
use crate::warehouse::WarehouseReader;
use tower_http::services::ServeDir;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{log_requests, state::*, ServerConfig};

const DEFAULT_PER_PAGE: i64 = 100;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn storage_error(err: anyhow::Error) -> Response {
    error!("Warehouse read failed: {:#}", err);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", err))
}

#[derive(Deserialize, Debug)]
struct PageQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Deserialize, Debug)]
struct ExecuteBody {
    command: String,
}

#[derive(Serialize)]
struct TablesResponse {
    tables: Vec<String>,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: state.version.clone(),
    };
    Json(stats)
}

async fn list_tables(State(reader): State<GuardedWarehouseReader>) -> Response {
    match reader.list_tables() {
        Ok(tables) => Json(TablesResponse { tables }).into_response(),
        Err(err) => storage_error(err),
    }
}

async fn get_table(
    State(reader): State<GuardedWarehouseReader>,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let page = query.page.unwrap_or(1);
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE);
    let (Ok(page), Ok(per_page)) = (u32::try_from(page), u32::try_from(per_page)) else {
        return error_response(StatusCode::BAD_REQUEST, "page and per_page must be positive");
    };
    if page < 1 || per_page < 1 {
        return error_response(StatusCode::BAD_REQUEST, "page and per_page must be positive");
    }

    match reader.table_page(&name, page, per_page) {
        Ok(Some(table_page)) => Json(table_page).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Unknown table: {}", name)),
        Err(err) => storage_error(err),
    }
}

async fn get_stats(State(reader): State<GuardedWarehouseReader>) -> Response {
    match reader.stats() {
        Ok(stats) => Json::<BTreeMap<String, i64>>(stats).into_response(),
        Err(err) => storage_error(err),
    }
}

async fn post_execute(State(runner): State<TaskRunner>, Json(body): Json<ExecuteBody>) -> Response {
    let operation: Operation = match body.command.parse() {
        Ok(op) => op,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid command"),
    };

    match runner.start(operation) {
        Ok(run_id) => Json(json!({
            "success": true,
            "message": "Task started in background",
            "running": true,
            "run_id": run_id,
        }))
        .into_response(),
        Err(err @ RunnerError::AlreadyRunning { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": err.to_string(),
                "running": true,
            })),
        )
            .into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

async fn get_execute_status(
    State(runner): State<TaskRunner>,
    Path(run_id): Path<RunId>,
) -> Response {
    match runner.status(run_id) {
        Some(record) => Json(record).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown run: {}", run_id)),
    }
}

async fn get_runs(State(runner): State<TaskRunner>) -> Response {
    Json(runner.list()).into_response()
}

pub fn make_app(config: ServerConfig, reader: WarehouseReader, runner: TaskRunner) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        reader: Arc::new(reader),
        runner,
        version: env!("CARGO_PKG_VERSION").to_owned(),
    };

    let api_routes: Router = Router::new()
        .route("/tables", get(list_tables))
        .route("/table/{name}", get(get_table))
        .route("/stats", get(get_stats))
        .route("/execute", post(post_execute))
        .route("/execute/status/{run_id}", get(get_execute_status))
        .route("/runs", get(get_runs))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve the dashboard until `shutdown` resolves.
pub async fn run_server(
    config: ServerConfig,
    reader: WarehouseReader,
    runner: TaskRunner,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, reader, runner);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Dashboard listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::EtlSettings;
    use crate::warehouse::{reset_schema, SqliteWarehouse};
    use axum::{body::Body, http::Request};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir, with_schema: bool) -> Router {
        let db_path = dir.path().join("sparkifydb.db");
        let mut warehouse = SqliteWarehouse::open(&db_path).unwrap();
        if with_schema {
            reset_schema(warehouse.connection_mut()).unwrap();
            warehouse
                .connection()
                .execute(
                    "INSERT INTO users VALUES (10, 'Ada', NULL, 'F', 'paid')",
                    [],
                )
                .unwrap();
        }
        drop(warehouse);

        let runner = TaskRunner::new(EtlSettings {
            db_path: db_path.clone(),
            song_data: dir.path().join("song_data"),
            log_data: dir.path().join("log_data"),
        });
        make_app(ServerConfig::default(), WarehouseReader::new(&db_path), runner)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn execute_request(command: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/execute")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "command": command }).to_string()))
            .unwrap()
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0d 00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 01:01:01");
    }

    #[tokio::test]
    async fn test_home_reports_version() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app(&dir, false), get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app(&dir, true), get_request("/api/tables")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["tables"],
            json!(["artists", "songplays", "songs", "time", "users"])
        );
    }

    #[tokio::test]
    async fn test_table_page() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app(&dir, true), get_request("/api/table/users")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["page"], 1);
        assert_eq!(body["per_page"], 100);
        assert_eq!(body["pages"], 1);
        assert_eq!(body["columns"][0], json!({"name": "user_id", "type": "INTEGER"}));
        assert_eq!(body["data"][0]["user_id"], "10");
        assert_eq!(body["data"][0]["last_name"], Value::Null);
    }

    #[tokio::test]
    async fn test_table_page_errors() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, true);

        let (status, _) = send(app.clone(), get_request("/api/table/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(app.clone(), get_request("/api/table/users?page=0")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app, get_request("/api/table/users?per_page=-5")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_without_schema() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app(&dir, false), get_request("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"artists": 0, "songplays": 0, "songs": 0, "time": 0, "users": 0})
        );
    }

    #[tokio::test]
    async fn test_execute_rejects_unknown_command() {
        let dir = TempDir::new().unwrap();
        let (status, body) = send(app(&dir, false), execute_request("rm -rf")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid command");
    }

    #[tokio::test]
    async fn test_execute_then_poll_status() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir, false);

        let (status, body) = send(app.clone(), execute_request("create_tables")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let run_id = body["run_id"].as_str().unwrap().to_string();

        let status_uri = format!("/api/execute/status/{}", run_id);
        let body = loop {
            let (status, body) = send(app.clone(), get_request(&status_uri)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "running" {
                break body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(body["status"], "succeeded");
        assert_eq!(body["operation"], "create_tables");
        assert_eq!(body["outcome"]["schema"], "created");

        let (_, runs) = send(app, get_request("/api/runs")).await;
        assert_eq!(runs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_of_unknown_run() {
        let dir = TempDir::new().unwrap();
        let uri = format!("/api/execute/status/{}", uuid::Uuid::new_v4());
        let (status, _) = send(app(&dir, false), get_request(&uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
