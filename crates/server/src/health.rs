use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use agendai_db::DbPool;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub readiness: Readiness,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub readiness: Readiness,
    pub runtime: ComponentHealth,
    pub database: ComponentHealth,
    pub checked_at: String,
}

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Binds the health listener on its own port and serves it from a
/// detached task, so a wedged webhook router cannot take probes down.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(event_name = "health.started", bind_address = %address, "health endpoint started");

    tokio::spawn(async move {
        if let Err(reason) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "health.terminated",
                error = %reason,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let database = probe_database(&state.db_pool).await;

    let report = HealthReport {
        readiness: database.readiness,
        runtime: ComponentHealth {
            readiness: Readiness::Ready,
            detail: "message pipeline running".to_string(),
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = match report.readiness {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

async fn probe_database(pool: &DbPool) -> ComponentHealth {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ComponentHealth {
            readiness: Readiness::Ready,
            detail: "database probe succeeded".to_string(),
        },
        Err(reason) => ComponentHealth {
            readiness: Readiness::Degraded,
            detail: format!("database probe failed: {reason}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};

    use agendai_db::connect_with_settings;

    use super::{health, HealthState, Readiness};

    #[tokio::test]
    async fn reports_ready_while_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.readiness, Readiness::Ready);
        assert_eq!(report.database.readiness, Readiness::Ready);

        pool.close().await;
    }

    #[tokio::test]
    async fn degrades_once_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.readiness, Readiness::Degraded);
        assert_eq!(report.database.readiness, Readiness::Degraded);
        assert_eq!(report.runtime.readiness, Readiness::Ready);
    }
}
