use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Serialize, ToSchema)]
pub struct HealthData {
    pub status: String,
    /// `postgres` or `memory`.
    pub storage: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "OK", body = ApiResponse<HealthData>),
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthData>> {
    let (status, storage) = match &state.orm {
        Some(orm) => match orm.ping().await {
            Ok(()) => ("ok", "postgres"),
            Err(err) => {
                tracing::warn!(error = %err, "database ping failed");
                ("degraded", "postgres")
            }
        },
        None => ("ok", "memory"),
    };

    Json(ApiResponse::success(
        "Health check",
        HealthData {
            status: status.to_string(),
            storage: storage.to_string(),
        },
        Some(Meta::empty()),
    ))
}
