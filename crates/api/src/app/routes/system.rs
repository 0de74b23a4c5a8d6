use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(
    Extension(caller): Extension<crate::context::CallerContext>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "user_id": caller.user_id().to_string(),
        "roles": caller.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
    }))
}
