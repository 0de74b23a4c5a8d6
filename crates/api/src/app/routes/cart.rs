use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use uuid::Uuid;

use rentworks_infra::command_dispatcher::DispatchError;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Cart routes are caller-scoped: every handler works on the calling user's
/// own cart, so no role checks beyond authentication.
pub fn router() -> Router {
    Router::new()
        .route("/", get(get_cart))
        .route("/lines", post(add_line))
        .route("/lines/:line_id", put(update_line).delete(remove_line))
}

pub async fn get_cart(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
) -> axum::response::Response {
    match services.cart_get(caller.user_id()) {
        Ok(cart) => (StatusCode::OK, Json(dto::cart_to_json(&cart))).into_response(),
        // A user who never added a line simply has an empty cart.
        Err(DispatchError::NotFound) => (
            StatusCode::OK,
            Json(serde_json::json!({ "lines": [], "total": 0 })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::AddCartLineRequest>,
) -> axum::response::Response {
    let line_id =
        match services.cart_add_line(caller.user_id(), body.item, body.quantity, body.duration) {
            Ok(id) => id,
            Err(e) => return errors::dispatch_error_to_response(e),
        };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "line_id": line_id.to_string() })),
    )
        .into_response()
}

pub async fn update_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(line_id): Path<String>,
    Json(body): Json<dto::UpdateCartLineRequest>,
) -> axum::response::Response {
    let line_id = match parse_line_id(&line_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.cart_update_line(caller.user_id(), line_id, body.quantity, body.duration) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn remove_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(line_id): Path<String>,
) -> axum::response::Response {
    let line_id = match parse_line_id(&line_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.cart_remove_line(caller.user_id(), line_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn parse_line_id(id: &str) -> Result<Uuid, axum::response::Response> {
    id.parse::<Uuid>()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid line id"))
}
