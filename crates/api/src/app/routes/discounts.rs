use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};

use rentworks_auth::Role;
use rentworks_core::AggregateId;
use rentworks_discounts::DiscountId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_discount).get(list_discounts))
        .route("/:id/disable", post(disable_discount))
        .route("/:id/redeem", post(redeem_discount))
}

pub async fn create_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::CreateDiscountRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Admin) {
        return resp;
    }

    let discount_id = match services.discount_create(
        body.code,
        body.rate_percent,
        body.valid_from,
        body.valid_to,
        body.max_usage,
    ) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": discount_id.to_string() })),
    )
        .into_response()
}

pub async fn disable_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DisableDiscountRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Admin) {
        return resp;
    }

    let discount_id = match parse_discount_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let reason = body.reason.unwrap_or_else(|| "disabled by admin".to_string());
    match services.discount_disable(discount_id, &reason) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Record one redemption against the usage cap.
pub async fn redeem_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let discount_id = match parse_discount_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.discount_redeem(discount_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_discounts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let discounts: Vec<_> = services
        .discounts_list_active()
        .into_iter()
        .map(dto::discount_to_json)
        .collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "discounts": discounts })),
    )
        .into_response()
}

fn parse_discount_id(id: &str) -> Result<DiscountId, axum::response::Response> {
    id.parse::<AggregateId>().map(DiscountId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid discount id")
    })
}
