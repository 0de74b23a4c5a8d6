use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use rentworks_auth::Role;
use rentworks_catalog::EquipmentId;
use rentworks_core::AggregateId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/equipment", post(register_equipment).get(list_equipment))
        .route("/equipment/:id", get(get_equipment))
        .route("/equipment/:id/rates", post(update_rates))
        .route("/equipment/:id/stock", post(adjust_stock))
        .route("/packages", post(register_package))
}

pub async fn register_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::RegisterEquipmentRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let equipment_id = match services.register_equipment(
        body.name,
        body.category,
        body.rates,
        body.initial_stock,
    ) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": equipment_id.to_string() })),
    )
        .into_response()
}

pub async fn update_rates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateRatesRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let equipment_id = match parse_equipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.update_rates(equipment_id, body.rates) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Manual stock correction (restock or shrinkage); reservations go through
/// the rental lifecycle instead.
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let equipment_id = match parse_equipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.adjust_stock(equipment_id, body.delta) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn register_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<crate::context::CallerContext>,
    Json(body): Json<dto::RegisterPackageRequest>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let package_id = match services.register_package(body.name, body.rates, body.equipment) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": package_id.to_string() })),
    )
        .into_response()
}

pub async fn get_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let equipment_id = match parse_equipment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.equipment_get(&equipment_id) {
        Some(rm) => (StatusCode::OK, Json(dto::equipment_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "equipment not found"),
    }
}

pub async fn list_equipment(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let items: Vec<_> = services
        .equipment_list()
        .into_iter()
        .map(dto::equipment_to_json)
        .collect();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

fn parse_equipment_id(id: &str) -> Result<EquipmentId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(EquipmentId::new)
        .map_err(|_| {
            errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid equipment id")
        })
}
