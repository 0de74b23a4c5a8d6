use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use rentworks_auth::Role;
use rentworks_core::AggregateId;
use rentworks_rentals::RentalId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rentals).delete(clear_rentals))
        .route("/checkout", post(checkout))
        .route("/:id", get(get_rental))
        .route("/:id/confirm", post(confirm))
        .route("/:id/cancel", post(cancel))
        .route("/:id/return", post(return_rental))
}

/// Snapshot the caller's cart into a new pending rental.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<dto::CheckoutRequest>,
) -> axum::response::Response {
    let rental_id = match services.rental_checkout(
        caller.user_id(),
        body.start_date,
        body.end_date,
        body.deposit,
        body.address,
    ) {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": rental_id.to_string() })),
    )
        .into_response()
}

/// Confirm a pending rental, reserving stock (operator path).
pub async fn confirm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let rental_id = match parse_rental_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rental_confirm(rental_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Cancel a pending rental. Allowed for the owning customer or an operator.
pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let rental_id = match parse_rental_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(resp) = ensure_owner_or_operator(&services, &caller, rental_id) {
        return resp;
    }

    match services.rental_cancel(rental_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Record the return of a confirmed rental, releasing its stock.
pub async fn return_rental(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = crate::authz::require_role(&caller, Role::Operator) {
        return resp;
    }

    let rental_id = match parse_rental_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rental_return(rental_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_rental(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let rental_id = match parse_rental_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.rental_read(&rental_id) {
        Some(rm) if rm.customer == caller.user_id() || caller.has_role(Role::Operator) || caller.has_role(Role::Admin) => {
            (StatusCode::OK, Json(dto::rental_to_json(rm))).into_response()
        }
        // Hide other users' rentals behind the same not-found response.
        _ => errors::json_error(StatusCode::NOT_FOUND, "not_found", "rental not found"),
    }
}

pub async fn list_rentals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    let rentals: Vec<_> = services
        .rentals_list_for_user(caller.user_id())
        .into_iter()
        .map(dto::rental_to_json)
        .collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "rentals": rentals })),
    )
        .into_response()
}

/// Void every open rental owned by the caller (confirmed stock released).
pub async fn clear_rentals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    let voided = services.rentals_clear_for_user(caller.user_id());
    (
        StatusCode::OK,
        Json(serde_json::json!({ "voided": voided })),
    )
        .into_response()
}

fn ensure_owner_or_operator(
    services: &AppServices,
    caller: &CallerContext,
    rental_id: RentalId,
) -> Result<(), axum::response::Response> {
    if caller.has_role(Role::Operator) || caller.has_role(Role::Admin) {
        return Ok(());
    }

    let rental = services
        .rental_load(rental_id)
        .map_err(errors::dispatch_error_to_response)?;

    if rental.customer() == Some(caller.user_id()) {
        Ok(())
    } else {
        Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "not_owner",
            "not owner",
        ))
    }
}

fn parse_rental_id(id: &str) -> Result<RentalId, axum::response::Response> {
    id.parse::<AggregateId>().map(RentalId::new).map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid rental id")
    })
}
