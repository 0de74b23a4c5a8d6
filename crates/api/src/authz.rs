//! API-side role guard for commands.
//!
//! This enforces authorization at the route boundary (before dispatch),
//! while keeping domain aggregates and infra auth-agnostic. Ownership of
//! carts and rentals is still enforced inside the aggregates.

use axum::http::StatusCode;

use rentworks_auth::Role;

use crate::app::errors;
use crate::context::CallerContext;

/// Check that the caller holds `required` (admins pass every check).
///
/// This is intended to be called **before** dispatching a command.
pub fn require_role(
    caller: &CallerContext,
    required: Role,
) -> Result<(), axum::response::Response> {
    if caller.has_role(Role::Admin) || caller.has_role(required) {
        return Ok(());
    }

    Err(errors::json_error(
        StatusCode::FORBIDDEN,
        "forbidden",
        format!("requires role {required}"),
    ))
}
