use axum::{Router, routing::get};

pub mod cart;
pub mod catalog;
pub mod discounts;
pub mod rentals;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/catalog", catalog::router())
        .nest("/cart", cart::router())
        .nest("/rentals", rentals::router())
        .nest("/discounts", discounts::router())
}
