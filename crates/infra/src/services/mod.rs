//! Application services: command orchestration on top of the dispatcher.

pub mod cart_service;
pub mod catalog_service;
pub mod discount_service;
pub mod rental_service;
pub mod reservation;

pub use cart_service::CartService;
pub use catalog_service::CatalogService;
pub use discount_service::DiscountService;
pub use rental_service::RentalService;
pub use reservation::ReservationCoordinator;

/// Aggregate type identifiers used as stream metadata.
pub const EQUIPMENT_AGGREGATE: &str = "catalog.equipment";
pub const PACKAGE_AGGREGATE: &str = "catalog.package";
pub const CART_AGGREGATE: &str = "cart";
pub const RENTAL_AGGREGATE: &str = "rental";
pub const DISCOUNT_AGGREGATE: &str = "discount";
