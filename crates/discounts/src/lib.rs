//! `rentworks-discounts` — time-boxed, usage-limited discount codes.
//!
//! A discount is created with a validity window and an optional redemption
//! cap, accrues usage through `RecordRedemption`, and is disabled either by
//! an operator or by the daily sweep once its window or cap is spent.

pub mod discount;

pub use discount::{
    CreateDiscount, DisableDiscount, Discount, DiscountCommand, DiscountEvent, DiscountId,
    RecordRedemption,
};
