//! `rentworks-rentals` — rental orders and their lifecycle state machine.
//!
//! A rental is created from a cart checkout with immutable line snapshots and
//! moves `pending -> confirmed | canceled`, `confirmed -> completed` (return)
//! under explicit operator actions. Stock is reserved/released by the
//! reservation coordinator in the infra layer, never by the aggregate itself.

pub mod rental;

pub use rental::{
    CancelRental, ConfirmRental, OpenRental, Rental, RentalCommand, RentalEvent, RentalId,
    RentalLine, RentalStatus, ReturnRental, VoidRental,
};
