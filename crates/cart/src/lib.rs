//! `rentworks-cart` — per-user staging area for prospective rental lines.

pub mod cart;

pub use cart::{
    AddLine, Cart, CartCommand, CartEvent, CartId, CartLine, Checkout, RemoveLine, UpdateLine,
};
