use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use rentworks_cart::Cart;
use rentworks_catalog::{EquipmentId, ItemRef};
use rentworks_infra::projections::{DiscountReadModel, EquipmentReadModel, RentalReadModel};
use rentworks_pricing::{RateTable, RentalDuration};
use rentworks_rentals::RentalLine;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterEquipmentRequest {
    pub name: String,
    pub category: String,
    pub rates: RateTable,
    pub initial_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRatesRequest {
    pub rates: RateTable,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterPackageRequest {
    pub name: String,
    pub rates: RateTable,
    pub equipment: Vec<EquipmentId>,
}

#[derive(Debug, Deserialize)]
pub struct AddCartLineRequest {
    pub item: ItemRef,
    pub quantity: u32,
    pub duration: RentalDuration,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartLineRequest {
    pub quantity: u32,
    pub duration: RentalDuration,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub deposit: u64,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscountRequest {
    pub code: String,
    pub rate_percent: u8,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub max_usage: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DisableDiscountRequest {
    pub reason: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

fn item_to_json(item: ItemRef) -> JsonValue {
    serde_json::to_value(item).unwrap_or(JsonValue::Null)
}

fn duration_to_json(duration: RentalDuration) -> JsonValue {
    serde_json::to_value(duration).unwrap_or(JsonValue::Null)
}

pub fn equipment_to_json(rm: EquipmentReadModel) -> JsonValue {
    serde_json::json!({
        "id": rm.equipment_id.to_string(),
        "name": rm.name,
        "category": rm.category,
        "rates": {
            "per_day": rm.rates.per_day,
            "per_week": rm.rates.per_week,
            "per_month": rm.rates.per_month,
        },
        "stock": rm.stock,
    })
}

pub fn cart_to_json(cart: &Cart) -> JsonValue {
    serde_json::json!({
        "lines": cart.lines().iter().map(|l| serde_json::json!({
            "line_id": l.line_id.to_string(),
            "item": item_to_json(l.item),
            "quantity": l.quantity,
            "duration": duration_to_json(l.duration),
            "price": l.price,
        })).collect::<Vec<_>>(),
        "total": cart.total(),
    })
}

fn rental_lines_to_json(lines: &[RentalLine]) -> Vec<JsonValue> {
    lines
        .iter()
        .map(|l| {
            serde_json::json!({
                "item": item_to_json(l.item),
                "quantity": l.quantity,
                "duration": duration_to_json(l.duration),
                "price": l.price,
            })
        })
        .collect()
}

pub fn rental_to_json(rm: RentalReadModel) -> JsonValue {
    serde_json::json!({
        "id": rm.rental_id.to_string(),
        "customer_id": rm.customer.to_string(),
        "status": rm.status.as_str(),
        "lines": rental_lines_to_json(&rm.lines),
        "start_date": rm.start_date.to_rfc3339(),
        "end_date": rm.end_date.to_rfc3339(),
        "total": rm.total,
        "deposit": rm.deposit,
        "address": rm.address,
    })
}

pub fn discount_to_json(rm: DiscountReadModel) -> JsonValue {
    serde_json::json!({
        "id": rm.discount_id.to_string(),
        "code": rm.code,
        "rate_percent": rm.rate_percent,
        "valid_from": rm.valid_from.to_rfc3339(),
        "valid_to": rm.valid_to.to_rfc3339(),
        "max_usage": rm.max_usage,
        "usage": rm.usage,
        "active": rm.active,
    })
}
