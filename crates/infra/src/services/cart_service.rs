use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use rentworks_cart::{AddLine, Cart, CartCommand, CartId, Checkout, RemoveLine, UpdateLine};
use rentworks_catalog::{Equipment, EquipmentId, EquipmentPackage, ItemRef, PackageId};
use rentworks_core::{AggregateRoot, UserId};
use rentworks_events::{EventBus, EventEnvelope};
use rentworks_pricing::{RentalDuration, line_price};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

use super::CART_AGGREGATE;

/// Cart orchestration: price lookup + cart commands.
///
/// Prices are resolved at mutation time from the item's current rate table,
/// then frozen on the line; later rate changes do not reprice carts.
pub struct CartService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> Clone for CartService<S, B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S, B> CartService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Price one prospective line from the item's current rates.
    pub fn price_item(&self, item: ItemRef, duration: RentalDuration) -> Result<u64, DispatchError> {
        let rates = match item {
            ItemRef::Equipment(equipment_id) => {
                let equipment = self
                    .dispatcher
                    .load::<Equipment>(equipment_id.0, |id| Equipment::empty(EquipmentId::new(id)))?;
                if equipment.version() == 0 {
                    return Err(DispatchError::NotFound);
                }
                equipment.rates()
            }
            ItemRef::Package(package_id) => {
                let package = self.dispatcher.load::<EquipmentPackage>(package_id.0, |id| {
                    EquipmentPackage::empty(PackageId::new(id))
                })?;
                if package.version() == 0 {
                    return Err(DispatchError::NotFound);
                }
                package.rates()
            }
        };

        line_price(&rates, duration).map_err(DispatchError::from)
    }

    /// Add a line to the caller's cart; opens the cart on first use.
    ///
    /// Returns the new line's identifier.
    pub fn add_line(
        &self,
        caller: UserId,
        item: ItemRef,
        quantity: u32,
        duration: RentalDuration,
    ) -> Result<Uuid, DispatchError> {
        let price = self.price_item(item, duration)?;
        let cart_id = CartId::for_user(caller);
        let line_id = Uuid::now_v7();

        self.dispatcher.dispatch::<Cart>(
            cart_id.0,
            CART_AGGREGATE,
            CartCommand::AddLine(AddLine {
                cart_id,
                caller,
                line_id,
                item,
                quantity,
                duration,
                price,
                occurred_at: Utc::now(),
            }),
            |id| Cart::empty(CartId::new(id)),
        )?;

        Ok(line_id)
    }

    /// Update a line's quantity and duration; the price is recomputed from
    /// the item's current rates.
    pub fn update_line(
        &self,
        caller: UserId,
        line_id: Uuid,
        quantity: u32,
        duration: RentalDuration,
    ) -> Result<(), DispatchError> {
        let cart_id = CartId::for_user(caller);
        let cart = self.load_cart(cart_id)?;
        let line = cart
            .lines()
            .iter()
            .find(|l| l.line_id == line_id)
            .ok_or(DispatchError::NotFound)?;

        let price = self.price_item(line.item, duration)?;

        self.dispatcher.dispatch::<Cart>(
            cart_id.0,
            CART_AGGREGATE,
            CartCommand::UpdateLine(UpdateLine {
                cart_id,
                caller,
                line_id,
                quantity,
                duration,
                price,
                occurred_at: Utc::now(),
            }),
            |id| Cart::empty(CartId::new(id)),
        )?;

        Ok(())
    }

    pub fn remove_line(&self, caller: UserId, line_id: Uuid) -> Result<(), DispatchError> {
        let cart_id = CartId::for_user(caller);
        self.dispatcher.dispatch::<Cart>(
            cart_id.0,
            CART_AGGREGATE,
            CartCommand::RemoveLine(RemoveLine {
                cart_id,
                caller,
                line_id,
                occurred_at: Utc::now(),
            }),
            |id| Cart::empty(CartId::new(id)),
        )?;
        Ok(())
    }

    /// Consume the caller's cart lines (used by checkout).
    pub fn checkout(&self, caller: UserId) -> Result<(), DispatchError> {
        let cart_id = CartId::for_user(caller);
        self.dispatcher.dispatch::<Cart>(
            cart_id.0,
            CART_AGGREGATE,
            CartCommand::Checkout(Checkout {
                cart_id,
                caller,
                occurred_at: Utc::now(),
            }),
            |id| Cart::empty(CartId::new(id)),
        )?;
        Ok(())
    }

    /// Strongly consistent cart read for the caller.
    pub fn get_cart(&self, caller: UserId) -> Result<Cart, DispatchError> {
        let cart = self.load_cart(CartId::for_user(caller))?;
        if cart.owner().is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(cart)
    }

    fn load_cart(&self, cart_id: CartId) -> Result<Cart, DispatchError> {
        self.dispatcher
            .load::<Cart>(cart_id.0, |id| Cart::empty(CartId::new(id)))
    }
}
