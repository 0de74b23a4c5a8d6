use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use rentworks_cart::Cart;
use rentworks_core::{AggregateId, UserId};
use rentworks_events::{EventBus, EventEnvelope};
use rentworks_notify::{NotificationGateway, notify_best_effort};
use rentworks_rentals::{
    CancelRental, ConfirmRental, OpenRental, Rental, RentalCommand, RentalId, RentalLine,
    RentalStatus, ReturnRental, VoidRental,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::{RentalReadModel, RentalsProjection};
use crate::read_model::ReadStore;

use super::{CartService, RENTAL_AGGREGATE, ReservationCoordinator};

/// Rental lifecycle orchestration.
///
/// Stock is touched only here, through the reservation coordinator:
/// reserved on confirm, released on return (and on void of a confirmed
/// rental). Pending and canceled rentals never held stock.
pub struct RentalService<S, B, R>
where
    R: ReadStore<RentalId, RentalReadModel>,
{
    dispatcher: Arc<CommandDispatcher<S, B>>,
    carts: CartService<S, B>,
    reservations: ReservationCoordinator<S, B>,
    rentals: Arc<RentalsProjection<R>>,
    notifications: Arc<dyn NotificationGateway>,
}

impl<S, B, R> RentalService<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: ReadStore<RentalId, RentalReadModel>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        rentals: Arc<RentalsProjection<R>>,
        notifications: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            carts: CartService::new(Arc::clone(&dispatcher)),
            reservations: ReservationCoordinator::new(Arc::clone(&dispatcher)),
            dispatcher,
            rentals,
            notifications,
        }
    }

    /// Checkout: snapshot the caller's cart into a pending rental, then
    /// empty the cart.
    pub fn checkout(
        &self,
        caller: UserId,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        deposit: u64,
        address: String,
    ) -> Result<RentalId, DispatchError> {
        let cart: Cart = self.carts.get_cart(caller)?;
        if cart.lines().is_empty() {
            return Err(DispatchError::Validation(
                "cannot checkout an empty cart".to_string(),
            ));
        }

        let lines: Vec<RentalLine> = cart
            .lines()
            .iter()
            .map(|l| RentalLine {
                item: l.item,
                quantity: l.quantity,
                duration: l.duration,
                price: l.price,
            })
            .collect();
        let total = cart.total();

        let rental_id = RentalId::new(AggregateId::new());
        let now = Utc::now();
        self.dispatcher.dispatch::<Rental>(
            rental_id.0,
            RENTAL_AGGREGATE,
            RentalCommand::OpenRental(OpenRental {
                rental_id,
                customer: caller,
                lines,
                start_date,
                end_date,
                total,
                deposit,
                address,
                occurred_at: now,
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        // The rental exists; emptying the cart is idempotent and a failure
        // here must not lose the order.
        if let Err(err) = self.carts.checkout(caller) {
            warn!(%rental_id, error = ?err, "cart was not emptied after checkout");
        }

        notify_best_effort(
            self.notifications.as_ref(),
            caller,
            &format!("rental {rental_id} created, awaiting confirmation"),
        );

        Ok(rental_id)
    }

    /// Confirm a pending rental, reserving stock for every equipment line.
    ///
    /// All-or-nothing: if any line cannot be reserved, or the status
    /// transition itself fails, every already-reserved line is released and
    /// the rental stays pending.
    pub fn confirm(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        let rental = self.load_rental(rental_id)?;
        let equipment_lines = rental.equipment_lines();

        self.reservations.reserve_all(&equipment_lines)?;

        let confirmed = self.dispatcher.dispatch::<Rental>(
            rental_id.0,
            RENTAL_AGGREGATE,
            RentalCommand::ConfirmRental(ConfirmRental {
                rental_id,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        );

        if let Err(err) = confirmed {
            self.reservations.release_all(&equipment_lines);
            return Err(err);
        }

        if let Some(customer) = rental.customer() {
            notify_best_effort(
                self.notifications.as_ref(),
                customer,
                &format!("rental {rental_id} confirmed"),
            );
        }

        info!(%rental_id, "rental confirmed");
        Ok(())
    }

    /// Cancel a pending rental. Nothing was reserved, so no stock moves.
    pub fn cancel(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        let rental = self.load_rental(rental_id)?;

        self.dispatcher.dispatch::<Rental>(
            rental_id.0,
            RENTAL_AGGREGATE,
            RentalCommand::CancelRental(CancelRental {
                rental_id,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        if let Some(customer) = rental.customer() {
            notify_best_effort(
                self.notifications.as_ref(),
                customer,
                &format!("rental {rental_id} canceled"),
            );
        }

        Ok(())
    }

    /// Return a confirmed rental and release its reserved stock.
    pub fn return_rental(&self, rental_id: RentalId) -> Result<(), DispatchError> {
        let rental = self.load_rental(rental_id)?;

        self.dispatcher.dispatch::<Rental>(
            rental_id.0,
            RENTAL_AGGREGATE,
            RentalCommand::ReturnRental(ReturnRental {
                rental_id,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        // The rental is completed; releasing is retried line by line and
        // failures are logged, never rolled back into the status change.
        self.reservations.release_all(&rental.equipment_lines());

        Ok(())
    }

    /// Void every non-terminal rental owned by the caller.
    ///
    /// A confirmed rental releases its stock only once its void has
    /// committed, same order as `return_rental`: a failed void must leave
    /// the reservation in place or a retry would release the units twice.
    /// Individual failures are logged and skipped so one bad stream cannot
    /// wedge the bulk clear. Returns the number of rentals voided.
    pub fn clear_all_for_user(&self, caller: UserId) -> usize {
        let mut voided = 0;

        for summary in self.rentals.list_for_user(caller) {
            if summary.status.is_terminal() {
                continue;
            }

            let rental_id = summary.rental_id;
            let rental = match self.load_rental(rental_id) {
                Ok(r) => r,
                Err(err) => {
                    warn!(%rental_id, error = ?err, "skipping rental during bulk clear");
                    continue;
                }
            };
            let held_stock = rental.status() == RentalStatus::Confirmed;

            let result = self.dispatcher.dispatch::<Rental>(
                rental_id.0,
                RENTAL_AGGREGATE,
                RentalCommand::VoidRental(VoidRental {
                    rental_id,
                    caller,
                    occurred_at: Utc::now(),
                }),
                |id| Rental::empty(RentalId::new(id)),
            );

            match result {
                Ok(_) => {
                    if held_stock {
                        self.reservations.release_all(&rental.equipment_lines());
                    }
                    voided += 1;
                }
                Err(err) => {
                    warn!(%rental_id, error = ?err, "failed to void rental during bulk clear");
                }
            }
        }

        voided
    }

    /// Strongly consistent rental read.
    pub fn get_rental(&self, rental_id: RentalId) -> Result<Rental, DispatchError> {
        self.load_rental(rental_id)
    }

    fn load_rental(&self, rental_id: RentalId) -> Result<Rental, DispatchError> {
        let rental = self
            .dispatcher
            .load::<Rental>(rental_id.0, |id| Rental::empty(RentalId::new(id)))?;
        if rental.customer().is_none() {
            return Err(DispatchError::NotFound);
        }
        Ok(rental)
    }
}
