//! Daily discount sweep.
//!
//! A background worker that periodically walks the discount read model and,
//! per discount, independently:
//!
//! - disables discounts whose validity window has passed
//! - warns admins when a capped discount is nearly spent
//! - emails the upcoming-discount notice shortly before a window opens
//!
//! Every action is log-and-continue: one bad discount never stops the sweep,
//! and a failed action is retried on the next tick.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use rentworks_discounts::DiscountId;
use rentworks_events::{EventBus, EventEnvelope};
use rentworks_notify::{MailGateway, NotificationGateway, notify_admins_best_effort};

use crate::event_store::EventStore;
use crate::projections::DiscountsProjection;
use crate::read_model::ReadStore;
use crate::services::DiscountService;
use crate::workers::WorkerHandle;

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often the sweep runs.
    pub interval: Duration,
    /// Admins are warned when a capped discount has at most this many
    /// redemptions left.
    pub warning_threshold: u32,
    /// The upcoming-discount notice goes out when a window opens within
    /// this lead time.
    pub upcoming_notice: chrono::Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            warning_threshold: 5,
            upcoming_notice: chrono::Duration::hours(24),
        }
    }
}

/// Counters for one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub warnings: usize,
    pub notices: usize,
}

/// One sweep over the discount read model.
///
/// Warnings and notices fire once per discount per process lifetime; after
/// a restart they may repeat, which is acceptable for advisory messages.
pub struct DiscountSweep<S, B, R>
where
    R: ReadStore<DiscountId, crate::projections::DiscountReadModel>,
{
    config: SweepConfig,
    discounts: Arc<DiscountsProjection<R>>,
    service: DiscountService<S, B>,
    notifications: Arc<dyn NotificationGateway>,
    mail: Arc<dyn MailGateway>,
    warned: Mutex<HashSet<DiscountId>>,
    announced: Mutex<HashSet<DiscountId>>,
}

impl<S, B, R> DiscountSweep<S, B, R>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    R: ReadStore<DiscountId, crate::projections::DiscountReadModel>,
{
    pub fn new(
        config: SweepConfig,
        discounts: Arc<DiscountsProjection<R>>,
        service: DiscountService<S, B>,
        notifications: Arc<dyn NotificationGateway>,
        mail: Arc<dyn MailGateway>,
    ) -> Self {
        Self {
            config,
            discounts,
            service,
            notifications,
            mail,
            warned: Mutex::new(HashSet::new()),
            announced: Mutex::new(HashSet::new()),
        }
    }

    /// Run one full sweep at `now`.
    pub fn run_once(&self, now: DateTime<Utc>) -> SweepStats {
        let mut stats = SweepStats::default();

        for discount in self.discounts.list_active() {
            let id = discount.discount_id;

            // Expiry pass.
            if now > discount.valid_to {
                match self.service.disable(id, "validity window expired") {
                    Ok(()) => {
                        info!(discount_id = %id, code = %discount.code, "discount expired");
                        stats.expired += 1;
                    }
                    Err(err) => {
                        warn!(discount_id = %id, error = ?err, "failed to expire discount");
                    }
                }
                // An expired discount gets no warning or notice.
                continue;
            }

            // Usage-limit warning pass.
            if let Some(remaining) = discount.remaining_uses()
                && remaining <= self.config.warning_threshold
                && self.mark_once(&self.warned, id)
            {
                notify_admins_best_effort(
                    self.notifications.as_ref(),
                    &format!(
                        "discount {} has {} redemption(s) left",
                        discount.code, remaining
                    ),
                );
                stats.warnings += 1;
            }

            // Upcoming-discount notice pass.
            if discount.valid_from > now
                && discount.valid_from - now <= self.config.upcoming_notice
                && self.mark_once(&self.announced, id)
            {
                if let Err(err) = self.mail.send_upcoming_discount_email(
                    &discount.code,
                    discount.rate_percent,
                    discount.valid_from,
                ) {
                    warn!(discount_id = %id, error = %err, "failed to send upcoming discount email");
                } else {
                    stats.notices += 1;
                }
            }
        }

        stats
    }

    /// Insert into a fired-once set; false when already present.
    fn mark_once(&self, set: &Mutex<HashSet<DiscountId>>, id: DiscountId) -> bool {
        match set.lock() {
            Ok(mut guard) => guard.insert(id),
            Err(_) => false,
        }
    }
}

/// Background scheduler driving a `DiscountSweep` on its configured interval.
pub struct DiscountScheduler;

impl DiscountScheduler {
    /// Spawn the sweep loop. The first pass runs immediately.
    pub fn spawn<S, B, R>(sweep: DiscountSweep<S, B, R>) -> WorkerHandle
    where
        S: EventStore + Send + Sync + 'static,
        B: EventBus<EventEnvelope<JsonValue>> + Send + Sync + 'static,
        R: ReadStore<DiscountId, crate::projections::DiscountReadModel> + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let interval = sweep.config.interval;

        let join = thread::Builder::new()
            .name("discount-sweep".to_string())
            .spawn(move || {
                loop {
                    let stats = sweep.run_once(Utc::now());
                    info!(
                        expired = stats.expired,
                        warnings = stats.warnings,
                        notices = stats.notices,
                        "discount sweep finished"
                    );

                    // Sleep until the next tick, waking early on shutdown.
                    match shutdown_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    }
                }
            })
            .expect("failed to spawn discount sweep thread");

        WorkerHandle::from_parts(shutdown_tx, join)
    }
}
