//! `rentworks-notify` — outbound user and admin notifications.
//!
//! Delivery is best-effort and post-commit: a failed send is logged and never
//! rolls back the state change that triggered it.

use chrono::{DateTime, Utc};
use rentworks_core::UserId;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
}

/// In-app notification delivery.
pub trait NotificationGateway: Send + Sync {
    fn send(&self, user: UserId, message: &str) -> Result<(), NotifyError>;

    fn send_to_admins(&self, message: &str) -> Result<(), NotifyError>;
}

/// Outbound email delivery.
pub trait MailGateway: Send + Sync {
    fn send_upcoming_discount_email(
        &self,
        code: &str,
        rate_percent: u8,
        starts_at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;
}

/// Send a user notification, logging (not propagating) failures.
pub fn notify_best_effort(gateway: &dyn NotificationGateway, user: UserId, message: &str) {
    if let Err(error) = gateway.send(user, message) {
        tracing::warn!(%user, %error, "user notification failed");
    }
}

/// Send an admin broadcast, logging (not propagating) failures.
pub fn notify_admins_best_effort(gateway: &dyn NotificationGateway, message: &str) {
    if let Err(error) = gateway.send_to_admins(message) {
        tracing::warn!(%error, "admin notification failed");
    }
}

/// Recording gateway for tests and local runs; also serves as the default
/// transport until a real provider is wired in.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    user_messages: Mutex<Vec<(UserId, String)>>,
    admin_messages: Mutex<Vec<String>>,
    emails: Mutex<Vec<String>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_messages(&self) -> Vec<(UserId, String)> {
        self.user_messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn admin_messages(&self) -> Vec<String> {
        self.admin_messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn emails(&self) -> Vec<String> {
        self.emails
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl NotificationGateway for RecordingGateway {
    fn send(&self, user: UserId, message: &str) -> Result<(), NotifyError> {
        let mut guard = self
            .user_messages
            .lock()
            .map_err(|_| NotifyError::Transport("gateway poisoned".to_string()))?;
        guard.push((user, message.to_string()));
        Ok(())
    }

    fn send_to_admins(&self, message: &str) -> Result<(), NotifyError> {
        let mut guard = self
            .admin_messages
            .lock()
            .map_err(|_| NotifyError::Transport("gateway poisoned".to_string()))?;
        guard.push(message.to_string());
        Ok(())
    }
}

impl MailGateway for RecordingGateway {
    fn send_upcoming_discount_email(
        &self,
        code: &str,
        rate_percent: u8,
        starts_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        let mut guard = self
            .emails
            .lock()
            .map_err(|_| NotifyError::Transport("gateway poisoned".to_string()))?;
        guard.push(format!(
            "upcoming discount {code} ({rate_percent}%) starts {starts_at}"
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingGateway;

    impl NotificationGateway for FailingGateway {
        fn send(&self, _user: UserId, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("smtp down".to_string()))
        }

        fn send_to_admins(&self, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("smtp down".to_string()))
        }
    }

    #[test]
    fn recording_gateway_captures_messages() {
        let gateway = RecordingGateway::new();
        let user = UserId::new();

        gateway.send(user, "your rental is confirmed").unwrap();
        gateway.send_to_admins("discount LOW5 almost spent").unwrap();

        assert_eq!(
            gateway.user_messages(),
            vec![(user, "your rental is confirmed".to_string())]
        );
        assert_eq!(
            gateway.admin_messages(),
            vec!["discount LOW5 almost spent".to_string()]
        );
    }

    #[test]
    fn best_effort_helpers_swallow_transport_errors() {
        let gateway = FailingGateway;
        notify_best_effort(&gateway, UserId::new(), "hello");
        notify_admins_best_effort(&gateway, "hello");
    }

    #[test]
    fn mail_gateway_records_upcoming_discount_email() {
        let gateway = RecordingGateway::new();
        gateway
            .send_upcoming_discount_email("SPRING10", 10, Utc::now())
            .unwrap();
        assert_eq!(gateway.emails().len(), 1);
        assert!(gateway.emails()[0].contains("SPRING10"));
    }
}
