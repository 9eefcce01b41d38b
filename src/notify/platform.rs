//! Platform notification center boundary.
//!
//! The actual notification center (and its authorization model) lives
//! outside this process. The gateway only ever talks to this trait; the host
//! wires in the real platform and feeds user actions back through
//! `NotificationGateway::handle_platform_action`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AlertAction, AlertCategory};

/// A delivery request handed to the platform
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub id: String,
    pub title: String,
    pub body: String,
    pub category: AlertCategory,
    pub actions: Vec<AlertAction>,
    /// Scheduled delivery instant; None means immediately
    pub deliver_at: Option<DateTime<Utc>>,
}

/// Errors the platform can report
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The user revoked or never granted notification permission
    #[error("Notification authorization denied")]
    AuthorizationDenied,

    /// The platform rejected or dropped the request
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Boundary contract to the platform notification center.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Ask the platform for permission to post notifications.
    async fn request_authorization(&self) -> Result<bool, PlatformError>;

    /// Post one notification.
    async fn send(&self, request: NotificationRequest) -> Result<(), PlatformError>;
}

/// Headless platform that writes notifications to the log.
///
/// The standalone daemon has no notification center of its own; a host
/// embedding the engine swaps in its real platform at construction time.
#[derive(Default)]
pub struct LogPlatform;

impl LogPlatform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationPlatform for LogPlatform {
    async fn request_authorization(&self) -> Result<bool, PlatformError> {
        Ok(true)
    }

    async fn send(&self, request: NotificationRequest) -> Result<(), PlatformError> {
        let actions: Vec<&str> = request.actions.iter().map(|a| a.as_str()).collect();
        tracing::info!(
            id = %request.id,
            category = %request.category.as_str(),
            actions = ?actions,
            "[notify] {}: {}",
            request.title,
            request.body
        );
        Ok(())
    }
}

/// Recording platform for tests: captures requests, optionally fails.
#[derive(Default)]
pub struct MockPlatform {
    sent: Mutex<Vec<NotificationRequest>>,
    fail_delivery: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with an authorization error.
    pub fn revoke(&self) {
        self.fail_delivery.store(true, Ordering::SeqCst);
    }

    /// Restore deliveries after `revoke`.
    pub fn restore(&self) {
        self.fail_delivery.store(false, Ordering::SeqCst);
    }

    /// Requests sent so far, in delivery order.
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of deliveries so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationPlatform for MockPlatform {
    async fn request_authorization(&self) -> Result<bool, PlatformError> {
        Ok(!self.fail_delivery.load(Ordering::SeqCst))
    }

    async fn send(&self, request: NotificationRequest) -> Result<(), PlatformError> {
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(PlatformError::AuthorizationDenied);
        }
        self.sent.lock().unwrap().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> NotificationRequest {
        NotificationRequest {
            id: id.to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            category: AlertCategory::Reminder,
            actions: AlertCategory::Reminder.actions().to_vec(),
            deliver_at: None,
        }
    }

    #[tokio::test]
    async fn test_mock_platform_records_sends() {
        let platform = MockPlatform::new();
        platform.send(request("a1")).await.unwrap();
        platform.send(request("a2")).await.unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, "a1");
        assert_eq!(sent[1].id, "a2");
    }

    #[tokio::test]
    async fn test_mock_platform_revoke_and_restore() {
        let platform = MockPlatform::new();
        platform.revoke();

        assert!(!platform.request_authorization().await.unwrap());
        assert!(matches!(
            platform.send(request("a1")).await,
            Err(PlatformError::AuthorizationDenied)
        ));
        assert_eq!(platform.sent_count(), 0);

        platform.restore();
        platform.send(request("a1")).await.unwrap();
        assert_eq!(platform.sent_count(), 1);
    }
}
