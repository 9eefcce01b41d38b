//! Notification delivery: platform boundary and gateway state machine.

pub mod gateway;
pub mod platform;

pub use gateway::{GatewayConfig, GatewayEvent, NotificationGateway};
pub use platform::{
    LogPlatform, MockPlatform, NotificationPlatform, NotificationRequest, PlatformError,
};
