//! Record fan-out
//!
//! - Out-of-band notification through a delivery channel
//! - Real-time broadcast to attached subscribers

mod broadcast;
mod notifier;

pub use broadcast::{Broadcaster, LiveUpdate};
pub use notifier::{DeliveryChannel, Notifier, OutboundMessage, WebhookDelivery};
