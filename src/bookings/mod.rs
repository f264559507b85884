//! Booking creation (checkout + webhook) and the booking status lifecycle.

pub mod lifecycle;
pub mod orchestrator;

pub use lifecycle::{BookingLifecycle, LifecycleError};
pub use orchestrator::{CheckoutError, CheckoutOrchestrator, CheckoutSettings, WebhookAck};
