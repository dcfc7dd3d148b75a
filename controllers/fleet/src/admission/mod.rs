//! Admission: defaulting and validation of Bale and Turtle writes.

pub mod validation;
pub mod versions;
pub mod webhook;

pub use webhook::{serve, webhook_router, WebhookState};
