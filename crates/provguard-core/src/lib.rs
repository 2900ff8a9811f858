//! Provguard core — bus, data model, clock, scheduling, and configuration.
//!
//! Everything in the health engine talks through the [`bus::MessageBus`];
//! the types in [`types`] are the records that flow over it and into the
//! audit trail.

pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod ticker;
pub mod types;
pub mod utils;

pub use bus::{BusEvent, MessageBus, Subscription, SubscriptionId, Topic};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Error, Result};
pub use ticker::{PeriodicTask, TaskHandle};
