//! Message bus — typed topics, payloads, and the synchronous pub/sub hub.

pub mod queue;
pub mod types;

pub use queue::{Handler, MessageBus, Subscription, SubscriptionId};
pub use types::{
    BusEvent, MitigationTriggered, ProviderBlacklisted, ProviderFailure, ProviderRestored,
    ProviderSuccess, StrategyChange, Topic,
};
