//! Compatibility surface for components built on single-property
//! subscriptions.

mod subscriber_manager;

pub use subscriber_manager::{LegacySubscriber, SubscriberManager};
