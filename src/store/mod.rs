pub mod json;

pub use json::{JsonNotificationStore, JsonSubscriptionStore};
