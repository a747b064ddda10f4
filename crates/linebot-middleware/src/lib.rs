//! `linebot-middleware` – event routing between behaviours and collaborators.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.  Behaviours publish recovery, obstacle and fault
//!   events; dashboard and voice layers subscribe.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
