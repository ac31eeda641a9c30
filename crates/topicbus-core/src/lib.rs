//! # topicbus Core
//!
//! Hierarchical, in-process publish/subscribe for decoupled components.
//!
//! This crate provides:
//! - A subscription registry keyed by dot-delimited topics (`"a.b.c"`)
//! - Upward propagation: a message to `"a.b.c"` also reaches `"a.b"` and `"a"`
//! - A last-message cache replayed to late subscribers
//! - Request/response (`call`/`answer`) built on ephemeral reply topics
//!
//! ## Example
//!
//! ```rust,no_run
//! use topicbus_core::{Bus, PublishOptions};
//!
//! # async fn demo() -> Result<(), topicbus_core::CallError> {
//! let bus = Bus::new();
//! let handle = bus.clone();
//! let responder = bus.subscriber(move |msg| {
//!     msg.answer(&handle, msg.payload.clone());
//! });
//! responder.subscribe(["math.echo"]);
//!
//! let reply = bus.call_timeout("math.echo", "hi".into(), std::time::Duration::from_secs(1)).await?;
//! assert_eq!(reply, "hi");
//!
//! bus.publish_to("system.status", "up".into(), PublishOptions::default().persisted());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod call;
pub mod config;
pub mod error;
pub mod message;
mod registry;
pub mod subscriber;
pub mod topic;

pub use bus::Bus;
pub use config::BusConfig;
pub use error::CallError;
pub use message::{Message, Payload, PublishOptions};
pub use subscriber::{Subscriber, SubscriberId};
pub use topic::{ancestors, Ancestors, ReplyTopics};
