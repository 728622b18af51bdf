//! # Messaging
//!
//! The Bus Port (C1) and its supporting types: wire envelope, topic naming,
//! and the pluggable transport backend.

pub mod bus_port;
pub mod message;
pub mod provider;
pub mod router;

pub use bus_port::{BusPort, MessageHandler};
pub use message::{BusMessage, MessageHeaders};
pub use provider::MessagingBackend;
pub use router::{ResponseTopicConfig, TopicRouter};
