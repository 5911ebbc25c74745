//! `hemi-middleware` – topic plumbing.
//!
//! Moves pose messages between the sequencer, the pose generator and the
//! outside world without caring about what the poses mean.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`rosbridge`] – Client for a rosbridge v2 WebSocket server that mirrors
//!   bus topics to and from a ROS graph as JSON.

pub mod bus;
pub mod rosbridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use rosbridge::{RosTopicMap, RosbridgeClient};
