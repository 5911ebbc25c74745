//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into four [`Topic`] lanes:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::MiddlePoint`] | Hemisphere centre (`PoseStamped`), published once per run |
//! | [`Topic::PoseArray`] | Sampled viewpoints (`PoseArray`), published once per run |
//! | [`Topic::PointAfterPoint`] | The goal currently being approached, for visualisation |
//! | [`Topic::DisplayPlannedPath`] | Executed trajectories, for visualisation |
//!
//! Channels do not latch: a message published before anyone subscribed is
//! gone.  Subscribe first, then trigger the publisher.

use std::fmt;
use std::time::Duration;

use hemi_types::{Event, HemiError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Centre of the viewing hemisphere.
    MiddlePoint,
    /// The full set of viewpoints to visit.
    PoseArray,
    /// Each goal right before the arm moves to it.
    PointAfterPoint,
    /// Trajectories produced by the motion backend.
    DisplayPlannedPath,
}

impl Topic {
    /// Every lane, in declaration order.
    pub const ALL: [Topic; 4] = [
        Topic::MiddlePoint,
        Topic::PoseArray,
        Topic::PointAfterPoint,
        Topic::DisplayPlannedPath,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::MiddlePoint => "middle_point",
            Topic::PoseArray => "pose_array",
            Topic::PointAfterPoint => "point_after_point",
            Topic::DisplayPlannedPath => "display_planned_path",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    middle_point: broadcast::Sender<Event>,
    pose_array: broadcast::Sender<Event>,
    point_after_point: broadcast::Sender<Event>,
    display_planned_path: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (middle_point, _) = broadcast::channel(capacity);
        let (pose_array, _) = broadcast::channel(capacity);
        let (point_after_point, _) = broadcast::channel(capacity);
        let (display_planned_path, _) = broadcast::channel(capacity);
        Self {
            middle_point,
            pose_array,
            point_after_point,
            display_planned_path,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `0` when no subscribers are currently listening on the topic;
    /// visualisation topics routinely have nobody listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::MiddlePoint => &self.middle_point,
            Topic::PoseArray => &self.pose_array,
            Topic::PointAfterPoint => &self.point_after_point,
            Topic::DisplayPlannedPath => &self.display_planned_path,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Block until the next event arrives, skipping over lag gaps.
    ///
    /// With `timeout` set, gives up after that long with
    /// [`HemiError::Timeout`]; with `None` waits indefinitely.
    pub async fn wait_for_message(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Event, HemiError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.next_event())
                .await
                .map_err(|_| HemiError::Timeout {
                    topic: self.topic.to_string(),
                })?,
            None => self.next_event().await,
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    async fn next_event(&mut self) -> Result<Event, HemiError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(HemiError::Channel(format!("topic {} closed", self.topic)));
                }
            }
        }
    }
}
