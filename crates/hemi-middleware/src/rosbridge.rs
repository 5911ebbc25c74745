//! Rosbridge v2 client.
//!
//! [`RosbridgeClient`] connects to a `rosbridge_server` WebSocket and mirrors
//! the internal [`EventBus`] onto a ROS graph:
//!
//! * **Inbound** – `subscribe`s to the middle-point and pose-array ROS topics
//!   and republishes every incoming `publish` frame on [`Topic::MiddlePoint`]
//!   / [`Topic::PoseArray`].
//!
//! * **Outbound** – `advertise`s the point-after-point and planned-path ROS
//!   topics and forwards every bus event on [`Topic::PointAfterPoint`] /
//!   [`Topic::DisplayPlannedPath`] as a `publish` frame.
//!
//! Trajectories travel as `geometry_msgs/PoseArray` (one pose per waypoint)
//! so any RViz instance can draw them without MoveIt message definitions.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hemi_types::{Event, EventPayload, HemiError, PoseArray, PoseStamped};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};

/// Topics received from ROS.
pub const INBOUND_TOPICS: [Topic; 2] = [Topic::MiddlePoint, Topic::PoseArray];

/// Topics sent to ROS.
pub const OUTBOUND_TOPICS: [Topic; 2] = [Topic::PointAfterPoint, Topic::DisplayPlannedPath];

/// ROS message type carried by each bus lane.
pub fn ros_type(topic: Topic) -> &'static str {
    match topic {
        Topic::MiddlePoint | Topic::PointAfterPoint => "geometry_msgs/PoseStamped",
        Topic::PoseArray | Topic::DisplayPlannedPath => "geometry_msgs/PoseArray",
    }
}

/// Mapping from bus lanes to ROS topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosTopicMap {
    pub middle_point: String,
    pub pose_array: String,
    pub point_after_point: String,
    pub display_planned_path: String,
}

impl Default for RosTopicMap {
    fn default() -> Self {
        Self {
            middle_point: "/middle_point_hemisphere".to_string(),
            pose_array: "/hemisphere_pose_array".to_string(),
            point_after_point: "/hemisphere_point_after_point".to_string(),
            display_planned_path: "/hemisphere_planned_path".to_string(),
        }
    }
}

impl RosTopicMap {
    /// ROS topic name for a bus lane.
    pub fn ros_name(&self, topic: Topic) -> &str {
        match topic {
            Topic::MiddlePoint => &self.middle_point,
            Topic::PoseArray => &self.pose_array,
            Topic::PointAfterPoint => &self.point_after_point,
            Topic::DisplayPlannedPath => &self.display_planned_path,
        }
    }

    /// Bus lane for a ROS topic name, if it is one we route.
    pub fn topic_for(&self, ros_name: &str) -> Option<Topic> {
        Topic::ALL
            .into_iter()
            .find(|topic| self.ros_name(*topic) == ros_name)
    }
}

/// Bridge between a rosbridge WebSocket and the internal [`EventBus`].
#[derive(Clone)]
pub struct RosbridgeClient {
    bus: Arc<EventBus>,
    topics: RosTopicMap,
}

impl RosbridgeClient {
    /// Create a new client backed by `bus`.
    pub fn new(bus: Arc<EventBus>, topics: RosTopicMap) -> Self {
        Self { bus, topics }
    }

    /// `subscribe` frames for inbound topics followed by `advertise` frames
    /// for outbound ones.
    pub fn handshake_frames(&self) -> Vec<String> {
        let subscribes = INBOUND_TOPICS.into_iter().map(|topic| {
            json!({
                "op": "subscribe",
                "topic": self.topics.ros_name(topic),
                "type": ros_type(topic),
            })
        });
        let advertises = OUTBOUND_TOPICS.into_iter().map(|topic| {
            json!({
                "op": "advertise",
                "topic": self.topics.ros_name(topic),
                "type": ros_type(topic),
            })
        });
        subscribes
            .chain(advertises)
            .map(|frame| frame.to_string())
            .collect()
    }

    /// Translate a frame received from rosbridge into a bus event.
    ///
    /// Returns the number of bus receivers handed the event.  Frames that are
    /// not `publish` ops on an inbound topic are ignored (`Ok(0)`).
    ///
    /// # Errors
    ///
    /// [`HemiError::Serialization`] when the frame is not JSON or the `msg`
    /// does not match the topic's message type.
    pub fn handle_incoming_frame(&self, text: &str) -> Result<usize, HemiError> {
        let frame: Value =
            serde_json::from_str(text).map_err(|e| HemiError::Serialization(e.to_string()))?;

        if frame.get("op").and_then(Value::as_str) != Some("publish") {
            return Ok(0);
        }
        let ros_name = frame.get("topic").and_then(Value::as_str).unwrap_or("");
        let Some(topic) = self.topics.topic_for(ros_name) else {
            debug!(topic = ros_name, "ignoring frame on unrouted topic");
            return Ok(0);
        };
        if !INBOUND_TOPICS.contains(&topic) {
            return Ok(0);
        }

        let msg = frame.get("msg").cloned().unwrap_or(Value::Null);
        let payload = match topic {
            Topic::MiddlePoint => EventPayload::PoseStamped(
                serde_json::from_value::<PoseStamped>(msg)
                    .map_err(|e| HemiError::Serialization(format!("{ros_name}: {e}")))?,
            ),
            _ => EventPayload::PoseArray(
                serde_json::from_value::<PoseArray>(msg)
                    .map_err(|e| HemiError::Serialization(format!("{ros_name}: {e}")))?,
            ),
        };

        let event = Event::new(format!("hemi-middleware::rosbridge{ros_name}"), payload);
        Ok(self.bus.publish_to(topic, event))
    }

    /// Encode a bus event as a rosbridge `publish` frame for `topic`.
    pub fn encode_outbound(&self, topic: Topic, event: &Event) -> Result<String, HemiError> {
        let msg = match &event.payload {
            EventPayload::PoseStamped(pose) => serde_json::to_value(pose),
            EventPayload::PoseArray(array) => serde_json::to_value(array),
            EventPayload::Trajectory(trajectory) => serde_json::to_value(PoseArray {
                header: trajectory.header.clone(),
                poses: trajectory.waypoints.clone(),
            }),
        }
        .map_err(|e| HemiError::Serialization(e.to_string()))?;

        Ok(json!({
            "op": "publish",
            "topic": self.topics.ros_name(topic),
            "msg": msg,
        })
        .to_string())
    }

    /// Turn the result of an outbound bus receive into a frame to send.
    ///
    /// Lag is logged and skipped; a closed bus ends the bridge.
    fn outbound_frame(
        &self,
        topic: Topic,
        received: Result<Event, broadcast::error::RecvError>,
    ) -> Result<Option<String>, HemiError> {
        match received {
            Ok(event) => self.encode_outbound(topic, &event).map(Some),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(topic = %topic, lagged_by = n, "rosbridge outbound lagged");
                Ok(None)
            }
            Err(broadcast::error::RecvError::Closed) => {
                Err(HemiError::Channel(format!("topic {topic} closed")))
            }
        }
    }

    /// Connect to `url` and pump frames until either side closes.
    ///
    /// # Errors
    ///
    /// [`HemiError::Channel`] when the connection cannot be established or a
    /// send fails.
    pub async fn run(self, url: &str) -> Result<(), HemiError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| HemiError::Channel(format!("rosbridge connect to {url}: {e}")))?;
        info!(url, "connected to rosbridge");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        for frame in self.handshake_frames() {
            ws_tx
                .send(Message::Text(frame.into()))
                .await
                .map_err(|e| HemiError::Channel(format!("rosbridge send: {e}")))?;
        }

        let mut goals = self.bus.subscribe_to(Topic::PointAfterPoint);
        let mut paths = self.bus.subscribe_to(Topic::DisplayPlannedPath);

        loop {
            let outbound = tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_incoming_frame(text.as_str()) {
                                warn!(error = %e, "dropping malformed rosbridge frame");
                            }
                            None
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            return Err(HemiError::Channel(format!("rosbridge receive: {e}")));
                        }
                        _ => None,
                    }
                }
                received = goals.recv() => self.outbound_frame(Topic::PointAfterPoint, received)?,
                received = paths.recv() => self.outbound_frame(Topic::DisplayPlannedPath, received)?,
            };

            if let Some(frame) = outbound {
                ws_tx
                    .send(Message::Text(frame.into()))
                    .await
                    .map_err(|e| HemiError::Channel(format!("rosbridge send: {e}")))?;
            }
        }

        info!(url, "rosbridge connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemi_types::{Header, Point, Pose, Quaternion, Trajectory};

    fn make_client() -> (Arc<EventBus>, RosbridgeClient) {
        let bus = Arc::new(EventBus::default());
        let client = RosbridgeClient::new(Arc::clone(&bus), RosTopicMap::default());
        (bus, client)
    }

    #[test]
    fn topic_map_roundtrips_names() {
        let map = RosTopicMap::default();
        for topic in Topic::ALL {
            assert_eq!(map.topic_for(map.ros_name(topic)), Some(topic));
        }
        assert_eq!(map.topic_for("/cmd_vel"), None);
    }

    #[test]
    fn handshake_subscribes_inbound_and_advertises_outbound() {
        let (_, client) = make_client();
        let frames: Vec<Value> = client
            .handshake_frames()
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0]["op"], "subscribe");
        assert_eq!(frames[0]["topic"], "/middle_point_hemisphere");
        assert_eq!(frames[0]["type"], "geometry_msgs/PoseStamped");
        assert_eq!(frames[1]["type"], "geometry_msgs/PoseArray");
        assert_eq!(frames[2]["op"], "advertise");
        assert_eq!(frames[3]["topic"], "/hemisphere_planned_path");
        assert_eq!(frames[3]["type"], "geometry_msgs/PoseArray");
    }

    #[test]
    fn default_outbound_topics_stay_off_move_group_namespace() {
        let map = RosTopicMap::default();
        for topic in OUTBOUND_TOPICS {
            assert!(
                !map.ros_name(topic).starts_with("/move_group/"),
                "{topic} must not advertise into a topic owned by the planner"
            );
        }
    }

    #[tokio::test]
    async fn incoming_pose_array_is_published_on_bus() {
        let (bus, client) = make_client();
        let mut rx = bus.subscribe_to(Topic::PoseArray);

        let frame = r#"{"op":"publish","topic":"/hemisphere_pose_array","msg":{
            "header":{"seq":1,"stamp":{"secs":0,"nsecs":0},"frame_id":"world"},
            "poses":[{"position":{"x":0.1,"y":0.2,"z":0.3},
                      "orientation":{"x":0,"y":0,"z":0,"w":1}}]}}"#;
        assert_eq!(client.handle_incoming_frame(frame).unwrap(), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.source, "hemi-middleware::rosbridge/hemisphere_pose_array");
        match event.payload {
            EventPayload::PoseArray(array) => {
                assert_eq!(array.header.frame_id, "world");
                assert_eq!(array.poses.len(), 1);
                assert!((array.poses[0].position.z - 0.3).abs() < 1e-12);
            }
            other => panic!("expected PoseArray, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn incoming_middle_point_is_published_on_bus() {
        let (bus, client) = make_client();
        let mut rx = bus.subscribe_to(Topic::MiddlePoint);

        let frame = r#"{"op":"publish","topic":"/middle_point_hemisphere","msg":{
            "header":{"frame_id":"world"},
            "pose":{"position":{"x":0.4,"y":0,"z":0.1},
                    "orientation":{"x":0,"y":0,"z":0,"w":1}}}}"#;
        client.handle_incoming_frame(frame).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::PoseStamped(_)));
    }

    #[test]
    fn incoming_frames_on_other_topics_are_ignored() {
        let (bus, client) = make_client();
        let _rx = bus.subscribe_to(Topic::PointAfterPoint);

        // Outbound topic echoed back by the server.
        let echo = r#"{"op":"publish","topic":"/hemisphere_point_after_point","msg":{}}"#;
        assert_eq!(client.handle_incoming_frame(echo).unwrap(), 0);

        let status = r#"{"op":"status","level":"info","msg":"ok"}"#;
        assert_eq!(client.handle_incoming_frame(status).unwrap(), 0);

        let unknown = r#"{"op":"publish","topic":"/unknown","msg":{}}"#;
        assert_eq!(client.handle_incoming_frame(unknown).unwrap(), 0);
    }

    #[test]
    fn malformed_frames_are_serialization_errors() {
        let (_, client) = make_client();
        assert!(matches!(
            client.handle_incoming_frame("not json"),
            Err(HemiError::Serialization(_))
        ));

        let wrong_shape = r#"{"op":"publish","topic":"/hemisphere_pose_array","msg":{"poses":"nope"}}"#;
        assert!(matches!(
            client.handle_incoming_frame(wrong_shape),
            Err(HemiError::Serialization(_))
        ));
    }

    #[test]
    fn trajectory_is_encoded_as_pose_array() {
        let (_, client) = make_client();
        let trajectory = Trajectory {
            header: Header::new("world"),
            waypoints: vec![
                Pose::new(Point::new(0.0, 0.0, 0.5), Quaternion::identity()),
                Pose::new(Point::new(0.1, 0.0, 0.5), Quaternion::identity()),
            ],
        };
        let event = Event::new("test", EventPayload::Trajectory(trajectory));

        let frame: Value =
            serde_json::from_str(&client.encode_outbound(Topic::DisplayPlannedPath, &event).unwrap())
                .unwrap();
        assert_eq!(frame["op"], "publish");
        assert_eq!(frame["topic"], "/hemisphere_planned_path");
        assert_eq!(frame["msg"]["poses"].as_array().unwrap().len(), 2);
        assert_eq!(frame["msg"]["header"]["frame_id"], "world");
    }

    #[test]
    fn outbound_frame_skips_lag_and_fails_on_close() {
        let (_, client) = make_client();
        let lagged = client.outbound_frame(
            Topic::PointAfterPoint,
            Err(broadcast::error::RecvError::Lagged(3)),
        );
        assert_eq!(lagged, Ok(None));

        let closed = client.outbound_frame(
            Topic::PointAfterPoint,
            Err(broadcast::error::RecvError::Closed),
        );
        assert!(matches!(closed, Err(HemiError::Channel(_))));
    }
}
