use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Geometry primitives
// ────────────────────────────────────────────────────────────────────────────

/// A point (or translation) in 3-D space, in metres.
///
/// Field names match `geometry_msgs/Point` so the type serialises to the
/// same JSON a rosbridge server emits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or `None` for the zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        (n > f64::EPSILON).then(|| self.scale(1.0 / n))
    }

    /// Euclidean distance between two points.
    pub fn distance(self, other: Self) -> f64 {
        self.sub(other).norm()
    }

    /// Linear interpolation, `t = 0` yields `self`, `t = 1` yields `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self.add(other.sub(self).scale(t))
    }
}

/// A rotation quaternion in ROS component order (`x, y, z, w`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }

    /// Rotation of `angle_rad` about `axis`.  A zero axis yields the identity.
    pub fn from_axis_angle(axis: Point, angle_rad: f64) -> Self {
        let Some(axis) = axis.normalized() else {
            return Self::identity();
        };
        let (s, c) = (angle_rad * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Four-component dot product.
    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit quaternion, or `None` when the norm is (close to) zero.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        (n > f64::EPSILON).then(|| Self::new(self.x / n, self.y / n, self.z / n, self.w / n))
    }

    /// Hamilton product: `self` applied after `rhs`.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotate a vector: p' = q * p * q*.
    pub fn rotate(self, v: Point) -> Point {
        let p = Self::new(v.x, v.y, v.z, 0.0);
        let r = self.mul(p).mul(self.conjugate());
        Point::new(r.x, r.y, r.z)
    }

    /// Normalised linear interpolation along the shorter arc.
    pub fn nlerp(self, other: Self, t: f64) -> Self {
        let other = if self.dot(other) < 0.0 {
            Self::new(-other.x, -other.y, -other.z, -other.w)
        } else {
            other
        };
        let mixed = Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
            self.w + (other.w - self.w) * t,
        );
        mixed.normalized().unwrap_or(self)
    }
}

/// Position plus orientation (`geometry_msgs/Pose`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Point, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Flatten to `[x, y, z, qx, qy, qz, qw]`.
    pub fn to_list(&self) -> [f64; 7] {
        let p = self.position;
        let q = self.orientation;
        [p.x, p.y, p.z, q.x, q.y, q.z, q.w]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stamped messages
// ────────────────────────────────────────────────────────────────────────────

/// A ROS time stamp.  Accepts both the ROS 1 (`secs`/`nsecs`) and ROS 2
/// (`sec`/`nanosec`) spellings when deserialising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Time {
    #[serde(alias = "sec")]
    pub secs: u32,
    #[serde(alias = "nanosec")]
    pub nsecs: u32,
}

impl Time {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(t: DateTime<Utc>) -> Self {
        Self {
            secs: u32::try_from(t.timestamp()).unwrap_or(0),
            nsecs: t.timestamp_subsec_nanos(),
        }
    }
}

/// `std_msgs/Header`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub stamp: Time,
    #[serde(default)]
    pub frame_id: String,
}

impl Header {
    /// A header for `frame_id` stamped with the current wall-clock time.
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            seq: 0,
            stamp: Time::now(),
            frame_id: frame_id.into(),
        }
    }
}

/// `geometry_msgs/PoseStamped`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseStamped {
    #[serde(default)]
    pub header: Header,
    pub pose: Pose,
}

impl PoseStamped {
    pub fn new(header: Header, pose: Pose) -> Self {
        Self { header, pose }
    }
}

/// `geometry_msgs/PoseArray`: an ordered set of poses sharing one header.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseArray {
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub poses: Vec<Pose>,
}

impl PoseArray {
    /// Pair every pose with the array header, preserving order.
    pub fn stamped(&self) -> impl Iterator<Item = PoseStamped> + '_ {
        self.poses
            .iter()
            .map(|pose| PoseStamped::new(self.header.clone(), *pose))
    }
}

/// A planned (and executed) Cartesian end-effector path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trajectory {
    pub header: Header,
    pub waypoints: Vec<Pose>,
}

// ────────────────────────────────────────────────────────────────────────────
// Bus envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "hemi-middleware::rosbridge/hemisphere_pose_array"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped now.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    PoseStamped(PoseStamped),
    PoseArray(PoseArray),
    Trajectory(Trajectory),
}

impl EventPayload {
    /// Short name of the carried message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::PoseStamped(_) => "PoseStamped",
            EventPayload::PoseArray(_) => "PoseArray",
            EventPayload::Trajectory(_) => "Trajectory",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every `hemi` crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HemiError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Timed out waiting for a message on {topic}")]
    Timeout { topic: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Helper process error: {0}")]
    Helper(String),

    #[error("Report Error: {0}")]
    Report(String),

    #[error("Missing input: {0}")]
    MissingInput(String),
}
