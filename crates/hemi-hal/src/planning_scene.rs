//! Generic `PlanningScene` trait: the collision objects a planner must keep
//! the arm away from.

use hemi_types::{HemiError, Point, PoseStamped};

/// A box-shaped collision object.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionBox {
    pub name: String,
    /// Centre of the box.
    pub pose: PoseStamped,
    /// Edge lengths along x, y, z in metres.
    pub size: [f64; 3],
}

impl CollisionBox {
    /// Create a box, rejecting non-positive edge lengths.
    pub fn new(name: &str, pose: &PoseStamped, size: [f64; 3]) -> Result<Self, HemiError> {
        if size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(HemiError::InvalidArgument(format!(
                "box '{name}' needs positive edge lengths, got {size:?}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            pose: pose.clone(),
            size,
        })
    }

    /// Whether `point` lies inside the box, treating it as axis aligned.
    pub fn contains(&self, point: Point) -> bool {
        let c = self.pose.pose.position;
        let [sx, sy, sz] = self.size;
        (point.x - c.x).abs() <= sx * 0.5
            && (point.y - c.y).abs() <= sy * 0.5
            && (point.z - c.z).abs() <= sz * 0.5
    }
}

/// Collision objects shared with the motion planner.
pub trait PlanningScene: Send {
    /// Remove every collision object.
    fn clear(&mut self);

    /// Add (or replace) a box named `name` centred at `pose`.
    ///
    /// # Errors
    ///
    /// Returns [`HemiError::InvalidArgument`] for non-positive sizes.
    fn add_box(&mut self, name: &str, pose: &PoseStamped, size: [f64; 3]) -> Result<(), HemiError>;

    /// Names of the objects currently in the scene, sorted.
    fn object_names(&self) -> Vec<String>;
}
