//! In-process simulated arm for headless runs and CI without a robot.
//!
//! [`SimWorld`] builds a [`SimMoveGroup`] and a [`SimPlanningScene`] that
//! share one set of collision objects.  The simulated planner rejects goals
//! outside a reach sphere or inside a collision box; everything else is
//! reached instantly, optionally with a fixed tracking error so tolerance
//! failures can be reproduced.
//!
//! # Example
//!
//! ```rust
//! use hemi_hal::{MoveGroup, SimWorld};
//! use hemi_types::{Header, Point, Pose, PoseStamped, Quaternion};
//!
//! let (mut arm, _scene) = SimWorld::new().with_reach(1.0).build();
//! let goal = PoseStamped::new(
//!     Header::new("world"),
//!     Pose::new(Point::new(0.3, 0.0, 0.4), Quaternion::identity()),
//! );
//! arm.go(&goal).expect("sim goal must be reachable");
//! assert_eq!(arm.current_pose().unwrap().pose, goal.pose);
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use hemi_types::{Header, HemiError, Point, Pose, PoseStamped, Quaternion, Trajectory};
use tracing::debug;

use crate::move_group::{MoveGroup, validate_scaling_factor};
use crate::planning_scene::{CollisionBox, PlanningScene};

type SharedScene = Arc<Mutex<BTreeMap<String, CollisionBox>>>;

fn lock(scene: &SharedScene) -> MutexGuard<'_, BTreeMap<String, CollisionBox>> {
    scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorld builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a simulated arm and its planning scene.
#[derive(Debug, Clone)]
pub struct SimWorld {
    group_name: String,
    frame_id: String,
    base: Point,
    reach: f64,
    home: Pose,
    position_error: f64,
    orientation_error: f64,
    waypoints: usize,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self {
            group_name: "manipulator".to_string(),
            frame_id: "world".to_string(),
            base: Point::default(),
            reach: 0.9,
            home: Pose::new(Point::new(0.3, 0.0, 0.5), Quaternion::identity()),
            position_error: 0.0,
            orientation_error: 0.0,
            waypoints: 10,
        }
    }
}

impl SimWorld {
    /// Create a builder with a 0.9 m reach arm based at the world origin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = name.into();
        self
    }

    /// Planning frame; goals stamped with another (non-empty) frame fail.
    pub fn with_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    /// Arm base position; the reach sphere is centred here.
    pub fn with_base(mut self, base: Point) -> Self {
        self.base = base;
        self
    }

    /// Radius of the reachable workspace around the base, in metres.
    pub fn with_reach(mut self, reach: f64) -> Self {
        self.reach = reach;
        self
    }

    /// Offset along +x between a goal and the pose actually reached.
    pub fn with_position_error(mut self, metres: f64) -> Self {
        self.position_error = metres;
        self
    }

    /// Rotation about z between a goal and the orientation actually reached.
    pub fn with_orientation_error(mut self, radians: f64) -> Self {
        self.orientation_error = radians;
        self
    }

    /// Number of waypoints in each executed path (at least 2).
    pub fn with_waypoints(mut self, waypoints: usize) -> Self {
        self.waypoints = waypoints.max(2);
        self
    }

    /// Consume the builder and return the arm and its scene.
    pub fn build(self) -> (SimMoveGroup, SimPlanningScene) {
        let scene: SharedScene = Arc::default();
        let arm = SimMoveGroup {
            current: self.home,
            scene: Arc::clone(&scene),
            velocity_scaling: 1.0,
            acceleration_scaling: 1.0,
            end_effector_link: String::new(),
            planning_time: Duration::from_secs(5),
            replanning: false,
            commanded: Vec::new(),
            world: self,
        };
        (arm, SimPlanningScene { scene })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated arm
// ────────────────────────────────────────────────────────────────────────────

/// A simulated planning group.  Records every goal it is sent.
pub struct SimMoveGroup {
    world: SimWorld,
    current: Pose,
    scene: SharedScene,
    velocity_scaling: f64,
    acceleration_scaling: f64,
    end_effector_link: String,
    planning_time: Duration,
    replanning: bool,
    commanded: Vec<PoseStamped>,
}

impl SimMoveGroup {
    pub fn velocity_scaling(&self) -> f64 {
        self.velocity_scaling
    }

    pub fn acceleration_scaling(&self) -> f64 {
        self.acceleration_scaling
    }

    pub fn end_effector_link(&self) -> &str {
        &self.end_effector_link
    }

    pub fn planning_time(&self) -> Duration {
        self.planning_time
    }

    pub fn replanning_allowed(&self) -> bool {
        self.replanning
    }

    /// Goals passed to [`MoveGroup::go`] so far, including failed ones.
    pub fn commanded(&self) -> &[PoseStamped] {
        &self.commanded
    }

    fn check_goal(&self, goal: &PoseStamped) -> Result<Quaternion, HemiError> {
        let frame = &goal.header.frame_id;
        if !frame.is_empty() && *frame != self.world.frame_id {
            return Err(HemiError::Planning(format!(
                "goal frame '{frame}' is unknown, planning frame is '{}'",
                self.world.frame_id
            )));
        }

        let orientation = goal.pose.orientation.normalized().ok_or_else(|| {
            HemiError::InvalidArgument("goal orientation is not a valid quaternion".to_string())
        })?;

        let target = goal.pose.position;
        let distance = target.distance(self.world.base);
        if distance > self.world.reach {
            return Err(HemiError::Planning(format!(
                "goal is outside the reachable workspace ({distance:.3} m > reach {:.3} m)",
                self.world.reach
            )));
        }

        if let Some(hit) = lock(&self.scene).values().find(|b| b.contains(target)) {
            return Err(HemiError::Planning(format!(
                "goal is in collision with '{}'",
                hit.name
            )));
        }

        Ok(orientation)
    }
}

impl MoveGroup for SimMoveGroup {
    fn name(&self) -> &str {
        &self.world.group_name
    }

    fn set_max_velocity_scaling_factor(&mut self, factor: f64) -> Result<(), HemiError> {
        self.velocity_scaling = validate_scaling_factor("velocity", factor)?;
        Ok(())
    }

    fn set_max_acceleration_scaling_factor(&mut self, factor: f64) -> Result<(), HemiError> {
        self.acceleration_scaling = validate_scaling_factor("acceleration", factor)?;
        Ok(())
    }

    fn set_end_effector_link(&mut self, link: &str) {
        self.end_effector_link = link.to_string();
    }

    fn set_planning_time(&mut self, budget: Duration) -> Result<(), HemiError> {
        if budget.is_zero() {
            return Err(HemiError::InvalidArgument(
                "planning time must be positive".to_string(),
            ));
        }
        self.planning_time = budget;
        Ok(())
    }

    fn allow_replanning(&mut self, allow: bool) {
        self.replanning = allow;
    }

    fn clear_pose_targets(&mut self) {
        self.commanded.clear();
    }

    fn go(&mut self, goal: &PoseStamped) -> Result<Trajectory, HemiError> {
        self.commanded.push(goal.clone());
        let orientation = self.check_goal(goal)?;

        let reached = Pose::new(
            goal.pose.position.add(Point::new(self.world.position_error, 0.0, 0.0)),
            orientation.mul(Quaternion::from_axis_angle(
                Point::new(0.0, 0.0, 1.0),
                self.world.orientation_error,
            )),
        );

        let start = self.current;
        let steps = self.world.waypoints.max(2);
        let waypoints = (0..steps)
            .map(|i| {
                if i + 1 == steps {
                    return reached;
                }
                let t = i as f64 / (steps - 1) as f64;
                Pose::new(
                    start.position.lerp(reached.position, t),
                    start.orientation.nlerp(reached.orientation, t),
                )
            })
            .collect();

        debug!(
            group = %self.world.group_name,
            x = reached.position.x,
            y = reached.position.y,
            z = reached.position.z,
            "sim goal reached"
        );
        self.current = reached;

        Ok(Trajectory {
            header: Header::new(self.world.frame_id.clone()),
            waypoints,
        })
    }

    fn current_pose(&self) -> Result<PoseStamped, HemiError> {
        Ok(PoseStamped::new(
            Header::new(self.world.frame_id.clone()),
            self.current,
        ))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated scene
// ────────────────────────────────────────────────────────────────────────────

/// Collision objects seen by the paired [`SimMoveGroup`].
pub struct SimPlanningScene {
    scene: SharedScene,
}

impl SimPlanningScene {
    /// Snapshot of the boxes currently in the scene.
    pub fn boxes(&self) -> Vec<CollisionBox> {
        lock(&self.scene).values().cloned().collect()
    }
}

impl PlanningScene for SimPlanningScene {
    fn clear(&mut self) {
        lock(&self.scene).clear();
    }

    fn add_box(&mut self, name: &str, pose: &PoseStamped, size: [f64; 3]) -> Result<(), HemiError> {
        let collision_box = CollisionBox::new(name, pose, size)?;
        lock(&self.scene).insert(name.to_string(), collision_box);
        Ok(())
    }

    fn object_names(&self) -> Vec<String> {
        lock(&self.scene).keys().cloned().collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn goal(x: f64, y: f64, z: f64) -> PoseStamped {
        PoseStamped::new(
            Header::new("world"),
            Pose::new(Point::new(x, y, z), Quaternion::identity()),
        )
    }

    #[test]
    fn sim_reaches_goal_inside_workspace() {
        let (mut arm, _scene) = SimWorld::new().with_waypoints(5).build();
        let target = goal(0.4, 0.1, 0.3);

        let trajectory = arm.go(&target).expect("reachable");
        assert_eq!(trajectory.waypoints.len(), 5);
        assert_eq!(trajectory.waypoints.last().copied(), Some(target.pose));
        assert_eq!(trajectory.waypoints[0].position, Point::new(0.3, 0.0, 0.5));
        assert_eq!(arm.current_pose().unwrap().pose, target.pose);
    }

    #[test]
    fn sim_rejects_goal_beyond_reach() {
        let (mut arm, _scene) = SimWorld::new().with_reach(0.5).build();
        let result = arm.go(&goal(0.6, 0.0, 0.0));
        assert!(matches!(result, Err(HemiError::Planning(_))));
        // A failed goal leaves the arm where it was.
        assert_eq!(arm.current_pose().unwrap().pose.position, Point::new(0.3, 0.0, 0.5));
        assert_eq!(arm.commanded().len(), 1);
    }

    #[test]
    fn reach_is_measured_from_the_base() {
        let (mut arm, _scene) = SimWorld::new()
            .with_base(Point::new(1.0, 0.0, 0.0))
            .with_reach(0.5)
            .build();
        assert!(matches!(
            arm.go(&goal(0.3, 0.0, 0.4)),
            Err(HemiError::Planning(_))
        ));
        arm.go(&goal(1.2, 0.0, 0.3)).expect("within reach of the moved base");
    }

    #[test]
    fn sim_rejects_goal_inside_collision_box() {
        let (mut arm, mut scene) = SimWorld::new().build();
        scene.add_box("box", &goal(0.4, 0.0, 0.1), [0.2, 0.2, 0.2]).unwrap();

        let err = arm.go(&goal(0.4, 0.0, 0.15)).unwrap_err();
        assert!(err.to_string().contains("'box'"), "got: {err}");

        scene.clear();
        arm.go(&goal(0.4, 0.0, 0.15)).expect("box removed");
    }

    #[test]
    fn sim_rejects_foreign_frame_and_zero_quaternion() {
        let (mut arm, _scene) = SimWorld::new().build();

        let mut foreign = goal(0.3, 0.0, 0.3);
        foreign.header.frame_id = "camera".to_string();
        assert!(matches!(arm.go(&foreign), Err(HemiError::Planning(_))));

        let mut unframed = goal(0.3, 0.0, 0.3);
        unframed.header.frame_id.clear();
        arm.go(&unframed).expect("empty frame means planning frame");

        let mut degenerate = goal(0.3, 0.0, 0.3);
        degenerate.pose.orientation = Quaternion::new(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(arm.go(&degenerate), Err(HemiError::InvalidArgument(_))));
    }

    #[test]
    fn sim_applies_tracking_error() {
        let (mut arm, _scene) = SimWorld::new()
            .with_position_error(0.02)
            .with_orientation_error(0.2)
            .build();
        let target = goal(0.3, 0.0, 0.3);
        arm.go(&target).unwrap();

        let reached = arm.current_pose().unwrap().pose;
        assert!((reached.position.distance(target.pose.position) - 0.02).abs() < 1e-12);
        let cos_half = reached.orientation.dot(target.pose.orientation).abs();
        assert!((cos_half - (0.1f64).cos()).abs() < 1e-12);
    }

    #[test]
    fn sim_settings_are_validated_and_recorded() {
        let (mut arm, _scene) = SimWorld::new().build();
        arm.set_max_velocity_scaling_factor(0.1).unwrap();
        arm.set_max_acceleration_scaling_factor(0.2).unwrap();
        arm.set_end_effector_link("tool0");
        arm.set_planning_time(Duration::from_secs(2)).unwrap();
        arm.allow_replanning(true);

        assert_eq!(arm.velocity_scaling(), 0.1);
        assert_eq!(arm.acceleration_scaling(), 0.2);
        assert_eq!(arm.end_effector_link(), "tool0");
        assert_eq!(arm.planning_time(), Duration::from_secs(2));
        assert!(arm.replanning_allowed());

        assert!(arm.set_max_velocity_scaling_factor(0.0).is_err());
        assert!(arm.set_planning_time(Duration::ZERO).is_err());
    }

    #[test]
    fn scene_replaces_boxes_by_name() {
        let (_arm, mut scene) = SimWorld::new().build();
        scene.add_box("box", &goal(0.0, 0.0, 0.0), [0.1, 0.1, 0.1]).unwrap();
        scene.add_box("box", &goal(1.0, 0.0, 0.0), [0.1, 0.1, 0.1]).unwrap();
        scene.add_box("table", &goal(0.0, 0.0, -0.5), [1.0, 1.0, 0.1]).unwrap();

        assert_eq!(scene.object_names(), vec!["box".to_string(), "table".to_string()]);
        let boxes = scene.boxes();
        assert_eq!(boxes[0].pose.pose.position.x, 1.0);

        assert!(scene.add_box("bad", &goal(0.0, 0.0, 0.0), [-1.0, 0.1, 0.1]).is_err());
    }
}
