//! Generic `MoveGroup` trait for a planning group of joints that is driven
//! by Cartesian end-effector goals.
//!
//! Backends implement this trait; the sequencer never sees joint angles,
//! planners or controllers.

use std::time::Duration;

use hemi_types::{HemiError, PoseStamped, Trajectory};

/// A planning group (e.g. `"manipulator"`) of a robot arm.
pub trait MoveGroup: Send {
    /// Name of the planning group.
    fn name(&self) -> &str;

    /// Scale the maximum joint velocity, `factor` in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`HemiError::InvalidArgument`] for a factor outside `(0, 1]`.
    fn set_max_velocity_scaling_factor(&mut self, factor: f64) -> Result<(), HemiError>;

    /// Scale the maximum joint acceleration, `factor` in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`HemiError::InvalidArgument`] for a factor outside `(0, 1]`.
    fn set_max_acceleration_scaling_factor(&mut self, factor: f64) -> Result<(), HemiError>;

    /// Link whose pose is controlled by goals and reported by
    /// [`current_pose`][Self::current_pose].
    fn set_end_effector_link(&mut self, link: &str);

    /// Time budget the planner gets for each goal.
    ///
    /// # Errors
    ///
    /// Returns [`HemiError::InvalidArgument`] for a zero duration.
    fn set_planning_time(&mut self, budget: Duration) -> Result<(), HemiError>;

    /// Let the planner retry when the first plan is invalidated.
    fn allow_replanning(&mut self, allow: bool);

    /// Forget any previously set pose targets.
    fn clear_pose_targets(&mut self);

    /// Plan to `goal` and execute the plan, blocking until the motion has
    /// finished.  Returns the executed path.
    ///
    /// # Errors
    ///
    /// [`HemiError::Planning`] when no plan is found,
    /// [`HemiError::Execution`] when the controller fails mid-motion,
    /// [`HemiError::InvalidArgument`] for a malformed goal.
    fn go(&mut self, goal: &PoseStamped) -> Result<Trajectory, HemiError>;

    /// Current pose of the end-effector link.
    fn current_pose(&self) -> Result<PoseStamped, HemiError>;
}

/// Check a velocity/acceleration scaling factor.
pub fn validate_scaling_factor(name: &str, factor: f64) -> Result<f64, HemiError> {
    if factor > 0.0 && factor <= 1.0 {
        Ok(factor)
    } else {
        Err(HemiError::InvalidArgument(format!(
            "{name} scaling factor must be in (0, 1], got {factor}"
        )))
    }
}
