//! `hemi-hal` – motion backend abstraction.
//!
//! Planning, inverse kinematics and collision checking live outside this
//! workspace.  The sequencer only ever talks to the traits below, so a
//! MoveIt bridge, a vendor SDK or the in-process simulator can be swapped in
//! without touching the sequencing logic.
//!
//! # Modules
//!
//! - [`move_group`] – [`MoveGroup`]: a planning group that can be sent to a
//!   Cartesian goal and queried for its current end-effector pose.
//! - [`planning_scene`] – [`PlanningScene`]: collision objects known to the
//!   planner.
//! - [`sim`] – [`SimWorld`]: simulated arm and scene for headless runs and
//!   tests.

pub mod move_group;
pub mod planning_scene;
pub mod sim;

pub use move_group::MoveGroup;
pub use planning_scene::{CollisionBox, PlanningScene};
pub use sim::{SimMoveGroup, SimPlanningScene, SimWorld};
