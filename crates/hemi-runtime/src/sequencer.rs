//! [`HemisphereMotion`] – visits hemisphere viewpoints one after the other.
//!
//! The flow is strictly linear:
//!
//! 1. [`run_helper`][HemisphereMotion::run_helper] – start the external pose
//!    generator, if one is configured.
//! 2. [`get_middle_point`][HemisphereMotion::get_middle_point] – wait for the
//!    hemisphere centre.
//! 3. [`get_pose_array`][HemisphereMotion::get_pose_array] – wait for the
//!    viewpoints.
//! 4. [`add_box`][HemisphereMotion::add_box] – fence the target object with a
//!    collision box at the centre.
//! 5. [`execute_pose_array`][HemisphereMotion::execute_pose_array] – move to
//!    every viewpoint, check the reached pose, record a report row.
//!
//! Both inbound topics are subscribed in [`HemisphereMotion::new`], before the
//! generator can possibly publish, because bus topics do not latch.
//!
//! A failed move never aborts the run: the error is logged, recorded with
//! sentinel deltas, and the next viewpoint is attempted.
//!
//! [`MoveGroup::go`] blocks until the arm stops.  On a multi-threaded runtime
//! the call is made through `block_in_place`, so other tasks (the rosbridge
//! pump, a Ctrl-C watcher) keep running while the arm moves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hemi_hal::{MoveGroup, PlanningScene};
use hemi_middleware::{EventBus, Topic, TopicReceiver};
use hemi_types::{Event, EventPayload, HemiError, PoseArray, PoseStamped};
use tokio::process::Child;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{info, warn};

use crate::helper::spawn_helper;
use crate::report::{Report, round4};
use crate::tolerance::{Tolerance, ToleranceCheck, all_close};

const SOURCE: &str = "hemi-runtime::sequencer";

/// Everything the sequencer needs to know besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSettings {
    /// Velocity and acceleration scaling factor, `(0, 1]`.
    pub robot_speed: f64,
    pub eef_link: String,
    pub planning_time: Duration,
    pub tolerance: Tolerance,
    pub box_name: String,
    /// Collision box edge lengths, metres.
    pub box_size: [f64; 3],
    /// Pause between announcing a goal and moving to it.
    pub settle_delay: Duration,
    /// `None` waits for inbound messages forever.
    pub wait_timeout: Option<Duration>,
    /// `None` skips the CSV export.
    pub report_path: Option<PathBuf>,
    pub helper_executable: Option<PathBuf>,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            robot_speed: 0.1,
            eef_link: "tool0".to_string(),
            planning_time: Duration::from_secs(5),
            tolerance: Tolerance::default(),
            box_name: "box".to_string(),
            box_size: [0.2, 0.2, 0.2],
            settle_delay: Duration::from_millis(500),
            wait_timeout: None,
            report_path: Some(PathBuf::from("pose_array_executed.csv")),
            helper_executable: None,
        }
    }
}

/// Sequences an arm through the viewpoints of one hemisphere.
pub struct HemisphereMotion {
    settings: MotionSettings,
    bus: Arc<EventBus>,
    move_group: Box<dyn MoveGroup>,
    scene: Box<dyn PlanningScene>,
    middle_point_rx: TopicReceiver,
    pose_array_rx: TopicReceiver,
    middle_point: Option<PoseStamped>,
    pose_array: Option<PoseArray>,
    helper: Option<Child>,
}

impl HemisphereMotion {
    /// Clear the planning scene, configure the arm group and subscribe to the
    /// inbound topics.
    ///
    /// # Errors
    ///
    /// [`HemiError::InvalidArgument`] when the backend rejects a setting
    /// (e.g. a speed outside `(0, 1]`).
    pub fn new(
        settings: MotionSettings,
        bus: Arc<EventBus>,
        mut move_group: Box<dyn MoveGroup>,
        mut scene: Box<dyn PlanningScene>,
    ) -> Result<Self, HemiError> {
        scene.clear();

        move_group.set_max_velocity_scaling_factor(settings.robot_speed)?;
        move_group.set_max_acceleration_scaling_factor(settings.robot_speed)?;
        move_group.set_end_effector_link(&settings.eef_link);
        move_group.set_planning_time(settings.planning_time)?;
        move_group.allow_replanning(true);
        info!(
            group = move_group.name(),
            eef_link = %settings.eef_link,
            speed = settings.robot_speed,
            planning_time_s = settings.planning_time.as_secs_f64(),
            "move group configured"
        );

        let middle_point_rx = bus.subscribe_to(Topic::MiddlePoint);
        let pose_array_rx = bus.subscribe_to(Topic::PoseArray);

        Ok(Self {
            settings,
            bus,
            move_group,
            scene,
            middle_point_rx,
            pose_array_rx,
            middle_point: None,
            pose_array: None,
            helper: None,
        })
    }

    pub fn settings(&self) -> &MotionSettings {
        &self.settings
    }

    pub fn middle_point(&self) -> Option<&PoseStamped> {
        self.middle_point.as_ref()
    }

    pub fn pose_array(&self) -> Option<&PoseArray> {
        self.pose_array.as_ref()
    }

    pub fn planning_scene(&self) -> &dyn PlanningScene {
        self.scene.as_ref()
    }

    /// Start the external pose generator.  No-op when none is configured.
    pub fn run_helper(&mut self) -> Result<(), HemiError> {
        if let Some(executable) = &self.settings.helper_executable {
            self.helper = Some(spawn_helper(executable)?);
        }
        Ok(())
    }

    /// PID of the helper process while it is owned by the sequencer.
    pub fn helper_id(&self) -> Option<u32> {
        self.helper.as_ref().and_then(Child::id)
    }

    /// Kill the helper if it is still running and reap it.
    pub async fn stop_helper(&mut self) {
        let Some(mut child) = self.helper.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => info!(%status, "helper process already exited"),
            Ok(None) => match child.kill().await {
                Ok(()) => info!("helper process stopped"),
                Err(e) => warn!(error = %e, "failed to stop helper process"),
            },
            Err(e) => warn!(error = %e, "failed to query helper process"),
        }
    }

    /// Wait for the hemisphere centre.
    ///
    /// # Errors
    ///
    /// [`HemiError::Timeout`] when a wait timeout is configured and expires,
    /// [`HemiError::Channel`] when the bus shuts down.
    pub async fn get_middle_point(&mut self) -> Result<&PoseStamped, HemiError> {
        info!("waiting for viewing hemisphere");
        loop {
            let event = self
                .middle_point_rx
                .wait_for_message(self.settings.wait_timeout)
                .await?;
            match event.payload {
                EventPayload::PoseStamped(middle) => {
                    info!(
                        frame = %middle.header.frame_id,
                        x = middle.pose.position.x,
                        y = middle.pose.position.y,
                        z = middle.pose.position.z,
                        source = %event.source,
                        "middle point received"
                    );
                    return Ok(self.middle_point.insert(middle));
                }
                other => warn!(
                    kind = other.kind(),
                    source = %event.source,
                    "ignoring unexpected payload on middle point topic"
                ),
            }
        }
    }

    /// Wait for the viewpoint array.
    ///
    /// # Errors
    ///
    /// Same as [`get_middle_point`][Self::get_middle_point].
    pub async fn get_pose_array(&mut self) -> Result<&PoseArray, HemiError> {
        loop {
            let event = self
                .pose_array_rx
                .wait_for_message(self.settings.wait_timeout)
                .await?;
            match event.payload {
                EventPayload::PoseArray(array) => {
                    info!(
                        poses = array.poses.len(),
                        frame = %array.header.frame_id,
                        source = %event.source,
                        "pose array received"
                    );
                    return Ok(self.pose_array.insert(array));
                }
                other => warn!(
                    kind = other.kind(),
                    source = %event.source,
                    "ignoring unexpected payload on pose array topic"
                ),
            }
        }
    }

    /// Add the collision box around the hemisphere centre.
    ///
    /// # Errors
    ///
    /// [`HemiError::MissingInput`] before the middle point was received.
    pub fn add_box(&mut self) -> Result<(), HemiError> {
        let middle = self.middle_point.as_ref().ok_or_else(|| {
            HemiError::MissingInput("middle point has not been received".to_string())
        })?;
        self.scene
            .add_box(&self.settings.box_name, middle, self.settings.box_size)?;
        info!(
            name = %self.settings.box_name,
            size = ?self.settings.box_size,
            "collision box added"
        );
        Ok(())
    }

    /// Visit every viewpoint in order and record the outcome of each.
    ///
    /// Writes the CSV export when a report path is configured.
    ///
    /// # Errors
    ///
    /// [`HemiError::MissingInput`] before the pose array was received,
    /// [`HemiError::Report`] when the export cannot be written.  Move errors
    /// are recorded in the report, not returned.
    pub async fn execute_pose_array(&mut self) -> Result<Report, HemiError> {
        let array = self.pose_array.clone().ok_or_else(|| {
            HemiError::MissingInput("pose array has not been received".to_string())
        })?;

        self.move_group.clear_pose_targets();
        let mut report = Report::new();

        for (idx, goal) in array.stamped().enumerate() {
            self.bus.publish_to(
                Topic::PointAfterPoint,
                Event::new(SOURCE, EventPayload::PoseStamped(goal.clone())),
            );
            if !self.settings.settle_delay.is_zero() {
                tokio::time::sleep(self.settings.settle_delay).await;
            }

            match run_blocking(|| self.approach(&goal)) {
                Ok(check) => {
                    info!(
                        idx,
                        success = check.within,
                        delta_d = round4(check.delta_d),
                        cos_phi = round4(check.cos_phi),
                        "pose approached"
                    );
                    report.record_check(&goal.pose, &check);
                }
                Err(e) => {
                    warn!(
                        idx,
                        error = %e,
                        pose = ?goal.pose.to_list().map(round4),
                        "skipping pose"
                    );
                    report.record_failure(&goal.pose, e.to_string());
                }
            }
        }

        info!(
            attempted = report.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "pose array executed"
        );

        if let Some(path) = &self.settings.report_path {
            report.write_csv(path)?;
            info!(path = %path.display(), "report written");
        }
        Ok(report)
    }

    /// Run the whole flow: helper, middle point, pose array, box, poses.
    ///
    /// The helper is stopped once the flow ends, successfully or not.
    pub async fn run(&mut self) -> Result<Report, HemiError> {
        self.run_helper()?;
        let result = self.sequence().await;
        self.stop_helper().await;
        result
    }

    async fn sequence(&mut self) -> Result<Report, HemiError> {
        self.get_middle_point().await?;
        self.get_pose_array().await?;
        self.add_box()?;
        self.execute_pose_array().await
    }

    fn approach(&mut self, goal: &PoseStamped) -> Result<ToleranceCheck, HemiError> {
        let trajectory = self.move_group.go(goal)?;
        self.bus.publish_to(
            Topic::DisplayPlannedPath,
            Event::new(SOURCE, EventPayload::Trajectory(trajectory)),
        );
        let actual = self.move_group.current_pose()?;
        Ok(all_close(&goal.pose, &actual.pose, self.settings.tolerance))
    }
}

fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
