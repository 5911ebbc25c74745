//! Configuration vault – reads/writes `~/.hemi/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hemi_hal::SimWorld;
use hemi_middleware::RosTopicMap;
use hemi_runtime::{HemisphereSampler, MotionSettings, Tolerance};
use hemi_types::Point;

/// Persisted run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Planning group of the arm.
    #[serde(default = "default_group_name_arm")]
    pub group_name_arm: String,

    #[serde(default = "default_eef_link")]
    pub eef_link: String,

    /// Velocity and acceleration scaling factor, `(0, 1]`.
    #[serde(default = "default_robot_speed")]
    pub robot_speed: f64,

    #[serde(default = "default_planning_time_s")]
    pub planning_time_s: f64,

    /// Position tolerance, metres.
    #[serde(default = "default_tolerance_d_m")]
    pub tolerance_d_m: f64,

    /// Orientation tolerance, degrees.
    #[serde(default = "default_tolerance_phi_deg")]
    pub tolerance_phi_deg: f64,

    /// Edge lengths of the collision box around the hemisphere centre.
    #[serde(default = "default_box_size")]
    pub box_size: [f64; 3],

    #[serde(default = "default_middle_point_topic")]
    pub middle_point_topic: String,

    #[serde(default = "default_pose_array_topic")]
    pub pose_array_topic: String,

    #[serde(default = "default_point_after_point_topic")]
    pub point_after_point_topic: String,

    #[serde(default = "default_display_path_topic")]
    pub display_path_topic: String,

    /// Pause between announcing a goal and moving to it.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long to wait for the centre and the viewpoints; `0` waits forever.
    #[serde(default)]
    pub wait_timeout_s: f64,

    /// CSV export path; empty disables the export.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// External pose generator started before waiting for input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_executable: Option<PathBuf>,

    /// rosbridge WebSocket URL (e.g. `ws://localhost:9090`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rosbridge_url: Option<String>,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub sim: SimConfig,
}

/// Built-in viewpoint generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    #[serde(default = "default_subdivisions")]
    pub subdivisions: u32,
    #[serde(default = "default_center")]
    pub center: [f64; 3],
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    #[serde(default)]
    pub min_elevation: f64,
}

/// Simulated arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_frame_id")]
    pub frame_id: String,
    /// Arm base position in the planning frame.
    #[serde(default)]
    pub base: [f64; 3],
    #[serde(default = "default_reach_m")]
    pub reach_m: f64,
    /// Constant tracking error added along x.
    #[serde(default)]
    pub position_error_m: f64,
    /// Constant tracking error about z.
    #[serde(default)]
    pub orientation_error_rad: f64,
    #[serde(default = "default_waypoints")]
    pub waypoints: usize,
}

fn default_group_name_arm() -> String {
    "manipulator".to_string()
}
fn default_eef_link() -> String {
    "tool0".to_string()
}
fn default_robot_speed() -> f64 {
    0.1
}
fn default_planning_time_s() -> f64 {
    5.0
}
fn default_tolerance_d_m() -> f64 {
    0.01
}
fn default_tolerance_phi_deg() -> f64 {
    5.0
}
fn default_box_size() -> [f64; 3] {
    [0.2, 0.2, 0.2]
}
fn default_middle_point_topic() -> String {
    "/middle_point_hemisphere".to_string()
}
fn default_pose_array_topic() -> String {
    "/hemisphere_pose_array".to_string()
}
fn default_point_after_point_topic() -> String {
    "/hemisphere_point_after_point".to_string()
}
fn default_display_path_topic() -> String {
    "/hemisphere_planned_path".to_string()
}
fn default_settle_delay_ms() -> u64 {
    500
}
fn default_report_path() -> String {
    "pose_array_executed.csv".to_string()
}
fn default_true() -> bool {
    true
}
fn default_radius_m() -> f64 {
    0.3
}
fn default_subdivisions() -> u32 {
    1
}
fn default_center() -> [f64; 3] {
    [0.4, 0.0, 0.1]
}
fn default_frame_id() -> String {
    "world".to_string()
}
fn default_reach_m() -> f64 {
    0.9
}
fn default_waypoints() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_name_arm: default_group_name_arm(),
            eef_link: default_eef_link(),
            robot_speed: default_robot_speed(),
            planning_time_s: default_planning_time_s(),
            tolerance_d_m: default_tolerance_d_m(),
            tolerance_phi_deg: default_tolerance_phi_deg(),
            box_size: default_box_size(),
            middle_point_topic: default_middle_point_topic(),
            pose_array_topic: default_pose_array_topic(),
            point_after_point_topic: default_point_after_point_topic(),
            display_path_topic: default_display_path_topic(),
            settle_delay_ms: default_settle_delay_ms(),
            wait_timeout_s: 0.0,
            report_path: default_report_path(),
            helper_executable: None,
            rosbridge_url: None,
            sampler: SamplerConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_m: default_radius_m(),
            subdivisions: default_subdivisions(),
            center: default_center(),
            frame_id: default_frame_id(),
            min_elevation: 0.0,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_id: default_frame_id(),
            base: [0.0; 3],
            reach_m: default_reach_m(),
            position_error_m: 0.0,
            orientation_error_rad: 0.0,
            waypoints: default_waypoints(),
        }
    }
}

impl Config {
    /// Sequencer settings derived from this config.
    ///
    /// Fails on negative or non-finite durations.
    pub fn motion_settings(&self) -> Result<MotionSettings, String> {
        let planning_time = Duration::try_from_secs_f64(self.planning_time_s)
            .map_err(|e| format!("Invalid planning_time_s {}: {}", self.planning_time_s, e))?;
        let wait_timeout = if self.wait_timeout_s == 0.0 {
            None
        } else {
            Some(
                Duration::try_from_secs_f64(self.wait_timeout_s).map_err(|e| {
                    format!("Invalid wait_timeout_s {}: {}", self.wait_timeout_s, e)
                })?,
            )
        };
        let report_path = (!self.report_path.is_empty()).then(|| PathBuf::from(&self.report_path));

        Ok(MotionSettings {
            robot_speed: self.robot_speed,
            eef_link: self.eef_link.clone(),
            planning_time,
            tolerance: Tolerance {
                distance_m: self.tolerance_d_m,
                angle_rad: self.tolerance_phi_deg.to_radians(),
            },
            box_size: self.box_size,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            wait_timeout,
            report_path,
            helper_executable: self.helper_executable.clone(),
            ..MotionSettings::default()
        })
    }

    /// ROS names of the four bus lanes.
    pub fn topic_map(&self) -> RosTopicMap {
        RosTopicMap {
            middle_point: self.middle_point_topic.clone(),
            pose_array: self.pose_array_topic.clone(),
            point_after_point: self.point_after_point_topic.clone(),
            display_planned_path: self.display_path_topic.clone(),
        }
    }

    /// `None` when the built-in generator is disabled.
    pub fn sampler(&self) -> Option<HemisphereSampler> {
        let s = &self.sampler;
        s.enabled.then(|| {
            let [x, y, z] = s.center;
            HemisphereSampler::new(Point::new(x, y, z), s.radius_m)
                .with_subdivisions(s.subdivisions)
                .with_frame(s.frame_id.clone())
                .with_min_elevation(s.min_elevation)
        })
    }

    pub fn sim_world(&self) -> SimWorld {
        let [x, y, z] = self.sim.base;
        SimWorld::new()
            .with_group_name(self.group_name_arm.clone())
            .with_frame(self.sim.frame_id.clone())
            .with_base(Point::new(x, y, z))
            .with_reach(self.sim.reach_m)
            .with_position_error(self.sim.position_error_m)
            .with_orientation_error(self.sim.orientation_error_rad)
            .with_waypoints(self.sim.waypoints)
    }
}

/// Return the path to `~/.hemi/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".hemi").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `HEMI_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HEMI_ROSBRIDGE_URL` | `rosbridge_url` |
/// | `HEMI_REPORT_PATH` | `report_path` |
/// | `HEMI_ROBOT_SPEED` | `robot_speed` |
/// | `HEMI_SETTLE_DELAY_MS` | `settle_delay_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("HEMI_ROSBRIDGE_URL") {
        cfg.rosbridge_url = Some(v);
    }
    if let Ok(v) = std::env::var("HEMI_REPORT_PATH") {
        cfg.report_path = v;
    }
    if let Ok(v) = std::env::var("HEMI_ROBOT_SPEED")
        && let Ok(speed) = v.parse::<f64>()
    {
        cfg.robot_speed = speed;
    }
    if let Ok(v) = std::env::var("HEMI_SETTLE_DELAY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.settle_delay_ms = ms;
    }
}

/// Save the config to a specific path, creating parent directories.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
