//! `hemi-runtime` – sequencing a robot arm through hemisphere viewpoints.
//!
//! # Modules
//!
//! - [`sequencer`] – [`HemisphereMotion`]: waits for the hemisphere centre
//!   and viewpoints, fences the target with a collision box, then visits
//!   every viewpoint in order and records the outcome.
//! - [`tolerance`] – the reached-within-tolerance predicate.
//! - [`report`] – per-pose result table and its CSV export.
//! - [`sampling`] – icosphere-based viewpoint generator that can stand in for
//!   an external pose-generation process.
//! - [`helper`] – launches the external pose-generation process.
//! - [`telemetry`] – `tracing` subscriber setup with optional OTLP export.

pub mod helper;
pub mod report;
pub mod sampling;
pub mod sequencer;
pub mod telemetry;
pub mod tolerance;

pub use report::{Outcome, Report, ReportRow};
pub use sampling::HemisphereSampler;
pub use sequencer::{HemisphereMotion, MotionSettings};
pub use tolerance::{Tolerance, ToleranceCheck, all_close};
