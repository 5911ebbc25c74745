//! Per-pose result table.
//!
//! Every attempted viewpoint produces exactly one [`ReportRow`]; the table is
//! kept in memory for the duration of a run and written out once as CSV.
//!
//! | Column | Content |
//! |---|---|
//! | `Idx` | Row count at append time |
//! | `SubDiv` | Subdivision id, always `-1` |
//! | `Point` | Goal position `[x y z]` |
//! | `Orientation` | Goal quaternion `[x y z w]` |
//! | `Succ. Approached` | `1` or `0` |
//! | `Error` | Outcome text or the move error |
//! | `Delta_d` | Position error in metres, `-1` when the move failed |
//! | `Delta_phi` | `abs(q_goal · q_actual)`, `-1` when the move failed |
//!
//! All numbers are rounded to four decimals.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hemi_types::{HemiError, Pose};

use crate::tolerance::ToleranceCheck;

/// Header line of the CSV export.
pub const CSV_HEADER: [&str; 8] = [
    "Idx",
    "SubDiv",
    "Point",
    "Orientation",
    "Succ. Approached",
    "Error",
    "Delta_d",
    "Delta_phi",
];

/// Value written to the `SubDiv` column.
pub const UNUSED_SUBDIVISION: i32 = -1;

/// Value written to both delta columns when the move itself failed.
pub const FAILED_DELTA: f64 = -1.0;

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The arm reached the goal within tolerance.
    Reached,
    /// The move completed but the final pose is outside tolerance.
    NotWithinTolerance,
    /// Planning or execution failed; carries the error text.
    MoveFailed(String),
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Outcome::Reached)
    }

    /// Text for the `Error` column.
    pub fn message(&self) -> &str {
        match self {
            Outcome::Reached => "Pose reached within tolerance",
            Outcome::NotWithinTolerance => "Pose reached NOT within tolerance",
            Outcome::MoveFailed(error) => error,
        }
    }
}

/// One attempted viewpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub idx: usize,
    pub sub_div: i32,
    pub point: [f64; 3],
    pub orientation: [f64; 4],
    pub outcome: Outcome,
    pub delta_d: f64,
    pub delta_phi: f64,
}

impl ReportRow {
    fn cells(&self) -> [String; 8] {
        [
            self.idx.to_string(),
            self.sub_div.to_string(),
            format_list(&self.point),
            format_list(&self.orientation),
            u8::from(self.outcome.succeeded()).to_string(),
            self.outcome.message().to_string(),
            self.delta_d.to_string(),
            self.delta_phi.to_string(),
        ]
    }
}

/// Round to four decimals, ties to even.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round_ties_even() / 10_000.0
}

fn format_list(values: &[f64]) -> String {
    let inner: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", inner.join(" "))
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Ordered collection of [`ReportRow`]s.
#[derive(Debug, Clone, Default)]
pub struct Report {
    rows: Vec<ReportRow>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outcome of a completed move.
    pub fn record_check(&mut self, goal: &Pose, check: &ToleranceCheck) -> &ReportRow {
        let outcome = if check.within {
            Outcome::Reached
        } else {
            Outcome::NotWithinTolerance
        };
        self.push(goal, outcome, round4(check.delta_d), round4(check.cos_phi))
    }

    /// Append a failed move with sentinel deltas.
    pub fn record_failure(&mut self, goal: &Pose, error: impl Into<String>) -> &ReportRow {
        self.push(
            goal,
            Outcome::MoveFailed(error.into()),
            FAILED_DELTA,
            FAILED_DELTA,
        )
    }

    fn push(&mut self, goal: &Pose, outcome: Outcome, delta_d: f64, delta_phi: f64) -> &ReportRow {
        let [x, y, z, qx, qy, qz, qw] = goal.to_list().map(round4);
        self.rows.push(ReportRow {
            idx: self.rows.len(),
            sub_div: UNUSED_SUBDIVISION,
            point: [x, y, z],
            orientation: [qx, qy, qz, qw],
            outcome,
            delta_d,
            delta_phi,
        });
        &self.rows[self.rows.len() - 1]
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of poses reached within tolerance.
    pub fn succeeded(&self) -> usize {
        self.rows.iter().filter(|r| r.outcome.succeeded()).count()
    }

    /// Number of poses not reached within tolerance (including failed moves).
    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Render the report as CSV text, header included.
    pub fn to_csv_string(&self) -> String {
        let mut out = CSV_HEADER.join(",");
        out.push('\n');
        for row in &self.rows {
            let line: Vec<String> = row.cells().iter().map(|c| csv_field(c)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    /// Write the CSV export to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`HemiError::Report`] when the file cannot be created or written.
    pub fn write_csv(&self, path: &Path) -> Result<(), HemiError> {
        let file = File::create(path)
            .map_err(|e| HemiError::Report(format!("failed to create {}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(self.to_csv_string().as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| HemiError::Report(format!("failed to write {}: {e}", path.display())))
    }

    /// Column-aligned table for the console.
    pub fn to_table(&self) -> String {
        let cells: Vec<[String; 8]> = self.rows.iter().map(ReportRow::cells).collect();
        let mut widths = CSV_HEADER.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let mut line = |values: &[String]| {
            let padded: Vec<String> = values
                .iter()
                .zip(widths)
                .map(|(v, w)| format!("{v:>w$}"))
                .collect();
            let _ = writeln!(out, "{}", padded.join("  ").trim_end());
        };
        line(&CSV_HEADER.map(str::to_string));
        for row in &cells {
            line(row);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemi_types::{Point, Quaternion};

    fn goal() -> Pose {
        Pose::new(
            Point::new(0.123456, -0.5, 0.25),
            Quaternion::new(0.0, 0.70710678, 0.0, 0.70710678),
        )
    }

    #[test]
    fn rows_are_indexed_by_append_order() {
        let mut report = Report::new();
        let check = ToleranceCheck {
            within: true,
            delta_d: 0.001234567,
            cos_phi: 0.99999,
        };
        report.record_check(&goal(), &check);
        report.record_failure(&goal(), "Planning failed: no plan");
        report.record_check(&goal(), &ToleranceCheck { within: false, ..check });

        let idx: Vec<usize> = report.rows().iter().map(|r| r.idx).collect();
        assert_eq!(idx, vec![0, 1, 2]);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
    }

    #[test]
    fn successful_row_rounds_to_four_decimals() {
        let mut report = Report::new();
        let row = report
            .record_check(
                &goal(),
                &ToleranceCheck {
                    within: true,
                    delta_d: 0.001234567,
                    cos_phi: 0.999987,
                },
            )
            .clone();

        assert_eq!(row.sub_div, -1);
        assert_eq!(row.point, [0.1235, -0.5, 0.25]);
        assert_eq!(row.orientation, [0.0, 0.7071, 0.0, 0.7071]);
        assert_eq!(row.delta_d, 0.0012);
        assert_eq!(row.delta_phi, 1.0);
        assert_eq!(row.outcome.message(), "Pose reached within tolerance");
    }

    #[test]
    fn round4_breaks_ties_to_even() {
        assert_eq!(round4(0.00025), 0.0002);
        assert_eq!(round4(0.00035), 0.0004);
        assert_eq!(round4(0.12345), 0.1234);
        assert_eq!(round4(-0.00025), -0.0002);
        assert_eq!(round4(0.123456), 0.1235);
    }

    #[test]
    fn failed_move_uses_sentinel_deltas() {
        let mut report = Report::new();
        let row = report.record_failure(&goal(), "boom").clone();
        assert_eq!(row.delta_d, -1.0);
        assert_eq!(row.delta_phi, -1.0);
        assert_eq!(row.outcome, Outcome::MoveFailed("boom".to_string()));
        assert!(!row.outcome.succeeded());
    }

    #[test]
    fn csv_has_header_and_quotes_error_text() {
        let mut report = Report::new();
        report.record_check(
            &goal(),
            &ToleranceCheck {
                within: false,
                delta_d: 0.05,
                cos_phi: 0.9,
            },
        );
        report.record_failure(&goal(), "goal is in collision with 'box', \"hard\"");

        let csv = report.to_csv_string();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Idx,SubDiv,Point,Orientation,Succ. Approached,Error,Delta_d,Delta_phi"
        );
        assert_eq!(
            lines[1],
            "0,-1,[0.1235 -0.5 0.25],[0 0.7071 0 0.7071],0,Pose reached NOT within tolerance,0.05,0.9"
        );
        assert_eq!(
            lines[2],
            "1,-1,[0.1235 -0.5 0.25],[0 0.7071 0 0.7071],0,\"goal is in collision with 'box', \"\"hard\"\"\",-1,-1"
        );
    }

    #[test]
    fn write_csv_creates_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("pose_array_executed.csv");

        let mut report = Report::new();
        report.record_failure(&goal(), "nope");
        report.write_csv(&path).expect("write");

        let written = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(written, report.to_csv_string());
    }

    #[test]
    fn write_csv_into_missing_directory_is_report_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("missing").join("report.csv");
        let result = Report::new().write_csv(&path);
        assert!(matches!(result, Err(HemiError::Report(_))));
    }

    #[test]
    fn table_lists_every_row() {
        let mut report = Report::new();
        report.record_failure(&goal(), "a");
        report.record_failure(&goal(), "b");
        let table = report.to_table();
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().next().unwrap().contains("Succ. Approached"));
    }
}
