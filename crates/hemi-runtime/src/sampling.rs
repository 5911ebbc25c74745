//! Hemisphere viewpoint sampler.
//!
//! Builds an icosphere (a subdivided icosahedron), keeps the vertices on the
//! upper half, and turns each into a camera pose on a sphere of `radius`
//! around `center` whose tool z-axis looks at the centre.  This is the
//! in-process counterpart of the external pose-generation helper: it
//! publishes the same two messages the sequencer waits for.
//!
//! # Example
//!
//! ```rust
//! use hemi_runtime::sampling::HemisphereSampler;
//! use hemi_types::Point;
//!
//! let sampler = HemisphereSampler::new(Point::new(0.4, 0.0, 0.1), 0.3);
//! let viewpoints = sampler.viewpoints();
//! assert!(viewpoints.poses.iter().all(|p| p.position.z >= 0.1 - 1e-9));
//! ```

use std::collections::HashMap;

use hemi_middleware::{EventBus, Topic};
use hemi_types::{Event, EventPayload, Header, Point, Pose, PoseArray, PoseStamped, Quaternion};
use tracing::info;

const SOURCE: &str = "hemi-runtime::sampling";

/// Vertices of an icosphere with `subdivisions` levels of refinement, all on
/// the unit sphere.  Level 0 is the icosahedron (12 vertices); every level
/// splits each triangle into four.
pub fn icosphere(subdivisions: u32) -> Vec<Point> {
    let t = (1.0 + 5f64.sqrt()) / 2.0;
    let mut vertices: Vec<Point> = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ]
    .into_iter()
    .map(|(x, y, z)| unit(Point::new(x, y, z)))
    .collect();

    let mut faces: Vec<[usize; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        // Edge (low, high) -> index of its midpoint vertex.
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Point>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let mid = unit(vertices[a].lerp(vertices[b], 0.5));
                vertices.push(mid);
                vertices.len() - 1
            })
        };

        let mut refined = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut vertices);
            let bc = midpoint(b, c, &mut vertices);
            let ca = midpoint(c, a, &mut vertices);
            refined.extend([[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = refined;
    }

    vertices
}

fn unit(p: Point) -> Point {
    p.normalized().unwrap_or(Point::new(0.0, 0.0, 1.0))
}

/// Orientation whose z-axis points from `from` towards `target`.
///
/// The x-axis is kept horizontal where possible; when looking straight up or
/// down the world x-axis is used as reference instead.
pub fn look_at(from: Point, target: Point) -> Quaternion {
    let Some(z) = target.sub(from).normalized() else {
        return Quaternion::identity();
    };
    let up = Point::new(0.0, 0.0, 1.0);
    let reference = if z.dot(up).abs() > 0.999 {
        Point::new(1.0, 0.0, 0.0)
    } else {
        up
    };
    let x = unit(reference.cross(z));
    let y = z.cross(x);
    rotation_from_axes(x, y, z)
}

/// Quaternion of the rotation matrix whose columns are `x`, `y`, `z`.
fn rotation_from_axes(x: Point, y: Point, z: Point) -> Quaternion {
    let (m00, m01, m02) = (x.x, y.x, z.x);
    let (m10, m11, m12) = (x.y, y.y, z.y);
    let (m20, m21, m22) = (x.z, y.z, z.z);

    let trace = m00 + m11 + m22;
    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quaternion::new((m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s, 0.25 * s)
    } else if m00 > m11 && m00 > m22 {
        let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
        Quaternion::new(0.25 * s, (m01 + m10) / s, (m02 + m20) / s, (m21 - m12) / s)
    } else if m11 > m22 {
        let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
        Quaternion::new((m01 + m10) / s, 0.25 * s, (m12 + m21) / s, (m02 - m20) / s)
    } else {
        let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
        Quaternion::new((m02 + m20) / s, (m12 + m21) / s, 0.25 * s, (m10 - m01) / s)
    };
    q.normalized().unwrap_or_else(Quaternion::identity)
}

/// Generates viewpoints on a hemisphere above `center`.
#[derive(Debug, Clone, PartialEq)]
pub struct HemisphereSampler {
    pub center: Point,
    pub radius: f64,
    pub subdivisions: u32,
    pub frame_id: String,
    /// Lowest accepted unit-sphere z of a viewpoint, in `[-1, 1]`.
    /// `0.0` keeps the full upper hemisphere including the equator.
    pub min_elevation: f64,
}

impl HemisphereSampler {
    /// Sampler with one subdivision level in the `"world"` frame.
    pub fn new(center: Point, radius: f64) -> Self {
        Self {
            center,
            radius,
            subdivisions: 1,
            frame_id: "world".to_string(),
            min_elevation: 0.0,
        }
    }

    pub fn with_subdivisions(mut self, subdivisions: u32) -> Self {
        self.subdivisions = subdivisions;
        self
    }

    pub fn with_frame(mut self, frame_id: impl Into<String>) -> Self {
        self.frame_id = frame_id.into();
        self
    }

    pub fn with_min_elevation(mut self, min_elevation: f64) -> Self {
        self.min_elevation = min_elevation;
        self
    }

    /// The hemisphere centre, identity orientation.
    pub fn middle_point(&self) -> PoseStamped {
        PoseStamped::new(
            Header::new(self.frame_id.clone()),
            Pose::new(self.center, Quaternion::identity()),
        )
    }

    /// Viewpoints ordered from the top of the hemisphere down, and by
    /// azimuth within one elevation.
    pub fn viewpoints(&self) -> PoseArray {
        // Accept vertices a hair below the threshold so equator vertices that
        // came out as -1e-17 are not lost.
        let threshold = self.min_elevation - 1e-9;
        let mut directions: Vec<Point> = icosphere(self.subdivisions)
            .into_iter()
            .filter(|d| d.z >= threshold)
            .collect();
        directions.sort_by(|a, b| {
            b.z.total_cmp(&a.z)
                .then_with(|| a.y.atan2(a.x).total_cmp(&b.y.atan2(b.x)))
        });

        let poses = directions
            .into_iter()
            .map(|d| {
                let position = self.center.add(d.scale(self.radius));
                Pose::new(position, look_at(position, self.center))
            })
            .collect();

        PoseArray {
            header: Header::new(self.frame_id.clone()),
            poses,
        }
    }

    /// Publish the middle point and the viewpoints on the bus.
    ///
    /// Returns the number of viewpoints published.
    pub fn publish(&self, bus: &EventBus) -> usize {
        let viewpoints = self.viewpoints();
        let count = viewpoints.poses.len();

        let middle_receivers = bus.publish_to(
            Topic::MiddlePoint,
            Event::new(SOURCE, EventPayload::PoseStamped(self.middle_point())),
        );
        let array_receivers = bus.publish_to(
            Topic::PoseArray,
            Event::new(SOURCE, EventPayload::PoseArray(viewpoints)),
        );
        info!(
            viewpoints = count,
            radius = self.radius,
            subdivisions = self.subdivisions,
            middle_receivers,
            array_receivers,
            "published hemisphere"
        );
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icosphere_vertex_counts() {
        assert_eq!(icosphere(0).len(), 12);
        assert_eq!(icosphere(1).len(), 42);
        assert_eq!(icosphere(2).len(), 162);
    }

    #[test]
    fn icosphere_vertices_are_unit_length() {
        for v in icosphere(2) {
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn look_at_points_tool_z_at_target() {
        let cases = [
            (Point::new(0.0, 0.0, 1.0), Point::default()),
            (Point::new(1.0, 0.0, 0.0), Point::default()),
            (Point::new(0.3, -0.2, 0.5), Point::new(0.1, 0.1, 0.0)),
            (Point::new(0.0, 0.0, -1.0), Point::default()),
        ];
        for (from, target) in cases {
            let q = look_at(from, target);
            assert!((q.norm() - 1.0).abs() < 1e-9);
            let z_axis = q.rotate(Point::new(0.0, 0.0, 1.0));
            let expected = target.sub(from).normalized().unwrap();
            assert!(
                z_axis.distance(expected) < 1e-9,
                "from {from:?}: z axis {z_axis:?} != {expected:?}"
            );
        }
    }

    #[test]
    fn level_zero_hemisphere_keeps_upper_half_and_equator() {
        let sampler = HemisphereSampler::new(Point::default(), 1.0).with_subdivisions(0);
        assert_eq!(sampler.viewpoints().poses.len(), 8);
    }

    #[test]
    fn viewpoints_lie_on_hemisphere_and_face_center() {
        let center = Point::new(0.4, 0.0, 0.1);
        let sampler = HemisphereSampler::new(center, 0.3).with_subdivisions(2);
        let array = sampler.viewpoints();

        assert!(!array.poses.is_empty());
        assert_eq!(array.header.frame_id, "world");
        for pose in &array.poses {
            assert!((pose.position.distance(center) - 0.3).abs() < 1e-9);
            assert!(pose.position.z >= center.z - 1e-9);
            let z_axis = pose.orientation.rotate(Point::new(0.0, 0.0, 1.0));
            let inward = center.sub(pose.position).normalized().unwrap();
            assert!(z_axis.dot(inward) > 1.0 - 1e-9);
        }
    }

    #[test]
    fn viewpoints_are_ordered_top_down() {
        let array = HemisphereSampler::new(Point::default(), 1.0).viewpoints();
        let heights: Vec<f64> = array.poses.iter().map(|p| p.position.z).collect();
        assert!(heights.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn min_elevation_drops_low_viewpoints() {
        let all = HemisphereSampler::new(Point::default(), 1.0).viewpoints();
        let high = HemisphereSampler::new(Point::default(), 1.0)
            .with_min_elevation(0.5)
            .viewpoints();
        assert!(high.poses.len() < all.poses.len());
        assert!(high.poses.iter().all(|p| p.position.z >= 0.5 - 1e-9));
    }

    #[tokio::test]
    async fn publish_sends_middle_point_and_array() {
        let bus = EventBus::default();
        let mut middle = bus.subscribe_to(Topic::MiddlePoint);
        let mut array = bus.subscribe_to(Topic::PoseArray);

        let sampler = HemisphereSampler::new(Point::new(0.4, 0.0, 0.1), 0.3).with_frame("base_link");
        let count = sampler.publish(&bus);

        let event = middle.recv().await.unwrap();
        match event.payload {
            EventPayload::PoseStamped(p) => {
                assert_eq!(p.header.frame_id, "base_link");
                assert_eq!(p.pose.position, Point::new(0.4, 0.0, 0.1));
            }
            other => panic!("expected PoseStamped, got {}", other.kind()),
        }
        match array.recv().await.unwrap().payload {
            EventPayload::PoseArray(a) => assert_eq!(a.poses.len(), count),
            other => panic!("expected PoseArray, got {}", other.kind()),
        }
    }
}
