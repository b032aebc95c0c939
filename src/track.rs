// ==============================================================================
// track.rs — CENTERLINE ARC-LENGTH PARAMETERIZATION
// ==============================================================================
// Two layers:
//
// 1) make_loop / offset_loop
//    Raw polyline helpers. make_loop closes a polyline and produces normalized
//    arc-length fractions (times[0] == 0, times[last] == 1 exactly).
//    offset_loop rotates the start/finish point without resampling.
//
// 2) TrackMap
//    The sampled centerline handed to the controller at init. Each sample
//    carries s, center, unit tangent, unit normal (tangent rotated +90 deg, so
//    positive lateral offset is to the LEFT), signed curvature and half width.
//    Closed tracks end with a synthetic copy of sample 0 at s == length.
//    Immutable after construction.
// ==============================================================================

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// consecutive points closer than this are treated as one
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

// ------------------------------------------------------------------
// closed polyline helpers
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoopPath {
    /// Input points plus a duplicate of the first one.
    pub points: Vec<Point2<f64>>,
    /// Euclidean length of each segment, `points.len() - 1` entries.
    pub segment_lengths: Vec<f64>,
    /// Sum of segment lengths, floored at 1.
    pub total_length: f64,
    /// Normalized cumulative arc length per point.
    pub times: Vec<f64>,
}

impl LoopPath {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub fn make_loop(points: &[Point2<f64>]) -> LoopPath {
    let Some(first) = points.first() else {
        return LoopPath::default();
    };

    let mut closed = points.to_vec();
    closed.push(*first);

    let segment_lengths: Vec<f64> = closed.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
    let total_length = segment_lengths.iter().sum::<f64>().max(1.0);

    let mut times = Vec::with_capacity(closed.len());
    let mut acc = 0.0;
    times.push(0.0);
    for len in &segment_lengths {
        acc += len;
        times.push(acc / total_length);
    }
    if let Some(last) = times.last_mut() {
        *last = 1.0;
    }

    LoopPath { points: closed, segment_lengths, total_length, times }
}

/// Rotate an open loop so it starts at `offset` (negative walks backwards) and
/// close it again with a duplicate of the new first point.
pub fn offset_loop(points: &[Point2<f64>], offset: isize) -> Vec<Point2<f64>> {
    if points.is_empty() {
        return Vec::new();
    }

    let n = points.len();
    let start = offset.rem_euclid(n as isize) as usize;

    let mut rotated: Vec<Point2<f64>> = points[start..].iter().chain(&points[..start]).copied().collect();
    rotated.push(rotated[0]);
    rotated
}

// ------------------------------------------------------------------
// TrackMap
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSample {
    pub s: f64, // arc length, m
    pub center: Point2<f64>,
    pub tangent: Vector2<f64>,
    pub normal: Vector2<f64>,
    pub curvature: f64,  // 1/m, positive turning left
    pub half_width: f64, // m
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMap {
    pub id: String,
    pub length: f64,
    pub resolution: f64,
    #[serde(default)]
    pub is_loop: bool,
    pub samples: Vec<TrackSample>,
}

/// Nearest-point projection of a position onto the centerline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub s: f64,
    /// Signed offset along the normal, positive to the left.
    pub lateral_error: f64,
    /// Heading of the centerline at the projected point, rad.
    pub heading: f64,
    pub half_width: f64,
    pub curvature: f64,
}

#[inline]
fn left_normal(t: Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-t.y, t.x)
}

/// Wrap an angle into (-pi, pi].
#[inline]
pub(crate) fn wrap_angle(a: f64) -> f64 {
    let two_pi = std::f64::consts::TAU;
    let mut a = a.rem_euclid(two_pi);
    if a > std::f64::consts::PI {
        a -= two_pi;
    }
    a
}

impl TrackMap {
    /// Build a sampled map from centerline points with a constant half width.
    pub fn from_centerline(
        id: impl Into<String>,
        points: &[Point2<f64>],
        half_width: f64,
        is_loop: bool,
    ) -> Result<Self, ConfigError> {
        if !half_width.is_finite() || half_width < 0.0 {
            return Err(ConfigError::invalid(format!("half_width must be finite and >= 0 (got {half_width})")));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ConfigError::invalid("track points must be finite"));
        }

        let mut pts: Vec<Point2<f64>> = Vec::with_capacity(points.len());
        for p in points {
            if pts.last().is_none_or(|last| (p - last).norm() > MIN_SEGMENT_LENGTH) {
                pts.push(*p);
            }
        }
        if is_loop && pts.len() > 1 {
            if let (Some(first), Some(last)) = (pts.first(), pts.last()) {
                if (last - first).norm() <= MIN_SEGMENT_LENGTH {
                    pts.pop();
                }
            }
        }

        let min_points = if is_loop { 3 } else { 2 };
        if pts.len() < min_points {
            return Err(ConfigError::invalid(format!(
                "track needs at least {min_points} distinct points (got {})",
                pts.len()
            )));
        }

        let n = pts.len();
        let segment_count = if is_loop { n } else { n - 1 };
        let segment = |i: usize| pts[(i + 1) % n] - pts[i];

        let mut s = Vec::with_capacity(n);
        let mut acc = 0.0;
        for i in 0..n {
            s.push(acc);
            if i < segment_count {
                acc += segment(i).norm();
            }
        }
        let length = acc;

        let mut samples = Vec::with_capacity(n + 1);
        for i in 0..n {
            let (incoming, outgoing) = match (is_loop, i) {
                (true, _) => (Some(segment((i + n - 1) % n)), Some(segment(i))),
                (false, 0) => (None, Some(segment(0))),
                (false, i) if i == n - 1 => (Some(segment(i - 1)), None),
                (false, i) => (Some(segment(i - 1)), Some(segment(i))),
            };

            let tangent = match (incoming, outgoing) {
                (Some(a), Some(b)) => {
                    let t = a.normalize() + b.normalize();
                    if t.norm() > MIN_SEGMENT_LENGTH { t.normalize() } else { b.normalize() }
                }
                (Some(a), None) => a.normalize(),
                (None, Some(b)) => b.normalize(),
                (None, None) => Vector2::new(1.0, 0.0),
            };

            let curvature = match (incoming, outgoing) {
                (Some(a), Some(b)) => {
                    let dh = wrap_angle(b.y.atan2(b.x) - a.y.atan2(a.x));
                    dh / (0.5 * (a.norm() + b.norm()))
                }
                _ => 0.0,
            };

            samples.push(TrackSample {
                s: s[i],
                center: pts[i],
                tangent,
                normal: left_normal(tangent),
                curvature,
                half_width,
            });
        }

        // open ends inherit the neighbouring curvature
        if !is_loop && n >= 3 {
            samples[0].curvature = samples[1].curvature;
            samples[n - 1].curvature = samples[n - 2].curvature;
        }

        if is_loop {
            let mut closing = samples[0].clone();
            closing.s = length;
            samples.push(closing);
        }

        let map = TrackMap {
            id: id.into(),
            length,
            resolution: length / segment_count as f64,
            is_loop,
            samples,
        };
        map.validate()?;
        Ok(map)
    }

    /// Structural checks for maps built elsewhere (e.g. received over the wire).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.samples.len() < 2 {
            return Err(ConfigError::invalid(format!("track '{}' needs at least 2 samples", self.id)));
        }
        if !(self.length.is_finite() && self.length > 0.0) {
            return Err(ConfigError::invalid(format!("track '{}' length must be > 0", self.id)));
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(ConfigError::invalid(format!("track '{}' resolution must be > 0", self.id)));
        }

        let last = self.samples.len() - 1;
        for (i, sample) in self.samples.iter().enumerate() {
            let finite = sample.s.is_finite()
                && sample.center.x.is_finite()
                && sample.center.y.is_finite()
                && sample.tangent.x.is_finite()
                && sample.tangent.y.is_finite()
                && sample.normal.x.is_finite()
                && sample.normal.y.is_finite()
                && sample.curvature.is_finite()
                && sample.half_width.is_finite();
            if !finite {
                return Err(ConfigError::invalid(format!("track '{}' sample {i} is not finite", self.id)));
            }
            if sample.half_width < 0.0 {
                return Err(ConfigError::invalid(format!("track '{}' sample {i} has negative half width", self.id)));
            }
            if i > 0 && sample.s <= self.samples[i - 1].s {
                return Err(ConfigError::invalid(format!(
                    "track '{}' arc length not strictly increasing at sample {i}",
                    self.id
                )));
            }
        }

        let end = self.samples[last].s;
        if self.is_loop && (end - self.length).abs() > 1e-6 * self.length.max(1.0) {
            return Err(ConfigError::invalid(format!(
                "track '{}' closing sample must sit at s == length",
                self.id
            )));
        }
        if end > self.length * (1.0 + 1e-9) {
            return Err(ConfigError::invalid(format!("track '{}' samples exceed its length", self.id)));
        }
        Ok(())
    }

    /// Wrap (loops) or clamp (open tracks) an arc length into the map.
    pub fn normalize_s(&self, s: f64) -> f64 {
        let end = self.samples.last().map_or(0.0, |x| x.s);
        if self.is_loop {
            s.rem_euclid(self.length)
        } else {
            s.clamp(0.0, end)
        }
    }

    /// Signed arc-length difference `to - from`, taking the short way round loops.
    pub fn progress(&self, from: f64, to: f64) -> f64 {
        let d = to - from;
        if !self.is_loop {
            return d;
        }
        let half = 0.5 * self.length;
        let d = d.rem_euclid(self.length);
        if d > half { d - self.length } else { d }
    }

    /// Linearly interpolated sample at arc length `s`. A map without samples
    /// yields a zeroed sample at the origin.
    pub fn sample_at(&self, s: f64) -> TrackSample {
        let n = self.samples.len();
        if n == 0 {
            return TrackSample {
                s: 0.0,
                center: Point2::origin(),
                tangent: Vector2::x(),
                normal: Vector2::y(),
                curvature: 0.0,
                half_width: 0.0,
            };
        }
        let s = self.normalize_s(s);
        let idx = self.samples.partition_point(|x| x.s <= s);
        let i = idx.saturating_sub(1).min(n.saturating_sub(2));

        let a = &self.samples[i];
        let b = &self.samples[(i + 1).min(n - 1)];
        let span = b.s - a.s;
        let t = if span > 0.0 { ((s - a.s) / span).clamp(0.0, 1.0) } else { 0.0 };

        let blended = a.tangent.lerp(&b.tangent, t);
        let tangent = if blended.norm() > MIN_SEGMENT_LENGTH { blended.normalize() } else { a.tangent };

        TrackSample {
            s,
            center: a.center + (b.center - a.center) * t,
            tangent,
            normal: left_normal(tangent),
            curvature: a.curvature + (b.curvature - a.curvature) * t,
            half_width: a.half_width + (b.half_width - a.half_width) * t,
        }
    }

    /// Project a position onto the nearest centerline segment.
    pub fn project(&self, point: &Point2<f64>) -> Projection {
        let mut best: Option<(f64, Projection)> = None;

        for pair in self.samples.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let seg = b.center - a.center;
            let seg_len2 = seg.norm_squared();
            let t = if seg_len2 > 0.0 { ((point - a.center).dot(&seg) / seg_len2).clamp(0.0, 1.0) } else { 0.0 };

            let closest = a.center + seg * t;
            let offset = point - closest;
            let dist2 = offset.norm_squared();
            if best.as_ref().is_some_and(|(d, _)| *d <= dist2) {
                continue;
            }

            let dir = if seg_len2 > 0.0 { seg / seg_len2.sqrt() } else { a.tangent };
            best = Some((
                dist2,
                Projection {
                    s: self.normalize_s(a.s + (b.s - a.s) * t),
                    lateral_error: offset.dot(&left_normal(dir)),
                    heading: dir.y.atan2(dir.x),
                    half_width: a.half_width + (b.half_width - a.half_width) * t,
                    curvature: a.curvature + (b.curvature - a.curvature) * t,
                },
            ));
        }

        best.map(|(_, p)| p).unwrap_or(Projection {
            s: 0.0,
            lateral_error: 0.0,
            heading: 0.0,
            half_width: 0.0,
            curvature: 0.0,
        })
    }
}

/// Regular polygon approximation of a circle, counter-clockwise from (radius, 0).
pub fn circle_points(radius: f64, count: usize) -> Vec<Point2<f64>> {
    (0..count)
        .map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / count as f64;
            Point2::new(radius * theta.cos(), radius * theta.sin())
        })
        .collect()
}
