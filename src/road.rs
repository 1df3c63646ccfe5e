//! The reference track and conversions between world and road-relative coordinates.

use crate::math::{Point2d, Vector2d};
use cgmath::prelude::*;
use itertools::Itertools;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::io::BufRead;
use thiserror::Error;

/// Fixed interior reference point used to sign the lateral offset.
/// A position closer to this point than its projection on the track
/// gets a negative `d`. This pins down the track's left/right polarity
/// and must match the convention the waypoint table was surveyed with.
const INTERIOR_REF: Point2d = Point2d { x: 1000.0, y: 2000.0 };

/// A position in road-relative coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrenetPos {
    /// The longitudinal distance along the reference track, in m.
    pub s: f64,
    /// The signed lateral offset from the track centreline, in m.
    pub d: f64,
}

impl FrenetPos {
    /// Creates a new road-relative position.
    pub const fn new(s: f64, d: f64) -> Self {
        Self { s, d }
    }

    /// Whether both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.s.is_finite() && self.d.is_finite()
    }
}

/// A single record of the reference track table.
#[derive(Clone, Copy, Debug)]
pub struct Waypoint {
    /// The waypoint's position in world space.
    pub pos: Point2d,
    /// The cumulative longitudinal coordinate at this waypoint, in m.
    pub s: f64,
    /// Unit vector normal to the track, pointing towards positive `d`.
    pub normal: Vector2d,
}

/// An error raised while loading or validating the reference track table.
///
/// All of these are fatal configuration errors; a planner must not be
/// constructed from a malformed table.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("failed to read waypoint table: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed waypoint record on line {line}: {record:?}")]
    Parse { line: usize, record: String },

    #[error("waypoint table needs at least 2 waypoints, got {0}")]
    TooFewWaypoints(usize),

    #[error("longitudinal coordinates must be strictly increasing (record {0})")]
    NonMonotonic(usize),

    #[error("waypoint s = {s} lies outside the track length {max_s}")]
    OutOfRange { s: f64, max_s: f64 },

    #[error("lateral normal of record {0} is not unit length")]
    BadNormal(usize),
}

/// The fixed, ordered, cyclic polyline defining the roadway centreline.
///
/// Immutable after a successful load and freely shareable between threads.
#[derive(Clone, Debug)]
pub struct RoadMap {
    waypoints: Vec<Waypoint>,
    /// The longitudinal coordinate at which the track wraps back to 0, in m.
    max_s: f64,
}

impl RoadMap {
    /// Creates a road map from an already-parsed waypoint table.
    pub fn new(waypoints: Vec<Waypoint>, max_s: f64) -> Result<Self, MapError> {
        if waypoints.len() < 2 {
            return Err(MapError::TooFewWaypoints(waypoints.len()));
        }
        for (idx, wp) in waypoints.iter().enumerate() {
            let finite = wp.pos.x.is_finite()
                && wp.pos.y.is_finite()
                && wp.s.is_finite()
                && wp.normal.x.is_finite()
                && wp.normal.y.is_finite();
            if !finite {
                return Err(MapError::Parse {
                    line: idx + 1,
                    record: format!("{:?}", wp),
                });
            }
            if (wp.normal.magnitude() - 1.0).abs() > 1e-3 {
                return Err(MapError::BadNormal(idx + 1));
            }
            if wp.s < 0.0 || wp.s >= max_s {
                return Err(MapError::OutOfRange { s: wp.s, max_s });
            }
        }
        if let Some((idx, _)) = waypoints
            .iter()
            .tuple_windows()
            .find_position(|(a, b)| b.s <= a.s)
        {
            return Err(MapError::NonMonotonic(idx + 2));
        }
        Ok(Self { waypoints, max_s })
    }

    /// Loads the waypoint table from its storage format: one record per line,
    /// `x y s dx dy`, whitespace separated, ordered around the closed loop.
    pub fn from_reader(reader: impl BufRead, max_s: f64) -> Result<Self, MapError> {
        let mut waypoints = vec![];
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<f64> = line
                .split_whitespace()
                .map_while(|field| field.parse().ok())
                .collect();
            if fields.len() != 5 {
                return Err(MapError::Parse {
                    line: idx + 1,
                    record: line,
                });
            }
            waypoints.push(Waypoint {
                pos: Point2d::new(fields[0], fields[1]),
                s: fields[2],
                normal: Vector2d::new(fields[3], fields[4]),
            });
        }
        Self::new(waypoints, max_s)
    }

    /// The waypoints of the track, in order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// The longitudinal coordinate at which the track wraps back to 0, in m.
    pub fn max_s(&self) -> f64 {
        self.max_s
    }

    /// The index of the waypoint nearest to `pos`.
    /// The first index in sequence order wins ties.
    pub fn closest_waypoint(&self, pos: Point2d) -> usize {
        let mut closest = 0;
        let mut closest_dist = f64::INFINITY;
        for (idx, wp) in self.waypoints.iter().enumerate() {
            let dist = wp.pos.distance2(pos);
            if dist < closest_dist {
                closest = idx;
                closest_dist = dist;
            }
        }
        closest
    }

    /// The index of the next waypoint ahead of a vehicle at `pos` facing
    /// `heading`: the closest waypoint, advanced by one when it lies more
    /// than 45 degrees off the heading. Wraps past the end of the track.
    pub fn next_waypoint(&self, pos: Point2d, heading: f64) -> usize {
        let closest = self.closest_waypoint(pos);
        let wp = self.waypoints[closest].pos;

        let bearing = (wp.y - pos.y).atan2(wp.x - pos.x);
        let angle = (heading - bearing).abs();
        let angle = f64::min(2.0 * PI - angle, angle);

        if angle > FRAC_PI_4 {
            (closest + 1) % self.waypoints.len()
        } else {
            closest
        }
    }

    /// Converts a world-space position to road-relative coordinates by
    /// projecting it onto the track segment ending at the next waypoint.
    ///
    /// Only meaningful for positions on or near the track.
    pub fn to_frenet(&self, pos: Point2d, heading: f64) -> FrenetPos {
        let next = self.next_waypoint(pos, heading);
        let prev = if next == 0 {
            self.waypoints.len() - 1
        } else {
            next - 1
        };

        let segment = self.waypoints[next].pos - self.waypoints[prev].pos;
        let rel = pos - self.waypoints[prev].pos;
        let proj = (rel.dot(segment) / segment.magnitude2()) * segment;

        let mut d = (rel - proj).magnitude();

        // Sign the offset by comparing distances to the fixed interior point.
        let centre = INTERIOR_REF - self.waypoints[prev].pos;
        if (centre - rel).magnitude() <= (centre - proj).magnitude() {
            d = -d;
        }

        let s = self
            .waypoints
            .iter()
            .take(prev + 1)
            .tuple_windows()
            .map(|(a, b)| a.pos.distance(b.pos))
            .sum::<f64>()
            + proj.magnitude();

        FrenetPos::new(s, d)
    }

    /// Converts road-relative coordinates back to a world-space position.
    /// `s` is taken modulo the track length, so coordinates past the
    /// wraparound point land back at the start of the loop.
    pub fn from_frenet(&self, frenet: FrenetPos) -> Point2d {
        let s = frenet.s.rem_euclid(self.max_s);

        let prev = self
            .waypoints
            .iter()
            .rposition(|wp| wp.s <= s)
            .unwrap_or(0);
        let next = (prev + 1) % self.waypoints.len();

        let a = self.waypoints[prev].pos;
        let b = self.waypoints[next].pos;
        let heading = (b.y - a.y).atan2(b.x - a.x);

        let seg_s = s - self.waypoints[prev].s;
        let on_track = a + seg_s * Vector2d::new(heading.cos(), heading.sin());

        let perp = heading - FRAC_PI_2;
        on_track + frenet.d * Vector2d::new(perp.cos(), perp.sin())
    }
}
