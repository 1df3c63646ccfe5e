//! The planning session: one `plan_cycle` call per telemetry input.

use crate::behavior::{self, ManeuverCandidate};
use crate::math::Point2d;
use crate::road::{FrenetPos, RoadMap};
use crate::target::{self, ManeuverTarget};
use crate::traffic::{lane_index, Observation, ObservedVehicle};
use crate::trajectory;
use log::{debug, warn};
use smallvec::SmallVec;
use std::sync::Arc;

/// Conversion factor between mi/h and m/s: `mi/h = 2.24 × m/s`.
pub(crate) const MPH_PER_MPS: f64 = 2.24;

/// Static configuration of the planner.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannerConfig {
    /// The width of each lane, in m.
    pub lane_width: f64,
    /// The number of lanes on the paved width. Lane 0 is the leftmost.
    pub lane_count: usize,
    /// The minimum following gap to a vehicle ahead, in m.
    pub safety_gap: f64,
    /// The maximum comfortable cruising speed, in mi/h.
    pub max_speed: f64,
    /// The number of points in each output path.
    pub horizon: usize,
    /// The time between consecutive output points, in s.
    pub time_step: f64,
    /// Seed speed for the very first cycle, in mi/h.
    pub startup_speed: f64,
    /// Seed lane for the very first cycle.
    pub startup_lane: usize,
    /// How far down the road the output path reaches, in m.
    pub lookahead: f64,
    /// The longitudinal spacing between trajectory anchor points, in m.
    pub anchor_spacing: f64,
    /// Candidate-selection weight on driving below the cruising speed.
    pub speed_weight: f64,
    /// Candidate-selection weight on lateral disruption.
    pub lateral_weight: f64,
    /// Always execute the lane-keeping candidate, ignoring costs.
    pub keep_lane_only: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            lane_width: 4.0,
            lane_count: 3,
            safety_gap: 30.0,
            max_speed: 49.5,
            horizon: 50,
            time_step: 0.02,
            startup_speed: 5.0,
            startup_lane: 1,
            lookahead: 30.0,
            anchor_spacing: 30.0,
            speed_weight: 1.0,
            lateral_weight: 0.25,
            keep_lane_only: false,
        }
    }
}

/// An ordered sequence of world positions, stored as the two parallel
/// coordinate sequences that cross the wire.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathPair {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl PathPair {
    /// The number of points on the path.
    pub fn len(&self) -> usize {
        usize::min(self.x.len(), self.y.len())
    }

    /// Whether the path has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `idx`-th point on the path.
    pub fn point(&self, idx: usize) -> Point2d {
        Point2d::new(self.x[idx], self.y[idx])
    }

    /// Appends a point to the path.
    pub fn push(&mut self, point: Point2d) {
        self.x.push(point.x);
        self.y.push(point.y);
    }

    /// Whether the coordinate sequences are equal length and all finite.
    pub fn is_well_formed(&self) -> bool {
        self.x.len() == self.y.len()
            && self.x.iter().chain(&self.y).all(|v| v.is_finite())
    }
}

/// One cycle's decoded telemetry input.
#[derive(Clone, Debug)]
pub struct CycleInput {
    /// The controlled vehicle's position in world space.
    pub pos: Point2d,
    /// The controlled vehicle's heading, in radians.
    pub yaw: f64,
    /// The controlled vehicle's reported speed, in mi/h.
    pub speed: f64,
    /// The unconsumed tail of the previous cycle's output path.
    pub previous_path: PathPair,
    /// The road-relative coordinates the previous path ends at.
    /// Ignored when the previous path is empty.
    pub end_path: FrenetPos,
    /// The observed vehicles on the same side of the road.
    pub observations: Vec<Observation>,
}

impl CycleInput {
    /// Whether every field is present and finite. A cycle failing this is
    /// skipped rather than crashing the planner.
    pub fn is_valid(&self) -> bool {
        self.pos.x.is_finite()
            && self.pos.y.is_finite()
            && self.yaw.is_finite()
            && self.speed.is_finite()
            && (self.previous_path.is_empty() || self.end_path.is_finite())
            && self.previous_path.is_well_formed()
    }
}

/// The controlled vehicle's state for one planning cycle: the reported pose
/// plus the road-relative position at the end of its committed path.
#[derive(Clone, Copy, Debug)]
pub struct EgoState {
    /// The reported position in world space.
    pub pos: Point2d,
    /// The reported heading in radians.
    pub yaw: f64,
    /// Road-relative position at the end of the committed path, where the
    /// fresh path suffix begins.
    pub frenet: FrenetPos,
    /// Longitudinal speed in mi/h.
    pub speed: f64,
    /// The lane currently occupied.
    pub lane: usize,
}

/// Whether the session has completed its first cycle. The first cycle seeds
/// the controlled vehicle's speed and lane from the configured startup
/// values, since the initial telemetry is transient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    Init,
    Running,
}

/// A planning session.
///
/// Owns all state that persists across cycles; each call to
/// [plan_cycle](Planner::plan_cycle) runs one complete cycle and returns
/// the output path. Independent of any transport.
pub struct Planner {
    config: PlannerConfig,
    map: Arc<RoadMap>,
    state: SessionState,
    /// The most recently issued path, held as the fallback for a cycle
    /// whose input cannot be used.
    last_path: PathPair,
}

impl Planner {
    /// Creates a new planning session over the given reference track.
    pub fn new(config: PlannerConfig, map: Arc<RoadMap>) -> Self {
        Self {
            config,
            map,
            state: SessionState::Init,
            last_path: PathPair::default(),
        }
    }

    /// The planner's configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// The path issued by the most recent cycle.
    pub fn last_path(&self) -> &PathPair {
        &self.last_path
    }

    /// Runs one planning cycle and returns the path to follow.
    ///
    /// A malformed input does not fail the session: the previous cycle's
    /// path is held (or an empty path is returned when none exists yet).
    pub fn plan_cycle(&mut self, input: &CycleInput) -> PathPair {
        if !input.is_valid() {
            warn!("malformed cycle input; holding last path");
            return self.last_path.clone();
        }

        let path = self.plan(input);
        self.state = SessionState::Running;
        self.last_path = path.clone();
        path
    }

    fn plan(&self, input: &CycleInput) -> PathPair {
        let previous = &input.previous_path;

        let vehicles: Vec<ObservedVehicle> = input
            .observations
            .iter()
            .filter_map(|obs| ObservedVehicle::from_observation(obs, self.config.lane_width))
            .collect();

        // The road-relative state is anchored at the end of the committed
        // path, which is where the new path suffix begins. The world-space
        // pose stays as reported; the trajectory generator needs it when the
        // committed path has run down to one point or none.
        let frenet = if previous.is_empty() {
            self.map.to_frenet(input.pos, input.yaw)
        } else {
            input.end_path
        };
        let (speed, lane) = match self.state {
            SessionState::Init => (self.config.startup_speed, self.config.startup_lane),
            SessionState::Running => {
                let lane = lane_index(frenet.d, self.config.lane_width)
                    .map(|lane| lane.min(self.config.lane_count - 1))
                    .unwrap_or(0);
                (input.speed, lane)
            }
        };
        let ego = EgoState {
            pos: input.pos,
            yaw: input.yaw,
            frenet,
            speed,
            lane,
        };

        // Forecasts are shifted to where the committed path ends.
        let forecast_offset = previous.len() as f64 * self.config.time_step;

        let candidates =
            behavior::admissible_candidates(&ego, &vehicles, &self.config, forecast_offset);
        let targets: SmallVec<[ManeuverTarget; 3]> = candidates
            .iter()
            .map(|c| target::resolve(c, &ego, &vehicles, &self.config, forecast_offset))
            .collect();

        let chosen = target::select(&candidates, &targets, &ego, &self.config);
        let (candidate, target) = match (candidates.get(chosen), targets.get(chosen)) {
            (Some(candidate), Some(target)) => (candidate, target),
            _ => {
                warn!("no admissible maneuver candidate; holding previous path");
                return previous.clone();
            }
        };
        debug!(
            "executing {:?} towards lane {} at {:.1} mi/h",
            candidate.maneuver, candidate.lane, target.speed
        );

        let projection_end = projection_end(candidate, ego.frenet);
        match trajectory::generate(&self.map, &self.config, &ego, previous, projection_end, target)
        {
            Some(path) => path,
            None => {
                warn!("anchor points not monotonic; reusing previous path only");
                previous.clone()
            }
        }
    }
}

/// The last road-relative sample of a candidate's projection.
fn projection_end(candidate: &ManeuverCandidate, fallback: FrenetPos) -> FrenetPos {
    candidate.projection.last().copied().unwrap_or(fallback)
}
