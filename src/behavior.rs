//! The maneuver state machine: which lane-keep and lane-change maneuvers
//! are admissible this cycle, and their projected road-relative trajectories.

use crate::planner::{EgoState, PlannerConfig, MPH_PER_MPS};
use crate::road::FrenetPos;
use crate::traffic::ObservedVehicle;
use crate::util::Interval;
use smallvec::SmallVec;

/// A lane-keeping or lane-changing maneuver the planner may execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Maneuver {
    KeepLane,
    ChangeLeft,
    ChangeRight,
}

impl Maneuver {
    /// The lane this maneuver ends in, starting from `lane`, or `None`
    /// when it would leave the paved width. Lane 0 is the leftmost lane.
    pub fn target_lane(self, lane: usize, lane_count: usize) -> Option<usize> {
        match self {
            Maneuver::KeepLane => Some(lane),
            Maneuver::ChangeLeft => lane.checked_sub(1),
            Maneuver::ChangeRight => (lane + 1 < lane_count).then_some(lane + 1),
        }
    }
}

/// A candidate maneuver with its projected trajectory for this cycle.
#[derive(Clone, Debug)]
pub struct ManeuverCandidate {
    pub maneuver: Maneuver,
    /// The lane the maneuver ends in.
    pub lane: usize,
    /// Projected road-relative samples over the planning horizon:
    /// straight-line longitudinal progression at the target lane's centre.
    pub projection: Vec<FrenetPos>,
}

/// Which safety envelopes are violated by observed traffic this cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Proximity {
    /// A vehicle sits within the following gap ahead in the current lane.
    pub ahead: bool,
    /// The left adjacent lane's envelope is occupied.
    pub left: bool,
    /// The right adjacent lane's envelope is occupied.
    pub right: bool,
}

/// Checks every observed vehicle's forecast against the safety envelopes
/// around the controlled vehicle.
///
/// The current lane only considers traffic ahead; adjacent lanes consider
/// traffic both ahead and behind, since a lane change needs clear space in
/// both directions. `forecast_offset` shifts the forecasts to where the
/// controlled vehicle's committed path ends.
pub fn check_proximity(
    ego: &EgoState,
    vehicles: &[ObservedVehicle],
    config: &PlannerConfig,
    forecast_offset: f64,
) -> Proximity {
    let ahead = Interval::new(ego.frenet.s, ego.frenet.s + config.safety_gap);
    let beside = Interval::disc(ego.frenet.s, config.safety_gap);

    let mut proximity = Proximity::default();
    for vehicle in vehicles {
        let lane = match vehicle.lane() {
            Some(lane) => lane,
            None => continue,
        };
        let mut forecast = vehicle.forecast(forecast_offset, config.horizon, config.time_step);
        if lane == ego.lane {
            proximity.ahead |= forecast.any(|p| ahead.contains(p.s));
        } else if ego.lane > 0 && lane == ego.lane - 1 {
            proximity.left |= forecast.any(|p| beside.contains(p.s));
        } else if lane == ego.lane + 1 {
            proximity.right |= forecast.any(|p| beside.contains(p.s));
        }
    }
    proximity
}

/// Enumerates the maneuvers that are admissible this cycle.
///
/// `KeepLane` is always admissible; a lane change is excluded when it would
/// leave the paved width or its target lane's safety envelope is occupied.
pub fn admissible_candidates(
    ego: &EgoState,
    vehicles: &[ObservedVehicle],
    config: &PlannerConfig,
    forecast_offset: f64,
) -> SmallVec<[ManeuverCandidate; 3]> {
    let proximity = check_proximity(ego, vehicles, config, forecast_offset);

    let mut candidates = SmallVec::new();
    for maneuver in [Maneuver::KeepLane, Maneuver::ChangeLeft, Maneuver::ChangeRight] {
        let lane = match maneuver.target_lane(ego.lane, config.lane_count) {
            Some(lane) => lane,
            None => continue,
        };
        let blocked = match maneuver {
            Maneuver::KeepLane => false,
            Maneuver::ChangeLeft => proximity.left,
            Maneuver::ChangeRight => proximity.right,
        };
        if blocked {
            continue;
        }
        candidates.push(ManeuverCandidate {
            maneuver,
            lane,
            projection: project_trajectory(ego, lane, config),
        });
    }
    candidates
}

/// Projects the controlled vehicle's trajectory under a maneuver's intent:
/// constant speed along the track at the target lane's centre offset.
fn project_trajectory(ego: &EgoState, lane: usize, config: &PlannerConfig) -> Vec<FrenetPos> {
    let speed = ego.speed / MPH_PER_MPS;
    let d = config.lane_width * (lane as f64 + 0.5);
    (1..=config.horizon)
        .map(|i| FrenetPos::new(ego.frenet.s + i as f64 * config.time_step * speed, d))
        .collect()
}
