//! Resolves each maneuver candidate into a target lateral offset and
//! longitudinal speed, and selects the candidate to execute.

use crate::behavior::{Maneuver, ManeuverCandidate};
use crate::planner::{EgoState, PlannerConfig, MPH_PER_MPS};
use crate::traffic::ObservedVehicle;
use crate::util::Interval;

/// The resolved goal of a maneuver candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ManeuverTarget {
    /// The target lateral offset in m: the candidate lane's centre.
    pub offset: f64,
    /// The target longitudinal speed in mi/h.
    pub speed: f64,
}

/// Resolves a candidate's target offset and speed.
///
/// The speed is the maximum comfortable cruising speed, reduced to match the
/// nearest lead vehicle when one occupies the candidate's lane within the
/// safety gap ahead.
pub fn resolve(
    candidate: &ManeuverCandidate,
    ego: &EgoState,
    vehicles: &[ObservedVehicle],
    config: &PlannerConfig,
    forecast_offset: f64,
) -> ManeuverTarget {
    let offset = config.lane_width * (candidate.lane as f64 + 0.5);

    let gap_ahead = Interval::new(ego.frenet.s, ego.frenet.s + config.safety_gap);
    let lead = vehicles
        .iter()
        .filter(|v| v.lane() == Some(candidate.lane))
        .map(|v| (v.predicted_s(forecast_offset), v.speed()))
        .filter(|(s, _)| gap_ahead.contains(*s))
        .min_by(|a, b| a.0.total_cmp(&b.0));

    let speed = match lead {
        Some((_, lead_speed)) => f64::min(config.max_speed, lead_speed * MPH_PER_MPS),
        None => config.max_speed,
    };

    ManeuverTarget { offset, speed }
}

/// The cost of executing a candidate with the given target: increases as the
/// target speed falls below the cruising speed and with the lateral
/// displacement needed to reach the target offset.
pub fn cost(target: &ManeuverTarget, ego: &EgoState, config: &PlannerConfig) -> f64 {
    let speed_cost = (config.max_speed - target.speed) / config.max_speed;
    let lateral_cost = (target.offset - ego.frenet.d).abs() / config.lane_width;
    config.speed_weight * speed_cost + config.lateral_weight * lateral_cost
}

/// Selects the candidate to execute: the one with minimum cost, the earliest
/// enumerated winning ties. With `keep_lane_only` set, the lane-keeping
/// candidate is always chosen, degenerating to a pure lane-keeping policy.
pub fn select(
    candidates: &[ManeuverCandidate],
    targets: &[ManeuverTarget],
    ego: &EgoState,
    config: &PlannerConfig,
) -> usize {
    if config.keep_lane_only {
        if let Some(idx) = candidates
            .iter()
            .position(|c| c.maneuver == Maneuver::KeepLane)
        {
            return idx;
        }
    }

    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (idx, target) in targets.iter().enumerate() {
        let cost = cost(target, ego, config);
        if cost < best_cost {
            best = idx;
            best_cost = cost;
        }
    }
    best
}
