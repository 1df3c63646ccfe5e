pub use behavior::{Maneuver, ManeuverCandidate, Proximity};
pub use cgmath;
pub use planner::{CycleInput, EgoState, PathPair, Planner, PlannerConfig};
pub use road::{FrenetPos, MapError, RoadMap, Waypoint};
pub use target::ManeuverTarget;
pub use traffic::{lane_index, Forecast, Observation, ObservedVehicle};
pub use util::Interval;

pub mod behavior;
pub mod math;
mod planner;
mod road;
pub mod target;
mod traffic;
mod trajectory;
mod util;
