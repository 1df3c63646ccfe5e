//! Synthesis of the output path: a smooth, fixed-horizon sequence of world
//! positions splicing onto the unconsumed tail of the previous cycle's path.

use crate::math::{project_local, rot90, unproject_local, CubicSpline, Point2d, Vector2d};
use crate::planner::{EgoState, PathPair, PlannerConfig, MPH_PER_MPS};
use crate::road::{FrenetPos, RoadMap};
use crate::target::ManeuverTarget;
use itertools::Itertools;
use smallvec::SmallVec;

/// Builds the output path for the selected maneuver.
///
/// The unconsumed previous path is copied verbatim as the prefix, then the
/// path is filled to the full horizon by sampling a spline fitted through
/// sparse anchor points at the target lateral offset. `projection_end` is the
/// last road-relative sample of the selected candidate's projection.
///
/// Returns `None` when the anchors fail to produce a strictly increasing
/// local longitudinal ordering, which can happen under sharp curvature; the
/// caller should then fall back to the previous path alone.
pub(crate) fn generate(
    map: &RoadMap,
    config: &PlannerConfig,
    ego: &EgoState,
    previous: &PathPair,
    projection_end: FrenetPos,
    target: &ManeuverTarget,
) -> Option<PathPair> {
    let prev_len = previous.len();

    // The reference frame for the spline fit: the last committed point and
    // the bearing into it. With leftover points the bearing is re-derived
    // from the final step into the last one, overriding the reported
    // heading, so the new suffix continues the committed path tangentially.
    let mut ref_pos = ego.pos;
    let mut ref_yaw = ego.yaw;

    let mut anchors: SmallVec<[Point2d; 5]> = SmallVec::new();
    if prev_len >= 2 {
        let last = previous.point(prev_len - 1);
        let before = previous.point(prev_len - 2);
        ref_pos = last;
        ref_yaw = (last.y - before.y).atan2(last.x - before.x);
        anchors.push(before);
        anchors.push(last);
    } else if prev_len == 1 && previous.point(0) != ego.pos {
        // A single leftover point: the reported pose stands in for the
        // missing second-to-last point.
        let last = previous.point(0);
        ref_pos = last;
        ref_yaw = (last.y - ego.pos.y).atan2(last.x - ego.pos.x);
        anchors.push(ego.pos);
        anchors.push(last);
    } else {
        let behind = Point2d::new(ego.pos.x - ego.yaw.cos(), ego.pos.y - ego.yaw.sin());
        anchors.push(behind);
        anchors.push(ego.pos);
    }

    // Three anchors spaced down the track at the target lateral offset.
    for i in 0..3 {
        let s = projection_end.s + i as f64 * config.anchor_spacing;
        anchors.push(map.from_frenet(FrenetPos::new(s, target.offset)));
    }

    // Rotate and translate into the local frame where the reference point is
    // the origin and the reference heading is the x-axis.
    let x_axis = Vector2d::new(ref_yaw.cos(), ref_yaw.sin());
    let y_axis = rot90(x_axis);
    let local: SmallVec<[Point2d; 5]> = anchors
        .iter()
        .map(|p| project_local(*p, ref_pos, x_axis, y_axis))
        .collect();

    if local.iter().tuple_windows().any(|(a, b)| b.x <= a.x) {
        return None;
    }

    let xs: SmallVec<[f64; 5]> = local.iter().map(|p| p.x).collect();
    let ys: SmallVec<[f64; 5]> = local.iter().map(|p| p.y).collect();
    let spline = CubicSpline::fit(&xs, &ys)?;

    // Sample spacing that covers the lookahead distance at the target speed,
    // one sample per controller time step.
    let target_x = config.lookahead;
    let target_y = spline.y(target_x);
    let target_dist = (target_x * target_x + target_y * target_y).sqrt();
    let samples = target_dist / (config.time_step * target.speed / MPH_PER_MPS);
    let x_step = target_x / samples;

    let mut path = previous.clone();
    for i in 1..=config.horizon.saturating_sub(prev_len) {
        let x = i as f64 * x_step;
        let local = Point2d::new(x, spline.y(x));
        path.push(unproject_local(local, ref_pos, x_axis, y_axis));
    }
    Some(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::road::Waypoint;
    use assert_approx_eq::assert_approx_eq;
    use cgmath::MetricSpace;

    fn straight_track() -> RoadMap {
        let waypoints = (0..40)
            .map(|i| Waypoint {
                pos: Point2d::new(10.0 * i as f64, 0.0),
                s: 10.0 * i as f64,
                normal: Vector2d::new(0.0, -1.0),
            })
            .collect();
        RoadMap::new(waypoints, 400.0).unwrap()
    }

    fn ego_at(pos: Point2d, yaw: f64, frenet: FrenetPos) -> EgoState {
        EgoState {
            pos,
            yaw,
            frenet,
            speed: 45.0,
            lane: 1,
        }
    }

    #[test]
    fn fills_to_the_horizon_without_a_previous_path() {
        let map = straight_track();
        let config = PlannerConfig::default();
        let ego = ego_at(Point2d::new(20.0, -6.0), 0.0, FrenetPos::new(20.0, 6.0));
        let target = ManeuverTarget {
            offset: 6.0,
            speed: 45.0,
        };

        let path = generate(
            &map,
            &config,
            &ego,
            &PathPair::default(),
            FrenetPos::new(22.0, 6.0),
            &target,
        )
        .unwrap();

        assert_eq!(path.len(), config.horizon);
        // Stays on the lane centre of a straight road.
        for i in 0..path.len() {
            assert_approx_eq!(path.point(i).y, -6.0, 1e-6);
        }
        // Spaced to cover the lookahead at the target speed.
        let expected_step = config.time_step * 45.0 / MPH_PER_MPS;
        assert_approx_eq!(path.point(0).x, 20.0 + expected_step, 1e-6);
        assert_approx_eq!(
            path.point(path.len() - 1).x,
            20.0 + config.horizon as f64 * expected_step,
            1e-4
        );
    }

    #[test]
    fn previous_path_prefix_is_verbatim() {
        let map = straight_track();
        let config = PlannerConfig::default();

        let mut previous = PathPair::default();
        for i in 0..10 {
            previous.push(Point2d::new(20.0 + 0.4 * i as f64, -6.0));
        }
        let last = previous.point(9);
        let ego = ego_at(last, 0.0, FrenetPos::new(last.x, 6.0));
        let target = ManeuverTarget {
            offset: 6.0,
            speed: 45.0,
        };

        let path = generate(&map, &config, &ego, &previous, FrenetPos::new(last.x + 2.0, 6.0), &target).unwrap();

        assert_eq!(path.len(), config.horizon);
        for i in 0..previous.len() {
            assert_eq!(path.point(i), previous.point(i));
        }
        // No teleportation at the splice point.
        let gap = path.point(10).distance(path.point(9));
        assert!(gap < 2.0 * config.time_step * config.max_speed / MPH_PER_MPS);
    }

    #[test]
    fn splices_from_a_single_leftover_point() {
        let map = straight_track();
        let config = PlannerConfig::default();

        // One committed point remains, just ahead of the reported pose.
        let mut previous = PathPair::default();
        previous.push(Point2d::new(20.4, -6.0));
        let ego = ego_at(Point2d::new(20.0, -6.0), 0.0, FrenetPos::new(20.4, 6.0));
        let target = ManeuverTarget {
            offset: 6.0,
            speed: 45.0,
        };

        let path = generate(&map, &config, &ego, &previous, FrenetPos::new(22.4, 6.0), &target)
            .unwrap();

        assert_eq!(path.len(), config.horizon);
        assert_eq!(path.point(0), Point2d::new(20.4, -6.0));
        for i in 1..path.len() {
            assert!(path.point(i).x > path.point(i - 1).x);
        }
        // No teleportation off the leftover point.
        let gap = path.point(1).distance(path.point(0));
        assert!(gap <= config.time_step * 45.0 / MPH_PER_MPS + 1e-9);
    }

    #[test]
    fn rejects_anchors_that_fold_back() {
        let map = straight_track();
        let config = PlannerConfig::default();
        // Facing backwards along the track: the down-track anchors land
        // behind the reference frame and the local ordering collapses.
        let ego = ego_at(
            Point2d::new(20.0, -6.0),
            std::f64::consts::PI,
            FrenetPos::new(20.0, 6.0),
        );
        let target = ManeuverTarget {
            offset: 6.0,
            speed: 45.0,
        };

        let rejected = generate(
            &map,
            &config,
            &ego,
            &PathPair::default(),
            FrenetPos::new(22.0, 6.0),
            &target,
        );
        assert!(rejected.is_none());
    }
}
