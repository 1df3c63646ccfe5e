//! Observed traffic: per-vehicle kinematic state and short-horizon forecasts.

use crate::math::{Point2d, Vector2d};
use crate::road::FrenetPos;
use cgmath::prelude::*;
use log::debug;

/// A raw per-vehicle observation, as decoded from the sensor pipeline.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    /// Unique ID of the observed vehicle.
    pub id: u64,
    /// The vehicle's position in world space.
    pub pos: Point2d,
    /// The vehicle's velocity in world space, in m/s.
    pub vel: Vector2d,
    /// The vehicle's road-relative position.
    pub frenet: FrenetPos,
}

impl Observation {
    /// Creates an observation from the wire-format septuple
    /// `(id, x, y, vx, vy, s, d)`.
    pub fn new(id: u64, x: f64, y: f64, vx: f64, vy: f64, s: f64, d: f64) -> Self {
        Self {
            id,
            pos: Point2d::new(x, y),
            vel: Vector2d::new(vx, vy),
            frenet: FrenetPos::new(s, d),
        }
    }
}

/// An observed vehicle's kinematic state, derived fresh each planning cycle.
#[derive(Clone, Copy, Debug)]
pub struct ObservedVehicle {
    id: u64,
    frenet: FrenetPos,
    /// Longitudinal speed in m/s.
    speed: f64,
    lane: Option<usize>,
}

impl ObservedVehicle {
    /// Derives the kinematic state from a raw observation.
    ///
    /// Returns `None` when the observation carries degenerate kinematics,
    /// which excludes the vehicle from this cycle's proximity checks.
    pub fn from_observation(obs: &Observation, lane_width: f64) -> Option<Self> {
        let finite = obs.pos.x.is_finite()
            && obs.pos.y.is_finite()
            && obs.vel.x.is_finite()
            && obs.vel.y.is_finite()
            && obs.frenet.is_finite();
        if !finite {
            debug!("skipping vehicle {} with degenerate kinematics", obs.id);
            return None;
        }
        Some(Self {
            id: obs.id,
            frenet: obs.frenet,
            speed: obs.vel.magnitude(),
            lane: lane_index(obs.frenet.d, lane_width),
        })
    }

    /// The vehicle's ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The vehicle's road-relative position.
    pub fn frenet(&self) -> FrenetPos {
        self.frenet
    }

    /// The vehicle's longitudinal speed in m/s.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The lane the vehicle occupies, or `None` when it is off the paved width.
    pub fn lane(&self) -> Option<usize> {
        self.lane
    }

    /// The vehicle's predicted longitudinal coordinate `secs` seconds from
    /// now, under the constant-speed assumption.
    pub fn predicted_s(&self, secs: f64) -> f64 {
        self.frenet.s + self.speed * secs
    }

    /// A forecast of the vehicle's road-relative position, starting `offset`
    /// seconds from now, with `steps` samples spaced `dt` seconds apart.
    pub fn forecast(&self, offset: f64, steps: usize, dt: f64) -> Forecast {
        Forecast {
            s: self.predicted_s(offset),
            d: self.frenet.d,
            speed: self.speed,
            dt,
            remaining: steps,
        }
    }
}

/// Lane bucket for a lateral offset: `floor(d / lane_width)`, or `None`
/// when the offset is off the paved width.
pub fn lane_index(d: f64, lane_width: f64) -> Option<usize> {
    (d >= 0.0).then(|| (d / lane_width) as usize)
}

/// A lazy, finite sequence of predicted road-relative positions for an
/// observed vehicle, assuming constant longitudinal speed and no lateral
/// motion. Consumed once per planning cycle.
#[derive(Clone, Debug)]
pub struct Forecast {
    s: f64,
    d: f64,
    speed: f64,
    dt: f64,
    remaining: usize,
}

impl Iterator for Forecast {
    type Item = FrenetPos;

    fn next(&mut self) -> Option<FrenetPos> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let sample = FrenetPos::new(self.s, self.d);
        self.s += self.speed * self.dt;
        Some(sample)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Forecast {}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn derives_kinematics() {
        let obs = Observation::new(7, 100.0, -6.0, 3.0, 4.0, 100.0, 6.0);
        let veh = ObservedVehicle::from_observation(&obs, 4.0).unwrap();
        assert_eq!(veh.id(), 7);
        assert_approx_eq!(veh.speed(), 5.0);
        assert_eq!(veh.lane(), Some(1));
    }

    #[test]
    fn rejects_degenerate_kinematics() {
        let obs = Observation::new(7, 100.0, -6.0, f64::NAN, 4.0, 100.0, 6.0);
        assert!(ObservedVehicle::from_observation(&obs, 4.0).is_none());
    }

    #[test]
    fn lane_buckets() {
        assert_eq!(lane_index(0.0, 4.0), Some(0));
        assert_eq!(lane_index(3.9, 4.0), Some(0));
        assert_eq!(lane_index(4.0, 4.0), Some(1));
        assert_eq!(lane_index(7.9, 4.0), Some(1));
        assert_eq!(lane_index(8.0, 4.0), Some(2));
        assert_eq!(lane_index(-0.1, 4.0), None);
    }

    #[test]
    fn forecast_advances_at_constant_speed() {
        let obs = Observation::new(1, 0.0, 0.0, 10.0, 0.0, 50.0, 6.0);
        let veh = ObservedVehicle::from_observation(&obs, 4.0).unwrap();

        let samples: Vec<_> = veh.forecast(1.0, 3, 0.5).collect();
        assert_eq!(samples.len(), 3);
        assert_approx_eq!(samples[0].s, 60.0);
        assert_approx_eq!(samples[1].s, 65.0);
        assert_approx_eq!(samples[2].s, 70.0);
        assert!(samples.iter().all(|p| p.d == 6.0));
    }
}
