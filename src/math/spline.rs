use itertools::Itertools;

/// A natural cubic spline interpolating a set of knot points.
///
/// Used to fit a smooth curve through the sparse trajectory anchor points;
/// evaluating between the knots gives a jerk-limited path.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    /// The knot x coordinates, strictly increasing.
    xs: Vec<f64>,
    /// Per-segment polynomial coefficients `[a, b, c, d]` such that
    /// `y = a + b*dx + c*dx^2 + d*dx^3` with `dx` relative to the segment start.
    coeffs: Vec<[f64; 4]>,
}

impl CubicSpline {
    /// Fits a natural cubic spline through the given points.
    ///
    /// Returns `None` unless there are at least three points and the
    /// x coordinates are finite and strictly increasing.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n < 3 || ys.len() != n {
            return None;
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return None;
        }
        if xs.iter().tuple_windows().any(|(a, b)| b <= a) {
            return None;
        }

        let h: Vec<f64> = xs.iter().tuple_windows().map(|(a, b)| b - a).collect();

        // Solve the tridiagonal system for the quadratic coefficients with
        // natural boundary conditions, c[0] = c[n-1] = 0 (Thomas algorithm).
        let mut upper = vec![0.0; n];
        let mut rhs = vec![0.0; n];
        for i in 1..n - 1 {
            let low = h[i - 1];
            let diag = 2.0 * (h[i - 1] + h[i]) - low * upper[i - 1];
            upper[i] = h[i] / diag;
            let r = 3.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
            rhs[i] = (r - low * rhs[i - 1]) / diag;
        }
        let mut c = vec![0.0; n];
        for i in (1..n - 1).rev() {
            c[i] = rhs[i] - upper[i] * c[i + 1];
        }

        let coeffs = (0..n - 1)
            .map(|i| {
                let b = (ys[i + 1] - ys[i]) / h[i] - h[i] * (c[i + 1] + 2.0 * c[i]) / 3.0;
                let d = (c[i + 1] - c[i]) / (3.0 * h[i]);
                [ys[i], b, c[i], d]
            })
            .collect();

        Some(Self {
            xs: xs.to_vec(),
            coeffs,
        })
    }

    /// Evaluates the spline at `x`. Queries outside the knot range
    /// extrapolate the first or last segment's polynomial.
    pub fn y(&self, x: f64) -> f64 {
        let seg = self
            .xs
            .iter()
            .rposition(|&knot| knot <= x)
            .unwrap_or(0)
            .min(self.coeffs.len() - 1);
        let dx = x - self.xs[seg];
        let [a, b, c, d] = self.coeffs[seg];
        a + b * dx + c * dx * dx + d * dx * dx * dx
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{Rng, SeedableRng};

    #[test]
    fn interpolates_knots() {
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        for _i in 0..100 {
            let xs: Vec<f64> = (0..6).map(|i| 10.0 * i as f64).collect();
            let ys: Vec<f64> = (0..6).map(|_| rng.gen_range(-50.0..50.0)).collect();
            let spline = CubicSpline::fit(&xs, &ys).unwrap();
            for (x, y) in xs.iter().zip(&ys) {
                assert_approx_eq!(spline.y(*x), *y, 1e-9);
            }
        }
    }

    #[test]
    fn reproduces_straight_lines() {
        let xs = [-5.0, 0.0, 10.0, 25.0, 60.0];
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x + 1.0).collect();
        let spline = CubicSpline::fit(&xs, &ys).unwrap();

        for i in 0..120 {
            let x = -5.0 + 0.5 * i as f64;
            assert_approx_eq!(spline.y(x), 2.0 * x + 1.0, 1e-9);
        }
    }

    #[test]
    fn is_continuous_between_segments() {
        let xs = [0.0, 1.0, 3.0, 6.0, 10.0];
        let ys = [0.0, 2.0, -1.0, 4.0, 0.0];
        let spline = CubicSpline::fit(&xs, &ys).unwrap();

        for knot in &xs[1..4] {
            let before = spline.y(knot - 1e-9);
            let after = spline.y(knot + 1e-9);
            assert_approx_eq!(before, after, 1e-6);
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(CubicSpline::fit(&[0.0, 1.0], &[0.0, 1.0]).is_none());
        assert!(CubicSpline::fit(&[0.0, 2.0, 1.0], &[0.0, 1.0, 2.0]).is_none());
        assert!(CubicSpline::fit(&[0.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_none());
        assert!(CubicSpline::fit(&[0.0, f64::NAN, 2.0], &[0.0, 1.0, 2.0]).is_none());
        assert!(CubicSpline::fit(&[0.0, 1.0, 2.0], &[0.0, 1.0]).is_none());
    }
}
