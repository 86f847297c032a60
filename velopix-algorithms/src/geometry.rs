//! Straight-line geometry shared by the reconstruction algorithms.
//!
//! Tracks in the vertex detector are close to straight lines, so every
//! algorithm reasons in terms of slopes `(dx/dz, dy/dz)` and straight-line
//! extrapolation between modules.

use std::str::FromStr;

use velopix_core::{Error, Hit, Result};

/// Distance metric used to compare an extrapolated position with a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DistanceMetric {
    /// `sqrt(dx² + dy²)`
    #[default]
    Euclidean,
    /// `|dx| + |dy|`
    Manhattan,
    /// `max(|dx|, |dy|)`
    Chebyshev,
}

impl DistanceMetric {
    /// Labels accepted by [`FromStr`], in schema order.
    pub const LABELS: [&'static str; 3] = ["euclidean", "manhattan", "chebyshev"];

    /// Distance for a transverse offset.
    #[inline]
    #[must_use]
    pub fn distance(self, dx: f64, dy: f64) -> f64 {
        match self {
            Self::Euclidean => dx.hypot(dy),
            Self::Manhattan => dx.abs() + dy.abs(),
            Self::Chebyshev => dx.abs().max(dy.abs()),
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "euclidean" => Ok(Self::Euclidean),
            "manhattan" => Ok(Self::Manhattan),
            "chebyshev" => Ok(Self::Chebyshev),
            other => Err(Error::invalid_parameter(
                "distance_metric",
                format!("unknown metric `{other}`"),
            )),
        }
    }
}

/// Transverse position of the line through `a` and `b` at `z`.
///
/// Falls back to `b`'s position when `a` and `b` share the same z.
#[inline]
#[must_use]
pub fn extrapolate(a: &Hit, b: &Hit, z: f64) -> (f64, f64) {
    match a.slope_to(b) {
        Some((tx, ty)) => (b.x + tx * (z - b.z), b.y + ty * (z - b.z)),
        None => (b.x, b.y),
    }
}

/// True if the segment `a → b` moves forward in z within the slope bounds.
#[inline]
#[must_use]
pub fn within_slopes(a: &Hit, b: &Hit, max_slope_x: f64, max_slope_y: f64) -> bool {
    match a.slope_to(b) {
        Some((tx, ty)) => b.z > a.z && tx.abs() <= max_slope_x && ty.abs() <= max_slope_y,
        None => false,
    }
}

/// Squared angular deviation of `c` from the line through `a` and `b`:
/// the transverse residual at `c` divided by the lever arm `c.z - b.z`,
/// squared. Zero for perfectly collinear hits.
#[inline]
#[must_use]
pub fn scatter(a: &Hit, b: &Hit, c: &Hit) -> f64 {
    let (px, py) = extrapolate(a, b, c.z);
    let dz = c.z - b.z;
    if dz.abs() < f64::EPSILON {
        return f64::INFINITY;
    }
    let dx = c.x - px;
    let dy = c.y - py;
    (dx * dx + dy * dy) / (dz * dz)
}

/// Change of slope between the segments `a → b` and `b → c`, per axis.
#[inline]
#[must_use]
pub fn slope_change(a: &Hit, b: &Hit, c: &Hit) -> Option<(f64, f64)> {
    let (tx0, ty0) = a.slope_to(b)?;
    let (tx1, ty1) = b.slope_to(c)?;
    Some(((tx1 - tx0).abs(), (ty1 - ty0).abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_distance_metrics() {
        assert_abs_diff_eq!(DistanceMetric::Euclidean.distance(3.0, -4.0), 5.0);
        assert_abs_diff_eq!(DistanceMetric::Manhattan.distance(3.0, -4.0), 7.0);
        assert_abs_diff_eq!(DistanceMetric::Chebyshev.distance(3.0, -4.0), 4.0);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!(
            "Manhattan".parse::<DistanceMetric>().unwrap(),
            DistanceMetric::Manhattan
        );
        assert!("hamming".parse::<DistanceMetric>().is_err());
        for label in DistanceMetric::LABELS {
            assert!(label.parse::<DistanceMetric>().is_ok());
        }
    }

    #[test]
    fn test_extrapolate_and_scatter() {
        let a = Hit::new(0, 0.0, 0.0, 0.0, 0);
        let b = Hit::new(1, 1.0, 0.5, 10.0, 1);
        let (x, y) = extrapolate(&a, &b, 20.0);
        assert_abs_diff_eq!(x, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-12);

        let on_line = Hit::new(2, 2.0, 1.0, 20.0, 2);
        assert_abs_diff_eq!(scatter(&a, &b, &on_line), 0.0, epsilon = 1e-12);

        let off_line = Hit::new(3, 3.0, 1.0, 20.0, 2);
        assert_abs_diff_eq!(scatter(&a, &b, &off_line), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_within_slopes() {
        let a = Hit::new(0, 0.0, 0.0, 0.0, 0);
        let steep = Hit::new(1, 9.0, 0.0, 10.0, 1);
        let shallow = Hit::new(2, 1.0, -1.0, 10.0, 1);
        assert!(!within_slopes(&a, &steep, 0.7, 0.7));
        assert!(within_slopes(&a, &shallow, 0.7, 0.7));
        // Backwards in z is never compatible.
        assert!(!within_slopes(&shallow, &a, 0.7, 0.7));
    }

    #[test]
    fn test_slope_change() {
        let a = Hit::new(0, 0.0, 0.0, 0.0, 0);
        let b = Hit::new(1, 1.0, 0.0, 10.0, 1);
        let c = Hit::new(2, 3.0, 0.0, 20.0, 2);
        let (dtx, dty) = slope_change(&a, &b, &c).unwrap();
        assert_abs_diff_eq!(dtx, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(dty, 0.0);
    }
}
