//! Geographic utilities: haversine distance, polyline length and
//! center-of-mass calculations.
//!
//! Everything downstream (metrics, interpolation, overlap detection) sits on
//! these primitives, so they stay dependency-free and allocation-free.

use crate::{Result, TrackAnalysisError, TrackPoint};

/// Mean Earth diameter in kilometers, as used by the haversine formula below.
const EARTH_DIAMETER_KM: f64 = 12_742.0;

/// Calculate the great-circle distance between two points in meters using
/// the haversine formula.
///
/// The formulation avoids catastrophic cancellation for short (sub-kilometer)
/// separations, which dominate consecutive GPS samples.
///
/// # Example
/// ```
/// use track_analyzer::{haversine_distance, TrackPoint};
///
/// let london = TrackPoint::new(51.5074, -0.1278);
/// let paris = TrackPoint::new(48.8566, 2.3522);
/// let dist = haversine_distance(&london, &paris);
/// assert!((dist - 343_560.0).abs() < 5_000.0);
/// ```
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let rad = std::f64::consts::PI / 180.0;
    let a = 0.5 - ((p2.latitude - p1.latitude) * rad).cos() / 2.0
        + (p1.latitude * rad).cos()
            * (p2.latitude * rad).cos()
            * (1.0 - ((p2.longitude - p1.longitude) * rad).cos())
            / 2.0;

    EARTH_DIAMETER_KM * a.sqrt().asin() * 1000.0
}

/// Haversine distance with eager coordinate validation.
///
/// Out-of-range latitude/longitude fails with a `Validation` error instead
/// of silently producing a nonsense distance.
pub fn try_distance(p1: &TrackPoint, p2: &TrackPoint) -> Result<f64> {
    p1.validate()?;
    p2.validate()?;
    Ok(haversine_distance(p1, p2))
}

/// Total distance in meters along a sequence of points.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Estimate the center of a list of points as a (latitude, longitude) pair
/// in degrees, assuming a spherical earth.
///
/// The points are averaged as unit 3-vectors so the estimate stays sane
/// around the antimeridian. A single point returns that point.
pub fn center(points: &[TrackPoint]) -> Result<(f64, f64)> {
    if points.is_empty() {
        return Err(TrackAnalysisError::validation(
            "cannot compute the center of zero points".to_string(),
        ));
    }

    let rad = std::f64::consts::PI / 180.0;
    let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);

    for p in points {
        let lat = p.latitude * rad;
        let lng = p.longitude * rad;
        x += lat.cos() * lng.cos();
        y += lat.cos() * lng.sin();
        z += lat.sin();
    }

    let n = points.len() as f64;
    x /= n;
    y /= n;
    z /= n;

    let lat_c = z.atan2((x * x + y * y).sqrt());
    let lng_c = y.atan2(x);

    Ok((lat_c / rad, lng_c / rad))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = TrackPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let a = TrackPoint::new(51.5074, -0.1278);
        let b = TrackPoint::new(48.8566, 2.3522);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let london = TrackPoint::new(51.5074, -0.1278);
        let paris = TrackPoint::new(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5_000.0));
    }

    #[test]
    fn test_haversine_distance_short_separation() {
        // 0.001 degrees of longitude at the equator is roughly 111 m
        let a = TrackPoint::new(0.0, 0.0);
        let b = TrackPoint::new(0.0, 0.001);
        let dist = haversine_distance(&a, &b);
        assert!(approx_eq(dist, 111.2, 1.0));
    }

    #[test]
    fn test_try_distance_rejects_bad_coordinates() {
        let good = TrackPoint::new(51.5, -0.12);
        let bad = TrackPoint::new(91.0, 0.0);
        assert!(try_distance(&good, &bad).is_err());
        assert!(try_distance(&good, &good).is_ok());
    }

    #[test]
    fn test_polyline_length() {
        let points = vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.001),
            TrackPoint::new(0.0, 0.002),
        ];
        let total = polyline_length(&points);
        let step = haversine_distance(&points[0], &points[1]);
        assert!(approx_eq(total, 2.0 * step, 1e-9));
    }

    #[test]
    fn test_center_single_point() {
        let p = TrackPoint::new(47.99, 7.85);
        let (lat, lng) = center(&[p]).unwrap();
        assert!(approx_eq(lat, 47.99, 1e-9));
        assert!(approx_eq(lng, 7.85, 1e-9));
    }

    #[test]
    fn test_center_pair() {
        let points = vec![TrackPoint::new(51.50, -0.10), TrackPoint::new(51.52, -0.12)];
        let (lat, lng) = center(&points).unwrap();
        assert!(approx_eq(lat, 51.51, 0.001));
        assert!(approx_eq(lng, -0.11, 0.001));
    }

    #[test]
    fn test_center_empty_fails() {
        assert!(center(&[]).is_err());
    }
}
