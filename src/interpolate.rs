//! Gap interpolation across all recorded channels.
//!
//! Sparse recordings (smart-recording devices, dropouts) leave large gaps
//! between consecutive points. The functions here densify a segment by
//! inserting linearly interpolated points so that no gap exceeds a desired
//! spacing, carrying elevation, time, heart rate, cadence and power along.
//!
//! Inserted points are flagged with [`TrackPoint::interpolated`] so a
//! round-trip through [`strip_interpolated`] restores the original sequence.

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::geo_utils::haversine_distance;
use crate::{Result, TrackAnalysisError, TrackPoint};

/// Linearly interpolate between two points so consecutive points sit roughly
/// `spacing` meters apart.
///
/// Returns `None` when the gap is shorter than twice the spacing: inserting
/// a point there would create sub-spacing steps, so the pair is left alone.
/// Otherwise returns the full sequence including both endpoints, with every
/// inserted point flagged as interpolated.
///
/// Optional channels interpolate only when present on both endpoints;
/// otherwise the inserted points carry `None` for that channel.
pub fn interpolate_between(
    start: &TrackPoint,
    end: &TrackPoint,
    spacing: f64,
) -> Result<Option<Vec<TrackPoint>>> {
    validate_spacing(spacing)?;
    start.validate()?;
    end.validate()?;

    let gap = haversine_distance(start, end);
    if gap < 2.0 * spacing {
        return Ok(None);
    }

    // Number of equal sub-intervals closest to the desired spacing
    let intervals = (gap / spacing).round() as usize;
    let mut points = Vec::with_capacity(intervals + 1);
    points.push(*start);

    for i in 1..intervals {
        let fraction = i as f64 / intervals as f64;
        points.push(lerp_point(start, end, fraction));
    }

    points.push(*end);

    debug!(
        "Interpolated {} points into a {:.1} m gap (spacing {:.1} m)",
        intervals - 1,
        gap,
        spacing
    );

    Ok(Some(points))
}

/// Densify a whole point sequence so no gap exceeds roughly `spacing` meters.
///
/// Pure function: the input is untouched and a new sequence is returned.
/// Original points keep their recorded values and ordering.
pub fn interpolate_segment(points: &[TrackPoint], spacing: f64) -> Result<Vec<TrackPoint>> {
    validate_spacing(spacing)?;

    if points.len() < 2 {
        return Ok(points.to_vec());
    }

    let mut result: Vec<TrackPoint> = Vec::with_capacity(points.len());
    result.push(points[0]);

    for pair in points.windows(2) {
        match interpolate_between(&pair[0], &pair[1], spacing)? {
            // Skip the leading endpoint, already emitted by the previous pair
            Some(filled) => result.extend_from_slice(&filled[1..]),
            None => result.push(pair[1]),
        }
    }

    Ok(result)
}

/// Remove all interpolated points, restoring the recorded sequence.
pub fn strip_interpolated(points: &[TrackPoint]) -> Vec<TrackPoint> {
    points.iter().filter(|p| !p.interpolated).copied().collect()
}

fn validate_spacing(spacing: f64) -> Result<()> {
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(TrackAnalysisError::configuration(format!(
            "interpolation spacing {spacing} must be positive"
        )));
    }
    Ok(())
}

fn lerp_point(start: &TrackPoint, end: &TrackPoint, fraction: f64) -> TrackPoint {
    TrackPoint {
        latitude: lerp(start.latitude, end.latitude, fraction),
        longitude: lerp(start.longitude, end.longitude, fraction),
        elevation: lerp_opt(start.elevation, end.elevation, fraction),
        time: lerp_time(start.time, end.time, fraction),
        heartrate: lerp_u32(start.heartrate, end.heartrate, fraction),
        cadence: lerp_u32(start.cadence, end.cadence, fraction),
        power: lerp_opt(start.power, end.power, fraction),
        interpolated: true,
    }
}

fn lerp(a: f64, b: f64, fraction: f64) -> f64 {
    a + (b - a) * fraction
}

fn lerp_opt(a: Option<f64>, b: Option<f64>, fraction: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(lerp(a, b, fraction)),
        _ => None,
    }
}

fn lerp_u32(a: Option<u32>, b: Option<u32>, fraction: f64) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(lerp(a as f64, b as f64, fraction).round() as u32),
        _ => None,
    }
}

fn lerp_time(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    fraction: f64,
) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => {
            let span_ms = (b - a).num_milliseconds() as f64;
            Some(a + Duration::milliseconds((span_ms * fraction).round() as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_point(lat: f64, lng: f64, ele: f64, seconds: i64, hr: u32) -> TrackPoint {
        TrackPoint::new(lat, lng)
            .with_elevation(ele)
            .with_time(Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap())
            .with_heartrate(hr)
    }

    #[test]
    fn test_small_gap_left_alone() {
        // ~111 m gap, 60 m spacing: 111 < 120, no insertion
        let a = TrackPoint::new(0.0, 0.0);
        let b = TrackPoint::new(0.0, 0.001);
        assert!(interpolate_between(&a, &b, 60.0).unwrap().is_none());
    }

    #[test]
    fn test_gap_is_filled_with_flagged_points() {
        // ~1112 m gap, 100 m spacing: 11 intervals, 10 inserted points
        let a = full_point(0.0, 0.0, 100.0, 0, 120);
        let b = full_point(0.0, 0.01, 200.0, 100, 140);
        let filled = interpolate_between(&a, &b, 100.0).unwrap().unwrap();

        assert_eq!(filled.len(), 12);
        assert_eq!(filled[0], a);
        assert_eq!(*filled.last().unwrap(), b);
        for p in &filled[1..filled.len() - 1] {
            assert!(p.interpolated);
        }
        assert!(!filled[0].interpolated);
    }

    #[test]
    fn test_all_channels_interpolate_linearly() {
        let a = full_point(0.0, 0.0, 100.0, 0, 120);
        let b = full_point(0.0, 0.01, 200.0, 100, 140);
        let filled = interpolate_between(&a, &b, 100.0).unwrap().unwrap();

        // Midpoint of 11 intervals is not exact; check a known fraction instead
        let p = &filled[1];
        let fraction = 1.0 / 11.0;
        assert!((p.longitude - 0.01 * fraction).abs() < 1e-12);
        assert!((p.elevation.unwrap() - (100.0 + 100.0 * fraction)).abs() < 1e-9);
        let expected_time =
            a.time.unwrap() + Duration::milliseconds((100_000.0 * fraction).round() as i64);
        assert_eq!(p.time.unwrap(), expected_time);
        assert_eq!(p.heartrate, Some(122));
    }

    #[test]
    fn test_missing_channel_on_one_bound_yields_none() {
        let a = full_point(0.0, 0.0, 100.0, 0, 120);
        let b = TrackPoint::new(0.0, 0.01)
            .with_time(Utc.timestamp_opt(1_700_000_100, 0).unwrap());
        let filled = interpolate_between(&a, &b, 100.0).unwrap().unwrap();

        assert_eq!(filled[1].elevation, None);
        assert_eq!(filled[1].heartrate, None);
        assert!(filled[1].time.is_some());
    }

    #[test]
    fn test_segment_round_trip_through_strip() {
        let original = vec![
            full_point(0.0, 0.0, 0.0, 0, 100),
            full_point(0.0, 0.01, 10.0, 100, 110),
            full_point(0.0, 0.011, 11.0, 110, 111),
            full_point(0.0, 0.02, 20.0, 200, 120),
        ];
        let dense = interpolate_segment(&original, 100.0).unwrap();
        assert!(dense.len() > original.len());

        let restored = strip_interpolated(&dense);
        assert_eq!(restored, original);
    }

    #[test]
    fn test_segment_preserves_order_and_endpoints() {
        let original = vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.01),
            TrackPoint::new(0.0, 0.02),
        ];
        let dense = interpolate_segment(&original, 200.0).unwrap();
        assert_eq!(dense[0], original[0]);
        assert_eq!(*dense.last().unwrap(), original[2]);
        for w in dense.windows(2) {
            assert!(w[1].longitude >= w[0].longitude);
        }
    }

    #[test]
    fn test_non_positive_spacing_rejected() {
        let a = TrackPoint::new(0.0, 0.0);
        let b = TrackPoint::new(0.0, 0.01);
        assert!(matches!(
            interpolate_between(&a, &b, 0.0),
            Err(TrackAnalysisError::Configuration { .. })
        ));
        assert!(matches!(
            interpolate_segment(&[a, b], -5.0),
            Err(TrackAnalysisError::Configuration { .. })
        ));
    }

    #[test]
    fn test_short_input_passes_through() {
        let single = vec![TrackPoint::new(0.0, 0.0)];
        assert_eq!(interpolate_segment(&single, 10.0).unwrap(), single);
        assert!(interpolate_segment(&[], 10.0).unwrap().is_empty());
    }
}
