//! Transition-table metrics engine.
//!
//! Turns a segment's raw points into a columnar table with one row per
//! point-to-point transition (distance, time delta, speed, elevation delta,
//! moving/stopped classification, running cumulative sums) and aggregates it
//! into a [`SegmentOverview`].
//!
//! Derived data is never stored on the points themselves; it is recomputed
//! (or cached at the track level) per query with explicit parameters.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::track::Segment;
use crate::{Result, TrackAnalysisError};

/// Parameters controlling metric derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Speeds at or below this threshold (m/s) classify a transition as
    /// stopped. A transition is "moving" only when its speed is strictly
    /// greater than the threshold. Default: 1.0 m/s.
    pub stopped_speed_threshold: f64,

    /// Percentile used to clip outlier speed spikes (GPS jitter) from
    /// max/avg speed statistics. Rows above the percentile stay in the
    /// table but are excluded from the overview aggregates. Default: 95.0.
    pub max_speed_percentile: f64,

    /// Optional moving-average window (in points) applied to elevation
    /// before differencing. Default: no smoothing, raw deltas.
    pub elevation_smoothing: Option<usize>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            stopped_speed_threshold: 1.0,
            max_speed_percentile: 95.0,
            elevation_smoothing: None,
        }
    }
}

impl MetricsConfig {
    /// Validate threshold parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.stopped_speed_threshold.is_finite() || self.stopped_speed_threshold < 0.0 {
            return Err(TrackAnalysisError::configuration(format!(
                "stopped_speed_threshold {} must be non-negative",
                self.stopped_speed_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.max_speed_percentile) {
            return Err(TrackAnalysisError::configuration(format!(
                "max_speed_percentile {} must be within [0, 100]",
                self.max_speed_percentile
            )));
        }
        if self.elevation_smoothing == Some(0) {
            return Err(TrackAnalysisError::configuration(
                "elevation_smoothing window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Columnar transition table for one segment (or a whole track).
///
/// Every column has exactly `point count - 1` entries: row `i` describes the
/// transition from point `i` to point `i + 1`. Coordinate, elevation and
/// channel columns carry the values of the transition's end point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentData {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// Raw elevation of the transition end point in meters
    pub elevation: Vec<Option<f64>>,
    /// Point-to-point distance in meters
    pub distance: Vec<f64>,
    /// Time delta in seconds; `None` when the segment carries no time data
    pub time: Vec<Option<f64>>,
    /// Speed in m/s; `None` without time data, `Some(0.0)` for zero-time rows
    pub speed: Vec<Option<f64>>,
    /// Elevation delta in meters; 0 when either endpoint lacks elevation
    pub elevation_delta: Vec<f64>,
    /// Moving/stopped classification (speed strictly above threshold)
    pub moving: Vec<bool>,
    /// Anomaly flag: the transition's timestamps were identical
    pub zero_time: Vec<bool>,
    pub cum_distance: Vec<f64>,
    pub cum_distance_moving: Vec<f64>,
    pub cum_distance_stopped: Vec<f64>,
    pub cum_time: Vec<Option<f64>>,
    pub cum_time_moving: Vec<Option<f64>>,
    /// False for rows whose speed exceeds the configured percentile
    pub in_speed_percentile: Vec<bool>,
    pub heartrate: Vec<Option<u32>>,
    pub cadence: Vec<Option<u32>>,
    pub power: Vec<Option<f64>>,
    /// Segment index of each row; all-zero for single-segment tables
    pub segment: Vec<usize>,

    /// Seconds spent moving
    pub moving_time: f64,
    /// Seconds spent stopped
    pub stopped_time: f64,
    /// Meters covered while moving
    pub moving_distance: f64,
    /// Meters covered while stopped
    pub stopped_distance: f64,
}

impl SegmentData {
    /// Number of transitions in the table.
    pub fn len(&self) -> usize {
        self.distance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Whether the table carries time data.
    pub fn has_times(&self) -> bool {
        self.time.iter().any(|t| t.is_some())
    }
}

/// Aggregate summary derived from a transition table.
///
/// An immutable value object, recomputed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOverview {
    /// Moving time in seconds
    pub moving_time_seconds: f64,
    /// Total (moving + stopped) time in seconds
    pub total_time_seconds: f64,
    /// Moving distance in meters
    pub moving_distance: f64,
    /// Total distance in meters
    pub total_distance: f64,
    /// Maximum velocity in m/s over percentile-filtered rows
    pub max_velocity: Option<f64>,
    /// Average velocity in m/s over percentile-filtered rows
    pub avg_velocity: Option<f64>,
    /// Maximum elevation in meters over all raw points
    pub max_elevation: Option<f64>,
    /// Minimum elevation in meters over all raw points
    pub min_elevation: Option<f64>,
    /// Total elevation gained in meters
    pub uphill_elevation: f64,
    /// Total elevation lost in meters (absolute value)
    pub downhill_elevation: f64,
    pub moving_distance_km: f64,
    pub total_distance_km: f64,
    pub max_velocity_kmh: Option<f64>,
    pub avg_velocity_kmh: Option<f64>,
}

impl SegmentOverview {
    #[allow(clippy::too_many_arguments)]
    fn new(
        moving_time_seconds: f64,
        total_time_seconds: f64,
        moving_distance: f64,
        total_distance: f64,
        max_velocity: Option<f64>,
        avg_velocity: Option<f64>,
        max_elevation: Option<f64>,
        min_elevation: Option<f64>,
        uphill_elevation: f64,
        downhill_elevation: f64,
    ) -> Self {
        Self {
            moving_time_seconds,
            total_time_seconds,
            moving_distance,
            total_distance,
            max_velocity,
            avg_velocity,
            max_elevation,
            min_elevation,
            uphill_elevation,
            downhill_elevation,
            moving_distance_km: moving_distance / 1000.0,
            total_distance_km: total_distance / 1000.0,
            max_velocity_kmh: max_velocity.map(|v| v * 3.6),
            avg_velocity_kmh: avg_velocity.map(|v| v * 3.6),
        }
    }
}

/// Derive the transition table for a segment.
///
/// Fails with `InsufficientPoints` for fewer than 2 points and with
/// `MissingTime` when timestamps are present on some but not all points.
/// Zero-time transitions never fail; they yield speed 0 with the
/// `zero_time` anomaly flag set.
pub fn process_segment(segment: &Segment, config: &MetricsConfig) -> Result<SegmentData> {
    config.validate()?;

    let points = segment.points();
    if points.len() < 2 {
        return Err(TrackAnalysisError::InsufficientPoints {
            point_count: points.len(),
            minimum_required: 2,
        });
    }

    let with_time = points.iter().filter(|p| p.time.is_some()).count();
    if with_time > 0 && with_time < points.len() {
        return Err(TrackAnalysisError::missing_time(format!(
            "{} of {} points carry a timestamp; segments must have time on all points or none",
            with_time,
            points.len()
        )));
    }
    let has_times = with_time == points.len();

    let elevations = smoothed_elevations(points, config.elevation_smoothing);

    let n_rows = points.len() - 1;
    let mut data = SegmentData {
        latitude: Vec::with_capacity(n_rows),
        longitude: Vec::with_capacity(n_rows),
        elevation: Vec::with_capacity(n_rows),
        distance: Vec::with_capacity(n_rows),
        time: Vec::with_capacity(n_rows),
        speed: Vec::with_capacity(n_rows),
        elevation_delta: Vec::with_capacity(n_rows),
        moving: Vec::with_capacity(n_rows),
        zero_time: Vec::with_capacity(n_rows),
        cum_distance: Vec::with_capacity(n_rows),
        cum_distance_moving: Vec::with_capacity(n_rows),
        cum_distance_stopped: Vec::with_capacity(n_rows),
        cum_time: Vec::with_capacity(n_rows),
        cum_time_moving: Vec::with_capacity(n_rows),
        in_speed_percentile: Vec::with_capacity(n_rows),
        heartrate: Vec::with_capacity(n_rows),
        cadence: Vec::with_capacity(n_rows),
        power: Vec::with_capacity(n_rows),
        segment: vec![segment.lap_index().unwrap_or(0); n_rows],
        ..SegmentData::default()
    };

    let mut cum_distance = 0.0;
    let mut cum_moving = 0.0;
    let mut cum_stopped = 0.0;
    let mut cum_time = 0.0;
    let mut cum_time_moving = 0.0;

    for (i, pair) in points.windows(2).enumerate() {
        let (previous, point) = (&pair[0], &pair[1]);

        let pp_distance = haversine_distance(previous, point);

        let mut seconds: Option<f64> = None;
        let mut zero_time = false;
        if has_times {
            // Both timestamps are guaranteed present after the check above
            let delta = point
                .time
                .zip(previous.time)
                .map(|(t, p)| (t - p).num_milliseconds() as f64 / 1000.0)
                .ok_or_else(|| {
                    TrackAnalysisError::missing_time("timestamp vanished mid-processing".to_string())
                })?;
            zero_time = delta == 0.0;
            seconds = Some(delta);
        }

        // Speed is undefined without time. Identical timestamps degrade to
        // speed 0 with the anomaly flagged instead of a division failure.
        let speed = seconds.map(|s| if s > 0.0 { pp_distance / s } else { 0.0 });
        let moving = match speed {
            Some(v) => v > config.stopped_speed_threshold,
            // Without time data every transition counts towards the moving totals
            None => true,
        };

        let elevation_delta = match (elevations[i], elevations[i + 1]) {
            (Some(prev), Some(curr)) => curr - prev,
            _ => 0.0,
        };

        cum_distance += pp_distance;
        if moving {
            cum_moving += pp_distance;
            data.moving_distance += pp_distance;
            if let Some(s) = seconds {
                cum_time_moving += s;
                data.moving_time += s;
            }
        } else {
            cum_stopped += pp_distance;
            data.stopped_distance += pp_distance;
            if let Some(s) = seconds {
                data.stopped_time += s;
            }
        }
        if let Some(s) = seconds {
            cum_time += s;
        }

        data.latitude.push(point.latitude);
        data.longitude.push(point.longitude);
        data.elevation.push(point.elevation);
        data.distance.push(pp_distance);
        data.time.push(seconds);
        data.speed.push(speed);
        data.elevation_delta.push(elevation_delta);
        data.moving.push(moving);
        data.zero_time.push(zero_time);
        data.cum_distance.push(cum_distance);
        data.cum_distance_moving.push(cum_moving);
        data.cum_distance_stopped.push(cum_stopped);
        data.cum_time.push(has_times.then_some(cum_time));
        data.cum_time_moving.push(has_times.then_some(cum_time_moving));
        data.heartrate.push(point.heartrate);
        data.cadence.push(point.cadence);
        data.power.push(point.power);
    }

    apply_speed_percentile(&mut data, config.max_speed_percentile);

    Ok(data)
}

/// Aggregate a transition table into a [`SegmentOverview`].
///
/// Min/max elevation scan the raw point elevations, including the first
/// point, which has no transition row.
pub fn segment_overview(segment: &Segment, data: &SegmentData) -> SegmentOverview {
    let total_time = data.moving_time + data.stopped_time;
    let total_distance = data.moving_distance + data.stopped_distance;

    let (max_velocity, avg_velocity) = if data.has_times() {
        filtered_velocity_stats(data)
    } else {
        (None, None)
    };

    let mut max_elevation: Option<f64> = None;
    let mut min_elevation: Option<f64> = None;
    for point in segment.points() {
        if let Some(e) = point.elevation {
            max_elevation = Some(max_elevation.map_or(e, |m: f64| m.max(e)));
            min_elevation = Some(min_elevation.map_or(e, |m: f64| m.min(e)));
        }
    }

    let (uphill, downhill) = elevation_gain_loss(data);

    SegmentOverview::new(
        data.moving_time,
        total_time,
        data.moving_distance,
        total_distance,
        max_velocity,
        avg_velocity,
        max_elevation,
        min_elevation,
        uphill,
        downhill,
    )
}

/// Concatenate per-segment tables into one track-level table, re-accumulating
/// the cumulative columns across segment boundaries.
pub fn concat_segment_data(tables: &[SegmentData]) -> SegmentData {
    let mut out = SegmentData::default();

    for (i_segment, table) in tables.iter().enumerate() {
        out.latitude.extend_from_slice(&table.latitude);
        out.longitude.extend_from_slice(&table.longitude);
        out.elevation.extend_from_slice(&table.elevation);
        out.distance.extend_from_slice(&table.distance);
        out.time.extend_from_slice(&table.time);
        out.speed.extend_from_slice(&table.speed);
        out.elevation_delta.extend_from_slice(&table.elevation_delta);
        out.moving.extend_from_slice(&table.moving);
        out.zero_time.extend_from_slice(&table.zero_time);
        out.in_speed_percentile
            .extend_from_slice(&table.in_speed_percentile);
        out.heartrate.extend_from_slice(&table.heartrate);
        out.cadence.extend_from_slice(&table.cadence);
        out.power.extend_from_slice(&table.power);
        out.segment
            .extend(std::iter::repeat(i_segment).take(table.len()));

        out.moving_time += table.moving_time;
        out.stopped_time += table.stopped_time;
        out.moving_distance += table.moving_distance;
        out.stopped_distance += table.stopped_distance;
    }

    // Rebuild running sums over the concatenated rows
    let mut cum_distance = 0.0;
    let mut cum_moving = 0.0;
    let mut cum_stopped = 0.0;
    let mut cum_time = 0.0;
    let mut cum_time_moving = 0.0;
    for i in 0..out.distance.len() {
        cum_distance += out.distance[i];
        if out.moving[i] {
            cum_moving += out.distance[i];
        } else {
            cum_stopped += out.distance[i];
        }
        out.cum_distance.push(cum_distance);
        out.cum_distance_moving.push(cum_moving);
        out.cum_distance_stopped.push(cum_stopped);

        match out.time[i] {
            Some(s) => {
                cum_time += s;
                if out.moving[i] {
                    cum_time_moving += s;
                }
                out.cum_time.push(Some(cum_time));
                out.cum_time_moving.push(Some(cum_time_moving));
            }
            None => {
                out.cum_time.push(None);
                out.cum_time_moving.push(None);
            }
        }
    }

    debug!(
        "Concatenated {} segment tables into {} rows",
        tables.len(),
        out.len()
    );

    out
}

/// Sum of positive elevation deltas and absolute sum of negative deltas.
fn elevation_gain_loss(data: &SegmentData) -> (f64, f64) {
    let mut uphill = 0.0;
    let mut downhill = 0.0;
    for &delta in &data.elevation_delta {
        if delta > 0.0 {
            uphill += delta;
        } else {
            downhill -= delta;
        }
    }
    (uphill, downhill)
}

/// Flag rows whose speed lies above the configured percentile.
///
/// Rows stay in the table either way; the flag only controls which rows feed
/// the max/avg velocity aggregates.
fn apply_speed_percentile(data: &mut SegmentData, max_speed_percentile: f64) {
    let speeds: Vec<f64> = data.speed.iter().filter_map(|s| *s).collect();
    if speeds.is_empty() {
        data.in_speed_percentile = vec![false; data.len()];
        return;
    }

    let cutoff = percentile(&speeds, max_speed_percentile);
    data.in_speed_percentile = data
        .speed
        .iter()
        .map(|s| s.is_some_and(|v| v <= cutoff))
        .collect();
}

fn filtered_velocity_stats(data: &SegmentData) -> (Option<f64>, Option<f64>) {
    let filtered: Vec<f64> = data
        .speed
        .iter()
        .zip(&data.in_speed_percentile)
        .filter_map(|(s, &keep)| if keep { *s } else { None })
        .collect();

    if filtered.is_empty() {
        warn!("No speed rows passed the percentile filter");
        return (None, None);
    }

    let max = filtered.iter().cloned().fold(f64::MIN, f64::max);
    let avg = filtered.iter().sum::<f64>() / filtered.len() as f64;
    (Some(max), Some(avg))
}

/// Linear-interpolation percentile over an unsorted sample.
fn percentile(values: &[f64], pct: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Moving-average smoothing over the elevation channel.
///
/// Smoothing only applies when every point carries elevation; partial
/// elevation data is left untouched so missing values never get invented.
fn smoothed_elevations(
    points: &[crate::TrackPoint],
    window: Option<usize>,
) -> Vec<Option<f64>> {
    let raw: Vec<Option<f64>> = points.iter().map(|p| p.elevation).collect();

    let Some(window) = window else {
        return raw;
    };
    if window <= 1 {
        return raw;
    }
    if raw.iter().any(|e| e.is_none()) {
        warn!("Elevation smoothing skipped: not all points carry elevation");
        return raw;
    }

    let values: Vec<f64> = raw.iter().map(|e| e.unwrap_or_default()).collect();
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            let slice = &values[lo..hi];
            Some(slice.iter().sum::<f64>() / slice.len() as f64)
        })
        .collect()
}
