//! Zone classification for heart-rate, power and cadence channels.
//!
//! Zones are ordered, contiguous, half-open intervals `[start, end)` over a
//! numeric domain. The first interval is open below (start is `None`) and
//! the last is open above (end is `None`), so every finite value falls into
//! exactly one zone.

use serde::{Deserialize, Serialize};

use crate::metrics::SegmentData;
use crate::{Result, TrackAnalysisError};

/// One half-open interval `[start, end)` of a zone definition.
///
/// `start == None` means unbounded below, `end == None` unbounded above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInterval {
    pub start: Option<f64>,
    pub end: Option<f64>,
    /// Display name, e.g. "Endurance"
    pub name: Option<String>,
    /// Display color, e.g. "#34a1eb"
    pub color: Option<String>,
}

impl ZoneInterval {
    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self {
            start,
            end,
            name: None,
            color: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Channels a zone definition can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneChannel {
    Heartrate,
    Cadence,
    Power,
}

/// A validated, ordered set of contiguous zone intervals.
///
/// # Example
/// ```
/// use track_analyzer::{ZoneInterval, Zones};
///
/// let zones = Zones::new(vec![
///     ZoneInterval::new(None, Some(120.0)).with_name("Easy"),
///     ZoneInterval::new(Some(120.0), Some(150.0)).with_name("Tempo"),
///     ZoneInterval::new(Some(150.0), None).with_name("Threshold"),
/// ])
/// .unwrap();
///
/// assert_eq!(zones.classify(119.9), 0);
/// assert_eq!(zones.classify(120.0), 1); // boundaries belong to the upper zone
/// assert_eq!(zones.classify(200.0), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zones {
    intervals: Vec<ZoneInterval>,
}

impl Zones {
    /// Build a zone definition, enforcing ordering and contiguity.
    ///
    /// The first interval must be unbounded below, the last unbounded above,
    /// every interior boundary must be finite and strictly increasing, and
    /// consecutive intervals must share their boundary value exactly.
    pub fn new(intervals: Vec<ZoneInterval>) -> Result<Self> {
        if intervals.is_empty() {
            return Err(TrackAnalysisError::configuration(
                "zone definition needs at least one interval".to_string(),
            ));
        }

        let first = &intervals[0];
        if first.start.is_some() {
            return Err(TrackAnalysisError::configuration(
                "first zone interval must be unbounded below (start = null)".to_string(),
            ));
        }
        let last = &intervals[intervals.len() - 1];
        if last.end.is_some() {
            return Err(TrackAnalysisError::configuration(
                "last zone interval must be unbounded above (end = null)".to_string(),
            ));
        }

        for (i, pair) in intervals.windows(2).enumerate() {
            let end = pair[0].end.ok_or_else(|| {
                TrackAnalysisError::configuration(format!(
                    "zone interval {i} has no end but is not the last interval"
                ))
            })?;
            let start = pair[1].start.ok_or_else(|| {
                TrackAnalysisError::configuration(format!(
                    "zone interval {} has no start but is not the first interval",
                    i + 1
                ))
            })?;
            if !end.is_finite() || end != start {
                return Err(TrackAnalysisError::configuration(format!(
                    "zone intervals {i} and {} must share a finite boundary ({end} != {start})",
                    i + 1
                )));
            }
            if let Some(prev_start) = pair[0].start {
                if end <= prev_start {
                    return Err(TrackAnalysisError::configuration(format!(
                        "zone boundaries must be strictly increasing ({end} <= {prev_start})"
                    )));
                }
            }
        }

        Ok(Self { intervals })
    }

    pub fn intervals(&self) -> &[ZoneInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Index of the zone containing `value`.
    ///
    /// Intervals are right-open, so a value equal to a boundary belongs to
    /// the zone starting there.
    pub fn classify(&self, value: f64) -> usize {
        // Interior boundaries are the starts of intervals 1..n
        self.intervals[1..].partition_point(|z| z.start.is_some_and(|s| value >= s))
    }
}

/// Per-zone aggregate over one channel of a transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub zone_index: usize,
    pub name: Option<String>,
    /// Number of transitions whose end point falls in the zone
    pub count: usize,
    /// Seconds spent in the zone; `None` without time data
    pub time_seconds: Option<f64>,
    /// Meters covered in the zone
    pub distance: f64,
}

/// Zone index of every row for one channel; `None` where the channel is
/// missing.
pub fn zone_indices(
    data: &SegmentData,
    channel: ZoneChannel,
    zones: &Zones,
) -> Vec<Option<usize>> {
    (0..data.len())
        .map(|row| {
            let value = match channel {
                ZoneChannel::Heartrate => data.heartrate[row].map(f64::from),
                ZoneChannel::Cadence => data.cadence[row].map(f64::from),
                ZoneChannel::Power => data.power[row],
            };
            value.map(|v| zones.classify(v))
        })
        .collect()
}

/// Aggregate time, distance and row counts per zone for one channel.
///
/// Rows without a value on the channel are ignored.
pub fn zone_summaries(data: &SegmentData, channel: ZoneChannel, zones: &Zones) -> Vec<ZoneSummary> {
    let has_times = data.has_times();
    let mut summaries: Vec<ZoneSummary> = zones
        .intervals()
        .iter()
        .enumerate()
        .map(|(i, interval)| ZoneSummary {
            zone_index: i,
            name: interval.name.clone(),
            count: 0,
            time_seconds: has_times.then_some(0.0),
            distance: 0.0,
        })
        .collect();

    for row in 0..data.len() {
        let value = match channel {
            ZoneChannel::Heartrate => data.heartrate[row].map(f64::from),
            ZoneChannel::Cadence => data.cadence[row].map(f64::from),
            ZoneChannel::Power => data.power[row],
        };
        let Some(value) = value else {
            continue;
        };

        let zone = zones.classify(value);
        summaries[zone].count += 1;
        summaries[zone].distance += data.distance[row];
        if let (Some(total), Some(seconds)) = (&mut summaries[zone].time_seconds, data.time[row]) {
            *total += seconds;
        }
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{process_segment, MetricsConfig};
    use crate::track::Segment;
    use crate::TrackPoint;
    use chrono::{TimeZone, Utc};

    fn heartrate_zones() -> Zones {
        Zones::new(vec![
            ZoneInterval::new(None, Some(120.0)).with_name("Easy"),
            ZoneInterval::new(Some(120.0), Some(150.0)).with_name("Tempo"),
            ZoneInterval::new(Some(150.0), None).with_name("Threshold"),
        ])
        .unwrap()
    }

    #[test]
    fn test_classify_right_open() {
        let zones = heartrate_zones();
        assert_eq!(zones.classify(0.0), 0);
        assert_eq!(zones.classify(119.999), 0);
        assert_eq!(zones.classify(120.0), 1);
        assert_eq!(zones.classify(149.999), 1);
        assert_eq!(zones.classify(150.0), 2);
        assert_eq!(zones.classify(500.0), 2);
    }

    #[test]
    fn test_single_interval_catches_everything() {
        let zones = Zones::new(vec![ZoneInterval::new(None, None)]).unwrap();
        assert_eq!(zones.classify(-10.0), 0);
        assert_eq!(zones.classify(1e9), 0);
    }

    #[test]
    fn test_gap_rejected() {
        let result = Zones::new(vec![
            ZoneInterval::new(None, Some(120.0)),
            ZoneInterval::new(Some(130.0), None),
        ]);
        assert!(matches!(
            result,
            Err(TrackAnalysisError::Configuration { .. })
        ));
    }

    #[test]
    fn test_bounded_first_or_last_rejected() {
        assert!(Zones::new(vec![
            ZoneInterval::new(Some(0.0), Some(120.0)),
            ZoneInterval::new(Some(120.0), None),
        ])
        .is_err());
        assert!(Zones::new(vec![
            ZoneInterval::new(None, Some(120.0)),
            ZoneInterval::new(Some(120.0), Some(200.0)),
        ])
        .is_err());
    }

    #[test]
    fn test_decreasing_boundaries_rejected() {
        let result = Zones::new(vec![
            ZoneInterval::new(None, Some(150.0)),
            ZoneInterval::new(Some(150.0), Some(120.0)),
            ZoneInterval::new(Some(120.0), None),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Zones::new(vec![]).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let zones = heartrate_zones();
        let json = serde_json::to_string(&zones).unwrap();
        let back: Zones = serde_json::from_str(&json).unwrap();
        assert_eq!(zones, back);
    }

    #[test]
    fn test_zone_summaries_over_heartrate() {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let points: Vec<TrackPoint> = [100u32, 110, 130, 160, 165]
            .iter()
            .enumerate()
            .map(|(i, &hr)| {
                TrackPoint::new(0.0, 0.001 * i as f64)
                    .with_time(t0 + chrono::Duration::seconds(i as i64 * 10))
                    .with_heartrate(hr)
            })
            .collect();
        let segment = Segment::from_points(points).unwrap();
        let data = process_segment(&segment, &MetricsConfig::default()).unwrap();

        let summaries = zone_summaries(&data, ZoneChannel::Heartrate, &heartrate_zones());
        assert_eq!(summaries.len(), 3);
        // Rows carry the end point's heartrate: 110, 130, 160, 165
        assert_eq!(summaries[0].count, 1);
        assert_eq!(summaries[1].count, 1);
        assert_eq!(summaries[2].count, 2);
        assert_eq!(summaries[2].time_seconds, Some(20.0));
        assert_eq!(summaries[0].name.as_deref(), Some("Easy"));
    }

    #[test]
    fn test_zone_indices_per_row() {
        let points = vec![
            TrackPoint::new(0.0, 0.0).with_heartrate(100),
            TrackPoint::new(0.0, 0.001).with_heartrate(110),
            TrackPoint::new(0.0, 0.002),
            TrackPoint::new(0.0, 0.003).with_heartrate(160),
        ];
        let segment = Segment::from_points(points).unwrap();
        let data = process_segment(&segment, &MetricsConfig::default()).unwrap();

        let indices = zone_indices(&data, ZoneChannel::Heartrate, &heartrate_zones());
        assert_eq!(indices, vec![Some(0), None, Some(2)]);
    }

    #[test]
    fn test_zone_summaries_skip_missing_channel() {
        let points = vec![
            TrackPoint::new(0.0, 0.0),
            TrackPoint::new(0.0, 0.001).with_heartrate(130),
            TrackPoint::new(0.0, 0.002),
        ];
        let segment = Segment::from_points(points).unwrap();
        let data = process_segment(&segment, &MetricsConfig::default()).unwrap();

        let summaries = zone_summaries(&data, ZoneChannel::Heartrate, &heartrate_zones());
        let total: usize = summaries.iter().map(|s| s.count).sum();
        assert_eq!(total, 1);
        assert_eq!(summaries[1].time_seconds, None);
    }
}
