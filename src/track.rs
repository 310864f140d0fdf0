//! Track and segment data model.
//!
//! A [`Track`] is an ordered collection of [`Segment`]s plus track-level
//! metadata (name, zone definitions, metric parameters). Points are
//! validated at construction and the collection is append/split-only
//! afterwards; every metric is a derived view, cached per segment and
//! invalidated on mutation.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use geo::{LineString, SimplifyIdx};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::geo_utils::polyline_length;
use crate::interpolate;
use crate::metrics::{self, MetricsConfig, SegmentData, SegmentOverview};
use crate::overlap::PointDistance;
use crate::zones::{zone_summaries, ZoneChannel, ZoneSummary, Zones};
use crate::{Bounds, Result, TrackAnalysisError, TrackPoint};

// Cache slot for the concatenated track-level table
const TRACK_DATA_KEY: usize = usize::MAX;

/// An ordered run of points: one lap or one uninterrupted recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    points: Vec<TrackPoint>,
    lap_index: Option<usize>,
}

impl Segment {
    /// Build a segment, validating every point.
    pub fn from_points(points: Vec<TrackPoint>) -> Result<Self> {
        for point in &points {
            point.validate()?;
        }
        Ok(Self {
            points,
            lap_index: None,
        })
    }

    pub fn with_lap_index(mut self, lap_index: usize) -> Self {
        self.lap_index = Some(lap_index);
        self
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn lap_index(&self) -> Option<usize> {
        self.lap_index
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }

    /// Whether every point carries a timestamp.
    pub fn has_times(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.time.is_some())
    }

    /// Whether every point carries an elevation.
    pub fn has_elevations(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(|p| p.elevation.is_some())
    }

    /// Total path length in meters.
    pub fn total_distance(&self) -> f64 {
        polyline_length(&self.points)
    }
}

/// Optional per-channel zone definitions attached to a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackZones {
    pub heartrate: Option<Zones>,
    pub cadence: Option<Zones>,
    pub power: Option<Zones>,
}

impl TrackZones {
    fn for_channel(&self, channel: ZoneChannel) -> Option<&Zones> {
        match channel {
            ZoneChannel::Heartrate => self.heartrate.as_ref(),
            ZoneChannel::Cadence => self.cadence.as_ref(),
            ZoneChannel::Power => self.power.as_ref(),
        }
    }
}

/// A named, ordered collection of segments.
///
/// Derived tables are cached per segment, keyed implicitly by the track's
/// [`MetricsConfig`]; every mutating operation clears the cache.
#[derive(Debug)]
pub struct Track {
    name: String,
    segments: Vec<Segment>,
    zones: TrackZones,
    config: MetricsConfig,
    cache: Mutex<HashMap<usize, SegmentData>>,
}

impl Clone for Track {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            segments: self.segments.clone(),
            zones: self.zones.clone(),
            config: self.config.clone(),
            cache: Mutex::new(self.lock_cache().clone()),
        }
    }
}

impl Track {
    /// Create an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segments: Vec::new(),
            zones: TrackZones::default(),
            config: MetricsConfig::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a single-segment track from parallel channel arrays.
    ///
    /// Every provided channel slice must have exactly one entry per
    /// coordinate pair; a length mismatch fails with a `Validation` error.
    /// Timestamps must be present on all points or on none.
    #[allow(clippy::too_many_arguments)]
    pub fn from_points(
        name: &str,
        coordinates: &[(f64, f64)],
        elevations: Option<&[Option<f64>]>,
        times: Option<&[Option<DateTime<Utc>>]>,
        heartrates: Option<&[Option<u32>]>,
        cadences: Option<&[Option<u32>]>,
        powers: Option<&[Option<f64>]>,
    ) -> Result<Self> {
        check_channel_len("elevations", coordinates.len(), elevations)?;
        check_channel_len("times", coordinates.len(), times)?;
        check_channel_len("heartrates", coordinates.len(), heartrates)?;
        check_channel_len("cadences", coordinates.len(), cadences)?;
        check_channel_len("powers", coordinates.len(), powers)?;

        if let Some(times) = times {
            let with_time = times.iter().filter(|t| t.is_some()).count();
            if with_time > 0 && with_time < times.len() {
                return Err(TrackAnalysisError::validation(format!(
                    "{} of {} points carry a timestamp; provide time for all points or none",
                    with_time,
                    times.len()
                )));
            }
        }

        let points: Vec<TrackPoint> = coordinates
            .iter()
            .enumerate()
            .map(|(i, &(lat, lng))| TrackPoint {
                latitude: lat,
                longitude: lng,
                elevation: elevations.and_then(|c| c[i]),
                time: times.and_then(|c| c[i]),
                heartrate: heartrates.and_then(|c| c[i]),
                cadence: cadences.and_then(|c| c[i]),
                power: powers.and_then(|c| c[i]),
                interpolated: false,
            })
            .collect();

        let mut track = Self::new(name);
        track.add_segment(Segment::from_points(points)?);
        Ok(track)
    }

    /// Read a track from a GPX document.
    pub fn from_gpx<R: std::io::Read>(reader: R) -> Result<Self> {
        crate::io::read_gpx(reader)
    }

    /// Read a track from a GPX file on disk.
    pub fn from_gpx_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        crate::io::read_gpx_file(path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn zones(&self) -> &TrackZones {
        &self.zones
    }

    pub fn metrics_config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Replace the metric parameters, dropping all cached tables.
    pub fn set_metrics_config(&mut self, config: MetricsConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.invalidate_cache();
        Ok(())
    }

    /// Attach zone definitions for the given channel.
    pub fn set_zones(&mut self, channel: ZoneChannel, zones: Zones) {
        match channel {
            ZoneChannel::Heartrate => self.zones.heartrate = Some(zones),
            ZoneChannel::Cadence => self.zones.cadence = Some(zones),
            ZoneChannel::Power => self.zones.power = Some(zones),
        }
    }

    /// Bounding box over all segments.
    pub fn bounds(&self) -> Option<Bounds> {
        let all: Vec<TrackPoint> = self
            .segments
            .iter()
            .flat_map(|s| s.points().iter().copied())
            .collect();
        Bounds::from_points(&all)
    }

    // ------------------------------------------------------------------
    // Structural operations
    // ------------------------------------------------------------------

    pub fn add_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
        self.invalidate_cache();
    }

    pub fn remove_segment(&mut self, index: usize) -> Result<Segment> {
        self.check_segment_index(index)?;
        let removed = self.segments.remove(index);
        self.invalidate_cache();
        info!("Removed segment {index} ({} points)", removed.len());
        Ok(removed)
    }

    /// Split a segment in two after `point_index`.
    ///
    /// The point at `point_index` ends the first half; the second half
    /// starts at the next point. Both halves must be non-empty.
    pub fn split_segment(&mut self, segment_index: usize, point_index: usize) -> Result<()> {
        self.check_segment_index(segment_index)?;
        let segment = &mut self.segments[segment_index];
        if point_index + 1 >= segment.points.len() {
            return Err(TrackAnalysisError::validation(format!(
                "cannot split a {}-point segment after point {point_index}",
                segment.points.len()
            )));
        }

        let tail = segment.points.split_off(point_index + 1);
        let tail = Segment {
            points: tail,
            lap_index: None,
        };
        self.segments.insert(segment_index + 1, tail);
        self.invalidate_cache();
        Ok(())
    }

    /// Replace point elevations in a segment, in place.
    ///
    /// `elevations` must carry one entry per point. `None` entries preserve
    /// the existing elevation, so partial enhancer results apply cleanly.
    pub fn apply_elevations(
        &mut self,
        segment_index: usize,
        elevations: &[Option<f64>],
    ) -> Result<()> {
        self.check_segment_index(segment_index)?;
        let segment = &mut self.segments[segment_index];
        if elevations.len() != segment.points.len() {
            return Err(TrackAnalysisError::validation(format!(
                "got {} elevations for a {}-point segment",
                elevations.len(),
                segment.points.len()
            )));
        }

        let mut applied = 0usize;
        for (point, elevation) in segment.points.iter_mut().zip(elevations) {
            if let Some(e) = elevation {
                if !e.is_finite() {
                    return Err(TrackAnalysisError::validation(
                        "elevation must be finite".to_string(),
                    ));
                }
                point.elevation = Some(*e);
                applied += 1;
            }
        }
        self.invalidate_cache();
        debug!("Applied {applied} elevation values to segment {segment_index}");
        Ok(())
    }

    /// Reduce point counts with Ramer-Douglas-Peucker simplification.
    ///
    /// `epsilon` is the maximum allowed deviation in degrees. Surviving
    /// points keep all their channel data; nothing is re-sampled.
    pub fn simplify(&mut self, epsilon: f64) -> Result<()> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(TrackAnalysisError::configuration(format!(
                "simplification epsilon {epsilon} must be non-negative"
            )));
        }

        let before: usize = self.segments.iter().map(Segment::len).sum();
        for segment in &mut self.segments {
            if segment.points.len() < 3 {
                continue;
            }
            let line: LineString<f64> = segment
                .points
                .iter()
                .map(|p| (p.longitude, p.latitude))
                .collect();
            let keep = line.simplify_idx(&epsilon);
            segment.points = keep.iter().map(|&i| segment.points[i]).collect();
        }
        let after: usize = self.segments.iter().map(Segment::len).sum();

        self.invalidate_cache();
        info!("Simplified track from {before} to {after} points (epsilon {epsilon})");
        Ok(())
    }

    /// Densify a segment in place so no gap exceeds roughly `spacing` meters.
    pub fn interpolate_segment(&mut self, segment_index: usize, spacing: f64) -> Result<()> {
        self.check_segment_index(segment_index)?;
        let segment = &mut self.segments[segment_index];
        segment.points = interpolate::interpolate_segment(&segment.points, spacing)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Remove all interpolated points from every segment.
    pub fn strip_interpolated(&mut self) {
        for segment in &mut self.segments {
            segment.points = interpolate::strip_interpolated(&segment.points);
        }
        self.invalidate_cache();
    }

    // ------------------------------------------------------------------
    // Derived views (cached)
    // ------------------------------------------------------------------

    /// Transition table for one segment, computed on first access.
    pub fn segment_data(&self, index: usize) -> Result<SegmentData> {
        self.check_segment_index(index)?;
        if let Some(cached) = self.lock_cache().get(&index) {
            return Ok(cached.clone());
        }

        let data = metrics::process_segment(&self.segments[index], &self.config)?;
        self.lock_cache().insert(index, data.clone());
        Ok(data)
    }

    /// Track-level transition table: all segment tables concatenated with
    /// the cumulative columns re-accumulated across segment boundaries.
    pub fn track_data(&self) -> Result<SegmentData> {
        if let Some(cached) = self.lock_cache().get(&TRACK_DATA_KEY) {
            return Ok(cached.clone());
        }

        let tables = (0..self.segments.len())
            .map(|i| self.segment_data(i))
            .collect::<Result<Vec<_>>>()?;
        if tables.is_empty() {
            return Err(TrackAnalysisError::InsufficientPoints {
                point_count: 0,
                minimum_required: 2,
            });
        }

        let data = metrics::concat_segment_data(&tables);
        self.lock_cache().insert(TRACK_DATA_KEY, data.clone());
        Ok(data)
    }

    /// Aggregate summary for one segment.
    pub fn segment_overview(&self, index: usize) -> Result<SegmentOverview> {
        let data = self.segment_data(index)?;
        Ok(metrics::segment_overview(&self.segments[index], &data))
    }

    /// Aggregate summary over the whole track.
    pub fn track_overview(&self) -> Result<SegmentOverview> {
        let data = self.track_data()?;
        let points: Vec<TrackPoint> = self
            .segments
            .iter()
            .flat_map(|s| s.points().iter().copied())
            .collect();
        let all = Segment {
            points,
            lap_index: None,
        };
        Ok(metrics::segment_overview(&all, &data))
    }

    /// Average point-to-point distance in a segment, in meters.
    pub fn avg_pp_distance(&self, index: usize) -> Result<f64> {
        let data = self.segment_data(index)?;
        Ok(data.distance.iter().sum::<f64>() / data.len() as f64)
    }

    /// Maximum point-to-point distance in a segment, in meters.
    pub fn max_pp_distance(&self, index: usize) -> Result<f64> {
        let data = self.segment_data(index)?;
        Ok(data.distance.iter().cloned().fold(0.0, f64::max))
    }

    /// Closest point of the whole track to a reference point.
    pub fn closest_point(&self, reference: &TrackPoint) -> Option<PointDistance> {
        let mut best: Option<PointDistance> = None;
        for (i, segment) in self.segments.iter().enumerate() {
            if let Some(mut found) = crate::overlap::closest_point(segment.points(), reference) {
                found.segment_index = i;
                if best.as_ref().is_none_or(|b| found.distance < b.distance) {
                    best = Some(found);
                }
            }
        }
        best
    }

    /// Time/distance-in-zone aggregation over the whole track.
    ///
    /// Fails with a `Configuration` error when no zones are attached for
    /// the channel.
    pub fn zone_summaries(&self, channel: ZoneChannel) -> Result<Vec<ZoneSummary>> {
        let zones = self.zones.for_channel(channel).ok_or_else(|| {
            TrackAnalysisError::configuration(format!(
                "no zones configured for channel {channel:?}"
            ))
        })?;
        let data = self.track_data()?;
        Ok(zone_summaries(&data, channel, zones))
    }

    /// Overlap search against every segment pair of another track.
    ///
    /// Returns `(own_segment_index, other_segment_index, overlaps)` for
    /// each pair with at least one overlap.
    pub fn find_overlaps_with(
        &self,
        other: &Track,
        config: &crate::overlap::OverlapConfig,
    ) -> Result<Vec<(usize, usize, Vec<crate::overlap::SegmentOverlap>)>> {
        let mut found = Vec::new();
        for (a, own) in self.segments.iter().enumerate() {
            for (b, theirs) in other.segments.iter().enumerate() {
                let (overlaps, _) =
                    crate::overlap::find_segment_overlaps(own.points(), theirs.points(), config)?;
                if !overlaps.is_empty() {
                    found.push((a, b, overlaps));
                }
            }
        }
        Ok(found)
    }

    /// Serialize to a deterministic GPX 1.1 document.
    pub fn to_gpx(&self) -> String {
        crate::io::write_gpx(self)
    }

    // ------------------------------------------------------------------

    fn check_segment_index(&self, index: usize) -> Result<()> {
        if index >= self.segments.len() {
            return Err(TrackAnalysisError::validation(format!(
                "segment index {index} out of range for {} segments",
                self.segments.len()
            )));
        }
        Ok(())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<usize, SegmentData>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn invalidate_cache(&mut self) {
        self.lock_cache().clear();
    }
}

fn check_channel_len<T>(name: &str, expected: usize, channel: Option<&[T]>) -> Result<()> {
    if let Some(values) = channel {
        if values.len() != expected {
            return Err(TrackAnalysisError::validation(format!(
                "{name} has {} entries for {expected} coordinate pairs",
                values.len()
            )));
        }
    }
    Ok(())
}
