//! # Track Analyzer
//!
//! GPS track metrics, interpolation and segment-overlap analysis.
//!
//! This library turns raw, possibly irregular GPS point sequences into
//! consistent motion metrics and detects when two independently recorded
//! tracks traverse the same physical path. It provides:
//!
//! - Per-transition metrics (distance, speed, moving/stopped classification,
//!   elevation gain/loss) with per-segment caching
//! - Gap interpolation across all recorded channels
//! - Segment overlap detection with direction (same/reversed) resolution
//! - Heart-rate / power / cadence zone classification
//!
//! ## Features
//!
//! - **`parallel`** - Parallel overlap search across segment pairs with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use track_analyzer::Track;
//!
//! let points = vec![
//!     (51.5074, -0.1278),
//!     (51.5080, -0.1290),
//!     (51.5090, -0.1300),
//! ];
//!
//! let track = Track::from_points("morning-ride", &points, None, None, None, None, None)
//!     .expect("valid coordinates");
//!
//! let overview = track.segment_overview(0).expect("segment exists");
//! assert!(overview.total_distance > 0.0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackAnalysisError};

// Geographic utilities (distance, bounds, center calculations)
pub mod geo_utils;
pub use geo_utils::{center, haversine_distance, try_distance};

// Transition-table metrics engine
pub mod metrics;
pub use metrics::{MetricsConfig, SegmentData, SegmentOverview};

// Gap interpolation engine
pub mod interpolate;
pub use interpolate::{interpolate_between, interpolate_segment, strip_interpolated};

// Segment overlap / comparison engine
pub mod overlap;
pub use overlap::{
    closest_point, find_segment_overlaps, OverlapConfig, OverlapDirection, OverlapStats,
    PointDistance, SegmentOverlap,
};
#[cfg(feature = "parallel")]
pub use overlap::find_track_overlaps_parallel;

// Zone classification (heart-rate/power/cadence buckets)
pub mod zones;
pub use zones::{zone_indices, zone_summaries, ZoneChannel, ZoneInterval, ZoneSummary, Zones};

// Track / segment data model
pub mod track;
pub use track::{Segment, Track, TrackZones};

// GPX boundary: reading via the gpx crate, deterministic XML writing
pub mod io;

// ============================================================================
// Core Types
// ============================================================================

/// A single recorded GPS sample.
///
/// Latitude/longitude are required; every other channel is optional and kept
/// as recorded. The `interpolated` flag marks synthetic points inserted by
/// the interpolation engine so they can be stripped again.
///
/// # Example
/// ```
/// use track_analyzer::TrackPoint;
/// let point = TrackPoint::new(51.5074, -0.1278).with_elevation(11.0);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    /// Timezone-aware sample timestamp
    pub time: Option<DateTime<Utc>>,
    /// Heart rate in beats/min (positive)
    pub heartrate: Option<u32>,
    /// Cadence in rpm (non-negative)
    pub cadence: Option<u32>,
    /// Power in watts (non-negative)
    pub power: Option<f64>,
    /// True for points inserted by the interpolation engine
    pub interpolated: bool,
}

impl TrackPoint {
    /// Create a new track point from a latitude/longitude pair.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            time: None,
            heartrate: None,
            cadence: None,
            power: None,
            interpolated: false,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_heartrate(mut self, heartrate: u32) -> Self {
        self.heartrate = Some(heartrate);
        self
    }

    pub fn with_cadence(mut self, cadence: u32) -> Self {
        self.cadence = Some(cadence);
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    /// Check if the point has valid coordinates and channel values.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Validate all point invariants, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(TrackAnalysisError::validation(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(TrackAnalysisError::validation(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        if let Some(elevation) = self.elevation {
            if !elevation.is_finite() {
                return Err(TrackAnalysisError::validation(
                    "elevation must be finite".to_string(),
                ));
            }
        }
        if self.heartrate == Some(0) {
            return Err(TrackAnalysisError::validation(
                "heartrate must be positive".to_string(),
            ));
        }
        if let Some(power) = self.power {
            if !power.is_finite() || power < 0.0 {
                return Err(TrackAnalysisError::validation(format!(
                    "power {power} must be non-negative"
                )));
            }
        }
        Ok(())
    }
}

/// Bounding box for a segment or track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from track points. Returns `None` for an empty slice.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Check whether two bounding boxes intersect.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }
}

// ============================================================================
// Tests
// ============================================================================
