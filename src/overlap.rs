//! Segment overlap detection between independently recorded tracks.
//!
//! The engine decides whether two point sequences traverse the same physical
//! path, and where. Pipeline per segment pair:
//!
//! 1. Bounding-box pre-filter (cheap rejection, zero point comparisons)
//! 2. Closest-point search: for every point in A, the nearest point in B
//! 3. Contiguous-range extraction under a distance tolerance
//! 4. Point-count based gap merging (GPS jitter splits otherwise continuous
//!    overlaps into runs separated by a handful of off-path points)
//! 5. Direction detection from the ordering of matched B indices
//!
//! The closest-point step is a deliberate O(|A| x |B|) linear scan; tracks
//! are bounded to low tens-of-thousands of points and the pre-filter skips
//! the cost entirely for disjoint tracks.

use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{haversine_distance, polyline_length};
use crate::{Bounds, Result, TrackAnalysisError, TrackPoint};

/// Parameters for overlap detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Maximum distance (meters) between a point and its closest match for
    /// the point to count as on-overlap. Default: 20 m.
    pub max_distance_tolerance: f64,

    /// Two overlap ranges separated by at most this many off-overlap points
    /// are merged into one. Point-count based, not distance based. Default: 5.
    pub merge_tolerance_points: usize,

    /// Overlaps covering less than this fraction of the base segment's
    /// points are discarded. Default: 0.0 (keep everything).
    pub min_overlap_fraction: f64,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            max_distance_tolerance: 20.0,
            merge_tolerance_points: 5,
            min_overlap_fraction: 0.0,
        }
    }
}

impl OverlapConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.max_distance_tolerance.is_finite() || self.max_distance_tolerance < 0.0 {
            return Err(TrackAnalysisError::configuration(format!(
                "max_distance_tolerance {} must be non-negative",
                self.max_distance_tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.min_overlap_fraction) {
            return Err(TrackAnalysisError::configuration(format!(
                "min_overlap_fraction {} must be within [0, 1]",
                self.min_overlap_fraction
            )));
        }
        Ok(())
    }
}

/// Result of a closest-point query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointDistance {
    /// The matched point
    pub point: TrackPoint,
    /// Segment the match belongs to (0 for single-sequence queries)
    pub segment_index: usize,
    /// Index of the match within its sequence
    pub point_index: usize,
    /// Haversine distance to the reference point in meters
    pub distance: f64,
}

/// Traversal direction of an overlap relative to the base segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlapDirection {
    Same,
    Reversed,
}

/// One detected overlap between a base segment A and a candidate segment B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentOverlap {
    /// Inclusive point-index range in the base segment
    pub start_index: usize,
    pub end_index: usize,
    /// Inclusive point-index range of the matches in the candidate segment
    pub match_start_index: usize,
    pub match_end_index: usize,
    /// Whether the candidate traverses the shared path forwards or backwards
    pub direction: OverlapDirection,
    /// Length of the overlapping base range in meters
    pub overlap_distance: f64,
    /// Number of base points inside the overlap
    pub point_count: usize,
    /// Fraction of the base segment's points inside the overlap
    pub overlap_fraction: f64,
}

/// Instrumentation for one overlap query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapStats {
    /// Number of pairwise haversine evaluations performed
    pub distance_computations: usize,
    /// Whether the bounding boxes intersected at all
    pub bounds_intersect: bool,
}

/// Find the closest point in `points` to `reference` by haversine distance.
///
/// Linear scan; returns `None` for an empty slice. `segment_index` is 0,
/// callers scanning multiple segments set it themselves.
pub fn closest_point(points: &[TrackPoint], reference: &TrackPoint) -> Option<PointDistance> {
    let mut best: Option<PointDistance> = None;
    for (i, p) in points.iter().enumerate() {
        let d = haversine_distance(reference, p);
        if best.as_ref().is_none_or(|b| d < b.distance) {
            best = Some(PointDistance {
                point: *p,
                segment_index: 0,
                point_index: i,
                distance: d,
            });
        }
    }
    best
}

/// Detect overlaps of the `base` point sequence with `candidate`.
///
/// Returns the detected overlaps together with instrumentation. Disjoint
/// bounding boxes short-circuit with zero distance computations.
pub fn find_segment_overlaps(
    base: &[TrackPoint],
    candidate: &[TrackPoint],
    config: &OverlapConfig,
) -> Result<(Vec<SegmentOverlap>, OverlapStats)> {
    config.validate()?;

    let mut stats = OverlapStats::default();

    let (Some(base_bounds), Some(candidate_bounds)) =
        (Bounds::from_points(base), Bounds::from_points(candidate))
    else {
        return Ok((Vec::new(), stats));
    };

    if !base_bounds.overlaps(&candidate_bounds) {
        debug!("Bounding boxes disjoint, skipping point-wise comparison");
        return Ok((Vec::new(), stats));
    }
    stats.bounds_intersect = true;

    // Closest candidate match for every base point
    let mut matches: Vec<PointDistance> = Vec::with_capacity(base.len());
    for point in base {
        let mut best: Option<PointDistance> = None;
        for (i, other) in candidate.iter().enumerate() {
            let d = haversine_distance(point, other);
            stats.distance_computations += 1;
            if best.as_ref().is_none_or(|b| d < b.distance) {
                best = Some(PointDistance {
                    point: *other,
                    segment_index: 0,
                    point_index: i,
                    distance: d,
                });
            }
        }
        match best {
            Some(b) => matches.push(b),
            // Candidate is non-empty here; keep the invariant explicit
            None => return Ok((Vec::new(), stats)),
        }
    }

    let on_overlap: Vec<bool> = matches
        .iter()
        .map(|m| m.distance <= config.max_distance_tolerance)
        .collect();

    let runs = merge_runs(
        &extract_runs(&on_overlap),
        config.merge_tolerance_points,
    );

    let mut overlaps = Vec::with_capacity(runs.len());
    for (start, end) in runs {
        let matched_indices: Vec<usize> =
            (start..=end).map(|i| matches[i].point_index).collect();
        let match_start = matched_indices.iter().copied().min().unwrap_or(0);
        let match_end = matched_indices.iter().copied().max().unwrap_or(0);

        let point_count = end - start + 1;
        let overlap_fraction = point_count as f64 / base.len() as f64;
        if overlap_fraction < config.min_overlap_fraction {
            continue;
        }

        overlaps.push(SegmentOverlap {
            start_index: start,
            end_index: end,
            match_start_index: match_start,
            match_end_index: match_end,
            direction: detect_direction(&matched_indices),
            overlap_distance: polyline_length(&base[start..=end]),
            point_count,
            overlap_fraction,
        });
    }

    info!(
        "Found {} overlap(s) between {}-point base and {}-point candidate ({} distance computations)",
        overlaps.len(),
        base.len(),
        candidate.len(),
        stats.distance_computations
    );

    Ok((overlaps, stats))
}

/// Overlap search across every segment pair of two tracks, in parallel.
///
/// Returns `(base_segment_index, candidate_segment_index, overlaps)` for
/// each pair that produced at least one overlap.
#[cfg(feature = "parallel")]
pub fn find_track_overlaps_parallel(
    base: &crate::track::Track,
    candidate: &crate::track::Track,
    config: &OverlapConfig,
) -> Result<Vec<(usize, usize, Vec<SegmentOverlap>)>> {
    config.validate()?;

    let pairs: Vec<(usize, usize)> = (0..base.segments().len())
        .flat_map(|a| (0..candidate.segments().len()).map(move |b| (a, b)))
        .collect();

    let results: Vec<Result<Option<(usize, usize, Vec<SegmentOverlap>)>>> = pairs
        .par_iter()
        .map(|&(a, b)| {
            let (overlaps, _) = find_segment_overlaps(
                base.segments()[a].points(),
                candidate.segments()[b].points(),
                config,
            )?;
            Ok((!overlaps.is_empty()).then_some((a, b, overlaps)))
        })
        .collect();

    let mut found = Vec::new();
    for result in results {
        if let Some(entry) = result? {
            found.push(entry);
        }
    }
    Ok(found)
}

/// Contiguous runs of `true` as inclusive (start, end) index pairs.
fn extract_runs(flags: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<usize> = None;

    for (i, &on) in flags.iter().enumerate() {
        match (on, current) {
            (true, None) => current = Some(i),
            (false, Some(start)) => {
                runs.push((start, i - 1));
                current = None;
            }
            _ => {}
        }
    }
    if let Some(start) = current {
        runs.push((start, flags.len() - 1));
    }
    runs
}

/// Merge runs separated by at most `tolerance` off-overlap points.
fn merge_runs(runs: &[(usize, usize)], tolerance: usize) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(runs.len());

    for &(start, end) in runs {
        match merged.last_mut() {
            Some((_, prev_end)) if start - *prev_end - 1 <= tolerance => {
                *prev_end = end;
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Majority vote over the step directions of the matched indices.
///
/// Duplicate matches (several base points snapping to one candidate point)
/// contribute zero steps, so jitter does not flip the verdict.
fn detect_direction(matched_indices: &[usize]) -> OverlapDirection {
    let mut forward = 0usize;
    let mut backward = 0usize;
    for w in matched_indices.windows(2) {
        match w[1].cmp(&w[0]) {
            std::cmp::Ordering::Greater => forward += 1,
            std::cmp::Ordering::Less => backward += 1,
            std::cmp::Ordering::Equal => {}
        }
    }
    if backward > forward {
        OverlapDirection::Reversed
    } else {
        OverlapDirection::Same
    }
}
