//! End-to-end tests for overlap detection between independently recorded
//! tracks.

use track_analyzer::{
    find_segment_overlaps, OverlapConfig, OverlapDirection, Track, TrackPoint,
};

/// A loop around a city block with slight per-recording jitter.
fn block_loop(jitter: f64, n: usize) -> Vec<TrackPoint> {
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64 * std::f64::consts::TAU;
            TrackPoint::new(
                51.5074 + 0.002 * t.sin() + jitter,
                -0.1278 + 0.003 * t.cos() + jitter,
            )
        })
        .collect()
}

#[test]
fn test_two_recordings_of_the_same_loop_overlap_fully() {
    // ~5 m of jitter between the two recordings
    let a = block_loop(0.0, 120);
    let b = block_loop(0.00004, 120);

    let (overlaps, stats) = find_segment_overlaps(&a, &b, &OverlapConfig::default()).unwrap();
    assert_eq!(overlaps.len(), 1);
    assert!(stats.bounds_intersect);

    let overlap = &overlaps[0];
    assert!(overlap.overlap_fraction > 0.95);
    assert_eq!(overlap.direction, OverlapDirection::Same);
}

#[test]
fn test_reversed_recording_is_flagged() {
    let a = block_loop(0.0, 120);
    let mut b = block_loop(0.00004, 120);
    b.reverse();

    let (overlaps, _) = find_segment_overlaps(&a, &b, &OverlapConfig::default()).unwrap();
    assert_eq!(overlaps.len(), 1);
    assert_eq!(overlaps[0].direction, OverlapDirection::Reversed);
    assert!(overlaps[0].overlap_fraction > 0.95);
}

#[test]
fn test_distant_tracks_cost_nothing() {
    let london = block_loop(0.0, 100);
    let paris: Vec<TrackPoint> = (0..100)
        .map(|i| TrackPoint::new(48.8566, 2.3522 + 0.0001 * i as f64))
        .collect();

    let (overlaps, stats) = find_segment_overlaps(&london, &paris, &OverlapConfig::default()).unwrap();
    assert!(overlaps.is_empty());
    assert_eq!(stats.distance_computations, 0);
}

#[test]
fn test_out_and_back_against_one_way() {
    // A rides out and back along the same road; B rides it one way.
    let out: Vec<TrackPoint> = (0..50)
        .map(|i| TrackPoint::new(0.0, 0.001 * i as f64))
        .collect();
    let mut out_and_back = out.clone();
    out_and_back.extend(out.iter().rev().skip(1).copied());
    let one_way = out;

    let (overlaps, _) =
        find_segment_overlaps(&out_and_back, &one_way, &OverlapConfig::default()).unwrap();

    // The whole out-and-back lies on the one-way path
    assert_eq!(overlaps.len(), 1);
    assert!((overlaps[0].overlap_fraction - 1.0).abs() < 1e-9);
    assert_eq!(overlaps[0].match_start_index, 0);
    assert_eq!(overlaps[0].match_end_index, 49);
}

#[test]
fn test_track_level_closest_point() {
    let coordinates: Vec<(f64, f64)> = (0..20).map(|i| (0.0, 0.001 * i as f64)).collect();
    let track = Track::from_points("line", &coordinates, None, None, None, None, None).unwrap();

    let reference = TrackPoint::new(0.0002, 0.0072);
    let found = track.closest_point(&reference).unwrap();
    assert_eq!(found.segment_index, 0);
    assert_eq!(found.point_index, 7);
    assert!(found.distance < 40.0);
}

#[test]
fn test_track_level_overlap_search() {
    let coordinates: Vec<(f64, f64)> = (0..40).map(|i| (0.0, 0.001 * i as f64)).collect();
    let mut a = Track::from_points("a", &coordinates, None, None, None, None, None).unwrap();
    a.split_segment(0, 19).unwrap();
    let b = Track::from_points("b", &coordinates, None, None, None, None, None).unwrap();

    let found = a.find_overlaps_with(&b, &OverlapConfig::default()).unwrap();
    // Both halves of A overlap B's single segment
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].0, 0);
    assert_eq!(found[1].0, 1);
    for (_, candidate_index, overlaps) in &found {
        assert_eq!(*candidate_index, 0);
        assert_eq!(overlaps.len(), 1);
        assert!((overlaps[0].overlap_fraction - 1.0).abs() < 1e-9);
    }
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_track_overlap_search() {
    use track_analyzer::find_track_overlaps_parallel;

    let coordinates: Vec<(f64, f64)> = (0..40).map(|i| (0.0, 0.001 * i as f64)).collect();
    let mut a = Track::from_points("a", &coordinates, None, None, None, None, None).unwrap();
    a.split_segment(0, 19).unwrap();
    let b = Track::from_points("b", &coordinates, None, None, None, None, None).unwrap();

    let found = find_track_overlaps_parallel(&a, &b, &OverlapConfig::default()).unwrap();
    // Both halves of A overlap B's single segment
    assert_eq!(found.len(), 2);
    for (_, candidate_index, overlaps) in &found {
        assert_eq!(*candidate_index, 0);
        assert!(!overlaps.is_empty());
    }
}
