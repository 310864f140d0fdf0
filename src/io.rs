//! GPX boundary.
//!
//! Reading goes through the `gpx` crate and yields a validated [`Track`].
//! Writing is a deterministic hand-rolled GPX 1.1 serializer: identical
//! tracks always produce byte-identical output, and heart-rate/cadence/power
//! are emitted as Garmin TrackPointExtension elements, which the `gpx`
//! crate cannot round-trip.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use log::info;

use crate::track::{Segment, Track};
use crate::{Result, TrackAnalysisError, TrackPoint};

/// Read the first `<trk>` of a GPX document into a [`Track`].
///
/// Elevation and time are carried over; extension channels are not parsed
/// at this boundary. A document without any track fails with
/// `UnsupportedFormat`.
pub fn read_gpx<R: Read>(reader: R) -> Result<Track> {
    let document = gpx::read(BufReader::new(reader))?;

    let source = document.tracks.first().ok_or_else(|| {
        TrackAnalysisError::UnsupportedFormat {
            message: "GPX document contains no <trk> element".to_string(),
        }
    })?;

    let name = source.name.clone().unwrap_or_else(|| "track".to_string());
    let mut track = Track::new(name);

    for segment in &source.segments {
        let mut points = Vec::with_capacity(segment.points.len());
        for waypoint in &segment.points {
            let coord = waypoint.point();
            let mut point = TrackPoint::new(coord.y(), coord.x());
            point.elevation = waypoint.elevation;
            point.time = match &waypoint.time {
                Some(t) => Some(parse_gpx_time(t)?),
                None => None,
            };
            points.push(point);
        }
        track.add_segment(Segment::from_points(points)?);
    }

    info!(
        "Read GPX track '{}' with {} segment(s)",
        track.name(),
        track.segments().len()
    );
    Ok(track)
}

/// Read a GPX file from disk.
pub fn read_gpx_file(path: impl AsRef<Path>) -> Result<Track> {
    let file = File::open(path.as_ref()).map_err(|e| TrackAnalysisError::UnsupportedFormat {
        message: format!("cannot open {}: {e}", path.as_ref().display()),
    })?;
    read_gpx(file)
}

/// Serialize a track to a deterministic GPX 1.1 document.
///
/// Floats use their shortest exact representation, timestamps are UTC
/// RFC 3339 with second precision, and elements appear in a fixed order,
/// so equal tracks serialize to byte-identical documents.
pub fn write_gpx(track: &Track) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(concat!(
        "<gpx version=\"1.1\" creator=\"track-analyzer\" ",
        "xmlns=\"http://www.topografix.com/GPX/1/1\" ",
        "xmlns:gpxtpx=\"http://www.garmin.com/xmlschemas/TrackPointExtension/v1\">\n",
    ));
    out.push_str("  <trk>\n");
    let _ = writeln!(out, "    <name>{}</name>", escape_xml(track.name()));

    for segment in track.segments() {
        out.push_str("    <trkseg>\n");
        for point in segment.points() {
            write_trkpt(&mut out, point);
        }
        out.push_str("    </trkseg>\n");
    }

    out.push_str("  </trk>\n");
    out.push_str("</gpx>\n");
    out
}

fn write_trkpt(out: &mut String, point: &TrackPoint) {
    let _ = writeln!(
        out,
        "      <trkpt lat=\"{}\" lon=\"{}\">",
        point.latitude, point.longitude
    );
    if let Some(elevation) = point.elevation {
        let _ = writeln!(out, "        <ele>{elevation}</ele>");
    }
    if let Some(time) = point.time {
        let _ = writeln!(
            out,
            "        <time>{}</time>",
            time.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
    }

    let has_tpx = point.heartrate.is_some() || point.cadence.is_some();
    if has_tpx || point.power.is_some() {
        out.push_str("        <extensions>\n");
        if has_tpx {
            out.push_str("          <gpxtpx:TrackPointExtension>\n");
            if let Some(hr) = point.heartrate {
                let _ = writeln!(out, "            <gpxtpx:hr>{hr}</gpxtpx:hr>");
            }
            if let Some(cad) = point.cadence {
                let _ = writeln!(out, "            <gpxtpx:cad>{cad}</gpxtpx:cad>");
            }
            out.push_str("          </gpxtpx:TrackPointExtension>\n");
        }
        if let Some(power) = point.power {
            let _ = writeln!(out, "          <power>{power}</power>");
        }
        out.push_str("        </extensions>\n");
    }
    out.push_str("      </trkpt>\n");
}

fn parse_gpx_time(time: &gpx::Time) -> Result<DateTime<Utc>> {
    let formatted = time.format()?;
    DateTime::parse_from_rfc3339(&formatted)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TrackAnalysisError::UnsupportedFormat {
            message: format!("unparseable GPX timestamp '{formatted}': {e}"),
        })
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
