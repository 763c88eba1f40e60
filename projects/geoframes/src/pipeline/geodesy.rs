use crate::pipeline::types::FramePoint;
use crate::run_artifacts::{SequenceEntry, SequenceSummary};
use chrono::{DateTime, Utc};
use geo::HaversineBearing;
use geo_types::Point;

/// Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// How the initial bearing between two points is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BearingFormula {
    /// Great-circle initial bearing in [0, 360).
    #[default]
    Geodetic,
    /// Degree values fed straight into the trigonometric functions, result in (-180, 180].
    /// Matches sequences produced by older tooling.
    Legacy,
}

fn to_point(p: &FramePoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Haversine great-circle distance in meters; 0 if either point is absent.
pub fn distance_meters(p1: Option<&FramePoint>, p2: Option<&FramePoint>) -> f64 {
    let (Some(p1), Some(p2)) = (p1, p2) else {
        return 0.0;
    };

    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lon = (p2.longitude - p1.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + p1.latitude.to_radians().cos()
            * p2.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing in degrees from `p1` to `p2`.
pub fn bearing_degrees(p1: &FramePoint, p2: &FramePoint, formula: BearingFormula) -> f64 {
    match formula {
        BearingFormula::Geodetic => {
            let bearing = to_point(p1).haversine_bearing(to_point(p2));
            bearing.rem_euclid(360.0)
        }
        BearingFormula::Legacy => {
            let (lat1, lon1) = (p1.latitude, p1.longitude);
            let (lat2, lon2) = (p2.latitude, p2.longitude);
            let d_lon = lon2 - lon1;
            let y = d_lon.sin() * lat2.cos();
            let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
            y.atan2(x).to_degrees()
        }
    }
}

/// Altitude change per meter travelled; 0 when `distance` is 0.
pub fn pitch(p1: &FramePoint, p2: &FramePoint, distance: f64) -> f64 {
    if distance != 0.0 {
        (p2.altitude - p1.altitude) / distance
    } else {
        0.0
    }
}

/// Links consecutive frames into a navigable sequence.
///
/// Each entry points at the next frame; the last one keeps the previous
/// heading with zero distance and pitch.
pub fn build_sequence(
    frames: Vec<FramePoint>,
    start_time: DateTime<Utc>,
    formula: BearingFormula,
) -> SequenceSummary {
    let mut entries: Vec<SequenceEntry> = Vec::with_capacity(frames.len());
    let mut total_m = 0.0;

    for (i, point) in frames.iter().enumerate() {
        let entry = match frames.get(i + 1) {
            Some(next) => {
                let distance = distance_meters(Some(point), Some(next));
                total_m += distance;
                SequenceEntry {
                    point: point.clone(),
                    distance_m: distance,
                    bearing_deg: bearing_degrees(point, next, formula),
                    pitch: pitch(point, next, distance),
                }
            }
            None => SequenceEntry {
                point: point.clone(),
                distance_m: 0.0,
                bearing_deg: entries.last().map(|e| e.bearing_deg).unwrap_or(0.0),
                pitch: 0.0,
            },
        };
        entries.push(entry);
    }

    SequenceSummary {
        start_time,
        total_km: total_m / 1000.0,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::frame_at;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = frame_at(0, 51.5007, -0.1246, 10.0);
        assert_eq!(distance_meters(Some(&p), Some(&p)), 0.0);
    }

    #[test]
    fn test_distance_absent_point_is_zero() {
        let p = frame_at(0, 51.5007, -0.1246, 10.0);
        assert_eq!(distance_meters(None, Some(&p)), 0.0);
        assert_eq!(distance_meters(Some(&p), None), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric_and_plausible() {
        let big_ben = frame_at(0, 51.5007, -0.1246, 0.0);
        let eiffel = frame_at(1, 48.8584, 2.2945, 0.0);
        let ab = distance_meters(Some(&big_ben), Some(&eiffel));
        let ba = distance_meters(Some(&eiffel), Some(&big_ben));
        assert_eq!(ab, ba);
        assert!((ab - 340_600.0).abs() < 1_500.0, "distance was {ab}");
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let a = frame_at(0, 0.0, 0.0, 0.0);
        let b = frame_at(1, 1.0, 0.0, 0.0);
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((distance_meters(Some(&a), Some(&b)) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_geodetic_bearing_cardinal_directions() {
        let origin = frame_at(0, 0.0, 0.0, 0.0);
        let north = frame_at(1, 1.0, 0.0, 0.0);
        let east = frame_at(1, 0.0, 1.0, 0.0);
        let west = frame_at(1, 0.0, -1.0, 0.0);

        assert!(bearing_degrees(&origin, &north, BearingFormula::Geodetic).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &east, BearingFormula::Geodetic) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(&origin, &west, BearingFormula::Geodetic) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_legacy_bearing_uses_raw_degrees() {
        let p1 = frame_at(0, 0.0, 0.0, 0.0);
        let p2 = frame_at(1, 1.0, 1.0, 0.0);
        // y = sin(1) * cos(1), x = sin(1)
        let expected = (1f64.sin() * 1f64.cos()).atan2(1f64.sin()).to_degrees();
        assert_eq!(bearing_degrees(&p1, &p2, BearingFormula::Legacy), expected);
    }

    #[test]
    fn test_pitch() {
        let low = frame_at(0, 0.0, 0.0, 10.0);
        let high = frame_at(1, 0.0, 0.0, 30.0);
        assert_eq!(pitch(&low, &high, 100.0), 0.2);
        assert_eq!(pitch(&high, &low, 100.0), -0.2);
        assert_eq!(pitch(&low, &high, 0.0), 0.0);
    }

    #[test]
    fn test_build_sequence_links_consecutive_frames() {
        let frames = vec![
            frame_at(0, 0.0, 0.0, 0.0),
            frame_at(1, 0.001, 0.0, 1.0),
            frame_at(2, 0.002, 0.0, 2.0),
        ];
        let start = frames[0].capture_time;
        let summary = build_sequence(frames, start, BearingFormula::Geodetic);

        assert_eq!(summary.entries.len(), 3);
        assert!(summary.entries[0].distance_m > 100.0);
        assert!(summary.entries[0].bearing_deg.abs() < 1e-6);
        assert!(summary.entries[0].pitch > 0.0);
        assert_eq!(summary.entries[2].distance_m, 0.0);
        assert_eq!(summary.entries[2].pitch, 0.0);
        assert_eq!(summary.entries[2].bearing_deg, summary.entries[1].bearing_deg);

        let total: f64 = summary.entries.iter().map(|e| e.distance_m).sum();
        assert!((summary.total_km - total / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_build_sequence_single_and_empty() {
        let frames = vec![frame_at(0, 1.0, 1.0, 1.0)];
        let start = frames[0].capture_time;
        let summary = build_sequence(frames, start, BearingFormula::Geodetic);
        assert_eq!(summary.entries.len(), 1);
        assert_eq!(summary.entries[0].bearing_deg, 0.0);
        assert_eq!(summary.total_km, 0.0);

        assert!(build_sequence(Vec::new(), start, BearingFormula::Legacy)
            .entries
            .is_empty());
    }
}
