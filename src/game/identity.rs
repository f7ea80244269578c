// Car and track identification from physical telemetry signatures

use serde::{Deserialize, Serialize};

/// Sentinel returned when a signature is not in the table
pub const UNKNOWN: &str = "Unknown";

/// A car as seen through the engine: exact limits the game reports for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CarSignature {
    pub max_rpm: f32,
    pub idle_rpm: f32,
    pub gear_count: f32,
    pub name: &'static str,
    pub class: &'static str,
}

/// A stage or track as seen through its geometry: total length plus the
/// z coordinate of the start line, which separates layouts of equal length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackSignature {
    pub length: f32,
    pub start_z: f32,
    pub name: &'static str,
}

/// Human-readable identity of a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub car_name: String,
    pub car_class: String,
    pub track_name: String,
}

/// Exact lookup of `(max_rpm, idle_rpm, gear_count)`.
///
/// Values come straight from the same game packet field every time, so exact
/// float equality is stable. Unknown signatures resolve to `("Unknown", "Unknown")`.
pub fn identify_car(
    table: &[CarSignature],
    max_rpm: f32,
    idle_rpm: f32,
    gear_count: f32,
) -> (String, String) {
    table
        .iter()
        .find(|car| car.max_rpm == max_rpm && car.idle_rpm == idle_rpm && car.gear_count == gear_count)
        .map(|car| (car.name.to_string(), car.class.to_string()))
        .unwrap_or_else(|| (UNKNOWN.to_string(), UNKNOWN.to_string()))
}

/// Nearest-match lookup of a track.
///
/// Candidates are the entries whose length equals `length` exactly, the one with
/// the smallest `|start_z - candidate.start_z|` wins and ties go to the earliest
/// entry in the table. No candidates or no `start_z` resolve to `"Unknown"`.
pub fn identify_track(table: &[TrackSignature], length: f32, start_z: Option<f32>) -> String {
    let Some(start_z) = start_z else {
        return UNKNOWN.to_string();
    };

    let mut best: Option<(&TrackSignature, f32)> = None;
    for track in table.iter().filter(|t| t.length == length) {
        let distance = (track.start_z - start_z).abs();
        // strict comparison keeps the first of equally distant candidates
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((track, distance));
        }
    }

    best.map(|(track, _)| track.name.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CARS: &[CarSignature] = &[
        CarSignature {
            max_rpm: 890.12,
            idle_rpm: 167.55,
            gear_count: 5.,
            name: "Test Car",
            class: "Test Class",
        },
        CarSignature {
            max_rpm: 890.12,
            idle_rpm: 167.55,
            gear_count: 6.,
            name: "Six Speed",
            class: "Test Class",
        },
    ];

    const TRACKS: &[TrackSignature] = &[
        TrackSignature {
            length: 5000.,
            start_z: -100.,
            name: "North",
        },
        TrackSignature {
            length: 5000.,
            start_z: 100.,
            name: "South",
        },
        TrackSignature {
            length: 5000.,
            start_z: 300.,
            name: "South Reverse",
        },
        TrackSignature {
            length: 7200.5,
            start_z: 0.,
            name: "Long",
        },
    ];

    #[test]
    fn test_identify_car_exact_match() {
        assert_eq!(
            identify_car(CARS, 890.12, 167.55, 5.),
            ("Test Car".to_string(), "Test Class".to_string())
        );
        assert_eq!(identify_car(CARS, 890.12, 167.55, 6.).0, "Six Speed");
    }

    #[test]
    fn test_identify_car_unknown() {
        assert_eq!(
            identify_car(CARS, 890.12, 167.55, 4.),
            (UNKNOWN.to_string(), UNKNOWN.to_string())
        );
        assert_eq!(identify_car(&[], 1., 1., 1.).0, UNKNOWN);
    }

    #[test]
    fn test_identify_track_nearest_start() {
        assert_eq!(identify_track(TRACKS, 5000., Some(80.)), "South");
        assert_eq!(identify_track(TRACKS, 5000., Some(-1000.)), "North");
        assert_eq!(identify_track(TRACKS, 5000., Some(250.)), "South Reverse");
        assert_eq!(identify_track(TRACKS, 7200.5, Some(9999.)), "Long");
    }

    #[test]
    fn test_identify_track_exact_start() {
        assert_eq!(identify_track(TRACKS, 5000., Some(100.)), "South");
    }

    #[test]
    fn test_identify_track_tie_goes_to_first() {
        assert_eq!(identify_track(TRACKS, 5000., Some(0.)), "North");
    }

    #[test]
    fn test_identify_track_unknown() {
        assert_eq!(identify_track(TRACKS, 1234., Some(0.)), UNKNOWN);
        assert_eq!(identify_track(TRACKS, 5000., None), UNKNOWN);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_track_match_is_never_farther_than_any_candidate(start_z in -1000.0f32..1000.0f32) {
            let name = identify_track(TRACKS, 5000., Some(start_z));
            let chosen = TRACKS.iter().find(|t| t.name == name).unwrap();
            let chosen_distance = (chosen.start_z - start_z).abs();
            for candidate in TRACKS.iter().filter(|t| t.length == 5000.) {
                prop_assert!(chosen_distance <= (candidate.start_z - start_z).abs());
            }
        }
    }
}
