// DiRT Rally 2.0 telemetry decoding and identification
//
// The game is set up through hardware_settings_config.xml in the documents folder:
//   <udp enabled="true" extradata="3" ip="127.0.0.1" port="20777" delay="1" />
// With extradata="3" every packet carries 66 little-endian f32 fields.

use super::{
    FIELD_WIDTH, Game, RunSample,
    identity::{CarSignature, Identity, TrackSignature, identify_car, identify_track},
    read_field,
};

pub const FIELD_COUNT: usize = 66;
pub const PACKET_SIZE: usize = FIELD_COUNT * FIELD_WIDTH;

/// Field positions in a DiRT Rally 2.0 packet. Field `i` lives at bytes `[4i, 4i + 4)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum DirtRally2Field {
    RunTime = 0,
    /// Elapsed time of the current stage, zero outside of a stage
    LapTime = 1,
    Distance = 2,
    Progress = 3,
    PosX = 4,
    PosY = 5,
    PosZ = 6,
    SpeedMs = 7,
    VelX = 8,
    VelY = 9,
    VelZ = 10,
    RollX = 11,
    RollY = 12,
    RollZ = 13,
    PitchX = 14,
    PitchY = 15,
    PitchZ = 16,
    SuspRl = 17,
    SuspRr = 18,
    SuspFl = 19,
    SuspFr = 20,
    SuspVelRl = 21,
    SuspVelRr = 22,
    SuspVelFl = 23,
    SuspVelFr = 24,
    WheelSpeedRl = 25,
    WheelSpeedRr = 26,
    WheelSpeedFl = 27,
    WheelSpeedFr = 28,
    Throttle = 29,
    Steering = 30,
    Brakes = 31,
    Clutch = 32,
    Gear = 33,
    GForceLat = 34,
    GForceLon = 35,
    CurrentLap = 36,
    /// Engine speed / 10
    Rpm = 37,
    SliProSupport = 38,
    CarPos = 39,
    KersLevel = 40,
    KersMaxLevel = 41,
    Drs = 42,
    TractionControl = 43,
    AntiLockBrakes = 44,
    FuelInTank = 45,
    FuelCapacity = 46,
    InPit = 47,
    Sector = 48,
    Sector1Time = 49,
    Sector2Time = 50,
    BrakesTempRl = 51,
    BrakesTempRr = 52,
    BrakesTempFl = 53,
    BrakesTempFr = 54,
    TyrePressureRl = 55,
    TyrePressureRr = 56,
    TyrePressureFl = 57,
    TyrePressureFr = 58,
    LapsCompleted = 59,
    TotalLaps = 60,
    TrackLength = 61,
    /// Stage time of the run that just ended
    LastLapTime = 62,
    /// Engine limiter / 10
    MaxRpm = 63,
    /// Idle engine speed / 10
    IdleRpm = 64,
    MaxGears = 65,
}

impl DirtRally2Field {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn offset(self) -> usize {
        self.index() * FIELD_WIDTH
    }
}

/// Named accessors over a raw (possibly missing or truncated) packet
#[derive(Clone, Copy, Debug)]
pub struct DirtRally2Packet<'a> {
    payload: Option<&'a [u8]>,
}

impl<'a> DirtRally2Packet<'a> {
    pub fn new(payload: Option<&'a [u8]>) -> Self {
        Self { payload }
    }

    /// Value of `field`, `0.0` when the packet does not contain it
    pub fn get(&self, field: DirtRally2Field) -> f32 {
        read_field(self.payload, field.index())
    }

    /// Value of `field`, `None` when the packet does not contain it
    pub fn try_get(&self, field: DirtRally2Field) -> Option<f32> {
        let len = self.payload?.len();
        (len >= field.offset() + FIELD_WIDTH).then(|| self.get(field))
    }

    pub fn lap_time(&self) -> f32 {
        self.get(DirtRally2Field::LapTime)
    }

    pub fn last_lap_time(&self) -> f32 {
        self.get(DirtRally2Field::LastLapTime)
    }
}

/// Build a full-size packet with the given fields set and everything else zero
pub fn encode_packet(values: &[(DirtRally2Field, f32)]) -> Vec<u8> {
    let mut packet = vec![0u8; PACKET_SIZE];
    for (field, value) in values {
        let offset = field.offset();
        packet[offset..offset + FIELD_WIDTH].copy_from_slice(&value.to_le_bytes());
    }
    packet
}

#[rustfmt::skip]
const CARS: &[CarSignature] = &[
    CarSignature { max_rpm: 890.12, idle_rpm: 167.55, gear_count: 5., name: "Mini Cooper S", class: "H1 (FWD)" },
    CarSignature { max_rpm: 837.76, idle_rpm: 104.72, gear_count: 5., name: "Lancia Fulvia HF", class: "H1 (FWD)" },
    CarSignature { max_rpm: 628.32, idle_rpm: 94.25, gear_count: 4., name: "Citroën DS 21", class: "H1 (FWD)" },
    CarSignature { max_rpm: 733.04, idle_rpm: 104.72, gear_count: 5., name: "Volkswagen Golf GTI 16V", class: "H2 (FWD)" },
    CarSignature { max_rpm: 759.22, idle_rpm: 104.72, gear_count: 5., name: "Peugeot 205 GTI", class: "H2 (FWD)" },
    CarSignature { max_rpm: 942.48, idle_rpm: 104.72, gear_count: 5., name: "Ford Escort Mk II", class: "H2 (RWD)" },
    CarSignature { max_rpm: 785.4, idle_rpm: 94.25, gear_count: 5., name: "Alpine Renault A110 1600 S", class: "H2 (RWD)" },
    CarSignature { max_rpm: 837.76, idle_rpm: 104.72, gear_count: 6., name: "BMW E30 M3 Evo Rally", class: "H3 (RWD)" },
    CarSignature { max_rpm: 785.4, idle_rpm: 104.72, gear_count: 5., name: "Lancia Stratos", class: "H3 (RWD)" },
    CarSignature { max_rpm: 863.94, idle_rpm: 125.66, gear_count: 5., name: "Lancia 037 Evo 2", class: "Group B (RWD)" },
    CarSignature { max_rpm: 837.76, idle_rpm: 125.66, gear_count: 5., name: "Audi Sport quattro S1 E2", class: "Group B (4WD)" },
    CarSignature { max_rpm: 785.4, idle_rpm: 125.66, gear_count: 5., name: "Peugeot 205 T16 Evo 2", class: "Group B (4WD)" },
    CarSignature { max_rpm: 890.12, idle_rpm: 146.61, gear_count: 5., name: "Ford Fiesta R5", class: "R5" },
    CarSignature { max_rpm: 785.4, idle_rpm: 136.14, gear_count: 5., name: "Škoda Fabia R5", class: "R5" },
    CarSignature { max_rpm: 837.76, idle_rpm: 136.14, gear_count: 5., name: "Volkswagen Polo GTI R5", class: "R5" },
    CarSignature { max_rpm: 994.84, idle_rpm: 157.08, gear_count: 6., name: "Ford Fiesta R2", class: "R2" },
    CarSignature { max_rpm: 837.76, idle_rpm: 167.55, gear_count: 6., name: "Volkswagen Polo S1600", class: "F2 Kit Car" },
    CarSignature { max_rpm: 994.84, idle_rpm: 104.72, gear_count: 6., name: "Hyundai i20 Coupe WRC", class: "2000cc" },
];

// Forward and reverse stages share a length and are told apart by where they start
#[rustfmt::skip]
const TRACKS: &[TrackSignature] = &[
    TrackSignature { length: 8251.67, start_z: -2296.9, name: "Argentina, Las Juntas" },
    TrackSignature { length: 8251.67, start_z: 2100.5, name: "Argentina, Valle de los puentes" },
    TrackSignature { length: 4040.72, start_z: 1193.4, name: "Argentina, Camino de acantilados y rocas" },
    TrackSignature { length: 4040.72, start_z: -1055.8, name: "Argentina, San Isidro" },
    TrackSignature { length: 10579.4, start_z: -1012.3, name: "Australia, Mount Kaye Pass" },
    TrackSignature { length: 10579.4, start_z: 815.6, name: "Australia, Mount Kaye Pass Reverse" },
    TrackSignature { length: 12845.9, start_z: -2480.2, name: "Wales, Pant Mawr" },
    TrackSignature { length: 12845.9, start_z: 1764.1, name: "Wales, Bidno Moorland" },
    TrackSignature { length: 9907.08, start_z: 3028.7, name: "Poland, Zienki" },
    TrackSignature { length: 9907.08, start_z: -2713.0, name: "Poland, Zaróbka" },
    TrackSignature { length: 14344.4, start_z: -3117.4, name: "Spain, Comienzo De Bellriu" },
    TrackSignature { length: 14344.4, start_z: 2848.9, name: "Spain, Final De Bellriu" },
    TrackSignature { length: 12501.6, start_z: 1462.3, name: "New Zealand, Waimarama Point Forward" },
    TrackSignature { length: 12501.6, start_z: -1722.5, name: "New Zealand, Waimarama Point Reverse" },
    TrackSignature { length: 12869.1, start_z: -1902.8, name: "USA, North Fork Pass" },
    TrackSignature { length: 12869.1, start_z: 2226.4, name: "USA, North Fork Pass Reverse" },
];

/// DiRT Rally 2.0. Only reports the total stage time, not per-split times.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirtRally2;

impl Game for DirtRally2 {
    fn name(&self) -> &'static str {
        "DirtRally2"
    }

    fn decode(&self, payload: Option<&[u8]>) -> RunSample {
        let packet = DirtRally2Packet::new(payload);
        RunSample {
            run_time_s: packet.lap_time(),
            last_run_time_s: packet.last_lap_time(),
            laps_completed: packet.get(DirtRally2Field::LapsCompleted),
            laps_total: packet.get(DirtRally2Field::TotalLaps),
        }
    }

    fn identify(&self, payload: Option<&[u8]>) -> Identity {
        let packet = DirtRally2Packet::new(payload);
        let (car_name, car_class) = identify_car(
            CARS,
            packet.get(DirtRally2Field::MaxRpm),
            packet.get(DirtRally2Field::IdleRpm),
            packet.get(DirtRally2Field::MaxGears),
        );
        let track_name = identify_track(
            TRACKS,
            packet.get(DirtRally2Field::TrackLength),
            packet.try_get(DirtRally2Field::PosZ),
        );
        Identity {
            car_name,
            car_class,
            track_name,
        }
    }

    fn known_cars(&self) -> Vec<(String, String)> {
        CARS.iter()
            .map(|car| (car.name.to_string(), car.class.to_string()))
            .collect()
    }

    fn known_tracks(&self) -> Vec<String> {
        TRACKS.iter().map(|track| track.name.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::UNKNOWN;

    #[test]
    fn test_field_offsets() {
        assert_eq!(DirtRally2Field::RunTime.offset(), 0);
        assert_eq!(DirtRally2Field::LapTime.offset(), 4);
        assert_eq!(DirtRally2Field::PosZ.offset(), 24);
        assert_eq!(DirtRally2Field::LapsCompleted.offset(), 236);
        assert_eq!(DirtRally2Field::LastLapTime.offset(), 248);
        assert_eq!(DirtRally2Field::MaxGears.index(), FIELD_COUNT - 1);
        assert_eq!(PACKET_SIZE, 264);
    }

    #[test]
    fn test_decode_run_fields() {
        let packet = encode_packet(&[
            (DirtRally2Field::LapTime, 12.4),
            (DirtRally2Field::LastLapTime, 301.25),
            (DirtRally2Field::LapsCompleted, 0.),
            (DirtRally2Field::TotalLaps, 1.),
        ]);
        let sample = DirtRally2.decode(Some(&packet));
        assert_eq!(sample.run_time_s, 12.4);
        assert_eq!(sample.last_run_time_s, 301.25);
        assert_eq!(sample.laps_completed, 0.);
        assert_eq!(sample.laps_total, 1.);
    }

    #[test]
    fn test_decode_without_packet_is_neutral() {
        assert_eq!(DirtRally2.decode(None), RunSample::default());
        assert_eq!(DirtRally2.decode(Some(&[1, 2, 3, 4, 5])), RunSample::default());
    }

    #[test]
    fn test_decode_truncated_packet_keeps_leading_fields() {
        let packet = encode_packet(&[(DirtRally2Field::LapTime, 5.5), (DirtRally2Field::LastLapTime, 99.)]);
        let truncated = &packet[..DirtRally2Field::LapTime.offset() + FIELD_WIDTH];
        let sample = DirtRally2.decode(Some(truncated));
        assert_eq!(sample.run_time_s, 5.5);
        assert_eq!(sample.last_run_time_s, 0.);
    }

    #[test]
    fn test_identify_known_car_and_track() {
        let packet = encode_packet(&[
            (DirtRally2Field::MaxRpm, 890.12),
            (DirtRally2Field::IdleRpm, 167.55),
            (DirtRally2Field::MaxGears, 5.),
            (DirtRally2Field::TrackLength, 8251.67),
            (DirtRally2Field::PosZ, 2000.),
        ]);
        let identity = DirtRally2.identify(Some(&packet));
        assert_eq!(identity.car_name, "Mini Cooper S");
        assert_eq!(identity.car_class, "H1 (FWD)");
        assert_eq!(identity.track_name, "Argentina, Valle de los puentes");
    }

    #[test]
    fn test_identify_unknown_signatures() {
        let packet = encode_packet(&[
            (DirtRally2Field::MaxRpm, 1.),
            (DirtRally2Field::TrackLength, 42.),
        ]);
        let identity = DirtRally2.identify(Some(&packet));
        assert_eq!(identity.car_name, UNKNOWN);
        assert_eq!(identity.car_class, UNKNOWN);
        assert_eq!(identity.track_name, UNKNOWN);
        assert_eq!(DirtRally2.identify(None).track_name, UNKNOWN);
    }

    #[test]
    fn test_signature_tables_have_no_duplicates() {
        for (i, car) in CARS.iter().enumerate() {
            assert!(
                !CARS[i + 1..].iter().any(|other| other.max_rpm == car.max_rpm
                    && other.idle_rpm == car.idle_rpm
                    && other.gear_count == car.gear_count),
                "duplicate car signature for {}",
                car.name
            );
        }
        assert_eq!(DirtRally2.known_cars().len(), CARS.len());
        assert_eq!(DirtRally2.known_tracks().len(), TRACKS.len());
    }
}
