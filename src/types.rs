use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};

pub type TrackId = u32;
pub type DriverId = u32;
pub type TeamId = u32;

/// Three per-sector times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectorTimes(pub [f64; 3]);

impl SectorTimes {
    pub fn new(s1: f64, s2: f64, s3: f64) -> Self {
        Self([s1, s2, s3])
    }

    pub fn lap_time(&self) -> f64 {
        self.0.iter().sum()
    }
}

impl Add for SectorTimes {
    type Output = SectorTimes;

    fn add(self, rhs: SectorTimes) -> SectorTimes {
        SectorTimes([self.0[0] + rhs.0[0], self.0[1] + rhs.0[1], self.0[2] + rhs.0[2]])
    }
}

impl Sub for SectorTimes {
    type Output = SectorTimes;

    fn sub(self, rhs: SectorTimes) -> SectorTimes {
        SectorTimes([self.0[0] - rhs.0[0], self.0[1] - rhs.0[1], self.0[2] - rhs.0[2]])
    }
}

/// Optional per-sector telemetry channels recorded alongside sector times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TelemetryChannel {
    Sector1SpeedMin,
    Sector1SpeedMax,
    Sector1SpeedAvg,
    #[serde(rename = "Sector1RPMAvg")]
    Sector1RpmAvg,
    Sector1ThrottleAvg,
    Sector1BrakeAvg,
    Sector2SpeedMin,
    Sector2SpeedMax,
    Sector2SpeedAvg,
    #[serde(rename = "Sector2RPMAvg")]
    Sector2RpmAvg,
    Sector2ThrottleAvg,
    Sector2BrakeAvg,
    Sector3SpeedMin,
    Sector3SpeedMax,
    Sector3SpeedAvg,
    #[serde(rename = "Sector3RPMAvg")]
    Sector3RpmAvg,
    Sector3ThrottleAvg,
    Sector3BrakeAvg,
    SpeedI1,
    SpeedI2,
    SpeedFL,
    SpeedST,
}

impl TelemetryChannel {
    /// Output column order.
    pub const ALL: [TelemetryChannel; 22] = [
        TelemetryChannel::Sector1SpeedMin,
        TelemetryChannel::Sector1SpeedMax,
        TelemetryChannel::Sector1SpeedAvg,
        TelemetryChannel::Sector1RpmAvg,
        TelemetryChannel::Sector1ThrottleAvg,
        TelemetryChannel::Sector1BrakeAvg,
        TelemetryChannel::Sector2SpeedMin,
        TelemetryChannel::Sector2SpeedMax,
        TelemetryChannel::Sector2SpeedAvg,
        TelemetryChannel::Sector2RpmAvg,
        TelemetryChannel::Sector2ThrottleAvg,
        TelemetryChannel::Sector2BrakeAvg,
        TelemetryChannel::Sector3SpeedMin,
        TelemetryChannel::Sector3SpeedMax,
        TelemetryChannel::Sector3SpeedAvg,
        TelemetryChannel::Sector3RpmAvg,
        TelemetryChannel::Sector3ThrottleAvg,
        TelemetryChannel::Sector3BrakeAvg,
        TelemetryChannel::SpeedI1,
        TelemetryChannel::SpeedI2,
        TelemetryChannel::SpeedFL,
        TelemetryChannel::SpeedST,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TelemetryChannel::Sector1SpeedMin => "Sector1SpeedMin",
            TelemetryChannel::Sector1SpeedMax => "Sector1SpeedMax",
            TelemetryChannel::Sector1SpeedAvg => "Sector1SpeedAvg",
            TelemetryChannel::Sector1RpmAvg => "Sector1RPMAvg",
            TelemetryChannel::Sector1ThrottleAvg => "Sector1ThrottleAvg",
            TelemetryChannel::Sector1BrakeAvg => "Sector1BrakeAvg",
            TelemetryChannel::Sector2SpeedMin => "Sector2SpeedMin",
            TelemetryChannel::Sector2SpeedMax => "Sector2SpeedMax",
            TelemetryChannel::Sector2SpeedAvg => "Sector2SpeedAvg",
            TelemetryChannel::Sector2RpmAvg => "Sector2RPMAvg",
            TelemetryChannel::Sector2ThrottleAvg => "Sector2ThrottleAvg",
            TelemetryChannel::Sector2BrakeAvg => "Sector2BrakeAvg",
            TelemetryChannel::Sector3SpeedMin => "Sector3SpeedMin",
            TelemetryChannel::Sector3SpeedMax => "Sector3SpeedMax",
            TelemetryChannel::Sector3SpeedAvg => "Sector3SpeedAvg",
            TelemetryChannel::Sector3RpmAvg => "Sector3RPMAvg",
            TelemetryChannel::Sector3ThrottleAvg => "Sector3ThrottleAvg",
            TelemetryChannel::Sector3BrakeAvg => "Sector3BrakeAvg",
            TelemetryChannel::SpeedI1 => "SpeedI1",
            TelemetryChannel::SpeedI2 => "SpeedI2",
            TelemetryChannel::SpeedFL => "SpeedFL",
            TelemetryChannel::SpeedST => "SpeedST",
        }
    }
}

impl fmt::Display for TelemetryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One qualifying observation for a (year, race, driver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRecord {
    pub year: i32,
    pub race_no: u32,
    pub driver: DriverId,
    pub team: TeamId,
    pub track: TrackId,
    #[serde(default)]
    pub sector1_time: Option<f64>,
    #[serde(default)]
    pub sector2_time: Option<f64>,
    #[serde(default)]
    pub sector3_time: Option<f64>,
    #[serde(default)]
    pub telemetry: BTreeMap<TelemetryChannel, f64>,
}

impl SessionRecord {
    pub fn raw_sectors(&self) -> [Option<f64>; 3] {
        [self.sector1_time, self.sector2_time, self.sector3_time]
    }

    /// Sessions are keyed by year then race number.
    pub fn session_key(&self) -> (i32, u32) {
        (self.year, self.race_no)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    HighSpeed,
    MediumSpeed,
    LowSpeed,
}

impl TrackType {
    /// Fixed model input code; every variant has one.
    pub fn code(self) -> u8 {
        match self {
            TrackType::HighSpeed => 0,
            TrackType::MediumSpeed => 1,
            TrackType::LowSpeed => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OvertakingDifficulty {
    Low,
    Medium,
    High,
}

impl OvertakingDifficulty {
    pub fn code(self) -> u8 {
        match self {
            OvertakingDifficulty::Low => 0,
            OvertakingDifficulty::Medium => 1,
            OvertakingDifficulty::High => 2,
        }
    }
}

/// One historical race result used to train the strategy classifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StrategyRecord {
    pub track: TrackId,
    pub start_position: u32,
    pub avg_stint_length: f64,
    pub temp_range: f64,
    pub air_temp: f64,
    pub track_temp: f64,
    pub is_wet: bool,
    pub track_speed: f64,
    pub track_type: TrackType,
    pub overtaking_difficulty: OvertakingDifficulty,
    pub num_pit_stops: u32,
    #[serde(default)]
    pub finish_position: Option<u32>,
    pub strategy: String,
}

/// One row of the qualifying prediction, ordered by `position`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifyingRow {
    pub position: usize,
    pub driver_name: String,
    pub team_name: String,
    pub sector1_time: f64,
    pub sector2_time: f64,
    pub sector3_time: f64,
    pub telemetry: BTreeMap<TelemetryChannel, Option<f64>>,
    pub lap_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub strategy: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyPrediction {
    pub best_strategy: String,
    pub best_strategy_confidence: f64,
    pub num_stops: usize,
    pub alternative_strategies: Vec<RankedCandidate>,
    pub prediction_timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_match_serde() {
        for channel in TelemetryChannel::ALL {
            let json = serde_json::to_string(&channel).expect("serialize channel");
            assert_eq!(json, format!("\"{}\"", channel.name()));
        }
    }

    #[test]
    fn test_session_record_from_json() {
        let json = r#"{
            "Year": 2024, "RaceNo": 8, "Driver": 11, "Team": 7, "Track": 18,
            "Sector1Time": 18.5, "Sector2Time": 33.0,
            "Telemetry": { "SpeedST": 290.5, "Sector1RPMAvg": 10950.0 }
        }"#;
        let rec: SessionRecord = serde_json::from_str(json).expect("parse record");
        assert_eq!(rec.session_key(), (2024, 8));
        assert_eq!(rec.raw_sectors(), [Some(18.5), Some(33.0), None]);
        assert_eq!(rec.telemetry.get(&TelemetryChannel::Sector1RpmAvg), Some(&10950.0));
    }

    #[test]
    fn test_sector_arithmetic() {
        let a = SectorTimes::new(18.386, 33.174, 18.710);
        let d = SectorTimes::new(0.05, -0.10, 0.08);
        let sum = a + d;
        assert!((sum.lap_time() - 70.300).abs() < 1e-9);
        let back = sum - d;
        for i in 0..3 {
            assert!((back.0[i] - a.0[i]).abs() < 1e-12);
        }
    }
}
