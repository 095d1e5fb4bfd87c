//! Static lookup tables: track, driver and team names, per-track sector
//! baselines, strategy descriptors and pit-stop ceilings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

use crate::error::{Error, Result};
use crate::types::{DriverId, OvertakingDifficulty, SectorTimes, TeamId, TrackId, TrackType};

/// Descriptors the strategy classifier needs for a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptors {
    pub avg_stint_length: f64,
    pub track_speed: f64,
    pub track_type: TrackType,
    pub overtaking_difficulty: OvertakingDifficulty,
    pub laps: u32,
}

impl TrackDescriptors {
    /// Generic descriptors used for tracks with no entry.
    pub const DEFAULT: TrackDescriptors = TrackDescriptors {
        avg_stint_length: 20.0,
        track_speed: 250.0,
        track_type: TrackType::MediumSpeed,
        overtaking_difficulty: OvertakingDifficulty::Medium,
        laps: 60,
    };
}

pub const DEFAULT_MAX_PIT_STOPS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub name: String,
    pub baseline: SectorTimes,
    #[serde(default)]
    pub descriptors: Option<TrackDescriptors>,
    #[serde(default)]
    pub max_pit_stops: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTables {
    pub tracks: BTreeMap<TrackId, TrackInfo>,
    pub drivers: BTreeMap<DriverId, String>,
    pub teams: BTreeMap<TeamId, String>,
}

impl StaticTables {
    /// Reads a JSON table file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let tables: StaticTables = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("invalid tables JSON {}: {e}", path.display())))?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(Error::Config("track table is empty".into()));
        }
        for (id, info) in &self.tracks {
            if info.baseline.0.iter().any(|b| !b.is_finite() || *b <= 0.0) {
                return Err(Error::Config(format!(
                    "track {id} ({}) has a non-positive baseline {:?}",
                    info.name, info.baseline.0
                )));
            }
        }
        Ok(())
    }

    pub fn track(&self, track: TrackId) -> Result<&TrackInfo> {
        self.tracks.get(&track).ok_or(Error::UnknownTrack(track))
    }

    pub fn baseline(&self, track: TrackId) -> Result<SectorTimes> {
        self.track(track).map(|t| t.baseline)
    }

    pub fn driver_name(&self, driver: DriverId) -> Result<&str> {
        self.drivers
            .get(&driver)
            .map(String::as_str)
            .ok_or(Error::UnknownDriver(driver))
    }

    pub fn team_name(&self, team: TeamId) -> Result<&str> {
        self.teams
            .get(&team)
            .map(String::as_str)
            .ok_or(Error::UnknownTeam(team))
    }

    /// Never fails: unmapped tracks get [`TrackDescriptors::DEFAULT`].
    pub fn descriptors_or_default(&self, track: TrackId) -> TrackDescriptors {
        self.tracks
            .get(&track)
            .and_then(|t| t.descriptors)
            .unwrap_or(TrackDescriptors::DEFAULT)
    }

    pub fn max_pit_stops_or_default(&self, track: TrackId) -> u32 {
        self.tracks
            .get(&track)
            .and_then(|t| t.max_pit_stops)
            .unwrap_or(DEFAULT_MAX_PIT_STOPS)
    }

    /// The current-season tables.
    pub fn builtin() -> Self {
        use OvertakingDifficulty::{High, Low, Medium};
        use TrackType::{HighSpeed, MediumSpeed};

        // (id, name, baseline, avg stint, speed, type, overtaking, laps, max stops)
        #[rustfmt::skip]
        let tracks: [(TrackId, &str, [f64; 3], f64, f64, TrackType, OvertakingDifficulty, u32, u32); 24] = [
            (1, "Abu Dhabi", [16.958, 35.776, 29.861], 21.90, 274.53, HighSpeed, Medium, 57, 2),
            (2, "Australia", [25.961, 16.997, 32.128], 20.52, 259.99, HighSpeed, Medium, 58, 2),
            (3, "Austria", [16.254, 28.791, 19.269], 20.52, 259.99, HighSpeed, Medium, 71, 2),
            (4, "Azerbaijan", [35.702, 40.813, 24.850], 22.37, 259.07, HighSpeed, Medium, 51, 1),
            (5, "Bahrain", [28.784, 38.574, 22.483], 15.08, 263.30, HighSpeed, Low, 66, 2),
            (6, "Belgium", [31.998, 50.837, 30.324], 20.52, 259.99, HighSpeed, Medium, 44, 2),
            (7, "Brazil", [17.825, 34.909, 16.165], 20.52, 259.99, HighSpeed, Medium, 71, 2),
            (8, "Canada", [20.057, 22.714, 28.971], 20.52, 259.99, HighSpeed, Medium, 70, 3),
            (9, "China", [23.996, 27.227, 39.418], 20.52, 259.99, HighSpeed, Medium, 56, 3),
            (10, "Great Britain", [28.016, 34.508, 23.295], 20.52, 259.99, HighSpeed, Medium, 52, 3),
            (11, "Hungary", [27.606, 26.382, 21.239], 20.52, 259.99, HighSpeed, Medium, 70, 2),
            (12, "Imola", [23.408, 25.922, 25.416], 20.52, 259.99, HighSpeed, Medium, 63, 1),
            (13, "Italy", [26.492, 26.579, 26.256], 20.52, 259.99, HighSpeed, Medium, 53, 2),
            (14, "Japan", [30.387, 39.355, 17.241], 20.52, 259.99, HighSpeed, Medium, 53, 3),
            (15, "Las Vegas", [25.736, 30.916, 35.660], 18.55, 239.07, HighSpeed, Medium, 50, 2),
            (16, "Mexico", [27.037, 29.296, 19.613], 22.10, 280.69, HighSpeed, Medium, 71, 2),
            (17, "Miami", [28.867, 33.499, 24.875], 23.49, 235.59, HighSpeed, Medium, 57, 2),
            (18, "Monaco", [18.386, 33.174, 18.710], 26.58, 219.80, MediumSpeed, High, 78, 1),
            (19, "Netherlands", [23.824, 24.819, 21.030], 20.52, 259.99, HighSpeed, Medium, 72, 2),
            (20, "Qatar", [29.598, 27.353, 23.569], 11.79, 261.35, HighSpeed, Low, 57, 2),
            (21, "Saudi Arabia", [31.507, 27.756, 28.031], 22.16, 280.60, HighSpeed, Medium, 50, 1),
            (22, "Singapore", [26.599, 37.630, 25.296], 27.37, 271.43, HighSpeed, High, 61, 1),
            (23, "Spain", [21.383, 28.402, 21.598], 20.52, 259.99, HighSpeed, Medium, 66, 2),
            (24, "United States", [24.992, 36.887, 30.451], 17.71, 213.35, MediumSpeed, Low, 56, 1),
        ];

        let drivers = [
            "ALB", "ALO", "ANT", "BOR", "DOO", "GAS", "HAD", "HAM", "HUL", "LAW", "LEC", "NOR",
            "OCO", "PIA", "RUS", "SAI", "STR", "TSU", "VER", "BEA", "BOT", "LAT", "MAG", "MSC",
            "PER", "RIC", "ZHO", "DEV", "SAR", "VET", "COL",
        ];
        let teams = [
            "WILLIAMS", "ASTON MARTIN", "MERCEDES", "KICK", "ALPINE", "RACING BULL", "FERRARI",
            "MCLAREN", "HAAS", "RED BULL",
        ];

        StaticTables {
            tracks: tracks
                .into_iter()
                .map(|(id, name, b, stint, speed, ty, ovt, laps, stops)| {
                    let info = TrackInfo {
                        name: name.to_string(),
                        baseline: SectorTimes(b),
                        descriptors: Some(TrackDescriptors {
                            avg_stint_length: stint,
                            track_speed: speed,
                            track_type: ty,
                            overtaking_difficulty: ovt,
                            laps,
                        }),
                        max_pit_stops: Some(stops),
                    };
                    (id, info)
                })
                .collect(),
            drivers: (1..).zip(drivers.iter().map(|d| d.to_string())).collect(),
            teams: (1..).zip(teams.iter().map(|t| t.to_string())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables() {
        let tables = StaticTables::builtin();
        tables.validate().expect("builtin tables are valid");
        assert_eq!(tables.tracks.len(), 24);
        assert_eq!(tables.drivers.len(), 31);
        assert_eq!(tables.teams.len(), 10);
        assert_eq!(tables.track(18).unwrap().name, "Monaco");
        assert_eq!(tables.baseline(18).unwrap(), SectorTimes::new(18.386, 33.174, 18.710));
        assert_eq!(tables.driver_name(19).unwrap(), "VER");
        assert_eq!(tables.team_name(7).unwrap(), "FERRARI");
        assert_eq!(tables.max_pit_stops_or_default(8), 3);
    }

    #[test]
    fn test_unknown_track_defaults() {
        let tables = StaticTables::builtin();
        assert!(matches!(tables.baseline(99), Err(Error::UnknownTrack(99))));
        assert_eq!(tables.descriptors_or_default(99), TrackDescriptors::DEFAULT);
        assert_eq!(tables.max_pit_stops_or_default(99), DEFAULT_MAX_PIT_STOPS);
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tables.json");
        let mut tables = StaticTables::builtin();
        tables.tracks.retain(|id, _| *id == 18);
        fs::write(&path, serde_json::to_string(&tables).unwrap()).unwrap();

        let loaded = StaticTables::load(&path).expect("tables load");
        assert_eq!(loaded, tables);
    }

    #[test]
    fn test_rejects_bad_baseline() {
        let mut tables = StaticTables::builtin();
        if let Some(t) = tables.tracks.get_mut(&3) {
            t.baseline = SectorTimes::new(16.2, 0.0, 19.2);
        }
        assert!(matches!(tables.validate(), Err(Error::Config(_))));
    }
}
