//! Training corpus and team-year aggregate features.
//!
//! The corpus is the union of historical and current-season session
//! records, each normalized against its track baseline. Team averages are
//! computed once per build over that union; records whose (year, team)
//! group has no observation for a sector get the corpus-wide mean of the
//! team-average column instead.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::baseline::{normalize, NormalizedRecord};
use crate::error::{Error, Result};
use crate::tables::StaticTables;
use crate::types::{DriverId, SessionRecord, TeamId, TelemetryChannel};

/// Column order of the qualifying feature matrix.
pub const QUALIFYING_FEATURES: [&str; 7] = [
    "Year",
    "Driver",
    "Team",
    "Track",
    "TeamAvg_S1",
    "TeamAvg_S2",
    "TeamAvg_S3",
];

pub type FeatureRow = [f64; 7];

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Per-(year, team) mean raw sector times plus the frozen imputation values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamAverages {
    groups: BTreeMap<(i32, TeamId), [Option<f64>; 3]>,
    fallback: [f64; 3],
}

impl TeamAverages {
    pub fn compute(records: &[SessionRecord]) -> Result<Self> {
        let mut acc: BTreeMap<(i32, TeamId), [(f64, usize); 3]> = BTreeMap::new();
        for r in records {
            let slot = acc.entry((r.year, r.team)).or_insert([(0.0, 0); 3]);
            for (i, t) in r.raw_sectors().iter().enumerate() {
                if let Some(t) = t {
                    slot[i].0 += t;
                    slot[i].1 += 1;
                }
            }
        }
        let groups: BTreeMap<_, _> = acc
            .into_iter()
            .map(|(k, s)| (k, s.map(|(sum, n)| (n > 0).then(|| sum / n as f64))))
            .collect();

        // the fallback is the mean of the joined column, so groups weigh by row count
        let mut fallback = [0.0; 3];
        for (i, slot) in fallback.iter_mut().enumerate() {
            *slot = mean(records.iter().filter_map(|r| groups[&(r.year, r.team)][i])).ok_or_else(|| {
                Error::InsufficientData {
                    what: format!("sector {} times", i + 1),
                    observed: 0,
                    required: 1,
                }
            })?;
        }
        Ok(Self { groups, fallback })
    }

    pub fn group_mean(&self, year: i32, team: TeamId) -> [Option<f64>; 3] {
        self.groups.get(&(year, team)).copied().unwrap_or([None; 3])
    }

    pub fn fallback(&self) -> [f64; 3] {
        self.fallback
    }

    /// Group means with missing entries imputed.
    pub fn features_for(&self, year: i32, team: TeamId) -> [f64; 3] {
        let g = self.group_mean(year, team);
        [0, 1, 2].map(|i| g[i].unwrap_or(self.fallback[i]))
    }

    pub fn feature_row(&self, year: i32, driver: DriverId, team: TeamId, track: u32) -> FeatureRow {
        let [a1, a2, a3] = self.features_for(year, team);
        [year as f64, driver as f64, team as f64, track as f64, a1, a2, a3]
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.fallback.iter().all(|v| v.is_finite())
    }
}

/// Normalized historical and current-season records with their aggregates.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<NormalizedRecord>,
    current_start: usize,
    team_averages: TeamAverages,
    delta_fallback: [f64; 3],
}

impl Corpus {
    /// Validates every record against the tables, normalizes it and
    /// computes the team-year aggregates.
    pub fn build(historical: Vec<SessionRecord>, current: Vec<SessionRecord>, tables: &StaticTables) -> Result<Self> {
        if current.is_empty() {
            return Err(Error::InsufficientData {
                what: "current-season records".into(),
                observed: 0,
                required: 1,
            });
        }
        let current_start = historical.len();
        let raw: Vec<SessionRecord> = historical.into_iter().chain(current).collect();
        for r in &raw {
            tables.driver_name(r.driver)?;
            tables.team_name(r.team)?;
        }
        let team_averages = TeamAverages::compute(&raw)?;
        let records = raw
            .into_iter()
            .map(|r| normalize(r, tables))
            .collect::<Result<Vec<_>>>()?;

        let mut delta_fallback = [0.0; 3];
        for (i, slot) in delta_fallback.iter_mut().enumerate() {
            // compute() already failed if a sector was never observed
            *slot = mean(records.iter().filter_map(|r| r.deltas[i])).unwrap_or_default();
        }

        tracing::info!(
            records = records.len(),
            current = records.len() - current_start,
            groups = team_averages.groups.len(),
            "corpus built"
        );
        Ok(Self {
            records,
            current_start,
            team_averages,
            delta_fallback,
        })
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn current(&self) -> &[NormalizedRecord] {
        &self.records[self.current_start..]
    }

    pub fn team_averages(&self) -> &TeamAverages {
        &self.team_averages
    }

    pub fn delta_fallback(&self) -> [f64; 3] {
        self.delta_fallback
    }

    pub fn current_year(&self) -> i32 {
        self.current().iter().map(|r| r.record.year).max().unwrap_or_default()
    }

    pub fn session_keys(&self) -> Vec<(i32, u32)> {
        self.records.iter().map(|r| r.record.session_key()).collect()
    }

    pub fn feature_matrix(&self) -> Array2<f64> {
        let rows: Vec<FeatureRow> = self
            .records
            .iter()
            .map(|n| {
                let r = &n.record;
                self.team_averages.feature_row(r.year, r.driver, r.team, r.track)
            })
            .collect();
        Array2::from_shape_fn((rows.len(), QUALIFYING_FEATURES.len()), |(i, j)| rows[i][j])
    }

    /// Sector deltas with missing entries imputed by the corpus mean delta.
    pub fn target_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.records.len(), 3), |(i, j)| {
            self.records[i].deltas[j].unwrap_or(self.delta_fallback[j])
        })
    }

    /// Latest current-season record of every driver, in the order those
    /// latest records appear.
    pub fn active_drivers(&self) -> Vec<&NormalizedRecord> {
        let current = self.current();
        let mut last: HashMap<DriverId, usize> = HashMap::new();
        for (i, r) in current.iter().enumerate() {
            last.insert(r.record.driver, i);
        }
        let mut idx: Vec<usize> = last.into_values().collect();
        idx.sort_unstable();
        idx.into_iter().map(|i| &current[i]).collect()
    }

    /// Most recent observed current-season value of `channel` for `driver`.
    pub fn latest_telemetry(&self, driver: DriverId, channel: TelemetryChannel) -> Option<f64> {
        self.current()
            .iter()
            .rev()
            .filter(|r| r.record.driver == driver)
            .find_map(|r| r.record.telemetry.get(&channel).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(year: i32, race_no: u32, driver: u32, team: u32, sectors: [Option<f64>; 3]) -> SessionRecord {
        SessionRecord {
            year,
            race_no,
            driver,
            team,
            track: 5,
            sector1_time: sectors[0],
            sector2_time: sectors[1],
            sector3_time: sectors[2],
            telemetry: BTreeMap::new(),
        }
    }

    #[test]
    fn test_team_year_means() {
        let records = vec![
            rec(2024, 1, 1, 1, [Some(29.0), Some(39.0), Some(23.0)]),
            rec(2024, 2, 2, 1, [Some(31.0), Some(41.0), None]),
            rec(2024, 1, 3, 2, [Some(28.0), None, None]),
        ];
        let avg = TeamAverages::compute(&records).unwrap();
        assert_eq!(avg.group_mean(2024, 1), [Some(30.0), Some(40.0), Some(23.0)]);
        assert_eq!(avg.group_mean(2024, 2), [Some(28.0), None, None]);

        // sector 2: rows of team 1 carry 40.0 twice, team 2 has none
        assert_eq!(avg.fallback()[1], 40.0);
        assert_eq!(avg.features_for(2024, 2), [28.0, 40.0, 23.0]);
        // unseen group takes every fallback
        assert_eq!(avg.features_for(2023, 9), avg.fallback());
    }

    #[test]
    fn test_sector_never_observed() {
        let records = vec![rec(2024, 1, 1, 1, [Some(29.0), Some(39.0), None])];
        assert!(matches!(
            TeamAverages::compute(&records),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_corpus_build_and_active_drivers() {
        let tables = StaticTables::builtin();
        let hist = vec![rec(2024, 1, 1, 1, [Some(29.0), Some(39.0), Some(23.0)])];
        let mut c1 = rec(2025, 1, 2, 3, [Some(28.5), Some(38.0), Some(22.0)]);
        c1.telemetry.insert(TelemetryChannel::SpeedST, 301.0);
        let c2 = rec(2025, 1, 1, 1, [Some(29.5), None, Some(22.5)]);
        let c3 = rec(2025, 2, 2, 3, [Some(28.0), Some(38.5), Some(22.1)]);
        let corpus = Corpus::build(hist, vec![c1, c2, c3], &tables).unwrap();

        assert_eq!(corpus.records().len(), 4);
        assert_eq!(corpus.current().len(), 3);
        assert_eq!(corpus.current_year(), 2025);

        let active: Vec<u32> = corpus.active_drivers().iter().map(|r| r.record.driver).collect();
        assert_eq!(active, vec![1, 2]);

        // driver 2's latest record has no SpeedST, the one before does
        assert_eq!(corpus.latest_telemetry(2, TelemetryChannel::SpeedST), Some(301.0));
        assert_eq!(corpus.latest_telemetry(1, TelemetryChannel::SpeedST), None);

        let x = corpus.feature_matrix();
        assert_eq!(x.dim(), (4, QUALIFYING_FEATURES.len()));
        let y = corpus.target_matrix();
        let fill = corpus.delta_fallback()[1];
        assert_eq!(y[[2, 1]], fill);
    }

    #[test]
    fn test_corpus_rejects_unknown_ids() {
        let tables = StaticTables::builtin();
        let mut bad_track = rec(2025, 1, 1, 1, [Some(29.0); 3]);
        bad_track.track = 99;
        assert!(matches!(
            Corpus::build(vec![], vec![bad_track], &tables),
            Err(Error::UnknownTrack(99))
        ));
        let bad_driver = rec(2025, 1, 77, 1, [Some(29.0); 3]);
        assert!(matches!(
            Corpus::build(vec![], vec![bad_driver], &tables),
            Err(Error::UnknownDriver(77))
        ));
        assert!(matches!(
            Corpus::build(vec![], vec![], &tables),
            Err(Error::InsufficientData { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_imputed_value_is_corpus_mean(
            rows in proptest::collection::vec((2023i32..2026, 1u32..4, proptest::option::of(20.0f64..40.0)), 1..30)
        ) {
            let records: Vec<SessionRecord> = rows
                .iter()
                .enumerate()
                .map(|(i, (year, team, s1))| rec(*year, 1, (i % 20) as u32 + 1, *team, [*s1, Some(30.0), Some(20.0)]))
                .collect();
            prop_assume!(records.iter().any(|r| r.sector1_time.is_some()));

            let avg = TeamAverages::compute(&records).unwrap();
            let again = TeamAverages::compute(&records).unwrap();
            prop_assert_eq!(&avg, &again);

            let joined: Vec<f64> = records.iter().filter_map(|r| avg.group_mean(r.year, r.team)[0]).collect();
            let expected = joined.iter().sum::<f64>() / joined.len() as f64;
            for r in &records {
                if avg.group_mean(r.year, r.team)[0].is_none() {
                    prop_assert_eq!(avg.features_for(r.year, r.team)[0], expected);
                }
            }
        }
    }
}
