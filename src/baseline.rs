//! Baseline-relative sector deltas.

use crate::error::Result;
use crate::tables::StaticTables;
use crate::types::{SectorTimes, SessionRecord};

/// A session record augmented with its track baseline and the
/// raw-minus-baseline delta for every observed sector.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record: SessionRecord,
    pub baseline: SectorTimes,
    pub deltas: [Option<f64>; 3],
}

impl NormalizedRecord {
    /// baseline + delta, i.e. the raw sector time again.
    pub fn reconstructed(&self) -> [Option<f64>; 3] {
        let mut out = [None; 3];
        for (i, d) in self.deltas.iter().enumerate() {
            out[i] = d.map(|d| self.baseline.0[i] + d);
        }
        out
    }
}

/// Fails with `UnknownTrack` when the record's track has no baseline.
///
/// For raw times within `[b/2, 2b]` of the baseline the subtraction is exact
/// (Sterbenz), so `baseline + delta` gives back the raw time bit for bit.
pub fn normalize(record: SessionRecord, tables: &StaticTables) -> Result<NormalizedRecord> {
    let baseline = tables.baseline(record.track)?;
    let raw = record.raw_sectors();
    let mut deltas = [None; 3];
    for i in 0..3 {
        deltas[i] = raw[i].map(|t| t - baseline.0[i]);
    }
    Ok(NormalizedRecord {
        record,
        baseline,
        deltas,
    })
}

/// Inverse of [`normalize`] for predicted deltas.
pub fn to_absolute(baseline: SectorTimes, deltas: [f64; 3]) -> SectorTimes {
    baseline + SectorTimes(deltas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn record(track: u32, sectors: [Option<f64>; 3]) -> SessionRecord {
        SessionRecord {
            year: 2024,
            race_no: 8,
            driver: 11,
            team: 7,
            track,
            sector1_time: sectors[0],
            sector2_time: sectors[1],
            sector3_time: sectors[2],
            telemetry: BTreeMap::new(),
        }
    }

    #[test]
    fn test_monaco_deltas() {
        let tables = StaticTables::builtin();
        let n = normalize(record(18, [Some(18.5), Some(33.0), Some(18.9)]), &tables).unwrap();
        let expected = [0.114, -0.174, 0.190];
        for i in 0..3 {
            assert!((n.deltas[i].unwrap() - expected[i]).abs() < 1e-9);
        }

        let secs = to_absolute(n.baseline, [0.05, -0.10, 0.08]);
        let want = [18.436, 33.074, 18.790];
        for i in 0..3 {
            assert!((secs.0[i] - want[i]).abs() < 1e-9, "sector {} = {}", i + 1, secs.0[i]);
        }
        assert!((secs.lap_time() - 70.300).abs() < 1e-9);
    }

    #[test]
    fn test_missing_sector_stays_missing() {
        let tables = StaticTables::builtin();
        let n = normalize(record(5, [Some(29.0), None, Some(22.0)]), &tables).unwrap();
        assert!(n.deltas[0].is_some());
        assert_eq!(n.deltas[1], None);
        assert_eq!(n.reconstructed()[1], None);
    }

    #[test]
    fn test_unknown_track() {
        let tables = StaticTables::builtin();
        let err = normalize(record(99, [Some(20.0); 3]), &tables).unwrap_err();
        assert!(matches!(err, Error::UnknownTrack(99)));
    }

    proptest! {
        #[test]
        fn prop_baseline_plus_delta_is_raw(track in 1u32..=24, f in proptest::array::uniform3(0.5f64..2.0)) {
            let tables = StaticTables::builtin();
            let b = tables.baseline(track).unwrap();
            let raw = [b.0[0] * f[0], b.0[1] * f[1], b.0[2] * f[2]];
            let n = normalize(record(track, raw.map(Some)), &tables).unwrap();
            prop_assert_eq!(n.reconstructed(), raw.map(Some));
        }
    }
}
