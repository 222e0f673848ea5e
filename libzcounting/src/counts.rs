use fxhash::FxHashMap;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use super::error::CountsError;
use super::leg::{Leg, Region, RegionPair};
use super::lumisection::{CategoryCounts, LumiSection};

/// One row of a per-run detector count file, exactly as stored on disk
#[derive(Debug, Clone, Deserialize)]
struct ProbeRow {
    ls: u32,
    category: String,
    pass: u8,
    mass: f64,
    pt_tag: f64,
    pt_probe: f64,
    eta_tag: f64,
    eta_probe: f64,
    npv: f64,
}

/// A single tag-and-probe pair measured for one leg
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRecord {
    pub leg: Leg,
    pub pass: bool,
    pub mass: f64,
    pub pt_tag: f64,
    pub pt_probe: f64,
    pub eta_tag: f64,
    pub eta_probe: f64,
    pub npv: f64,
}

impl ProbeRecord {
    pub fn probe_region(&self) -> Region {
        Region::from_eta(self.eta_probe)
    }

    pub fn region_pair(&self) -> RegionPair {
        RegionPair::from_regions(Region::from_eta(self.eta_tag), self.probe_region())
    }
}

impl TryFrom<ProbeRow> for ProbeRecord {
    type Error = CountsError;
    fn try_from(row: ProbeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            leg: Leg::from_str(&row.category)?,
            pass: row.pass > 0,
            mass: row.mass,
            pt_tag: row.pt_tag,
            pt_probe: row.pt_probe,
            eta_tag: row.eta_tag,
            eta_probe: row.eta_probe,
            npv: row.npv,
        })
    }
}

/// All tag-and-probe records of a run, indexed by lumisection.
///
/// This is the raw detector input of the analysis, one file per run.
#[derive(Debug, Clone, Default)]
pub struct RunCounts {
    run: u32,
    records: FxHashMap<u32, Vec<ProbeRecord>>,
}

impl RunCounts {
    /// Load the detector count file of a run.
    ///
    /// A missing file is reported as `CountsError::MissingInput`, which callers treat as
    /// "skip this run".
    pub fn load(path: &Path, run: u32) -> Result<Self, CountsError> {
        if !path.exists() {
            return Err(CountsError::MissingInput(run, path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut counts = Self {
            run,
            records: FxHashMap::default(),
        };
        for row in reader.deserialize::<ProbeRow>() {
            let row = row?;
            let ls = row.ls;
            counts
                .records
                .entry(ls)
                .or_default()
                .push(ProbeRecord::try_from(row)?);
        }
        Ok(counts)
    }

    /// Build counts directly from records, mostly useful for testing
    pub fn from_records(run: u32, records: Vec<(u32, ProbeRecord)>) -> Self {
        let mut counts = Self {
            run,
            records: FxHashMap::default(),
        };
        for (ls, record) in records {
            counts.records.entry(ls).or_default().push(record);
        }
        counts
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    /// The records of a lumisection; empty if the lumisection saw no candidates
    pub fn records(&self, ls: u32) -> &[ProbeRecord] {
        self.records.get(&ls).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Raw candidate counts per category for a lumisection
    pub fn category_counts(&self, ls: u32) -> CategoryCounts {
        let mut counts = CategoryCounts::default();
        for record in self.records(ls) {
            match record.leg {
                Leg::Trigger => counts.hlt += 1,
                Leg::Selection => counts.sel += 1,
                Leg::Global => counts.glo += 1,
                Leg::Standalone => counts.sta += 1,
            }
        }
        counts
    }

    /// Attach the raw counts to each lumisection of this run
    pub fn attach(&self, sections: Vec<LumiSection>) -> Vec<LumiSection> {
        sections
            .into_iter()
            .map(|s| {
                let counts = self.category_counts(s.ls);
                s.with_counts(counts)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const COUNTS: &str = "ls,category,pass,mass,pt_tag,pt_probe,eta_tag,eta_probe,npv
1,HLT,1,91.2,40.0,35.0,0.1,0.5,30
1,HLT,0,90.1,40.0,35.0,0.1,1.5,31
1,Sel,1,89.0,45.0,30.0,1.2,-1.3,29
2,Glo,0,92.0,45.0,30.0,0.2,-0.2,28
2,Sta,1,91.0,45.0,30.0,0.2,-2.2,28
";

    #[test]
    fn test_load_and_count() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(COUNTS.as_bytes()).unwrap();
        let counts = RunCounts::load(file.path(), 7).unwrap();
        assert_eq!(counts.run(), 7);
        assert_eq!(counts.records(1).len(), 3);
        assert_eq!(counts.records(3).len(), 0);

        let ls1 = counts.category_counts(1);
        assert_eq!((ls1.hlt, ls1.sel, ls1.glo, ls1.sta), (2, 1, 0, 0));
        assert_eq!(ls1.z_candidates(), 3);
        let ls2 = counts.category_counts(2);
        assert_eq!(ls2.z_candidates(), 1);
    }

    #[test]
    fn test_attached_counts_flag_empty_lumisections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(COUNTS.as_bytes()).unwrap();
        let counts = RunCounts::load(file.path(), 7).unwrap();
        let sections: Vec<LumiSection> = (1..=3)
            .map(|ls| LumiSection {
                run: 7,
                fill: 1,
                ls,
                timestamp: 0,
                delivered: 1.0,
                recorded: 1.0,
                avg_pileup: 20.0,
                counts: CategoryCounts::default(),
            })
            .collect();
        let sections = counts.attach(sections);
        assert_eq!(sections[0].counts.z_candidates(), 3);
        assert_eq!(sections[1].counts.sta, 1);
        assert_eq!(crate::lumisection::zero_yield(&sections), vec![3]);
    }

    #[test]
    fn test_region_pairs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(COUNTS.as_bytes()).unwrap();
        let counts = RunCounts::load(file.path(), 7).unwrap();
        let pairs: Vec<RegionPair> = counts.records(1).iter().map(|r| r.region_pair()).collect();
        assert_eq!(pairs, vec![RegionPair::BB, RegionPair::BE, RegionPair::EE]);
    }

    #[test]
    fn test_missing_file_is_missing_input() {
        match RunCounts::load(Path::new("/no/such/ZCounting_Muon_1.csv"), 1) {
            Err(CountsError::MissingInput(run, _)) => assert_eq!(run, 1),
            _ => panic!(),
        }
    }

    #[test]
    fn test_bad_category() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"ls,category,pass,mass,pt_tag,pt_probe,eta_tag,eta_probe,npv\n1,Trk,1,91,40,40,0,0,20\n")
            .unwrap();
        assert!(matches!(
            RunCounts::load(file.path(), 1),
            Err(CountsError::BadCategory(_))
        ));
    }
}
