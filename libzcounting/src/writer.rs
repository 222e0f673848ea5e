use std::path::{Path, PathBuf};

use super::error::WriterError;
use super::record::AggregatedRecord;

const RUN_FILE_PREFIX: &str = "csvfile";
const SUMMARY_FILE_NAME: &str = "Mergedcsvfile.csv";

/// Writes the per-run output tables into a single directory
#[derive(Debug, Clone)]
pub struct RecordWriter {
    directory: PathBuf,
}

impl RecordWriter {
    /// Create the writer, creating the output directory if needed
    pub fn new(directory: &Path) -> Result<Self, WriterError> {
        std::fs::create_dir_all(directory)?;
        Ok(Self {
            directory: directory.to_path_buf(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn run_file_path(&self, run: u32) -> PathBuf {
        self.directory.join(format!("{RUN_FILE_PREFIX}{run}.csv"))
    }

    pub fn summary_file_path(&self) -> PathBuf {
        self.directory.join(SUMMARY_FILE_NAME)
    }

    /// Write the records of a run to `csvfile{run}.csv`, replacing any previous file.
    ///
    /// Returns None if there was nothing to write.
    pub fn write_run(
        &self,
        run: u32,
        records: &[AggregatedRecord],
    ) -> Result<Option<PathBuf>, WriterError> {
        if records.is_empty() {
            log::info!("No records for run {run}; no output file written");
            return Ok(None);
        }
        let path = self.run_file_path(run);
        write_records(&path, records)?;
        log::info!("Wrote {} records to {}", records.len(), path.to_string_lossy());
        Ok(Some(path))
    }

    /// Concatenate every per-run file of the directory, in run order, into the summary file
    pub fn write_summary(&self) -> Result<PathBuf, WriterError> {
        let mut run_files = Vec::new();
        for entry in std::fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if let Some(run) = run_of_file(&path) {
                run_files.push((run, path));
            }
        }
        run_files.sort();

        let mut records = Vec::new();
        for (_, path) in run_files.iter() {
            records.append(&mut read_records(path)?);
        }
        let path = self.summary_file_path();
        write_records(&path, &records)?;
        log::info!(
            "Merged {} run files ({} records) into {}",
            run_files.len(),
            records.len(),
            path.to_string_lossy()
        );
        Ok(path)
    }
}

/// Run number of a `csvfile{run}.csv` path
fn run_of_file(path: &Path) -> Option<u32> {
    if path.extension()? != "csv" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(RUN_FILE_PREFIX)?
        .parse::<u32>()
        .ok()
}

fn write_records(path: &Path, records: &[AggregatedRecord]) -> Result<(), WriterError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read back an output table
pub fn read_records(path: &Path) -> Result<Vec<AggregatedRecord>, WriterError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize::<AggregatedRecord>() {
        records.push(record?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::WindowMeta;
    use crate::extractor::{combine, AsymmetricValue, EfficiencyResult, EfficiencySet};
    use crate::propagation::{propagate, Calibrations, CorrelationCalibration, YieldInputs};

    fn record(first_run: u32, last_run: u32, measurement: usize) -> AggregatedRecord {
        let meta = WindowMeta {
            first_run,
            last_run,
            fill: 8000,
            measurement,
            n_lumisections: 10,
            time_begin: 1_660_000_000,
            time_end: 1_660_000_207,
            time_window: 233.0,
            lumi_recorded: 20.5,
            lumi_delivered: 21.0,
            pileup: 42.0,
        };
        let set = EfficiencySet::uniform(EfficiencyResult {
            efficiency: AsymmetricValue::new(0.95, 0.01, 0.01),
            chi2: 1.2,
            signal_yield: 500.0,
        });
        let calibrations = Calibrations {
            correlation: CorrelationCalibration::uniform(),
            lumi_uncertainty: 0.013,
            ..Default::default()
        };
        let result = propagate(
            &YieldInputs {
                efficiency: combine(&set),
                z_reco: [100, 150, 120],
                avg_pileup: 42.0,
                c_io: 1.0,
                luminosity: 20.5,
            },
            &calibrations,
        )
        .unwrap();
        AggregatedRecord::new(&meta, &set, &result)
    }

    #[test]
    fn test_record_columns() {
        let merged = record(100, 102, 0);
        assert_eq!(merged.run, "100-102");
        assert_eq!(merged.eff_hlt_e, 0.95);
        assert_eq!(merged.chi2_glo_b, 1.2);
        assert_eq!(merged.z_fid_mc_lumi, merged.z_fid_mc * 0.013);
        assert_eq!(record(7, 7, 1).run, "7");
    }

    #[test]
    fn test_write_run_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordWriter::new(&dir.path().join("csvFiles")).unwrap();
        let records = vec![record(5, 5, 0), record(5, 5, 1)];
        let path = writer.write_run(5, &records).unwrap().unwrap();
        assert!(path.ends_with("csvFiles/csvfile5.csv"));
        assert_eq!(read_records(&path).unwrap(), records);
        assert!(writer.write_run(6, &[]).unwrap().is_none());
        assert!(!writer.run_file_path(6).exists());
    }

    #[test]
    fn test_summary_is_in_run_order() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordWriter::new(dir.path()).unwrap();
        writer.write_run(20, &[record(20, 20, 0)]).unwrap();
        writer.write_run(3, &[record(1, 3, 0), record(3, 3, 1)]).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a run file").unwrap();

        let summary = read_records(&writer.write_summary().unwrap()).unwrap();
        let runs: Vec<&str> = summary.iter().map(|r| r.run.as_str()).collect();
        assert_eq!(runs, vec!["1-3", "3", "20"]);
    }

    #[test]
    fn test_run_of_file() {
        assert_eq!(run_of_file(Path::new("a/csvfile356381.csv")), Some(356381));
        assert_eq!(run_of_file(Path::new("a/Mergedcsvfile.csv")), None);
        assert_eq!(run_of_file(Path::new("a/csvfile12.yml")), None);
    }
}
