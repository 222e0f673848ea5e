use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::PathBuf;

use super::accumulator::{Acceptance, FinalizedWindow, WindowAccumulator};
use super::config::Config;
use super::counts::RunCounts;
use super::error::{AggregatorError, CountsError, WindowError};
use super::extractor::{combine, EfficiencySet, Extractor};
use super::fit::{FitEngine, FitStore};
use super::leg::RegionPair;
use super::lumisection::{recorded_lumi, zero_yield, LumiSection};
use super::propagation::{fold_correlation, propagate, Calibrations, YieldInputs};
use super::record::AggregatedRecord;
use super::segmenter::Segmenter;
use super::writer::RecordWriter;

/// What the runs after the current one can contribute to a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookahead {
    pub next_run_exists: bool,
    /// The following runs together record more than half a measurement
    pub following_reach_half: bool,
}

impl Lookahead {
    /// Inspect the runs after `run`. `runs` must only contain runs of the requested range.
    pub fn compute(runs: &BTreeMap<u32, Vec<LumiSection>>, run: u32, threshold: f64) -> Self {
        let mut following = runs.range((Bound::Excluded(run), Bound::Unbounded)).peekable();
        let next_run_exists = following.peek().is_some();
        let mut lumi = 0.0;
        let mut following_reach_half = false;
        for (_, sections) in following {
            lumi += recorded_lumi(sections);
            if lumi > 0.5 * threshold {
                following_reach_half = true;
                break;
            }
        }
        Self {
            next_run_exists,
            following_reach_half,
        }
    }

    /// Whether a tail holding `recorded` should be carried into the next run
    pub fn merges(&self, recorded: f64, threshold: f64, inclusive: bool) -> bool {
        self.next_run_exists
            && (!self.following_reach_half || recorded < 0.5 * threshold || inclusive)
    }
}

/// How a run was handled
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No detector counts for the run
    Skipped,
    /// The last window continues into the next run
    MergedForward,
    /// Records were written (None if there were none to write)
    Completed(Option<PathBuf>),
}

/// Drives the measurement windows through the runs of the requested range.
///
/// Runs must be given in increasing order. A window which did not reach the luminosity
/// threshold at the end of a run may be carried into the next run, in which case the
/// resulting record spans several runs.
pub struct Aggregator<'a> {
    config: &'a Config,
    calibrations: &'a Calibrations,
    extractor: Extractor<'a>,
    segmenter: Segmenter,
    acceptance: Acceptance,
    writer: RecordWriter,
    accumulator: WindowAccumulator,
    /// Index of the window held by the accumulator
    pending_measurement: usize,
    records: Vec<AggregatedRecord>,
    n_recorded: usize,
    n_dropped: usize,
    n_skipped: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        config: &'a Config,
        engine: &'a dyn FitEngine,
        calibrations: &'a Calibrations,
    ) -> Result<Self, AggregatorError> {
        let segmenter = if config.inclusive {
            Segmenter::inclusive()
        } else {
            Segmenter::new(config.lumi_per_measurement)?
        };
        let acceptance = Acceptance::from_config(config);
        Ok(Self {
            config,
            calibrations,
            extractor: Extractor::new(engine, config),
            segmenter,
            acceptance,
            writer: RecordWriter::new(&config.get_csv_directory())?,
            accumulator: WindowAccumulator::new(acceptance),
            pending_measurement: 0,
            records: Vec::new(),
            n_recorded: 0,
            n_dropped: 0,
            n_skipped: 0,
        })
    }

    pub fn writer(&self) -> &RecordWriter {
        &self.writer
    }

    pub fn threshold(&self) -> f64 {
        self.segmenter.threshold()
    }

    /// Process all lumisections of one run
    pub fn process_run(
        &mut self,
        run: u32,
        sections: &[LumiSection],
        lookahead: Lookahead,
    ) -> Result<RunOutcome, AggregatorError> {
        let counts = match RunCounts::load(&self.config.get_counts_file(run), run) {
            Ok(counts) => counts,
            Err(CountsError::MissingInput(run, path)) => {
                log::warn!(
                    "Run {run}: no detector counts found at {}; skipping the run",
                    path.to_string_lossy()
                );
                self.n_skipped += 1;
                return Ok(RunOutcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };
        let sections = counts.attach(sections.to_vec());
        log::info!(
            "Run {run}: {} lumisections, {:.3} pb-1 recorded",
            sections.len(),
            recorded_lumi(&sections)
        );
        let empty = zero_yield(&sections);
        if !empty.is_empty() {
            log::warn!(
                "Run {run}: {} lumisections without Z candidates (LS {})",
                empty.len(),
                empty
                    .iter()
                    .map(|ls| ls.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let threshold = self.segmenter.threshold();
        for window in self.segmenter.segment(&sections) {
            let m = window.index;
            if matches!(self.config.measurement, Some(selected) if selected < m) {
                break;
            }
            self.accumulator.add_lumisections(window.sections, &counts);
            self.pending_measurement = m;

            if window.is_tail()
                && lookahead.merges(self.accumulator.recorded(), threshold, self.config.inclusive)
            {
                log::info!(
                    "Run {run} measurement {m}: merging {:.3} pb-1 with the next run",
                    self.accumulator.recorded()
                );
                return Ok(RunOutcome::MergedForward);
            }
            self.finalize_pending(run);
        }

        let path = self.flush(run)?;
        Ok(RunOutcome::Completed(path))
    }

    /// Finalize a window still waiting for a following run and write the remaining records.
    ///
    /// Must be called once all runs have been processed.
    pub fn finish(&mut self) -> Result<Option<PathBuf>, AggregatorError> {
        let last_run = self.accumulator.last_run();
        if let Some(run) = last_run {
            log::info!(
                "Run {run} measurement {}: no more runs to merge with; finalizing",
                self.pending_measurement
            );
            self.finalize_pending(run);
        }
        log::info!(
            "Recorded {} measurements, dropped {}, skipped {} runs",
            self.n_recorded,
            self.n_dropped,
            self.n_skipped
        );
        match last_run {
            Some(run) => self.flush(run),
            None => Ok(None),
        }
    }

    /// Seal the accumulated window and evaluate it. Failures only drop the window.
    fn finalize_pending(&mut self, run: u32) {
        let m = self.pending_measurement;
        let accumulator = std::mem::replace(
            &mut self.accumulator,
            WindowAccumulator::new(self.acceptance),
        );
        if !self.config.is_measurement_selected(m) {
            return;
        }
        let Some(window) = accumulator.finalize(m) else {
            return;
        };
        match self.evaluate(&window) {
            Ok(record) => {
                log::info!(
                    "Run {} measurement {m}: {:.4} pb-1 from Z counting, {:.4} pb-1 recorded",
                    window.meta.run_span(),
                    record.z_fid_mc,
                    record.lumi_rec
                );
                self.records.push(record);
                self.n_recorded += 1;
            }
            Err(e) => {
                log::warn!("Run {run} measurement {m}: {e}");
                self.n_dropped += 1;
            }
        }
    }

    fn evaluate(&self, window: &FinalizedWindow) -> Result<AggregatedRecord, WindowError> {
        let meta = &window.meta;
        let directory = self
            .config
            .get_measurement_directory(meta.first_run, meta.last_run);
        let store = if self.config.collect {
            FitStore::read(&directory, meta.measurement)?
        } else {
            let store = self.extractor.fit_window(window)?;
            store.write(&directory)?;
            store
        };
        let efficiencies = EfficiencySet::from_store(&store)?;
        let inputs = YieldInputs {
            efficiency: combine(&efficiencies),
            z_reco: RegionPair::ALL.map(|pair| window.z_reco(pair)),
            avg_pileup: meta.pileup,
            c_io: fold_correlation(&self.calibrations.correlation, window.pileup()),
            luminosity: meta.lumi_recorded,
        };
        let result = propagate(&inputs, self.calibrations)?;
        Ok(AggregatedRecord::new(meta, &efficiencies, &result))
    }

    fn flush(&mut self, run: u32) -> Result<Option<PathBuf>, AggregatorError> {
        let path = self.writer.write_run(run, &self.records)?;
        self.records.clear();
        Ok(path)
    }
}
