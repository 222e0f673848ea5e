use super::config::{Config, MassWindow};
use super::counts::{ProbeRecord, RunCounts};
use super::histogram::Hist1D;
use super::leg::{FitCategory, Leg, RegionPair};
use super::lumisection::{LumiSection, SECONDS_PER_LS};

const N_CATEGORIES: usize = 8;

/// Kinematic acceptance of tag-and-probe pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceptance {
    pub mass: MassWindow,
    pub pt_cut: f64,
    pub eta_cut: f64,
}

impl Acceptance {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mass: config.mass,
            pt_cut: config.pt_cut,
            eta_cut: config.eta_cut,
        }
    }

    pub fn accepts(&self, record: &ProbeRecord) -> bool {
        record.mass >= self.mass.low
            && record.mass < self.mass.high
            && record.pt_tag > self.pt_cut
            && record.pt_probe > self.pt_cut
            && record.eta_tag.abs() < self.eta_cut
            && record.eta_probe.abs() < self.eta_cut
    }

    fn mass_histogram(&self) -> Hist1D {
        Hist1D::new(self.mass.bins, self.mass.low, self.mass.high)
    }
}

/// Metadata of a finalized measurement window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMeta {
    pub first_run: u32,
    pub last_run: u32,
    pub fill: u32,
    pub measurement: usize,
    pub n_lumisections: usize,
    pub time_begin: i64,
    pub time_end: i64,
    /// Live time in seconds
    pub time_window: f64,
    pub lumi_recorded: f64,
    pub lumi_delivered: f64,
    pub pileup: f64,
}

impl WindowMeta {
    pub fn is_merged(&self) -> bool {
        self.first_run != self.last_run
    }

    /// `first-last` for windows spanning several runs, else the run number
    pub fn run_span(&self) -> String {
        if self.is_merged() {
            format!("{}-{}", self.first_run, self.last_run)
        } else {
            self.first_run.to_string()
        }
    }
}

/// Collects the histograms of one measurement window while it is being built.
///
/// A new accumulator is created for every window; it is consumed by `finalize`.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    acceptance: Acceptance,
    pass: Vec<Hist1D>,
    fail: Vec<Hist1D>,
    pileup: Hist1D,
    z_reco: [u64; 3],
    sections: Vec<LumiSection>,
}

impl WindowAccumulator {
    pub fn new(acceptance: Acceptance) -> Self {
        Self {
            acceptance,
            pass: vec![acceptance.mass_histogram(); N_CATEGORIES],
            fail: vec![acceptance.mass_histogram(); N_CATEGORIES],
            pileup: Hist1D::pileup(),
            z_reco: [0; 3],
            sections: Vec::new(),
        }
    }

    /// Add one lumisection, filling the histograms from the run's detector records
    pub fn add_lumisection(&mut self, section: &LumiSection, counts: &RunCounts) {
        for record in counts.records(section.ls) {
            if record.leg == Leg::Trigger {
                self.pileup.fill(record.npv);
            }
            if !self.acceptance.accepts(record) {
                continue;
            }
            let category = FitCategory::new(record.leg, record.probe_region());
            if record.pass {
                self.pass[category.index()].fill(record.mass);
            } else {
                self.fail[category.index()].fill(record.mass);
            }
            // Every pair with a selected probe is a reconstructed Z
            if record.leg == Leg::Trigger {
                self.z_reco[record.region_pair() as usize] += 1;
            }
        }
        self.sections.push(section.clone());
    }

    pub fn add_lumisections(&mut self, sections: &[LumiSection], counts: &RunCounts) {
        for section in sections {
            self.add_lumisection(section, counts);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn recorded(&self) -> f64 {
        self.sections.iter().map(|s| s.recorded).sum()
    }

    pub fn first_run(&self) -> Option<u32> {
        self.sections.first().map(|s| s.run)
    }

    pub fn last_run(&self) -> Option<u32> {
        self.sections.last().map(|s| s.run)
    }

    /// Seal the window. Returns None if no lumisection was ever added.
    pub fn finalize(self, measurement: usize) -> Option<FinalizedWindow> {
        let first = self.sections.first()?;
        let last = self.sections.last()?;
        let n_lumisections = self.sections.len();
        let meta = WindowMeta {
            first_run: first.run,
            last_run: last.run,
            fill: last.fill,
            measurement,
            n_lumisections,
            time_begin: self.sections.iter().map(|s| s.timestamp).min()?,
            time_end: self.sections.iter().map(|s| s.timestamp).max()?,
            time_window: n_lumisections as f64 * SECONDS_PER_LS,
            lumi_recorded: self.sections.iter().map(|s| s.recorded).sum(),
            lumi_delivered: self.sections.iter().map(|s| s.delivered).sum(),
            pileup: self.sections.iter().map(|s| s.avg_pileup).sum::<f64>()
                / n_lumisections as f64,
        };
        Some(FinalizedWindow {
            meta,
            pass: self.pass,
            fail: self.fail,
            pileup: self.pileup,
            z_reco: self.z_reco,
        })
    }
}

/// An immutable, complete measurement window with its histograms
#[derive(Debug, Clone)]
pub struct FinalizedWindow {
    pub meta: WindowMeta,
    pass: Vec<Hist1D>,
    fail: Vec<Hist1D>,
    pileup: Hist1D,
    z_reco: [u64; 3],
}

impl FinalizedWindow {
    pub fn pass(&self, category: FitCategory) -> &Hist1D {
        &self.pass[category.index()]
    }

    pub fn fail(&self, category: FitCategory) -> &Hist1D {
        &self.fail[category.index()]
    }

    pub fn pileup(&self) -> &Hist1D {
        &self.pileup
    }

    pub fn z_reco(&self, pair: RegionPair) -> u64 {
        self.z_reco[pair as usize]
    }

    pub fn z_reco_total(&self) -> u64 {
        self.z_reco.iter().sum()
    }
}
