//! The seam to the template-fit engine.
//!
//! The actual maximum likelihood fits are performed by an external engine implementing
//! [`FitEngine`]. The library only prepares the histograms, hands them over, and keeps
//! track of the results. Results are stored per window in a YAML file so that a later
//! "collect" pass can rebuild the output without refitting.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::FitError;
use super::histogram::Hist1D;
use super::leg::FitCategory;
use super::models::{BackgroundModel, SignalModel};

/// Everything the fit engine needs to fit one leg in one region
#[derive(Debug, Clone)]
pub struct FitRequest<'a> {
    pub category: FitCategory,
    pub pass: &'a Hist1D,
    pub fail: &'a Hist1D,
    pub pileup: &'a Hist1D,
    pub signal_model: SignalModel,
    pub background_model: BackgroundModel,
    pub measurement: usize,
    /// Recorded luminosity of the window, in pb-1
    pub luminosity: f64,
}

/// Result of a simultaneous pass/fail fit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOutput {
    pub signal_yield: f64,
    pub signal_yield_error: f64,
    pub efficiency: f64,
    pub efficiency_error_low: f64,
    pub efficiency_error_high: f64,
    pub chi2_pass: f64,
    pub chi2_fail: f64,
    pub background_pass: f64,
    pub background_fail: f64,
}

impl FitOutput {
    /// Single fit-quality statistic; the worse of the two fits
    pub fn chi2(&self) -> f64 {
        self.chi2_pass.max(self.chi2_fail)
    }
}

/// An engine able to extract yields and efficiencies from pass/fail histograms.
///
/// Calls are synchronous. An engine returning an error for a category makes the whole
/// window unusable.
pub trait FitEngine {
    fn fit(&self, request: &FitRequest) -> Result<FitOutput, FitError>;

    /// Engine name (e.g., "counting")
    fn name(&self) -> &str;
}

/// Cut-and-count stand-in for a template fit.
///
/// All entries in the mass window are taken as signal and the efficiency is the binomial
/// ratio pass / (pass + fail). Useful for validation and when no fit engine is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingEngine;

impl FitEngine for CountingEngine {
    fn fit(&self, request: &FitRequest) -> Result<FitOutput, FitError> {
        let n_pass = request.pass.integral();
        let n_fail = request.fail.integral();
        let n_total = n_pass + n_fail;
        if n_pass <= 0.0 || n_fail <= 0.0 {
            return Err(FitError::EmptyHistogram(request.category.to_string()));
        }
        let efficiency = n_pass / n_total;
        let error = (efficiency * (1.0 - efficiency) / n_total).sqrt();
        log::debug!(
            "Counting {} for measurement {}: {} pass, {} fail (models {}/{} ignored)",
            request.category,
            request.measurement,
            n_pass,
            n_fail,
            request.signal_model,
            request.background_model
        );
        Ok(FitOutput {
            signal_yield: n_total,
            signal_yield_error: n_total.sqrt(),
            efficiency,
            efficiency_error_low: error.min(efficiency),
            efficiency_error_high: error.min(1.0 - efficiency),
            chi2_pass: 0.0,
            chi2_fail: 0.0,
            background_pass: 0.0,
            background_fail: 0.0,
        })
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// The fit results of one measurement window, persisted next to the other fit outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitStore {
    pub measurement: usize,
    pub engine: String,
    results: BTreeMap<String, FitOutput>,
}

impl FitStore {
    pub fn new(measurement: usize, engine: &str) -> Self {
        Self {
            measurement,
            engine: engine.to_string(),
            results: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, category: FitCategory, output: FitOutput) {
        self.results.insert(category.to_string(), output);
    }

    pub fn get(&self, category: FitCategory) -> Option<&FitOutput> {
        self.results.get(&category.to_string())
    }

    pub fn file_path(directory: &Path, measurement: usize) -> PathBuf {
        directory.join(format!("fits_{measurement}.yml"))
    }

    /// Write the store into the measurement directory, creating it if needed
    pub fn write(&self, directory: &Path) -> Result<PathBuf, FitError> {
        std::fs::create_dir_all(directory)?;
        let path = Self::file_path(directory, self.measurement);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(serde_yaml::to_string(self)?.as_bytes())?;
        Ok(path)
    }

    /// Read back a store written by a previous fitting pass
    pub fn read(directory: &Path, measurement: usize) -> Result<Self, FitError> {
        let path = Self::file_path(directory, measurement);
        if !path.exists() {
            return Err(FitError::MissingStore(path));
        }
        let yaml_str = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leg::{Leg, Region};
    use approx::assert_relative_eq;

    fn filled(n: usize) -> Hist1D {
        let mut hist = Hist1D::new(60, 60.0, 120.0);
        for i in 0..n {
            hist.fill(85.0 + (i % 10) as f64);
        }
        hist
    }

    fn request<'a>(pass: &'a Hist1D, fail: &'a Hist1D, pileup: &'a Hist1D) -> FitRequest<'a> {
        FitRequest {
            category: FitCategory::new(Leg::Selection, Region::Barrel),
            pass,
            fail,
            pileup,
            signal_model: SignalModel::default(),
            background_model: BackgroundModel::default(),
            measurement: 0,
            luminosity: 20.0,
        }
    }

    #[test]
    fn test_counting_efficiency() {
        let (pass, fail, pileup) = (filled(90), filled(10), Hist1D::pileup());
        let output = CountingEngine.fit(&request(&pass, &fail, &pileup)).unwrap();
        assert_relative_eq!(output.efficiency, 0.9);
        assert_relative_eq!(output.efficiency_error_low, 0.03, epsilon = 1e-12);
        assert_relative_eq!(output.efficiency_error_high, 0.03, epsilon = 1e-12);
        assert_relative_eq!(output.signal_yield, 100.0);
        assert_eq!(output.chi2(), 0.0);
    }

    #[test]
    fn test_counting_empty_fails() {
        let (pass, fail, pileup) = (filled(0), filled(0), Hist1D::pileup());
        assert!(matches!(
            CountingEngine.fit(&request(&pass, &fail, &pileup)),
            Err(FitError::EmptyHistogram(_))
        ));
    }

    #[test]
    fn test_counting_empty_fail_histogram_fails() {
        let (pass, fail, pileup) = (filled(50), filled(0), Hist1D::pileup());
        assert!(matches!(
            CountingEngine.fit(&request(&pass, &fail, &pileup)),
            Err(FitError::EmptyHistogram(_))
        ));
    }

    #[test]
    fn test_counting_errors_stay_in_range() {
        let (pass, fail, pileup) = (filled(99), filled(1), Hist1D::pileup());
        let output = CountingEngine.fit(&request(&pass, &fail, &pileup)).unwrap();
        assert!(output.efficiency + output.efficiency_error_high <= 1.0);
        assert!(output.efficiency - output.efficiency_error_low >= 0.0);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let category = FitCategory::new(Leg::Trigger, Region::Endcap);
        let output = FitOutput {
            signal_yield: 812.0,
            signal_yield_error: 29.0,
            efficiency: 0.87,
            efficiency_error_low: 0.012,
            efficiency_error_high: 0.011,
            chi2_pass: 1.1,
            chi2_fail: 0.9,
            background_pass: 12.0,
            background_fail: 30.0,
        };
        let mut store = FitStore::new(4, "counting");
        store.insert(category, output);
        let path = store.write(dir.path()).unwrap();
        assert!(path.ends_with("fits_4.yml"));

        let loaded = FitStore::read(dir.path(), 4).unwrap();
        assert_eq!(loaded.get(category), Some(&output));
        assert!(loaded.get(FitCategory::new(Leg::Trigger, Region::Barrel)).is_none());
        assert!(matches!(
            FitStore::read(dir.path(), 5),
            Err(FitError::MissingStore(_))
        ));
    }
}
