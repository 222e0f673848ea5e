use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;
use super::models::{BackgroundModel, SignalModel};

/// Placeholder in `counts_pattern` which is replaced by the run number
const RUN_TOKEN: &str = "{run}";
/// Name of the directory (inside the output directory) holding the per-run CSV files
const CSV_DIR_NAME: &str = "csvFiles";

/// Invariant mass window of the tag-and-probe pairs, in GeV
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassWindow {
    pub low: f64,
    pub high: f64,
    pub bins: usize,
}

impl Default for MassWindow {
    fn default() -> Self {
        Self {
            low: 60.0,
            high: 120.0,
            bins: 120,
        }
    }
}

/// Structure representing the analysis configuration. Contains pathing, run range, and fit information
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub byls_path: PathBuf,
    pub counts_path: PathBuf,
    pub counts_pattern: String,
    pub mc_corrections_path: PathBuf,
    pub correlation_path: PathBuf,
    pub output_path: PathBuf,
    pub begin_run: u32,
    pub end_run: u32,
    pub measurement: Option<usize>,
    pub lumi_per_measurement: f64,
    pub inclusive: bool,
    pub collect: bool,
    pub signal_model: SignalModel,
    pub background_model: BackgroundModel,
    pub pt_cut: f64,
    pub eta_cut: f64,
    pub mass: MassWindow,
    pub lumi_uncertainty: f64,
    pub write_summary: bool,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            byls_path: PathBuf::from("None"),
            counts_path: PathBuf::from("None"),
            counts_pattern: String::from("ZCounting_Muon_{run}.csv"),
            mc_corrections_path: PathBuf::from("None"),
            correlation_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            begin_run: 272007,
            end_run: 1000000,
            measurement: None,
            lumi_per_measurement: 20.0,
            inclusive: false,
            collect: false,
            signal_model: SignalModel::default(),
            background_model: BackgroundModel::default(),
            pt_cut: 25.0,
            eta_cut: 2.4,
            mass: MassWindow::default(),
            lumi_uncertainty: 0.013,
            write_summary: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful. The Config is validated before it is returned.
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        let config = serde_yaml::from_str::<Self>(&yaml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the Config for values which would make the analysis meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.lumi_per_measurement.is_finite() || self.lumi_per_measurement <= 0.0 {
            return Err(ConfigError::BadThreshold(self.lumi_per_measurement));
        }
        if self.begin_run >= self.end_run {
            return Err(ConfigError::BadRunRange(self.begin_run, self.end_run));
        }
        if self.mass.bins == 0 || !(self.mass.low < self.mass.high) {
            return Err(ConfigError::BadMassWindow(
                self.mass.low,
                self.mass.high,
                self.mass.bins,
            ));
        }
        if self.pt_cut < 0.0 || self.eta_cut <= 0.0 {
            return Err(ConfigError::BadCuts(self.pt_cut, self.eta_cut));
        }
        Ok(())
    }

    /// Get the path to the detector count file of a run
    pub fn get_counts_file(&self, run_number: u32) -> PathBuf {
        self.counts_path.join(
            self.counts_pattern
                .replace(RUN_TOKEN, &run_number.to_string()),
        )
    }

    /// Get the output sub-directory of a measurement spanning first_run..last_run
    pub fn get_measurement_directory(&self, first_run: u32, last_run: u32) -> PathBuf {
        if first_run != last_run {
            self.output_path
                .join(format!("Run{first_run}to{last_run}"))
        } else {
            self.output_path.join(format!("Run{first_run}"))
        }
    }

    /// Get the directory where per-run CSV files are written
    pub fn get_csv_directory(&self) -> PathBuf {
        self.output_path.join(CSV_DIR_NAME)
    }

    pub fn is_measurement_selected(&self, measurement: usize) -> bool {
        match self.measurement {
            Some(m) => m == measurement,
            None => true,
        }
    }
}
