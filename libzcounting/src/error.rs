use std::path::PathBuf;
use thiserror::Error;

use super::process_status::ProcessStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Luminosity per measurement must be a positive, finite number; found {0}")]
    BadThreshold(f64),
    #[error("Unknown signal model {0}; expected one of MC, MCxGaus, MCxCB, BW, BWxCB, BWxGaus")]
    UnknownSignalModel(String),
    #[error("Unknown background model {0}; expected one of Exp, Quad, QuadPlusExp, CMSShape, Das")]
    UnknownBackgroundModel(String),
    #[error("Invalid run range: begin run {0} must be smaller than end run {1}")]
    BadRunRange(u32, u32),
    #[error("Invalid mass window: low {0}, high {1}, bins {2}")]
    BadMassWindow(f64, f64, usize),
    #[error("Invalid acceptance cuts: pt > {0}, |eta| < {1}")]
    BadCuts(f64, f64),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Could not load lumisection data because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Lumisection loader failed to read CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Lumisection loader found a malformed row at line {0}: {1}")]
    BadRow(u64, String),
}

#[derive(Debug, Error)]
pub enum CountsError {
    #[error("No detector count file for run {0}; was looking for {1:?}")]
    MissingInput(u32, PathBuf),
    #[error("Detector count file failed to read CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Detector count file has an invalid category {0}")]
    BadCategory(String),
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Could not load calibration because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Calibration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Calibration failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Calibration failed to read CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("MC corrections are missing region {0}")]
    MissingRegion(String),
    #[error("Correlation calibration bin [{0}, {1}) is not ordered")]
    BadBin(f64, f64),
}

#[derive(Debug, Error)]
pub enum SegmenterError {
    #[error("Segmenter threshold must be a positive, finite luminosity; found {0}")]
    BadThreshold(f64),
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("Fit of {0} has an empty pass or fail histogram")]
    EmptyHistogram(String),
    #[error("Fit engine returned no usable result for {0}: {1}")]
    NoResult(String, String),
    #[error("No stored fit results at {0:?}")]
    MissingStore(PathBuf),
    #[error("Fit store failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Fit store failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("MC-corrected efficiency {0} is not positive; cannot derive a delivered Z count")]
    NonPositiveEfficiency(f64),
    #[error("Reference luminosity {0} is not positive")]
    NonPositiveLuminosity(f64),
}

/// Everything that can take a single measurement window out of the output
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Window dropped due to fit failure: {0}")]
    FitFailure(#[from] FitError),
    #[error("Window dropped due to propagation error: {0}")]
    Propagation(#[from] PropagationError),
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("RecordWriter failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("RecordWriter failed to write CSV: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Aggregator failed due to Segmenter error: {0}")]
    SegmenterError(#[from] SegmenterError),
    #[error("Aggregator failed due to RecordWriter error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Aggregator failed due to detector count error: {0}")]
    CountsError(#[from] CountsError),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to Loader error: {0}")]
    LoaderError(#[from] LoaderError),
    #[error("Processor failed due to Calibration error: {0}")]
    CalibrationError(#[from] CalibrationError),
    #[error("Processor failed due to Aggregator error: {0}")]
    AggregatorError(#[from] AggregatorError),
    #[error("Processor failed due to RecordWriter error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<ProcessStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
