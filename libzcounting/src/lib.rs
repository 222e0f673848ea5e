//! # zcounting
//!
//! zcounting measures the luminosity delivered to the CMS experiment by counting Z bosons
//! decaying to two muons, written in Rust. The count of reconstructed Z bosons in a
//! slice of data is corrected for the detector efficiency, which is measured in the same
//! data with the tag-and-probe method. The resulting delivered Z count, divided by the
//! luminosity from the luminometers, gives a fiducial cross section which is expected to
//! be stable in time. Deviations point at problems in either measurement.
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./zcounting_cli` from the top
//! level repository. The library is `libzcounting`; the source code of `zcounting_cli`
//! should be examined for an example of using it.
//!
//! ## Workflow
//!
//! The luminosity of each run is split into measurement windows, each holding (at least) a
//! configured amount of recorded luminosity. For every window, the invariant mass of the
//! tag-and-probe pairs is histogrammed for four muon legs (standalone, global, selection,
//! trigger) in two detector regions (barrel, endcap). A fit engine extracts the efficiency
//! of each leg, and the efficiencies are combined into the efficiency to detect a Z in the
//! barrel-barrel, barrel-endcap and endcap-endcap categories. The combined efficiency is
//! corrected with simulation and with the inner/outer track correlation, and the final
//! numbers of each window are written as a row of a CSV file.
//!
//! A window which is too small at the end of a run is carried into the next run. Such
//! windows are labeled with the run span `first-last`.
//!
//! ## Configuration
//!
//! The configuration is a YAML file. A template can be made with `zcounting_cli -p
//! config.yml new`. The fields are:
//!
//! - byls_path: The per-lumisection luminosity CSV (brilcalc `--byls` output)
//! - counts_path: The directory of the per-run detector count files
//! - counts_pattern: Name of the count files, `{run}` is replaced by the run number
//! - mc_corrections_path: JSON with the simulation corrections `{"BB": {"a": .., "b": ..}, ...}`
//! - correlation_path: CSV of the inner/outer correlation with columns
//! `pileup_low,pileup_high,value`
//! - output_path: Where results are written
//! - begin_run, end_run: The range of runs `[begin_run, end_run)`
//! - measurement: Only process this window index (optional)
//! - lumi_per_measurement: Recorded luminosity of a window in pb-1
//! - inclusive: Make a single window of the whole run range
//! - collect: Do not fit, read the fit results of a previous pass
//! - signal_model, background_model: The fit models, e.g. `MCxGaus` and `CMSShape`
//! - pt_cut, eta_cut, mass: The acceptance of the tag-and-probe pairs
//! - lumi_uncertainty: The relative uncertainty of the luminometer
//! - write_summary: Also merge all per-run files into one
//!
//! ## Output
//!
//! For every window a `fits_{m}.yml` file with the fit results is written to
//! `output_path/Run{run}` (or `Run{first}to{last}` for windows spanning several runs).
//! The records of each run go to `output_path/csvFiles/csvfile{run}.csv`, and with
//! `write_summary` into `output_path/csvFiles/Mergedcsvfile.csv`.
pub mod accumulator;
pub mod aggregator;
pub mod config;
pub mod counts;
pub mod error;
pub mod extractor;
pub mod fit;
pub mod histogram;
pub mod leg;
pub mod lumisection;
pub mod models;
pub mod process;
pub mod process_status;
pub mod propagation;
pub mod record;
pub mod segmenter;
pub mod writer;
