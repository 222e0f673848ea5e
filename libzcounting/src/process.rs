use std::sync::mpsc::Sender;

use super::aggregator::{Aggregator, Lookahead, RunOutcome};
use super::config::Config;
use super::error::ProcessorError;
use super::fit::FitEngine;
use super::lumisection::{group_by_run, load_byls};
use super::process_status::ProcessStatus;
use super::propagation::{Calibrations, CorrelationCalibration, McCorrections};

/// Load the calibration bundle named by the config
pub fn load_calibrations(config: &Config) -> Result<Calibrations, ProcessorError> {
    let mc = McCorrections::read_file(&config.mc_corrections_path)?;
    let correlation = CorrelationCalibration::read_file(&config.correlation_path)?;
    Ok(Calibrations {
        mc,
        correlation,
        lumi_uncertainty: config.lumi_uncertainty,
    })
}

/// The main loop of zcounting.
///
/// Loads the luminosity records of the requested run range, then feeds the runs in order
/// through the Aggregator. Progress is reported after every run. Runs without detector
/// counts and windows which could not be fitted are skipped; anything else is an error.
pub fn process(
    config: Config,
    engine: &dyn FitEngine,
    tx: Sender<ProcessStatus>,
) -> Result<(), ProcessorError> {
    config.validate()?;
    let calibrations = load_calibrations(&config)?;

    let sections = load_byls(&config.byls_path, config.begin_run, config.end_run)?;
    let runs = group_by_run(sections);
    log::info!(
        "Found {} runs in [{}, {}); fitting with the {} engine",
        runs.len(),
        config.begin_run,
        config.end_run,
        engine.name()
    );

    let mut aggregator = Aggregator::new(&config, engine, &calibrations)?;
    tx.send(ProcessStatus::new(0.0, config.begin_run))?;
    let n_runs = runs.len();
    for (idx, (run, sections)) in runs.iter().enumerate() {
        log::info!("Processing run {run}...");
        let lookahead = Lookahead::compute(&runs, *run, aggregator.threshold());
        match aggregator.process_run(*run, sections, lookahead)? {
            RunOutcome::Skipped => log::info!("Run {run} skipped."),
            RunOutcome::MergedForward => log::info!("Run {run} continues into the next run."),
            RunOutcome::Completed(Some(path)) => {
                log::info!("Finished run {run}, results in {}.", path.to_string_lossy())
            }
            RunOutcome::Completed(None) => log::info!("Finished run {run} without results."),
        }
        tx.send(ProcessStatus::new(
            (idx + 1) as f32 / n_runs as f32,
            *run,
        ))?;
    }
    if let Some(path) = aggregator.finish()? {
        log::info!("Wrote remaining results to {}", path.to_string_lossy());
    }

    if config.write_summary {
        let path = aggregator.writer().write_summary()?;
        log::info!("Summary written to {}", path.to_string_lossy());
    }
    tx.send(ProcessStatus::new(1.0, config.end_run))?;
    Ok(())
}
