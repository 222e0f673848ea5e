use clap::{Arg, ArgAction, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::channel;

use libzcounting::config::Config;
use libzcounting::fit::CountingEngine;
use libzcounting::models::{BackgroundModel, SignalModel};
use libzcounting::process::process;

fn make_template_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let yaml_str = serde_yaml::to_string(&config)?;
    let mut file = File::create(path)?;
    file.write_all(yaml_str.as_bytes())?;
    Ok(())
}

fn cli() -> Command {
    Command::new("zcounting_cli")
        .about("Luminosity from Z boson counting")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("new")
                .about("Make a template configuration yaml file at the path given with -p"),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .arg(
            Arg::new("signal")
                .long("signal")
                .help("Override the signal model of the configuration"),
        )
        .arg(
            Arg::new("background")
                .long("background")
                .help("Override the background model of the configuration"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Also print debug messages"),
        )
}

fn main() {
    // Create a cli
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    log::set_max_level(level);

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    if let Some(("new", _)) = matches.subcommand() {
        log::info!(
            "Making a template config at {}...",
            config_path.to_string_lossy()
        );
        match make_template_config(&config_path) {
            Ok(()) => log::info!("Done."),
            Err(e) => log::error!("Could not write the template config: {e}"),
        }
        return;
    }

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let mut config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    if let Some(name) = matches.get_one::<String>("signal") {
        match SignalModel::from_str(name) {
            Ok(model) => config.signal_model = model,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        }
    }
    if let Some(name) = matches.get_one::<String>("background") {
        match BackgroundModel::from_str(name) {
            Ok(model) => config.background_model = model,
            Err(e) => {
                log::error!("{e}");
                return;
            }
        }
    }
    log::info!("Config successfully loaded.");
    log::info!("ByLS Path: {}", config.byls_path.to_string_lossy());
    log::info!("Counts Path: {}", config.counts_path.to_string_lossy());
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Begin Run: {} End Run: {}",
        config.begin_run,
        config.end_run
    );
    if config.inclusive {
        log::info!("Inclusive: one measurement for the whole run range");
    } else {
        log::info!("Luminosity per measurement: {} pb-1", config.lumi_per_measurement);
    }
    log::info!(
        "Models: {} ({}) signal, {} ({}) background",
        config.signal_model,
        config.signal_model.code(),
        config.background_model,
        config.background_model.code()
    );
    log::info!("Collect only: {}", config.collect);

    // Setup the progress bar
    let pb = pb_manager.add(ProgressBar::new(100));
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}")
    {
        pb.set_style(style);
    }
    let (tx, rx) = channel();
    // Spawn the task!
    let handle = std::thread::spawn(move || process(config, &CountingEngine, tx));

    loop {
        match rx.try_recv() {
            Ok(status) => {
                pb.set_position((status.progress * 100.0) as u64);
                pb.set_message(format!("Run {}", status.run_number));
                continue;
            }
            Err(_) => {
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
        }

        if handle.is_finished() {
            match handle.join() {
                Ok(result) => match result {
                    Ok(_) => log::info!("Successfully processed all runs!"),
                    Err(e) => log::error!("Processing failed with error: {e}"),
                },
                Err(_) => log::error!("Failed to join processing task!"),
            }
            break;
        }
    }

    pb.finish();

    log::info!("Done.");
}
