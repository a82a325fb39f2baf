//! Starchart inspector: load a dataset, normalize it, seed a store and print a summary.
mod logging;
mod settings;
mod summary;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use serde_json::Value;
use starchart_dataset::{CanonicalDataset, Normalizer};
use starchart_logging::chart_info;
use starchart_store::{Store, ViewerConfig};

use logging::LogDestination;
use settings::Settings;
use summary::Summary;

#[derive(Parser, Debug)]
#[command(author, version, about = "Normalize a starmap dataset and inspect the result", long_about = None)]
struct Cli {
    /// Raw dataset JSON file.
    dataset: PathBuf,
    /// Normalize on the background worker.
    #[arg(long)]
    background: bool,
    /// RON settings file.
    #[arg(long)]
    settings: Option<PathBuf>,
    /// System id to select after loading.
    #[arg(long)]
    select: Option<String>,
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    log: LogDestination,
    /// Log debug output and warn about rejected store actions.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(cli.log, level);

    let settings = match &cli.settings {
        Some(path) => settings::load(path)?,
        None => Settings::default(),
    };

    let text = fs::read_to_string(&cli.dataset)
        .with_context(|| format!("failed to read dataset {:?}", cli.dataset))?;
    let raw: Value = serde_json::from_str(&text)
        .with_context(|| format!("dataset {:?} is not valid JSON", cli.dataset))?;

    let normalizer = Normalizer::with_settings(settings.normalizer.clone());
    let dataset = normalize(&normalizer, raw, cli.background)?;
    chart_info!(
        "Normalized {} systems ({} errors)",
        dataset.systems.len(),
        dataset.normalization_errors.len()
    );

    let config = ViewerConfig {
        debug: cli.debug,
        ..ViewerConfig::default()
    };
    let batch_delay = settings.store.batch_delay;
    let store = Store::with_settings(settings.store, config, Some(dataset), None);
    let selection = store.subscribe(["selection"], |state| {
        if let Some(id) = state.selected_system() {
            chart_info!("Selected system {}", id);
        }
    });

    if let Some(id) = &cli.select {
        store.actions().select_system(Some(id));
        thread::sleep(batch_delay * 2);
    }
    selection.unsubscribe();

    print!("{}", Summary::of(&store.state()));
    Ok(())
}

fn normalize(normalizer: &Normalizer, raw: Value, background: bool) -> Result<Arc<CanonicalDataset>> {
    if !background {
        return Ok(normalizer.normalize(&raw));
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(normalizer.normalize_async(raw)))
}
