//! Main attach-and-follow mode.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tether::{
    FeatureWorker, SessionController, SystemProvider, WorkerSignal, load_offsets,
};
use tracing::{debug, error, info};

use crate::config::{RunConfig, load_config};
use crate::console::ConsoleSubscriber;
use crate::features::PinFeature;
use crate::input;

pub fn run(offsets_path: &Path, config_path: &Path, process: Option<String>) -> Result<()> {
    let signal = Arc::new(WorkerSignal::new());
    let signal_ctrlc = Arc::clone(&signal);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        signal_ctrlc.trigger();
    })?;

    info!("tether {}", env!("CARGO_PKG_VERSION"));

    let RunConfig { tether: config, pins } = load_config(config_path);
    let mut offsets = load_offsets(offsets_path).with_context(|| {
        format!(
            "failed to load offsets from {} (create one with `tether offsets --init`)",
            offsets_path.display()
        )
    })?;
    if let Some(name) = process {
        offsets.process_name = name;
    }
    offsets.validate()?;
    info!(
        "Loaded offsets {} for {}",
        offsets.version, offsets.process_name
    );
    debug!("Config: {:?}", config);
    let local_actor_offset = offsets.world.local_actor;

    let mut controller = SessionController::new(
        SystemProvider::new(),
        Arc::new(offsets),
        config.clone(),
        Arc::clone(&signal),
    );
    controller.subscribe(Box::new(ConsoleSubscriber));

    let features = if pins.is_empty() {
        debug!("No pins configured, write features disabled");
        None
    } else {
        let mut worker = FeatureWorker::new(
            controller.events(),
            controller.gate(),
            Arc::clone(&signal),
            &config,
        );
        worker.register(Box::new(PinFeature::new(pins, local_actor_offset)));
        Some(worker)
    };

    let _keyboard = input::spawn_keyboard_monitor(Arc::clone(&signal));
    println!("Press r to reattach, Esc or q to quit");

    let session_thread = controller.spawn()?;
    let feature_thread = features.map(FeatureWorker::spawn).transpose()?;

    if session_thread.join().is_err() {
        error!("Session worker panicked");
    }
    signal.trigger();
    if feature_thread.is_some_and(|thread| thread.join().is_err()) {
        error!("Feature worker panicked");
    }

    info!("Shutdown complete");
    Ok(())
}
