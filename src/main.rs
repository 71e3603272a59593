//! FIFO Readout - Demo Entry Point
//!
//! Runs the readout engine against the simulated source for a few seconds
//! and prints the engine status as JSON.
//!
//! ```bash
//! fifo-readout [config.toml] [seconds]
//! ```

use anyhow::Context;
use fifo_readout::{
    backend::{FifoReadout, SimPattern, SimSource},
    config::{ReadoutConfig, StartOptions},
    pipeline::{m26_plane_ids, PipelineSpec, WordMask},
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PLANES: u32 = 6;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fifo_readout=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => ReadoutConfig::load(&path)
            .with_context(|| format!("Failed to load readout config {}", path))?,
        None => ReadoutConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(s) => s.parse().context("Run duration must be whole seconds")?,
        None => 3,
    };
    if config.fifos.is_empty() {
        config.fifos = vec!["SITCP_FIFO".to_string()];
    }

    tracing::info!("Starting FIFO readout demo ({}s)", seconds);

    let channels: Vec<String> = (1..=PLANES).map(|p| format!("M26_RX{}", p)).collect();
    let mut source = SimSource::new().with_channels(channels);
    for fifo in &config.fifos {
        source = source.with_fifo(fifo.clone());
    }
    for fifo in &config.fifos {
        source.set_pattern(
            fifo,
            SimPattern::Telescope {
                planes: PLANES,
                words_per_second: 100_000.0,
            },
        )?;
    }
    let source = Arc::new(source);
    let readout = FifoReadout::new(source, config.clone());

    let written = Arc::new(AtomicUsize::new(0));
    let written_sink = written.clone();
    let m26 = WordMask::m26();

    let mut options = StartOptions::from_config(&config)
        .with_sink(move |batches| {
            let words: usize = batches
                .iter()
                .flatten()
                .flat_map(|chunks| chunks.iter().map(|c| c.len()))
                .sum();
            written_sink.fetch_add(words, Ordering::Relaxed);
            Ok(())
        })
        .with_err_sink(|err| tracing::error!("{}", err))
        .with_classifier(m26_plane_ids);
    if config.pipelines.is_empty() {
        options = options
            .with_pipeline(PipelineSpec::all())
            .with_pipeline(PipelineSpec::all().with_filter(move |w| m26.matches(w)));
    }

    readout.start(config.fifos.clone(), options)?;
    for _ in 0..seconds {
        std::thread::sleep(Duration::from_secs(1));
        readout.log_readout_status();
    }

    let status = serde_json::to_string_pretty(&readout.status())?;
    println!("{}", status);

    readout.stop(config.stop_timeout())?;
    tracing::info!(
        "Finished: {} word(s) delivered to the sink",
        written.load(Ordering::Relaxed)
    );
    Ok(())
}
