// src/main.rs
use anyhow::Result;
use nilcore::{
    config::{PipelineConfig, DEFAULT_CONFIG_PATH},
    pipeline,
    store::ParquetStore,
};
use std::{env, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = PipelineConfig::from_path(&config_path)?;
    info!(
        config = %config_path.display(),
        datasets = config.datasets.len(),
        input = %config.input_dir.display(),
        store = %config.store_dir.display(),
        "config loaded"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let store = ParquetStore::new(&config.store_dir)?;
    let report = match pipeline::run(&config, &store) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %format!("{:#}", e), "run failed");
            return Err(e);
        }
    };

    // ─── 4) report ───────────────────────────────────────────────────
    let path = pipeline::write_report(&config, &report)?;
    info!(
        report = %path.display(),
        quality_score = report.validation.quality_score,
        "done"
    );
    Ok(())
}
