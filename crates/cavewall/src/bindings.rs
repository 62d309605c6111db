use anyhow::{Context, Result};
use caveconfig::{CaveConfig, StallMode, ViewportEntry};
use cluster::{MasterConfig, StallPolicy};
use glam::Vec3;
use projection::{SolverOptions, Viewport};
use tracking::IngestOptions;

use crate::cli::Cli;

pub fn load_config(cli: &Cli) -> Result<CaveConfig> {
    if let Some(path) = &cli.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration at {}", path.display()))?;
        let config = CaveConfig::from_toml_str(&raw)
            .with_context(|| format!("failed to load configuration at {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            viewports = config.viewports.len(),
            "loaded installation configuration"
        );
        return Ok(config);
    }

    match cli.preset.as_deref() {
        Some("aixcave") => Ok(caveconfig::aixcave()),
        Some(other) => anyhow::bail!("unknown preset '{other}'; available presets: aixcave"),
        None => {
            tracing::info!("no configuration given; using the built-in aixcave preset");
            Ok(caveconfig::aixcave())
        }
    }
}

pub fn viewport_from_entry(name: &str, entry: &ViewportEntry) -> Result<Viewport> {
    Viewport::new(
        Vec3::from(entry.loc),
        Vec3::from(entry.rot),
        entry.left,
        entry.right,
        entry.bottom,
        entry.top,
    )
    .with_context(|| format!("viewport '{name}' is not a valid wall"))
}

pub fn master_config(config: &CaveConfig) -> MasterConfig {
    MasterConfig {
        ack_timeout: config.cluster.ack_timeout,
        stall_policy: match config.cluster.stall {
            StallMode::PresentStale => StallPolicy::PresentStale,
            StallMode::Strict => StallPolicy::StrictStall,
        },
    }
}

pub fn solver_options(config: &CaveConfig) -> SolverOptions {
    SolverOptions {
        far: config.defaults.far_plane,
        ..SolverOptions::default()
    }
}

pub fn ingest_options(config: &CaveConfig) -> IngestOptions {
    IngestOptions {
        body: config.tracking.body.clone(),
        rate_window: config.tracking.rate_window,
    }
}
