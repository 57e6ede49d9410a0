use std::str::FromStr;

use anyhow::Result;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Output formats for logging messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Standard, human readable format.
    Raw,
    /// JSON, machine readable format.
    Json,
}

pub fn init_tracing(level: LevelFilter, format: Format) -> Result<()> {
    if level == LevelFilter::OFF {
        return Ok(());
    }

    let is_terminal = atty::is(atty::Stream::Stderr);

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(is_terminal && format == Format::Raw)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);

    let layer = match format {
        Format::Json => layer.json().with_filter(env_filter(level)?).boxed(),
        Format::Raw => layer.with_filter(env_filter(level)?).boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init()?;

    tracing::info!(%level, "Initialized tracing");

    Ok(())
}

/// Our own crates log at `level`; `RUST_LOG` can add directives on top.
fn env_filter(level: LevelFilter) -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(Directive::from_str(&format!("folio_sync={level}"))?)
        .add_directive(Directive::from_str(&format!("folio_fingerprint={level}"))?)
        .add_directive(Directive::from_str(&format!("folio_env={level}"))?)
        .add_directive(Directive::from_str(&format!("folio_fs={level}"))?)
        .add_directive(Directive::from_str(&format!("tower_http={level}"))?))
}
