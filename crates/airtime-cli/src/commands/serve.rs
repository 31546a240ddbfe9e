use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use airtime_core::{Config, RefreshScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{open_engine_with, print_json, CliResult};

pub fn run(db: Option<&Path>, interval: Option<u64>) -> CliResult {
    let config = Config::load()?;
    if interval.is_none() && !config.refresh.enabled {
        return Err(
            "refresh loop is disabled (refresh.enabled = false); pass --interval to run it anyway"
                .into(),
        );
    }
    let secs = interval.unwrap_or(config.refresh.interval_secs);
    if secs == 0 {
        return Err("--interval must be at least 1 second".into());
    }

    let engine = Arc::new(open_engine_with(db, &config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let cycles = runtime.block_on(async move {
        let token = CancellationToken::new();
        let handle = RefreshScheduler::spawn(engine, Duration::from_secs(secs), token.clone());
        info!(interval_secs = secs, "serving; press Ctrl-C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C, stopping");
        }
        token.cancel();
        handle.await
    })?;

    print_json(&serde_json::json!({ "cycles": cycles }))
}
