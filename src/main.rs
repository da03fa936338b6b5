use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use no_dragon_lord::config::GuardConfig;
use no_dragon_lord::guard::DragonLordGuard;
use no_dragon_lord::host::CliHost;
use no_dragon_lord::store::CounterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, with an optional daily-rolling log file.
    let (file_layer, _log_guard) = match std::env::var("NDL_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "no-dragon-lord.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    let config = match std::env::var("NDL_CONFIG") {
        Ok(path) => GuardConfig::load(&PathBuf::from(&path))
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => GuardConfig::from_env().context("invalid NDL_* environment")?,
    };

    eprintln!("🐉 No Dragon Lord v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path().display());
    eprintln!(
        "   Groups: {}",
        if config.white_list_groups.is_empty() {
            "all".to_string()
        } else {
            config.white_list_groups.join(", ")
        }
    );
    eprintln!("   Fault tolerance: {}", config.fault_tolerance);
    eprintln!("   Reset: {}", config.reset_cron);
    eprintln!("   Bot id: {}", config.self_id);
    eprintln!("   Type '<group> <sender> [text]', /stats <group>, /reset or /quit.\n");

    // ── Store ───────────────────────────────────────────────────────────
    let store = Arc::new(
        CounterStore::open(&config)
            .await
            .with_context(|| format!("failed to open {}", config.db_path().display()))?,
    );

    // ── Guard + host ────────────────────────────────────────────────────
    let guard = Arc::new(DragonLordGuard::from_config(Arc::clone(&store), &config));
    let host = CliHost::new(guard, config.self_id.clone());

    tokio::select! {
        _ = host.run(host.start()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    store.close().await;
    Ok(())
}
