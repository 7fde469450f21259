// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! kokinod: the Kokino agent execution broker daemon.

use kokino_daemon::{Config, Daemon};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> std::process::ExitCode {
    let config = Config::load();

    if let Err(e) = std::fs::create_dir_all(config.state_dir.join("logs")) {
        eprintln!("kokinod: cannot create state dir: {}", e);
        return std::process::ExitCode::FAILURE;
    }
    let file_appender =
        tracing_appender::rolling::daily(config.state_dir.join("logs"), "kokinod.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        state_dir = %config.state_dir.display(),
        "kokinod starting"
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "runtime build failed");
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        let daemon = Daemon::start(config)?;
        daemon.run().await
    });

    match result {
        Ok(()) => {
            tracing::info!("kokinod stopped");
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "kokinod failed");
            std::process::ExitCode::FAILURE
        }
    }
}
