// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! DokQ healthcare platform API server binary.

mod cli;
mod logging;
mod shutdown;

use clap::Parser;
use tracing::{error, info};

use dokq_api::{ApiConfig, ApiServer, AppState};

use crate::cli::{Cli, Commands};
use crate::shutdown::ShutdownCoordinator;

fn main() {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level, cli.log_format);

    let exit_code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(),
        Commands::Validate => validate(),
        Commands::Version => {
            println!("dokq v{}", dokq_api::VERSION);
            0
        }
    };

    std::process::exit(exit_code);
}

/// Starts the server and blocks until shutdown.
fn run() -> i32 {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create runtime");
            return 1;
        }
    };

    runtime.block_on(async {
        let config = ApiConfig::from_env();

        let state = match AppState::builder().config(config).build() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Failed to build application state");
                return 1;
            }
        };

        info!(
            strategy = state.verifiers.active(),
            "Credential verifier selected"
        );

        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.shutdown_signal();

        let server = ApiServer::new(state);
        let mut server_task = tokio::spawn(server.run_with_shutdown(signal));

        let result = tokio::select! {
            // Normal path: an OS signal arrives, the server drains and exits.
            _ = coordinator.wait_for_shutdown() => server_task.await,
            // Early exit: bind failure or fatal server error.
            result = &mut server_task => result,
        };

        match result {
            Ok(Ok(())) => 0,
            Ok(Err(e)) => {
                error!(error = %e, "Server error");
                1
            }
            Err(e) => {
                error!(error = %e, "Server task panicked");
                1
            }
        }
    })
}

/// Validates the environment configuration without serving.
fn validate() -> i32 {
    let config = ApiConfig::from_env();

    match AppState::builder().config(config.clone()).build() {
        Ok(state) => {
            info!(
                environment = ?config.environment,
                strategy = state.verifiers.active(),
                origins = ?config.cors.allowed_origins,
                "Configuration is valid"
            );
            0
        }
        Err(e) => {
            error!(error = %e, "Configuration is invalid");
            1
        }
    }
}
