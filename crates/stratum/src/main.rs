//! # Stratum Server
//!
//! Headless voxel world server. Loads configuration, composes the world
//! core, and runs the owner-thread tick loop until cancelled.

use std::path::Path;

use tracing::{error, info};

use stratum::{print_usage, CliError, CliOptions, Server, ServerConfig};

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match CliOptions::parse(&args) {
        Ok(options) => options,
        Err(CliError::HelpRequested) => {
            print_usage();
            return 1;
        }
        Err(err) => {
            eprintln!("ERROR: {err}");
            print_usage();
            return 1;
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_target(false)
        .init();

    let mut config = match ServerConfig::load_near(Path::new(&options.module_path)) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration is unreadable");
            return 1;
        }
    };
    config.apply_cli(&options);

    info!(module_path = %options.module_path, "stratum server");

    let mut server = match Server::new(config) {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "server startup failed");
            return 1;
        }
    };

    // First SIGINT requests a clean stop through the cancellation flag the
    // tick loop watches; a second one terminates immediately, standing in
    // for restored default handling.
    let shutdown = server.shutdown_flag();
    let hooked = ctrlc::set_handler(move || {
        if shutdown.is_requested() {
            std::process::exit(130);
        }
        shutdown.request();
    });
    if hooked.is_err() {
        error!("could not install the interrupt handler");
        return 1;
    }

    server.bootstrap();
    server.run();
    server.shutdown();
    info!("clean exit");
    0
}
