//! # Group Communication Benchmark - Main Entry Point
//!
//! One binary, three roles, selected from the parsed arguments:
//!
//! 1. **Launcher** (default, TCP fabric): spawns one member process per rank
//!    and waits for the whole group.
//! 2. **Member** (hidden `--internal-rank` flag): one rank of the TCP mesh,
//!    spawned by the launcher.
//! 3. **Local group** (`--fabric local`): the whole group as tasks inside
//!    this process, no ports involved.
//!
//! ## Exit Codes
//!
//! - `0` — all configured patterns completed on this process
//! - `1` — configuration rejected (invalid role, group below a pattern's
//!   minimum, inconsistent sizes), allocation failure, or a transport fault
//!
//! Validation failures are deterministic and identical on every member, so
//! only the reporting rank prints the diagnostic while every process exits 1
//! on its own.

use clap::Parser;
use group_comm_benchmark::{
    benchmark::BenchmarkConfig,
    bootstrap,
    cli::{Args, FabricKind},
    logging,
};
use std::process::ExitCode;
use tracing::error;

/// Main application entry point
///
/// Initializes logging with a rank-attributed label, parses the command
/// line, builds the run configuration and dispatches to the launcher,
/// member, or local-group entry point. All failure paths collapse to exit
/// code 1; diagnostics have already been printed by whoever owns them.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // The label prefixes every log line, keeping the interleaved output of
    // a whole group attributable when members inherit the launcher's stderr.
    let label = match args.internal_rank {
        Some(rank) => format!("rank {}", rank),
        None => match args.fabric {
            FabricKind::Local => "local".to_string(),
            FabricKind::Tcp => "launcher".to_string(),
        },
    };
    logging::init(&label, args.verbose);

    let config = match BenchmarkConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            // Size-type parameter errors are printed unconditionally: a
            // member only ever receives arguments the launcher already
            // validated, so this path fires once per run in practice.
            error!("Invalid configuration: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match (args.internal_rank, config.fabric) {
        (Some(rank), _) => bootstrap::run_member(rank, &config)
            .await
            .map_err(|_| ()),
        (None, FabricKind::Local) => bootstrap::run_local_group(&config)
            .await
            .map_err(|_| ()),
        (None, FabricKind::Tcp) => bootstrap::run_launcher(&config).await.map_err(|err| {
            error!("Benchmark run failed: {:#}", err);
        }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}
