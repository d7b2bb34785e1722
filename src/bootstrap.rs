//! # Process Bootstrap
//!
//! Turns one invocation of the binary into a running group. Three entry
//! points, one per execution shape:
//!
//! - [`run_member`]: a single rank. Spawned by the launcher with a hidden
//!   `--internal-rank` flag, it validates the configuration, wires itself
//!   into the TCP mesh and drives the patterns.
//! - [`run_local_group`]: the whole group inside this process, one tokio
//!   task per rank over in-process channels. Useful for smoke runs on a
//!   single machine with no ports involved.
//! - [`run_launcher`]: spawns `group_size` member processes of this same
//!   binary and waits for all of them, failing if any member fails.
//!
//! Failure reporting is deliberately split: members print their own
//! failures (subject to [`HarnessError::reported_by`]), the launcher only
//! reports spawn trouble and the per-member exit summary.

use crate::benchmark::{self, BenchmarkConfig, HarnessError};
use crate::topology::{GroupIdentity, Rank, REPORTING_RANK};
use crate::transport::channel::ChannelFabric;
use crate::transport::tcp::{self, TcpFabricConfig};
use crate::transport::GroupTransport;
use crate::utils;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

/// Name of the binary the launcher re-executes for member processes.
const BIN_NAME: &str = "group-comm-benchmark";

/// Print a failure from the process that owns it.
fn report(identity: GroupIdentity, err: &HarnessError) {
    if err.reported_by(identity) {
        error!("{} failed: {}", identity, err);
    }
}

/// Run the configured patterns over a wired transport, then close it.
///
/// The close runs even when a pattern failed, and a close failure on an
/// otherwise clean run still fails the member.
async fn drive_wired<T>(
    config: &BenchmarkConfig,
    role: Rank,
    transport: &mut T,
) -> Result<(), HarnessError>
where
    T: GroupTransport,
{
    let identity = transport.identity();
    let outcome = benchmark::run_patterns(config, identity, role, &mut *transport, None).await;
    let closed = transport.close().await.map_err(HarnessError::from);
    let result = outcome.and(closed);
    match &result {
        Ok(()) => {
            if identity.is_reporter() {
                info!("All patterns completed");
            }
        }
        Err(err) => report(identity, err),
    }
    result
}

/// Run a single member of a TCP mesh group.
///
/// Validation happens before any connection attempt: an invalid
/// configuration exits without ever touching the network, and every member
/// reaches the same verdict on its own.
pub async fn run_member(rank: u32, config: &BenchmarkConfig) -> Result<(), HarnessError> {
    let identity = match GroupIdentity::new(rank, config.group_size) {
        Ok(identity) => identity,
        Err(err) => {
            // No valid identity to gate the report on; always explain.
            error!("Invalid member identity: {}", err);
            return Err(err.into());
        }
    };
    let role = match benchmark::validate(config, identity) {
        Ok(role) => role,
        Err(err) => {
            let err = HarnessError::from(err);
            report(identity, &err);
            return Err(err);
        }
    };
    if identity.is_reporter() {
        info!("{}", config.describe(role));
    }

    let fabric = TcpFabricConfig::new(&config.host, config.port, config.plan.capacity);
    let mut transport = match tcp::wire(identity, &fabric).await {
        Ok(transport) => transport,
        Err(err) => {
            let err = HarnessError::from(err);
            report(identity, &err);
            return Err(err);
        }
    };
    drive_wired(config, role, &mut transport).await
}

/// Run the whole group as tasks inside this process.
///
/// The configuration is validated once up front; its verdict is the same
/// for every rank, so an invalid run stops before a single channel or
/// buffer exists. A panicking member task turns into
/// [`HarnessError::MemberAborted`] and the first failure in rank order is
/// the one returned.
pub async fn run_local_group(config: &BenchmarkConfig) -> Result<(), HarnessError> {
    let supervisor = match GroupIdentity::new(REPORTING_RANK, config.group_size) {
        Ok(identity) => identity,
        Err(err) => {
            error!("Invalid group configuration: {}", err);
            return Err(err.into());
        }
    };
    let role = match benchmark::validate(config, supervisor) {
        Ok(role) => role,
        Err(err) => {
            let err = HarnessError::from(err);
            report(supervisor, &err);
            return Err(err);
        }
    };
    warn_oversubscribed(config.group_size);
    info!("{}", config.describe(role));

    let endpoints = ChannelFabric::build(config.group_size)?;
    let mut members = Vec::with_capacity(endpoints.len());
    for mut transport in endpoints {
        let config = config.clone();
        members.push(tokio::spawn(async move {
            drive_wired(&config, role, &mut transport).await
        }));
    }

    let mut failure = None;
    for (rank, member) in members.into_iter().enumerate() {
        let outcome = match member.await {
            Ok(outcome) => outcome,
            Err(_) => {
                let err = HarnessError::MemberAborted { rank: rank as u32 };
                error!("{}", err);
                Err(err)
            }
        };
        if let Err(err) = outcome {
            failure.get_or_insert(err);
        }
    }
    match failure {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// Spawn one process per rank and wait for the whole group.
///
/// Members inherit stdout and stderr, so their logs and failure reports
/// land in the launcher's output directly. The launcher itself only fails
/// the run; it never restarts or times out members.
pub async fn run_launcher(config: &BenchmarkConfig) -> Result<()> {
    warn_oversubscribed(config.group_size);
    let executable = member_executable()?;
    info!(
        "Launching {} member processes on {} ports starting at {}",
        config.group_size, config.host, config.port
    );

    let mut children: Vec<Child> = Vec::with_capacity(config.group_size as usize);
    for rank in 0..config.group_size {
        match spawn_member(&executable, config, rank) {
            Ok(child) => children.push(child),
            Err(err) => {
                for mut child in children {
                    let _ = child.start_kill();
                }
                return Err(err).with_context(|| format!("failed to spawn member {}", rank));
            }
        }
    }

    let mut failures = 0u32;
    for (rank, mut child) in children.into_iter().enumerate() {
        let status = child
            .wait()
            .await
            .with_context(|| format!("failed to wait for member {}", rank))?;
        if status.success() {
            debug!("Member {} exited cleanly", rank);
        } else {
            warn!("Member {} exited with {}", rank, status);
            failures += 1;
        }
    }
    if failures > 0 {
        bail!(
            "{} of {} members exited with failure",
            failures,
            config.group_size
        );
    }
    info!("All {} members completed", config.group_size);
    Ok(())
}

/// Locate the binary to re-execute for members.
///
/// Refuses to spawn anything that is not this benchmark binary; in
/// particular a test harness hosting this code must not fork itself.
fn member_executable() -> Result<PathBuf> {
    let executable =
        std::env::current_exe().context("failed to locate the current executable")?;
    let stem = executable.file_stem().and_then(|s| s.to_str());
    if stem != Some(BIN_NAME) {
        bail!(
            "member processes can only be spawned from the {} binary (running as {})",
            BIN_NAME,
            executable.display()
        );
    }
    Ok(executable)
}

/// The full argument vector for one member process.
fn member_args(config: &BenchmarkConfig, rank: u32) -> Vec<String> {
    let mut args = vec![
        "--internal-rank".to_string(),
        rank.to_string(),
        "--group-size".to_string(),
        config.group_size.to_string(),
        "--fabric".to_string(),
        "tcp".to_string(),
        "--patterns".to_string(),
    ];
    args.extend(config.patterns.iter().map(|p| p.label().to_string()));
    args.extend([
        "--message-size".to_string(),
        config.plan.active_size.to_string(),
        "--capacity".to_string(),
        config.plan.capacity.to_string(),
        "--iterations".to_string(),
        config.iterations.to_string(),
        "--host".to_string(),
        config.host.clone(),
        "--port".to_string(),
        config.port.to_string(),
    ]);
    if config.verbose {
        args.push("--verbose".to_string());
    }
    args.push("--".to_string());
    args.push(config.role.to_string());
    args
}

fn spawn_member(executable: &Path, config: &BenchmarkConfig, rank: u32) -> std::io::Result<Child> {
    Command::new(executable)
        .args(member_args(config, rank))
        .stdin(Stdio::null())
        .spawn()
}

fn warn_oversubscribed(group_size: u32) {
    let cores = utils::get_cpu_cores();
    if group_size as usize > cores {
        warn!(
            "Group size {} exceeds the {} available CPU cores; members will time-share",
            group_size, cores
        );
    }
}
