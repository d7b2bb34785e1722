//! # Benchmark Driver
//!
//! Composes the other layers in a fixed order: validate the topology, build
//! each selected pattern's buffers, drive the pattern for the full iteration
//! budget, release everything. Two rules shape the code:
//!
//! - **Validation before resources.** [`validate`] runs before a single
//!   buffer is allocated or connection attempted. Every member evaluates the
//!   same deterministic checks on the same configuration, so an invalid run
//!   dies identically everywhere with no cross-process error signalling,
//!   and only the reporting rank prints the diagnostic.
//! - **One pattern at a time.** Each pattern gets freshly allocated buffers
//!   and releases them before the next pattern starts, on success and error
//!   paths alike.

use crate::cli::{Args, FabricKind, PatternKind};
use crate::patterns::{build_pattern, RunSpec};
use crate::payload::{AllocationError, BufferPlan, ReleaseProbe};
use crate::topology::{self, GroupIdentity, Rank, TopologyError};
use crate::transport::{GroupTransport, TransportError};
use crate::utils;
use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration for one benchmark run.
///
/// Built once from the command line and shared verbatim by every member of
/// the group; nothing in here is negotiated between processes.
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    /// The patterns to run, in order. Never contains [`PatternKind::All`];
    /// expansion happens when the configuration is built.
    pub patterns: Vec<PatternKind>,

    /// Requested distinguished role, still signed: range-checking it against
    /// the group size is [`validate`]'s job, per member.
    pub role: i64,

    /// Buffer sizing shared by every pattern.
    pub plan: BufferPlan,

    /// Iterations per pattern.
    pub iterations: usize,

    /// Number of processes in the group.
    pub group_size: u32,

    /// How the members are connected.
    pub fabric: FabricKind,

    /// TCP mesh host.
    pub host: String,

    /// TCP mesh base port.
    pub port: u16,

    /// Propagated to spawned members so their log filters match.
    pub verbose: bool,
}

impl BenchmarkConfig {
    /// Build a configuration from parsed arguments, validating every
    /// size-type parameter.
    ///
    /// The role is deliberately not checked here: its validity depends on
    /// the group size and is a per-member, reporter-printed check.
    pub fn from_args(args: &Args) -> Result<Self> {
        utils::validate_capacity(args.capacity)?;
        utils::validate_message_size(args.message_size, args.capacity)?;
        utils::validate_iterations(args.iterations)?;
        utils::validate_group_size(args.group_size)?;
        if args.fabric == FabricKind::Tcp {
            utils::validate_port(args.port, args.group_size)?;
        }
        Ok(Self {
            patterns: PatternKind::expand_all(args.patterns.clone()),
            role: args.role,
            plan: BufferPlan {
                capacity: args.capacity,
                active_size: args.message_size,
            },
            iterations: args.iterations,
            group_size: args.group_size,
            fabric: args.fabric,
            host: args.host.clone(),
            port: args.port,
            verbose: args.verbose,
        })
    }

    /// Display block for the run, logged once by the reporting rank.
    pub fn describe(&self, role: Rank) -> ConfigDisplay<'_> {
        ConfigDisplay { config: self, role }
    }
}

/// Human-readable banner for a validated configuration.
pub struct ConfigDisplay<'a> {
    config: &'a BenchmarkConfig,
    role: Rank,
}

impl<'a> std::fmt::Display for ConfigDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let patterns = self
            .config
            .patterns
            .iter()
            .map(|p| p.label())
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            f,
            "-----------------------------------------------------------------"
        )?;
        writeln!(f, "Starting group communication benchmark")?;
        writeln!(f, "  Patterns:       {}", patterns)?;
        writeln!(f, "  Group Size:     {} processes", self.config.group_size)?;
        writeln!(f, "  Role:           rank {}", self.role)?;
        writeln!(
            f,
            "  Message Size:   {} bytes",
            self.config.plan.active_size
        )?;
        writeln!(
            f,
            "  Capacity:       {} per buffer segment",
            utils::format_bytes(self.config.plan.capacity)
        )?;
        writeln!(f, "  Iterations:     {}", self.config.iterations)?;
        if self.config.patterns.contains(&PatternKind::Reduce) {
            writeln!(
                f,
                "  Reduce Elements: {}",
                self.config.plan.element_count()
            )?;
        }
        match self.config.fabric {
            FabricKind::Local => writeln!(f, "  Fabric:         in-process channels")?,
            FabricKind::Tcp => writeln!(
                f,
                "  Fabric:         TCP mesh on {}, ports {}..={}",
                self.config.host,
                self.config.port,
                u32::from(self.config.port) + self.config.group_size - 1
            )?,
        }
        write!(
            f,
            "-----------------------------------------------------------------"
        )
    }
}

/// One member's failure, mapped to exit code 1 by the binary.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A member task stopped without reporting an outcome (local fabric).
    #[error("member task for rank {rank} aborted")]
    MemberAborted { rank: Rank },
}

impl HarnessError {
    /// Whether this process is the one that prints the failure.
    ///
    /// Configuration errors are computed identically by every member, so
    /// only the reporting rank prints them. Allocation and transport
    /// failures are local facts; the failing process reports them, whoever
    /// it is.
    pub fn reported_by(&self, identity: GroupIdentity) -> bool {
        match self {
            HarnessError::Topology(_) => identity.is_reporter(),
            _ => true,
        }
    }
}

/// Validate the whole selection before any resource is touched.
///
/// Checks the role against the group size, then every selected pattern's
/// minimum group size, and returns the validated role rank. Deterministic:
/// every member reaches the same verdict independently.
pub fn validate(config: &BenchmarkConfig, identity: GroupIdentity) -> Result<Rank, TopologyError> {
    let role = topology::validate_role(config.role, identity.size())?;
    for kind in &config.patterns {
        topology::validate_group_size(kind.label(), kind.min_group_size(), identity.size())?;
    }
    Ok(role)
}

/// Drive every configured pattern over an already wired transport.
///
/// Patterns run strictly in sequence. Each gets fresh buffers from
/// [`build_pattern`] and releases them when its executor drops, before the
/// next pattern allocates. The optional probe is threaded into every buffer
/// for release accounting in tests.
pub async fn run_patterns(
    config: &BenchmarkConfig,
    identity: GroupIdentity,
    role: Rank,
    transport: &mut dyn GroupTransport,
    probe: Option<&ReleaseProbe>,
) -> Result<(), HarnessError> {
    let spec = RunSpec {
        iterations: config.iterations,
        message_size: config.plan.active_size,
        role,
    };
    for kind in &config.patterns {
        if identity.is_reporter() {
            info!(
                "Running the {} pattern: {} iterations of {} bytes",
                kind, spec.iterations, spec.message_size
            );
        }
        let mut pattern = build_pattern(*kind, identity, config.plan, role, probe)?;
        pattern.run(transport, &spec).await?;
        debug!(
            rank = identity.rank(),
            pattern = kind.label(),
            "pattern completed"
        );
    }
    Ok(())
}
