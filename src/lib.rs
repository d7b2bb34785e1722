//! # Group Communication Benchmark Library
//!
//! A micro-benchmark harness for group communication primitives implemented in Rust.
//! This library measures point-to-point exchange, broadcast, scatter, reduce and
//! all-to-all patterns across a fixed group of cooperating processes.
//!
//! ## Supported Patterns
//!
//! The library drives the following communication patterns:
//!
//! - **Ping-Pong**: a hub exchanges a blocking send/receive pair with every peer in turn
//! - **Broadcast**: a configurable root distributes one message to every member
//! - **Scatter**: the root distributes a distinct per-destination segment to every member
//! - **Reduce**: every member contributes numeric elements summed into the root's buffer
//! - **All-to-All**: every member exchanges a distinct segment with every member
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `benchmark`: the driver composing validation, buffers and pattern execution
//! - `bootstrap`: launcher, member and local-group entry points
//! - `cli`: command-line interface parsing and configuration management
//! - `patterns`: the five pattern executors behind a common trait
//! - `payload`: deterministic fixed-capacity buffer management
//! - `topology`: group identity and role validation
//! - `transport`: the group transport abstraction and its two fabrics
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use group_comm_benchmark::{bootstrap, BenchmarkConfig};
//! use group_comm_benchmark::cli::Args;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = Args::parse_from(["bench", "--fabric", "local", "-p", "broadcast", "-n", "2"]);
//!     let config = BenchmarkConfig::from_args(&args)?;
//!     bootstrap::run_local_group(&config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Execution Model
//!
//! One process (or, on the local fabric, one task) per group member; within a
//! member every communication call is blocking and strictly sequential.
//! Collectives synchronize the whole group each iteration; point-to-point
//! steps synchronize only the pair involved. A stuck member stalls the whole
//! group — the harness adds no timeout or recovery layer on top of the
//! transport.

/// Benchmark driver
///
/// Contains the `BenchmarkConfig` and `HarnessError` types and the run logic
/// that composes the other layers in a fixed order:
/// - Deterministic per-member validation before any resource is touched
/// - Buffer allocation and release per pattern, on every exit path
/// - Strictly sequential pattern execution over a wired transport
pub mod benchmark;

/// Process bootstrap
///
/// Turns one invocation of the binary into a running group. Provides the
/// launcher (spawn one process per rank), the member entry point (one rank of
/// a TCP mesh) and the local group (every rank a task in this process).
pub mod bootstrap;

/// Command-line interface and configuration
///
/// Provides argument parsing using clap and the pattern/fabric enumerations.
/// Includes:
/// - The positional distinguished-role argument (signed, range-checked later)
/// - Pattern selection with "all" expansion capability
/// - Sizing, topology and fabric flags shared by launcher and members
pub mod cli;

/// Rank-attributed log formatting
pub mod logging;

/// Communication pattern executors
///
/// The five benchmark patterns behind the common `CommPattern` trait, plus
/// the factory that allocates and fills each pattern's buffers. Each executor
/// owns its role logic: which rank is the hub or root, which buffers exist
/// only on that rank, and what every iteration transmits.
pub mod patterns;

/// Payload buffer management
///
/// Fixed-capacity, exclusively-owned byte and element buffers with
/// deterministic rank-dependent fills, fallible allocation and
/// release-exactly-once semantics.
pub mod payload;

/// Group topology
///
/// The immutable `GroupIdentity` context value threaded through every
/// component, and the local deterministic validation of roles and group
/// sizes.
pub mod topology;

/// Group communication transports
///
/// Contains the `GroupTransport` trait and the two fabrics implementing it:
/// in-process channels and a TCP mesh. The collective algorithms (linear
/// fan-out and accumulation) live here, not in the patterns.
pub mod transport;

/// Input validation and display helpers
pub mod utils;

// Re-export key types for convenient library usage
// These are the primary types that library users will interact with

/// Benchmark configuration and failure taxonomy
///
/// Re-exported from the benchmark module for easy access. `BenchmarkConfig`
/// is built once from the command line and shared verbatim by every member.
pub use benchmark::{BenchmarkConfig, HarnessError};

/// Command-line interface types
///
/// Re-exported for applications that want to use the same CLI parsing logic
/// or need the pattern and fabric enumerations for programmatic usage.
pub use cli::{Args, FabricKind, PatternKind};

/// Group identity
///
/// The (rank, size) pair assigned once at process start and read by every
/// component.
pub use topology::{GroupIdentity, Rank};

/// Core transport abstractions
///
/// The `GroupTransport` trait and the reduce combinator are the building
/// blocks for wiring new fabrics under the existing patterns.
pub use transport::{GroupTransport, ReduceOp};

/// The current version of the benchmark harness
///
/// This version string is automatically populated from Cargo.toml and used
/// in diagnostics for reproducibility.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// This module provides the reference parameters of the benchmark family.
/// Every value can be overridden on the command line; the defaults reproduce
/// the canonical run shape.
pub mod defaults {
    use std::time::Duration;

    /// Default distinguished role
    ///
    /// Rank 0 is the hub of the ping-pong exchange and the root of the
    /// rooted collectives unless the positional argument overrides it.
    pub const ROLE: i64 = 0;

    /// Default message size in bytes
    ///
    /// 1KB is the reference per-iteration transfer: small enough to test
    /// latency-bound behavior, large enough for the per-destination fill
    /// patterns to be observable.
    pub const MESSAGE_SIZE: usize = 1024;

    /// Default number of iterations per pattern
    ///
    /// 100 iterations is the fixed budget of the benchmark family; the
    /// count is never adjusted at run time, not even on error paths.
    pub const ITERATIONS: usize = 100;

    /// Default buffer capacity in bytes
    ///
    /// Buffers are allocated at 1 MiB — the largest message size the
    /// family supports — regardless of the active message size, so sweeps
    /// over sizes exercise an identical memory layout.
    pub const CAPACITY: usize = 1024 * 1024;

    /// Default group size
    ///
    /// Four members give every pattern a non-trivial shape (a hub with
    /// three peers, collectives with real fan-out) while fitting on a
    /// typical development machine.
    pub const GROUP_SIZE: u32 = 4;

    /// Default TCP mesh host
    ///
    /// The mesh binds and dials loopback unless told otherwise; remote
    /// meshes supply their interface address explicitly.
    pub const HOST: &str = "127.0.0.1";

    /// Default base TCP port
    ///
    /// Rank `r` listens on `PORT + r`, so a group of N members occupies N
    /// consecutive ports starting here.
    pub const PORT: u16 = 7800;

    /// Kernel socket buffer size for TCP mesh streams
    ///
    /// 64KB keeps a full default-capacity frame from stalling a writer
    /// mid-iteration on loopback.
    pub const SOCKET_BUFFER: usize = 64 * 1024;

    /// How long a member keeps trying to wire the mesh
    ///
    /// Members may start in any order, so dials are retried until the
    /// peer's listener comes up. Thirty seconds comfortably covers a
    /// whole group starting under load; once the mesh is wired no
    /// communication call has any deadline.
    pub const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);

    /// Pause between dial attempts during rendezvous
    pub const DIAL_RETRY_DELAY: Duration = Duration::from_millis(50);
}
