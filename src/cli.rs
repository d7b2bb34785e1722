use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Group communication benchmark - measures collective messaging patterns
/// across a fixed process group
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Distinguished role: hub for ping-pong, root for broadcast, scatter
    /// and reduce (all-to-all has none)
    #[clap(
        value_name = "ROLE",
        default_value_t = crate::defaults::ROLE,
        allow_negative_numbers = true
    )]
    pub role: i64,

    /// Patterns to run (space-separated: ping-pong, broadcast, scatter,
    /// reduce, all-to-all, or all)
    #[clap(short = 'p', long, value_enum, default_values_t = vec![PatternKind::PingPong], num_args = 1..)]
    pub patterns: Vec<PatternKind>,

    /// Bytes transmitted per operation
    #[clap(short = 's', long, default_value_t = crate::defaults::MESSAGE_SIZE)]
    pub message_size: usize,

    /// Number of iterations to run per pattern
    #[clap(short = 'i', long, default_value_t = crate::defaults::ITERATIONS)]
    pub iterations: usize,

    /// Buffer capacity in bytes; buffers are allocated at this size no
    /// matter what the message size is
    #[clap(long, default_value_t = crate::defaults::CAPACITY)]
    pub capacity: usize,

    /// Number of processes in the group
    #[clap(short = 'n', long, default_value_t = crate::defaults::GROUP_SIZE)]
    pub group_size: u32,

    /// How the group members are connected
    #[clap(short = 'f', long, value_enum, default_value_t = FabricKind::Tcp)]
    pub fabric: FabricKind,

    /// Host address the TCP mesh binds and dials on
    #[clap(long, default_value = crate::defaults::HOST)]
    pub host: String,

    /// Base TCP port; rank r listens on port + r
    #[clap(long, default_value_t = crate::defaults::PORT)]
    pub port: u16,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Rank assigned to a spawned member process (set by the launcher)
    #[clap(long, hide = true)]
    pub internal_rank: Option<u32>,
}

/// Available communication patterns
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum PatternKind {
    /// Hub sends to and receives from every peer in turn
    #[clap(name = "ping-pong")]
    PingPong,

    /// Root distributes one message to every member
    #[clap(name = "broadcast")]
    Broadcast,

    /// Root distributes a distinct segment to every member
    #[clap(name = "scatter")]
    Scatter,

    /// Every member contributes elements summed at the root
    #[clap(name = "reduce")]
    Reduce,

    /// Every member exchanges a distinct segment with every member
    #[clap(name = "all-to-all")]
    AllToAll,

    /// All available patterns
    #[clap(name = "all")]
    All,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::PingPong => write!(f, "Ping-Pong"),
            PatternKind::Broadcast => write!(f, "Broadcast"),
            PatternKind::Scatter => write!(f, "Scatter"),
            PatternKind::Reduce => write!(f, "Reduce"),
            PatternKind::AllToAll => write!(f, "All-to-All"),
            PatternKind::All => write!(f, "All Patterns"),
        }
    }
}

impl PatternKind {
    /// Expand the "All" variant to all available patterns
    pub fn expand_all(patterns: Vec<PatternKind>) -> Vec<PatternKind> {
        if patterns.contains(&PatternKind::All) {
            vec![
                PatternKind::PingPong,
                PatternKind::Broadcast,
                PatternKind::Scatter,
                PatternKind::Reduce,
                PatternKind::AllToAll,
            ]
        } else {
            patterns
        }
    }

    /// Smallest group the pattern can run on. Ping-pong needs a peer for
    /// the hub; the collectives degenerate gracefully to one member.
    pub fn min_group_size(&self) -> u32 {
        match self {
            PatternKind::PingPong | PatternKind::All => 2,
            _ => 1,
        }
    }

    /// The name used on the command line and in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::PingPong => "ping-pong",
            PatternKind::Broadcast => "broadcast",
            PatternKind::Scatter => "scatter",
            PatternKind::Reduce => "reduce",
            PatternKind::AllToAll => "all-to-all",
            PatternKind::All => "all",
        }
    }
}

/// Available group fabrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum FabricKind {
    /// Every rank a task inside one process, wired over channels
    #[clap(name = "local")]
    Local,

    /// One process per rank, wired over a TCP mesh
    #[clap(name = "tcp")]
    Tcp,
}

impl std::fmt::Display for FabricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FabricKind::Local => write!(f, "In-Process Channels"),
            FabricKind::Tcp => write!(f, "TCP Mesh"),
        }
    }
}

impl FabricKind {
    /// The name used on the command line.
    pub fn label(&self) -> &'static str {
        match self {
            FabricKind::Local => "local",
            FabricKind::Tcp => "tcp",
        }
    }
}
