use anyhow::Result;
use group_comm_benchmark::benchmark::{self, BenchmarkConfig};
use group_comm_benchmark::cli::{FabricKind, PatternKind};
use group_comm_benchmark::patterns::{Broadcast, CommPattern, RunSpec, Scatter};
use group_comm_benchmark::payload::{segment_byte, uniform_byte, BufferPlan};
use group_comm_benchmark::topology::GroupIdentity;
use group_comm_benchmark::transport::tcp::{self, TcpFabricConfig};
use group_comm_benchmark::GroupTransport;
use std::time::Duration;

fn mesh_config(port: u16, capacity: usize) -> TcpFabricConfig {
    let mut config = TcpFabricConfig::new("127.0.0.1", port, capacity);
    config.rendezvous_timeout = Duration::from_secs(10);
    config
}

fn run_config(patterns: Vec<PatternKind>, group_size: u32, port: u16) -> BenchmarkConfig {
    BenchmarkConfig {
        patterns,
        role: 0,
        plan: BufferPlan {
            capacity: 2048,
            active_size: 512,
        },
        iterations: 10,
        group_size,
        fabric: FabricKind::Tcp,
        host: "127.0.0.1".to_string(),
        port,
        verbose: false,
    }
}

/// Drive the configured patterns on every rank of a TCP mesh, with each
/// rank running as a task inside this test process.
async fn run_mesh(config: BenchmarkConfig) -> Result<()> {
    let mut members = Vec::new();
    for rank in 0..config.group_size {
        let config = config.clone();
        members.push(tokio::spawn(async move {
            let identity = GroupIdentity::new(rank, config.group_size)?;
            let role = benchmark::validate(&config, identity)?;
            let fabric = mesh_config(config.port, config.plan.capacity);
            let mut transport = tcp::wire(identity, &fabric).await?;
            benchmark::run_patterns(&config, identity, role, &mut transport, None).await?;
            transport.close().await?;
            Ok::<(), anyhow::Error>(())
        }));
    }
    for member in members {
        member.await??;
    }
    Ok(())
}

/// The rooted collectives complete over a three-rank TCP mesh.
#[tokio::test]
async fn collectives_complete_over_a_three_rank_mesh() -> Result<()> {
    run_mesh(run_config(
        vec![
            PatternKind::Broadcast,
            PatternKind::Scatter,
            PatternKind::Reduce,
        ],
        3,
        21800,
    ))
    .await
}

/// Ping-pong and all-to-all complete over a TCP mesh pair.
#[tokio::test]
async fn point_to_point_patterns_complete_over_a_mesh_pair() -> Result<()> {
    run_mesh(run_config(
        vec![PatternKind::PingPong, PatternKind::AllToAll],
        2,
        21810,
    ))
    .await
}

/// The TCP mesh delivers the same bytes the in-process fabric does: scatter
/// with one-byte messages hands rank `i` exactly the byte of root segment
/// `i`, and a broadcast from a non-default root overwrites every window with
/// the root's uniform fill.
#[tokio::test]
async fn the_mesh_delivers_the_same_bytes_as_the_channel_fabric() -> Result<()> {
    const SIZE: u32 = 3;
    let plan = BufferPlan {
        capacity: 64,
        active_size: 1,
    };
    let mut members = Vec::new();
    for rank in 0..SIZE {
        members.push(tokio::spawn(async move {
            let identity = GroupIdentity::new(rank, SIZE)?;
            let mut transport = tcp::wire(identity, &mesh_config(21830, plan.capacity)).await?;

            let mut scatter = Scatter::prepare(identity, plan, 0, None)?;
            let spec = RunSpec {
                iterations: 5,
                message_size: 1,
                role: 0,
            };
            scatter.run(&mut transport, &spec).await?;

            let mut broadcast = Broadcast::prepare(identity, plan, None)?;
            let spec = RunSpec {
                iterations: 5,
                message_size: 16,
                role: 2,
            };
            broadcast.run(&mut transport, &spec).await?;
            transport.close().await?;

            let scattered = scatter.received().window(1)[0];
            let broadcasted = broadcast.payload().window(16).to_vec();
            Ok::<_, anyhow::Error>((rank, scattered, broadcasted))
        }));
    }
    for member in members {
        let (rank, scattered, broadcasted) = member.await??;
        assert_eq!(scattered, segment_byte(0, rank));
        assert_eq!(broadcasted, vec![uniform_byte(2); 16]);
    }
    Ok(())
}

/// A single-member mesh needs no ports at all: the collectives degenerate
/// to local copies.
#[tokio::test]
async fn a_single_member_mesh_runs_without_sockets() -> Result<()> {
    run_mesh(run_config(
        vec![
            PatternKind::Broadcast,
            PatternKind::Scatter,
            PatternKind::Reduce,
            PatternKind::AllToAll,
        ],
        1,
        21820,
    ))
    .await
}
