//! Group topology: process identity and role validation.
//!
//! Every component receives the process's place in the group as an explicit
//! [`GroupIdentity`] value rather than reading ambient global state. Validation
//! is purely local and deterministic: every member evaluates the same inputs
//! (the launch configuration) and reaches the same verdict, so an invalid
//! configuration aborts the whole group without any cross-process signaling.

use std::fmt;
use thiserror::Error;

/// Index of a process within the group.
pub type Rank = u32;

/// The rank that emits group-wide configuration diagnostics.
///
/// Configuration errors are detected by every member independently; only this
/// rank prints the diagnostic so the output is not repeated `size` times.
pub const REPORTING_RANK: Rank = 0;

/// Immutable identity of one process within a fixed group.
///
/// Assigned once at process start from the launch parameters and never
/// mutated. The pair is the only group state the harness needs: `rank` in
/// `0..size`, `size ≥ 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupIdentity {
    rank: Rank,
    size: u32,
}

impl GroupIdentity {
    /// Create an identity, rejecting inconsistent pairs.
    pub fn new(rank: Rank, size: u32) -> Result<Self, TopologyError> {
        if size == 0 {
            return Err(TopologyError::EmptyGroup);
        }
        if rank >= size {
            return Err(TopologyError::RankOutOfRange { rank, size });
        }
        Ok(Self { rank, size })
    }

    /// This process's index within the group.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Total number of processes in the group.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Whether this process plays the given distinguished role.
    pub fn is(&self, role: Rank) -> bool {
        self.rank == role
    }

    /// Whether this process is the one that reports configuration errors.
    pub fn is_reporter(&self) -> bool {
        self.rank == REPORTING_RANK
    }

    /// All ranks except this process's own, in ascending order.
    pub fn peers(&self) -> impl Iterator<Item = Rank> + '_ {
        let own = self.rank;
        (0..self.size).filter(move |&r| r != own)
    }
}

impl fmt::Display for GroupIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank {}/{}", self.rank, self.size)
    }
}

/// Topology configuration errors.
///
/// All variants are fatal: the harness exits with code 1 before issuing any
/// communication call. The messages carry the offending value and the valid
/// range so the single reported diagnostic is actionable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The requested role index does not name a member of the group.
    #[error("role {role} is invalid; it must be between 0 and {}", size - 1)]
    RoleOutOfRange { role: i64, size: u32 },

    /// The group is smaller than the pattern's minimum.
    #[error("the {pattern} pattern requires at least {required} processes, but the group has {size}")]
    GroupTooSmall {
        pattern: &'static str,
        required: u32,
        size: u32,
    },

    /// A rank outside `0..size` was supplied for a member identity.
    #[error("rank {rank} is outside a group of {size} processes")]
    RankOutOfRange { rank: Rank, size: u32 },

    /// A group of zero processes cannot run anything.
    #[error("group size must be at least 1")]
    EmptyGroup,
}

/// Validate a requested distinguished-role index against the group size.
///
/// The role arrives as a signed integer straight from the command line so
/// that negative input reaches this check instead of failing to parse;
/// valid roles are `0 ≤ role < size`.
pub fn validate_role(role: i64, size: u32) -> Result<Rank, TopologyError> {
    if role < 0 || role >= i64::from(size) {
        return Err(TopologyError::RoleOutOfRange { role, size });
    }
    Ok(role as Rank)
}

/// Validate that the group meets a pattern's minimum size.
pub fn validate_group_size(
    pattern: &'static str,
    required: u32,
    size: u32,
) -> Result<(), TopologyError> {
    if size < required {
        return Err(TopologyError::GroupTooSmall {
            pattern,
            required,
            size,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accepts_every_member_rank() {
        for rank in 0..4 {
            let id = GroupIdentity::new(rank, 4).unwrap();
            assert_eq!(id.rank(), rank);
            assert_eq!(id.size(), 4);
        }
    }

    #[test]
    fn identity_rejects_rank_at_or_past_size() {
        assert!(matches!(
            GroupIdentity::new(4, 4),
            Err(TopologyError::RankOutOfRange { rank: 4, size: 4 })
        ));
        assert!(matches!(
            GroupIdentity::new(0, 0),
            Err(TopologyError::EmptyGroup)
        ));
    }

    #[test]
    fn peers_skip_own_rank_in_ascending_order() {
        let id = GroupIdentity::new(2, 5).unwrap();
        let peers: Vec<Rank> = id.peers().collect();
        assert_eq!(peers, vec![0, 1, 3, 4]);
    }

    #[test]
    fn only_rank_zero_reports() {
        assert!(GroupIdentity::new(0, 3).unwrap().is_reporter());
        assert!(!GroupIdentity::new(1, 3).unwrap().is_reporter());
        assert!(!GroupIdentity::new(2, 3).unwrap().is_reporter());
    }

    #[test]
    fn role_bounds_are_half_open() {
        assert_eq!(validate_role(0, 4).unwrap(), 0);
        assert_eq!(validate_role(3, 4).unwrap(), 3);
        assert!(matches!(
            validate_role(4, 4),
            Err(TopologyError::RoleOutOfRange { role: 4, size: 4 })
        ));
        assert!(matches!(
            validate_role(-1, 4),
            Err(TopologyError::RoleOutOfRange { role: -1, size: 4 })
        ));
    }

    #[test]
    fn role_validation_is_identical_on_every_rank() {
        // The decision depends only on (role, size), never on the caller's
        // rank, which is what lets every member abort without coordination.
        for size in 1..6 {
            for role in -2..8i64 {
                let verdict = validate_role(role, size).is_ok();
                assert_eq!(verdict, role >= 0 && role < i64::from(size));
            }
        }
    }

    #[test]
    fn group_size_minimums() {
        assert!(validate_group_size("ping-pong", 2, 2).is_ok());
        let err = validate_group_size("ping-pong", 2, 1).unwrap_err();
        assert_eq!(
            err,
            TopologyError::GroupTooSmall {
                pattern: "ping-pong",
                required: 2,
                size: 1
            }
        );
    }

    #[test]
    fn diagnostics_name_the_value_and_the_valid_range() {
        let err = validate_role(7, 4).unwrap_err();
        let text = err.to_string();
        assert!(text.contains('7'));
        assert!(text.contains("between 0 and 3"));
    }
}
