//! # Utility Functions
//!
//! Input validation shared by the configuration layer, plus the small
//! display helpers used in the run banner. Validators return descriptive
//! errors; the caller decides whether (and where) they are reported.

use crate::payload::ELEMENT_WIDTH;
use anyhow::Result;

/// Validate a buffer capacity.
///
/// The capacity must hold at least one reduce element, and stays under 1 GB
/// so a group-scaled allocation cannot silently request the whole machine.
pub fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity < ELEMENT_WIDTH {
        anyhow::bail!(
            "Capacity {} is too small (minimum {} bytes, one reduce element)",
            capacity,
            ELEMENT_WIDTH
        );
    }
    if capacity > 1024 * 1024 * 1024 {
        anyhow::bail!("Capacity {} is too large (maximum 1GB)", capacity);
    }
    Ok(())
}

/// Validate a message size against the configured capacity.
///
/// Buffers are allocated at capacity and transmit a window of this size, so
/// the window can never be allowed to outgrow the allocation.
pub fn validate_message_size(message_size: usize, capacity: usize) -> Result<()> {
    if message_size == 0 {
        anyhow::bail!("Message size must be at least 1 byte");
    }
    if message_size > capacity {
        anyhow::bail!(
            "Message size {} exceeds the buffer capacity {}",
            message_size,
            capacity
        );
    }
    Ok(())
}

/// Validate an iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        anyhow::bail!("Iteration count must be at least 1");
    }
    if iterations > 1_000_000 {
        anyhow::bail!(
            "Iteration count {} is too large (maximum 1000000)",
            iterations
        );
    }
    Ok(())
}

/// Validate a group size.
///
/// The upper bound keeps the per-pair mesh and the listener port span within
/// reason; role validity against the size is a separate, topology-level
/// check.
pub fn validate_group_size(group_size: u32) -> Result<()> {
    if group_size == 0 {
        anyhow::bail!("Group size must be at least 1");
    }
    if group_size > 1024 {
        anyhow::bail!("Group size {} is too large (maximum 1024)", group_size);
    }
    Ok(())
}

/// Validate the base port for a TCP mesh of `group_size` members.
///
/// Every rank binds its own listener at `port + rank`, so the whole span
/// must fit in the unprivileged port range.
pub fn validate_port(port: u16, group_size: u32) -> Result<()> {
    if port < 1024 {
        anyhow::bail!("Port number {} is too low (below 1024)", port);
    }
    let highest = u32::from(port) + group_size.saturating_sub(1);
    if highest > u32::from(u16::MAX) {
        anyhow::bail!(
            "Port span {}..={} runs past the 16-bit port range",
            port,
            highest
        );
    }
    Ok(())
}

/// Format bytes in a human-readable way
pub fn format_bytes(bytes: usize) -> String {
    let bytes = bytes as f64;
    if bytes < 1024.0 {
        format!("{:.0} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.2} KB", bytes / 1024.0)
    } else if bytes < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.2} MB", bytes / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Number of logical CPU cores available to the process.
pub fn get_cpu_cores() -> usize {
    num_cpus::get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_bounds_are_enforced() {
        assert!(validate_capacity(3).is_err());
        assert!(validate_capacity(4).is_ok());
        assert!(validate_capacity(1 << 20).is_ok());
        assert!(validate_capacity(1024 * 1024 * 1024).is_ok());
        assert!(validate_capacity(1024 * 1024 * 1024 + 1).is_err());
    }

    #[test]
    fn message_size_must_fit_the_capacity() {
        assert!(validate_message_size(0, 1024).is_err());
        assert!(validate_message_size(1, 1024).is_ok());
        assert!(validate_message_size(1024, 1024).is_ok());
        assert!(validate_message_size(1025, 1024).is_err());
    }

    #[test]
    fn iteration_bounds_are_enforced() {
        assert!(validate_iterations(0).is_err());
        assert!(validate_iterations(1).is_ok());
        assert!(validate_iterations(1_000_000).is_ok());
        assert!(validate_iterations(1_000_001).is_err());
    }

    #[test]
    fn group_size_bounds_are_enforced() {
        assert!(validate_group_size(0).is_err());
        assert!(validate_group_size(1).is_ok());
        assert!(validate_group_size(1024).is_ok());
        assert!(validate_group_size(1025).is_err());
    }

    #[test]
    fn the_port_span_must_stay_in_range() {
        assert!(validate_port(80, 1).is_err());
        assert!(validate_port(7800, 4).is_ok());
        assert!(validate_port(65535, 1).is_ok());
        assert!(validate_port(65535, 2).is_err());
        assert!(validate_port(65000, 1000).is_err());
    }

    #[test]
    fn byte_formatting_picks_the_right_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn cpu_core_count_is_nonzero() {
        assert!(get_cpu_cores() >= 1);
    }
}
