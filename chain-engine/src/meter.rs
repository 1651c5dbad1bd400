//! Resource meter (section 4.E): three independently-metered dimensions
//! — disk, network, compute — each debited per operation and bounded by
//! a budget.
//!
//! Grounded on the teacher's gas system (`fvm/src/gas/mod.rs`,
//! `gas/price_list.rs`, `gas/charge.rs`): one counter per dimension in
//! place of `GasTracker`'s single counter, a [`ResourceCharge`] playing
//! the role of `GasCharge`, and [`chain_types::ChainError::ResourceExhausted`]
//! playing the role of `SysErrOutOfGas`.

use chain_types::{ChainError, ResourceKind};

/// A single charge against one resource dimension, named the way
/// `GasCharge` names gas charges for log/trace readability.
#[derive(Clone, Copy, Debug)]
pub struct ResourceCharge {
    pub kind: ResourceKind,
    pub amount: u64,
}

impl ResourceCharge {
    pub fn disk(amount: u64) -> Self {
        Self { kind: ResourceKind::Disk, amount }
    }

    pub fn network(amount: u64) -> Self {
        Self { kind: ResourceKind::Network, amount }
    }

    pub fn compute(amount: u64) -> Self {
        Self { kind: ResourceKind::Compute, amount }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Dimension {
    used: u64,
    limit: u64,
}

impl Dimension {
    fn charge(&mut self, kind: ResourceKind, amount: u64) -> Result<(), ChainError> {
        let used = self.used.saturating_add(amount);
        if used > self.limit {
            return Err(ChainError::ResourceExhausted {
                kind,
                used,
                limit: self.limit,
            });
        }
        self.used = used;
        Ok(())
    }
}

/// Per-context resource budget and usage tracker.
#[derive(Debug, Default)]
pub struct ResourceMeter {
    disk: Dimension,
    network: Dimension,
    compute: Dimension,
}

impl ResourceMeter {
    pub fn new(disk_limit: u64, network_limit: u64, compute_limit: u64) -> Self {
        Self {
            disk: Dimension { used: 0, limit: disk_limit },
            network: Dimension { used: 0, limit: network_limit },
            compute: Dimension { used: 0, limit: compute_limit },
        }
    }

    /// A compute-only budget, used by read-only contexts (section 4.E:
    /// "Read-only contexts receive a separate compute-only budget.").
    pub fn compute_only(compute_limit: u64) -> Self {
        Self::new(0, 0, compute_limit)
    }

    pub fn use_disk(&mut self, amount: u64) -> Result<(), ChainError> {
        self.disk.charge(ResourceKind::Disk, amount)
    }

    pub fn use_network(&mut self, amount: u64) -> Result<(), ChainError> {
        self.network.charge(ResourceKind::Network, amount)
    }

    pub fn use_compute(&mut self, amount: u64) -> Result<(), ChainError> {
        self.compute.charge(ResourceKind::Compute, amount)
    }

    pub fn charge(&mut self, charge: ResourceCharge) -> Result<(), ChainError> {
        match charge.kind {
            ResourceKind::Disk => self.use_disk(charge.amount),
            ResourceKind::Network => self.use_network(charge.amount),
            ResourceKind::Compute => self.use_compute(charge.amount),
        }
    }

    pub fn disk_used(&self) -> u64 {
        self.disk.used
    }

    pub fn network_used(&self) -> u64 {
        self.network.used
    }

    pub fn compute_used(&self) -> u64 {
        self.compute.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_accumulate_until_limit() {
        let mut meter = ResourceMeter::new(0, 0, 100);
        meter.use_compute(40).unwrap();
        meter.use_compute(40).unwrap();
        assert_eq!(meter.compute_used(), 80);
        assert!(meter.use_compute(30).is_err());
        assert_eq!(meter.compute_used(), 80, "a failed charge must not mutate usage");
    }

    #[test]
    fn dimensions_are_independent() {
        let mut meter = ResourceMeter::new(10, 10, 10);
        assert!(meter.use_disk(10).is_ok());
        assert!(meter.use_disk(1).is_err());
        assert!(meter.use_network(10).is_ok());
    }

    #[test]
    fn compute_only_meter_rejects_disk_and_network() {
        let mut meter = ResourceMeter::compute_only(100);
        assert!(meter.use_disk(1).is_err());
        assert!(meter.use_network(1).is_err());
        assert!(meter.use_compute(50).is_ok());
    }
}
