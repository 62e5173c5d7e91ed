//! Fork schedule for the reward-bearing protocol upgrades.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Fork {
    Frontier = 0,
    Byzantium = 1,
    Constantinople = 2,
}

pub const MAX_FORKS: usize = 3;

impl Fork {
    pub const fn as_usize(self) -> usize {
        self as usize
    }
}

pub type Hash256 = [u8; 32];

/// Activation block per fork, indexed by [`Fork::as_usize`]; `None` never activates.
pub type ForkSchedule = [Option<u64>; MAX_FORKS];

pub fn fork_active(number: u64, forks: &ForkSchedule, fork: Fork) -> bool {
    match forks[fork.as_usize()] {
        Some(activation) => number >= activation,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_is_inclusive() {
        let forks: ForkSchedule = [Some(0), Some(10), None];
        assert!(!fork_active(9, &forks, Fork::Byzantium));
        assert!(fork_active(10, &forks, Fork::Byzantium));
        assert!(!fork_active(u64::MAX, &forks, Fork::Constantinople));
    }
}
