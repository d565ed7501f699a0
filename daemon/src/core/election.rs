// Packager election.
//
// A VRF output (or a derived time-window seed) maps to a number in [0, 1)
// which indexes into the sorted candidate set. Every node that agrees on
// the candidate set and the random number elects the same packager, with no
// message exchange.

use crest_common::{
    block::Height,
    crypto::{hash, Address},
    time::TimestampMicros,
    transaction::Transaction,
};

use crate::config::ELECTION_WINDOW_MICROS;

pub trait PackerElection: Send + Sync + 'static {
    /// Deterministically pick a packager from `candidates` by a random
    /// number in [0, 1). Returns `None` when the set is empty.
    fn packer_from_random(&self, rand: f64, candidates: &[Address]) -> Option<Address>;

    /// The packager responsible for the time window containing `time` at
    /// chain height `height`.
    fn packer_by_time(
        &self,
        time: TimestampMicros,
        height: Height,
        candidates: &[Address],
    ) -> Option<Address>;
}

/// Election over the staked and invested set: the unit-interval random
/// number indexes the address-sorted candidate list.
pub struct StakeSetElection;

impl PackerElection for StakeSetElection {
    fn packer_from_random(&self, rand: f64, candidates: &[Address]) -> Option<Address> {
        if candidates.is_empty() {
            return None;
        }
        let mut sorted: Vec<&Address> = candidates.iter().collect();
        sorted.sort();
        let index = ((rand * sorted.len() as f64) as usize).min(sorted.len() - 1);
        Some(sorted[index].clone())
    }

    fn packer_by_time(
        &self,
        time: TimestampMicros,
        height: Height,
        candidates: &[Address],
    ) -> Option<Address> {
        let window = time / ELECTION_WINDOW_MICROS;
        let mut seed = Vec::with_capacity(16);
        seed.extend_from_slice(&window.to_be_bytes());
        seed.extend_from_slice(&height.to_be_bytes());
        let digest = hash(&seed);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest.as_bytes()[..8]);
        let rand = u64::from_be_bytes(raw) as f64 / (u64::MAX as f64 + 1.0);
        self.packer_from_random(rand, candidates)
    }
}

/// Whether `addr` holds packing permission for a transaction timestamped
/// `time` targeting `height`.
pub fn has_packing_permission(
    election: &dyn PackerElection,
    candidates: &[Address],
    addr: &Address,
    height: Height,
    time: TimestampMicros,
) -> bool {
    match election.packer_by_time(time, height, candidates) {
        Some(packer) => packer == *addr,
        None => false,
    }
}

/// How a transaction was routed with respect to VRF agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrfAgentType {
    /// No candidate set was available when the transaction was handled
    Default,
    /// Handled without an elected packager; no VRF proof exists
    Local,
    /// Routed through a VRF-elected packager; proofs must be attached
    Vrf,
}

pub fn vrf_agent_type(
    election: &dyn PackerElection,
    candidates: &[Address],
    tx: &Transaction,
    height: Height,
) -> VrfAgentType {
    if candidates.is_empty() {
        return VrfAgentType::Default;
    }
    // only contract transactions travel through the dispatcher election;
    // ordinary transactions are pooled where they arrive
    if !tx.is_contract() {
        return VrfAgentType::Local;
    }
    match election.packer_by_time(tx.get_time(), height, candidates) {
        Some(packer) if packer == *tx.get_identity() => VrfAgentType::Local,
        Some(_) => VrfAgentType::Vrf,
        None => VrfAgentType::Default,
    }
}
