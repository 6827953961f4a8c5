// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! The ceremony machinery: state machine, signing, gossip, echo broadcast
//! and the orchestrating process.

mod board;
mod entropy;
mod execution;
mod gossip;
mod process;
mod signing;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use process::{Process, ProcessConfig};
pub use state::{DkgState, StateError, Status};

use crate::types::Participant;

use std::time::{Duration, SystemTime};

// Interval at which a running key generation is nudged through its timed
// phases.
pub(crate) const DKG_PROGRESS_INTERVAL: Duration = Duration::from_secs(6);

// Delay between an Execute command and the first protocol round, giving
// every node time to install its message board.
pub(crate) const KICKOFF_GRACE_PERIOD: Duration = Duration::from_secs(5);

// A reshared key takes over signing duties this many beacon rounds after
// the round in which the ceremony completed.
pub(crate) const TRANSITION_ROUND_DELAY: u64 = 10;

/// Minimum threshold the scheme accepts for a group of `n` nodes.
#[inline]
pub const fn minimum_threshold(n: usize) -> usize {
    1 + n / 2
}

/// The round in progress at `now` for a chain started at `genesis` with the
/// given `period`. Round numbering starts at 1 at genesis.
pub(crate) fn current_round(now: SystemTime, period: Duration, genesis: SystemTime) -> u64 {
    match now.duration_since(genesis) {
        Ok(since) if period.as_secs() > 0 => since.as_secs() / period.as_secs() + 1,
        _ => 1,
    }
}

/// Wall-clock time at which `round` starts.
pub(crate) fn time_of_round(period: Duration, genesis: SystemTime, round: u64) -> SystemTime {
    genesis + Duration::from_secs(period.as_secs().saturating_mul(round.saturating_sub(1)))
}

/// A completed ceremony as published on the downstream fan-out channel.
#[derive(Clone, Debug)]
pub struct SharingOutput {
    pub beacon_id: String,
    pub previous: Option<DkgState>,
    pub new: DkgState,
}

/// Sort ceremony members the way the key generation library orders them:
/// by lexicographic public key bytes.
pub(crate) fn sorted_by_public_key(mut participants: Vec<Participant>) -> Vec<Participant> {
    participants.sort_by(|a, b| a.public_key.cmp(&b.public_key));
    participants
}

pub(crate) fn contains_address(participants: &[Participant], address: &str) -> bool {
    participants.iter().any(|p| p.address == address)
}

/// The capability the ceremony needs from the beacon side: which long-term
/// keypair signs for a given beacon.
pub trait BeaconKeys: Send + Sync + 'static {
    fn keypair_for(&self, beacon_id: &str) -> Option<std::sync::Arc<crate::types::keys::Keypair>>;
}

/// One long-term keypair shared by every beacon the node hosts.
pub struct StaticKeys {
    keypair: std::sync::Arc<crate::types::keys::Keypair>,
}

impl StaticKeys {
    pub fn new(keypair: crate::types::keys::Keypair) -> Self {
        Self {
            keypair: std::sync::Arc::new(keypair),
        }
    }
}

impl std::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeys").finish()
    }
}

impl BeaconKeys for StaticKeys {
    fn keypair_for(&self, _beacon_id: &str) -> Option<std::sync::Arc<crate::types::keys::Keypair>> {
        Some(self.keypair.clone())
    }
}
