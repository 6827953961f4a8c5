// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Artifacts of a completed ceremony: the group descriptor and the local
//! key share.

use super::keys::Digest256;
use super::{Participant, Scheme};

use bls::serde_impl::SerdeSecret;
use bls::{PublicKeySet, SecretKeyShare};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tiny_keccak::{Hasher, Sha3};

/// A member of a completed group, with the index the key generation
/// assigned to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    pub index: u32,
    pub participant: Participant,
}

/// Description of a beacon group produced by one completed epoch.
///
/// Nodes are ordered by lexicographic public key bytes; `public_key_set`
/// holds the aggregated public key (the vector of commitments).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub beacon_id: String,
    pub epoch: u32,
    pub threshold: u32,
    pub beacon_period: Duration,
    pub catchup_period: Duration,
    pub scheme: Scheme,
    pub nodes: Vec<GroupNode>,
    pub genesis_time: SystemTime,
    pub genesis_seed: Vec<u8>,
    pub transition_time: SystemTime,
    pub public_key_set: PublicKeySet,
}

impl GroupDescriptor {
    /// Hash of the group identity.
    ///
    /// The genesis seed is excluded so that the first epoch can derive the
    /// seed from this very hash.
    pub fn hash(&self) -> Digest256 {
        let mut hasher = Sha3::v256();
        self.hash_update(&mut hasher);
        let mut hash = Digest256::default();
        hasher.finalize(&mut hash);
        hash
    }

    fn hash_update(&self, hasher: &mut Sha3) {
        hasher.update(self.beacon_id.as_bytes());
        hasher.update(&self.epoch.to_le_bytes());
        hasher.update(&self.threshold.to_le_bytes());
        hasher.update(&self.beacon_period.as_secs().to_le_bytes());
        hasher.update(&self.catchup_period.as_secs().to_le_bytes());
        hasher.update(self.scheme.id().as_bytes());
        hasher.update(&unix_secs(self.genesis_time).to_le_bytes());
        hasher.update(&unix_secs(self.transition_time).to_le_bytes());

        for node in &self.nodes {
            hasher.update(&node.index.to_le_bytes());
            hasher.update(node.participant.address.as_bytes());
            hasher.update(&node.participant.public_key);
        }

        hasher.update(&self.public_key_set.to_bytes());
    }

    pub fn node_addresses(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|node| node.participant.address.clone())
            .collect()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.nodes
            .iter()
            .map(|node| node.participant.clone())
            .collect()
    }

    pub fn node_index(&self, address: &str) -> Option<u32> {
        self.nodes
            .iter()
            .find(|node| node.participant.address == address)
            .map(|node| node.index)
    }
}

/// The local secret share of the group key.
#[derive(Clone, Serialize, Deserialize, custom_debug::Debug)]
pub struct KeyShare {
    pub public_key_set: PublicKeySet,
    pub index: usize,
    #[debug(skip)]
    pub secret_key_share: SerdeSecret<SecretKeyShare>,
    pub scheme: Scheme,
}

impl KeyShare {
    /// The share is consistent when the public share at our index matches
    /// the secret share's own public key.
    pub fn is_consistent(&self) -> bool {
        self.public_key_set.public_key_share(self.index)
            == self.secret_key_share.public_key_share()
    }
}

pub(crate) fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::keys;

    fn group(seed: Vec<u8>) -> GroupDescriptor {
        let sk_set = bls::SecretKeySet::random(1, &mut rand::thread_rng());
        let nodes = (0..3)
            .map(|index| GroupNode {
                index,
                participant: Participant::new(
                    format!("127.0.0.1:{}", 8080 + index),
                    &keys::gen_keypair(),
                ),
            })
            .collect();

        GroupDescriptor {
            beacon_id: "default".to_string(),
            epoch: 1,
            threshold: 2,
            beacon_period: Duration::from_secs(30),
            catchup_period: Duration::from_secs(10),
            scheme: Scheme::default(),
            nodes,
            genesis_time: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            genesis_seed: seed,
            transition_time: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            public_key_set: sk_set.public_keys(),
        }
    }

    #[test]
    fn hash_ignores_genesis_seed() {
        let group = group(vec![]);
        let mut seeded = group.clone();
        seeded.genesis_seed = group.hash().to_vec();

        assert_eq!(group.hash(), seeded.hash());
    }

    #[test]
    fn hash_covers_membership() {
        let group = group(vec![]);
        let mut reordered = group.clone();
        reordered.nodes.swap(0, 1);

        assert_ne!(group.hash(), reordered.hash());
    }

    #[test]
    fn key_share_consistency() {
        let sk_set = bls::SecretKeySet::random(1, &mut rand::thread_rng());
        let share = KeyShare {
            public_key_set: sk_set.public_keys(),
            index: 0,
            secret_key_share: SerdeSecret(sk_set.secret_key_share(0)),
            scheme: Scheme::default(),
        };
        assert!(share.is_consistent());

        let other = bls::SecretKeySet::random(1, &mut rand::thread_rng());
        let inconsistent = KeyShare {
            secret_key_share: SerdeSecret(other.secret_key_share(0)),
            ..share
        };
        assert!(!inconsistent.is_consistent());
    }
}
