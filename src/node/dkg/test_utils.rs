// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Fixtures shared by the ceremony tests.

use crate::dbs::{DkgStore, Error as DbError, Result as DbResult};
use crate::messaging::{GossipData, GossipPacket, ProposalTerms};
use crate::node::dkg::{DkgState, Process};
use crate::node::{Error, Result, Transport};
use crate::types::keys::{self, Keypair};
use crate::types::{GroupDescriptor, GroupNode, KeyShare, Participant, Scheme};

use async_trait::async_trait;
use bls::serde_impl::SerdeSecret;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A test node: its keypair and the participant record derived from it.
#[derive(custom_debug::Debug)]
pub struct TestNode {
    #[debug(skip)]
    pub keypair: Keypair,
    pub participant: Participant,
}

impl TestNode {
    pub fn new(address: &str) -> Self {
        let keypair = keys::gen_keypair();
        let participant = Participant::new(address, &keypair);
        Self {
            keypair,
            participant,
        }
    }
}

/// `count` nodes listening on consecutive local ports.
pub fn gen_nodes(count: usize) -> Vec<TestNode> {
    (0..count)
        .map(|i| TestNode::new(&format!("127.0.0.1:{}", 8080 + i)))
        .collect()
}

/// First-epoch proposal terms with `joining[0]` as leader and an hour of
/// slack on the timeout.
pub fn first_proposal(beacon_id: &str, joining: &[Participant], threshold: u32) -> ProposalTerms {
    let genesis_time = SystemTime::now() + Duration::from_secs(120);
    ProposalTerms {
        beacon_id: beacon_id.to_string(),
        epoch: 1,
        leader: joining[0].clone(),
        threshold,
        timeout: SystemTime::now() + Duration::from_secs(3600),
        catchup_period: Duration::from_secs(10),
        beacon_period: Duration::from_secs(30),
        scheme_id: Scheme::default().id().to_string(),
        genesis_time,
        genesis_seed: vec![],
        transition_time: genesis_time,
        joining: joining.to_vec(),
        remaining: vec![],
        leaving: vec![],
    }
}

/// Reshare terms on top of a completed state, with `remaining[0]` as leader.
pub fn reshare_proposal(
    previous: &crate::node::dkg::DkgState,
    joining: &[Participant],
    remaining: &[Participant],
    leaving: &[Participant],
) -> ProposalTerms {
    ProposalTerms {
        beacon_id: previous.beacon_id.clone(),
        epoch: previous.epoch + 1,
        leader: remaining[0].clone(),
        threshold: previous.threshold,
        timeout: SystemTime::now() + Duration::from_secs(3600),
        catchup_period: previous.catchup_period,
        beacon_period: previous.beacon_period,
        scheme_id: previous.scheme.id().to_string(),
        genesis_time: previous.genesis_time,
        genesis_seed: previous.genesis_seed.clone(),
        transition_time: SystemTime::now() + Duration::from_secs(600),
        joining: joining.to_vec(),
        remaining: remaining.to_vec(),
        leaving: leaving.to_vec(),
    }
}

/// One group descriptor plus the matching share for every member, in
/// group-node order.
pub fn gen_group_with_shares(
    beacon_id: &str,
    participants: &[Participant],
    threshold: u32,
) -> (GroupDescriptor, Vec<KeyShare>) {
    let sk_set = bls::SecretKeySet::random(threshold as usize - 1, &mut rand::thread_rng());
    let mut sorted = participants.to_vec();
    sorted.sort_by(|a, b| a.public_key.cmp(&b.public_key));

    let nodes: Vec<GroupNode> = sorted
        .into_iter()
        .enumerate()
        .map(|(i, participant)| GroupNode {
            index: i as u32,
            participant,
        })
        .collect();

    let genesis_time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    let mut group = GroupDescriptor {
        beacon_id: beacon_id.to_string(),
        epoch: 1,
        threshold,
        beacon_period: Duration::from_secs(30),
        catchup_period: Duration::from_secs(10),
        scheme: Scheme::default(),
        nodes,
        genesis_time,
        genesis_seed: vec![],
        transition_time: genesis_time,
        public_key_set: sk_set.public_keys(),
    };
    group.genesis_seed = group.hash().to_vec();

    let shares = (0..group.nodes.len())
        .map(|index| KeyShare {
            public_key_set: sk_set.public_keys(),
            index,
            secret_key_share: SerdeSecret(sk_set.secret_key_share(index)),
            scheme: Scheme::default(),
        })
        .collect();

    (group, shares)
}

/// A group descriptor plus a consistent key share for the member at
/// `index` in group-node order.
pub fn gen_group_and_share(
    beacon_id: &str,
    participants: &[Participant],
    threshold: u32,
    index: usize,
) -> (GroupDescriptor, KeyShare) {
    let (group, mut shares) = gen_group_with_shares(beacon_id, participants, threshold);
    let share = shares.swap_remove(index);
    (group, share)
}

/// In-memory store satisfying the same contract as the sled one.
#[derive(Debug, Default)]
pub struct MemStore {
    slots: Mutex<HashMap<String, (Option<DkgState>, Option<DkgState>)>>,
}

impl DkgStore for MemStore {
    fn get_current(&self, beacon_id: &str) -> DbResult<DkgState> {
        let slots = self.slots.lock().expect("poisoned store lock");
        Ok(slots
            .get(beacon_id)
            .and_then(|(current, _)| current.clone())
            .unwrap_or_else(|| DkgState::fresh(beacon_id)))
    }

    fn get_finished(&self, beacon_id: &str) -> DbResult<Option<DkgState>> {
        let slots = self.slots.lock().expect("poisoned store lock");
        Ok(slots.get(beacon_id).and_then(|(_, finished)| finished.clone()))
    }

    fn save_current(&self, state: &DkgState) -> DbResult<()> {
        let mut slots = self.slots.lock().expect("poisoned store lock");
        let entry = slots.entry(state.beacon_id.clone()).or_default();
        entry.0 = Some(state.clone());
        Ok(())
    }

    fn save_finished(&self, state: &DkgState) -> DbResult<()> {
        let mut slots = self.slots.lock().expect("poisoned store lock");
        let entry = slots.entry(state.beacon_id.clone()).or_default();
        *entry = (Some(state.clone()), Some(state.clone()));
        Ok(())
    }

    fn migrate_from_group(&self, group: GroupDescriptor, share: KeyShare) -> DbResult<()> {
        {
            let slots = self.slots.lock().expect("poisoned store lock");
            if slots.contains_key(&group.beacon_id) {
                return Err(DbError::BeaconExists(group.beacon_id));
            }
        }
        self.save_finished(&DkgState::from_group(group, share))
    }

    fn nuke_state(&self, beacon_id: &str) -> DbResult<()> {
        let mut slots = self.slots.lock().expect("poisoned store lock");
        let _slot = slots.remove(beacon_id);
        Ok(())
    }

    fn beacon_ids(&self) -> DbResult<Vec<String>> {
        let slots = self.slots.lock().expect("poisoned store lock");
        Ok(slots.keys().cloned().collect())
    }
}

/// An in-memory network wiring several processes together by address.
#[derive(Default)]
pub struct TestNet {
    processes: Mutex<HashMap<String, Arc<Process>>>,
    down: Mutex<HashSet<String>>,
}

impl TestNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, address: &str, process: Arc<Process>) {
        let _prev = self
            .processes
            .lock()
            .expect("poisoned net lock")
            .insert(address.to_string(), process);
    }

    /// Make an address unreachable (or reachable again).
    pub fn set_down(&self, address: &str, down: bool) {
        let mut unreachable = self.down.lock().expect("poisoned net lock");
        if down {
            let _new = unreachable.insert(address.to_string());
        } else {
            let _gone = unreachable.remove(address);
        }
    }

    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::new(NetTransport(self.clone()))
    }
}

struct NetTransport(Arc<TestNet>);

#[async_trait]
impl Transport for NetTransport {
    async fn send(&self, recipient: &Participant, packet: GossipPacket) -> Result<()> {
        if self
            .0
            .down
            .lock()
            .expect("poisoned net lock")
            .contains(&recipient.address)
        {
            return Err(Error::FailedSend(recipient.address.clone()));
        }

        let process = {
            let processes = self.0.processes.lock().expect("poisoned net lock");
            processes
                .get(&recipient.address)
                .cloned()
                .ok_or_else(|| Error::FailedSend(recipient.address.clone()))?
        };

        match packet.data {
            GossipData::Dkg { .. } => process.broadcast_dkg(packet).await,
            _ => process.packet(packet).await,
        }
    }
}
