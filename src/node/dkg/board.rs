// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Per-epoch message board for the key generation rounds.
//!
//! Every distinct protocol packet is verified, delivered to the local
//! protocol and rebroadcast exactly once: an echo broadcast, guaranteeing
//! eventual delivery while the network is not partitioned.

use super::state::DkgState;
use super::{signing, sorted_by_public_key};
use crate::dbs::deserialise;
use crate::messaging::{GossipData, GossipPacket};
use crate::node::{Error, Result, Transport};
use crate::types::keys::Digest256;
use crate::types::Participant;

use bls_dkg::key_gen::message::Message as DkgMessage;
use dashmap::DashSet;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tiny_keccak::{Hasher, Sha3};
use tokio::sync::mpsc;
use xor_name::XorName;

// Upper bound on any per-peer dispatch queue.
const MAX_PEER_QUEUE: usize = 1000;

// Lower bound on the inbound protocol channel.
const MIN_INBOUND_QUEUE: usize = 64;

/// The echo broadcast board of one executing epoch.
pub(crate) struct EchoBoard {
    record: DkgState,
    our_address: String,
    transport: Arc<dyn Transport>,
    seen: DashSet<String>,
    // One dispatch worker per remote member; `None` once stopped.
    workers: Mutex<Option<BTreeMap<String, mpsc::Sender<GossipPacket>>>>,
    peers_by_name: BTreeMap<XorName, Participant>,
    incoming_tx: mpsc::Sender<DkgMessage>,
}

impl std::fmt::Debug for EchoBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EchoBoard")
            .field("beacon_id", &self.record.beacon_id)
            .field("epoch", &self.record.epoch)
            .finish()
    }
}

impl EchoBoard {
    /// Installs the board for the given executing record, spawning one
    /// dispatch worker per remote member. Returns the board plus the
    /// channel on which inbound protocol messages surface.
    pub(crate) fn new(
        record: DkgState,
        our_address: &str,
        transport: Arc<dyn Transport>,
    ) -> (Arc<Self>, mpsc::Receiver<DkgMessage>) {
        let members = sorted_by_public_key(record.next_group_members());
        let peers: Vec<Participant> = members
            .iter()
            .filter(|member| member.address != our_address)
            .cloned()
            .collect();

        let inbound_size = (peers.len() * 3).max(MIN_INBOUND_QUEUE);
        let (incoming_tx, incoming_rx) = mpsc::channel(inbound_size);

        let queue_size = (peers.len() * 3).clamp(1, MAX_PEER_QUEUE);
        let mut workers = BTreeMap::new();
        for peer in &peers {
            let (tx, mut rx) = mpsc::channel::<GossipPacket>(queue_size);
            let transport = transport.clone();
            let peer = peer.clone();
            let peer_address = peer.address.clone();
            let _worker = tokio::spawn(async move {
                while let Some(packet) = rx.recv().await {
                    if let Err(error) = transport.send(&peer, packet).await {
                        warn!("echo dispatch to {} failed: {}", peer.address, error);
                    }
                }
            });
            let _prev = workers.insert(peer_address, tx);
        }

        let peers_by_name = peers
            .iter()
            .filter_map(|peer| Some((peer.key_name().ok()?, peer.clone())))
            .collect();

        let board = Arc::new(Self {
            record,
            our_address: our_address.to_string(),
            transport,
            seen: DashSet::new(),
            workers: Mutex::new(Some(workers)),
            peers_by_name,
            incoming_tx,
        });

        (board, incoming_rx)
    }

    /// Send a packet produced by our own local protocol to its target.
    ///
    /// Own traffic goes on a fresh task rather than through the peer
    /// queues, so echo congestion cannot block protocol progress.
    pub(crate) fn send_own(&self, target: XorName, packet: GossipPacket) {
        let _ = self.seen.insert(Self::packet_hash(&packet));

        let peer = match self.peers_by_name.get(&target) {
            Some(peer) => peer.clone(),
            None => {
                warn!(
                    "no member {:?} on the {} board",
                    target, self.record.beacon_id
                );
                return;
            }
        };

        let transport = self.transport.clone();
        let _sender = tokio::spawn(async move {
            if let Err(error) = transport.send(&peer, packet).await {
                warn!("protocol send to {} failed: {}", peer.address, error);
            }
        });
    }

    /// Handle an inbound protocol packet: dedupe, verify, deliver to the
    /// local protocol and rebroadcast once to every peer.
    pub(crate) async fn receive(&self, packet: GossipPacket) -> Result<()> {
        let payload = match &packet.data {
            GossipData::Dkg { payload } if !payload.is_empty() => payload.clone(),
            _ => return Err(Error::InvalidPayload),
        };

        if !self.seen.insert(Self::packet_hash(&packet)) {
            trace!("dropping already seen protocol packet {}", packet);
            return Ok(());
        }

        signing::verify_packet(&packet, &self.record)?;

        let message: DkgMessage = deserialise(&payload).map_err(|_| Error::InvalidPayload)?;

        // The channel outlives every sender unless the board was stopped,
        // in which case dropping the message is correct.
        if self.incoming_tx.send(message).await.is_err() {
            trace!("board for {} already stopped", self.record.beacon_id);
            return Ok(());
        }

        self.rebroadcast(packet);
        Ok(())
    }

    // Enqueue a first-seen packet to every peer worker; a full queue drops
    // the packet for that peer, which recovers via echo from the others.
    fn rebroadcast(&self, packet: GossipPacket) {
        let workers = self.workers.lock().expect("poisoned board lock");
        let workers = match workers.as_ref() {
            Some(workers) => workers,
            None => return,
        };

        for (address, worker) in workers {
            if address == &packet.metadata.address || address == &self.our_address {
                continue;
            }
            if worker.try_send(packet.clone()).is_err() {
                warn!(
                    "echo queue for {} full, dropping {}",
                    address,
                    packet.short_sig()
                );
            }
        }
    }

    /// Close all worker channels; subsequent sendouts are no-ops.
    pub(crate) fn stop(&self) {
        let mut workers = self.workers.lock().expect("poisoned board lock");
        let _ = workers.take();
    }

    fn packet_hash(packet: &GossipPacket) -> String {
        let payload: &[u8] = match &packet.data {
            GossipData::Dkg { payload } => payload,
            _ => &[],
        };
        let mut hasher = Sha3::v256();
        hasher.update(payload);
        hasher.update(&packet.metadata.signature);
        let mut hash = Digest256::default();
        hasher.finalize(&mut hash);
        hex::encode(hash)
    }
}
