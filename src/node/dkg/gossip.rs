// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Deduplicating, retrying fan-out of signed packets.

use crate::messaging::GossipPacket;
use crate::node::{Error, Result, Transport};
use crate::types::Participant;

use dashmap::DashSet;
use futures::stream::{FuturesUnordered, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};

// Per-peer delivery schedule: up to 8 attempts with a linearly growing
// pause between them.
const MAX_ATTEMPTS: u32 = 8;
const RETRY_STEP: Duration = Duration::from_millis(250);

// Cap on a single delivery attempt, so a peer stuck in its own request
// handling cannot pin a sender task forever.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Fan-out engine shared by outbound commands and inbound re-gossip.
pub(crate) struct Gossiper {
    transport: Arc<dyn Transport>,
    seen: DashSet<String>,
}

/// Handle on one fan-out round: completion plus the per-peer error surface.
#[derive(Debug)]
pub(crate) struct GossipRound {
    finished: oneshot::Receiver<()>,
    errors: mpsc::Receiver<(String, Error)>,
}

impl GossipRound {
    /// Wait for every per-peer sender to finish, then surface the first
    /// peer error, if any.
    pub(crate) async fn wait(mut self) -> Result<()> {
        let _ = (&mut self.finished).await;
        match self.errors.try_recv() {
            Ok((_, error)) => Err(error),
            Err(_) => Ok(()),
        }
    }
}

impl Gossiper {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            seen: DashSet::new(),
        }
    }

    /// Whether this packet fingerprint has been gossiped or observed before.
    pub(crate) fn seen_before(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Record a fingerprint; returns false when it was already known.
    pub(crate) fn mark_seen(&self, fingerprint: String) -> bool {
        self.seen.insert(fingerprint)
    }

    /// Fan a packet out to every addressable non-self recipient.
    ///
    /// The fingerprint is recorded before the first send so an echo of our
    /// own packet is dropped on arrival. Each per-peer sender runs on its
    /// own task with its own lifetime: a gossip survives the request that
    /// spawned it. Delivery failures never fail the round; they surface on
    /// the returned handle.
    pub(crate) fn gossip(
        &self,
        our_address: &str,
        recipients: &[Participant],
        packet: GossipPacket,
    ) -> GossipRound {
        let recipients: Vec<Participant> = recipients
            .iter()
            .filter(|r| !r.address.is_empty() && r.address != our_address)
            .unique_by(|r| r.address.clone())
            .cloned()
            .collect();

        let _ = self.mark_seen(packet.fingerprint());

        let (err_tx, errors) = mpsc::channel(recipients.len().max(1));
        let (done_tx, finished) = oneshot::channel();

        let mut senders: FuturesUnordered<_> = recipients
            .into_iter()
            .map(|recipient| {
                let transport = self.transport.clone();
                let packet = packet.clone();
                let err_tx = err_tx.clone();
                tokio::spawn(send_with_retries(transport, recipient, packet, err_tx))
            })
            .collect();
        drop(err_tx);

        let _watcher = tokio::spawn(async move {
            while senders.next().await.is_some() {}
            let _ = done_tx.send(());
        });

        GossipRound { finished, errors }
    }
}

async fn send_with_retries(
    transport: Arc<dyn Transport>,
    recipient: Participant,
    packet: GossipPacket,
    err_tx: mpsc::Sender<(String, Error)>,
) {
    let mut last_error = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let attempt_result = match timeout(SEND_TIMEOUT, transport.send(&recipient, packet.clone())).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::FailedSend(recipient.address.clone())),
        };
        match attempt_result {
            Ok(()) => return,
            Err(error) => {
                warn!(
                    "failed to deliver {} to {} (attempt {}/{}): {}",
                    packet, recipient.address, attempt, MAX_ATTEMPTS, error
                );
                last_error = Some(error);
                if attempt < MAX_ATTEMPTS {
                    sleep(RETRY_STEP * attempt).await;
                }
            }
        }
    }

    if let Some(error) = last_error {
        let _ = err_tx.send((recipient.address, error)).await;
    }
}
