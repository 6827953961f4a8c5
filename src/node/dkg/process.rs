// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! The per-node ceremony orchestrator.
//!
//! One [`Process`] serves every beacon the node hosts: it dispatches
//! operator commands, applies inbound gossip, owns the table of running
//! executions and publishes completed ceremonies downstream.

use super::board::EchoBoard;
use super::gossip::Gossiper;
use super::state::{DkgState, Status};
use super::{entropy, execution, signing, BeaconKeys, SharingOutput, KICKOFF_GRACE_PERIOD};
use crate::dbs::DkgStore;
use crate::messaging::{
    Command, DkgCommand, DkgEntry, DkgStatusResponse, FirstProposalOptions, GossipData,
    GossipPacket, ProposalOptions,
};
use crate::node::{Error, Result, Transport};
use crate::types::keys::Keypair;
use crate::types::{GroupDescriptor, Participant};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, watch, Mutex};

// Room for a burst of completed ceremonies before a slow consumer lags.
const COMPLETED_CHANNEL_SIZE: usize = 32;

/// Static configuration of one ceremony process.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// The address under which the other members reach this node.
    pub address: String,
    /// Delay between an Execute command and the first protocol round.
    pub kickoff_grace_period: Duration,
}

impl ProcessConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kickoff_grace_period: KICKOFF_GRACE_PERIOD,
        }
    }
}

/// The ceremony core of one beacon node.
pub struct Process {
    config: ProcessConfig,
    keys: Arc<dyn BeaconKeys>,
    store: Arc<dyn DkgStore>,
    transport: Arc<dyn Transport>,
    gossiper: Gossiper,
    executions: Arc<DashMap<String, Arc<EchoBoard>>>,
    completed_tx: broadcast::Sender<SharingOutput>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
    // Serializes command and packet handling plus the drivers' final store
    // writes; never held across a running protocol execution.
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("address", &self.config.address)
            .finish()
    }
}

impl Process {
    pub fn new(
        config: ProcessConfig,
        keys: Arc<dyn BeaconKeys>,
        store: Arc<dyn DkgStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (completed_tx, _) = broadcast::channel(COMPLETED_CHANNEL_SIZE);
        let (closed_tx, closed_rx) = watch::channel(false);

        Self {
            config,
            keys,
            store,
            transport: transport.clone(),
            gossiper: Gossiper::new(transport),
            executions: Arc::new(DashMap::new()),
            completed_tx,
            closed_tx,
            closed_rx,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Subscribe to the stream of completed ceremonies.
    pub fn completed_dkgs(&self) -> broadcast::Receiver<SharingOutput> {
        self.completed_tx.subscribe()
    }

    /// Signal shutdown: running executions exit at their next suspension
    /// point and their boards stop.
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
        for entry in self.executions.iter() {
            entry.value().stop();
        }
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed_rx.borrow() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn identity(&self, beacon_id: &str) -> Result<(Arc<Keypair>, Participant)> {
        let keypair = self
            .keys
            .keypair_for(beacon_id)
            .ok_or_else(|| Error::MissingKeypair(beacon_id.to_string()))?;
        let me = Participant::new(&self.config.address, &keypair);
        Ok((keypair, me))
    }

    /// Dispatch one operator command.
    pub async fn command(&self, command: DkgCommand) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.check_open()?;

        let beacon_id = command.metadata.beacon_id;
        debug!("operator command for beacon {:?}", beacon_id);

        match command.command {
            Command::Initial(options) => self.start_network(&beacon_id, options).await,
            Command::Resharing(options) => self.start_proposal(&beacon_id, options).await,
            Command::Join { group_file } => self.start_join(&beacon_id, group_file),
            Command::Accept => self.accept(&beacon_id),
            Command::Reject => self.reject(&beacon_id),
            Command::Execute => self.start_execute(&beacon_id),
            Command::Abort { reason } => self.start_abort(&beacon_id, &reason),
        }
    }

    /// The current and last-finished records, with key material stripped.
    pub async fn status(&self, beacon_id: &str) -> Result<DkgStatusResponse> {
        let _guard = self.lock.lock().await;

        let current = self.store.get_current(beacon_id)?;
        let finished = self.store.get_finished(beacon_id)?;

        Ok(DkgStatusResponse {
            current: status_entry(&current),
            complete: finished.as_ref().map(status_entry),
        })
    }

    /// Destroy all ceremony state of one beacon.
    pub async fn nuke(&self, beacon_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some((_, board)) = self.executions.remove(beacon_id) {
            board.stop();
        }
        self.store.nuke_state(beacon_id)?;
        Ok(())
    }

    /// One-time import of an existing group descriptor and key share.
    pub async fn migrate_from_group(
        &self,
        group: GroupDescriptor,
        share: crate::types::KeyShare,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.migrate_from_group(group, share)?;
        Ok(())
    }

    /// Flag every overdue in-progress record as timed out. Returns the
    /// beacons that were flagged.
    pub async fn sweep_timeouts(&self, now: SystemTime) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;

        let mut flagged = vec![];
        for beacon_id in self.store.beacon_ids()? {
            let current = self.store.get_current(&beacon_id)?;
            if !current.has_timed_out(now) {
                continue;
            }
            // Terminal and complete records have nothing left to expire.
            if let Ok(next) = current.timed_out() {
                self.store.save_current(&next)?;
                info!("{}: flagged as timed out", next);
                flagged.push(beacon_id);
            }
        }
        Ok(flagged)
    }

    // ---- operator command handlers ------------------------------------

    async fn start_network(&self, beacon_id: &str, options: FirstProposalOptions) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        self.repair_imported_signatures(beacon_id, &me)?;
        let current = self.store.get_current(beacon_id)?;

        let terms = crate::messaging::ProposalTerms {
            beacon_id: beacon_id.to_string(),
            epoch: 1,
            leader: me.clone(),
            threshold: options.threshold,
            timeout: options.timeout,
            catchup_period: options.catchup_period,
            beacon_period: options.beacon_period,
            scheme_id: options.scheme_id,
            genesis_time: options.genesis_time,
            genesis_seed: vec![],
            transition_time: options.genesis_time,
            joining: options.joining,
            remaining: vec![],
            leaving: vec![],
        };

        let next = current.proposing(&me, &terms, SystemTime::now())?;
        self.store.save_current(&next)?;

        let packet = signing::sign_packet(&keypair, &me.address, GossipData::Proposal(terms), &next)?;
        // Proposals block on gossip completion and surface the first peer
        // error; the persisted transition stands either way.
        self.gossiper
            .gossip(&me.address, &next.joining, packet)
            .wait()
            .await
    }

    async fn start_proposal(&self, beacon_id: &str, options: ProposalOptions) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        self.repair_imported_signatures(beacon_id, &me)?;
        let mut current = self.store.get_current(beacon_id)?;
        let finished = self.store.get_finished(beacon_id)?;

        let epoch = if current.status.is_terminal_recoverable() {
            current.epoch
        } else {
            current.epoch + 1
        };

        // A retry of an aborted, timed out or failed attempt validates on
        // top of the last finished epoch, exactly like the inbound packet
        // path, so the proposer cannot accept terms its receivers reject.
        if current.status.is_terminal_recoverable() {
            current = finished
                .clone()
                .unwrap_or_else(|| DkgState::fresh(beacon_id));
        }

        // Genesis constants, periods and scheme carry over from the last
        // completed epoch.
        let source = finished.as_ref().unwrap_or(&current);
        let terms = crate::messaging::ProposalTerms {
            beacon_id: beacon_id.to_string(),
            epoch,
            leader: me.clone(),
            threshold: options.threshold,
            timeout: options.timeout,
            catchup_period: source.catchup_period,
            beacon_period: source.beacon_period,
            scheme_id: source.scheme.id().to_string(),
            genesis_time: source.genesis_time,
            genesis_seed: source.genesis_seed.clone(),
            transition_time: options.transition_time,
            joining: options.joining,
            remaining: options.remaining,
            leaving: options.leaving,
        };

        let next = current.proposing(&me, &terms, SystemTime::now())?;
        self.store.save_current(&next)?;

        let packet = signing::sign_packet(&keypair, &me.address, GossipData::Proposal(terms), &next)?;
        let outcome = self
            .gossiper
            .gossip(&me.address, &next.next_group_members(), packet.clone())
            .wait()
            .await;

        // Leavers must see the final state, but their unreachability is
        // not fatal.
        let _leavers = self.gossiper.gossip(&me.address, &next.leaving, packet);

        outcome
    }

    fn start_join(&self, beacon_id: &str, group_file: Option<GroupDescriptor>) -> Result<()> {
        let (_keypair, me) = self.identity(beacon_id)?;
        let current = self.store.get_current(beacon_id)?;

        let next = current.joined(&me, group_file.as_ref(), SystemTime::now())?;
        self.store.save_current(&next)?;
        Ok(())
    }

    fn accept(&self, beacon_id: &str) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        let current = self.store.get_current(beacon_id)?;

        let next = current.accepted(&me, SystemTime::now())?;
        self.store.save_current(&next)?;

        let packet = signing::sign_packet(
            &keypair,
            &me.address,
            GossipData::Accept {
                acceptor: me.clone(),
            },
            &next,
        )?;
        let _round = self
            .gossiper
            .gossip(&me.address, &next.participants(), packet);
        Ok(())
    }

    fn reject(&self, beacon_id: &str) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        let current = self.store.get_current(beacon_id)?;

        let next = current.rejected(&me, SystemTime::now())?;
        self.store.save_current(&next)?;

        let packet = signing::sign_packet(
            &keypair,
            &me.address,
            GossipData::Reject {
                rejector: me.clone(),
            },
            &next,
        )?;
        let _round = self
            .gossiper
            .gossip(&me.address, &next.participants(), packet);
        Ok(())
    }

    fn start_abort(&self, beacon_id: &str, reason: &str) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        let current = self.store.get_current(beacon_id)?;

        match &current.leader {
            Some(leader) if leader.address == me.address => {}
            _ => return Err(Error::State(super::StateError::OnlyLeaderCanRemoteAbort)),
        }

        let next = current.aborted()?;
        self.store.save_current(&next)?;
        warn!("{}: aborted by operator: {}", next, reason);

        let packet = signing::sign_packet(
            &keypair,
            &me.address,
            GossipData::Abort {
                reason: reason.to_string(),
            },
            &next,
        )?;
        let _round = self
            .gossiper
            .gossip(&me.address, &next.participants(), packet);
        Ok(())
    }

    fn start_execute(&self, beacon_id: &str) -> Result<()> {
        let (keypair, me) = self.identity(beacon_id)?;
        let current = self.store.get_current(beacon_id)?;

        match &current.leader {
            Some(leader) if leader.address == me.address => {}
            _ => return Err(Error::State(super::StateError::OnlyLeaderCanTriggerExecute)),
        }

        let next = current.executing(&me, SystemTime::now())?;
        self.store.save_current(&next)?;

        let kickoff_time = SystemTime::now() + self.config.kickoff_grace_period;
        self.spawn_driver(keypair.clone(), &me, next.clone(), kickoff_time)?;

        let packet = signing::sign_packet(
            &keypair,
            &me.address,
            GossipData::Execute { kickoff_time },
            &next,
        )?;
        let _round = self
            .gossiper
            .gossip(&me.address, &next.participants(), packet);
        Ok(())
    }

    // ---- inbound peer handlers ----------------------------------------

    /// Apply one inbound gossip packet: dedupe, apply, verify, persist and
    /// re-gossip once.
    pub async fn packet(&self, packet: GossipPacket) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.check_open()?;

        if packet.metadata.address.is_empty()
            || packet.metadata.beacon_id.is_empty()
            || packet.metadata.signature.is_empty()
        {
            return Err(Error::InvalidPayload);
        }

        let fingerprint = packet.fingerprint();
        if self.gossiper.seen_before(&fingerprint) {
            trace!("dropping replayed packet {}", packet);
            return Ok(());
        }
        if fingerprint.len() < 8 {
            return Err(Error::SignatureTooShort);
        }

        if matches!(packet.data, GossipData::Dkg { .. }) {
            return self.handle_dkg_packet(packet).await;
        }

        debug!("processing inbound {}", packet);
        let beacon_id = packet.metadata.beacon_id.clone();
        let (keypair, me) = self.identity(&beacon_id)?;

        let mut current = self.store.get_current(&beacon_id)?;
        // A late proposal must still reach an otherwise-terminal node, so
        // it is applied on top of the last finished epoch.
        if current.status.is_terminal_recoverable() {
            current = self
                .store
                .get_finished(&beacon_id)?
                .unwrap_or_else(|| DkgState::fresh(&beacon_id));
        }

        let next = current.apply_packet(&me, &packet, SystemTime::now())?;
        signing::verify_packet(&packet, &next)?;
        self.store.save_current(&next)?;

        // Re-gossip once, best effort.
        let _round = self
            .gossiper
            .gossip(&me.address, &next.participants(), packet.clone());

        if let GossipData::Execute { kickoff_time } = packet.data {
            if next.status == Status::Executing {
                self.spawn_driver(keypair, &me, next, kickoff_time)?;
            }
        }

        Ok(())
    }

    /// Hand an inbound protocol packet to the beacon's message board.
    pub async fn broadcast_dkg(&self, packet: GossipPacket) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.check_open()?;
        self.handle_dkg_packet(packet).await
    }

    async fn handle_dkg_packet(&self, packet: GossipPacket) -> Result<()> {
        let board = match self.executions.get(&packet.metadata.beacon_id) {
            Some(board) => board.clone(),
            None => {
                warn!("no execution running for {}", packet);
                return Ok(());
            }
        };
        board.receive(packet).await
    }

    // ---- execution ----------------------------------------------------

    /// Install the epoch's message board and run the protocol driver to
    /// completion on its own task.
    fn spawn_driver(
        &self,
        keypair: Arc<Keypair>,
        me: &Participant,
        record: DkgState,
        kickoff_time: SystemTime,
    ) -> Result<()> {
        let beacon_id = record.beacon_id.clone();
        if self.executions.contains_key(&beacon_id) {
            return Err(Error::ExecutionInProgress(beacon_id));
        }

        let previous = self.store.get_finished(&beacon_id)?;
        // Initial when no finished epoch exists, else reshare carrying the
        // previous nodes, public coefficients and our previous share.
        let setup = execution::ProtocolSetup::build(me, previous.as_ref())?;

        let (board, incoming) = EchoBoard::new(record.clone(), &me.address, self.transport.clone());
        let _prev = self.executions.insert(beacon_id.clone(), board.clone());

        let me = me.clone();
        let store = self.store.clone();
        let executions = self.executions.clone();
        let completed = self.completed_tx.clone();
        let closed = self.closed_rx.clone();
        let lock = self.lock.clone();

        let _driver = tokio::spawn(async move {
            let result = execution::run(
                me,
                keypair,
                record,
                setup,
                board.clone(),
                incoming,
                kickoff_time,
                closed,
            )
            .await;

            entropy::clear_source();
            board.stop();

            // The outcome writes go through the same mutex as every other
            // state mutation.
            let _guard = lock.lock().await;
            let _board = executions.remove(&beacon_id);

            match result {
                Ok((group, share)) => {
                    finish_execution(&*store, &completed, &beacon_id, previous, group, share)
                }
                // A clean shutdown is not a failed epoch.
                Err(Error::Closed) => {
                    info!("execution for {:?} stopped by shutdown", beacon_id)
                }
                Err(error) => {
                    error!("key generation for {:?} failed: {}", beacon_id, error);
                    fail_execution(&*store, &beacon_id)
                }
            }
        });

        Ok(())
    }
}

/// Persist a successful outcome and publish it downstream.
fn finish_execution(
    store: &dyn DkgStore,
    completed: &broadcast::Sender<SharingOutput>,
    beacon_id: &str,
    previous: Option<DkgState>,
    group: GroupDescriptor,
    share: crate::types::KeyShare,
) {
    let current = match store.get_current(beacon_id) {
        Ok(current) => current,
        Err(error) => {
            error!("cannot load record for completed {:?}: {}", beacon_id, error);
            return;
        }
    };

    let complete = match current.complete(group, share, SystemTime::now()) {
        Ok(complete) => complete,
        Err(error) => {
            error!("completed ceremony no longer applies to {:?}: {}", beacon_id, error);
            fail_execution(store, beacon_id);
            return;
        }
    };

    if let Err(error) = store.save_finished(&complete) {
        error!("cannot persist completed epoch for {:?}: {}", beacon_id, error);
        return;
    }

    info!("{}: ceremony complete", complete);
    let output = SharingOutput {
        beacon_id: beacon_id.to_string(),
        previous,
        new: complete,
    };
    // With no live subscriber (e.g. during shutdown) the send fails; that
    // is an event to log, never one to die on.
    if completed.send(output).is_err() {
        warn!("completed ceremony for {:?} had no subscribers", beacon_id);
    }
}

/// Mark the epoch failed so the operator can retry it.
fn fail_execution(store: &dyn DkgStore, beacon_id: &str) {
    let current = match store.get_current(beacon_id) {
        Ok(current) => current,
        Err(error) => {
            error!("cannot load record for failed {:?}: {}", beacon_id, error);
            return;
        }
    };

    match current.failed() {
        Ok(failed) => {
            if let Err(error) = store.save_current(&failed) {
                error!("cannot persist failed epoch for {:?}: {}", beacon_id, error);
            }
        }
        // The record may have moved on, e.g. an abort raced the driver.
        Err(error) => warn!("cannot mark {:?} as failed: {}", beacon_id, error),
    }
}

impl Process {
    /// Repair participant records imported without self-signatures: fill
    /// in our own signature and write the record back through the atomic
    /// finished-slot update, once, before proposing.
    fn repair_imported_signatures(&self, beacon_id: &str, me: &Participant) -> Result<()> {
        let mut finished = match self.store.get_finished(beacon_id)? {
            Some(finished) => finished,
            None => return Ok(()),
        };
        // Only safe while nothing newer is in flight: the finished-slot
        // write also replaces the current slot.
        if self.store.get_current(beacon_id)?.status != Status::Complete {
            return Ok(());
        }

        let mut changed = false;
        for list in [&mut finished.joining, &mut finished.remaining] {
            for participant in list.iter_mut() {
                if participant.address == me.address
                    && participant.signature.is_empty()
                    && participant.public_key == me.public_key
                {
                    participant.signature = me.signature.clone();
                    changed = true;
                }
            }
        }

        if changed {
            self.store.save_finished(&finished)?;
        }
        Ok(())
    }
}

fn status_entry(state: &DkgState) -> DkgEntry {
    let addresses = |participants: &[Participant]| -> Vec<String> {
        participants.iter().map(|p| p.address.clone()).collect()
    };

    DkgEntry {
        beacon_id: state.beacon_id.clone(),
        epoch: state.epoch,
        status: state.status.to_string(),
        threshold: state.threshold,
        timeout: state.timeout,
        leader: state.leader.as_ref().map(|leader| leader.address.clone()),
        joining: addresses(&state.joining),
        remaining: addresses(&state.remaining),
        leaving: addresses(&state.leaving),
        acceptors: addresses(&state.acceptors),
        rejectors: addresses(&state.rejectors),
        final_group: state
            .final_group
            .as_ref()
            .map(|group| group.node_addresses())
            .unwrap_or_default(),
        group_hash: state
            .final_group
            .as_ref()
            .map(|group| hex::encode(group.hash())),
    }
}
