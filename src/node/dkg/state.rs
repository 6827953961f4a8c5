// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! The per-beacon ceremony state machine.
//!
//! Every transition is a pure function `(record, event) -> record'` that
//! either yields the successor record or a [`StateError`]; callers decide
//! whether to persist the result.

use super::{contains_address, minimum_threshold};
use crate::messaging::{GossipData, GossipPacket, ProposalTerms};
use crate::types::{GroupDescriptor, KeyShare, Participant, Scheme};

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Specialisation of `std::Result` for state transitions.
pub type Result<T, E = StateError> = std::result::Result<T, E>;

/// Everything that can make a transition or a proposal invalid.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    #[error("invalid state change from {0} to {1}")]
    InvalidStateChange(Status, Status),
    #[error("the proposal timeout has been reached")]
    TimeoutReached,
    #[error("proposal is for beacon {got:?} but this record is for {expected:?}")]
    InvalidBeaconId { expected: String, got: String },
    #[error("unknown scheme id {0:?}")]
    InvalidScheme(String),
    #[error("invalid epoch")]
    InvalidEpoch,
    #[error("threshold {threshold} cannot exceed the node count {node_count}")]
    ThresholdHigherThanNodeCount { threshold: u32, node_count: usize },
    #[error("threshold {threshold} is below the minimum {minimum} for this group size")]
    ThresholdTooLow { threshold: u32, minimum: u32 },
    #[error(transparent)]
    Identity(#[from] crate::types::Error),
    #[error("the first epoch must not carry a genesis seed")]
    NoGenesisSeedForFirstEpoch,
    #[error("the first epoch takes joiners only")]
    OnlyJoinersForFirstEpoch,
    #[error("the leader must be joining in the first epoch")]
    LeaderNotJoining,
    #[error("a reshare needs at least one remaining node")]
    NoRemainersForReshare,
    #[error("the leader cannot join during a reshare")]
    LeaderJoiningDuringReshare,
    #[error("the leader must be a remaining node during a reshare")]
    LeaderNotRemaining,
    #[error("{remaining} remainers cannot refresh a key with threshold {threshold}")]
    NotEnoughRemainersToReshare { remaining: usize, threshold: u32 },
    #[error("genesis time cannot change after the first epoch")]
    GenesisTimeChanged,
    #[error("genesis seed cannot change after the first epoch")]
    GenesisSeedChanged,
    #[error("current group members are missing from the proposal: {0:?}")]
    MissingParticipantsInProposal(Vec<String>),
    #[error("{0} was not part of the previous epoch")]
    NotPartOfPreviousEpoch(String),
    #[error("this node is not part of the proposal")]
    SelfMissingFromProposal,
    #[error("the sender of a proposal must be its leader")]
    CannotProposeAsNonLeader,
    #[error("this node was not proposed as a joiner")]
    NotProposedAsJoiner,
    #[error("this node was not proposed as a leaver")]
    NotProposedAsLeaver,
    #[error("joining after the first epoch requires the previous group descriptor")]
    MissingPreviousGroup,
    #[error("the provided group descriptor does not match this ceremony")]
    PreviousGroupMismatch,
    #[error("only remaining participants may vote on a proposal")]
    OnlyRemainersMayVote,
    #[error("duplicate acceptance")]
    DuplicateAcceptance,
    #[error("duplicate rejection")]
    DuplicateRejection,
    #[error("received an acceptance in a state that takes none")]
    UnexpectedAcceptance,
    #[error("received a rejection in a state that takes none")]
    UnexpectedRejection,
    #[error("acceptance does not come from the accepting node")]
    InvalidAcceptor,
    #[error("rejection does not come from the rejecting node")]
    InvalidRejector,
    #[error("only the leader can trigger execution")]
    OnlyLeaderCanTriggerExecute,
    #[error("only the leader can abort the ceremony")]
    OnlyLeaderCanRemoteAbort,
    #[error("a fresh record has no proposal terms")]
    NoProposalTerms,
    #[error("protocol packets are not state machine events")]
    UnexpectedProtocolPacket,
}

/// Where a ceremony record sits in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Fresh,
    Proposed,
    Proposing,
    Accepted,
    Rejected,
    Aborted,
    Executing,
    Complete,
    TimedOut,
    Joined,
    Left,
    Failed,
}

impl Status {
    /// Aborted, timed out and failed epochs may be retried at the same
    /// epoch number.
    pub fn is_terminal_recoverable(self) -> bool {
        matches!(self, Self::Aborted | Self::TimedOut | Self::Failed)
    }

    fn valid_successors(self) -> &'static [Status] {
        use Status::*;
        match self {
            Fresh => &[Proposing, Proposed],
            Joined => &[Left, Executing, Aborted, TimedOut],
            Proposing => &[Executing, Aborted, TimedOut],
            Proposed => &[Accepted, Rejected, Joined, Left, Aborted, TimedOut],
            Accepted => &[Executing, Aborted, TimedOut],
            Rejected => &[Aborted, TimedOut],
            Executing => &[Complete, TimedOut, Failed],
            Complete => &[Proposing, Proposed],
            Left => &[Joined, Aborted, Proposed],
            Aborted => &[Proposing, Proposed],
            TimedOut => &[Proposing, Proposed, Aborted],
            Failed => &[Proposing, Proposed, Left, Aborted],
        }
    }

    pub fn can_transition_to(self, next: Status) -> bool {
        self.valid_successors().contains(&next)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The persisted record of one beacon's ceremony epoch.
#[derive(Clone, Serialize, Deserialize, custom_debug::Debug)]
pub struct DkgState {
    pub beacon_id: String,
    pub epoch: u32,
    pub status: Status,
    pub threshold: u32,
    pub timeout: SystemTime,
    pub scheme: Scheme,
    pub genesis_time: SystemTime,
    #[serde(with = "serde_bytes")]
    #[debug(with = "crate::types::fmt_hex")]
    pub genesis_seed: Vec<u8>,
    pub transition_time: SystemTime,
    pub catchup_period: Duration,
    pub beacon_period: Duration,
    pub leader: Option<Participant>,
    pub remaining: Vec<Participant>,
    pub joining: Vec<Participant>,
    pub leaving: Vec<Participant>,
    pub acceptors: Vec<Participant>,
    pub rejectors: Vec<Participant>,
    pub final_group: Option<GroupDescriptor>,
    #[debug(skip)]
    pub key_share: Option<KeyShare>,
}

impl DkgState {
    /// The record a beacon has before it has ever seen a proposal.
    pub fn fresh(beacon_id: &str) -> Self {
        Self {
            beacon_id: beacon_id.to_string(),
            epoch: 0,
            status: Status::Fresh,
            threshold: 0,
            timeout: UNIX_EPOCH,
            scheme: Scheme::default(),
            genesis_time: UNIX_EPOCH,
            genesis_seed: vec![],
            transition_time: UNIX_EPOCH,
            catchup_period: Duration::from_secs(0),
            beacon_period: Duration::from_secs(0),
            leader: None,
            remaining: vec![],
            joining: vec![],
            leaving: vec![],
            acceptors: vec![],
            rejectors: vec![],
            final_group: None,
            key_share: None,
        }
    }

    /// A synthetic `Complete` first-epoch record adopted from an existing
    /// group descriptor. Joiner signatures are left empty; the node fills
    /// its own in at the next proposal it makes.
    pub fn from_group(group: GroupDescriptor, share: KeyShare) -> Self {
        let joining = group
            .nodes
            .iter()
            .map(|node| Participant {
                address: node.participant.address.clone(),
                public_key: node.participant.public_key.clone(),
                signature: vec![],
            })
            .collect();

        Self {
            beacon_id: group.beacon_id.clone(),
            epoch: group.epoch,
            status: Status::Complete,
            threshold: group.threshold,
            timeout: group.transition_time,
            scheme: group.scheme,
            genesis_time: group.genesis_time,
            genesis_seed: group.genesis_seed.clone(),
            transition_time: group.transition_time,
            catchup_period: group.catchup_period,
            beacon_period: group.beacon_period,
            leader: None,
            remaining: vec![],
            joining,
            leaving: vec![],
            acceptors: vec![],
            rejectors: vec![],
            final_group: Some(group),
            key_share: Some(share),
        }
    }

    pub fn has_timed_out(&self, now: SystemTime) -> bool {
        now >= self.timeout
    }

    /// Everybody named by the current proposal.
    pub fn participants(&self) -> Vec<Participant> {
        self.joining
            .iter()
            .chain(self.remaining.iter())
            .chain(self.leaving.iter())
            .cloned()
            .collect()
    }

    /// The node set of the next group: joiners and remainers.
    pub fn next_group_members(&self) -> Vec<Participant> {
        self.joining
            .iter()
            .chain(self.remaining.iter())
            .cloned()
            .collect()
    }

    fn check_transition(&self, to: Status) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(StateError::InvalidStateChange(self.status, to));
        }
        Ok(())
    }

    fn check_not_timed_out(&self, now: SystemTime) -> Result<()> {
        if self.has_timed_out(now) {
            return Err(StateError::TimeoutReached);
        }
        Ok(())
    }

    /// The canonical terms of the epoch this record describes, as used for
    /// signing and signature verification.
    pub fn proposal_terms(&self) -> Result<ProposalTerms> {
        let leader = self.leader.clone().ok_or(StateError::NoProposalTerms)?;
        Ok(ProposalTerms {
            beacon_id: self.beacon_id.clone(),
            epoch: self.epoch,
            leader,
            threshold: self.threshold,
            timeout: self.timeout,
            catchup_period: self.catchup_period,
            beacon_period: self.beacon_period,
            scheme_id: self.scheme.id().to_string(),
            genesis_time: self.genesis_time,
            genesis_seed: self.genesis_seed.clone(),
            transition_time: self.transition_time,
            joining: self.joining.clone(),
            remaining: self.remaining.clone(),
            leaving: self.leaving.clone(),
        })
    }

    fn from_terms(&self, terms: &ProposalTerms, scheme: Scheme, status: Status) -> Self {
        Self {
            beacon_id: terms.beacon_id.clone(),
            epoch: terms.epoch,
            status,
            threshold: terms.threshold,
            timeout: terms.timeout,
            scheme,
            genesis_time: terms.genesis_time,
            genesis_seed: terms.genesis_seed.clone(),
            transition_time: terms.transition_time,
            catchup_period: terms.catchup_period,
            beacon_period: terms.beacon_period,
            leader: Some(terms.leader.clone()),
            remaining: terms.remaining.clone(),
            joining: terms.joining.clone(),
            leaving: terms.leaving.clone(),
            acceptors: vec![],
            rejectors: vec![],
            final_group: None,
            key_share: None,
        }
    }

    /// Universal proposal validation. Returns the parsed scheme on success.
    pub fn validate_proposal(&self, terms: &ProposalTerms, now: SystemTime) -> Result<Scheme> {
        if terms.beacon_id != self.beacon_id {
            return Err(StateError::InvalidBeaconId {
                expected: self.beacon_id.clone(),
                got: terms.beacon_id.clone(),
            });
        }

        let scheme = Scheme::from_id(&terms.scheme_id)
            .ok_or_else(|| StateError::InvalidScheme(terms.scheme_id.clone()))?;

        if now >= terms.timeout {
            return Err(StateError::TimeoutReached);
        }

        let node_count = terms.joining.len() + terms.remaining.len();
        if terms.threshold as usize > node_count {
            return Err(StateError::ThresholdHigherThanNodeCount {
                threshold: terms.threshold,
                node_count,
            });
        }
        let minimum = minimum_threshold(node_count) as u32;
        if terms.threshold < minimum {
            return Err(StateError::ThresholdTooLow {
                threshold: terms.threshold,
                minimum,
            });
        }

        if terms.epoch < 1 || terms.epoch < self.epoch {
            return Err(StateError::InvalidEpoch);
        }
        if terms.epoch == self.epoch && !self.status.is_terminal_recoverable() {
            return Err(StateError::InvalidEpoch);
        }
        if terms.epoch > self.epoch + 1 && !matches!(self.status, Status::Left | Status::Fresh) {
            return Err(StateError::InvalidEpoch);
        }

        for joiner in &terms.joining {
            joiner.verify_identity()?;
        }

        if terms.epoch == 1 {
            self.validate_first_epoch(terms)?;
        } else {
            self.validate_reshare(terms)?;
        }

        Ok(scheme)
    }

    fn validate_first_epoch(&self, terms: &ProposalTerms) -> Result<()> {
        if !terms.genesis_seed.is_empty() {
            return Err(StateError::NoGenesisSeedForFirstEpoch);
        }
        if !terms.remaining.is_empty() || !terms.leaving.is_empty() {
            return Err(StateError::OnlyJoinersForFirstEpoch);
        }
        if !contains_address(&terms.joining, &terms.leader.address) {
            return Err(StateError::LeaderNotJoining);
        }
        Ok(())
    }

    fn validate_reshare(&self, terms: &ProposalTerms) -> Result<()> {
        if terms.remaining.is_empty() {
            return Err(StateError::NoRemainersForReshare);
        }
        if contains_address(&terms.joining, &terms.leader.address) {
            return Err(StateError::LeaderJoiningDuringReshare);
        }
        if !contains_address(&terms.remaining, &terms.leader.address) {
            return Err(StateError::LeaderNotRemaining);
        }

        if self.status == Status::Fresh {
            return Ok(());
        }

        // Genesis constants were fixed by the first epoch.
        if terms.genesis_time != self.genesis_time {
            return Err(StateError::GenesisTimeChanged);
        }
        if terms.genesis_seed != self.genesis_seed {
            return Err(StateError::GenesisSeedChanged);
        }

        if terms.remaining.len() < self.threshold as usize {
            return Err(StateError::NotEnoughRemainersToReshare {
                remaining: terms.remaining.len(),
                threshold: self.threshold,
            });
        }

        // Membership continuity is checked against the membership of the
        // last completed epoch; retries of an aborted or failed attempt are
        // validated on top of the finished record by the packet handler.
        if self.status == Status::Complete && terms.epoch == self.epoch + 1 {
            let members = self.next_group_members();
            let missing: Vec<String> = members
                .iter()
                .filter(|member| {
                    !contains_address(&terms.remaining, &member.address)
                        && !contains_address(&terms.leaving, &member.address)
                })
                .map(|member| member.address.clone())
                .collect();
            if !missing.is_empty() {
                return Err(StateError::MissingParticipantsInProposal(missing));
            }

            for carried in terms.remaining.iter().chain(terms.leaving.iter()) {
                if !contains_address(&members, &carried.address) {
                    return Err(StateError::NotPartOfPreviousEpoch(carried.address.clone()));
                }
            }
        }

        Ok(())
    }

    /// The proposer's own transition after its proposal validates.
    pub fn proposing(&self, me: &Participant, terms: &ProposalTerms, now: SystemTime) -> Result<Self> {
        self.check_transition(Status::Proposing)?;
        let scheme = self.validate_proposal(terms, now)?;

        if terms.leader.address != me.address {
            return Err(StateError::CannotProposeAsNonLeader);
        }

        Ok(self.from_terms(terms, scheme, Status::Proposing))
    }

    /// A non-proposer's transition on an observed proposal.
    pub fn proposed(
        &self,
        sender_address: &str,
        me: &Participant,
        terms: &ProposalTerms,
        now: SystemTime,
    ) -> Result<Self> {
        self.check_transition(Status::Proposed)?;

        if sender_address != terms.leader.address {
            return Err(StateError::CannotProposeAsNonLeader);
        }

        let scheme = self.validate_proposal(terms, now)?;

        let named = contains_address(&terms.joining, &me.address)
            || contains_address(&terms.remaining, &me.address)
            || contains_address(&terms.leaving, &me.address);
        if !named {
            return Err(StateError::SelfMissingFromProposal);
        }

        Ok(self.from_terms(terms, scheme, Status::Proposed))
    }

    /// A joiner signalling interest. After epoch 1 the previous group
    /// descriptor must be supplied and must match this ceremony.
    pub fn joined(
        &self,
        me: &Participant,
        previous_group: Option<&GroupDescriptor>,
        now: SystemTime,
    ) -> Result<Self> {
        self.check_transition(Status::Joined)?;
        self.check_not_timed_out(now)?;

        if !contains_address(&self.joining, &me.address) {
            return Err(StateError::NotProposedAsJoiner);
        }

        if self.epoch > 1 {
            let group = previous_group.ok_or(StateError::MissingPreviousGroup)?;
            if group.beacon_id != self.beacon_id || group.genesis_seed != self.genesis_seed {
                return Err(StateError::PreviousGroupMismatch);
            }
        }

        let mut next = self.clone();
        next.status = Status::Joined;
        Ok(next)
    }

    /// A leaver acknowledging the epoch moves on without it.
    pub fn left(&self, me: &Participant) -> Result<Self> {
        self.check_transition(Status::Left)?;

        if !contains_address(&self.leaving, &me.address) {
            return Err(StateError::NotProposedAsLeaver);
        }

        let mut next = self.clone();
        next.status = Status::Left;
        Ok(next)
    }

    /// This node accepts the proposal it observed.
    pub fn accepted(&self, me: &Participant, now: SystemTime) -> Result<Self> {
        self.check_transition(Status::Accepted)?;
        self.check_not_timed_out(now)?;
        self.check_may_vote(me)?;

        let mut next = self.clone();
        next.status = Status::Accepted;
        Ok(next)
    }

    /// This node rejects the proposal it observed.
    pub fn rejected(&self, me: &Participant, now: SystemTime) -> Result<Self> {
        self.check_transition(Status::Rejected)?;
        self.check_not_timed_out(now)?;
        self.check_may_vote(me)?;

        let mut next = self.clone();
        next.status = Status::Rejected;
        Ok(next)
    }

    fn check_may_vote(&self, me: &Participant) -> Result<()> {
        if contains_address(&self.joining, &me.address)
            || contains_address(&self.leaving, &me.address)
            || !contains_address(&self.remaining, &me.address)
        {
            return Err(StateError::OnlyRemainersMayVote);
        }
        Ok(())
    }

    /// The ceremony is abandoned.
    pub fn aborted(&self) -> Result<Self> {
        self.check_transition(Status::Aborted)?;

        let mut next = self.clone();
        next.status = Status::Aborted;
        Ok(next)
    }

    /// One-way flag applied when the proposal deadline passes.
    pub fn timed_out(&self) -> Result<Self> {
        self.check_transition(Status::TimedOut)?;

        let mut next = self.clone();
        next.status = Status::TimedOut;
        Ok(next)
    }

    /// Move into the protocol rounds. Leavers move to `Left` instead.
    pub fn executing(&self, me: &Participant, now: SystemTime) -> Result<Self> {
        self.check_not_timed_out(now)?;

        if contains_address(&self.leaving, &me.address) {
            return self.left(me);
        }

        self.check_transition(Status::Executing)?;

        if !contains_address(&self.joining, &me.address)
            && !contains_address(&self.remaining, &me.address)
        {
            return Err(StateError::SelfMissingFromProposal);
        }

        let mut next = self.clone();
        next.status = Status::Executing;
        Ok(next)
    }

    /// The protocol finished: adopt the group descriptor and key share.
    pub fn complete(
        &self,
        final_group: GroupDescriptor,
        key_share: KeyShare,
        now: SystemTime,
    ) -> Result<Self> {
        self.check_transition(Status::Complete)?;
        self.check_not_timed_out(now)?;

        let mut next = self.clone();
        next.status = Status::Complete;
        next.genesis_seed = final_group.genesis_seed.clone();
        next.transition_time = final_group.transition_time;
        next.final_group = Some(final_group);
        next.key_share = Some(key_share);
        Ok(next)
    }

    /// The protocol errored or ran out of time; the epoch number stays
    /// claimable by a fresh proposal.
    pub fn failed(&self) -> Result<Self> {
        self.check_transition(Status::Failed)?;

        let mut next = self.clone();
        next.status = Status::Failed;
        Ok(next)
    }

    /// Record another remainer's acceptance.
    pub fn received_acceptance(
        &self,
        acceptor: &Participant,
        sender_address: &str,
        now: SystemTime,
    ) -> Result<Self> {
        use Status::*;
        if !matches!(self.status, Proposing | Proposed | Accepted | Rejected | Joined) {
            return Err(StateError::UnexpectedAcceptance);
        }
        self.check_not_timed_out(now)?;

        if sender_address != acceptor.address || !contains_address(&self.remaining, &acceptor.address)
        {
            return Err(StateError::InvalidAcceptor);
        }
        if contains_address(&self.acceptors, &acceptor.address) {
            return Err(StateError::DuplicateAcceptance);
        }

        let mut next = self.clone();
        next.rejectors.retain(|r| r.address != acceptor.address);
        next.acceptors.push(acceptor.clone());
        Ok(next)
    }

    /// Record another remainer's rejection.
    pub fn received_rejection(
        &self,
        rejector: &Participant,
        sender_address: &str,
        now: SystemTime,
    ) -> Result<Self> {
        use Status::*;
        if !matches!(self.status, Proposing | Proposed | Accepted | Rejected | Joined) {
            return Err(StateError::UnexpectedRejection);
        }
        self.check_not_timed_out(now)?;

        if sender_address != rejector.address || !contains_address(&self.remaining, &rejector.address)
        {
            return Err(StateError::InvalidRejector);
        }
        if contains_address(&self.rejectors, &rejector.address) {
            return Err(StateError::DuplicateRejection);
        }

        let mut next = self.clone();
        next.acceptors.retain(|a| a.address != rejector.address);
        next.rejectors.push(rejector.clone());
        Ok(next)
    }

    /// Apply an observed gossip packet as a state machine event.
    pub fn apply_packet(
        &self,
        me: &Participant,
        packet: &GossipPacket,
        now: SystemTime,
    ) -> Result<Self> {
        let sender = packet.metadata.address.as_str();
        match &packet.data {
            GossipData::Proposal(terms) => self.proposed(sender, me, terms, now),
            GossipData::Accept { acceptor } => self.received_acceptance(acceptor, sender, now),
            GossipData::Reject { rejector } => self.received_rejection(rejector, sender, now),
            GossipData::Abort { reason } => {
                let leader = self.leader.as_ref().ok_or(StateError::NoProposalTerms)?;
                if sender != leader.address {
                    return Err(StateError::OnlyLeaderCanRemoteAbort);
                }
                debug!("aborting beacon {}: {}", self.beacon_id, reason);
                self.aborted()
            }
            GossipData::Execute { .. } => {
                let leader = self.leader.as_ref().ok_or(StateError::NoProposalTerms)?;
                if sender != leader.address {
                    return Err(StateError::OnlyLeaderCanTriggerExecute);
                }
                self.executing(me, now)
            }
            GossipData::Dkg { .. } => Err(StateError::UnexpectedProtocolPacket),
        }
    }
}

impl Display for DkgState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "beacon {:?} epoch {} {}",
            self.beacon_id, self.epoch, self.status
        )
    }
}

#[cfg(test)]
mod tests;
