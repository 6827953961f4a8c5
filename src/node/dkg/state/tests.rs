// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

use super::*;
use crate::messaging::GossipMetadata;
use crate::node::dkg::test_utils::{
    first_proposal, gen_group_and_share, gen_nodes, reshare_proposal, TestNode,
};

use assert_matches::assert_matches;
use eyre::Result;
use std::time::{Duration, SystemTime};

const BEACON_ID: &str = "default";

fn now() -> SystemTime {
    SystemTime::now()
}

fn participants(nodes: &[TestNode]) -> Vec<Participant> {
    nodes.iter().map(|n| n.participant.clone()).collect()
}

/// Leader's record after a valid three-node first proposal.
fn proposing_state(nodes: &[TestNode]) -> DkgState {
    let joining = participants(nodes);
    let terms = first_proposal(BEACON_ID, &joining, 2);
    DkgState::fresh(BEACON_ID)
        .proposing(&nodes[0].participant, &terms, now())
        .expect("valid first proposal")
}

/// A non-leader's record after observing the same proposal.
fn proposed_state(nodes: &[TestNode], me: usize) -> DkgState {
    let joining = participants(nodes);
    let terms = first_proposal(BEACON_ID, &joining, 2);
    DkgState::fresh(BEACON_ID)
        .proposed(
            &nodes[0].participant.address,
            &nodes[me].participant,
            &terms,
            now(),
        )
        .expect("valid observed proposal")
}

/// A completed three-node first epoch for `nodes[me]`, everyone remaining
/// afterwards eligible for a reshare.
fn complete_state(nodes: &[TestNode], me: usize) -> DkgState {
    let joining = participants(nodes);
    let (group, share) = gen_group_and_share(BEACON_ID, &joining, 2, me);
    let mut state = proposed_state(nodes, me)
        .joined(&nodes[me].participant, None, now())
        .expect("joiner can join")
        .executing(&nodes[me].participant, now())
        .expect("joiner can execute");
    // The completed record carries the seed the group derived.
    state = state.complete(group, share, now()).expect("can complete");
    state
}

#[test]
fn first_proposal_moves_leader_to_proposing() {
    let nodes = gen_nodes(3);
    let state = proposing_state(&nodes);

    assert_eq!(state.status, Status::Proposing);
    assert_eq!(state.epoch, 1);
    assert_eq!(state.threshold, 2);
    assert_eq!(state.joining.len(), 3);
    assert_matches!(state.leader, Some(ref leader) if leader.address == nodes[0].participant.address);
}

#[test]
fn first_proposal_moves_observer_to_proposed() {
    let nodes = gen_nodes(3);
    let state = proposed_state(&nodes, 1);

    assert_eq!(state.status, Status::Proposed);
    assert_eq!(state.epoch, 1);
}

#[test]
fn proposal_from_non_leader_is_rejected() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let terms = first_proposal(BEACON_ID, &joining, 2);

    let result = DkgState::fresh(BEACON_ID).proposed(
        &nodes[1].participant.address,
        &nodes[2].participant,
        &terms,
        now(),
    );
    assert_matches!(result, Err(StateError::CannotProposeAsNonLeader));
}

#[test]
fn proposal_not_naming_us_is_rejected() {
    let nodes = gen_nodes(3);
    let outsider = TestNode::new("127.0.0.1:9999");
    let joining = participants(&nodes);
    let terms = first_proposal(BEACON_ID, &joining, 2);

    let result = DkgState::fresh(BEACON_ID).proposed(
        &nodes[0].participant.address,
        &outsider.participant,
        &terms,
        now(),
    );
    assert_matches!(result, Err(StateError::SelfMissingFromProposal));
}

#[test]
fn proposal_with_reached_timeout_is_rejected() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let mut terms = first_proposal(BEACON_ID, &joining, 2);
    let at = now();
    terms.timeout = at;

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, at);
    assert_matches!(result, Err(StateError::TimeoutReached));
}

#[test]
fn threshold_boundary() {
    let nodes = gen_nodes(4);
    let joining = participants(&nodes);

    // floor(4/2) = 2 is one short of a majority.
    let too_low = first_proposal(BEACON_ID, &joining, 2);
    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &too_low, now());
    assert_matches!(
        result,
        Err(StateError::ThresholdTooLow {
            threshold: 2,
            minimum: 3
        })
    );

    let minimum = first_proposal(BEACON_ID, &joining, 3);
    assert!(DkgState::fresh(BEACON_ID)
        .proposing(&nodes[0].participant, &minimum, now())
        .is_ok());

    let too_high = first_proposal(BEACON_ID, &joining, 5);
    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &too_high, now());
    assert_matches!(result, Err(StateError::ThresholdHigherThanNodeCount { .. }));
}

#[test]
fn unknown_scheme_is_rejected() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let mut terms = first_proposal(BEACON_ID, &joining, 2);
    terms.scheme_id = "schnorr-over-carrier-pigeon".to_string();

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, now());
    assert_matches!(result, Err(StateError::InvalidScheme(_)));
}

#[test]
fn beacon_id_mismatch_is_rejected() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let terms = first_proposal("other", &joining, 2);

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, now());
    assert_matches!(result, Err(StateError::InvalidBeaconId { .. }));
}

#[test]
fn joiner_with_bad_self_signature_is_rejected() {
    let nodes = gen_nodes(3);
    let mut joining = participants(&nodes);
    joining[2].signature = vec![0u8; 64];
    let terms = first_proposal(BEACON_ID, &joining, 2);

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, now());
    assert_matches!(
        result,
        Err(StateError::Identity(
            crate::types::Error::InvalidParticipantSignature(_)
        ))
    );
}

#[test]
fn first_epoch_takes_joiners_only() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let mut terms = first_proposal(BEACON_ID, &joining, 2);
    terms.remaining = vec![nodes[1].participant.clone()];

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, now());
    assert_matches!(result, Err(StateError::OnlyJoinersForFirstEpoch));
}

#[test]
fn first_epoch_must_not_carry_genesis_seed() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let mut terms = first_proposal(BEACON_ID, &joining, 2);
    terms.genesis_seed = vec![1, 2, 3];

    let result = DkgState::fresh(BEACON_ID).proposing(&nodes[0].participant, &terms, now());
    assert_matches!(result, Err(StateError::NoGenesisSeedForFirstEpoch));
}

#[test]
fn first_epoch_leader_must_join() {
    let nodes = gen_nodes(3);
    let outsider = TestNode::new("127.0.0.1:9999");
    let joining = participants(&nodes);
    let mut terms = first_proposal(BEACON_ID, &joining, 2);
    terms.leader = outsider.participant.clone();

    let result =
        DkgState::fresh(BEACON_ID).proposing(&outsider.participant, &terms, now());
    assert_matches!(result, Err(StateError::LeaderNotJoining));
}

#[test]
fn epoch_going_backwards_is_rejected() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let mut terms =
        reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.epoch = state.epoch; // not terminal-recoverable, same epoch

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::InvalidEpoch));
}

#[test]
fn epoch_jump_is_rejected_unless_fresh_or_left() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let mut terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.epoch = state.epoch + 2;

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::InvalidEpoch));

    // A brand-new node may come in at any epoch.
    let fresh_result = DkgState::fresh(BEACON_ID).proposed(
        &nodes[0].participant.address,
        &nodes[1].participant,
        &terms,
        now(),
    );
    assert!(fresh_result.is_ok());
}

#[test]
fn reshare_requires_remainers() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    // Enough joiners to satisfy the threshold arithmetic, yet nobody to
    // refresh the key from.
    let joiners = participants(&gen_nodes(3));
    let mut terms = reshare_proposal(&state, &joiners, &participants(&nodes), &[]);
    terms.remaining = vec![];
    terms.leader = nodes[0].participant.clone();

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::NoRemainersForReshare));
}

#[test]
fn reshare_leader_cannot_join() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let mut terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.joining = vec![terms.leader.clone()];
    terms.threshold = 3;

    let result = state.proposed(&terms.leader.address.clone(), &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::LeaderJoiningDuringReshare));
}

#[test]
fn reshare_leader_must_remain() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let outsider = TestNode::new("127.0.0.1:9999");
    let mut terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.leader = outsider.participant.clone();

    let result = state.proposed(&outsider.participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::LeaderNotRemaining));
}

#[test]
fn reshare_cannot_silently_drop_a_member() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    // Node 2 is neither remaining nor leaving.
    let remaining = vec![nodes[0].participant.clone(), nodes[1].participant.clone()];
    let terms = reshare_proposal(&state, &[], &remaining, &[]);

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::MissingParticipantsInProposal(ref missing)) => {
        assert_eq!(missing, &[nodes[2].participant.address.clone()]);
    });
}

#[test]
fn reshare_cannot_invent_a_remainer() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let outsider = TestNode::new("127.0.0.1:9999");
    let mut remaining = participants(&nodes);
    remaining.push(outsider.participant.clone());
    let mut terms = reshare_proposal(&state, &[], &remaining, &[]);
    terms.threshold = 3;

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::NotPartOfPreviousEpoch(ref addr)) => {
        assert_eq!(addr, &outsider.participant.address);
    });
}

#[test]
fn reshare_genesis_constants_are_immutable() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);

    let mut terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.genesis_time = SystemTime::now() + Duration::from_secs(7);
    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::GenesisTimeChanged));

    let mut terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    terms.genesis_seed = vec![9; 32];
    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(result, Err(StateError::GenesisSeedChanged));
}

#[test]
fn reshare_needs_threshold_many_remainers() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    // Only one remainer cannot refresh a threshold-2 key.
    let remaining = vec![nodes[0].participant.clone()];
    let leaving = vec![nodes[1].participant.clone(), nodes[2].participant.clone()];
    let joiner = TestNode::new("127.0.0.1:9999");
    let mut terms = reshare_proposal(&state, &[joiner.participant.clone()], &remaining, &leaving);
    terms.threshold = 2;

    let result = state.proposed(&nodes[0].participant.address, &nodes[1].participant, &terms, now());
    assert_matches!(
        result,
        Err(StateError::NotEnoughRemainersToReshare {
            remaining: 1,
            threshold: 2
        })
    );
}

#[test]
fn valid_reshare_with_joiner_and_leaver() -> Result<()> {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let joiner = TestNode::new("127.0.0.1:9999");
    let remaining = vec![nodes[0].participant.clone(), nodes[1].participant.clone()];
    let leaving = vec![nodes[2].participant.clone()];
    let terms = reshare_proposal(&state, &[joiner.participant.clone()], &remaining, &leaving);

    let next = state.proposed(
        &nodes[0].participant.address,
        &nodes[1].participant,
        &terms,
        now(),
    )?;
    assert_eq!(next.status, Status::Proposed);
    assert_eq!(next.epoch, 2);
    assert_eq!(next.genesis_seed, state.genesis_seed);
    Ok(())
}

#[test]
fn joiner_joins_and_leaver_leaves() {
    let nodes = gen_nodes(3);
    let state = proposed_state(&nodes, 1);

    let joined = state.joined(&nodes[1].participant, None, now()).expect("can join");
    assert_eq!(joined.status, Status::Joined);

    let outsider = TestNode::new("127.0.0.1:9999");
    assert_matches!(
        state.joined(&outsider.participant, None, now()),
        Err(StateError::NotProposedAsJoiner)
    );

    assert_matches!(
        state.left(&nodes[1].participant),
        Err(StateError::NotProposedAsLeaver)
    );
}

#[test]
fn joining_a_reshare_requires_the_previous_group() {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 1);
    let joiner = TestNode::new("127.0.0.1:9999");
    let remaining = vec![nodes[0].participant.clone(), nodes[1].participant.clone()];
    let leaving = vec![nodes[2].participant.clone()];
    let terms = reshare_proposal(&state, &[joiner.participant.clone()], &remaining, &leaving);

    let observed = DkgState::fresh(BEACON_ID)
        .proposed(&nodes[0].participant.address, &joiner.participant, &terms, now())
        .expect("joiner observes the reshare");

    assert_matches!(
        observed.joined(&joiner.participant, None, now()),
        Err(StateError::MissingPreviousGroup)
    );

    let group = state.final_group.clone().expect("complete state has a group");
    let joined = observed
        .joined(&joiner.participant, Some(&group), now())
        .expect("join with group file");
    assert_eq!(joined.status, Status::Joined);

    let mut wrong = group;
    wrong.genesis_seed = vec![7; 32];
    assert_matches!(
        observed.joined(&joiner.participant, Some(&wrong), now()),
        Err(StateError::PreviousGroupMismatch)
    );
}

#[test]
fn votes_are_recorded_flipped_and_deduplicated() -> Result<()> {
    let nodes = gen_nodes(3);
    let mut state = complete_state(&nodes, 0);
    // Move into a reshare so there are remainers who can vote.
    let remaining = participants(&nodes);
    let terms = reshare_proposal(&state, &[], &remaining, &[]);
    state = state.proposing(&nodes[0].participant, &terms, now())?;

    let voter = &nodes[1].participant;
    let state = state.received_acceptance(voter, &voter.address, now())?;
    assert_eq!(state.acceptors.len(), 1);

    assert_matches!(
        state.received_acceptance(voter, &voter.address, now()),
        Err(StateError::DuplicateAcceptance)
    );

    // Changing their mind moves them across, not double-counts them.
    let state = state.received_rejection(voter, &voter.address, now())?;
    assert!(state.acceptors.is_empty());
    assert_eq!(state.rejectors.len(), 1);

    let state = state.received_acceptance(voter, &voter.address, now())?;
    assert!(state.rejectors.is_empty());
    assert_eq!(state.acceptors.len(), 1);
    Ok(())
}

#[test]
fn vote_sender_must_be_the_voter() -> Result<()> {
    let nodes = gen_nodes(3);
    let mut state = complete_state(&nodes, 0);
    let terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    state = state.proposing(&nodes[0].participant, &terms, now())?;

    let result = state.received_acceptance(&nodes[1].participant, &nodes[2].participant.address, now());
    assert_matches!(result, Err(StateError::InvalidAcceptor));

    let result = state.received_rejection(&nodes[1].participant, &nodes[2].participant.address, now());
    assert_matches!(result, Err(StateError::InvalidRejector));
    Ok(())
}

#[test]
fn votes_from_joiners_or_leavers_are_rejected() -> Result<()> {
    let nodes = gen_nodes(3);
    let joiner = TestNode::new("127.0.0.1:9999");
    let mut state = complete_state(&nodes, 0);
    let remaining = vec![nodes[0].participant.clone(), nodes[1].participant.clone()];
    let leaving = vec![nodes[2].participant.clone()];
    let terms = reshare_proposal(&state, &[joiner.participant.clone()], &remaining, &leaving);
    state = state.proposing(&nodes[0].participant, &terms, now())?;

    // As gossip: neither a joiner nor a leaver is an eligible acceptor.
    let result = state.received_acceptance(&joiner.participant, &joiner.participant.address, now());
    assert_matches!(result, Err(StateError::InvalidAcceptor));
    let result =
        state.received_acceptance(&nodes[2].participant, &nodes[2].participant.address, now());
    assert_matches!(result, Err(StateError::InvalidAcceptor));

    // As a local command: same rule, different error surface.
    let joiner_view = DkgState::fresh(BEACON_ID)
        .proposed(&nodes[0].participant.address, &joiner.participant, &terms, now())?;
    assert_matches!(
        joiner_view.accepted(&joiner.participant, now()),
        Err(StateError::OnlyRemainersMayVote)
    );

    let leaver_view =
        state.proposed(&nodes[0].participant.address, &nodes[2].participant, &terms, now());
    // The leaver sees the proposal fine, it just cannot vote on it.
    let leaver_view = leaver_view?;
    assert_matches!(
        leaver_view.rejected(&nodes[2].participant, now()),
        Err(StateError::OnlyRemainersMayVote)
    );
    Ok(())
}

#[test]
fn votes_need_an_open_proposal() {
    let nodes = gen_nodes(3);
    let fresh = DkgState::fresh(BEACON_ID);

    assert_matches!(
        fresh.received_acceptance(&nodes[1].participant, &nodes[1].participant.address, now()),
        Err(StateError::UnexpectedAcceptance)
    );
    assert_matches!(
        fresh.received_rejection(&nodes[1].participant, &nodes[1].participant.address, now()),
        Err(StateError::UnexpectedRejection)
    );
}

#[test]
fn only_the_leader_triggers_execution() {
    let nodes = gen_nodes(3);
    let state = proposed_state(&nodes, 1).joined(&nodes[1].participant, None, now()).expect("can join");

    let execute = |sender: &Participant| {
        let packet = GossipPacket {
            data: GossipData::Execute {
                kickoff_time: now() + Duration::from_secs(5),
            },
            metadata: GossipMetadata {
                beacon_id: BEACON_ID.to_string(),
                address: sender.address.clone(),
                signature: vec![1; 64],
            },
        };
        state.apply_packet(&nodes[1].participant, &packet, now())
    };

    assert_matches!(
        execute(&nodes[2].participant),
        Err(StateError::OnlyLeaderCanTriggerExecute)
    );

    let next = execute(&nodes[0].participant).expect("leader may execute");
    assert_eq!(next.status, Status::Executing);
}

#[test]
fn leavers_move_to_left_on_execute() -> Result<()> {
    let nodes = gen_nodes(3);
    let state = complete_state(&nodes, 2);
    let remaining = vec![nodes[0].participant.clone(), nodes[1].participant.clone()];
    let leaving = vec![nodes[2].participant.clone()];
    let terms = reshare_proposal(&state, &[], &remaining, &leaving);
    let state = state.proposed(&nodes[0].participant.address, &nodes[2].participant, &terms, now())?;

    let next = state.executing(&nodes[2].participant, now())?;
    assert_eq!(next.status, Status::Left);
    Ok(())
}

#[test]
fn only_the_leader_can_remote_abort() {
    let nodes = gen_nodes(3);
    let state = proposed_state(&nodes, 1);

    let abort = |sender: &Participant| {
        let packet = GossipPacket {
            data: GossipData::Abort {
                reason: "bad vibes".to_string(),
            },
            metadata: GossipMetadata {
                beacon_id: BEACON_ID.to_string(),
                address: sender.address.clone(),
                signature: vec![1; 64],
            },
        };
        state.apply_packet(&nodes[1].participant, &packet, now())
    };

    assert_matches!(
        abort(&nodes[2].participant),
        Err(StateError::OnlyLeaderCanRemoteAbort)
    );
    let next = abort(&nodes[0].participant).expect("leader may abort");
    assert_eq!(next.status, Status::Aborted);
}

#[test]
fn completion_requires_executing_and_an_open_deadline() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let (group, share) = gen_group_and_share(BEACON_ID, &joining, 2, 1);

    let proposed = proposed_state(&nodes, 1);
    assert_matches!(
        proposed.complete(group.clone(), share.clone(), now()),
        Err(StateError::InvalidStateChange(Status::Proposed, Status::Complete))
    );

    let executing = proposed
        .joined(&nodes[1].participant, None, now())
        .expect("can join")
        .executing(&nodes[1].participant, now())
        .expect("can execute");

    let past_deadline = executing.timeout + Duration::from_secs(1);
    assert_matches!(
        executing.complete(group.clone(), share.clone(), past_deadline),
        Err(StateError::TimeoutReached)
    );

    let complete = executing.complete(group, share, now()).expect("can complete");
    assert_eq!(complete.status, Status::Complete);
    assert!(complete.final_group.is_some());
    assert!(complete.key_share.is_some());
    assert!(!complete.genesis_seed.is_empty());
}

#[test]
fn failed_epochs_can_be_retried_at_the_same_epoch() -> Result<()> {
    let nodes = gen_nodes(3);
    let state = proposing_state(&nodes)
        .executing(&nodes[0].participant, now())?
        .failed()?;
    assert_eq!(state.status, Status::Failed);

    let joining = participants(&nodes);
    let terms = first_proposal(BEACON_ID, &joining, 2);
    let retried = state.proposing(&nodes[0].participant, &terms, now())?;
    assert_eq!(retried.epoch, 1);
    assert_eq!(retried.status, Status::Proposing);
    Ok(())
}

#[test]
fn aborted_epochs_can_be_retried_with_different_participants() -> Result<()> {
    let nodes = gen_nodes(3);
    let state = proposing_state(&nodes).aborted()?;

    let replacement = TestNode::new("127.0.0.1:7777");
    let joining = vec![
        nodes[0].participant.clone(),
        nodes[1].participant.clone(),
        replacement.participant.clone(),
    ];
    let terms = first_proposal(BEACON_ID, &joining, 2);
    let retried = state.proposing(&nodes[0].participant, &terms, now())?;
    assert_eq!(retried.epoch, 1);
    Ok(())
}

#[test]
fn timed_out_flag_is_one_way() {
    let nodes = gen_nodes(3);
    let state = proposed_state(&nodes, 1).timed_out().expect("proposed can time out");
    assert_eq!(state.status, Status::TimedOut);

    assert_matches!(
        state.timed_out(),
        Err(StateError::InvalidStateChange(Status::TimedOut, Status::TimedOut))
    );

    // Complete records never time out.
    let complete = complete_state(&nodes, 1);
    assert_matches!(
        complete.timed_out(),
        Err(StateError::InvalidStateChange(Status::Complete, Status::TimedOut))
    );
}

#[test]
fn replaying_a_vote_packet_is_rejected_second_time() -> Result<()> {
    let nodes = gen_nodes(3);
    let mut state = complete_state(&nodes, 0);
    let terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
    state = state.proposing(&nodes[0].participant, &terms, now())?;

    let packet = GossipPacket {
        data: GossipData::Accept {
            acceptor: nodes[1].participant.clone(),
        },
        metadata: GossipMetadata {
            beacon_id: BEACON_ID.to_string(),
            address: nodes[1].participant.address.clone(),
            signature: vec![2; 64],
        },
    };

    let once = state.apply_packet(&nodes[0].participant, &packet, now())?;
    assert_matches!(
        once.apply_packet(&nodes[0].participant, &packet, now()),
        Err(StateError::DuplicateAcceptance)
    );
    Ok(())
}

#[test]
fn fresh_records_have_no_terms() {
    assert_matches!(
        DkgState::fresh(BEACON_ID).proposal_terms(),
        Err(StateError::NoProposalTerms)
    );
}

mod vote_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        // Whatever order votes and flips arrive in, a remainer sits in at
        // most one of the two lists and never twice in the same one.
        #[test]
        fn vote_lists_stay_disjoint(votes in proptest::collection::vec((0..3usize, any::<bool>()), 1..24)) {
            let nodes = gen_nodes(3);
            let mut state = complete_state(&nodes, 0);
            let terms = reshare_proposal(&state, &[], &participants(&nodes), &[]);
            state = state
                .proposing(&nodes[0].participant, &terms, now())
                .expect("valid reshare");

            for (voter, is_accept) in votes {
                let participant = &nodes[voter].participant;
                let applied = if is_accept {
                    state.received_acceptance(participant, &participant.address, now())
                } else {
                    state.received_rejection(participant, &participant.address, now())
                };
                // Duplicates are errors; everything else advances the record.
                if let Ok(next) = applied {
                    state = next;
                }

                for list in [&state.acceptors, &state.rejectors] {
                    let mut addresses: Vec<_> = list.iter().map(|p| &p.address).collect();
                    addresses.sort();
                    addresses.dedup();
                    prop_assert_eq!(addresses.len(), list.len());
                }
                prop_assert!(state
                    .acceptors
                    .iter()
                    .all(|acceptor| !contains_address(&state.rejectors, &acceptor.address)));
            }
        }
    }
}

#[test]
fn migrated_group_becomes_a_complete_first_epoch() {
    let nodes = gen_nodes(3);
    let joining = participants(&nodes);
    let (group, share) = gen_group_and_share(BEACON_ID, &joining, 2, 0);

    let state = DkgState::from_group(group.clone(), share);
    assert_eq!(state.status, Status::Complete);
    assert_eq!(state.epoch, 1);
    assert_eq!(state.joining.len(), 3);
    assert!(state.joining.iter().all(|p| p.signature.is_empty()));
    assert_eq!(state.genesis_seed, group.genesis_seed);
}
