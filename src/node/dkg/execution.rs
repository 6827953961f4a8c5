// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Drives the underlying key generation library through its rounds on top
//! of the echo broadcast board.

use super::board::EchoBoard;
use super::state::DkgState;
use super::{
    contains_address, current_round, entropy, signing, sorted_by_public_key, time_of_round,
    DKG_PROGRESS_INTERVAL, TRANSITION_ROUND_DELAY,
};
use crate::dbs::serialise;
use crate::messaging::GossipData;
use crate::node::{Error, Result};
use crate::types::keys::Keypair;
use crate::types::{GroupDescriptor, GroupNode, KeyShare, Participant};

use bls::serde_impl::SerdeSecret;
use bls::PublicKeySet;
use bls_dkg::key_gen::{message::Message as DkgMessage, KeyGen, MessageAndTarget};
use rand::RngCore;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep};
use xor_name::XorName;

/// How the underlying protocol is set up for one epoch, resolved from the
/// local store before the rounds start.
pub(crate) enum ProtocolSetup {
    /// First epoch: no prior material exists.
    Initial,
    /// Epoch transition: the previous group's material gates the handover.
    Reshare {
        previous_nodes: Vec<Participant>,
        previous_threshold: u32,
        /// The previous commitment vector (aggregated public key).
        previous_public: PublicKeySet,
        /// Our share of the previous key; absent for joiners.
        previous_share: Option<KeyShare>,
    },
}

impl ProtocolSetup {
    /// Initial when no finished epoch exists, else reshare carrying the
    /// previous nodes, public coefficients and the local previous share.
    pub(crate) fn build(me: &Participant, finished: Option<&DkgState>) -> Result<Self> {
        let finished = match finished {
            Some(finished) => finished,
            None => return Ok(Self::Initial),
        };

        let group = finished.final_group.as_ref().ok_or_else(|| {
            Error::Protocol("finished epoch carries no group descriptor".to_string())
        })?;

        let previous_share = if group.node_index(&me.address).is_some() {
            let share = finished.key_share.clone().ok_or_else(|| {
                Error::Protocol("member of the previous group without a key share".to_string())
            })?;
            Some(share)
        } else {
            None
        };

        Ok(Self::Reshare {
            previous_nodes: group.participants(),
            previous_threshold: group.threshold,
            previous_public: group.public_key_set.clone(),
            previous_share,
        })
    }
}

impl std::fmt::Debug for ProtocolSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "Initial"),
            Self::Reshare {
                previous_nodes,
                previous_threshold,
                ..
            } => write!(
                f,
                "Reshare {{ previous_nodes: {}, previous_threshold: {} }}",
                previous_nodes.len(),
                previous_threshold
            ),
        }
    }
}

/// An old member may only run a reshare with the share it actually holds:
/// it must open the previous group key.
fn check_previous_share(setup: &ProtocolSetup) -> Result<()> {
    if let ProtocolSetup::Reshare {
        previous_public,
        previous_share: Some(share),
        ..
    } = setup
    {
        if share.public_key_set != *previous_public || !share.is_consistent() {
            return Err(Error::Protocol(
                "local share does not open the previous group key".to_string(),
            ));
        }
    }
    Ok(())
}

/// A reshare outcome stands only when enough of the outgoing group sits in
/// QUAL to have authorized the handover.
fn check_reshare_handover(setup: &ProtocolSetup, qualified: &[Participant]) -> Result<()> {
    if let ProtocolSetup::Reshare {
        previous_nodes,
        previous_threshold,
        ..
    } = setup
    {
        let qualified_previous = qualified
            .iter()
            .filter(|member| contains_address(previous_nodes, &member.address))
            .count();
        if qualified_previous < *previous_threshold as usize {
            return Err(Error::Protocol(format!(
                "only {} members of the previous group qualified, {} needed to hand over",
                qualified_previous, previous_threshold
            )));
        }
    }
    Ok(())
}

/// Run one epoch's key generation to completion.
///
/// Waits out the kickoff grace period, then pumps protocol messages
/// between the library and the board until the library finalizes, the
/// record's timeout passes, or the process shuts down.
pub(crate) async fn run(
    me: Participant,
    keypair: Arc<Keypair>,
    record: DkgState,
    setup: ProtocolSetup,
    board: Arc<EchoBoard>,
    mut incoming: mpsc::Receiver<DkgMessage>,
    kickoff_time: SystemTime,
    mut closed: watch::Receiver<bool>,
) -> Result<(GroupDescriptor, KeyShare)> {
    check_previous_share(&setup)?;

    // Let the other nodes install their boards first.
    if let Ok(waiting) = kickoff_time.duration_since(SystemTime::now()) {
        tokio::select! {
            _ = sleep(waiting) => {}
            _ = closed.changed() => return Err(Error::Closed),
        }
    }

    let members = sorted_by_public_key(record.next_group_members());
    let my_name = me.key_name()?;
    let my_index = members
        .iter()
        .position(|member| member.address == me.address)
        .ok_or(super::StateError::SelfMissingFromProposal)
        .map_err(Error::from)?;

    let mut rng = entropy::protocol_rng();

    // A single participant needs no rounds, but a reshare still needs the
    // outgoing group's blessing.
    if members.len() == 1 {
        check_reshare_handover(&setup, &members)?;
        let secret_key_set = bls::SecretKeySet::random(0, &mut rng);
        let share = KeyShare {
            public_key_set: secret_key_set.public_keys(),
            index: 0,
            secret_key_share: SerdeSecret(secret_key_set.secret_key_share(0)),
            scheme: record.scheme,
        };
        let group = build_group(&record, &members, &members, &share)?;
        return Ok((group, share));
    }

    let names: BTreeSet<XorName> = members
        .iter()
        .map(|member| member.key_name())
        .collect::<std::result::Result<_, _>>()?;

    // The library counts tolerated faults, not required shares.
    let faults = record.threshold.saturating_sub(1) as usize;
    let (mut key_gen, initial) = KeyGen::initialize(my_name, faults, names)
        .map_err(|error| Error::Protocol(error.to_string()))?;

    info!(
        "{}: key generation started with {} members as {:?}",
        record,
        members.len(),
        setup
    );

    let mut backlog: VecDeque<DkgMessage> = VecDeque::new();
    send_out(&board, &keypair, &record, &me, my_name, initial, &mut backlog)?;

    let time_left = record
        .timeout
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::from_secs(0));
    let deadline = sleep(time_left);
    tokio::pin!(deadline);

    let mut progress = interval(DKG_PROGRESS_INTERVAL);

    loop {
        while let Some(message) = backlog.pop_front() {
            handle(
                &mut key_gen,
                &mut rng,
                &board,
                &keypair,
                &record,
                &me,
                my_name,
                message,
                &mut backlog,
            )?;
        }

        if let Some(outcome) = try_finalize(&mut key_gen, &record, &setup, &members, my_index)? {
            return Ok(outcome);
        }

        tokio::select! {
            _ = closed.changed() => return Err(Error::Closed),
            _ = &mut deadline => return Err(Error::ProtocolTimeout),
            _ = progress.tick() => {
                match key_gen.timed_phase_transition(&mut rng) {
                    Ok(messages) => {
                        send_out(&board, &keypair, &record, &me, my_name, messages, &mut backlog)?;
                    }
                    // Not fatal: the deadline decides when to give up.
                    Err(error) => trace!("{}: timed phase not ready: {}", record, error),
                }
            }
            maybe_message = incoming.recv() => {
                match maybe_message {
                    Some(message) => backlog.push_back(message),
                    None => return Err(Error::Closed),
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle(
    key_gen: &mut KeyGen,
    rng: &mut impl RngCore,
    board: &EchoBoard,
    keypair: &Keypair,
    record: &DkgState,
    me: &Participant,
    my_name: XorName,
    message: DkgMessage,
    backlog: &mut VecDeque<DkgMessage>,
) -> Result<()> {
    match key_gen.handle_message(rng, message) {
        Ok(responses) => send_out(board, keypair, record, me, my_name, responses, backlog)?,
        // Echoed packets can be out of phase for us; the library catches up
        // via its cache and the timed transitions.
        Err(error) => trace!("{}: unhandled protocol message: {}", record, error),
    }
    Ok(())
}

/// Hand the library's outbound messages to the board; messages addressed
/// to ourselves loop straight back into the backlog.
fn send_out(
    board: &EchoBoard,
    keypair: &Keypair,
    record: &DkgState,
    me: &Participant,
    my_name: XorName,
    messages: Vec<MessageAndTarget>,
    backlog: &mut VecDeque<DkgMessage>,
) -> Result<()> {
    for (target, message) in messages {
        if target == my_name {
            backlog.push_back(message);
            continue;
        }

        let payload = serialise(&message)?;
        let packet = signing::sign_packet(
            keypair,
            &me.address,
            GossipData::Dkg { payload },
            record,
        )?;
        board.send_own(target, packet);
    }
    Ok(())
}

fn try_finalize(
    key_gen: &mut KeyGen,
    record: &DkgState,
    setup: &ProtocolSetup,
    members: &[Participant],
    my_index: usize,
) -> Result<Option<(GroupDescriptor, KeyShare)>> {
    if !key_gen.is_finalized() {
        return Ok(None);
    }

    let (qualified, outcome) = match key_gen.generate_keys() {
        Some(result) => result,
        None => return Ok(None),
    };

    // QUAL: the subset the protocol certified as honest and online.
    let qualified_members: Vec<Participant> = members
        .iter()
        .filter(|member| {
            member
                .key_name()
                .map(|name| qualified.contains(&name))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if qualified_members.len() < record.threshold as usize {
        return Err(Error::Protocol(format!(
            "only {} of {} members qualified, threshold is {}",
            qualified_members.len(),
            members.len(),
            record.threshold
        )));
    }
    check_reshare_handover(setup, &qualified_members)?;
    let my_address = &members[my_index].address;
    if !qualified_members.iter().any(|m| &m.address == my_address) {
        return Err(Error::NotQualified);
    }

    if outcome.public_key_set.public_key_share(my_index)
        != outcome.secret_key_share.public_key_share()
    {
        return Err(Error::CorruptedOutcome);
    }

    let share = KeyShare {
        public_key_set: outcome.public_key_set,
        index: my_index,
        secret_key_share: SerdeSecret(outcome.secret_key_share),
        scheme: record.scheme,
    };
    let group = build_group(record, members, &qualified_members, &share)?;

    info!(
        "{}: key generation complete, group hash {}",
        record,
        hex::encode(group.hash())
    );

    Ok(Some((group, share)))
}

/// Assemble the group descriptor out of the qualified members, deriving
/// the transition time and, for a first epoch, the genesis seed.
fn build_group(
    record: &DkgState,
    members: &[Participant],
    qualified: &[Participant],
    share: &KeyShare,
) -> Result<GroupDescriptor> {
    let now = SystemTime::now();
    let transition_time = if record.epoch == 1 {
        record.genesis_time
    } else {
        let round = current_round(now, record.beacon_period, record.genesis_time);
        time_of_round(
            record.beacon_period,
            record.genesis_time,
            round + TRANSITION_ROUND_DELAY,
        )
    };

    // Indices stay aligned with the share evaluation points, so a node's
    // index is its position in the full sorted member list.
    let nodes = members
        .iter()
        .enumerate()
        .filter(|(_, member)| qualified.iter().any(|q| q.address == member.address))
        .map(|(index, member)| GroupNode {
            index: index as u32,
            participant: member.clone(),
        })
        .collect();

    let mut group = GroupDescriptor {
        beacon_id: record.beacon_id.clone(),
        epoch: record.epoch,
        threshold: record.threshold,
        beacon_period: record.beacon_period,
        catchup_period: record.catchup_period,
        scheme: record.scheme,
        nodes,
        genesis_time: record.genesis_time,
        genesis_seed: record.genesis_seed.clone(),
        transition_time,
        public_key_set: share.public_key_set.clone(),
    };

    if group.genesis_seed.is_empty() {
        group.genesis_seed = group.hash().to_vec();
    }

    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::dkg::test_utils::{gen_group_with_shares, gen_nodes};

    use assert_matches::assert_matches;
    use eyre::Result;

    fn participants(nodes: &[crate::node::dkg::test_utils::TestNode]) -> Vec<Participant> {
        nodes.iter().map(|n| n.participant.clone()).collect()
    }

    #[test]
    fn setup_is_initial_without_a_finished_epoch() -> Result<()> {
        let nodes = gen_nodes(1);
        let setup = ProtocolSetup::build(&nodes[0].participant, None)?;
        assert_matches!(setup, ProtocolSetup::Initial);
        Ok(())
    }

    #[test]
    fn setup_carries_the_previous_material_for_old_members() -> Result<()> {
        let nodes = gen_nodes(3);
        let members = participants(&nodes);
        let (group, shares) = gen_group_with_shares("default", &members, 2);
        let my_index = group
            .node_index(&nodes[0].participant.address)
            .expect("old member") as usize;
        let share = shares
            .into_iter()
            .nth(my_index)
            .expect("share for old member");
        let finished = DkgState::from_group(group.clone(), share);

        let setup = ProtocolSetup::build(&nodes[0].participant, Some(&finished))?;
        assert_matches!(setup, ProtocolSetup::Reshare {
            ref previous_nodes,
            previous_threshold,
            ref previous_public,
            ref previous_share,
        } => {
            assert_eq!(previous_nodes.len(), 3);
            assert_eq!(previous_threshold, 2);
            assert_eq!(*previous_public, group.public_key_set);
            assert!(previous_share.is_some());
        });
        check_previous_share(&setup)?;

        // A joiner gets the previous material but no share.
        let joiner = crate::node::dkg::test_utils::TestNode::new("127.0.0.1:9999");
        let setup = ProtocolSetup::build(&joiner.participant, Some(&finished))?;
        assert_matches!(setup, ProtocolSetup::Reshare { ref previous_share, .. } => {
            assert!(previous_share.is_none());
        });
        Ok(())
    }

    #[test]
    fn a_stale_share_refuses_to_run() {
        let nodes = gen_nodes(3);
        let members = participants(&nodes);
        let (group, _shares) = gen_group_with_shares("default", &members, 2);
        // A share from some other key set does not open this group's key.
        let (_other_group, other_shares) = gen_group_with_shares("default", &members, 2);
        let stale = other_shares.into_iter().next().expect("share");

        let setup = ProtocolSetup::Reshare {
            previous_nodes: group.participants(),
            previous_threshold: group.threshold,
            previous_public: group.public_key_set,
            previous_share: Some(stale),
        };
        assert_matches!(check_previous_share(&setup), Err(Error::Protocol(_)));
    }

    #[test]
    fn handover_needs_a_quorum_of_the_outgoing_group() -> Result<()> {
        let nodes = gen_nodes(3);
        let members = participants(&nodes);
        let (group, _shares) = gen_group_with_shares("default", &members, 2);
        let newcomers = participants(&gen_nodes(3));

        let setup = ProtocolSetup::Reshare {
            previous_nodes: group.participants(),
            previous_threshold: group.threshold,
            previous_public: group.public_key_set,
            previous_share: None,
        };

        // Only one old member qualified: below the previous threshold.
        let mut qualified = newcomers.clone();
        qualified.push(members[0].clone());
        assert_matches!(
            check_reshare_handover(&setup, &qualified),
            Err(Error::Protocol(_))
        );

        qualified.push(members[1].clone());
        check_reshare_handover(&setup, &qualified)?;

        // An initial setup has no outgoing group to consult.
        check_reshare_handover(&ProtocolSetup::Initial, &newcomers)?;
        Ok(())
    }
}
