// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Signing and verification of gossip packets.
//!
//! The signed bytes are `canonical(terms) || tag || beacon_id`, where the
//! terms are the *next* record's view of the proposal so that a first
//! proposal verifies against the very record it creates. Protocol packets
//! sign their payload instead of the terms. Metadata is never part of the
//! signed bytes.

use super::state::DkgState;
use crate::dbs::serialise;
use crate::messaging::{GossipData, GossipMetadata, GossipPacket};
use crate::node::{Error, Result};
use crate::types::keys::{self, Keypair};
use crate::types::Participant;

/// The byte string a packet's signature covers.
pub(crate) fn signable(data: &GossipData, next: &DkgState) -> Result<Vec<u8>> {
    let mut bytes = match data {
        GossipData::Dkg { payload } => payload.clone(),
        _ => serialise(&next.proposal_terms()?)?,
    };
    bytes.extend_from_slice(data.tag().as_bytes());
    bytes.extend_from_slice(next.beacon_id.as_bytes());
    Ok(bytes)
}

/// Sign `data` for the epoch described by `next` and wrap it into a packet.
pub(crate) fn sign_packet(
    keypair: &Keypair,
    our_address: &str,
    data: GossipData,
    next: &DkgState,
) -> Result<GossipPacket> {
    let message = signable(&data, next)?;
    let signature = keys::sign(&message, keypair);

    Ok(GossipPacket {
        data,
        metadata: GossipMetadata {
            beacon_id: next.beacon_id.clone(),
            address: our_address.to_string(),
            signature: signature.to_bytes().to_vec(),
        },
    })
}

/// Verify a packet against the record it produces.
///
/// The claimed sender must be a signing member of `next` (leavers do not
/// sign) and the signature must check out over the reconstructed bytes.
pub(crate) fn verify_packet(packet: &GossipPacket, next: &DkgState) -> Result<()> {
    let sender = signing_member(next, &packet.metadata.address)
        .ok_or_else(|| Error::UnknownSender(packet.metadata.address.clone()))?;

    let public_key = sender.public_key()?;
    let message = signable(&packet.data, next)?;

    keys::verify(&message, &public_key, &packet.metadata.signature)
        .map_err(|_| Error::InvalidPacketSignature(packet.metadata.address.clone()))
}

fn signing_member<'a>(state: &'a DkgState, address: &str) -> Option<&'a Participant> {
    state
        .joining
        .iter()
        .chain(state.remaining.iter())
        .find(|participant| participant.address == address)
}
