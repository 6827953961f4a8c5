// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Wire types exchanged between ceremony members and with the operator.

mod commands;

pub use commands::{
    Command, CommandMetadata, DkgCommand, DkgEntry, DkgStatusResponse, FirstProposalOptions,
    ProposalOptions,
};

use crate::types::Participant;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, SystemTime};

/// The signed, gossiped description of one ceremony epoch.
///
/// The canonical byte form used for signing is the bincode encoding of this
/// struct; metadata is deliberately not a field so it can never leak into
/// the signed bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalTerms {
    pub beacon_id: String,
    pub epoch: u32,
    pub leader: Participant,
    pub threshold: u32,
    pub timeout: SystemTime,
    pub catchup_period: Duration,
    pub beacon_period: Duration,
    pub scheme_id: String,
    pub genesis_time: SystemTime,
    #[serde(with = "serde_bytes")]
    pub genesis_seed: Vec<u8>,
    pub transition_time: SystemTime,
    pub joining: Vec<Participant>,
    pub remaining: Vec<Participant>,
    pub leaving: Vec<Participant>,
}

/// Sidecar carried by every gossip packet: which beacon, who sent it and
/// their signature over the canonical terms plus the message-type tag.
#[derive(Clone, Serialize, Deserialize, custom_debug::Debug)]
pub struct GossipMetadata {
    pub beacon_id: String,
    pub address: String,
    #[serde(with = "serde_bytes")]
    #[debug(with = "crate::types::fmt_hex")]
    pub signature: Vec<u8>,
}

/// The protocol payloads a ceremony gossips around.
#[derive(Clone, Serialize, Deserialize, custom_debug::Debug)]
pub enum GossipData {
    Proposal(ProposalTerms),
    Accept {
        acceptor: Participant,
    },
    Reject {
        rejector: Participant,
    },
    Abort {
        reason: String,
    },
    Execute {
        kickoff_time: SystemTime,
    },
    /// An opaque message of the underlying key generation protocol,
    /// relayed through the per-epoch echo broadcast board.
    Dkg {
        #[serde(with = "serde_bytes")]
        #[debug(with = "crate::types::fmt_hex")]
        payload: Vec<u8>,
    },
}

impl GossipData {
    /// Message-type tag mixed into the signature input.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Proposal(_) => "proposal",
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::Abort { .. } => "abort",
            Self::Execute { .. } => "execute",
            Self::Dkg { .. } => "dkg",
        }
    }
}

impl Display for GossipData {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A signed packet as it travels between nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipPacket {
    pub data: GossipData,
    pub metadata: GossipMetadata,
}

impl GossipPacket {
    /// Replay-suppression fingerprint: the hex form of the signature.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.metadata.signature)
    }

    /// First characters of the fingerprint, for logging.
    pub fn short_sig(&self) -> String {
        let mut fingerprint = self.fingerprint();
        fingerprint.truncate(8);
        fingerprint
    }
}

impl Display for GossipPacket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} ({})",
            self.data,
            self.metadata.address,
            self.short_sig()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::keys;

    fn packet(signature: Vec<u8>) -> GossipPacket {
        GossipPacket {
            data: GossipData::Abort {
                reason: "operator said so".to_string(),
            },
            metadata: GossipMetadata {
                beacon_id: "default".to_string(),
                address: "127.0.0.1:8080".to_string(),
                signature,
            },
        }
    }

    #[test]
    fn fingerprint_is_signature_hex() {
        let packet = packet(vec![0xab, 0xcd, 0xef, 0x01, 0x23]);
        assert_eq!(packet.fingerprint(), "abcdef0123");
        assert_eq!(packet.short_sig(), "abcdef01");
    }

    #[test]
    fn encode_decode_preserves_signature_bytes() {
        let keypair = keys::gen_keypair();
        let signature = keys::sign(b"some terms", &keypair).to_bytes().to_vec();
        let packet = packet(signature.clone());

        let bytes = bincode::serialize(&packet).expect("serializable packet");
        let decoded: GossipPacket = bincode::deserialize(&bytes).expect("decodable packet");

        assert_eq!(decoded.metadata.signature, signature);
    }
}
