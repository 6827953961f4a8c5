// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Domain types shared across the crate.

pub mod group;
pub mod keys;

pub use group::{GroupDescriptor, GroupNode, KeyShare};

use keys::{Keypair, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use xor_name::XorName;

/// An addressable ceremony member: network address, long-term public key and
/// the member's signature over its own public key.
#[derive(Clone, Serialize, Deserialize, custom_debug::Debug)]
pub struct Participant {
    pub address: String,
    #[serde(with = "serde_bytes")]
    #[debug(with = "crate::types::fmt_hex")]
    pub public_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    #[debug(with = "crate::types::fmt_hex")]
    pub signature: Vec<u8>,
}

// Equality is by address. Ordering, where the key generation library needs
// one, goes through `key_name` (lexicographic public key bytes) instead.
impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Participant {}

impl Participant {
    /// Build a self-signed participant record from a node's keypair.
    pub fn new(address: impl Into<String>, keypair: &Keypair) -> Self {
        let public_key = keypair.public.to_bytes().to_vec();
        let signature = keys::sign(&public_key, keypair).to_bytes().to_vec();
        Self {
            address: address.into(),
            public_key,
            signature,
        }
    }

    /// A participant with no self-signature, as imported from a group file.
    /// The signature gets filled in at the next proposal this node makes.
    pub fn unsigned(address: impl Into<String>, public_key: &PublicKey) -> Self {
        Self {
            address: address.into(),
            public_key: public_key.to_bytes().to_vec(),
            signature: vec![],
        }
    }

    pub fn public_key(&self) -> Result<PublicKey, Error> {
        keys::pub_key(&self.public_key).map_err(|_| Error::MalformedPublicKey(self.address.clone()))
    }

    /// Participant id under the key generation library.
    pub fn key_name(&self) -> Result<XorName, Error> {
        keys::name_from_bytes(&self.public_key)
            .ok_or_else(|| Error::MalformedPublicKey(self.address.clone()))
    }

    /// Checks the self-signature over the public key bytes.
    pub fn verify_identity(&self) -> Result<(), Error> {
        let public_key = self.public_key()?;
        keys::verify(&self.public_key, &public_key, &self.signature)
            .map_err(|_| Error::InvalidParticipantSignature(self.address.clone()))
    }
}

impl Display for Participant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Identifier of the signature scheme a beacon runs under.
///
/// A closed set: proposals naming any other id are rejected outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheme {
    #[serde(rename = "pedersen-bls-chained")]
    PedersenBlsChained,
    #[serde(rename = "pedersen-bls-unchained")]
    PedersenBlsUnchained,
    #[serde(rename = "bls-unchained-g1-rfc9380")]
    BlsUnchainedG1Rfc9380,
}

impl Scheme {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "pedersen-bls-chained" => Some(Self::PedersenBlsChained),
            "pedersen-bls-unchained" => Some(Self::PedersenBlsUnchained),
            "bls-unchained-g1-rfc9380" => Some(Self::BlsUnchainedG1Rfc9380),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::PedersenBlsChained => "pedersen-bls-chained",
            Self::PedersenBlsUnchained => "pedersen-bls-unchained",
            Self::BlsUnchainedG1Rfc9380 => "bls-unchained-g1-rfc9380",
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::PedersenBlsChained
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Errors raised by the shared types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("participant {0} carries a malformed public key")]
    MalformedPublicKey(String),
    #[error("participant {0} carries an invalid self-signature")]
    InvalidParticipantSignature(String),
    #[error("unknown scheme id {0:?}")]
    UnknownScheme(String),
}

pub(crate) fn fmt_hex(bytes: &Vec<u8>, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{:.8}", hex_fmt::HexFmt(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_equality_is_by_address() {
        let keypair_a = keys::gen_keypair();
        let keypair_b = keys::gen_keypair();

        let a = Participant::new("127.0.0.1:8080", &keypair_a);
        let same_addr = Participant::new("127.0.0.1:8080", &keypair_b);
        let other_addr = Participant::new("127.0.0.1:9090", &keypair_a);

        assert_eq!(a, same_addr);
        assert_ne!(a, other_addr);
    }

    #[test]
    fn self_signature_round_trip() {
        let keypair = keys::gen_keypair();
        let participant = Participant::new("127.0.0.1:8080", &keypair);
        assert!(participant.verify_identity().is_ok());

        let mut tampered = participant;
        tampered.public_key = keys::gen_keypair().public.to_bytes().to_vec();
        assert!(tampered.verify_identity().is_err());
    }

    mod identity_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn any_keypair_yields_a_verifiable_identity(
                keypair in keys::test_utils::arbitrary_keypair()
            ) {
                let participant = Participant::new("127.0.0.1:8080", &keypair);
                prop_assert!(participant.verify_identity().is_ok());
            }
        }
    }

    #[test]
    fn scheme_ids_round_trip() {
        for scheme in [
            Scheme::PedersenBlsChained,
            Scheme::PedersenBlsUnchained,
            Scheme::BlsUnchainedG1Rfc9380,
        ] {
            assert_eq!(Scheme::from_id(scheme.id()), Some(scheme));
        }
        assert_eq!(Scheme::from_id("schnorr-over-carrier-pigeon"), None);
    }
}
