// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Long-term node identity keys.

pub use ed25519_dalek::{Keypair, PublicKey, Signature, Verifier, PUBLIC_KEY_LENGTH};

use ed25519_dalek::{ExpandedSecretKey, SignatureError};
use std::convert::TryInto;
use xor_name::XorName;

/// SHA3-256 hash digest.
pub type Digest256 = [u8; 32];

pub fn sign(msg: &[u8], keypair: &Keypair) -> Signature {
    let expanded_secret_key = ExpandedSecretKey::from(&keypair.secret);
    expanded_secret_key.sign(msg, &keypair.public)
}

pub fn verify(msg: &[u8], public_key: &PublicKey, signature: &[u8]) -> Result<(), SignatureError> {
    let signature = Signature::from_bytes(signature)?;
    public_key.verify(msg, &signature)
}

pub fn pub_key(bytes: &[u8]) -> Result<PublicKey, SignatureError> {
    PublicKey::from_bytes(bytes)
}

/// Participant id under the key generation library: the public key bytes.
///
/// Sorting these names sorts participants by lexicographic public key bytes,
/// which is also the node ordering inside a group descriptor.
pub fn name(public_key: &PublicKey) -> XorName {
    XorName(public_key.to_bytes())
}

pub fn name_from_bytes(bytes: &[u8]) -> Option<XorName> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().ok()?;
    Some(XorName(bytes))
}

/// Construct a fresh random `Keypair`.
pub fn gen_keypair() -> Keypair {
    let mut rng = rand::thread_rng();
    Keypair::generate(&mut rng)
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::Keypair;
    use ed25519_dalek::{PublicKey, SecretKey, SECRET_KEY_LENGTH};
    use proptest::prelude::*;

    pub fn arbitrary_keypair() -> impl Strategy<Value = Keypair> {
        any::<[u8; SECRET_KEY_LENGTH]>().prop_map(|bytes| {
            // `from_bytes` only fails on a wrong-length slice and the array
            // above is always `SECRET_KEY_LENGTH` long.
            #[allow(clippy::unwrap_used)]
            let secret = SecretKey::from_bytes(&bytes[..]).unwrap();
            let public = PublicKey::from(&secret);

            Keypair { secret, public }
        })
    }
}
