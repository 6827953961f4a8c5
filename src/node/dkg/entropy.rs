// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Operator-supplied entropy for the key generation rounds.

use rand::rngs::{StdRng, ThreadRng};
use rand::{Error as RandError, RngCore, SeedableRng};
use std::process::Command;
use tiny_keccak::{Hasher, Sha3};

/// Names an executable whose output seeds the protocol rng. When set, the
/// rounds use ONLY that seed (user-only mode). Cleared at the end of each
/// execution.
pub const ENTROPY_SOURCE_ENV: &str = "DRAND_ENTROPY_SOURCE";

/// The rng driving one execution's protocol rounds.
pub(crate) enum ProtocolRng {
    UserOnly(StdRng),
    Os(ThreadRng),
}

impl RngCore for ProtocolRng {
    fn next_u32(&mut self) -> u32 {
        match self {
            Self::UserOnly(rng) => rng.next_u32(),
            Self::Os(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Self::UserOnly(rng) => rng.next_u64(),
            Self::Os(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Self::UserOnly(rng) => rng.fill_bytes(dest),
            Self::Os(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), RandError> {
        match self {
            Self::UserOnly(rng) => rng.try_fill_bytes(dest),
            Self::Os(rng) => rng.try_fill_bytes(dest),
        }
    }
}

/// Build the rng for one execution: user-only when the environment names a
/// working entropy source, the OS rng otherwise.
pub(crate) fn protocol_rng() -> ProtocolRng {
    let source = match std::env::var(ENTROPY_SOURCE_ENV) {
        Ok(path) if !path.is_empty() => path,
        _ => return ProtocolRng::Os(rand::thread_rng()),
    };

    match read_entropy(&source) {
        Ok(seed) => ProtocolRng::UserOnly(StdRng::from_seed(seed)),
        Err(error) => {
            warn!(
                "entropy source {:?} failed ({}), falling back to the OS rng",
                source, error
            );
            ProtocolRng::Os(rand::thread_rng())
        }
    }
}

/// The source is consumed once per execution; the driver clears it when
/// the execution finishes.
pub(crate) fn clear_source() {
    std::env::remove_var(ENTROPY_SOURCE_ENV);
}

// Whiten however much the source produced into a fixed-size seed.
fn read_entropy(source: &str) -> std::io::Result<[u8; 32]> {
    let output = Command::new(source).output()?;
    if output.stdout.is_empty() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "entropy source produced no output",
        ));
    }

    let mut hasher = Sha3::v256();
    hasher.update(&output.stdout);
    let mut seed = [0u8; 32];
    hasher.finalize(&mut seed);
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation keeps these assertions in one sequential test.
    #[test]
    fn rng_source_selection() {
        std::env::remove_var(ENTROPY_SOURCE_ENV);
        assert!(matches!(protocol_rng(), ProtocolRng::Os(_)));

        // A source that produces stable output yields a deterministic,
        // user-only rng.
        std::env::set_var(ENTROPY_SOURCE_ENV, "uname");
        let mut first = protocol_rng();
        let mut second = protocol_rng();
        assert!(matches!(first, ProtocolRng::UserOnly(_)));
        assert_eq!(first.next_u64(), second.next_u64());

        // A missing executable falls back to the OS rng.
        std::env::set_var(ENTROPY_SOURCE_ENV, "/definitely/not/a/binary");
        assert!(matches!(protocol_rng(), ProtocolRng::Os(_)));

        std::env::set_var(ENTROPY_SOURCE_ENV, "uname");
        clear_source();
        assert!(matches!(protocol_rng(), ProtocolRng::Os(_)));
    }
}
