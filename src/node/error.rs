// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

use crate::node::dkg::StateError;

use thiserror::Error;

/// The type returned by the ceremony handling methods.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Internal error.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum Error {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Identity(#[from] crate::types::Error),
    #[error("Database error: {0}")]
    Database(#[from] crate::dbs::Error),
    #[error("Failed to send a message to {0}")]
    FailedSend(String),
    #[error("Empty or malformed packet")]
    InvalidPayload,
    #[error("Packet signature is too short")]
    SignatureTooShort,
    #[error("Sender {0:?} is not a signing member of this ceremony")]
    UnknownSender(String),
    #[error("Invalid packet signature from {0:?}")]
    InvalidPacketSignature(String),
    #[error("No keypair available for beacon {0:?}")]
    MissingKeypair(String),
    #[error("The process is shutting down")]
    Closed,
    #[error("The key generation did not finish before the proposal timeout")]
    ProtocolTimeout,
    #[error("Key generation failed: {0}")]
    Protocol(String),
    #[error("The generated key share does not match the group key")]
    CorruptedOutcome,
    #[error("This node did not qualify for the final group")]
    NotQualified,
    #[error("A key generation is already running for beacon {0:?}")]
    ExecutionInProgress(String),
}
