// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Durable per-beacon persistence.

mod dkg_store;

pub use dkg_store::{DkgStore, SledStore};

use serde::{de::DeserializeOwned, Serialize};
use std::io;
use thiserror::Error;

/// Specialisation of `std::Result` for dbs.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Persistence error variants.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A record already exists where a one-time import expected none.
    #[error("Beacon {0:?} already has stored ceremony state")]
    BeaconExists(String),
    /// Key not found.
    #[error("Key not found: {0:?}")]
    KeyNotFound(String),
    /// Db key parse error.
    #[error("Could not parse key: {0:?}")]
    CouldNotParseDbKey(Vec<u8>),
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Bincode error.
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    /// Sled error.
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    /// Sled transaction error.
    #[error("Sled batching error")]
    SledBatching,
}

pub(crate) fn serialise<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|err| Error::Serialize(err.to_string()))
}

pub(crate) fn deserialise<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|err| Error::Deserialize(err.to_string()))
}
