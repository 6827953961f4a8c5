// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Operator-facing command and status types.
//!
//! A control server (RPC or local channel) wraps these; the core only sees
//! the decoded values.

use crate::types::{GroupDescriptor, Participant};

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Which beacon an operator command addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMetadata {
    pub beacon_id: String,
}

/// An operator command together with its target beacon.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DkgCommand {
    pub metadata: CommandMetadata,
    pub command: Command,
}

/// The seven operator events driving a ceremony.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Command {
    /// Propose the very first epoch of a beacon, with this node as leader.
    Initial(FirstProposalOptions),
    /// Propose an epoch transition from the current group.
    Resharing(ProposalOptions),
    /// Signal interest as a joiner. After epoch 1 the previous group
    /// descriptor must be supplied.
    Join { group_file: Option<GroupDescriptor> },
    /// Accept the proposal this node last observed.
    Accept,
    /// Reject the proposal this node last observed.
    Reject,
    /// Leader only: start the key generation rounds.
    Execute,
    /// Leader only: abandon the proposed epoch.
    Abort { reason: String },
}

/// Operator input for a first-epoch proposal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirstProposalOptions {
    pub timeout: SystemTime,
    pub threshold: u32,
    pub beacon_period: Duration,
    pub catchup_period: Duration,
    pub scheme_id: String,
    pub genesis_time: SystemTime,
    pub joining: Vec<Participant>,
}

/// Operator input for a reshare proposal. Genesis constants, periods and
/// scheme are carried over from the finished epoch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalOptions {
    pub timeout: SystemTime,
    pub threshold: u32,
    pub transition_time: SystemTime,
    pub joining: Vec<Participant>,
    pub remaining: Vec<Participant>,
    pub leaving: Vec<Participant>,
}

/// One epoch record as reported to the operator: key material stripped,
/// the group reduced to its node addresses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgEntry {
    pub beacon_id: String,
    pub epoch: u32,
    pub status: String,
    pub threshold: u32,
    pub timeout: SystemTime,
    pub leader: Option<String>,
    pub joining: Vec<String>,
    pub remaining: Vec<String>,
    pub leaving: Vec<String>,
    pub acceptors: Vec<String>,
    pub rejectors: Vec<String>,
    pub final_group: Vec<String>,
    pub group_hash: Option<String>,
}

/// Reply to a status query: the in-progress record and, when one exists,
/// the most recently finished record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DkgStatusResponse {
    pub current: DkgEntry,
    pub complete: Option<DkgEntry>,
}
