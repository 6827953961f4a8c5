// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! The ceremony-coordinating side of a beacon node.

pub mod dkg;
mod error;
mod transport;

pub use self::{
    dkg::{
        minimum_threshold, BeaconKeys, DkgState, Process, ProcessConfig, SharingOutput,
        StateError, StaticKeys, Status,
    },
    error::{Error, Result},
    transport::Transport,
};
