// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

use crate::messaging::GossipPacket;
use crate::node::Result;
use crate::types::Participant;

use async_trait::async_trait;

/// Outbound side of the wire: a bidirectional authenticated channel between
/// addressable peers is assumed to exist underneath.
///
/// The ceremony only ever pushes packets; inbound delivery happens by the
/// embedding server calling [`Process::packet`] and
/// [`Process::broadcast_dkg`].
///
/// [`Process::packet`]: crate::node::Process::packet
/// [`Process::broadcast_dkg`]: crate::node::Process::broadcast_dkg
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, recipient: &Participant, packet: GossipPacket) -> Result<()>;
}
