// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

//! Distributed key generation core for a randomness beacon node.
//!
//! The crate coordinates a multi-party key generation ceremony per beacon:
//! a persisted state machine over proposal/acceptance/execution/completion,
//! an authenticated gossip layer with retries and deduplication, and a
//! per-epoch echo-broadcast board that drives the underlying threshold
//! key generation library to a new group descriptor and key share.

// Forbid some very bad patterns. Forbid is stronger than `deny`, preventing us from suppressing the
// lint with `#[allow(...)]` et-all.
#![forbid(
    arithmetic_overflow,
    mutable_transmutes,
    no_mangle_const_items,
    unknown_crate_types,
    unsafe_code
)]
// Turn on some additional warnings to encourage good style.
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    clippy::unicode_not_nfc
)]

#[macro_use]
extern crate tracing;

pub mod dbs;
pub mod messaging;
pub mod node;
pub mod types;
