// Copyright 2026 Beacon DKG Developers.
//
// This Beacon DKG Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the Beacon DKG Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the Beacon DKG Software.

use super::{deserialise, serialise, Error, Result};
use crate::node::dkg::DkgState;
use crate::types::{GroupDescriptor, KeyShare};

use sled::{Batch, Db, Tree};
use std::path::Path;

const CURRENT_KEY: &[u8] = b"current";
const FINISHED_KEY: &[u8] = b"finished";

/// Durable per-beacon ceremony records: one in-progress slot and one slot
/// for the most recently finished epoch.
pub trait DkgStore: Send + Sync + 'static {
    /// The in-progress record, or a synthesized fresh one if the beacon has
    /// never seen a proposal.
    fn get_current(&self, beacon_id: &str) -> Result<DkgState>;

    /// The last completed record, if the beacon ever finished an epoch.
    fn get_finished(&self, beacon_id: &str) -> Result<Option<DkgState>>;

    /// Overwrite the in-progress slot.
    fn save_current(&self, state: &DkgState) -> Result<()>;

    /// Update the finished slot and replace the current slot with the same
    /// record, atomically. A crash can never leave `current` pointing at a
    /// stale in-progress epoch while `finished` has advanced.
    fn save_finished(&self, state: &DkgState) -> Result<()>;

    /// One-time import of a pre-existing group descriptor plus local share.
    /// Fails if the beacon already has any stored record.
    fn migrate_from_group(&self, group: GroupDescriptor, share: KeyShare) -> Result<()>;

    /// Destroy both slots of one beacon.
    fn nuke_state(&self, beacon_id: &str) -> Result<()>;

    /// The beacons with stored records.
    fn beacon_ids(&self) -> Result<Vec<String>>;
}

/// Sled-backed store, one tree per beacon.
#[derive(Clone, Debug)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn tree(&self, beacon_id: &str) -> Result<Tree> {
        Ok(self.db.open_tree(beacon_id)?)
    }
}

impl DkgStore for SledStore {
    fn get_current(&self, beacon_id: &str) -> Result<DkgState> {
        match self.tree(beacon_id)?.get(CURRENT_KEY)? {
            Some(bytes) => deserialise(&bytes),
            None => Ok(DkgState::fresh(beacon_id)),
        }
    }

    fn get_finished(&self, beacon_id: &str) -> Result<Option<DkgState>> {
        match self.tree(beacon_id)?.get(FINISHED_KEY)? {
            Some(bytes) => Ok(Some(deserialise(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_current(&self, state: &DkgState) -> Result<()> {
        let bytes = serialise(state)?;
        let _old = self.tree(&state.beacon_id)?.insert(CURRENT_KEY, bytes)?;
        Ok(())
    }

    fn save_finished(&self, state: &DkgState) -> Result<()> {
        let bytes = serialise(state)?;
        let mut batch = Batch::default();
        batch.insert(CURRENT_KEY, bytes.clone());
        batch.insert(FINISHED_KEY, bytes);
        self.tree(&state.beacon_id)?.apply_batch(batch)?;
        Ok(())
    }

    fn migrate_from_group(&self, group: GroupDescriptor, share: KeyShare) -> Result<()> {
        let tree = self.tree(&group.beacon_id)?;
        if tree.get(CURRENT_KEY)?.is_some() || tree.get(FINISHED_KEY)?.is_some() {
            return Err(Error::BeaconExists(group.beacon_id));
        }

        let state = DkgState::from_group(group, share);
        self.save_finished(&state)
    }

    fn nuke_state(&self, beacon_id: &str) -> Result<()> {
        let _existed = self.db.drop_tree(beacon_id)?;
        Ok(())
    }

    fn beacon_ids(&self) -> Result<Vec<String>> {
        let mut ids = vec![];
        for name in self.db.tree_names() {
            if name.as_ref() == b"__sled__default" {
                continue;
            }
            let id = String::from_utf8(name.to_vec())
                .map_err(|_| Error::CouldNotParseDbKey(name.to_vec()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::dkg::test_utils::{gen_group_and_share, gen_nodes};
    use crate::node::dkg::Status;

    use assert_matches::assert_matches;
    use eyre::Result;
    use tempfile::tempdir;

    fn store() -> Result<(tempfile::TempDir, SledStore)> {
        let dir = tempdir()?;
        let store = SledStore::open(dir.path().join("dkg"))?;
        Ok((dir, store))
    }

    #[test]
    fn unknown_beacon_yields_a_fresh_record() -> Result<()> {
        let (_dir, store) = store()?;

        let current = store.get_current("default")?;
        assert_eq!(current.status, Status::Fresh);
        assert_eq!(current.epoch, 0);
        assert!(store.get_finished("default")?.is_none());
        Ok(())
    }

    #[test]
    fn save_current_round_trips() -> Result<()> {
        let (_dir, store) = store()?;
        let nodes = gen_nodes(3);
        let joining: Vec<_> = nodes.iter().map(|n| n.participant.clone()).collect();
        let (group, share) = gen_group_and_share("default", &joining, 2, 0);
        let state = DkgState::from_group(group, share);

        store.save_current(&state)?;
        let loaded = store.get_current("default")?;
        assert_eq!(loaded.status, Status::Complete);
        assert_eq!(loaded.epoch, state.epoch);
        assert_eq!(loaded.genesis_seed, state.genesis_seed);
        assert_eq!(
            loaded.final_group.map(|g| g.hash()),
            state.final_group.map(|g| g.hash())
        );
        Ok(())
    }

    #[test]
    fn save_finished_updates_both_slots() -> Result<()> {
        let (_dir, store) = store()?;
        let nodes = gen_nodes(3);
        let joining: Vec<_> = nodes.iter().map(|n| n.participant.clone()).collect();
        let (group, share) = gen_group_and_share("default", &joining, 2, 0);
        let state = DkgState::from_group(group, share);

        store.save_finished(&state)?;

        let current = store.get_current("default")?;
        let finished = store.get_finished("default")?.expect("finished slot set");
        assert_eq!(current.epoch, state.epoch);
        assert_eq!(current.status, Status::Complete);
        assert_eq!(finished.epoch, state.epoch);
        assert_eq!(finished.status, Status::Complete);
        Ok(())
    }

    #[test]
    fn migration_is_one_time_only() -> Result<()> {
        let (_dir, store) = store()?;
        let nodes = gen_nodes(3);
        let joining: Vec<_> = nodes.iter().map(|n| n.participant.clone()).collect();
        let (group, share) = gen_group_and_share("default", &joining, 2, 0);

        store.migrate_from_group(group.clone(), share.clone())?;
        assert_matches!(
            store.migrate_from_group(group, share),
            Err(Error::BeaconExists(_))
        );
        Ok(())
    }

    #[test]
    fn nuke_destroys_both_slots() -> Result<()> {
        let (_dir, store) = store()?;
        let nodes = gen_nodes(3);
        let joining: Vec<_> = nodes.iter().map(|n| n.participant.clone()).collect();
        let (group, share) = gen_group_and_share("default", &joining, 2, 0);
        store.migrate_from_group(group, share)?;

        store.nuke_state("default")?;
        assert_eq!(store.get_current("default")?.status, Status::Fresh);
        assert!(store.get_finished("default")?.is_none());
        Ok(())
    }

    #[test]
    fn beacons_are_listed_per_tree() -> Result<()> {
        let (_dir, store) = store()?;
        let nodes = gen_nodes(3);
        let joining: Vec<_> = nodes.iter().map(|n| n.participant.clone()).collect();

        for beacon_id in ["alpha", "beta"] {
            let (group, share) = gen_group_and_share(beacon_id, &joining, 2, 0);
            store.migrate_from_group(group, share)?;
        }

        let mut ids = store.beacon_ids()?;
        ids.sort();
        assert_eq!(ids, vec!["alpha".to_string(), "beta".to_string()]);
        Ok(())
    }
}
