// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Instant;

use tracing::{debug, error, info};

use super::{Snapshot, SnapshotError, SnapshotMetadata, SnapshotStorage};
use crate::{
	config::{DEFAULT_MAX_SNAPSHOTS_TO_KEEP, DEFAULT_SNAPSHOT_INTERVAL_BLOCKS},
	store::OrderStore,
};

/// Configuration for the Snapshotter
#[derive(Debug, Clone)]
pub struct SnapshotterConfig {
	/// Snapshot on accepted blocks divisible by this; 0 disables
	pub snapshot_interval_blocks: u64,
	/// Keep at most this many recent snapshots
	pub max_snapshots_to_keep: usize,
}

impl Default for SnapshotterConfig {
	fn default() -> Self {
		Self {
			snapshot_interval_blocks: DEFAULT_SNAPSHOT_INTERVAL_BLOCKS,
			max_snapshots_to_keep: DEFAULT_MAX_SNAPSHOTS_TO_KEEP,
		}
	}
}

/// Captures the order store every N accepted blocks
///
/// Driven by the host right after `OrderStore::accept`, so each snapshot
/// lines up with a block boundary and bootstrap can replay accepted logs
/// from the following block.
pub struct Snapshotter {
	storage: Box<dyn SnapshotStorage>,
	config: SnapshotterConfig,
}

impl Snapshotter {
	pub fn new(storage: Box<dyn SnapshotStorage>, config: SnapshotterConfig) -> Self {
		Self { storage, config }
	}

	/// Snapshot if `block_number` falls on the interval
	pub fn on_block_accepted(&mut self, store: &OrderStore, block_number: u64) -> Result<Option<SnapshotMetadata>, SnapshotError> {
		let interval = self.config.snapshot_interval_blocks;
		if interval == 0 || block_number % interval != 0 {
			return Ok(None);
		}
		self.take_snapshot(store).map(Some)
	}

	/// Capture, persist and prune
	pub fn take_snapshot(&mut self, store: &OrderStore) -> Result<SnapshotMetadata, SnapshotError> {
		let start = Instant::now();
		let snapshot = store.get_order_book_snapshot();
		let block_number = snapshot.block_number;
		let state_data = snapshot.encode()?;
		let capture_duration = start.elapsed();

		let snapshot = Snapshot::new(block_number, state_data);
		let metadata = snapshot.metadata.clone();
		if let Err(e) = self.storage.save(snapshot) {
			error!(target: "snapshotter", block_number, error = %e, "Failed to save snapshot");
			return Err(e);
		}

		let total_duration = start.elapsed();
		info!(
			target: "snapshotter",
			block_number,
			size_bytes = metadata.size_bytes,
			capture_ms = capture_duration.as_millis(),
			save_ms = (total_duration - capture_duration).as_millis(),
			"Snapshot created and saved"
		);

		self.cleanup();
		Ok(metadata)
	}

	fn cleanup(&mut self) {
		let keep = self.config.max_snapshots_to_keep.max(1);
		let snapshots = self.storage.list_snapshots();
		if snapshots.len() <= keep {
			return;
		}

		let cutoff_block = snapshots[snapshots.len() - keep].block_number;
		match self.storage.cleanup_before(cutoff_block) {
			Ok(deleted) => {
				debug!(target: "snapshotter", deleted, retained = keep, cutoff_block, "Old snapshots cleaned up");
			}
			Err(e) => {
				error!(target: "snapshotter", cutoff_block, error = %e, "Failed to cleanup old snapshots");
			}
		}
	}

	pub fn storage(&self) -> &dyn SnapshotStorage {
		self.storage.as_ref()
	}

	pub fn into_storage(self) -> Box<dyn SnapshotStorage> {
		self.storage
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::{metrics::Metrics, params::StaticConfigService, snapshot::MemorySnapshotStorage};

	#[test]
	fn test_snapshots_on_interval_and_prunes() {
		let store = OrderStore::new(Arc::new(StaticConfigService::default()), Arc::new(Metrics::new()));
		let mut snapshotter = Snapshotter::new(
			Box::new(MemorySnapshotStorage::new()),
			SnapshotterConfig {
				snapshot_interval_blocks: 10,
				max_snapshots_to_keep: 2,
			},
		);

		for block in 1..=35 {
			store.accept(block, 0);
			let taken = snapshotter.on_block_accepted(&store, block).unwrap();
			assert_eq!(taken.is_some(), block % 10 == 0);
		}

		let kept: Vec<u64> = snapshotter
			.storage()
			.list_snapshots()
			.iter()
			.map(|m| m.block_number)
			.collect();
		assert_eq!(kept, vec![20, 30]);
	}
}
