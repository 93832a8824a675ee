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

//! Node bootstrap
//!
//! Recovery runs in two phases:
//!
//! 1. Load the newest snapshot into an empty store
//! 2. Replay accepted blocks after the snapshot block, in bootstrap mode
//!
//! A snapshot that cannot be decoded or validated stops the bootstrap; the
//! store is never left half-loaded.

use tracing::{info, warn};

use crate::{
	event::{ChainBatch, EventIngestor},
	snapshot::{OrderStoreSnapshot, SnapshotError, SnapshotStorage},
	store::OrderStore,
};

/// Bootstrap coordinator
pub struct RecoveryCoordinator {
	snapshot_storage: Box<dyn SnapshotStorage>,
}

impl RecoveryCoordinator {
	pub fn new(snapshot_storage: Box<dyn SnapshotStorage>) -> Self {
		Self { snapshot_storage }
	}

	/// Hand the storage on to the snapshotter once bootstrap is done
	pub fn into_storage(self) -> Box<dyn SnapshotStorage> {
		self.snapshot_storage
	}

	/// Restore the newest snapshot into `store`
	///
	/// Returns:
	/// - Ok(Some(block)): store restored through `block`
	/// - Ok(None): no snapshot, clean start
	/// - Err(e): snapshot unusable
	pub fn recover(&self, store: &OrderStore) -> Result<Option<u64>, SnapshotError> {
		info!("Starting order store recovery...");

		let snapshot = match self.snapshot_storage.load_latest() {
			Ok(snapshot) => snapshot,
			Err(SnapshotError::NotFound) => {
				info!("No snapshot found, starting from empty state");
				return Ok(None);
			}
			Err(e) => return Err(e),
		};

		info!(
			block_number = snapshot.metadata.block_number,
			size_bytes = snapshot.metadata.size_bytes,
			"Loaded snapshot"
		);

		let decoded = OrderStoreSnapshot::decode(&snapshot.state_data)?;
		if decoded.block_number != snapshot.metadata.block_number {
			return Err(SnapshotError::Corrupted(format!(
				"snapshot stored for block {} holds state of block {}",
				snapshot.metadata.block_number, decoded.block_number
			)));
		}
		let block_number = decoded.block_number;
		store
			.load_from_snapshot(decoded)
			.map_err(|e| SnapshotError::Corrupted(e.to_string()))?;

		info!(block_number, "Order store restored from snapshot");
		Ok(Some(block_number))
	}

	/// Re-apply accepted blocks newer than `after_block`, returns how many
	///
	/// Head-only batches are ignored; every accepted block goes through both
	/// ingestion paths and is then accepted by the store.
	pub fn replay(ingestor: &EventIngestor, batches: &[ChainBatch], after_block: Option<u64>) -> usize {
		let mut replayed = 0;
		for batch in batches {
			if !batch.accepted {
				continue;
			}
			if after_block.is_some_and(|after| batch.block_number <= after) {
				continue;
			}
			ingestor.process_events(&batch.logs);
			ingestor.process_accepted_events(&batch.logs, true);
			ingestor.store().accept(batch.block_number, batch.block_timestamp);
			replayed += 1;
		}

		if replayed > 0 {
			info!(replayed, after_block = ?after_block, "Accepted blocks replayed");
		} else {
			warn!(after_block = ?after_block, "No accepted blocks to replay");
		}
		replayed
	}
}
