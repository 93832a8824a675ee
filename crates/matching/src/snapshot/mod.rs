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

//! Order store snapshots
//!
//! A snapshot is the full store state plus the accepted block it is valid
//! through. Bootstrap loads the newest one and replays accepted logs after
//! that block.

pub mod snapshotter;
mod storage;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreState;
pub use snapshotter::{Snapshotter, SnapshotterConfig};
pub use storage::{FileSnapshotStorage, MemorySnapshotStorage, Snapshot, SnapshotMetadata, SnapshotStorage};

/// Format version written into every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Error types for snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
	#[error("Failed to create snapshot: {0}")]
	CreationFailed(String),
	#[error("Snapshot corrupted: {0}")]
	Corrupted(String),
	#[error("No snapshot available")]
	NotFound,
	#[error("Snapshot I/O failed: {0}")]
	Io(#[from] std::io::Error),
}

/// Deep copy of the order store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStoreSnapshot {
	pub version: u32,
	/// Last accepted block reflected in `state`
	pub block_number: u64,
	pub state: StoreState,
}

impl OrderStoreSnapshot {
	pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
		serde_json::to_vec(self).map_err(|e| SnapshotError::CreationFailed(e.to_string()))
	}

	pub fn decode(data: &[u8]) -> Result<Self, SnapshotError> {
		let snapshot: Self = serde_json::from_slice(data).map_err(|e| SnapshotError::Corrupted(e.to_string()))?;
		if snapshot.version != SNAPSHOT_VERSION {
			return Err(SnapshotError::Corrupted(format!(
				"unsupported snapshot version {}",
				snapshot.version
			)));
		}
		Ok(snapshot)
	}
}
