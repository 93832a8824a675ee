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

use std::{
	fs,
	path::{Path, PathBuf},
	time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::SnapshotError;

/// Metadata about a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
	/// When the snapshot was created (unix timestamp)
	pub created_at: u64,
	/// Last accepted block the snapshot reflects
	pub block_number: u64,
	/// Size of the encoded state in bytes
	pub size_bytes: usize,
}

/// Encoded snapshot with its metadata
#[derive(Debug, Clone)]
pub struct Snapshot {
	pub metadata: SnapshotMetadata,
	pub state_data: Vec<u8>,
}

impl Snapshot {
	pub fn new(block_number: u64, state_data: Vec<u8>) -> Self {
		let created_at = SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs())
			.unwrap_or(0);
		Self {
			metadata: SnapshotMetadata {
				created_at,
				block_number,
				size_bytes: state_data.len(),
			},
			state_data,
		}
	}
}

/// Persistence layer for snapshots
///
/// Only recent snapshots are kept; older ones are deleted by the
/// snapshotter once newer ones exist.
pub trait SnapshotStorage: Send {
	fn save(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError>;

	fn load_latest(&self) -> Result<Snapshot, SnapshotError>;

	/// Newest snapshot taken at or before `block_number`
	fn load_at_block(&self, block_number: u64) -> Result<Snapshot, SnapshotError>;

	/// Metadata of every stored snapshot, oldest first
	fn list_snapshots(&self) -> Vec<SnapshotMetadata>;

	/// Delete snapshots older than `block_number`
	fn cleanup_before(&mut self, block_number: u64) -> Result<usize, SnapshotError>;
}

/// In-memory snapshot storage for tests and ephemeral nodes
#[derive(Default)]
pub struct MemorySnapshotStorage {
	snapshots: Mutex<Vec<Snapshot>>,
}

impl MemorySnapshotStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

impl SnapshotStorage for MemorySnapshotStorage {
	fn save(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
		let mut snapshots = self.snapshots.lock();
		snapshots.retain(|s| s.metadata.block_number != snapshot.metadata.block_number);
		snapshots.push(snapshot);
		snapshots.sort_by_key(|s| s.metadata.block_number);
		Ok(())
	}

	fn load_latest(&self) -> Result<Snapshot, SnapshotError> {
		self.snapshots.lock().last().cloned().ok_or(SnapshotError::NotFound)
	}

	fn load_at_block(&self, block_number: u64) -> Result<Snapshot, SnapshotError> {
		self.snapshots
			.lock()
			.iter()
			.rev()
			.find(|s| s.metadata.block_number <= block_number)
			.cloned()
			.ok_or(SnapshotError::NotFound)
	}

	fn list_snapshots(&self) -> Vec<SnapshotMetadata> {
		self.snapshots.lock().iter().map(|s| s.metadata.clone()).collect()
	}

	fn cleanup_before(&mut self, block_number: u64) -> Result<usize, SnapshotError> {
		let mut snapshots = self.snapshots.lock();
		let original_len = snapshots.len();
		snapshots.retain(|s| s.metadata.block_number >= block_number);
		Ok(original_len - snapshots.len())
	}
}

/// One file per snapshot, `snapshot-{block}.json`, in a directory
pub struct FileSnapshotStorage {
	dir: PathBuf,
}

impl FileSnapshotStorage {
	pub fn open(dir: impl AsRef<Path>) -> Result<Self, SnapshotError> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir)?;
		Ok(Self { dir })
	}

	fn path_for(&self, block_number: u64) -> PathBuf {
		self.dir.join(format!("snapshot-{block_number:020}.json"))
	}

	fn block_of(path: &Path) -> Option<u64> {
		path.file_name()?
			.to_str()?
			.strip_prefix("snapshot-")?
			.strip_suffix(".json")?
			.parse()
			.ok()
	}

	/// (block, path) of every snapshot file, oldest first
	fn entries(&self) -> Vec<(u64, PathBuf)> {
		let Ok(read_dir) = fs::read_dir(&self.dir) else {
			return Vec::new();
		};
		let mut entries: Vec<(u64, PathBuf)> = read_dir
			.filter_map(|e| e.ok())
			.map(|e| e.path())
			.filter_map(|p| Self::block_of(&p).map(|b| (b, p)))
			.collect();
		entries.sort_by_key(|(block, _)| *block);
		entries
	}

	fn read(&self, block_number: u64, path: &Path) -> Result<Snapshot, SnapshotError> {
		let state_data = fs::read(path)?;
		let created_at = fs::metadata(path)
			.and_then(|m| m.modified())
			.ok()
			.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
			.map(|d| d.as_secs())
			.unwrap_or(0);
		Ok(Snapshot {
			metadata: SnapshotMetadata {
				created_at,
				block_number,
				size_bytes: state_data.len(),
			},
			state_data,
		})
	}
}

impl SnapshotStorage for FileSnapshotStorage {
	fn save(&mut self, snapshot: Snapshot) -> Result<(), SnapshotError> {
		let path = self.path_for(snapshot.metadata.block_number);
		let tmp = path.with_extension("tmp");
		fs::write(&tmp, &snapshot.state_data)?;
		fs::rename(&tmp, &path)?;
		Ok(())
	}

	fn load_latest(&self) -> Result<Snapshot, SnapshotError> {
		let (block, path) = self.entries().pop().ok_or(SnapshotError::NotFound)?;
		self.read(block, &path)
	}

	fn load_at_block(&self, block_number: u64) -> Result<Snapshot, SnapshotError> {
		let (block, path) = self
			.entries()
			.into_iter()
			.rev()
			.find(|(block, _)| *block <= block_number)
			.ok_or(SnapshotError::NotFound)?;
		self.read(block, &path)
	}

	fn list_snapshots(&self) -> Vec<SnapshotMetadata> {
		self.entries()
			.into_iter()
			.filter_map(|(block, path)| match self.read(block, &path) {
				Ok(snapshot) => Some(snapshot.metadata),
				Err(e) => {
					warn!(target: "snapshotter", path = %path.display(), error = %e, "Unreadable snapshot file");
					None
				}
			})
			.collect()
	}

	fn cleanup_before(&mut self, block_number: u64) -> Result<usize, SnapshotError> {
		let mut deleted = 0;
		for (block, path) in self.entries() {
			if block < block_number {
				fs::remove_file(&path)?;
				deleted += 1;
			}
		}
		Ok(deleted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn create_test_snapshot(block_number: u64) -> Snapshot {
		Snapshot {
			metadata: SnapshotMetadata {
				created_at: 1000,
				block_number,
				size_bytes: 100,
			},
			state_data: vec![0u8; 100],
		}
	}

	#[test]
	fn test_save_and_load_latest() {
		let mut storage = MemorySnapshotStorage::new();

		storage.save(create_test_snapshot(100)).unwrap();
		storage.save(create_test_snapshot(200)).unwrap();

		let latest = storage.load_latest().unwrap();
		assert_eq!(latest.metadata.block_number, 200);
	}

	#[test]
	fn test_load_at_block() {
		let mut storage = MemorySnapshotStorage::new();

		storage.save(create_test_snapshot(100)).unwrap();
		storage.save(create_test_snapshot(200)).unwrap();
		storage.save(create_test_snapshot(300)).unwrap();

		assert_eq!(storage.load_at_block(250).unwrap().metadata.block_number, 200);
		assert_eq!(storage.load_at_block(300).unwrap().metadata.block_number, 300);
		assert!(matches!(storage.load_at_block(50), Err(SnapshotError::NotFound)));
	}

	#[test]
	fn test_cleanup() {
		let mut storage = MemorySnapshotStorage::new();

		storage.save(create_test_snapshot(100)).unwrap();
		storage.save(create_test_snapshot(200)).unwrap();
		storage.save(create_test_snapshot(300)).unwrap();

		assert_eq!(storage.cleanup_before(200).unwrap(), 1);

		let list = storage.list_snapshots();
		assert_eq!(list.len(), 2);
		assert_eq!(list[0].block_number, 200);
	}

	#[test]
	fn test_file_storage() {
		let dir = std::env::temp_dir().join(format!("strata-snapshots-{}", uuid::Uuid::new_v4()));
		let mut storage = FileSnapshotStorage::open(&dir).unwrap();
		assert!(matches!(storage.load_latest(), Err(SnapshotError::NotFound)));

		storage.save(Snapshot::new(7, b"seven".to_vec())).unwrap();
		storage.save(Snapshot::new(12, b"twelve".to_vec())).unwrap();

		let latest = storage.load_latest().unwrap();
		assert_eq!(latest.metadata.block_number, 12);
		assert_eq!(latest.state_data, b"twelve");
		assert_eq!(storage.load_at_block(11).unwrap().state_data, b"seven");

		assert_eq!(storage.cleanup_before(12).unwrap(), 1);
		assert_eq!(storage.list_snapshots().len(), 1);

		fs::remove_dir_all(&dir).unwrap();
	}
}
