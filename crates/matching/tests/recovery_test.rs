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

//! Integration tests for snapshots and node bootstrap

use std::sync::Arc;

use strata_matching::{
	ChainBatch, ContractAddresses, EventIngestor, Feed, FileSnapshotStorage, MatchingConfig, MemorySnapshotStorage,
	Metrics, OrderStore, RecoveryCoordinator, SnapshotStorage, Snapshotter, SnapshotterConfig, StaticConfigService,
	params::{MarketParams, ProtocolParams},
};
use strata_sdk::{
	Address, Amount, BASE_PRECISION, ContractEvent, LimitOrder, Log, MarginAccountEvent, OrderBookEvent, OrderHash,
	PRICE_PRECISION, RawOrder,
};

fn node() -> (Arc<OrderStore>, EventIngestor) {
	let config = StaticConfigService::new(ProtocolParams::default());
	config.set_market(0, MarketParams::default());
	let metrics = Arc::new(Metrics::new());
	let store = Arc::new(OrderStore::new(Arc::new(config), metrics.clone()));
	let ingestor = EventIngestor::new(
		store.clone(),
		MatchingConfig::default().contracts,
		Arc::new(Feed::new("trader", 16, metrics.clone())),
		Arc::new(Feed::new("market", 16, metrics)),
	);
	(store, ingestor)
}

fn placement(contracts: &ContractAddresses, salt: Amount, price: Amount, block: u64) -> (OrderHash, Log) {
	let order = LimitOrder {
		market: 0,
		trader: Address::from_low_u64(1),
		base_asset_quantity: BASE_PRECISION,
		price,
		salt,
		reduce_only: false,
		post_only: false,
	};
	let id = RawOrder::Limit(order.clone()).hash();
	let log = ContractEvent::OrderBook(OrderBookEvent::OrderPlaced {
		trader: order.trader,
		order_hash: id,
		order,
		timestamp: block,
	})
	.to_log(contracts.order_book, block, 0);
	(id, log)
}

/// Accepted history: one order per block, a deposit in block 1, a cancel in block 4
fn history() -> (Vec<ChainBatch>, Vec<OrderHash>) {
	let contracts = MatchingConfig::default().contracts;
	let mut batches = Vec::new();
	let mut ids = Vec::new();
	for block in 1..=4 {
		let (id, log) = placement(&contracts, block as Amount, (10 + block as Amount) * PRICE_PRECISION, block);
		let mut logs = vec![log];
		if block == 1 {
			logs.push(
				ContractEvent::MarginAccount(MarginAccountEvent::MarginAdded {
					trader: Address::from_low_u64(1),
					collateral: 0,
					amount: 1_000 * PRICE_PRECISION,
					timestamp: 1,
				})
				.to_log(contracts.margin_account, block, 1),
			);
		}
		if block == 4 {
			logs.push(
				ContractEvent::OrderBook(OrderBookEvent::OrderCancelled {
					trader: Address::from_low_u64(1),
					order_hash: ids[0],
					timestamp: 4,
				})
				.to_log(contracts.order_book, block, 1),
			);
		}
		ids.push(id);
		batches.push(ChainBatch {
			accepted: true,
			block_number: block,
			block_timestamp: 1_000 + block,
			logs,
		});
	}
	(batches, ids)
}

fn state_of(store: &OrderStore) -> serde_json::Value {
	serde_json::to_value(store.get_order_book_snapshot()).unwrap()
}

#[test]
fn test_snapshot_then_replay_matches_live_node() {
	let (batches, ids) = history();

	// live node: snapshot every 2 accepted blocks
	let (live_store, live_ingestor) = node();
	let mut snapshotter = Snapshotter::new(
		Box::new(MemorySnapshotStorage::new()),
		SnapshotterConfig {
			snapshot_interval_blocks: 2,
			max_snapshots_to_keep: 1,
		},
	);
	for batch in &batches {
		live_ingestor.process_events(&batch.logs);
		live_ingestor.process_accepted_events(&batch.logs, false);
		live_store.accept(batch.block_number, batch.block_timestamp);
		snapshotter.on_block_accepted(&live_store, batch.block_number).unwrap();
	}
	let storage = snapshotter.into_storage();
	let kept = storage.list_snapshots();
	assert_eq!(kept.len(), 1);
	assert_eq!(kept[0].block_number, 4);

	// rebuild from the block 2 snapshot instead, to exercise replay
	let (partial_store, partial_ingestor) = node();
	RecoveryCoordinator::replay(&partial_ingestor, &batches[..2], None);
	let mut early = MemorySnapshotStorage::new();
	early
		.save(strata_matching::snapshot::Snapshot::new(
			2,
			partial_store.get_order_book_snapshot().encode().unwrap(),
		))
		.unwrap();

	let (restored_store, restored_ingestor) = node();
	let coordinator = RecoveryCoordinator::new(Box::new(early));
	let resumed_after = coordinator.recover(&restored_store).unwrap();
	assert_eq!(resumed_after, Some(2));
	assert_eq!(restored_store.get_all_orders().len(), 2);

	let replayed = RecoveryCoordinator::replay(&restored_ingestor, &batches, resumed_after);
	assert_eq!(replayed, 2);

	assert_eq!(state_of(&restored_store), state_of(&live_store));
	assert!(restored_store.get_order_by_id(&ids[0]).is_none());
	assert_eq!(
		restored_store
			.get_trader(&Address::from_low_u64(1))
			.unwrap()
			.margin
			.deposited[&0],
		1_000 * PRICE_PRECISION
	);
}

#[test]
fn test_head_batches_not_replayed() {
	let (mut batches, _) = history();
	for batch in &mut batches {
		batch.accepted = false;
	}
	let (store, ingestor) = node();

	assert_eq!(RecoveryCoordinator::replay(&ingestor, &batches, None), 0);
	assert!(store.get_all_orders().is_empty());
}

#[test]
fn test_recover_from_snapshot_directory() {
	let dir = std::env::temp_dir().join(format!("strata-recovery-{}", uuid::Uuid::new_v4()));
	let (batches, _) = history();
	let (store, ingestor) = node();
	RecoveryCoordinator::replay(&ingestor, &batches, None);

	let mut snapshotter = Snapshotter::new(
		Box::new(FileSnapshotStorage::open(&dir).unwrap()),
		SnapshotterConfig::default(),
	);
	let metadata = snapshotter.take_snapshot(&store).unwrap();
	assert_eq!(metadata.block_number, 4);

	let (restored, _) = node();
	let coordinator = RecoveryCoordinator::new(Box::new(FileSnapshotStorage::open(&dir).unwrap()));
	assert_eq!(coordinator.recover(&restored).unwrap(), Some(4));
	assert_eq!(state_of(&restored), state_of(&store));

	std::fs::remove_dir_all(&dir).unwrap();
}
