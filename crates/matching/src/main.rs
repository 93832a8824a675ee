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

//! Matching service entry point
//!
//! This binary wires up the components of the matching service:
//! - Order store (recovered from the newest snapshot)
//! - Event ingestor and the trader/market feeds
//! - Matching pipeline and its scheduler
//! - Snapshotter (every N accepted blocks)
//!
//! Chain logs arrive as newline-delimited JSON `ChainBatch` records on stdin.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
	io::{AsyncBufReadExt, BufReader},
	signal,
};
use tracing::{error, info, warn};

use strata_matching::{
	ChainBatch, EventIngestor, Feed, FileSnapshotStorage, MatchingConfig, MatchingPipeline, MemorySnapshotStorage,
	Metrics, OrderStore, PipelineScheduler, QueuedExecutor, RecoveryCoordinator, SnapshotStorage, Snapshotter,
	SnapshotterConfig, StaticConfigService,
};

struct Node {
	ingestor: EventIngestor,
	store: Arc<OrderStore>,
	snapshotter: Snapshotter,
	scheduler: PipelineScheduler,
	executor: Arc<QueuedExecutor>,
}

impl Node {
	async fn handle_batch(&mut self, batch: ChainBatch) -> Result<()> {
		if !batch.accepted {
			self.ingestor.process_events(&batch.logs);
			return Ok(());
		}

		self.ingestor.process_accepted_events(&batch.logs, false);
		let removed = self.store.accept(batch.block_number, batch.block_timestamp);
		if removed > 0 {
			info!(target: "server", block_number = batch.block_number, removed, "Orders removed at acceptance");
		}
		if let Err(e) = self.snapshotter.on_block_accepted(&self.store, batch.block_number) {
			error!(target: "server", block_number = batch.block_number, error = %e, "Snapshot failed");
		}

		let outcome = self
			.scheduler
			.run_now(batch.block_number, batch.block_timestamp)
			.await
			.context("Pipeline run failed")?;
		for instruction in self.executor.drain() {
			let encoded = serde_json::to_string(&instruction).context("Failed to encode instruction")?;
			info!(target: "server", block_number = outcome.block_number, instruction = %encoded, "Settlement instruction");
		}
		Ok(())
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	// Initialize logging first
	strata_matching::logging::init_logging()?;

	let config = MatchingConfig::from_env().unwrap_or_else(|e| {
		info!(target: "server", error = %e, "Using default configuration");
		MatchingConfig::default()
	});

	info!(target: "server", "Starting Strata Matching Service");
	info!(target: "server", "Order book contract: {}", config.contracts.order_book);
	info!(target: "server", "Fallback ticker: {} ms", config.matching_ticker_ms);

	let metrics = Arc::new(Metrics::new());
	let config_service = Arc::new(StaticConfigService::new(config.protocol.clone()));
	let store = Arc::new(OrderStore::new(config_service.clone(), metrics.clone()));

	// Phase 1: Recover from the newest snapshot
	let snapshot_storage: Box<dyn SnapshotStorage> = match &config.snapshot_dir {
		Some(dir) => Box::new(FileSnapshotStorage::open(dir).context("Failed to open snapshot directory")?),
		None => Box::new(MemorySnapshotStorage::new()),
	};
	let coordinator = RecoveryCoordinator::new(snapshot_storage);
	match coordinator.recover(&store).context("Failed to recover order store")? {
		Some(block_number) => info!(target: "server", block_number, "Resuming after snapshot"),
		None => info!(target: "server", "Starting from empty order store"),
	}
	let snapshotter = Snapshotter::new(
		coordinator.into_storage(),
		SnapshotterConfig {
			snapshot_interval_blocks: config.snapshot_interval_blocks,
			max_snapshots_to_keep: config.max_snapshots_to_keep,
		},
	);

	// Phase 2: Ingestion and feeds
	let trader_feed = Arc::new(Feed::new("trader", config.feed_capacity, metrics.clone()));
	let market_feed = Arc::new(Feed::new("market", config.feed_capacity, metrics.clone()));
	let ingestor = EventIngestor::new(store.clone(), config.contracts.clone(), trader_feed, market_feed);

	// Phase 3: Pipeline and scheduler
	let executor = Arc::new(QueuedExecutor::new());
	let pipeline = Arc::new(MatchingPipeline::new(
		store.clone(),
		config_service,
		executor.clone(),
		metrics.clone(),
	));
	let scheduler = PipelineScheduler::start(
		pipeline,
		Duration::from_millis(config.matching_ticker_ms),
		config.control_channel_size,
	);

	let mut node = Node {
		ingestor,
		store,
		snapshotter,
		scheduler,
		executor,
	};

	// Phase 4: Consume the log source until it closes or we are interrupted
	let mut lines = BufReader::new(tokio::io::stdin()).lines();
	loop {
		tokio::select! {
			line = lines.next_line() => {
				let Some(line) = line.context("Failed to read log source")? else {
					info!(target: "server", "Log source closed");
					break;
				};
				if line.trim().is_empty() {
					continue;
				}
				match serde_json::from_str::<ChainBatch>(&line) {
					Ok(batch) => node.handle_batch(batch).await?,
					Err(e) => warn!(target: "server", error = %e, "Skipping malformed batch"),
				}
			}
			_ = signal::ctrl_c() => {
				info!(target: "server", "Shutting down...");
				break;
			}
		}
	}

	info!(target: "server", "Shutting down components...");
	node.scheduler.shutdown().await;
	info!(target: "server", counters = ?metrics.snapshot(), "Final counters");
	info!(target: "server", "Shutdown complete");
	Ok(())
}
