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

//! Strata matching service
//!
//! Off-chain mirror of the perpetual-futures order book contracts. It
//! rebuilds orders and trader ledgers from contract logs, tolerates
//! reorgs, and on every accepted block decides the cancellations,
//! liquidations and matches to settle back on chain.
//!
//! Architecture:
//! - `store`: reorg-aware order book and trader ledger behind one lock
//! - `event`: log ingestion and the trader/market feeds
//! - `risk`: fixed-point margin math
//! - `engine`: the per-block pipeline and its scheduler
//! - `snapshot` / `recovery`: periodic capture and node bootstrap

pub mod config;
pub mod engine;
pub mod event;
pub mod logging;
pub mod matcher;
pub mod metrics;
pub mod orderbook;
pub mod params;
pub mod recovery;
pub mod risk;
pub mod settlement;
pub mod snapshot;
pub mod store;
pub mod types;

pub use config::{ContractAddresses, MatchingConfig};
pub use engine::{EngineControlMessage, MatchingPipeline, PipelineError, PipelineScheduler, RunOutcome};
pub use event::{BlockConfirmationLevel, ChainBatch, EventIngestor, Feed, MarketFeedEvent, Subscription, TraderEvent};
pub use metrics::Metrics;
pub use orderbook::{BookEntry, MarketBook};
pub use params::{ConfigService, MarketParams, PriceBounds, ProtocolParams, StaticConfigService};
pub use recovery::RecoveryCoordinator;
pub use risk::RiskState;
pub use settlement::{ExecutionError, QueuedExecutor, SettlementInstruction, TransactionExecutor};
pub use snapshot::{
	FileSnapshotStorage, MemorySnapshotStorage, OrderStoreSnapshot, SnapshotError, SnapshotStorage, Snapshotter,
	SnapshotterConfig,
};
pub use store::{OrderStore, StoreState};
pub use types::*;
