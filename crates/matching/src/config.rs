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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strata_sdk::{Address, ContractKind};

use crate::params::ProtocolParams;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log component name, also the log subdirectory
pub const LOG_COMPONENT_NAME: &str = "matching";

/// Log to stderr as well as to file
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Blocks an ExecutionFailed order sits out before it is offered again
pub const RETRY_AFTER_BLOCKS: u64 = 10;

/// Retry eligibility is logged only on block numbers divisible by this
pub const RETRY_LOG_SAMPLE_BLOCKS: u64 = 10;

/// Most cancellations submitted for one trader in one run
pub const MAX_CANCELS_PER_TX: usize = 30;

/// Minimum seconds between two premium index sampling attempts
pub const SAMPLE_PI_RETRY_SECS: u64 = 5;

/// Fallback ticker period when no block arrives
pub const DEFAULT_MATCHING_TICKER_MS: u64 = 5_000;

/// Per-subscriber buffered events before feed events are dropped
pub const DEFAULT_FEED_CAPACITY: usize = 1_024;

/// Accepted blocks between two snapshots
pub const DEFAULT_SNAPSHOT_INTERVAL_BLOCKS: u64 = 1_000;

pub const DEFAULT_MAX_SNAPSHOTS_TO_KEEP: usize = 3;

/// Capacity of the scheduler's control channel
pub const DEFAULT_CONTROL_CHANNEL_SIZE: usize = 64;

/// Addresses of the contracts whose logs are ingested
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
	pub order_book: Address,
	pub ioc_order_book: Address,
	pub margin_account: Address,
	pub clearing_house: Address,
}

impl ContractAddresses {
	/// Which contract emitted a log, if any we track
	pub fn kind_of(&self, address: &Address) -> Option<ContractKind> {
		if *address == self.order_book {
			Some(ContractKind::OrderBook)
		} else if *address == self.ioc_order_book {
			Some(ContractKind::IocOrderBook)
		} else if *address == self.margin_account {
			Some(ContractKind::MarginAccount)
		} else if *address == self.clearing_house {
			Some(ContractKind::ClearingHouse)
		} else {
			None
		}
	}
}

/// Matching service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
	pub contracts: ContractAddresses,
	/// Fallback ticker period in milliseconds
	pub matching_ticker_ms: u64,
	pub feed_capacity: usize,
	pub control_channel_size: usize,
	/// Snapshot every N accepted blocks
	pub snapshot_interval_blocks: u64,
	pub max_snapshots_to_keep: usize,
	/// Persist snapshots here; in-memory only when unset
	pub snapshot_dir: Option<PathBuf>,
	pub protocol: ProtocolParams,
}

impl Default for MatchingConfig {
	fn default() -> Self {
		Self {
			contracts: ContractAddresses {
				order_book: Address::from_low_u64(0x300),
				ioc_order_book: Address::from_low_u64(0x301),
				margin_account: Address::from_low_u64(0x302),
				clearing_house: Address::from_low_u64(0x303),
			},
			matching_ticker_ms: DEFAULT_MATCHING_TICKER_MS,
			feed_capacity: DEFAULT_FEED_CAPACITY,
			control_channel_size: DEFAULT_CONTROL_CHANNEL_SIZE,
			snapshot_interval_blocks: DEFAULT_SNAPSHOT_INTERVAL_BLOCKS,
			max_snapshots_to_keep: DEFAULT_MAX_SNAPSHOTS_TO_KEEP,
			snapshot_dir: None,
			protocol: ProtocolParams::default(),
		}
	}
}

impl MatchingConfig {
	/// Load configuration from environment variables
	///
	/// Nested keys use a double underscore, e.g. `STRATA__MATCHING_TICKER_MS`.
	pub fn from_env() -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::Environment::with_prefix("STRATA").separator("__"))
			.build()?;

		cfg.try_deserialize()
	}

	/// Load configuration from file, environment variables take precedence
	pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(config::Environment::with_prefix("STRATA").separator("__"))
			.build()?;

		cfg.try_deserialize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_contract_routing() {
		let contracts = MatchingConfig::default().contracts;

		assert_eq!(contracts.kind_of(&contracts.order_book), Some(ContractKind::OrderBook));
		assert_eq!(
			contracts.kind_of(&contracts.clearing_house),
			Some(ContractKind::ClearingHouse)
		);
		assert_eq!(contracts.kind_of(&Address::from_low_u64(1)), None);
	}

	#[test]
	fn test_defaults() {
		let config = MatchingConfig::default();
		assert_eq!(config.matching_ticker_ms, DEFAULT_MATCHING_TICKER_MS);
		assert!(config.snapshot_dir.is_none());
		assert_eq!(LOG_COMPONENT_NAME, "matching");
	}
}
