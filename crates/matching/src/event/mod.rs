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

//! Chain event ingestion and the feeds published from it

mod decoder;
mod feed;
mod ingestor;

use serde::{Deserialize, Serialize};
use strata_sdk::{Address, Amount, ContractEvent, H256, Log, Market, OrderHash, serde_amount};

pub use decoder::{EventDecoder, JsonEventDecoder};
pub use feed::{Feed, Subscription};
pub use ingestor::EventIngestor;

/// Logs of one block as delivered by the chain log source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBatch {
	/// False while the block is only the unconfirmed head
	pub accepted: bool,
	pub block_number: u64,
	pub block_timestamp: u64,
	#[serde(default)]
	pub logs: Vec<Log>,
}

/// How final the block carrying an event is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockConfirmationLevel {
	/// Unconfirmed chain head, may still be reorged out
	Head,
	Accepted,
}

/// Order or margin activity of one trader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderEvent {
	pub trader: Address,
	pub order_id: Option<OrderHash>,
	pub event_name: String,
	pub block_number: u64,
	pub block_status: BlockConfirmationLevel,
	pub tx_hash: H256,
	pub removed: bool,
	pub event: ContractEvent,
}

/// Trade or liquidation that moved a market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketFeedEvent {
	pub trader: Address,
	pub market: Market,
	/// Signed size traded
	#[serde(with = "serde_amount")]
	pub size: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	pub is_liquidation: bool,
	pub block_number: u64,
	pub block_status: BlockConfirmationLevel,
	pub tx_hash: H256,
	pub removed: bool,
	pub timestamp: u64,
}
