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

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{
	orders::{IocOrder, LimitOrder, SignedOrder},
	types::{Address, Amount, H256, Market, OrderHash, serde_amount},
};

/// Errors raised while turning a chain log into a typed event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
	#[error("Log has no topics")]
	MissingTopic,
	#[error("Malformed event payload: {0}")]
	Payload(String),
	#[error("Topic mismatch for {event}: found {found}")]
	TopicMismatch { event: &'static str, found: H256 },
}

/// Contracts whose events drive the order book mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
	OrderBook,
	IocOrderBook,
	MarginAccount,
	ClearingHouse,
}

/// Topic identifying an event: SHA-256 of its name
pub fn event_topic(name: &str) -> H256 {
	H256::from_slice(&Sha256::digest(name.as_bytes()))
}

/// Chain log record as delivered by the node
///
/// `removed` is set when the log belonged to a block that was reorged out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
	pub address: Address,
	pub topics: Vec<H256>,
	#[serde(with = "serde_hex_bytes")]
	pub data: Vec<u8>,
	pub block_number: u64,
	pub log_index: u64,
	#[serde(default)]
	pub tx_hash: H256,
	#[serde(default)]
	pub removed: bool,
}

impl Log {
	/// Ordering key used to sequence logs within and across blocks
	pub fn position(&self) -> (u64, u64) {
		(self.block_number, self.log_index)
	}

	/// Copy of this log with the reorg flag set
	pub fn as_removed(&self) -> Self {
		Self {
			removed: true,
			..self.clone()
		}
	}
}

mod serde_hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
	}
}

/// Events emitted by the OrderBook contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderBookEvent {
	OrderPlaced {
		trader: Address,
		order_hash: OrderHash,
		order: LimitOrder,
		timestamp: u64,
	},
	OrderAccepted {
		trader: Address,
		order_hash: OrderHash,
		order: SignedOrder,
		timestamp: u64,
	},
	OrderCancelled {
		trader: Address,
		order_hash: OrderHash,
		timestamp: u64,
	},
	OrderCancelAccepted {
		trader: Address,
		order_hash: OrderHash,
		timestamp: u64,
	},
	OrdersMatched {
		long_order_hash: OrderHash,
		short_order_hash: OrderHash,
		#[serde(with = "serde_amount")]
		fill_amount: Amount,
		#[serde(with = "serde_amount")]
		price: Amount,
		timestamp: u64,
	},
	LiquidationOrderMatched {
		trader: Address,
		order_hash: OrderHash,
		#[serde(with = "serde_amount")]
		fill_amount: Amount,
		#[serde(with = "serde_amount")]
		price: Amount,
		timestamp: u64,
	},
	OrderMatchingError {
		order_hash: OrderHash,
		err: String,
	},
}

impl OrderBookEvent {
	pub fn name(&self) -> &'static str {
		match self {
			OrderBookEvent::OrderPlaced { .. } => "OrderPlaced",
			OrderBookEvent::OrderAccepted { .. } => "OrderAccepted",
			OrderBookEvent::OrderCancelled { .. } => "OrderCancelled",
			OrderBookEvent::OrderCancelAccepted { .. } => "OrderCancelAccepted",
			OrderBookEvent::OrdersMatched { .. } => "OrdersMatched",
			OrderBookEvent::LiquidationOrderMatched { .. } => "LiquidationOrderMatched",
			OrderBookEvent::OrderMatchingError { .. } => "OrderMatchingError",
		}
	}
}

/// Events emitted by the IOCOrderBook contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IocOrderBookEvent {
	OrderPlaced {
		trader: Address,
		order_hash: OrderHash,
		order: IocOrder,
		timestamp: u64,
	},
}

impl IocOrderBookEvent {
	pub fn name(&self) -> &'static str {
		match self {
			IocOrderBookEvent::OrderPlaced { .. } => "OrderPlaced",
		}
	}
}

/// Events emitted by the MarginAccount contract
///
/// Every amount is the signed delta the event applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginAccountEvent {
	MarginAdded {
		trader: Address,
		collateral: usize,
		#[serde(with = "serde_amount")]
		amount: Amount,
		timestamp: u64,
	},
	MarginRemoved {
		trader: Address,
		collateral: usize,
		#[serde(with = "serde_amount")]
		amount: Amount,
		timestamp: u64,
	},
	MarginReserved {
		trader: Address,
		#[serde(with = "serde_amount")]
		amount: Amount,
	},
	MarginReleased {
		trader: Address,
		#[serde(with = "serde_amount")]
		amount: Amount,
	},
	#[serde(rename = "PnLRealized")]
	PnlRealized {
		trader: Address,
		#[serde(with = "serde_amount")]
		realized_pnl: Amount,
		timestamp: u64,
	},
}

impl MarginAccountEvent {
	pub fn name(&self) -> &'static str {
		match self {
			MarginAccountEvent::MarginAdded { .. } => "MarginAdded",
			MarginAccountEvent::MarginRemoved { .. } => "MarginRemoved",
			MarginAccountEvent::MarginReserved { .. } => "MarginReserved",
			MarginAccountEvent::MarginReleased { .. } => "MarginReleased",
			MarginAccountEvent::PnlRealized { .. } => "PnLRealized",
		}
	}

	pub fn trader(&self) -> Address {
		match self {
			MarginAccountEvent::MarginAdded { trader, .. }
			| MarginAccountEvent::MarginRemoved { trader, .. }
			| MarginAccountEvent::MarginReserved { trader, .. }
			| MarginAccountEvent::MarginReleased { trader, .. }
			| MarginAccountEvent::PnlRealized { trader, .. } => *trader,
		}
	}
}

/// Position change carried by PositionModified / PositionLiquidated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionChange {
	pub trader: Address,
	pub market: Market,
	/// Signed size traded by this event
	#[serde(with = "serde_amount")]
	pub base_asset: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	#[serde(with = "serde_amount")]
	pub realized_pnl: Amount,
	/// Resulting position size
	#[serde(with = "serde_amount")]
	pub size: Amount,
	#[serde(with = "serde_amount")]
	pub open_notional: Amount,
	#[serde(with = "serde_amount")]
	pub fee: Amount,
	pub timestamp: u64,
}

/// Events emitted by the ClearingHouse contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearingHouseEvent {
	FundingRateUpdated {
		market: Market,
		#[serde(with = "serde_amount")]
		premium_fraction: Amount,
		#[serde(with = "serde_amount")]
		underlying_price: Amount,
		#[serde(with = "serde_amount")]
		cumulative_premium_fraction: Amount,
		next_funding_time: u64,
		timestamp: u64,
	},
	FundingPaid {
		trader: Address,
		market: Market,
		#[serde(with = "serde_amount")]
		taker_funding_payment: Amount,
		#[serde(with = "serde_amount")]
		cumulative_premium_fraction: Amount,
	},
	PositionModified(PositionChange),
	PositionLiquidated(PositionChange),
	#[serde(rename = "PISampledUpdated")]
	PiSampled {
		#[serde(with = "serde_amount")]
		premium_index: Amount,
		next_sample_time: u64,
	},
	#[serde(rename = "PISampleSkipped")]
	PiSampleSkipped { next_sample_time: u64 },
}

impl ClearingHouseEvent {
	pub fn name(&self) -> &'static str {
		match self {
			ClearingHouseEvent::FundingRateUpdated { .. } => "FundingRateUpdated",
			ClearingHouseEvent::FundingPaid { .. } => "FundingPaid",
			ClearingHouseEvent::PositionModified(_) => "PositionModified",
			ClearingHouseEvent::PositionLiquidated(_) => "PositionLiquidated",
			ClearingHouseEvent::PiSampled { .. } => "PISampledUpdated",
			ClearingHouseEvent::PiSampleSkipped { .. } => "PISampleSkipped",
		}
	}
}

/// Typed event of any watched contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
	OrderBook(OrderBookEvent),
	IocOrderBook(IocOrderBookEvent),
	MarginAccount(MarginAccountEvent),
	ClearingHouse(ClearingHouseEvent),
}

impl ContractEvent {
	pub fn kind(&self) -> ContractKind {
		match self {
			ContractEvent::OrderBook(_) => ContractKind::OrderBook,
			ContractEvent::IocOrderBook(_) => ContractKind::IocOrderBook,
			ContractEvent::MarginAccount(_) => ContractKind::MarginAccount,
			ContractEvent::ClearingHouse(_) => ContractKind::ClearingHouse,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			ContractEvent::OrderBook(e) => e.name(),
			ContractEvent::IocOrderBook(e) => e.name(),
			ContractEvent::MarginAccount(e) => e.name(),
			ContractEvent::ClearingHouse(e) => e.name(),
		}
	}

	/// Encode into a log emitted by `address`
	pub fn to_log(&self, address: Address, block_number: u64, log_index: u64) -> Log {
		let data = match self {
			ContractEvent::OrderBook(e) => serde_json::to_vec(e),
			ContractEvent::IocOrderBook(e) => serde_json::to_vec(e),
			ContractEvent::MarginAccount(e) => serde_json::to_vec(e),
			ContractEvent::ClearingHouse(e) => serde_json::to_vec(e),
		}
		.unwrap_or_default();

		Log {
			address,
			topics: vec![event_topic(self.name())],
			data,
			block_number,
			log_index,
			tx_hash: H256::zero(),
			removed: false,
		}
	}

	/// Decode a log emitted by a contract of the given kind
	///
	/// The payload must decode into one of the contract's events and the
	/// first topic must be that event's topic.
	pub fn from_log(kind: ContractKind, log: &Log) -> Result<Self, DecodeError> {
		let topic = *log.topics.first().ok_or(DecodeError::MissingTopic)?;
		let event = match kind {
			ContractKind::OrderBook => ContractEvent::OrderBook(decode_payload(&log.data)?),
			ContractKind::IocOrderBook => ContractEvent::IocOrderBook(decode_payload(&log.data)?),
			ContractKind::MarginAccount => {
				ContractEvent::MarginAccount(decode_payload(&log.data)?)
			}
			ContractKind::ClearingHouse => {
				ContractEvent::ClearingHouse(decode_payload(&log.data)?)
			}
		};

		if event_topic(event.name()) != topic {
			return Err(DecodeError::TopicMismatch {
				event: event.name(),
				found: topic,
			});
		}
		Ok(event)
	}
}

fn decode_payload<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, DecodeError> {
	serde_json::from_slice(data).map_err(|e| DecodeError::Payload(e.to_string()))
}
