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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_sdk::{
	Address, Amount, Market, OrderHash, OrderKind, RawOrder, Side, serde_amount, serde_amount_map,
};

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Placed,
	Filled,
	Cancelled,
	ExecutionFailed,
}

impl OrderStatus {
	/// Filled and Cancelled end an order's life on the book
	pub fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
	}
}

/// One entry of an order's append-only lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
	pub block_number: u64,
	pub status: OrderStatus,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub info: String,
}

/// Order mirrored from chain events
///
/// Sizes follow the sign convention of the raw order: positive for longs,
/// negative for shorts. `filled_base_asset_quantity` carries the same sign
/// and never exceeds `base_asset_quantity` in magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub id: OrderHash,
	pub market: Market,
	pub side: Side,
	pub trader: Address,
	#[serde(with = "serde_amount")]
	pub base_asset_quantity: Amount,
	#[serde(with = "serde_amount")]
	pub filled_base_asset_quantity: Amount,
	#[serde(with = "serde_amount")]
	pub salt: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	pub reduce_only: bool,
	/// Block at which the order was accepted on-chain
	pub block_number: u64,
	pub lifecycle: Vec<Lifecycle>,
	pub raw_order: RawOrder,
}

impl Order {
	/// New order, Placed at `block_number`
	pub fn new(id: OrderHash, raw_order: RawOrder, block_number: u64) -> Self {
		Self {
			id,
			market: raw_order.market(),
			side: Side::of(raw_order.base_asset_quantity()),
			trader: raw_order.trader(),
			base_asset_quantity: raw_order.base_asset_quantity(),
			filled_base_asset_quantity: 0,
			salt: raw_order.salt(),
			price: raw_order.price(),
			reduce_only: raw_order.reduce_only(),
			block_number,
			lifecycle: vec![Lifecycle {
				block_number,
				status: OrderStatus::Placed,
				info: String::new(),
			}],
			raw_order,
		}
	}

	pub fn kind(&self) -> OrderKind {
		self.raw_order.kind()
	}

	pub fn is_ioc(&self) -> bool {
		self.kind() == OrderKind::Ioc
	}

	pub fn is_post_only(&self) -> bool {
		self.raw_order.is_post_only()
	}

	/// Current lifecycle entry
	pub fn status(&self) -> Option<&Lifecycle> {
		self.lifecycle.last()
	}

	pub fn has_status(&self, status: OrderStatus) -> bool {
		self.status().is_some_and(|l| l.status == status)
	}

	/// Signed quantity still open
	pub fn unfilled_quantity(&self) -> Amount {
		self.base_asset_quantity - self.filled_base_asset_quantity
	}

	/// IOC and signed orders lapse at their expiry timestamp
	pub fn is_expired(&self, timestamp: u64) -> bool {
		self.raw_order
			.expire_at()
			.is_some_and(|expire_at| expire_at > 0 && expire_at < timestamp)
	}
}

/// Open position of a trader in one market
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	#[serde(with = "serde_amount")]
	pub size: Amount,
	#[serde(with = "serde_amount")]
	pub open_notional: Amount,
	#[serde(with = "serde_amount")]
	pub unrealised_funding: Amount,
	#[serde(with = "serde_amount")]
	pub last_premium_fraction: Amount,
	/// Size liquidatable in one go; same sign as `size`
	#[serde(with = "serde_amount")]
	pub liquidation_threshold: Amount,
}

/// Margin ledger of a trader
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margin {
	/// Locked against open orders
	#[serde(with = "serde_amount")]
	pub reserved: Amount,
	/// Collateral index -> signed deposited amount (index 0 is the quote asset)
	#[serde(with = "serde_amount_map")]
	pub deposited: BTreeMap<usize, Amount>,
}

impl Margin {
	/// Deposits as a dense vector over `collateral_count` collaterals
	pub fn deposits(&self, collateral_count: usize) -> Vec<Amount> {
		(0..collateral_count)
			.map(|idx| self.deposited.get(&idx).copied().unwrap_or(0))
			.collect()
	}
}

/// Per-account ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trader {
	pub positions: BTreeMap<Market, Position>,
	pub margin: Margin,
}

/// Position selected for liquidation in the current pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidablePosition {
	pub trader: Address,
	pub market: Market,
	pub side: Side,
	/// Magnitude to liquidate this run
	pub size: Amount,
	pub margin_fraction: Amount,
	pub filled_size: Amount,
}

impl LiquidablePosition {
	pub fn unfilled_size(&self) -> Amount {
		self.size - self.filled_size
	}
}

/// Output of one pass over all traders
#[derive(Debug, Clone, Default)]
pub struct NaughtyTraders {
	/// Sorted ascending by margin fraction
	pub liquidable: Vec<LiquidablePosition>,
	/// Orders to cancel per trader, furthest from the oracle price first
	pub orders_to_cancel: BTreeMap<Address, Vec<Order>>,
	/// Available margin of every trader
	pub available_margin: BTreeMap<Address, Amount>,
}

/// Error types for order store operations
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
	#[error("Order not found: {0}")]
	NotFound(OrderHash),
	#[error("Invalid snapshot: {0}")]
	InvalidSnapshot(String),
}

#[cfg(test)]
mod tests {
	use super::*;
	use strata_sdk::{IocOrder, LimitOrder};

	#[test]
	fn test_new_order_is_placed() {
		let raw = RawOrder::Limit(LimitOrder {
			market: 1,
			trader: Address::from_low_u64(1),
			base_asset_quantity: -10,
			price: 20,
			salt: 1,
			reduce_only: false,
			post_only: false,
		});
		let order = Order::new(raw.hash(), raw, 7);

		assert_eq!(order.side, Side::Short);
		assert!(order.has_status(OrderStatus::Placed));
		assert_eq!(order.status().map(|l| l.block_number), Some(7));
		assert_eq!(order.unfilled_quantity(), -10);
		assert!(!order.is_expired(u64::MAX));
	}

	#[test]
	fn test_ioc_expiry() {
		let raw = RawOrder::Ioc(IocOrder {
			expire_at: 100,
			market: 0,
			trader: Address::from_low_u64(1),
			base_asset_quantity: 10,
			price: 20,
			salt: 1,
			reduce_only: false,
		});
		let order = Order::new(raw.hash(), raw, 1);

		assert!(order.is_ioc());
		assert!(!order.is_expired(100));
		assert!(order.is_expired(101));
	}
}
