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
use strata_sdk::{Address, Amount, Market, OrderHash, Side, serde_amount_map};
use tracing::{debug, error, info, warn};

use crate::{
	config::{RETRY_AFTER_BLOCKS, RETRY_LOG_SAMPLE_BLOCKS},
	metrics::{self, Metrics},
	orderbook::MarketBook,
	params::ConfigService,
	risk,
	types::{Lifecycle, Order, OrderStatus, StoreError, Trader},
};

/// Everything the order store guards with its lock
///
/// Methods here assume the caller already holds the lock; `OrderStore`
/// is the only public way in. The sorted books are derived data and are
/// rebuilt from `orders` after a restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
	pub(crate) orders: BTreeMap<OrderHash, Order>,
	pub(crate) traders: BTreeMap<Address, Trader>,
	#[serde(with = "serde_amount_map")]
	pub(crate) last_price: BTreeMap<Market, Amount>,
	#[serde(with = "serde_amount_map")]
	pub(crate) cumulative_premium_fraction: BTreeMap<Market, Amount>,
	pub(crate) next_funding_time: u64,
	pub(crate) next_sample_pi_time: u64,
	#[serde(default)]
	pub(crate) sample_pi_attempted_time: u64,
	pub(crate) last_accepted_block: u64,
	#[serde(skip)]
	pub(crate) books: BTreeMap<Market, MarketBook>,
}

impl StoreState {
	pub(crate) fn add_order(&mut self, order: Order) {
		if let Some(existing) = self.orders.remove(&order.id) {
			warn!(order_id = %order.id, "Order added twice, replacing the earlier copy");
			if let Some(book) = self.books.get_mut(&existing.market) {
				book.remove(&existing);
			}
		}
		self.books
			.entry(order.market)
			.or_insert_with(|| MarketBook::new(order.market))
			.insert(&order);
		debug!(order_id = %order.id, market = order.market, block = order.block_number, "Order added");
		self.orders.insert(order.id, order);
	}

	pub(crate) fn delete_order(&mut self, id: &OrderHash, metrics: &Metrics) {
		let Some(order) = self.orders.remove(id) else {
			warn!(order_id = %id, "Delete of unknown order");
			metrics.increment(metrics::DELETE_ORDER_NOT_FOUND);
			return;
		};
		if let Some(book) = self.books.get_mut(&order.market) {
			book.remove(&order);
		}
	}

	pub(crate) fn update_filled_quantity(&mut self, delta: Amount, id: &OrderHash, block_number: u64, metrics: &Metrics) {
		let Some(order) = self.orders.get_mut(id) else {
			warn!(order_id = %id, "Fill update for unknown order");
			metrics.increment(metrics::UPDATE_FILL_ORDER_NOT_FOUND);
			return;
		};

		let Some(mut filled) = delta
			.checked_mul(order.side.sign())
			.and_then(|d| order.filled_base_asset_quantity.checked_add(d))
		else {
			error!(order_id = %id, delta, "Fill update overflows, skipping");
			metrics.increment(metrics::ARITHMETIC_OVERFLOWS);
			return;
		};
		let was_filled = order.has_status(OrderStatus::Filled);
		let total = order.base_asset_quantity;

		if filled.unsigned_abs() > total.unsigned_abs() {
			error!(order_id = %id, filled, total, "Fill exceeds order size, clamping");
			metrics.increment(metrics::FILL_OUT_OF_BOUNDS);
			filled = total;
		} else if filled != 0 && filled.signum() != total.signum() {
			error!(order_id = %id, filled, total, "Fill flipped sign, clamping");
			metrics.increment(metrics::FILL_OUT_OF_BOUNDS);
			filled = 0;
		}
		order.filled_base_asset_quantity = filled;

		if delta < 0 {
			// Unwinding a fill that completed the order
			if was_filled {
				order.lifecycle.pop();
			}
		} else if delta > 0 && filled == total && !was_filled {
			order.lifecycle.push(Lifecycle {
				block_number,
				status: OrderStatus::Filled,
				info: String::new(),
			});
		}
	}

	pub(crate) fn set_order_status(&mut self, id: &OrderHash, status: OrderStatus, info: String, block_number: u64) -> Result<(), StoreError> {
		let order = self.orders.get_mut(id).ok_or(StoreError::NotFound(*id))?;
		order.lifecycle.push(Lifecycle {
			block_number,
			status,
			info,
		});
		Ok(())
	}

	pub(crate) fn revert_last_status(&mut self, id: &OrderHash) -> Result<(), StoreError> {
		let order = self.orders.get_mut(id).ok_or(StoreError::NotFound(*id))?;
		// The Placed entry is never popped
		if order.lifecycle.len() > 1 {
			order.lifecycle.pop();
		} else {
			warn!(order_id = %id, "No status to revert");
		}
		Ok(())
	}

	/// Copies of the orders on one side eligible for matching, best first
	///
	/// Scanning stops at the first order priced beyond `bound` (below it for
	/// longs, above it for shorts).
	pub(crate) fn eligible_orders(&self, market: Market, side: Side, bound: Option<Amount>, block_number: Option<u64>, now: u64) -> Vec<Order> {
		let Some(book) = self.books.get(&market) else {
			return Vec::new();
		};

		let mut eligible = Vec::new();
		for entry in book.side(side) {
			let beyond_bound = match (side, bound) {
				(Side::Long, Some(lower)) => entry.price < lower,
				(Side::Short, Some(upper)) => entry.price > upper,
				(_, None) => false,
			};
			if beyond_bound {
				break;
			}
			if let Some(order) = self.orders.get(&entry.id)
				&& let Some(order) = self.clean_order(order, block_number, now)
			{
				eligible.push(order);
			}
		}
		eligible
	}

	fn clean_order(&self, order: &Order, block_number: Option<u64>, now: u64) -> Option<Order> {
		let status = order.status()?;
		match status.status {
			OrderStatus::Placed => {}
			OrderStatus::ExecutionFailed => {
				let block = block_number?;
				if block < status.block_number + RETRY_AFTER_BLOCKS {
					return None;
				}
				if block % RETRY_LOG_SAMPLE_BLOCKS == 0 {
					info!(
						order_id = %order.id,
						failed_at = status.block_number,
						block,
						"Retrying order after execution failure"
					);
				}
			}
			OrderStatus::Filled | OrderStatus::Cancelled => return None,
		}

		if order.is_expired(now) {
			return None;
		}

		let mut order = order.clone();
		if order.reduce_only {
			let size = self
				.traders
				.get(&order.trader)
				.and_then(|t| t.positions.get(&order.market))
				.map(|p| p.size)
				.unwrap_or(0);
			// Nothing left to reduce
			if size == 0 || size.signum() == order.base_asset_quantity.signum() {
				return None;
			}
			let unfilled = order.unfilled_quantity();
			if unfilled.abs() > size.abs() {
				order.filled_base_asset_quantity = order.base_asset_quantity - size.abs() * order.side.sign();
			}
		}
		Some(order)
	}

	pub(crate) fn update_position(&mut self, config: &dyn ConfigService, trader: Address, market: Market, size: Amount, open_notional: Amount, is_liquidation: bool) {
		let cumulative = self.cumulative_premium_fraction.get(&market).copied().unwrap_or(0);
		let position = self
			.traders
			.entry(trader)
			.or_default()
			.positions
			.entry(market)
			.or_default();

		if position.size == 0 && size != 0 {
			position.last_premium_fraction = cumulative;
			position.unrealised_funding = 0;
		}
		position.size = size;
		position.open_notional = open_notional;
		if size == 0 {
			position.unrealised_funding = 0;
		}

		if !is_liquidation {
			position.liquidation_threshold = risk::liquidation_threshold(
				config.max_liquidation_ratio(market),
				config.min_size_requirement(market),
				size,
			);
		}
		let magnitude = position.liquidation_threshold.saturating_abs().min(size.saturating_abs());
		position.liquidation_threshold = magnitude * size.signum();
	}

	pub(crate) fn update_margin(&mut self, trader: Address, collateral: usize, delta: Amount, metrics: &Metrics) {
		let deposited = self
			.traders
			.entry(trader)
			.or_default()
			.margin
			.deposited
			.entry(collateral)
			.or_insert(0);
		match deposited.checked_add(delta) {
			Some(total) => *deposited = total,
			None => {
				error!(%trader, collateral, delta, "Margin update overflows, skipping");
				metrics.increment(metrics::ARITHMETIC_OVERFLOWS);
			}
		}
	}

	pub(crate) fn update_reserved_margin(&mut self, trader: Address, delta: Amount, metrics: &Metrics) {
		let margin = &mut self.traders.entry(trader).or_default().margin;
		match margin.reserved.checked_add(delta) {
			Some(total) => margin.reserved = total,
			None => {
				error!(%trader, delta, "Reserved margin update overflows, skipping");
				metrics.increment(metrics::ARITHMETIC_OVERFLOWS);
			}
		}
	}

	pub(crate) fn update_unrealised_funding(&mut self, market: Market, cumulative_premium_fraction: Amount) {
		self.cumulative_premium_fraction.insert(market, cumulative_premium_fraction);
		for trader in self.traders.values_mut() {
			if let Some(position) = trader.positions.get_mut(&market) {
				position.unrealised_funding = risk::calc_pending_funding(
					cumulative_premium_fraction,
					position.last_premium_fraction,
					position.size,
				);
			}
		}
	}

	pub(crate) fn reset_unrealised_funding(&mut self, market: Market, trader: &Address, cumulative_premium_fraction: Amount) {
		if let Some(position) = self
			.traders
			.get_mut(trader)
			.and_then(|t| t.positions.get_mut(&market))
		{
			position.unrealised_funding = 0;
			position.last_premium_fraction = cumulative_premium_fraction;
		}
	}

	/// Re-derive every market's sorted lists from the order map
	pub(crate) fn rebuild_books(&mut self) {
		self.books.clear();
		for order in self.orders.values() {
			self.books
				.entry(order.market)
				.or_insert_with(|| MarketBook::new(order.market))
				.insert(order);
		}
	}

	/// Structural checks on a restored state
	pub(crate) fn validate(&self) -> Result<(), StoreError> {
		for (id, order) in &self.orders {
			if *id != order.id {
				return Err(StoreError::InvalidSnapshot(format!(
					"order keyed {id} carries id {}",
					order.id
				)));
			}
			if order.lifecycle.is_empty() {
				return Err(StoreError::InvalidSnapshot(format!("order {id} has no lifecycle")));
			}
			if order.filled_base_asset_quantity.abs() > order.base_asset_quantity.abs() {
				return Err(StoreError::InvalidSnapshot(format!("order {id} is overfilled")));
			}
		}
		Ok(())
	}
}
