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

//! Order store
//!
//! Single source of truth for orders, trader ledgers and per-market funding
//! state. One reader/writer lock guards everything: every mutation takes the
//! write lock once and runs to completion on [`StoreState`], so readers never
//! observe half an event.

mod accept;
mod naughty;
mod state;

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use strata_sdk::{Address, Amount, Market, OrderHash, Side};
use tracing::debug;

pub use state::StoreState;

use crate::{
	metrics::Metrics,
	params::ConfigService,
	risk::RiskState,
	snapshot::{OrderStoreSnapshot, SNAPSHOT_VERSION},
	types::{NaughtyTraders, Order, OrderStatus, StoreError, Trader},
};

pub struct OrderStore {
	state: RwLock<StoreState>,
	config: Arc<dyn ConfigService>,
	metrics: Arc<Metrics>,
}

impl OrderStore {
	pub fn new(config: Arc<dyn ConfigService>, metrics: Arc<Metrics>) -> Self {
		Self {
			state: RwLock::new(StoreState::default()),
			config,
			metrics,
		}
	}

	pub fn metrics(&self) -> &Arc<Metrics> {
		&self.metrics
	}

	/// Insert a new order into the id index and its sorted list
	pub fn add(&self, order: Order) {
		self.state.write().add_order(order);
	}

	/// Remove an order; unknown ids are counted and ignored
	pub fn delete(&self, id: &OrderHash) {
		self.state.write().delete_order(id, &self.metrics);
	}

	/// Apply a fill delta, positive meaning more filled
	///
	/// The delta is signed to the order's side internally. A negative delta
	/// on a Filled order unwinds the Filled entry.
	pub fn update_filled_quantity(&self, delta: Amount, id: &OrderHash, block_number: u64) {
		self.state
			.write()
			.update_filled_quantity(delta, id, block_number, &self.metrics);
	}

	pub fn set_order_status(&self, id: &OrderHash, status: OrderStatus, info: impl Into<String>, block_number: u64) -> Result<(), StoreError> {
		self.state
			.write()
			.set_order_status(id, status, info.into(), block_number)
	}

	pub fn revert_last_status(&self, id: &OrderHash) -> Result<(), StoreError> {
		self.state.write().revert_last_status(id)
	}

	/// Eligible long orders priced at or above `lower_bound`, best first
	///
	/// ExecutionFailed orders come back once `block_number` is far enough
	/// past the failure; without a block number they never do.
	pub fn get_long_orders(&self, market: Market, lower_bound: Option<Amount>, block_number: Option<u64>, now: u64) -> Vec<Order> {
		self.state
			.read()
			.eligible_orders(market, Side::Long, lower_bound, block_number, now)
	}

	/// Eligible short orders priced at or below `upper_bound`, best first
	pub fn get_short_orders(&self, market: Market, upper_bound: Option<Amount>, block_number: Option<u64>, now: u64) -> Vec<Order> {
		self.state
			.read()
			.eligible_orders(market, Side::Short, upper_bound, block_number, now)
	}

	/// Overwrite a position and re-derive its liquidation threshold
	pub fn update_position(&self, trader: Address, market: Market, size: Amount, open_notional: Amount, is_liquidation: bool, block_number: u64) {
		debug!(%trader, market, size, is_liquidation, block_number, "Position updated");
		self.state.write().update_position(
			self.config.as_ref(),
			trader,
			market,
			size,
			open_notional,
			is_liquidation,
		);
	}

	pub fn update_margin(&self, trader: Address, collateral: usize, delta: Amount) {
		self.state
			.write()
			.update_margin(trader, collateral, delta, &self.metrics);
	}

	pub fn update_reserved_margin(&self, trader: Address, delta: Amount) {
		self.state
			.write()
			.update_reserved_margin(trader, delta, &self.metrics);
	}

	pub fn update_unrealised_funding(&self, market: Market, cumulative_premium_fraction: Amount) {
		self.state
			.write()
			.update_unrealised_funding(market, cumulative_premium_fraction);
	}

	pub fn reset_unrealised_funding(&self, market: Market, trader: &Address, cumulative_premium_fraction: Amount) {
		self.state
			.write()
			.reset_unrealised_funding(market, trader, cumulative_premium_fraction);
	}

	pub fn update_last_price(&self, market: Market, price: Amount) {
		self.state.write().last_price.insert(market, price);
	}

	pub fn update_next_funding_time(&self, timestamp: u64) {
		self.state.write().next_funding_time = timestamp;
	}

	pub fn update_next_sample_pi_time(&self, timestamp: u64) {
		self.state.write().next_sample_pi_time = timestamp;
	}

	/// Record when premium index sampling was last submitted
	pub fn signal_sample_pi_attempted(&self, timestamp: u64) {
		self.state.write().sample_pi_attempted_time = timestamp;
	}

	/// Drop orders that can no longer trade as of `accepted_block`
	pub fn accept(&self, accepted_block: u64, block_timestamp: u64) -> usize {
		self.state
			.write()
			.accept(accepted_block, block_timestamp, &self.metrics)
	}

	/// Liquidation candidates, cancellation candidates and available margins
	pub fn get_naughty_traders(&self, risk_state: &RiskState) -> NaughtyTraders {
		self.state.read().naughty_traders(risk_state)
	}

	/// Deep copy of the whole store, valid through the last accepted block
	pub fn get_order_book_snapshot(&self) -> OrderStoreSnapshot {
		let state = self.state.read();
		OrderStoreSnapshot {
			version: SNAPSHOT_VERSION,
			block_number: state.last_accepted_block,
			state: state.clone(),
		}
	}

	/// Replace the store contents and rebuild the sorted lists
	pub fn load_from_snapshot(&self, snapshot: OrderStoreSnapshot) -> Result<(), StoreError> {
		if snapshot.version != SNAPSHOT_VERSION {
			return Err(StoreError::InvalidSnapshot(format!(
				"unsupported version {}",
				snapshot.version
			)));
		}
		let mut restored = snapshot.state;
		restored.validate()?;
		restored.last_accepted_block = restored.last_accepted_block.max(snapshot.block_number);
		restored.rebuild_books();
		*self.state.write() = restored;
		Ok(())
	}

	pub fn get_all_orders(&self) -> Vec<Order> {
		self.state.read().orders.values().cloned().collect()
	}

	/// Orders of one market, longs then shorts, each in priority order
	pub fn get_market_orders(&self, market: Market) -> Vec<Order> {
		let state = self.state.read();
		let Some(book) = state.books.get(&market) else {
			return Vec::new();
		};
		book.longs()
			.iter()
			.chain(book.shorts())
			.filter_map(|e| state.orders.get(&e.id).cloned())
			.collect()
	}

	pub fn get_order_by_id(&self, id: &OrderHash) -> Option<Order> {
		self.state.read().orders.get(id).cloned()
	}

	/// Orders of a trader whose current status is Placed
	pub fn get_open_orders_for_trader(&self, trader: &Address) -> Vec<Order> {
		self.state
			.read()
			.orders
			.values()
			.filter(|o| o.trader == *trader && o.has_status(OrderStatus::Placed))
			.cloned()
			.collect()
	}

	pub fn get_all_traders(&self) -> BTreeMap<Address, Trader> {
		self.state.read().traders.clone()
	}

	pub fn get_trader(&self, trader: &Address) -> Option<Trader> {
		self.state.read().traders.get(trader).cloned()
	}

	pub fn get_last_price(&self, market: Market) -> Option<Amount> {
		self.state.read().last_price.get(&market).copied()
	}

	pub fn get_cumulative_premium_fraction(&self, market: Market) -> Amount {
		self.state
			.read()
			.cumulative_premium_fraction
			.get(&market)
			.copied()
			.unwrap_or(0)
	}

	pub fn get_next_funding_time(&self) -> u64 {
		self.state.read().next_funding_time
	}

	pub fn get_next_sample_pi_time(&self) -> u64 {
		self.state.read().next_sample_pi_time
	}

	pub fn get_sample_pi_attempted_time(&self) -> u64 {
		self.state.read().sample_pi_attempted_time
	}

	pub fn last_accepted_block(&self) -> u64 {
		self.state.read().last_accepted_block
	}
}
