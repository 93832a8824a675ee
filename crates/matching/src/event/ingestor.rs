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

use std::{cmp::Reverse, sync::Arc};

use strata_sdk::{
	Address, Amount, ClearingHouseEvent, ContractEvent, ContractKind, IocOrderBookEvent, Log,
	MarginAccountEvent, OrderBookEvent, OrderHash, RawOrder,
};
use tracing::{debug, error, trace, warn};

use super::{
	BlockConfirmationLevel, EventDecoder, Feed, JsonEventDecoder, MarketFeedEvent, TraderEvent,
};
use crate::{
	config::ContractAddresses,
	metrics::{self, Metrics},
	store::OrderStore,
	types::{Order, OrderStatus},
};

/// Applies chain logs to the order store
///
/// Head logs carry order book activity and may be reorged out; accepted
/// logs carry margin and clearing house state and are applied exactly once.
pub struct EventIngestor {
	store: Arc<OrderStore>,
	contracts: ContractAddresses,
	decoder: Box<dyn EventDecoder>,
	trader_feed: Arc<Feed<TraderEvent>>,
	market_feed: Arc<Feed<MarketFeedEvent>>,
	metrics: Arc<Metrics>,
}

impl EventIngestor {
	pub fn new(store: Arc<OrderStore>, contracts: ContractAddresses, trader_feed: Arc<Feed<TraderEvent>>, market_feed: Arc<Feed<MarketFeedEvent>>) -> Self {
		let metrics = store.metrics().clone();
		Self {
			store,
			contracts,
			decoder: Box::new(JsonEventDecoder),
			trader_feed,
			market_feed,
			metrics,
		}
	}

	pub fn with_decoder(mut self, decoder: Box<dyn EventDecoder>) -> Self {
		self.decoder = decoder;
		self
	}

	pub fn store(&self) -> &Arc<OrderStore> {
		&self.store
	}

	/// Apply order book logs from the chain head
	///
	/// Removed logs are undone newest first, then the remaining logs are
	/// applied oldest first, so a reorg lands on the canonical state no
	/// matter how the batch was ordered.
	pub fn process_events(&self, logs: &[Log]) {
		let (mut removed, mut rebirth): (Vec<&Log>, Vec<&Log>) = logs.iter().partition(|l| l.removed);
		removed.sort_by_key(|l| Reverse(l.position()));
		rebirth.sort_by_key(|l| l.position());

		for log in removed.into_iter().chain(rebirth) {
			let Some(kind) = self.contract_kind(log) else {
				continue;
			};
			if !matches!(kind, ContractKind::OrderBook | ContractKind::IocOrderBook) {
				continue;
			}
			let Some(event) = self.decode(kind, log) else {
				continue;
			};

			match &event {
				ContractEvent::OrderBook(e) => self.handle_order_book_event(e, log),
				ContractEvent::IocOrderBook(e) => self.handle_ioc_order_book_event(e, log),
				ContractEvent::MarginAccount(_) | ContractEvent::ClearingHouse(_) => {}
			}
			self.publish(&event, log, BlockConfirmationLevel::Head);
		}
	}

	/// Apply finalized margin and clearing house logs
	///
	/// Order book logs in the batch were applied at the head already and
	/// only reach the feeds here. Per-event counters are skipped while
	/// replaying history during bootstrap.
	pub fn process_accepted_events(&self, logs: &[Log], in_bootstrap: bool) {
		let mut sorted: Vec<&Log> = logs.iter().collect();
		sorted.sort_by_key(|l| l.position());

		for log in sorted {
			let Some(kind) = self.contract_kind(log) else {
				continue;
			};
			let Some(event) = self.decode(kind, log) else {
				continue;
			};

			match &event {
				ContractEvent::MarginAccount(e) => self.handle_margin_account_event(e, log),
				ContractEvent::ClearingHouse(e) => self.handle_clearing_house_event(e, log),
				ContractEvent::OrderBook(_) | ContractEvent::IocOrderBook(_) => {}
			}

			if !in_bootstrap {
				self.metrics.increment_event(event.name());
			}
			self.publish(&event, log, BlockConfirmationLevel::Accepted);
		}
	}

	fn contract_kind(&self, log: &Log) -> Option<ContractKind> {
		let kind = self.contracts.kind_of(&log.address);
		if kind.is_none() {
			trace!(address = %log.address, "Log from untracked contract");
			self.metrics.increment(metrics::UNKNOWN_CONTRACT_LOGS);
		}
		kind
	}

	fn decode(&self, kind: ContractKind, log: &Log) -> Option<ContractEvent> {
		match self.decoder.decode(kind, log) {
			Ok(event) => Some(event),
			Err(e) => {
				error!(
					contract = ?kind,
					topic = ?log.topics.first(),
					block_number = log.block_number,
					log_index = log.log_index,
					data = %hex::encode(&log.data),
					error = %e,
					"Failed to decode log, skipping"
				);
				self.metrics.increment(metrics::DECODE_FAILURES);
				None
			}
		}
	}

	fn handle_order_book_event(&self, event: &OrderBookEvent, log: &Log) {
		let block = log.block_number;
		match event {
			OrderBookEvent::OrderPlaced { order_hash, order, .. } => {
				self.add_or_delete(*order_hash, RawOrder::Limit(order.clone()), log);
			}
			OrderBookEvent::OrderAccepted { order_hash, order, .. } => {
				self.add_or_delete(*order_hash, RawOrder::Signed(order.clone()), log);
			}
			OrderBookEvent::OrderCancelled { order_hash, .. }
			| OrderBookEvent::OrderCancelAccepted { order_hash, .. } => {
				self.set_or_revert_status(order_hash, OrderStatus::Cancelled, String::new(), log);
			}
			OrderBookEvent::OrdersMatched {
				long_order_hash,
				short_order_hash,
				fill_amount,
				..
			} => {
				if let Some(delta) = self.signed_amount(*fill_amount, log.removed, log) {
					self.store.update_filled_quantity(delta, long_order_hash, block);
					self.store.update_filled_quantity(delta, short_order_hash, block);
				}
			}
			OrderBookEvent::LiquidationOrderMatched { order_hash, fill_amount, .. } => {
				if let Some(delta) = self.signed_amount(*fill_amount, log.removed, log) {
					self.store.update_filled_quantity(delta, order_hash, block);
				}
			}
			OrderBookEvent::OrderMatchingError { order_hash, err } => {
				self.set_or_revert_status(order_hash, OrderStatus::ExecutionFailed, err.clone(), log);
			}
		}
	}

	fn handle_ioc_order_book_event(&self, event: &IocOrderBookEvent, log: &Log) {
		match event {
			IocOrderBookEvent::OrderPlaced { order_hash, order, .. } => {
				self.add_or_delete(*order_hash, RawOrder::Ioc(order.clone()), log);
			}
		}
	}

	fn add_or_delete(&self, order_hash: OrderHash, raw_order: RawOrder, log: &Log) {
		if log.removed {
			self.store.delete(&order_hash);
		} else {
			self.store.add(Order::new(order_hash, raw_order, log.block_number));
		}
	}

	fn set_or_revert_status(&self, order_hash: &OrderHash, status: OrderStatus, info: String, log: &Log) {
		let result = if log.removed {
			self.store.revert_last_status(order_hash)
		} else {
			self.store.set_order_status(order_hash, status, info, log.block_number)
		};
		if let Err(e) = result {
			warn!(order_id = %order_hash, ?status, removed = log.removed, error = %e, "Status update skipped");
		}
	}

	fn handle_margin_account_event(&self, event: &MarginAccountEvent, log: &Log) {
		let removed = log.removed;
		match event {
			MarginAccountEvent::MarginAdded { trader, collateral, amount, .. } => {
				if let Some(delta) = self.signed_amount(*amount, removed, log) {
					self.store.update_margin(*trader, *collateral, delta);
				}
			}
			MarginAccountEvent::MarginRemoved { trader, collateral, amount, .. } => {
				if let Some(delta) = self.signed_amount(*amount, !removed, log) {
					self.store.update_margin(*trader, *collateral, delta);
				}
			}
			MarginAccountEvent::MarginReserved { trader, amount } => {
				if let Some(delta) = self.signed_amount(*amount, removed, log) {
					self.store.update_reserved_margin(*trader, delta);
				}
			}
			MarginAccountEvent::MarginReleased { trader, amount } => {
				if let Some(delta) = self.signed_amount(*amount, !removed, log) {
					self.store.update_reserved_margin(*trader, delta);
				}
			}
			MarginAccountEvent::PnlRealized { trader, realized_pnl, .. } => {
				if let Some(delta) = self.signed_amount(*realized_pnl, removed, log) {
					self.store.update_margin(*trader, 0, delta);
				}
			}
		}
	}

	/// `amount`, negated when `negate`, or `None` for an amount with no negation
	fn signed_amount(&self, amount: Amount, negate: bool, log: &Log) -> Option<Amount> {
		let delta = if negate { amount.checked_neg() } else { Some(amount) };
		if delta.is_none() {
			error!(
				block_number = log.block_number,
				log_index = log.log_index,
				amount,
				"Log amount out of range, skipping"
			);
			self.metrics.increment(metrics::AMOUNT_OUT_OF_RANGE);
		}
		delta
	}

	fn handle_clearing_house_event(&self, event: &ClearingHouseEvent, log: &Log) {
		if log.removed {
			warn!(event = event.name(), block_number = log.block_number, "Removed clearing house log ignored");
			return;
		}
		match event {
			ClearingHouseEvent::FundingRateUpdated {
				market,
				cumulative_premium_fraction,
				next_funding_time,
				..
			} => {
				self.store.update_unrealised_funding(*market, *cumulative_premium_fraction);
				self.store.update_next_funding_time(*next_funding_time);
			}
			ClearingHouseEvent::FundingPaid {
				trader,
				market,
				cumulative_premium_fraction,
				..
			} => {
				self.store.reset_unrealised_funding(*market, trader, *cumulative_premium_fraction);
			}
			ClearingHouseEvent::PositionModified(change) | ClearingHouseEvent::PositionLiquidated(change) => {
				let is_liquidation = matches!(event, ClearingHouseEvent::PositionLiquidated(_));
				self.store.update_last_price(change.market, change.price);
				self.store.update_position(
					change.trader,
					change.market,
					change.size,
					change.open_notional,
					is_liquidation,
					log.block_number,
				);
			}
			ClearingHouseEvent::PiSampled { next_sample_time, .. }
			| ClearingHouseEvent::PiSampleSkipped { next_sample_time } => {
				self.store.update_next_sample_pi_time(*next_sample_time);
			}
		}
	}

	/// Best-effort fan-out to the trader and market feeds
	fn publish(&self, event: &ContractEvent, log: &Log, level: BlockConfirmationLevel) {
		for (trader, order_id) in self.involved_traders(event) {
			self.trader_feed.publish(TraderEvent {
				trader,
				order_id,
				event_name: event.name().to_string(),
				block_number: log.block_number,
				block_status: level,
				tx_hash: log.tx_hash,
				removed: log.removed,
				event: event.clone(),
			});
		}

		if level == BlockConfirmationLevel::Accepted
			&& let ContractEvent::ClearingHouse(
				ClearingHouseEvent::PositionModified(change) | ClearingHouseEvent::PositionLiquidated(change),
			) = event
		{
			let delivered = self.market_feed.publish(MarketFeedEvent {
				trader: change.trader,
				market: change.market,
				size: change.base_asset,
				price: change.price,
				is_liquidation: matches!(
					event,
					ContractEvent::ClearingHouse(ClearingHouseEvent::PositionLiquidated(_))
				),
				block_number: log.block_number,
				block_status: level,
				tx_hash: log.tx_hash,
				removed: log.removed,
				timestamp: change.timestamp,
			});
			debug!(market = change.market, delivered, "Market feed event published");
		}
	}

	/// Traders an event concerns, with the order it is about if any
	fn involved_traders(&self, event: &ContractEvent) -> Vec<(Address, Option<OrderHash>)> {
		let owner = |id: &OrderHash| self.store.get_order_by_id(id).map(|o| (o.trader, Some(*id)));
		match event {
			ContractEvent::OrderBook(e) => match e {
				OrderBookEvent::OrderPlaced { trader, order_hash, .. }
				| OrderBookEvent::OrderAccepted { trader, order_hash, .. }
				| OrderBookEvent::OrderCancelled { trader, order_hash, .. }
				| OrderBookEvent::OrderCancelAccepted { trader, order_hash, .. }
				| OrderBookEvent::LiquidationOrderMatched { trader, order_hash, .. } => {
					vec![(*trader, Some(*order_hash))]
				}
				OrderBookEvent::OrdersMatched {
					long_order_hash,
					short_order_hash,
					..
				} => [owner(long_order_hash), owner(short_order_hash)]
					.into_iter()
					.flatten()
					.collect(),
				OrderBookEvent::OrderMatchingError { order_hash, .. } => owner(order_hash).into_iter().collect(),
			},
			ContractEvent::IocOrderBook(IocOrderBookEvent::OrderPlaced { trader, order_hash, .. }) => {
				vec![(*trader, Some(*order_hash))]
			}
			ContractEvent::MarginAccount(e) => vec![(e.trader(), None)],
			ContractEvent::ClearingHouse(e) => match e {
				ClearingHouseEvent::FundingPaid { trader, .. } => vec![(*trader, None)],
				ClearingHouseEvent::PositionModified(change) | ClearingHouseEvent::PositionLiquidated(change) => {
					vec![(change.trader, None)]
				}
				ClearingHouseEvent::FundingRateUpdated { .. }
				| ClearingHouseEvent::PiSampled { .. }
				| ClearingHouseEvent::PiSampleSkipped { .. } => Vec::new(),
			},
		}
	}
}
