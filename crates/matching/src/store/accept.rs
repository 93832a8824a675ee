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

//! Garbage collection of orders at block acceptance

use std::collections::BTreeSet;

use strata_sdk::{OrderHash, OrderKind, Side};
use tracing::debug;

use super::state::StoreState;
use crate::{metrics::Metrics, orderbook::MarketBook, types::Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptDecision {
	Keep,
	Remove,
	KeepIfMatcheable,
}

fn accept_decision(order: &Order, accepted_block: u64, block_timestamp: u64) -> AcceptDecision {
	let terminal = order
		.lifecycle
		.iter()
		.any(|l| l.status.is_terminal() && l.block_number <= accepted_block);
	if terminal {
		return AcceptDecision::Remove;
	}
	match order.kind() {
		OrderKind::Limit => AcceptDecision::Keep,
		OrderKind::Ioc | OrderKind::Signed => {
			if order.is_expired(block_timestamp) {
				AcceptDecision::Remove
			} else if order.block_number > accepted_block {
				AcceptDecision::Keep
			} else {
				AcceptDecision::KeepIfMatcheable
			}
		}
	}
}

impl StoreState {
	/// Remove orders that can no longer trade, returns how many went
	///
	/// Conditional survivors are resolved to a fixpoint: an order whose only
	/// counterparties are themselves removed is removed too, so a second
	/// call with the same arguments removes nothing.
	pub(crate) fn accept(&mut self, accepted_block: u64, block_timestamp: u64, metrics: &Metrics) -> usize {
		let mut removals: Vec<OrderHash> = Vec::new();

		for book in self.books.values() {
			let mut removed = BTreeSet::new();
			let mut conditional = Vec::new();
			for entry in book.longs().iter().chain(book.shorts()) {
				let Some(order) = self.orders.get(&entry.id) else {
					continue;
				};
				match accept_decision(order, accepted_block, block_timestamp) {
					AcceptDecision::Keep => {}
					AcceptDecision::Remove => {
						removed.insert(order.id);
					}
					AcceptDecision::KeepIfMatcheable => conditional.push(order),
				}
			}

			loop {
				let mut changed = false;
				for order in &conditional {
					if !removed.contains(&order.id) && !has_counter_match(book, order, &removed) {
						removed.insert(order.id);
						changed = true;
					}
				}
				if !changed {
					break;
				}
			}
			removals.extend(removed);
		}

		for id in &removals {
			self.delete_order(id, metrics);
		}
		self.last_accepted_block = self.last_accepted_block.max(accepted_block);
		debug!(accepted_block, removed = removals.len(), "Block accepted");
		removals.len()
	}
}

/// Whether a surviving counter-side order crosses `order` and is no newer
fn has_counter_match(book: &MarketBook, order: &Order, removed: &BTreeSet<OrderHash>) -> bool {
	match order.side {
		Side::Long => book
			.shorts()
			.iter()
			.take_while(|short| short.price <= order.price)
			.any(|short| !removed.contains(&short.id) && short.block_number <= order.block_number),
		Side::Short => book
			.longs()
			.iter()
			.take_while(|long| long.price >= order.price)
			.any(|long| !removed.contains(&long.id) && long.block_number <= order.block_number),
	}
}
