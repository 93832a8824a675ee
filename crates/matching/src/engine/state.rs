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

use std::collections::{BTreeMap, HashSet};

use strata_sdk::{Address, Amount, Market, OrderHash, OrderKind, Side};

use crate::{risk, types::Order};

/// Working copies of one market's eligible orders for a single run
///
/// Fills recorded here never reach the store; the store catches up from
/// the events the submitted transactions emit.
#[derive(Debug, Clone, Default)]
pub struct WorkingBook {
	pub longs: Vec<Order>,
	pub shorts: Vec<Order>,
}

impl WorkingBook {
	/// Drop orders with nothing left to fill
	pub fn prune_exhausted(&mut self) {
		self.longs.retain(|o| o.unfilled_quantity() != 0);
		self.shorts.retain(|o| o.unfilled_quantity() != 0);
	}
}

/// Margin inputs for pre-trade checks
#[derive(Debug, Clone, Copy)]
pub struct MarginRequirement {
	pub min_allowable_margin: Amount,
	pub taker_fee: Amount,
}

/// Mutable state of one pipeline run
#[derive(Debug, Default)]
pub struct RunState {
	pub books: BTreeMap<Market, WorkingBook>,
	/// Available margin per trader, debited as taker fills are submitted
	pub available_margin: BTreeMap<Address, Amount>,
	/// Orders with a failed submission this run
	pub skipped: HashSet<OrderHash>,
	pub cancelled: HashSet<OrderHash>,
	/// Failed submissions so far
	pub failures: usize,
}

impl RunState {
	pub fn is_skipped(&self, order: &Order) -> bool {
		self.skipped.contains(&order.id)
	}

	/// Debit the margin a fill of `order` needs, `None` when short of it
	///
	/// Resting limit and reduce-only orders need nothing extra. Returns the
	/// amount debited so a failed submission can credit it back.
	pub fn reserve_margin(&mut self, order: &Order, fill_amount: Amount, upper_bound: Option<Amount>, requirement: MarginRequirement) -> Option<Amount> {
		if order.kind() == OrderKind::Limit || order.reduce_only {
			return Some(0);
		}
		let required = risk::required_margin(
			order.price,
			order.side == Side::Short,
			fill_amount,
			upper_bound,
			requirement.min_allowable_margin,
			requirement.taker_fee,
		);
		let available = self.available_margin.entry(order.trader).or_insert(0);
		if *available < required {
			return None;
		}
		*available -= required;
		Some(required)
	}

	pub fn release_margin(&mut self, trader: Address, amount: Amount) {
		if amount != 0 {
			*self.available_margin.entry(trader).or_insert(0) += amount;
		}
	}
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
	pub block_number: u64,
	pub funding_submitted: bool,
	pub sample_pi_submitted: bool,
	pub cancellations: usize,
	pub liquidations: usize,
	pub matches: usize,
	pub failures: usize,
	/// Instructions waiting in the executor after the run
	pub queued_instructions: usize,
}
