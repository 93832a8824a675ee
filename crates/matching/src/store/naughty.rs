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

//! Margin sweep selecting traders to liquidate or to cancel orders for

use strata_sdk::{Address, Amount, OrderKind, Side};

use super::state::StoreState;
use crate::{
	risk::{self, RiskState, UserState},
	types::{LiquidablePosition, NaughtyTraders, Order, OrderStatus},
};

impl StoreState {
	pub(crate) fn naughty_traders(&self, state: &RiskState) -> NaughtyTraders {
		let mut result = NaughtyTraders::default();

		// BTreeMap: traders are visited in address order
		for (address, trader) in &self.traders {
			let user = UserState::of(trader, state.collaterals.len());
			let margin_fraction = risk::margin_fraction(state, &user);
			let available = risk::available_margin(state, &user);
			result.available_margin.insert(*address, available);

			if margin_fraction < state.maintenance_margin {
				for (market, position) in &trader.positions {
					if position.liquidation_threshold == 0 {
						continue;
					}
					result.liquidable.push(LiquidablePosition {
						trader: *address,
						market: *market,
						side: Side::of(position.size),
						size: position.liquidation_threshold.abs(),
						margin_fraction,
						filled_size: 0,
					});
				}
				continue;
			}

			if available < 0 {
				let orders = self.orders_to_cancel(address, available, state);
				if !orders.is_empty() {
					result.orders_to_cancel.insert(*address, orders);
				}
			}
		}

		result.liquidable.sort_by(|a, b| {
			a.margin_fraction
				.cmp(&b.margin_fraction)
				.then(a.trader.cmp(&b.trader))
				.then(a.market.cmp(&b.market))
		});
		result
	}

	/// Open limit orders to cancel, furthest from the oracle price first,
	/// until the freed margin covers the deficit
	fn orders_to_cancel(&self, address: &Address, available: Amount, state: &RiskState) -> Vec<Order> {
		let mut candidates: Vec<&Order> = self
			.orders
			.values()
			.filter(|o| {
				o.trader == *address
					&& o.kind() == OrderKind::Limit
					&& !o.reduce_only
					&& o.has_status(OrderStatus::Placed)
			})
			.collect();

		candidates.sort_by(|a, b| {
			let da = (a.price - state.oracle_price(a.market)).abs();
			let db = (b.price - state.oracle_price(b.market)).abs();
			db.cmp(&da).then(a.id.cmp(&b.id))
		});

		let mut available = available;
		let mut selected = Vec::new();
		for order in candidates {
			if available >= 0 {
				break;
			}
			available += risk::order_margin(order.price, order.unfilled_quantity(), state.min_allowable_margin);
			selected.push(order.clone());
		}
		selected
	}
}
