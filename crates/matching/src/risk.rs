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

//! Margin and liquidation arithmetic
//!
//! Every function here is a pure function of protocol parameters and a
//! trader's ledger. Prices and margins carry 6 decimals, sizes 18; integer
//! division truncates toward zero to stay bit-compatible with the contracts.

use std::collections::BTreeMap;

use strata_sdk::{Amount, BASE_PRECISION, Market, div1e6, div1e18, mul1e6};

use crate::{
	params::{Collateral, ConfigService},
	types::{Position, Trader},
};

/// Margin fraction reported for a trader without any notional exposure
pub const MAX_MARGIN_FRACTION: Amount = i64::MAX as Amount;

/// Which requirement the notional/PnL basis is selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginMode {
	/// Liquidation trigger
	MaintenanceMargin,
	/// Headroom for new risk
	MinAllowableMargin,
}

/// Protocol parameters captured once per pipeline run
#[derive(Debug, Clone, Default)]
pub struct RiskState {
	pub collaterals: Vec<Collateral>,
	pub oracle_prices: BTreeMap<Market, Amount>,
	pub mid_prices: BTreeMap<Market, Amount>,
	pub active_markets: Vec<Market>,
	pub maintenance_margin: Amount,
	pub min_allowable_margin: Amount,
	pub taker_fee: Amount,
}

impl RiskState {
	pub fn from_config(config: &dyn ConfigService) -> Self {
		Self {
			collaterals: config.collaterals(),
			oracle_prices: config.oracle_prices(),
			mid_prices: config.mid_prices(),
			active_markets: config.active_markets(),
			maintenance_margin: config.maintenance_margin(),
			min_allowable_margin: config.min_allowable_margin(),
			taker_fee: config.taker_fee(),
		}
	}

	pub fn oracle_price(&self, market: Market) -> Amount {
		self.oracle_prices.get(&market).copied().unwrap_or(0)
	}

	/// Mid price, falling back to the oracle price when none is quoted
	pub fn mid_price(&self, market: Market) -> Amount {
		match self.mid_prices.get(&market) {
			Some(price) if *price > 0 => *price,
			_ => self.oracle_price(market),
		}
	}
}

/// Risk inputs of one trader
#[derive(Debug, Clone)]
pub struct UserState<'a> {
	pub positions: &'a BTreeMap<Market, Position>,
	/// Deposits indexed like `RiskState::collaterals`
	pub margins: Vec<Amount>,
	pub pending_funding: Amount,
	pub reserved_margin: Amount,
}

impl<'a> UserState<'a> {
	pub fn of(trader: &'a Trader, collateral_count: usize) -> Self {
		Self {
			positions: &trader.positions,
			margins: trader.margin.deposits(collateral_count),
			pending_funding: total_pending_funding(&trader.positions),
			reserved_margin: trader.margin.reserved,
		}
	}
}

/// Sum of unrealised funding over all positions
pub fn total_pending_funding(positions: &BTreeMap<Market, Position>) -> Amount {
	positions
		.values()
		.map(|p| p.unrealised_funding)
		.fold(0, Amount::saturating_add)
}

/// Funding owed since the position's last premium fraction
///
/// Negative products are biased by `1e18 - 1` before a flooring division,
/// which rounds them toward zero.
pub fn calc_pending_funding(cumulative_premium_fraction: Amount, last_premium_fraction: Amount, size: Amount) -> Amount {
	let payment = cumulative_premium_fraction
		.saturating_sub(last_premium_fraction)
		.saturating_mul(size);
	if payment < 0 {
		(payment + BASE_PRECISION - 1).div_euclid(BASE_PRECISION)
	} else {
		div1e18(payment)
	}
}

/// Deposits converted to quote units via collateral price and weight
pub fn normalized_margin(collaterals: &[Collateral], margins: &[Amount]) -> Amount {
	collaterals
		.iter()
		.zip(margins)
		.map(|(collateral, amount)| {
			// Quote value first, weight second: a single product of all three
			// leaves i128 for ordinary 18-decimal deposits
			let value = amount.saturating_mul(collateral.price) / 10_i128.pow(collateral.decimals);
			div1e6(value.saturating_mul(collateral.weight))
		})
		.fold(0, Amount::saturating_add)
}

/// |size * price|, in quote units
pub fn notional_position(price: Amount, size: Amount) -> Amount {
	div1e18(size.saturating_mul(price)).abs()
}

/// Notional and unrealized PnL of a position at `price`
pub fn position_metadata(price: Amount, position: &Position) -> (Amount, Amount) {
	if position.size == 0 {
		return (0, 0);
	}
	let notional = notional_position(price, position.size);
	let pnl = if position.size > 0 {
		notional - position.open_notional
	} else {
		position.open_notional - notional
	};
	(notional, pnl)
}

/// (margin + pnl) / notional with 6 decimals
pub fn margin_fraction_of(margin: Amount, pnl: Amount, notional: Amount) -> Amount {
	if notional == 0 {
		return MAX_MARGIN_FRACTION;
	}
	mul1e6(margin + pnl) / notional
}

/// Total notional and unrealized PnL over open positions in active markets
///
/// Each market is valued at both the oracle and the mid price and the
/// basis that is worse for the trader under `mode` is kept: the lower
/// margin fraction for maintenance checks, the lower headroom
/// (`pnl - notional * minAllowableMargin`) for new risk. Ties keep the
/// oracle basis.
pub fn notional_position_and_pnl(state: &RiskState, user: &UserState<'_>, margin: Amount, mode: MarginMode) -> (Amount, Amount) {
	let mut total_notional = 0;
	let mut total_pnl = 0;

	for &market in &state.active_markets {
		let Some(position) = user.positions.get(&market) else {
			continue;
		};
		if position.size == 0 || state.oracle_price(market) == 0 {
			continue;
		}
		let (oracle_notional, oracle_pnl) = position_metadata(state.oracle_price(market), position);
		let (mid_notional, mid_pnl) = position_metadata(state.mid_price(market), position);

		let use_oracle = match mode {
			MarginMode::MaintenanceMargin => {
				margin_fraction_of(margin, oracle_pnl, oracle_notional)
					<= margin_fraction_of(margin, mid_pnl, mid_notional)
			}
			MarginMode::MinAllowableMargin => {
				let oracle_headroom = oracle_pnl - div1e6(oracle_notional * state.min_allowable_margin);
				let mid_headroom = mid_pnl - div1e6(mid_notional * state.min_allowable_margin);
				oracle_headroom <= mid_headroom
			}
		};

		if use_oracle {
			total_notional += oracle_notional;
			total_pnl += oracle_pnl;
		} else {
			total_notional += mid_notional;
			total_pnl += mid_pnl;
		}
	}

	(total_notional, total_pnl)
}

/// Margin fraction under maintenance valuation
pub fn margin_fraction(state: &RiskState, user: &UserState<'_>) -> Amount {
	let margin = normalized_margin(&state.collaterals, &user.margins).saturating_sub(user.pending_funding);
	let (notional, pnl) = notional_position_and_pnl(state, user, margin, MarginMode::MaintenanceMargin);
	margin_fraction_of(margin, pnl, notional)
}

/// Margin left for new orders after the min-allowable requirement
pub fn available_margin(state: &RiskState, user: &UserState<'_>) -> Amount {
	let margin = normalized_margin(&state.collaterals, &user.margins).saturating_sub(user.pending_funding);
	let (notional, pnl) = notional_position_and_pnl(state, user, margin, MarginMode::MinAllowableMargin);
	let utilized = div1e6(notional * state.min_allowable_margin);
	margin + pnl - utilized - user.reserved_margin
}

/// Size liquidatable in one go, signed like `size`
pub fn liquidation_threshold(max_liquidation_ratio: Amount, min_size_requirement: Amount, size: Amount) -> Amount {
	if size == 0 {
		return 0;
	}
	let magnitude = div1e6(size.saturating_abs().saturating_mul(max_liquidation_ratio))
		.max(min_size_requirement)
		.min(size.saturating_abs());
	magnitude * size.signum()
}

/// Margin a taker fill must have available
///
/// Shorts priced under `upper_bound` are charged at the bound, the worst
/// price they could be filled at.
pub fn required_margin(price: Amount, is_short: bool, fill_amount: Amount, upper_bound: Option<Amount>, min_allowable_margin: Amount, taker_fee: Amount) -> Amount {
	let price = match upper_bound {
		Some(upper) if is_short && price < upper => upper,
		_ => price,
	};
	let quote = notional_position(price, fill_amount);
	div1e6(quote * (min_allowable_margin + taker_fee))
}

/// Margin freed by cancelling an order's unfilled remainder
pub fn order_margin(price: Amount, unfilled: Amount, min_allowable_margin: Amount) -> Amount {
	div1e6(notional_position(price, unfilled) * min_allowable_margin)
}

#[cfg(test)]
mod tests {
	use strata_sdk::PRICE_PRECISION;

	use super::*;
	use crate::types::Margin;

	const ONE: Amount = PRICE_PRECISION;
	const SIZE_ONE: Amount = BASE_PRECISION;

	fn quote_collateral() -> Vec<Collateral> {
		vec![Collateral {
			price: ONE,
			weight: ONE,
			decimals: 6,
		}]
	}

	fn trader_with(margin: Amount, position: Position) -> Trader {
		let mut deposited = BTreeMap::new();
		deposited.insert(0, margin);
		Trader {
			positions: BTreeMap::from([(0, position)]),
			margin: Margin { reserved: 0, deposited },
		}
	}

	fn risk_state(oracle: Amount, mid: Amount) -> RiskState {
		RiskState {
			collaterals: quote_collateral(),
			oracle_prices: BTreeMap::from([(0, oracle)]),
			mid_prices: BTreeMap::from([(0, mid)]),
			active_markets: vec![0],
			maintenance_margin: 100_000,
			min_allowable_margin: 200_000,
			taker_fee: 0,
		}
	}

	#[test]
	fn test_undercollateralized_long() {
		let trader = trader_with(
			500 * ONE,
			Position {
				size: 10 * SIZE_ONE,
				open_notional: 900 * ONE,
				unrealised_funding: 42 * ONE,
				..Default::default()
			},
		);
		let state = risk_state(49 * ONE, 50 * ONE);
		let user = UserState::of(&trader, 1);

		assert_eq!(user.pending_funding, 42 * ONE);
		assert_eq!(available_margin(&state, &user), -50 * ONE);

		// (458 - 410) / 490 on the oracle basis
		let mf = margin_fraction(&state, &user);
		assert_eq!(mf, 97_959);
		assert!(mf < state.maintenance_margin);
	}

	#[test]
	fn test_flat_trader_has_max_margin_fraction() {
		let trader = trader_with(100 * ONE, Position::default());
		let state = risk_state(10 * ONE, 10 * ONE);
		let user = UserState::of(&trader, 1);

		assert_eq!(margin_fraction(&state, &user), MAX_MARGIN_FRACTION);
		assert_eq!(available_margin(&state, &user), 100 * ONE);
	}

	#[test]
	fn test_normalized_margin_applies_weight_and_decimals() {
		let collaterals = vec![
			Collateral {
				price: ONE,
				weight: ONE,
				decimals: 6,
			},
			Collateral {
				price: 2_000 * ONE,
				weight: 800_000,
				decimals: 18,
			},
		];
		// 100 quote + 0.5 units at 2000 weighted 0.8
		let margins = vec![100 * ONE, SIZE_ONE / 2];
		assert_eq!(normalized_margin(&collaterals, &margins), 900 * ONE);
	}

	#[test]
	fn test_large_deposit_normalizes_without_overflow() {
		let collaterals = vec![Collateral {
			price: 3_000 * ONE,
			weight: ONE,
			decimals: 18,
		}];
		// 100k units at 3000
		let margins = vec![100_000 * SIZE_ONE];
		assert_eq!(normalized_margin(&collaterals, &margins), 300_000_000 * ONE);

		let huge = vec![Amount::MAX];
		assert!(normalized_margin(&collaterals, &huge) > 0);
	}

	#[test]
	fn test_inactive_market_positions_are_ignored() {
		let trader = trader_with(
			500 * ONE,
			Position {
				size: 10 * SIZE_ONE,
				open_notional: 900 * ONE,
				..Default::default()
			},
		);
		let mut state = risk_state(49 * ONE, 50 * ONE);
		state.active_markets.clear();
		let user = UserState::of(&trader, 1);

		assert_eq!(margin_fraction(&state, &user), MAX_MARGIN_FRACTION);
		assert_eq!(available_margin(&state, &user), 500 * ONE);
	}

	#[test]
	fn test_pending_funding_rounding() {
		assert_eq!(calc_pending_funding(3 * ONE, ONE, 2 * SIZE_ONE), 4 * ONE);
		assert_eq!(calc_pending_funding(ONE, 3 * ONE, 2 * SIZE_ONE), -4 * ONE);
		// -1.5 base units rounds toward zero
		assert_eq!(calc_pending_funding(0, 3, SIZE_ONE / 2), -1);
		assert_eq!(calc_pending_funding(5, 5, SIZE_ONE), 0);
	}

	#[test]
	fn test_liquidation_threshold() {
		// 25% of 10
		assert_eq!(liquidation_threshold(250_000, 0, 10 * SIZE_ONE), 10 * SIZE_ONE / 4);
		assert_eq!(liquidation_threshold(250_000, 0, -10 * SIZE_ONE), -10 * SIZE_ONE / 4);
		// Minimum size wins, then clamps to the position
		assert_eq!(liquidation_threshold(250_000, 5 * SIZE_ONE, 10 * SIZE_ONE), 5 * SIZE_ONE);
		assert_eq!(liquidation_threshold(250_000, 5 * SIZE_ONE, -2 * SIZE_ONE), -2 * SIZE_ONE);
		assert_eq!(liquidation_threshold(250_000, 5 * SIZE_ONE, 0), 0);
	}

	#[test]
	fn test_required_margin_raises_short_price_to_bound() {
		let long = required_margin(10 * ONE, false, 2 * SIZE_ONE, Some(12 * ONE), 200_000, 0);
		let short = required_margin(10 * ONE, true, 2 * SIZE_ONE, Some(12 * ONE), 200_000, 0);
		assert_eq!(long, 4 * ONE);
		assert_eq!(short, 4_800_000);
	}
}
