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

//! Crossing of resting long and short orders within one market

use strata_sdk::{Amount, min_abs};
use tracing::{debug, error, trace};

use crate::{
	engine::{MarginRequirement, RunState},
	metrics::{self, Metrics},
	settlement::TransactionExecutor,
	types::Order,
};

/// Inputs shared by every pair considered in one market
pub struct MatchContext<'a> {
	pub executor: &'a dyn TransactionExecutor,
	pub metrics: &'a Metrics,
	pub requirement: MarginRequirement,
	/// Upper acceptable price bound of the market, if bounded
	pub upper_bound: Option<Amount>,
}

/// Fill agreed for a long/short pair, with the margin it debited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MatchDecision {
	fill_amount: Amount,
	long_margin: Amount,
	short_margin: Amount,
}

/// Whether the later of two orders may take from the earlier one
///
/// An IOC order only ever takes from orders that existed before it, and a
/// post-only order never takes.
fn can_cross_in_time(long: &Order, short: &Order) -> bool {
	if long.block_number < short.block_number {
		!long.is_ioc() && !short.is_post_only()
	} else if long.block_number > short.block_number {
		!short.is_ioc() && !long.is_post_only()
	} else {
		true
	}
}

fn are_matching_orders(long: &Order, short: &Order, ctx: &MatchContext<'_>, run: &mut RunState) -> Option<MatchDecision> {
	if long.price < short.price {
		return None;
	}
	if !can_cross_in_time(long, short) {
		return None;
	}
	let fill_amount = min_abs(long.unfilled_quantity(), short.unfilled_quantity());
	if fill_amount == 0 {
		return None;
	}

	let Some(long_margin) = run.reserve_margin(long, fill_amount, ctx.upper_bound, ctx.requirement) else {
		trace!(order_id = %long.id, trader = %long.trader, "Insufficient margin for long taker");
		ctx.metrics.increment(metrics::INSUFFICIENT_MARGIN);
		return None;
	};
	let Some(short_margin) = run.reserve_margin(short, fill_amount, ctx.upper_bound, ctx.requirement) else {
		trace!(order_id = %short.id, trader = %short.trader, "Insufficient margin for short taker");
		ctx.metrics.increment(metrics::INSUFFICIENT_MARGIN);
		run.release_margin(long.trader, long_margin);
		return None;
	};

	Some(MatchDecision {
		fill_amount,
		long_margin,
		short_margin,
	})
}

/// Cross longs (outer, best first) against shorts (inner, best first)
///
/// Returns the number of match instructions submitted. A pair whose
/// submission fails leaves both working copies untouched and both orders
/// are skipped for the rest of the run.
pub fn run_matching_engine(longs: &mut [Order], shorts: &mut Vec<Order>, ctx: &MatchContext<'_>, run: &mut RunState) -> usize {
	let mut matches = 0;

	for long in longs.iter_mut() {
		let Some(best_short) = shorts.first() else {
			break;
		};
		if long.price < best_short.price {
			break;
		}
		if run.is_skipped(long) {
			continue;
		}

		for short in shorts.iter_mut() {
			if long.unfilled_quantity() == 0 {
				break;
			}
			if short.price > long.price {
				break;
			}
			if run.is_skipped(short) {
				continue;
			}
			let Some(decision) = are_matching_orders(long, short, ctx, run) else {
				continue;
			};

			match ctx.executor.execute_matched_orders(long, short, decision.fill_amount) {
				Ok(()) => {
					long.filled_base_asset_quantity += decision.fill_amount;
					short.filled_base_asset_quantity -= decision.fill_amount;
					matches += 1;
					ctx.metrics.increment(metrics::MATCHES_SUBMITTED);
					debug!(
						long_order = %long.id,
						short_order = %short.id,
						fill_amount = decision.fill_amount,
						"Match submitted"
					);
				}
				Err(e) => {
					error!(long_order = %long.id, short_order = %short.id, error = %e, "Failed to submit match");
					ctx.metrics.increment(metrics::MATCH_SUBMIT_FAILURES);
					run.release_margin(long.trader, decision.long_margin);
					run.release_margin(short.trader, decision.short_margin);
					run.skipped.insert(long.id);
					run.skipped.insert(short.id);
					run.failures += 1;
					break;
				}
			}
		}

		shorts.retain(|s| s.unfilled_quantity() != 0);
	}

	matches
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use proptest::prelude::*;

	use super::*;
	use crate::settlement::{QueuedExecutor, SettlementInstruction};
	use strata_sdk::{Address, IocOrder, LimitOrder, RawOrder};

	const REQUIREMENT: MarginRequirement = MarginRequirement {
		min_allowable_margin: 200_000,
		taker_fee: 0,
	};

	fn limit_order(trader: u64, salt: Amount, quantity: Amount, price: Amount, block: u64, post_only: bool) -> Order {
		let raw = RawOrder::Limit(LimitOrder {
			market: 0,
			trader: Address::from_low_u64(trader),
			base_asset_quantity: quantity,
			price,
			salt,
			reduce_only: false,
			post_only,
		});
		Order::new(raw.hash(), raw, block)
	}

	fn ioc_order(trader: u64, salt: Amount, quantity: Amount, price: Amount, block: u64) -> Order {
		let raw = RawOrder::Ioc(IocOrder {
			expire_at: 0,
			market: 0,
			trader: Address::from_low_u64(trader),
			base_asset_quantity: quantity,
			price,
			salt,
			reduce_only: false,
		});
		Order::new(raw.hash(), raw, block)
	}

	fn run_match(longs: &mut Vec<Order>, shorts: &mut Vec<Order>, run: &mut RunState) -> (usize, Vec<SettlementInstruction>) {
		let executor = QueuedExecutor::new();
		let metrics = Metrics::new();
		let ctx = MatchContext {
			executor: &executor,
			metrics: &metrics,
			requirement: REQUIREMENT,
			upper_bound: None,
		};
		let matches = run_matching_engine(longs, shorts, &ctx, run);
		(matches, executor.drain())
	}

	#[test]
	fn test_single_cross() {
		let mut longs = vec![limit_order(1, 1, 10, 20, 2, false)];
		let mut shorts = vec![limit_order(2, 2, -10, 19, 2, false)];
		let mut run = RunState::default();

		let (matches, instructions) = run_match(&mut longs, &mut shorts, &mut run);

		assert_eq!(matches, 1);
		assert!(matches!(
			instructions.as_slice(),
			[SettlementInstruction::MatchOrders { fill_amount: 10, .. }]
		));
		assert_eq!(longs[0].unfilled_quantity(), 0);
		assert!(shorts.is_empty());
	}

	#[test]
	fn test_no_cross_when_long_below_short() {
		let mut longs = vec![limit_order(1, 1, 10, 18, 2, false)];
		let mut shorts = vec![limit_order(2, 2, -10, 19, 2, false)];
		let mut run = RunState::default();

		let (matches, instructions) = run_match(&mut longs, &mut shorts, &mut run);
		assert_eq!(matches, 0);
		assert!(instructions.is_empty());
	}

	#[test]
	fn test_long_walks_several_shorts() {
		let mut longs = vec![limit_order(1, 1, 25, 20, 2, false)];
		let mut shorts = vec![
			limit_order(2, 2, -10, 18, 1, false),
			limit_order(3, 3, -10, 19, 1, false),
			limit_order(4, 4, -10, 20, 1, false),
		];
		let mut run = RunState::default();

		let (matches, _) = run_match(&mut longs, &mut shorts, &mut run);

		assert_eq!(matches, 3);
		assert_eq!(longs[0].unfilled_quantity(), 0);
		assert_eq!(shorts.len(), 1);
		assert_eq!(shorts[0].unfilled_quantity(), -5);
	}

	#[test]
	fn test_ioc_never_matches_later_order() {
		// IOC long at block 1, resting short arrives at block 2
		let mut longs = vec![ioc_order(1, 1, 10, 20, 1)];
		let mut shorts = vec![limit_order(2, 2, -10, 19, 2, false)];
		let mut run = RunState::default();
		run.available_margin.insert(Address::from_low_u64(1), Amount::MAX / 2);

		let (matches, _) = run_match(&mut longs, &mut shorts, &mut run);
		assert_eq!(matches, 0);
	}

	#[test]
	fn test_post_only_never_takes() {
		// Post-only short arrives after the resting long
		let mut longs = vec![limit_order(1, 1, 10, 20, 1, false)];
		let mut shorts = vec![limit_order(2, 2, -10, 19, 2, true)];
		let mut run = RunState::default();

		let (matches, _) = run_match(&mut longs, &mut shorts, &mut run);
		assert_eq!(matches, 0);
	}

	#[test]
	fn test_ioc_taker_needs_margin() {
		let size = 1_000_000_000_000_000_000;
		let mut longs = vec![limit_order(1, 1, size, 20_000_000, 1, false)];
		let mut shorts = vec![ioc_order(2, 2, -size, 20_000_000, 2)];
		let mut run = RunState::default();
		// 20 quote at 20% needs 4
		run.available_margin.insert(Address::from_low_u64(2), 3_999_999);

		let (matches, _) = run_match(&mut longs, &mut shorts, &mut run);
		assert_eq!(matches, 0);

		run.available_margin.insert(Address::from_low_u64(2), 4_000_000);
		let (matches, _) = run_match(&mut longs, &mut shorts, &mut run);
		assert_eq!(matches, 1);
		assert_eq!(run.available_margin[&Address::from_low_u64(2)], 0);
	}

	fn arb_side() -> impl Strategy<Value = Vec<(i64, i64, u64, bool)>> {
		prop::collection::vec((1i64..20, 1i64..10, 1u64..4, any::<bool>()), 0..12)
	}

	proptest! {
		#[test]
		fn prop_matches_only_cross_prices(long_specs in arb_side(), short_specs in arb_side()) {
			let mut longs: Vec<Order> = long_specs
				.iter()
				.enumerate()
				.map(|(i, (price, qty, block, post_only))| {
					limit_order(1, i as Amount, *qty as Amount, *price as Amount, *block, *post_only)
				})
				.collect();
			let mut shorts: Vec<Order> = short_specs
				.iter()
				.enumerate()
				.map(|(i, (price, qty, block, post_only))| {
					limit_order(2, 100 + i as Amount, -(*qty as Amount), *price as Amount, *block, *post_only)
				})
				.collect();
			longs.sort_by(|a, b| b.price.cmp(&a.price).then(a.block_number.cmp(&b.block_number)).then(a.id.cmp(&b.id)));
			shorts.sort_by(|a, b| a.price.cmp(&b.price).then(a.block_number.cmp(&b.block_number)).then(a.id.cmp(&b.id)));

			let orders: BTreeMap<_, _> = longs.iter().chain(shorts.iter()).map(|o| (o.id, o.clone())).collect();
			let mut run = RunState::default();
			let (matches, instructions) = run_match(&mut longs, &mut shorts, &mut run);
			prop_assert_eq!(matches, instructions.len());

			let mut filled: BTreeMap<_, Amount> = BTreeMap::new();
			for instruction in instructions {
				let SettlementInstruction::MatchOrders { long_order, short_order, fill_amount, .. } = instruction else {
					return Err(TestCaseError::fail("only match instructions are queued"));
				};
				prop_assert!(orders[&long_order].price >= orders[&short_order].price);
				prop_assert!(fill_amount > 0);
				*filled.entry(long_order).or_default() += fill_amount;
				*filled.entry(short_order).or_default() += fill_amount;
			}
			for (id, total) in filled {
				prop_assert!(total <= orders[&id].base_asset_quantity.abs());
			}
		}
	}
}
