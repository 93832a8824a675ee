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

use strata_sdk::{Side, min_abs};
use tracing::{debug, error, trace, warn};

use super::state::{MarginRequirement, RunState};
use crate::{
	metrics::{self, Metrics},
	params::ConfigService,
	settlement::TransactionExecutor,
	types::LiquidablePosition,
};

/// Fill liquidation candidates against resting orders, most undercollateralized first
///
/// A long position is closed into resting longs (buyers of the position
/// being sold), a short position into resting shorts. Each side is walked in
/// priority order and the walk stops at the market's liquidation bound.
pub(crate) fn run_liquidations(
	liquidable: &[LiquidablePosition],
	run: &mut RunState,
	config: &dyn ConfigService,
	executor: &dyn TransactionExecutor,
	requirement: MarginRequirement,
	metrics: &Metrics,
) -> usize {
	let mut submitted = 0;

	for candidate in liquidable {
		let bounds = config.liquidation_bounds(candidate.market);
		let upper_bound = bounds.upper_limit();
		let mut remaining = candidate.unfilled_size();

		let Some(mut book) = run.books.remove(&candidate.market) else {
			trace!(market = candidate.market, trader = %candidate.trader, "No orders to liquidate against");
			continue;
		};
		let orders = match candidate.side {
			Side::Long => &mut book.longs,
			Side::Short => &mut book.shorts,
		};

		for order in orders.iter_mut() {
			if remaining == 0 {
				break;
			}
			let beyond_bound = match candidate.side {
				Side::Long => order.price < bounds.lower,
				Side::Short => order.price > bounds.upper,
			};
			if beyond_bound {
				break;
			}
			if run.is_skipped(order) {
				continue;
			}

			let fill_amount = min_abs(remaining, order.unfilled_quantity());
			if fill_amount == 0 {
				continue;
			}
			let Some(reserved) = run.reserve_margin(order, fill_amount, upper_bound, requirement) else {
				trace!(order_id = %order.id, "Insufficient margin to take liquidation");
				metrics.increment(metrics::INSUFFICIENT_MARGIN);
				continue;
			};

			match executor.execute_liquidation(candidate.trader, order, fill_amount) {
				Ok(()) => {
					order.filled_base_asset_quantity += fill_amount * order.side.sign();
					remaining -= fill_amount;
					submitted += 1;
					metrics.increment(metrics::LIQUIDATIONS_SUBMITTED);
					debug!(
						trader = %candidate.trader,
						market = candidate.market,
						order_id = %order.id,
						fill_amount,
						"Liquidation submitted"
					);
				}
				Err(e) => {
					error!(trader = %candidate.trader, order_id = %order.id, error = %e, "Failed to submit liquidation");
					metrics.increment(metrics::LIQUIDATION_SUBMIT_FAILURES);
					run.release_margin(order.trader, reserved);
					run.skipped.insert(order.id);
					run.failures += 1;
					break;
				}
			}
		}

		if remaining > 0 {
			warn!(
				trader = %candidate.trader,
				market = candidate.market,
				remaining = remaining as f64 / 1e18,
				"Position not fully liquidated this run"
			);
		}

		book.prune_exhausted();
		run.books.insert(candidate.market, book);
	}

	submitted
}
