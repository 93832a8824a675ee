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

//! Per-block matching pipeline
//!
//! One run reads the store, decides cancellations, liquidations and
//! matches over working copies of the eligible orders, and hands every
//! decision to the [`TransactionExecutor`]. The store itself is never
//! mutated here except for the sample-PI attempt marker.

mod control;
mod liquidation;
mod scheduler;
mod state;

pub use control::EngineControlMessage;
pub use scheduler::PipelineScheduler;
pub use state::{MarginRequirement, RunOutcome, RunState, WorkingBook};

use std::sync::Arc;

use parking_lot::Mutex;
use strata_sdk::{Address, Market};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
	config::{MAX_CANCELS_PER_TX, SAMPLE_PI_RETRY_SECS},
	matcher::{MatchContext, run_matching_engine},
	metrics::{self, Metrics},
	params::ConfigService,
	risk::RiskState,
	settlement::TransactionExecutor,
	store::OrderStore,
	types::Order,
};

/// Error types for pipeline scheduling
#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("Pipeline scheduler is shut down")]
	Shutdown,
	#[error("Pipeline run panicked: {0}")]
	RunPanicked(String),
}

/// Matching, liquidation and cancellation over one [`OrderStore`]
pub struct MatchingPipeline {
	store: Arc<OrderStore>,
	config: Arc<dyn ConfigService>,
	executor: Arc<dyn TransactionExecutor>,
	metrics: Arc<Metrics>,
	/// Serializes runs triggered by blocks and by the fallback ticker
	run_lock: Mutex<()>,
}

impl MatchingPipeline {
	pub fn new(
		store: Arc<OrderStore>,
		config: Arc<dyn ConfigService>,
		executor: Arc<dyn TransactionExecutor>,
		metrics: Arc<Metrics>,
	) -> Self {
		Self {
			store,
			config,
			executor,
			metrics,
			run_lock: Mutex::new(()),
		}
	}

	pub fn store(&self) -> &Arc<OrderStore> {
		&self.store
	}

	pub fn executor(&self) -> &Arc<dyn TransactionExecutor> {
		&self.executor
	}

	/// Run the full pipeline for `block_number` at wall-clock `now` (seconds)
	pub fn run(&self, block_number: u64, now: u64) -> RunOutcome {
		let _guard = self.run_lock.lock();
		let mut outcome = RunOutcome {
			block_number,
			..Default::default()
		};

		self.executor.purge_queued_instructions();

		outcome.funding_submitted = self.run_funding(now, &mut outcome.failures);
		outcome.sample_pi_submitted = self.run_sample_pi(now, &mut outcome.failures);

		let risk_state = RiskState::from_config(self.config.as_ref());
		let naughty = self.store.get_naughty_traders(&risk_state);

		let mut run = RunState {
			available_margin: naughty.available_margin,
			..Default::default()
		};

		for (trader, orders) in &naughty.orders_to_cancel {
			outcome.cancellations += self.cancel_orders(*trader, orders, &mut run);
		}

		for market in &risk_state.active_markets {
			let book = self.working_book(*market, block_number, now, &run);
			run.books.insert(*market, book);
		}

		let requirement = MarginRequirement {
			min_allowable_margin: risk_state.min_allowable_margin,
			taker_fee: risk_state.taker_fee,
		};

		outcome.liquidations = liquidation::run_liquidations(
			&naughty.liquidable,
			&mut run,
			self.config.as_ref(),
			self.executor.as_ref(),
			requirement,
			&self.metrics,
		);

		for market in &risk_state.active_markets {
			let Some(mut book) = run.books.remove(market) else {
				continue;
			};
			let ctx = MatchContext {
				executor: self.executor.as_ref(),
				metrics: &self.metrics,
				requirement,
				upper_bound: self.config.acceptable_bounds(*market).upper_limit(),
			};
			outcome.matches += run_matching_engine(&mut book.longs, &mut book.shorts, &ctx, &mut run);
			run.books.insert(*market, book);
		}

		outcome.failures += run.failures;
		outcome.queued_instructions = self.executor.queued_instruction_count();
		self.metrics.increment(metrics::PIPELINE_RUNS);

		info!(
			target: "pipeline",
			block_number,
			cancellations = outcome.cancellations,
			liquidations = outcome.liquidations,
			matches = outcome.matches,
			failures = outcome.failures,
			queued = outcome.queued_instructions,
			"Pipeline run complete"
		);
		outcome
	}

	fn run_funding(&self, now: u64, failures: &mut usize) -> bool {
		let next_funding_time = self.store.get_next_funding_time();
		if next_funding_time == 0 || now < next_funding_time {
			return false;
		}
		match self.executor.execute_funding_payment() {
			Ok(()) => {
				info!(target: "pipeline", next_funding_time, now, "Funding payment submitted");
				true
			}
			Err(e) => {
				error!(target: "pipeline", error = %e, "Failed to submit funding payment");
				*failures += 1;
				false
			}
		}
	}

	fn run_sample_pi(&self, now: u64, failures: &mut usize) -> bool {
		let next_sample_pi_time = self.store.get_next_sample_pi_time();
		if next_sample_pi_time == 0 || now < next_sample_pi_time {
			return false;
		}
		let last_attempt = self.store.get_sample_pi_attempted_time();
		if now.saturating_sub(last_attempt) < SAMPLE_PI_RETRY_SECS {
			debug!(target: "pipeline", last_attempt, now, "Sample PI attempted recently");
			return false;
		}
		self.store.signal_sample_pi_attempted(now);
		match self.executor.execute_sample_pi() {
			Ok(()) => {
				info!(target: "pipeline", next_sample_pi_time, now, "Sample PI submitted");
				true
			}
			Err(e) => {
				error!(target: "pipeline", error = %e, "Failed to submit sample PI");
				*failures += 1;
				false
			}
		}
	}

	/// Cancel a trader's orders in batches of [`MAX_CANCELS_PER_TX`]
	fn cancel_orders(&self, trader: Address, orders: &[Order], run: &mut RunState) -> usize {
		let mut cancelled = 0;
		for batch in orders.chunks(MAX_CANCELS_PER_TX) {
			match self.executor.execute_limit_order_cancel(batch) {
				Ok(()) => {
					run.cancelled.extend(batch.iter().map(|o| o.id));
					cancelled += batch.len();
					self.metrics.add(metrics::CANCELS_SUBMITTED, batch.len() as u64);
				}
				Err(e) => {
					warn!(target: "pipeline", trader = %trader, orders = batch.len(), error = %e, "Failed to submit order cancellation");
					run.failures += 1;
				}
			}
		}
		debug!(target: "pipeline", trader = %trader, cancelled, "Orders selected for cancellation");
		cancelled
	}

	/// Eligible orders of `market` that could possibly match or absorb a liquidation
	fn working_book(&self, market: Market, block_number: u64, now: u64, run: &RunState) -> WorkingBook {
		let acceptable = self.config.acceptable_bounds(market);
		let liquidation = self.config.liquidation_bounds(market);

		let mut longs = self.store.get_long_orders(market, Some(acceptable.lower), Some(block_number), now);
		longs.retain(|o| !run.cancelled.contains(&o.id));

		let short_bound = match longs.first() {
			Some(best_long) => best_long.price.max(liquidation.upper).min(acceptable.upper),
			None => liquidation.upper,
		};
		let mut shorts = self.store.get_short_orders(market, Some(short_bound), Some(block_number), now);
		shorts.retain(|o| !run.cancelled.contains(&o.id));

		WorkingBook { longs, shorts }
	}
}
