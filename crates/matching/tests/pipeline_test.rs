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

//! Integration tests for the matching pipeline
//!
//! Matching, liquidation, cancellation and the funding jobs, end to end
//! through the order store, plus the scheduler's fallback ticker.

use std::{sync::Arc, time::Duration};

use strata_matching::{
	EventIngestor, ExecutionError, Feed, MatchingConfig, MatchingPipeline, Metrics, Order, OrderStore,
	PipelineScheduler, QueuedExecutor, SettlementInstruction, StaticConfigService, TransactionExecutor, metrics,
	params::{MarketParams, ProtocolParams},
};
use strata_sdk::{
	Address, Amount, BASE_PRECISION, ContractEvent, LimitOrder, OrderBookEvent, PRICE_PRECISION, RawOrder,
};

struct Harness {
	store: Arc<OrderStore>,
	config: Arc<StaticConfigService>,
	metrics: Arc<Metrics>,
}

fn harness() -> Harness {
	let config = Arc::new(StaticConfigService::new(ProtocolParams::default()));
	config.set_market(0, MarketParams::default());
	config.set_oracle_price(0, 49 * PRICE_PRECISION);
	config.set_mid_price(0, 50 * PRICE_PRECISION);
	config.set_taker_fee(0);
	let metrics = Arc::new(Metrics::new());
	let store = Arc::new(OrderStore::new(config.clone(), metrics.clone()));
	Harness { store, config, metrics }
}

impl Harness {
	fn pipeline(&self, executor: Arc<dyn TransactionExecutor>) -> MatchingPipeline {
		MatchingPipeline::new(self.store.clone(), self.config.clone(), executor, self.metrics.clone())
	}

	fn add_limit(&self, trader: u64, salt: Amount, quantity: Amount, price: Amount, block: u64) -> Order {
		let raw = RawOrder::Limit(LimitOrder {
			market: 0,
			trader: Address::from_low_u64(trader),
			base_asset_quantity: quantity,
			price,
			salt,
			reduce_only: false,
			post_only: false,
		});
		let order = Order::new(raw.hash(), raw, block);
		self.store.add(order.clone());
		order
	}

	/// Margin 500, long 10 entered at 90, 42 of pending funding
	fn add_underwater_long(&self, trader: u64, margin: Amount) {
		let trader = Address::from_low_u64(trader);
		self.store.update_margin(trader, 0, margin);
		self.store.update_position(trader, 0, 10 * BASE_PRECISION, 900 * PRICE_PRECISION, false, 1);
	}

	fn accrue_funding(&self) {
		// 4.2 per unit on a size of 10
		self.store.update_unrealised_funding(0, 4_200_000);
	}
}

struct LiquidationRejectingExecutor {
	inner: QueuedExecutor,
}

impl TransactionExecutor for LiquidationRejectingExecutor {
	fn execute_matched_orders(&self, long_order: &Order, short_order: &Order, fill_amount: Amount) -> Result<(), ExecutionError> {
		self.inner.execute_matched_orders(long_order, short_order, fill_amount)
	}

	fn execute_liquidation(&self, _trader: Address, _order: &Order, _fill_amount: Amount) -> Result<(), ExecutionError> {
		Err(ExecutionError::Rejected("liquidation reverted".to_string()))
	}

	fn execute_limit_order_cancel(&self, orders: &[Order]) -> Result<(), ExecutionError> {
		self.inner.execute_limit_order_cancel(orders)
	}

	fn execute_funding_payment(&self) -> Result<(), ExecutionError> {
		self.inner.execute_funding_payment()
	}

	fn execute_sample_pi(&self) -> Result<(), ExecutionError> {
		self.inner.execute_sample_pi()
	}

	fn purge_queued_instructions(&self) {
		self.inner.purge_queued_instructions()
	}

	fn queued_instruction_count(&self) -> usize {
		self.inner.queued_instruction_count()
	}
}

#[test]
fn test_crossing_orders_matched_and_settled() {
	let h = harness();
	let executor = Arc::new(QueuedExecutor::new());
	let pipeline = h.pipeline(executor.clone());
	let long = h.add_limit(1, 1, 10 * BASE_PRECISION, 20 * PRICE_PRECISION, 2);
	let short = h.add_limit(2, 2, -10 * BASE_PRECISION, 19 * PRICE_PRECISION, 2);

	let outcome = pipeline.run(3, 1_000);
	assert_eq!(outcome.matches, 1);

	let instructions = executor.drain();
	assert_eq!(instructions.len(), 1);
	let SettlementInstruction::MatchOrders {
		long_order,
		short_order,
		fill_amount,
		..
	} = &instructions[0]
	else {
		panic!("expected a match, got {:?}", instructions[0]);
	};
	assert_eq!((*long_order, *short_order), (long.id, short.id));
	assert_eq!(*fill_amount, 10 * BASE_PRECISION);

	// the chain settles it and the store catches up from the event
	let contracts = MatchingConfig::default().contracts;
	let feed_metrics = h.metrics.clone();
	let ingestor = EventIngestor::new(
		h.store.clone(),
		contracts.clone(),
		Arc::new(Feed::new("trader", 8, feed_metrics.clone())),
		Arc::new(Feed::new("market", 8, feed_metrics)),
	);
	let settled = ContractEvent::OrderBook(OrderBookEvent::OrdersMatched {
		long_order_hash: long.id,
		short_order_hash: short.id,
		fill_amount: *fill_amount,
		price: 20 * PRICE_PRECISION,
		timestamp: 1_001,
	})
	.to_log(contracts.order_book, 4, 0);
	ingestor.process_events(&[settled]);

	assert_eq!(h.store.get_order_by_id(&long.id).unwrap().unfilled_quantity(), 0);
	assert_eq!(h.store.get_order_by_id(&short.id).unwrap().unfilled_quantity(), 0);

	let next = pipeline.run(4, 1_002);
	assert_eq!(next.matches, 0);
}

#[test]
fn test_underwater_long_liquidated_into_resting_long() {
	let h = harness();
	h.add_underwater_long(1, 500 * PRICE_PRECISION);
	h.accrue_funding();
	let bid = h.add_limit(2, 1, 5 * BASE_PRECISION, 49 * PRICE_PRECISION, 2);

	let naughty = h.store.get_naughty_traders(&strata_matching::RiskState::from_config(h.config.as_ref()));
	assert_eq!(naughty.available_margin[&Address::from_low_u64(1)], -50 * PRICE_PRECISION);
	assert_eq!(naughty.liquidable.len(), 1);
	assert_eq!(naughty.liquidable[0].margin_fraction, 97_959);

	let executor = Arc::new(QueuedExecutor::new());
	let outcome = h.pipeline(executor.clone()).run(3, 1_000);
	assert_eq!(outcome.liquidations, 1);
	assert_eq!(outcome.cancellations, 0);

	let instructions = executor.drain();
	assert!(matches!(
		&instructions[..],
		[SettlementInstruction::Liquidate { trader, order, fill_amount, .. }]
			if *trader == Address::from_low_u64(1) && *order == bid.id && *fill_amount == 5 * BASE_PRECISION / 2
	));
}

#[test]
fn test_worst_margin_fraction_liquidated_first() {
	let h = harness();
	h.add_underwater_long(1, 500 * PRICE_PRECISION);
	h.add_underwater_long(3, 490 * PRICE_PRECISION);
	h.accrue_funding();
	let bid = h.add_limit(2, 1, 3 * BASE_PRECISION, 49 * PRICE_PRECISION, 2);

	let executor = Arc::new(QueuedExecutor::new());
	let outcome = h.pipeline(executor.clone()).run(3, 1_000);
	assert_eq!(outcome.liquidations, 2);

	let fills: Vec<(Address, Amount)> = executor
		.drain()
		.into_iter()
		.filter_map(|i| match i {
			SettlementInstruction::Liquidate { trader, order, fill_amount, .. } if order == bid.id => Some((trader, fill_amount)),
			_ => None,
		})
		.collect();
	assert_eq!(
		fills,
		vec![
			(Address::from_low_u64(3), 5 * BASE_PRECISION / 2),
			(Address::from_low_u64(1), BASE_PRECISION / 2),
		]
	);
}

#[test]
fn test_failed_liquidation_skips_order_for_the_run() {
	let h = harness();
	h.add_underwater_long(1, 500 * PRICE_PRECISION);
	h.accrue_funding();
	h.add_limit(2, 1, 5 * BASE_PRECISION, 49 * PRICE_PRECISION, 2);
	h.add_limit(7, 2, -5 * BASE_PRECISION, 48 * PRICE_PRECISION, 2);

	let executor = Arc::new(LiquidationRejectingExecutor {
		inner: QueuedExecutor::new(),
	});
	let outcome = h.pipeline(executor.clone()).run(3, 1_000);

	assert_eq!(outcome.liquidations, 0);
	assert_eq!(outcome.matches, 0);
	assert_eq!(outcome.failures, 1);
	assert_eq!(h.metrics.get(metrics::LIQUIDATION_SUBMIT_FAILURES), 1);
	assert_eq!(executor.queued_instruction_count(), 0);
}

#[test]
fn test_orders_cancelled_for_negative_available_margin() {
	let h = harness();
	let trader = Address::from_low_u64(5);
	h.store.update_margin(trader, 0, 100 * PRICE_PRECISION);
	h.store.update_reserved_margin(trader, 150 * PRICE_PRECISION);
	// furthest from the oracle frees 60, enough for the 50 deficit
	let far = h.add_limit(5, 1, 10 * BASE_PRECISION, 30 * PRICE_PRECISION, 2);
	let near = h.add_limit(5, 2, BASE_PRECISION, 45 * PRICE_PRECISION, 2);
	let ask = h.add_limit(6, 3, -10 * BASE_PRECISION, 30 * PRICE_PRECISION, 2);

	let executor = Arc::new(QueuedExecutor::new());
	let outcome = h.pipeline(executor.clone()).run(3, 1_000);
	assert_eq!(outcome.cancellations, 1);
	assert_eq!(outcome.matches, 1);

	let instructions = executor.drain();
	assert!(matches!(
		&instructions[0],
		SettlementInstruction::CancelOrders { orders, .. } if *orders == vec![far.id]
	));
	// the cancelled order is left out of matching
	assert!(matches!(
		&instructions[1],
		SettlementInstruction::MatchOrders { long_order, short_order, fill_amount, .. }
			if *long_order == near.id && *short_order == ask.id && *fill_amount == BASE_PRECISION
	));
}

#[test]
fn test_ioc_taker_limited_by_available_margin() {
	let h = harness();
	let taker = Address::from_low_u64(8);
	// 20% of 2 * 50
	h.store.update_margin(taker, 0, 20 * PRICE_PRECISION);
	h.add_limit(9, 1, -4 * BASE_PRECISION, 50 * PRICE_PRECISION, 2);

	let raw = RawOrder::Ioc(strata_sdk::IocOrder {
		expire_at: 0,
		market: 0,
		trader: taker,
		base_asset_quantity: 2 * BASE_PRECISION,
		price: 50 * PRICE_PRECISION,
		salt: 2,
		reduce_only: false,
	});
	let first = Order::new(raw.hash(), raw, 3);
	h.store.add(first);

	let raw = RawOrder::Ioc(strata_sdk::IocOrder {
		expire_at: 0,
		market: 0,
		trader: taker,
		base_asset_quantity: 2 * BASE_PRECISION,
		price: 50 * PRICE_PRECISION,
		salt: 3,
		reduce_only: false,
	});
	h.store.add(Order::new(raw.hash(), raw, 3));

	let executor = Arc::new(QueuedExecutor::new());
	let outcome = h.pipeline(executor).run(3, 1_000);
	assert_eq!(outcome.matches, 1);
	assert!(h.metrics.get(metrics::INSUFFICIENT_MARGIN) >= 1);
}

#[test]
fn test_funding_and_sample_pi_jobs() {
	let h = harness();
	h.store.update_next_funding_time(100);
	h.store.update_next_sample_pi_time(100);
	let executor = Arc::new(QueuedExecutor::new());
	let pipeline = h.pipeline(executor);

	let early = pipeline.run(1, 99);
	assert!(!early.funding_submitted && !early.sample_pi_submitted);

	let due = pipeline.run(2, 100);
	assert!(due.funding_submitted && due.sample_pi_submitted);
	assert_eq!(h.store.get_sample_pi_attempted_time(), 100);

	// sampling retried only after a pause
	let soon = pipeline.run(3, 103);
	assert!(soon.funding_submitted);
	assert!(!soon.sample_pi_submitted);

	let later = pipeline.run(4, 105);
	assert!(later.sample_pi_submitted);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_falls_back_to_ticker() {
	let h = harness();
	let pipeline = Arc::new(h.pipeline(Arc::new(QueuedExecutor::new())));
	let scheduler = PipelineScheduler::start(pipeline, Duration::from_secs(5), 8);

	tokio::time::sleep(Duration::from_secs(12)).await;
	let outcome = scheduler.run_now(20, 1_000).await.unwrap();
	assert_eq!(outcome.block_number, 20);
	assert!(h.metrics.get(metrics::PIPELINE_RUNS) >= 2);

	scheduler.shutdown().await;
}
