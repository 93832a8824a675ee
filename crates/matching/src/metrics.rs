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

//! Named counters for ingestion and pipeline outcomes
//!
//! Every increment is emitted through the `metrics` facade, so whichever
//! recorder the host installs sees it. `Metrics` also keeps its own
//! registry of the same counters for the host's final report and for
//! assertions.

use std::{collections::BTreeMap, sync::atomic::Ordering};

use metrics::{Key, Label, counter, describe_counter};
use metrics_util::registry::{AtomicStorage, Registry};

pub const DELETE_ORDER_NOT_FOUND: &str = "store.delete_order_not_found";
pub const UPDATE_FILL_ORDER_NOT_FOUND: &str = "store.update_fill_order_not_found";
pub const FILL_OUT_OF_BOUNDS: &str = "store.fill_out_of_bounds";
pub const ARITHMETIC_OVERFLOWS: &str = "store.arithmetic_overflows";
pub const EVENTS_INGESTED: &str = "ingest.events";
pub const DECODE_FAILURES: &str = "ingest.decode_failures";
pub const AMOUNT_OUT_OF_RANGE: &str = "ingest.amount_out_of_range";
pub const UNKNOWN_CONTRACT_LOGS: &str = "ingest.unknown_contract_logs";
pub const FEED_EVENTS_DROPPED: &str = "feed.events_dropped";
pub const MATCHES_SUBMITTED: &str = "pipeline.matches_submitted";
pub const MATCH_SUBMIT_FAILURES: &str = "pipeline.match_submit_failures";
pub const LIQUIDATIONS_SUBMITTED: &str = "pipeline.liquidations_submitted";
pub const LIQUIDATION_SUBMIT_FAILURES: &str = "pipeline.liquidation_submit_failures";
pub const CANCELS_SUBMITTED: &str = "pipeline.cancels_submitted";
pub const INSUFFICIENT_MARGIN: &str = "pipeline.insufficient_margin";
pub const PIPELINE_RUNS: &str = "pipeline.runs";

/// Label carrying the event name on `EVENTS_INGESTED`
const EVENT_LABEL: &str = "event";

/// Counter handles shared by the store, ingestor, feeds and pipeline
pub struct Metrics {
	registry: Registry<Key, AtomicStorage>,
}

impl std::fmt::Debug for Metrics {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Metrics").field("counters", &self.snapshot()).finish()
	}
}

impl Default for Metrics {
	fn default() -> Self {
		Self::new()
	}
}

impl Metrics {
	pub fn new() -> Self {
		Self::register_metrics();
		Self {
			registry: Registry::atomic(),
		}
	}

	fn register_metrics() {
		describe_counter!(DELETE_ORDER_NOT_FOUND, "Deletes of orders the store does not hold");
		describe_counter!(UPDATE_FILL_ORDER_NOT_FOUND, "Fill updates for orders the store does not hold");
		describe_counter!(FILL_OUT_OF_BOUNDS, "Fill updates clamped to the order size");
		describe_counter!(ARITHMETIC_OVERFLOWS, "Store updates skipped because they overflow");
		describe_counter!(EVENTS_INGESTED, "Accepted logs applied, by event type");
		describe_counter!(DECODE_FAILURES, "Logs skipped because they failed to decode");
		describe_counter!(AMOUNT_OUT_OF_RANGE, "Logs skipped because an amount cannot be signed");
		describe_counter!(UNKNOWN_CONTRACT_LOGS, "Logs from untracked contracts");
		describe_counter!(FEED_EVENTS_DROPPED, "Feed events dropped for full subscribers");
		describe_counter!(MATCHES_SUBMITTED, "Match instructions queued");
		describe_counter!(MATCH_SUBMIT_FAILURES, "Match instructions the executor rejected");
		describe_counter!(LIQUIDATIONS_SUBMITTED, "Liquidation instructions queued");
		describe_counter!(LIQUIDATION_SUBMIT_FAILURES, "Liquidation instructions the executor rejected");
		describe_counter!(CANCELS_SUBMITTED, "Orders submitted for cancellation");
		describe_counter!(INSUFFICIENT_MARGIN, "Fills skipped for lack of margin");
		describe_counter!(PIPELINE_RUNS, "Matching pipeline runs");
	}

	pub fn increment(&self, name: &'static str) {
		self.add(name, 1);
	}

	pub fn add(&self, name: &'static str, value: u64) {
		counter!(name).increment(value);
		self.record(&Key::from_static_name(name), value);
	}

	/// Counts one accepted log of `event_name`
	pub fn increment_event(&self, event_name: &'static str) {
		counter!(EVENTS_INGESTED, EVENT_LABEL => event_name).increment(1);
		self.record(&event_key(event_name), 1);
	}

	pub fn get(&self, name: &'static str) -> u64 {
		self.value(&Key::from_static_name(name))
	}

	pub fn event_count(&self, event_name: &'static str) -> u64 {
		self.value(&event_key(event_name))
	}

	/// Point-in-time copy of every counter, sorted by name
	pub fn snapshot(&self) -> BTreeMap<String, u64> {
		self.registry
			.get_counter_handles()
			.into_iter()
			.map(|(key, counter)| (key_string(&key), counter.load(Ordering::Relaxed)))
			.collect()
	}

	fn record(&self, key: &Key, value: u64) {
		self.registry.get_or_create_counter(key, |counter| {
			counter.fetch_add(value, Ordering::Relaxed);
		});
	}

	fn value(&self, key: &Key) -> u64 {
		self.registry
			.get_counter(key)
			.map(|counter| counter.load(Ordering::Relaxed))
			.unwrap_or(0)
	}
}

fn event_key(event_name: &'static str) -> Key {
	Key::from_parts(EVENTS_INGESTED, vec![Label::new(EVENT_LABEL, event_name)])
}

fn key_string(key: &Key) -> String {
	let labels: Vec<String> = key
		.labels()
		.map(|label| format!("{}={}", label.key(), label.value()))
		.collect();
	if labels.is_empty() {
		key.name().to_string()
	} else {
		format!("{}{{{}}}", key.name(), labels.join(","))
	}
}

#[cfg(test)]
mod tests {
	use metrics_util::debugging::{DebugValue, DebuggingRecorder};

	use super::*;

	#[test]
	fn test_counters_accumulate() {
		let metrics = Metrics::new();
		metrics.increment(DECODE_FAILURES);
		metrics.add(DECODE_FAILURES, 2);
		metrics.increment_event("OrderPlaced");

		assert_eq!(metrics.get(DECODE_FAILURES), 3);
		assert_eq!(metrics.event_count("OrderPlaced"), 1);
		assert_eq!(metrics.event_count("MarginAdded"), 0);
		assert_eq!(metrics.get(PIPELINE_RUNS), 0);

		let snapshot = metrics.snapshot();
		assert_eq!(snapshot.len(), 2);
		assert_eq!(snapshot.get("ingest.events{event=OrderPlaced}"), Some(&1));
	}

	#[test]
	fn test_counters_reach_installed_recorder() {
		let recorder = DebuggingRecorder::new();
		let snapshotter = recorder.snapshotter();

		metrics::with_local_recorder(&recorder, || {
			let metrics = Metrics::new();
			metrics.add(CANCELS_SUBMITTED, 30);
			metrics.increment_event("MarginAdded");
		});

		let counters: Vec<(String, Vec<String>, u64)> = snapshotter
			.snapshot()
			.into_vec()
			.into_iter()
			.filter_map(|(composite, _, _, value)| match value {
				DebugValue::Counter(count) => {
					let key = composite.key();
					let labels = key.labels().map(|l| l.value().to_string()).collect();
					Some((key.name().to_string(), labels, count))
				}
				_ => None,
			})
			.collect();

		assert!(counters.contains(&(CANCELS_SUBMITTED.to_string(), vec![], 30)));
		assert!(counters.contains(&(EVENTS_INGESTED.to_string(), vec!["MarginAdded".to_string()], 1)));
	}
}
