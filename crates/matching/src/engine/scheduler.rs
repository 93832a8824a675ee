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

use std::{
	sync::Arc,
	time::{Duration, SystemTime},
};

use tokio::{
	sync::{mpsc, oneshot},
	task::JoinHandle,
	time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{EngineControlMessage, MatchingPipeline, PipelineError, RunOutcome};

/// Drives a [`MatchingPipeline`] from accepted blocks and a fallback ticker
///
/// The ticker is reset after every block-triggered run, so it only fires
/// when blocks stop arriving.
pub struct PipelineScheduler {
	sender: mpsc::Sender<EngineControlMessage>,
	handle: Option<JoinHandle<()>>,
}

impl PipelineScheduler {
	/// Spawn the scheduler task on the current tokio runtime
	pub fn start(pipeline: Arc<MatchingPipeline>, ticker: Duration, channel_size: usize) -> Self {
		let (sender, receiver) = mpsc::channel(channel_size.max(1));
		let handle = tokio::spawn(Self::run_loop(pipeline, receiver, ticker));
		Self {
			sender,
			handle: Some(handle),
		}
	}

	pub fn sender(&self) -> mpsc::Sender<EngineControlMessage> {
		self.sender.clone()
	}

	pub async fn block_accepted(&self, number: u64, timestamp: u64) -> Result<(), PipelineError> {
		self.sender
			.send(EngineControlMessage::BlockAccepted { number, timestamp })
			.await
			.map_err(|_| PipelineError::Shutdown)
	}

	/// Run immediately, queued behind any pending control messages
	pub async fn run_now(&self, block_number: u64, timestamp: u64) -> Result<RunOutcome, PipelineError> {
		let (respond_to, response) = oneshot::channel();
		self.sender
			.send(EngineControlMessage::RunNow {
				block_number,
				timestamp,
				respond_to,
			})
			.await
			.map_err(|_| PipelineError::Shutdown)?;
		response.await.map_err(|_| PipelineError::Shutdown)?
	}

	/// Stop the task and wait for an in-flight run to finish
	pub async fn shutdown(mut self) {
		let _ = self.sender.send(EngineControlMessage::Shutdown).await;
		if let Some(handle) = self.handle.take()
			&& let Err(e) = handle.await
		{
			error!(target: "pipeline", error = %e, "Scheduler task failed");
		}
	}

	async fn run_loop(pipeline: Arc<MatchingPipeline>, mut receiver: mpsc::Receiver<EngineControlMessage>, ticker: Duration) {
		let mut interval = time::interval_at(time::Instant::now() + ticker, ticker);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut last_block = 0;

		info!(target: "pipeline", ticker_ms = ticker.as_millis() as u64, "Pipeline scheduler started");

		loop {
			tokio::select! {
				biased;

				message = receiver.recv() => match message {
					Some(EngineControlMessage::BlockAccepted { number, timestamp }) => {
						last_block = last_block.max(number);
						if let Err(e) = Self::run_blocking(&pipeline, number, timestamp).await {
							error!(target: "pipeline", block_number = number, error = %e, "Pipeline run failed");
						}
						interval.reset();
					}
					Some(EngineControlMessage::RunNow { block_number, timestamp, respond_to }) => {
						last_block = last_block.max(block_number);
						let outcome = Self::run_blocking(&pipeline, block_number, timestamp).await;
						if respond_to.send(outcome).is_err() {
							debug!(target: "pipeline", block_number, "Run requester went away");
						}
						interval.reset();
					}
					Some(EngineControlMessage::Shutdown) | None => break,
				},
				_ = interval.tick() => {
					debug!(target: "pipeline", block_number = last_block, "Fallback ticker fired");
					if let Err(e) = Self::run_blocking(&pipeline, last_block, unix_now()).await {
						error!(target: "pipeline", block_number = last_block, error = %e, "Pipeline run failed");
					}
				}
			}
		}

		info!(target: "pipeline", "Pipeline scheduler stopped");
	}

	async fn run_blocking(pipeline: &Arc<MatchingPipeline>, block_number: u64, timestamp: u64) -> Result<RunOutcome, PipelineError> {
		let pipeline = Arc::clone(pipeline);
		tokio::task::spawn_blocking(move || pipeline.run(block_number, timestamp))
			.await
			.map_err(|e| {
				warn!(target: "pipeline", block_number, "Pipeline run did not complete");
				PipelineError::RunPanicked(e.to_string())
			})
	}
}

fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(SystemTime::UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		metrics::{self, Metrics},
		params::{ProtocolParams, StaticConfigService},
		settlement::QueuedExecutor,
		store::OrderStore,
	};

	fn pipeline() -> (Arc<MatchingPipeline>, Arc<Metrics>) {
		let config = Arc::new(StaticConfigService::new(ProtocolParams::default()));
		let metrics = Arc::new(Metrics::new());
		let store = Arc::new(OrderStore::new(config.clone(), metrics.clone()));
		let pipeline = MatchingPipeline::new(store, config, Arc::new(QueuedExecutor::new()), metrics.clone());
		(Arc::new(pipeline), metrics)
	}

	#[tokio::test]
	async fn test_run_now_reports_outcome() {
		let (pipeline, metrics) = pipeline();
		let scheduler = PipelineScheduler::start(pipeline, Duration::from_secs(60), 8);

		scheduler.block_accepted(7, 100).await.unwrap();
		let outcome = scheduler.run_now(8, 101).await.unwrap();
		assert_eq!(outcome.block_number, 8);
		assert_eq!(metrics.get(metrics::PIPELINE_RUNS), 2);

		scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn test_run_now_after_shutdown_fails() {
		let (pipeline, _) = pipeline();
		let scheduler = PipelineScheduler::start(pipeline, Duration::from_secs(60), 8);
		let sender = scheduler.sender();
		scheduler.shutdown().await;

		let (respond_to, _response) = oneshot::channel();
		let sent = sender
			.send(EngineControlMessage::RunNow {
				block_number: 1,
				timestamp: 1,
				respond_to,
			})
			.await;
		assert!(sent.is_err());
	}
}
