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

//! Settlement instructions produced by the pipeline
//!
//! The pipeline never talks to the chain itself. Every decision becomes a
//! call on a [`TransactionExecutor`], which queues it for broadcast; the
//! store only learns the outcome from the events the transactions emit.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use strata_sdk::{Address, Amount, OrderHash, serde_amount};
use thiserror::Error;
use uuid::Uuid;

use crate::types::Order;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
	#[error("Instruction rejected: {0}")]
	Rejected(String),
	#[error("Instruction queue is full ({0} queued)")]
	QueueFull(usize),
}

/// Chain-side actions of the matching service
pub trait TransactionExecutor: Send + Sync {
	fn execute_matched_orders(&self, long_order: &Order, short_order: &Order, fill_amount: Amount) -> Result<(), ExecutionError>;

	fn execute_liquidation(&self, trader: Address, order: &Order, fill_amount: Amount) -> Result<(), ExecutionError>;

	fn execute_limit_order_cancel(&self, orders: &[Order]) -> Result<(), ExecutionError>;

	fn execute_funding_payment(&self) -> Result<(), ExecutionError>;

	fn execute_sample_pi(&self) -> Result<(), ExecutionError>;

	/// Drop instructions not yet handed to the chain
	fn purge_queued_instructions(&self);

	fn queued_instruction_count(&self) -> usize;
}

/// One queued chain transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SettlementInstruction {
	MatchOrders {
		id: Uuid,
		long_order: OrderHash,
		short_order: OrderHash,
		#[serde(with = "serde_amount")]
		fill_amount: Amount,
	},
	Liquidate {
		id: Uuid,
		trader: Address,
		order: OrderHash,
		#[serde(with = "serde_amount")]
		fill_amount: Amount,
	},
	CancelOrders {
		id: Uuid,
		orders: Vec<OrderHash>,
	},
	SettleFunding {
		id: Uuid,
	},
	SamplePremiumIndex {
		id: Uuid,
	},
}

impl SettlementInstruction {
	pub fn id(&self) -> Uuid {
		match self {
			SettlementInstruction::MatchOrders { id, .. }
			| SettlementInstruction::Liquidate { id, .. }
			| SettlementInstruction::CancelOrders { id, .. }
			| SettlementInstruction::SettleFunding { id }
			| SettlementInstruction::SamplePremiumIndex { id } => *id,
		}
	}
}

/// Executor that queues instructions for a broadcaster to drain
#[derive(Debug, Default)]
pub struct QueuedExecutor {
	queue: Mutex<Vec<SettlementInstruction>>,
	/// Reject new instructions beyond this many; unbounded when `None`
	max_queued: Option<usize>,
}

impl QueuedExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_capacity_limit(max_queued: usize) -> Self {
		Self {
			queue: Mutex::new(Vec::new()),
			max_queued: Some(max_queued),
		}
	}

	fn enqueue(&self, instruction: SettlementInstruction) -> Result<(), ExecutionError> {
		let mut queue = self.queue.lock();
		if let Some(max) = self.max_queued
			&& queue.len() >= max
		{
			return Err(ExecutionError::QueueFull(queue.len()));
		}
		queue.push(instruction);
		Ok(())
	}

	/// Take every queued instruction, oldest first
	pub fn drain(&self) -> Vec<SettlementInstruction> {
		std::mem::take(&mut *self.queue.lock())
	}

	/// Copy of the queue without consuming it
	pub fn instructions(&self) -> Vec<SettlementInstruction> {
		self.queue.lock().clone()
	}
}

impl TransactionExecutor for QueuedExecutor {
	fn execute_matched_orders(&self, long_order: &Order, short_order: &Order, fill_amount: Amount) -> Result<(), ExecutionError> {
		self.enqueue(SettlementInstruction::MatchOrders {
			id: Uuid::new_v4(),
			long_order: long_order.id,
			short_order: short_order.id,
			fill_amount,
		})
	}

	fn execute_liquidation(&self, trader: Address, order: &Order, fill_amount: Amount) -> Result<(), ExecutionError> {
		self.enqueue(SettlementInstruction::Liquidate {
			id: Uuid::new_v4(),
			trader,
			order: order.id,
			fill_amount,
		})
	}

	fn execute_limit_order_cancel(&self, orders: &[Order]) -> Result<(), ExecutionError> {
		self.enqueue(SettlementInstruction::CancelOrders {
			id: Uuid::new_v4(),
			orders: orders.iter().map(|o| o.id).collect(),
		})
	}

	fn execute_funding_payment(&self) -> Result<(), ExecutionError> {
		self.enqueue(SettlementInstruction::SettleFunding { id: Uuid::new_v4() })
	}

	fn execute_sample_pi(&self) -> Result<(), ExecutionError> {
		self.enqueue(SettlementInstruction::SamplePremiumIndex { id: Uuid::new_v4() })
	}

	fn purge_queued_instructions(&self) {
		self.queue.lock().clear();
	}

	fn queued_instruction_count(&self) -> usize {
		self.queue.lock().len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_queue_and_purge() {
		let executor = QueuedExecutor::new();
		executor.execute_funding_payment().unwrap();
		executor.execute_sample_pi().unwrap();
		assert_eq!(executor.queued_instruction_count(), 2);

		executor.purge_queued_instructions();
		assert_eq!(executor.queued_instruction_count(), 0);
	}

	#[test]
	fn test_capacity_limit() {
		let executor = QueuedExecutor::with_capacity_limit(1);
		executor.execute_funding_payment().unwrap();
		assert_eq!(executor.execute_sample_pi(), Err(ExecutionError::QueueFull(1)));

		let drained = executor.drain();
		assert_eq!(drained.len(), 1);
		assert!(matches!(drained[0], SettlementInstruction::SettleFunding { .. }));
		assert_eq!(executor.queued_instruction_count(), 0);
	}
}
