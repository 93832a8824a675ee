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

use tokio::sync::oneshot;

use super::{PipelineError, RunOutcome};

/// Control messages for the pipeline scheduler
///
/// Producers never touch the pipeline directly; the scheduler task owns the
/// decision of when a run happens.
#[derive(Debug)]
pub enum EngineControlMessage {
	/// A block was accepted; run the pipeline for it
	BlockAccepted { number: u64, timestamp: u64 },

	/// Run immediately and report the outcome
	RunNow {
		block_number: u64,
		timestamp: u64,
		respond_to: oneshot::Sender<Result<RunOutcome, PipelineError>>,
	},

	/// Stop the scheduler task
	Shutdown,
}
