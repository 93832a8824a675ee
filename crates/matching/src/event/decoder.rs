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

use strata_sdk::{ContractEvent, ContractKind, DecodeError, Log};

/// Turns raw logs into typed contract events
pub trait EventDecoder: Send + Sync {
	fn decode(&self, kind: ContractKind, log: &Log) -> Result<ContractEvent, DecodeError>;
}

/// Decoder for the topic-hash + JSON payload log encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventDecoder;

impl EventDecoder for JsonEventDecoder {
	fn decode(&self, kind: ContractKind, log: &Log) -> Result<ContractEvent, DecodeError> {
		ContractEvent::from_log(kind, log)
	}
}
