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

//! Strata SDK - shared wire types for the perpetuals order book
//!
//! This crate holds the types exchanged between the matching node and its
//! collaborators: account and hash primitives, the raw order payloads placed
//! on-chain, typed contract events and the chain log records carrying them.
//!
//! The SDK is designed to be lightweight and embeddable:
//! - No background threads
//! - No runtime initialization
//! - No environment or configuration loading

pub mod events;
pub mod orders;
pub mod types;

pub use events::{
	ClearingHouseEvent, ContractEvent, ContractKind, DecodeError, IocOrderBookEvent, Log,
	MarginAccountEvent, OrderBookEvent, PositionChange, event_topic,
};
pub use orders::{IocOrder, LimitOrder, OrderKind, RawOrder, SignedOrder};
pub use types::*;
