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

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
	events::DecodeError,
	types::{Address, Amount, Market, OrderHash, serde_amount},
};

/// Kind of order payload, also the discriminant hashed into the order id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
	Limit,
	Ioc,
	Signed,
}

impl OrderKind {
	fn tag(self) -> u8 {
		match self {
			OrderKind::Limit => 0,
			OrderKind::Ioc => 1,
			OrderKind::Signed => 2,
		}
	}
}

/// Resting limit order placed through the OrderBook contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
	pub market: Market,
	pub trader: Address,
	#[serde(with = "serde_amount")]
	pub base_asset_quantity: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	#[serde(with = "serde_amount")]
	pub salt: Amount,
	pub reduce_only: bool,
	pub post_only: bool,
}

/// Immediate-or-cancel order placed through the IOCOrderBook contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IocOrder {
	/// Unix timestamp (seconds) after which the order is void
	pub expire_at: u64,
	pub market: Market,
	pub trader: Address,
	#[serde(with = "serde_amount")]
	pub base_asset_quantity: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	#[serde(with = "serde_amount")]
	pub salt: Amount,
	pub reduce_only: bool,
}

/// Off-chain signed order accepted by the OrderBook contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOrder {
	pub expire_at: u64,
	pub market: Market,
	pub trader: Address,
	#[serde(with = "serde_amount")]
	pub base_asset_quantity: Amount,
	#[serde(with = "serde_amount")]
	pub price: Amount,
	#[serde(with = "serde_amount")]
	pub salt: Amount,
	pub reduce_only: bool,
	pub post_only: bool,
}

/// Raw order payload as placed on-chain
///
/// A closed set of order kinds sharing one capability set: encoding,
/// decoding, post-only and expiry queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawOrder {
	Limit(LimitOrder),
	Ioc(IocOrder),
	Signed(SignedOrder),
}

impl RawOrder {
	pub fn kind(&self) -> OrderKind {
		match self {
			RawOrder::Limit(_) => OrderKind::Limit,
			RawOrder::Ioc(_) => OrderKind::Ioc,
			RawOrder::Signed(_) => OrderKind::Signed,
		}
	}

	pub fn market(&self) -> Market {
		match self {
			RawOrder::Limit(o) => o.market,
			RawOrder::Ioc(o) => o.market,
			RawOrder::Signed(o) => o.market,
		}
	}

	pub fn trader(&self) -> Address {
		match self {
			RawOrder::Limit(o) => o.trader,
			RawOrder::Ioc(o) => o.trader,
			RawOrder::Signed(o) => o.trader,
		}
	}

	pub fn base_asset_quantity(&self) -> Amount {
		match self {
			RawOrder::Limit(o) => o.base_asset_quantity,
			RawOrder::Ioc(o) => o.base_asset_quantity,
			RawOrder::Signed(o) => o.base_asset_quantity,
		}
	}

	pub fn price(&self) -> Amount {
		match self {
			RawOrder::Limit(o) => o.price,
			RawOrder::Ioc(o) => o.price,
			RawOrder::Signed(o) => o.price,
		}
	}

	pub fn salt(&self) -> Amount {
		match self {
			RawOrder::Limit(o) => o.salt,
			RawOrder::Ioc(o) => o.salt,
			RawOrder::Signed(o) => o.salt,
		}
	}

	pub fn reduce_only(&self) -> bool {
		match self {
			RawOrder::Limit(o) => o.reduce_only,
			RawOrder::Ioc(o) => o.reduce_only,
			RawOrder::Signed(o) => o.reduce_only,
		}
	}

	/// Post-only orders may only add liquidity
	pub fn is_post_only(&self) -> bool {
		match self {
			RawOrder::Limit(o) => o.post_only,
			RawOrder::Ioc(_) => false,
			RawOrder::Signed(o) => o.post_only,
		}
	}

	/// Expiry timestamp in seconds; limit orders never expire
	pub fn expire_at(&self) -> Option<u64> {
		match self {
			RawOrder::Limit(_) => None,
			RawOrder::Ioc(o) => Some(o.expire_at),
			RawOrder::Signed(o) => Some(o.expire_at),
		}
	}

	pub fn encode(&self) -> Vec<u8> {
		// Plain structs of integers, bools and hex strings always serialize.
		serde_json::to_vec(self).unwrap_or_default()
	}

	pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
		serde_json::from_slice(data).map_err(|e| DecodeError::Payload(e.to_string()))
	}

	/// Content hash identifying the order for its whole life
	///
	/// Covers the kind tag, trader, salt and every economic field, so two
	/// orders differing in any of them never collide.
	pub fn hash(&self) -> OrderHash {
		let mut hasher = Sha256::new();
		hasher.update([self.kind().tag()]);
		hasher.update(self.trader().as_bytes());
		hasher.update(self.salt().to_be_bytes());
		hasher.update(self.market().to_be_bytes());
		hasher.update(self.base_asset_quantity().to_be_bytes());
		hasher.update(self.price().to_be_bytes());
		hasher.update([self.reduce_only() as u8, self.is_post_only() as u8]);
		if let Some(expire_at) = self.expire_at() {
			hasher.update(expire_at.to_be_bytes());
		}
		OrderHash::from_slice(&hasher.finalize())
	}
}

impl From<LimitOrder> for RawOrder {
	fn from(order: LimitOrder) -> Self {
		RawOrder::Limit(order)
	}
}

impl From<IocOrder> for RawOrder {
	fn from(order: IocOrder) -> Self {
		RawOrder::Ioc(order)
	}
}

impl From<SignedOrder> for RawOrder {
	fn from(order: SignedOrder) -> Self {
		RawOrder::Signed(order)
	}
}
