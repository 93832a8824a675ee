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

//! Protocol parameters read by the store, the risk engine and the pipeline

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strata_sdk::{Amount, Market, serde_amount};

/// Collateral accepted by the margin account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collateral {
	/// Oracle price, 6 decimals
	#[serde(with = "serde_amount")]
	pub price: Amount,
	/// Haircut weight, 6 decimals (1_000_000 counts the collateral in full)
	#[serde(with = "serde_amount")]
	pub weight: Amount,
	/// Token decimals of the deposited amounts
	pub decimals: u32,
}

/// Inclusive price band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
	#[serde(with = "serde_amount")]
	pub upper: Amount,
	#[serde(with = "serde_amount")]
	pub lower: Amount,
}

impl PriceBounds {
	pub fn unbounded() -> Self {
		Self {
			upper: Amount::MAX,
			lower: 0,
		}
	}

	/// Upper bound, `None` when unbounded
	pub fn upper_limit(&self) -> Option<Amount> {
		(self.upper != Amount::MAX).then_some(self.upper)
	}
}

/// Read-only view of the on-chain protocol configuration
pub trait ConfigService: Send + Sync {
	fn active_markets(&self) -> Vec<Market>;
	fn oracle_prices(&self) -> BTreeMap<Market, Amount>;
	fn mid_prices(&self) -> BTreeMap<Market, Amount>;
	fn collaterals(&self) -> Vec<Collateral>;
	fn maintenance_margin(&self) -> Amount;
	fn min_allowable_margin(&self) -> Amount;
	fn taker_fee(&self) -> Amount;
	/// Band within which orders may trade
	fn acceptable_bounds(&self, market: Market) -> PriceBounds;
	/// Band within which liquidations may trade
	fn liquidation_bounds(&self, market: Market) -> PriceBounds;
	/// Share of a position liquidatable at once, 6 decimals
	fn max_liquidation_ratio(&self, market: Market) -> Amount;
	fn min_size_requirement(&self, market: Market) -> Amount;
}

/// Parameters of one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
	#[serde(with = "serde_amount")]
	pub oracle_price: Amount,
	#[serde(with = "serde_amount")]
	pub mid_price: Amount,
	pub acceptable_bounds: PriceBounds,
	pub liquidation_bounds: PriceBounds,
	#[serde(with = "serde_amount")]
	pub max_liquidation_ratio: Amount,
	#[serde(with = "serde_amount")]
	pub min_size_requirement: Amount,
}

impl Default for MarketParams {
	fn default() -> Self {
		Self {
			oracle_price: 0,
			mid_price: 0,
			acceptable_bounds: PriceBounds::unbounded(),
			liquidation_bounds: PriceBounds::unbounded(),
			max_liquidation_ratio: 250_000,
			min_size_requirement: 0,
		}
	}
}

/// Full protocol parameter set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
	#[serde(default)]
	pub markets: BTreeMap<Market, MarketParams>,
	#[serde(default)]
	pub collaterals: Vec<Collateral>,
	#[serde(with = "serde_amount")]
	pub maintenance_margin: Amount,
	#[serde(with = "serde_amount")]
	pub min_allowable_margin: Amount,
	#[serde(with = "serde_amount")]
	pub taker_fee: Amount,
}

impl Default for ProtocolParams {
	fn default() -> Self {
		Self {
			markets: BTreeMap::new(),
			collaterals: vec![Collateral {
				price: 1_000_000,
				weight: 1_000_000,
				decimals: 6,
			}],
			maintenance_margin: 100_000,
			min_allowable_margin: 200_000,
			taker_fee: 500,
		}
	}
}

/// In-memory [`ConfigService`] fed by the host
///
/// Prices move every block, so the host pushes fresh oracle and mid
/// prices through the setters before triggering a pipeline run.
#[derive(Debug, Default)]
pub struct StaticConfigService {
	params: RwLock<ProtocolParams>,
}

impl StaticConfigService {
	pub fn new(params: ProtocolParams) -> Self {
		Self {
			params: RwLock::new(params),
		}
	}

	pub fn params(&self) -> ProtocolParams {
		self.params.read().clone()
	}

	pub fn set_market(&self, market: Market, params: MarketParams) {
		self.params.write().markets.insert(market, params);
	}

	pub fn set_oracle_price(&self, market: Market, price: Amount) {
		self.params.write().markets.entry(market).or_default().oracle_price = price;
	}

	pub fn set_mid_price(&self, market: Market, price: Amount) {
		self.params.write().markets.entry(market).or_default().mid_price = price;
	}

	pub fn set_collaterals(&self, collaterals: Vec<Collateral>) {
		self.params.write().collaterals = collaterals;
	}

	pub fn set_margin_requirements(&self, maintenance_margin: Amount, min_allowable_margin: Amount) {
		let mut params = self.params.write();
		params.maintenance_margin = maintenance_margin;
		params.min_allowable_margin = min_allowable_margin;
	}

	pub fn set_taker_fee(&self, taker_fee: Amount) {
		self.params.write().taker_fee = taker_fee;
	}

	fn market<T>(&self, market: Market, f: impl FnOnce(&MarketParams) -> T) -> Option<T> {
		self.params.read().markets.get(&market).map(f)
	}
}

impl ConfigService for StaticConfigService {
	fn active_markets(&self) -> Vec<Market> {
		self.params.read().markets.keys().copied().collect()
	}

	fn oracle_prices(&self) -> BTreeMap<Market, Amount> {
		self.params
			.read()
			.markets
			.iter()
			.map(|(m, p)| (*m, p.oracle_price))
			.collect()
	}

	fn mid_prices(&self) -> BTreeMap<Market, Amount> {
		self.params
			.read()
			.markets
			.iter()
			.map(|(m, p)| (*m, p.mid_price))
			.collect()
	}

	fn collaterals(&self) -> Vec<Collateral> {
		self.params.read().collaterals.clone()
	}

	fn maintenance_margin(&self) -> Amount {
		self.params.read().maintenance_margin
	}

	fn min_allowable_margin(&self) -> Amount {
		self.params.read().min_allowable_margin
	}

	fn taker_fee(&self) -> Amount {
		self.params.read().taker_fee
	}

	fn acceptable_bounds(&self, market: Market) -> PriceBounds {
		self.market(market, |p| p.acceptable_bounds)
			.unwrap_or_else(PriceBounds::unbounded)
	}

	fn liquidation_bounds(&self, market: Market) -> PriceBounds {
		self.market(market, |p| p.liquidation_bounds)
			.unwrap_or_else(PriceBounds::unbounded)
	}

	fn max_liquidation_ratio(&self, market: Market) -> Amount {
		self.market(market, |p| p.max_liquidation_ratio)
			.unwrap_or_else(|| MarketParams::default().max_liquidation_ratio)
	}

	fn min_size_requirement(&self, market: Market) -> Amount {
		self.market(market, |p| p.min_size_requirement).unwrap_or(0)
	}
}
