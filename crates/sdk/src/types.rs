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

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Signed fixed-point amount.
///
/// Prices and margins carry 6 decimals, base asset sizes carry 18.
pub type Amount = i128;

/// Market index as assigned by the clearing house
pub type Market = u32;

/// Scale of prices, margins and ratios (6 decimals)
pub const PRICE_PRECISION: Amount = 1_000_000;

/// Scale of base asset quantities (18 decimals)
pub const BASE_PRECISION: Amount = 1_000_000_000_000_000_000;

/// Order side, derived from the sign of the base asset quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
	Long,
	Short,
}

impl Side {
	pub fn of(quantity: Amount) -> Self {
		if quantity < 0 { Side::Short } else { Side::Long }
	}

	/// Sign applied to a positive fill amount for this side
	pub fn sign(self) -> Amount {
		match self {
			Side::Long => 1,
			Side::Short => -1,
		}
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseBytesError {
	#[error("Invalid hex: {0}")]
	InvalidHex(String),
	#[error("Expected {expected} bytes, got {actual}")]
	InvalidLength { expected: usize, actual: usize },
}

macro_rules! fixed_bytes {
	($(#[$meta:meta])* $name:ident, $len:expr) => {
		$(#[$meta])*
		#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
		pub struct $name(pub [u8; $len]);

		impl $name {
			pub const LEN: usize = $len;

			pub fn zero() -> Self {
				Self([0u8; $len])
			}

			pub fn as_bytes(&self) -> &[u8] {
				&self.0
			}

			/// Copy up to `LEN` leading bytes of `raw`, zero-padding the rest
			pub fn from_slice(raw: &[u8]) -> Self {
				let mut bytes = [0u8; $len];
				let len = raw.len().min($len);
				bytes[..len].copy_from_slice(&raw[..len]);
				Self(bytes)
			}

			/// Build a value whose trailing bytes hold `n` (test and fixture helper)
			pub fn from_low_u64(n: u64) -> Self {
				let mut bytes = [0u8; $len];
				bytes[$len - 8..].copy_from_slice(&n.to_be_bytes());
				Self(bytes)
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "0x{}", hex::encode(self.0))
			}
		}

		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Display::fmt(self, f)
			}
		}

		impl FromStr for $name {
			type Err = ParseBytesError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				let raw = s.strip_prefix("0x").unwrap_or(s);
				let decoded =
					hex::decode(raw).map_err(|e| ParseBytesError::InvalidHex(e.to_string()))?;
				let bytes: [u8; $len] =
					decoded
						.as_slice()
						.try_into()
						.map_err(|_| ParseBytesError::InvalidLength {
							expected: $len,
							actual: decoded.len(),
						})?;
				Ok(Self(bytes))
			}
		}

		impl Serialize for $name {
			fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
				serializer.serialize_str(&self.to_string())
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
				let s = String::deserialize(deserializer)?;
				s.parse().map_err(serde::de::Error::custom)
			}
		}
	};
}

fixed_bytes!(
	/// 20-byte account address
	Address,
	20
);

fixed_bytes!(
	/// 32-byte hash, used for order ids, topics and transaction hashes
	H256,
	32
);

/// Order id: content hash of the raw order
pub type OrderHash = H256;

/// Serde adapter encoding [`Amount`] as a decimal string
///
/// 18-decimal quantities overflow the integer range most JSON consumers
/// handle, so amounts always travel as strings.
pub mod serde_amount {
	use serde::{Deserialize, Deserializer, Serializer};

	use super::Amount;

	pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Serde adapter for maps whose values are [`Amount`]s, encoded as strings
pub mod serde_amount_map {
	use std::collections::BTreeMap;

	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	use super::Amount;

	pub fn serialize<K, S>(map: &BTreeMap<K, Amount>, serializer: S) -> Result<S::Ok, S::Error>
	where
		K: Serialize + Ord,
		S: Serializer,
	{
		serializer.collect_map(map.iter().map(|(k, v)| (k, v.to_string())))
	}

	pub fn deserialize<'de, K, D>(deserializer: D) -> Result<BTreeMap<K, Amount>, D::Error>
	where
		K: Deserialize<'de> + Ord,
		D: Deserializer<'de>,
	{
		BTreeMap::<K, String>::deserialize(deserializer)?
			.into_iter()
			.map(|(k, v)| v.parse().map(|v| (k, v)).map_err(serde::de::Error::custom))
			.collect()
	}
}

/// Multiply by 1e6
pub fn mul1e6(a: Amount) -> Amount {
	a * PRICE_PRECISION
}

/// Divide by 1e6, truncating toward zero
pub fn div1e6(a: Amount) -> Amount {
	a / PRICE_PRECISION
}

/// Divide by 1e18, truncating toward zero
pub fn div1e18(a: Amount) -> Amount {
	a / BASE_PRECISION
}

/// Returns whichever of `a`, `b` has the smaller magnitude, as a magnitude
pub fn min_abs(a: Amount, b: Amount) -> Amount {
	a.abs().min(b.abs())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_round_trip() {
		let addr = Address::from_low_u64(0xabcdef);
		let parsed: Address = addr.to_string().parse().unwrap();
		assert_eq!(parsed, addr);
		assert!(addr.to_string().starts_with("0x"));
	}

	#[test]
	fn test_address_rejects_wrong_length() {
		let result = "0x1234".parse::<Address>();
		assert_eq!(
			result,
			Err(ParseBytesError::InvalidLength {
				expected: 20,
				actual: 2
			})
		);
	}

	#[test]
	fn test_truncating_division() {
		assert_eq!(div1e6(-1_500_000), -1);
		assert_eq!(div1e6(1_500_000), 1);
		assert_eq!(div1e18(-BASE_PRECISION + 1), 0);
	}

	#[test]
	fn test_side_of_quantity() {
		assert_eq!(Side::of(5), Side::Long);
		assert_eq!(Side::of(-5), Side::Short);
		assert_eq!(Side::Short.sign(), -1);
	}
}
