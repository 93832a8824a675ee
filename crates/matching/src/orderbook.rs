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

use std::cmp::Ordering;

use strata_sdk::{Amount, Market, OrderHash, Side};

use crate::types::Order;

/// Sort key of an order resting on one side of a market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookEntry {
	pub id: OrderHash,
	pub price: Amount,
	pub block_number: u64,
	pub is_ioc: bool,
}

impl BookEntry {
	pub fn of(order: &Order) -> Self {
		Self {
			id: order.id,
			price: order.price,
			block_number: order.block_number,
			is_ioc: order.is_ioc(),
		}
	}

	/// Priority order within one side
	///
	/// Best price first (highest for longs, lowest for shorts), then earlier
	/// block, then IOC before resting orders of the same block, then order id.
	pub fn priority(side: Side, a: &Self, b: &Self) -> Ordering {
		let by_price = match side {
			Side::Long => b.price.cmp(&a.price),
			Side::Short => a.price.cmp(&b.price),
		};
		by_price
			.then(a.block_number.cmp(&b.block_number))
			.then(b.is_ioc.cmp(&a.is_ioc))
			.then(a.id.cmp(&b.id))
	}
}

/// Both sorted sides of one market
///
/// Entries only carry the sort key; the orders themselves live in the
/// store's order map. Inserts and removals keep each side sorted by
/// binary search so reads never re-sort.
#[derive(Debug, Clone, Default)]
pub struct MarketBook {
	market: Market,
	longs: Vec<BookEntry>,
	shorts: Vec<BookEntry>,
}

impl MarketBook {
	pub fn new(market: Market) -> Self {
		Self {
			market,
			longs: Vec::new(),
			shorts: Vec::new(),
		}
	}

	pub fn market(&self) -> Market {
		self.market
	}

	/// Insert an order at its priority position
	pub fn insert(&mut self, order: &Order) {
		let entry = BookEntry::of(order);
		let side = order.side;
		let list = self.side_mut(side);
		let pos = list.partition_point(|e| BookEntry::priority(side, e, &entry) != Ordering::Greater);
		list.insert(pos, entry);
	}

	/// Remove an order, returns false when it was not on the book
	pub fn remove(&mut self, order: &Order) -> bool {
		let entry = BookEntry::of(order);
		let side = order.side;
		let list = self.side_mut(side);
		match list.binary_search_by(|e| BookEntry::priority(side, e, &entry)) {
			Ok(pos) => {
				list.remove(pos);
				true
			}
			// Fall back to a scan in case the key drifted from the stored entry
			Err(_) => match list.iter().position(|e| e.id == entry.id) {
				Some(pos) => {
					list.remove(pos);
					true
				}
				None => false,
			},
		}
	}

	/// Longs, best (highest) price first
	pub fn longs(&self) -> &[BookEntry] {
		&self.longs
	}

	/// Shorts, best (lowest) price first
	pub fn shorts(&self) -> &[BookEntry] {
		&self.shorts
	}

	pub fn side(&self, side: Side) -> &[BookEntry] {
		match side {
			Side::Long => &self.longs,
			Side::Short => &self.shorts,
		}
	}

	fn side_mut(&mut self, side: Side) -> &mut Vec<BookEntry> {
		match side {
			Side::Long => &mut self.longs,
			Side::Short => &mut self.shorts,
		}
	}

	pub fn best_long(&self) -> Option<Amount> {
		self.longs.first().map(|e| e.price)
	}

	pub fn best_short(&self) -> Option<Amount> {
		self.shorts.first().map(|e| e.price)
	}

	/// Total number of orders in the book
	pub fn order_count(&self) -> usize {
		self.longs.len() + self.shorts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order_count() == 0
	}

	pub fn clear(&mut self) {
		self.longs.clear();
		self.shorts.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use strata_sdk::{Address, IocOrder, LimitOrder, RawOrder};

	fn create_test_order(salt: Amount, quantity: Amount, price: Amount, block: u64) -> Order {
		let raw = RawOrder::Limit(LimitOrder {
			market: 0,
			trader: Address::from_low_u64(1),
			base_asset_quantity: quantity,
			price,
			salt,
			reduce_only: false,
			post_only: false,
		});
		Order::new(raw.hash(), raw, block)
	}

	fn create_ioc_order(salt: Amount, quantity: Amount, price: Amount, block: u64) -> Order {
		let raw = RawOrder::Ioc(IocOrder {
			expire_at: 1_000,
			market: 0,
			trader: Address::from_low_u64(2),
			base_asset_quantity: quantity,
			price,
			salt,
			reduce_only: false,
		});
		Order::new(raw.hash(), raw, block)
	}

	fn ids(entries: &[BookEntry]) -> Vec<OrderHash> {
		entries.iter().map(|e| e.id).collect()
	}

	#[test]
	fn test_add_and_remove_order() {
		let mut book = MarketBook::new(0);

		let order = create_test_order(1, 10, 50, 1);
		book.insert(&order);

		assert_eq!(book.best_long(), Some(50));
		assert_eq!(book.order_count(), 1);

		assert!(book.remove(&order));
		assert!(!book.remove(&order));
		assert!(book.is_empty());
		assert_eq!(book.best_long(), None);
	}

	#[test]
	fn test_price_priority() {
		let mut book = MarketBook::new(0);

		let a = create_test_order(1, 10, 50, 1);
		let b = create_test_order(2, 10, 51, 1);
		let c = create_test_order(3, 10, 49, 1);
		let d = create_test_order(4, -10, 53, 1);
		let e = create_test_order(5, -10, 52, 1);
		for order in [&a, &b, &c, &d, &e] {
			book.insert(order);
		}

		assert_eq!(ids(book.longs()), vec![b.id, a.id, c.id]);
		assert_eq!(ids(book.shorts()), vec![e.id, d.id]);

		book.remove(&b);
		assert_eq!(book.best_long(), Some(50));
	}

	#[test]
	fn test_block_priority_at_same_price() {
		let mut book = MarketBook::new(0);

		let late = create_test_order(1, -10, 50, 9);
		let early = create_test_order(2, -10, 50, 3);
		book.insert(&late);
		book.insert(&early);

		assert_eq!(ids(book.shorts()), vec![early.id, late.id]);
	}

	#[test]
	fn test_ioc_before_limit_in_same_block() {
		let mut book = MarketBook::new(0);

		let limit = create_test_order(1, 10, 50, 5);
		let ioc = create_ioc_order(2, 10, 50, 5);
		let earlier_limit = create_test_order(3, 10, 50, 4);
		book.insert(&limit);
		book.insert(&ioc);
		book.insert(&earlier_limit);

		assert_eq!(ids(book.longs()), vec![earlier_limit.id, ioc.id, limit.id]);
	}
}
