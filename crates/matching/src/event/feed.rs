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

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::metrics::{self, Metrics};

/// Fan-out broadcaster with one bounded channel per subscriber
///
/// Publishing never blocks: when a subscriber's channel is full the new
/// event is dropped for that subscriber only and counted. Subscribers whose
/// receiving end is gone are pruned on the next publish.
pub struct Feed<T> {
	name: &'static str,
	capacity: usize,
	subscribers: DashMap<u64, Sender<T>>,
	next_id: AtomicU64,
	metrics: Arc<Metrics>,
}

impl<T: Clone + Send> Feed<T> {
	pub fn new(name: &'static str, capacity: usize, metrics: Arc<Metrics>) -> Self {
		Self {
			name,
			capacity: capacity.max(1),
			subscribers: DashMap::new(),
			next_id: AtomicU64::new(1),
			metrics,
		}
	}

	pub fn subscribe(&self) -> Subscription<T> {
		let (sender, receiver) = bounded(self.capacity);
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		self.subscribers.insert(id, sender);
		debug!(feed = self.name, subscriber = id, "Subscribed");
		Subscription { id, receiver }
	}

	/// Returns false when `id` was not subscribed
	pub fn unsubscribe(&self, id: u64) -> bool {
		self.subscribers.remove(&id).is_some()
	}

	/// Deliver `event` to every subscriber with room, returns how many got it
	pub fn publish(&self, event: T) -> usize {
		let mut delivered = 0;
		let mut disconnected = Vec::new();

		for entry in self.subscribers.iter() {
			match entry.value().try_send(event.clone()) {
				Ok(()) => delivered += 1,
				Err(TrySendError::Full(_)) => {
					trace!(feed = self.name, subscriber = *entry.key(), "Subscriber full, event dropped");
					self.metrics.increment(metrics::FEED_EVENTS_DROPPED);
				}
				Err(TrySendError::Disconnected(_)) => disconnected.push(*entry.key()),
			}
		}

		for id in disconnected {
			self.subscribers.remove(&id);
			debug!(feed = self.name, subscriber = id, "Subscriber gone, removed");
		}
		delivered
	}

	pub fn subscriber_count(&self) -> usize {
		self.subscribers.len()
	}
}

/// Receiving end of a feed subscription
pub struct Subscription<T> {
	id: u64,
	receiver: Receiver<T>,
}

impl<T> Subscription<T> {
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Next event if one is buffered
	pub fn try_recv(&self) -> Option<T> {
		match self.receiver.try_recv() {
			Ok(event) => Some(event),
			Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
		}
	}

	/// Wait up to `timeout` for the next event
	pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<T> {
		match self.receiver.recv_timeout(timeout) {
			Ok(event) => Some(event),
			Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
		}
	}

	/// Every buffered event, oldest first
	pub fn drain(&self) -> Vec<T> {
		self.receiver.try_iter().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fan_out() {
		let feed = Feed::new("test", 4, Arc::new(Metrics::new()));
		let a = feed.subscribe();
		let b = feed.subscribe();

		assert_eq!(feed.publish(1u32), 2);
		assert_eq!(a.try_recv(), Some(1));
		assert_eq!(b.try_recv(), Some(1));
		assert_eq!(a.try_recv(), None);
	}

	#[test]
	fn test_full_subscriber_drops_new_events() {
		let metrics = Arc::new(Metrics::new());
		let feed = Feed::new("test", 2, metrics.clone());
		let slow = feed.subscribe();
		let fast = feed.subscribe();

		for i in 0..3u32 {
			feed.publish(i);
			if i < 2 {
				fast.drain();
			}
		}

		assert_eq!(slow.drain(), vec![0, 1]);
		assert_eq!(fast.drain(), vec![2]);
		assert_eq!(metrics.get(metrics::FEED_EVENTS_DROPPED), 1);
	}

	#[test]
	fn test_dropped_subscription_is_pruned() {
		let feed = Feed::new("test", 2, Arc::new(Metrics::new()));
		let kept = feed.subscribe();
		drop(feed.subscribe());

		assert_eq!(feed.publish(7u8), 1);
		assert_eq!(feed.subscriber_count(), 1);
		assert!(feed.unsubscribe(kept.id()));
		assert!(!feed.unsubscribe(kept.id()));
	}
}
