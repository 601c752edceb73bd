use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::config::SEMAPHORE_LIMIT;

struct SemaphoreState {
	/// Resource available count
	count: usize,
}

/// A counting, blocking semaphore.
///
/// Each acquisition blocks the calling thread until the counter is positive
/// or the timeout elapses; each release increments the counter and wakes one
/// waiter. The counter saturates at [`SEMAPHORE_LIMIT`], so a burst of
/// signals never grows the backlog beyond what a worker can coalesce.
pub struct Semaphore {
	state: Mutex<SemaphoreState>,
	waiters: Condvar,
}

impl Semaphore {
	pub const fn new(count: usize) -> Self {
		Self {
			state: Mutex::new(SemaphoreState { count }),
			waiters: Condvar::new(),
		}
	}

	/// Acquires one resource, giving up after `timeout`. Returns whether a
	/// resource was acquired.
	pub fn acquire_timeout(&self, timeout: Duration) -> bool {
		let state = self.state.lock().unwrap();
		let (mut state, _) = self
			.waiters
			.wait_timeout_while(state, timeout, |state| state.count == 0)
			.unwrap();
		if state.count > 0 {
			state.count -= 1;
			true
		} else {
			false
		}
	}

	pub fn try_acquire(&self) -> bool {
		let mut state = self.state.lock().unwrap();
		if state.count > 0 {
			state.count -= 1;
			true
		} else {
			false
		}
	}

	/// Releases one resource and wakes a waiter if any.
	pub fn release(&self) {
		{
			let mut state = self.state.lock().unwrap();
			state.count = (state.count + 1).min(SEMAPHORE_LIMIT);
		}
		self.waiters.notify_one();
	}
}
