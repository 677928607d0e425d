//! Single-assignment completion cells driven by the connection's pump loop.
//!
//! Nothing here parks a thread. A caller that needs a value runs
//! [`run_until`], which keeps dispatching inbound messages until the waitable
//! reports done. Deadlines are therefore checked once per pump iteration.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connection::ConnectionLike;
use crate::error::{Error, Result};
use crate::handlers::HandlerId;
use crate::listeners::ListenerCollection;

/// A value that becomes available while the pump loop runs.
pub trait Waitable<T>: Send {
	/// Whether [`get`](Self::get) would return without further pumping.
	fn is_done(&self) -> bool;

	/// Takes the outcome. Only the first call after completion yields it.
	fn get(&self) -> Result<T>;

	/// Detaches the waitable from whatever feeds it.
	fn dispose(&self);
}

impl<T, W: Waitable<T> + ?Sized> Waitable<T> for Box<W> {
	fn is_done(&self) -> bool {
		(**self).is_done()
	}

	fn get(&self) -> Result<T> {
		(**self).get()
	}

	fn dispose(&self) {
		(**self).dispose()
	}
}

enum Slot<T> {
	Pending,
	Ready(Result<T>),
	Consumed,
}

/// Completion cell shared between a producer and the waiting caller.
///
/// The first completion wins; later ones are ignored.
pub struct WaitableResult<T> {
	slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for WaitableResult<T> {
	fn clone(&self) -> Self {
		Self {
			slot: Arc::clone(&self.slot),
		}
	}
}

impl<T> Default for WaitableResult<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> WaitableResult<T> {
	pub fn new() -> Self {
		Self {
			slot: Arc::new(Mutex::new(Slot::Pending)),
		}
	}

	/// Completes with a value. Returns `false` if already completed.
	pub fn complete(&self, value: T) -> bool {
		self.complete_with(Ok(value))
	}

	/// Completes with an error. Returns `false` if already completed.
	pub fn complete_with_error(&self, error: Error) -> bool {
		self.complete_with(Err(error))
	}

	pub fn complete_with(&self, outcome: Result<T>) -> bool {
		let mut slot = self.slot.lock();
		if !matches!(*slot, Slot::Pending) {
			return false;
		}
		*slot = Slot::Ready(outcome);
		true
	}
}

impl<T: Send> Waitable<T> for WaitableResult<T> {
	fn is_done(&self) -> bool {
		!matches!(*self.slot.lock(), Slot::Pending)
	}

	fn get(&self) -> Result<T> {
		let mut slot = self.slot.lock();
		match std::mem::replace(&mut *slot, Slot::Consumed) {
			Slot::Ready(outcome) => outcome,
			Slot::Pending => {
				*slot = Slot::Pending;
				Err(Error::InvalidState("Result is not available yet".to_string()))
			}
			Slot::Consumed => Err(Error::InvalidState("Result was already taken".to_string())),
		}
	}

	fn dispose(&self) {}
}

/// Waitable that never completes on its own, used for "no timeout".
pub struct WaitableNever<T> {
	_marker: PhantomData<fn() -> T>,
}

impl<T> Default for WaitableNever<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> WaitableNever<T> {
	pub fn new() -> Self {
		Self { _marker: PhantomData }
	}
}

impl<T> Waitable<T> for WaitableNever<T> {
	fn is_done(&self) -> bool {
		false
	}

	fn get(&self) -> Result<T> {
		Err(Error::InvalidState("Waitable never completes".to_string()))
	}

	fn dispose(&self) {}
}

/// Fails with [`Error::Timeout`] once the wall-clock deadline has passed.
pub struct WaitableTimeout<T> {
	deadline: Instant,
	timeout_ms: f64,
	_marker: PhantomData<fn() -> T>,
}

impl<T> WaitableTimeout<T> {
	/// Starts a deadline `timeout_ms` milliseconds from now.
	pub fn new(timeout_ms: f64) -> Self {
		let millis = if timeout_ms.is_finite() && timeout_ms > 0.0 { timeout_ms } else { 0.0 };
		Self {
			deadline: Instant::now() + Duration::from_secs_f64(millis / 1000.0),
			timeout_ms,
			_marker: PhantomData,
		}
	}
}

impl<T> Waitable<T> for WaitableTimeout<T> {
	fn is_done(&self) -> bool {
		Instant::now() >= self.deadline
	}

	fn get(&self) -> Result<T> {
		Err(Error::Timeout(format!("Timeout {}ms exceeded.", self.timeout_ms)))
	}

	fn dispose(&self) {}
}

/// Captures the first payload notified for `key` that passes the predicate.
pub struct WaitableEvent<K, P> {
	listeners: Arc<ListenerCollection<K, P>>,
	key: K,
	handler_id: HandlerId,
	slot: Arc<Mutex<Option<P>>>,
}

impl<K, P> WaitableEvent<K, P>
where
	K: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static,
	P: Clone + Send + 'static,
{
	/// Registers a listener for `key`; every payload is accepted.
	pub fn new(listeners: &Arc<ListenerCollection<K, P>>, key: K) -> Self {
		Self::with_predicate(listeners, key, |_| true)
	}

	/// Registers a listener for `key` that only accepts matching payloads.
	pub fn with_predicate<F>(listeners: &Arc<ListenerCollection<K, P>>, key: K, predicate: F) -> Self
	where
		F: Fn(&P) -> bool + Send + Sync + 'static,
	{
		let slot: Arc<Mutex<Option<P>>> = Arc::new(Mutex::new(None));
		let capture = Arc::clone(&slot);
		let handler_id = listeners.add(key.clone(), move |payload: &P| {
			let mut slot = capture.lock();
			if slot.is_none() && predicate(payload) {
				*slot = Some(payload.clone());
			}
		});
		Self {
			listeners: Arc::clone(listeners),
			key,
			handler_id,
			slot,
		}
	}
}

impl<K, P> Waitable<P> for WaitableEvent<K, P>
where
	K: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static,
	P: Send + 'static,
{
	fn is_done(&self) -> bool {
		self.slot.lock().is_some()
	}

	fn get(&self) -> Result<P> {
		self.slot
			.lock()
			.take()
			.ok_or_else(|| Error::InvalidState(format!("Event {:?} has not been received", self.key)))
	}

	fn dispose(&self) {
		self.listeners.remove(&self.key, self.handler_id);
	}
}

/// Completes with whichever member finishes first.
pub struct WaitableRace<T> {
	waitables: Vec<Box<dyn Waitable<T>>>,
}

impl<T> WaitableRace<T> {
	pub fn new(waitables: Vec<Box<dyn Waitable<T>>>) -> Self {
		Self { waitables }
	}
}

impl<T> Waitable<T> for WaitableRace<T> {
	fn is_done(&self) -> bool {
		self.waitables.iter().any(|w| w.is_done())
	}

	fn get(&self) -> Result<T> {
		match self.waitables.iter().find(|w| w.is_done()) {
			Some(winner) => winner.get(),
			None => Err(Error::InvalidState("No waitable in the race has completed".to_string())),
		}
	}

	fn dispose(&self) {
		for waitable in &self.waitables {
			waitable.dispose();
		}
	}
}

/// Runs `code`, pumps `connection` until `waitable` is done and returns its
/// outcome. The waitable is disposed on every path.
pub fn run_until<T, W, F>(connection: &dyn ConnectionLike, code: F, waitable: &W) -> Result<T>
where
	W: Waitable<T> + ?Sized,
	F: FnOnce() -> Result<()>,
{
	let outcome = code().and_then(|()| {
		while !waitable.is_done() {
			connection.process_one_message()?;
		}
		waitable.get()
	});
	waitable.dispose();
	outcome
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn result_first_writer_wins() {
		let result = WaitableResult::new();
		assert!(!result.is_done());

		assert!(result.complete(1));
		assert!(!result.complete(2));
		assert!(!result.complete_with_error(Error::Timeout("late".into())));

		assert!(result.is_done());
		assert_eq!(result.get().unwrap(), 1);
		assert!(matches!(result.get(), Err(Error::InvalidState(_))));
	}

	#[test]
	fn result_clones_share_the_slot() {
		let producer = WaitableResult::<u32>::new();
		let consumer = producer.clone();

		producer.complete_with_error(Error::TargetClosed("page closed".into()));

		assert!(consumer.is_done());
		assert!(consumer.get().unwrap_err().is_target_closed());
	}

	#[test]
	fn never_is_never_done() {
		let never = WaitableNever::<()>::new();
		assert!(!never.is_done());
		assert!(never.get().is_err());
	}

	#[test]
	fn timeout_elapses() {
		let timeout = WaitableTimeout::<()>::new(1.0);
		std::thread::sleep(Duration::from_millis(5));
		assert!(timeout.is_done());
		assert!(timeout.get().unwrap_err().is_timeout());

		let pending = WaitableTimeout::<()>::new(60_000.0);
		assert!(!pending.is_done());
	}

	#[test]
	fn event_keeps_first_matching_payload() {
		let listeners = Arc::new(ListenerCollection::<&'static str, u32>::new());
		let waitable = WaitableEvent::with_predicate(&listeners, "console", |n: &u32| *n > 1);

		listeners.notify(&"console", &1);
		assert!(!waitable.is_done());
		listeners.notify(&"console", &2);
		listeners.notify(&"console", &3);

		assert!(waitable.is_done());
		assert_eq!(waitable.get().unwrap(), 2);

		waitable.dispose();
		assert!(!listeners.has_listeners(&"console"));
	}

	#[test]
	fn race_reports_first_done() {
		let slow = WaitableResult::<u32>::new();
		let fast = WaitableResult::<u32>::new();
		fast.complete(9);
		let members: Vec<Box<dyn Waitable<u32>>> = vec![Box::new(slow), Box::new(fast)];
		let race = WaitableRace::new(members);

		assert!(race.is_done());
		assert_eq!(race.get().unwrap(), 9);
	}
}
