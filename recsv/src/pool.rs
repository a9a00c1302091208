// SPDX-License-Identifier: Apache-2.0

use std::cell::RefCell;
use std::rc::Rc;

/// A free-list of reusable, reference-counted instances of `T`.
///
/// `claim` hands out uniquely-owned instances, recycled or built by the
/// factory; `collect` takes an instance back once it has no other handles.
/// Shared instances passed to `collect` are discarded, so whichever owner
/// releases last is the one that recycles; the reference count is the
/// retain/release protocol.
///
/// Resetting an instance's logical content is the owner's contract, not the
/// pool's: chunks are cleared when (re)initialized, rows are cleared on
/// release.
///
/// Pools are single-threaded. The reader pipeline drives each pool from one
/// logical stream of control at a time.
pub(crate) struct Pool<T> {
	inner: Rc<Inner<T>>,
}

struct Inner<T> {
	free: RefCell<Vec<Rc<T>>>,
	make: Box<dyn Fn() -> T>,
}

impl<T> Pool<T> {
	/// Creates an empty pool over a factory. Instances are constructed
	/// lazily, by claims that find the free list empty.
	pub fn new(make: impl Fn() -> T + 'static) -> Self {
		Self {
			inner: Rc::new(Inner {
				free: RefCell::new(Vec::new()),
				make: Box::new(make),
			}),
		}
	}

	/// Claims an instance. The returned handle is the sole owner, so the
	/// instance may be mutated through [`Rc::get_mut`].
	pub fn claim(&self) -> Rc<T> {
		self.inner
			.free
			.borrow_mut()
			.pop()
			.unwrap_or_else(|| Rc::new((self.inner.make)()))
	}

	/// Collects an instance back into the free list, if this was its last
	/// handle. Shared instances are discarded; a remaining owner collects
	/// later.
	pub fn collect(&self, instance: Rc<T>) {
		if Rc::strong_count(&instance) > 1 {
			return;
		}
		// Collection runs from Drop impls, which must not panic.
		if let Ok(mut free) = self.inner.free.try_borrow_mut() {
			free.push(instance);
		}
	}
}

impl<T> Clone for Pool<T> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
