use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use parking_lot::RwLockWriteGuard;
use std::sync::Arc;

/// A convenience type alias for [Arc<RwLock<T>>].
///
/// Instructions, modules, and programs are all shared via this alias so that
/// a reference held by one part of the IR (say, an instruction input) stays
/// valid when another part rewrites the referenced node in place.
pub type Shared<T> = Arc<RwLock<T>>;

/// A convenience trait around [RwLock].
///
/// The optimization pipeline is single-threaded (one pass on one module at a
/// time), so a lock that cannot be taken immediately is a bug, not
/// contention. `rd`/`wr` therefore crash on a held lock instead of blocking.
///
/// # Example
///
/// ```
/// use grax::shared::Shared;
/// use grax::shared::SharedExt;
///
/// let lock = Shared::new(42.into());
/// assert_eq!(*lock.rd(), 42);
/// ```
pub trait SharedExt<T: ?Sized> {
    /// Convenience method for reading.
    fn rd(&self) -> RwLockReadGuard<T>;
    /// Convenience method for writing.
    fn wr(&self) -> RwLockWriteGuard<T>;
}

impl<T: ?Sized> SharedExt<T> for Shared<T> {
    fn rd(&self) -> RwLockReadGuard<T> {
        self.try_read().unwrap()
    }
    fn wr(&self) -> RwLockWriteGuard<T> {
        self.try_write().unwrap()
    }
}

#[test]
fn test_shared() {
    let lock = Shared::new(42.into());
    assert_eq!(*lock.rd(), 42);
}
