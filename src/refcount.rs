use std::sync::atomic::{AtomicI32, Ordering};

/// Counts the worker threads, in-flight dispatches and API calls that need the session to stay
/// alive.
///
/// Every transition is a single atomic read-modify-write; no lock is ever taken.
#[derive(Debug, Default)]
pub(crate) struct RefCount(AtomicI32);

impl RefCount {
    pub(crate) fn new() -> Self {
        RefCount(AtomicI32::new(0))
    }

    /// Returns the count after incrementing it.
    pub(crate) fn acquire(&self) -> i32 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after decrementing it.
    pub(crate) fn release(&self) -> i32 {
        let v = self.0.fetch_sub(1, Ordering::AcqRel) - 1;
        debug_assert!(v >= 0, "reference count went negative");
        v
    }

    pub(crate) fn count(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// Holds a reference until the returned guard goes out of scope.
    pub(crate) fn guard(&self) -> RefGuard<'_> {
        self.acquire();
        RefGuard(self)
    }
}

/// A reference taken with [`RefCount::guard`], released on drop.
#[must_use]
pub(crate) struct RefGuard<'a>(&'a RefCount);

impl Drop for RefGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Process-wide request ids.
///
/// The counter is seeded once, on first use, from the wall clock so that ids from consecutive
/// processes are unlikely to collide on the server. Afterwards every call hands out the next value.
pub mod xid {
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT: Lazy<AtomicI32> = Lazy::new(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // xids must stay positive; negative values are reserved for pings and notifications
        AtomicI32::new((seed & 0x3fff_ffff) as i32 + 1)
    });

    /// Returns a fresh request id.
    pub fn next() -> i32 {
        NEXT.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
            Some(successor(x))
        })
        .unwrap_or_else(|x| x)
    }

    /// Wraps back to 1 instead of overflowing into the negative range.
    pub(super) fn successor(xid: i32) -> i32 {
        if xid == i32::MAX {
            1
        } else {
            xid + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_release() {
        let rc = RefCount::new();
        assert_eq!(rc.acquire(), 1);
        assert_eq!(rc.acquire(), 2);
        assert_eq!(rc.release(), 1);
        assert_eq!(rc.count(), 1);
        assert_eq!(rc.release(), 0);
    }

    #[test]
    fn guard_releases_on_every_exit_path() {
        let rc = RefCount::new();
        {
            let _g = rc.guard();
            assert_eq!(rc.count(), 1);
        }
        assert_eq!(rc.count(), 0);

        let r = (|| -> Result<(), ()> {
            let _g = rc.guard();
            Err::<(), ()>(())?;
            Ok(())
        })();
        assert!(r.is_err());
        assert_eq!(rc.count(), 0);
    }

    #[test]
    fn concurrent_updates_balance() {
        let rc = Arc::new(RefCount::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let rc = rc.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        rc.acquire();
                        rc.release();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(rc.count(), 0);
    }

    #[test]
    fn xids_are_unique_and_increasing() {
        let a = xid::next();
        let b = xid::next();
        assert!(a > 0);
        assert!(b > a);
    }

    #[test]
    fn xids_wrap_to_one() {
        assert_eq!(xid::successor(1), 2);
        assert_eq!(xid::successor(i32::MAX - 1), i32::MAX);
        assert_eq!(xid::successor(i32::MAX), 1);
    }
}
