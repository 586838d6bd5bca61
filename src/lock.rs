use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
};

#[cfg(feature = "lock_tracking")]
mod tracking {
    use super::*;
    use std::{
        collections::VecDeque,
        time::{Duration, Instant},
    };
    use tracing::warn;

    #[derive(Debug)]
    struct Inner<T> {
        last_writer: VecDeque<(&'static str, Duration)>,
        value: T,
    }

    /// A reader/writer lock which optionally tracks how long write guards are
    /// held and warns in case of excessive hold times
    ///
    /// Read guards are pass-through; only writers are tracked, since only
    /// they can starve the readers the transport's query surface runs on.
    #[derive(Debug)]
    pub(crate) struct RwLock<T> {
        inner: std::sync::RwLock<Inner<T>>,
    }

    impl<T> RwLock<T> {
        pub(crate) fn new(value: T) -> Self {
            Self {
                inner: std::sync::RwLock::new(Inner {
                    last_writer: VecDeque::new(),
                    value,
                }),
            }
        }

        pub(crate) fn read(&self, _purpose: &'static str) -> ReadGuard<'_, T> {
            ReadGuard {
                guard: self.inner.read().unwrap(),
            }
        }

        /// Acquires the write lock for a certain purpose
        ///
        /// The purpose will be recorded in the list of recent writers
        pub(crate) fn write(&self, purpose: &'static str) -> WriteGuard<'_, T> {
            let start = Instant::now();
            let guard = self.inner.write().unwrap();

            let acquired = Instant::now();
            let elapsed = acquired.duration_since(start);
            if elapsed > Duration::from_millis(1) {
                warn!(
                    "Locking the transport for {} took {:?}. Recent writers: {:?}",
                    purpose, elapsed, guard.last_writer
                );
            }

            WriteGuard {
                guard,
                start_time: acquired,
                purpose,
            }
        }
    }

    pub(crate) struct ReadGuard<'a, T> {
        guard: std::sync::RwLockReadGuard<'a, Inner<T>>,
    }

    impl<T> Deref for ReadGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.guard.value
        }
    }

    pub(crate) struct WriteGuard<'a, T> {
        guard: std::sync::RwLockWriteGuard<'a, Inner<T>>,
        start_time: Instant,
        purpose: &'static str,
    }

    impl<T> Drop for WriteGuard<'_, T> {
        fn drop(&mut self) {
            if self.guard.last_writer.len() == MAX_WRITERS {
                self.guard.last_writer.pop_back();
            }

            let duration = self.start_time.elapsed();
            if duration > Duration::from_millis(1) {
                warn!(
                    "Holding the transport write lock for {} took {:?}",
                    self.purpose, duration
                );
            }

            self.guard.last_writer.push_front((self.purpose, duration));
        }
    }

    impl<T> Deref for WriteGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.guard.value
        }
    }

    impl<T> DerefMut for WriteGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.guard.value
        }
    }

    const MAX_WRITERS: usize = 20;
}

#[cfg(feature = "lock_tracking")]
pub(crate) use tracking::RwLock;

#[cfg(not(feature = "lock_tracking"))]
mod non_tracking {
    use super::*;

    /// A reader/writer lock which optionally tracks how long write guards are
    /// held and warns in case of excessive hold times
    #[derive(Debug)]
    pub(crate) struct RwLock<T> {
        inner: std::sync::RwLock<T>,
    }

    impl<T> RwLock<T> {
        pub(crate) fn new(value: T) -> Self {
            Self {
                inner: std::sync::RwLock::new(value),
            }
        }

        pub(crate) fn read(&self, _purpose: &'static str) -> ReadGuard<'_, T> {
            ReadGuard {
                guard: self.inner.read().unwrap(),
            }
        }

        pub(crate) fn write(&self, _purpose: &'static str) -> WriteGuard<'_, T> {
            WriteGuard {
                guard: self.inner.write().unwrap(),
            }
        }
    }

    pub(crate) struct ReadGuard<'a, T> {
        guard: std::sync::RwLockReadGuard<'a, T>,
    }

    impl<T> Deref for ReadGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.guard.deref()
        }
    }

    pub(crate) struct WriteGuard<'a, T> {
        guard: std::sync::RwLockWriteGuard<'a, T>,
    }

    impl<T> Deref for WriteGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.guard.deref()
        }
    }

    impl<T> DerefMut for WriteGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            self.guard.deref_mut()
        }
    }
}

#[cfg(not(feature = "lock_tracking"))]
pub(crate) use non_tracking::RwLock;
