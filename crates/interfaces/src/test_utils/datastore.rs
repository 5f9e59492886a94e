//! Testing support for the datastore.

use crate::datastore::{Datastore, DatastoreError, DatastoreResult, Key, MemoryDatastore};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A [`MemoryDatastore`] whose writes can be made to fail and whose queries can be held back.
#[derive(Debug, Default)]
pub struct TestDatastore {
    inner: MemoryDatastore,
    fail_puts: AtomicBool,
    puts: AtomicUsize,
    hold_queries: Mutex<bool>,
    queries_released: Condvar,
    held_queries: AtomicUsize,
}

impl TestDatastore {
    /// Makes every following `put` fail (or succeed again).
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful writes.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Blocks every following `query` on its calling thread until [`Self::release_queries`].
    pub fn hold_queries(&self) {
        *self.hold_queries.lock() = true;
    }

    /// Lets held and future queries through.
    pub fn release_queries(&self) {
        *self.hold_queries.lock() = false;
        self.queries_released.notify_all();
    }

    /// Returns the number of queries currently held.
    pub fn held_queries(&self) -> usize {
        self.held_queries.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &MemoryDatastore {
        &self.inner
    }
}

impl Datastore for TestDatastore {
    fn put(&self, key: &Key, value: Vec<u8>) -> DatastoreResult<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(DatastoreError::Backend(format!("write of {key} rejected")))
        }
        self.inner.put(key, value)?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, key: &Key) -> DatastoreResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn query(&self, prefix: &Key) -> DatastoreResult<Vec<(Key, Vec<u8>)>> {
        let mut hold = self.hold_queries.lock();
        if *hold {
            self.held_queries.fetch_add(1, Ordering::SeqCst);
            while *hold {
                self.queries_released.wait(&mut hold);
            }
            self.held_queries.fetch_sub(1, Ordering::SeqCst);
        }
        drop(hold);
        self.inner.query(prefix)
    }
}
