//! Connection Pool
//!
//! Bounded pool of store sessions.
//!
//! ## Limits
//! - `max_open`: sessions alive at once (idle + checked out); callers past
//!   this bound wait for a release or until their deadline
//! - `max_idle`: released sessions kept for reuse; extras are closed
//!
//! Sessions the manager reports invalid (e.g. opened against a table set that
//! has since changed) are closed instead of being reused.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, SieveError, StoreResult};
use crate::store::Deadline;

/// Opens and validates pooled sessions
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send;

    /// Open a new session
    fn connect(&self) -> StoreResult<Self::Connection>;

    /// Whether an idle session may be handed out again
    fn is_valid(&self, _conn: &Self::Connection) -> bool {
        true
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Sessions alive (idle + checked out)
    pub open: usize,
    /// Sessions parked for reuse
    pub idle: usize,
    pub max_open: usize,
    pub max_idle: usize,
}

struct Slots<C> {
    idle: Vec<C>,
    open: usize,
}

struct PoolInner<M: ManageConnection> {
    manager: M,
    slots: Mutex<Slots<M::Connection>>,
    released: Condvar,
    max_open: usize,
    max_idle: usize,
}

/// Bounded, thread-safe session pool
pub struct ConnectionPool<M: ManageConnection> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create a pool; `max_idle` is capped at `max_open`
    pub fn new(manager: M, max_open: usize, max_idle: usize) -> Result<Self> {
        if max_open == 0 {
            return Err(SieveError::Config(
                "max_open_connections must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                manager,
                slots: Mutex::new(Slots {
                    idle: Vec::with_capacity(max_idle.min(max_open)),
                    open: 0,
                }),
                released: Condvar::new(),
                max_open,
                max_idle: max_idle.min(max_open),
            }),
        })
    }

    /// Check out a session, waiting at most until `deadline`
    pub fn get(&self, deadline: Deadline) -> StoreResult<PooledConnection<M>> {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        loop {
            while let Some(conn) = slots.idle.pop() {
                if inner.manager.is_valid(&conn) {
                    return Ok(PooledConnection::new(Arc::clone(inner), conn));
                }
                slots.open -= 1;
            }

            if slots.open < inner.max_open {
                slots.open += 1;
                drop(slots);

                return match inner.manager.connect() {
                    Ok(conn) => Ok(PooledConnection::new(Arc::clone(inner), conn)),
                    Err(e) => {
                        inner.slots.lock().open -= 1;
                        inner.released.notify_one();
                        Err(e)
                    }
                };
            }

            match deadline.remaining() {
                None => inner.released.wait(&mut slots),
                Some(left) if left.is_zero() => return Err(deadline.timeout_error()),
                Some(left) => {
                    // Loop re-checks; an expired wait falls into the arm above
                    let _ = inner.released.wait_for(&mut slots, left);
                }
            }
        }
    }

    /// Close every idle session
    pub fn clear_idle(&self) {
        let drained: Vec<M::Connection> = {
            let mut slots = self.inner.slots.lock();
            let drained: Vec<_> = slots.idle.drain(..).collect();
            slots.open -= drained.len();
            drained
        };
        drop(drained);
        self.inner.released.notify_all();
    }

    pub fn state(&self) -> PoolState {
        let slots = self.inner.slots.lock();
        PoolState {
            open: slots.open,
            idle: slots.idle.len(),
            max_open: self.inner.max_open,
            max_idle: self.inner.max_idle,
        }
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }
}

/// A checked-out session; returns itself to the pool on drop
pub struct PooledConnection<M: ManageConnection> {
    pool: Arc<PoolInner<M>>,
    conn: Option<M::Connection>,
    broken: bool,
}

impl<M: ManageConnection> PooledConnection<M> {
    fn new(pool: Arc<PoolInner<M>>, conn: M::Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
        }
    }

    /// Close this session on release instead of reusing it
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        let reuse = !self.broken && self.pool.manager.is_valid(&conn);
        let closed = {
            let mut slots = self.pool.slots.lock();
            if reuse && slots.idle.len() < self.pool.max_idle {
                slots.idle.push(conn);
                None
            } else {
                slots.open -= 1;
                Some(conn)
            }
        };
        drop(closed);
        self.pool.released.notify_one();
    }
}
