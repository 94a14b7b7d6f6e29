//! Free-list pool of read-only connections against a snapshot

use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Pool of homogeneous read-only connections.
///
/// ## Generations
///
/// [`drain_and_close_all`](Self::drain_and_close_all) starts a new generation.
/// Connections checked out before a drain belong to the previous snapshot;
/// when they are released they are closed instead of being returned to the
/// free list, so no caller is ever handed a connection from an older
/// generation. [`reopen_at`](Self::reopen_at) additionally moves new
/// connections to another path, which keeps them out of the shared cache of
/// connections still reading an older snapshot.
///
/// The state lock is held only for push/pop and option swaps, never across
/// I/O.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
   shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
   state: Mutex<State>,
   /// Only bumped while `state` is locked
   generation: AtomicU64,
   live: AtomicUsize,
   max_idle: usize,
   closed: AtomicBool,
}

#[derive(Debug)]
struct State {
   options: SqliteConnectOptions,
   free: Vec<SqliteConnection>,
}

enum Checkout {
   Reused(SqliteConnection),
   Open(SqliteConnectOptions),
}

impl ConnectionPool {
   /// Create a pool for the snapshot at `path`. No connection is opened yet.
   pub fn new(path: impl AsRef<Path>, max_idle: usize) -> Self {
      Self::with_options(Self::connect_options(path), max_idle)
   }

   /// Create a pool from explicit connect options.
   pub fn with_options(options: SqliteConnectOptions, max_idle: usize) -> Self {
      Self {
         shared: Arc::new(Shared {
            state: Mutex::new(State {
               options,
               free: Vec::new(),
            }),
            generation: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            max_idle,
            closed: AtomicBool::new(false),
         }),
      }
   }

   /// Read-only, shared-cache, query-only options for a snapshot file.
   pub fn connect_options(path: impl AsRef<Path>) -> SqliteConnectOptions {
      SqliteConnectOptions::new()
         .filename(path)
         .read_only(true)
         .shared_cache(true)
         .create_if_missing(false)
         .pragma("query_only", "ON")
   }

   /// Hand out a free connection, or open a new one when none is free.
   ///
   /// An already-cancelled token returns [`Error::Cancelled`] without touching
   /// the free list. Cancellation while a new connection is being opened
   /// abandons the open. Open failures are returned unchanged.
   pub async fn acquire(&self, cancel: &CancellationToken) -> Result<PooledConnection> {
      if cancel.is_cancelled() {
         return Err(Error::Cancelled);
      }
      if self.shared.closed.load(Ordering::Acquire) {
         return Err(Error::PoolClosed);
      }

      // Options and generation are read together, so a drain racing with
      // the open retires this connection on release
      let (checkout, generation) = {
         let mut state = self.shared.state.lock();
         let generation = self.shared.generation.load(Ordering::Acquire);
         let checkout = match state.free.pop() {
            Some(conn) => Checkout::Reused(conn),
            None => Checkout::Open(state.options.clone()),
         };
         (checkout, generation)
      };

      let options = match checkout {
         Checkout::Reused(conn) => {
            trace!(generation, "Reusing pooled connection");
            return Ok(PooledConnection::new(conn, generation, &self.shared));
         }
         Checkout::Open(options) => options,
      };

      let conn = tokio::select! {
         _ = cancel.cancelled() => return Err(Error::Cancelled),
         conn = options.connect() => conn?,
      };
      self.shared.live.fetch_add(1, Ordering::AcqRel);
      trace!(generation, "Opened snapshot connection");

      Ok(PooledConnection::new(conn, generation, &self.shared))
   }

   /// Return a connection to the pool.
   ///
   /// Equivalent to dropping it; provided for call sites that want the
   /// hand-back to be explicit.
   pub fn release(&self, conn: PooledConnection) {
      drop(conn);
   }

   /// Close every idle connection and start a new generation.
   ///
   /// Close errors are ignored. Connections that are checked out right now
   /// are closed when they come back. Intended for a single maintenance path
   /// at a time; it is not designed for concurrent drains.
   pub async fn drain_and_close_all(&self) {
      self.retire(None).await;
   }

   /// Open new connections against `path` from now on, then drain as
   /// [`drain_and_close_all`](Self::drain_and_close_all) does.
   pub async fn reopen_at(&self, path: impl AsRef<Path>) {
      self.retire(Some(path.as_ref())).await;
   }

   async fn retire(&self, path: Option<&Path>) {
      let drained = {
         let mut state = self.shared.state.lock();
         if let Some(path) = path {
            state.options = state.options.clone().filename(path);
         }
         self.shared.generation.fetch_add(1, Ordering::AcqRel);
         std::mem::take(&mut state.free)
      };

      let count = drained.len();
      for conn in drained {
         let _ = conn.close().await;
         self.shared.live.fetch_sub(1, Ordering::AcqRel);
      }

      debug!(
         closed = count,
         generation = self.generation(),
         "Drained connection pool"
      );
   }

   /// Drain the pool and refuse further acquisitions.
   pub async fn close(&self) {
      self.shared.closed.store(true, Ordering::Release);
      self.drain_and_close_all().await;
   }

   pub fn is_closed(&self) -> bool {
      self.shared.closed.load(Ordering::Acquire)
   }

   /// Connections that are open right now, checked out or idle.
   pub fn live_connections(&self) -> usize {
      self.shared.live.load(Ordering::Acquire)
   }

   /// Connections waiting in the free list.
   pub fn idle_connections(&self) -> usize {
      self.shared.state.lock().free.len()
   }

   /// Current generation, bumped by every drain.
   pub fn generation(&self) -> u64 {
      self.shared.generation.load(Ordering::Acquire)
   }
}

impl Shared {
   fn put_back(&self, conn: SqliteConnection, generation: u64) {
      let rejected = {
         let mut state = self.state.lock();
         let current = generation == self.generation.load(Ordering::Acquire);
         if current && !self.closed.load(Ordering::Acquire) && state.free.len() < self.max_idle {
            state.free.push(conn);
            None
         } else {
            Some(conn)
         }
      };

      if let Some(conn) = rejected {
         // Dropping the connection closes it
         drop(conn);
         self.live.fetch_sub(1, Ordering::AcqRel);
         trace!(generation, "Retired connection on release");
      }
   }
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Returned to the pool when dropped.
#[derive(Debug)]
pub struct PooledConnection {
   conn: Option<SqliteConnection>,
   generation: u64,
   shared: Arc<Shared>,
}

impl PooledConnection {
   fn new(conn: SqliteConnection, generation: u64, shared: &Arc<Shared>) -> Self {
      Self {
         conn: Some(conn),
         generation,
         shared: Arc::clone(shared),
      }
   }

   /// Generation of the pool this connection was opened or reused in.
   pub fn generation(&self) -> u64 {
      self.generation
   }
}

impl Deref for PooledConnection {
   type Target = SqliteConnection;

   fn deref(&self) -> &Self::Target {
      self.conn.as_ref().expect("connection already returned")
   }
}

impl DerefMut for PooledConnection {
   fn deref_mut(&mut self) -> &mut Self::Target {
      self.conn.as_mut().expect("connection already returned")
   }
}

impl Drop for PooledConnection {
   fn drop(&mut self) {
      if let Some(conn) = self.conn.take() {
         self.shared.put_back(conn, self.generation);
      }
   }
}
