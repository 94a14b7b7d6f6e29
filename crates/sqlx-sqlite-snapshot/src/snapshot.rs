//! Keeps a private copy of a database file that another process writes to.
//!
//! The source file is never opened by SQLite in this process. Instead it is
//! streamed into a temporary file next to the snapshot and renamed over it,
//! so readers only ever see a complete copy.
//!
//! Staleness is detected by comparing modification times: the snapshot is
//! fresh when its mtime is not before the source's.
//!
//! Connections never open the snapshot path itself. SQLite shares one page
//! cache between all shared-cache connections of a process that open the
//! same path, and a cache stays bound to the file it was first opened on.
//! Each generation is therefore exposed under its own reader name, a hard
//! link to the snapshot, so a connection opened after a refresh can never
//! join the cache of a connection that still reads the previous copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::layout::CacheLayout;

/// Source of unique temp and reader names within this process
static NEXT_TAG: AtomicU64 = AtomicU64::new(0);

fn unique_tag() -> String {
   format!(
      "{}-{}",
      std::process::id(),
      NEXT_TAG.fetch_add(1, Ordering::Relaxed)
   )
}

/// Reader name of the current generation.
#[derive(Debug)]
struct Reader {
   path: PathBuf,
   /// Snapshot mtime when the link was made
   modified: SystemTime,
}

/// Copies a source database into its cache location whenever it changed.
///
/// Every new snapshot bumps a generation counter published on a [`watch`]
/// channel. Subscribers only need to know *that* the snapshot moved on, so
/// intermediate generations may be skipped and publishing never blocks.
#[derive(Debug)]
pub struct SnapshotSync {
   layout: CacheLayout,

   /// Serializes the whole stat/copy/rename/link sequence so the background
   /// refresh and on-demand checks never copy concurrently
   lock: Mutex<()>,

   /// Written only while `lock` is held
   reader: parking_lot::Mutex<Option<Reader>>,

   /// Generation of the snapshot on disk, bumped after each new snapshot
   generation: watch::Sender<u64>,
}

impl SnapshotSync {
   pub fn new(layout: CacheLayout) -> Self {
      let (generation, _) = watch::channel(0);
      Self {
         layout,
         lock: Mutex::new(()),
         reader: parking_lot::Mutex::new(None),
         generation,
      }
   }

   pub fn layout(&self) -> &CacheLayout {
      &self.layout
   }

   /// Number of snapshots this synchronizer has moved on to.
   pub fn generation(&self) -> u64 {
      *self.generation.borrow()
   }

   /// Receive a change notification each time a fresh snapshot lands.
   ///
   /// The current generation is already marked as seen on the returned
   /// receiver, so `has_changed()` only fires for later snapshots.
   pub fn subscribe(&self) -> watch::Receiver<u64> {
      self.generation.subscribe()
   }

   /// Path connections of the current generation open.
   ///
   /// Every generation gets a new path. Before the first successful
   /// [`ensure_fresh`](Self::ensure_fresh) this is the snapshot itself.
   pub fn reader_path(&self) -> PathBuf {
      self
         .reader
         .lock()
         .as_ref()
         .map(|reader| reader.path.clone())
         .unwrap_or_else(|| self.layout.snapshot().to_path_buf())
   }

   /// Copy the source over the snapshot if the snapshot is missing or older.
   ///
   /// Returns `Ok(true)` when a new generation started and `Ok(false)` when
   /// the snapshot was already fresh. A snapshot that another synchronizer
   /// of the same library replaced also starts a new generation, without a
   /// copy. On error the previous snapshot stays valid.
   pub async fn ensure_fresh(&self) -> Result<bool> {
      let _guard = self.lock.lock().await;

      let source = self.layout.source();
      let source_mtime = fs::metadata(source)
         .await
         .and_then(|meta| meta.modified())
         .map_err(|e| Error::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
         })?;

      if let Ok(meta) = fs::metadata(self.layout.snapshot()).await
         && let Ok(snapshot_mtime) = meta.modified()
         && snapshot_mtime >= source_mtime
      {
         let linked = self.reader.lock().as_ref().map(|reader| reader.modified);
         if linked == Some(snapshot_mtime) {
            trace!(path = %source.display(), "Snapshot is fresh");
            return Ok(false);
         }

         self.link_reader(snapshot_mtime).await?;
         if linked.is_none() {
            // Written by an earlier run or another synchronizer, nothing to announce
            return Ok(false);
         }
         self.publish("Snapshot replaced by another synchronizer");
         return Ok(true);
      }

      let modified = self.copy().await?;
      self.link_reader(modified).await?;
      self.publish("Snapshot refreshed");
      Ok(true)
   }

   fn publish(&self, message: &'static str) {
      self.generation.send_modify(|generation| *generation += 1);

      debug!(
         source = %self.layout.source().display(),
         reader = %self.reader_path().display(),
         generation = self.generation(),
         "{message}"
      );
   }

   /// Stream the source into a temp file and rename it over the snapshot.
   /// Returns the modification time of the new snapshot.
   async fn copy(&self) -> Result<SystemTime> {
      let directory = self.layout.directory();
      fs::create_dir_all(directory)
         .await
         .map_err(|e| Error::CacheDirectory {
            path: directory.to_path_buf(),
            source: e,
         })?;

      let source = self.layout.source();
      let temp = self.layout.temp(&unique_tag());

      let copied = async {
         let mut reader = fs::File::open(source).await?;
         let mut writer = fs::File::create(&temp).await?;
         tokio::io::copy(&mut reader, &mut writer).await?;
         writer.sync_all().await?;
         writer.metadata().await?.modified()
      }
      .await;

      let modified = match copied {
         Ok(modified) => modified,
         Err(e) => {
            // A partial temp file must never be renamed into place
            let _ = fs::remove_file(&temp).await;
            return Err(Error::Copy {
               from: source.to_path_buf(),
               to: temp,
               source: e,
            });
         }
      };

      let snapshot = self.layout.snapshot();
      if let Err(e) = fs::rename(&temp, snapshot).await {
         let _ = fs::remove_file(&temp).await;
         return Err(Error::Rename {
            from: temp,
            to: snapshot.to_path_buf(),
            source: e,
         });
      }

      Ok(modified)
   }

   /// Give the snapshot a new reader name and retire the previous one.
   async fn link_reader(&self, modified: SystemTime) -> Result<()> {
      let snapshot = self.layout.snapshot();
      let path = self.layout.reader(&unique_tag());

      if let Err(e) = fs::hard_link(snapshot, &path).await {
         debug!(error = %e, "Hard link failed, copying snapshot for readers");
         fs::copy(snapshot, &path)
            .await
            .map_err(|e| Error::Link {
               from: snapshot.to_path_buf(),
               to: path.clone(),
               source: e,
            })?;
      }

      let previous = self.reader.lock().replace(Reader { path, modified });
      if let Some(previous) = previous {
         // Connections already open keep reading the unlinked file
         remove_reader(&previous.path);
      }
      Ok(())
   }

   /// Start a background task that calls [`ensure_fresh`](Self::ensure_fresh)
   /// every `interval`.
   ///
   /// The first check happens one `interval` from now. Failures are logged and
   /// retried on the next tick. The task stops when the returned
   /// [`RefreshTask`] is dropped or shut down.
   pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> RefreshTask {
      let cancel = CancellationToken::new();
      let sync = Arc::clone(self);
      let stop = cancel.clone();

      let handle = tokio::spawn(async move {
         let mut ticker = tokio::time::interval(interval);
         ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
         // The first tick completes immediately
         ticker.tick().await;

         loop {
            tokio::select! {
               _ = stop.cancelled() => break,
               _ = ticker.tick() => {
                  if let Err(e) = sync.ensure_fresh().await {
                     warn!(
                        source = %sync.layout.source().display(),
                        error = %e,
                        "Background snapshot refresh failed"
                     );
                  }
               }
            }
         }

         trace!("Snapshot refresh task stopped");
      });

      RefreshTask {
         cancel,
         handle: Some(handle),
      }
   }
}

/// Handle to the periodic refresh started by [`SnapshotSync::spawn_refresh`].
#[must_use = "the refresh task stops as soon as this handle is dropped"]
#[derive(Debug)]
pub struct RefreshTask {
   cancel: CancellationToken,
   handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
   /// Stop the task and wait for an in-progress check to finish.
   pub async fn shutdown(mut self) {
      self.cancel.cancel();
      if let Some(handle) = self.handle.take() {
         let _ = handle.await;
      }
   }
}

impl Drop for SnapshotSync {
   fn drop(&mut self) {
      if let Some(reader) = self.reader.get_mut().take() {
         remove_reader(&reader.path);
      }
   }
}

fn remove_reader(path: &Path) {
   if let Err(e) = std::fs::remove_file(path) {
      debug!(path = %path.display(), error = %e, "Could not remove reader file");
   }
}

impl Drop for RefreshTask {
   fn drop(&mut self) {
      self.cancel.cancel();
   }
}
