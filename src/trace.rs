//! Asynchronous SQL trace log.
//!
//! Every executed statement can be appended to a log file, one line per
//! statement:
//!
//! ```text
//! 2024-05-01T09:30:00.123456Z SELECT COUNT(*) FROM books b WHERE (b.title LIKE "%dune%")
//! ```
//!
//! Lines travel over a bounded queue to a single writer task. The writer
//! opens the file on the first line, closes it after it has been idle for
//! [`TraceConfig::idle_timeout`], and opens it again on the next line. When
//! the file cannot be opened the writer falls back to standard error.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use crate::config::{OverflowPolicy, TraceConfig};

#[derive(Debug)]
enum Message {
   Line(String),
   Flush(oneshot::Sender<()>),
}

/// Handle to the trace writer. Cheap to clone; all clones share one writer.
#[derive(Debug, Clone)]
pub struct Tracer {
   inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
   /// Set once by the first effective `set_trace_file`
   sender: OnceLock<mpsc::Sender<Message>>,
   capacity: usize,
   overflow: OverflowPolicy,
   idle_timeout: Duration,
   dropped: AtomicU64,
}

impl Tracer {
   /// Create a tracer, starting the writer when `config.file` is set.
   ///
   /// Must be called from within a Tokio runtime when a file is configured.
   pub fn new(config: &TraceConfig) -> Self {
      let tracer = Self {
         inner: Arc::new(Inner {
            sender: OnceLock::new(),
            capacity: config.capacity.max(1),
            overflow: config.overflow,
            idle_timeout: config.idle_timeout,
            dropped: AtomicU64::new(0),
         }),
      };
      if let Some(file) = &config.file {
         tracer.set_trace_file(file);
      }
      tracer
   }

   /// A tracer that never writes anything until a file is set.
   pub fn disabled() -> Self {
      Self::new(&TraceConfig::default())
   }

   /// Start writing to `path`.
   ///
   /// Only the first call with a non-empty path takes effect; later calls are
   /// ignored and return `false`, even with a different path.
   pub fn set_trace_file(&self, path: impl AsRef<Path>) -> bool {
      let path = path.as_ref();
      if path.as_os_str().is_empty() {
         return false;
      }

      let (sender, receiver) = mpsc::channel(self.inner.capacity);
      if self.inner.sender.set(sender).is_err() {
         trace!(path = %path.display(), "Trace file already set, ignoring");
         return false;
      }

      tokio::spawn(run_writer(
         path.to_path_buf(),
         receiver,
         self.inner.idle_timeout,
      ));
      true
   }

   pub fn is_enabled(&self) -> bool {
      self.inner.sender.get().is_some()
   }

   /// Lines discarded because the queue was full.
   pub fn dropped(&self) -> u64 {
      self.inner.dropped.load(Ordering::Relaxed)
   }

   /// Queue `statement` for the log.
   ///
   /// Whitespace runs (including newlines and tabs) collapse to one space.
   /// Does nothing while no trace file is set.
   pub async fn trace(&self, statement: &str, at: OffsetDateTime) {
      let Some(sender) = self.inner.sender.get() else {
         return;
      };

      let line = format_line(statement, at);
      match self.inner.overflow {
         OverflowPolicy::Drop => {
            if sender.try_send(Message::Line(line)).is_err() {
               self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
         }
         OverflowPolicy::Block => {
            if sender.send(Message::Line(line)).await.is_err() {
               self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
         }
      }
   }

   /// Wait until every line queued so far has been written out.
   pub async fn flush(&self) {
      let Some(sender) = self.inner.sender.get() else {
         return;
      };

      let (ack, done) = oneshot::channel();
      if sender.send(Message::Flush(ack)).await.is_ok() {
         let _ = done.await;
      }
   }
}

fn format_line(statement: &str, at: OffsetDateTime) -> String {
   let timestamp = at
      .format(&Rfc3339)
      .unwrap_or_else(|_| at.unix_timestamp().to_string());
   let statement = statement.split_whitespace().collect::<Vec<_>>().join(" ");

   format!("{timestamp} {statement}\n")
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

async fn open_sink(path: &Path) -> Sink {
   match OpenOptions::new().create(true).append(true).open(path).await {
      Ok(file) => {
         trace!(path = %path.display(), "Opened trace file");
         Box::new(file)
      }
      Err(e) => {
         warn!(
            path = %path.display(),
            error = %e,
            "Cannot open trace file, tracing to stderr"
         );
         Box::new(tokio::io::stderr())
      }
   }
}

async fn close_sink(mut sink: Sink) {
   if let Err(e) = sink.flush().await {
      warn!(error = %e, "Failed to flush trace output");
   }
}

async fn run_writer(path: PathBuf, mut receiver: mpsc::Receiver<Message>, idle_timeout: Duration) {
   let mut sink: Option<Sink> = None;

   loop {
      let message = if sink.is_some() {
         match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(_) => {
               if let Some(idle) = sink.take() {
                  close_sink(idle).await;
                  trace!(path = %path.display(), "Closed idle trace file");
               }
               continue;
            }
         }
      } else {
         match receiver.recv().await {
            Some(message) => message,
            None => break,
         }
      };

      match message {
         Message::Line(line) => {
            if sink.is_none() {
               sink = Some(open_sink(&path).await);
            }
            if let Some(out) = sink.as_mut()
               && let Err(e) = out.write_all(line.as_bytes()).await
            {
               warn!(path = %path.display(), error = %e, "Failed to write trace line");
            }
         }
         Message::Flush(ack) => {
            if let Some(out) = sink.as_mut()
               && let Err(e) = out.flush().await
            {
               warn!(error = %e, "Failed to flush trace output");
            }
            let _ = ack.send(());
         }
      }
   }

   if let Some(out) = sink.take() {
      close_sink(out).await;
   }
}
