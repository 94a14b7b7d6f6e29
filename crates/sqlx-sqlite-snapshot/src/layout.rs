//! Where snapshots live on disk

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Number of hex characters of the path hash used as the directory name
const KEY_LEN: usize = 16;

/// Paths used to snapshot one source database.
///
/// ```text
/// <cache_root>/
///    <hash of source path>/
///       metadata.db          snapshot, only ever replaced by rename
///       metadata.db.<tag>    link to the snapshot that connections open
///       metadata.db~<tag>    temporary file while a copy is in progress
/// ```
///
/// Every copy streams into its own temporary file, so synchronizers of the
/// same library, in this process or another one, never write into each
/// other's copy. The last rename wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
   source: PathBuf,
   directory: PathBuf,
   snapshot: PathBuf,
   file_name: OsString,
}

impl CacheLayout {
   /// Compute the layout for `source` below `cache_root`.
   ///
   /// The source path is canonicalized when possible so that two spellings
   /// of the same library map to the same cache directory.
   pub fn new(cache_root: impl AsRef<Path>, source: impl Into<PathBuf>) -> Self {
      let source = source.into();
      let canonical = std::fs::canonicalize(&source).unwrap_or_else(|_| source.clone());
      let directory = cache_root.as_ref().join(library_key(&canonical));

      let file_name = source
         .file_name()
         .map(OsString::from)
         .unwrap_or_else(|| OsString::from("snapshot.db"));
      let snapshot = directory.join(&file_name);

      Self {
         source,
         directory,
         snapshot,
         file_name,
      }
   }

   /// The foreign database file being snapshotted.
   pub fn source(&self) -> &Path {
      &self.source
   }

   /// Per-library cache directory.
   pub fn directory(&self) -> &Path {
      &self.directory
   }

   /// The snapshot that every copy is renamed onto.
   pub fn snapshot(&self) -> &Path {
      &self.snapshot
   }

   /// Temporary file one copy is streamed into before the rename.
   pub fn temp(&self, tag: &str) -> PathBuf {
      self.sibling("~", tag)
   }

   /// Name under which connections of one generation open the snapshot.
   pub fn reader(&self, tag: &str) -> PathBuf {
      self.sibling(".", tag)
   }

   fn sibling(&self, separator: &str, tag: &str) -> PathBuf {
      let mut name = self.file_name.clone();
      name.push(separator);
      name.push(tag);
      self.directory.join(name)
   }
}

fn library_key(path: &Path) -> String {
   let hash = blake3::hash(path.as_os_str().as_encoded_bytes());
   let mut key = hash.to_hex().to_string();
   key.truncate(KEY_LEN);
   key
}
