// id.rs — Artifact tags: the discriminator in intermediate file names
//
// Two compilations sharing a work directory must not write the same file
// names. A tag is either supplied by the caller or generated from the wall
// clock plus a process-wide counter. Tags are advisory: nothing locks the
// work directory, and two processes can still produce the same tag.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Discriminator appended to artifact base names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactTag(String);

impl ArtifactTag {
    /// Caller-chosen tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Time-derived tag: microseconds since the epoch, then a sequence number
    /// that is monotonic within this process.
    pub fn fresh() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}_{}", micros, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
