use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::format::DEFAULT_FRAME_LIMIT;

/// Tuning knobs for [`Writer`](crate::Writer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Uncompressed bytes (blocks plus separators) after which the current
    /// frame is sealed at the next block boundary.
    pub frame_limit: u64,
    /// Deflate level, 0 (store) through 9 (smallest).
    pub level: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            frame_limit: DEFAULT_FRAME_LIMIT,
            level: Compression::default().level(),
        }
    }
}

impl WriterConfig {
    pub fn frame_limit(mut self, frame_limit: u64) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    pub(crate) fn compression(&self) -> Compression {
        Compression::new(self.level.min(9))
    }
}
