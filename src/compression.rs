//! LZ4 compression engine for stored objects
//!
//! Every blob qwe writes to disk (bases, diffs, binary snapshots and the
//! tracker files) passes through [`CompressionEngine::compress`] first and is
//! read back through [`CompressionEngine::decompress`]. The rest of the crate
//! treats the engine as an opaque `bytes -> bytes` service.
//!
//! ## Format
//!
//! Each framed blob starts with a 4-byte magic header:
//! - `LZ4Q`: LZ4 data with a prepended little-endian size follows
//! - `\0\0\0\0`: the payload is stored raw
//!
//! Raw framing is used when the strategy is [`CompressionStrategy::None`],
//! for tiny payloads, and whenever LZ4 would not shrink the input.
//!
//! ## Examples
//!
//! ```rust
//! use qwe::compression::{CompressionEngine, CompressionStrategy};
//!
//! let mut engine = CompressionEngine::new(CompressionStrategy::Fast);
//! let data = b"line one\nline two\n".repeat(20);
//! let framed = engine.compress(&data).unwrap();
//! assert_eq!(engine.decompress(&framed).unwrap(), data);
//! ```

use crate::error::{QweError, Result};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, trace};

/// Magic bytes identifying LZ4-compressed payloads
const LZ4_MAGIC: &[u8] = b"LZ4Q";

/// Magic bytes identifying raw payloads
const RAW_MAGIC: &[u8] = &[0, 0, 0, 0];

/// Payloads below this size are never worth an LZ4 attempt
const MIN_COMPRESS_SIZE: usize = 64;

/// Compression strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionStrategy {
    /// Store payloads framed but uncompressed
    None,
    /// LZ4 compression for every payload that benefits from it (default)
    #[default]
    Fast,
}

impl CompressionStrategy {
    /// Name used in the persisted configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionStrategy::None => "none",
            CompressionStrategy::Fast => "fast",
        }
    }
}

impl FromStr for CompressionStrategy {
    type Err = QweError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionStrategy::None),
            "fast" => Ok(CompressionStrategy::Fast),
            other => Err(QweError::InvalidConfiguration(format!(
                "unknown compression strategy '{}'",
                other
            ))),
        }
    }
}

/// Counters gathered by a [`CompressionEngine`]
#[derive(Debug, Default, Clone)]
pub struct CompressionStats {
    /// Number of payloads compressed
    pub objects_compressed: usize,
    /// Number of payloads stored raw
    pub objects_stored_raw: usize,
    /// Total bytes saved by compression
    pub bytes_saved: usize,
    /// Total compression time in milliseconds
    pub compression_time_ms: u64,
    /// Total decompression time in milliseconds
    pub decompression_time_ms: u64,
}

impl CompressionStats {
    /// Fraction of payloads that were actually compressed (0.0 to 1.0)
    pub fn compression_ratio(&self) -> f64 {
        let total = self.objects_compressed + self.objects_stored_raw;
        if total == 0 {
            return 0.0;
        }
        self.objects_compressed as f64 / total as f64
    }
}

/// Compression engine
///
/// Compression takes `&mut self` for the statistics; the object store keeps
/// its engine behind a mutex.
#[derive(Debug)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
    stats: CompressionStats,
}

impl CompressionEngine {
    /// Create a new compression engine with the specified strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self {
            strategy,
            stats: CompressionStats::default(),
        }
    }

    /// Strategy this engine was created with
    pub fn strategy(&self) -> CompressionStrategy {
        self.strategy
    }

    /// Statistics gathered so far
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    /// Compress a payload, returning the framed bytes
    ///
    /// # Errors
    ///
    /// LZ4 compression itself cannot fail; the `Result` keeps the signature
    /// uniform with [`decompress`](Self::decompress).
    pub fn compress(&mut self, content: &[u8]) -> Result<Vec<u8>> {
        let start = Instant::now();

        if self.strategy == CompressionStrategy::None || content.len() < MIN_COMPRESS_SIZE {
            trace!("Storing {} bytes raw", content.len());
            return Ok(self.frame_raw(content));
        }

        let compressed = compress_prepend_size(content);
        if compressed.len() >= content.len() {
            trace!("Compression not beneficial for {} bytes, storing raw", content.len());
            return Ok(self.frame_raw(content));
        }

        let saved = content.len() - compressed.len();
        self.stats.bytes_saved += saved;
        self.stats.objects_compressed += 1;
        self.stats.compression_time_ms += start.elapsed().as_millis() as u64;

        debug!(
            "Compressed {} -> {} bytes (saved {:.1}%)",
            content.len(),
            compressed.len(),
            (saved as f64 / content.len() as f64) * 100.0
        );

        let mut result = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
        result.extend_from_slice(LZ4_MAGIC);
        result.extend_from_slice(&compressed);
        Ok(result)
    }

    /// Decompress a framed payload
    ///
    /// # Errors
    ///
    /// Returns [`QweError::Decompression`] if the header is missing or unknown,
    /// or if the LZ4 body is corrupt.
    pub fn decompress(&mut self, content: &[u8]) -> Result<Vec<u8>> {
        let start = Instant::now();

        if content.len() < LZ4_MAGIC.len() {
            return Err(QweError::decompression("Content too short"));
        }

        let (magic, body) = content.split_at(LZ4_MAGIC.len());
        if magic == LZ4_MAGIC {
            let decompressed = decompress_size_prepended(body)
                .map_err(|e| QweError::decompression(format!("LZ4 decompression failed: {}", e)))?;
            self.stats.decompression_time_ms += start.elapsed().as_millis() as u64;
            trace!("Decompressed {} bytes to {} bytes", content.len(), decompressed.len());
            Ok(decompressed)
        } else if magic == RAW_MAGIC {
            Ok(body.to_vec())
        } else {
            Err(QweError::decompression("Unknown frame header"))
        }
    }

    fn frame_raw(&mut self, content: &[u8]) -> Vec<u8> {
        self.stats.objects_stored_raw += 1;
        let mut result = Vec::with_capacity(RAW_MAGIC.len() + content.len());
        result.extend_from_slice(RAW_MAGIC);
        result.extend_from_slice(content);
        result
    }
}
