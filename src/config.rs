//! Configuration for LodeStream
//!
//! Centralized configuration with sensible defaults.

use crate::error::{LodeError, Result};
use crate::layout;

/// Main configuration for a LodeStream instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Block granularity in bytes. All region offsets and footprints are
    /// multiples of this value. Must be a power of two and large enough to
    /// hold the stream header. Fixed at stream creation.
    pub block_size: u64,

    /// Total stream size in bytes, used when creating a fresh mapping via
    /// [`crate::Stream::open_file`]. Rounded down to a block multiple.
    pub stream_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 4096,
            stream_size: 16 * 1024 * 1024, // 16 MiB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// Checks:
    /// - block size is a power of two
    /// - block size can hold the stream header
    /// - stream size has room for the header block plus at least one region block
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two() {
            return Err(LodeError::Config(format!(
                "block size must be a power of two, got {}",
                self.block_size
            )));
        }
        if self.block_size < layout::STREAM_HEADER_SIZE {
            return Err(LodeError::Config(format!(
                "block size {} cannot hold the {}-byte stream header",
                self.block_size,
                layout::STREAM_HEADER_SIZE
            )));
        }
        if self.stream_size < self.block_size * 2 {
            return Err(LodeError::Config(format!(
                "stream size {} leaves no room for regions (block size {})",
                self.stream_size, self.block_size
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the block granularity (bytes, power of two)
    pub fn block_size(mut self, size: u64) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the stream size used when creating a fresh mapping (bytes)
    pub fn stream_size(mut self, size: u64) -> Self {
        self.config.stream_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
