//! [`Ring`](crate::ring::Ring) configuration.

use bitflags::bitflags;
use std::convert::TryFrom;
use thiserror::Error;

use crate::ring::{LayoutError, RingLayout};

/// Default capture length, a full untagged Ethernet frame.
pub const DEFAULT_CAPLEN: u32 = 1514;

/// Default number of slots in each half of the ring.
pub const DEFAULT_SLOT_COUNT: u32 = 131_072;

bitflags! {
    /// Capture options forwarded to the producer when a ring is
    /// configured.
    pub struct CaptureFlags: u32 {
        /// Stamp each slot with the time of capture.
        const TIMESTAMP = 1;
        /// Spread frames across every socket bound to the same
        /// device queue instead of copying them to each.
        const LOAD_BALANCE = 2;
    }
}

/// Error signifying an invalid capture length or slot count.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("capture length must be between 1 and {max}, got {got}")]
    CaplenInvalid { got: u32, max: u32 },
    #[error("slot count must be non-zero")]
    SlotCountInvalid,
    #[error("ring geometry is invalid")]
    Layout(#[from] LayoutError),
}

/// Number of payload bytes captured per frame. Must be non-zero and
/// fit the slot header's 16-bit length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caplen(u32);

impl Caplen {
    /// Create a new `Caplen` instance. Fails if `len` is zero or
    /// larger than [`u16::MAX`].
    pub fn new(len: u32) -> Result<Self, ConfigError> {
        let max = u32::from(u16::MAX);

        if len == 0 || len > max {
            Err(ConfigError::CaplenInvalid { got: len, max })
        } else {
            Ok(Self(len))
        }
    }

    /// The capture length.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for Caplen {
    type Error = ConfigError;

    fn try_from(len: u32) -> Result<Self, Self::Error> {
        Caplen::new(len)
    }
}

/// Number of slots in each half of the ring. Must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCount(u32);

impl SlotCount {
    /// Create a new `SlotCount` instance. Fails if `count` is zero.
    pub fn new(count: u32) -> Result<Self, ConfigError> {
        if count == 0 {
            Err(ConfigError::SlotCountInvalid)
        } else {
            Ok(Self(count))
        }
    }

    /// The slot count.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SlotCount {
    type Error = ConfigError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        SlotCount::new(count)
    }
}

/// Builder for a [`Config`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capture length. Default is [`DEFAULT_CAPLEN`].
    pub fn caplen(&mut self, caplen: Caplen) -> &mut Self {
        self.config.caplen = caplen;
        self
    }

    /// Set the number of slots per half. Default is
    /// [`DEFAULT_SLOT_COUNT`].
    pub fn slot_count(&mut self, count: SlotCount) -> &mut Self {
        self.config.slot_count = count;
        self
    }

    /// Set the capture flags. Default is empty.
    pub fn flags(&mut self, flags: CaptureFlags) -> &mut Self {
        self.config.flags = flags;
        self
    }

    /// Build a [`Config`] instance using the values set in this
    /// builder.
    ///
    /// Fails if the resulting ring would not fit in the address
    /// space.
    pub fn build(&self) -> Result<Config, ConfigError> {
        self.config.layout()?;
        Ok(self.config)
    }
}

/// Config for a [`Ring`](crate::ring::Ring) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    caplen: Caplen,
    slot_count: SlotCount,
    flags: CaptureFlags,
}

impl Config {
    /// Creates a new [`ConfigBuilder`] instance.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// The capture length.
    pub fn caplen(&self) -> Caplen {
        self.caplen
    }

    /// The number of slots in each half of the ring.
    pub fn slot_count(&self) -> SlotCount {
        self.slot_count
    }

    /// The capture flags.
    pub fn flags(&self) -> CaptureFlags {
        self.flags
    }

    /// The region layout this config describes.
    pub fn layout(&self) -> Result<RingLayout, LayoutError> {
        RingLayout::new(self.slot_count.get() as usize, self.caplen.get() as usize)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            caplen: Caplen(DEFAULT_CAPLEN),
            slot_count: SlotCount(DEFAULT_SLOT_COUNT),
            flags: CaptureFlags::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;

    #[test]
    fn caplen_should_reject_zero_and_values_above_u16_max() {
        assert!(Caplen::new(0).is_err());
        assert!(Caplen::new(1).is_ok());
        assert!(Caplen::new(65_535).is_ok());
        assert!(Caplen::new(65_536).is_err());
    }

    #[test]
    fn slot_count_should_reject_zero() {
        assert!(SlotCount::new(0).is_err());
        assert!(SlotCount::new(1).is_ok());
    }

    #[test]
    fn default_config_matches_defaults() {
        let config = Config::default();

        assert_eq!(config.caplen().get(), DEFAULT_CAPLEN);
        assert_eq!(config.slot_count().get(), DEFAULT_SLOT_COUNT);
        assert!(config.flags().is_empty());
    }

    #[test]
    fn builder_sets_values() {
        let config = ConfigBuilder::new()
            .caplen(64.try_into().unwrap())
            .slot_count(8.try_into().unwrap())
            .flags(CaptureFlags::TIMESTAMP)
            .build()
            .unwrap();

        assert_eq!(config.caplen().get(), 64);
        assert_eq!(config.slot_count().get(), 8);
        assert!(config.flags().contains(CaptureFlags::TIMESTAMP));

        let layout = config.layout().unwrap();
        assert_eq!(layout.slot_count(), 8);
        assert_eq!(layout.caplen(), 64);
    }
}
