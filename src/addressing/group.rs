//! KNX group address.
//!
//! Group addresses name logical communication relationships. The common
//! 3-level notation splits the 16 bits as 5/3/8 (Main/Middle/Sub); the
//! older 2-level notation as 5/11 (Main/Sub). Both render from the same
//! raw value.

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX group address (Main/Middle/Sub).
///
/// # Examples
///
/// ```
/// use knx_bus::GroupAddress;
///
/// let addr = GroupAddress::new(1, 2, 3).unwrap();
/// assert_eq!(addr.to_string(), "1/2/3");
///
/// let addr: GroupAddress = "0/4/1".parse().unwrap();
/// assert_eq!(u16::from(addr), 0x0401);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits).
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits).
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub value in 2-level notation (11 bits).
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Create a 3-level group address.
    ///
    /// # Errors
    ///
    /// Returns [`KnxError::InvalidAddress`] if main or middle exceed their
    /// bit ranges.
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::InvalidAddress);
        }
        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Create a 2-level group address (Main/Sub).
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::InvalidAddress);
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
        })
    }

    /// Raw 16-bit representation.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Main group (0-31).
    #[inline]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group (0-7).
    #[inline]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group, 3-level notation (0-255).
    #[inline]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group, 2-level notation (0-2047).
    #[inline]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
    }
}

impl fmt::Display for GroupAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.main(), self.middle(), self.sub())
    }
}

impl From<u16> for GroupAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Parses `M/M/S` or the 2-level `M/S` form, detected by the number of
    /// slashes.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [main, middle, sub] => {
                let main = main.parse::<u8>().map_err(|_| KnxError::InvalidAddress)?;
                let middle = middle.parse::<u8>().map_err(|_| KnxError::InvalidAddress)?;
                let sub = sub.parse::<u8>().map_err(|_| KnxError::InvalidAddress)?;
                Self::new(main, middle, sub)
            }
            [main, sub] => {
                let main = main.parse::<u8>().map_err(|_| KnxError::InvalidAddress)?;
                let sub = sub.parse::<u16>().map_err(|_| KnxError::InvalidAddress)?;
                Self::new_2level(main, sub)
            }
            _ => Err(KnxError::InvalidAddress),
        }
    }
}
