//! KNX addressing.
//!
//! KNX uses two 16-bit address spaces:
//! - Individual addresses identify physical devices (Area.Line.Device)
//! - Group addresses identify logical communication groups (Main/Middle/Sub)
//!
//! Which one a cEMI destination field holds is decided by the group bit of
//! the enclosing frame's control field 2, not by the value itself.

pub mod group;
pub mod individual;

#[doc(inline)]
pub use group::GroupAddress;
#[doc(inline)]
pub use individual::IndividualAddress;
