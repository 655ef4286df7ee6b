//! Memory address type.

use std::fmt;

/// Strongly typed memory address
///
/// This wrapper around `u64` keeps watched addresses from being mixed up with
/// codes, counts, or CPU numbers.
///
/// ## Example
///
/// ```rust
/// use hwwatch_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// assert_eq!(addr.value(), 0x1000);
/// assert_eq!(format!("{addr:#x}"), "0x1000");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

/// The address a watch is aimed at.
///
/// [`Address::ZERO`] is the sentinel meaning "monitoring disabled"; every other
/// value is watched at [`WATCH_WIDTH`](crate::types::WATCH_WIDTH) bytes.
pub type WatchTarget = Address;

impl Address
{
    /// The null address (0x0), also the "disabled" watch target.
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// ## Example
    ///
    /// ```rust
    /// use hwwatch_core::types::Address;
    ///
    /// const JIFFIES: Address = Address::new(0xffff_ffff_8200_5000);
    /// ```
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the disabled sentinel.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Distance from `base` to this address, if `base` is not above it.
    pub fn offset_from(self, base: Address) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
