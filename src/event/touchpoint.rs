/// Absolute position of a contact on the panel.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Point {
  pub x: u16,
  pub y: u16,
}

impl Point {
  pub const fn new(x: u16, y: u16) -> Self {
    Self { x, y }
  }
}

impl core::fmt::Debug for Point {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "({}, {})", self.x, self.y)
  }
}

/// Contact coordinates are split into a shared nibble byte (X high nibble in
/// bits 7..4, Y high nibble in bits 3..0) followed by the X and Y low bytes.
///
/// Contact 1 uses bytes 1, 2, 3; contact 2 uses bytes 4, 5, 6.
#[inline]
pub(crate) const fn unpack_xy(nibbles: u8, x_lo: u8, y_lo: u8) -> (u16, u16) {
  let x = (((nibbles & 0xF0) as u16) << 4) + x_lo as u16;
  let y = (((nibbles & 0x0F) as u16) << 8) + y_lo as u16;
  (x, y)
}

/// Mirror a raw Y coordinate against the axis maximum.
///
/// Raw values above the axis maximum fold back instead of underflowing.
#[inline]
pub(crate) const fn mirror_y(axis_max: u16, raw_y: u16) -> u16 {
  axis_max.abs_diff(raw_y)
}
