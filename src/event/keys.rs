/// Capacitive buttons printed below the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VirtualKey {
  Back,
  Menu,
  Home,
  Search,
}

impl VirtualKey {
  /// Linux input key code for this button.
  pub const fn code(self) -> u16 {
    match self {
      VirtualKey::Back => 158,
      VirtualKey::Menu => 139,
      VirtualKey::Home => 102,
      VirtualKey::Search => 217,
    }
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      VirtualKey::Back => "back",
      VirtualKey::Menu => "menu",
      VirtualKey::Home => "home",
      VirtualKey::Search => "search",
    }
  }
}

/// Board revision, determines the printed order of the virtual keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HwRevision {
  Rev1,
  Rev2,
  Other,
}

use VirtualKey::*;

/// Key produced by each button bit, one row per revision, columns for mask
/// values 2, 4, 8 and 16.
const KEYMAP: [[VirtualKey; 4]; 3] = [
  // Rev1
  [Menu, Home, Search, Back],
  // Rev2
  [Menu, Home, Back, Search],
  // Other
  [Back, Menu, Home, Search],
];

impl HwRevision {
  const fn row(self) -> usize {
    match self {
      HwRevision::Rev1 => 0,
      HwRevision::Rev2 => 1,
      HwRevision::Other => 2,
    }
  }

  /// Resolve a virtual-key mask to the button it means on this revision.
  ///
  /// Only single-button masks (2, 4, 8, 16) resolve; everything else,
  /// including 0 and chords, yields `None`.
  pub const fn remap(self, mask: u8) -> Option<VirtualKey> {
    let column = match mask {
      2 => 0,
      4 => 1,
      8 => 2,
      16 => 3,
      _ => return None,
    };
    Some(KEYMAP[self.row()][column])
  }
}
