use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::{CMD_FW_VERSION, CMD_PANEL_VERSION, PANEL_WINTEK, RESPONSE_ACK};
use crate::{Bi041p, Error};

/// A probe response did not start with the acknowledgement byte; carries the
/// byte that was received instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeFailed(pub u8);

/// Controller firmware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion {
  pub major: u8,
  pub minor: u8,
}

impl FirmwareVersion {
  /// Decode a version probe response.
  ///
  /// Major and minor are each spread over two nibbles:
  /// `major = b1[3:0] b2[7:4]`, `minor = b2[3:0] b3[7:4]`.
  pub const fn decode(resp: [u8; 4]) -> Result<Self, ProbeFailed> {
    if resp[0] != RESPONSE_ACK {
      return Err(ProbeFailed(resp[0]));
    }
    let major = ((resp[1] & 0x0F) << 4) | ((resp[2] & 0xF0) >> 4);
    let minor = ((resp[2] & 0x0F) << 4) | ((resp[3] & 0xF0) >> 4);
    Ok(Self { major, minor })
  }

  /// The version as a single integer, `major * 100 + minor`.
  pub const fn as_number(&self) -> u16 {
    self.major as u16 * 100 + self.minor as u16
  }
}

/// Panel vendor reported by the panel probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Panel {
  Unknown,
  Wintek,
  Acrosense,
}

impl Panel {
  pub const fn decode(resp: [u8; 4]) -> Result<Self, ProbeFailed> {
    if resp[0] != RESPONSE_ACK {
      return Err(ProbeFailed(resp[0]));
    }
    Ok(if resp[3] == PANEL_WINTEK { Panel::Wintek } else { Panel::Acrosense })
  }

  /// Name published on the status surface.
  pub const fn as_str(self) -> &'static str {
    match self {
      Panel::Unknown => "UNKNOWN",
      Panel::Wintek => "WINTEK",
      Panel::Acrosense => "ACROSENSE",
    }
  }
}

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Query the firmware version and cache it.
  pub async fn firmware_version(&mut self) -> Result<FirmwareVersion, Error<E>> {
    let resp = self.exchange(&CMD_FW_VERSION).await?;
    let version = FirmwareVersion::decode(resp)?;
    info!("BI041P: firmware version {}", version.as_number());
    self.version = Some(version);
    Ok(version)
  }

  /// Query which vendor built the panel and cache it.
  pub async fn probe_panel(&mut self) -> Result<Panel, Error<E>> {
    let resp = self.exchange(&CMD_PANEL_VERSION).await?;
    let panel = Panel::decode(resp)?;
    info!("BI041P: panel is {} {:?}", panel.as_str(), resp);
    self.panel = panel;
    Ok(panel)
  }
}
