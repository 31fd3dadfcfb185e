#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Async, `no_std` driver for the ELAN BI041P capacitive touch controller.
//!
//! The BI041P reports two-finger touch data and a row of capacitive
//! virtual keys over a single 9-byte event packet. This crate turns those
//! packets into input events and drives the controller's in-system
//! programming protocol. It provides:
//!
//! - Reset pulse and "hello" handshake used at attach, resume and after a
//!   firmware update
//! - A touch / virtual-key state machine that keeps key presses and touch
//!   contacts mutually exclusive in the output stream
//! - Per-revision virtual-key remapping
//! - Page-level firmware reflash (erase, program, read-back verify,
//!   frequency calibration, MCU reset) with whole-update retry
//! - An ADC noise monitor for production diagnostics
//! - Firmware version and panel vendor probes
//! - `embedded-hal` / `embedded-hal-async` 1.0 traits so the driver works
//!   across MCU families, with `embassy-sync` primitives for the interrupt
//!   hand-off
//!
//! ```no_run
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//! use embedded_hal::digital::{InputPin, OutputPin};
//! use embedded_hal_async::{delay::DelayNs, i2c::{I2c, SevenBitAddress}};
//! use bi041p::{Bi041p, Config, HwRevision, Session};
//!
//! static SESSION: Session<CriticalSectionRawMutex> = Session::new();
//!
//! async fn example<I2C, RST, RDY, D, E>(i2c: I2C, rst: RST, rdy: RDY, delay: D) -> Result<(), bi041p::Error<E>>
//! where
//!   I2C: I2c<SevenBitAddress, Error = E>,
//!   RST: OutputPin,
//!   RDY: InputPin,
//!   D: DelayNs,
//! {
//!   let config = Config::new(0x10).with_revision(HwRevision::Rev2);
//!   let mut touch = Bi041p::new(i2c, rst, rdy, delay, &SESSION, config);
//!   touch.attach().await?;
//!
//!   loop {
//!     // The interrupt handler calls `SESSION.on_interrupt()`.
//!     if let Some(frame) = touch.next_frame().await? {
//!       for event in frame.iter() {
//!         let _ = event;
//!       }
//!     }
//!   }
//! }
//! ```
#[macro_use]
mod fmt;

mod cmd;
mod config;
mod control;
mod event;
mod init;
mod noise;
mod power;
mod rw;
mod session;
mod touchpad;
mod update;

#[cfg(test)]
mod mock;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

pub use config::*;
pub use control::{FirmwareVersion, Panel, ProbeFailed};
pub use event::{decode_event, EventFrame, HwRevision, Packet, Point, VirtualKey};
pub use noise::MAX_NOISE_SAMPLES;
pub use session::Session;
pub use touchpad::*;
pub use update::*;

/// Errors that can occur while interacting with the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
  /// I²C bus transaction failed with the underlying driver error.
  I2c(E),
  /// The controller answered a probe without the `0x52` acknowledgement.
  Protocol(u8),
  /// The firmware image could not be opened or read.
  Image,
  /// The reset pulse did not produce a hello packet within the poll budget.
  HandshakeTimeout,
  /// The reset line or the ready pin reported an error.
  Pin,
}

impl<E> From<ProbeFailed> for Error<E> {
  fn from(err: ProbeFailed) -> Self {
    Error::Protocol(err.0)
  }
}

/// Driver for the BI041P touch controller.
///
/// The driver owns the I²C bus, the reset line, the ready pin and a delay
/// provider, and borrows the [`Session`] shared with the interrupt handler.
/// Create an instance with [`Bi041p::new`], then call [`Bi041p::attach`] to
/// bring the chip to a known state and open interrupt delivery.
pub struct Bi041p<'s, M: RawMutex, I, RST, RDY, D> {
  i2c: I,
  rst: RST,
  rdy: RDY,
  delay: D,
  session: &'s Session<M>,
  config: Config,
  touchpad: Touchpad,
  version: Option<FirmwareVersion>,
  panel: Panel,
}

impl<'s, M, I, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
{
  /// Create a new driver instance.
  ///
  /// Nothing is sent to the device until [`Bi041p::attach`] is called.
  pub fn new(i2c: I, rst: RST, rdy: RDY, delay: D, session: &'s Session<M>, config: Config) -> Self {
    let touchpad = Touchpad::new(config.revision, config.axis_max_y, config.report_mode);
    Self { i2c, rst, rdy, delay, session, config, touchpad, version: None, panel: Panel::Unknown }
  }

  /// Detach from the device and give the peripherals back.
  pub fn release(self) -> (I, RST, RDY, D) {
    (self.i2c, self.rst, self.rdy, self.delay)
  }

  /// The configuration currently in effect.
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// The shared session handle.
  pub fn session(&self) -> &'s Session<M> {
    self.session
  }

  /// Toggle verbose per-packet logging.
  pub fn set_debug(&mut self, enabled: bool) {
    info!("BI041P: debug messages {}", if enabled { "on" } else { "off" });
    self.config.debug = enabled;
  }

  pub fn debug(&self) -> bool {
    self.config.debug
  }

  /// Set the pause inserted after every verified firmware page.
  pub fn set_page_delay_ms(&mut self, delay_ms: u32) {
    info!("BI041P: firmware update page delay = {} ms", delay_ms);
    self.config.page_delay_ms = delay_ms;
  }

  /// Firmware version from the last successful probe.
  pub fn cached_firmware_version(&self) -> Option<FirmwareVersion> {
    self.version
  }

  /// Panel vendor from the last successful probe.
  pub fn panel(&self) -> Panel {
    self.panel
  }

  /// State of the touch / virtual-key decoder.
  pub fn touchpad(&self) -> &Touchpad {
    &self.touchpad
  }
}

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  RST: OutputPin,
  RDY: InputPin,
  D: DelayNs,
{
  /// Bring the controller up.
  ///
  /// Pulses reset and waits for the hello packet, probes the firmware version
  /// and the panel vendor, then opens interrupt delivery. A handshake failure
  /// is returned as [`Error::HandshakeTimeout`]; the driver can still be used
  /// to reflash the controller in that case.
  pub async fn attach(&mut self) -> Result<(), Error<E>> {
    if let Err(err) = self.reset().await {
      error!("BI041P: chip reset failed");
      return Err(err);
    }

    if self.firmware_version().await.is_err() {
      warn!("BI041P: firmware version probe failed");
    }
    if self.probe_panel().await.is_err() {
      warn!("BI041P: panel probe failed");
    }

    self.session.enable();
    Ok(())
  }
}
