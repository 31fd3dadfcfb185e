use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::{PACKET_HELLO, PACKET_TOUCH};
use crate::{Bi041p, Error, Frame};

mod keys;
mod touchpoint;

pub use keys::*;
pub use touchpoint::*;

/// Length of an event packet.
pub const EVENT_FRAME_LEN: usize = 9;

/// Classification of a raw event packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Packet {
  /// Touch / virtual-key report (`0x5A` header).
  Touch(EventFrame),
  /// Four `0x55` bytes: the controller finished booting.
  Hello,
  Unrecognized,
}

/// Decode a 9-byte event packet.
pub fn decode_event(raw: [u8; EVENT_FRAME_LEN]) -> Packet {
  if raw[0] == PACKET_TOUCH {
    Packet::Touch(EventFrame(raw))
  } else if raw[..4] == PACKET_HELLO {
    Packet::Hello
  } else {
    Packet::Unrecognized
  }
}

/// A touch / virtual-key report.
///
/// Byte 8 packs the contact count (bits 2..1, with bit 0 inverted) and the
/// virtual-key mask (bits 7..3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventFrame(pub [u8; EVENT_FRAME_LEN]);

impl EventFrame {
  /// Number of fingers on the panel.
  pub const fn touch_count(&self) -> u8 {
    (self.0[8] ^ 0x01) >> 1
  }

  /// Virtual-key bits, 0 when no button is touched.
  pub const fn key_mask(&self) -> u8 {
    self.0[8] >> 3
  }

  /// Raw (unmirrored) coordinates of the first contact.
  pub const fn primary_raw(&self) -> Point {
    let (x, y) = unpack_xy(self.0[1], self.0[2], self.0[3]);
    Point::new(x, y)
  }

  /// Raw (unmirrored) coordinates of the second contact.
  pub const fn secondary_raw(&self) -> Point {
    let (x, y) = unpack_xy(self.0[4], self.0[5], self.0[6]);
    Point::new(x, y)
  }

  /// Coordinates of the first contact with Y mirrored against `axis_max`.
  pub const fn primary(&self, axis_max: u16) -> Point {
    let raw = self.primary_raw();
    Point::new(raw.x, mirror_y(axis_max, raw.y))
  }

  /// Coordinates of the second contact with Y mirrored against `axis_max`.
  pub const fn secondary(&self, axis_max: u16) -> Point {
    let raw = self.secondary_raw();
    Point::new(raw.x, mirror_y(axis_max, raw.y))
  }
}

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
{
  /// Wait for the next interrupt and decode the packet it announces.
  ///
  /// Returns the batch of input events produced by the packet, or `None` for
  /// hello and unrecognized packets. Holds the driver while waiting; tasks
  /// that share the driver should wait on [`crate::Session::wait_interrupt`]
  /// and call [`Bi041p::service_interrupt`] instead.
  pub async fn next_frame(&mut self) -> Result<Option<Frame>, Error<E>> {
    self.session.wait_interrupt().await;
    self.service_interrupt().await
  }

  /// Read and decode one packet.
  ///
  /// Interrupt delivery is re-armed when this returns, whether or not the
  /// read succeeded, and also when the future is dropped part way.
  pub async fn service_interrupt(&mut self) -> Result<Option<Frame>, Error<E>> {
    let session = self.session;
    let _rearm = session.rearm_on_drop();
    let _guard = session.lock().await;

    let mut raw = [0u8; EVENT_FRAME_LEN];
    self.recv_with_retry(&mut raw).await?;

    if self.config.debug {
      info!("BI041P: packet {:?}", raw);
    }

    match decode_event(raw) {
      Packet::Touch(frame) => Ok(Some(self.touchpad.process(&frame))),
      Packet::Hello => {
        info!("BI041P: received hello packet");
        Ok(None)
      }
      Packet::Unrecognized => {
        debug!("BI041P: dropping unrecognized packet header {:#x}", raw[0]);
        Ok(None)
      }
    }
  }
}
