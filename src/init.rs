use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::{HELLO_POLL_MS, PACKET_HELLO, RESET_PULSE_MS};
use crate::{Bi041p, Error};

/// Ready-pin polls granted to the controller to announce itself after reset.
pub(crate) const HELLO_POLLS: u8 = 100;

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  RST: OutputPin,
  RDY: InputPin,
  D: DelayNs,
{
  /// Reset the controller and wait for its hello packet.
  ///
  /// The ready pin is polled every 10 ms; whenever it is low a 4-byte packet
  /// is read (with the transport's receive retry). Gives up with
  /// [`Error::HandshakeTimeout`] after 100 polls.
  pub async fn reset(&mut self) -> Result<(), Error<E>> {
    self.pulse_reset().await?;

    for poll in 1..=HELLO_POLLS {
      if self.rdy.is_low().map_err(|_| Error::Pin)? {
        let mut pkt = [0u8; 4];
        match self.recv_with_retry(&mut pkt).await {
          Ok(()) if pkt == PACKET_HELLO => {
            debug!("BI041P: hello after {} polls", poll);
            return Ok(());
          }
          Ok(()) => debug!("BI041P: waiting for hello, got {:?}", pkt),
          Err(_) => warn!("BI041P: hello read failed on poll {}", poll),
        }
      }
      self.delay.delay_ms(HELLO_POLL_MS).await;
    }

    error!("BI041P: receive hello packet timeout");
    Err(Error::HandshakeTimeout)
  }

  /// Pulse the reset line high for 1 ms.
  pub(crate) async fn pulse_reset(&mut self) -> Result<(), Error<E>> {
    self.rst.set_high().map_err(|_| Error::Pin)?;
    self.delay.delay_ms(RESET_PULSE_MS).await;
    self.rst.set_low().map_err(|_| Error::Pin)
  }
}
