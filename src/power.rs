use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::CMD_SUSPEND;
use crate::{Bi041p, Error};

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  RST: OutputPin,
  RDY: InputPin,
  D: DelayNs,
{
  /// Close interrupt delivery and put the controller to sleep.
  ///
  /// Ignored while a firmware update owns the controller.
  pub async fn enter_low_power(&mut self) -> Result<(), Error<E>> {
    let session = self.session;
    if session.is_updating() {
      info!("BI041P: firmware update mode, ignoring suspend");
      return Ok(());
    }

    let _guard = session.lock().await;
    session.disable();
    self.send(&CMD_SUSPEND).await
  }

  /// Wake the controller with a reset handshake and reopen interrupt
  /// delivery once it has said hello.
  ///
  /// Ignored while a firmware update owns the controller.
  pub async fn leave_low_power(&mut self) -> Result<(), Error<E>> {
    let session = self.session;
    if session.is_updating() {
      info!("BI041P: firmware update mode, ignoring resume");
      return Ok(());
    }

    let _guard = session.lock().await;
    self.reset().await?;
    session.enable();
    Ok(())
  }
}
