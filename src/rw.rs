use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::PROBE_SETTLE_MS;
use crate::{Bi041p, Error};

/// Extra attempts granted to a receive after the first failed transaction.
pub(crate) const RECV_RETRIES: u8 = 3;

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
{
  /// Send one frame to the controller in a single write transaction.
  pub(crate) async fn send(&mut self, frame: &[u8]) -> Result<(), Error<E>> {
    self.i2c.write(self.config.address, frame).await.map_err(Error::I2c)
  }

  /// Fill `buf` from the controller in a single read transaction.
  pub(crate) async fn recv(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.i2c.read(self.config.address, buf).await.map_err(Error::I2c)
  }

  /// Receive with up to [`RECV_RETRIES`] additional attempts.
  ///
  /// Only the handshake poll and the interrupt decode path retry; every
  /// other caller treats a single failure as the request failing.
  pub(crate) async fn recv_with_retry(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
    let mut retry = 0;
    loop {
      match self.recv(buf).await {
        Ok(()) => return Ok(()),
        Err(err) if retry >= RECV_RETRIES => return Err(err),
        Err(_) => {
          retry += 1;
          warn!("BI041P: receive failed, retry = {}", retry);
        }
      }
    }
  }

  /// Send a 4-byte command, let the controller prepare its answer, read it back.
  pub(crate) async fn exchange(&mut self, cmd: &[u8; 4]) -> Result<[u8; 4], Error<E>>
  where
    D: DelayNs,
  {
    self.send(cmd).await?;
    self.delay.delay_ms(PROBE_SETTLE_MS).await;
    let mut resp = [0u8; 4];
    self.recv(&mut resp).await?;
    Ok(resp)
  }

  // In-system programming interface
  pub(crate) async fn isp_send(&mut self, frame: &[u8]) -> Result<(), Error<E>> {
    self.i2c.write(self.config.isp_address, frame).await.map_err(Error::I2c)
  }

  pub(crate) async fn isp_recv(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
    self.i2c.read(self.config.isp_address, buf).await.map_err(Error::I2c)
  }
}
