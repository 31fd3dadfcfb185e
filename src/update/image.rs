use embedded_io_async::Read;

use crate::{Error, Panel};

/// Which image the firmware source should hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageSelection {
  /// The single image the source provides.
  Default,
  /// Probe the panel vendor first and ask for the image built for it.
  MatchPanel,
}

/// Storage collaborator holding firmware images.
///
/// An image is a flat byte stream: 256 pages of 128 bytes followed by the
/// 420-byte calibration block. A zero-length read marks the end of the
/// image.
#[allow(async_fn_in_trait)]
pub trait FirmwareSource {
  type Image<'a>: Read
  where
    Self: 'a;
  type Error: core::fmt::Debug;

  /// Open an image. `panel` is `Some` when a panel-specific image was
  /// requested.
  async fn open(&mut self, panel: Option<Panel>) -> Result<Self::Image<'_>, Self::Error>;
}

/// Read until `buf` is full or the image ends. Returns the bytes read.
pub(crate) async fn fill<R: Read, E>(image: &mut R, buf: &mut [u8]) -> Result<usize, Error<E>> {
  let mut filled = 0;
  while filled < buf.len() {
    let n = image.read(&mut buf[filled..]).await.map_err(|_| Error::Image)?;
    if n == 0 {
      break;
    }
    filled += n;
  }
  Ok(filled)
}
