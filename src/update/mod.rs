//! In-field firmware reflash over the in-system programming interface.
//!
//! One attempt walks `Authenticating → Erasing → Programming → FreqCalibration
//! → ResettingMcu`. A failure before programming ends the attempt at once.
//! A failure while programming stops the page loop but the attempt still
//! sends the calibration word, read from the image position reached, and
//! resets the MCU, so the controller is left in a resettable state. [`Bi041p::update_firmware`] retries failed attempts
//! up to 20 times with a reset pulse and a 5 s settle in between.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};
use embedded_io_async::Read;

use crate::cmd::*;
use crate::{Bi041p, Error};

mod calibration;
mod image;

pub use calibration::*;
pub use image::*;

use image::fill;

/// Pages stored in an image.
pub const TOTAL_PAGES: usize = 256;
/// Bytes per flash page.
pub const PAGE_SIZE: usize = 128;
/// Pages actually programmed; the upper half of the image is skipped.
pub const FLASHED_PAGES: usize = 0x80;
/// Update attempts before giving up.
pub const MAX_ATTEMPTS: u8 = 20;
/// Settle time after the reset pulse between attempts.
pub const RETRY_SETTLE_MS: u32 = 5000;

/// Position of an attempt in the programming sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
  Idle,
  Authenticating,
  Erasing,
  Programming(u8),
  FreqCalibration,
  ResettingMcu,
  Done,
  Failed,
}

/// Step that made an attempt fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Failure {
  Password,
  EraseCodeOption,
  MassErase,
  WriteCodeOption,
  WritePage { page: u8 },
  ReadCommand { page: u8 },
  ReadPage { page: u8 },
  /// A programmed page read back differently.
  VerifyMismatch { page: u8 },
  Calibration,
  ResetMcu,
}

/// Result of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
  Done,
  Failed(Failure),
}

/// Summary of a complete firmware update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateReport {
  /// Attempts used, including the last one.
  pub attempts: u8,
  /// Outcome of the last attempt.
  pub outcome: Outcome,
}

impl UpdateReport {
  pub const fn is_success(&self) -> bool {
    matches!(self.outcome, Outcome::Done)
  }
}

/// Bookkeeping for one attempt.
#[derive(Debug)]
struct UpdateSession {
  stage: Stage,
  failure: Option<Failure>,
}

impl UpdateSession {
  const fn new() -> Self {
    Self { stage: Stage::Idle, failure: None }
  }

  fn enter(&mut self, stage: Stage) {
    debug!("BI041P: update stage {:?}", stage);
    self.stage = stage;
  }

  /// Record a failure; the first one is kept.
  fn fail(&mut self, failure: Failure) {
    error!("BI041P: update step failed at {:?}: {:?}", self.stage, failure);
    self.failure.get_or_insert(failure);
  }

  fn finish(mut self) -> Outcome {
    match self.failure {
      None => {
        self.enter(Stage::Done);
        Outcome::Done
      }
      Some(failure) => {
        self.enter(Stage::Failed);
        Outcome::Failed(failure)
      }
    }
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
  /// Reflash the controller.
  ///
  /// Interrupt delivery is closed for the whole update. Soft failures (bus
  /// errors, verify mismatches) are retried up to [`MAX_ATTEMPTS`] times; an
  /// image that cannot be opened or read, or a failed panel probe when
  /// [`ImageSelection::MatchPanel`] is requested, stops immediately with an
  /// error. Once the update finishes the controller is reset and delivery is
  /// reopened if it answers with a hello packet.
  pub async fn update_firmware<S: FirmwareSource>(
    &mut self,
    source: &mut S,
    selection: ImageSelection,
  ) -> Result<UpdateReport, Error<E>> {
    self.session.disable();

    let mut attempts = 0;
    let result = loop {
      attempts += 1;
      match self.update_attempt(source, selection).await {
        Ok(Outcome::Done) => {
          info!("BI041P: firmware update success");
          break Ok(UpdateReport { attempts, outcome: Outcome::Done });
        }
        Ok(outcome) if attempts >= MAX_ATTEMPTS => {
          error!("BI041P: firmware update failed after {} attempts", attempts);
          break Ok(UpdateReport { attempts, outcome });
        }
        Ok(_) => {
          info!("BI041P: retry = {}, resetting controller", attempts);
          if let Err(err) = self.pulse_reset().await {
            break Err(err);
          }
          self.delay.delay_ms(RETRY_SETTLE_MS).await;
        }
        Err(err) => {
          error!("BI041P: not a bus stability issue, stop retrying");
          break Err(err);
        }
      }
    };

    self.resume_after_update().await;
    result
  }

  async fn resume_after_update(&mut self) {
    match self.reset().await {
      Ok(()) => {
        if self.firmware_version().await.is_err() {
          warn!("BI041P: firmware version probe failed after update");
        }
        self.session.enable();
      }
      Err(_) => warn!("BI041P: controller silent after update, interrupts stay disabled"),
    }
  }

  /// Run one attempt of the programming sequence.
  ///
  /// `Err` is returned only for hard errors that must not be retried.
  pub(crate) async fn update_attempt<S: FirmwareSource>(
    &mut self,
    source: &mut S,
    selection: ImageSelection,
  ) -> Result<Outcome, Error<E>> {
    let panel = match selection {
      ImageSelection::Default => None,
      ImageSelection::MatchPanel => Some(self.probe_panel().await?),
    };

    let mut image = match source.open(panel).await {
      Ok(image) => image,
      Err(_) => {
        error!("BI041P: open firmware image failed");
        return Err(Error::Image);
      }
    };
    info!("BI041P: start firmware update");

    self.session.set_updating(true);
    let result = self.program(&mut image).await;
    self.session.set_updating(false);
    self.session.set_progress(None);
    result
  }

  async fn program<R: Read>(&mut self, image: &mut R) -> Result<Outcome, Error<E>> {
    let mut run = UpdateSession::new();

    run.enter(Stage::Authenticating);
    if self.isp_send(&ISP_PASSWORD).await.is_err() {
      run.fail(Failure::Password);
      return Ok(run.finish());
    }
    self.delay.delay_ms(ISP_STEP_MS).await;

    run.enter(Stage::Erasing);
    let erase: [(&[u8], Failure); 3] = [
      (&ISP_ERASE_CODE_OPTION, Failure::EraseCodeOption),
      (&ISP_MASS_ERASE, Failure::MassErase),
      (&ISP_WRITE_CODE_OPTION, Failure::WriteCodeOption),
    ];
    for (cmd, failure) in erase {
      if self.isp_send(cmd).await.is_err() {
        run.fail(failure);
        return Ok(run.finish());
      }
      self.delay.delay_ms(ISP_STEP_MS).await;
    }

    let mut page = [0u8; PAGE_SIZE];
    for index in 0..TOTAL_PAGES {
      let n = fill::<_, E>(image, &mut page).await?;
      page[n..].fill(0xFF);

      // Upper pages are read only to reach the calibration block.
      if index >= FLASHED_PAGES {
        continue;
      }

      let index = index as u8;
      run.enter(Stage::Programming(index));
      self.session.set_progress(Some(index as u16));
      if let Err(failure) = self.program_page(index, &page).await {
        // The calibration block is then read from right after this page.
        run.fail(failure);
        break;
      }

      if self.config.page_delay_ms > 0 {
        self.delay.delay_ms(self.config.page_delay_ms).await;
      }
    }

    run.enter(Stage::FreqCalibration);
    let mut block = [0u8; CALIBRATION_BLOCK_LEN];
    if fill::<_, E>(image, &mut block).await? == CALIBRATION_BLOCK_LEN {
      let frame = calibration_frame(&block);
      info!("BI041P: calibration frame {:?}", frame);
      if self.isp_send(&frame).await.is_err() {
        run.fail(Failure::Calibration);
      }
    } else {
      warn!("BI041P: image has no calibration block, skipping");
    }

    run.enter(Stage::ResettingMcu);
    if self.isp_send(&ISP_RESET_MCU).await.is_err() {
      run.fail(Failure::ResetMcu);
    }

    Ok(run.finish())
  }

  /// Write one page, read it back and compare.
  async fn program_page(&mut self, index: u8, data: &[u8; PAGE_SIZE]) -> Result<(), Failure> {
    debug!("BI041P: page {}", index);

    let mut frame = [0u8; PAGE_SIZE + 2];
    frame[0] = IspOp::WritePage.into();
    frame[1] = index;
    frame[2..].copy_from_slice(data);
    self.isp_send(&frame).await.map_err(|_| Failure::WritePage { page: index })?;
    self.delay.delay_ms(PAGE_PROGRAM_MS).await;

    self
      .isp_send(&[IspOp::ReadPage.into(), index])
      .await
      .map_err(|_| Failure::ReadCommand { page: index })?;
    self.delay.delay_ms(ISP_STEP_MS).await;

    let mut readback = [0u8; PAGE_SIZE];
    self.isp_recv(&mut readback).await.map_err(|_| Failure::ReadPage { page: index })?;

    if readback != *data {
      return Err(Failure::VerifyMismatch { page: index });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use embassy_futures::block_on;

  use super::*;
  use crate::mock::*;

  const IMAGE_LEN: usize = TOTAL_PAGES * PAGE_SIZE + CALIBRATION_BLOCK_LEN;

  fn image() -> std::vec::Vec<u8> {
    let mut data: std::vec::Vec<u8> = (0..IMAGE_LEN).map(|i| (i % 251) as u8).collect();
    // Calibration block: only bit 0 (offset 0x1F) set.
    let tail = TOTAL_PAGES * PAGE_SIZE;
    data[tail..].fill(0);
    data[tail + 0x1F] = 0x01;
    data
  }

  fn isp_frames(bus: &MockBus) -> std::vec::Vec<std::vec::Vec<u8>> {
    bus.writes.iter().filter(|(addr, _)| *addr == ISP_ADDR).map(|(_, f)| f.clone()).collect()
  }

  #[test]
  fn full_attempt_programs_lower_half_only() {
    let session = session();
    let mut dev = driver(&session, MockBus::new());
    let mut source = SliceSource::new(image());

    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(!session.is_updating());

    let (bus, ..) = dev.release();
    let frames = isp_frames(&bus);
    assert_eq!(frames[0], [0x00, 0x9C, 0xA5]);
    assert_eq!(frames[1], [0x08]);
    assert_eq!(frames[2], [0x04]);
    assert_eq!(frames[3], [0x01, 0xFF, 0xFF, 0xFF, 0xFF]);

    let writes: std::vec::Vec<_> = frames.iter().filter(|f| f[0] == 0x02).collect();
    assert_eq!(writes.len(), FLASHED_PAGES);
    assert!(writes.iter().all(|f| f.len() == PAGE_SIZE + 2 && (f[1] as usize) < FLASHED_PAGES));
    assert_eq!(bus.page_writes(), FLASHED_PAGES);

    let data = image();
    assert_eq!(&bus.flash_page(5)[..], &data[5 * PAGE_SIZE..6 * PAGE_SIZE]);

    assert_eq!(frames[frames.len() - 2], [0x01, 0xE0, 0x00, 0x00, 0x01]);
    assert_eq!(frames[frames.len() - 1], [0x09]);
  }

  #[test]
  fn short_image_is_padded_and_skips_calibration() {
    let session = session();
    let mut dev = driver(&session, MockBus::new());
    let mut source = SliceSource::new(std::vec![0x11; PAGE_SIZE + 10]);

    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(outcome, Outcome::Done);

    let (bus, ..) = dev.release();
    let page1 = bus.flash_page(1);
    assert!(page1[..10].iter().all(|&b| b == 0x11));
    assert!(page1[10..].iter().all(|&b| b == 0xFF));
    assert!(bus.flash_page(2).iter().all(|&b| b == 0xFF));

    let frames = isp_frames(&bus);
    assert_eq!(frames[frames.len() - 1], [0x09]);
    assert_ne!(frames[frames.len() - 2][0], 0x01);
  }

  #[test]
  fn verify_mismatch_still_calibrates_and_resets() {
    let session = session();
    let mut bus = MockBus::new();
    bus.corrupt_page = Some(3);
    let mut dev = driver(&session, bus);
    let mut data = image();
    data[4 * PAGE_SIZE..4 * PAGE_SIZE + CALIBRATION_BLOCK_LEN].fill(0xFF);
    let mut source = SliceSource::new(data);

    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(outcome, Outcome::Failed(Failure::VerifyMismatch { page: 3 }));

    let (bus, ..) = dev.release();
    assert_eq!(bus.page_writes(), 4);
    let frames = isp_frames(&bus);
    // Calibration is read from the bytes following the failed page.
    assert_eq!(frames[frames.len() - 2], [0x01, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert_eq!(frames[frames.len() - 1], [0x09]);
  }

  #[test]
  fn password_failure_ends_attempt_immediately() {
    let session = session();
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x00, 0x9C]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());

    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(outcome, Outcome::Failed(Failure::Password));

    let (bus, ..) = dev.release();
    assert_eq!(isp_frames(&bus).len(), 1);
  }

  #[test]
  fn unopenable_image_stops_all_retries() {
    let session = session();
    let mut bus = MockBus::new();
    bus.reply(&[0x55; 4]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());
    source.fail_open = true;

    let result = block_on(dev.update_firmware(&mut source, ImageSelection::Default));
    assert_eq!(result, Err(Error::Image));
    assert_eq!(source.opened.len(), 1);
  }

  #[test]
  fn soft_failures_retry_with_reset_and_settle() {
    let session = session();
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x04]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());

    let report = block_on(dev.update_firmware(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(report.attempts, MAX_ATTEMPTS);
    assert_eq!(report.outcome, Outcome::Failed(Failure::MassErase));
    assert!(!report.is_success());
    assert_eq!(source.opened.len(), MAX_ATTEMPTS as usize);
    // Controller never said hello afterwards, delivery stays closed.
    assert!(!session.is_enabled());

    let (_, rst, _, delay) = dev.release();
    // One pulse between each attempt plus the final handshake pulse.
    assert_eq!(rst.pulses(), MAX_ATTEMPTS as usize);
    assert!(delay.elapsed_ms() >= (MAX_ATTEMPTS as u64 - 1) * RETRY_SETTLE_MS as u64);
  }

  #[test]
  fn successful_update_hands_back_to_handshake() {
    let session = session();
    let mut bus = MockBus::new();
    bus.reply(&[0x55; 4]);
    bus.reply(&[0x52, 0x01, 0x23, 0x00]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());

    let report = block_on(dev.update_firmware(&mut source, ImageSelection::Default)).unwrap();
    assert_eq!(report, UpdateReport { attempts: 1, outcome: Outcome::Done });
    assert!(session.is_enabled());
    assert_eq!(dev.cached_firmware_version().map(|v| v.as_number()), Some(1848));
  }

  #[test]
  fn panel_matched_image_probes_vendor() {
    let session = session();
    let mut bus = MockBus::new();
    bus.reply(&[0x52, 0x00, 0x00, 0x11]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());

    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::MatchPanel)).unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(source.opened, [Some(crate::Panel::Wintek)]);
  }

  #[test]
  fn failed_panel_probe_is_a_hard_error() {
    let session = session();
    let mut bus = MockBus::new();
    bus.reply(&[0x00, 0x00, 0x00, 0x11]);
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());

    let result = block_on(dev.update_attempt(&mut source, ImageSelection::MatchPanel));
    assert_eq!(result, Err(Error::Protocol(0x00)));
    assert!(source.opened.is_empty());
  }

  fn failed_attempt(bus: MockBus) -> (Outcome, MockBus) {
    let session = session();
    let mut dev = driver(&session, bus);
    let mut source = SliceSource::new(image());
    let outcome = block_on(dev.update_attempt(&mut source, ImageSelection::Default)).unwrap();
    let (bus, ..) = dev.release();
    (outcome, bus)
  }

  #[test]
  fn page_write_failure_stops_programming() {
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x02]);
    let (outcome, bus) = failed_attempt(bus);

    assert_eq!(outcome, Outcome::Failed(Failure::WritePage { page: 0 }));
    assert_eq!(bus.page_writes(), 1);
    let frames = isp_frames(&bus);
    assert_eq!(frames[frames.len() - 2].len(), CALIBRATION_FRAME_LEN);
    assert_eq!(frames[frames.len() - 1], [0x09]);
  }

  #[test]
  fn read_command_failure_stops_programming() {
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x05]);
    let (outcome, bus) = failed_attempt(bus);

    assert_eq!(outcome, Outcome::Failed(Failure::ReadCommand { page: 0 }));
    assert_eq!(bus.page_writes(), 1);
    assert!(bus.reads.is_empty());
    assert_eq!(isp_frames(&bus).last(), Some(&std::vec![0x09]));
  }

  #[test]
  fn page_read_failure_stops_programming() {
    let mut bus = MockBus::new();
    bus.fail_page_reads = true;
    let (outcome, bus) = failed_attempt(bus);

    assert_eq!(outcome, Outcome::Failed(Failure::ReadPage { page: 0 }));
    assert_eq!(bus.page_writes(), 1);
    assert_eq!(isp_frames(&bus).last(), Some(&std::vec![0x09]));
  }

  #[test]
  fn calibration_failure_still_resets_mcu() {
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x01, 0xE0]);
    let (outcome, bus) = failed_attempt(bus);

    assert_eq!(outcome, Outcome::Failed(Failure::Calibration));
    assert_eq!(bus.page_writes(), FLASHED_PAGES);
    let frames = isp_frames(&bus);
    assert_eq!(frames[frames.len() - 2], [0x01, 0xE0, 0x00, 0x00, 0x01]);
    assert_eq!(frames[frames.len() - 1], [0x09]);
  }

  #[test]
  fn mcu_reset_failure_is_recorded() {
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x09]);
    let (outcome, bus) = failed_attempt(bus);

    assert_eq!(outcome, Outcome::Failed(Failure::ResetMcu));
    let frames = isp_frames(&bus);
    assert_eq!(frames[frames.len() - 2], [0x01, 0xE0, 0x00, 0x00, 0x01]);
    assert_eq!(frames[frames.len() - 1], [0x09]);
  }

  #[test]
  fn reset_line_fault_still_runs_handshake() {
    let session = session();
    let mut bus = MockBus::new();
    bus.fail_writes_starting_with(&[0x04]);
    let mut dev = driver(&session, bus);
    dev.rst.broken = true;
    let mut source = SliceSource::new(image());

    let result = block_on(dev.update_firmware(&mut source, ImageSelection::Default));
    assert_eq!(result, Err(Error::Pin));
    assert_eq!(source.opened.len(), 1);

    let (_, rst, ..) = dev.release();
    // Retry pulse, then the handshake pulse after the update.
    assert_eq!(rst.history, [true, true]);
  }
}
