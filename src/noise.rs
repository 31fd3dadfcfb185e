use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::{CMD_ADC_MODE, CMD_ADC_SAMPLE, CMD_ENTER_TEST, CMD_EXIT_TEST};
use crate::{Bi041p, Error};

/// Upper bound on the sample count of a noise run.
pub const MAX_NOISE_SAMPLES: u16 = 500;

const ADC_CHANNELS: usize = 11;
const SAMPLE_LEN: usize = 12;

const ENTER_TEST_MS: u32 = 1;
const ADC_SETTLE_MS: u32 = 100;
const SAMPLE_READY_MS: u32 = 1;
const SAMPLE_PACE_MS: u32 = 30;

/// Running per-channel maximum of the X-axis ADC readings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct NoisePeaks([u8; ADC_CHANNELS]);

impl NoisePeaks {
  fn update(&mut self, sample: &[u8; SAMPLE_LEN]) {
    for (peak, &value) in self.0.iter_mut().zip(sample.iter()) {
      *peak = (*peak).max(value);
    }
  }

  /// Integer mean of the channel maxima.
  fn average(&self) -> u8 {
    let sum: u16 = self.0.iter().map(|&v| v as u16).sum();
    (sum / ADC_CHANNELS as u16) as u8
  }
}

impl<'s, M, I, E, RST, RDY, D> Bi041p<'s, M, I, RST, RDY, D>
where
  M: RawMutex,
  I: I2c<SevenBitAddress, Error = E>,
  D: DelayNs,
{
  /// Run the ADC noise diagnostic over `samples` readings and return the mean
  /// of the per-channel peaks.
  ///
  /// The count is clamped to [`MAX_NOISE_SAMPLES`] and kept in the
  /// configuration. Interrupt delivery is closed while the controller is in
  /// test mode. Bus failures while entering test mode or sampling are logged
  /// and the run continues; the exit-test command is always sent and only its
  /// failure is returned.
  pub async fn noise_monitor(&mut self, samples: u16) -> Result<u8, Error<E>> {
    self.config = self.config.with_noise_samples(samples);
    let samples = self.config.noise_samples;
    info!("BI041P: noise test times = {}", samples);

    let was_enabled = self.session.disable();
    let result = self.sample_noise(samples).await;
    if was_enabled {
      self.session.enable();
    }
    result
  }

  async fn sample_noise(&mut self, samples: u16) -> Result<u8, Error<E>> {
    if self.send(&CMD_ENTER_TEST).await.is_err() {
      error!("BI041P: enter test mode failed");
    }
    self.delay.delay_ms(ENTER_TEST_MS).await;

    if self.send(&CMD_ADC_MODE).await.is_err() {
      error!("BI041P: switch ADC mode failed");
    }
    self.delay.delay_ms(ADC_SETTLE_MS).await;

    let mut peaks = NoisePeaks::default();
    for _ in 0..samples {
      if self.send(&CMD_ADC_SAMPLE).await.is_err() {
        error!("BI041P: ADC sample request failed");
      }
      self.delay.delay_ms(SAMPLE_READY_MS).await;

      let mut sample = [0u8; SAMPLE_LEN];
      match self.recv(&mut sample).await {
        Ok(()) => {
          peaks.update(&sample);
          debug!("BI041P: adc {:?} max {:?}", sample, peaks.0);
        }
        Err(_) => error!("BI041P: ADC sample read failed"),
      }
      self.delay.delay_ms(SAMPLE_PACE_MS).await;
    }

    let average = peaks.average();
    info!("BI041P: avg_adc = {}", average);

    let exit = self.send(&CMD_EXIT_TEST).await;
    self.delay.delay_ms(ENTER_TEST_MS).await;
    if exit.is_err() {
      error!("BI041P: exit test mode failed");
    }
    exit.map(|()| average)
  }
}
