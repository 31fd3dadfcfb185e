use crate::cmd::ISP_ADDR;
use crate::event::HwRevision;

/// Upper edge of the panel Y axis; reported Y values are mirrored against it.
pub const DEFAULT_AXIS_MAX_Y: u16 = 1088;
/// Pause after each verified firmware page.
pub const DEFAULT_PAGE_DELAY_MS: u32 = 100;
/// Noise monitor iterations used until a caller asks for another count.
pub const DEFAULT_NOISE_SAMPLES: u16 = 150;

/// How touch contacts are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportMode {
  /// Two contact slots with touch major, multi-touch protocol style.
  MultiTouch,
  /// A single pointer with pressure and a touch button, used by factory
  /// test images.
  SingleTouch,
}

/// Static driver configuration.
///
/// Construct it with [`Config::new`] and adjust it with the `with_*`
/// helpers before handing it to [`crate::Bi041p::new`].
///
/// # Example
/// ```no_run
/// use bi041p::{Config, HwRevision, ReportMode};
///
/// let config = Config::new(0x10)
///   .with_revision(HwRevision::Rev1)
///   .with_report_mode(ReportMode::MultiTouch)
///   .with_page_delay_ms(50);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
  /// 7-bit bus address of the controller in normal mode (board dependent).
  pub address: u8,
  /// 7-bit bus address of the in-system programming interface.
  pub isp_address: u8,
  /// Board revision, selects the virtual-key layout.
  pub revision: HwRevision,
  pub axis_max_y: u16,
  pub report_mode: ReportMode,
  pub page_delay_ms: u32,
  pub noise_samples: u16,
  /// Log every received packet.
  pub debug: bool,
}

impl Config {
  pub const fn new(address: u8) -> Self {
    Self {
      address,
      isp_address: ISP_ADDR,
      revision: HwRevision::Other,
      axis_max_y: DEFAULT_AXIS_MAX_Y,
      report_mode: ReportMode::MultiTouch,
      page_delay_ms: DEFAULT_PAGE_DELAY_MS,
      noise_samples: DEFAULT_NOISE_SAMPLES,
      debug: false,
    }
  }

  pub const fn with_isp_address(mut self, isp_address: u8) -> Self {
    self.isp_address = isp_address;
    self
  }

  pub const fn with_revision(mut self, revision: HwRevision) -> Self {
    self.revision = revision;
    self
  }

  pub const fn with_axis_max_y(mut self, axis_max_y: u16) -> Self {
    self.axis_max_y = axis_max_y;
    self
  }

  pub const fn with_report_mode(mut self, report_mode: ReportMode) -> Self {
    self.report_mode = report_mode;
    self
  }

  pub const fn with_page_delay_ms(mut self, page_delay_ms: u32) -> Self {
    self.page_delay_ms = page_delay_ms;
    self
  }

  /// Noise monitor iteration count, clamped to [`crate::MAX_NOISE_SAMPLES`].
  pub const fn with_noise_samples(mut self, samples: u16) -> Self {
    self.noise_samples = if samples > crate::MAX_NOISE_SAMPLES { crate::MAX_NOISE_SAMPLES } else { samples };
    self
  }

  pub const fn with_debug(mut self, debug: bool) -> Self {
    self.debug = debug;
    self
  }
}
