/******************************************************************************
 * ========================================================================== *
 *                     BI041P - Command frames & ISP opcodes                  *
 *******************************************************************************/

/// Bus address of the in-system programming (boot loader) interface.
pub(crate) const ISP_ADDR: u8 = 0x77;

// Packet markers
pub(crate) const PACKET_TOUCH: u8 = 0x5A;
pub(crate) const PACKET_HELLO: [u8; 4] = [0x55; 4];
pub(crate) const RESPONSE_ACK: u8 = 0x52;
pub(crate) const PANEL_WINTEK: u8 = 0x11;

// Normal-mode commands (4-byte frames)
pub(crate) const CMD_FW_VERSION: [u8; 4] = [0x53, 0x00, 0x00, 0x01];
pub(crate) const CMD_PANEL_VERSION: [u8; 4] = [0x53, 0xF0, 0x00, 0x01];
pub(crate) const CMD_SUSPEND: [u8; 4] = [0x54, 0x50, 0x00, 0x01];
pub(crate) const CMD_ENTER_TEST: [u8; 4] = [0x55; 4];
pub(crate) const CMD_ADC_MODE: [u8; 4] = [0x54, 0x9D, 0x01, 0x01];
pub(crate) const CMD_ADC_SAMPLE: [u8; 4] = [0x57, 0x31, 0xFF, 0xFF];
pub(crate) const CMD_EXIT_TEST: [u8; 4] = [0xA5; 4];

// ISP commands
pub(crate) const ISP_PASSWORD: [u8; 3] = [0x00, 0x9C, 0xA5];
pub(crate) const ISP_ERASE_CODE_OPTION: [u8; 1] = [0x08];
pub(crate) const ISP_MASS_ERASE: [u8; 1] = [0x04];
pub(crate) const ISP_WRITE_CODE_OPTION: [u8; 5] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF];
pub(crate) const ISP_RESET_MCU: [u8; 1] = [0x09];

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IspOp {
  WriteFreq = 0x01,
  WritePage = 0x02,
  ReadPage = 0x05,
}

impl From<IspOp> for u8 {
  #[inline]
  fn from(op: IspOp) -> Self {
    op as u8
  }
}

// Protocol timings (milliseconds)
pub(crate) const PROBE_SETTLE_MS: u32 = 20;
pub(crate) const RESET_PULSE_MS: u32 = 1;
pub(crate) const HELLO_POLL_MS: u32 = 10;
pub(crate) const ISP_STEP_MS: u32 = 1;
pub(crate) const PAGE_PROGRAM_MS: u32 = 100;
