//! Frequency calibration word carried at the tail of the firmware image.

use crate::cmd::IspOp;

/// Size of the calibration block following the program pages.
pub const CALIBRATION_BLOCK_LEN: usize = 0x1A4;
/// Size of the frame sent to the programmer.
pub const CALIBRATION_FRAME_LEN: usize = 5;

/// Bits 31..29 of the calibration word are always set.
const WORD_PREFIX: u32 = 0xE000_0000;

/// `(byte_offset, bit_index, destination_bit)` for every bit of the word.
const BIT_MAP: [(usize, u8, u8); 29] = [
  (0x1A3, 0, 28),
  (0x195, 0, 27),
  (0x186, 0, 26),
  (0x178, 0, 25),
  (0x16A, 0, 24),
  (0x15C, 0, 23),
  (0x14E, 0, 22),
  (0x140, 0, 21),
  (0x132, 0, 20),
  (0x124, 0, 19),
  (0x116, 0, 18),
  (0x108, 0, 17),
  (0x0F8, 0, 16),
  (0x0E8, 0, 15),
  (0x0DA, 0, 14),
  (0x0CC, 0, 13),
  (0x0BE, 0, 12),
  (0x0B0, 0, 11),
  (0x0A2, 0, 10),
  (0x094, 0, 9),
  (0x087, 0, 8),
  (0x07A, 0, 7),
  (0x06D, 0, 6),
  (0x060, 0, 5),
  (0x053, 0, 4),
  (0x046, 0, 3),
  (0x039, 0, 2),
  (0x02C, 0, 1),
  (0x01F, 0, 0),
];

/// Build the calibration frame: the write-frequency opcode followed by the
/// big-endian calibration word.
pub fn calibration_frame(block: &[u8; CALIBRATION_BLOCK_LEN]) -> [u8; CALIBRATION_FRAME_LEN] {
  let word = BIT_MAP.iter().fold(WORD_PREFIX, |word, &(offset, bit, dest)| {
    word | ((((block[offset] >> bit) & 0x01) as u32) << dest)
  });

  let mut frame = [0u8; CALIBRATION_FRAME_LEN];
  frame[0] = IspOp::WriteFreq.into();
  frame[1..].copy_from_slice(&word.to_be_bytes());
  frame
}
