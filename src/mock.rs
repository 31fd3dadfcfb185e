//! Scripted bus, pin and delay doubles shared by the unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embedded_hal::digital::{ErrorKind as PinErrorKind, ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::{I2c, SevenBitAddress};

use crate::cmd::{IspOp, ISP_ADDR};
use crate::update::{FirmwareSource, PAGE_SIZE, TOTAL_PAGES};
use crate::{Bi041p, Config, Panel, Session};

pub const TOUCH_ADDR: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusFault;

impl embedded_hal::i2c::Error for BusFault {
  fn kind(&self) -> ErrorKind {
    ErrorKind::Other
  }
}

/// I²C double. Reads from the touch address are served from a reply queue
/// (zeros once it runs dry); the programming address is backed by a
/// simulated flash array.
pub struct MockBus {
  pub writes: Vec<(u8, Vec<u8>)>,
  /// Address of every read transaction, in order.
  pub reads: Vec<u8>,
  /// Flip a bit in this page when it is read back.
  pub corrupt_page: Option<u8>,
  /// Every read from the programming address fails.
  pub fail_page_reads: bool,
  /// Transactions never complete.
  pub stall: bool,
  replies: VecDeque<Result<Vec<u8>, BusFault>>,
  flash: Vec<[u8; PAGE_SIZE]>,
  selected: Option<u8>,
  fail_prefix: Option<Vec<u8>>,
}

impl MockBus {
  pub fn new() -> Self {
    Self {
      writes: Vec::new(),
      reads: Vec::new(),
      corrupt_page: None,
      fail_page_reads: false,
      stall: false,
      replies: VecDeque::new(),
      flash: std::vec![[0xFF; PAGE_SIZE]; TOTAL_PAGES],
      selected: None,
      fail_prefix: None,
    }
  }

  pub fn reply(&mut self, data: &[u8]) {
    self.replies.push_back(Ok(data.to_vec()));
  }

  pub fn fault(&mut self) {
    self.replies.push_back(Err(BusFault));
  }

  /// Every write whose payload starts with `prefix` fails.
  pub fn fail_writes_starting_with(&mut self, prefix: &[u8]) {
    self.fail_prefix = Some(prefix.to_vec());
  }

  /// Page programming frames seen on the programming address.
  pub fn page_writes(&self) -> usize {
    let op: u8 = IspOp::WritePage.into();
    self.writes.iter().filter(|(addr, f)| *addr == ISP_ADDR && f.first() == Some(&op)).count()
  }

  pub fn flash_page(&self, page: u8) -> [u8; PAGE_SIZE] {
    self.flash[page as usize]
  }

  fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusFault> {
    self.writes.push((address, bytes.to_vec()));
    if let Some(prefix) = &self.fail_prefix {
      if bytes.starts_with(prefix) {
        return Err(BusFault);
      }
    }

    if address == ISP_ADDR {
      let (write_page, read_page) = (u8::from(IspOp::WritePage), u8::from(IspOp::ReadPage));
      match bytes {
        [op, page, data @ ..] if *op == write_page && data.len() == PAGE_SIZE => {
          self.flash[*page as usize].copy_from_slice(data);
        }
        [op, page] if *op == read_page => self.selected = Some(*page),
        _ => {}
      }
    }
    Ok(())
  }

  fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusFault> {
    self.reads.push(address);

    if address == ISP_ADDR {
      if self.fail_page_reads {
        return Err(BusFault);
      }
      let page = self.selected.take().unwrap_or(0);
      let data = self.flash[page as usize];
      let n = buf.len().min(PAGE_SIZE);
      buf[..n].copy_from_slice(&data[..n]);
      if self.corrupt_page == Some(page) {
        buf[0] ^= 0x01;
      }
      return Ok(());
    }

    buf.fill(0);
    match self.replies.pop_front() {
      Some(Ok(data)) => {
        let n = buf.len().min(data.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(())
      }
      Some(Err(fault)) => Err(fault),
      None => Ok(()),
    }
  }
}

impl ErrorType for MockBus {
  type Error = BusFault;
}

impl I2c<SevenBitAddress> for MockBus {
  async fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
    if self.stall {
      core::future::pending::<()>().await;
    }
    for op in operations {
      match op {
        Operation::Write(bytes) => self.write(address, bytes)?,
        Operation::Read(buf) => self.read(address, buf)?,
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinFault;

impl embedded_hal::digital::Error for PinFault {
  fn kind(&self) -> PinErrorKind {
    PinErrorKind::Other
  }
}

/// Output and input pin double. `history` records every level driven,
/// including attempts on a broken pin.
pub struct MockPin {
  pub low: bool,
  pub broken: bool,
  pub history: Vec<bool>,
}

impl MockPin {
  pub fn new(low: bool) -> Self {
    Self { low, broken: false, history: Vec::new() }
  }

  fn drive(&mut self, high: bool) -> Result<(), PinFault> {
    self.history.push(high);
    if self.broken {
      return Err(PinFault);
    }
    self.low = !high;
    Ok(())
  }

  /// Rising edges driven on the pin.
  pub fn pulses(&self) -> usize {
    self.history.iter().filter(|&&high| high).count()
  }
}

impl PinErrorType for MockPin {
  type Error = PinFault;
}

impl OutputPin for MockPin {
  fn set_low(&mut self) -> Result<(), Self::Error> {
    self.drive(false)
  }

  fn set_high(&mut self) -> Result<(), Self::Error> {
    self.drive(true)
  }
}

impl InputPin for MockPin {
  fn is_high(&mut self) -> Result<bool, Self::Error> {
    Ok(!self.low)
  }

  fn is_low(&mut self) -> Result<bool, Self::Error> {
    Ok(self.low)
  }
}

/// Delay double that only accumulates the requested time.
#[derive(Default)]
pub struct MockDelay {
  elapsed_ns: u64,
}

impl MockDelay {
  pub fn elapsed_ms(&self) -> u64 {
    self.elapsed_ns / 1_000_000
  }
}

impl DelayNs for MockDelay {
  async fn delay_ns(&mut self, ns: u32) {
    self.elapsed_ns += ns as u64;
  }

  async fn delay_ms(&mut self, ms: u32) {
    self.elapsed_ns += ms as u64 * 1_000_000;
  }
}

pub type TestDriver<'s> = Bi041p<'s, NoopRawMutex, MockBus, MockPin, MockPin, MockDelay>;

pub fn session() -> Session<NoopRawMutex> {
  Session::new()
}

/// Driver whose ready pin is asserted.
pub fn driver(session: &Session<NoopRawMutex>, bus: MockBus) -> TestDriver<'_> {
  driver_with_ready(session, bus, true)
}

pub fn driver_with_ready(session: &Session<NoopRawMutex>, bus: MockBus, ready_low: bool) -> TestDriver<'_> {
  let config = Config::new(TOUCH_ADDR);
  Bi041p::new(bus, MockPin::new(false), MockPin::new(ready_low), MockDelay::default(), session, config)
}

/// Firmware source serving one in-memory image.
pub struct SliceSource {
  data: Vec<u8>,
  pub fail_open: bool,
  /// Panel argument of every `open` call.
  pub opened: Vec<Option<Panel>>,
}

impl SliceSource {
  pub fn new(data: Vec<u8>) -> Self {
    Self { data, fail_open: false, opened: Vec::new() }
  }
}

impl FirmwareSource for SliceSource {
  type Image<'a> = &'a [u8];
  type Error = ();

  async fn open(&mut self, panel: Option<Panel>) -> Result<Self::Image<'_>, Self::Error> {
    self.opened.push(panel);
    if self.fail_open {
      return Err(());
    }
    Ok(self.data.as_slice())
  }
}
