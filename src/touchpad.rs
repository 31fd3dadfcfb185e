//! Touch / virtual-key state machine turning event packets into input
//! events.
//!
//! The controller reports finger contacts and the capacitive buttons in the
//! same packet. Downstream input stacks must never see a finger and a button
//! active at the same time, so the state machine enforces:
//!
//! - **One button at a time**: the first button claimed stays pressed until
//!   the controller reports an empty key mask; other buttons are ignored in
//!   the meantime.
//! - **Keys beat touch**: before a button press is reported, an active
//!   contact is lifted with a synthetic zero-major report.
//! - **Touch waits for keys**: contact data is dropped while a button is held.
//!
//! Every packet produces one [`Frame`], the batch of events that must be
//! delivered to observers atomically.

use heapless::Vec;

use crate::event::{EventFrame, HwRevision, Point, VirtualKey};
use crate::ReportMode;

/// Touch major reported for a finger in contact.
pub const MAJOR_TOUCHING: u8 = 255;

/// Most events a single packet can produce: two contact slots, or a lift
/// followed by a key press.
pub const MAX_FRAME_EVENTS: usize = 2;

/// Identifies which controller contact slot produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ContactSlot {
  Primary,
  Secondary,
}

impl ContactSlot {
  pub const fn is_primary(self) -> bool {
    matches!(self, ContactSlot::Primary)
  }

  pub const fn is_secondary(self) -> bool {
    matches!(self, ContactSlot::Secondary)
  }
}

/// Multi-touch contact report.
///
/// A `major` of 0 lifts the contact. The synthetic lift sent ahead of a key
/// press carries no position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Contact {
  pub slot: ContactSlot,
  pub major: u8,
  pub point: Option<Point>,
}

impl Contact {
  pub const fn new(slot: ContactSlot, major: u8, point: Option<Point>) -> Self {
    Self { slot, major, point }
  }

  pub const fn lift() -> Self {
    Self::new(ContactSlot::Primary, 0, None)
  }

  pub const fn is_touching(&self) -> bool {
    self.major != 0
  }
}

/// One input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
  Contact(Contact),
  /// Single-touch report: absolute position, pressure and touch button.
  Pointer { point: Option<Point>, pressure: u8, touching: bool },
  Key { key: VirtualKey, pressed: bool },
}

impl InputEvent {
  pub const fn is_key(&self) -> bool {
    matches!(self, InputEvent::Key { .. })
  }
}

/// Events produced by a single packet, delivered as one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
  events: Vec<InputEvent, MAX_FRAME_EVENTS>,
}

impl Frame {
  pub const fn new() -> Self {
    Self { events: Vec::new() }
  }

  fn push(&mut self, event: InputEvent) {
    let pushed = self.events.push(event);
    debug_assert!(pushed.is_ok(), "frame holds at most {} events", MAX_FRAME_EVENTS);
  }

  pub fn events(&self) -> &[InputEvent] {
    &self.events
  }

  pub fn iter(&self) -> impl Iterator<Item = &InputEvent> + '_ {
    self.events.iter()
  }

  pub fn len(&self) -> usize {
    self.events.len()
  }

  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  /// The key transition in this batch, if any.
  pub fn key(&self) -> Option<(VirtualKey, bool)> {
    self.events.iter().find_map(|event| match *event {
      InputEvent::Key { key, pressed } => Some((key, pressed)),
      _ => None,
    })
  }
}

/// Decoder state carried from one packet to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Touchpad {
  revision: HwRevision,
  axis_max_y: u16,
  mode: ReportMode,
  pressed: Option<VirtualKey>,
  pen_up: bool,
}

impl Touchpad {
  pub const fn new(revision: HwRevision, axis_max_y: u16, mode: ReportMode) -> Self {
    Self { revision, axis_max_y, mode, pressed: None, pen_up: false }
  }

  /// The virtual key currently held, if any.
  pub const fn pressed(&self) -> Option<VirtualKey> {
    self.pressed
  }

  /// `true` when the last contact report had no fingers down.
  pub const fn is_pen_up(&self) -> bool {
    self.pen_up
  }

  /// Advance the state machine by one touch packet.
  pub fn process(&mut self, frame: &EventFrame) -> Frame {
    let mut out = Frame::new();
    let mask = frame.key_mask();

    match (mask, self.pressed) {
      (0, None) => self.report_contacts(frame, &mut out),
      (0, Some(key)) => {
        out.push(InputEvent::Key { key, pressed: false });
        self.pressed = None;
      }
      (mask, None) => {
        if let Some(key) = self.revision.remap(mask) {
          self.lift_contacts(&mut out);
          out.push(InputEvent::Key { key, pressed: true });
          self.pressed = Some(key);
        }
      }
      // First claim wins until the mask clears.
      (_, Some(_)) => {}
    }

    out
  }

  fn report_contacts(&mut self, frame: &EventFrame, out: &mut Frame) {
    let count = frame.touch_count();

    match self.mode {
      ReportMode::MultiTouch => {
        let slots = [
          (ContactSlot::Primary, frame.primary(self.axis_max_y), count > 0),
          (ContactSlot::Secondary, frame.secondary(self.axis_max_y), count > 1),
        ];
        for (slot, point, touching) in slots {
          let major = if touching { MAJOR_TOUCHING } else { 0 };
          out.push(InputEvent::Contact(Contact::new(slot, major, Some(point))));
        }
      }
      ReportMode::SingleTouch => {
        let touching = count > 0;
        let (point, pressure) =
          if touching { (Some(frame.primary(self.axis_max_y)), MAJOR_TOUCHING) } else { (None, 0) };
        out.push(InputEvent::Pointer { point, pressure, touching });
      }
    }

    self.pen_up = count == 0;
    debug!("BI041P: pen {}", if self.pen_up { "up" } else { "down" });
  }

  fn lift_contacts(&mut self, out: &mut Frame) {
    if !self.pen_up {
      let lift = match self.mode {
        ReportMode::MultiTouch => InputEvent::Contact(Contact::lift()),
        ReportMode::SingleTouch => InputEvent::Pointer { point: None, pressure: 0, touching: false },
      };
      out.push(lift);
      self.pen_up = true;
    }
  }
}
