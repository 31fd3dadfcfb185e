use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};
use embassy_sync::signal::Signal;

#[derive(Debug, Clone, Copy)]
struct Flags {
  /// Delivery suppressed by update, diagnostics or low power.
  disabled: bool,
  /// An interrupt was handed to the worker and not yet serviced.
  pending: bool,
  updating: bool,
  progress: Option<u16>,
}

/// State shared between the interrupt handler, the driver and the host.
///
/// At most one packet decode is in flight: [`Session::on_interrupt`] masks
/// further delivery until the worker re-arms it, and interrupts arriving in
/// between coalesce into the pending one. Firmware update, the noise monitor
/// and low power close the gate entirely with [`Session::disable`].
///
/// Place it in a `static` with a `CriticalSectionRawMutex` when the interrupt
/// handler runs outside the executor.
pub struct Session<M: RawMutex> {
  irq: Signal<M, ()>,
  flags: BlockingMutex<M, Cell<Flags>>,
  transition: Mutex<M, ()>,
}

impl<M: RawMutex> Session<M> {
  /// Create a session with interrupt delivery closed.
  pub const fn new() -> Self {
    Self {
      irq: Signal::new(),
      flags: BlockingMutex::new(Cell::new(Flags { disabled: true, pending: false, updating: false, progress: None })),
      transition: Mutex::new(()),
    }
  }

  fn update<R>(&self, f: impl FnOnce(&mut Flags) -> R) -> R {
    self.flags.lock(|cell| {
      let mut flags = cell.get();
      let ret = f(&mut flags);
      cell.set(flags);
      ret
    })
  }

  fn get(&self) -> Flags {
    self.flags.lock(|cell| cell.get())
  }

  /// Interrupt handler entry point.
  ///
  /// Returns `true` when the interrupt was handed to the worker, `false`
  /// when delivery is closed or a decode is already pending.
  pub fn on_interrupt(&self) -> bool {
    let accepted = self.update(|flags| {
      if flags.disabled || flags.pending {
        return false;
      }
      flags.pending = true;
      true
    });
    if accepted {
      self.irq.signal(());
    }
    accepted
  }

  /// Wait until the interrupt handler hands over an interrupt.
  ///
  /// Only needs the shared session, so a decode task can park here without
  /// holding the driver and call [`crate::Bi041p::service_interrupt`] once
  /// this returns.
  pub async fn wait_interrupt(&self) {
    self.irq.wait().await
  }

  /// Allow the next interrupt through once the current one is serviced.
  pub(crate) fn rearm(&self) {
    self.update(|flags| flags.pending = false);
  }

  /// Guard that re-arms delivery when dropped, whether the decode finished
  /// or was cancelled.
  pub(crate) fn rearm_on_drop(&self) -> Rearm<'_, M> {
    Rearm(self)
  }

  /// Close interrupt delivery. Returns `false` if it was already closed.
  pub fn disable(&self) -> bool {
    let changed = self.update(|flags| !core::mem::replace(&mut flags.disabled, true));
    if changed {
      debug!("BI041P: interrupt delivery disabled");
    }
    changed
  }

  /// Open interrupt delivery. Returns `false` if it was already open.
  pub fn enable(&self) -> bool {
    let changed = self.update(|flags| core::mem::replace(&mut flags.disabled, false));
    if changed {
      debug!("BI041P: interrupt delivery enabled");
    }
    changed
  }

  pub fn is_enabled(&self) -> bool {
    !self.get().disabled
  }

  /// `true` while a firmware update attempt owns the controller.
  pub fn is_updating(&self) -> bool {
    self.get().updating
  }

  pub(crate) fn set_updating(&self, updating: bool) {
    self.update(|flags| flags.updating = updating);
  }

  /// Page most recently handed to the programmer by the running update.
  pub fn update_progress(&self) -> Option<u16> {
    self.get().progress
  }

  pub(crate) fn set_progress(&self, progress: Option<u16>) {
    self.update(|flags| flags.progress = progress);
  }

  /// Serialises suspend / resume against interrupt servicing.
  pub(crate) async fn lock(&self) -> MutexGuard<'_, M, ()> {
    self.transition.lock().await
  }
}

pub(crate) struct Rearm<'a, M: RawMutex>(&'a Session<M>);

impl<M: RawMutex> Drop for Rearm<'_, M> {
  fn drop(&mut self) {
    self.0.rearm();
  }
}

impl<M: RawMutex> Default for Session<M> {
  fn default() -> Self {
    Self::new()
  }
}
