//! Clock source: monotonic microsecond time for the scheduler
//!
//! On real hardware the firmware wraps its free-running µs timer in a
//! [`Clock`] implementation. For host runs and tests, [`SysTimer`] is a
//! software counter that can be shared by reference between the scheduler
//! and task bodies (which advance it to simulate execution time).

use core::cell::Cell;

/// Microsecond timestamp. Wraps after ~71 minutes; all differences use
/// wrapping arithmetic.
pub type TimeUs = u32;

/// Monotonic microsecond time source
pub trait Clock {
    /// Current time in microseconds
    fn now_us(&self) -> TimeUs;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> TimeUs {
        (**self).now_us()
    }
}

/// Elapsed time from `earlier` to `later`, tolerant of counter wrap
#[inline]
pub fn elapsed(later: TimeUs, earlier: TimeUs) -> TimeUs {
    later.wrapping_sub(earlier)
}

/// Software system timer
///
/// Interior mutability lets one timer be read by the scheduler while a task
/// body holding another `&SysTimer` advances it.
pub struct SysTimer {
    /// Current time (microseconds)
    ticks_us: Cell<TimeUs>,
    /// Overflow count
    overflows: Cell<u32>,
}

impl SysTimer {
    /// Software timer starting at zero
    pub const fn software() -> Self {
        Self::starting_at(0)
    }

    /// Software timer starting at an arbitrary timestamp
    pub const fn starting_at(us: TimeUs) -> Self {
        Self {
            ticks_us: Cell::new(us),
            overflows: Cell::new(0),
        }
    }

    /// Advance time by microseconds
    pub fn advance(&self, us: TimeUs) {
        let old = self.ticks_us.get();
        let new = old.wrapping_add(us);
        if new < old {
            self.overflows.set(self.overflows.get() + 1);
        }
        self.ticks_us.set(new);
    }

    /// Jump to an absolute timestamp (must not go backwards)
    pub fn set(&self, us: TimeUs) {
        let now = self.ticks_us.get();
        self.advance(elapsed(us, now));
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> TimeUs {
        self.ticks_us.get() / 1000
    }

    /// Number of counter wraps
    pub fn overflows(&self) -> u32 {
        self.overflows.get()
    }

    /// Elapsed microseconds since a reference point
    pub fn elapsed_since(&self, reference: TimeUs) -> TimeUs {
        elapsed(self.ticks_us.get(), reference)
    }
}

impl Clock for SysTimer {
    fn now_us(&self) -> TimeUs {
        self.ticks_us.get()
    }
}

/// Host clock backed by `std::time::Instant`
#[cfg(feature = "std")]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_us(&self) -> TimeUs {
        // Truncation is the intended wrap
        self.origin.elapsed().as_micros() as TimeUs
    }
}
