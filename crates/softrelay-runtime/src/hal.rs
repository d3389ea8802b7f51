//! Hardware abstraction: monotonic clocks, digital pins, analog channels.

#![allow(missing_docs)]

use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crate::card::VIRTUAL_PIN;

/// Hardware contract used by the scan engine.
///
/// Pin [`VIRTUAL_PIN`] marks a virtual card and is never passed to any of the
/// pin methods by the engine.
pub trait Hal: Send + 'static {
    /// Monotonic millisecond clock.
    fn monotonic_ms(&self) -> u64;

    /// Monotonic microsecond clock.
    fn monotonic_us(&self) -> u64;

    /// Read a digital input pin.
    fn digital_read(&self, pin: u8) -> bool;

    /// Drive a digital output pin.
    fn digital_write(&mut self, pin: u8, level: bool);

    /// Sample an analog input channel.
    fn analog_read(&self, pin: u8) -> u32;
}

#[derive(Debug)]
struct SimState {
    now_us: u64,
    digital: [bool; 256],
    analog: [u32; 256],
    outputs: [bool; 256],
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            now_us: 0,
            digital: [false; 256],
            analog: [0; 256],
            outputs: [false; 256],
        }
    }
}

/// Simulated HAL: manual clock plus settable pin latches.
///
/// Serves as the loopback backend for development runs and the deterministic
/// clock for tests. Handles are cheap clones sharing one state.
#[derive(Debug, Clone, Default)]
pub struct SimHal {
    inner: Arc<(Mutex<SimState>, Condvar)>,
}

impl SimHal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the manual clock by `delta_ms`.
    pub fn advance_ms(&self, delta_ms: u64) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("sim hal lock poisoned");
        state.now_us = state.now_us.saturating_add(delta_ms * 1000);
        cvar.notify_all();
    }

    /// Set the manual clock to an absolute millisecond value.
    pub fn set_ms(&self, now_ms: u64) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().expect("sim hal lock poisoned");
        state.now_us = now_ms * 1000;
        cvar.notify_all();
    }

    /// Latch a digital input level.
    pub fn set_digital(&self, pin: u8, level: bool) {
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").digital[pin as usize] = level;
    }

    /// Latch an analog input sample.
    pub fn set_analog(&self, pin: u8, raw: u32) {
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").analog[pin as usize] = raw;
    }

    /// Last level driven on an output pin.
    #[must_use]
    pub fn output(&self, pin: u8) -> bool {
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").outputs[pin as usize]
    }
}

impl Hal for SimHal {
    fn monotonic_ms(&self) -> u64 {
        self.monotonic_us() / 1000
    }

    fn monotonic_us(&self) -> u64 {
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").now_us
    }

    fn digital_read(&self, pin: u8) -> bool {
        debug_assert_ne!(pin, VIRTUAL_PIN);
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").digital[pin as usize]
    }

    fn digital_write(&mut self, pin: u8, level: bool) {
        debug_assert_ne!(pin, VIRTUAL_PIN);
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").outputs[pin as usize] = level;
    }

    fn analog_read(&self, pin: u8) -> u32 {
        debug_assert_ne!(pin, VIRTUAL_PIN);
        let (lock, _) = &*self.inner;
        lock.lock().expect("sim hal lock poisoned").analog[pin as usize]
    }
}

/// Wall-clock HAL with loopback pins, for hosts without real GPIO.
///
/// Pin latches behave like [`SimHal`] but time comes from
/// [`std::time::Instant`].
#[derive(Debug, Clone)]
pub struct StdHal {
    start: Instant,
    pins: SimHal,
}

impl StdHal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            pins: SimHal::new(),
        }
    }
}

impl Default for StdHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for StdHal {
    fn monotonic_ms(&self) -> u64 {
        self.monotonic_us() / 1000
    }

    fn monotonic_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    fn digital_read(&self, pin: u8) -> bool {
        self.pins.digital_read(pin)
    }

    fn digital_write(&mut self, pin: u8, level: bool) {
        self.pins.digital_write(pin, level);
    }

    fn analog_read(&self, pin: u8) -> u32 {
        self.pins.analog_read(pin)
    }
}
