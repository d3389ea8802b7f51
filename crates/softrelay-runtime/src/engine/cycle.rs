//! Scan tick execution: scheduling, sweeps, stepping, breakpoints.

#![allow(missing_docs)]

use crate::hal::Hal;

use super::{Engine, RunMode};

/// Fixed interval used by the Slow run mode.
pub const SLOW_SCAN_INTERVAL_MS: u64 = 250;

impl Engine {
    /// One wake of the scan executor. Returns true when at least one card
    /// was processed.
    ///
    /// Normal/Slow run a full ordered sweep when the interval elapsed,
    /// advancing `last_scan_ms` by the interval (phase-stable). Step consumes
    /// one pending step request per card. Breakpoint runs scheduled sweeps
    /// but halts after any card whose breakpoint flag is set; the halted
    /// state persists until the mode changes or the breakpoint is cleared.
    pub fn tick(&mut self, hal: &mut impl Hal) -> bool {
        if self.paused {
            return false;
        }
        match self.run_mode {
            RunMode::Normal => self.tick_scheduled(hal, self.scan_interval_ms),
            RunMode::Slow => self.tick_scheduled(hal, SLOW_SCAN_INTERVAL_MS),
            RunMode::Breakpoint => {
                if self.halted {
                    return false;
                }
                self.tick_scheduled(hal, self.scan_interval_ms)
            }
            RunMode::Step => {
                if !self.step_pending {
                    return false;
                }
                self.step_pending = false;
                self.step_one(hal);
                true
            }
        }
    }

    fn tick_scheduled(&mut self, hal: &mut impl Hal, interval: u64) -> bool {
        let now = hal.monotonic_ms();
        let last = *self.last_scan_ms.get_or_insert(now);
        if now.saturating_sub(last) < interval && self.cursor == 0 {
            return false;
        }
        let completed = self.run_sweep(hal);
        if completed {
            let mut next = last.saturating_add(interval);
            // Bound catch-up drift to a single interval.
            if now.saturating_sub(next) > interval {
                next = now - interval;
            }
            self.last_scan_ms = Some(next);
        }
        true
    }

    /// Run (or resume) the ordered sweep. Returns true on completion.
    fn run_sweep(&mut self, hal: &mut impl Hal) -> bool {
        let honor_breakpoints = self.run_mode == RunMode::Breakpoint;
        if self.cursor == 0 {
            self.sweep_start_us = Some(hal.monotonic_us());
        }
        let now_ms = hal.monotonic_ms();
        while self.cursor < self.scan_order.len() {
            let pos = self.cursor;
            self.process_position(pos, hal, now_ms);
            self.cursor += 1;
            if honor_breakpoints && self.breakpoints[self.scan_order[pos]] {
                self.halted = true;
                return false;
            }
        }
        self.cursor = 0;
        if let Some(start) = self.sweep_start_us.take() {
            // Duration is reported only for sweeps that ran to completion.
            self.last_complete_scan_us = hal.monotonic_us().saturating_sub(start);
        }
        true
    }

    /// Advance exactly one card (Step mode).
    fn step_one(&mut self, hal: &mut impl Hal) {
        // A sweep stretched across step requests is never timed.
        self.sweep_start_us = None;
        let now_ms = hal.monotonic_ms();
        let pos = self.cursor;
        self.process_position(pos, hal, now_ms);
        self.cursor = (self.cursor + 1) % self.scan_order.len();
    }
}
