//! Shared runtime snapshot published for observers.

#![allow(missing_docs)]

use std::sync::Mutex;

use serde_json::{json, Value};

use crate::card::{cards_to_wire, LogicCard};
use crate::engine::{Engine, InputForce, RunMode};

/// Coherent copy of the runtime image at the end of a tick.
#[derive(Debug, Clone)]
pub struct RuntimeSnapshot {
    pub seq: u64,
    pub ts_ms: u64,
    pub last_complete_scan_us: u64,
    pub scan_interval_ms: u64,
    pub run_mode: RunMode,
    pub test_mode: bool,
    pub kernel_paused: bool,
    pub halted: bool,
    pub cursor: usize,
    pub storage_degraded: bool,
    pub cards: Vec<LogicCard>,
    pub forces: Vec<InputForce>,
    pub output_masks: Vec<bool>,
    pub global_output_mask: bool,
    pub breakpoints: Vec<bool>,
}

impl RuntimeSnapshot {
    fn empty() -> Self {
        Self {
            seq: 0,
            ts_ms: 0,
            last_complete_scan_us: 0,
            scan_interval_ms: 0,
            run_mode: RunMode::Normal,
            test_mode: false,
            kernel_paused: false,
            halted: false,
            cursor: 0,
            storage_degraded: false,
            cards: Vec::new(),
            forces: Vec::new(),
            output_masks: Vec::new(),
            global_output_mask: false,
            breakpoints: Vec::new(),
        }
    }

    /// Wire form served by `GET /api/snapshot`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "ok": true,
            "snapshotSeq": self.seq,
            "tsMs": self.ts_ms,
            "lastCompleteScanUs": self.last_complete_scan_us,
            "scanIntervalMs": self.scan_interval_ms,
            "runMode": self.run_mode.wire_token(),
            "kernelPaused": self.kernel_paused,
            "halted": self.halted,
            "scanCursor": self.cursor,
            "storageDegraded": self.storage_degraded,
            "testMode": self.test_mode_wire(),
            "cards": cards_to_wire(&self.cards),
        })
    }

    /// Test-mode overlay block shared by HTTP and the push channel.
    #[must_use]
    pub fn test_mode_wire(&self) -> Value {
        let forces: Vec<Value> = self
            .forces
            .iter()
            .map(|force| match force {
                InputForce::Real => json!({"mode": "Real"}),
                InputForce::ForcedHigh => json!({"mode": "ForcedHigh"}),
                InputForce::ForcedLow => json!({"mode": "ForcedLow"}),
                InputForce::ForcedValue(value) => json!({"mode": "ForcedValue", "value": value}),
            })
            .collect();
        json!({
            "active": self.test_mode,
            "inputForces": forces,
            "outputMasks": self.output_masks,
            "globalOutputMask": self.global_output_mask,
            "breakpoints": self.breakpoints,
        })
    }
}

/// Lock-protected snapshot slot; the scan executor writes, observers clone.
#[derive(Debug)]
pub struct SharedSnapshot {
    inner: Mutex<RuntimeSnapshot>,
}

impl Default for SharedSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RuntimeSnapshot::empty()),
        }
    }

    /// Publish the current engine image, bumping `seq`.
    pub fn publish(&self, engine: &Engine, now_ms: u64) {
        let mut guard = self.inner.lock().expect("snapshot lock poisoned");
        let seq = guard.seq.saturating_add(1);
        *guard = RuntimeSnapshot {
            seq,
            ts_ms: now_ms,
            last_complete_scan_us: engine.last_complete_scan_us(),
            scan_interval_ms: engine.scan_interval_ms(),
            run_mode: engine.run_mode(),
            test_mode: engine.is_test_mode(),
            kernel_paused: engine.is_paused(),
            halted: engine.is_halted(),
            cursor: engine.cursor(),
            storage_degraded: engine.storage_degraded(),
            cards: engine.cards().to_vec(),
            forces: engine.forces().to_vec(),
            output_masks: engine.output_masks().to_vec(),
            global_output_mask: engine.global_output_mask(),
            breakpoints: engine.breakpoints().to_vec(),
        };
    }

    /// Coherent copy for an observer.
    #[must_use]
    pub fn read(&self) -> RuntimeSnapshot {
        self.inner.lock().expect("snapshot lock poisoned").clone()
    }

    /// Current sequence number without copying the image.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.inner.lock().expect("snapshot lock poisoned").seq
    }
}
