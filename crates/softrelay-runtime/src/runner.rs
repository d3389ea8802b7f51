//! Scan executor: the thread driving the engine.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::control::CommandQueue;
use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::hal::Hal;
use crate::pause::PauseBarrier;
use crate::snapshot::SharedSnapshot;

/// Wake cadence of the scan executor.
pub const WAKE_INTERVAL: Duration = Duration::from_millis(1);

/// Snapshot heartbeat when nothing else publishes.
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;

/// Drives the engine: command drain, pause barrier, tick, snapshot publish.
pub struct ScanRunner<H: Hal> {
    engine: Arc<Mutex<Engine>>,
    hal: H,
    snapshot: Arc<SharedSnapshot>,
    barrier: Arc<PauseBarrier>,
    queue: CommandQueue,
}

impl<H: Hal> ScanRunner<H> {
    #[must_use]
    pub fn new(
        engine: Arc<Mutex<Engine>>,
        hal: H,
        snapshot: Arc<SharedSnapshot>,
        barrier: Arc<PauseBarrier>,
        queue: CommandQueue,
    ) -> Self {
        Self {
            engine,
            hal,
            snapshot,
            barrier,
            queue,
        }
    }

    /// Spawn the scan executor in a dedicated OS thread.
    pub fn spawn(self, name: impl Into<String>) -> Result<ScanHandle, RuntimeError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let builder = thread::Builder::new().name(name.into());
        let join = builder
            .spawn(move || run_scan_loop(self, &stop_thread))
            .map_err(|err| RuntimeError::ThreadSpawn(err.to_string().into()))?;
        Ok(ScanHandle {
            stop,
            join: Some(join),
        })
    }
}

fn run_scan_loop<H: Hal>(mut runner: ScanRunner<H>, stop: &AtomicBool) {
    let mut last_publish_ms = 0_u64;
    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("scan executor stopping");
            break;
        }
        let now = runner.hal.monotonic_ms();
        let mut dirty = false;

        let commands = runner.queue.drain();
        if !commands.is_empty() {
            let mut engine = runner.engine.lock().expect("engine lock poisoned");
            for command in commands {
                engine.apply_command(command);
            }
            dirty = true;
        }

        // Safe point: acknowledge a pause request between ticks and stay out
        // of the card store until the config manager releases the barrier.
        if runner.barrier.is_requested() {
            {
                let mut engine = runner.engine.lock().expect("engine lock poisoned");
                if !engine.is_paused() {
                    engine.set_paused(true);
                    runner.snapshot.publish(&engine, now);
                    last_publish_ms = now;
                }
            }
            runner.barrier.acknowledge();
            thread::sleep(WAKE_INTERVAL);
            continue;
        }
        if runner.barrier.try_resume() {
            let mut engine = runner.engine.lock().expect("engine lock poisoned");
            engine.set_paused(false);
            dirty = true;
        }

        {
            let mut engine = runner.engine.lock().expect("engine lock poisoned");
            let ran = engine.tick(&mut runner.hal);
            let heartbeat = now.saturating_sub(last_publish_ms) >= HEARTBEAT_INTERVAL_MS;
            if ran || dirty || heartbeat {
                runner.snapshot.publish(&engine, now);
                last_publish_ms = now;
            }
        }
        thread::sleep(WAKE_INTERVAL);
    }
}

/// Handle to the running scan executor.
#[derive(Debug)]
pub struct ScanHandle {
    stop: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Signal the executor to stop after its current wake.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Join the executor thread.
    pub fn join(&mut self) -> thread::Result<()> {
        if let Some(join) = self.join.take() {
            return join.join();
        }
        Ok(())
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.stop();
        let _ = self.join();
    }
}
