//! Shared fixtures for kernel integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use softrelay_runtime::card::{cards_to_wire, CardLayout, LogicCard};
use softrelay_runtime::config::{ConfigManager, ConfigStore};
use softrelay_runtime::control::{command_channel, CommandSender};
use softrelay_runtime::hal::{Hal, SimHal, StdHal};
use softrelay_runtime::pause::PauseBarrier;
use softrelay_runtime::runner::{ScanHandle, ScanRunner};
use softrelay_runtime::snapshot::SharedSnapshot;
use softrelay_runtime::web::{start_portal, PortalServer, PortalState};
use softrelay_runtime::Engine;

/// Engine plus simulated HAL for direct, single-threaded tick tests.
pub struct SimKernel {
    pub engine: Engine,
    pub hal: SimHal,
}

impl SimKernel {
    /// Factory layout engine with the given scan interval. The scheduler is
    /// primed at t=0 so the first sweep lands one interval later.
    pub fn new(interval_ms: u64) -> Self {
        let mut kernel = Self {
            engine: Engine::factory(interval_ms),
            hal: SimHal::new(),
        };
        kernel.tick_at(0);
        kernel
    }

    /// Factory layout with custom cards, primed at t=0.
    pub fn with_cards(interval_ms: u64, cards: Vec<LogicCard>) -> Self {
        let layout = CardLayout::factory();
        let mut kernel = Self {
            engine: Engine::new(layout, cards, interval_ms),
            hal: SimHal::new(),
        };
        kernel.tick_at(0);
        kernel
    }

    /// Set the clock and run one wake.
    pub fn tick_at(&mut self, now_ms: u64) -> bool {
        self.hal.set_ms(now_ms);
        self.engine.tick(&mut self.hal)
    }

    /// Tick at every scan interval through `end_ms` inclusive.
    pub fn run_until(&mut self, end_ms: u64) {
        let interval = self.engine.scan_interval_ms();
        let mut t = self.hal.monotonic_ms();
        while t < end_ms {
            t += interval;
            self.tick_at(t);
        }
    }

    pub fn card(&self, id: usize) -> &LogicCard {
        self.engine.card(id).expect("card id in range")
    }
}

/// Full kernel: store, engine thread, manager, portal.
pub struct LiveKernel {
    pub engine: Arc<Mutex<Engine>>,
    pub manager: Arc<ConfigManager>,
    pub snapshot: Arc<SharedSnapshot>,
    pub commands: CommandSender,
    pub portal: PortalServer,
    pub handle: ScanHandle,
}

impl LiveKernel {
    /// Boot a complete kernel over a fresh data dir with a wall-clock HAL.
    pub fn boot(data_dir: &std::path::Path) -> Self {
        let layout = CardLayout::factory();
        let hal = StdHal::new();
        let snapshot = Arc::new(SharedSnapshot::new());
        let barrier = Arc::new(PauseBarrier::new());
        let (commands, queue) = command_channel();
        let store = ConfigStore::open(data_dir).expect("config store");

        let engine = Arc::new(Mutex::new(Engine::factory(5)));
        let clock = {
            let hal = hal.clone();
            Arc::new(move || hal.monotonic_ms()) as Arc<dyn Fn() -> u64 + Send + Sync>
        };
        let manager = Arc::new(
            ConfigManager::new(
                layout,
                store,
                engine.clone(),
                snapshot.clone(),
                barrier.clone(),
                clock,
            )
            .expect("config manager"),
        );

        let (cards, degraded) = manager.boot_cards();
        {
            let mut engine = engine.lock().unwrap();
            engine.apply_config(cards);
            engine.set_storage_degraded(degraded);
        }

        let runner = ScanRunner::new(engine.clone(), hal, snapshot.clone(), barrier, queue);
        let handle = runner.spawn("test-scan").expect("scan thread");

        let portal = start_portal(
            "127.0.0.1:0",
            "127.0.0.1:0",
            PortalState {
                manager: manager.clone(),
                snapshot: snapshot.clone(),
                commands: commands.clone(),
            },
        )
        .expect("portal");

        Self {
            engine,
            manager,
            snapshot,
            commands,
            portal,
            handle,
        }
    }

    pub fn http_base(&self) -> String {
        format!("http://{}", self.portal.http_addr())
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.portal.ws_addr())
    }
}

/// Factory config body wrapped the way the portal expects it.
pub fn factory_body() -> serde_json::Value {
    let layout = CardLayout::factory();
    serde_json::json!({ "config": { "cards": cards_to_wire(&layout.factory_cards()) } })
}
