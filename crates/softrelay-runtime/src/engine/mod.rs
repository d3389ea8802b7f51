//! Scan engine: card store, scratch, run modes, forcing and masking.

#![allow(missing_docs)]

mod ai;
mod cycle;
mod di;
mod dout;

pub use cycle::SLOW_SCAN_INTERVAL_MS;
pub use di::DiScratch;

use crate::card::{CardFamily, CardLayout, LogicCard, VIRTUAL_PIN};
use crate::cond;
use crate::control::Command;
use crate::hal::Hal;

/// Scan engine run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Normal,
    Step,
    Breakpoint,
    Slow,
}

impl RunMode {
    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Step => "Step",
            Self::Breakpoint => "Breakpoint",
            Self::Slow => "Slow",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "Normal" => Some(Self::Normal),
            "Step" => Some(Self::Step),
            "Breakpoint" => Some(Self::Breakpoint),
            "Slow" => Some(Self::Slow),
            _ => None,
        }
    }
}

/// Per-card input source override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputForce {
    #[default]
    Real,
    ForcedHigh,
    ForcedLow,
    ForcedValue(u32),
}

/// Per-card scratch owned by the scan executor, wiped on config swap.
#[derive(Debug, Clone)]
pub struct Scratch {
    pub prev_set: Vec<bool>,
    pub di: Vec<DiScratch>,
}

impl Scratch {
    fn new(total: usize) -> Self {
        Self {
            prev_set: vec![false; total],
            di: vec![DiScratch::default(); total],
        }
    }
}

/// The automation kernel: owns the card store and all per-card runtime state.
///
/// Owned by the scan executor; the config manager mutates it only while the
/// pause barrier holds.
#[derive(Debug)]
pub struct Engine {
    layout: CardLayout,
    cards: Vec<LogicCard>,
    scan_order: Vec<usize>,
    scratch: Scratch,

    run_mode: RunMode,
    cursor: usize,
    halted: bool,
    step_pending: bool,
    breakpoints: Vec<bool>,

    test_mode: bool,
    forces: Vec<InputForce>,
    output_masks: Vec<bool>,
    global_output_mask: bool,

    scan_interval_ms: u64,
    last_scan_ms: Option<u64>,
    sweep_start_us: Option<u64>,
    last_complete_scan_us: u64,

    storage_degraded: bool,
    paused: bool,
}

impl Engine {
    /// Build an engine over a card store whose length matches the layout.
    #[must_use]
    pub fn new(layout: CardLayout, cards: Vec<LogicCard>, scan_interval_ms: u64) -> Self {
        debug_assert_eq!(cards.len(), layout.total());
        let total = layout.total();
        let scan_order = layout.scan_order();
        Self {
            layout,
            cards,
            scan_order,
            scratch: Scratch::new(total),
            run_mode: RunMode::Normal,
            cursor: 0,
            halted: false,
            step_pending: false,
            breakpoints: vec![false; total],
            test_mode: false,
            forces: vec![InputForce::Real; total],
            output_masks: vec![false; total],
            global_output_mask: false,
            scan_interval_ms,
            last_scan_ms: None,
            sweep_start_us: None,
            last_complete_scan_us: 0,
            storage_degraded: false,
            paused: false,
        }
    }

    /// Engine over factory defaults.
    #[must_use]
    pub fn factory(scan_interval_ms: u64) -> Self {
        let layout = CardLayout::factory();
        let cards = layout.factory_cards();
        Self::new(layout, cards, scan_interval_ms)
    }

    #[must_use]
    pub fn layout(&self) -> &CardLayout {
        &self.layout
    }

    #[must_use]
    pub fn cards(&self) -> &[LogicCard] {
        &self.cards
    }

    #[must_use]
    pub fn card(&self, id: usize) -> Option<&LogicCard> {
        self.cards.get(id)
    }

    #[must_use]
    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    #[must_use]
    pub fn scan_interval_ms(&self) -> u64 {
        self.scan_interval_ms
    }

    pub fn set_scan_interval_ms(&mut self, interval_ms: u64) {
        self.scan_interval_ms = interval_ms.max(1);
    }

    #[must_use]
    pub fn last_complete_scan_us(&self) -> u64 {
        self.last_complete_scan_us
    }

    #[must_use]
    pub fn storage_degraded(&self) -> bool {
        self.storage_degraded
    }

    pub fn set_storage_degraded(&mut self, degraded: bool) {
        self.storage_degraded = degraded;
    }

    #[must_use]
    pub fn breakpoints(&self) -> &[bool] {
        &self.breakpoints
    }

    #[must_use]
    pub fn forces(&self) -> &[InputForce] {
        &self.forces
    }

    #[must_use]
    pub fn output_masks(&self) -> &[bool] {
        &self.output_masks
    }

    #[must_use]
    pub fn global_output_mask(&self) -> bool {
        self.global_output_mask
    }

    /// Replace the full card store and wipe every scratch array.
    ///
    /// Called only from the config manager while the pause barrier holds.
    pub fn apply_config(&mut self, cards: Vec<LogicCard>) {
        debug_assert_eq!(cards.len(), self.layout.total());
        let total = self.layout.total();
        self.cards = cards;
        self.scratch = Scratch::new(total);
        self.breakpoints = vec![false; total];
        self.forces = vec![InputForce::Real; total];
        self.output_masks = vec![false; total];
        self.global_output_mask = false;
        self.cursor = 0;
        self.halted = false;
        self.step_pending = false;
        self.sweep_start_us = None;
    }

    /// Apply a validated control command.
    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::SetRunMode { mode } => {
                if self.run_mode == RunMode::Breakpoint && mode != RunMode::Breakpoint {
                    self.halted = false;
                }
                self.run_mode = mode;
            }
            Command::StepOnce => {
                self.run_mode = RunMode::Step;
                // Duplicate step requests coalesce until consumed.
                self.step_pending = true;
            }
            Command::SetBreakpoint { card, enabled } => {
                if let Some(slot) = self.breakpoints.get_mut(card as usize) {
                    *slot = enabled;
                    if !enabled {
                        self.halted = false;
                    }
                }
            }
            Command::SetTestMode { active } => {
                self.test_mode = active;
                if !active {
                    self.forces.fill(InputForce::Real);
                    self.output_masks.fill(false);
                    self.global_output_mask = false;
                }
            }
            Command::SetInputForce { card, force } => {
                if let Some(slot) = self.forces.get_mut(card as usize) {
                    *slot = force;
                }
            }
            Command::SetOutputMask { card, masked } => {
                if let Some(slot) = self.output_masks.get_mut(card as usize) {
                    *slot = masked;
                }
            }
            Command::SetOutputMaskGlobal { masked } => {
                self.global_output_mask = masked;
            }
        }
    }

    /// Evaluate and commit one card at a scan position.
    fn process_position(&mut self, pos: usize, hal: &mut impl Hal, now_ms: u64) {
        let id = self.scan_order[pos];
        let card = &self.cards[id];
        let set = cond::eval_group(&self.cards, &card.set);
        let reset = cond::eval_group(&self.cards, &card.reset);
        let now32 = now_ms as u32;

        match card.family {
            CardFamily::DigitalInput => {
                let raw = match self.forces[id] {
                    InputForce::ForcedHigh => true,
                    InputForce::ForcedLow => false,
                    _ => card.hw_pin != VIRTUAL_PIN && hal.digital_read(card.hw_pin),
                };
                let card = &mut self.cards[id];
                let sample = raw != card.invert;
                di::step(
                    card,
                    &mut self.scratch.di[id],
                    di::DiInput {
                        sample,
                        set,
                        reset,
                        now_ms: now32,
                    },
                );
            }
            CardFamily::AnalogInput => {
                let raw = match self.forces[id] {
                    InputForce::ForcedValue(value) => value,
                    _ => {
                        if card.hw_pin == VIRTUAL_PIN {
                            0
                        } else {
                            hal.analog_read(card.hw_pin)
                        }
                    }
                };
                ai::step(&mut self.cards[id], raw);
            }
            CardFamily::DigitalOutput | CardFamily::SoftIo => {
                let set_rising = set && !self.scratch.prev_set[id];
                self.scratch.prev_set[id] = set;
                let hardware = self.cards[id].family == CardFamily::DigitalOutput;
                let pin = self.cards[id].hw_pin;
                let effective = dout::step(
                    &mut self.cards[id],
                    dout::DoInput {
                        set,
                        reset,
                        set_rising,
                        now_ms: now32,
                    },
                );
                let masked = self.output_masks[id] || self.global_output_mask;
                if hardware && pin != VIRTUAL_PIN && !masked {
                    hal.digital_write(pin, effective);
                }
            }
        }
    }
}
