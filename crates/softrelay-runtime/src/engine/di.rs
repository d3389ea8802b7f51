//! Digital input processor: sample, gate, edge-detect, debounce, qualify.

#![allow(missing_docs)]

use crate::card::{CardState, DiMode, DiState, LogicCard};

/// Per-card DI scratch: previous sample and its primed flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiScratch {
    pub prev_sample: bool,
    pub primed: bool,
}

/// Inputs resolved by the engine before the transition runs.
#[derive(Debug, Clone, Copy)]
pub struct DiInput {
    /// Polarity-adjusted sample (force override and `invert` already applied).
    pub sample: bool,
    pub set: bool,
    pub reset: bool,
    pub now_ms: u32,
}

/// One DI scan step. Reset dominates; SET gates all edge processing.
pub fn step(card: &mut LogicCard, scratch: &mut DiScratch, input: DiInput) {
    card.physical_state = input.sample;

    if input.reset {
        card.logical_state = false;
        card.trigger_flag = false;
        card.current_value = 0;
        card.start_on_ms = 0;
        card.start_off_ms = 0;
        card.repeat_counter = 0;
        card.state = CardState::Di(DiState::Inhibited);
        return;
    }

    if !input.set {
        card.trigger_flag = false;
        card.state = CardState::Di(DiState::Idle);
        return;
    }

    let prev = if scratch.primed {
        scratch.prev_sample
    } else {
        input.sample
    };
    scratch.prev_sample = input.sample;
    scratch.primed = true;

    let rising = !prev && input.sample;
    let falling = prev && !input.sample;
    let edge = match card.mode {
        crate::card::CardMode::Di(DiMode::Rising) => rising,
        crate::card::CardMode::Di(DiMode::Falling) => falling,
        crate::card::CardMode::Di(DiMode::Change) => rising || falling,
        _ => false,
    };

    if !edge {
        card.trigger_flag = false;
        card.state = CardState::Di(DiState::Idle);
        return;
    }

    // setting1 == 0 means no debounce window.
    let elapsed = input.now_ms.wrapping_sub(card.start_on_ms);
    if card.setting1 > 0 && elapsed < card.setting1 {
        card.trigger_flag = false;
        card.state = CardState::Di(DiState::Filtering);
        return;
    }

    card.trigger_flag = true;
    card.current_value = card.current_value.saturating_add(1);
    card.logical_state = input.sample;
    card.start_on_ms = input.now_ms;
    card.state = CardState::Di(DiState::Qualified);
}
