//! Analog input processor: clamp, scale, EMA filter.
//!
//! Pure sensor transducer: no gating, no phases, no latch. The only state is
//! the EMA accumulator in `currentValue`. All arithmetic stays in integer
//! centiunits with 64-bit intermediates.

#![allow(missing_docs)]

use crate::card::{AiMode, AiState, CardMode, CardState, LogicCard};

/// One AI scan step over a raw sample (force override already applied).
pub fn step(card: &mut LogicCard, raw: u32) {
    let in_min = card.setting1.min(card.setting2);
    let in_max = card.setting1.max(card.setting2);
    let clamped = raw.clamp(in_min, in_max);

    // Output endpoints may run in either direction.
    let scaled = if in_max == in_min {
        card.start_on_ms
    } else {
        let out_min = i64::from(card.start_on_ms);
        let out_max = i64::from(card.start_off_ms);
        let in_delta = i64::from(in_max - in_min);
        let in_offset = i64::from(clamped - in_min);
        let mapped = out_min + (in_offset * (out_max - out_min)) / in_delta;
        u32::try_from(mapped.max(0)).unwrap_or(u32::MAX)
    };

    let alpha = u64::from(card.setting3.min(1000));
    let filtered = (alpha * u64::from(scaled) + (1000 - alpha) * u64::from(card.current_value))
        / 1000;
    card.current_value = u32::try_from(filtered).unwrap_or(u32::MAX);

    card.mode = CardMode::Ai(AiMode::Continuous);
    card.state = CardState::Ai(AiState::Streaming);
}
