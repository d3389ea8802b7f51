//! Digital input state machine coverage.

mod common;

use common::SimKernel;
use softrelay_runtime::card::{
    CardMode, CardState, Combine, DiMode, DiState, Operator,
};

const DI0_PIN: u8 = 13;

fn enabled_di(kernel: &mut SimKernel, mode: DiMode, debounce: u32) {
    let mut cards = kernel.engine.cards().to_vec();
    cards[0].mode = CardMode::Di(mode);
    cards[0].setting1 = debounce;
    cards[0].set.a.op = Operator::AlwaysTrue;
    kernel.engine.apply_config(cards);
}

#[test]
fn rising_edge_counts_and_pulses_one_tick() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Rising, 0);

    kernel.tick_at(10); // primes previous sample low
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    assert!(kernel.card(0).trigger_flag);
    assert_eq!(kernel.card(0).current_value, 1);
    assert!(kernel.card(0).logical_state);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Qualified));
    assert_eq!(kernel.card(0).start_on_ms, 20);

    // No edge next tick: the pulse lasts exactly one scan.
    kernel.tick_at(30);
    assert!(!kernel.card(0).trigger_flag);
    assert_eq!(kernel.card(0).current_value, 1);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Idle));

    // Falling edge is ignored in rising mode.
    kernel.hal.set_digital(DI0_PIN, false);
    kernel.tick_at(40);
    assert!(!kernel.card(0).trigger_flag);
    assert_eq!(kernel.card(0).current_value, 1);
}

#[test]
fn change_mode_counts_both_edges() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Change, 0);

    kernel.tick_at(10);
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    kernel.hal.set_digital(DI0_PIN, false);
    kernel.tick_at(30);
    assert_eq!(kernel.card(0).current_value, 2);
}

#[test]
fn falling_mode_counts_releases_only() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Falling, 0);

    kernel.tick_at(10);
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    assert_eq!(kernel.card(0).current_value, 0);
    kernel.hal.set_digital(DI0_PIN, false);
    kernel.tick_at(30);
    assert_eq!(kernel.card(0).current_value, 1);
    assert!(!kernel.card(0).logical_state); // qualified state follows the sample
}

#[test]
fn debounce_filters_fast_pulses() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Rising, 50);

    // Pulse: high at 20, low at 40, high again at 60. The first edge falls
    // inside the window measured from the last qualified edge (t=0), so it
    // only filters; the edge at 60 qualifies.
    kernel.tick_at(10);
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Filtering));
    assert_eq!(kernel.card(0).current_value, 0);

    kernel.hal.set_digital(DI0_PIN, false);
    kernel.tick_at(40);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Idle));

    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(60);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Qualified));
    assert_eq!(kernel.card(0).current_value, 1);
    assert_eq!(kernel.card(0).start_on_ms, 60);
}

#[test]
fn zero_debounce_means_no_window() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Rising, 0);

    kernel.tick_at(10);
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    // Qualifies immediately even though 20ms elapsed since "edge" zero.
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Qualified));
}

#[test]
fn invert_flips_physical_and_edges() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Rising, 0);
    let mut cards = kernel.engine.cards().to_vec();
    cards[0].invert = true;
    kernel.engine.apply_config(cards);

    // Pin idles low, so the inverted sample reads high.
    kernel.tick_at(10);
    assert!(kernel.card(0).physical_state);

    // A high-to-low pin transition is a rising edge after inversion.
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    kernel.hal.set_digital(DI0_PIN, false);
    kernel.tick_at(30);
    assert_eq!(kernel.card(0).current_value, 1);
}

#[test]
fn gate_off_suppresses_edges_but_tracks_physical() {
    let mut kernel = SimKernel::new(10);
    let mut cards = kernel.engine.cards().to_vec();
    cards[0].mode = CardMode::Di(DiMode::Rising);
    cards[0].set.a.op = Operator::AlwaysFalse;
    kernel.engine.apply_config(cards);

    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(10);
    assert!(kernel.card(0).physical_state);
    assert!(!kernel.card(0).trigger_flag);
    assert_eq!(kernel.card(0).current_value, 0);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Idle));
}

#[test]
fn reset_clears_runtime_and_inhibits() {
    let mut kernel = SimKernel::new(10);
    let mut cards = kernel.engine.cards().to_vec();
    cards[0].mode = CardMode::Di(DiMode::Rising);
    cards[0].set.a.op = Operator::AlwaysTrue;
    // RESET driven by DI1's logical state.
    cards[0].reset.a.target = 1;
    cards[0].reset.a.op = Operator::PhysicalOn;
    cards[0].reset.combine = Combine::None;
    cards[1].set.a.op = Operator::AlwaysTrue;
    kernel.engine.apply_config(cards);

    kernel.tick_at(10);
    kernel.hal.set_digital(DI0_PIN, true);
    kernel.tick_at(20);
    assert_eq!(kernel.card(0).current_value, 1);

    // Raise DI1's pin. DI0 scans before DI1, so it observes the new DI1
    // physical state one sweep later and resets there.
    kernel.hal.set_digital(12, true);
    kernel.tick_at(30);
    kernel.tick_at(40);
    assert_eq!(kernel.card(0).state, CardState::Di(DiState::Inhibited));
    assert_eq!(kernel.card(0).current_value, 0);
    assert!(!kernel.card(0).logical_state);
    assert!(!kernel.card(0).trigger_flag);
    assert_eq!(kernel.card(0).start_on_ms, 0);
    // Physical state still tracks the (inverted) pin sample while inhibited.
    assert!(kernel.card(0).physical_state);
}

#[test]
fn counter_never_decreases_without_reset() {
    let mut kernel = SimKernel::new(10);
    enabled_di(&mut kernel, DiMode::Change, 0);

    let mut last = 0;
    for step in 1..=40_u64 {
        kernel.hal.set_digital(DI0_PIN, step % 3 == 0);
        kernel.tick_at(10 * step);
        let value = kernel.card(0).current_value;
        assert!(value >= last, "counter decreased without reset");
        last = value;
    }
    assert!(last > 0);
}
