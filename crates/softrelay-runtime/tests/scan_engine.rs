//! Scan ordering, run modes, stepping, breakpoints, and the debug overlay.

mod common;

use common::SimKernel;
use softrelay_runtime::card::{CardLayout, CardMode, CardState, DiMode, DoMode, DoState, Operator};
use softrelay_runtime::control::Command;
use softrelay_runtime::snapshot::SharedSnapshot;
use softrelay_runtime::{InputForce, RunMode};

#[test]
fn downstream_families_see_fresh_upstream_values() {
    // AI8 scales identically; SIO10 fires on AI8 > 500; DO4 follows SIO10.
    let mut cards = CardLayout::factory().factory_cards();
    cards[8].setting2 = 1000;
    cards[8].start_off_ms = 1000;
    cards[8].setting3 = 1000;
    cards[10].mode = CardMode::Do(DoMode::Immediate);
    cards[10].set.a.target = 8;
    cards[10].set.a.op = Operator::Gt;
    cards[10].set.a.threshold = 500;
    cards[4].mode = CardMode::Do(DoMode::Immediate);
    cards[4].set.a.target = 10;
    cards[4].set.a.op = Operator::PhysicalOn;
    let mut kernel = SimKernel::with_cards(10, cards);

    // One sweep propagates sensor -> virtual signal -> hardware output.
    kernel.hal.set_analog(35, 800);
    kernel.tick_at(10);
    assert_eq!(kernel.card(8).current_value, 800);
    assert!(kernel.card(10).physical_state);
    assert!(kernel.card(4).physical_state);
    assert!(kernel.hal.output(26));
}

#[test]
fn upstream_families_see_downstream_updates_next_tick() {
    // DI0 is gated on SIO10, which only goes active during the first sweep —
    // after DI0 was already evaluated. The gate therefore opens for DI0 one
    // tick later: its edge scratch primes on tick 2 and counts on tick 3.
    let mut cards = CardLayout::factory().factory_cards();
    cards[0].mode = CardMode::Di(DiMode::Change);
    cards[0].set.a.target = 10;
    cards[0].set.a.op = Operator::PhysicalOn;
    cards[10].mode = CardMode::Do(DoMode::Immediate);
    cards[10].set.a.op = Operator::AlwaysTrue;
    let mut kernel = SimKernel::with_cards(10, cards);

    kernel.hal.set_digital(13, false);
    kernel.tick_at(10);
    assert!(kernel.card(10).physical_state);
    assert_eq!(kernel.card(0).state, CardState::Di(softrelay_runtime::card::DiState::Idle));

    kernel.hal.set_digital(13, true);
    kernel.tick_at(20);
    // Gate just opened; this sweep primes the edge detector.
    assert_eq!(kernel.card(0).current_value, 0);

    kernel.hal.set_digital(13, false);
    kernel.tick_at(30);
    assert_eq!(kernel.card(0).current_value, 1);
}

#[test]
fn slow_mode_stretches_the_interval() {
    let mut kernel = SimKernel::new(10);
    kernel.engine.apply_command(Command::SetRunMode {
        mode: RunMode::Slow,
    });

    assert!(!kernel.tick_at(100));
    assert!(!kernel.tick_at(240));
    assert!(kernel.tick_at(250));
    assert!(!kernel.tick_at(300));
    assert!(kernel.tick_at(500));
}

#[test]
fn step_mode_advances_one_card_per_request() {
    let mut kernel = SimKernel::new(10);
    kernel.engine.apply_command(Command::StepOnce);
    assert_eq!(kernel.engine.run_mode(), RunMode::Step);

    assert!(kernel.tick_at(10));
    assert_eq!(kernel.engine.cursor(), 1);

    // No pending request, no progress.
    assert!(!kernel.tick_at(20));
    assert_eq!(kernel.engine.cursor(), 1);

    // Duplicate requests coalesce into a single step.
    kernel.engine.apply_command(Command::StepOnce);
    kernel.engine.apply_command(Command::StepOnce);
    assert!(kernel.tick_at(30));
    assert!(!kernel.tick_at(40));
    assert_eq!(kernel.engine.cursor(), 2);

    // Stepping through the whole store wraps the cursor.
    let total = kernel.engine.cards().len();
    for i in 0..(total - 2) {
        kernel.engine.apply_command(Command::StepOnce);
        assert!(kernel.tick_at(50 + i as u64 * 10));
    }
    assert_eq!(kernel.engine.cursor(), 0);
}

#[test]
fn breakpoint_halts_mid_sweep_and_resumes() {
    // DO4 would trigger on the first sweep, but a breakpoint on AI8 (scan
    // position 4) halts the sweep before the DO family runs.
    let mut cards = CardLayout::factory().factory_cards();
    cards[4].set.a.op = Operator::AlwaysTrue;
    cards[4].setting1 = 50;
    cards[4].setting2 = 50;
    let mut kernel = SimKernel::with_cards(10, cards);
    kernel.engine.apply_command(Command::SetBreakpoint {
        card: 8,
        enabled: true,
    });
    kernel.engine.apply_command(Command::SetRunMode {
        mode: RunMode::Breakpoint,
    });

    assert!(kernel.tick_at(10));
    assert!(kernel.engine.is_halted());
    assert_eq!(kernel.engine.cursor(), 5);
    assert_eq!(kernel.card(4).state, CardState::Do(DoState::Idle));

    // Halted state persists across wakes.
    assert!(!kernel.tick_at(20));
    assert!(kernel.engine.is_halted());

    // Clearing the breakpoint resumes the interrupted sweep.
    kernel.engine.apply_command(Command::SetBreakpoint {
        card: 8,
        enabled: false,
    });
    assert!(!kernel.engine.is_halted());
    assert!(kernel.tick_at(30));
    assert_eq!(kernel.engine.cursor(), 0);
    assert_eq!(kernel.card(4).state, CardState::Do(DoState::OnDelay));
}

#[test]
fn leaving_breakpoint_mode_clears_the_halt() {
    let mut kernel = SimKernel::new(10);
    kernel.engine.apply_command(Command::SetBreakpoint {
        card: 0,
        enabled: true,
    });
    kernel.engine.apply_command(Command::SetRunMode {
        mode: RunMode::Breakpoint,
    });
    assert!(kernel.tick_at(10));
    assert!(kernel.engine.is_halted());

    kernel.engine.apply_command(Command::SetRunMode {
        mode: RunMode::Normal,
    });
    assert!(!kernel.engine.is_halted());
    assert!(kernel.tick_at(20));
    assert_eq!(kernel.engine.cursor(), 0);
}

#[test]
fn input_forces_override_the_hal() {
    let mut cards = CardLayout::factory().factory_cards();
    cards[0].mode = CardMode::Di(DiMode::Rising);
    cards[0].set.a.op = Operator::AlwaysTrue;
    cards[8].setting2 = 4095;
    cards[8].start_off_ms = 10000;
    cards[8].setting3 = 1000;
    let mut kernel = SimKernel::with_cards(10, cards);

    kernel.engine.apply_command(Command::SetTestMode { active: true });
    kernel.engine.apply_command(Command::SetInputForce {
        card: 8,
        force: InputForce::ForcedValue(2048),
    });
    kernel.tick_at(10);
    assert_eq!(kernel.card(8).current_value, 5001);

    // Forced-high DI edge without touching the pin.
    kernel.engine.apply_command(Command::SetInputForce {
        card: 0,
        force: InputForce::ForcedHigh,
    });
    kernel.tick_at(20);
    assert_eq!(kernel.card(0).current_value, 1);
    assert!(kernel.card(0).physical_state);
}

#[test]
fn output_masks_suppress_hardware_only() {
    let mut cards = CardLayout::factory().factory_cards();
    cards[4].mode = CardMode::Do(DoMode::Immediate);
    cards[4].setting2 = 0; // hold active
    cards[4].set.a.op = Operator::AlwaysTrue;
    cards[4].reset.a.target = 0;
    cards[4].reset.a.op = Operator::PhysicalOn;
    let mut kernel = SimKernel::with_cards(10, cards);

    kernel.engine.apply_command(Command::SetTestMode { active: true });
    kernel.engine.apply_command(Command::SetOutputMask {
        card: 4,
        masked: true,
    });
    kernel.tick_at(10);
    // Logical result is computed; the pin stays untouched.
    assert!(kernel.card(4).physical_state);
    assert!(!kernel.hal.output(26));

    kernel.engine.apply_command(Command::SetOutputMask {
        card: 4,
        masked: false,
    });
    kernel.tick_at(20);
    assert!(kernel.hal.output(26));

    // With the global mask on, even a reset leaves the pin frozen at its
    // last driven level.
    kernel.engine.apply_command(Command::SetOutputMaskGlobal { masked: true });
    kernel.hal.set_digital(13, true);
    kernel.tick_at(30);
    kernel.tick_at(40);
    assert!(!kernel.card(4).physical_state);
    assert!(kernel.hal.output(26));
}

#[test]
fn disabling_test_mode_clears_all_overrides() {
    let mut kernel = SimKernel::new(10);
    kernel.engine.apply_command(Command::SetTestMode { active: true });
    kernel.engine.apply_command(Command::SetInputForce {
        card: 0,
        force: InputForce::ForcedHigh,
    });
    kernel.engine.apply_command(Command::SetOutputMask {
        card: 4,
        masked: true,
    });
    kernel.engine.apply_command(Command::SetOutputMaskGlobal { masked: true });

    kernel.engine.apply_command(Command::SetTestMode { active: false });
    assert!(kernel.engine.forces().iter().all(|f| *f == InputForce::Real));
    assert!(kernel.engine.output_masks().iter().all(|m| !m));
    assert!(!kernel.engine.global_output_mask());
}

#[test]
fn snapshot_seq_is_strictly_monotonic() {
    let kernel = SimKernel::new(10);
    let shared = SharedSnapshot::new();

    let mut last = shared.seq();
    for i in 0..5_u64 {
        shared.publish(&kernel.engine, i * 10);
        let snapshot = shared.read();
        assert!(snapshot.seq > last);
        last = snapshot.seq;
    }
    assert_eq!(shared.read().cards.len(), 14);
}

#[test]
fn scheduled_sweeps_hold_phase() {
    let mut kernel = SimKernel::new(10);
    // A late wake does not shift the schedule: the next sweep is due at the
    // phase-stable boundary, not one interval after the late wake.
    assert!(kernel.tick_at(10));
    assert!(kernel.tick_at(25)); // late wake, still one sweep
    assert!(kernel.tick_at(30)); // due at the stable boundary
    assert!(!kernel.tick_at(35));
    assert!(kernel.tick_at(40));
}

#[test]
fn paused_engine_skips_scans() {
    let mut kernel = SimKernel::new(10);
    kernel.engine.set_paused(true);
    assert!(!kernel.tick_at(100));
    kernel.engine.set_paused(false);
    assert!(kernel.tick_at(200));
}
