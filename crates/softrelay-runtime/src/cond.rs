//! SET/RESET condition evaluation over the card store.
//!
//! Pure functions: unknown ids and family-mismatched operators evaluate to
//! `false` rather than fault, so a half-edited configuration degrades to
//! inert conditions instead of stopping the scan.

use crate::card::{Combine, ConditionClause, ConditionGroup, DoState, LogicCard, Operator};

/// Evaluate one operator against a target card.
#[must_use]
pub fn eval_operator(target: &LogicCard, op: Operator, threshold: u32) -> bool {
    match op {
        Operator::AlwaysTrue => true,
        Operator::AlwaysFalse => false,
        Operator::LogicalTrue => target.logical_state,
        Operator::LogicalFalse => !target.logical_state,
        Operator::PhysicalOn => target.physical_state,
        Operator::PhysicalOff => !target.physical_state,
        Operator::Triggered => target.trigger_flag,
        Operator::TriggerCleared => !target.trigger_flag,
        Operator::Gt => target.current_value > threshold,
        Operator::Lt => target.current_value < threshold,
        Operator::Eq => target.current_value == threshold,
        Operator::Neq => target.current_value != threshold,
        Operator::Gte => target.current_value >= threshold,
        Operator::Lte => target.current_value <= threshold,
        Operator::Running => target.state.is_do_running(),
        Operator::Finished => target.state == crate::card::CardState::Do(DoState::Finished),
        Operator::Stopped => matches!(
            target.state,
            crate::card::CardState::Do(DoState::Idle | DoState::Finished)
        ),
    }
}

fn eval_clause(cards: &[LogicCard], clause: &ConditionClause) -> bool {
    if clause.op.is_unconditional() {
        return clause.op == Operator::AlwaysTrue;
    }
    match cards.get(clause.target as usize) {
        Some(target) => eval_operator(target, clause.op, clause.threshold),
        None => false,
    }
}

/// Evaluate a two-clause group. `Combine::None` ignores clause B.
#[must_use]
pub fn eval_group(cards: &[LogicCard], group: &ConditionGroup) -> bool {
    let a = eval_clause(cards, &group.a);
    match group.combine {
        Combine::None => a,
        Combine::And => a && eval_clause(cards, &group.b),
        Combine::Or => a || eval_clause(cards, &group.b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardFamily, CardLayout, CardState};

    fn store() -> Vec<LogicCard> {
        CardLayout::factory().factory_cards()
    }

    #[test]
    fn unconditional_ops_skip_target_lookup() {
        let cards = store();
        let clause = ConditionClause {
            target: 200, // out of range on purpose
            op: Operator::AlwaysTrue,
            threshold: 0,
        };
        assert!(eval_clause(&cards, &clause));
    }

    #[test]
    fn unknown_target_evaluates_false() {
        let cards = store();
        let clause = ConditionClause {
            target: 99,
            op: Operator::LogicalTrue,
            threshold: 0,
        };
        assert!(!eval_clause(&cards, &clause));
    }

    #[test]
    fn numeric_ops_compare_current_value() {
        let mut cards = store();
        cards[8].current_value = 500;
        for (op, expected) in [
            (Operator::Gt, true),
            (Operator::Lt, false),
            (Operator::Eq, false),
            (Operator::Neq, true),
            (Operator::Gte, true),
            (Operator::Lte, false),
        ] {
            let clause = ConditionClause {
                target: 8,
                op,
                threshold: 300,
            };
            assert_eq!(eval_clause(&cards, &clause), expected, "{op:?}");
        }
    }

    #[test]
    fn process_state_ops_follow_do_phase() {
        let mut cards = store();
        assert_eq!(cards[4].family, CardFamily::DigitalOutput);
        let running = ConditionClause {
            target: 4,
            op: Operator::Running,
            threshold: 0,
        };
        let stopped = ConditionClause {
            target: 4,
            op: Operator::Stopped,
            threshold: 0,
        };
        assert!(!eval_clause(&cards, &running));
        assert!(eval_clause(&cards, &stopped));

        cards[4].state = CardState::Do(DoState::OnDelay);
        assert!(eval_clause(&cards, &running));
        assert!(!eval_clause(&cards, &stopped));

        // Process-state operators on a non-DO target degrade to false.
        let on_di = ConditionClause {
            target: 0,
            op: Operator::Running,
            threshold: 0,
        };
        assert!(!eval_clause(&cards, &on_di));
    }

    #[test]
    fn combine_semantics() {
        let mut cards = store();
        cards[0].logical_state = true;
        let a = ConditionClause {
            target: 0,
            op: Operator::LogicalTrue,
            threshold: 0,
        };
        let b = ConditionClause {
            target: 1,
            op: Operator::LogicalTrue,
            threshold: 0,
        };
        let group = |combine| ConditionGroup { a, b, combine };

        assert!(eval_group(&cards, &group(Combine::None)));
        assert!(!eval_group(&cards, &group(Combine::And)));
        assert!(eval_group(&cards, &group(Combine::Or)));

        cards[1].logical_state = true;
        assert!(eval_group(&cards, &group(Combine::And)));
    }
}
