//! Control surface: validated commands over a bounded queue.
//!
//! Commands are fully validated at enqueue time against the card layout; an
//! invalid command is rejected without touching the engine. The queue is
//! drained by the scan executor between ticks.

#![allow(missing_docs)]

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};

use serde_json::Value;
use smol_str::SmolStr;

use crate::card::{CardFamily, CardLayout};
use crate::engine::{InputForce, RunMode};
use crate::error::RuntimeError;

/// Bounded command queue depth; overflow is reported to the caller.
pub const COMMAND_QUEUE_DEPTH: usize = 32;

/// Control command, validated before enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetRunMode { mode: RunMode },
    StepOnce,
    SetBreakpoint { card: u8, enabled: bool },
    SetTestMode { active: bool },
    SetInputForce { card: u8, force: InputForce },
    SetOutputMask { card: u8, masked: bool },
    SetOutputMaskGlobal { masked: bool },
}

impl Command {
    /// Parse and validate a wire command `{name, payload}` against a layout.
    pub fn from_wire(value: &Value, layout: &CardLayout) -> Result<Self, RuntimeError> {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| reject("missing command name"))?;
        let payload = value.get("payload").cloned().unwrap_or(Value::Null);

        let command = match name {
            "setRunMode" => {
                let mode = payload
                    .get("mode")
                    .and_then(Value::as_str)
                    .and_then(RunMode::parse_token)
                    .ok_or_else(|| reject("unknown run mode"))?;
                Self::SetRunMode { mode }
            }
            "stepOnce" => Self::StepOnce,
            "setBreakpoint" => Self::SetBreakpoint {
                card: card_id(&payload, layout)?,
                enabled: bool_arg(&payload, "enabled")?,
            },
            "setTestMode" => Self::SetTestMode {
                active: bool_arg(&payload, "active")?,
            },
            "setInputForce" => {
                let card = card_id(&payload, layout)?;
                let force = parse_force(&payload, layout, card)?;
                Self::SetInputForce { card, force }
            }
            "setOutputMask" => {
                let card = card_id(&payload, layout)?;
                if layout.family_of(card as usize) != Some(CardFamily::DigitalOutput) {
                    return Err(reject("output mask targets a DO card"));
                }
                Self::SetOutputMask {
                    card,
                    masked: bool_arg(&payload, "masked")?,
                }
            }
            "setOutputMaskGlobal" => Self::SetOutputMaskGlobal {
                masked: bool_arg(&payload, "masked")?,
            },
            other => return Err(reject(format!("unknown command '{other}'"))),
        };
        Ok(command)
    }
}

fn reject(message: impl Into<SmolStr>) -> RuntimeError {
    RuntimeError::CommandRejected(message.into())
}

fn card_id(payload: &Value, layout: &CardLayout) -> Result<u8, RuntimeError> {
    let id = payload
        .get("card")
        .and_then(Value::as_u64)
        .ok_or_else(|| reject("missing card id"))?;
    if id >= layout.total() as u64 {
        return Err(reject(format!("card id {id} out of range")));
    }
    Ok(id as u8)
}

fn bool_arg(payload: &Value, key: &str) -> Result<bool, RuntimeError> {
    payload
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| reject(format!("missing boolean '{key}'")))
}

fn parse_force(payload: &Value, layout: &CardLayout, card: u8) -> Result<InputForce, RuntimeError> {
    let family = layout
        .family_of(card as usize)
        .ok_or_else(|| reject("card id out of range"))?;
    let mode = payload
        .get("mode")
        .and_then(Value::as_str)
        .ok_or_else(|| reject("missing force mode"))?;
    match (family, mode) {
        (CardFamily::DigitalInput | CardFamily::AnalogInput, "Real") => Ok(InputForce::Real),
        (CardFamily::DigitalInput, "ForcedHigh") => Ok(InputForce::ForcedHigh),
        (CardFamily::DigitalInput, "ForcedLow") => Ok(InputForce::ForcedLow),
        (CardFamily::AnalogInput, "ForcedValue") => {
            let value = payload
                .get("value")
                .and_then(Value::as_u64)
                .ok_or_else(|| reject("missing force value"))?;
            Ok(InputForce::ForcedValue(
                u32::try_from(value).map_err(|_| reject("force value out of range"))?,
            ))
        }
        _ => Err(reject(format!(
            "force mode '{mode}' not valid for {}",
            family.wire_token()
        ))),
    }
}

/// Sender half of the bounded command queue.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: SyncSender<Command>,
}

impl CommandSender {
    /// Enqueue a validated command; a full queue is a rejection.
    pub fn send(&self, command: Command) -> Result<(), RuntimeError> {
        self.tx
            .try_send(command)
            .map_err(|_| reject("command queue full"))
    }
}

/// Receiver half, drained by the scan executor between ticks.
#[derive(Debug)]
pub struct CommandQueue {
    rx: Receiver<Command>,
}

impl CommandQueue {
    /// Drain all pending commands without blocking.
    pub fn drain(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(command) => commands.push(command),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        commands
    }
}

/// Create the bounded command channel.
#[must_use]
pub fn command_channel() -> (CommandSender, CommandQueue) {
    let (tx, rx) = sync_channel(COMMAND_QUEUE_DEPTH);
    (CommandSender { tx }, CommandQueue { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layout() -> CardLayout {
        CardLayout::factory()
    }

    #[test]
    fn parses_run_mode_and_step() {
        let cmd = Command::from_wire(
            &json!({"name": "setRunMode", "payload": {"mode": "Slow"}}),
            &layout(),
        )
        .unwrap();
        assert_eq!(cmd, Command::SetRunMode { mode: RunMode::Slow });

        let cmd = Command::from_wire(&json!({"name": "stepOnce"}), &layout()).unwrap();
        assert_eq!(cmd, Command::StepOnce);
    }

    #[test]
    fn rejects_family_inappropriate_forces() {
        // ForcedValue on a DI card
        let err = Command::from_wire(
            &json!({"name": "setInputForce", "payload": {"card": 0, "mode": "ForcedValue", "value": 7}}),
            &layout(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "COMMAND_REJECTED");

        // any force on a DO card
        let err = Command::from_wire(
            &json!({"name": "setInputForce", "payload": {"card": 4, "mode": "ForcedHigh"}}),
            &layout(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "COMMAND_REJECTED");

        // AI forced value is fine
        let cmd = Command::from_wire(
            &json!({"name": "setInputForce", "payload": {"card": 8, "mode": "ForcedValue", "value": 2048}}),
            &layout(),
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetInputForce {
                card: 8,
                force: InputForce::ForcedValue(2048)
            }
        );
    }

    #[test]
    fn rejects_out_of_range_ids_and_unknown_names() {
        let err = Command::from_wire(
            &json!({"name": "setBreakpoint", "payload": {"card": 99, "enabled": true}}),
            &layout(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "COMMAND_REJECTED");

        let err = Command::from_wire(&json!({"name": "frobnicate"}), &layout()).unwrap_err();
        assert_eq!(err.code(), "COMMAND_REJECTED");
    }

    #[test]
    fn output_mask_is_do_only() {
        let err = Command::from_wire(
            &json!({"name": "setOutputMask", "payload": {"card": 10, "masked": true}}),
            &layout(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "COMMAND_REJECTED");
    }

    #[test]
    fn queue_overflow_is_reported() {
        let (tx, _rx) = command_channel();
        for _ in 0..COMMAND_QUEUE_DEPTH {
            tx.send(Command::StepOnce).unwrap();
        }
        assert!(tx.send(Command::StepOnce).is_err());
    }
}
