//! LogicCard data model, per-family modes/states, and the persisted wire schema.

#![allow(missing_docs)]

use serde_json::{json, Map, Value};

/// Hardware pin value marking a virtual card (never passed to the HAL).
pub const VIRTUAL_PIN: u8 = 255;

/// Card family. Global ids partition as DI ‖ DO ‖ AI ‖ SIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFamily {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    SoftIo,
}

impl CardFamily {
    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::DigitalInput => "DigitalInput",
            Self::DigitalOutput => "DigitalOutput",
            Self::AnalogInput => "AnalogInput",
            Self::SoftIo => "SoftIO",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "DigitalInput" => Some(Self::DigitalInput),
            "DigitalOutput" => Some(Self::DigitalOutput),
            "AnalogInput" => Some(Self::AnalogInput),
            "SoftIO" => Some(Self::SoftIo),
            _ => None,
        }
    }

    /// True for families running the DO/SIO phase engine.
    #[must_use]
    pub fn is_output_like(self) -> bool {
        matches!(self, Self::DigitalOutput | Self::SoftIo)
    }
}

/// DI edge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiMode {
    #[default]
    Rising,
    Falling,
    Change,
}

/// DO/SIO execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoMode {
    #[default]
    Normal,
    Immediate,
    Gated,
}

/// AI placeholder mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiMode {
    #[default]
    Continuous,
}

/// Family-tagged card mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardMode {
    Di(DiMode),
    Do(DoMode),
    Ai(AiMode),
}

impl CardMode {
    #[must_use]
    pub fn default_for(family: CardFamily) -> Self {
        match family {
            CardFamily::DigitalInput => Self::Di(DiMode::default()),
            CardFamily::DigitalOutput | CardFamily::SoftIo => Self::Do(DoMode::default()),
            CardFamily::AnalogInput => Self::Ai(AiMode::default()),
        }
    }

    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::Di(DiMode::Rising) => "Mode_DI_Rising",
            Self::Di(DiMode::Falling) => "Mode_DI_Falling",
            Self::Di(DiMode::Change) => "Mode_DI_Change",
            Self::Do(DoMode::Normal) => "Mode_DO_Normal",
            Self::Do(DoMode::Immediate) => "Mode_DO_Immediate",
            Self::Do(DoMode::Gated) => "Mode_DO_Gated",
            Self::Ai(AiMode::Continuous) => "Mode_AI_Continuous",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "Mode_DI_Rising" => Some(Self::Di(DiMode::Rising)),
            "Mode_DI_Falling" => Some(Self::Di(DiMode::Falling)),
            "Mode_DI_Change" => Some(Self::Di(DiMode::Change)),
            "Mode_DO_Normal" => Some(Self::Do(DoMode::Normal)),
            "Mode_DO_Immediate" => Some(Self::Do(DoMode::Immediate)),
            "Mode_DO_Gated" => Some(Self::Do(DoMode::Gated)),
            "Mode_AI_Continuous" => Some(Self::Ai(AiMode::Continuous)),
            _ => None,
        }
    }

    /// True when the mode variant belongs to the given family.
    #[must_use]
    pub fn fits(self, family: CardFamily) -> bool {
        match self {
            Self::Di(_) => family == CardFamily::DigitalInput,
            Self::Do(_) => family.is_output_like(),
            Self::Ai(_) => family == CardFamily::AnalogInput,
        }
    }
}

/// DI filtering lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiState {
    #[default]
    Idle,
    Filtering,
    Qualified,
    Inhibited,
}

/// DO/SIO phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoState {
    #[default]
    Idle,
    OnDelay,
    Active,
    Finished,
}

/// AI placeholder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiState {
    #[default]
    Streaming,
}

/// Family-tagged card state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    Di(DiState),
    Do(DoState),
    Ai(AiState),
}

impl CardState {
    #[must_use]
    pub fn default_for(family: CardFamily) -> Self {
        match family {
            CardFamily::DigitalInput => Self::Di(DiState::default()),
            CardFamily::DigitalOutput | CardFamily::SoftIo => Self::Do(DoState::default()),
            CardFamily::AnalogInput => Self::Ai(AiState::default()),
        }
    }

    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::Di(DiState::Idle) => "State_DI_Idle",
            Self::Di(DiState::Filtering) => "State_DI_Filtering",
            Self::Di(DiState::Qualified) => "State_DI_Qualified",
            Self::Di(DiState::Inhibited) => "State_DI_Inhibited",
            Self::Do(DoState::Idle) => "State_DO_Idle",
            Self::Do(DoState::OnDelay) => "State_DO_OnDelay",
            Self::Do(DoState::Active) => "State_DO_Active",
            Self::Do(DoState::Finished) => "State_DO_Finished",
            Self::Ai(AiState::Streaming) => "State_AI_Streaming",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "State_DI_Idle" => Some(Self::Di(DiState::Idle)),
            "State_DI_Filtering" => Some(Self::Di(DiState::Filtering)),
            "State_DI_Qualified" => Some(Self::Di(DiState::Qualified)),
            "State_DI_Inhibited" => Some(Self::Di(DiState::Inhibited)),
            "State_DO_Idle" => Some(Self::Do(DoState::Idle)),
            "State_DO_OnDelay" => Some(Self::Do(DoState::OnDelay)),
            "State_DO_Active" => Some(Self::Do(DoState::Active)),
            "State_DO_Finished" => Some(Self::Do(DoState::Finished)),
            "State_AI_Streaming" => Some(Self::Ai(AiState::Streaming)),
            _ => None,
        }
    }

    #[must_use]
    pub fn fits(self, family: CardFamily) -> bool {
        match self {
            Self::Di(_) => family == CardFamily::DigitalInput,
            Self::Do(_) => family.is_output_like(),
            Self::Ai(_) => family == CardFamily::AnalogInput,
        }
    }

    /// OnDelay or Active.
    #[must_use]
    pub fn is_do_running(self) -> bool {
        matches!(self, Self::Do(DoState::OnDelay | DoState::Active))
    }
}

/// Condition clause operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    AlwaysTrue,
    #[default]
    AlwaysFalse,
    LogicalTrue,
    LogicalFalse,
    PhysicalOn,
    PhysicalOff,
    Triggered,
    TriggerCleared,
    Gt,
    Lt,
    Eq,
    Neq,
    Gte,
    Lte,
    Running,
    Finished,
    Stopped,
}

impl Operator {
    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::AlwaysTrue => "Op_AlwaysTrue",
            Self::AlwaysFalse => "Op_AlwaysFalse",
            Self::LogicalTrue => "Op_LogicalTrue",
            Self::LogicalFalse => "Op_LogicalFalse",
            Self::PhysicalOn => "Op_PhysicalOn",
            Self::PhysicalOff => "Op_PhysicalOff",
            Self::Triggered => "Op_Triggered",
            Self::TriggerCleared => "Op_TriggerCleared",
            Self::Gt => "Op_GT",
            Self::Lt => "Op_LT",
            Self::Eq => "Op_EQ",
            Self::Neq => "Op_NEQ",
            Self::Gte => "Op_GTE",
            Self::Lte => "Op_LTE",
            Self::Running => "Op_Running",
            Self::Finished => "Op_Finished",
            Self::Stopped => "Op_Stopped",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "Op_AlwaysTrue" => Some(Self::AlwaysTrue),
            "Op_AlwaysFalse" => Some(Self::AlwaysFalse),
            "Op_LogicalTrue" => Some(Self::LogicalTrue),
            "Op_LogicalFalse" => Some(Self::LogicalFalse),
            "Op_PhysicalOn" => Some(Self::PhysicalOn),
            "Op_PhysicalOff" => Some(Self::PhysicalOff),
            "Op_Triggered" => Some(Self::Triggered),
            "Op_TriggerCleared" => Some(Self::TriggerCleared),
            "Op_GT" => Some(Self::Gt),
            "Op_LT" => Some(Self::Lt),
            "Op_EQ" => Some(Self::Eq),
            "Op_NEQ" => Some(Self::Neq),
            "Op_GTE" => Some(Self::Gte),
            "Op_LTE" => Some(Self::Lte),
            "Op_Running" => Some(Self::Running),
            "Op_Finished" => Some(Self::Finished),
            "Op_Stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Unconditional operators never touch the referenced card.
    #[must_use]
    pub fn is_unconditional(self) -> bool {
        matches!(self, Self::AlwaysTrue | Self::AlwaysFalse)
    }

    /// Compares against `currentValue`.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Gt | Self::Lt | Self::Eq | Self::Neq | Self::Gte | Self::Lte
        )
    }

    /// Reads the DO/SIO phase state.
    #[must_use]
    pub fn is_process_state(self) -> bool {
        matches!(self, Self::Running | Self::Finished | Self::Stopped)
    }
}

/// Clause combine mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Combine {
    #[default]
    None,
    And,
    Or,
}

impl Combine {
    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::None => "Combine_None",
            Self::And => "Combine_AND",
            Self::Or => "Combine_OR",
        }
    }

    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "Combine_None" => Some(Self::None),
            "Combine_AND" => Some(Self::And),
            "Combine_OR" => Some(Self::Or),
            _ => None,
        }
    }
}

/// One clause of a SET/RESET condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionClause {
    pub target: u8,
    pub op: Operator,
    pub threshold: u32,
}

/// Two-clause SET or RESET group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConditionGroup {
    pub a: ConditionClause,
    pub b: ConditionClause,
    pub combine: Combine,
}

impl ConditionGroup {
    /// True when the group is still at its factory shape (inert).
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One functional element: input, output, analog channel, or virtual signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicCard {
    pub id: u8,
    pub family: CardFamily,
    pub index: u8,
    pub hw_pin: u8,

    pub invert: bool,
    pub setting1: u32,
    pub setting2: u32,
    pub setting3: u32,

    pub logical_state: bool,
    pub physical_state: bool,
    pub trigger_flag: bool,
    pub current_value: u32,
    pub start_on_ms: u32,
    pub start_off_ms: u32,
    pub repeat_counter: u32,

    pub mode: CardMode,
    pub state: CardState,

    pub set: ConditionGroup,
    pub reset: ConditionGroup,
}

impl LogicCard {
    /// Safe defaults for one store position.
    #[must_use]
    pub fn defaults(id: u8, family: CardFamily, index: u8, hw_pin: u8) -> Self {
        Self {
            id,
            family,
            index,
            hw_pin,
            invert: false,
            setting1: 0,
            setting2: 0,
            setting3: 0,
            logical_state: false,
            physical_state: false,
            trigger_flag: false,
            current_value: 0,
            start_on_ms: 0,
            start_off_ms: 0,
            repeat_counter: 0,
            mode: CardMode::default_for(family),
            state: CardState::default_for(family),
            set: ConditionGroup::default(),
            reset: ConditionGroup::default(),
        }
    }

    /// Serialize one card to the persisted JSON object shape.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.family.wire_token(),
            "index": self.index,
            "hwPin": self.hw_pin,
            "invert": self.invert,
            "setting1": self.setting1,
            "setting2": self.setting2,
            "setting3": self.setting3,
            "logicalState": self.logical_state,
            "physicalState": self.physical_state,
            "triggerFlag": self.trigger_flag,
            "currentValue": self.current_value,
            "startOnMs": self.start_on_ms,
            "startOffMs": self.start_off_ms,
            "repeatCounter": self.repeat_counter,
            "mode": self.mode.wire_token(),
            "state": self.state.wire_token(),
            "setA_ID": self.set.a.target,
            "setA_Operator": self.set.a.op.wire_token(),
            "setA_Threshold": self.set.a.threshold,
            "setB_ID": self.set.b.target,
            "setB_Operator": self.set.b.op.wire_token(),
            "setB_Threshold": self.set.b.threshold,
            "setCombine": self.set.combine.wire_token(),
            "resetA_ID": self.reset.a.target,
            "resetA_Operator": self.reset.a.op.wire_token(),
            "resetA_Threshold": self.reset.a.threshold,
            "resetB_ID": self.reset.b.target,
            "resetB_Operator": self.reset.b.op.wire_token(),
            "resetB_Threshold": self.reset.b.threshold,
            "resetCombine": self.reset.combine.wire_token(),
        })
    }

    /// Deserialize one card from a wire object, starting from `base` defaults.
    ///
    /// Missing keys and unknown tokens keep the base value; a mode or state
    /// token for the wrong family also keeps the base value.
    #[must_use]
    pub fn from_wire(obj: &Map<String, Value>, base: &Self) -> Self {
        let mut card = base.clone();

        card.invert = bool_field(obj, "invert").unwrap_or(card.invert);
        card.setting1 = u32_field(obj, "setting1").unwrap_or(card.setting1);
        card.setting2 = u32_field(obj, "setting2").unwrap_or(card.setting2);
        card.setting3 = match card.family {
            CardFamily::AnalogInput => alpha_field(obj, "setting3").unwrap_or(card.setting3),
            _ => u32_field(obj, "setting3").unwrap_or(card.setting3),
        };

        card.logical_state = bool_field(obj, "logicalState").unwrap_or(card.logical_state);
        card.physical_state = bool_field(obj, "physicalState").unwrap_or(card.physical_state);
        card.trigger_flag = bool_field(obj, "triggerFlag").unwrap_or(card.trigger_flag);
        card.current_value = u32_field(obj, "currentValue").unwrap_or(card.current_value);
        card.start_on_ms = u32_field(obj, "startOnMs").unwrap_or(card.start_on_ms);
        card.start_off_ms = u32_field(obj, "startOffMs").unwrap_or(card.start_off_ms);
        card.repeat_counter = u32_field(obj, "repeatCounter").unwrap_or(card.repeat_counter);

        if let Some(mode) = str_field(obj, "mode").and_then(CardMode::parse_token) {
            if mode.fits(card.family) {
                card.mode = mode;
            }
        }
        if let Some(state) = str_field(obj, "state").and_then(CardState::parse_token) {
            if state.fits(card.family) {
                card.state = state;
            }
        }

        card.set = group_from_wire(obj, "set", &card.set);
        card.reset = group_from_wire(obj, "reset", &card.reset);
        card
    }
}

fn group_from_wire(obj: &Map<String, Value>, prefix: &str, base: &ConditionGroup) -> ConditionGroup {
    let clause = |letter: &str, fallback: &ConditionClause| ConditionClause {
        target: u32_field(obj, &format!("{prefix}{letter}_ID"))
            .map_or(fallback.target, |v| v.min(u32::from(u8::MAX)) as u8),
        op: str_field(obj, &format!("{prefix}{letter}_Operator"))
            .and_then(Operator::parse_token)
            .unwrap_or(fallback.op),
        threshold: u32_field(obj, &format!("{prefix}{letter}_Threshold"))
            .unwrap_or(fallback.threshold),
    };
    ConditionGroup {
        a: clause("A", &base.a),
        b: clause("B", &base.b),
        combine: str_field(obj, &format!("{prefix}Combine"))
            .and_then(Combine::parse_token)
            .unwrap_or(base.combine),
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    obj.get(key).and_then(Value::as_bool)
}

fn u32_field(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// AI alpha accepts both milliunit integers and fractional 0.0..=1.0 payloads.
fn alpha_field(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    let value = obj.get(key)?;
    if let Some(v) = value.as_u64() {
        return Some(u32::try_from(v).unwrap_or(u32::MAX));
    }
    let f = value.as_f64()?;
    if (0.0..=1.0).contains(&f) {
        return Some((f * 1000.0).round() as u32);
    }
    None
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

/// Fixed card complement: counts and hardware pin assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLayout {
    pub di_pins: Vec<u8>,
    pub do_pins: Vec<u8>,
    pub ai_pins: Vec<u8>,
    pub sio_count: u8,
}

impl Default for CardLayout {
    fn default() -> Self {
        Self::factory()
    }
}

impl CardLayout {
    /// Factory hardware complement: 4 DI, 4 DO, 2 AI, 4 virtual SIO.
    #[must_use]
    pub fn factory() -> Self {
        Self {
            di_pins: vec![13, 12, 14, 27],
            do_pins: vec![26, 25, 33, 32],
            ai_pins: vec![35, 34],
            sio_count: 4,
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.di_pins.len() + self.do_pins.len() + self.ai_pins.len() + self.sio_count as usize
    }

    #[must_use]
    pub fn di_start(&self) -> usize {
        0
    }

    #[must_use]
    pub fn do_start(&self) -> usize {
        self.di_pins.len()
    }

    #[must_use]
    pub fn ai_start(&self) -> usize {
        self.do_start() + self.do_pins.len()
    }

    #[must_use]
    pub fn sio_start(&self) -> usize {
        self.ai_start() + self.ai_pins.len()
    }

    /// Family of a global id, by partition.
    #[must_use]
    pub fn family_of(&self, id: usize) -> Option<CardFamily> {
        if id < self.do_start() {
            Some(CardFamily::DigitalInput)
        } else if id < self.ai_start() {
            Some(CardFamily::DigitalOutput)
        } else if id < self.sio_start() {
            Some(CardFamily::AnalogInput)
        } else if id < self.total() {
            Some(CardFamily::SoftIo)
        } else {
            None
        }
    }

    /// Canonical scan order: DI, then AI, then SIO, then DO, each by index.
    #[must_use]
    pub fn scan_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.total());
        order.extend(self.di_start()..self.do_start());
        order.extend(self.ai_start()..self.sio_start());
        order.extend(self.sio_start()..self.total());
        order.extend(self.do_start()..self.ai_start());
        order
    }

    /// Safe defaults for one store position.
    #[must_use]
    pub fn card_defaults(&self, id: usize) -> Option<LogicCard> {
        let family = self.family_of(id)?;
        let (index, pin) = match family {
            CardFamily::DigitalInput => {
                let index = id - self.di_start();
                (index, self.di_pins[index])
            }
            CardFamily::DigitalOutput => {
                let index = id - self.do_start();
                (index, self.do_pins[index])
            }
            CardFamily::AnalogInput => {
                let index = id - self.ai_start();
                (index, self.ai_pins[index])
            }
            CardFamily::SoftIo => (id - self.sio_start(), VIRTUAL_PIN),
        };
        Some(LogicCard::defaults(id as u8, family, index as u8, pin))
    }

    /// Full factory-default card store.
    #[must_use]
    pub fn factory_cards(&self) -> Vec<LogicCard> {
        (0..self.total())
            .map(|id| {
                self.card_defaults(id)
                    .expect("id within layout total")
            })
            .collect()
    }
}

/// Serialize a full card store to the persisted wire array.
#[must_use]
pub fn cards_to_wire(cards: &[LogicCard]) -> Value {
    Value::Array(cards.iter().map(LogicCard::to_wire).collect())
}

/// Deserialize a full card store from a wire array against a layout.
///
/// Returns `None` when the payload is not an array of exactly `layout.total()`
/// objects; field-level problems fall back to position defaults instead.
#[must_use]
pub fn cards_from_wire(value: &Value, layout: &CardLayout) -> Option<Vec<LogicCard>> {
    let array = value.as_array()?;
    if array.len() != layout.total() {
        return None;
    }
    let mut cards = Vec::with_capacity(array.len());
    for (id, item) in array.iter().enumerate() {
        let obj = item.as_object()?;
        let base = layout.card_defaults(id)?;
        cards.push(LogicCard::from_wire(obj, &base));
    }
    Some(cards)
}
