//! Configuration lifecycle: slot files, validation, staged/commit/restore.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::card::{cards_from_wire, cards_to_wire, CardFamily, CardLayout, LogicCard, Operator};
use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::pause::{PauseBarrier, PAUSE_ACK_TIMEOUT};
use crate::settings::PortalSettings;
use crate::snapshot::SharedSnapshot;

/// Persisted configuration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSlot {
    Active,
    Staged,
    Lkg,
    Slot1,
    Slot2,
    Slot3,
    Factory,
}

impl ConfigSlot {
    fn file_name(self) -> &'static str {
        match self {
            Self::Active => "active.json",
            Self::Staged => "staged.json",
            Self::Lkg => "lkg.json",
            Self::Slot1 => "slot1.json",
            Self::Slot2 => "slot2.json",
            Self::Slot3 => "slot3.json",
            Self::Factory => "factory.json",
        }
    }
}

/// Restore source accepted by the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Lkg,
    Slot1,
    Slot2,
    Slot3,
    Factory,
}

impl RestoreSource {
    #[must_use]
    pub fn parse_token(text: &str) -> Option<Self> {
        match text {
            "LKG" => Some(Self::Lkg),
            "SLOT1" => Some(Self::Slot1),
            "SLOT2" => Some(Self::Slot2),
            "SLOT3" => Some(Self::Slot3),
            "FACTORY" => Some(Self::Factory),
            _ => None,
        }
    }

    #[must_use]
    pub fn wire_token(self) -> &'static str {
        match self {
            Self::Lkg => "LKG",
            Self::Slot1 => "SLOT1",
            Self::Slot2 => "SLOT2",
            Self::Slot3 => "SLOT3",
            Self::Factory => "FACTORY",
        }
    }

    fn slot(self) -> ConfigSlot {
        match self {
            Self::Lkg => ConfigSlot::Lkg,
            Self::Slot1 => ConfigSlot::Slot1,
            Self::Slot2 => ConfigSlot::Slot2,
            Self::Slot3 => ConfigSlot::Slot3,
            Self::Factory => ConfigSlot::Factory,
        }
    }
}

const META_FILE: &str = "meta.json";
const PORTAL_FILE: &str = "portal.json";

/// Version labels backing `historyHead` plus the active version counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreMeta {
    pub active_version: u64,
    pub lkg: Option<String>,
    pub slot1: Option<String>,
    pub slot2: Option<String>,
    pub slot3: Option<String>,
}

impl StoreMeta {
    fn active_label(&self) -> String {
        format!("v{}", self.active_version.max(1))
    }
}

/// Flat-file configuration store. All writes go through a temp file and a
/// rename so a power cut never leaves a half-written slot.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Open (and create) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RuntimeError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            RuntimeError::ConfigStore(format!("create {}: {err}", root.display()).into())
        })?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn read_json(&self, file: &str) -> Result<Option<Value>, RuntimeError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).map_err(|err| {
            RuntimeError::ConfigStore(format!("read {}: {err}", path.display()).into())
        })?;
        let value = serde_json::from_str(&text).map_err(|err| {
            RuntimeError::ConfigStore(format!("parse {}: {err}", path.display()).into())
        })?;
        Ok(Some(value))
    }

    fn write_json(&self, file: &str, value: &Value) -> Result<(), RuntimeError> {
        let path = self.path(file);
        let tmp = self.path(&format!("{file}.tmp"));
        let text = serde_json::to_string(value).map_err(|err| {
            RuntimeError::ConfigStore(format!("encode {}: {err}", path.display()).into())
        })?;
        fs::write(&tmp, text).map_err(|err| {
            RuntimeError::ConfigStore(format!("write {}: {err}", tmp.display()).into())
        })?;
        fs::rename(&tmp, &path).map_err(|err| {
            RuntimeError::ConfigStore(format!("rename {}: {err}", path.display()).into())
        })
    }

    /// Read a config slot (a bare card array).
    pub fn read_slot(&self, slot: ConfigSlot) -> Result<Option<Value>, RuntimeError> {
        self.read_json(slot.file_name())
    }

    /// Atomically overwrite a config slot.
    pub fn write_slot(&self, slot: ConfigSlot, cards: &Value) -> Result<(), RuntimeError> {
        self.write_json(slot.file_name(), cards)
    }

    pub fn read_meta(&self) -> Result<StoreMeta, RuntimeError> {
        match self.read_json(META_FILE)? {
            Some(value) => serde_json::from_value(value)
                .map_err(|err| RuntimeError::ConfigStore(format!("meta.json: {err}").into())),
            None => Ok(StoreMeta::default()),
        }
    }

    pub fn write_meta(&self, meta: &StoreMeta) -> Result<(), RuntimeError> {
        let value = serde_json::to_value(meta)
            .map_err(|err| RuntimeError::ConfigStore(format!("meta.json: {err}").into()))?;
        self.write_json(META_FILE, &value)
    }

    pub fn read_portal_settings(&self) -> Result<PortalSettings, RuntimeError> {
        match self.read_json(PORTAL_FILE)? {
            Some(Value::Object(obj)) => Ok(PortalSettings::from_wire(&obj)),
            Some(_) => Err(RuntimeError::ConfigStore(
                "portal.json: not an object".into(),
            )),
            None => Ok(PortalSettings::default()),
        }
    }

    pub fn write_portal_settings(&self, settings: &PortalSettings) -> Result<(), RuntimeError> {
        self.write_json(PORTAL_FILE, &settings.to_wire())
    }
}

/// Structured validation outcome.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Validation {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({ "errors": self.errors, "warnings": self.warnings })
    }

    fn error(&mut self, card: usize, message: impl std::fmt::Display) {
        self.errors.push(format!("card {card}: {message}"));
    }

    fn warning(&mut self, card: usize, message: impl std::fmt::Display) {
        self.warnings.push(format!("card {card}: {message}"));
    }
}

const NUMERIC_FIELDS: &[&str] = &[
    "id",
    "index",
    "hwPin",
    "setting1",
    "setting2",
    "currentValue",
    "startOnMs",
    "startOffMs",
    "repeatCounter",
    "setA_ID",
    "setA_Threshold",
    "setB_ID",
    "setB_Threshold",
    "resetA_ID",
    "resetA_Threshold",
    "resetB_ID",
    "resetB_Threshold",
];

/// Validate a raw wire card array against a layout.
#[must_use]
pub fn validate_cards(cards: &Value, layout: &CardLayout) -> Validation {
    let mut report = Validation::default();
    let Some(array) = cards.as_array() else {
        report.errors.push("config.cards must be an array".into());
        return report;
    };
    if array.len() != layout.total() {
        report.errors.push(format!(
            "expected exactly {} cards, got {}",
            layout.total(),
            array.len()
        ));
        return report;
    }

    for (position, item) in array.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            report.error(position, "entry must be an object");
            continue;
        };
        let family = layout
            .family_of(position)
            .expect("position within layout total");

        for &field in NUMERIC_FIELDS {
            if let Some(value) = obj.get(field) {
                if value.as_u64().is_none() {
                    report.error(position, format!("'{field}' must be a non-negative integer"));
                }
            }
        }
        validate_alpha(&mut report, position, family, obj.get("setting3"));

        if let Some(id) = obj.get("id").and_then(Value::as_u64) {
            if id != position as u64 {
                report.error(position, format!("id {id} must equal its position"));
            }
        }
        if let Some(token) = obj.get("type").and_then(Value::as_str) {
            match CardFamily::parse_token(token) {
                Some(parsed) if parsed != family => {
                    report.error(
                        position,
                        format!("type '{token}' conflicts with the id partition"),
                    );
                }
                Some(_) => {}
                None => report.warning(position, format!("unknown type token '{token}'")),
            }
        }
        if let Some(token) = obj.get("mode").and_then(Value::as_str) {
            match crate::card::CardMode::parse_token(token) {
                Some(mode) if !mode.fits(family) => {
                    report.error(
                        position,
                        format!("mode '{token}' not permitted for {}", family.wire_token()),
                    );
                }
                Some(_) => {}
                None => report.warning(position, format!("unknown mode token '{token}'")),
            }
        }
        if let Some(token) = obj.get("state").and_then(Value::as_str) {
            if let Some(state) = crate::card::CardState::parse_token(token) {
                if !state.fits(family) {
                    report.warning(
                        position,
                        format!("state '{token}' belongs to another family"),
                    );
                }
            }
        }

        if family == CardFamily::AnalogInput {
            let s1 = obj.get("setting1").and_then(Value::as_u64).unwrap_or(0);
            let s2 = obj.get("setting2").and_then(Value::as_u64).unwrap_or(0);
            if s1 > s2 {
                report.error(position, "AI input bounds require setting1 <= setting2");
            }
        }

        validate_group(&mut report, position, layout, obj, "set");
        validate_group(&mut report, position, layout, obj, "reset");

        if family == CardFamily::AnalogInput {
            let base = layout.card_defaults(position).expect("valid position");
            let parsed = LogicCard::from_wire(obj, &base);
            if !parsed.set.is_default() || !parsed.reset.is_default() {
                report.warning(position, "SET/RESET conditions are inert on AI cards");
            }
        }
    }
    report
}

fn validate_alpha(
    report: &mut Validation,
    position: usize,
    family: CardFamily,
    value: Option<&Value>,
) {
    let Some(value) = value else { return };
    if family == CardFamily::AnalogInput {
        if let Some(v) = value.as_u64() {
            if v > 1000 {
                report.warning(position, format!("alpha {v} clamps to 1000"));
            }
        } else if let Some(f) = value.as_f64() {
            if !(0.0..=1.0).contains(&f) {
                report.error(position, format!("alpha {f} outside [0.0, 1.0]"));
            }
        } else {
            report.error(position, "'setting3' must be numeric");
        }
    } else if value.as_u64().is_none() {
        report.error(position, "'setting3' must be a non-negative integer");
    }
}

fn validate_group(
    report: &mut Validation,
    position: usize,
    layout: &CardLayout,
    obj: &serde_json::Map<String, Value>,
    prefix: &str,
) {
    for letter in ["A", "B"] {
        let id_key = format!("{prefix}{letter}_ID");
        let op_key = format!("{prefix}{letter}_Operator");
        let target = obj.get(&id_key).and_then(Value::as_u64);
        if let Some(target) = target {
            if target >= layout.total() as u64 {
                report.error(position, format!("'{id_key}' {target} out of range"));
                continue;
            }
        }
        let Some(token) = obj.get(&op_key).and_then(Value::as_str) else {
            continue;
        };
        let Some(op) = Operator::parse_token(token) else {
            report.warning(position, format!("unknown operator token '{token}'"));
            continue;
        };
        if op.is_unconditional() {
            continue;
        }
        let Some(target_family) = target
            .map(|t| t as usize)
            .and_then(|t| layout.family_of(t))
        else {
            continue;
        };
        let allowed = if op.is_numeric() {
            target_family == CardFamily::AnalogInput
        } else if op.is_process_state() {
            target_family.is_output_like()
        } else {
            target_family != CardFamily::AnalogInput
        };
        if !allowed {
            report.error(
                position,
                format!(
                    "operator '{token}' not valid for target family {}",
                    target_family.wire_token()
                ),
            );
        }
    }
}

/// Outcome of a successful commit or restore.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub active_version: String,
    pub history_head: StoreMeta,
}

enum ApplyKind {
    Commit,
    Restore(RestoreSource),
}

impl ApplyKind {
    fn fail(&self, message: String) -> RuntimeError {
        match self {
            Self::Commit => RuntimeError::CommitFailed(message.into()),
            Self::Restore(source) => {
                RuntimeError::RestoreFailed(format!("{}: {message}", source.wire_token()).into())
            }
        }
    }
}

/// Drives validate/stage/commit/restore against a live kernel.
pub struct ConfigManager {
    layout: CardLayout,
    store: ConfigStore,
    engine: Arc<Mutex<Engine>>,
    snapshot: Arc<SharedSnapshot>,
    barrier: Arc<PauseBarrier>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
    meta: Mutex<StoreMeta>,
}

impl ConfigManager {
    pub fn new(
        layout: CardLayout,
        store: ConfigStore,
        engine: Arc<Mutex<Engine>>,
        snapshot: Arc<SharedSnapshot>,
        barrier: Arc<PauseBarrier>,
        clock: Arc<dyn Fn() -> u64 + Send + Sync>,
    ) -> Result<Self, RuntimeError> {
        let mut meta = store.read_meta()?;
        if meta.active_version == 0 {
            meta.active_version = 1;
        }
        Ok(Self {
            layout,
            store,
            engine,
            snapshot,
            barrier,
            clock,
            meta: Mutex::new(meta),
        })
    }

    #[must_use]
    pub fn layout(&self) -> &CardLayout {
        &self.layout
    }

    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Boot-time card load: active slot if readable, else freshly written
    /// factory defaults. The degraded flag reports a store that could not be
    /// read or repaired.
    pub fn boot_cards(&self) -> (Vec<LogicCard>, bool) {
        let factory = self.layout.factory_cards();
        if self
            .store
            .read_slot(ConfigSlot::Factory)
            .ok()
            .flatten()
            .is_none()
        {
            let wire = cards_to_wire(&factory);
            if let Err(err) = self.store.write_slot(ConfigSlot::Factory, &wire) {
                warn!("factory baseline write failed: {err}");
                return (factory, true);
            }
        }
        match self.store.read_slot(ConfigSlot::Active) {
            Ok(Some(value)) => match cards_from_wire(&value, &self.layout) {
                Some(cards) => (cards, false),
                None => {
                    warn!("active config malformed, rewriting factory defaults");
                    let wire = cards_to_wire(&factory);
                    let degraded = self.store.write_slot(ConfigSlot::Active, &wire).is_err();
                    (factory, degraded)
                }
            },
            Ok(None) => {
                let wire = cards_to_wire(&factory);
                let degraded = self.store.write_slot(ConfigSlot::Active, &wire).is_err();
                (factory, degraded)
            }
            Err(err) => {
                warn!("active config unreadable: {err}");
                (factory, true)
            }
        }
    }

    /// Active cards plus the active version label.
    pub fn active(&self) -> Result<(Value, String), RuntimeError> {
        let cards = match self.store.read_slot(ConfigSlot::Active)? {
            Some(value) => value,
            None => cards_to_wire(&self.layout.factory_cards()),
        };
        let version = self.meta.lock().expect("meta lock poisoned").active_label();
        Ok((cards, version))
    }

    /// Validate and atomically overwrite the staged slot.
    pub fn stage_save(&self, body: &Value) -> Result<Validation, RuntimeError> {
        let cards = extract_cards(body)?;
        let report = validate_cards(cards, &self.layout);
        if !report.is_ok() {
            return Err(RuntimeError::ValidationFailed(
                report.errors.join("; ").into(),
            ));
        }
        self.store.write_slot(ConfigSlot::Staged, cards)?;
        Ok(report)
    }

    /// Validate the supplied body, or the staged slot when absent. Never
    /// mutates the runtime.
    pub fn validate(&self, body: Option<&Value>) -> Result<Validation, RuntimeError> {
        let cards = match body {
            Some(body) => extract_cards(body)?.clone(),
            None => self
                .store
                .read_slot(ConfigSlot::Staged)?
                .ok_or_else(|| RuntimeError::NotFound("no staged configuration".into()))?,
        };
        Ok(validate_cards(&cards, &self.layout))
    }

    /// Commit the body (or the staged slot) as the new active configuration.
    pub fn commit(&self, body: Option<&Value>) -> Result<CommitOutcome, RuntimeError> {
        let cards = match body {
            Some(body) => extract_cards(body)?.clone(),
            None => self
                .store
                .read_slot(ConfigSlot::Staged)?
                .ok_or_else(|| RuntimeError::NotFound("no staged configuration".into()))?,
        };
        self.apply(&cards, ApplyKind::Commit)
    }

    /// Restore a history slot or the factory baseline as the new active.
    pub fn restore(&self, source: RestoreSource) -> Result<CommitOutcome, RuntimeError> {
        let cards = self.store.read_slot(source.slot())?.ok_or_else(|| {
            RuntimeError::RestoreFailed(
                format!("slot {} has no configuration", source.wire_token()).into(),
            )
        })?;
        self.apply(&cards, ApplyKind::Restore(source))
    }

    /// Current portal settings (store copy).
    pub fn portal_settings(&self) -> Result<PortalSettings, RuntimeError> {
        self.store.read_portal_settings()
    }

    /// Apply a settings update: persist, then retune the live scan interval.
    pub fn update_portal_settings(&self, body: &Value) -> Result<PortalSettings, RuntimeError> {
        let current = self.store.read_portal_settings()?;
        let next = current.apply_update(body)?;
        self.store.write_portal_settings(&next)?;
        self.engine
            .lock()
            .expect("engine lock poisoned")
            .set_scan_interval_ms(next.scan_interval_ms);
        Ok(next)
    }

    fn apply(&self, cards_wire: &Value, kind: ApplyKind) -> Result<CommitOutcome, RuntimeError> {
        let report = validate_cards(cards_wire, &self.layout);
        if !report.is_ok() {
            return Err(RuntimeError::ValidationFailed(
                report.errors.join("; ").into(),
            ));
        }
        let cards = cards_from_wire(cards_wire, &self.layout)
            .ok_or_else(|| kind.fail("card array shape changed during apply".into()))?;

        self.barrier.request_pause();
        if !self.barrier.wait_paused(PAUSE_ACK_TIMEOUT) {
            self.barrier.release();
            return Err(kind.fail("scan engine did not reach the pause point".into()));
        }

        let result = self.apply_paused(cards_wire, cards);
        self.barrier.release();
        match result {
            Ok(outcome) => {
                debug!("configuration applied, active version {}", outcome.active_version);
                Ok(outcome)
            }
            Err(err) => Err(kind.fail(err.to_string())),
        }
    }

    /// History rotation and swap, entered only while the barrier holds.
    fn apply_paused(
        &self,
        cards_wire: &Value,
        cards: Vec<LogicCard>,
    ) -> Result<CommitOutcome, RuntimeError> {
        let mut meta = self.meta.lock().expect("meta lock poisoned");

        let old_active = self.store.read_slot(ConfigSlot::Active)?;
        let old_lkg = self.store.read_slot(ConfigSlot::Lkg)?;
        let old_slot1 = self.store.read_slot(ConfigSlot::Slot1)?;
        let old_slot2 = self.store.read_slot(ConfigSlot::Slot2)?;

        if let Some(value) = old_slot2 {
            self.store.write_slot(ConfigSlot::Slot3, &value)?;
        }
        if let Some(value) = old_slot1 {
            self.store.write_slot(ConfigSlot::Slot2, &value)?;
        }
        if let Some(value) = old_lkg {
            self.store.write_slot(ConfigSlot::Slot1, &value)?;
        }
        if let Some(value) = old_active {
            self.store.write_slot(ConfigSlot::Lkg, &value)?;
        }
        self.store.write_slot(ConfigSlot::Active, cards_wire)?;

        let rotated = StoreMeta {
            active_version: meta.active_version + 1,
            lkg: Some(meta.active_label()),
            slot1: meta.lkg.clone(),
            slot2: meta.slot1.clone(),
            slot3: meta.slot2.clone(),
        };
        self.store.write_meta(&rotated)?;
        *meta = rotated.clone();
        drop(meta);

        {
            let mut engine = self.engine.lock().expect("engine lock poisoned");
            engine.apply_config(cards);
            self.snapshot.publish(&engine, (self.clock)());
        }

        Ok(CommitOutcome {
            active_version: rotated.active_label(),
            history_head: rotated,
        })
    }
}

fn extract_cards(body: &Value) -> Result<&Value, RuntimeError> {
    body.get("config")
        .and_then(|config| config.get("cards"))
        .ok_or_else(|| RuntimeError::InvalidRequest("body must carry config.cards".into()))
}
