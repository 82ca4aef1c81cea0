//! Build-modification registry
//!
//! Build modifications are branch-like edits to step content: a modified
//! block between BEGIN and END_MOD, the original block between END_MOD
//! and END, and an action (apply or remove) that picks which block the
//! step shows. The registry keys every modification, tracks its nesting
//! level and directive positions, and keeps a per-step history of
//! actions so that navigating backward reproduces the content exactly as
//! it was when that step was last displayed.
//!
//! History is append-ordered by step index and never rewritten in place;
//! an action change at step N leaves every entry before N intact. The
//! only destructive operation is [`BuildModRegistry::delete_from`], used
//! when a jump invalidates everything downstream of a step.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use brickpub_core::data::Where;
use brickpub_core::error::BuildModError;

/// The action in force for a modification at some step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildModAction {
    /// Show the modified block, suppress the original.
    Apply,
    /// Show the original block, suppress the modified.
    Remove,
}

impl std::fmt::Display for BuildModAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildModAction::Apply => write!(f, "APPLY"),
            BuildModAction::Remove => write!(f, "REMOVE"),
        }
    }
}

/// Directive lifecycle phase of a modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildModPhase {
    /// Declared but no directive seen yet.
    #[default]
    None,
    /// BEGIN seen; inside the modified block.
    Begin,
    /// END_MOD seen; inside the original block.
    EndMod,
    /// END seen; the construct is complete.
    End,
}

/// Line positions and anchoring of one modification
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildModAttributes {
    /// Line number of BEGIN.
    pub begin_line: usize,
    /// Line number of END_MOD.
    pub action_line: usize,
    /// Line number of END.
    pub end_line: usize,
    /// Page displayed when the modification was last acted on.
    pub display_page: usize,
    /// Parts accumulated in the anchoring step when BEGIN was seen.
    pub step_piece_count: usize,
    /// Submodel the construct lives in.
    pub model_index: usize,
    /// Line of the BEGIN within that submodel.
    pub model_line: usize,
    /// Step index the modification is anchored at.
    pub step_number: usize,
}

/// One registered build modification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildModification {
    key: String,
    level: usize,
    phase: BuildModPhase,
    attributes: BuildModAttributes,
    action_history: BTreeMap<usize, BuildModAction>,
}

impl BuildModification {
    fn new(key: impl Into<String>, level: usize) -> Self {
        Self {
            key: key.into(),
            level,
            phase: BuildModPhase::None,
            attributes: BuildModAttributes::default(),
            action_history: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Nesting level, 1-based and positional
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn phase(&self) -> BuildModPhase {
        self.phase
    }

    pub fn attributes(&self) -> &BuildModAttributes {
        &self.attributes
    }

    /// The action recorded at or before a step index
    pub fn action_at(&self, step_index: usize) -> Option<BuildModAction> {
        self.action_history
            .range(..=step_index)
            .next_back()
            .map(|(_, action)| *action)
    }

    /// Number of recorded action entries
    pub fn history_len(&self) -> usize {
        self.action_history.len()
    }

    /// Whether the recorded directive lines are in strict Begin, End_Mod,
    /// End order; meaningful only once all three are recorded
    pub fn attributes_consistent(&self) -> bool {
        let a = &self.attributes;
        if a.action_line == 0 || a.end_line == 0 {
            return true;
        }
        a.begin_line < a.action_line && a.action_line < a.end_line
    }
}

/// Keyed store of build modifications with an open-construct stack
#[derive(Debug, Clone, Default)]
pub struct BuildModRegistry {
    mods: HashMap<String, BuildModification>,
    /// Keys of constructs whose END has not been seen, innermost last.
    open: Vec<String>,
}

impl BuildModRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-enter a modification at a BEGIN directive
    ///
    /// The nesting level is positional: one more than the number of
    /// currently-open constructs, independent of key identity. Returns
    /// the level assigned.
    pub fn begin_modification(&mut self, key: &str, loc: &Where, step_number: usize) -> usize {
        let level = self.open.len() + 1;
        let entry = self
            .mods
            .entry(key.to_string())
            .or_insert_with(|| BuildModification::new(key, level));
        entry.level = level;
        entry.phase = BuildModPhase::Begin;
        entry.attributes.begin_line = loc.line_number;
        entry.attributes.model_index = loc.model_index;
        entry.attributes.model_line = loc.line_number;
        entry.attributes.step_number = step_number;
        self.open.push(key.to_string());
        debug!(key, level, step = step_number, "build modification opened");
        level
    }

    /// Record the parts accumulated in the anchoring step
    pub fn record_piece_count(&mut self, key: &str, pieces: usize) {
        if let Some(entry) = self.mods.get_mut(key) {
            entry.attributes.step_piece_count = pieces;
        }
    }

    /// Record the page displayed when the modification was acted on
    pub fn record_display_page(&mut self, key: &str, page: usize) {
        if let Some(entry) = self.mods.get_mut(key) {
            entry.attributes.display_page = page;
        }
    }

    /// Move the innermost open construct from its modified block to its
    /// original block at an END_MOD directive
    ///
    /// # Errors
    /// Fails with no open construct, or when the construct is not in its
    /// modified block; the state is unchanged on error.
    pub fn transition_end_mod(&mut self, loc: &Where) -> Result<String, BuildModError> {
        let key = self
            .open
            .last()
            .cloned()
            .ok_or(BuildModError::EndModWithoutBegin { loc: loc.clone() })?;
        let entry = self
            .mods
            .get_mut(&key)
            .ok_or(BuildModError::EndModWithoutBegin { loc: loc.clone() })?;
        if entry.phase != BuildModPhase::Begin {
            return Err(BuildModError::PhaseOutOfOrder {
                key,
                phase: "END_MOD".to_string(),
                loc: loc.clone(),
            });
        }
        entry.phase = BuildModPhase::EndMod;
        entry.attributes.action_line = loc.line_number;
        Ok(key)
    }

    /// Close the innermost open construct at an END directive
    ///
    /// A construct whose END arrives straight from its modified block is
    /// closed anyway so traversal can continue, and the ordering problem
    /// is returned for reporting.
    ///
    /// # Errors
    /// Fails with no open construct (no state change), or reports the
    /// out-of-order close described above.
    pub fn transition_end(&mut self, loc: &Where) -> Result<String, BuildModError> {
        let key = self
            .open
            .pop()
            .ok_or(BuildModError::EndWithoutBegin { loc: loc.clone() })?;
        let Some(entry) = self.mods.get_mut(&key) else {
            return Err(BuildModError::EndWithoutBegin { loc: loc.clone() });
        };
        let was = entry.phase;
        entry.phase = BuildModPhase::End;
        entry.attributes.end_line = loc.line_number;
        if !entry.attributes_consistent() {
            warn!(
                key,
                begin = entry.attributes.begin_line,
                action = entry.attributes.action_line,
                end = entry.attributes.end_line,
                "build modification directive lines out of order"
            );
        }
        if was != BuildModPhase::EndMod {
            return Err(BuildModError::PhaseOutOfOrder {
                key,
                phase: "END".to_string(),
                loc: loc.clone(),
            });
        }
        Ok(key)
    }

    /// Record the action for a step index, preserving all earlier entries
    ///
    /// Returns the action previously recorded at exactly that index, if
    /// any.
    pub fn set_action(
        &mut self,
        key: &str,
        step_index: usize,
        action: BuildModAction,
    ) -> Option<BuildModAction> {
        let entry = self
            .mods
            .entry(key.to_string())
            .or_insert_with(|| BuildModification::new(key, 1));
        let previous = entry.action_history.insert(step_index, action);
        debug!(key, step = step_index, %action, "build modification action recorded");
        previous
    }

    /// The action recorded at or before a step index
    pub fn action_at(&self, key: &str, step_index: usize) -> Option<BuildModAction> {
        self.mods.get(key).and_then(|m| m.action_at(step_index))
    }

    /// The action in force at a step, with a fallback for keys never
    /// registered or not yet acted on
    pub fn action_or(
        &self,
        key: &str,
        step_index: usize,
        fallback: BuildModAction,
    ) -> BuildModAction {
        self.action_at(key, step_index).unwrap_or(fallback)
    }

    /// Purge everything anchored at or after a step index
    ///
    /// Modifications anchored there are dropped entirely; surviving
    /// modifications lose their history entries from that index on.
    /// Returns the number of modifications dropped.
    pub fn delete_from(&mut self, step_index: usize) -> usize {
        let before = self.mods.len();
        self.mods
            .retain(|_, m| m.attributes.step_number < step_index);
        for m in self.mods.values_mut() {
            m.action_history.split_off(&step_index);
        }
        let mods = &self.mods;
        self.open.retain(|k| mods.contains_key(k));
        let dropped = before - self.mods.len();
        if dropped > 0 {
            debug!(step = step_index, dropped, "build modifications purged");
        }
        dropped
    }

    /// Forget constructs left open by an interrupted walk
    ///
    /// The open stack tracks constructs within one sweep; a sweep that
    /// returned early can leave entries behind, and the next sweep must
    /// not mistake them for matching BEGINs.
    pub fn begin_walk(&mut self) {
        self.open.clear();
    }

    /// The innermost open construct, if any
    pub fn current_key(&self) -> Option<&str> {
        self.open.last().map(String::as_str)
    }

    /// Number of constructs whose END has not been seen
    pub fn open_depth(&self) -> usize {
        self.open.len()
    }

    pub fn get(&self, key: &str) -> Option<&BuildModification> {
        self.mods.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.mods.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn clear(&mut self) {
        self.mods.clear();
        self.open.clear();
    }
}
