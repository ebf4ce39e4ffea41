//! Flow-table feature declarations and the admission check.
//!
//! A controller installs per-table features declaring which match fields,
//! instructions and actions the table accepts; every flow-mod candidate is
//! then checked by [`FeaturePolicy::accepts`] before it reaches the table.
//!
//! A slot holding `None` is *unset* and imposes no restriction; a slot
//! holding an empty list declares "no capability". The `miss` slots apply
//! only to the table-miss entry (empty match, priority 0) and fall back to
//! the `hit` slots when unset.

use std::collections::HashMap;

use crate::error::{BadActionCode, BadInstructionCode, BadMatchCode, OfpError};
use crate::oxm::flow_match::{ExperimenterKey, Match};

/// Goto-table instruction type
pub const INST_GOTO_TABLE: u16 = 1;
/// Write-metadata instruction type
pub const INST_WRITE_METADATA: u16 = 2;
/// Write-actions instruction type
pub const INST_WRITE_ACTIONS: u16 = 3;
/// Apply-actions instruction type
pub const INST_APPLY_ACTIONS: u16 = 4;
/// Clear-actions instruction type
pub const INST_CLEAR_ACTIONS: u16 = 5;
/// Meter instruction type
pub const INST_METER: u16 = 6;

/// Output to switch port
pub const ACT_OUTPUT: u16 = 0;
/// Copy TTL outwards
pub const ACT_COPY_TTL_OUT: u16 = 11;
/// Copy TTL inwards
pub const ACT_COPY_TTL_IN: u16 = 12;
/// Set MPLS TTL
pub const ACT_SET_MPLS_TTL: u16 = 15;
/// Decrement MPLS TTL
pub const ACT_DEC_MPLS_TTL: u16 = 16;
/// Push a new VLAN tag
pub const ACT_PUSH_VLAN: u16 = 17;
/// Pop the outer VLAN tag
pub const ACT_POP_VLAN: u16 = 18;
/// Push a new MPLS tag
pub const ACT_PUSH_MPLS: u16 = 19;
/// Pop the outer MPLS tag
pub const ACT_POP_MPLS: u16 = 20;
/// Set queue id when outputting to a port
pub const ACT_SET_QUEUE: u16 = 21;
/// Apply group
pub const ACT_GROUP: u16 = 22;
/// Set IP TTL
pub const ACT_SET_NW_TTL: u16 = 23;
/// Decrement IP TTL
pub const ACT_DEC_NW_TTL: u16 = 24;
/// Set a header field using OXM TLV format
pub const ACT_SET_FIELD: u16 = 25;
/// Push a new PBB service tag
pub const ACT_PUSH_PBB: u16 = 26;
/// Pop the outer PBB service tag
pub const ACT_POP_PBB: u16 = 27;

/// Identity of an instruction: a standard type number or an experimenter
/// `(id, type)` pair.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum InstructionKey {
    Standard(u16),
    Experimenter { experimenter: u32, exp_type: u32 },
}

/// Identity of an action.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ActionKey {
    Standard(u16),
    Experimenter { experimenter: u32, exp_type: u32 },
}

/// Identity of a match field: a basic `oxm_type` or an experimenter key.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum OxmKey {
    Basic(u32),
    Experimenter(ExperimenterKey),
}

/// An experimenter table-features property, kept opaque.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ExperimenterProp {
    pub experimenter: u32,
    pub exp_type: u32,
    pub data: Vec<u8>,
}

/// The capability slots declared for one of the two entry kinds (hit or
/// table-miss).
#[derive(Debug, Clone, Default)]
pub struct PropSet {
    pub instructions: Option<Vec<InstructionKey>>,
    pub next_tables: Option<Vec<u8>>,
    pub write_actions: Option<Vec<ActionKey>>,
    pub apply_actions: Option<Vec<ActionKey>>,
    pub write_setfield: Option<Vec<OxmKey>>,
    pub apply_setfield: Option<Vec<OxmKey>>,
    pub experimenter: Vec<ExperimenterProp>,
}

/// A decoded table-features property, ready to be routed into a
/// [`FeaturePolicy`]. `miss` selects the `*_MISS` variant of the property.
#[derive(Debug, Clone)]
pub enum TableFeatureProp {
    Instructions { miss: bool, keys: Vec<InstructionKey> },
    NextTables { miss: bool, tables: Vec<u8> },
    WriteActions { miss: bool, keys: Vec<ActionKey> },
    ApplyActions { miss: bool, keys: Vec<ActionKey> },
    MatchFields(Vec<OxmKey>),
    Wildcards(Vec<OxmKey>),
    WriteSetfield { miss: bool, keys: Vec<OxmKey> },
    ApplySetfield { miss: bool, keys: Vec<OxmKey> },
    Experimenter { miss: bool, prop: ExperimenterProp },
}

/// A flow-mod candidate as seen by the admission check: its match plus the
/// identities of its instructions and actions.
#[derive(Debug, Clone, Default)]
pub struct FlowEntry {
    pub fields: Match,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub enum Instruction {
    GotoTable(u8),
    WriteMetadata { value: u64, mask: u64 },
    WriteActions(Vec<ActionKey>),
    ApplyActions(Vec<ActionKey>),
    Meter(u32),
    Experimenter { experimenter: u32, exp_type: u32 },
}

/// Per-table feature declaration. Replaced atomically when the controller
/// installs new table features.
#[derive(Debug, Clone)]
pub struct FeaturePolicy {
    pub name: String,
    pub metadata_match: u64,
    pub metadata_write: u64,
    pub config: u32,
    pub max_entries: u32,
    pub match_fields: Option<Vec<OxmKey>>,
    pub wildcards: Option<Vec<OxmKey>>,
    pub hit: PropSet,
    pub miss: PropSet,
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        FeaturePolicy {
            name: String::new(),
            // fully writable/matchable until the controller narrows it
            metadata_match: u64::MAX,
            metadata_write: u64::MAX,
            config: 0,
            max_entries: 0,
            match_fields: None,
            wildcards: None,
            hit: PropSet::default(),
            miss: PropSet::default(),
        }
    }
}

impl FeaturePolicy {
    /// Route one decoded table-features property to its slot.
    pub fn apply_prop(&mut self, prop: TableFeatureProp) {
        match prop {
            TableFeatureProp::Instructions { miss, keys } => {
                self.slot(miss).instructions = Some(keys);
            }
            TableFeatureProp::NextTables { miss, tables } => {
                self.slot(miss).next_tables = Some(tables);
            }
            TableFeatureProp::WriteActions { miss, keys } => {
                self.slot(miss).write_actions = Some(keys);
            }
            TableFeatureProp::ApplyActions { miss, keys } => {
                self.slot(miss).apply_actions = Some(keys);
            }
            TableFeatureProp::MatchFields(keys) => self.match_fields = Some(keys),
            TableFeatureProp::Wildcards(keys) => self.wildcards = Some(keys),
            TableFeatureProp::WriteSetfield { miss, keys } => {
                self.slot(miss).write_setfield = Some(keys);
            }
            TableFeatureProp::ApplySetfield { miss, keys } => {
                self.slot(miss).apply_setfield = Some(keys);
            }
            TableFeatureProp::Experimenter { miss, prop } => {
                self.slot(miss).experimenter.push(prop);
            }
        }
    }

    fn slot(&mut self, miss: bool) -> &mut PropSet {
        if miss {
            &mut self.miss
        } else {
            &mut self.hit
        }
    }

    /// Check a flow-mod candidate against the declared capabilities.
    ///
    /// See the flow table modification messages section of the protocol
    /// spec for the error selection.
    pub fn accepts(&self, entry: &FlowEntry, priority: u16) -> Result<(), OfpError> {
        let is_table_miss = entry.fields.is_empty() && priority == 0;

        let inst_keys: Option<&[InstructionKey]> = if is_table_miss && self.miss.instructions.is_some() {
            self.miss.instructions.as_deref()
        } else {
            self.hit.instructions.as_deref()
        };
        let have_inst = |key: InstructionKey| match inst_keys {
            None => true,
            Some(keys) => keys.contains(&key),
        };

        for instruction in &entry.instructions {
            match instruction {
                Instruction::GotoTable(table) => {
                    if !have_inst(InstructionKey::Standard(INST_GOTO_TABLE)) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                    let next = if is_table_miss && self.miss.next_tables.is_some() {
                        self.miss.next_tables.as_deref()
                    } else {
                        self.hit.next_tables.as_deref()
                    };
                    if let Some(next) = next {
                        if !next.contains(table) {
                            return Err(BadInstructionCode::BadTableId.into());
                        }
                    }
                }
                Instruction::WriteMetadata { value, mask } => {
                    if !have_inst(InstructionKey::Standard(INST_WRITE_METADATA)) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                    if value & !self.metadata_write != 0 {
                        return Err(BadInstructionCode::UnsupMetadata.into());
                    }
                    if mask & !self.metadata_write != 0 {
                        return Err(BadInstructionCode::UnsupMetadataMask.into());
                    }
                }
                Instruction::ApplyActions(actions) => {
                    if !have_inst(InstructionKey::Standard(INST_APPLY_ACTIONS)) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                    let allowed = if is_table_miss && self.miss.apply_actions.is_some() {
                        self.miss.apply_actions.as_deref()
                    } else {
                        self.hit.apply_actions.as_deref()
                    };
                    check_actions(actions, allowed)?;
                }
                Instruction::WriteActions(actions) => {
                    if !have_inst(InstructionKey::Standard(INST_WRITE_ACTIONS)) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                    let allowed = if is_table_miss && self.miss.write_actions.is_some() {
                        self.miss.write_actions.as_deref()
                    } else {
                        self.hit.write_actions.as_deref()
                    };
                    check_actions(actions, allowed)?;
                }
                Instruction::Meter(_) => {
                    if !have_inst(InstructionKey::Standard(INST_METER)) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                }
                Instruction::Experimenter {
                    experimenter,
                    exp_type,
                } => {
                    let key = InstructionKey::Experimenter {
                        experimenter: *experimenter,
                        exp_type: *exp_type,
                    };
                    if !have_inst(key) {
                        return Err(BadInstructionCode::UnsupInst.into());
                    }
                }
            }
        }

        if !is_table_miss {
            if let Some(match_fields) = &self.match_fields {
                let mut specified: HashMap<OxmKey, bool> =
                    match_fields.iter().map(|key| (*key, false)).collect();
                for field in &entry.fields.basic {
                    let key = OxmKey::Basic(field.oxm_type);
                    match specified.get_mut(&key) {
                        None => return Err(BadMatchCode::BadField.into()),
                        Some(seen) if *seen => return Err(BadMatchCode::DupField.into()),
                        Some(seen) => *seen = true,
                    }
                }
                for key in entry.fields.exp.keys() {
                    let key = OxmKey::Experimenter(*key);
                    match specified.get_mut(&key) {
                        None => return Err(BadMatchCode::BadField.into()),
                        Some(seen) => *seen = true,
                    }
                }
                if let Some(wildcards) = &self.wildcards {
                    for key in wildcards {
                        if let Some(seen) = specified.get_mut(key) {
                            *seen = true;
                        }
                    }
                }
                if specified.values().any(|seen| !seen) {
                    return Err(BadMatchCode::BadWildcards.into());
                }
            }
        }

        Ok(())
    }
}

fn check_actions(actions: &[ActionKey], allowed: Option<&[ActionKey]>) -> Result<(), OfpError> {
    let Some(allowed) = allowed else {
        return Ok(());
    };
    for action in actions {
        if !allowed.contains(action) {
            return Err(BadActionCode::BadType.into());
        }
    }
    Ok(())
}
