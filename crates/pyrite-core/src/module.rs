use crate::function::Function;
use crate::instructions::Instruction;
use crate::values::SlotId;
use crate::{IrError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// One compile unit's output: the declared global slots and the lowered
/// functions. The slot table and the function registry are the only state
/// shared across per-function lowering calls; independent compile units
/// never share a `Module`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    globals: IndexMap<String, SlotId>,
    functions: IndexMap<String, Function>,
    reserved: IndexSet<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Idempotent slot lookup. Slots are created lazily on first
    /// reference and never removed; no two distinct qualified names alias
    /// the same slot.
    pub fn get_or_create_slot(&mut self, qualified_name: &str) -> SlotId {
        if let Some(&slot) = self.globals.get(qualified_name) {
            return slot;
        }
        let slot = SlotId(self.globals.len() as u32);
        self.globals.insert(qualified_name.to_string(), slot);
        slot
    }

    pub fn slot(&self, qualified_name: &str) -> Option<SlotId> {
        self.globals.get(qualified_name).copied()
    }

    pub fn slot_name(&self, slot: SlotId) -> Option<&str> {
        self.globals
            .iter()
            .find(|(_, &s)| s == slot)
            .map(|(name, _)| name.as_str())
    }

    pub fn globals(&self) -> impl Iterator<Item = (&String, SlotId)> {
        self.globals.iter().map(|(name, &slot)| (name, slot))
    }

    /// First phase of function registration: claim the synthetic name
    /// before the body is lowered, so a self-reference inside the body
    /// can resolve immediately.
    pub fn reserve_function(&mut self, name: &str) -> Result<()> {
        if self.functions.contains_key(name) || !self.reserved.insert(name.to_string()) {
            return Err(IrError::Registry(format!(
                "function {} already registered",
                name
            )));
        }
        Ok(())
    }

    /// Second phase: populate a previously reserved name with the
    /// finished body.
    pub fn define_function(&mut self, function: Function) -> Result<()> {
        if !self.reserved.shift_remove(&function.name) {
            return Err(IrError::Registry(format!(
                "function {} was never reserved",
                function.name
            )));
        }
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = (&String, &Function)> {
        self.functions.iter()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.functions.contains_key(name) || self.reserved.contains(name)
    }

    /// A module is handed to consumers only once fully formed: every
    /// reservation populated, every `MakeFunction` target registered, and
    /// every function individually valid.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = self.reserved.first() {
            return Err(IrError::Registry(format!(
                "function {} reserved but never defined",
                name
            )));
        }
        for function in self.functions.values() {
            function.validate()?;
            for block in function.body.blocks.values() {
                for inst in &block.instructions {
                    if let Instruction::MakeFunction { function: target, .. } = inst {
                        if !self.functions.contains_key(target) {
                            return Err(IrError::Registry(format!(
                                "{} references unregistered function {}",
                                function.name, target
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
