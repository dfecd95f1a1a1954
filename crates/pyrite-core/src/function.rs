use crate::block::{BasicBlock, BlockId, Terminator};
use crate::values::{TempId, Value};
use crate::{IrError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A named, ordered list of basic blocks with a parameter list. Nested
/// functions additionally carry the capture slots their closure cells
/// arrive through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub captures: Vec<Capture>,
    pub body: FunctionBody,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            captures: Vec::new(),
            body: FunctionBody::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_block(&self) -> BlockId {
        self.body.entry_block
    }

    /// Structural well-formedness per the IR invariants: exactly one
    /// terminator per block (placed last by construction), every block
    /// reference resolves, terminator arguments match target block
    /// parameters, and every temp has a single producing site that
    /// dominates all of its uses.
    pub fn validate(&self) -> Result<()> {
        for block in self.body.blocks.values() {
            if !block.is_terminated() {
                return Err(IrError::Validation(format!(
                    "{}: {} has no terminator",
                    self.name, block.id
                )));
            }
            for succ in block.successors() {
                if !self.body.blocks.contains_key(&succ) {
                    return Err(IrError::Validation(format!(
                        "{}: {} branches to unknown {}",
                        self.name, block.id, succ
                    )));
                }
            }
            self.check_terminator_args(block)?;
        }

        self.check_definitions()?;
        Ok(())
    }

    fn check_terminator_args(&self, block: &BasicBlock) -> Result<()> {
        let param_count = |id: BlockId| self.body.blocks[&id].params.len();
        let mismatch = |target: BlockId, given: usize| {
            IrError::Validation(format!(
                "{}: {} passes {} argument(s) to {} expecting {}",
                self.name,
                block.id,
                given,
                target,
                param_count(target)
            ))
        };
        match &block.terminator {
            Terminator::Jump(target, args) => {
                if args.len() != param_count(*target) {
                    return Err(mismatch(*target, args.len()));
                }
            }
            Terminator::Branch {
                then_block,
                then_args,
                else_block,
                else_args,
                ..
            } => {
                if then_args.len() != param_count(*then_block) {
                    return Err(mismatch(*then_block, then_args.len()));
                }
                if else_args.len() != param_count(*else_block) {
                    return Err(mismatch(*else_block, else_args.len()));
                }
            }
            Terminator::Invoke {
                ok_block,
                unwind_block,
                ..
            } => {
                // The result and the exception object arrive as the sole
                // block arguments of the two exits.
                if param_count(*ok_block) != 1 {
                    return Err(mismatch(*ok_block, 1));
                }
                if param_count(*unwind_block) != 1 {
                    return Err(mismatch(*unwind_block, 1));
                }
            }
            Terminator::Return(_) | Terminator::Raise(_) => {}
            Terminator::Invalid => unreachable!("checked above"),
        }
        Ok(())
    }

    fn check_definitions(&self) -> Result<()> {
        let mut def_site: HashMap<TempId, (BlockId, usize)> = HashMap::new();
        for block in self.body.blocks.values() {
            for (index, inst) in block.instructions.iter().enumerate() {
                if let Some(Value::Temp(t)) = inst.result() {
                    if def_site.insert(*t, (block.id, index)).is_some() {
                        return Err(IrError::Validation(format!(
                            "{}: {} defined more than once",
                            self.name, t
                        )));
                    }
                }
            }
        }

        let doms = self.dominator_sets();
        for block in self.body.blocks.values() {
            for (index, inst) in block.instructions.iter().enumerate() {
                for operand in inst.operands() {
                    self.check_use(operand, block.id, index, &def_site, &doms)?;
                }
            }
            for operand in block.terminator.operands() {
                self.check_use(operand, block.id, block.instructions.len(), &def_site, &doms)?;
            }
        }
        Ok(())
    }

    fn check_use(
        &self,
        value: &Value,
        block: BlockId,
        index: usize,
        def_site: &HashMap<TempId, (BlockId, usize)>,
        doms: &HashMap<BlockId, HashSet<BlockId>>,
    ) -> Result<()> {
        let defining_block = match value {
            Value::Temp(t) => match def_site.get(t) {
                Some((def_block, def_index)) => {
                    if *def_block == block {
                        if *def_index >= index {
                            return Err(IrError::Validation(format!(
                                "{}: {} used before its definition in {}",
                                self.name, t, block
                            )));
                        }
                        return Ok(());
                    }
                    *def_block
                }
                None => {
                    return Err(IrError::Validation(format!(
                        "{}: {} has no producing site",
                        self.name, t
                    )))
                }
            },
            Value::BlockParam(bp) => {
                if bp.block == block {
                    return Ok(());
                }
                bp.block
            }
            Value::Param(_) | Value::Capture(_) | Value::Constant(_) => return Ok(()),
        };
        let dominated = doms
            .get(&block)
            .map_or(false, |set| set.contains(&defining_block));
        if !dominated {
            return Err(IrError::Validation(format!(
                "{}: use of {} in {} is not dominated by its definition in {}",
                self.name, value, block, defining_block
            )));
        }
        Ok(())
    }

    /// Iterative dominator-set computation over the reachable subgraph.
    /// Unreachable blocks are left to a later dead-block pass and skipped
    /// here.
    fn dominator_sets(&self) -> HashMap<BlockId, HashSet<BlockId>> {
        let entry = self.body.entry_block;
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        let mut reachable = HashSet::new();
        let mut worklist = vec![entry];
        while let Some(block) = worklist.pop() {
            if !reachable.insert(block) {
                continue;
            }
            for succ in self.body.blocks[&block].successors() {
                preds.entry(succ).or_default().push(block);
                worklist.push(succ);
            }
        }

        let all: HashSet<BlockId> = reachable.iter().copied().collect();
        let mut doms: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
        doms.insert(entry, HashSet::from([entry]));
        for &block in &reachable {
            if block != entry {
                doms.insert(block, all.clone());
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &reachable {
                if block == entry {
                    continue;
                }
                let Some(block_preds) = preds.get(&block) else {
                    continue;
                };
                let mut new_dom: Option<HashSet<BlockId>> = None;
                for pred in block_preds {
                    if let Some(pred_dom) = doms.get(pred) {
                        new_dom = Some(match new_dom {
                            Some(acc) => acc.intersection(pred_dom).copied().collect(),
                            None => pred_dom.clone(),
                        });
                    }
                }
                if let Some(mut new_dom) = new_dom {
                    new_dom.insert(block);
                    if doms[&block] != new_dom {
                        doms.insert(block, new_dom);
                        changed = true;
                    }
                }
            }
        }
        doms
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A closure cell slot of a nested function, filled by the enclosing
/// function's `MakeFunction` at the definition site. The cell is borrowed
/// from the enclosing function, not owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub name: String,
}

impl Capture {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBody {
    pub entry_block: BlockId,
    pub blocks: IndexMap<BlockId, BasicBlock>,
    pub locals: Vec<Local>,
    next_block_id: u32,
    next_local_id: u32,
}

impl FunctionBody {
    pub fn new() -> Self {
        let entry_block = BlockId(0);
        let mut blocks = IndexMap::new();
        blocks.insert(entry_block, BasicBlock::new(entry_block));

        Self {
            entry_block,
            blocks,
            locals: Vec::new(),
            next_block_id: 1,
            next_local_id: 0,
        }
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = self.allocate_block_id();
        self.blocks.insert(id, BasicBlock::new(id));
        id
    }

    /// Reserve an id without attaching a block. The builder keeps the
    /// block detached until the cursor first reaches it, so blocks that
    /// never become reachable never enter the finished function.
    pub fn allocate_block_id(&mut self) -> BlockId {
        let id = BlockId(self.next_block_id);
        self.next_block_id += 1;
        id
    }

    pub fn attach_block(&mut self, block: BasicBlock) {
        self.blocks.insert(block.id, block);
    }

    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(&id)
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&id)
    }

    pub fn add_local(&mut self, name: impl Into<String>) -> LocalId {
        let id = LocalId(self.next_local_id);
        self.next_local_id += 1;
        self.locals.push(Local {
            id,
            name: name.into(),
        });
        id
    }

    pub fn local_named(&self, name: &str) -> Option<LocalId> {
        self.locals.iter().find(|l| l.name == name).map(|l| l.id)
    }
}

impl Default for FunctionBody {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-private storage cell backing a Local scope entry.
/// Reassignment in source stores a new value into the same cell; the
/// values themselves are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Local {
    pub id: LocalId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(pub u32);

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "l{}", self.0)
    }
}
