use crate::{
    block::{BasicBlock, BlockId, BlockParam, Terminator},
    function::{Capture, Function, LocalId, Parameter},
    instructions::{Instruction, RaisingOp},
    values::{BlockParamId, CaptureId, Constant, ParamId, SlotId, TempId, Type, Value},
    IrError, Result,
};

pub struct FunctionBuilder {
    function: Function,
    /// Blocks created but not yet reached by the cursor. A block enters
    /// the function body the first time it becomes the insertion point;
    /// one that never does is dropped with the builder.
    detached: indexmap::IndexMap<BlockId, BasicBlock>,
    current: Option<BlockId>,
    next_temp: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let function = Function::new(name);
        let entry = function.entry_block();
        Self {
            function,
            detached: indexmap::IndexMap::new(),
            current: Some(entry),
            next_temp: 0,
        }
    }

    pub fn param(&mut self, name: &str) -> Value {
        let index = self.function.params.len() as u32;
        self.function.params.push(Parameter::new(name));
        Value::Param(ParamId(index))
    }

    pub fn capture(&mut self, name: &str) -> Value {
        let index = self.function.captures.len() as u32;
        self.function.captures.push(Capture::new(name));
        Value::Capture(CaptureId(index))
    }

    pub fn param_value(&self, index: usize) -> Value {
        Value::Param(ParamId(index as u32))
    }

    pub fn declare_local(&mut self, name: &str) -> LocalId {
        self.function.body.add_local(name)
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = self.function.body.allocate_block_id();
        self.detached.insert(id, BasicBlock::new(id));
        id
    }

    pub fn append_block_param(&mut self, block: BlockId, name: &str, ty: Type) -> Result<Value> {
        let block_data = self
            .detached
            .get_mut(&block)
            .or_else(|| self.function.body.get_block_mut(block))
            .ok_or(IrError::UnknownBlock(block))?;
        let index = block_data.params.len() as u32;
        block_data.add_param(BlockParam::new(name, ty));
        Ok(Value::BlockParam(BlockParamId { block, index }))
    }

    pub fn block_param(&self, block: BlockId, index: u32) -> Value {
        Value::BlockParam(BlockParamId { block, index })
    }

    pub fn switch_to_block(&mut self, block: BlockId) -> Result<()> {
        if let Some(detached) = self.detached.shift_remove(&block) {
            self.function.body.attach_block(detached);
        } else if !self.function.body.blocks.contains_key(&block) {
            return Err(IrError::UnknownBlock(block));
        }
        self.current = Some(block);
        Ok(())
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    pub fn entry_block(&self) -> BlockId {
        self.function.entry_block()
    }

    /// True when the insertion cursor has been consumed by a terminator.
    /// The lowering driver uses this to skip statements that follow a
    /// `return` or `raise`.
    pub fn is_terminated(&self) -> bool {
        match self.current {
            Some(block) => self.function.body.blocks[&block].is_terminated(),
            None => true,
        }
    }

    pub fn predecessor_count(&self, block: BlockId) -> usize {
        self.function
            .body
            .blocks
            .values()
            .flat_map(|b| b.successors())
            .filter(|&succ| succ == block)
            .count()
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn finish(self) -> Result<Function> {
        self.function.validate()?;
        Ok(self.function)
    }

    fn new_temp(&mut self) -> Value {
        let id = TempId(self.next_temp);
        self.next_temp += 1;
        Value::Temp(id)
    }

    fn insertion_block(&mut self) -> Result<&mut BasicBlock> {
        let block = self.current.ok_or(IrError::NoInsertionPoint)?;
        let block_data = self
            .function
            .body
            .get_block_mut(block)
            .ok_or(IrError::UnknownBlock(block))?;
        if block_data.is_terminated() {
            return Err(IrError::BlockTerminated(block));
        }
        Ok(block_data)
    }

    fn push(&mut self, inst: Instruction) -> Result<()> {
        self.insertion_block()?.add_instruction(inst);
        Ok(())
    }

    fn terminate(&mut self, term: Terminator) -> Result<()> {
        self.insertion_block()?.set_terminator(term);
        self.current = None;
        Ok(())
    }

    pub fn constant(&mut self, value: Constant) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::Constant {
            result: result.clone(),
            value,
        })?;
        Ok(result)
    }

    pub fn load_global(&mut self, slot: SlotId) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::LoadGlobal {
            result: result.clone(),
            slot,
        })?;
        Ok(result)
    }

    pub fn store_global(&mut self, slot: SlotId, value: Value) -> Result<()> {
        self.push(Instruction::StoreGlobal { slot, value })
    }

    pub fn load_local(&mut self, local: LocalId) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::LoadLocal {
            result: result.clone(),
            local,
        })?;
        Ok(result)
    }

    pub fn store_local(&mut self, local: LocalId, value: Value) -> Result<()> {
        self.push(Instruction::StoreLocal { local, value })
    }

    pub fn make_cell(&mut self) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::MakeCell {
            result: result.clone(),
        })?;
        Ok(result)
    }

    pub fn cell_get(&mut self, cell: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::CellGet {
            result: result.clone(),
            cell,
        })?;
        Ok(result)
    }

    pub fn cell_set(&mut self, cell: Value, value: Value) -> Result<()> {
        self.push(Instruction::CellSet { cell, value })
    }

    pub fn type_of(&mut self, value: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::TypeOf {
            result: result.clone(),
            value,
        })?;
        Ok(result)
    }

    pub fn is(&mut self, left: Value, right: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::Is {
            result: result.clone(),
            left,
            right,
        })?;
        Ok(result)
    }

    pub fn is_subclass(&mut self, ty: Value, of: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::IsSubclass {
            result: result.clone(),
            ty,
            of,
        })?;
        Ok(result)
    }

    pub fn builtin_ref(&mut self, name: &str) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::BuiltinRef {
            result: result.clone(),
            name: name.to_string(),
        })?;
        Ok(result)
    }

    pub fn make_tuple(&mut self, elements: Vec<Value>) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::MakeTuple {
            result: result.clone(),
            elements,
        })?;
        Ok(result)
    }

    pub fn tuple_len(&mut self, tuple: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::TupleLen {
            result: result.clone(),
            tuple,
        })?;
        Ok(result)
    }

    pub fn tuple_get(&mut self, tuple: Value, index: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::TupleGet {
            result: result.clone(),
            tuple,
            index,
        })?;
        Ok(result)
    }

    pub fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::Call {
            result: result.clone(),
            callee,
            args,
        })?;
        Ok(result)
    }

    pub fn get_attr(&mut self, object: Value, name: &str) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::GetAttr {
            result: result.clone(),
            object,
            name: name.to_string(),
        })?;
        Ok(result)
    }

    pub fn get_item(&mut self, object: Value, index: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::GetItem {
            result: result.clone(),
            object,
            index,
        })?;
        Ok(result)
    }

    pub fn make_function(&mut self, function: &str, captures: Vec<Value>) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::MakeFunction {
            result: result.clone(),
            function: function.to_string(),
            captures,
        })?;
        Ok(result)
    }

    pub fn index_const(&mut self, value: u64) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::IndexConst {
            result: result.clone(),
            value,
        })?;
        Ok(result)
    }

    pub fn index_add(&mut self, left: Value, right: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::IndexAdd {
            result: result.clone(),
            left,
            right,
        })?;
        Ok(result)
    }

    pub fn index_cmp_less(&mut self, left: Value, right: Value) -> Result<Value> {
        let result = self.new_temp();
        self.push(Instruction::IndexCmpLess {
            result: result.clone(),
            left,
            right,
        })?;
        Ok(result)
    }

    pub fn jump(&mut self, target: BlockId, args: Vec<Value>) -> Result<()> {
        self.terminate(Terminator::Jump(target, args))
    }

    pub fn branch(
        &mut self,
        condition: Value,
        then_block: BlockId,
        then_args: Vec<Value>,
        else_block: BlockId,
        else_args: Vec<Value>,
    ) -> Result<()> {
        self.terminate(Terminator::Branch {
            condition,
            then_block,
            then_args,
            else_block,
            else_args,
        })
    }

    pub fn ret(&mut self, value: Value) -> Result<()> {
        self.terminate(Terminator::Return(value))
    }

    pub fn raise(&mut self, value: Value) -> Result<()> {
        self.terminate(Terminator::Raise(value))
    }

    /// Emit a potentially-raising operation under an active exception
    /// handler. Creates the ok block, terminates the insertion block with
    /// an `Invoke`, and leaves the cursor in the ok block; the returned
    /// value is the operation result delivered as the ok block's argument.
    pub fn invoke(&mut self, op: RaisingOp, unwind_block: BlockId) -> Result<Value> {
        let ok_block = self.create_block();
        let result = self.append_block_param(ok_block, "res", Type::Object)?;
        self.terminate(Terminator::Invoke {
            op,
            ok_block,
            unwind_block,
        })?;
        self.switch_to_block(ok_block)?;
        Ok(result)
    }
}
