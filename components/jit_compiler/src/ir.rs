//! Intermediate representation for JIT compilation
//!
//! Instructions live in basic blocks. Every instruction defines one value
//! named by its [`ValueId`]; blocks end in a [`Terminator`]. The generic
//! creation operations are what bytecode translation produces; lowering
//! replaces them with the allocation, element and runtime-call operations
//! below them.

use core_types::TaggedValue;
use std::fmt;

/// SSA value name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Basic block name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Runtime entry points lowered code may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    /// Allocate an array of a given length
    NewArray,
    /// Allocate an array from a constant pool literal, resolving it first
    CreateArrayWithBuffer,
    /// Materialise the frame's argument list
    GetArgumentsList,
    /// Build a rest-parameter array from an argument list
    NewRestArguments,
    /// Build an unmapped arguments object from an argument list
    NewUnmappedArguments,
}

/// Flavour of an arguments object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentsKind {
    /// `...rest` starting at a parameter index
    Rest {
        /// First parameter collected
        start_index: u32,
    },
    /// `arguments`
    Unmapped,
}

/// IR operation types
#[derive(Debug, Clone, PartialEq)]
pub enum IROpcode {
    // Generic creation operations
    /// `[]`
    CreateEmptyArray,
    /// `new Array(length)` style array with its own hole-filled store
    CreateArrayWithOwn {
        /// Requested length
        length: u32,
    },
    /// Array literal cached in the constant pool
    CreateArrayWithBuffer {
        /// Constant pool index of the literal
        cp_index: u32,
        /// Requested length
        length: u32,
    },
    /// Rest array or arguments object
    CreateArguments(ArgumentsKind),
    /// Store into the current module's environment
    StoreModuleVar {
        /// Environment slot
        index: u32,
        /// Stored value
        value: ValueId,
    },
    /// Load from the current module's environment
    LoadModuleVar {
        /// Environment slot
        index: u32,
    },

    // Lowered operations
    /// Immediate tagged value
    Constant(TaggedValue),
    /// Entry of the compilation session's heap constant table
    HeapConstant(u32),
    /// The function being executed
    CurrentFunction,
    /// Actual argument count of the frame
    ActualArgc,
    /// Argument list already materialised for the frame, or undefined
    LoadArgumentsList,
    /// Module environment of a function
    LoadModuleEnv(ValueId),
    /// New backing store filled with one value
    NewTaggedArray {
        /// Number of elements
        length: u32,
        /// Initial element value
        fill: TaggedValue,
    },
    /// Copy the first `count` elements of `src` into `dst`
    CopyElements {
        /// Source store
        src: ValueId,
        /// Destination store
        dst: ValueId,
        /// Element count
        count: u32,
    },
    /// Array object over a backing store
    NewJsArray {
        /// Layout of the array
        hclass: TaggedValue,
        /// Backing store
        elements: ValueId,
        /// Logical length
        length: u32,
    },
    /// Element load
    LoadElement {
        /// Backing store
        array: ValueId,
        /// Element index
        index: u32,
    },
    /// Element store with write barrier
    StoreElement {
        /// Backing store
        array: ValueId,
        /// Element index
        index: u32,
        /// Stored value
        value: ValueId,
    },
    /// Runtime call; may leave a pending exception
    CallRuntime {
        /// Callee
        callee: RuntimeFn,
        /// Arguments
        args: Vec<ValueId>,
    },
    /// True when a value is the exception marker
    IsException(ValueId),
    /// True when a value is undefined
    IsUndefined(ValueId),
    /// Integer inequality
    IntNotEqual(ValueId, ValueId),
    /// Boolean or
    Or(ValueId, ValueId),
    /// Merge of values flowing in from predecessors
    Phi(Vec<(BlockId, ValueId)>),
}

impl IROpcode {
    /// Returns true for operations the lowering pass replaces.
    pub fn is_generic_creation(&self) -> bool {
        matches!(
            self,
            IROpcode::CreateEmptyArray
                | IROpcode::CreateArrayWithOwn { .. }
                | IROpcode::CreateArrayWithBuffer { .. }
                | IROpcode::CreateArguments(_)
                | IROpcode::StoreModuleVar { .. }
                | IROpcode::LoadModuleVar { .. }
        )
    }
}

/// Single IR instruction
#[derive(Debug, Clone, PartialEq)]
pub struct IRInstruction {
    /// Value defined by this instruction
    pub id: ValueId,
    /// The operation to perform
    pub opcode: IROpcode,
    /// Source bytecode offset
    pub bytecode_offset: usize,
}

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump
    Goto(BlockId),
    /// Two-way branch
    Branch {
        /// Condition value
        cond: ValueId,
        /// Target when true
        if_true: BlockId,
        /// Target when false
        if_false: BlockId,
    },
    /// Return a value
    Return(ValueId),
    /// Propagate the pending exception to the caller
    Throw,
}

/// Basic block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    /// Instructions in order
    pub instructions: Vec<IRInstruction>,
    /// Exit, `None` while the block is still open
    pub terminator: Option<Terminator>,
}

/// IR function representation
#[derive(Debug, Clone)]
pub struct IRFunction {
    /// Offset of the method this IR was built from
    pub method_offset: u32,
    /// Declared parameter count
    pub declared_args: u32,
    /// Blocks; block 0 is the entry
    pub blocks: Vec<Block>,
    next_value: u32,
    exception_block: Option<BlockId>,
}

impl IRFunction {
    /// Create a function with an empty entry block
    pub fn new(method_offset: u32, declared_args: u32) -> Self {
        Self {
            method_offset,
            declared_args,
            blocks: vec![Block::default()],
            next_value: 0,
            exception_block: None,
        }
    }

    /// Entry block
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    /// Append an empty block
    pub fn new_block(&mut self) -> BlockId {
        self.blocks.push(Block::default());
        BlockId((self.blocks.len() - 1) as u32)
    }

    /// Fresh value name
    pub fn new_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    /// Add an instruction to a block and return its value
    pub fn emit(&mut self, block: BlockId, opcode: IROpcode, bytecode_offset: usize) -> ValueId {
        let id = self.new_value();
        self.push(
            block,
            IRInstruction {
                id,
                opcode,
                bytecode_offset,
            },
        );
        id
    }

    /// Add an already named instruction to a block
    pub fn push(&mut self, block: BlockId, instruction: IRInstruction) {
        self.blocks[block.0 as usize].instructions.push(instruction);
    }

    /// Close a block
    pub fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block.0 as usize].terminator = Some(terminator);
    }

    /// The shared block exceptions propagate through, created on first use
    pub fn exception_block(&mut self) -> BlockId {
        if let Some(block) = self.exception_block {
            return block;
        }
        let block = self.new_block();
        self.terminate(block, Terminator::Throw);
        self.exception_block = Some(block);
        block
    }

    /// Get a block
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    /// Instruction defining a value
    pub fn instruction(&self, id: ValueId) -> Option<&IRInstruction> {
        self.instructions().find(|i| i.id == id)
    }

    /// All instructions in block order
    pub fn instructions(&self) -> impl Iterator<Item = &IRInstruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    /// Get number of instructions
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

impl fmt::Display for IRFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(f, "b{}:", i)?;
            for inst in &block.instructions {
                writeln!(f, "  {} = {:?}", inst.id, inst.opcode)?;
            }
            match &block.terminator {
                Some(t) => writeln!(f, "  {:?}", t)?,
                None => writeln!(f, "  <open>")?,
            }
        }
        Ok(())
    }
}
