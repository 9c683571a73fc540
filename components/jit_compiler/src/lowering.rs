//! Type-directed lowering of creation operations
//!
//! Replaces each generic creation operation with inline allocation where the
//! shape is known, or with a runtime call otherwise. Lowering works one
//! operation at a time and keeps no state between operations. The value an
//! operation defined keeps its [`ValueId`], so users need no rewriting.
//!
//! Every runtime call is followed by an exception check that branches to the
//! function's shared exception block or to a fresh continuation block.

use crate::compilation_env::{CompilationEnv, HeapConstantInfo};
use crate::ir::{
    ArgumentsKind, BlockId, IRFunction, IRInstruction, IROpcode, RuntimeFn, Terminator, ValueId,
};
use core_types::TaggedValue;

/// Longest backing store allocated inline; longer arrays go through the
/// runtime allocator.
pub const MAX_TAGGED_ARRAY_LENGTH: u32 = 50;

/// What one lowering run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoweringStats {
    /// Operations lowered
    pub lowered: usize,
    /// Operations lowered to inline allocation only
    pub inlined: usize,
    /// Runtime calls emitted
    pub runtime_calls: usize,
}

/// Lowering pass over one function.
pub struct TypedLowering<'a, E: CompilationEnv + ?Sized> {
    env: &'a E,
    stats: LoweringStats,
}

/// Lower every creation operation of `ir` against `env`.
pub fn lower<E: CompilationEnv + ?Sized>(env: &E, ir: &mut IRFunction) -> LoweringStats {
    TypedLowering::new(env).run(ir)
}

/// Insertion point: the block being filled and the offset of the operation
/// being lowered.
struct Cursor {
    block: BlockId,
    offset: usize,
}

impl<'a, E: CompilationEnv + ?Sized> TypedLowering<'a, E> {
    /// Create a pass
    pub fn new(env: &'a E) -> Self {
        Self {
            env,
            stats: LoweringStats::default(),
        }
    }

    /// Lower all blocks present when the pass starts.
    pub fn run(mut self, ir: &mut IRFunction) -> LoweringStats {
        let original_blocks = ir.blocks.len();
        for index in 0..original_blocks {
            let block = BlockId(index as u32);
            if !ir
                .block(block)
                .instructions
                .iter()
                .any(|i| i.opcode.is_generic_creation())
            {
                continue;
            }
            let instructions = std::mem::take(&mut ir.blocks[index].instructions);
            let terminator = ir.blocks[index].terminator.take();
            let mut cursor = Cursor { block, offset: 0 };
            for instruction in instructions {
                if instruction.opcode.is_generic_creation() {
                    cursor.offset = instruction.bytecode_offset;
                    self.lower_one(ir, &mut cursor, instruction);
                } else {
                    ir.push(cursor.block, instruction);
                }
            }
            ir.blocks[cursor.block.0 as usize].terminator = terminator;
            if cursor.block != block {
                replace_predecessor(ir, block, cursor.block);
            }
        }
        tracing::debug!(
            target: "corten::jit",
            method_offset = ir.method_offset,
            lowered = self.stats.lowered,
            runtime_calls = self.stats.runtime_calls,
            "typed lowering finished"
        );
        self.stats
    }

    fn lower_one(&mut self, ir: &mut IRFunction, cursor: &mut Cursor, inst: IRInstruction) {
        self.stats.lowered += 1;
        let calls_before = self.stats.runtime_calls;
        match inst.opcode {
            IROpcode::CreateEmptyArray => self.lower_create_empty_array(ir, cursor, inst.id),
            IROpcode::CreateArrayWithOwn { length } => {
                self.lower_create_array_with_own(ir, cursor, inst.id, length)
            }
            IROpcode::CreateArrayWithBuffer { cp_index, length } => {
                self.lower_create_array_with_buffer(ir, cursor, inst.id, cp_index, length)
            }
            IROpcode::CreateArguments(kind) => {
                self.lower_create_arguments(ir, cursor, inst.id, kind)
            }
            IROpcode::LoadModuleVar { index } => {
                let env = self.module_env(ir, cursor);
                emit_as(ir, cursor, inst.id, IROpcode::LoadElement { array: env, index });
            }
            IROpcode::StoreModuleVar { index, value } => {
                let env = self.module_env(ir, cursor);
                emit_as(
                    ir,
                    cursor,
                    inst.id,
                    IROpcode::StoreElement {
                        array: env,
                        index,
                        value,
                    },
                );
            }
            other => {
                ir.push(
                    cursor.block,
                    IRInstruction {
                        id: inst.id,
                        opcode: other,
                        bytecode_offset: inst.bytecode_offset,
                    },
                );
            }
        }
        if self.stats.runtime_calls == calls_before {
            self.stats.inlined += 1;
        }
    }

    fn lower_create_empty_array(&mut self, ir: &mut IRFunction, cursor: &mut Cursor, id: ValueId) {
        self.new_array_with_store(ir, cursor, id, 0);
    }

    fn lower_create_array_with_own(
        &mut self,
        ir: &mut IRFunction,
        cursor: &mut Cursor,
        id: ValueId,
        length: u32,
    ) {
        if length > MAX_TAGGED_ARRAY_LENGTH {
            let len = emit(ir, cursor, IROpcode::Constant(TaggedValue::int(length as i32)));
            self.call_runtime(ir, cursor, Some(id), RuntimeFn::NewArray, vec![len]);
            return;
        }
        self.new_array_with_store(ir, cursor, id, length);
    }

    fn lower_create_array_with_buffer(
        &mut self,
        ir: &mut IRFunction,
        cursor: &mut Cursor,
        id: ValueId,
        cp_index: u32,
        length: u32,
    ) {
        let literal = if length <= MAX_TAGGED_ARRAY_LENGTH {
            self.literal_store(ir.method_offset, cp_index)
        } else {
            None
        };
        let literal = match literal {
            Some(literal) => literal,
            None => {
                let index = emit(ir, cursor, IROpcode::Constant(TaggedValue::int(cp_index as i32)));
                self.call_runtime(
                    ir,
                    cursor,
                    Some(id),
                    RuntimeFn::CreateArrayWithBuffer,
                    vec![index],
                );
                return;
            }
        };
        let (store, literal_length) = literal;
        let hclass = self.env.array_hclass();
        let cached = emit(ir, cursor, store);
        if length > literal_length {
            let elements = emit(
                ir,
                cursor,
                IROpcode::NewTaggedArray {
                    length,
                    fill: TaggedValue::HOLE,
                },
            );
            emit(
                ir,
                cursor,
                IROpcode::CopyElements {
                    src: cached,
                    dst: elements,
                    count: literal_length,
                },
            );
            emit_as(
                ir,
                cursor,
                id,
                IROpcode::NewJsArray {
                    hclass,
                    elements,
                    length,
                },
            );
        } else {
            // The new array shares the cached literal's backing store.
            emit_as(
                ir,
                cursor,
                id,
                IROpcode::NewJsArray {
                    hclass,
                    elements: cached,
                    length: literal_length,
                },
            );
        }
    }

    fn lower_create_arguments(
        &mut self,
        ir: &mut IRFunction,
        cursor: &mut Cursor,
        id: ValueId,
        kind: ArgumentsKind,
    ) {
        let declared_args = ir.declared_args;
        let argc = emit(ir, cursor, IROpcode::ActualArgc);
        let declared = emit(
            ir,
            cursor,
            IROpcode::Constant(TaggedValue::int(declared_args as i32)),
        );
        let cached = emit(ir, cursor, IROpcode::LoadArgumentsList);
        let mismatch = emit(ir, cursor, IROpcode::IntNotEqual(argc, declared));
        let missing = emit(ir, cursor, IROpcode::IsUndefined(cached));
        let recompute = emit(ir, cursor, IROpcode::Or(mismatch, missing));

        let slow = ir.new_block();
        let fast = ir.new_block();
        let merge = ir.new_block();
        ir.terminate(
            cursor.block,
            Terminator::Branch {
                cond: recompute,
                if_true: slow,
                if_false: fast,
            },
        );

        cursor.block = slow;
        let fresh = self.call_runtime(ir, cursor, None, RuntimeFn::GetArgumentsList, vec![argc]);
        let slow_exit = cursor.block;
        ir.terminate(slow_exit, Terminator::Goto(merge));
        ir.terminate(fast, Terminator::Goto(merge));

        cursor.block = merge;
        let list = emit(
            ir,
            cursor,
            IROpcode::Phi(vec![(slow_exit, fresh), (fast, cached)]),
        );
        match kind {
            ArgumentsKind::Rest { start_index } => {
                let start = emit(
                    ir,
                    cursor,
                    IROpcode::Constant(TaggedValue::int(start_index as i32)),
                );
                self.call_runtime(
                    ir,
                    cursor,
                    Some(id),
                    RuntimeFn::NewRestArguments,
                    vec![list, start],
                );
            }
            ArgumentsKind::Unmapped => {
                self.call_runtime(
                    ir,
                    cursor,
                    Some(id),
                    RuntimeFn::NewUnmappedArguments,
                    vec![list],
                );
            }
        }
    }

    fn module_env(&mut self, ir: &mut IRFunction, cursor: &mut Cursor) -> ValueId {
        let function = emit(ir, cursor, IROpcode::CurrentFunction);
        emit(ir, cursor, IROpcode::LoadModuleEnv(function))
    }

    fn new_array_with_store(
        &mut self,
        ir: &mut IRFunction,
        cursor: &mut Cursor,
        id: ValueId,
        length: u32,
    ) {
        let elements = emit(
            ir,
            cursor,
            IROpcode::NewTaggedArray {
                length,
                fill: TaggedValue::HOLE,
            },
        );
        let hclass = self.env.array_hclass();
        emit_as(
            ir,
            cursor,
            id,
            IROpcode::NewJsArray {
                hclass,
                elements,
                length,
            },
        );
    }

    /// Operation producing the cached literal's backing store, plus the
    /// literal's length. `None` when the literal cannot be used.
    fn literal_store(&self, method_offset: u32, cp_index: u32) -> Option<(IROpcode, u32)> {
        let literal = self
            .env
            .get_array_literal_from_cache(method_offset, cp_index)?;
        let view = self.env.heap().array(literal)?;
        let elements = TaggedValue::heap(view.elements);
        if !self.env.is_jit() {
            return Some((IROpcode::Constant(elements), view.length));
        }
        let pool = self.env.get_constant_pool_by_method_offset(method_offset)?;
        let index = self
            .env
            .record_heap_constant(HeapConstantInfo::for_entry(&pool, cp_index), elements)?;
        Some((IROpcode::HeapConstant(index), view.length))
    }

    fn call_runtime(
        &mut self,
        ir: &mut IRFunction,
        cursor: &mut Cursor,
        id: Option<ValueId>,
        callee: RuntimeFn,
        args: Vec<ValueId>,
    ) -> ValueId {
        self.stats.runtime_calls += 1;
        let opcode = IROpcode::CallRuntime { callee, args };
        let result = match id {
            Some(id) => {
                emit_as(ir, cursor, id, opcode);
                id
            }
            None => emit(ir, cursor, opcode),
        };
        let failed = emit(ir, cursor, IROpcode::IsException(result));
        let next = ir.new_block();
        let throw = ir.exception_block();
        ir.terminate(
            cursor.block,
            Terminator::Branch {
                cond: failed,
                if_true: throw,
                if_false: next,
            },
        );
        cursor.block = next;
        result
    }
}

fn emit(ir: &mut IRFunction, cursor: &Cursor, opcode: IROpcode) -> ValueId {
    ir.emit(cursor.block, opcode, cursor.offset)
}

fn emit_as(ir: &mut IRFunction, cursor: &Cursor, id: ValueId, opcode: IROpcode) {
    ir.push(
        cursor.block,
        IRInstruction {
            id,
            opcode,
            bytecode_offset: cursor.offset,
        },
    );
}

/// Control that left `old` now leaves `new`; fix phis in the successors.
fn replace_predecessor(ir: &mut IRFunction, old: BlockId, new: BlockId) {
    for block in &mut ir.blocks {
        for inst in &mut block.instructions {
            if let IROpcode::Phi(inputs) = &mut inst.opcode {
                for (pred, _) in inputs.iter_mut() {
                    if *pred == old {
                        *pred = new;
                    }
                }
            }
        }
    }
}
