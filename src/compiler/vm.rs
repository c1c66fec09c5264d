//! Bytecode runner
//!
//! A stack machine over [`BytecodeProgram`]. Shares operator semantics, the
//! resource budget and call dispatch with the interpreter, so a program
//! produces the same value and output as interpreting its source.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::execution::ExecutionState;
use crate::language::{BinaryOperator, Value, operators};

use super::bytecode::{BytecodeProgram, Op};

#[derive(Debug, Clone, Copy)]
struct LoopRecord {
    stack_len: usize,
    frames_len: usize,
    continue_target: usize,
    break_target: usize,
}

struct Vm<'p, 's, 'a> {
    program: &'p BytecodeProgram,
    state: &'s mut ExecutionState<'a>,
    stack: Vec<Value>,
    frames: Vec<Vec<Value>>,
    globals: BTreeMap<String, Value>,
    loops: Vec<LoopRecord>,
}

/// Execute `program` with `bindings` as its initial globals.
pub(crate) fn run_program(
    program: &BytecodeProgram,
    bindings: &BTreeMap<String, Value>,
    state: &mut ExecutionState<'_>,
) -> Result<Value> {
    let mut vm = Vm {
        program,
        state,
        stack: Vec::new(),
        frames: Vec::new(),
        globals: bindings.clone(),
        loops: Vec::new(),
    };
    let mut pc = 0;
    let result = vm.execute(&mut pc);
    if let Err(err) = &result {
        if let Some(location) = program.location_at(pc) {
            tracing::debug!(%location, offset = pc, error = %err, "statement failed");
        }
    }
    result
}

fn malformed(detail: &str) -> Error {
    Error::compile(format!("malformed bytecode: {}", detail))
}

impl Vm<'_, '_, '_> {
    fn execute(&mut self, pc: &mut usize) -> Result<Value> {
        let program = self.program;
        let code = program.code();
        while let Some(op) = code.get(*pc) {
            self.state.budget.step()?;
            let mut next = *pc + 1;
            match *op {
                Op::Constant(idx) => {
                    let value = program.constant(idx)?.clone();
                    self.stack.push(value);
                }
                Op::LoadLocal { depth, slot } => {
                    let value = self.slot(depth, slot)?.clone();
                    self.stack.push(value);
                }
                Op::StoreLocal { depth, slot } => {
                    let value = self.peek()?.clone();
                    *self.slot(depth, slot)? = value;
                }
                Op::LoadName(idx) => {
                    let name = program.name_constant(idx)?;
                    let value = self
                        .globals
                        .get(name)
                        .cloned()
                        .ok_or_else(|| Error::NotDefined(name.to_string()))?;
                    self.stack.push(value);
                }
                Op::StoreName(idx) => {
                    let name = program.name_constant(idx)?;
                    let value = self.peek()?.clone();
                    match self.globals.get_mut(name) {
                        Some(binding) => *binding = value,
                        None => return Err(Error::NotDefined(name.to_string())),
                    }
                }
                Op::DefineName(idx) => {
                    let name = program.name_constant(idx)?.to_string();
                    let value = self.peek()?.clone();
                    self.globals.insert(name, value);
                }
                Op::Binary(op) => {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.stack.push(operators::binary(op, &lhs, &rhs)?);
                }
                Op::Unary(op) => {
                    let operand = self.pop()?;
                    self.stack.push(operators::unary(op, &operand)?);
                }
                Op::ShortCircuit { op, target } => {
                    let lhs = operators::require_bool(op.symbol(), self.peek()?)?;
                    // `false &&` and `true ||` keep the left operand as the result
                    if (op == BinaryOperator::And) != lhs {
                        next = target as usize;
                    } else {
                        self.pop()?;
                    }
                }
                Op::RequireBool(op) => {
                    operators::require_bool(op.symbol(), self.peek()?)?;
                }
                Op::Call { name, argc } => {
                    let name = program.name_constant(name)?;
                    let args = self.pop_n(argc as usize)?;
                    let value = self.state.call(name, &args)?;
                    self.stack.push(value);
                }
                Op::MakeArray(count) => {
                    let items = self.pop_n(count as usize)?;
                    self.stack.push(Value::Array(items));
                }
                Op::MakeObject(count) => {
                    let flat = self.pop_n(count as usize * 2)?;
                    let mut object = BTreeMap::new();
                    let mut pairs = flat.into_iter();
                    while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                        match key {
                            Value::String(key) => {
                                object.insert(key, value);
                            }
                            _ => return Err(malformed("object key is not a string")),
                        }
                    }
                    self.stack.push(Value::Object(object));
                }
                Op::GetProperty(idx) => {
                    let name = program.name_constant(idx)?;
                    let object = self.pop()?;
                    self.stack.push(operators::property(&object, name)?);
                }
                Op::GetIndex => {
                    let index = self.pop()?;
                    let target = self.pop()?;
                    self.stack.push(operators::index(&target, &index)?);
                }
                Op::Jump(target) => next = target as usize,
                Op::JumpIfFalse(target) => {
                    let condition = self.pop()?;
                    if !operators::require_bool("condition", &condition)? {
                        next = target as usize;
                    }
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::EnterScope(slots) => {
                    self.state.budget.checkpoint()?;
                    self.state.budget.check_depth(self.frames.len() + 2)?;
                    self.frames.push(vec![Value::Null; slots as usize]);
                }
                Op::ExitScope => {
                    self.frames.pop().ok_or_else(|| malformed("scope underflow"))?;
                }
                Op::LoopEnter {
                    continue_target,
                    break_target,
                } => self.loops.push(LoopRecord {
                    stack_len: self.stack.len(),
                    frames_len: self.frames.len(),
                    continue_target: continue_target as usize,
                    break_target: break_target as usize,
                }),
                Op::LoopExit => {
                    self.loops.pop().ok_or_else(|| malformed("loop underflow"))?;
                }
                Op::Break => next = self.unwind()?.break_target,
                Op::Continue => next = self.unwind()?.continue_target,
                Op::Tick => self.state.budget.checkpoint()?,
            }
            *pc = next;
        }
        Ok(self.stack.pop().unwrap_or(Value::Null))
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack.pop().ok_or_else(|| malformed("stack underflow"))
    }

    fn peek(&self) -> Result<&Value> {
        self.stack.last().ok_or_else(|| malformed("stack underflow"))
    }

    fn pop_n(&mut self, count: usize) -> Result<Vec<Value>> {
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| malformed("stack underflow"))?;
        Ok(self.stack.split_off(start))
    }

    fn slot(&mut self, depth: u16, slot: u16) -> Result<&mut Value> {
        let frame = self
            .frames
            .len()
            .checked_sub(1 + depth as usize)
            .ok_or_else(|| malformed("frame out of range"))?;
        self.frames[frame]
            .get_mut(slot as usize)
            .ok_or_else(|| malformed("slot out of range"))
    }

    /// Drop everything the innermost loop body pushed.
    fn unwind(&mut self) -> Result<LoopRecord> {
        let record = *self.loops.last().ok_or_else(|| malformed("break outside of a loop"))?;
        self.stack.truncate(record.stack_len);
        self.frames.truncate(record.frames_len);
        Ok(record)
    }
}
