//! Bytecode emission
//!
//! Globals (top-level names and host-supplied bindings) live in a name-keyed
//! map at runtime and are addressed by name. Everything declared with `let`
//! inside a block is resolved here to a `(depth, slot)` pair, using the same
//! scope chain the interpreter uses, so both paths see the same bindings.

use crate::error::{Error, Result};
use crate::language::ast::{Expression, Script};
use crate::language::{Environment, Value};

use super::bytecode::{ConstIndex, Op, SourceMapEntry, Target};

pub(crate) struct Emitter {
    code: Vec<Op>,
    constants: Vec<Value>,
    source_map: Vec<SourceMapEntry>,
    scopes: Environment<u16>,
}

pub(crate) struct Emitted {
    pub(crate) code: Vec<Op>,
    pub(crate) constants: Vec<Value>,
    pub(crate) source_map: Vec<SourceMapEntry>,
}

impl Emitter {
    pub(crate) fn new() -> Self {
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            source_map: Vec::new(),
            scopes: Environment::new(),
        }
    }

    pub(crate) fn emit_script(mut self, script: &Script) -> Result<Emitted> {
        if script.statements.is_empty() {
            let null = self.constant(Value::Null)?;
            self.push(Op::Constant(null));
        }
        for (idx, statement) in script.statements.iter().enumerate() {
            if idx > 0 {
                self.push(Op::Pop);
            }
            if let Some(location) = &statement.location {
                self.source_map.push(SourceMapEntry {
                    offset: self.offset()?,
                    location: location.clone(),
                });
            }
            self.expression(&statement.expression)?;
        }
        Ok(Emitted {
            code: self.code,
            constants: self.constants,
            source_map: self.source_map,
        })
    }

    fn push(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.code.len() - 1
    }

    fn offset(&self) -> Result<Target> {
        Target::try_from(self.code.len()).map_err(|_| Error::compile("program too large"))
    }

    fn patch(&mut self, at: usize, op: Op) {
        self.code[at] = op;
    }

    fn constant(&mut self, value: Value) -> Result<ConstIndex> {
        let idx = match self.constants.iter().position(|c| c.identical(&value)) {
            Some(idx) => idx,
            None => {
                self.constants.push(value);
                self.constants.len() - 1
            }
        };
        ConstIndex::try_from(idx).map_err(|_| Error::compile("constant pool overflow"))
    }

    fn name(&mut self, name: &str) -> Result<ConstIndex> {
        self.constant(Value::from(name))
    }

    fn resolve(&self, name: &str) -> Result<Option<(u16, u16)>> {
        match self.scopes.lookup(name) {
            Some((hops, slot)) => {
                let depth = u16::try_from(hops).map_err(|_| Error::compile("scope nesting too deep"))?;
                Ok(Some((depth, *slot)))
            }
            None => Ok(None),
        }
    }

    fn count(len: usize, what: &str) -> Result<u32> {
        u32::try_from(len).map_err(|_| Error::compile(format!("too many {}", what)))
    }

    fn expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Literal(value) => {
                let idx = self.constant(value.clone())?;
                self.push(Op::Constant(idx));
            }
            Expression::VariableRef(name) => match self.resolve(name)? {
                Some((depth, slot)) => {
                    self.push(Op::LoadLocal { depth, slot });
                }
                None => {
                    let idx = self.name(name)?;
                    self.push(Op::LoadName(idx));
                }
            },
            Expression::BinaryOp { left, op, right } if op.is_logical() => {
                self.expression(left)?;
                let jump = self.push(Op::ShortCircuit { op: *op, target: 0 });
                self.expression(right)?;
                self.push(Op::RequireBool(*op));
                let target = self.offset()?;
                self.patch(jump, Op::ShortCircuit { op: *op, target });
            }
            Expression::BinaryOp { left, op, right } => {
                self.expression(left)?;
                self.expression(right)?;
                self.push(Op::Binary(*op));
            }
            Expression::UnaryOp { op, operand } => {
                self.expression(operand)?;
                self.push(Op::Unary(*op));
            }
            Expression::Call { name, args } => {
                for arg in args {
                    self.expression(arg)?;
                }
                let name = self.name(name)?;
                let argc = u16::try_from(args.len()).map_err(|_| Error::compile("too many arguments"))?;
                self.push(Op::Call { name, argc });
            }
            Expression::Block(items) => self.block(items)?,
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expression(condition)?;
                let to_else = self.push(Op::JumpIfFalse(0));
                self.expression(then_branch)?;
                let to_end = self.push(Op::Jump(0));
                let else_start = self.offset()?;
                self.patch(to_else, Op::JumpIfFalse(else_start));
                match else_branch {
                    Some(branch) => self.expression(branch)?,
                    None => {
                        let null = self.constant(Value::Null)?;
                        self.push(Op::Constant(null));
                    }
                }
                let end = self.offset()?;
                self.patch(to_end, Op::Jump(end));
            }
            Expression::Loop { condition, body } => self.lp(condition.as_deref(), body)?,
            Expression::Assignment { target, value } => {
                self.expression(value)?;
                match self.resolve(target)? {
                    Some((depth, slot)) => {
                        self.push(Op::StoreLocal { depth, slot });
                    }
                    None => {
                        let idx = self.name(target)?;
                        // top-level binding statement
                        if self.scopes.is_global() {
                            self.push(Op::DefineName(idx));
                        } else {
                            self.push(Op::StoreName(idx));
                        }
                    }
                }
            }
            Expression::Declaration { name, value } => {
                self.expression(value)?;
                if self.scopes.is_global() {
                    let idx = self.name(name)?;
                    self.push(Op::DefineName(idx));
                } else {
                    let existing = match self.scopes.defines_locally(name) {
                        true => self.resolve(name)?,
                        false => None,
                    };
                    let slot = match existing {
                        Some((_, slot)) => slot,
                        None => {
                            let slot = u16::try_from(self.scopes.local_len())
                                .map_err(|_| Error::compile("too many local bindings"))?;
                            self.scopes.define(name.clone(), slot);
                            slot
                        }
                    };
                    self.push(Op::StoreLocal { depth: 0, slot });
                }
            }
            Expression::ObjectLiteral(entries) => {
                for (key, value) in entries {
                    let key = self.constant(Value::from(key.as_str()))?;
                    self.push(Op::Constant(key));
                    self.expression(value)?;
                }
                self.push(Op::MakeObject(Self::count(entries.len(), "object entries")?));
            }
            Expression::ArrayLiteral(items) => {
                for item in items {
                    self.expression(item)?;
                }
                self.push(Op::MakeArray(Self::count(items.len(), "array items")?));
            }
            Expression::PropertyAccess { object, name } => {
                self.expression(object)?;
                let idx = self.name(name)?;
                self.push(Op::GetProperty(idx));
            }
            Expression::IndexAccess { array, index } => {
                self.expression(array)?;
                self.expression(index)?;
                self.push(Op::GetIndex);
            }
            Expression::Break => {
                self.push(Op::Break);
            }
            Expression::Continue => {
                self.push(Op::Continue);
            }
        }
        Ok(())
    }

    fn block(&mut self, items: &[Expression]) -> Result<()> {
        let enter = self.push(Op::EnterScope(0));
        self.scopes.push_scope();
        let result = self.block_items(items);
        let slots = u16::try_from(self.scopes.local_len());
        self.scopes.pop_scope();
        result?;
        let slots = slots.map_err(|_| Error::compile("too many local bindings"))?;
        self.patch(enter, Op::EnterScope(slots));
        self.push(Op::ExitScope);
        Ok(())
    }

    fn block_items(&mut self, items: &[Expression]) -> Result<()> {
        if items.is_empty() {
            let null = self.constant(Value::Null)?;
            self.push(Op::Constant(null));
        }
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                self.push(Op::Pop);
            }
            self.expression(item)?;
        }
        Ok(())
    }

    // LOOP_ENTER; start: TICK; [cond; JUMP_IF_FALSE done]; body; POP; JUMP start;
    // done: LOOP_EXIT; CONST null
    fn lp(&mut self, condition: Option<&Expression>, body: &Expression) -> Result<()> {
        let enter = self.push(Op::LoopEnter {
            continue_target: 0,
            break_target: 0,
        });
        let start = self.offset()?;
        self.push(Op::Tick);
        let exit_jump = match condition {
            Some(condition) => {
                self.expression(condition)?;
                Some(self.push(Op::JumpIfFalse(0)))
            }
            None => None,
        };
        self.expression(body)?;
        self.push(Op::Pop);
        self.push(Op::Jump(start));
        let done = self.offset()?;
        if let Some(at) = exit_jump {
            self.patch(at, Op::JumpIfFalse(done));
        }
        self.patch(
            enter,
            Op::LoopEnter {
                continue_target: start,
                break_target: done,
            },
        );
        self.push(Op::LoopExit);
        let null = self.constant(Value::Null)?;
        self.push(Op::Constant(null));
        Ok(())
    }
}
