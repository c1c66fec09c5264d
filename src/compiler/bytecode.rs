use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::host::CapabilitySet;
use crate::language::ast::{BinaryOperator, SourceLocation, UnaryOperator};
use crate::language::Value;

use super::CompilerConfig;

/// Index into the constant pool.
pub type ConstIndex = u32;
/// Absolute instruction offset.
pub type Target = u32;

/// One VM instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Push a constant.
    Constant(ConstIndex),
    /// Push a block-local slot, `depth` frames out from the innermost one.
    LoadLocal {
        /// Frames to walk outward
        depth: u16,
        /// Slot within that frame
        slot: u16,
    },
    /// Store the top of stack into a block-local slot, leaving it on the stack.
    StoreLocal {
        /// Frames to walk outward
        depth: u16,
        /// Slot within that frame
        slot: u16,
    },
    /// Push a global by name (constant index of the name).
    LoadName(ConstIndex),
    /// Update an existing global, leaving the value on the stack.
    StoreName(ConstIndex),
    /// Create or update a global, leaving the value on the stack.
    DefineName(ConstIndex),
    /// Pop two operands and push the result.
    Binary(BinaryOperator),
    /// Pop one operand and push the result.
    Unary(UnaryOperator),
    /// Peek a boolean; jump keeping it if it decides `op`, otherwise pop it.
    ShortCircuit {
        /// `&&` or `||`
        op: BinaryOperator,
        /// Jump target when short-circuiting
        target: Target,
    },
    /// Fail unless the top of stack is a boolean operand of `op`.
    RequireBool(BinaryOperator),
    /// Pop `argc` arguments and call the function named by a constant.
    Call {
        /// Constant index of the function name
        name: ConstIndex,
        /// Argument count
        argc: u16,
    },
    /// Pop `n` values into an array.
    MakeArray(u32),
    /// Pop `n` key/value pairs into an object.
    MakeObject(u32),
    /// Replace the top object with one of its properties.
    GetProperty(ConstIndex),
    /// Pop index and target, push the element.
    GetIndex,
    /// Unconditional jump.
    Jump(Target),
    /// Pop a boolean condition and jump when it is false.
    JumpIfFalse(Target),
    /// Discard the top of stack.
    Pop,
    /// Push a block frame with the given number of slots.
    EnterScope(u16),
    /// Pop the innermost block frame.
    ExitScope,
    /// Record a loop so `Break`/`Continue` can unwind to it.
    LoopEnter {
        /// Where `Continue` resumes
        continue_target: Target,
        /// Where `Break` resumes
        break_target: Target,
    },
    /// Forget the innermost loop record.
    LoopExit,
    /// Unwind to the innermost loop and leave it.
    Break,
    /// Unwind to the innermost loop and start the next iteration.
    Continue,
    /// Loop iteration checkpoint (cancellation and deadline).
    Tick,
}

/// Maps an instruction offset to the statement it was emitted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// First instruction of the statement
    pub offset: Target,
    /// Statement location
    pub location: SourceLocation,
}

/// Compiled, immutable form of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeProgram {
    /// Name of the source script.
    pub name: String,
    /// Configuration the program was compiled with.
    pub config: CompilerConfig,
    /// Declared capability set the calls were validated against.
    pub capabilities: CapabilitySet,
    pub(crate) code: Vec<Op>,
    pub(crate) constants: Vec<Value>,
    pub(crate) source_map: Vec<SourceMapEntry>,
}

impl BytecodeProgram {
    /// Instruction stream.
    pub fn code(&self) -> &[Op] {
        &self.code
    }

    /// Constant pool.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Statement offsets, in ascending order.
    pub fn source_map(&self) -> &[SourceMapEntry] {
        &self.source_map
    }

    /// Location of the statement containing instruction `offset`.
    pub fn location_at(&self, offset: usize) -> Option<&SourceLocation> {
        self.source_map
            .iter()
            .take_while(|entry| entry.offset as usize <= offset)
            .last()
            .map(|entry| &entry.location)
    }

    pub(crate) fn constant(&self, index: ConstIndex) -> Result<&Value> {
        self.constants
            .get(index as usize)
            .ok_or_else(|| Error::compile(format!("constant {} out of range", index)))
    }

    pub(crate) fn name_constant(&self, index: ConstIndex) -> Result<&str> {
        self.constant(index)?
            .as_str()
            .ok_or_else(|| Error::compile(format!("constant {} is not a name", index)))
    }

    /// Canonical serialized form. Equal programs always produce equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a program produced by [`BytecodeProgram::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Hex-encoded blake3 digest of [`BytecodeProgram::to_bytes`].
    pub fn fingerprint(&self) -> Result<String> {
        Ok(blake3::hash(&self.to_bytes()?).to_hex().to_string())
    }

    /// Human-readable listing.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "; program {}", self.name);
        for (idx, value) in self.constants.iter().enumerate() {
            let _ = writeln!(out, "; const {:>3} = {}", idx, value.render());
        }
        let mut entries = self.source_map.iter().peekable();
        for (offset, op) in self.code.iter().enumerate() {
            while let Some(entry) = entries.next_if(|entry| entry.offset as usize == offset) {
                let _ = writeln!(out, "; {}", entry.location);
            }
            let _ = writeln!(out, "{:04}  {}", offset, self.describe(op));
        }
        out
    }

    fn describe(&self, op: &Op) -> String {
        let constant = |idx: ConstIndex| {
            self.constants
                .get(idx as usize)
                .map(Value::render)
                .unwrap_or_else(|| format!("#{}", idx))
        };
        match op {
            Op::Constant(idx) => format!("CONST {}", constant(*idx)),
            Op::LoadLocal { depth, slot } => format!("LOAD_LOCAL {}:{}", depth, slot),
            Op::StoreLocal { depth, slot } => format!("STORE_LOCAL {}:{}", depth, slot),
            Op::LoadName(idx) => format!("LOAD_NAME {}", constant(*idx)),
            Op::StoreName(idx) => format!("STORE_NAME {}", constant(*idx)),
            Op::DefineName(idx) => format!("DEFINE_NAME {}", constant(*idx)),
            Op::Binary(op) => format!("BINARY {}", op),
            Op::Unary(op) => format!("UNARY {}", op),
            Op::ShortCircuit { op, target } => format!("SHORT_CIRCUIT {} -> {:04}", op, target),
            Op::RequireBool(op) => format!("REQUIRE_BOOL {}", op),
            Op::Call { name, argc } => format!("CALL {} {}", constant(*name), argc),
            Op::MakeArray(n) => format!("MAKE_ARRAY {}", n),
            Op::MakeObject(n) => format!("MAKE_OBJECT {}", n),
            Op::GetProperty(idx) => format!("GET_PROPERTY {}", constant(*idx)),
            Op::GetIndex => "GET_INDEX".to_string(),
            Op::Jump(target) => format!("JUMP {:04}", target),
            Op::JumpIfFalse(target) => format!("JUMP_IF_FALSE {:04}", target),
            Op::Pop => "POP".to_string(),
            Op::EnterScope(slots) => format!("ENTER_SCOPE {}", slots),
            Op::ExitScope => "EXIT_SCOPE".to_string(),
            Op::LoopEnter {
                continue_target,
                break_target,
            } => format!("LOOP_ENTER {:04} {:04}", continue_target, break_target),
            Op::LoopExit => "LOOP_EXIT".to_string(),
            Op::Break => "BREAK".to_string(),
            Op::Continue => "CONTINUE".to_string(),
            Op::Tick => "TICK".to_string(),
        }
    }
}
