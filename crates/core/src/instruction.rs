//! The Droe instruction set
//!
//! A stack-oriented instruction set shared by the bytecode emitter and the
//! VM dispatch loop. Operands are embedded in the enum variants so that an
//! ill-formed instruction cannot be represented; jump targets are absolute
//! instruction indices, never byte offsets.

use crate::schema::DbOpCode;
use serde::{Deserialize, Serialize};

/// Host functions the VM can invoke through `HostCall`.
///
/// The numbering is part of the artifact format: emitters write these
/// discriminants and readers of old artifacts rely on them staying stable
/// within a format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostFn {
    /// `print(text)` - write without newline
    Print,
    /// `print_line(text)` - write with newline
    PrintLine,
    /// `now()` - epoch seconds, used by `auto` date fields
    Now,
    /// `uuid()` - fresh v4 uuid text, used by `auto` key fields
    Uuid,
    /// `http_request(url, method, body, headers)` - outbound `call`
    HttpRequest,
    /// `respond(status, body)` - store the handler response
    Respond,
}

/// One VM instruction.
///
/// Conventions:
/// - `Jump*` and `IterNext` targets are absolute indices into the
///   instruction stream.
/// - Constant, schema, module, and action indices refer to the artifact
///   tables in declaration order.
/// - Decimal arithmetic variants apply the fixed scale-100 rules; the
///   emitter picks the `I`/`D` variant from the checked types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // Stack
    PushConst(u32),
    Pop,
    Dup,

    // Variables
    LoadLocal(u16),
    StoreLocal(u16),
    LoadGlobal(u16),
    StoreGlobal(u16),

    // Integer arithmetic (checked, no wrap-around)
    AddI,
    SubI,
    MulI,
    DivI,

    // Decimal arithmetic (scaled i64, scale 100)
    AddD,
    SubD,
    MulD,
    DivD,

    Neg,

    // Comparison (polymorphic; operand types are known to the emitter)
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logic on flag values
    And,
    Or,
    Not,

    // Control flow
    Jump(u32),
    JumpIfFalse(u32),
    JumpIfTrue(u32),

    // Strings
    Concat,
    /// Build one text value from `n` stack items using their display rules
    Interp(u16),
    /// Apply the format pattern at the given constant index to the top value
    Format(u32),

    // Collections
    MakeList(u16),
    MakeGroup(u16),
    IterBegin,
    /// Push the next element and continue, or jump to the target when the
    /// iterator is exhausted
    IterNext(u32),
    Index,

    // Records
    MakeRecord {
        schema: u16,
        fields: u16,
    },
    GetField(u16),
    SetField(u16),

    // Functions
    Call {
        module: u16,
        action: u16,
        args: u8,
    },
    Return,
    EnterFrame(u16),
    LeaveFrame,

    // Display and host
    Display,
    HostCall {
        func: HostFn,
        args: u8,
    },

    // Load-time registrations (the startup prologue)
    DefineData(u16),
    DefineEndpoint(u16),
    EndHandler,

    /// Forwarded to the host storage adapter. Predicates and field sets
    /// arrive as stack operands: `preds` name/value pairs, then `fields`
    /// name/value pairs on top.
    DatabaseOp {
        op: DbOpCode,
        entity: u16,
        preds: u8,
        fields: u8,
    },

    Halt,
}

impl Instruction {
    /// True for instructions that transfer control instead of falling
    /// through to the next index.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Instruction::Jump(_)
                | Instruction::JumpIfFalse(_)
                | Instruction::JumpIfTrue(_)
                | Instruction::IterNext(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_classification() {
        assert!(Instruction::Jump(0).is_jump());
        assert!(Instruction::JumpIfFalse(3).is_jump());
        assert!(Instruction::IterNext(9).is_jump());
        assert!(!Instruction::AddI.is_jump());
        assert!(!Instruction::Halt.is_jump());
    }

    #[test]
    fn test_instruction_roundtrip_through_bincode() {
        let ops = vec![
            Instruction::PushConst(7),
            Instruction::Call {
                module: 1,
                action: 2,
                args: 3,
            },
            Instruction::HostCall {
                func: HostFn::PrintLine,
                args: 1,
            },
            Instruction::DatabaseOp {
                op: DbOpCode::FindAll,
                entity: 0,
                preds: 0,
                fields: 0,
            },
        ];
        let bytes = bincode::serialize(&ops).unwrap();
        let back: Vec<Instruction> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(ops, back);
    }
}
