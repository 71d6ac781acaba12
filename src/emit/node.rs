//! Decode output: immutable nodes that reference resolved symbols by identity.
//! Names are only chosen when a node is rendered.

use crate::{
    decode::{BlobId, SlotId},
    metadata::{FieldId, MethodId},
    types::TypeSig,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// An interned evaluation stack type sequence.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypingId(pub u32);

/// A branch destination: the offset's label plus the stack typing the region
/// is entered with, since one offset may be decoded under several typings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchTarget {
    pub label: LabelId,
    pub offset: usize,
    pub typing: TypingId,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol {
    Stack(SlotId),
    Local(u16),
    Argument(u16),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    DivUnsigned,
    Rem,
    RemUnsigned,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUnsigned,
}

impl BinaryOp {
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            BinaryOp::DivUnsigned | BinaryOp::RemUnsigned | BinaryOp::ShrUnsigned
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrUnsigned)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Symbol(Symbol),
    AddressOf(Symbol),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Null,
    String(String),
    Binary {
        op: BinaryOp,
        left: Symbol,
        right: Symbol,
    },
    Unary {
        op: UnaryOp,
        operand: Symbol,
    },
    Compare {
        op: CompareOp,
        unsigned: bool,
        left: Symbol,
        right: Symbol,
    },
    Convert {
        to: TypeSig,
        operand: Symbol,
    },
    Call {
        method: MethodId,
        args: Vec<Symbol>,
    },
    /// Dispatch through the receiver's vtable or interface table.
    VirtualCall {
        method: MethodId,
        args: Vec<Symbol>,
    },
    NewObject {
        ctor: MethodId,
        args: Vec<Symbol>,
    },
    LoadField {
        instance: Symbol,
        field: FieldId,
    },
    LoadStaticField(FieldId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Nop,
    Assign {
        target: Symbol,
        value: Expr,
    },
    /// An expression evaluated for its side effects only.
    Evaluate(Expr),
    StoreField {
        instance: Symbol,
        field: FieldId,
        value: Symbol,
    },
    StoreStaticField {
        field: FieldId,
        value: Symbol,
    },
    /// `ldtoken` of a field with declared data: fills a runtime field handle.
    FieldHandle {
        target: Symbol,
        blob: BlobId,
        size: usize,
    },
    Jump(BranchTarget),
    BranchIf {
        condition: Symbol,
        when: bool,
        target: BranchTarget,
    },
    BranchCompare {
        op: CompareOp,
        unsigned: bool,
        left: Symbol,
        right: Symbol,
        target: BranchTarget,
    },
    Switch {
        value: Symbol,
        targets: Vec<BranchTarget>,
    },
    Return(Option<Symbol>),
    Throw(Symbol),
}
