//! The instruction catalog: one converter per opcode family. A converter reads
//! its operand and then turns the instruction into a [`Node`], pushing and
//! popping typed stack slots on the way.

use crate::{
    decode::DecodeContext,
    emit::node::{BinaryOp, CompareOp, Node, UnaryOp},
    error::DecodeError,
    metadata::Token,
    types::TypeSig,
};
use enum_dispatch::enum_dispatch;

mod arithmetic;
mod calls;
mod constants;
mod fields;
mod flow;
mod stack;
mod variables;

pub use arithmetic::{Binary, Compare, Convert, Unary};
pub use calls::{Call, CallVirtual, NewObject};
pub use constants::{ConstantForm, LoadConstant, LoadNull, LoadString};
pub use fields::{LoadField, LoadStaticField, LoadToken, StoreField, StoreStaticField};
pub use flow::{Branch, BranchCompare, BranchIf, Return, Switch, Throw};
pub use stack::{Duplicate, Nop, Pop};
pub use variables::{
    LoadArgument, LoadArgumentAddress, LoadLocal, LoadLocalAddress, StoreArgument, StoreLocal,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Index(u16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Branch delta relative to the next instruction.
    Branch(i32),
    Switch(Vec<i32>),
    Token(Token),
}

impl Operand {
    fn mismatch(&self, ctx: &DecodeContext, expected: &str) -> DecodeError {
        ctx.invalid_operand(format!("expected {expected} operand, found {self:?}"))
    }

    pub fn index(&self, ctx: &DecodeContext) -> Result<u16, DecodeError> {
        match self {
            Operand::Index(i) => Ok(*i),
            _ => Err(self.mismatch(ctx, "index")),
        }
    }

    pub fn branch(&self, ctx: &DecodeContext) -> Result<i32, DecodeError> {
        match self {
            Operand::Branch(delta) => Ok(*delta),
            _ => Err(self.mismatch(ctx, "branch")),
        }
    }

    pub fn token(&self, ctx: &DecodeContext) -> Result<Token, DecodeError> {
        match self {
            Operand::Token(t) => Ok(*t),
            _ => Err(self.mismatch(ctx, "token")),
        }
    }
}

/// How an opcode encodes a variable index.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexForm {
    /// Baked into the opcode (`ldarg.0`).
    Fixed(u16),
    /// One unsigned byte (`ldarg.s`).
    Short,
    /// Two bytes (`ldarg`).
    Long,
}

impl IndexForm {
    pub fn read(self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::Index(match self {
            IndexForm::Fixed(i) => i,
            IndexForm::Short => ctx.fetch_u8()?.into(),
            IndexForm::Long => ctx.fetch_u16()?,
        }))
    }
}

/// Branch operand width.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BranchForm {
    Short,
    Long,
}

impl BranchForm {
    pub fn read(self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::Branch(match self {
            BranchForm::Short => ctx.fetch_i8()?.into(),
            BranchForm::Long => ctx.fetch_i32()?,
        }))
    }
}

#[enum_dispatch]
pub trait IlConverter {
    fn name(&self) -> &'static str;

    /// Whether decoding stops after this instruction because control never
    /// falls through to the next one.
    fn is_end_of_path(&self) -> bool {
        false
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError>;

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError>;
}

#[enum_dispatch(IlConverter)]
#[derive(Clone, Debug, PartialEq)]
pub enum Converter {
    Nop,
    Duplicate,
    Pop,
    LoadArgument,
    LoadArgumentAddress,
    StoreArgument,
    LoadLocal,
    LoadLocalAddress,
    StoreLocal,
    LoadNull,
    LoadConstant,
    LoadString,
    Branch,
    BranchIf,
    BranchCompare,
    Switch,
    Return,
    Throw,
    Binary,
    Unary,
    Compare,
    Convert,
    Call,
    CallVirtual,
    NewObject,
    LoadField,
    StoreField,
    LoadStaticField,
    StoreStaticField,
    LoadToken,
}

fn branch_compare(name: &'static str, op: CompareOp, unsigned: bool, form: BranchForm) -> Converter {
    BranchCompare {
        name,
        op,
        unsigned,
        form,
    }
    .into()
}

fn binary(name: &'static str, op: BinaryOp) -> Converter {
    Binary { name, op }.into()
}

fn compare(name: &'static str, op: CompareOp, unsigned: bool) -> Converter {
    Compare { name, op, unsigned }.into()
}

fn convert(name: &'static str, to: TypeSig) -> Converter {
    Convert { name, to }.into()
}

/// Looks up a one-byte opcode.
pub fn try_get_converter(opcode: u8) -> Option<Converter> {
    use CompareOp::*;

    let converter: Converter = match opcode {
        0x00 => Nop.into(),
        0x02..=0x05 => LoadArgument {
            name: ["ldarg.0", "ldarg.1", "ldarg.2", "ldarg.3"][(opcode - 0x02) as usize],
            form: IndexForm::Fixed((opcode - 0x02).into()),
        }
        .into(),
        0x06..=0x09 => LoadLocal {
            name: ["ldloc.0", "ldloc.1", "ldloc.2", "ldloc.3"][(opcode - 0x06) as usize],
            form: IndexForm::Fixed((opcode - 0x06).into()),
        }
        .into(),
        0x0A..=0x0D => StoreLocal {
            name: ["stloc.0", "stloc.1", "stloc.2", "stloc.3"][(opcode - 0x0A) as usize],
            form: IndexForm::Fixed((opcode - 0x0A).into()),
        }
        .into(),
        0x0E => LoadArgument {
            name: "ldarg.s",
            form: IndexForm::Short,
        }
        .into(),
        0x0F => LoadArgumentAddress {
            name: "ldarga.s",
            form: IndexForm::Short,
        }
        .into(),
        0x10 => StoreArgument {
            name: "starg.s",
            form: IndexForm::Short,
        }
        .into(),
        0x11 => LoadLocal {
            name: "ldloc.s",
            form: IndexForm::Short,
        }
        .into(),
        0x12 => LoadLocalAddress {
            name: "ldloca.s",
            form: IndexForm::Short,
        }
        .into(),
        0x13 => StoreLocal {
            name: "stloc.s",
            form: IndexForm::Short,
        }
        .into(),
        0x14 => LoadNull.into(),
        0x15..=0x1E => {
            const NAMES: [&str; 10] = [
                "ldc.i4.m1", "ldc.i4.0", "ldc.i4.1", "ldc.i4.2", "ldc.i4.3", "ldc.i4.4",
                "ldc.i4.5", "ldc.i4.6", "ldc.i4.7", "ldc.i4.8",
            ];
            let value = opcode as i32 - 0x16;
            LoadConstant {
                name: NAMES[(opcode - 0x15) as usize],
                form: ConstantForm::Fixed(value),
            }
            .into()
        }
        0x1F => LoadConstant {
            name: "ldc.i4.s",
            form: ConstantForm::Int8,
        }
        .into(),
        0x20 => LoadConstant {
            name: "ldc.i4",
            form: ConstantForm::Int32,
        }
        .into(),
        0x21 => LoadConstant {
            name: "ldc.i8",
            form: ConstantForm::Int64,
        }
        .into(),
        0x22 => LoadConstant {
            name: "ldc.r4",
            form: ConstantForm::Float32,
        }
        .into(),
        0x23 => LoadConstant {
            name: "ldc.r8",
            form: ConstantForm::Float64,
        }
        .into(),
        0x25 => Duplicate.into(),
        0x26 => Pop.into(),
        0x28 => Call.into(),
        0x2A => Return.into(),
        0x2B => Branch {
            name: "br.s",
            form: BranchForm::Short,
        }
        .into(),
        0x2C => BranchIf {
            name: "brfalse.s",
            when: false,
            form: BranchForm::Short,
        }
        .into(),
        0x2D => BranchIf {
            name: "brtrue.s",
            when: true,
            form: BranchForm::Short,
        }
        .into(),
        0x2E => branch_compare("beq.s", Eq, false, BranchForm::Short),
        0x2F => branch_compare("bge.s", Ge, false, BranchForm::Short),
        0x30 => branch_compare("bgt.s", Gt, false, BranchForm::Short),
        0x31 => branch_compare("ble.s", Le, false, BranchForm::Short),
        0x32 => branch_compare("blt.s", Lt, false, BranchForm::Short),
        0x33 => branch_compare("bne.un.s", Ne, true, BranchForm::Short),
        0x34 => branch_compare("bge.un.s", Ge, true, BranchForm::Short),
        0x35 => branch_compare("bgt.un.s", Gt, true, BranchForm::Short),
        0x36 => branch_compare("ble.un.s", Le, true, BranchForm::Short),
        0x37 => branch_compare("blt.un.s", Lt, true, BranchForm::Short),
        0x38 => Branch {
            name: "br",
            form: BranchForm::Long,
        }
        .into(),
        0x39 => BranchIf {
            name: "brfalse",
            when: false,
            form: BranchForm::Long,
        }
        .into(),
        0x3A => BranchIf {
            name: "brtrue",
            when: true,
            form: BranchForm::Long,
        }
        .into(),
        0x3B => branch_compare("beq", Eq, false, BranchForm::Long),
        0x3C => branch_compare("bge", Ge, false, BranchForm::Long),
        0x3D => branch_compare("bgt", Gt, false, BranchForm::Long),
        0x3E => branch_compare("ble", Le, false, BranchForm::Long),
        0x3F => branch_compare("blt", Lt, false, BranchForm::Long),
        0x40 => branch_compare("bne.un", Ne, true, BranchForm::Long),
        0x41 => branch_compare("bge.un", Ge, true, BranchForm::Long),
        0x42 => branch_compare("bgt.un", Gt, true, BranchForm::Long),
        0x43 => branch_compare("ble.un", Le, true, BranchForm::Long),
        0x44 => branch_compare("blt.un", Lt, true, BranchForm::Long),
        0x45 => Switch.into(),
        0x58 => binary("add", BinaryOp::Add),
        0x59 => binary("sub", BinaryOp::Sub),
        0x5A => binary("mul", BinaryOp::Mul),
        0x5B => binary("div", BinaryOp::Div),
        0x5C => binary("div.un", BinaryOp::DivUnsigned),
        0x5D => binary("rem", BinaryOp::Rem),
        0x5E => binary("rem.un", BinaryOp::RemUnsigned),
        0x5F => binary("and", BinaryOp::And),
        0x60 => binary("or", BinaryOp::Or),
        0x61 => binary("xor", BinaryOp::Xor),
        0x62 => binary("shl", BinaryOp::Shl),
        0x63 => binary("shr", BinaryOp::Shr),
        0x64 => binary("shr.un", BinaryOp::ShrUnsigned),
        0x65 => Unary {
            name: "neg",
            op: UnaryOp::Neg,
        }
        .into(),
        0x66 => Unary {
            name: "not",
            op: UnaryOp::Not,
        }
        .into(),
        0x67 => convert("conv.i1", TypeSig::Int8),
        0x68 => convert("conv.i2", TypeSig::Int16),
        0x69 => convert("conv.i4", TypeSig::Int32),
        0x6A => convert("conv.i8", TypeSig::Int64),
        0x6B => convert("conv.r4", TypeSig::Float32),
        0x6C => convert("conv.r8", TypeSig::Float64),
        0x6D => convert("conv.u4", TypeSig::UInt32),
        0x6E => convert("conv.u8", TypeSig::UInt64),
        0x6F => CallVirtual.into(),
        0x72 => LoadString.into(),
        0x73 => NewObject.into(),
        0x7A => Throw.into(),
        0x7B => LoadField.into(),
        0x7D => StoreField.into(),
        0x7E => LoadStaticField.into(),
        0x80 => StoreStaticField.into(),
        0xD0 => LoadToken.into(),
        0xD1 => convert("conv.u2", TypeSig::UInt16),
        0xD2 => convert("conv.u1", TypeSig::UInt8),
        0xD3 => convert("conv.i", TypeSig::IntPtr),
        0xE0 => convert("conv.u", TypeSig::UIntPtr),
        _ => return None,
    };
    Some(converter)
}

/// Looks up a two-byte opcode, first byte in the high half.
pub fn try_get_wide_converter(opcode: u16) -> Option<Converter> {
    let converter: Converter = match opcode {
        0xFE01 => compare("ceq", CompareOp::Eq, false),
        0xFE02 => compare("cgt", CompareOp::Gt, false),
        0xFE03 => compare("cgt.un", CompareOp::Gt, true),
        0xFE04 => compare("clt", CompareOp::Lt, false),
        0xFE05 => compare("clt.un", CompareOp::Lt, true),
        0xFE09 => LoadArgument {
            name: "ldarg",
            form: IndexForm::Long,
        }
        .into(),
        0xFE0A => LoadArgumentAddress {
            name: "ldarga",
            form: IndexForm::Long,
        }
        .into(),
        0xFE0B => StoreArgument {
            name: "starg",
            form: IndexForm::Long,
        }
        .into(),
        0xFE0C => LoadLocal {
            name: "ldloc",
            form: IndexForm::Long,
        }
        .into(),
        0xFE0D => LoadLocalAddress {
            name: "ldloca",
            form: IndexForm::Long,
        }
        .into(),
        0xFE0E => StoreLocal {
            name: "stloc",
            form: IndexForm::Long,
        }
        .into(),
        _ => return None,
    };
    Some(converter)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::{
        decode::{decode_method, DecodedBody},
        emit::node::Node,
        error::DecodeError,
        metadata::{MetadataBuilder, MethodDef, Parameter, TypeDef, TypeKind},
        types::{members::MethodDescription, TypeSig},
    };

    /// Decodes `il` as the body of a static method on a fresh program.
    pub fn decode_static(
        parameters: Vec<TypeSig>,
        return_type: TypeSig,
        locals: Vec<TypeSig>,
        il: Vec<u8>,
    ) -> Result<DecodedBody, DecodeError> {
        let mut builder = MetadataBuilder::new();
        let ty = builder.add_type(TypeDef::new("Demo", "Program", TypeKind::Class));
        let parameters = parameters
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Parameter::new(format!("arg{i}"), ty))
            .collect();
        let method = builder.add_method(
            ty,
            MethodDef::static_method("Run", parameters, return_type).with_body(locals, il),
        );
        let metadata = builder.build();
        decode_method(MethodDescription::new(&metadata, method))
    }

    pub fn nodes(body: &DecodedBody) -> Vec<Node> {
        body.instructions.iter().map(|i| i.node.clone()).collect()
    }
}
