use super::{IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{Expr, Node},
    error::DecodeError,
    types::TypeSig,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstantForm {
    /// `ldc.i4.m1` through `ldc.i4.8`.
    Fixed(i32),
    Int8,
    Int32,
    Int64,
    Float32,
    Float64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoadConstant {
    pub name: &'static str,
    pub form: ConstantForm,
}

impl IlConverter for LoadConstant {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(match self.form {
            ConstantForm::Fixed(value) => Operand::Int32(value),
            ConstantForm::Int8 => Operand::Int32(ctx.fetch_i8()?.into()),
            ConstantForm::Int32 => Operand::Int32(ctx.fetch_i32()?),
            ConstantForm::Int64 => Operand::Int64(ctx.fetch_i64()?),
            ConstantForm::Float32 => Operand::Float32(ctx.fetch_f32()?),
            ConstantForm::Float64 => Operand::Float64(ctx.fetch_f64()?),
        })
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let (ty, value) = match operand {
            Operand::Int32(v) => (TypeSig::Int32, Expr::Int32(v)),
            Operand::Int64(v) => (TypeSig::Int64, Expr::Int64(v)),
            Operand::Float32(v) => (TypeSig::Float32, Expr::Float32(v)),
            Operand::Float64(v) => (TypeSig::Float64, Expr::Float64(v)),
            other => {
                return Err(ctx.invalid_operand(format!("expected constant, found {other:?}")))
            }
        };
        let target = ctx.push(&ty);
        Ok(Node::Assign { target, value })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoadNull;

impl IlConverter for LoadNull {
    fn name(&self) -> &'static str {
        "ldnull"
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let target = ctx.push(&TypeSig::Object);
        Ok(Node::Assign {
            target,
            value: Expr::Null,
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoadString;

impl IlConverter for LoadString {
    fn name(&self) -> &'static str {
        "ldstr"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let value = ctx.resolve_string(operand.token(ctx)?)?.to_string();
        ctx.register_type(&TypeSig::String);
        let target = ctx.push(&TypeSig::String);
        Ok(Node::Assign {
            target,
            value: Expr::String(value),
        })
    }
}
