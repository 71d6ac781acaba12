use super::{IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{Expr, Node},
    error::DecodeError,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Nop;

impl IlConverter for Nop {
    fn name(&self) -> &'static str {
        "nop"
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, _ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        Ok(Node::Nop)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Duplicate;

impl IlConverter for Duplicate {
    fn name(&self) -> &'static str {
        "dup"
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let source = ctx.peek()?;
        let ty = ctx.symbol_type(source)?;
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::Symbol(source),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pop;

impl IlConverter for Pop {
    fn name(&self) -> &'static str {
        "pop"
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        ctx.pop()?;
        Ok(Node::Nop)
    }
}
