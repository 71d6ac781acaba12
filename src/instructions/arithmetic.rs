use super::{IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{BinaryOp, CompareOp, Expr, Node, UnaryOp},
    error::DecodeError,
    types::TypeSig,
};

/// Result type of a binary numeric operation on two stack types, following
/// the usual promotion rules: `int32` and native int widen to native int,
/// pointer arithmetic keeps the pointer type.
fn binary_result(op: BinaryOp, left: &TypeSig, right: &TypeSig) -> Option<TypeSig> {
    use TypeSig::*;
    if op.is_shift() {
        return match right {
            Int32 | IntPtr => Some(left.clone()),
            _ => None,
        };
    }
    match (left, right) {
        (l, r) if l == r && (l.is_primitive() || matches!(l, Pointer(_) | ByRef(_))) => {
            Some(l.clone())
        }
        (Int32, IntPtr) | (IntPtr, Int32) => Some(IntPtr),
        (Float32, Float64) | (Float64, Float32) => Some(Float64),
        (p @ (Pointer(_) | ByRef(_)), Int32 | IntPtr) | (Int32 | IntPtr, p @ (Pointer(_) | ByRef(_)))
            if matches!(op, BinaryOp::Add | BinaryOp::Sub) =>
        {
            Some(p.clone())
        }
        _ => None,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Binary {
    pub name: &'static str,
    pub op: BinaryOp,
}

impl IlConverter for Binary {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let right = ctx.pop()?;
        let left = ctx.pop()?;
        let (left_ty, right_ty) = (ctx.symbol_type(left)?, ctx.symbol_type(right)?);
        let ty = binary_result(self.op, &left_ty, &right_ty).ok_or_else(|| {
            ctx.invalid_operand(format!(
                "{} on {} and {}",
                self.name,
                left_ty.show(ctx.metadata()),
                right_ty.show(ctx.metadata())
            ))
        })?;
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::Binary {
                op: self.op,
                left,
                right,
            },
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Unary {
    pub name: &'static str,
    pub op: UnaryOp,
}

impl IlConverter for Unary {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let operand = ctx.pop()?;
        let ty = ctx.symbol_type(operand)?;
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::Unary {
                op: self.op,
                operand,
            },
        })
    }
}

/// `ceq`, `cgt`, `clt` and their unsigned forms: push 0 or 1.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Compare {
    pub name: &'static str,
    pub op: CompareOp,
    pub unsigned: bool,
}

impl IlConverter for Compare {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let right = ctx.pop()?;
        let left = ctx.pop()?;
        let target = ctx.push(&TypeSig::Int32);
        Ok(Node::Assign {
            target,
            value: Expr::Compare {
                op: self.op,
                unsigned: self.unsigned,
                left,
                right,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Convert {
    pub name: &'static str,
    pub to: TypeSig,
}

impl IlConverter for Convert {
    fn name(&self) -> &'static str {
        self.name
    }

    fn decode_operand(&self, _ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        Ok(Operand::None)
    }

    fn apply(&self, _operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let operand = ctx.pop()?;
        let ty = self.to.stack_type(ctx.metadata());
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::Convert {
                to: self.to.clone(),
                operand,
            },
        })
    }
}
