use super::{IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{Expr, Node},
    error::DecodeError,
    metadata::TokenTarget,
    types::{members::FieldDescription, TypeSig},
};

/// Resolves the field operand and checks it is static or instance as the
/// opcode requires.
fn resolve_field<'a>(
    ctx: &DecodeContext<'a>,
    operand: &Operand,
    static_member: bool,
) -> Result<FieldDescription<'a>, DecodeError> {
    let field = ctx.resolve_field(operand.token(ctx)?)?;
    if field.field().static_member != static_member {
        let kind = if static_member { "static" } else { "instance" };
        return Err(ctx.invalid_operand(format!(
            "expected {kind} field, found {}",
            field.field().name
        )));
    }
    ctx.register_type(&field.parent().signature());
    ctx.register_type(&field.field().ty);
    Ok(field)
}

macro_rules! field_converter {
    ($name:ident, $opcode:literal) => {
        #[derive(Copy, Clone, Debug, PartialEq)]
        pub struct $name;

        impl $name {
            const NAME: &'static str = $opcode;
        }
    };
}

field_converter!(LoadField, "ldfld");
field_converter!(StoreField, "stfld");
field_converter!(LoadStaticField, "ldsfld");
field_converter!(StoreStaticField, "stsfld");

impl IlConverter for LoadField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let field = resolve_field(ctx, &operand, false)?;
        let instance = ctx.pop()?;
        let ty = field.field().ty.stack_type(ctx.metadata());
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::LoadField {
                instance,
                field: field.id,
            },
        })
    }
}

impl IlConverter for StoreField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let field = resolve_field(ctx, &operand, false)?;
        let value = ctx.pop()?;
        let instance = ctx.pop()?;
        Ok(Node::StoreField {
            instance,
            field: field.id,
            value,
        })
    }
}

impl IlConverter for LoadStaticField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let field = resolve_field(ctx, &operand, true)?;
        ctx.metadata().register_field(field.id);
        let ty = field.field().ty.stack_type(ctx.metadata());
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::LoadStaticField(field.id),
        })
    }
}

impl IlConverter for StoreStaticField {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let field = resolve_field(ctx, &operand, true)?;
        ctx.metadata().register_field(field.id);
        let value = ctx.pop()?;
        Ok(Node::StoreStaticField {
            field: field.id,
            value,
        })
    }
}

/// `ldtoken` on a field with declared data, as emitted for array initializers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoadToken;

impl IlConverter for LoadToken {
    fn name(&self) -> &'static str {
        "ldtoken"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let field = match ctx.resolve_token(operand.token(ctx)?)? {
            TokenTarget::Field(field) => field,
            other => {
                return Err(ctx.invalid_operand(format!(
                    "ldtoken only supports fields with declared data, found {other:?}"
                )))
            }
        };
        let (blob, size) = ctx.register_declared_value(field)?;
        ctx.register_type(&TypeSig::RuntimeFieldHandle);
        let target = ctx.push(&TypeSig::RuntimeFieldHandle);
        Ok(Node::FieldHandle { target, blob, size })
    }
}
