use super::{IlConverter, IndexForm, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{Expr, Node, Symbol},
    error::DecodeError,
    types::TypeSig,
};

macro_rules! variable_converter {
    ($name:ident) => {
        #[derive(Copy, Clone, Debug, PartialEq)]
        pub struct $name {
            pub name: &'static str,
            pub form: IndexForm,
        }
    };
}

variable_converter!(LoadArgument);
variable_converter!(LoadArgumentAddress);
variable_converter!(StoreArgument);
variable_converter!(LoadLocal);
variable_converter!(LoadLocalAddress);
variable_converter!(StoreLocal);

fn load(ctx: &mut DecodeContext, source: Symbol) -> Result<Node, DecodeError> {
    let ty = ctx.symbol_type(source)?.stack_type(ctx.metadata());
    let target = ctx.push(&ty);
    Ok(Node::Assign {
        target,
        value: Expr::Symbol(source),
    })
}

fn load_address(ctx: &mut DecodeContext, source: Symbol) -> Result<Node, DecodeError> {
    let ty = TypeSig::by_ref(ctx.symbol_type(source)?);
    ctx.register_type(&ty);
    let target = ctx.push(&ty);
    Ok(Node::Assign {
        target,
        value: Expr::AddressOf(source),
    })
}

fn store(ctx: &mut DecodeContext, target: Symbol) -> Result<Node, DecodeError> {
    ctx.symbol_type(target)?;
    let value = ctx.pop()?;
    Ok(Node::Assign {
        target,
        value: Expr::Symbol(value),
    })
}

macro_rules! impl_variable_converter {
    ($name:ident, $symbol:ident, $action:ident) => {
        impl IlConverter for $name {
            fn name(&self) -> &'static str {
                self.name
            }

            fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
                self.form.read(ctx)
            }

            fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
                let index = operand.index(ctx)?;
                $action(ctx, Symbol::$symbol(index))
            }
        }
    };
}

impl_variable_converter!(LoadArgument, Argument, load);
impl_variable_converter!(LoadArgumentAddress, Argument, load_address);
impl_variable_converter!(StoreArgument, Argument, store);
impl_variable_converter!(LoadLocal, Local, load);
impl_variable_converter!(LoadLocalAddress, Local, load_address);
impl_variable_converter!(StoreLocal, Local, store);
