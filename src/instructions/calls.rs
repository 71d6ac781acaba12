use super::{IlConverter, Operand};
use crate::{
    decode::DecodeContext,
    emit::node::{Expr, Node, Symbol},
    error::DecodeError,
    types::{members::MethodDescription, TypeSig},
};

/// Registers every type in the callee's signature and pops its arguments.
fn prepare_call(ctx: &mut DecodeContext, callee: MethodDescription) -> Result<Vec<Symbol>, DecodeError> {
    let arguments = callee.argument_types();
    for ty in &arguments {
        ctx.register_type(ty);
    }
    ctx.register_type(&callee.method().return_type);
    ctx.pop_many(arguments.len())
}

fn finish_call(ctx: &mut DecodeContext, callee: MethodDescription, call: Expr) -> Node {
    let return_type = &callee.method().return_type;
    if *return_type == TypeSig::Void {
        return Node::Evaluate(call);
    }
    let ty = return_type.stack_type(ctx.metadata());
    let target = ctx.push(&ty);
    Node::Assign {
        target,
        value: call,
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Call;

impl IlConverter for Call {
    fn name(&self) -> &'static str {
        "call"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let callee = ctx.resolve_method(operand.token(ctx)?)?;
        let args = prepare_call(ctx, callee)?;
        let call = Expr::Call {
            method: callee.id,
            args,
        };
        Ok(finish_call(ctx, callee, call))
    }
}

/// Dispatches through the receiver when the callee is virtual, otherwise a
/// direct call with a receiver.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CallVirtual;

impl IlConverter for CallVirtual {
    fn name(&self) -> &'static str {
        "callvirt"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let callee = ctx.resolve_method(operand.token(ctx)?)?;
        if callee.method().static_member {
            return Err(ctx.invalid_operand(format!(
                "callvirt to static method {}",
                callee.full_name()
            )));
        }
        let args = prepare_call(ctx, callee)?;
        let call = if callee.method().virtual_member {
            Expr::VirtualCall {
                method: callee.id,
                args,
            }
        } else {
            Expr::Call {
                method: callee.id,
                args,
            }
        };
        Ok(finish_call(ctx, callee, call))
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NewObject;

impl IlConverter for NewObject {
    fn name(&self) -> &'static str {
        "newobj"
    }

    fn decode_operand(&self, ctx: &mut DecodeContext) -> Result<Operand, DecodeError> {
        ctx.fetch_token().map(Operand::Token)
    }

    fn apply(&self, operand: Operand, ctx: &mut DecodeContext) -> Result<Node, DecodeError> {
        let ctor = ctx.resolve_method(operand.token(ctx)?)?;
        if ctor.name() != ".ctor" || ctor.method().static_member {
            return Err(ctx.invalid_operand(format!(
                "newobj target {} is not a constructor",
                ctor.full_name()
            )));
        }
        let parameters = &ctor.method().parameters;
        for p in parameters {
            ctx.register_type(&p.ty);
        }
        let args = ctx.pop_many(parameters.len())?;
        let ty = ctor.parent().signature();
        ctx.register_type(&ty);
        let target = ctx.push(&ty);
        Ok(Node::Assign {
            target,
            value: Expr::NewObject {
                ctor: ctor.id,
                args,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        decode::decode_method,
        emit::node::{Expr, Node},
        metadata::{MetadataBuilder, MethodDef, Parameter, TypeDef, TypeKind},
        types::{members::MethodDescription, TypeSig},
    };

    #[test]
    fn arguments_pop_in_reverse_and_registration_happens() {
        let mut builder = MetadataBuilder::new();
        let ty = builder.add_type(TypeDef::new("Demo", "Shape", TypeKind::Class));
        let area = builder.add_method(
            ty,
            MethodDef::instance("Area", vec![Parameter::new("scale", TypeSig::Float64)], TypeSig::Float64)
                .new_slot(),
        );
        let mut il = vec![0x02, 0x23];
        il.extend_from_slice(&2_f64.to_le_bytes());
        il.push(0x6F);
        il.extend_from_slice(&area.token().0.to_le_bytes());
        il.push(0x2A);
        let run = builder.add_method(
            ty,
            MethodDef::static_method("Run", vec![Parameter::new("s", TypeSig::Type(ty))], TypeSig::Float64)
                .with_body(vec![], il),
        );
        let metadata = builder.build();
        let body = decode_method(MethodDescription::new(&metadata, run)).unwrap();

        let Node::Assign { value: Expr::VirtualCall { method, args }, .. } = &body.instructions[2].node
        else {
            panic!("expected a virtual call");
        };
        assert_eq!(*method, area);
        assert_eq!(args.len(), 2);
        assert!(metadata.registered_types().contains(&TypeSig::Type(ty)));
        assert!(metadata.registered_types().contains(&TypeSig::Float64));
    }

    #[test]
    fn newobj_pushes_the_constructed_type() {
        let mut builder = MetadataBuilder::new();
        let ty = builder.add_type(TypeDef::new("Demo", "Box", TypeKind::Class));
        let ctor = builder.add_method(ty, MethodDef::instance(".ctor", vec![], TypeSig::Void));
        let mut il = vec![0x73];
        il.extend_from_slice(&ctor.token().0.to_le_bytes());
        il.push(0x2A);
        let run = builder.add_method(
            ty,
            MethodDef::static_method("Make", vec![], TypeSig::Type(ty)).with_body(vec![], il),
        );
        let metadata = builder.build();
        let body = decode_method(MethodDescription::new(&metadata, run)).unwrap();
        assert_eq!(body.stacks[0].ty, TypeSig::Type(ty));
    }
}
