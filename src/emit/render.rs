//! Phase two: pure rendering of decoded nodes to C statements. Every name
//! comes from an [`ExtractContext`]; nothing here looks at decode state.

use crate::{
    decode::BlobId,
    emit::node::{BinaryOp, BranchTarget, CompareOp, Expr, Node, Symbol, UnaryOp},
    metadata::{FieldId, MethodId},
    types::TypeSig,
    utils::escape_c_string,
};

/// How a virtual call reaches its function pointer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtualTarget {
    /// Through the object's class vtable.
    Class { field: String },
    /// Through the per-interface vtable pointer embedded in the object.
    Interface { vptr: String, field: String },
}

pub trait ExtractContext {
    fn symbol_name(&self, symbol: Symbol) -> String;
    fn symbol_type(&self, symbol: Symbol) -> TypeSig;
    fn is_value_type(&self, ty: &TypeSig) -> bool;
    /// The C spelling of a type in a declaration.
    fn c_type(&self, ty: &TypeSig) -> String;
    /// The bare mangled name of a type, as used by runtime macros.
    fn mangled_type(&self, ty: &TypeSig) -> String;
    fn method_name(&self, method: MethodId) -> String;
    fn virtual_target(&self, method: MethodId) -> VirtualTarget;
    fn constructed_type(&self, ctor: MethodId) -> TypeSig;
    fn field_name(&self, field: FieldId) -> String;
    fn static_field_name(&self, field: FieldId) -> String;
    fn label_name(&self, target: BranchTarget) -> String;
    fn blob_name(&self, blob: BlobId) -> String;
}

fn unsigned_c_type(ty: &TypeSig) -> Option<&'static str> {
    match ty {
        TypeSig::Int32 | TypeSig::UInt32 => Some("uint32_t"),
        TypeSig::Int64 | TypeSig::UInt64 => Some("uint64_t"),
        TypeSig::IntPtr | TypeSig::UIntPtr => Some("uintptr_t"),
        _ => None,
    }
}

fn is_float(ty: &TypeSig) -> bool {
    matches!(ty, TypeSig::Float32 | TypeSig::Float64)
}

/// The operand as written, cast to its unsigned counterpart when requested
/// and the operand is an integer.
fn operand(ctx: &dyn ExtractContext, symbol: Symbol, unsigned: bool) -> String {
    let name = ctx.symbol_name(symbol);
    if !unsigned {
        return name;
    }
    match unsigned_c_type(&ctx.symbol_type(symbol)) {
        Some(ty) => format!("({ty}){name}"),
        None => name,
    }
}

fn float_literal(value: f64, suffix: &str) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "INFINITY" } else { "-INFINITY" }.to_string()
    } else {
        format!("{value:?}{suffix}")
    }
}

fn binary_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div | BinaryOp::DivUnsigned => "/",
        BinaryOp::Rem | BinaryOp::RemUnsigned => "%",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
        BinaryOp::Xor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr | BinaryOp::ShrUnsigned => ">>",
    }
}

fn compare_operator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::Ne => "!=",
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::Lt => "<",
        CompareOp::Le => "<=",
    }
}

fn arguments(ctx: &dyn ExtractContext, args: &[Symbol]) -> String {
    args.iter()
        .map(|a| ctx.symbol_name(*a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn member_access(ctx: &dyn ExtractContext, instance: Symbol, field: FieldId) -> String {
    let separator = if ctx.is_value_type(&ctx.symbol_type(instance)) {
        "."
    } else {
        "->"
    };
    format!(
        "{}{separator}{}",
        ctx.symbol_name(instance),
        ctx.field_name(field)
    )
}

pub fn render_expr(expr: &Expr, ctx: &dyn ExtractContext) -> String {
    match expr {
        Expr::Symbol(s) => ctx.symbol_name(*s),
        Expr::AddressOf(s) => format!("&{}", ctx.symbol_name(*s)),
        Expr::Int32(v) => v.to_string(),
        Expr::Int64(v) => format!("{v}LL"),
        Expr::Float32(v) => float_literal(f64::from(*v), "f"),
        Expr::Float64(v) => float_literal(*v, ""),
        Expr::Null => "NULL".to_string(),
        Expr::String(s) => format!("il2c_new_string(L\"{}\")", escape_c_string(s)),
        Expr::Binary { op, left, right } => {
            let left_ty = ctx.symbol_type(*left);
            if is_float(&left_ty) && matches!(op, BinaryOp::Rem) {
                return format!("fmod({}, {})", ctx.symbol_name(*left), ctx.symbol_name(*right));
            }
            let unsigned = op.is_unsigned();
            let right = if op.is_shift() {
                ctx.symbol_name(*right)
            } else {
                operand(ctx, *right, unsigned)
            };
            format!(
                "{} {} {right}",
                operand(ctx, *left, unsigned),
                binary_operator(*op)
            )
        }
        Expr::Unary { op, operand } => {
            let sign = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "~",
            };
            format!("{sign}{}", ctx.symbol_name(*operand))
        }
        Expr::Compare {
            op,
            unsigned,
            left,
            right,
        } => format!(
            "({} {} {}) ? 1 : 0",
            self::operand(ctx, *left, *unsigned),
            compare_operator(*op),
            self::operand(ctx, *right, *unsigned)
        ),
        Expr::Convert { to, operand } => {
            format!("({}){}", ctx.c_type(to), ctx.symbol_name(*operand))
        }
        Expr::Call { method, args } => {
            format!("{}({})", ctx.method_name(*method), arguments(ctx, args))
        }
        Expr::VirtualCall { method, args } => {
            let receiver = args
                .first()
                .map(|r| ctx.symbol_name(*r))
                .unwrap_or_default();
            let table = match ctx.virtual_target(*method) {
                VirtualTarget::Class { field } => format!("{receiver}->vptr0__->{field}"),
                VirtualTarget::Interface { vptr, field } => format!("{receiver}->{vptr}->{field}"),
            };
            format!("{table}({})", arguments(ctx, args))
        }
        Expr::NewObject { ctor, args } => {
            // Only reachable through an assignment; see `render`.
            format!("{}({})", ctx.method_name(*ctor), arguments(ctx, args))
        }
        Expr::LoadField { instance, field } => member_access(ctx, *instance, *field),
        Expr::LoadStaticField(field) => ctx.static_field_name(*field),
    }
}

fn render_new_object(
    ctx: &dyn ExtractContext,
    target: Symbol,
    ctor: MethodId,
    args: &[Symbol],
) -> Vec<String> {
    let ty = ctx.constructed_type(ctor);
    let name = ctx.symbol_name(target);
    let mangled = ctx.mangled_type(&ty);
    let rest: String = args
        .iter()
        .map(|a| format!(", {}", ctx.symbol_name(*a)))
        .collect();
    if ctx.is_value_type(&ty) {
        vec![
            format!("memset(&{name}, 0x00, sizeof({mangled}));"),
            format!("{}(&{name}{rest});", ctx.method_name(ctor)),
        ]
    } else {
        vec![
            format!("{name} = il2c_get_uninitialized_object(il2c_typeof({mangled}));"),
            format!("{}({name}{rest});", ctx.method_name(ctor)),
        ]
    }
}

/// Renders one node to zero or more C statements.
pub fn render(node: &Node, ctx: &dyn ExtractContext) -> Vec<String> {
    match node {
        Node::Nop => vec![],
        Node::Assign {
            target,
            value: Expr::NewObject { ctor, args },
        } => render_new_object(ctx, *target, *ctor, args),
        Node::Assign { target, value } => vec![format!(
            "{} = {};",
            ctx.symbol_name(*target),
            render_expr(value, ctx)
        )],
        Node::Evaluate(expr) => vec![format!("{};", render_expr(expr, ctx))],
        Node::StoreField {
            instance,
            field,
            value,
        } => vec![format!(
            "{} = {};",
            member_access(ctx, *instance, *field),
            ctx.symbol_name(*value)
        )],
        Node::StoreStaticField { field, value } => vec![format!(
            "{} = {};",
            ctx.static_field_name(*field),
            ctx.symbol_name(*value)
        )],
        Node::FieldHandle { target, blob, size } => {
            let name = ctx.symbol_name(*target);
            vec![
                format!("{name}.size__ = {size};"),
                format!("{name}.field__ = {};", ctx.blob_name(*blob)),
            ]
        }
        Node::Jump(target) => vec![format!("goto {};", ctx.label_name(*target))],
        Node::BranchIf {
            condition,
            when,
            target,
        } => vec![format!(
            "if ({}{}) goto {};",
            if *when { "" } else { "!" },
            ctx.symbol_name(*condition),
            ctx.label_name(*target)
        )],
        Node::BranchCompare {
            op,
            unsigned,
            left,
            right,
            target,
        } => vec![format!(
            "if ({} {} {}) goto {};",
            operand(ctx, *left, *unsigned),
            compare_operator(*op),
            operand(ctx, *right, *unsigned),
            ctx.label_name(*target)
        )],
        Node::Switch { value, targets } => {
            let mut lines = vec![format!("switch ({})", ctx.symbol_name(*value)), "{".to_string()];
            for (index, target) in targets.iter().enumerate() {
                lines.push(format!("    case {index}: goto {};", ctx.label_name(*target)));
            }
            lines.push("}".to_string());
            lines
        }
        Node::Return(None) => vec!["return;".to_string()],
        Node::Return(Some(value)) => vec![format!("return {};", ctx.symbol_name(*value))],
        Node::Throw(value) => vec![format!("il2c_throw({});", ctx.symbol_name(*value))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode::SlotId, emit::node::{LabelId, TypingId}};
    use pretty_assertions::assert_eq;

    /// Names everything after its raw index so rendering can be checked
    /// without a program.
    struct FixedNames;

    impl ExtractContext for FixedNames {
        fn symbol_name(&self, symbol: Symbol) -> String {
            match symbol {
                Symbol::Stack(s) => format!("stack{}_{}", s.depth, s.variant),
                Symbol::Local(i) => format!("local{i}"),
                Symbol::Argument(i) => format!("arg{i}"),
            }
        }

        fn symbol_type(&self, symbol: Symbol) -> TypeSig {
            match symbol {
                Symbol::Local(_) => TypeSig::Float64,
                _ => TypeSig::Int32,
            }
        }

        fn is_value_type(&self, ty: &TypeSig) -> bool {
            ty.is_primitive()
        }

        fn c_type(&self, ty: &TypeSig) -> String {
            format!("{ty:?}_t")
        }

        fn mangled_type(&self, _ty: &TypeSig) -> String {
            "Demo_Box".to_string()
        }

        fn method_name(&self, method: MethodId) -> String {
            format!("method{}", method.0)
        }

        fn virtual_target(&self, method: MethodId) -> VirtualTarget {
            VirtualTarget::Class {
                field: format!("M__{}", method.0),
            }
        }

        fn constructed_type(&self, _ctor: MethodId) -> TypeSig {
            TypeSig::Object
        }

        fn field_name(&self, field: FieldId) -> String {
            format!("field{}", field.0)
        }

        fn static_field_name(&self, field: FieldId) -> String {
            format!("static{}__", field.0)
        }

        fn label_name(&self, target: BranchTarget) -> String {
            format!("L_{:04x}", target.label.0)
        }

        fn blob_name(&self, blob: BlobId) -> String {
            format!("DATA{}", blob.0)
        }
    }

    fn stack(depth: u16) -> Symbol {
        Symbol::Stack(SlotId { depth, variant: 0 })
    }

    fn target(label: u32) -> BranchTarget {
        BranchTarget {
            label: LabelId(label),
            offset: 0,
            typing: TypingId(0),
        }
    }

    #[test]
    fn unsigned_division_casts_both_operands() {
        let node = Node::Assign {
            target: stack(0),
            value: Expr::Binary {
                op: BinaryOp::DivUnsigned,
                left: stack(0),
                right: stack(1),
            },
        };
        assert_eq!(
            render(&node, &FixedNames),
            vec!["stack0_0 = (uint32_t)stack0_0 / (uint32_t)stack1_0;"]
        );
    }

    #[test]
    fn float_remainder_uses_fmod() {
        let node = Node::Evaluate(Expr::Binary {
            op: BinaryOp::Rem,
            left: Symbol::Local(0),
            right: Symbol::Local(1),
        });
        assert_eq!(render(&node, &FixedNames), vec!["fmod(local0, local1);"]);
    }

    #[test]
    fn branches_render_as_gotos() {
        let nodes = [
            Node::BranchIf {
                condition: stack(0),
                when: false,
                target: target(1),
            },
            Node::BranchCompare {
                op: CompareOp::Lt,
                unsigned: true,
                left: stack(0),
                right: stack(1),
                target: target(2),
            },
            Node::Switch {
                value: stack(0),
                targets: vec![target(0), target(3)],
            },
        ];
        let lines: Vec<_> = nodes.iter().flat_map(|n| render(n, &FixedNames)).collect();
        assert_eq!(
            lines,
            vec![
                "if (!stack0_0) goto L_0001;",
                "if ((uint32_t)stack0_0 < (uint32_t)stack1_0) goto L_0002;",
                "switch (stack0_0)",
                "{",
                "    case 0: goto L_0000;",
                "    case 1: goto L_0003;",
                "}",
            ]
        );
    }

    #[test]
    fn calls_and_objects() {
        let virtual_call = Node::Assign {
            target: stack(1),
            value: Expr::VirtualCall {
                method: MethodId(4),
                args: vec![stack(0), Symbol::Argument(1)],
            },
        };
        let new_object = Node::Assign {
            target: stack(0),
            value: Expr::NewObject {
                ctor: MethodId(2),
                args: vec![stack(1)],
            },
        };
        assert_eq!(
            render(&virtual_call, &FixedNames),
            vec!["stack1_0 = stack0_0->vptr0__->M__4(stack0_0, arg1);"]
        );
        assert_eq!(
            render(&new_object, &FixedNames),
            vec![
                "stack0_0 = il2c_get_uninitialized_object(il2c_typeof(Demo_Box));",
                "method2(stack0_0, stack1_0);",
            ]
        );
    }

    #[test]
    fn literals() {
        let expr = |e| render_expr(&e, &FixedNames);
        assert_eq!(expr(Expr::Int64(-3)), "-3LL");
        assert_eq!(expr(Expr::Float32(1.5)), "1.5f");
        assert_eq!(expr(Expr::Float64(2.0)), "2.0");
        assert_eq!(expr(Expr::Float64(f64::NAN)), "NAN");
        assert_eq!(expr(Expr::String("hi\n".into())), "il2c_new_string(L\"hi\\n\")");
        assert_eq!(expr(Expr::Null), "NULL");
    }
}
