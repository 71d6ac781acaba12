use il2c_rs::{
    decode::{decode_method, DecodedBody, Label, SlotId},
    emit::node::{Node, Symbol},
    error::{DecodeError, TranslateError},
    metadata::{MetadataBuilder, MethodDef, Parameter, TypeDef, TypeKind},
    prepare::prepare_method,
    dispatch::DispatchTables,
    types::{members::MethodDescription, TypeSig},
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;

fn decode(parameters: Vec<TypeSig>, return_type: TypeSig, il: Vec<u8>) -> Result<DecodedBody, DecodeError> {
    let mut builder = MetadataBuilder::new();
    let ty = builder.add_type(TypeDef::new("Demo", "Program", TypeKind::Class));
    let parameters = parameters
        .into_iter()
        .enumerate()
        .map(|(i, t)| Parameter::new(format!("p{i}"), t))
        .collect();
    let method = builder.add_method(
        ty,
        MethodDef::static_method("Run", parameters, return_type).with_body(vec![], il),
    );
    let metadata = builder.build();
    decode_method(MethodDescription::new(&metadata, method))
}

fn slot(depth: u16, variant: u16) -> Symbol {
    Symbol::Stack(SlotId { depth, variant })
}

/// Every (offset, typing) pair appears at most once among decoded instructions.
fn assert_no_region_decoded_twice(body: &DecodedBody) {
    let mut seen = HashSet::new();
    for location in body.instructions.iter().filter_map(|i| i.location) {
        assert!(
            seen.insert((location.offset, location.typing)),
            "{location:?} decoded twice"
        );
    }
}

fn assigned_slot(body: &DecodedBody, offset: usize) -> Vec<Symbol> {
    body.instructions
        .iter()
        .filter(|i| i.location.map(|l| l.offset) == Some(offset))
        .filter_map(|i| match i.node {
            Node::Assign { target, .. } => Some(target),
            _ => None,
        })
        .collect()
}

#[test]
fn branch_join_with_same_type_merges() {
    // 0: ldc.i4.1
    // 1: brtrue.s 5
    // 3: ldc.i4.2
    // 4: ret
    // 5: ldc.i4.3
    // 6: ret
    let body = decode(
        vec![],
        TypeSig::Int32,
        vec![0x17, 0x2D, 0x02, 0x18, 0x2A, 0x19, 0x2A],
    )
    .unwrap();

    assert_eq!(body.stats.paths, 2);
    assert_eq!(body.stats.merged, 0);
    assert_eq!(body.stacks.len(), 1);
    assert_eq!(body.stacks[0].symbol_name(), "stack0_0");
    assert_eq!(body.stacks[0].ty, TypeSig::Int32);
    assert_eq!(body.labels, vec![Label { id: body.labels[0].id, offset: 5 }]);
    assert_eq!(body.decode_count(5), 1);
    assert_no_region_decoded_twice(&body);
}

#[test]
fn branch_join_with_divergent_types_decodes_twice() {
    // 0: ldc.i4.0
    // 1: brtrue.s 6
    // 3: ldc.i4.1
    // 4: br.s 15
    // 6: ldc.i8 7
    // 15: pop
    // 16: ret
    let mut il = vec![0x16, 0x2D, 0x03, 0x17, 0x2B, 0x09, 0x21];
    il.extend_from_slice(&7i64.to_le_bytes());
    il.extend_from_slice(&[0x26, 0x2A]);
    let body = decode(vec![], TypeSig::Void, il).unwrap();

    assert_eq!(body.stats.paths, 3);
    assert_eq!(body.stacks_at_depth(0).count(), 2);
    assert_eq!(body.decode_count(15), 2);
    assert_eq!(body.decode_count(6), 1);
    // both paths leave 15 with an empty stack, so the second jumps to the first
    assert_eq!(body.decode_count(16), 1);
    assert!(body
        .instructions
        .iter()
        .any(|i| i.location.is_none() && matches!(i.node, Node::Jump(t) if t.offset == 16)));
    assert_no_region_decoded_twice(&body);

    // same depth and type share a slot; a new type at that depth does not
    assert_eq!(assigned_slot(&body, 0), vec![slot(0, 0)]);
    assert_eq!(assigned_slot(&body, 3), vec![slot(0, 0)]);
    assert_eq!(assigned_slot(&body, 6), vec![slot(0, 1)]);

    // the int64 path reached the join first, so the int32 entry gets the
    // second label variant
    let jump = body
        .instructions
        .iter()
        .find(|i| i.location.map(|l| l.offset) == Some(4))
        .unwrap();
    let Node::Jump(target) = jump.node else {
        panic!("expected a jump at offset 4, found {:?}", jump.node);
    };
    assert_eq!(body.target_name(target), "L_0001_1");
    let definitions: Vec<_> = body
        .instructions
        .iter()
        .filter_map(|i| i.location)
        .filter(|l| l.offset == 15)
        .filter_map(|l| body.label_definition(l))
        .collect();
    assert_eq!(definitions, vec!["L_0001", "L_0001_1"]);
}

#[test]
fn empty_body_is_malformed() {
    let mut builder = MetadataBuilder::new();
    let ty = builder.add_type(TypeDef::new("Demo", "Program", TypeKind::Class));
    let method = builder.add_method(
        ty,
        MethodDef::static_method("Run", vec![], TypeSig::Void).with_body(vec![], vec![]),
    );
    let metadata = builder.build();

    let err = prepare_method(&metadata, &DispatchTables::default(), method).unwrap_err();
    assert_eq!(
        err,
        TranslateError::MalformedProgram {
            method: "Demo.Program::Run".into(),
            source: DecodeError::EmptyBody,
        }
    );
}

#[test]
fn pop_before_push_underflows() {
    assert_eq!(
        decode(vec![], TypeSig::Void, vec![0x26, 0x2A]),
        Err(DecodeError::StackUnderflow { offset: 0 })
    );
}

#[test]
fn labels_follow_discovery_order() {
    // 0: ldc.i4.0
    // 1: switch (16, 15)
    // 14: ret
    // 15: ret
    // 16: ret
    let mut il = vec![0x16, 0x45];
    il.extend_from_slice(&2u32.to_le_bytes());
    il.extend_from_slice(&2i32.to_le_bytes());
    il.extend_from_slice(&1i32.to_le_bytes());
    il.extend_from_slice(&[0x2A, 0x2A, 0x2A]);
    let body = decode(vec![], TypeSig::Void, il).unwrap();

    let offsets: Vec<_> = body.labels.iter().map(|l| l.offset).collect();
    assert_eq!(offsets, vec![16, 15]);
    assert!(body.labels.windows(2).all(|w| w[0].id < w[1].id));
    assert_eq!(body.stats.paths, 3);
}

#[test]
fn cyclic_divergent_branches_stay_bounded() {
    // 0: ldarg.0
    // 1: brtrue.s 6
    // 3: ldc.i4.0
    // 4: br.s 15
    // 6: ldc.i8 1
    // 15: pop
    // 16: br.s 0
    let mut il = vec![0x02, 0x2D, 0x03, 0x16, 0x2B, 0x09, 0x21];
    il.extend_from_slice(&1i64.to_le_bytes());
    il.extend_from_slice(&[0x26, 0x2B, (-18i8) as u8]);
    let body = decode(vec![TypeSig::Int32], TypeSig::Void, il).unwrap();

    assert_eq!(body.stats.paths, 3);
    assert_eq!(body.stats.merged, 1);
    assert_eq!(body.decode_count(0), 1);
    assert_eq!(body.decode_count(15), 2);
    assert_eq!(body.decode_count(16), 1);
    assert_no_region_decoded_twice(&body);

    // the int32 path falls into the already decoded back edge
    let fallthrough: Vec<_> = body
        .instructions
        .iter()
        .filter(|i| i.location.is_none())
        .collect();
    assert_eq!(fallthrough.len(), 1);
    assert!(matches!(fallthrough[0].node, Node::Jump(target) if target.offset == 16));
    assert!(body.label_at(16).is_some());
}

#[test]
fn growing_stack_loop_is_rejected() {
    // 0: ldc.i4.0
    // 1: br.s 0
    let err = decode(vec![], TypeSig::Void, vec![0x16, 0x2B, 0xFD]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::StackDepthMismatch {
            offset: 0,
            expected: 0,
            actual: 1
        }
    );
}
