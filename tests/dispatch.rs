use il2c_rs::{
    dispatch::{DispatchResolver, MarkTargets, VirtualSlot},
    prepare::{translate, PrepareOptions},
    metadata::{
        Accessibility, FieldDef, Metadata, MetadataBuilder, MethodDef, MethodId, Parameter, TypeDef,
        TypeId, TypeKind,
    },
    types::{members::MethodDescription, TypeSig},
};
use pretty_assertions::assert_eq;

fn class(builder: &mut MetadataBuilder, name: &str) -> TypeId {
    builder.add_type(TypeDef::new("Demo", name, TypeKind::Class))
}

fn derived(builder: &mut MetadataBuilder, name: &str, base: TypeId) -> TypeId {
    builder.add_type(TypeDef::new("Demo", name, TypeKind::Class).extending(base))
}

#[test]
fn explicit_implementation_on_base_is_inherited() {
    let mut builder = MetadataBuilder::new();
    let iface = builder.add_type(TypeDef::new("Demo", "I", TypeKind::Interface));
    let base = builder.add_type(TypeDef::new("Demo", "Base", TypeKind::Class).implementing([iface]));
    let derived_ty = derived(&mut builder, "Derived", base);
    let i_m = builder.add_method(iface, MethodDef::instance("M", vec![], TypeSig::Void).abstract_method());
    let explicit = builder.add_method(
        base,
        MethodDef::instance("Demo.I.M", vec![], TypeSig::Void)
            .new_slot()
            .with_accessibility(Accessibility::Private)
            .overriding([i_m]),
    );
    let metadata = builder.build();

    let (tables, failures) = DispatchResolver::new(&metadata).resolve_all([iface, base, derived_ty]);
    assert!(failures.is_empty(), "{failures:?}");

    let dispatch = tables.get(derived_ty).unwrap();
    let map = dispatch.interface_map(iface).unwrap();
    assert_eq!(map.entries.len(), 1);
    assert_eq!(map.entries[0].implementation, explicit);
    assert!(map.entries[0].explicit);

    // nothing declared on Derived, so it reuses the base table
    assert!(!dispatch.owns_vtable());
    let base_table = tables.vtable_of(base).unwrap();
    assert!(std::ptr::eq(base_table, tables.vtable_of(derived_ty).unwrap()));
    // the private slot exists but is not emitted
    assert_eq!(tables.get(base).unwrap().slots.len(), 1);
    assert!(base_table.entries.is_empty());
}

#[test]
fn new_slot_hides_instead_of_overriding() {
    let mut builder = MetadataBuilder::new();
    let base = class(&mut builder, "Base");
    let derived_ty = derived(&mut builder, "Derived", base);
    let leaf = derived(&mut builder, "Leaf", derived_ty);
    let m = || MethodDef::instance("M", vec![], TypeSig::Void);
    let base_m = builder.add_method(base, m().new_slot());
    let derived_m = builder.add_method(derived_ty, m().new_slot());
    let leaf_m = builder.add_method(leaf, m().reuse_slot());
    let metadata = builder.build();

    let (tables, failures) = DispatchResolver::new(&metadata).resolve_all([base, derived_ty, leaf]);
    assert!(failures.is_empty());

    let dispatch = tables.get(derived_ty).unwrap();
    assert_eq!(
        dispatch.slots,
        vec![
            VirtualSlot { slot: 0, sibling: 0, method: base_m },
            VirtualSlot { slot: 1, sibling: 1, method: derived_m },
        ]
    );
    assert!(dispatch.owns_vtable());
    let entries: Vec<_> = tables
        .vtable_of(derived_ty)
        .unwrap()
        .entries
        .iter()
        .map(|e| (e.slot, e.method))
        .collect();
    assert_eq!(entries, vec![(0, base_m), (1, derived_m)]);

    // an override binds to the nearest slot with the signature
    let leaf_slots = &tables.get(leaf).unwrap().slots;
    assert_eq!(leaf_slots.len(), 2);
    assert_eq!(leaf_slots[0].method, base_m);
    assert_eq!(leaf_slots[1].method, leaf_m);
    assert_eq!(leaf_slots[1].sibling, 1);
}

#[test]
fn slot_count_is_distinct_signatures_plus_new_slots() {
    let mut builder = MetadataBuilder::new();
    let base = class(&mut builder, "Shape");
    let mid = derived(&mut builder, "Polygon", base);
    let leaf = derived(&mut builder, "Square", mid);
    let int = || vec![Parameter::new("scale", TypeSig::Int32)];
    builder.add_method(base, MethodDef::instance("Area", vec![], TypeSig::Float64).new_slot());
    builder.add_method(base, MethodDef::instance("Scale", int(), TypeSig::Void).new_slot());
    builder.add_method(mid, MethodDef::instance("Area", vec![], TypeSig::Float64).reuse_slot());
    builder.add_method(mid, MethodDef::instance("Scale", int(), TypeSig::Void).new_slot());
    builder.add_method(leaf, MethodDef::instance("Area", vec![], TypeSig::Float64).reuse_slot());
    builder.add_method(leaf, MethodDef::instance("Sides", vec![], TypeSig::Int32).new_slot());
    // not virtual, no slot
    builder.add_method(leaf, MethodDef::instance("Describe", vec![], TypeSig::String));
    let metadata = builder.build();

    let dispatch = DispatchResolver::new(&metadata).resolve_type(leaf).unwrap();
    // Area, Scale, Sides plus one new-slot Scale
    assert_eq!(dispatch.slots.len(), 4);
    let slots: Vec<_> = dispatch.slots.iter().map(|s| s.slot).collect();
    assert_eq!(slots, vec![0, 1, 2, 3]);
}

fn overload_metadata(reversed: bool) -> (Metadata, TypeId) {
    let mut builder = MetadataBuilder::new();
    let ty = class(&mut builder, "Calculator");
    let p = |t: TypeSig| Parameter::new("value", t);
    let mut params = p(TypeSig::vector(TypeSig::Int32));
    params.param_array = true;
    let mut methods = vec![
        MethodDef::instance("Add", vec![p(TypeSig::Int32)], TypeSig::Void),
        MethodDef::instance("Add", vec![p(TypeSig::Int64)], TypeSig::Void),
        MethodDef::instance("Add", vec![p(TypeSig::Object)], TypeSig::Void),
        MethodDef::instance("Add", vec![p(TypeSig::String)], TypeSig::Void).new_slot(),
        MethodDef::instance("Add", vec![p(TypeSig::Int32), p(TypeSig::Int32)], TypeSig::Void),
        MethodDef::instance("Add", vec![params], TypeSig::Void),
        MethodDef::static_method("Add", vec![p(TypeSig::Int32)], TypeSig::Void),
        MethodDef::instance("Clear", vec![], TypeSig::Void),
    ];
    if reversed {
        methods.reverse();
    }
    for method in methods {
        builder.add_method(ty, method);
    }
    (builder.build(), ty)
}

fn describe_overloads(metadata: &Metadata, ty: TypeId) -> Vec<(String, Vec<String>)> {
    let dispatch = DispatchResolver::new(metadata).resolve_type(ty).unwrap();
    dispatch
        .overloads
        .iter()
        .map(|(name, group)| {
            let methods = group
                .iter()
                .map(|m| format!("{:?}", MethodDescription::new(metadata, *m)))
                .collect();
            (name.clone(), methods)
        })
        .collect()
}

#[test]
fn overload_order_ignores_declaration_order() {
    let (forward, forward_ty) = overload_metadata(false);
    let (backward, backward_ty) = overload_metadata(true);
    let forward_order = describe_overloads(&forward, forward_ty);
    assert_eq!(forward_order, describe_overloads(&backward, backward_ty));

    let add = &forward_order[0];
    assert_eq!(add.0, "Add");
    assert_eq!(add.1.len(), 7);
    assert!(add.1[0].ends_with("Add(int32)"), "{:?}", add.1);
    assert!(add.1[1].ends_with("Add(int64)"), "{:?}", add.1);
    assert!(add.1[6].starts_with("static "), "{:?}", add.1);
}

#[test]
fn derived_interface_members_are_mapped_once() {
    let mut builder = MetadataBuilder::new();
    let readable = builder.add_type(TypeDef::new("Demo", "IReadable", TypeKind::Interface));
    let stream = builder.add_type(
        TypeDef::new("Demo", "IStream", TypeKind::Interface).implementing([readable]),
    );
    let base = builder.add_type(TypeDef::new("Demo", "Source", TypeKind::Class).implementing([readable]));
    let leaf = builder.add_type(
        TypeDef::new("Demo", "FileSource", TypeKind::Class)
            .extending(base)
            .implementing([stream]),
    );
    let read = || MethodDef::instance("Read", vec![], TypeSig::Int32);
    let seek = || MethodDef::instance("Seek", vec![Parameter::new("offset", TypeSig::Int64)], TypeSig::Void);
    let i_read = builder.add_method(readable, read().abstract_method());
    let i_seek = builder.add_method(stream, seek().abstract_method());
    builder.add_method(base, read().new_slot());
    let leaf_read = builder.add_method(leaf, read().reuse_slot());
    let leaf_seek = builder.add_method(leaf, seek());
    let metadata = builder.build();

    let dispatch = DispatchResolver::new(&metadata).resolve_type(leaf).unwrap();
    let interfaces: Vec<_> = dispatch.interfaces.iter().map(|m| m.interface).collect();
    assert_eq!(interfaces.len(), 2);
    assert!(interfaces.contains(&readable) && interfaces.contains(&stream));

    let readable_map = dispatch.interface_map(readable).unwrap();
    assert_eq!(readable_map.entries.len(), 1);
    assert_eq!(readable_map.implementation_of(i_read), Some(leaf_read));
    let stream_map = dispatch.interface_map(stream).unwrap();
    assert_eq!(stream_map.entries.len(), 1);
    assert_eq!(stream_map.implementation_of(i_seek), Some(leaf_seek));
}

#[test]
fn explicit_implementation_wins_over_matching_public_method() {
    let mut builder = MetadataBuilder::new();
    let iface = builder.add_type(TypeDef::new("Demo", "IDisposable", TypeKind::Interface));
    let ty = builder.add_type(TypeDef::new("Demo", "Handle", TypeKind::Class).implementing([iface]));
    let dispose = || MethodDef::instance("Dispose", vec![], TypeSig::Void);
    let i_dispose = builder.add_method(iface, dispose().abstract_method());
    builder.add_method(ty, dispose().new_slot());
    let explicit = builder.add_method(
        ty,
        MethodDef::instance("Demo.IDisposable.Dispose", vec![], TypeSig::Void)
            .new_slot()
            .with_accessibility(Accessibility::Private)
            .overriding([i_dispose]),
    );
    let metadata = builder.build();

    let dispatch = DispatchResolver::new(&metadata).resolve_type(ty).unwrap();
    let map = dispatch.interface_map(iface).unwrap();
    assert_eq!(map.implementation_of(i_dispose), Some(explicit));
    assert!(map.entries[0].explicit);
}

#[test]
fn failing_type_does_not_sink_the_others() {
    let mut builder = MetadataBuilder::new();
    let iface = builder.add_type(TypeDef::new("Demo", "IRun", TypeKind::Interface));
    let broken = builder.add_type(TypeDef::new("Demo", "Broken", TypeKind::Class).implementing([iface]));
    let fine = class(&mut builder, "Fine");
    builder.add_method(iface, MethodDef::instance("Run", vec![], TypeSig::Void).abstract_method());
    let metadata = builder.build();

    let (tables, failures) = DispatchResolver::new(&metadata).resolve_all([iface, broken, fine]);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("Demo.Broken"));
    assert!(tables.get(broken).is_none());
    assert!(tables.get(fine).is_some());
    assert!(tables.get(iface).is_some());
}

#[test]
fn methods_of_a_failing_type_are_left_out() {
    let mut builder = MetadataBuilder::new();
    let iface = builder.add_type(TypeDef::new("Demo", "IRun", TypeKind::Interface));
    let broken = builder.add_type(TypeDef::new("Demo", "Broken", TypeKind::Class).implementing([iface]));
    let fine = class(&mut builder, "Fine");
    builder.add_method(iface, MethodDef::instance("Run", vec![], TypeSig::Void).abstract_method());
    let ret = vec![0x2A];
    builder.add_method(broken, MethodDef::instance("F", vec![], TypeSig::Void).with_body(vec![], ret.clone()));
    builder.add_method(
        broken,
        MethodDef::instance("F", vec![Parameter::new("x", TypeSig::Int32)], TypeSig::Void)
            .with_body(vec![], ret.clone()),
    );
    builder.add_method(fine, MethodDef::instance("G", vec![], TypeSig::Void).with_body(vec![], ret));
    let metadata = builder.build();

    let translation = translate(&metadata, &PrepareOptions::default()).unwrap();
    assert_eq!(translation.failures.len(), 1);
    assert!(translation.failures[0].to_string().contains("Demo.Broken"));
    let names: Vec<_> = translation.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Demo_Fine_G"]);
    assert!(!translation.source.contains("Demo_Broken_F"));
    assert!(translation.source.contains("void Demo_Fine_G("));
}

#[test]
fn mark_targets_are_reference_instance_fields() {
    let mut builder = MetadataBuilder::new();
    let node = class(&mut builder, "Node");
    let next = builder.add_field(node, FieldDef::instance("next", TypeSig::Type(node)));
    builder.add_field(node, FieldDef::instance("value", TypeSig::Int32));
    let name = builder.add_field(node, FieldDef::instance("name", TypeSig::String));
    builder.add_field(node, FieldDef::static_field("count", TypeSig::Object));
    let metadata = builder.build();

    let dispatch = DispatchResolver::new(&metadata).resolve_type(node).unwrap();
    assert_eq!(dispatch.mark_targets, MarkTargets::Fields(vec![next, name]));
}

#[test]
fn interfaces_have_no_vtable() {
    let mut builder = MetadataBuilder::new();
    let iface = builder.add_type(TypeDef::new("Demo", "IShape", TypeKind::Interface));
    let area: MethodId = builder.add_method(iface, MethodDef::instance("Area", vec![], TypeSig::Float64).abstract_method());
    let metadata = builder.build();

    let (tables, _) = DispatchResolver::new(&metadata).resolve_all([iface]);
    let dispatch = tables.get(iface).unwrap();
    assert_eq!(dispatch.vtable_owner, None);
    assert!(dispatch.slots.is_empty());
    assert!(tables.vtable_of(iface).is_none());
    assert_eq!(dispatch.overloads["Area"], vec![area]);
}
