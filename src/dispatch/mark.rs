use crate::{metadata::FieldId, types::TypeDescription};

/// What the garbage collector traces in an instance of a type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkTargets {
    /// Declared instance fields that hold object references.
    Fields(Vec<FieldId>),
    /// Delegates trace through one fixed handler instead of a field list.
    Delegate,
}

impl MarkTargets {
    pub fn fields(&self) -> &[FieldId] {
        match self {
            MarkTargets::Fields(fields) => fields,
            MarkTargets::Delegate => &[],
        }
    }
}

pub fn mark_targets(ty: TypeDescription) -> MarkTargets {
    if ty.is_delegate() {
        return MarkTargets::Delegate;
    }
    if ty.is_enum() {
        return MarkTargets::Fields(vec![]);
    }
    MarkTargets::Fields(
        ty.fields()
            .filter(|f| {
                let def = f.field();
                !def.static_member && def.ty.is_reference_type(ty.metadata)
            })
            .map(|f| f.id)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{FieldDef, MetadataBuilder, TypeDef, TypeKind},
        types::TypeSig,
    };

    #[test]
    fn only_instance_reference_fields_are_traced() {
        let mut builder = MetadataBuilder::new();
        let node = builder.add_type(TypeDef::new("Demo", "Node", TypeKind::Class));
        let point = builder.add_type(TypeDef::new("Demo", "Point", TypeKind::ValueType));
        let handler = builder.add_type(TypeDef::new("Demo", "Handler", TypeKind::Delegate));
        let next = builder.add_field(node, FieldDef::instance("next", TypeSig::Type(node)));
        builder.add_field(node, FieldDef::instance("position", TypeSig::Type(point)));
        builder.add_field(node, FieldDef::static_field("root", TypeSig::Type(node)));
        let name = builder.add_field(node, FieldDef::instance("name", TypeSig::String));
        builder.add_field(node, FieldDef::instance("count", TypeSig::Int32));
        builder.add_field(handler, FieldDef::instance("target", TypeSig::Object));
        let metadata = builder.build();

        assert_eq!(
            mark_targets(TypeDescription::new(&metadata, node)),
            MarkTargets::Fields(vec![next, name])
        );
        assert_eq!(
            mark_targets(TypeDescription::new(&metadata, handler)),
            MarkTargets::Delegate
        );
    }
}
