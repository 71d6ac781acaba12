//! C identifiers for types, functions, fields and symbols.

use crate::{
    decode::{BlobId, DecodedBody, PreparedFunction},
    dispatch::{overload_position, DispatchTables},
    emit::{
        node::{BranchTarget, Symbol},
        render::{ExtractContext, VirtualTarget},
    },
    metadata::{FieldId, Metadata, MethodId},
    types::{comparer::TypeComparer, members::MethodDescription, TypeDescription, TypeSig},
    utils::mangle_name,
};

/// The identifier-safe name of a type, as used for struct tags and runtime
/// type macros.
pub fn mangled_type_name(metadata: &Metadata, ty: &TypeSig) -> String {
    use TypeSig::*;
    let name = match ty {
        Void => "System_Void",
        Boolean => "System_Boolean",
        Char => "System_Char",
        Int8 => "System_SByte",
        UInt8 => "System_Byte",
        Int16 => "System_Int16",
        UInt16 => "System_UInt16",
        Int32 => "System_Int32",
        UInt32 => "System_UInt32",
        Int64 => "System_Int64",
        UInt64 => "System_UInt64",
        Float32 => "System_Single",
        Float64 => "System_Double",
        IntPtr => "System_IntPtr",
        UIntPtr => "System_UIntPtr",
        Object => "System_Object",
        String => "System_String",
        RuntimeFieldHandle => "System_RuntimeFieldHandle",
        Type(id) => return mangle_name(&metadata.type_def(*id).full_name()),
        ByRef(t) => return format!("{}_REF", mangled_type_name(metadata, t)),
        Pointer(t) => return format!("{}_PTR", mangled_type_name(metadata, t)),
        Vector(t) => return format!("{}_ARRAY", mangled_type_name(metadata, t)),
    };
    name.to_string()
}

/// The C spelling of a type in a declaration. Reference types are pointers.
pub fn c_type_name(metadata: &Metadata, ty: &TypeSig) -> String {
    use TypeSig::*;
    let name = match ty {
        Void => "void",
        Boolean => "bool",
        Char => "wchar_t",
        Int8 => "int8_t",
        UInt8 => "uint8_t",
        Int16 => "int16_t",
        UInt16 => "uint16_t",
        Int32 => "int32_t",
        UInt32 => "uint32_t",
        Int64 => "int64_t",
        UInt64 => "uint64_t",
        Float32 => "float",
        Float64 => "double",
        IntPtr => "intptr_t",
        UIntPtr => "uintptr_t",
        Object => "System_Object*",
        String => "System_String*",
        RuntimeFieldHandle => "System_RuntimeFieldHandle",
        Type(id) => {
            let mangled = mangled_type_name(metadata, ty);
            return if TypeDescription::new(metadata, *id).is_value_type() {
                mangled
            } else {
                format!("{mangled}*")
            };
        }
        ByRef(t) | Pointer(t) => return format!("{}*", c_type_name(metadata, t)),
        Vector(t) => return format!("il2c_arraytype({})*", mangled_type_name(metadata, t)),
    };
    name.to_string()
}

/// `Demo_Box_Add` for the first overload of `Demo.Box::Add`, `Demo_Box_Add_1`
/// for the second. Foreign methods are called by their native symbol.
///
/// Methods of a type the tables do not hold are ordered from metadata, so a
/// call into such a type still names the right overload.
pub fn function_name(metadata: &Metadata, tables: &DispatchTables, method: MethodId) -> String {
    let description = MethodDescription::new(metadata, method);
    let def = description.method();
    if def.pinvoke {
        return def
            .import
            .as_ref()
            .and_then(|i| i.entry_point.clone())
            .unwrap_or_else(|| def.name.clone());
    }
    let base = mangle_name(&description.full_name());
    let index = tables
        .overload_index(method)
        .unwrap_or_else(|| overload_position(&TypeComparer::new(metadata), description));
    match index {
        0 => base,
        index => format!("{base}_{index}"),
    }
}

/// The constant array holding a declared value, `Demo_Tables_Run_1_DATA0` for
/// the first blob of the second `Run` overload.
pub fn blob_name(function: &str, blob: BlobId) -> String {
    format!("{function}_DATA{}", blob.0)
}

/// Wrapper a value type's virtual method is reached through from a vtable.
pub fn trampoline_name(metadata: &Metadata, tables: &DispatchTables, method: MethodId) -> String {
    format!("{}_Trampoline_VFunc__", function_name(metadata, tables, method))
}

/// Field of a vtable struct holding `method`'s function pointer.
pub fn vtable_field_name(metadata: &Metadata, method: MethodId, index: usize) -> String {
    format!("{}__{index}", mangle_name(&metadata.method_def(method).name))
}

/// Per-interface vtable pointer embedded in implementing objects.
pub fn interface_vptr_name(metadata: &Metadata, interface: &TypeSig) -> String {
    format!("vptr_{}__", mangled_type_name(metadata, interface))
}

pub fn field_name(metadata: &Metadata, field: FieldId) -> String {
    mangle_name(&metadata.field_def(field).name)
}

pub fn static_field_name(metadata: &Metadata, field: FieldId) -> String {
    let def = metadata.field_def(field);
    format!(
        "{}_{}__",
        mangled_type_name(metadata, &TypeSig::Type(def.declaring_type)),
        mangle_name(&def.name)
    )
}

/// `this__` for the receiver, the mangled parameter name otherwise.
pub fn argument_names(method: MethodDescription) -> Vec<String> {
    let def = method.method();
    let receiver = (!def.static_member).then(|| "this__".to_string());
    receiver
        .into_iter()
        .chain(def.parameters.iter().enumerate().map(|(i, p)| {
            if p.name.is_empty() {
                format!("arg{i}")
            } else {
                mangle_name(&p.name)
            }
        }))
        .collect()
}

/// Names for rendering the nodes of one decoded function.
pub struct FunctionNaming<'a> {
    pub metadata: &'a Metadata,
    pub tables: &'a DispatchTables,
    pub function: &'a PreparedFunction,
    pub body: &'a DecodedBody,
}

impl ExtractContext for FunctionNaming<'_> {
    fn symbol_name(&self, symbol: Symbol) -> String {
        match symbol {
            Symbol::Stack(id) => format!("stack{}_{}", id.depth, id.variant),
            Symbol::Local(index) => format!("local{index}"),
            Symbol::Argument(index) => self
                .function
                .arguments
                .get(index as usize)
                .map_or_else(|| format!("arg{index}"), |a| a.name.clone()),
        }
    }

    fn symbol_type(&self, symbol: Symbol) -> TypeSig {
        let ty = match symbol {
            Symbol::Stack(id) => self.body.stack_slot(id).map(|s| &s.ty),
            Symbol::Local(index) => self.body.locals.get(index as usize),
            Symbol::Argument(index) => self.function.arguments.get(index as usize).map(|a| &a.ty),
        };
        ty.cloned().unwrap_or(TypeSig::Object)
    }

    fn is_value_type(&self, ty: &TypeSig) -> bool {
        ty.is_value_type(self.metadata)
    }

    fn c_type(&self, ty: &TypeSig) -> String {
        c_type_name(self.metadata, ty)
    }

    fn mangled_type(&self, ty: &TypeSig) -> String {
        mangled_type_name(self.metadata, ty)
    }

    fn method_name(&self, method: MethodId) -> String {
        function_name(self.metadata, self.tables, method)
    }

    fn virtual_target(&self, method: MethodId) -> VirtualTarget {
        let description = MethodDescription::new(self.metadata, method);
        let parent = description.parent();
        if parent.is_interface() {
            let index = parent
                .declared_methods()
                .position(|m| m.id == method)
                .unwrap_or(0);
            VirtualTarget::Interface {
                vptr: interface_vptr_name(self.metadata, &parent.signature()),
                field: vtable_field_name(self.metadata, method, index),
            }
        } else {
            let slot = self
                .tables
                .virtual_slot(self.metadata, method)
                .map_or(0, |s| s.slot);
            VirtualTarget::Class {
                field: vtable_field_name(self.metadata, method, slot),
            }
        }
    }

    fn constructed_type(&self, ctor: MethodId) -> TypeSig {
        MethodDescription::new(self.metadata, ctor).parent().signature()
    }

    fn field_name(&self, field: FieldId) -> String {
        field_name(self.metadata, field)
    }

    fn static_field_name(&self, field: FieldId) -> String {
        static_field_name(self.metadata, field)
    }

    fn label_name(&self, target: BranchTarget) -> String {
        self.body.target_name(target)
    }

    fn blob_name(&self, blob: BlobId) -> String {
        blob_name(&self.function.name, blob)
    }
}
