use crate::metadata::{Metadata, TypeId, TypeKind};
use std::fmt::{self, Display, Formatter};

/// A type as it appears in a signature, a local, a field or on the evaluation stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    IntPtr,
    UIntPtr,
    Object,
    String,
    /// What `ldtoken <field>` pushes.
    RuntimeFieldHandle,
    Type(TypeId),
    ByRef(Box<TypeSig>),
    Pointer(Box<TypeSig>),
    Vector(Box<TypeSig>),
}

/// Coarse kinds used to order otherwise unrelated types.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeCategory {
    Primitive,
    Value,
    Class,
    Interface,
    Array,
    Pointer,
    ByRef,
    Void,
}

impl TypeSig {
    pub fn by_ref(inner: TypeSig) -> Self {
        TypeSig::ByRef(Box::new(inner))
    }

    pub fn pointer(inner: TypeSig) -> Self {
        TypeSig::Pointer(Box::new(inner))
    }

    pub fn vector(element: TypeSig) -> Self {
        TypeSig::Vector(Box::new(element))
    }

    pub fn is_primitive(&self) -> bool {
        use TypeSig::*;
        matches!(
            self,
            Boolean
                | Char
                | Int8
                | UInt8
                | Int16
                | UInt16
                | Int32
                | UInt32
                | Int64
                | UInt64
                | Float32
                | Float64
                | IntPtr
                | UIntPtr
        )
    }

    pub fn is_unsigned(&self) -> bool {
        use TypeSig::*;
        matches!(self, UInt8 | UInt16 | UInt32 | UInt64 | UIntPtr | Char | Boolean)
    }

    pub fn element(&self) -> Option<&TypeSig> {
        match self {
            TypeSig::ByRef(t) | TypeSig::Pointer(t) | TypeSig::Vector(t) => Some(t),
            _ => None,
        }
    }

    pub fn category(&self, metadata: &Metadata) -> TypeCategory {
        match self {
            TypeSig::Void => TypeCategory::Void,
            TypeSig::Object | TypeSig::String => TypeCategory::Class,
            TypeSig::RuntimeFieldHandle => TypeCategory::Value,
            TypeSig::Type(id) => match metadata.type_def(*id).kind {
                TypeKind::Class | TypeKind::Delegate => TypeCategory::Class,
                TypeKind::ValueType | TypeKind::Enum => TypeCategory::Value,
                TypeKind::Interface => TypeCategory::Interface,
            },
            TypeSig::ByRef(_) => TypeCategory::ByRef,
            TypeSig::Pointer(_) => TypeCategory::Pointer,
            TypeSig::Vector(_) => TypeCategory::Array,
            _ => TypeCategory::Primitive,
        }
    }

    /// Holds an object reference the garbage collector has to trace.
    pub fn is_reference_type(&self, metadata: &Metadata) -> bool {
        matches!(
            self.category(metadata),
            TypeCategory::Class | TypeCategory::Interface | TypeCategory::Array
        )
    }

    pub fn is_value_type(&self, metadata: &Metadata) -> bool {
        matches!(
            self.category(metadata),
            TypeCategory::Primitive | TypeCategory::Value
        )
    }

    /// The type an evaluation stack slot holds after pushing a value of this type.
    pub fn stack_type(&self, metadata: &Metadata) -> TypeSig {
        use TypeSig::*;
        match self {
            Boolean | Char | Int8 | UInt8 | Int16 | UInt16 | Int32 | UInt32 => Int32,
            Int64 | UInt64 => Int64,
            IntPtr | UIntPtr => IntPtr,
            Type(id) => match &metadata.type_def(*id).underlying {
                Some(underlying) if metadata.type_def(*id).kind == TypeKind::Enum => {
                    underlying.stack_type(metadata)
                }
                _ => self.clone(),
            },
            other => other.clone(),
        }
    }

    /// Whether a location of type `self` accepts a value of type `other`
    /// without conversion.
    pub fn is_assignable_from(&self, other: &TypeSig, metadata: &Metadata) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (TypeSig::Object, o) => o.is_reference_type(metadata),
            (TypeSig::Type(to), TypeSig::Type(from)) => {
                super::TypeDescription::new(metadata, *from)
                    .is_assignable_to(super::TypeDescription::new(metadata, *to))
            }
            (TypeSig::Vector(to), TypeSig::Vector(from)) => {
                to.is_reference_type(metadata)
                    && from.is_reference_type(metadata)
                    && to.is_assignable_from(from, metadata)
            }
            (TypeSig::ByRef(to), TypeSig::ByRef(from))
            | (TypeSig::Pointer(to), TypeSig::Pointer(from)) => to == from,
            _ => false,
        }
    }

    pub fn show<'a>(&'a self, metadata: &'a Metadata) -> impl Display + 'a {
        ShowTypeSig(self, metadata)
    }
}

struct ShowTypeSig<'a>(&'a TypeSig, &'a Metadata);

impl Display for ShowTypeSig<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use TypeSig::*;
        let name = match self.0 {
            Void => "void",
            Boolean => "bool",
            Char => "char",
            Int8 => "int8",
            UInt8 => "uint8",
            Int16 => "int16",
            UInt16 => "uint16",
            Int32 => "int32",
            UInt32 => "uint32",
            Int64 => "int64",
            UInt64 => "uint64",
            Float32 => "float32",
            Float64 => "float64",
            IntPtr => "native int",
            UIntPtr => "native uint",
            Object => "object",
            String => "string",
            RuntimeFieldHandle => "System.RuntimeFieldHandle",
            Type(id) => return write!(f, "{}", self.1.type_def(*id).full_name()),
            ByRef(t) => return write!(f, "{}&", t.show(self.1)),
            Pointer(t) => return write!(f, "{}*", t.show(self.1)),
            Vector(t) => return write!(f, "{}[]", t.show(self.1)),
        };
        f.write_str(name)
    }
}
