//! Assembles the translation unit: declarations for every resolved type,
//! dispatch tables, runtime type information and the function bodies.

use crate::{
    decode::{DecodedBody, FunctionBody, PreparedFunction},
    dispatch::{DispatchTables, MarkTargets, TypeDispatch},
    emit::{
        naming::{
            blob_name, c_type_name, field_name, function_name, interface_vptr_name, mangled_type_name,
            static_field_name, trampoline_name, vtable_field_name, FunctionNaming,
        },
        render::render,
    },
    metadata::{Metadata, MethodId, TypeId},
    types::{members::MethodDescription, TypeDescription, TypeSig},
};
use std::fmt::Write as _;

const INDENT: &str = "    ";

/// Line-oriented text sink that tracks indentation.
#[derive(Debug, Default)]
pub struct CodeTextWriter {
    buffer: String,
    indent: usize,
}

impl CodeTextWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one line per `\n`-separated part of `text`, each at the current
    /// indentation. Blank parts stay blank.
    pub fn write_line(&mut self, text: impl AsRef<str>) {
        for line in text.as_ref().split('\n') {
            if !line.is_empty() {
                for _ in 0..self.indent {
                    self.buffer.push_str(INDENT);
                }
                self.buffer.push_str(line);
            }
            self.buffer.push('\n');
        }
    }

    /// Writes a line at column zero regardless of indentation, as labels are.
    pub fn write_unindented(&mut self, text: impl AsRef<str>) {
        self.buffer.push_str(text.as_ref());
        self.buffer.push('\n');
    }

    pub fn blank(&mut self) {
        self.buffer.push('\n');
    }

    pub fn shift(&mut self, f: impl FnOnce(&mut Self)) {
        self.indent += 1;
        f(self);
        self.indent -= 1;
    }

    /// `header`, then the body indented inside braces, then `footer` after
    /// the closing brace.
    pub fn block(&mut self, header: impl AsRef<str>, footer: &str, f: impl FnOnce(&mut Self)) {
        self.write_line(header);
        self.write_line("{");
        self.shift(f);
        self.write_line(format!("}}{footer}"));
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

pub struct SourceWriter<'a> {
    metadata: &'a Metadata,
    tables: &'a DispatchTables,
    out: CodeTextWriter,
}

impl<'a> SourceWriter<'a> {
    pub fn new(metadata: &'a Metadata, tables: &'a DispatchTables) -> Self {
        Self {
            metadata,
            tables,
            out: CodeTextWriter::new(),
        }
    }

    fn describe(&self, id: TypeId) -> TypeDescription<'a> {
        TypeDescription::new(self.metadata, id)
    }

    fn mangled(&self, id: TypeId) -> String {
        mangled_type_name(self.metadata, &TypeSig::Type(id))
    }

    fn c_type(&self, ty: &TypeSig) -> String {
        c_type_name(self.metadata, ty)
    }

    /// Types in declaration order, value types first since other structs
    /// embed them by value.
    fn ordered_types(&self) -> Vec<&'a TypeDispatch> {
        let mut types: Vec<_> = self.tables.types().collect();
        types.sort_by_key(|d| (!self.describe(d.ty).is_value_type(), d.ty));
        types
    }

    pub fn write_header(&mut self) {
        self.out.write_line("// generated by il2c-rs; do not edit");
        self.out.blank();
        self.out.write_line("#include <il2c.h>");
        for include in self.metadata.registered_includes() {
            self.out.write_line(format!("#include \"{include}\""));
        }
        self.out.blank();
    }

    pub fn write_forward_declarations(&mut self) {
        for dispatch in self.ordered_types() {
            let ty = self.describe(dispatch.ty);
            let name = self.mangled(dispatch.ty);
            match ty.definition().underlying.as_ref() {
                Some(underlying) if ty.is_enum() => {
                    let underlying = self.c_type(underlying);
                    self.out.write_line(format!("typedef {underlying} {name};"));
                }
                _ => self.out.write_line(format!("typedef struct {name} {name};")),
            }
        }
        self.out.blank();
    }

    /// `ret (*)(void*, params...)`, with the receiver erased so that
    /// overrides declared on different types share one pointer type.
    fn function_pointer(&self, method: MethodId, name: &str) -> String {
        let description = MethodDescription::new(self.metadata, method);
        let def = description.method();
        let params: String = def
            .parameters
            .iter()
            .map(|p| format!(", {}", self.c_type(&p.ty)))
            .collect();
        format!(
            "{} (*{name})(void*{params})",
            self.c_type(&def.return_type)
        )
    }

    fn write_vtable_struct(&mut self, name: &str, fields: Vec<String>) {
        self.out
            .block(format!("typedef struct {name}_VTABLE_DECL__"), &format!(" {name}_VTABLE_DECL__;"), |w| {
                w.write_line("intptr_t offset__;");
                for field in fields {
                    w.write_line(format!("{field};"));
                }
            });
        self.out.blank();
    }

    pub fn write_vtable_declarations(&mut self) {
        let types = self.ordered_types();
        let mut tables = vec![];
        for dispatch in types.iter().filter(|d| self.describe(d.ty).is_interface()) {
            let fields: Vec<String> = self
                .describe(dispatch.ty)
                .declared_methods()
                .enumerate()
                .map(|(index, m)| {
                    self.function_pointer(m.id, &vtable_field_name(self.metadata, m.id, index))
                })
                .collect();
            tables.push((self.mangled(dispatch.ty), fields));
        }
        for dispatch in types.iter().filter(|d| d.owns_vtable()) {
            let Some(table) = self.tables.vtable_of(dispatch.ty) else {
                continue;
            };
            let fields: Vec<String> = table
                .entries
                .iter()
                .map(|e| {
                    self.function_pointer(e.method, &vtable_field_name(self.metadata, e.method, e.slot))
                })
                .collect();
            tables.push((self.mangled(dispatch.ty), fields));
        }
        let aliases: Vec<_> = types
            .iter()
            .filter(|d| !d.owns_vtable())
            .filter_map(|d| {
                let owner = d.vtable_owner?;
                Some(format!(
                    "typedef {}_VTABLE_DECL__ {}_VTABLE_DECL__;",
                    self.mangled(owner),
                    self.mangled(d.ty)
                ))
            })
            .collect();

        for (name, fields) in tables {
            self.write_vtable_struct(&name, fields);
        }
        for alias in aliases {
            self.out.write_line(alias);
        }
        self.out.blank();
    }

    fn write_struct(&mut self, dispatch: &TypeDispatch) {
        let ty = self.describe(dispatch.ty);
        let name = self.mangled(dispatch.ty);
        let mut members = vec![];
        if ty.is_interface() {
            members.push(format!(
                "{name}_VTABLE_DECL__* {};",
                interface_vptr_name(self.metadata, &ty.signature())
            ));
        } else {
            if ty.is_reference_type() {
                members.push(format!("{name}_VTABLE_DECL__* vptr0__;"));
            }
            let mut chain: Vec<_> = ty.ancestors().collect();
            chain.reverse();
            for ancestor in chain {
                for field in ancestor.fields().filter(|f| !f.field().static_member) {
                    members.push(format!(
                        "{} {};",
                        self.c_type(&field.field().ty),
                        field_name(self.metadata, field.id)
                    ));
                }
            }
            if ty.is_reference_type() {
                for interface in ty.all_interfaces() {
                    members.push(format!(
                        "{}_VTABLE_DECL__* {};",
                        self.mangled(interface.id),
                        interface_vptr_name(self.metadata, &interface.signature())
                    ));
                }
            }
        }
        if members.is_empty() {
            members.push("uint8_t dummy__;".to_string());
        }
        self.out.block(format!("struct {name}"), ";", |w| {
            for member in members {
                w.write_line(member);
            }
        });
        self.out.blank();
    }

    pub fn write_type_structs(&mut self) {
        for dispatch in self.ordered_types() {
            if !self.describe(dispatch.ty).is_enum() {
                self.write_struct(dispatch);
            }
        }
    }

    pub fn write_static_fields(&mut self) {
        let mut any = false;
        for dispatch in self.ordered_types() {
            for field in self.describe(dispatch.ty).fields() {
                if field.field().static_member {
                    self.out.write_line(format!(
                        "static {} {};",
                        self.c_type(&field.field().ty),
                        static_field_name(self.metadata, field.id)
                    ));
                    any = true;
                }
            }
        }
        if any {
            self.out.blank();
        }
    }

    fn prototype(&self, function: &PreparedFunction) -> String {
        let params = if function.arguments.is_empty() {
            "void".to_string()
        } else {
            function
                .arguments
                .iter()
                .map(|a| format!("{} {}", self.c_type(&a.ty), a.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("{} {}({params})", self.c_type(&function.return_type), function.name)
    }

    pub fn write_prototypes(&mut self, functions: &[PreparedFunction]) {
        for function in functions {
            match &function.body {
                FunctionBody::Decoded(_) => {
                    self.out.write_line(format!("{};", self.prototype(function)))
                }
                FunctionBody::Foreign(import) => self.out.write_line(format!(
                    "// {} is provided by \"{}\"",
                    function.name, import.library
                )),
            }
        }
        self.out.blank();
    }

    /// Name placed in a dispatch table for `method`: `NULL` for abstract
    /// methods, a trampoline for value type methods.
    fn table_function(&self, method: MethodId) -> String {
        let description = MethodDescription::new(self.metadata, method);
        if description.method().abstract_member {
            return "NULL".to_string();
        }
        let name = if description.parent().is_value_type() {
            trampoline_name(self.metadata, self.tables, method)
        } else {
            function_name(self.metadata, self.tables, method)
        };
        format!("({}){name}", self.function_pointer(method, ""))
    }

    fn write_trampolines(&mut self, dispatch: &TypeDispatch) {
        let mut methods: Vec<MethodId> = dispatch.slots.iter().map(|s| s.method).collect();
        methods.extend(
            dispatch
                .interfaces
                .iter()
                .flat_map(|m| m.entries.iter().map(|e| e.implementation)),
        );
        methods.sort();
        methods.dedup();
        let name = self.mangled(dispatch.ty);
        for method in methods {
            let description = MethodDescription::new(self.metadata, method);
            let def = description.method();
            if def.abstract_member || description.parent().id != dispatch.ty {
                continue;
            }
            let params: String = def
                .parameters
                .iter()
                .enumerate()
                .map(|(i, p)| format!(", {} p{i}", self.c_type(&p.ty)))
                .collect();
            let args: String = (0..def.parameters.len()).map(|i| format!(", p{i}")).collect();
            let call = format!(
                "{}(({name}*)il2c_unsafe_unbox__(this__, {name}){args});",
                function_name(self.metadata, self.tables, method)
            );
            let returns = def.return_type != TypeSig::Void;
            self.out.block(
                format!(
                    "static {} {}(void* this__{params})",
                    self.c_type(&def.return_type),
                    trampoline_name(self.metadata, self.tables, method)
                ),
                "",
                |w| {
                    w.write_line("il2c_assert(this__ != NULL);");
                    w.write_line(if returns { format!("return {call}") } else { call });
                },
            );
            self.out.blank();
        }
    }

    fn write_vtables(&mut self, dispatch: &TypeDispatch) {
        let name = self.mangled(dispatch.ty);
        match dispatch.vtable_owner {
            Some(owner) if owner == dispatch.ty => {
                let entries: Vec<_> = self
                    .tables
                    .vtable_of(dispatch.ty)
                    .map(|t| t.entries.iter().map(|e| self.table_function(e.method)).collect())
                    .unwrap_or_default();
                self.out
                    .block(format!("{name}_VTABLE_DECL__ {name}_VTABLE__ ="), ";", |w| {
                        w.write_line("0, // adjustor offset");
                        for entry in entries {
                            w.write_line(format!("{entry},"));
                        }
                    });
            }
            Some(owner) => self.out.write_line(format!(
                "// {name} dispatches through {}_VTABLE__",
                self.mangled(owner)
            )),
            None => return,
        }
        self.out.blank();

        for map in &dispatch.interfaces {
            let interface = self.mangled(map.interface);
            let entries: Vec<_> = map
                .entries
                .iter()
                .map(|e| self.table_function(e.implementation))
                .collect();
            self.out.block(
                format!("static {interface}_VTABLE_DECL__ {name}_{interface}_VTABLE__ ="),
                ";",
                |w| {
                    w.write_line(format!("il2c_adjustor_offset({name}, {interface}),"));
                    for entry in entries {
                        w.write_line(format!("{entry},"));
                    }
                },
            );
            self.out.blank();
        }
    }

    fn write_runtime_type(&mut self, dispatch: &TypeDispatch) {
        let ty = self.describe(dispatch.ty);
        let name = self.mangled(dispatch.ty);
        let full_name = ty.type_name();
        if ty.is_interface() {
            self.out.write_line(format!(
                "IL2C_RUNTIME_TYPE_INTERFACE_BEGIN({name}, \"{full_name}\")"
            ));
            self.out.write_line("IL2C_RUNTIME_TYPE_END();");
            self.out.blank();
            return;
        }

        let flag = match ty.definition().underlying.as_ref() {
            Some(underlying) if ty.is_enum() && underlying.is_unsigned() => {
                "IL2C_TYPE_UNSIGNED_INTEGER"
            }
            Some(_) if ty.is_enum() => "IL2C_TYPE_INTEGER",
            _ if ty.is_value_type() => "IL2C_TYPE_VALUE",
            _ => "IL2C_TYPE_REFERENCE",
        };
        let base = match ty.base() {
            Some(base) => self.mangled(base.id),
            None if ty.is_value_type() => "System_ValueType".to_string(),
            None => "System_Object".to_string(),
        };
        let marks = match &dispatch.mark_targets {
            MarkTargets::Delegate => "System_Delegate_MarkHandler__".to_string(),
            MarkTargets::Fields(fields) => fields.len().to_string(),
        };
        self.out.write_line(format!(
            "IL2C_RUNTIME_TYPE_BEGIN({name}, \"{full_name}\", {flag}, sizeof({name}), {base}, {marks}, {})",
            dispatch.interfaces.len()
        ));
        let entries: Vec<_> = dispatch
            .mark_targets
            .fields()
            .iter()
            .map(|field| {
                format!(
                    "IL2C_RUNTIME_TYPE_MARK_TARGET_FOR_REFERENCE({name}, {})",
                    field_name(self.metadata, *field)
                )
            })
            .chain(dispatch.interfaces.iter().map(|map| {
                format!(
                    "IL2C_RUNTIME_TYPE_INTERFACE({name}, {})",
                    self.mangled(map.interface)
                )
            }))
            .collect();
        self.out.shift(|w| {
            for entry in entries {
                w.write_line(entry);
            }
        });
        self.out.write_line("IL2C_RUNTIME_TYPE_END();");
        self.out.blank();
    }

    pub fn write_type_information(&mut self) {
        for dispatch in self.ordered_types() {
            if self.describe(dispatch.ty).is_value_type() {
                self.write_trampolines(dispatch);
            }
            self.write_vtables(dispatch);
            self.write_runtime_type(dispatch);
        }
    }

    fn zero_value(&self, ty: &TypeSig) -> Option<&'static str> {
        match ty.category(self.metadata) {
            crate::types::TypeCategory::Value => None,
            _ if ty.is_reference_type(self.metadata) => Some("NULL"),
            _ => Some("0"),
        }
    }

    fn write_blobs(&mut self, function: &str, body: &DecodedBody) {
        for blob in &body.blobs {
            let mut bytes = String::new();
            for (i, byte) in blob.data.iter().enumerate() {
                if i > 0 {
                    bytes.push_str(", ");
                }
                let _ = write!(bytes, "{byte:#04x}");
            }
            self.out.write_line(format!(
                "static const uint8_t {}[{}] = {{ {bytes} }};",
                blob_name(function, blob.id),
                blob.data.len()
            ));
        }
        if !body.blobs.is_empty() {
            self.out.blank();
        }
    }

    pub fn write_function(&mut self, function: &PreparedFunction) {
        let FunctionBody::Decoded(body) = &function.body else {
            return;
        };
        self.write_blobs(&function.name, body);

        let naming = FunctionNaming {
            metadata: self.metadata,
            tables: self.tables,
            function,
            body,
        };
        let mut declarations = vec![];
        let mut cleared = vec![];
        for (index, local) in body.locals.iter().enumerate() {
            match self.zero_value(local) {
                Some(zero) => {
                    declarations.push(format!("{} local{index} = {zero};", self.c_type(local)))
                }
                None => {
                    declarations.push(format!("{} local{index};", self.c_type(local)));
                    cleared.push(format!("memset(&local{index}, 0x00, sizeof(local{index}));"));
                }
            }
        }
        for slot in &body.stacks {
            declarations.push(format!("{} {};", self.c_type(&slot.ty), slot.symbol_name()));
        }

        let header = self.prototype(function);
        self.out.block(header, "", |w| {
            for line in declarations.iter().chain(&cleared) {
                w.write_line(line);
            }
            if !declarations.is_empty() {
                w.blank();
            }
            for instruction in &body.instructions {
                if let Some(label) = instruction.location.and_then(|l| body.label_definition(l)) {
                    w.write_unindented(format!("{label}:"));
                }
                for line in render(&instruction.node, &naming) {
                    w.write_line(line);
                }
            }
        });
        self.out.blank();
    }

    pub fn finish(self) -> String {
        self.out.finish()
    }
}

/// Writes the whole translation unit for `functions` against the resolved
/// dispatch `tables`.
pub fn write_source(
    metadata: &Metadata,
    tables: &DispatchTables,
    functions: &[PreparedFunction],
) -> String {
    let mut writer = SourceWriter::new(metadata, tables);
    writer.write_header();
    writer.write_forward_declarations();
    writer.write_vtable_declarations();
    writer.write_type_structs();
    writer.write_static_fields();
    writer.write_prototypes(functions);
    writer.write_type_information();
    for function in functions {
        writer.write_function(function);
    }
    writer.finish()
}
