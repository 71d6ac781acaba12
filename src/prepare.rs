//! The translation pipeline around the two core components: registration to
//! fixpoint, dispatch resolution, per-method preparation and source output.
//! Every method and every type is its own unit of work; a failing unit is
//! reported and left out of the output.

use crate::{
    decode::{decode_method, Argument, FunctionBody, PreparedFunction},
    dispatch::{DispatchResolver, DispatchTables},
    emit::{naming::argument_names, naming::function_name, write_source},
    error::TranslateError,
    metadata::{Metadata, MethodId, TypeId},
    types::{members::MethodDescription, TypeDescription, TypeSig},
};
use std::collections::VecDeque;
use tracing::{debug, info};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PrepareOptions {
    /// Only translate methods declared on public types.
    pub public_only: bool,
    /// Stop at the first failed unit instead of continuing the batch.
    pub fail_fast: bool,
}

/// Records every type the program can reach, starting from the declared
/// types, until registering stops turning up new signatures. Returns the
/// registered type definitions in id order.
pub fn register_program(metadata: &Metadata) -> Vec<TypeId> {
    let mut queue: VecDeque<TypeSig> = metadata.types().map(|(id, _)| TypeSig::Type(id)).collect();
    let mut rounds = 0usize;
    while let Some(ty) = queue.pop_front() {
        if !metadata.register_type(&ty) {
            continue;
        }
        rounds += 1;
        match &ty {
            TypeSig::ByRef(inner) | TypeSig::Pointer(inner) | TypeSig::Vector(inner) => {
                queue.push_back((**inner).clone());
            }
            TypeSig::Type(id) => {
                let description = TypeDescription::new(metadata, *id);
                let def = description.definition();
                queue.extend(def.extends.map(TypeSig::Type));
                queue.extend(def.implements.iter().copied().map(TypeSig::Type));
                queue.extend(def.underlying.iter().cloned());
                for field in description.fields() {
                    queue.push_back(field.field().ty.clone());
                }
                for method in description.declared_methods() {
                    let def = method.method();
                    queue.push_back(def.return_type.clone());
                    queue.extend(def.parameters.iter().map(|p| p.ty.clone()));
                }
            }
            _ => {}
        }
    }
    debug!(target: "il2c::translate", registered = rounds, "registration reached fixpoint");

    let mut types: Vec<_> = metadata
        .registered_types()
        .into_iter()
        .filter_map(|ty| match ty {
            TypeSig::Type(id) => Some(id),
            _ => None,
        })
        .collect();
    types.sort();
    types
}

/// Methods to translate: everything with a body or a foreign entry point,
/// except static constructors.
pub fn select_methods(metadata: &Metadata, options: &PrepareOptions) -> Vec<MethodId> {
    metadata
        .methods()
        .filter(|(_, def)| def.name != ".cctor")
        .filter(|(_, def)| def.body.is_some() || def.pinvoke)
        .filter(|(_, def)| !options.public_only || metadata.type_def(def.declaring_type).public)
        .map(|(id, _)| id)
        .collect()
}

/// Decodes one method, or builds its foreign call bridge.
pub fn prepare_method(
    metadata: &Metadata,
    tables: &DispatchTables,
    method: MethodId,
) -> Result<PreparedFunction, TranslateError> {
    let description = MethodDescription::new(metadata, method);
    let def = description.method();
    for ty in description.argument_types().iter().chain([&def.return_type]) {
        metadata.register_type(ty);
    }

    let body = if def.pinvoke {
        let import = def
            .import
            .as_ref()
            .ok_or_else(|| TranslateError::MissingDescriptor {
                method: description.full_name(),
            })?;
        metadata.register_include(&import.library);
        FunctionBody::Foreign(import.clone())
    } else {
        let body = decode_method(description)
            .map_err(|e| TranslateError::malformed(description.full_name(), e))?;
        FunctionBody::Decoded(body)
    };

    let arguments = argument_names(description)
        .into_iter()
        .zip(description.argument_types())
        .map(|(name, ty)| Argument { name, ty })
        .collect();
    Ok(PreparedFunction {
        method,
        name: function_name(metadata, tables, method),
        return_type: def.return_type.clone(),
        arguments,
        body,
    })
}

/// The outcome of translating a program: the C source for every unit that
/// succeeded, and the failures of those that did not.
#[derive(Debug)]
pub struct Translation {
    pub source: String,
    pub functions: Vec<PreparedFunction>,
    pub failures: Vec<TranslateError>,
}

impl Translation {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn report(unit: &str, error: &TranslateError) {
    translate_warn!(unit, error = %error, offset = ?error.offset(), "unit failed");
}

pub fn translate(metadata: &Metadata, options: &PrepareOptions) -> Result<Translation, TranslateError> {
    let types = register_program(metadata);
    let (tables, mut failures) = DispatchResolver::new(metadata).resolve_all(types);
    for failure in &failures {
        report("dispatch", failure);
    }
    if options.fail_fast {
        if let Some(first) = failures.first() {
            return Err(first.clone());
        }
    }

    let mut functions = vec![];
    for method in select_methods(metadata, options) {
        // a type that failed resolution has no struct or table to code against
        let declaring = metadata.method_def(method).declaring_type;
        if tables.get(declaring).is_none() {
            debug!(
                target: "il2c::translate",
                method = %MethodDescription::new(metadata, method).full_name(),
                "skipped, declaring type unresolved"
            );
            continue;
        }
        match prepare_method(metadata, &tables, method) {
            Ok(function) => functions.push(function),
            Err(e) => {
                report(&MethodDescription::new(metadata, method).full_name(), &e);
                if options.fail_fast {
                    return Err(e);
                }
                failures.push(e);
            }
        }
    }

    let source = write_source(metadata, &tables, &functions);
    info!(
        target: "il2c::translate",
        functions = functions.len(),
        types = tables.types().count(),
        failures = failures.len(),
        "translation finished"
    );
    Ok(Translation {
        source,
        functions,
        failures,
    })
}
