use clap::Parser;
use il2c_rs::{
    dispatch::{DispatchResolver, MarkTargets},
    metadata::{manifest::ProgramManifest, Metadata, MethodId},
    prepare::register_program,
    types::members::MethodDescription,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Dump the resolved dispatch structure of a specified type"
)]
struct Args {
    /// The program manifest to load
    manifest: PathBuf,
    /// The full name of the type to dump (e.g. Demo.Shape)
    type_name: String,
}

fn show(metadata: &Metadata, method: MethodId) -> String {
    format!("{:?}", MethodDescription::new(metadata, method))
}

fn main() -> ExitCode {
    let args = Args::parse();
    il2c_rs::init_tracing();

    let metadata = match ProgramManifest::load(&args.manifest).and_then(|m| m.build()) {
        Ok(metadata) => metadata,
        Err(e) => {
            eprintln!("{}: {e}", args.manifest.display());
            return ExitCode::FAILURE;
        }
    };

    let Some(id) = metadata.find_type(&args.type_name) else {
        eprintln!("Type '{}' not found in manifest", args.type_name);
        println!("\nAvailable types:");
        for (_, t) in metadata.types() {
            println!("  {}", t.full_name());
        }
        return ExitCode::FAILURE;
    };

    let types = register_program(&metadata);
    let resolver = DispatchResolver::new(&metadata);
    let (tables, failures) = resolver.resolve_all(types);
    for failure in &failures {
        eprintln!("warning: {failure}");
    }
    let dispatch = match resolver.resolve_type(id) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("Type: {} ({:?})", args.type_name, metadata.type_def(id).kind);

    println!("\nOverloads:");
    for (name, group) in &dispatch.overloads {
        println!("  {name}:");
        for (position, method) in group.iter().enumerate() {
            println!("    [{position}] {}", show(&metadata, *method));
        }
    }

    println!("\nVirtual slots:");
    for slot in &dispatch.slots {
        println!(
            "  {:>3} (sibling {}): {}",
            slot.slot,
            slot.sibling,
            show(&metadata, slot.method)
        );
    }

    println!("\nVTable:");
    match (dispatch.vtable_owner, tables.vtable_of(id)) {
        (None, _) => println!("  (interface, none)"),
        (Some(owner), Some(table)) => {
            if owner == id {
                println!("  private");
            } else {
                println!("  shared with {}", metadata.type_def(owner).full_name());
            }
            for entry in &table.entries {
                println!("  {:>3}: {}", entry.slot, show(&metadata, entry.method));
            }
        }
        (Some(_), None) => println!("  (unresolved)"),
    }

    println!("\nInterfaces:");
    for map in &dispatch.interfaces {
        println!("  {}:", metadata.type_def(map.interface).full_name());
        for entry in &map.entries {
            println!(
                "    {} -> {}{}",
                metadata.method_def(entry.interface_method).name,
                show(&metadata, entry.implementation),
                if entry.explicit { " (explicit)" } else { "" }
            );
        }
    }

    println!("\nMark targets:");
    match &dispatch.mark_targets {
        MarkTargets::Delegate => println!("  (delegate handler)"),
        MarkTargets::Fields(fields) => {
            for field in fields {
                println!("  - {}", metadata.field_def(*field).name);
            }
        }
    }
    ExitCode::SUCCESS
}
