/// Turns a dotted or `::`-qualified metadata name into a C identifier.
pub fn mangle_name(name: &str) -> String {
    name.replace("::", "_")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Escapes a string for a wide C string literal, keeping printable ASCII as is.
pub fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0; 2];
                for unit in c.encode_utf16(&mut units) {
                    // closing and reopening the literal stops the escape
                    // from swallowing following hex digits
                    out.push_str(&format!("\\x{unit:04x}\"\""));
                }
            }
        }
    }
    out
}
