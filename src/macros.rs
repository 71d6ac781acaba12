#[macro_export]
macro_rules! decode_trace_path {
    ($ctx:expr, $($format:tt)*) => {
        ::tracing::debug!(
            target: "il2c::decode",
            method = %$ctx.method_name(),
            $($format)*
        )
    };
}

#[macro_export]
macro_rules! decode_trace_instruction {
    ($ctx:expr, $offset:expr, $name:expr) => {
        ::tracing::trace!(
            target: "il2c::decode",
            method = %$ctx.method_name(),
            offset = $offset,
            depth = $ctx.stack_depth(),
            "{}",
            $name
        )
    };
}

#[macro_export]
macro_rules! dispatch_trace {
    ($ty:expr, $($format:tt)*) => {
        ::tracing::trace!(target: "il2c::dispatch", type_name = %$ty, $($format)*)
    };
}

#[macro_export]
macro_rules! translate_warn {
    ($unit:expr, $($format:tt)*) => {
        ::tracing::warn!(target: "il2c::translate", unit = %$unit, $($format)*)
    };
}
