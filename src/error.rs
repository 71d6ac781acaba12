use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("method body is empty")]
    EmptyBody,
    #[error("end of method body reached at offset {offset:#06x}")]
    EndOfBody { offset: usize },
    #[error("invalid opcode {opcode:#x} at offset {offset:#06x}")]
    InvalidOpcode { opcode: u16, offset: usize },
    #[error("invalid branch target {target} at offset {offset:#06x}")]
    InvalidBranchTarget { target: i64, offset: usize },
    #[error("evaluation stack underflow at offset {offset:#06x}")]
    StackUnderflow { offset: usize },
    #[error("unresolved token {token:#010x} at offset {offset:#06x}")]
    UnresolvedToken { token: u32, offset: usize },
    #[error("invalid operand at offset {offset:#06x}: {detail}")]
    InvalidOperand { offset: usize, detail: String },
    #[error("stack depth {actual} does not match depth {expected} at join offset {offset:#06x}")]
    StackDepthMismatch {
        offset: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TranslateError {
    #[error("malformed program in {method}: {source}")]
    MalformedProgram {
        method: String,
        #[source]
        source: DecodeError,
    },
    #[error("missing import descriptor at foreign call entry point {method}")]
    MissingDescriptor { method: String },
    #[error("dispatch resolution defect in {type_name}: {detail}")]
    ResolutionDefect { type_name: String, detail: String },
}

impl TranslateError {
    pub fn malformed(method: impl Into<String>, source: DecodeError) -> Self {
        TranslateError::MalformedProgram {
            method: method.into(),
            source,
        }
    }

    /// Byte offset of the failing instruction, if the error came out of a decode run.
    pub fn offset(&self) -> Option<usize> {
        match self {
            TranslateError::MalformedProgram { source, .. } => match source {
                DecodeError::EmptyBody => None,
                DecodeError::EndOfBody { offset }
                | DecodeError::InvalidOpcode { offset, .. }
                | DecodeError::InvalidBranchTarget { offset, .. }
                | DecodeError::StackUnderflow { offset }
                | DecodeError::UnresolvedToken { offset, .. }
                | DecodeError::InvalidOperand { offset, .. }
                | DecodeError::StackDepthMismatch { offset, .. } => Some(*offset),
            },
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("could not read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid IL hex in {method}: {source}")]
    Hex {
        method: String,
        #[source]
        source: hex::FromHexError,
    },
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("unknown method {0}")]
    UnknownMethod(String),
    #[error("invalid type signature {0:?}")]
    InvalidSignature(String),
    #[error("duplicate type {0}")]
    DuplicateType(String),
}
