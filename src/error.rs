use thiserror::Error;

/// Errors arising from advertisement frame decoding.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame ({len} bytes, minimum 20){}", format_raw_suffix(raw))]
    MalformedFrame {
        len: usize,
        /// Raw advertisement bytes for debug context.
        raw: Vec<u8>,
    },

    #[error("payload too short for {field}: need {need} bytes, got {got}")]
    PayloadTooShort {
        field: &'static str,
        need: usize,
        got: usize,
    },
}

impl FrameError {
    /// Create a `MalformedFrame` error (raw bytes filled in later via `with_raw`).
    pub(crate) fn malformed(len: usize) -> Self {
        Self::MalformedFrame { len, raw: Vec::new() }
    }

    pub(crate) fn payload_too_short(field: &'static str, need: usize, got: usize) -> Self {
        Self::PayloadTooShort { field, need, got }
    }

    /// Attach raw advertisement bytes to a `MalformedFrame` for diagnostics.
    pub fn with_raw(self, bytes: &[u8]) -> Self {
        match self {
            Self::MalformedFrame { len, .. } => Self::MalformedFrame { len, raw: bytes.to_vec() },
            other => other,
        }
    }
}

/// Format raw bytes as a suffix like " | 0232 0A14 ..." (empty if no bytes).
fn format_raw_suffix(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let limit = 16;
    let hex: String = raw.iter().take(limit).map(|b| format!("{b:02X}")).collect();
    let ellipsis = if raw.len() > limit { "..." } else { "" };
    format!(" | {hex}{ellipsis}")
}

pub type Result<T> = std::result::Result<T, FrameError>;
