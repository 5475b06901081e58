// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by agent operations.
//!
//! Variants are grouped by the layer that produces them. The query-layer
//! variants map onto MTConnect protocol error codes via [`Error::error_code`]
//! so the HTTP surface can render `<MTConnectError>` bodies without matching
//! on every variant itself.

use std::fmt;

/// Errors returned by agent operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Startup Errors (fatal)
    // ========================================================================
    /// Device description rejected before ingest (version or XSD failure).
    SchemaRejected(String),
    /// Device schema JSON could not be deserialized.
    SchemaParse(String),
    /// Failed to bind the HTTP listener.
    BindFailed(String),

    // ========================================================================
    // Ingest Errors (recoverable, logged and skipped)
    // ========================================================================
    /// SHDR line could not be tokenized into fields.
    MalformedLine(String),
    /// Asset command payload was structurally invalid.
    MalformedAsset(String),
    /// Dataitem wire name did not resolve against the registry.
    UnknownDataItem(String),

    // ========================================================================
    // Query Errors (client-facing)
    // ========================================================================
    /// Requested sequence window falls outside the retained buffer.
    OutOfRange(String),
    /// Path filter expression could not be parsed.
    InvalidXPath(String),
    /// Request names an unknown endpoint or verb.
    Unsupported(String),
    /// No device matches the request.
    NoDevice(String),
    /// A query parameter failed to parse.
    InvalidParameter(String),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Asset XML tree could not be parsed or updated.
    Xml(String),
}

impl Error {
    /// MTConnect protocol error code for client-facing variants.
    ///
    /// Returns `None` for variants that never reach a client response.
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Error::OutOfRange(_) => Some("OUT_OF_RANGE"),
            Error::InvalidXPath(_) => Some("INVALID_XPATH"),
            Error::Unsupported(_) => Some("UNSUPPORTED"),
            Error::NoDevice(_) => Some("NO_DEVICE"),
            Error::InvalidParameter(_) => Some("INVALID_REQUEST"),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Startup
            Error::SchemaRejected(msg) => write!(f, "Device schema rejected: {}", msg),
            Error::SchemaParse(msg) => write!(f, "Device schema parse failure: {}", msg),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            // Ingest
            Error::MalformedLine(msg) => write!(f, "Malformed SHDR line: {}", msg),
            Error::MalformedAsset(msg) => write!(f, "Malformed asset command: {}", msg),
            Error::UnknownDataItem(name) => write!(f, "Unknown dataitem: {}", name),
            // Query
            Error::OutOfRange(msg) => write!(f, "Sequence out of range: {}", msg),
            Error::InvalidXPath(msg) => write!(f, "Invalid path expression: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported request: {}", msg),
            Error::NoDevice(msg) => write!(f, "No such device: {}", msg),
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            // Other
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Xml(msg) => write!(f, "XML error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Convenience alias used across the agent.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_facing_variants_carry_protocol_codes() {
        assert_eq!(
            Error::OutOfRange("from=1".into()).error_code(),
            Some("OUT_OF_RANGE")
        );
        assert_eq!(
            Error::InvalidXPath("//[".into()).error_code(),
            Some("INVALID_XPATH")
        );
        assert_eq!(
            Error::Unsupported("PUT".into()).error_code(),
            Some("UNSUPPORTED")
        );
        assert_eq!(Error::MalformedLine("x".into()).error_code(), None);
    }

    #[test]
    fn display_includes_detail() {
        let e = Error::SchemaRejected("unsupported version 0.9".into());
        assert!(e.to_string().contains("unsupported version 0.9"));
    }
}
