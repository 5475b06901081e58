// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SHDR wire dialect.
//!
//! One pipe-delimited line becomes either a set of observations under a
//! single timestamp or an asset command. The parser owns the multi-line
//! asset buffering state for its adapter stream.

mod parser;

pub use parser::ShdrParser;

use crate::store::Value;

/// Observations parsed from one SHDR line: one timestamp, one or more
/// dataitem samples in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Timestamp string, verbatim from the wire or agent-generated.
    pub time: String,
    pub samples: Vec<Sample>,
}

/// One resolved `(dataitem, value)` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub data_item_id: String,
    /// Wire name as written on the line.
    pub name: String,
    pub value: Value,
}

/// Payload of an `@UPDATE_ASSET@` command.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePayload {
    /// `(elementName, newText)` pairs; each replaces the text of the first
    /// depth-first match.
    KeyValues(Vec<(String, String)>),
    /// Raw XML fragment replacing the whole matching element.
    Fragment(String),
}

/// The four asset verbs.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetCommand {
    Add {
        time: String,
        asset_id: String,
        asset_type: String,
        body: String,
    },
    Update {
        time: String,
        asset_id: String,
        payload: UpdatePayload,
    },
    Remove {
        time: String,
        asset_id: String,
    },
    RemoveAll {
        time: String,
        asset_type: String,
    },
}

/// Outcome of feeding one raw line to the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Observations(ParsedLine),
    Asset(AssetCommand),
    /// Inside a multi-line asset body; more input needed.
    Pending,
    /// Nothing usable on the line (empty, or every field skipped).
    Skip,
}
