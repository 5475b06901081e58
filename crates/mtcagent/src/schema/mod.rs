// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device description model and registry.
//!
//! Devices arrive as pre-parsed schema JSON
//! (`{devices:[{uuid, name, components:[...], dataitems:[...]}]}`) and are
//! indexed for the three lookups the pipeline needs: wire-name resolution
//! during SHDR parsing, id lookup during storage, and ancestor-chain
//! matching during path queries.

mod path;
mod registry;
pub mod validate;

pub use path::{parse_path, PathNode, PathStep};
pub use registry::{DeviceRegistry, ItemEntry};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category / Representation
// ---------------------------------------------------------------------------

/// Dataitem category: drives SHDR field consumption and storage semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Sample,
    Event,
    Condition,
}

/// Dataitem representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Representation {
    Value,
    TimeSeries,
}

impl Default for Representation {
    fn default() -> Self {
        Representation::Value
    }
}

// ---------------------------------------------------------------------------
// Schema JSON shape
// ---------------------------------------------------------------------------

/// Top-level schema document: one or more devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub devices: Vec<Device>,
}

/// A device: UUID identity, human name, component tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub dataitems: Vec<DataItem>,
}

/// A component node: bears a component type ("Electric", "Axes", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub dataitems: Vec<DataItem>,
}

/// A single observable channel on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataItem {
    pub id: String,
    /// Short wire name used in SHDR. Synthetic dataitems have none.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    pub category: Category,
    #[serde(rename = "subType", default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub representation: Representation,
}

impl DataItem {
    /// True for the per-device synthetic asset-event channels.
    #[must_use]
    pub fn is_asset_channel(&self) -> bool {
        self.type_name == "ASSET_CHANGED" || self.type_name == "ASSET_REMOVED"
    }
}
