// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory device registry with discovery-order indexes.

use std::collections::HashMap;

use super::path::{self, PathNode, PathStep};
use super::{Category, Component, DataItem, Device, Representation, SchemaDocument};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// ItemEntry
// ---------------------------------------------------------------------------

/// Fully-resolved view of one dataitem: the dataitem itself plus the device
/// and component context the query serializer needs for grouping.
#[derive(Debug, Clone)]
pub struct ItemEntry {
    pub item: DataItem,
    pub device_uuid: String,
    pub device_name: String,
    pub component_id: String,
    pub component_type: String,
    pub component_name: Option<String>,
    /// Ancestor chain from the device element down to the dataitem element,
    /// used for path-filter matching.
    pub chain: Vec<PathNode>,
}

// ---------------------------------------------------------------------------
// DeviceRegistry
// ---------------------------------------------------------------------------

/// Indexed store of device descriptions.
///
/// Insertion is idempotent by device UUID (reinsert replaces). Dataitems and
/// components are never mutated after insert; every index is rebuilt on
/// insertion, which is cheap at device-description scale.
#[derive(Debug)]
pub struct DeviceRegistry {
    /// Devices in insertion order.
    devices: Vec<Device>,
    /// Device name -> uuid.
    name_to_uuid: HashMap<String, String>,
    /// Dataitem id -> resolved entry.
    items: HashMap<String, ItemEntry>,
    /// (device uuid, wire name) -> dataitem id. Case-sensitive, synthetics excluded.
    wire_names: HashMap<(String, String), String>,
    /// Dataitem ids in discovery order (depth-first over devices in insertion
    /// order, then components in schema order).
    order: Vec<String>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            name_to_uuid: HashMap::new(),
            items: HashMap::new(),
            wire_names: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Insert every device in a schema JSON document.
    ///
    /// Returns the UUIDs inserted. Reinserting a known UUID replaces the
    /// previous description.
    pub fn insert_schema(&mut self, json: &str) -> Result<Vec<String>> {
        let doc: SchemaDocument =
            serde_json::from_str(json).map_err(|e| Error::SchemaParse(e.to_string()))?;
        let mut uuids = Vec::with_capacity(doc.devices.len());
        for device in doc.devices {
            uuids.push(device.uuid.clone());
            self.insert_device(device);
        }
        Ok(uuids)
    }

    /// Insert a single device, replacing any existing one with the same UUID.
    pub fn insert_device(&mut self, mut device: Device) {
        Self::attach_asset_channels(&mut device);

        match self.devices.iter().position(|d| d.uuid == device.uuid) {
            Some(idx) => {
                log::debug!(
                    "[DeviceRegistry::insert_device] Replacing device uuid={}",
                    device.uuid
                );
                self.devices[idx] = device;
            }
            None => self.devices.push(device),
        }

        self.rebuild_indexes();
    }

    /// Register the synthetic per-device asset-event channels. These carry
    /// no wire name so SHDR lines can never address them directly.
    fn attach_asset_channels(device: &mut Device) {
        if device.dataitems.iter().any(|d| d.is_asset_channel()) {
            return;
        }
        device.dataitems.push(DataItem {
            id: format!("{}_asset_chg", device.name),
            name: None,
            type_name: "ASSET_CHANGED".to_string(),
            category: Category::Event,
            sub_type: None,
            representation: Representation::Value,
        });
        device.dataitems.push(DataItem {
            id: format!("{}_asset_rem", device.name),
            name: None,
            type_name: "ASSET_REMOVED".to_string(),
            category: Category::Event,
            sub_type: None,
            representation: Representation::Value,
        });
    }

    fn rebuild_indexes(&mut self) {
        self.name_to_uuid.clear();
        self.items.clear();
        self.wire_names.clear();
        self.order.clear();

        // Borrow juggling: walk a clone of the device list so the walker can
        // mutate the index maps freely.
        let devices = self.devices.clone();
        for device in &devices {
            self.name_to_uuid
                .insert(device.name.clone(), device.uuid.clone());

            let device_node = PathNode {
                name: "Device".to_string(),
                attributes: vec![
                    ("uuid".to_string(), device.uuid.clone()),
                    ("name".to_string(), device.name.clone()),
                ],
            };

            for item in &device.dataitems {
                self.index_item(device, None, &[device_node.clone()], item);
            }
            for component in &device.components {
                self.walk_component(device, &[device_node.clone()], component);
            }
        }
    }

    fn walk_component(&mut self, device: &Device, ancestors: &[PathNode], component: &Component) {
        let mut chain = ancestors.to_vec();
        let mut attrs = vec![("id".to_string(), component.id.clone())];
        if let Some(ref name) = component.name {
            attrs.push(("name".to_string(), name.clone()));
        }
        chain.push(PathNode {
            name: component.component_type.clone(),
            attributes: attrs,
        });

        for item in &component.dataitems {
            self.index_item(device, Some(component), &chain, item);
        }
        for child in &component.components {
            self.walk_component(device, &chain, child);
        }
    }

    fn index_item(
        &mut self,
        device: &Device,
        component: Option<&Component>,
        ancestors: &[PathNode],
        item: &DataItem,
    ) {
        let mut chain = ancestors.to_vec();
        let mut attrs = vec![
            ("id".to_string(), item.id.clone()),
            ("type".to_string(), item.type_name.clone()),
            ("category".to_string(), category_attr(item.category).to_string()),
        ];
        if let Some(ref name) = item.name {
            attrs.push(("name".to_string(), name.clone()));
        }
        if let Some(ref sub) = item.sub_type {
            attrs.push(("subType".to_string(), sub.clone()));
        }
        chain.push(PathNode {
            name: "DataItem".to_string(),
            attributes: attrs,
        });

        let (component_id, component_type, component_name) = match component {
            Some(c) => (c.id.clone(), c.component_type.clone(), c.name.clone()),
            // Device-level dataitems (avail, asset channels) hang off the
            // device element itself.
            None => (device.uuid.clone(), "Device".to_string(), Some(device.name.clone())),
        };

        let entry = ItemEntry {
            item: item.clone(),
            device_uuid: device.uuid.clone(),
            device_name: device.name.clone(),
            component_id,
            component_type,
            component_name,
            chain,
        };

        if let Some(ref wire) = item.name {
            self.wire_names
                .insert((device.uuid.clone(), wire.clone()), item.id.clone());
        }
        self.order.push(item.id.clone());
        self.items.insert(item.id.clone(), entry);
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// Device UUID for a human device name.
    #[must_use]
    pub fn device_uuid_for_name(&self, name: &str) -> Option<&str> {
        self.name_to_uuid.get(name).map(String::as_str)
    }

    /// All device UUIDs in insertion order.
    #[must_use]
    pub fn all_device_uuids(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.uuid.clone()).collect()
    }

    /// All devices in insertion order (probe rendering).
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Device by UUID.
    #[must_use]
    pub fn device(&self, uuid: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.uuid == uuid)
    }

    /// Resolve a SHDR wire name scoped to a device. Case-sensitive.
    #[must_use]
    pub fn resolve_wire_name(&self, uuid: &str, name: &str) -> Option<&ItemEntry> {
        let id = self
            .wire_names
            .get(&(uuid.to_string(), name.to_string()))?;
        self.items.get(id)
    }

    /// Dataitem entry by id.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ItemEntry> {
        self.items.get(id)
    }

    /// The synthetic ASSET_CHANGED / ASSET_REMOVED channel ids for a device.
    #[must_use]
    pub fn asset_channels(&self, uuid: &str) -> Option<(String, String)> {
        let device = self.device(uuid)?;
        Some((
            format!("{}_asset_chg", device.name),
            format!("{}_asset_rem", device.name),
        ))
    }

    /// Dataitem ids in discovery order, optionally restricted to devices.
    #[must_use]
    pub fn all_item_ids(&self, uuids: &[String]) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                uuids.is_empty()
                    || self
                        .items
                        .get(*id)
                        .is_some_and(|e| uuids.iter().any(|u| *u == e.device_uuid))
            })
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Path resolution
    // -----------------------------------------------------------------------

    /// Resolve an XPath-like filter to dataitem ids in discovery order.
    ///
    /// Unknown attribute predicates match nothing; that is an empty result,
    /// not an error.
    pub fn resolve_path(&self, expr: &str, uuids: &[String]) -> Result<Vec<String>> {
        let steps = path::parse_path(expr)?;
        Ok(self.resolve_steps(&steps, uuids))
    }

    /// True iff the path resolves to at least one dataitem.
    pub fn path_validation(&self, expr: &str, uuids: &[String]) -> Result<bool> {
        Ok(!self.resolve_path(expr, uuids)?.is_empty())
    }

    fn resolve_steps(&self, steps: &[PathStep], uuids: &[String]) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                let Some(entry) = self.items.get(*id) else {
                    return false;
                };
                if !uuids.is_empty() && !uuids.iter().any(|u| *u == entry.device_uuid) {
                    return false;
                }
                path::matches_chain(steps, &entry.chain)
            })
            .cloned()
            .collect()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn category_attr(category: Category) -> &'static str {
    match category {
        Category::Sample => "SAMPLE",
        Category::Event => "EVENT",
        Category::Condition => "CONDITION",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
