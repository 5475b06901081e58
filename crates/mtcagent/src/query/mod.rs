// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query engine: evaluates the path filter against the registry, reads the
//! stores under read locks, and renders MTConnect documents.
//!
//! Handlers are readers only; every mutation goes through the ingest
//! sequencer. Reads take a snapshot under the lock and render outside it
//! where possible.

pub mod xml;

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::asset::AssetStore;
use crate::error::{Error, Result};
use crate::schema::{Category, DeviceRegistry, ItemEntry, Representation};
use crate::store::{Observation, ObservationStore};
use xml::{ComponentBlock, DeviceBlock, HeaderInfo, RenderedItem};

/// Read-side facade over registry + stores.
#[derive(Debug)]
pub struct QueryEngine {
    registry: Arc<RwLock<DeviceRegistry>>,
    store: Arc<RwLock<ObservationStore>>,
    assets: Arc<RwLock<AssetStore>>,
    sender: String,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        registry: Arc<RwLock<DeviceRegistry>>,
        store: Arc<RwLock<ObservationStore>>,
        assets: Arc<RwLock<AssetStore>>,
        sender: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            assets,
            sender: sender.into(),
        }
    }

    // -----------------------------------------------------------------------
    // /probe
    // -----------------------------------------------------------------------

    /// Device schema tree, no observation values.
    pub fn probe(&self, device: Option<&str>) -> Result<String> {
        let registry = read_lock(&self.registry, "QueryEngine::probe registry");
        let store = read_lock(&self.store, "QueryEngine::probe store");

        let devices: Vec<_> = match device {
            Some(name) => {
                let uuid = registry
                    .device_uuid_for_name(name)
                    .map(str::to_string)
                    .or_else(|| registry.device(name).map(|d| d.uuid.clone()))
                    .ok_or_else(|| Error::NoDevice(name.to_string()))?;
                registry
                    .devices()
                    .iter()
                    .filter(|d| d.uuid == uuid)
                    .collect()
            }
            None => registry.devices().iter().collect(),
        };

        let header = HeaderInfo {
            sender: &self.sender,
            instance_id: store.instance_id(),
            buffer_size: store.capacity(),
        };
        Ok(xml::devices_document(&header, &devices))
    }

    // -----------------------------------------------------------------------
    // /current
    // -----------------------------------------------------------------------

    /// Latest observation per matched dataitem; `at` reconstructs state at a
    /// historic sequence from the ring.
    pub fn current(&self, path: Option<&str>, at: Option<u64>) -> Result<String> {
        let registry = read_lock(&self.registry, "QueryEngine::current registry");
        let store = read_lock(&self.store, "QueryEngine::current store");

        let ids = self.matched_ids(&registry, path)?;

        let observations: Vec<Arc<Observation>> = match at {
            Some(seq) => store.snapshot_at(&ids, seq)?,
            None => {
                // Live current: CONDITION dataitems expand to their active
                // set so multi-status channels render every active entry.
                let mut out = Vec::new();
                for id in &ids {
                    let Some(entry) = registry.item(id) else {
                        continue;
                    };
                    if entry.item.category == Category::Condition {
                        out.extend(store.active_conditions(id).iter().cloned());
                    } else if let Some(obs) = store.current(id) {
                        out.push(obs.clone());
                    }
                }
                out
            }
        };

        let blocks = group_blocks(&registry, &observations);
        let header = HeaderInfo {
            sender: &self.sender,
            instance_id: store.instance_id(),
            buffer_size: store.capacity(),
        };
        Ok(xml::streams_document(&header, store.sequence_info(), &blocks))
    }

    // -----------------------------------------------------------------------
    // /sample
    // -----------------------------------------------------------------------

    /// Sequence window over the ring restricted to the matched dataitems.
    pub fn sample(
        &self,
        path: Option<&str>,
        from: Option<u64>,
        count: Option<usize>,
    ) -> Result<String> {
        let registry = read_lock(&self.registry, "QueryEngine::sample registry");
        let store = read_lock(&self.store, "QueryEngine::sample store");

        let ids = self.matched_ids(&registry, path)?;
        let id_set: HashSet<String> = ids.iter().cloned().collect();

        let info = store.sequence_info();
        let from = from.unwrap_or(info.first);
        let count = count.unwrap_or(crate::config::DEFAULT_SAMPLE_COUNT);

        let observations = store.sample_window(Some(&id_set), from, count)?;

        let blocks = group_blocks(&registry, &observations);
        let header = HeaderInfo {
            sender: &self.sender,
            instance_id: store.instance_id(),
            buffer_size: store.capacity(),
        };
        Ok(xml::streams_document(&header, store.sequence_info(), &blocks))
    }

    // -----------------------------------------------------------------------
    // /assets
    // -----------------------------------------------------------------------

    /// Serialize retained asset snapshots, newest last.
    pub fn assets(&self, asset_type: Option<&str>, count: Option<usize>) -> Result<String> {
        let store = read_lock(&self.store, "QueryEngine::assets store");
        let assets = read_lock(&self.assets, "QueryEngine::assets assets");

        let mut snapshots = assets.snapshots(asset_type);
        if let Some(limit) = count {
            // Newest snapshots win when the client bounds the response.
            let skip = snapshots.len().saturating_sub(limit);
            snapshots.drain(..skip);
        }

        let header = HeaderInfo {
            sender: &self.sender,
            instance_id: store.instance_id(),
            buffer_size: store.capacity(),
        };
        Ok(xml::assets_document(
            &header,
            assets.capacity(),
            assets.live_count(),
            &snapshots,
        ))
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    /// Render a client-facing error document.
    #[must_use]
    pub fn error_response(&self, err: &Error) -> String {
        let store = read_lock(&self.store, "QueryEngine::error_response store");
        let header = HeaderInfo {
            sender: &self.sender,
            instance_id: store.instance_id(),
            buffer_size: store.capacity(),
        };
        let code = err.error_code().unwrap_or("INTERNAL_ERROR");
        xml::error_document(&header, code, &err.to_string())
    }

    fn matched_ids(&self, registry: &DeviceRegistry, path: Option<&str>) -> Result<Vec<String>> {
        match path {
            Some(expr) => registry.resolve_path(expr, &[]),
            None => Ok(registry.all_item_ids(&[])),
        }
    }
}

/// Group observations device -> component, preserving first-appearance order.
fn group_blocks(registry: &DeviceRegistry, observations: &[Arc<Observation>]) -> Vec<DeviceBlock> {
    let mut blocks: Vec<DeviceBlock> = Vec::new();

    for obs in observations {
        let Some(entry) = registry.item(&obs.data_item_id) else {
            log::debug!(
                "[query::group_blocks] Observation for unindexed dataitem {}",
                obs.data_item_id
            );
            continue;
        };

        let device_block = match blocks
            .iter_mut()
            .position(|b| b.device_uuid == entry.device_uuid)
        {
            Some(idx) => &mut blocks[idx],
            None => {
                blocks.push(DeviceBlock {
                    device_name: entry.device_name.clone(),
                    device_uuid: entry.device_uuid.clone(),
                    components: Vec::new(),
                });
                let last = blocks.len() - 1;
                &mut blocks[last]
            }
        };

        let component_block = match device_block
            .components
            .iter_mut()
            .position(|c| c.component_id == entry.component_id)
        {
            Some(idx) => &mut device_block.components[idx],
            None => {
                device_block.components.push(ComponentBlock {
                    component_type: entry.component_type.clone(),
                    component_id: entry.component_id.clone(),
                    component_name: entry.component_name.clone(),
                    samples: Vec::new(),
                    events: Vec::new(),
                    conditions: Vec::new(),
                });
                let last = device_block.components.len() - 1;
                &mut device_block.components[last]
            }
        };

        let rendered = rendered_item(entry, obs.clone());
        match entry.item.category {
            Category::Sample => component_block.samples.push(rendered),
            Category::Event => component_block.events.push(rendered),
            Category::Condition => component_block.conditions.push(rendered),
        }
    }

    blocks
}

fn rendered_item(entry: &ItemEntry, obs: Arc<Observation>) -> RenderedItem {
    RenderedItem {
        obs,
        type_name: entry.item.type_name.clone(),
        sub_type: entry.item.sub_type.clone(),
        category: entry.item.category,
        time_series: entry.item.representation == Representation::TimeSeries,
    }
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> std::sync::RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(e) => {
            log::debug!("[{}] lock poisoned, recovering", what);
            e.into_inner()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
