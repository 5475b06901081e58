// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Asset store.
//!
//! Assets live outside device state: an id-keyed current map (tombstones
//! included) plus a bounded ring of snapshots. Applying a verb returns the
//! synthetic events the ingest sequencer must append to the observation
//! stream, already in the documented order (a remove emits ASSET_REMOVED
//! before any reverting ASSET_CHANGED).

mod tree;

pub use tree::{escape_attr, escape_text, XmlElement, XmlNode};

use std::collections::{HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::shdr::{AssetCommand, UpdatePayload};

/// Asset body: parsed XML, or the raw text when the body did not parse
/// (stored opaquely; later structured updates fail recoverably).
#[derive(Debug, Clone, PartialEq)]
pub enum AssetContent {
    Xml(XmlElement),
    Opaque(String),
}

impl AssetContent {
    /// Serialized XML form for `/assets` responses.
    #[must_use]
    pub fn to_xml(&self) -> String {
        match self {
            AssetContent::Xml(tree) => tree.to_xml(),
            AssetContent::Opaque(text) => escape_text(text),
        }
    }
}

/// One asset record.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub asset_id: String,
    pub asset_type: String,
    pub time: String,
    pub content: AssetContent,
    pub removed: bool,
    /// Asset-series sequence (separate from the observation series).
    pub sequence: u64,
}

/// Synthetic observation the sequencer appends after an asset mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetEvent {
    /// ASSET_CHANGED with the given value (an asset id, or `UNAVAILABLE`
    /// when the most recently changed asset was removed).
    Changed { value: String, time: String },
    /// ASSET_REMOVED with the asset id.
    Removed { asset_id: String, time: String },
}

/// Id-keyed asset map plus bounded snapshot history.
#[derive(Debug)]
pub struct AssetStore {
    current: HashMap<String, Asset>,
    buffer: VecDeque<Asset>,
    capacity: usize,
    /// Next asset-series sequence. Starts at 1.
    next_seq: u64,
    /// Asset id carried by the most recent ASSET_CHANGED.
    last_changed: Option<String>,
}

impl AssetStore {
    /// Create a store with the given snapshot ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            current: HashMap::new(),
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 1,
            last_changed: None,
        }
    }

    /// Apply one asset command, returning the synthetic events to sequence.
    pub fn apply(&mut self, cmd: &AssetCommand) -> Result<Vec<AssetEvent>> {
        match cmd {
            AssetCommand::Add {
                time,
                asset_id,
                asset_type,
                body,
            } => self.apply_add(time, asset_id, asset_type, body),
            AssetCommand::Update {
                time,
                asset_id,
                payload,
            } => self.apply_update(time, asset_id, payload),
            AssetCommand::Remove { time, asset_id } => self.apply_remove(time, asset_id),
            AssetCommand::RemoveAll { time, asset_type } => self.apply_remove_all(time, asset_type),
        }
    }

    fn apply_add(
        &mut self,
        time: &str,
        asset_id: &str,
        asset_type: &str,
        body: &str,
    ) -> Result<Vec<AssetEvent>> {
        let content = match XmlElement::parse(body) {
            Ok(tree) => AssetContent::Xml(tree),
            Err(e) => {
                log::warn!(
                    "[AssetStore::apply_add] Body of asset {} is not XML ({}), storing opaquely",
                    asset_id,
                    e
                );
                AssetContent::Opaque(body.to_string())
            }
        };

        let asset = Asset {
            asset_id: asset_id.to_string(),
            asset_type: asset_type.to_string(),
            time: time.to_string(),
            content,
            removed: false,
            sequence: self.next_seq,
        };
        self.next_seq += 1;

        self.push_snapshot(asset.clone());
        self.current.insert(asset_id.to_string(), asset);
        self.last_changed = Some(asset_id.to_string());

        Ok(vec![AssetEvent::Changed {
            value: asset_id.to_string(),
            time: time.to_string(),
        }])
    }

    fn apply_update(
        &mut self,
        time: &str,
        asset_id: &str,
        payload: &UpdatePayload,
    ) -> Result<Vec<AssetEvent>> {
        let asset = self
            .current
            .get_mut(asset_id)
            .ok_or_else(|| Error::MalformedAsset(format!("update of unknown asset {}", asset_id)))?;

        let AssetContent::Xml(ref mut tree) = asset.content else {
            return Err(Error::MalformedAsset(format!(
                "asset {} holds an opaque body; structured update impossible",
                asset_id
            )));
        };

        match payload {
            UpdatePayload::KeyValues(pairs) => {
                for (element, value) in pairs {
                    if !tree.update_text_first(element, value) {
                        log::warn!(
                            "[AssetStore::apply_update] Asset {} has no element '{}'",
                            asset_id,
                            element
                        );
                    }
                }
            }
            UpdatePayload::Fragment(fragment) => {
                let parsed = XmlElement::parse(fragment)?;
                if tree.name == parsed.name {
                    *tree = parsed;
                } else if !tree.replace_element_first(&parsed) {
                    log::warn!(
                        "[AssetStore::apply_update] Asset {} has no element '{}'",
                        asset_id,
                        parsed.name
                    );
                }
            }
        }

        asset.time = time.to_string();
        asset.sequence = self.next_seq;
        self.next_seq += 1;

        let snapshot = asset.clone();
        self.push_snapshot(snapshot);
        self.last_changed = Some(asset_id.to_string());

        Ok(vec![AssetEvent::Changed {
            value: asset_id.to_string(),
            time: time.to_string(),
        }])
    }

    fn apply_remove(&mut self, time: &str, asset_id: &str) -> Result<Vec<AssetEvent>> {
        let asset = self
            .current
            .get_mut(asset_id)
            .ok_or_else(|| Error::MalformedAsset(format!("remove of unknown asset {}", asset_id)))?;
        if asset.removed {
            return Err(Error::MalformedAsset(format!(
                "asset {} already removed",
                asset_id
            )));
        }

        asset.removed = true;
        asset.time = time.to_string();

        // Reflect the tombstone on the newest retained snapshot.
        if let Some(snapshot) = self
            .buffer
            .iter_mut()
            .rev()
            .find(|a| a.asset_id == asset_id)
        {
            snapshot.removed = true;
            snapshot.time = time.to_string();
        }

        let mut events = vec![AssetEvent::Removed {
            asset_id: asset_id.to_string(),
            time: time.to_string(),
        }];

        if self.last_changed.as_deref() == Some(asset_id) {
            self.last_changed = None;
            events.push(AssetEvent::Changed {
                value: "UNAVAILABLE".to_string(),
                time: time.to_string(),
            });
        }

        Ok(events)
    }

    fn apply_remove_all(&mut self, time: &str, asset_type: &str) -> Result<Vec<AssetEvent>> {
        let mut ids: Vec<(u64, String)> = self
            .current
            .values()
            .filter(|a| !a.removed && a.asset_type == asset_type)
            .map(|a| (a.sequence, a.asset_id.clone()))
            .collect();
        // Creation order.
        ids.sort_by_key(|(seq, _)| *seq);

        let mut events = Vec::new();
        for (_, id) in ids {
            events.extend(self.apply_remove(time, &id)?);
        }
        Ok(events)
    }

    fn push_snapshot(&mut self, asset: Asset) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(asset);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Latest record for an asset id (tombstones included).
    #[must_use]
    pub fn current(&self, asset_id: &str) -> Option<&Asset> {
        self.current.get(asset_id)
    }

    /// Retained snapshots oldest-first, optionally filtered by type.
    #[must_use]
    pub fn snapshots(&self, asset_type: Option<&str>) -> Vec<&Asset> {
        self.buffer
            .iter()
            .filter(|a| asset_type.is_none_or(|t| a.asset_type == t))
            .collect()
    }

    /// Live (non-removed) asset count.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.current.values().filter(|a| !a.removed).count()
    }

    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
