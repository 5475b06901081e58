// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Agent lifecycle.
//!
//! `Agent::start` wires the pipeline together: device descriptions are
//! validated and inserted (fatal on rejection), stores are constructed, the
//! ingest sequencer and adapter readers spawn, and the HTTP listener binds
//! (fatal on failure). `Agent::stop` unwinds in the opposite order: adapters
//! stop feeding, the ingest queue drains, the listener closes, threads join.

use std::sync::{Arc, RwLock};

use crossbeam_channel::Sender;

use crate::asset::AssetStore;
use crate::config::{AgentConfig, DeviceConfig};
use crate::error::{Error, Result};
use crate::http::HttpServer;
use crate::ingest::{AdapterClient, IngestMessage, IngestSequencer};
use crate::query::QueryEngine;
use crate::schema::{validate, DeviceRegistry};
use crate::store::ObservationStore;

/// A running agent.
#[derive(Debug)]
pub struct Agent {
    registry: Arc<RwLock<DeviceRegistry>>,
    store: Arc<RwLock<ObservationStore>>,
    assets: Arc<RwLock<AssetStore>>,
    engine: Arc<QueryEngine>,
    sequencer: IngestSequencer,
    adapters: Vec<AdapterClient>,
    http: HttpServer,
}

impl Agent {
    /// Start an agent from configuration. Schema rejection and bind failure
    /// abort startup.
    pub fn start(config: &AgentConfig) -> Result<Agent> {
        let mut registry = DeviceRegistry::new();
        let mut adapter_bindings: Vec<(String, crate::config::AdapterConfig)> = Vec::new();

        for device in &config.devices {
            let uuids = Self::load_device(&mut registry, device, config.validator.as_deref())?;
            if let Some(ref adapter) = device.adapter {
                for uuid in &uuids {
                    adapter_bindings.push((uuid.clone(), adapter.clone()));
                }
            }
        }

        let registry = Arc::new(RwLock::new(registry));
        let store = Arc::new(RwLock::new(ObservationStore::new(config.buffer_capacity)));
        let assets = Arc::new(RwLock::new(AssetStore::new(config.asset_capacity)));

        let engine = Arc::new(QueryEngine::new(
            registry.clone(),
            store.clone(),
            assets.clone(),
            config.sender.clone(),
        ));

        let sequencer = IngestSequencer::start(registry.clone(), store.clone(), assets.clone());

        let adapters = adapter_bindings
            .into_iter()
            .map(|(uuid, adapter)| {
                AdapterClient::start(adapter.host, adapter.port, uuid, sequencer.sender())
            })
            .collect();

        let http = HttpServer::bind(&config.bind, config.port, engine.clone())?;

        log::info!(
            "[Agent] Started on port {} with {} device(s)",
            http.port(),
            config.devices.len()
        );

        Ok(Agent {
            registry,
            store,
            assets,
            engine,
            sequencer,
            adapters,
            http,
        })
    }

    fn load_device(
        registry: &mut DeviceRegistry,
        device: &DeviceConfig,
        validator: Option<&str>,
    ) -> Result<Vec<String>> {
        if let Some(ref xml_path) = device.xml {
            let xml = std::fs::read_to_string(xml_path).map_err(|e| {
                Error::SchemaRejected(format!("{}: {}", xml_path.display(), e))
            })?;
            let version = validate::validate_device_xml(&xml, validator)?;
            log::info!(
                "[Agent] Device XML {} accepted (schema version {})",
                xml_path.display(),
                version
            );
        }

        let json = std::fs::read_to_string(&device.schema)
            .map_err(|e| Error::SchemaParse(format!("{}: {}", device.schema.display(), e)))?;
        registry.insert_schema(&json)
    }

    /// Bound HTTP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.http.port()
    }

    /// Producer endpoint for injecting SHDR lines (tests, local tools).
    #[must_use]
    pub fn ingest_sender(&self) -> Sender<IngestMessage> {
        self.sequencer.sender()
    }

    /// Read-side query facade.
    #[must_use]
    pub fn engine(&self) -> &Arc<QueryEngine> {
        &self.engine
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RwLock<DeviceRegistry>> {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &Arc<RwLock<ObservationStore>> {
        &self.store
    }

    #[must_use]
    pub fn assets(&self) -> &Arc<RwLock<AssetStore>> {
        &self.assets
    }

    /// Graceful stop: adapters first, then the sequencer drains the queue,
    /// then the HTTP listener closes. In-flight responses complete.
    pub fn stop(mut self) {
        for adapter in &mut self.adapters {
            adapter.stop();
        }
        self.sequencer.stop();
        self.http.stop();
        log::info!("[Agent] Stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
