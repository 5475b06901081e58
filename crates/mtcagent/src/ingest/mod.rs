// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingest sequencer.
//!
//! All parser output funnels through one consumer thread that assigns
//! sequence numbers and performs every store mutation, so the hash maps and
//! the ring need no per-field locking. Observations from one SHDR line get
//! consecutive sequences in field order; synthetic asset events are
//! sequenced after the mutation that caused them.

mod adapter;

pub use adapter::AdapterClient;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::asset::{AssetEvent, AssetStore};
use crate::schema::DeviceRegistry;
use crate::shdr::{Parsed, ShdrParser};
use crate::store::{ObservationStore, Value};

/// Ingest queue depth. Adapters block briefly when the sequencer lags.
const QUEUE_DEPTH: usize = 4_096;

/// Messages from adapter readers to the sequencer.
#[derive(Debug, Clone)]
pub enum IngestMessage {
    /// One raw SHDR line from a device's adapter.
    Line { device_uuid: String, line: String },
    /// The adapter stream restarted; per-stream parser state is discarded.
    StreamReset { device_uuid: String },
}

/// Synchronous ingest core: parsers keyed by device, applying parse results
/// to the stores. The sequencer thread drives one of these; tests can drive
/// it directly.
pub struct Pipeline {
    registry: Arc<RwLock<DeviceRegistry>>,
    store: Arc<RwLock<ObservationStore>>,
    assets: Arc<RwLock<AssetStore>>,
    parsers: HashMap<String, ShdrParser>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        registry: Arc<RwLock<DeviceRegistry>>,
        store: Arc<RwLock<ObservationStore>>,
        assets: Arc<RwLock<AssetStore>>,
    ) -> Self {
        Self {
            registry,
            store,
            assets,
            parsers: HashMap::new(),
        }
    }

    /// Apply one message. Parser errors are recoverable: logged, line dropped.
    pub fn apply(&mut self, msg: IngestMessage) {
        match msg {
            IngestMessage::Line { device_uuid, line } => self.apply_line(&device_uuid, &line),
            IngestMessage::StreamReset { device_uuid } => {
                if let Some(parser) = self.parsers.get_mut(&device_uuid) {
                    parser.reset();
                }
            }
        }
    }

    fn apply_line(&mut self, device_uuid: &str, line: &str) {
        let registry = self.registry.clone();
        let parser = self
            .parsers
            .entry(device_uuid.to_string())
            .or_insert_with(|| ShdrParser::new(registry, device_uuid));

        let parsed = match parser.parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("[Pipeline::apply_line] Dropping line from {}: {}", device_uuid, e);
                return;
            }
        };

        match parsed {
            Parsed::Observations(parsed_line) => {
                let mut store = write_lock(&self.store, "Pipeline store");
                for sample in &parsed_line.samples {
                    store.update(
                        &sample.data_item_id,
                        &sample.name,
                        &parsed_line.time,
                        sample.value.clone(),
                    );
                }
            }
            Parsed::Asset(cmd) => {
                let events = {
                    let mut assets = write_lock(&self.assets, "Pipeline assets");
                    match assets.apply(&cmd) {
                        Ok(events) => events,
                        Err(e) => {
                            log::warn!(
                                "[Pipeline::apply_line] Asset command from {} failed: {}",
                                device_uuid,
                                e
                            );
                            return;
                        }
                    }
                };
                self.sequence_asset_events(device_uuid, &events);
            }
            Parsed::Pending | Parsed::Skip => {}
        }
    }

    /// Append ASSET_CHANGED / ASSET_REMOVED observations against the
    /// device's synthetic channels, in event order.
    fn sequence_asset_events(&self, device_uuid: &str, events: &[AssetEvent]) {
        let (chg_id, rem_id) = {
            let registry = match self.registry.read() {
                Ok(lock) => lock,
                Err(e) => {
                    log::debug!("[Pipeline::sequence_asset_events] registry lock poisoned, recovering");
                    e.into_inner()
                }
            };
            match registry.asset_channels(device_uuid) {
                Some(ids) => ids,
                None => {
                    log::warn!(
                        "[Pipeline::sequence_asset_events] No asset channels for device {}",
                        device_uuid
                    );
                    return;
                }
            }
        };

        // Discrete channels: every command surfaces, repeats included.
        let mut store = write_lock(&self.store, "Pipeline store");
        for event in events {
            match event {
                AssetEvent::Changed { value, time } => {
                    store.update_discrete(&chg_id, "", time, Value::Scalar(value.clone()));
                }
                AssetEvent::Removed { asset_id, time } => {
                    store.update_discrete(&rem_id, "", time, Value::Scalar(asset_id.clone()));
                }
            }
        }
    }
}

/// Channel-fed sequencer thread wrapping a [`Pipeline`].
#[derive(Debug)]
pub struct IngestSequencer {
    sender: Sender<IngestMessage>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IngestSequencer {
    /// Spawn the sequencer thread.
    #[must_use]
    pub fn start(
        registry: Arc<RwLock<DeviceRegistry>>,
        store: Arc<RwLock<ObservationStore>>,
        assets: Arc<RwLock<AssetStore>>,
    ) -> Self {
        let (sender, receiver) = bounded(QUEUE_DEPTH);
        let shutdown = Arc::new(AtomicBool::new(false));

        let pipeline = Pipeline::new(registry, store, assets);
        let shutdown_flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name("ingest-sequencer".to_string())
            .spawn(move || run_sequencer(pipeline, receiver, shutdown_flag))
            .ok();

        Self {
            sender,
            shutdown,
            handle,
        }
    }

    /// Producer endpoint for adapter readers.
    #[must_use]
    pub fn sender(&self) -> Sender<IngestMessage> {
        self.sender.clone()
    }

    /// Stop: no new lines are accepted, the queue drains, the thread joins.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for IngestSequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_sequencer(
    mut pipeline: Pipeline,
    receiver: Receiver<IngestMessage>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(msg) => pipeline.apply(msg),
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Drain whatever queued before shutdown was observed.
    while let Ok(msg) = receiver.try_recv() {
        pipeline.apply(msg);
    }
    log::info!("[IngestSequencer] Drained and stopped");
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, what: &str) -> std::sync::RwLockWriteGuard<'a, T> {
    match lock.write() {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;

    const SCHEMA: &str = r#"{
      "devices": [{
        "uuid": "000",
        "name": "dev",
        "dataitems": [
          {"id": "avail", "name": "avail", "type": "AVAILABILITY", "category": "EVENT"},
          {"id": "xpos", "name": "Xpos", "type": "POSITION", "category": "SAMPLE"}
        ]
      }]
    }"#;

    fn pipeline() -> Pipeline {
        let mut registry = DeviceRegistry::new();
        registry.insert_schema(SCHEMA).expect("schema inserts");
        Pipeline::new(
            Arc::new(RwLock::new(registry)),
            Arc::new(RwLock::new(ObservationStore::new(64))),
            Arc::new(RwLock::new(AssetStore::new(8))),
        )
    }

    fn line(pipeline: &mut Pipeline, text: &str) {
        pipeline.apply(IngestMessage::Line {
            device_uuid: "000".to_string(),
            line: text.to_string(),
        });
    }

    #[test]
    fn one_line_assigns_consecutive_sequences() {
        let mut p = pipeline();
        line(&mut p, "2014-08-11T08:32:54.028533Z|avail|AVAILABLE|Xpos|12.5");

        let store = p.store.read().expect("store lock");
        let avail = store.current("avail").expect("avail recorded");
        let xpos = store.current("xpos").expect("xpos recorded");
        assert_eq!(avail.sequence, 1);
        assert_eq!(xpos.sequence, 2);
        assert_eq!(avail.time, xpos.time);
    }

    #[test]
    fn malformed_line_never_kills_ingest() {
        let mut p = pipeline();
        line(&mut p, "2014-08-11T08:32:54.028533Z|@BOGUS@|x");
        line(&mut p, "2014-08-11T08:32:55.000000Z|avail|AVAILABLE");

        let store = p.store.read().expect("store lock");
        assert!(store.current("avail").is_some());
    }

    #[test]
    fn asset_lifecycle_emits_synthetic_events() {
        let mut p = pipeline();
        line(
            &mut p,
            "2012-02-21T10:01:15Z|@ASSET@|EM233|CuttingTool|<CuttingTool><ToolLife>240</ToolLife></CuttingTool>",
        );

        {
            let store = p.store.read().expect("store lock");
            let chg = store.current("dev_asset_chg").expect("ASSET_CHANGED emitted");
            assert_eq!(chg.value, Value::Scalar("EM233".into()));
            assert_eq!(chg.time, "2012-02-21T10:01:15Z");
        }

        line(&mut p, "2012-02-21T10:05:00Z|@REMOVE_ASSET@|EM233");

        let store = p.store.read().expect("store lock");
        let rem = store.current("dev_asset_rem").expect("ASSET_REMOVED emitted");
        assert_eq!(rem.value, Value::Scalar("EM233".into()));
        // The removed asset was the most recently changed one, so the
        // changed channel reverts.
        let chg = store.current("dev_asset_chg").expect("reverted");
        assert_eq!(chg.value, Value::Scalar("UNAVAILABLE".into()));

        // ASSET_REMOVED sequenced before the reverting ASSET_CHANGED.
        assert!(rem.sequence < chg.sequence);
    }

    #[test]
    fn update_asset_keeps_changed_current() {
        let mut p = pipeline();
        line(
            &mut p,
            "2012-02-21T10:01:15Z|@ASSET@|EM233|CuttingTool|<CuttingTool><ToolLife>240</ToolLife></CuttingTool>",
        );
        line(
            &mut p,
            "2012-02-21T10:02:00Z|@UPDATE_ASSET@|EM233|ToolLife|120",
        );

        let store = p.store.read().expect("store lock");
        let chg = store.current("dev_asset_chg").expect("current");
        assert_eq!(chg.value, Value::Scalar("EM233".into()));

        let assets = p.assets.read().expect("assets lock");
        assert_eq!(assets.snapshot_count(), 2);
        let snapshots = assets.snapshots(None);
        assert_eq!(snapshots[1].time, "2012-02-21T10:02:00Z");
    }

    #[test]
    fn remove_all_events_in_creation_order() {
        let mut p = pipeline();
        line(&mut p, "2012-02-21T10:01:15Z|@ASSET@|A|CuttingTool|<CuttingTool/>");
        line(&mut p, "2012-02-21T10:01:16Z|@ASSET@|B|CuttingTool|<CuttingTool/>");
        line(&mut p, "2012-02-21T10:02:00Z|@REMOVE_ALL_ASSETS@|CuttingTool");

        let store = p.store.read().expect("store lock");
        // Removals for A then B, then one reverting ASSET_CHANGED.
        let window = store
            .sample_window(None, 1, 100)
            .expect("window in range");
        let rem_values: Vec<String> = window
            .iter()
            .filter(|o| o.data_item_id == "dev_asset_rem")
            .map(|o| match &o.value {
                Value::Scalar(s) => s.clone(),
                other => panic!("unexpected value {:?}", other),
            })
            .collect();
        assert_eq!(rem_values, vec!["A".to_string(), "B".to_string()]);

        let chg = store.current("dev_asset_chg").expect("current");
        assert_eq!(chg.value, Value::Scalar("UNAVAILABLE".into()));
    }

    #[test]
    fn sequencer_thread_drains_on_stop() {
        let mut registry = DeviceRegistry::new();
        registry.insert_schema(SCHEMA).expect("schema inserts");
        let registry = Arc::new(RwLock::new(registry));
        let store = Arc::new(RwLock::new(ObservationStore::new(64)));
        let assets = Arc::new(RwLock::new(AssetStore::new(8)));

        let mut sequencer = IngestSequencer::start(registry, store.clone(), assets);
        let sender = sequencer.sender();
        for i in 0..10 {
            sender
                .send(IngestMessage::Line {
                    device_uuid: "000".to_string(),
                    line: format!("2014-08-11T08:32:54.028533Z|Xpos|{}", i),
                })
                .expect("queue accepts");
        }
        sequencer.stop();

        let store = store.read().expect("store lock");
        let xpos = store.current("xpos").expect("drained before stop");
        assert_eq!(xpos.value, Value::Scalar("9".into()));
    }
}
