// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SHDR line tokenizer.
//!
//! Field consumption is registry-driven: the dataitem named by each field
//! decides how many following fields belong to it (CONDITION 5, MESSAGE 2,
//! ALARM 5, TIME_SERIES rest-of-line, scalar 1). Unknown names are skipped
//! pairwise with a warning; parser errors never bring down ingest.

use std::sync::{Arc, RwLock};

use super::{AssetCommand, Parsed, ParsedLine, Sample, UpdatePayload};
use crate::error::{Error, Result};
use crate::schema::{Category, DeviceRegistry, Representation};
use crate::store::{ConditionLevel, ConditionValue, Value};
use crate::time::now_iso8601;

/// Sentinel prefix opening and closing a multi-line asset body.
const MULTILINE_MARKER: &str = "--multiline--";

struct MultilineState {
    token: String,
    time: String,
    asset_id: String,
    asset_type: String,
    buffer: Vec<String>,
}

/// Per-adapter-stream SHDR parser.
pub struct ShdrParser {
    registry: Arc<RwLock<DeviceRegistry>>,
    device_uuid: String,
    multiline: Option<MultilineState>,
}

impl ShdrParser {
    #[must_use]
    pub fn new(registry: Arc<RwLock<DeviceRegistry>>, device_uuid: impl Into<String>) -> Self {
        Self {
            registry,
            device_uuid: device_uuid.into(),
            multiline: None,
        }
    }

    /// Device this parser is scoped to.
    #[must_use]
    pub fn device_uuid(&self) -> &str {
        &self.device_uuid
    }

    /// Discard any buffered multi-line asset body (stream reset).
    ///
    /// Called when the adapter connection drops mid-body; the partial buffer
    /// must not leak into the next connection.
    pub fn reset(&mut self) {
        if let Some(state) = self.multiline.take() {
            log::warn!(
                "[ShdrParser::reset] Discarding {} buffered line(s) of asset {}",
                state.buffer.len(),
                state.asset_id
            );
        }
    }

    /// Consume one raw line.
    pub fn parse(&mut self, line: &str) -> Result<Parsed> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(state) = self.multiline.as_mut() {
            if line != format!("{}{}", MULTILINE_MARKER, state.token) {
                state.buffer.push(line.to_string());
                return Ok(Parsed::Pending);
            }
        }
        if let Some(state) = self.multiline.take() {
            // Closing sentinel seen; the buffered block becomes the body.
            return Ok(Parsed::Asset(AssetCommand::Add {
                time: state.time,
                asset_id: state.asset_id,
                asset_type: state.asset_type,
                body: state.buffer.join("\n"),
            }));
        }

        if line.is_empty() {
            return Ok(Parsed::Skip);
        }

        let fields: Vec<&str> = line.split('|').collect();
        let (time, start) = Self::take_timestamp(&fields);

        if start >= fields.len() {
            return Ok(Parsed::Skip);
        }

        if fields[start].starts_with('@') {
            return self.parse_asset_command(&time, &fields, start);
        }

        self.parse_observations(&time, &fields, start)
    }

    /// Timestamp heuristic: ISO-8601 (four digits then '-') and relative
    /// decimal timestamps pass through verbatim; anything else, including an
    /// empty leading field, substitutes the current wall time.
    fn take_timestamp(fields: &[&str]) -> (String, usize) {
        let first = fields[0];
        if looks_like_iso8601(first) || looks_like_relative(first) {
            return (first.to_string(), 1);
        }
        if first.is_empty() {
            return (now_iso8601(), 1);
        }
        (now_iso8601(), 0)
    }

    // -----------------------------------------------------------------------
    // Observations
    // -----------------------------------------------------------------------

    fn parse_observations(&self, time: &str, fields: &[&str], start: usize) -> Result<Parsed> {
        let registry = match self.registry.read() {
            Ok(lock) => lock,
            Err(e) => {
                log::debug!("[ShdrParser::parse_observations] registry lock poisoned, recovering");
                e.into_inner()
            }
        };

        let mut samples = Vec::new();
        let mut i = start;
        while i < fields.len() {
            let name = fields[i];
            if name.is_empty() {
                i += 1;
                continue;
            }

            let Some(entry) = registry.resolve_wire_name(&self.device_uuid, name) else {
                log::warn!(
                    "[ShdrParser::parse_observations] Unknown dataitem '{}' on device {}, skipping",
                    name,
                    self.device_uuid
                );
                i += 2;
                continue;
            };

            let id = entry.item.id.clone();
            if entry.item.category == Category::Condition {
                let value = Self::condition_value(fields, i)?;
                samples.push(Sample {
                    data_item_id: id,
                    name: name.to_string(),
                    value,
                });
                i += 6;
            } else if entry.item.representation == Representation::TimeSeries {
                let sample_count = field_or_empty(fields, i + 1);
                let sample_rate = field_or_empty(fields, i + 2);
                let samples_str = if i + 3 < fields.len() {
                    fields[i + 3..].join("|")
                } else {
                    String::new()
                };
                samples.push(Sample {
                    data_item_id: id,
                    name: name.to_string(),
                    value: Value::TimeSeries {
                        sample_count,
                        sample_rate,
                        samples: samples_str,
                    },
                });
                // TIME_SERIES consumes the remainder of the line.
                break;
            } else if entry.item.type_name == "MESSAGE" {
                samples.push(Sample {
                    data_item_id: id,
                    name: name.to_string(),
                    value: Value::Message {
                        native_code: field_or_empty(fields, i + 1),
                        text: field_or_empty(fields, i + 2),
                    },
                });
                i += 3;
            } else if entry.item.type_name == "ALARM" {
                samples.push(Sample {
                    data_item_id: id,
                    name: name.to_string(),
                    value: Value::Alarm {
                        code: field_or_empty(fields, i + 1),
                        native_code: field_or_empty(fields, i + 2),
                        severity: field_or_empty(fields, i + 3),
                        state: field_or_empty(fields, i + 4),
                        text: field_or_empty(fields, i + 5),
                    },
                });
                i += 6;
            } else {
                samples.push(Sample {
                    data_item_id: id,
                    name: name.to_string(),
                    value: Value::Scalar(field_or_empty(fields, i + 1)),
                });
                i += 2;
            }
        }

        if samples.is_empty() {
            return Ok(Parsed::Skip);
        }
        Ok(Parsed::Observations(ParsedLine {
            time: time.to_string(),
            samples,
        }))
    }

    fn condition_value(fields: &[&str], i: usize) -> Result<Value> {
        let level_field = field_or_empty(fields, i + 1);
        let level = ConditionLevel::parse(&level_field).ok_or_else(|| {
            Error::MalformedLine(format!(
                "condition level '{}' for '{}' is not NORMAL/WARNING/FAULT/UNAVAILABLE",
                level_field, fields[i]
            ))
        })?;
        Ok(Value::Condition(ConditionValue {
            level,
            native_code: field_or_empty(fields, i + 2),
            native_severity: field_or_empty(fields, i + 3),
            qualifier: field_or_empty(fields, i + 4),
            message: field_or_empty(fields, i + 5),
        }))
    }

    // -----------------------------------------------------------------------
    // Asset commands
    // -----------------------------------------------------------------------

    fn parse_asset_command(&mut self, time: &str, fields: &[&str], start: usize) -> Result<Parsed> {
        let verb = fields[start];
        match verb {
            "@ASSET@" => {
                let asset_id = required_field(fields, start + 1, verb)?;
                let asset_type = required_field(fields, start + 2, verb)?;
                let body = if start + 3 < fields.len() {
                    fields[start + 3..].join("|")
                } else {
                    String::new()
                };

                if let Some(token) = body.strip_prefix(MULTILINE_MARKER) {
                    self.multiline = Some(MultilineState {
                        token: token.trim().to_string(),
                        time: time.to_string(),
                        asset_id,
                        asset_type,
                        buffer: Vec::new(),
                    });
                    return Ok(Parsed::Pending);
                }

                Ok(Parsed::Asset(AssetCommand::Add {
                    time: time.to_string(),
                    asset_id,
                    asset_type,
                    body,
                }))
            }
            "@UPDATE_ASSET@" => {
                let asset_id = required_field(fields, start + 1, verb)?;
                let rest = &fields[start + 2..];
                if rest.is_empty() {
                    return Err(Error::MalformedAsset(format!(
                        "{} {} carries no payload",
                        verb, asset_id
                    )));
                }
                let payload = if rest[0].trim_start().starts_with('<') {
                    UpdatePayload::Fragment(rest.join("|"))
                } else {
                    if rest.len() % 2 != 0 {
                        return Err(Error::MalformedAsset(format!(
                            "{} {} has an odd key/value field count",
                            verb, asset_id
                        )));
                    }
                    UpdatePayload::KeyValues(
                        rest.chunks(2)
                            .map(|kv| (kv[0].to_string(), kv[1].to_string()))
                            .collect(),
                    )
                };
                Ok(Parsed::Asset(AssetCommand::Update {
                    time: time.to_string(),
                    asset_id,
                    payload,
                }))
            }
            "@REMOVE_ASSET@" => {
                let asset_id = required_field(fields, start + 1, verb)?;
                Ok(Parsed::Asset(AssetCommand::Remove {
                    time: time.to_string(),
                    asset_id,
                }))
            }
            "@REMOVE_ALL_ASSETS@" => {
                let asset_type = required_field(fields, start + 1, verb)?;
                Ok(Parsed::Asset(AssetCommand::RemoveAll {
                    time: time.to_string(),
                    asset_type,
                }))
            }
            other => Err(Error::MalformedLine(format!(
                "unknown command verb '{}'",
                other
            ))),
        }
    }
}

fn field_or_empty(fields: &[&str], i: usize) -> String {
    fields.get(i).map(|s| (*s).to_string()).unwrap_or_default()
}

fn required_field(fields: &[&str], i: usize, verb: &str) -> Result<String> {
    match fields.get(i) {
        Some(f) if !f.is_empty() => Ok((*f).to_string()),
        _ => Err(Error::MalformedAsset(format!(
            "{} is missing field {}",
            verb,
            i + 1
        ))),
    }
}

/// Four ASCII digits followed by '-'.
fn looks_like_iso8601(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() > 4 && bytes[..4].iter().all(u8::is_ascii_digit) && bytes[4] == b'-'
}

/// A bare decimal number, used as a relative timestamp.
fn looks_like_relative(s: &str) -> bool {
    !s.is_empty() && s.parse::<f64>().is_ok() && !looks_like_iso8601(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
