// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MTConnect response document rendering.
//!
//! Documents are rendered by hand into strings (serde-free), with escaping
//! applied at every text and attribute boundary.

use std::fmt::Write as _;

use crate::asset::{escape_attr, escape_text, Asset};
use crate::config::MTCONNECT_VERSION;
use crate::schema::{Category, Component, DataItem, Device, Representation};
use crate::store::{Observation, SequenceInfo, Value};
use crate::time::now_iso8601;

/// Header fields shared by every document kind.
pub struct HeaderInfo<'a> {
    pub sender: &'a str,
    pub instance_id: u64,
    pub buffer_size: usize,
}

/// One component's worth of stream results.
pub struct ComponentBlock {
    pub component_type: String,
    pub component_id: String,
    pub component_name: Option<String>,
    pub samples: Vec<RenderedItem>,
    pub events: Vec<RenderedItem>,
    pub conditions: Vec<RenderedItem>,
}

/// One device's worth of stream results.
pub struct DeviceBlock {
    pub device_name: String,
    pub device_uuid: String,
    pub components: Vec<ComponentBlock>,
}

/// An observation annotated with the dataitem facts rendering needs.
pub struct RenderedItem {
    pub obs: std::sync::Arc<Observation>,
    pub type_name: String,
    pub sub_type: Option<String>,
    pub category: Category,
    pub time_series: bool,
}

/// `SCREAMING_SNAKE` dataitem type to a PascalCase element name
/// (`PATH_POSITION` -> `PathPosition`).
#[must_use]
pub fn element_name(type_name: &str) -> String {
    type_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn document_open(out: &mut String, root: &str, schema: &str) {
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let urn = format!("urn:mtconnect.org:{}:{}", schema, MTCONNECT_VERSION);
    let _ = write!(
        out,
        "<{root} xmlns=\"{urn}\" xmlns:m=\"{urn}\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">"
    );
}

fn header_common(out: &mut String, header: &HeaderInfo<'_>) {
    let _ = write!(
        out,
        "<Header creationTime=\"{}\" sender=\"{}\" instanceId=\"{}\" version=\"{}\" bufferSize=\"{}\"",
        now_iso8601(),
        escape_attr(header.sender),
        header.instance_id,
        MTCONNECT_VERSION,
        header.buffer_size
    );
}

// ---------------------------------------------------------------------------
// MTConnectDevices (/probe)
// ---------------------------------------------------------------------------

/// Render the device schema tree, no observation values.
#[must_use]
pub fn devices_document(header: &HeaderInfo<'_>, devices: &[&Device]) -> String {
    let mut out = String::new();
    document_open(&mut out, "MTConnectDevices", "MTConnectDevices");
    header_common(&mut out, header);
    out.push_str("/>");

    out.push_str("<Devices>");
    for device in devices {
        let _ = write!(
            out,
            "<Device uuid=\"{}\" name=\"{}\">",
            escape_attr(&device.uuid),
            escape_attr(&device.name)
        );
        write_dataitems(&mut out, &device.dataitems);
        write_components(&mut out, &device.components);
        out.push_str("</Device>");
    }
    out.push_str("</Devices>");
    out.push_str("</MTConnectDevices>");
    out
}

fn write_components(out: &mut String, components: &[Component]) {
    if components.is_empty() {
        return;
    }
    out.push_str("<Components>");
    for component in components {
        let _ = write!(
            out,
            "<{} id=\"{}\"",
            component.component_type,
            escape_attr(&component.id)
        );
        if let Some(ref name) = component.name {
            let _ = write!(out, " name=\"{}\"", escape_attr(name));
        }
        out.push('>');
        write_dataitems(out, &component.dataitems);
        write_components(out, &component.components);
        let _ = write!(out, "</{}>", component.component_type);
    }
    out.push_str("</Components>");
}

fn write_dataitems(out: &mut String, items: &[DataItem]) {
    if items.is_empty() {
        return;
    }
    out.push_str("<DataItems>");
    for item in items {
        let _ = write!(
            out,
            "<DataItem category=\"{}\" id=\"{}\" type=\"{}\"",
            match item.category {
                Category::Sample => "SAMPLE",
                Category::Event => "EVENT",
                Category::Condition => "CONDITION",
            },
            escape_attr(&item.id),
            escape_attr(&item.type_name)
        );
        if let Some(ref name) = item.name {
            let _ = write!(out, " name=\"{}\"", escape_attr(name));
        }
        if let Some(ref sub) = item.sub_type {
            let _ = write!(out, " subType=\"{}\"", escape_attr(sub));
        }
        if item.representation == Representation::TimeSeries {
            out.push_str(" representation=\"TIME_SERIES\"");
        }
        out.push_str("/>");
    }
    out.push_str("</DataItems>");
}

// ---------------------------------------------------------------------------
// MTConnectStreams (/current, /sample)
// ---------------------------------------------------------------------------

/// Render stream results grouped device -> component -> category section.
#[must_use]
pub fn streams_document(
    header: &HeaderInfo<'_>,
    seq: SequenceInfo,
    blocks: &[DeviceBlock],
) -> String {
    let mut out = String::new();
    document_open(&mut out, "MTConnectStreams", "MTConnectStreams");
    header_common(&mut out, header);
    let _ = write!(
        out,
        " firstSequence=\"{}\" lastSequence=\"{}\" nextSequence=\"{}\"/>",
        seq.first, seq.last, seq.next
    );

    out.push_str("<Streams>");
    for device in blocks {
        let _ = write!(
            out,
            "<DeviceStream name=\"{}\" uuid=\"{}\">",
            escape_attr(&device.device_name),
            escape_attr(&device.device_uuid)
        );
        for component in &device.components {
            let _ = write!(
                out,
                "<ComponentStream component=\"{}\" componentId=\"{}\"",
                escape_attr(&component.component_type),
                escape_attr(&component.component_id)
            );
            if let Some(ref name) = component.component_name {
                let _ = write!(out, " name=\"{}\"", escape_attr(name));
            }
            out.push('>');

            write_section(&mut out, "Samples", &component.samples);
            write_section(&mut out, "Events", &component.events);
            write_section(&mut out, "Condition", &component.conditions);

            out.push_str("</ComponentStream>");
        }
        out.push_str("</DeviceStream>");
    }
    out.push_str("</Streams>");
    out.push_str("</MTConnectStreams>");
    out
}

fn write_section(out: &mut String, section: &str, items: &[RenderedItem]) {
    if items.is_empty() {
        return;
    }
    let _ = write!(out, "<{}>", section);
    for item in items {
        write_observation(out, item);
    }
    let _ = write!(out, "</{}>", section);
}

fn write_observation(out: &mut String, item: &RenderedItem) {
    if item.category == Category::Condition {
        write_condition(out, item);
        return;
    }

    let mut tag = element_name(&item.type_name);
    if item.time_series {
        tag.push_str("TimeSeries");
    }

    let obs = &item.obs;
    let _ = write!(
        out,
        "<{} dataItemId=\"{}\" timestamp=\"{}\" sequence=\"{}\"",
        tag,
        escape_attr(&obs.data_item_id),
        escape_attr(&obs.time),
        obs.sequence
    );
    if !obs.name.is_empty() {
        let _ = write!(out, " name=\"{}\"", escape_attr(&obs.name));
    }
    if let Some(ref sub) = item.sub_type {
        let _ = write!(out, " subType=\"{}\"", escape_attr(sub));
    }

    match &obs.value {
        Value::Scalar(text) => {
            if text.is_empty() {
                out.push_str("/>");
            } else {
                let _ = write!(out, ">{}</{}>", escape_text(text), tag);
            }
        }
        Value::TimeSeries {
            sample_count,
            sample_rate,
            samples,
        } => {
            let rate = if sample_rate.is_empty() {
                "0"
            } else {
                sample_rate.as_str()
            };
            let _ = write!(
                out,
                " sampleCount=\"{}\" sampleRate=\"{}\">{}</{}>",
                escape_attr(sample_count),
                escape_attr(rate),
                escape_text(samples),
                tag
            );
        }
        Value::Message { native_code, text } => {
            if !native_code.is_empty() {
                let _ = write!(out, " nativeCode=\"{}\"", escape_attr(native_code));
            }
            let _ = write!(out, ">{}</{}>", escape_text(text), tag);
        }
        Value::Alarm {
            code,
            native_code,
            severity,
            state,
            text,
        } => {
            let _ = write!(
                out,
                " code=\"{}\" nativeCode=\"{}\" severity=\"{}\" state=\"{}\">{}</{}>",
                escape_attr(code),
                escape_attr(native_code),
                escape_attr(severity),
                escape_attr(state),
                escape_text(text),
                tag
            );
        }
        Value::Condition(_) => {
            // Handled by write_condition above.
            out.push_str("/>");
        }
    }
}

fn write_condition(out: &mut String, item: &RenderedItem) {
    let obs = &item.obs;
    let Value::Condition(ref cond) = obs.value else {
        log::debug!(
            "[xml::write_condition] Non-condition value on CONDITION dataitem {}",
            obs.data_item_id
        );
        return;
    };

    let tag = cond.level.element_name();
    let _ = write!(
        out,
        "<{} dataItemId=\"{}\" timestamp=\"{}\" sequence=\"{}\" type=\"{}\"",
        tag,
        escape_attr(&obs.data_item_id),
        escape_attr(&obs.time),
        obs.sequence,
        escape_attr(&item.type_name)
    );
    if !obs.name.is_empty() {
        let _ = write!(out, " name=\"{}\"", escape_attr(&obs.name));
    }
    if !cond.native_code.is_empty() {
        let _ = write!(out, " nativeCode=\"{}\"", escape_attr(&cond.native_code));
    }
    if !cond.native_severity.is_empty() {
        let _ = write!(out, " nativeSeverity=\"{}\"", escape_attr(&cond.native_severity));
    }
    if !cond.qualifier.is_empty() {
        let _ = write!(out, " qualifier=\"{}\"", escape_attr(&cond.qualifier));
    }
    if cond.message.is_empty() {
        out.push_str("/>");
    } else {
        let _ = write!(out, ">{}</{}>", escape_text(&cond.message), tag);
    }
}

// ---------------------------------------------------------------------------
// MTConnectAssets (/assets)
// ---------------------------------------------------------------------------

/// Render asset snapshots back to XML from their stored trees.
#[must_use]
pub fn assets_document(
    header: &HeaderInfo<'_>,
    asset_capacity: usize,
    asset_count: usize,
    assets: &[&Asset],
) -> String {
    let mut out = String::new();
    document_open(&mut out, "MTConnectAssets", "MTConnectAssets");
    header_common(&mut out, header);
    let _ = write!(
        out,
        " assetBufferSize=\"{}\" assetCount=\"{}\"/>",
        asset_capacity, asset_count
    );

    out.push_str("<Assets>");
    for asset in assets {
        out.push_str(&asset.content.to_xml());
    }
    out.push_str("</Assets>");
    out.push_str("</MTConnectAssets>");
    out
}

// ---------------------------------------------------------------------------
// MTConnectError
// ---------------------------------------------------------------------------

/// Render an error document.
#[must_use]
pub fn error_document(header: &HeaderInfo<'_>, code: &str, message: &str) -> String {
    let mut out = String::new();
    document_open(&mut out, "MTConnectError", "MTConnectError");
    header_common(&mut out, header);
    out.push_str("/>");

    let _ = write!(
        out,
        "<Errors><Error errorCode=\"{}\">{}</Error></Errors>",
        escape_attr(code),
        escape_text(message)
    );
    out.push_str("</MTConnectError>");
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConditionLevel, ConditionValue};
    use std::sync::Arc;

    fn header() -> HeaderInfo<'static> {
        HeaderInfo {
            sender: "mtcagent",
            instance_id: 1234,
            buffer_size: 10_000,
        }
    }

    fn rendered(
        seq: u64,
        id: &str,
        type_name: &str,
        category: Category,
        value: Value,
        time_series: bool,
    ) -> RenderedItem {
        RenderedItem {
            obs: Arc::new(Observation {
                sequence: seq,
                time: "2014-08-11T08:32:54.028533Z".to_string(),
                data_item_id: id.to_string(),
                name: id.to_string(),
                value,
            }),
            type_name: type_name.to_string(),
            sub_type: None,
            category,
            time_series,
        }
    }

    #[test]
    fn element_name_pascal_cases_types() {
        assert_eq!(element_name("AVAILABILITY"), "Availability");
        assert_eq!(element_name("PATH_POSITION"), "PathPosition");
        assert_eq!(element_name("ASSET_CHANGED"), "AssetChanged");
    }

    #[test]
    fn streams_header_carries_sequence_info() {
        let doc = streams_document(
            &header(),
            SequenceInfo {
                first: 3,
                last: 9,
                next: 10,
            },
            &[],
        );
        assert!(doc.contains("firstSequence=\"3\""));
        assert!(doc.contains("lastSequence=\"9\""));
        assert!(doc.contains("nextSequence=\"10\""));
        assert!(doc.contains("bufferSize=\"10000\""));
        assert!(doc.contains("urn:mtconnect.org:MTConnectStreams:1.3"));
    }

    #[test]
    fn scalar_event_renders_text() {
        let blocks = vec![DeviceBlock {
            device_name: "VMC-3Axis".to_string(),
            device_uuid: "000".to_string(),
            components: vec![ComponentBlock {
                component_type: "Device".to_string(),
                component_id: "000".to_string(),
                component_name: None,
                samples: vec![],
                events: vec![rendered(
                    7,
                    "avail",
                    "AVAILABILITY",
                    Category::Event,
                    Value::Scalar("AVAILABLE".to_string()),
                    false,
                )],
                conditions: vec![],
            }],
        }];
        let doc = streams_document(
            &header(),
            SequenceInfo {
                first: 1,
                last: 7,
                next: 8,
            },
            &blocks,
        );
        assert!(doc.contains(
            "<Availability dataItemId=\"avail\" timestamp=\"2014-08-11T08:32:54.028533Z\" \
             sequence=\"7\" name=\"avail\">AVAILABLE</Availability>"
        ));
        assert!(doc.contains("<DeviceStream name=\"VMC-3Axis\" uuid=\"000\">"));
        assert!(doc.contains("<Events>"));
    }

    #[test]
    fn time_series_renders_count_and_rate() {
        let item = rendered(
            2,
            "va",
            "VOLTAGE",
            Category::Sample,
            Value::TimeSeries {
                sample_count: "10".to_string(),
                sample_rate: String::new(),
                samples: "1 2 3".to_string(),
            },
            true,
        );
        let mut out = String::new();
        write_observation(&mut out, &item);
        assert!(out.starts_with("<VoltageTimeSeries "));
        assert!(out.contains("sampleCount=\"10\""));
        assert!(out.contains("sampleRate=\"0\""));
        assert!(out.ends_with(">1 2 3</VoltageTimeSeries>"));
    }

    #[test]
    fn condition_renders_level_element() {
        let item = rendered(
            5,
            "htemp",
            "TEMPERATURE",
            Category::Condition,
            Value::Condition(ConditionValue {
                level: ConditionLevel::Warning,
                native_code: "HTEMP".to_string(),
                native_severity: "1".to_string(),
                qualifier: "HIGH".to_string(),
                message: "Oil Temperature High".to_string(),
            }),
            false,
        );
        let mut out = String::new();
        write_observation(&mut out, &item);
        assert!(out.starts_with("<Warning "));
        assert!(out.contains("type=\"TEMPERATURE\""));
        assert!(out.contains("nativeCode=\"HTEMP\""));
        assert!(out.contains("qualifier=\"HIGH\""));
        assert!(out.ends_with(">Oil Temperature High</Warning>"));
    }

    #[test]
    fn message_renders_native_code_attr() {
        let item = rendered(
            1,
            "msg",
            "MESSAGE",
            Category::Event,
            Value::Message {
                native_code: "N7".to_string(),
                text: "tool < broken".to_string(),
            },
            false,
        );
        let mut out = String::new();
        write_observation(&mut out, &item);
        assert!(out.contains("nativeCode=\"N7\""));
        assert!(out.contains("tool &lt; broken"));
    }

    #[test]
    fn devices_document_renders_tree() {
        let device = Device {
            uuid: "000".to_string(),
            name: "VMC-3Axis".to_string(),
            components: vec![Component {
                id: "elec1".to_string(),
                component_type: "Electric".to_string(),
                name: None,
                components: vec![],
                dataitems: vec![DataItem {
                    id: "va".to_string(),
                    name: Some("Va".to_string()),
                    type_name: "VOLTAGE".to_string(),
                    category: Category::Sample,
                    sub_type: None,
                    representation: Representation::TimeSeries,
                }],
            }],
            dataitems: vec![],
        };
        let doc = devices_document(&header(), &[&device]);
        assert!(doc.contains("<Device uuid=\"000\" name=\"VMC-3Axis\">"));
        assert!(doc.contains("<Electric id=\"elec1\">"));
        assert!(doc.contains("representation=\"TIME_SERIES\""));
        assert!(doc.contains("urn:mtconnect.org:MTConnectDevices:1.3"));
    }

    #[test]
    fn error_document_carries_code() {
        let doc = error_document(&header(), "OUT_OF_RANGE", "from=1 outside [5, 9]");
        assert!(doc.contains("<Error errorCode=\"OUT_OF_RANGE\">from=1 outside [5, 9]</Error>"));
        assert!(doc.contains("urn:mtconnect.org:MTConnectError:1.3"));
    }
}
