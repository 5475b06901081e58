// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pre-ingest device XML gate.
//!
//! A device description is rejected when (a) no `MTConnectDevices` schema
//! version can be extracted from the root namespace, (b) the version is
//! outside the supported set, or (c) the external XSD validator exits
//! non-zero. Failure to stage the temp file for the validator is itself a
//! rejection. All rejections are fatal at startup.

use std::io::Write;
use std::process::Command;

use crate::config::SUPPORTED_SCHEMA_VERSIONS;
use crate::error::{Error, Result};

/// Validate device XML; returns the accepted schema version.
pub fn validate_device_xml(xml: &str, validator: Option<&str>) -> Result<String> {
    let version = extract_schema_version(xml)?;

    if !SUPPORTED_SCHEMA_VERSIONS.contains(&version.as_str()) {
        return Err(Error::SchemaRejected(format!(
            "unsupported schema version {} (supported: {})",
            version,
            SUPPORTED_SCHEMA_VERSIONS.join(", ")
        )));
    }

    if let Some(command) = validator {
        run_validator(command, xml)?;
    }

    Ok(version)
}

/// Extract the schema version from the root element's default namespace,
/// e.g. `urn:mtconnect.org:MTConnectDevices:1.3` -> `1.3`.
fn extract_schema_version(xml: &str) -> Result<String> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| Error::SchemaRejected(format!("device XML does not parse: {}", e)))?;
    let root = doc.root_element();

    if root.tag_name().name() != "MTConnectDevices" {
        return Err(Error::SchemaRejected(format!(
            "root element is <{}>, expected <MTConnectDevices>",
            root.tag_name().name()
        )));
    }

    let namespace = root
        .tag_name()
        .namespace()
        .ok_or_else(|| Error::SchemaRejected("no xmlns version attribute".to_string()))?;

    match namespace.rsplit(':').next() {
        Some(version) if !version.is_empty() && version.chars().next().is_some_and(|c| c.is_ascii_digit()) => {
            Ok(version.to_string())
        }
        _ => Err(Error::SchemaRejected(format!(
            "no version in namespace '{}'",
            namespace
        ))),
    }
}

/// Stage the XML in a temp file and run `<command> <file>`.
fn run_validator(command: &str, xml: &str) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| Error::SchemaRejected(format!("temp file creation failed: {}", e)))?;
    file.write_all(xml.as_bytes())
        .map_err(|e| Error::SchemaRejected(format!("temp file write failed: {}", e)))?;

    let output = Command::new(command)
        .arg(file.path())
        .output()
        .map_err(|e| Error::SchemaRejected(format!("validator '{}' failed to run: {}", command, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::SchemaRejected(format!(
            "validator exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    log::debug!("[validate::run_validator] Device XML accepted by '{}'", command);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn device_xml(version: &str) -> String {
        format!(
            r#"<MTConnectDevices xmlns="urn:mtconnect.org:MTConnectDevices:{}">
                 <Devices><Device uuid="000" name="VMC-3Axis"/></Devices>
               </MTConnectDevices>"#,
            version
        )
    }

    #[test]
    fn accepts_supported_versions() {
        for version in SUPPORTED_SCHEMA_VERSIONS {
            let accepted = validate_device_xml(&device_xml(version), None)
                .expect("supported version should validate");
            assert_eq!(accepted, version);
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = validate_device_xml(&device_xml("1.4"), None)
            .expect_err("1.4 is outside the supported set");
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn rejects_missing_namespace() {
        let xml = r#"<MTConnectDevices><Devices/></MTConnectDevices>"#;
        let err = validate_device_xml(xml, None).expect_err("missing xmlns should reject");
        assert!(err.to_string().contains("no xmlns"));
    }

    #[test]
    fn rejects_wrong_root() {
        let xml = r#"<Devices xmlns="urn:mtconnect.org:MTConnectDevices:1.3"/>"#;
        assert!(validate_device_xml(xml, None).is_err());
    }

    #[test]
    fn rejects_unparseable_xml() {
        assert!(validate_device_xml("<not-closed", None).is_err());
    }

    #[test]
    fn external_validator_success_path() {
        // `true` ignores its argument and exits zero.
        let accepted =
            validate_device_xml(&device_xml("1.3"), Some("true")).expect("true always passes");
        assert_eq!(accepted, "1.3");
    }

    #[test]
    fn external_validator_failure_rejects() {
        let err = validate_device_xml(&device_xml("1.3"), Some("false"))
            .expect_err("false always exits non-zero");
        assert!(err.to_string().contains("validator"));
    }
}
