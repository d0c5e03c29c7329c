//! Identity overrides for the `config.json` fixture.

use serde::Serialize;
use serde_json::Value;

use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::fixtures::{FixtureSet, CONFIG_JSON};

/// Overwrite `install_uuid`, `instance_uuid` and `tower_url_base` in
/// `config.json` with the non-empty overrides from `config`.
///
/// Every other key, and the key order, is left as shipped. When no override
/// is set the fixture bytes are not touched at all.
pub fn patch_config(fixtures: &mut FixtureSet, config: &BundleConfig) -> BundleResult<()> {
    let overrides = [
        ("install_uuid", config.install_uuid.as_str()),
        ("instance_uuid", config.instance_uuid.as_str()),
        ("tower_url_base", config.tower_url_base.as_str()),
    ];
    if overrides.iter().all(|(_, value)| value.is_empty()) {
        return Ok(());
    }

    let raw = fixtures.get(CONFIG_JSON).unwrap_or_default();
    let mut doc: Value = serde_json::from_slice(raw)
        .map_err(|e| BundleError::generation("failed to parse config.json", e))?;
    let object = doc
        .as_object_mut()
        .ok_or_else(|| BundleError::GenerationFailure {
            message: "config.json is not a JSON object".to_string(),
        })?;

    for (key, value) in overrides {
        if !value.is_empty() {
            object.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    fixtures.set(CONFIG_JSON, to_pretty_json(&doc)?);
    Ok(())
}

fn to_pretty_json(doc: &Value) -> BundleResult<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    doc.serialize(&mut ser)
        .map_err(|e| BundleError::generation("failed to serialize config.json", e))?;
    out.push(b'\n');
    Ok(out)
}
