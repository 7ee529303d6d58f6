//! Structured document for persisting a [`MappingConfig`] between runs.
//!
//! Every section is keyed by a fixed field name (see
//! [`EquipmentKind::fields`]). Output is deterministic: objects are sorted
//! by key, keys by id then variable, and candidate series keep their
//! binding order. Reading is strict: unknown fields, incomplete mapping
//! keys and variables no registered provider claims are rejected.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::{CategoryIndex, MappingConfig};
use crate::equipment::EquipmentKind;
use crate::error::{MappingError, MappingResult};
use crate::formula::Formula;
use crate::key::{DistributionKey, MappingKey};
use crate::variable::VariableRegistry;

/// Document format version written to the `version` field.
pub const FORMAT_VERSION: u64 = 1;

const VERSION: &str = "version";
const DISTRIBUTION_KEYS: &str = "distributionKeys";
const TIME_SERIES_NODES: &str = "timeSeriesNodes";
const MAPPED_TIME_SERIES_NAMES: &str = "mappedTimeSeriesNames";
const IGNORE_LIMITS_TIME_SERIES_NAMES: &str = "ignoreLimitsTimeSeriesNames";
const PLANNED_OUTAGES: &str = "timeSeriesToPlannedOutagesMapping";

const TIME_SERIES_NAME: &str = "timeSeriesName";
const MAPPING_KEY: &str = "mappingKey";
const MAPPING_KEYS: &str = "mappingKeys";
const MAPPING_LIST: &str = "mappingList";
const DISTRIBUTION_KEY: &str = "distributionKey";
const OUTAGES: &str = "outages";
const MAPPING_VARIABLE: &str = "mappingVariable";
const ID: &str = "id";

// ============================================================================
// Writing
// ============================================================================

fn sorted_keys<'a>(keys: impl IntoIterator<Item = &'a MappingKey>) -> Vec<&'a MappingKey> {
    let mut keys: Vec<&MappingKey> = keys.into_iter().collect();
    keys.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    keys
}

fn write_category(doc: &mut Map<String, Value>, kind: EquipmentKind, index: &CategoryIndex) {
    let fields = kind.fields();

    if !index.forward.is_empty() {
        let entries: Vec<Value> = index
            .forward
            .iter()
            .map(|(name, keys)| {
                json!({
                    TIME_SERIES_NAME: name,
                    MAPPING_KEYS: sorted_keys(keys),
                })
            })
            .collect();
        doc.insert(fields.forward.clone(), Value::Array(entries));
    }

    if !index.reverse.is_empty() {
        let entries: Vec<Value> = sorted_keys(index.reverse.keys())
            .into_iter()
            .map(|key| {
                json!({
                    MAPPING_KEY: key,
                    MAPPING_LIST: index.series_for(key),
                })
            })
            .collect();
        doc.insert(fields.reverse.clone(), Value::Array(entries));
    }

    if !index.declared.is_empty() {
        doc.insert(fields.declared.clone(), json!(sorted_keys(&index.declared)));
    }

    for (field, ids) in [
        (&fields.unmapped, &index.unmapped),
        (&fields.ignored_unmapped, &index.ignored_unmapped),
        (&fields.disconnected, &index.disconnected),
        (&fields.out_of_main_cc, &index.out_of_main_cc),
    ] {
        if !ids.is_empty() {
            doc.insert(field.clone(), json!(ids));
        }
    }
}

/// Document tree for a configuration.
pub fn to_value(config: &MappingConfig) -> Value {
    let mut doc = Map::new();
    doc.insert(VERSION.to_string(), json!(FORMAT_VERSION));

    for (kind, index) in &config.categories {
        write_category(&mut doc, *kind, index);
    }

    if !config.distribution_keys.is_empty() {
        let entries: Vec<Value> = sorted_keys(config.distribution_keys.keys())
            .into_iter()
            .map(|key| {
                json!({
                    MAPPING_KEY: key,
                    DISTRIBUTION_KEY: config.distribution_keys[key],
                })
            })
            .collect();
        doc.insert(DISTRIBUTION_KEYS.to_string(), Value::Array(entries));
    }
    if !config.formulas.is_empty() {
        doc.insert(TIME_SERIES_NODES.to_string(), json!(config.formulas));
    }
    if !config.mapped_time_series.is_empty() {
        doc.insert(
            MAPPED_TIME_SERIES_NAMES.to_string(),
            json!(config.mapped_time_series),
        );
    }
    if !config.ignore_limits.is_empty() {
        doc.insert(
            IGNORE_LIMITS_TIME_SERIES_NAMES.to_string(),
            json!(config.ignore_limits),
        );
    }
    if !config.planned_outages.is_empty() {
        let entries: Vec<Value> = config
            .planned_outages
            .iter()
            .map(|(name, ids)| json!({ TIME_SERIES_NAME: name, OUTAGES: ids }))
            .collect();
        doc.insert(PLANNED_OUTAGES.to_string(), Value::Array(entries));
    }

    Value::Object(doc)
}

pub fn to_json(config: &MappingConfig) -> MappingResult<String> {
    Ok(serde_json::to_string(&to_value(config))?)
}

pub fn to_json_pretty(config: &MappingConfig) -> MappingResult<String> {
    Ok(serde_json::to_string_pretty(&to_value(config))?)
}

// ============================================================================
// Reading
// ============================================================================

fn parse_err(message: impl Into<String>) -> MappingError {
    MappingError::Parse(message.into())
}

fn as_object<'a>(value: &'a Value, what: &str) -> MappingResult<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| parse_err(format!("{what} must be an object")))
}

fn as_array<'a>(value: &'a Value, what: &str) -> MappingResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| parse_err(format!("{what} must be an array")))
}

fn as_str<'a>(value: &'a Value, what: &str) -> MappingResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| parse_err(format!("{what} must be a string")))
}

/// Object with exactly the given fields.
fn exact_fields<'a>(
    value: &'a Value,
    what: &str,
    expected: &[&str],
) -> MappingResult<&'a Map<String, Value>> {
    let object = as_object(value, what)?;
    if let Some(unexpected) = object.keys().find(|k| !expected.contains(&k.as_str())) {
        return Err(parse_err(format!("unexpected field '{unexpected}' in {what}")));
    }
    if let Some(missing) = expected.iter().find(|k| !object.contains_key(**k)) {
        return Err(parse_err(format!("missing field '{missing}' in {what}")));
    }
    Ok(object)
}

fn string_set(value: &Value, what: &str) -> MappingResult<BTreeSet<String>> {
    as_array(value, what)?
        .iter()
        .map(|item| as_str(item, what).map(str::to_string))
        .collect()
}

/// Read one serialized mapping key.
pub fn mapping_key_from_value(value: &Value, registry: &VariableRegistry) -> MappingResult<MappingKey> {
    let object = as_object(value, "mapping key")
        .map_err(|_| MappingError::MalformedKey(value.to_string()))?;
    if let Some(unexpected) = object
        .keys()
        .find(|k| k.as_str() != MAPPING_VARIABLE && k.as_str() != ID)
    {
        return Err(MappingError::MalformedKey(format!(
            "unexpected field name '{unexpected}'"
        )));
    }
    let (Some(variable), Some(id)) = (object.get(MAPPING_VARIABLE), object.get(ID)) else {
        return Err(MappingError::MalformedKey(format!("incomplete mapping key {value}")));
    };
    let id = id
        .as_str()
        .ok_or_else(|| MappingError::MalformedKey(format!("id must be a string in {value}")))?;

    let variable = variable
        .as_object()
        .filter(|fields| fields.len() == 1)
        .ok_or_else(|| {
            MappingError::MalformedKey(format!("mapping variable must have one field in {value}"))
        })?;
    let (family, name) = variable
        .iter()
        .next()
        .ok_or_else(|| MappingError::MalformedKey(value.to_string()))?;
    let name = name.as_str().ok_or_else(|| {
        MappingError::MalformedKey(format!("variable name must be a string in {value}"))
    })?;

    MappingKey::new(registry.resolve(family, name)?, id)
}

fn read_category(
    doc: &Map<String, Value>,
    kind: EquipmentKind,
    registry: &VariableRegistry,
) -> MappingResult<CategoryIndex> {
    let fields = kind.fields();
    let mut index = CategoryIndex::default();

    if let Some(entries) = doc.get(&fields.forward) {
        for entry in as_array(entries, &fields.forward)? {
            let entry = exact_fields(entry, &fields.forward, &[TIME_SERIES_NAME, MAPPING_KEYS])?;
            let name = as_str(&entry[TIME_SERIES_NAME], TIME_SERIES_NAME)?;
            let keys = as_array(&entry[MAPPING_KEYS], MAPPING_KEYS)?
                .iter()
                .map(|k| mapping_key_from_value(k, registry))
                .collect::<MappingResult<HashSet<_>>>()?;
            index.forward.insert(name.to_string(), keys);
        }
    }

    if let Some(entries) = doc.get(&fields.reverse) {
        for entry in as_array(entries, &fields.reverse)? {
            let entry = exact_fields(entry, &fields.reverse, &[MAPPING_KEY, MAPPING_LIST])?;
            let key = mapping_key_from_value(&entry[MAPPING_KEY], registry)?;
            let names = as_array(&entry[MAPPING_LIST], MAPPING_LIST)?
                .iter()
                .map(|n| as_str(n, MAPPING_LIST).map(str::to_string))
                .collect::<MappingResult<Vec<_>>>()?;
            if index.reverse.insert(key.clone(), names).is_some() {
                return Err(parse_err(format!("duplicate {} entry for {key}", fields.reverse)));
            }
        }
    }

    if let Some(keys) = doc.get(&fields.declared) {
        index.declared = as_array(keys, &fields.declared)?
            .iter()
            .map(|k| mapping_key_from_value(k, registry))
            .collect::<MappingResult<HashSet<_>>>()?;
    }

    if let Some(ids) = doc.get(&fields.unmapped) {
        index.unmapped = string_set(ids, &fields.unmapped)?;
    }
    if let Some(ids) = doc.get(&fields.ignored_unmapped) {
        index.ignored_unmapped = string_set(ids, &fields.ignored_unmapped)?;
    }
    if let Some(ids) = doc.get(&fields.disconnected) {
        index.disconnected = string_set(ids, &fields.disconnected)?;
    }
    if let Some(ids) = doc.get(&fields.out_of_main_cc) {
        index.out_of_main_cc = string_set(ids, &fields.out_of_main_cc)?;
    }

    Ok(index)
}

fn known_fields() -> HashSet<&'static str> {
    let mut known: HashSet<&'static str> = [
        VERSION,
        DISTRIBUTION_KEYS,
        TIME_SERIES_NODES,
        MAPPED_TIME_SERIES_NAMES,
        IGNORE_LIMITS_TIME_SERIES_NAMES,
        PLANNED_OUTAGES,
    ]
    .into_iter()
    .collect();
    for kind in EquipmentKind::ALL {
        let f = kind.fields();
        known.extend([
            f.forward.as_str(),
            f.reverse.as_str(),
            f.declared.as_str(),
            f.unmapped.as_str(),
            f.ignored_unmapped.as_str(),
            f.disconnected.as_str(),
            f.out_of_main_cc.as_str(),
        ]);
    }
    known
}

/// Rebuild a configuration from a document tree, then verify index
/// integrity.
pub fn from_value(value: &Value, registry: &VariableRegistry) -> MappingResult<MappingConfig> {
    let doc = as_object(value, "mapping document")?;
    let known = known_fields();
    if let Some(unexpected) = doc.keys().find(|k| !known.contains(k.as_str())) {
        return Err(parse_err(format!("unexpected field '{unexpected}'")));
    }
    match doc.get(VERSION).and_then(Value::as_u64) {
        Some(FORMAT_VERSION) => {}
        other => {
            return Err(parse_err(format!(
                "unsupported document version {other:?}, expected {FORMAT_VERSION}"
            )))
        }
    }

    let mut config = MappingConfig::new();
    for kind in EquipmentKind::ALL {
        config
            .categories
            .insert(kind, read_category(doc, kind, registry)?);
    }

    if let Some(entries) = doc.get(DISTRIBUTION_KEYS) {
        for entry in as_array(entries, DISTRIBUTION_KEYS)? {
            let entry = exact_fields(entry, DISTRIBUTION_KEYS, &[MAPPING_KEY, DISTRIBUTION_KEY])?;
            let key = mapping_key_from_value(&entry[MAPPING_KEY], registry)?;
            let distribution: DistributionKey =
                serde_json::from_value(entry[DISTRIBUTION_KEY].clone())?;
            distribution
                .validate()
                .map_err(|err| parse_err(format!("{DISTRIBUTION_KEYS} entry for {key}: {err}")))?;
            config.distribution_keys.insert(key, distribution);
        }
    }
    if let Some(nodes) = doc.get(TIME_SERIES_NODES) {
        as_object(nodes, TIME_SERIES_NODES)?;
        let formulas: std::collections::BTreeMap<String, Formula> =
            serde_json::from_value(nodes.clone())?;
        for (name, formula) in formulas {
            config.add_formula(name, formula)?;
        }
    }
    if let Some(names) = doc.get(MAPPED_TIME_SERIES_NAMES) {
        config.mapped_time_series = string_set(names, MAPPED_TIME_SERIES_NAMES)?;
    }
    if let Some(names) = doc.get(IGNORE_LIMITS_TIME_SERIES_NAMES) {
        config.ignore_limits = string_set(names, IGNORE_LIMITS_TIME_SERIES_NAMES)?;
    }
    if let Some(entries) = doc.get(PLANNED_OUTAGES) {
        for entry in as_array(entries, PLANNED_OUTAGES)? {
            let entry = exact_fields(entry, PLANNED_OUTAGES, &[TIME_SERIES_NAME, OUTAGES])?;
            let name = as_str(&entry[TIME_SERIES_NAME], TIME_SERIES_NAME)?;
            let ids = string_set(&entry[OUTAGES], OUTAGES)?;
            config.add_planned_outages(name, ids);
        }
    }

    config.check_integrity()?;
    debug!(fields = doc.len(), "read mapping document");
    Ok(config)
}

pub fn from_json(text: &str, registry: &VariableRegistry) -> MappingResult<MappingConfig> {
    let value: Value = serde_json::from_str(text)?;
    from_value(&value, registry)
}

/// Write a configuration as pretty JSON, creating parent directories.
pub fn write_config(path: &Path, config: &MappingConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating mapping directory '{}'", parent.display()))?;
    }
    let json = to_json_pretty(config).context("serializing mapping config to JSON")?;
    fs::write(path, json).with_context(|| format!("writing mapping config '{}'", path.display()))?;
    Ok(())
}

pub fn read_config(path: &Path, registry: &VariableRegistry) -> anyhow::Result<MappingConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("opening mapping config '{}'", path.display()))?;
    from_json(&text, registry)
        .with_context(|| format!("parsing mapping config '{}'", path.display()))
}
