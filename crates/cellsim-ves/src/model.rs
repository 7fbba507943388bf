//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VesError};

pub const IDENTIFIER_GROUP: &str = "identifier";
pub const TRAFFIC_MODEL_GROUP: &str = "trafficModel";
pub const THROUGHPUT_GROUP: &str = "throughput";
pub const LATENCY_GROUP: &str = "latency";
pub const VALUE_FIELD: &str = "value";

/// Wire envelope: every document travels as `{"event": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event: VesEvent,
}

/// A measurement or notification document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VesEvent {
    pub common_event_header: CommonEventHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_fields: Option<MeasurementFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_fields: Option<NotificationFields>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonEventHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_epoch_microsec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_epoch_microsec: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nf_naming_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nf_vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ves_event_listener_version: Option<String>,
    /// Header fields this model does not name are carried through untouched.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_fields_version: Option<String>,
    #[serde(default)]
    pub additional_measurements: Vec<AdditionalMeasurement>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A named measurement group with ordered key/value strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMeasurement {
    pub name: String,
    #[serde(default)]
    pub hash_map: IndexMap<String, String>,
}

impl AdditionalMeasurement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash_map: IndexMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hash_map.insert(key.into(), value.into());
        self
    }

    /// The `value` entry when present, otherwise every entry joined as `key:value`.
    pub fn measurement_value(&self) -> String {
        match self.hash_map.get(VALUE_FIELD) {
            Some(value) => value.clone(),
            None => self
                .hash_map
                .iter()
                .map(|(key, value)| format!("{}:{}", key, value))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFields {
    pub change_identifier: String,
    pub change_type: String,
    pub notification_fields_version: String,
    #[serde(default)]
    pub array_of_named_hash_map: Vec<NamedHashMap>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamedHashMap {
    pub name: String,
    pub hash_map: IndexMap<String, String>,
}

impl VesEvent {
    pub fn from_envelope_json(raw: &str) -> Result<Self> {
        let envelope: EventEnvelope = serde_json::from_str(raw)?;
        Ok(envelope.event)
    }

    pub fn to_envelope_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&EventEnvelope {
            event: self.clone(),
        })?)
    }

    pub fn measurements(&self) -> &[AdditionalMeasurement] {
        self.measurement_fields
            .as_ref()
            .map(|fields| fields.additional_measurements.as_slice())
            .unwrap_or(&[])
    }

    pub fn measurements_mut(&mut self) -> Result<&mut Vec<AdditionalMeasurement>> {
        self.measurement_fields
            .as_mut()
            .map(|fields| &mut fields.additional_measurements)
            .ok_or(VesError::MissingMeasurements)
    }

    /// Case-insensitive group lookup.
    pub fn group(&self, name: &str) -> Option<&AdditionalMeasurement> {
        self.measurements()
            .iter()
            .find(|group| group.name.eq_ignore_ascii_case(name))
    }

    pub fn group_value(&self, name: &str) -> Option<&str> {
        self.group(name)
            .and_then(|group| group.hash_map.get(VALUE_FIELD))
            .map(String::as_str)
    }

    pub fn cell_identifier(&self) -> Option<&str> {
        self.group_value(IDENTIFIER_GROUP)
    }

    /// Stamp `cell_id` into the identifier group, appending the group when absent.
    pub fn set_cell_identifier(&mut self, cell_id: &str) -> Result<()> {
        let groups = self.measurements_mut()?;
        match groups
            .iter_mut()
            .find(|group| group.name.eq_ignore_ascii_case(IDENTIFIER_GROUP))
        {
            Some(group) => {
                group
                    .hash_map
                    .insert(VALUE_FIELD.to_owned(), cell_id.to_owned());
            }
            None => groups.push(
                AdditionalMeasurement::new(IDENTIFIER_GROUP).with_entry(VALUE_FIELD, cell_id),
            ),
        }
        Ok(())
    }
}
