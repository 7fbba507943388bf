//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use cellsim_common::time::nearest_ten_minute_boundary;
use chrono::{DateTime, Utc};
use tracing::trace;

use crate::error::Result;
use crate::evolver::ValueSeries;
use crate::model::{AdditionalMeasurement, VesEvent, TRAFFIC_MODEL_GROUP};

/// Read access to terminal-to-cell association.
pub trait TerminalLookup: Send + Sync {
    fn terminals_for_cell(&self, cell_id: &str) -> Vec<String>;
}

/// Lookup that never reports attached terminals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTerminals;

impl TerminalLookup for NoTerminals {
    fn terminals_for_cell(&self, _cell_id: &str) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    group: String,
    field: String,
}

impl SeriesKey {
    fn new(group: &str, field: &str) -> Self {
        Self {
            group: group.to_owned(),
            field: field.to_owned(),
        }
    }
}

/// Produces one resolved document per tick from a marker-bearing template.
///
/// Series are bound per `(group, field)` the first time a marker is seen and
/// live as long as the customizer, so successive ticks continue the same ramp.
pub struct EventCustomizer {
    series: HashMap<SeriesKey, ValueSeries>,
    terminals: Arc<dyn TerminalLookup>,
    traffic_marker: String,
}

impl std::fmt::Debug for EventCustomizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCustomizer")
            .field("series", &self.series.len())
            .field("traffic_marker", &self.traffic_marker)
            .finish()
    }
}

impl EventCustomizer {
    /// Scan `template` once and bind a series to every marker it carries.
    pub fn new(
        template: &VesEvent,
        terminals: Arc<dyn TerminalLookup>,
        traffic_marker: impl Into<String>,
    ) -> Result<Self> {
        let traffic_marker = traffic_marker.into();
        ValueSeries::parse(&traffic_marker)?;

        let mut customizer = Self {
            series: HashMap::new(),
            terminals,
            traffic_marker,
        };
        for group in template.measurements() {
            customizer.bind_group(group)?;
        }
        Ok(customizer)
    }

    pub fn bound_series(&self) -> usize {
        self.series.len()
    }

    pub fn apply(&mut self, template: &VesEvent) -> Result<VesEvent> {
        self.apply_at(template, Utc::now())
    }

    /// Resolve `template` as of `now`. The template is never mutated.
    pub fn apply_at(&mut self, template: &VesEvent, now: DateTime<Utc>) -> Result<VesEvent> {
        let mut event = template.clone();

        let header = &mut event.common_event_header;
        header.last_epoch_microsec = Some(now.timestamp_micros());
        header.start_epoch_microsec = Some(nearest_ten_minute_boundary(&now).timestamp_micros());

        if let Some(cell_id) = event.cell_identifier().map(str::to_owned) {
            let traffic = self.traffic_model_group(&cell_id);
            self.bind_group(&traffic)?;
            event.measurements_mut()?.push(traffic);
        }

        if let Some(fields) = event.measurement_fields.as_mut() {
            for group in fields.additional_measurements.iter_mut() {
                self.resolve_group(group)?;
            }
        }
        Ok(event)
    }

    fn traffic_model_group(&self, cell_id: &str) -> AdditionalMeasurement {
        let mut group = AdditionalMeasurement::new(TRAFFIC_MODEL_GROUP);
        for terminal in self.terminals.terminals_for_cell(cell_id) {
            group.hash_map.insert(terminal, self.traffic_marker.clone());
        }
        group
    }

    fn bind_group(&mut self, group: &AdditionalMeasurement) -> Result<()> {
        for (field, value) in &group.hash_map {
            if !ValueSeries::is_marker(value) {
                continue;
            }
            let key = SeriesKey::new(&group.name, field);
            if !self.series.contains_key(&key) {
                trace!(group = %group.name, field = %field, marker = %value, "binding value series");
                self.series.insert(key, ValueSeries::parse(value)?);
            }
        }
        Ok(())
    }

    fn resolve_group(&mut self, group: &mut AdditionalMeasurement) -> Result<()> {
        let name = group.name.clone();
        for (field, value) in group.hash_map.iter_mut() {
            if !ValueSeries::is_marker(value) {
                continue;
            }
            let key = SeriesKey::new(&name, field);
            if !self.series.contains_key(&key) {
                let parsed = ValueSeries::parse(value)?;
                self.series.insert(key.clone(), parsed);
            }
            if let Some(series) = self.series.get_mut(&key) {
                *value = series.next_value().to_string();
            }
        }
        Ok(())
    }
}
