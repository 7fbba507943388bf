//! ---
//! sim_section: "02-telemetry-documents"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Measurement document model and synthetic value evolution."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
//! Measurement documents emitted by simulated cells.
//!
//! Templates carry range markers (`[[a-b]]`, `[[a->b]]`) that the
//! [`EventCustomizer`] resolves once per tick through bound [`ValueSeries`].

pub mod customizer;
pub mod error;
pub mod evolver;
pub mod model;
pub mod templates;

pub use customizer::{EventCustomizer, NoTerminals, TerminalLookup};
pub use error::{Result, VesError};
pub use evolver::{SeriesKind, ValueSeries};
pub use model::{
    AdditionalMeasurement, CommonEventHeader, EventEnvelope, MeasurementFields, NamedHashMap,
    NotificationFields, VesEvent, IDENTIFIER_GROUP, LATENCY_GROUP, THROUGHPUT_GROUP,
    TRAFFIC_MODEL_GROUP, VALUE_FIELD,
};
pub use templates::{bundled_failure_template, bundled_measurement_template, load_template};
