//! ---
//! sim_section: "04-bulk-reporting"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Bulk report buffering, compilation, and shipping."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cellsim_common::config::ReportConfig;
use cellsim_common::time::{floor_to_five_minutes, to_iso8601};
use cellsim_ves::{IDENTIFIER_GROUP, TRAFFIC_MODEL_GROUP};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::{debug, info};

use crate::buffer::BufferedSnapshot;
use crate::error::{ReportError, Result};
use crate::transfer::TempArtifact;

const MEAS_COLLEC_NS: &str = "http://www.3gpp.org/ftp/specs/archive/32_series/32.435#measCollec";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const STYLESHEET_PI: &str = r#"xml-stylesheet type="text/xsl" href="MeasDataCollection.xsl""#;
/// Structural groups that never become measurement types.
const EXCLUDED_GROUPS: [&str; 2] = [TRAFFIC_MODEL_GROUP, IDENTIFIER_GROUP];

/// Static parameters stamped into every compiled report.
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    pub output_dir: PathBuf,
    pub reporting_period: Duration,
    pub file_format_version: String,
    pub vendor_name: String,
    pub file_sender: String,
    pub user_label: String,
}

impl From<&ReportConfig> for CompilerSettings {
    fn from(config: &ReportConfig) -> Self {
        Self {
            output_dir: config.temp_dir.clone(),
            reporting_period: config.reporting_period,
            file_format_version: config.file_format_version.clone(),
            vendor_name: config.vendor_name.clone(),
            file_sender: config.file_sender.clone(),
            user_label: config.user_label.clone(),
        }
    }
}

/// A report file written to the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledReport {
    pub path: PathBuf,
    pub file_name: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub snapshot_count: usize,
}

/// Builds measCollec XML files from buffered snapshots.
///
/// Owns the base-name collision counter for the lifetime of the compiler.
#[derive(Debug)]
pub struct BulkReportCompiler {
    settings: CompilerSettings,
    collisions: HashMap<String, u32>,
}

impl BulkReportCompiler {
    pub fn new(settings: CompilerSettings) -> Self {
        Self {
            settings,
            collisions: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn reset_collisions(&mut self) {
        self.collisions.clear();
    }

    /// Compile `batch` into a report file and clear it. An empty batch yields `None`.
    pub fn compile(&mut self, batch: &mut Vec<BufferedSnapshot>) -> Result<Option<CompiledReport>> {
        if batch.is_empty() {
            debug!("no buffered snapshots; skipping report compilation");
            return Ok(None);
        }

        let mut ordered: Vec<&BufferedSnapshot> = batch.iter().collect();
        ordered.sort_by_key(|snapshot| snapshot.captured_at);
        let window_start = ordered[0].captured_at;
        let window_end = ordered[ordered.len() - 1].captured_at;

        let document = self.render(&ordered, window_start, window_end)?;
        let file_name = self.unique_file_name(&window_start, &window_end);

        fs::create_dir_all(&self.settings.output_dir)
            .map_err(|err| ReportError::io(&self.settings.output_dir, err))?;
        let path = persist(&self.settings.output_dir.join(&file_name), |file| {
            file.write_all(&document)?;
            file.sync_all()
        })?;

        let snapshot_count = batch.len();
        batch.clear();
        info!(file = %file_name, snapshots = snapshot_count, "bulk report compiled");
        Ok(Some(CompiledReport {
            path,
            file_name,
            window_start,
            window_end,
            snapshot_count,
        }))
    }

    fn unique_file_name(&mut self, start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
        let base = file_base_name(start, end);
        let count = self.collisions.entry(base.clone()).or_insert(0);
        let name = if *count == 0 {
            format!("{}.xml", base)
        } else {
            format!("{}_-_{}.xml", base, count)
        };
        *count += 1;
        name
    }

    fn render(
        &self,
        ordered: &[&BufferedSnapshot],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let settings = &self.settings;
        let mut xml = XmlOut::new();

        xml.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        xml.event(Event::PI(BytesPI::new(STYLESHEET_PI)))?;
        let schema_location = format!("{} {}", MEAS_COLLEC_NS, MEAS_COLLEC_NS);
        xml.start(
            "measCollecFile",
            &[
                ("xmlns", MEAS_COLLEC_NS),
                ("xmlns:xsi", XSI_NS),
                ("xsi:schemaLocation", &schema_location),
            ],
        )?;

        xml.start(
            "fileHeader",
            &[
                ("fileFormatVersion", &settings.file_format_version),
                ("vendorName", &settings.vendor_name),
            ],
        )?;
        xml.empty("fileSender", &[("elementType", &settings.file_sender)])?;
        xml.empty("measCollec", &[("beginTime", &to_iso8601(&window_start))])?;
        xml.end("fileHeader")?;

        xml.start("measData", &[])?;
        xml.empty("managedElement", &[("userLabel", &settings.user_label)])?;
        for snapshot in ordered {
            self.render_meas_info(&mut xml, snapshot)?;
        }
        xml.end("measData")?;

        xml.start("fileFooter", &[])?;
        xml.empty("measCollec", &[("endTime", &to_iso8601(&window_end))])?;
        xml.end("fileFooter")?;

        xml.end("measCollecFile")?;
        Ok(xml.finish())
    }

    fn render_meas_info(&self, xml: &mut XmlOut, snapshot: &BufferedSnapshot) -> Result<()> {
        xml.start("measInfo", &[])?;
        xml.empty("job", &[("jobId", &snapshot.job_id)])?;
        xml.empty(
            "granPeriod",
            &[
                ("duration", &iso_duration(snapshot.granularity_period)),
                ("endTime", &to_iso8601(&snapshot.captured_at)),
            ],
        )?;
        xml.empty(
            "repPeriod",
            &[("duration", &iso_duration(self.settings.reporting_period))],
        )?;

        let mut seen = HashSet::new();
        let types: Vec<_> = snapshot
            .event
            .measurements()
            .iter()
            .filter(|group| {
                !EXCLUDED_GROUPS
                    .iter()
                    .any(|excluded| excluded.eq_ignore_ascii_case(&group.name))
            })
            .filter(|group| seen.insert(group.name.as_str()))
            .collect();

        for (index, group) in types.iter().enumerate() {
            let position = (index + 1).to_string();
            xml.text_element("measType", &[("p", &position)], &group.name)?;
        }

        xml.start("measValue", &[("measObjLdn", &snapshot.cell_id)])?;
        for (index, group) in types.iter().enumerate() {
            let position = (index + 1).to_string();
            xml.text_element("r", &[("p", &position)], &group.measurement_value())?;
        }
        xml.end("measValue")?;
        xml.end("measInfo")
    }
}

/// `D<yyyyMMdd>.<HHmm>Z-<yyyyMMdd>.<HHmm>Z` with both times floored to five minutes.
/// Create `path` and fill it with `write`. A failed write leaves no file behind.
fn persist(path: &Path, write: impl FnOnce(&mut File) -> io::Result<()>) -> Result<PathBuf> {
    let artifact = TempArtifact::new(path);
    let mut file = File::create(path).map_err(|err| ReportError::io(path, err))?;
    write(&mut file).map_err(|err| ReportError::io(path, err))?;
    Ok(artifact.keep())
}

pub fn file_base_name(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    let start_floor = floor_to_five_minutes(start);
    let end_floor = floor_to_five_minutes(end);
    format!(
        "D{}.{}Z-{}.{}Z",
        start.format("%Y%m%d"),
        start_floor.format("%H%M"),
        end.format("%Y%m%d"),
        end_floor.format("%H%M"),
    )
}

fn iso_duration(period: Duration) -> String {
    format!("PT{}S", period.as_secs())
}

struct XmlOut {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|err| ReportError::Xml(err.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Start(element))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Empty(element))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }
}
