//! ---
//! sim_section: "04-bulk-reporting"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Bulk report buffering, compilation, and shipping."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cellsim_common::config::TransferConfig;
use cellsim_ves::VesEvent;
use flate2::write::GzEncoder;
use flate2::Compression;
use ssh2::Session;
use tracing::{debug, error, info, trace, warn};

use crate::compiler::CompiledReport;
use crate::error::{ReportError, Result};
use crate::file_ready::FileReadyBuilder;

/// A temporary file removed exactly once: explicitly, or on drop.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    removed: bool,
}

impl TempArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(mut self) {
        self.remove_once();
    }

    /// Disarm the cleanup and hand back the path.
    pub fn keep(mut self) -> PathBuf {
        self.removed = true;
        std::mem::take(&mut self.path)
    }

    fn remove_once(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        match fs::remove_file(&self.path) {
            Ok(()) => trace!(path = %self.path.display(), "temporary file deleted"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => error!(path = %self.path.display(), error = %err, "could not delete temporary file"),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.remove_once();
    }
}

pub trait Compressor: Send + Sync {
    fn extension(&self) -> &'static str;

    fn compress(&self, source: &Path, target: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn extension(&self) -> &'static str {
        "gz"
    }

    fn compress(&self, source: &Path, target: &Path) -> Result<()> {
        let compression = |err| ReportError::Compression {
            path: source.to_path_buf(),
            source: err,
        };
        let mut input = BufReader::new(File::open(source).map_err(compression)?);
        let output = BufWriter::new(File::create(target).map_err(compression)?);
        let mut encoder = GzEncoder::new(output, self.level);
        io::copy(&mut input, &mut encoder).map_err(compression)?;
        encoder.finish().map_err(compression)?.flush().map_err(compression)?;
        Ok(())
    }
}

/// Moves an archive to wherever the collector will fetch it from.
pub trait ReportUploader: Send + Sync {
    fn upload(&self, archive: &Path, file_name: &str) -> Result<()>;
}

/// SFTP upload with password authentication. The host key is not verified.
#[derive(Debug, Clone)]
pub struct SftpUploader {
    host: String,
    port: u16,
    username: String,
    password: String,
    remote_path: String,
    timeout: Duration,
}

impl SftpUploader {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
            remote_path: config.remote_path.clone(),
            timeout: config.timeout,
        }
    }

    fn open_session(&self) -> std::result::Result<Session, String> {
        let address = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|err| err.to_string())?
            .next()
            .ok_or_else(|| format!("{} did not resolve", self.host))?;
        let tcp = TcpStream::connect_timeout(&address, self.timeout).map_err(|err| err.to_string())?;
        let mut session = Session::new().map_err(|err| err.to_string())?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake().map_err(|err| err.to_string())?;
        session
            .userauth_password(&self.username, &self.password)
            .map_err(|err| err.to_string())?;
        Ok(session)
    }
}

impl ReportUploader for SftpUploader {
    fn upload(&self, archive: &Path, file_name: &str) -> Result<()> {
        let failed = |reason: String| ReportError::Upload {
            file_name: file_name.to_owned(),
            reason,
        };
        let session = self.open_session().map_err(failed)?;
        let sftp = session.sftp().map_err(|err| failed(err.to_string()))?;
        let remote = Path::new(&self.remote_path).join(file_name);
        let mut remote_file = sftp.create(&remote).map_err(|err| failed(err.to_string()))?;
        let mut local = File::open(archive).map_err(|err| ReportError::io(archive, err))?;
        io::copy(&mut local, &mut remote_file).map_err(|err| failed(err.to_string()))?;
        info!(host = %self.host, remote = %remote.display(), "report uploaded over sftp");
        Ok(())
    }
}

/// Copies the archive into a locally mounted directory.
#[derive(Debug, Clone)]
pub struct LocalMountCopier {
    mount: PathBuf,
}

impl LocalMountCopier {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }
}

impl ReportUploader for LocalMountCopier {
    fn upload(&self, archive: &Path, file_name: &str) -> Result<()> {
        fs::create_dir_all(&self.mount).map_err(|err| ReportError::io(&self.mount, err))?;
        let target = self.mount.join(file_name);
        fs::copy(archive, &target).map_err(|err| ReportError::Upload {
            file_name: file_name.to_owned(),
            reason: err.to_string(),
        })?;
        info!(target = %target.display(), "report copied to local mount");
        Ok(())
    }
}

/// Select the uploader named by configuration.
pub fn uploader_from_config(config: &TransferConfig) -> Arc<dyn ReportUploader> {
    if config.remote {
        Arc::new(SftpUploader::from_config(config))
    } else {
        Arc::new(LocalMountCopier::new(config.local_mount.clone()))
    }
}

/// A shipped report whose notification still has to be dispatched.
///
/// The archive is deleted by [`ReadyReport::complete`] or when the value is dropped.
#[derive(Debug)]
pub struct ReadyReport {
    pub notification: VesEvent,
    pub archive_name: String,
    archive: TempArtifact,
}

impl ReadyReport {
    pub fn archive_path(&self) -> &Path {
        self.archive.path()
    }

    /// Call once dispatch of the notification has been attempted.
    pub fn complete(self) {
        self.archive.remove();
    }
}

/// Compress, ship, and announce a compiled report.
pub struct TransferPipeline {
    compressor: Arc<dyn Compressor>,
    uploader: Arc<dyn ReportUploader>,
    file_ready: FileReadyBuilder,
}

impl std::fmt::Debug for TransferPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferPipeline")
            .field("file_ready", &self.file_ready)
            .finish()
    }
}

impl TransferPipeline {
    pub fn new(
        compressor: Arc<dyn Compressor>,
        uploader: Arc<dyn ReportUploader>,
        file_ready: FileReadyBuilder,
    ) -> Self {
        Self {
            compressor,
            uploader,
            file_ready,
        }
    }

    /// Any failure deletes both temporary files and yields no notification.
    pub fn ship(&self, report: CompiledReport) -> Result<ReadyReport> {
        let original = TempArtifact::new(report.path.clone());
        let archive_name = format!("{}.{}", report.file_name, self.compressor.extension());
        let archive = TempArtifact::new(report.path.with_file_name(&archive_name));

        if let Err(err) = self.compressor.compress(original.path(), archive.path()) {
            warn!(file = %report.file_name, error = %err, "report compression failed");
            return Err(err);
        }
        debug!(archive = %archive.path().display(), "report compressed");

        if let Err(err) = self.uploader.upload(archive.path(), &archive_name) {
            warn!(file = %archive_name, error = %err, "report transfer failed");
            return Err(err);
        }
        original.remove();

        let notification = self
            .file_ready
            .build(&archive_name, report.window_start, report.window_end);
        Ok(ReadyReport {
            notification,
            archive_name,
            archive,
        })
    }
}
