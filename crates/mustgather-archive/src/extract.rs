use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tar::Archive;
use tracing::{debug, error};
use xz2::read::XzDecoder;

use mustgather_logs::LogSubmitter;
use mustgather_types::{MustGatherLog, PodNetworkChecks, RawFile};

use crate::classifier::{EntryKind, classify, normalize_relative_path, pod_log_location};
use crate::error::{ArchiveError, Result};
use crate::netcheck::parse_pod_network_checks;

/// File name the event filter export is saved under
pub const EVENT_FILTER_FILE: &str = "event-filter.html";

/// Collections filled while walking the archive, each behind its own lock
#[derive(Debug, Default)]
pub struct ExtractSink {
    pub raw_files: Mutex<Vec<RawFile>>,
    pub pod_network_checks: Mutex<PodNetworkChecks>,
}

/// Counters of a completed walk
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Entries read from the tar stream
    pub entries: usize,
    pub pod_logs: usize,
    pub event_files: usize,
    pub raw_files: usize,
    pub network_checks: usize,
    /// Matched entries dropped after a copy or parse error
    pub failed: usize,
}

/// Walks one must-gather tar stream
pub struct ArchiveWalker<'a> {
    save_dir: Option<&'a Path>,
    submitter: &'a LogSubmitter,
    sink: &'a ExtractSink,
}

impl<'a> ArchiveWalker<'a> {
    pub fn new(save_dir: Option<&'a Path>, submitter: &'a LogSubmitter, sink: &'a ExtractSink) -> Self {
        Self {
            save_dir,
            submitter,
            sink,
        }
    }

    /// Decompress an XZ tar stream and dispatch every classified regular
    /// file. Pod logs are handed to the pipeline without waiting for the
    /// analysis.
    pub fn walk_xz<R: Read>(&self, reader: R) -> Result<WalkSummary> {
        self.walk_tar(XzDecoder::new_multi_decoder(reader))
    }

    /// Walk an uncompressed tar stream
    pub fn walk_tar<R: Read>(&self, reader: R) -> Result<WalkSummary> {
        if let Some(dir) = self.save_dir {
            ensure_dir(dir)?;
        }

        let mut summary = WalkSummary::default();
        let mut archive = Archive::new(reader);

        for entry in archive.entries()? {
            let mut entry = entry?;
            summary.entries += 1;

            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => {
                    error!("must-gather processor: invalid entry path: {}", e);
                    continue;
                }
            };

            let Some(kind) = classify(&name) else {
                continue;
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let alias = normalize_relative_path(&name);
            let handled = match kind {
                EntryKind::PodLog => self.pod_log(&mut entry, alias, &mut summary),
                EntryKind::EventFilter => self.event_filter(&mut entry, &alias, &mut summary),
                EntryKind::RawFile => self.raw_file(&mut entry, &name, alias, &mut summary),
                EntryKind::PodNetworkCheck => self.network_check(&mut entry, &alias, &mut summary),
            };
            if !handled {
                summary.failed += 1;
            }
        }

        Ok(summary)
    }

    fn pod_log(&self, entry: &mut impl Read, alias: String, summary: &mut WalkSummary) -> bool {
        let mut buffer = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buffer) {
            error!("must-gather processor/podLogs: error copying buffer for {}: {}", alias, e);
            return false;
        }

        let (namespace, pod, container) = match pod_log_location(&alias) {
            Some(location) => (location.namespace, location.pod, location.container),
            None => {
                error!("must-gather processor/podLogs: unable to locate pod from path {}", alias);
                Default::default()
            }
        };

        self.submitter
            .submit(MustGatherLog::new(alias, namespace, pod, container), buffer);
        summary.pod_logs += 1;
        true
    }

    fn event_filter(&self, entry: &mut impl Read, alias: &str, summary: &mut WalkSummary) -> bool {
        let Some(dir) = self.save_dir else {
            debug!("skipping file {}", alias);
            return true;
        };

        let target = dir.join(EVENT_FILTER_FILE);
        let copied = File::create(&target).and_then(|mut file| io::copy(entry, &mut file));
        match copied {
            Ok(bytes) => {
                debug!("Must-gather saved {} ({} bytes) to {}", alias, bytes, target.display());
                summary.event_files += 1;
                true
            }
            Err(e) => {
                error!("must-gather processor: error saving {}: {}", target.display(), e);
                false
            }
        }
    }

    fn raw_file(
        &self,
        entry: &mut impl Read,
        name: &str,
        alias: String,
        summary: &mut WalkSummary,
    ) -> bool {
        debug!("Must-gather extracting file {}", alias);
        let mut buffer = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buffer) {
            error!("error copying rawfile {}: {}", alias, e);
            return false;
        }

        let path_alias = (alias != name).then(|| name.to_string());
        self.sink.raw_files.lock().push(RawFile {
            path: alias,
            path_alias,
            data: String::from_utf8_lossy(&buffer).into_owned(),
        });
        summary.raw_files += 1;
        true
    }

    fn network_check(&self, entry: &mut impl Read, alias: &str, summary: &mut WalkSummary) -> bool {
        debug!("Must-gather extracting file {}", alias);
        let mut buffer = Vec::new();
        if let Err(e) = entry.read_to_end(&mut buffer) {
            error!("error copying podNetCheck {}: {}", alias, e);
            return false;
        }

        let mut checks = self.sink.pod_network_checks.lock();
        match parse_pod_network_checks(&buffer, &mut checks) {
            Ok(inserted) => {
                debug!("Must-gather parsed {} pod network checks from {}", inserted, alias);
                summary.network_checks += inserted;
                true
            }
            Err(e) => {
                error!("error parsing yaml podNetCheck: {}", e);
                false
            }
        }
    }
}

/// Create the save directory when missing
fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| ArchiveError::CreateDir {
        path: PathBuf::from(dir),
        source,
    })
}
