use crate::CoordinationStore;
use crate::Error;
use crate::OwnershipRecord;
use std::fs;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static TEMP_FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Coordination store backed by a single JSON file in a shared directory.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// record, so readers in other processes never see a half-written record.
/// The file survives the writer's death, which is what lets the next launch
/// detect a stale owner.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "single_launch.lock".to_string());
        let sequence = TEMP_FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        self.path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            sequence
        ))
    }
}

impl CoordinationStore for FileStore {
    fn read(&self) -> Result<OwnershipRecord, Error> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::trace!("No coordination record at {:?} yet", self.path);
                return Ok(OwnershipRecord::default());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(OwnershipRecord::default());
        }

        match serde_json::from_str(&contents) {
            Ok(record) => Ok(record),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable coordination record at {:?}: {}",
                    self.path,
                    e
                );
                Ok(OwnershipRecord::default())
            }
        }
    }

    fn write(&self, record: &OwnershipRecord) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec(record).map_err(std::io::Error::other)?;
        let temp_path = self.temp_path();
        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&temp_path, &self.path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        log::trace!("Wrote coordination record {:?} to {:?}", record, self.path);
        Ok(())
    }
}
