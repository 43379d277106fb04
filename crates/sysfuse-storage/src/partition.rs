use crate::error::{Result, StorageError};
use crate::{record, PartitionInfo};
use chrono::{NaiveDate, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// First column of every partition header.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

pub fn partition_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn partition_path(data_dir: &Path, date: NaiveDate) -> PathBuf {
    data_dir.join(format!("{}.csv", partition_key(date)))
}

/// One open day file together with the header frozen for it.
pub(crate) struct DayPartition {
    date: NaiveDate,
    path: PathBuf,
    file: File,
    header: Option<Vec<String>>,
}

impl DayPartition {
    /// Opens (or creates) the partition for `date` in append mode.
    ///
    /// A non-empty existing file is a restart within the same day: its first
    /// record becomes the frozen header, and a torn last row is terminated so
    /// new rows start on a fresh line.
    ///
    /// An existing file whose header cannot be read is renamed to
    /// `<date>.csv.invalid` and a fresh file is started in its place.
    pub(crate) fn open(data_dir: &Path, date: NaiveDate) -> Result<Self> {
        let path = partition_path(data_dir, date);
        match Self::open_path(path.clone(), date) {
            Err(StorageError::InvalidHeader { reason, .. }) => {
                let aside = set_aside(&path)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    reason = %reason,
                    "Existing partition has an unreadable header, starting a fresh file"
                );
                Self::open_path(path, date)
            }
            opened => opened,
        }
    }

    fn open_path(path: PathBuf, date: NaiveDate) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(StorageError::io(&path))?;

        let len = file.metadata().map_err(StorageError::io(&path))?.len();
        let header = if len > 0 {
            let header = read_header(&path)?;
            if !ends_with_newline(&mut file).map_err(StorageError::io(&path))? {
                tracing::warn!(path = %path.display(), "Terminating torn row left by previous run");
                file.write_all(b"\n").map_err(StorageError::io(&path))?;
            }
            Some(header)
        } else {
            None
        };

        Ok(Self {
            date,
            path,
            file,
            header,
        })
    }

    pub(crate) fn date(&self) -> NaiveDate {
        self.date
    }

    pub(crate) fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Writes `header` as the first record and freezes it for the day.
    pub(crate) fn write_header(&mut self, header: Vec<String>) -> Result<()> {
        self.append(&record::encode(&header))?;
        self.header = Some(header);
        Ok(())
    }

    pub(crate) fn write_row(&mut self, row: &[String]) -> Result<()> {
        self.append(&record::encode(row))
    }

    /// Appends and syncs, so a row is on disk once this returns.
    fn append(&mut self, line: &str) -> Result<()> {
        self.file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.flush())
            .and_then(|()| self.file.sync_data())
            .map_err(StorageError::io(&self.path))
    }

    pub(crate) fn close(self) {
        if let Err(e) = self.file.sync_all() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to sync partition on close");
        }
        tracing::info!(partition = %partition_key(self.date), "Closed partition");
    }
}

/// Reads the first record of `path`, which may span several physical lines
/// when a quoted column name contains a line break.
fn read_header(path: &Path) -> Result<Vec<String>> {
    let invalid = |reason: &str| StorageError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut reader = BufReader::new(File::open(path).map_err(StorageError::io(path))?);
    let mut raw = Vec::new();
    let fields = loop {
        let read = reader
            .read_until(b'\n', &mut raw)
            .map_err(StorageError::io(path))?;
        let text = std::str::from_utf8(&raw).map_err(|_| invalid("header is not valid UTF-8"))?;
        if let Some(fields) = record::decode(text.trim_end_matches(['\r', '\n'])) {
            break fields;
        }
        if read == 0 {
            return Err(invalid("unterminated quoted field"));
        }
    };

    if fields.first().map(String::as_str) != Some(TIMESTAMP_COLUMN) {
        return Err(invalid("first column is not 'timestamp'"));
    }
    Ok(fields)
}

/// Renames `path` to the first free `<name>.invalid[.N]`.
fn set_aside(path: &Path) -> Result<PathBuf> {
    let mut base = path.as_os_str().to_owned();
    base.push(".invalid");
    let mut target = PathBuf::from(&base);
    let mut n = 1u32;
    while target.exists() {
        let mut numbered = base.clone();
        numbered.push(format!(".{n}"));
        target = PathBuf::from(numbered);
        n += 1;
    }
    std::fs::rename(path, &target).map_err(StorageError::io(path))?;
    Ok(target)
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Lists `<YYYY-MM-DD>.csv` files in `data_dir` with their dates.
fn partition_files(data_dir: &Path) -> Result<Vec<(NaiveDate, std::fs::DirEntry)>> {
    let mut found = Vec::new();
    let entries = std::fs::read_dir(data_dir).map_err(StorageError::io(data_dir))?;
    for entry in entries {
        let entry = entry.map_err(StorageError::io(data_dir))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(date_str) = name.strip_suffix(".csv") {
            if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                found.push((date, entry));
            }
        }
    }
    found.sort_by_key(|(date, _)| *date);
    Ok(found)
}

/// Deletes partitions dated before `today - retention_days`, never touching
/// `keep` (the partition currently open for writing).
pub(crate) fn remove_older_than(
    data_dir: &Path,
    retention_days: u32,
    keep: Option<NaiveDate>,
) -> Result<u32> {
    let cutoff = (Utc::now() - chrono::Duration::days(i64::from(retention_days))).date_naive();
    let mut removed = 0u32;

    for (date, entry) in partition_files(data_dir)? {
        if date >= cutoff || Some(date) == keep {
            continue;
        }
        // Best-effort: log errors, don't abort
        if let Err(e) = std::fs::remove_file(entry.path()) {
            tracing::error!(partition = %partition_key(date), error = %e, "Failed to remove partition file");
            continue;
        }
        tracing::info!(partition = %partition_key(date), "Removed expired partition");
        removed += 1;
    }

    Ok(removed)
}

pub(crate) fn list(data_dir: &Path) -> Result<Vec<PartitionInfo>> {
    partition_files(data_dir)?
        .into_iter()
        .map(|(date, entry)| -> Result<PartitionInfo> {
            let metadata = entry.metadata().map_err(StorageError::io(entry.path()))?;
            Ok(PartitionInfo {
                date: partition_key(date),
                size_bytes: metadata.len(),
                path: entry.path().to_string_lossy().to_string(),
            })
        })
        .collect()
}
