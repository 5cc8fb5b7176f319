//! Job store
//!
//! Read-only access to uploaded job files. A job is an ordered sequence of
//! text lines; lines are opaque and only ever split and trimmed for blanks.

use crate::error::JobError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Lazily produced job lines, in file order
pub type JobLines = Box<dyn Iterator<Item = io::Result<String>> + Send>;

/// Source of named job files
pub trait JobStore: Send + Sync {
    /// Open a job for line-by-line reading
    fn open(&self, filename: &str) -> Result<JobLines, JobError>;

    /// Count the non-empty lines of a job
    fn count_lines(&self, filename: &str) -> Result<usize, JobError> {
        count_non_blank(filename, self.open(filename)?)
    }

    /// Count a job's non-empty lines and open it for streaming.
    ///
    /// Stores that can should count and stream the same content; the
    /// default reads the job twice.
    fn open_counted(&self, filename: &str) -> Result<(usize, JobLines), JobError> {
        let count = self.count_lines(filename)?;
        Ok((count, self.open(filename)?))
    }
}

fn count_non_blank<I>(filename: &str, lines: I) -> Result<usize, JobError>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut count = 0;
    for line in lines {
        let line = line.map_err(|e| read_error(filename, e))?;
        if !is_blank(&line) {
            count += 1;
        }
    }
    Ok(count)
}

fn read_error(filename: &str, e: io::Error) -> JobError {
    JobError::Read {
        filename: filename.to_string(),
        reason: e.to_string(),
    }
}

/// Empty or whitespace-only lines are never transmitted
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Reject names that would escape the store directory
pub fn validate_job_name(filename: &str) -> Result<(), JobError> {
    let invalid = filename.trim().is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename == "."
        || filename.contains("..")
        || Path::new(filename).is_absolute();

    if invalid {
        return Err(JobError::InvalidName {
            filename: filename.to_string(),
        });
    }
    Ok(())
}

/// Job store backed by the upload directory
#[derive(Debug, Clone)]
pub struct DirectoryJobStore {
    root: PathBuf,
}

impl DirectoryJobStore {
    /// Create a store reading from `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the store reads from
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn open_file(&self, filename: &str) -> Result<File, JobError> {
        validate_job_name(filename)?;
        let path = self.root.join(filename);

        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => JobError::NotFound {
                filename: filename.to_string(),
            },
            _ => JobError::Read {
                filename: filename.to_string(),
                reason: e.to_string(),
            },
        })?;

        if !file.metadata().map(|m| m.is_file()).unwrap_or(false) {
            return Err(JobError::NotFound {
                filename: filename.to_string(),
            });
        }
        Ok(file)
    }
}

fn file_lines(file: File) -> JobLines {
    let lines = BufReader::new(file)
        .lines()
        .map(|line| line.map(|l| l.trim_end_matches('\r').to_string()));
    Box::new(lines)
}

impl JobStore for DirectoryJobStore {
    fn open(&self, filename: &str) -> Result<JobLines, JobError> {
        Ok(file_lines(self.open_file(filename)?))
    }

    /// Counts and streams through one file handle, so a replacement upload
    /// landing in between cannot change what gets streamed
    fn open_counted(&self, filename: &str) -> Result<(usize, JobLines), JobError> {
        let mut file = self.open_file(filename)?;
        let count = count_non_blank(filename, BufReader::new(&file).lines())?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| read_error(filename, e))?;
        Ok((count, file_lines(file)))
    }
}

/// In-memory job store, used by tests and for scripted jobs
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryJobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a job
    pub fn insert<I, S>(&self, filename: impl Into<String>, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into).collect();
        self.jobs.write().insert(filename.into(), lines);
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }
}

impl MemoryJobStore {
    fn snapshot(&self, filename: &str) -> Result<Vec<String>, JobError> {
        self.jobs
            .read()
            .get(filename)
            .cloned()
            .ok_or_else(|| JobError::NotFound {
                filename: filename.to_string(),
            })
    }
}

impl JobStore for MemoryJobStore {
    fn open(&self, filename: &str) -> Result<JobLines, JobError> {
        let lines = self.snapshot(filename)?;
        Ok(Box::new(lines.into_iter().map(Ok::<String, io::Error>)))
    }

    fn open_counted(&self, filename: &str) -> Result<(usize, JobLines), JobError> {
        let lines = self.snapshot(filename)?;
        let count = lines.iter().filter(|l| !is_blank(l)).count();
        Ok((count, Box::new(lines.into_iter().map(Ok::<String, io::Error>))))
    }
}
