pub use std::{
    io::{BufRead, BufReader, Write},
    collections::HashSet,
    ops::RangeInclusive,
    path::PathBuf,
    fmt,
};
pub use thiserror::Error;
pub use itertools::Itertools;
pub use indexmap::IndexMap;
pub use clap::{Parser, ValueEnum};
pub use tracing::{debug, info, trace, warn};

pub use crate::{Job, PagePool,
    jobset::*,
};

/// The unit for measuring simulated time. One tick is one discrete step
/// of [`crate::algo::Sim`].
pub type Ticks = u64;

/// Job identities are positive. Zero is rejected at load time, so that
/// nothing downstream ever has to wonder whether `0` means "free".
pub type JobId = u32;

/// Index of a page inside a [`PagePool`]. Page counts use it too.
pub type PageIdx = usize;

/// The job table. Kept sorted by ascending id, which is the order in
/// which waiting jobs get to try for memory.
pub type JobSet = IndexMap<JobId, Job>;

pub const DEFAULT_TOTAL_MEMORY_KB: usize = 20;
pub const DEFAULT_PAGE_SIZE_KB: usize = 1;
pub const DEFAULT_MAX_TICKS: Ticks = 1000;
/// How many pages the memory map prints per row.
pub const DEFAULT_REPORT_COLUMNS: usize = 5;

/// An allocated run of pages. Both endpoints are *inclusive*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageSpan {
    pub start:  PageIdx,
    pub end:    PageIdx,
}

impl PageSpan {
    /// Spans are never empty: `len` must be positive.
    #[inline(always)]
    pub fn new(start: PageIdx, len: PageIdx) -> Self {
        debug_assert!(len > 0, "Empty page span requested");
        Self {
            start,
            end: start + len - 1,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> PageIdx {
        self.end - self.start + 1
    }

    #[inline(always)]
    pub fn contains(&self, idx: PageIdx) -> bool {
        self.start <= idx && idx <= self.end
    }

    #[inline(always)]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    #[inline(always)]
    pub fn range(&self) -> RangeInclusive<PageIdx> {
        self.start..=self.end
    }
}

impl fmt::Display for PageSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Where a [`Job`] currently stands.
///
/// The main line is `Waiting -> Running -> Completed -> Deallocated`.
/// `Sleep` and `End` are side states for jobs that were parked because
/// of their label; they are never scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    End,
    Sleep,
    Waiting,
    Running,
    Completed,
    Deallocated,
}

impl JobState {
    /// Nothing will ever happen to a job in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Deallocated | JobState::Sleep | JobState::End)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::End           => "End",
            JobState::Sleep         => "Sleep",
            JobState::Waiting       => "Waiting",
            JobState::Running       => "Running",
            JobState::Completed     => "Completed",
            JobState::Deallocated   => "Completed (Deallocated)",
        };
        f.write_str(name)
    }
}

/// Typed reading of a job's initial-state column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateLabel {
    Waiting,
    Running,
    Sleep,
    End,
    Other(String),
}

impl StateLabel {
    /// Whether this label asks for the job to be kept off the pool.
    pub fn parks(&self) -> Option<JobState> {
        match self {
            StateLabel::Sleep   => Some(JobState::Sleep),
            StateLabel::End     => Some(JobState::End),
            _                   => None,
        }
    }
}

impl From<&str> for StateLabel {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting"   => StateLabel::Waiting,
            "running"   => StateLabel::Running,
            "sleep"     => StateLabel::Sleep,
            "end"       => StateLabel::End,
            _           => StateLabel::Other(s.trim().to_string()),
        }
    }
}

//---START ERRORS
/// Failures of the [`PagePool`] primitives and of the allocator.
///
/// Only [`InsufficientMemory`](MemoryError::InsufficientMemory) and
/// [`NothingToRelease`](MemoryError::NothingToRelease) are part of normal
/// operation. The other two mean the bookkeeping is broken and the run
/// must stop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("range of {count} pages at {start} falls outside a pool of {pool} pages")]
    OutOfBounds {
        start:  PageIdx,
        count:  PageIdx,
        pool:   PageIdx,
    },
    #[error("page {page} is already owned by job {owner} (requested by job {requested_by})")]
    AllocationConflict {
        page:           PageIdx,
        owner:          JobId,
        requested_by:   JobId,
    },
    #[error("no run of {requested} free pages for job {job} ({free} pages free in total)")]
    InsufficientMemory {
        job:        JobId,
        requested:  PageIdx,
        free:       PageIdx,
    },
    #[error("job {0} holds no pages")]
    NothingToRelease(JobId),
}

impl MemoryError {
    /// `true` for the variants that signal broken bookkeeping.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MemoryError::OutOfBounds { .. } | MemoryError::AllocationConflict { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("page size must be positive")]
    ZeroPageSize,
    #[error("total memory size must be positive")]
    ZeroMemory,
    #[error("total memory of {total_kb} KB is not a multiple of the {page_kb} KB page size")]
    NotDivisible {
        total_kb:   usize,
        page_kb:    usize,
    },
}

/// Why a single record of a job table was skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordErrorKind {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("field `{field}` is not a non-negative integer: {value:?}")]
    BadNumber {
        field:  &'static str,
        value:  String,
    },
    #[error("job id must be positive")]
    ZeroId,
    #[error("job {0} requires no pages")]
    ZeroSize(JobId),
    #[error("job id {0} was already loaded")]
    DuplicateId(JobId),
    #[error("record is not valid UTF-8")]
    Encoding,
}

/// A skipped record. Recoverable: loading goes on without it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {kind} ({text:?})")]
pub struct RecordError {
    pub line:   usize,
    pub text:   String,
    pub kind:   RecordErrorKind,
}

#[derive(Error, Debug)]
#[error("{message}\n{culprit:?}")]
/// Appears while constructing the [JobSet] of jobs to be
/// simulated.
pub struct JobError {
    pub message: String,
    pub culprit: Job,
}

/// Failures that abort loading a whole job table.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not read job table {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Job(#[from] JobError),
}
//---END ERRORS

//---START CONFIGURATION
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum JobFit {
    /// Lowest-addressed free run that fits
    #[default]
    First,
    /// Smallest free run that fits
    Best,
}

/// Everything a [`crate::algo::Sim`] needs besides its jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConfig {
    pub total_memory_kb:    usize,
    pub page_size_kb:       usize,
    /// Starvation guard. The run stops after this many ticks even if
    /// some jobs never got their pages.
    pub max_ticks:          Ticks,
    pub fit:                JobFit,
    /// Park jobs labelled `Sleep`/`End` instead of scheduling them.
    pub honor_labels:       bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            total_memory_kb:    DEFAULT_TOTAL_MEMORY_KB,
            page_size_kb:       DEFAULT_PAGE_SIZE_KB,
            max_ticks:          DEFAULT_MAX_TICKS,
            fit:                JobFit::First,
            honor_labels:       false,
        }
    }
}

impl SimConfig {
    /// Number of pages in the pool. Memory must split into whole pages.
    pub fn page_count(&self) -> Result<PageIdx, ConfigError> {
        if self.page_size_kb == 0 {
            Err(ConfigError::ZeroPageSize)
        } else if self.total_memory_kb == 0 {
            Err(ConfigError::ZeroMemory)
        } else if self.total_memory_kb % self.page_size_kb != 0 {
            Err(ConfigError::NotDivisible {
                total_kb:   self.total_memory_kb,
                page_kb:    self.page_size_kb,
            })
        } else {
            Ok(self.total_memory_kb / self.page_size_kb)
        }
    }
}
//---END CONFIGURATION

//---START RUN RESULTS
/// One state change of one job, as observed by the clock driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub tick:   Ticks,
    pub job:    JobId,
    pub from:   JobState,
    pub to:     JobState,
    /// The pages involved: the ones granted on admission, or the ones
    /// given back on deallocation.
    pub pages:  Option<PageSpan>,
}

/// What a finished run has to say for itself.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Number of ticks processed.
    pub ticks:          Ticks,
    pub completed:      Vec<JobId>,
    /// Schedulable jobs that never reached `Deallocated`.
    pub unresolved:     Vec<JobId>,
    /// Jobs kept off the pool because of their label.
    pub parked:         Vec<JobId>,
    pub transitions:    Vec<Transition>,
    pub peak_pages:     PageIdx,
    pub mean_wait:      Option<f64>,
    pub mean_turnaround: Option<f64>,
}

impl RunReport {
    /// The tick budget ran out with work left.
    pub fn starved(&self) -> bool {
        !self.unresolved.is_empty()
    }
}
//---END RUN RESULTS

/// Defines the interface for reading jobs.
///
/// We ship a reader for tab-separated job tables. The user can
/// implement their own types as needed.
pub trait JobGen<T> {
    fn new(path: PathBuf) -> Self;
    /// Either the valid records (plus diagnostics for the skipped ones)
    /// are returned, or the source could not be read at all.
    fn read_jobs(&self) -> Result<Loaded, LoadError>;
    /// Uses one unit of source data to spawn one [Job].
    fn gen_single(&self, d: T, line: usize) -> Result<Job, RecordError>;
}

/// Output of [JobGen::read_jobs].
#[derive(Debug, Default)]
pub struct Loaded {
    pub jobs:       Vec<Job>,
    pub skipped:    Vec<RecordError>,
}

//---START EXTERNAL INTERFACES
pub const TSV_FIELDS_NUM: usize = 5;

/// Reads job tables of the form
///
/// `id <TAB> arrival <TAB> pages <TAB> duration <TAB> label`
///
/// one job per line. Blank lines are ignored, bad lines are skipped.
pub struct TsvParser {
    pub path: PathBuf,
}

impl TsvParser {
    /// Does the actual work of [JobGen::read_jobs] on any line source.
    pub fn parse_reader<R: BufRead>(&self, reader: R) -> Result<Loaded, LoadError> {
        let mut res = Loaded::default();
        let mut seen: HashSet<JobId> = HashSet::new();
        for (idx, raw) in reader.split(b'\n').enumerate() {
            let raw = raw.map_err(|source| LoadError::Io {
                origin: self.path.display().to_string(),
                source,
            })?;
            // Undecodable bytes cost the record, not the table.
            let decoded = String::from_utf8(raw).map_err(|e| RecordError {
                line:   idx + 1,
                text:   String::from_utf8_lossy(e.as_bytes()).replace('\r', ""),
                kind:   RecordErrorKind::Encoding,
            });
            let line = match decoded {
                Ok(l)   => l.replace('\r', ""),
                Err(e)  => {
                    warn!("Skipping record: {e}");
                    res.skipped.push(e);
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let outcome = self.gen_single(&line, idx + 1)
                .and_then(|j| {
                    if seen.insert(j.id) {
                        Ok(j)
                    } else {
                        Err(RecordError {
                            line:   idx + 1,
                            text:   line.clone(),
                            kind:   RecordErrorKind::DuplicateId(j.id),
                        })
                    }
                });
            match outcome {
                Ok(j)   => { res.jobs.push(j); },
                Err(e)  => {
                    warn!("Skipping record: {e}");
                    res.skipped.push(e);
                }
            }
        }

        Ok(res)
    }
}

fn parse_field<N: std::str::FromStr>(
    raw:    &str,
    field:  &'static str,
) -> Result<N, RecordErrorKind> {
    raw.trim()
        .parse::<N>()
        .map_err(|_| RecordErrorKind::BadNumber {
            field,
            value: raw.to_string(),
        })
}

fn parse_record(segments: &[&str]) -> Result<Job, RecordErrorKind> {
    let id: JobId = parse_field(segments[0], "id")?;
    let arrival: Ticks = parse_field(segments[1], "arrival")?;
    let size: PageIdx = parse_field(segments[2], "pages")?;
    let duration: Ticks = parse_field(segments[3], "duration")?;
    if id == 0 {
        return Err(RecordErrorKind::ZeroId);
    }
    if size == 0 {
        return Err(RecordErrorKind::ZeroSize(id));
    }

    Ok(Job::new(id, arrival, size, duration, segments[4].trim()))
}

impl JobGen<&str> for TsvParser {
    fn new(path: PathBuf) -> Self {
        Self {
            path
        }
    }

    fn read_jobs(&self) -> Result<Loaded, LoadError> {
        let fd = std::fs::File::open(&self.path)
            .map_err(|source| LoadError::Io {
                origin: self.path.display().to_string(),
                source,
            })?;
        self.parse_reader(BufReader::new(fd))
    }

    fn gen_single(&self, d: &str, line: usize) -> Result<Job, RecordError> {
        let fail = |kind| RecordError {
            line,
            text: d.to_string(),
            kind,
        };
        let segments: Vec<&str> = d.split('\t').collect();
        if segments.len() != TSV_FIELDS_NUM {
            return Err(fail(RecordErrorKind::FieldCount(segments.len())));
        }
        parse_record(&segments).map_err(fail)
    }
}

/// Writes jobs in the format [TsvParser] reads.
pub fn write_tsv<W: Write>(jobs: &[Job], mut out: W) -> std::io::Result<()> {
    for j in jobs {
        writeln!(out, "{}\t{}\t{}\t{}\t{}", j.id, j.arrival, j.size, j.duration, j.label)?;
    }

    Ok(())
}

/// Knobs for [random_jobs].
#[derive(Debug, Clone, Copy)]
pub struct GenParams {
    pub count:          JobId,
    pub max_arrival:    Ticks,
    pub max_size:       PageIdx,
    pub max_duration:   Ticks,
}

/// A synthetic workload with ids `1..=count`. The same seed always
/// yields the same jobs.
pub fn random_jobs(params: &GenParams, seed: u64) -> Vec<Job> {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let mut rng = StdRng::seed_from_u64(seed);
    (1..=params.count)
        .map(|i| {
            let arrival = rng.gen_range(0..=params.max_arrival);
            let size = rng.gen_range(1..=params.max_size.max(1));
            let duration = rng.gen_range(1..=params.max_duration.max(1));
            Job::new(i, arrival, size, duration, "Waiting")
        })
        .collect()
}
//---END EXTERNAL INTERFACES

/// Reads a job table and passes it through [init].
pub fn read_from_path<T, B>(file_path: PathBuf) -> Result<(JobSet, Vec<RecordError>), LoadError>
where T: JobGen<B> {
    let parser = T::new(file_path);
    let Loaded { jobs, skipped } = parser.read_jobs()?;
    let set = crate::jobset::init(jobs)?;

    Ok((set, skipped))
}
