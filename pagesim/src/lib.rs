//! Welcome to `pagesim`!

mod job;
mod pool;
mod analyze;

pub mod algo;
pub mod jobset;
pub mod report;
pub mod helpe;

pub use crate::helpe::*;
pub use crate::analyze::{check_consistency, InvariantError};

/// Our fundamental unit of interest. A [`Job`] is a complete description
/// of one consumer of memory pages:
///
/// 1. It becomes eligible for memory at tick [`arrival`](Job::arrival),
///     asking for [`size`](Job::size) contiguous pages.
/// 2. Once admitted, it stays resident for [`duration`](Job::duration)
///     ticks and then gives its pages back.
///
/// The declared fields are frozen after loading. Everything else is
/// runtime state, mutated only by [`algo::Sim`].
///
/// > ***ATTENTION:*** [`pages`](Job::pages) is `Some` if and only if
/// > [`allocated`](Job::allocated) is set. Whenever that holds, the span is
/// > exactly [`size`](Job::size) pages long and every one of those pages
/// > is owned by this job in the [`PagePool`].
#[derive(Debug, Clone)]
pub struct Job {
    pub id:             JobId,
    pub arrival:        Ticks,
    pub size:           PageIdx,
    pub duration:       Ticks,
    /// The initial-state column exactly as read. Kept for reporting.
    pub label:          String,
    /// Parsed once from [`label`](Job::label). Only a hint, see
    /// [`SimConfig::honor_labels`].
    pub hint:           StateLabel,

    pub state:          JobState,
    pub remaining:      Ticks,
    pub time_in_memory: Ticks,
    pub pages:          Option<PageSpan>,
    pub allocated:      bool,
    pub completed:      bool,
    pub deallocated:    bool,
    // Used for statistics mostly.
    pub started_at:     Option<Ticks>,
    pub finished_at:    Option<Ticks>,
}

/// The fixed array of pages all jobs compete for.
///
/// Every page is either free (`None`) or owned by exactly one job.
/// There is no global instance: whoever drives a simulation owns its
/// pool and hands it to the allocator explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePool {
    pages: Vec<Option<JobId>>,
}
