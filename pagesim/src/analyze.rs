use crate::helpe::*;

/// A breach of the two-way agreement between the [PagePool] and the
/// job table. Seeing one of these means a bug, never bad input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    #[error("job {0}: allocation flag and page span disagree")]
    FlagMismatch(JobId),
    #[error("job {job}: holds {held} pages but requires {size}")]
    WrongSpanSize {
        job:    JobId,
        held:   PageIdx,
        size:   PageIdx,
    },
    #[error("job {job}: holds pages while {state}")]
    HoldingWhile {
        job:    JobId,
        state:  JobState,
    },
    #[error("page {page}: recorded for job {job} but pool says {found:?}")]
    PageNotOwned {
        page:   PageIdx,
        job:    JobId,
        found:  Option<JobId>,
    },
    #[error("page {page}: owned by job {owner} outside of its recorded span")]
    StrayPage {
        page:   PageIdx,
        owner:  JobId,
    },
    #[error("jobs {0} and {1} hold overlapping spans")]
    Overlap(JobId, JobId),
    #[error("{held} pages allocated out of {total}")]
    Overcommitted {
        held:   PageIdx,
        total:  PageIdx,
    },
}

/// Checks everything that must hold between ticks:
///
/// - a job's span is set iff its allocation flag is, and spans
///     are exactly as long as the job's requirement
/// - only running (or just-completed) jobs hold pages
/// - no two spans overlap, and no more pages are held than exist
/// - every page inside a job's span is owned by that job, and every
///     owned page lies inside its owner's span
pub fn check_consistency(pool: &PagePool, jobs: &JobSet) -> Result<(), InvariantError> {
    let mut held: PageIdx = 0;
    for j in jobs.values() {
        if j.pages.is_some() != j.allocated {
            return Err(InvariantError::FlagMismatch(j.id));
        }
        let Some(span) = j.pages else { continue; };
        if span.len() != j.size {
            return Err(InvariantError::WrongSpanSize {
                job:    j.id,
                held:   span.len(),
                size:   j.size,
            });
        }
        if !matches!(j.state, JobState::Running | JobState::Completed) {
            return Err(InvariantError::HoldingWhile {
                job:    j.id,
                state:  j.state,
            });
        }
        held = held.saturating_add(span.len());
    }

    let overlap = jobs.values()
        .filter_map(|j| j.pages.map(|s| (s, j.id)))
        .sorted_unstable_by_key(|(s, id)| (s.start, *id))
        .tuple_windows()
        .find(|((a, _), (b, _))| a.overlaps(b));
    if let Some(((_, a), (_, b))) = overlap {
        return Err(InvariantError::Overlap(a, b));
    }
    if held > pool.len() {
        return Err(InvariantError::Overcommitted {
            held,
            total: pool.len(),
        });
    }

    for j in jobs.values() {
        let Some(span) = j.pages else { continue; };
        if let Some(page) = span.range().find(|&p| pool.page(p) != Some(j.id)) {
            return Err(InvariantError::PageNotOwned {
                page,
                job:    j.id,
                found:  pool.page(page),
            });
        }
    }

    for (page, owner) in pool.iter().enumerate() {
        let Some(owner) = owner else { continue; };
        let covered = jobs.get(&owner)
            .and_then(|j| j.pages)
            .is_some_and(|s| s.contains(page));
        if !covered {
            return Err(InvariantError::StrayPage { page, owner });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Bypasses `init`, which only admits fresh jobs.
    fn table(jobs: Vec<Job>) -> JobSet {
        jobs.into_iter().map(|j| (j.id, j)).collect()
    }

    fn admitted(id: JobId, start: PageIdx, size: PageIdx) -> Job {
        let mut j = Job::new(id, 0, size, 3, "Waiting");
        j.assign(PageSpan::new(start, size));
        j.start(0);
        j
    }

    #[test]
    fn test_healthy_state_passes() {
        let mut pool = PagePool::new(10);
        pool.reserve(0, 3, 1).unwrap();
        pool.reserve(3, 2, 2).unwrap();
        let jobs = table(vec![admitted(1, 0, 3), admitted(2, 3, 2), Job::new(3, 0, 4, 1, "Waiting")]);
        assert_eq!(check_consistency(&pool, &jobs), Ok(()));
    }

    #[test]
    fn test_stray_page_detected() {
        let mut pool = PagePool::new(10);
        pool.reserve(0, 3, 1).unwrap();
        pool.reserve(7, 1, 1).unwrap();
        let jobs = table(vec![admitted(1, 0, 3)]);
        assert_eq!(check_consistency(&pool, &jobs), Err(InvariantError::StrayPage { page: 7, owner: 1 }));
    }

    #[test]
    fn test_unbacked_span_detected() {
        let pool = PagePool::new(10);
        let jobs = table(vec![admitted(1, 2, 3)]);
        assert_eq!(
            check_consistency(&pool, &jobs),
            Err(InvariantError::PageNotOwned { page: 2, job: 1, found: None })
        );
    }

    #[test]
    fn test_flag_mismatch_detected() {
        let pool = PagePool::new(10);
        let mut j = Job::new(1, 0, 2, 1, "Waiting");
        j.allocated = true;
        assert_eq!(check_consistency(&pool, &table(vec![j])), Err(InvariantError::FlagMismatch(1)));
    }

    #[test]
    fn test_conflicting_spans_detected() {
        let mut pool = PagePool::new(10);
        pool.reserve(0, 4, 1).unwrap();
        let jobs = table(vec![admitted(1, 0, 4), admitted(2, 2, 2)]);
        assert_eq!(check_consistency(&pool, &jobs), Err(InvariantError::Overlap(1, 2)));
    }

    #[test]
    fn test_overcommit_detected() {
        let mut pool = PagePool::new(4);
        pool.reserve(0, 3, 1).unwrap();
        // Disjoint spans, but job 2 runs off the end of the pool.
        let jobs = table(vec![admitted(1, 0, 3), admitted(2, 3, 2)]);
        assert_eq!(
            check_consistency(&pool, &jobs),
            Err(InvariantError::Overcommitted { held: 5, total: 4 })
        );
    }
}
