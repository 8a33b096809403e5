use crate::helpe::*;

/// Initializes a JobSet with a given set of jobs.
/// A successfully returned JobSet is guaranteed to be
/// compliant with all of `pagesim`'s assumptions. These are:
/// - no job has zero id
/// - no job has zero size
/// - no two jobs share an id
/// - all jobs are fresh (`Waiting`, holding no pages)
///
/// The returned table is ordered by ascending id.
///
/// This function is the gatekeeper to the rest of the library.
pub fn init(in_elts: Vec<Job>) -> Result<JobSet, JobError> {
    let mut res: JobSet = IndexMap::with_capacity(in_elts.len());
    for j in in_elts {
        let problem = if j.id == 0 {
            Some("Job with 0 id found!")
        } else if j.size == 0 {
            Some("Job with 0 size found!")
        } else if res.contains_key(&j.id) {
            Some("Job with duplicate id found!")
        } else if j.state != JobState::Waiting || j.allocated || j.pages.is_some() {
            Some("Job that already ran found!")
        } else {
            None
        };
        if let Some(message) = problem {
            return Err(JobError {
                message: String::from(message),
                culprit: j,
            });
        }
        res.insert(j.id, j);
    }
    res.sort_keys();

    Ok(res)
}

/// Jobs that could not fit even into an empty pool of `pages` pages.
pub fn unfit_jobs(jobs: &JobSet, pages: PageIdx) -> Vec<JobId> {
    jobs.values()
        .filter(|j| j.size > pages)
        .map(|j| j.id)
        .collect()
}

/// The sum of all jobs' page requirements, saturating at [PageIdx::MAX].
#[inline(always)]
pub fn total_demand(jobs: &JobSet) -> PageIdx {
    jobs.values().map(|j| j.size).fold(0, PageIdx::saturating_add)
}
