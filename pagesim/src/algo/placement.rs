use crate::helpe::*;

/// Picks the first page of a free run able to hold `size` pages,
/// or `None` if no such run exists.
///
/// First-fit takes the lowest-addressed run that fits. Best-fit takes
/// the smallest run that fits, the lowest address winning ties.
pub fn find_region(pool: &PagePool, size: PageIdx, fit: JobFit) -> Option<PageIdx> {
    let mut fitting = pool.free_runs()
        .into_iter()
        .filter(|&(_, len)| len >= size);
    match fit {
        JobFit::First   => fitting.next().map(|(start, _)| start),
        JobFit::Best    => fitting
            .min_by_key(|&(start, len)| (len, start))
            .map(|(start, _)| start),
    }
}

/// Finds room for `size` pages on behalf of `owner` and reserves it.
///
/// Exactly `size` pages are taken, at the start of the chosen run, even
/// if the run is longer. Allocation is contiguous only: a request that
/// no single free run can hold fails with
/// [`InsufficientMemory`](MemoryError::InsufficientMemory), no matter how
/// many pages are free overall.
pub fn allocate(
    pool:   &mut PagePool,
    owner:  JobId,
    size:   PageIdx,
    fit:    JobFit,
) -> Result<PageSpan, MemoryError> {
    match find_region(pool, size, fit) {
        Some(start) => pool.reserve(start, size, owner),
        None        => Err(MemoryError::InsufficientMemory {
            job:        owner,
            requested:  size,
            free:       pool.free_count(),
        }),
    }
}
