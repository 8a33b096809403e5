use crate::helpe::*;

impl PagePool {
    /// Creates a pool of `len` free pages.
    pub fn new(len: PageIdx) -> Self {
        Self {
            pages: vec![None; len],
        }
    }

    /// Builds the pool described by a [SimConfig].
    pub fn from_config(cfg: &SimConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(cfg.page_count()?))
    }

    #[inline(always)]
    pub fn len(&self) -> PageIdx {
        self.pages.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Owner of page `idx`, if any. Out-of-range pages read as free.
    #[inline(always)]
    pub fn page(&self, idx: PageIdx) -> Option<JobId> {
        self.pages.get(idx).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<JobId>> + '_ {
        self.pages.iter().copied()
    }

    pub fn free_count(&self) -> PageIdx {
        self.pages.iter().filter(|p| p.is_none()).count()
    }

    pub fn used_count(&self) -> PageIdx {
        self.len() - self.free_count()
    }

    /// Pure query. A range poking out of the pool is never free.
    pub fn is_range_free(&self, start: PageIdx, count: PageIdx) -> bool {
        match self.pages.get(start..start.saturating_add(count)) {
            Some(slice) => slice.iter().all(|p| p.is_none()),
            None        => false,
        }
    }

    /// Marks `[start, start + count)` as owned by `owner`.
    ///
    /// Nothing is touched unless every page of the range is free.
    pub fn reserve(
        &mut self,
        start:  PageIdx,
        count:  PageIdx,
        owner:  JobId,
    ) -> Result<PageSpan, MemoryError> {
        let end = start.checked_add(count);
        let slice = match end {
            Some(e) if count > 0 && e <= self.len() => &mut self.pages[start..e],
            _ => {
                return Err(MemoryError::OutOfBounds {
                    start,
                    count,
                    pool: self.pages.len(),
                });
            }
        };
        if let Some((offset, taken)) = slice.iter()
            .enumerate()
            .find_map(|(i, p)| p.map(|o| (i, o))) {
            return Err(MemoryError::AllocationConflict {
                page:           start + offset,
                owner:          taken,
                requested_by:   owner,
            });
        }
        slice.fill(Some(owner));

        Ok(PageSpan::new(start, count))
    }

    /// Frees every page owned by `owner`. Returns how many there were.
    pub fn release(&mut self, owner: JobId) -> Result<PageIdx, MemoryError> {
        let mut freed = 0;
        for p in self.pages.iter_mut().filter(|p| **p == Some(owner)) {
            *p = None;
            freed += 1;
        }
        if freed == 0 {
            Err(MemoryError::NothingToRelease(owner))
        } else {
            Ok(freed)
        }
    }

    /// The pages held by `owner`, if they form one run.
    ///
    /// Returns `None` both when the owner holds nothing and when its
    /// pages are scattered; the latter never happens to a healthy pool.
    pub fn owned_span(&self, owner: JobId) -> Option<PageSpan> {
        let first = self.pages.iter().position(|p| *p == Some(owner))?;
        let last = self.pages.iter().rposition(|p| *p == Some(owner))?;
        if self.pages[first..=last].iter().all(|p| *p == Some(owner)) {
            Some(PageSpan { start: first, end: last })
        } else {
            None
        }
    }

    /// Maximal runs of free pages as `(start, len)`, lowest address first.
    pub fn free_runs(&self) -> Vec<(PageIdx, PageIdx)> {
        let mut res = vec![];
        let mut run_start: Option<PageIdx> = None;
        for (idx, p) in self.pages.iter().enumerate() {
            match (p, run_start) {
                (None, None)        => { run_start = Some(idx); },
                (Some(_), Some(s))  => {
                    res.push((s, idx - s));
                    run_start = None;
                },
                _                   => {},
            }
        }
        if let Some(s) = run_start {
            res.push((s, self.len() - s));
        }

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_initialization() {
        let pool = PagePool::new(20);
        assert_eq!(pool.len(), 20);
        assert_eq!(pool.free_count(), 20);
        assert_eq!(pool.free_runs(), vec![(0, 20)]);
        assert!(pool.is_range_free(0, 20));
        assert!(!pool.is_range_free(15, 6));
    }

    #[test]
    fn test_reserve_and_release() {
        let mut pool = PagePool::new(10);
        assert_eq!(pool.reserve(2, 3, 7), Ok(PageSpan::new(2, 3)));
        assert_eq!(pool.page(2), Some(7));
        assert_eq!(pool.page(4), Some(7));
        assert_eq!(pool.page(5), None);
        assert_eq!(pool.owned_span(7), Some(PageSpan::new(2, 3)));
        assert_eq!(pool.free_runs(), vec![(0, 2), (5, 5)]);
        assert_eq!(pool.used_count(), 3);

        assert_eq!(pool.release(7), Ok(3));
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.owned_span(7), None);
    }

    #[test]
    fn test_reserve_conflict_leaves_pool_untouched() {
        let mut pool = PagePool::new(10);
        pool.reserve(4, 2, 1).unwrap();
        let before = pool.clone();
        assert_eq!(
            pool.reserve(2, 3, 2),
            Err(MemoryError::AllocationConflict { page: 4, owner: 1, requested_by: 2 })
        );
        assert_eq!(pool, before);
    }

    #[test]
    fn test_reserve_out_of_bounds() {
        let mut pool = PagePool::new(10);
        assert_eq!(
            pool.reserve(8, 3, 1),
            Err(MemoryError::OutOfBounds { start: 8, count: 3, pool: 10 })
        );
        assert!(matches!(pool.reserve(0, 0, 1), Err(MemoryError::OutOfBounds { .. })));
        let err = pool.reserve(usize::MAX, 2, 1).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfBounds { .. }));
        assert!(err.is_fatal());
        assert!(!MemoryError::NothingToRelease(1).is_fatal());
        assert_eq!(pool.free_count(), 10);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pool = PagePool::new(6);
        pool.reserve(0, 2, 1).unwrap();
        pool.reserve(2, 2, 2).unwrap();
        assert_eq!(pool.release(1), Ok(2));
        let after_first = pool.clone();
        assert_eq!(pool.release(1), Err(MemoryError::NothingToRelease(1)));
        assert_eq!(pool, after_first);
        assert_eq!(pool.page(2), Some(2));
    }

    #[test]
    fn test_from_config() {
        let cfg = SimConfig {
            total_memory_kb: 64,
            page_size_kb: 4,
            ..SimConfig::default()
        };
        assert_eq!(PagePool::from_config(&cfg).unwrap().len(), 16);
        let bad = SimConfig { total_memory_kb: 10, page_size_kb: 3, ..cfg };
        assert!(PagePool::from_config(&bad).is_err());
    }
}
