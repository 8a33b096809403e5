use std::hash::Hash;

use crate::helpe::*;

impl Job {
    /// Creates a freshly loaded [Job]: `Waiting`, holding nothing,
    /// with its full duration ahead of it.
    pub fn new(
        id:         JobId,
        arrival:    Ticks,
        size:       PageIdx,
        duration:   Ticks,
        label:      &str,
    ) -> Self {
        Self {
            id,
            arrival,
            size,
            duration,
            label:          label.to_string(),
            hint:           StateLabel::from(label),
            state:          JobState::Waiting,
            remaining:      duration,
            time_in_memory: 0,
            pages:          None,
            allocated:      false,
            completed:      false,
            deallocated:    false,
            started_at:     None,
            finished_at:    None,
        }
    }

    /// Returns `true` if the job may ask for memory at tick `now`.
    #[inline(always)]
    pub fn is_eligible(&self, now: Ticks) -> bool {
        self.state == JobState::Waiting && self.arrival <= now
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// Keeps the job away from the pool for good.
    pub fn park(&mut self, as_state: JobState) {
        debug_assert!(!self.allocated, "Parking job {} that holds pages", self.id);
        self.state = as_state;
    }

    /// Records the pages the allocator reserved for us.
    pub fn assign(&mut self, span: PageSpan) {
        debug_assert_eq!(self.state, JobState::Waiting, "Job {} assigned pages twice", self.id);
        debug_assert_eq!(span.len(), self.size, "Job {} got a span of the wrong size", self.id);
        self.pages = Some(span);
        self.allocated = true;
    }

    /// `Waiting -> Running`. The job must already hold its pages.
    pub fn start(&mut self, now: Ticks) {
        debug_assert!(self.allocated, "Job {} started without pages", self.id);
        self.remaining = self.duration;
        self.started_at = Some(now);
        self.state = JobState::Running;
    }

    /// Consumes one tick of residence. Returns `true` once no
    /// execution time is left.
    pub fn advance(&mut self) -> bool {
        debug_assert!(self.is_running(), "Advancing job {} which is not running", self.id);
        self.remaining = self.remaining.saturating_sub(1);
        self.time_in_memory += 1;

        self.remaining == 0
    }

    /// `Running -> Completed`.
    pub fn complete(&mut self) {
        self.completed = true;
        self.state = JobState::Completed;
    }

    /// `Completed -> Deallocated`. Its pages are already back in the pool.
    /// Returns the span the job used to hold.
    pub fn release(&mut self, now: Ticks) -> Option<PageSpan> {
        debug_assert_eq!(self.state, JobState::Completed);
        self.allocated = false;
        self.deallocated = true;
        self.finished_at = Some(now);
        self.state = JobState::Deallocated;

        self.pages.take()
    }

    /// Ticks spent between arrival and admission.
    pub fn waited(&self) -> Option<Ticks> {
        self.started_at.map(|s| s - self.arrival)
    }

    /// Ticks spent between arrival and deallocation.
    pub fn turnaround(&self) -> Option<Ticks> {
        self.finished_at.map(|f| f - self.arrival)
    }
}

//-----TREATING GROUPS OF JOBS (START)---------------------
/*
   The job table is walked in order of increasing id: that is
   the tie-break among jobs waiting for memory on the same tick.
*/
impl Ord for Job {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
//-----TREATING GROUPS OF JOBS (END)---------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_waiting() {
        let j = Job::new(4, 2, 3, 5, "Running");
        assert_eq!(j.state, JobState::Waiting);
        assert_eq!(j.hint, StateLabel::Running);
        assert_eq!(j.remaining, 5);
        assert!(j.pages.is_none() && !j.allocated && !j.completed && !j.deallocated);
        assert!(!j.is_eligible(1));
        assert!(j.is_eligible(2));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut j = Job::new(1, 0, 2, 2, "Waiting");
        j.assign(PageSpan::new(3, 2));
        j.start(1);
        assert!(j.is_running());
        assert!(!j.advance());
        assert!(j.advance());
        j.complete();
        assert_eq!(j.state, JobState::Completed);
        assert_eq!(j.release(3), Some(PageSpan::new(3, 2)));
        assert_eq!(j.state, JobState::Deallocated);
        assert!(j.deallocated && j.completed && !j.allocated);
        assert_eq!(j.time_in_memory, 2);
        assert_eq!(j.waited(), Some(1));
        assert_eq!(j.turnaround(), Some(3));
    }

    #[test]
    fn test_zero_duration_finishes_on_first_advance() {
        let mut j = Job::new(1, 0, 1, 0, "Waiting");
        j.assign(PageSpan::new(0, 1));
        j.start(0);
        assert!(j.advance());
        assert_eq!(j.time_in_memory, 1);
    }
}
