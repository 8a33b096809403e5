pub mod placement;

use crate::{
    helpe::*,
    analyze::check_consistency,
    report::ReportSink,
};
use self::placement::allocate;

/// Failures that end a run early.
#[derive(Error, Debug)]
pub enum SimError {
    /// The pool's bookkeeping broke. Never caused by input data.
    #[error("memory bookkeeping failed at tick {tick}: {source}")]
    Memory {
        tick:   Ticks,
        #[source]
        source: MemoryError,
    },
    #[error("report sink failed: {0}")]
    Report(#[from] std::io::Error),
}

/// The clock driver. Owns one [PagePool] and the job table competing
/// for it, and moves both forward one tick at a time.
///
/// Every tick does, in this order:
///
/// 1. advance running jobs, completing those with no time left
/// 2. give the completed jobs' pages back to the pool
/// 3. try to allocate for every arrived `Waiting` job, by ascending id
/// 4. start the jobs that got their pages
///
/// Because (2) comes before (3), pages freed on a tick are already
/// up for grabs on that same tick.
pub struct Sim {
    pool:           PagePool,
    jobs:           JobSet,
    cfg:            SimConfig,
    now:            Ticks,
    transitions:    Vec<Transition>,
    peak_pages:     PageIdx,
}

impl Sim {
    pub fn new(mut jobs: JobSet, cfg: SimConfig) -> Result<Self, ConfigError> {
        let pool = PagePool::from_config(&cfg)?;
        for id in unfit_jobs(&jobs, pool.len()) {
            warn!("Job {id} needs more than the {} available pages and will never run", pool.len());
        }

        let mut transitions = vec![];
        if cfg.honor_labels {
            for j in jobs.values_mut() {
                if let Some(parked) = j.hint.parks() {
                    debug!("Parking job {} as {parked} (label {:?})", j.id, j.label);
                    j.park(parked);
                    transitions.push(Transition {
                        tick:   0,
                        job:    j.id,
                        from:   JobState::Waiting,
                        to:     parked,
                        pages:  None,
                    });
                }
            }
        }

        Ok(Self {
            pool,
            jobs,
            cfg,
            now: 0,
            transitions,
            peak_pages: 0,
        })
    }

    /// The tick that the next [`step`](Sim::step) will process.
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn pool(&self) -> &PagePool {
        &self.pool
    }

    pub fn jobs(&self) -> &JobSet {
        &self.jobs
    }

    pub fn config(&self) -> &SimConfig {
        &self.cfg
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Whether no job has anything left to do.
    pub fn all_resolved(&self) -> bool {
        self.jobs.values().all(|j| j.state.is_terminal())
    }

    /// Processes exactly one tick and returns the transitions it caused.
    ///
    /// Only broken bookkeeping is an error here. A job that finds no room
    /// just keeps waiting.
    pub fn step(&mut self) -> Result<Vec<Transition>, MemoryError> {
        let now = self.now;
        let mut evts = vec![];

        // Advance timers.
        let mut finished = vec![];
        for j in self.jobs.values_mut().filter(|j| j.is_running()) {
            if j.advance() {
                j.complete();
                evts.push(Transition {
                    tick:   now,
                    job:    j.id,
                    from:   JobState::Running,
                    to:     JobState::Completed,
                    pages:  j.pages,
                });
                finished.push(j.id);
            }
        }

        // Reclaim.
        for id in finished {
            match self.pool.release(id) {
                Ok(freed)   => { trace!("Job {id} gave back {freed} pages"); },
                Err(MemoryError::NothingToRelease(_))   => {
                    warn!("Job {id} completed without holding any pages");
                },
                Err(e)      => { return Err(e); }
            }
            let pages = self.jobs[&id].release(now);
            evts.push(Transition {
                tick:   now,
                job:    id,
                from:   JobState::Completed,
                to:     JobState::Deallocated,
                pages,
            });
        }

        // Allocate, lowest id first.
        let mut admitted = vec![];
        for j in self.jobs.values_mut().filter(|j| j.is_eligible(now)) {
            match allocate(&mut self.pool, j.id, j.size, self.cfg.fit) {
                Ok(span)    => {
                    j.assign(span);
                    admitted.push(j.id);
                },
                Err(e @ MemoryError::InsufficientMemory { .. })  => {
                    trace!("Tick {now}: {e}");
                },
                Err(e)      => { return Err(e); }
            }
        }

        // Promote.
        for id in admitted {
            let j = &mut self.jobs[&id];
            j.start(now);
            evts.push(Transition {
                tick:   now,
                job:    id,
                from:   JobState::Waiting,
                to:     JobState::Running,
                pages:  j.pages,
            });
        }

        for e in &evts {
            debug!("t={} job {}: {} -> {}", e.tick, e.job, e.from, e.to);
        }
        debug_assert_eq!(check_consistency(&self.pool, &self.jobs), Ok(()));

        self.peak_pages = self.peak_pages.max(self.pool.used_count());
        self.transitions.extend(evts.iter().cloned());
        self.now += 1;

        Ok(evts)
    }

    /// Steps until every job is resolved or the tick budget runs out,
    /// showing each tick to `sink`.
    pub fn run<S: ReportSink>(&mut self, sink: &mut S) -> Result<RunReport, SimError> {
        info!(
            "Simulating {} jobs demanding {} pages on {} pages ({:?} fit, at most {} ticks)",
            self.jobs.len(),
            total_demand(&self.jobs),
            self.pool.len(),
            self.cfg.fit,
            self.cfg.max_ticks
        );
        while !self.all_resolved() && self.now < self.cfg.max_ticks {
            let tick = self.now;
            let evts = self.step()
                .map_err(|source| SimError::Memory { tick, source })?;
            sink.on_tick(tick, &evts, &self.pool, &self.jobs)?;
        }

        let report = self.report();
        if report.starved() {
            warn!(
                "Tick budget of {} exhausted; unresolved jobs: {}",
                self.cfg.max_ticks,
                report.unresolved.iter().join(", ")
            );
        } else {
            info!("All jobs resolved after {} ticks", report.ticks);
        }
        sink.on_finish(&report, &self.jobs)?;

        Ok(report)
    }

    /// Summarizes the run so far.
    pub fn report(&self) -> RunReport {
        let mean = |vals: Vec<Ticks>| -> Option<f64> {
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<Ticks>() as f64 / vals.len() as f64)
            }
        };
        let done = || self.jobs.values().filter(|j| j.deallocated);

        RunReport {
            ticks:              self.now,
            completed:          self.ids_where(|j| j.state == JobState::Deallocated),
            unresolved:         self.ids_where(|j| !j.state.is_terminal()),
            parked:             self.ids_where(|j| matches!(j.state, JobState::Sleep | JobState::End)),
            transitions:        self.transitions.clone(),
            peak_pages:         self.peak_pages,
            mean_wait:          mean(done().filter_map(|j| j.waited()).collect()),
            mean_turnaround:    mean(done().filter_map(|j| j.turnaround()).collect()),
        }
    }

    fn ids_where(&self, pred: impl Fn(&Job) -> bool) -> Vec<JobId> {
        self.jobs.values()
            .filter(|j| pred(j))
            .map(|j| j.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim(jobs: Vec<Job>, cfg: SimConfig) -> Sim {
        Sim::new(init(jobs).unwrap(), cfg).unwrap()
    }

    fn states(s: &Sim) -> Vec<JobState> {
        s.jobs().values().map(|j| j.state).collect()
    }

    #[test]
    fn test_admission_then_completion_timing() {
        let mut s = sim(vec![Job::new(1, 0, 5, 3, "Waiting")], SimConfig::default());

        let t0 = s.step().unwrap();
        assert_eq!(t0.len(), 1);
        assert_eq!(t0[0].to, JobState::Running);
        assert_eq!(t0[0].pages, Some(PageSpan::new(0, 5)));

        assert!(s.step().unwrap().is_empty());
        assert!(s.step().unwrap().is_empty());
        assert_eq!(s.jobs()[&1].remaining, 1);

        let t3 = s.step().unwrap();
        let kinds: Vec<(JobState, JobState)> = t3.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(kinds, vec![
            (JobState::Running, JobState::Completed),
            (JobState::Completed, JobState::Deallocated),
        ]);
        assert_eq!(s.pool().free_count(), 20);
        assert_eq!(s.jobs()[&1].time_in_memory, 3);
        assert!(s.all_resolved());
    }

    #[test]
    fn test_late_arrival_waits() {
        let mut s = sim(vec![Job::new(1, 2, 1, 1, "Waiting")], SimConfig::default());
        s.step().unwrap();
        s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Waiting]);
        s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Running]);
        assert_eq!(s.jobs()[&1].started_at, Some(2));
    }

    #[test]
    fn test_freed_pages_reused_same_tick() {
        let mut s = sim(
            vec![Job::new(1, 0, 15, 2, "Waiting"), Job::new(2, 0, 15, 1, "Waiting")],
            SimConfig::default(),
        );
        s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Running, JobState::Waiting]);
        s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Running, JobState::Waiting]);
        let t2 = s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Deallocated, JobState::Running]);
        assert_eq!(t2.last().map(|t| (t.job, t.pages)), Some((2, Some(PageSpan::new(0, 15)))));
    }

    #[test]
    fn test_smaller_later_job_may_pass_blocked_one() {
        // Job 2 cannot fit while job 1 runs, but job 3 can.
        let mut s = sim(
            vec![
                Job::new(1, 0, 12, 4, "Waiting"),
                Job::new(2, 0, 10, 1, "Waiting"),
                Job::new(3, 0, 8, 1, "Waiting"),
            ],
            SimConfig::default(),
        );
        s.step().unwrap();
        assert_eq!(states(&s), vec![JobState::Running, JobState::Waiting, JobState::Running]);
        assert_eq!(s.jobs()[&3].pages, Some(PageSpan::new(12, 8)));
    }

    #[test]
    fn test_labels_park_jobs_when_honored() {
        let jobs = vec![Job::new(1, 0, 2, 1, "Sleep"), Job::new(2, 0, 2, 1, "End"), Job::new(3, 0, 2, 1, "Waiting")];
        let cfg = SimConfig { honor_labels: true, ..SimConfig::default() };
        let mut s = sim(jobs.clone(), cfg);
        let report = s.run(&mut ()).unwrap();
        assert_eq!(report.parked, vec![1, 2]);
        assert_eq!(report.completed, vec![3]);
        assert!(!report.starved());
        assert_eq!(s.jobs()[&1].state, JobState::Sleep);

        let mut s = sim(jobs, SimConfig::default());
        let report = s.run(&mut ()).unwrap();
        assert!(report.parked.is_empty());
        assert_eq!(report.completed, vec![1, 2, 3]);
    }

    #[test]
    fn test_best_fit_policy_is_used() {
        let jobs = vec![
            Job::new(1, 0, 4, 1, "Waiting"),
            Job::new(2, 0, 5, 10, "Waiting"),
            Job::new(3, 2, 2, 1, "Waiting"),
        ];
        let cfg = SimConfig { total_memory_kb: 12, fit: JobFit::Best, ..SimConfig::default() };
        let mut s = sim(jobs, cfg);
        s.step().unwrap();
        s.step().unwrap();
        s.step().unwrap();
        // Job 1 has left: free runs are [0, 4) and [9, 12).
        assert_eq!(s.jobs()[&3].pages, Some(PageSpan::new(9, 2)));
    }

    #[test]
    fn test_empty_table_runs_no_ticks() {
        let mut s = sim(vec![], SimConfig::default());
        let report = s.run(&mut ()).unwrap();
        assert_eq!(report.ticks, 0);
        assert!(report.transitions.is_empty());
        assert_eq!(report.mean_wait, None);
    }

    #[test]
    fn test_statistics() {
        let mut s = sim(
            vec![Job::new(1, 0, 15, 2, "Waiting"), Job::new(2, 0, 15, 2, "Waiting")],
            SimConfig::default(),
        );
        let report = s.run(&mut ()).unwrap();
        // Job 1 runs 0..2, freed at 2; job 2 runs 2..4, freed at 4.
        assert_eq!(report.ticks, 5);
        assert_eq!(report.peak_pages, 15);
        assert_eq!(report.mean_wait, Some(1.0));
        assert_eq!(report.mean_turnaround, Some(3.0));
    }

    #[test]
    fn test_bad_config_rejected() {
        let cfg = SimConfig { total_memory_kb: 10, page_size_kb: 4, ..SimConfig::default() };
        assert!(matches!(
            Sim::new(init(vec![]).unwrap(), cfg),
            Err(ConfigError::NotDivisible { total_kb: 10, page_kb: 4 })
        ));
    }
}
