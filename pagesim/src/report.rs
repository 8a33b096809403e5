//! Human-readable views of a simulation. Everything in here only reads.

use std::fmt::Write as _;

use crate::helpe::*;

/// Receives snapshots while a [`crate::algo::Sim`] runs.
pub trait ReportSink {
    /// Called after every processed tick, with the transitions it caused.
    fn on_tick(
        &mut self,
        _tick:      Ticks,
        _changes:   &[Transition],
        _pool:      &PagePool,
        _jobs:      &JobSet,
    ) -> std::io::Result<()> {
        Ok(())
    }

    /// Called once, when the run is over.
    fn on_finish(&mut self, _report: &RunReport, _jobs: &JobSet) -> std::io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
impl ReportSink for () {}

/// Writes plain-text reports to any [Write]r.
pub struct TextReport<W: Write> {
    out:        W,
    columns:    usize,
    every_tick: bool,
}

impl<W: Write> TextReport<W> {
    /// `columns` pages go on one row of the memory map. With `every_tick`,
    /// each tick that changed something is printed along with the map.
    pub fn new(out: W, columns: usize, every_tick: bool) -> Self {
        Self {
            out,
            columns: columns.max(1),
            every_tick,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for TextReport<W> {
    fn on_tick(
        &mut self,
        tick:       Ticks,
        changes:    &[Transition],
        pool:       &PagePool,
        _jobs:      &JobSet,
    ) -> std::io::Result<()> {
        if !self.every_tick || changes.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "Tick {tick}:")?;
        for t in changes {
            writeln!(self.out, "  {}", render_transition(t))?;
        }
        write!(self.out, "{}", render_memory(pool, self.columns))
    }

    fn on_finish(&mut self, report: &RunReport, jobs: &JobSet) -> std::io::Result<()> {
        writeln!(self.out, "\n--- Final Job States ---")?;
        write!(self.out, "{}", render_job_table(jobs))?;
        write!(self.out, "{}", render_summary(report))
    }
}

/// The memory setup banner.
pub fn render_setup(cfg: &SimConfig, pages: PageIdx) -> String {
    format!(
        "Memory Simulation Setup:\n\
         Total Memory Size: {} KB\n\
         Page Size: {} KB\n\
         Number of Pages: {pages}\n",
        cfg.total_memory_kb,
        cfg.page_size_kb,
    )
}

/// The memory map: one `[index:owner]` cell per page, `columns` cells
/// per row, closed by a separator line.
pub fn render_memory(pool: &PagePool, columns: usize) -> String {
    let width = pool.len()
        .saturating_sub(1)
        .to_string()
        .len()
        .max(2);
    let mut res = String::from("Memory State (Free or Job ID):\n");
    for row in &pool.iter().enumerate().chunks(columns.max(1)) {
        let cells = row
            .map(|(idx, owner)| match owner {
                Some(id)    => format!("[{idx:0width$}:{id}]"),
                None        => format!("[{idx:0width$}:Free]"),
            })
            .join(" ");
        res.push_str(&cells);
        res.push('\n');
    }
    res.push_str("------------------------------------------\n");

    res
}

pub fn render_job(j: &Job) -> String {
    format!(
        "Job ID: {}, Start Time: {}, Required Size: {}, Execution Interval: {}, Initial State: {}, Current State: {}",
        j.id, j.arrival, j.size, j.duration, j.label, j.state
    )
}

/// One line per job, ascending id.
pub fn render_job_table(jobs: &JobSet) -> String {
    jobs.values()
        .map(|j| render_job(j) + "\n")
        .collect()
}

pub fn render_transition(t: &Transition) -> String {
    match t.pages {
        Some(span)  => format!("job {}: {} -> {} {span}", t.job, t.from, t.to),
        None        => format!("job {}: {} -> {}", t.job, t.from, t.to),
    }
}

pub fn render_summary(report: &RunReport) -> String {
    let ids = |v: &[JobId]| if v.is_empty() {
        String::from("none")
    } else {
        v.iter().join(", ")
    };
    let mut res = String::from("\n--- Run Summary ---\n");
    // Writing into a String cannot fail.
    let _ = writeln!(res, "Ticks simulated: {}", report.ticks);
    let _ = writeln!(res, "Completed jobs: {}", ids(&report.completed));
    if !report.parked.is_empty() {
        let _ = writeln!(res, "Parked jobs: {}", ids(&report.parked));
    }
    let _ = writeln!(res, "Peak pages in use: {}", report.peak_pages);
    if let Some(w) = report.mean_wait {
        let _ = writeln!(res, "Average wait: {w:.2} ticks");
    }
    if let Some(t) = report.mean_turnaround {
        let _ = writeln!(res, "Average turnaround: {t:.2} ticks");
    }
    if report.starved() {
        let _ = writeln!(
            res,
            "Tick budget exhausted. Unresolved jobs: {}",
            ids(&report.unresolved)
        );
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::Sim;

    #[test]
    fn test_memory_map_layout() {
        let mut pool = PagePool::new(7);
        pool.reserve(1, 2, 12).unwrap();
        let map = render_memory(&pool, 5);
        let lines: Vec<&str> = map.lines().collect();
        assert_eq!(lines[1], "[00:Free] [01:12] [02:12] [03:Free] [04:Free]");
        assert_eq!(lines[2], "[05:Free] [06:Free]");
        assert!(lines[3].starts_with("-----"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_memory_map_widens_indices() {
        let pool = PagePool::new(120);
        let map = render_memory(&pool, 10);
        assert!(map.contains("[000:Free]"));
        assert!(map.contains("[119:Free]"));
    }

    #[test]
    fn test_job_line() {
        let j = Job::new(3, 1, 4, 2, "Sleep");
        assert_eq!(
            render_job(&j),
            "Job ID: 3, Start Time: 1, Required Size: 4, Execution Interval: 2, Initial State: Sleep, Current State: Waiting"
        );
    }

    #[test]
    fn test_setup_banner() {
        let banner = render_setup(&SimConfig::default(), 20);
        assert!(banner.contains("Total Memory Size: 20 KB"));
        assert!(banner.contains("Number of Pages: 20"));
    }

    #[test]
    fn test_text_report_prints_changing_ticks() {
        let jobs = init(vec![Job::new(1, 0, 2, 1, "Waiting"), Job::new(2, 0, 30, 1, "Waiting")]).unwrap();
        let cfg = SimConfig { max_ticks: 4, ..SimConfig::default() };
        let mut sim = Sim::new(jobs, cfg).unwrap();
        let mut sink = TextReport::new(Vec::new(), 5, true);
        let report = sim.run(&mut sink).unwrap();
        assert!(report.starved());

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("Tick 0:\n  job 1: Waiting -> Running [0, 1]"));
        assert!(text.contains("Tick 1:"));
        assert!(!text.contains("Tick 2:"));
        assert!(text.contains("Current State: Completed (Deallocated)"));
        assert!(text.contains("Tick budget exhausted. Unresolved jobs: 2"));
    }
}
