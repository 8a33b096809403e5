use anyhow::Context;
use pagesim::{
    algo::Sim,
    report::{render_job_table, render_memory, render_setup, TextReport},
    *,
};
use tracing_subscriber::EnvFilter;

/// A discrete-time simulator of jobs competing for memory pages
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a tab-separated job table (repeat for several tables)
    #[arg(short, long, required = true, value_parser = clap::value_parser!(PathBuf))]
    input:          Vec<PathBuf>,

    /// Total memory size, in KB
    #[arg(short = 'm', long, default_value_t = DEFAULT_TOTAL_MEMORY_KB)]
    memory:         usize,

    /// Page size, in KB (must divide the total memory size)
    #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE_KB)]
    page_size:      usize,

    /// Give up after this many ticks
    #[arg(short = 't', long, default_value_t = DEFAULT_MAX_TICKS)]
    max_ticks:      Ticks,

    /// Placement policy
    #[arg(short, long, value_enum, default_value_t = JobFit::First)]
    fit:            JobFit,

    /// Keep jobs labelled `Sleep` or `End` off the pool
    #[arg(long, default_value_t = false)]
    honor_labels:   bool,

    /// Print every tick that changed something, with the memory map
    #[arg(short, long, default_value_t = false)]
    verbose:        bool,

    /// Pages per row of the memory map
    #[arg(short, long, default_value_t = DEFAULT_REPORT_COLUMNS)]
    columns:        usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Args::parse();
    let cfg = SimConfig {
        total_memory_kb:    cli.memory,
        page_size_kb:       cli.page_size,
        max_ticks:          cli.max_ticks,
        fit:                cli.fit,
        honor_labels:       cli.honor_labels,
    };
    let pages = cfg.page_count().context("Invalid memory configuration")?;

    println!("{}", render_setup(&cfg, pages));
    print!("{}", render_memory(&PagePool::new(pages), cli.columns));

    for input_path in cli.input {
        let name = input_path.display().to_string();
        let (set, skipped) = read_from_path::<TsvParser, &str>(input_path)
            .with_context(|| format!("Could not load jobs from {name}"))?;
        println!("\n--- Jobs Loaded from {name} ---");
        print!("{}", render_job_table(&set));
        println!("Total jobs loaded from {name}: {}", set.len());
        if !skipped.is_empty() {
            println!("Malformed records skipped: {}", skipped.len());
        }

        let mut sim = Sim::new(set, cfg)?;
        let mut sink = TextReport::new(std::io::stdout().lock(), cli.columns, cli.verbose);
        sim.run(&mut sink)
            .with_context(|| format!("Simulation of {name} aborted"))?;
    }

    Ok(())
}
