use std::fs::File;

use anyhow::Context;
use pagesim::*;

/// A generator of synthetic job tables for `pagesim`
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of jobs (ids run from 1 up to it)
    #[arg(short = 'n', long, default_value_t = 10)]
    count:          JobId,

    /// Seed for the random generator
    #[arg(short, long, default_value_t = 0)]
    seed:           u64,

    /// Latest possible arrival tick
    #[arg(short = 'a', long, default_value_t = 10)]
    max_arrival:    Ticks,

    /// Largest possible page requirement
    #[arg(short = 'p', long, default_value_t = 8)]
    max_pages:      PageIdx,

    /// Longest possible execution interval
    #[arg(short = 'd', long, default_value_t = 5)]
    max_duration:   Ticks,

    /// Where to write the table (stdout if absent)
    #[arg(short, long, value_parser = clap::value_parser!(PathBuf))]
    output:         Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Args::parse();
    anyhow::ensure!(cli.max_pages > 0, "Jobs must require at least one page");
    let params = GenParams {
        count:          cli.count,
        max_arrival:    cli.max_arrival,
        max_size:       cli.max_pages,
        max_duration:   cli.max_duration,
    };
    let jobs = random_jobs(&params, cli.seed);
    info!("Generated {} jobs with seed {}", jobs.len(), cli.seed);

    match cli.output {
        Some(path)  => {
            let fd = File::create(&path)
                .with_context(|| format!("Could not create {}", path.display()))?;
            let mut out = std::io::BufWriter::new(fd);
            write_tsv(&jobs, &mut out)?;
            out.flush()?;
        },
        None        => { write_tsv(&jobs, std::io::stdout().lock())?; }
    }

    Ok(())
}
