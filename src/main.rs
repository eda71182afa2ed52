use anyhow::{anyhow, Context};
use tracing::{error, info, warn};

use hotel_sweep::core::config::load_sweep_config;
use hotel_sweep::dispatch::dispatch;
use hotel_sweep::executor::TaskExecutor;
use hotel_sweep::partition::generate_tasks;
use hotel_sweep::scraping::cdp::CdpSessionFactory;
use hotel_sweep::sink::{count_rows, prepare_output, CsvSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let run_id = uuid::Uuid::new_v4();
    info!("Starting hotel sweep run_id={}", run_id);

    let mut config = load_sweep_config().resolve();
    config.apply_cli_args(std::env::args().skip(1))?;
    config.validate()?;

    let factory = CdpSessionFactory::discover(
        config.chrome_executable.as_deref(),
        config.headless,
        config.pacing.clone(),
    )
    .ok_or_else(|| {
        anyhow!("No Chromium-family browser found; install Chrome/Chromium/Brave or set CHROME_EXECUTABLE")
    })?;

    let today = chrono::Local::now().date_naive();
    let (start, end) = config.date_range(today)?;
    let tasks = generate_tasks(start, end, config.length_of_stay);
    info!(
        "Sweeping check-ins {}..={} with stays up to {} night(s): {} tasks",
        start,
        end,
        config.length_of_stay,
        tasks.len()
    );

    let output = config.output_path(today);
    prepare_output(&output).with_context(|| format!("preparing {}", output.display()))?;
    let sink = CsvSink::new(&output);

    let pool_size = config.pool_size;
    let executor = TaskExecutor::new(factory, config);
    let report = dispatch(tasks, pool_size, &executor, &sink).await;

    for (task, reason) in &report.abandoned {
        warn!("Abandoned {}: {}", task, reason);
    }
    let rows = count_rows(&output).with_context(|| format!("reading back {}", output.display()))?;
    info!(
        "run_id={} total records scraped: {} ({} tasks accepted, {} abandoned); {} rows in {}",
        run_id,
        report.total_records,
        report.accepted,
        report.abandoned.len(),
        rows,
        output.display()
    );

    if !report.sink_failures.is_empty() {
        for (task, e) in &report.sink_failures {
            error!("Records for {} were not written: {}", task, e);
        }
        return Err(anyhow!(
            "{} accepted batch(es) could not be written to {}",
            report.sink_failures.len(),
            output.display()
        ));
    }
    Ok(())
}
