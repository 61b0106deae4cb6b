use std::time::Duration;

use firewatch_core::QueueStatus;

use crate::commands::common::{describe_outcome, CommandContext, QueueMode};
use crate::error::CliError;

const STATUS_POLL: Duration = Duration::from_secs(1);

pub async fn run_watch(ctx: &CommandContext, interval_secs: Option<u64>) -> Result<(), CliError> {
    ctx.ensure_delivery_configured()?;
    let interval = interval_secs.map_or(ctx.config.sync_interval, Duration::from_secs);

    let queue = ctx.open_queue(QueueMode::Resident).await?;
    println!("{}", describe_outcome(queue.process_queue().await));
    queue.start_periodic_sync(interval)?;
    println!(
        "Watching queue every {}s; press Ctrl-C to stop",
        interval.as_secs()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut poll = tokio::time::interval(STATUS_POLL);
    let mut last = QueueStatus::default();

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = poll.tick() => {
                let status = queue.queue_status();
                if status != last {
                    println!("{}", format_status_line(&status));
                    last = status;
                }
            }
        }
    }

    queue.stop_periodic_sync();
    println!("Stopped watching");
    Ok(())
}

pub fn format_status_line(status: &QueueStatus) -> String {
    format!(
        "pending={} processing={} completed={} failed={}",
        status.pending, status.processing, status.completed, status.failed
    )
}
