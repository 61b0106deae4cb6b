use firewatch_core::models::{ItemId, QueueItemStatus};
use firewatch_core::util::unix_millis_now;

use crate::commands::common::{
    describe_outcome, format_item_lines, format_status_lines, item_to_view, CommandContext,
    QueueItemView, QueueMode,
};
use crate::error::CliError;

pub async fn run_status(ctx: &CommandContext, as_json: bool) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    let status = queue.queue_status();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_list(
    ctx: &CommandContext,
    status: Option<QueueItemStatus>,
    as_json: bool,
) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    let items: Vec<_> = queue
        .items()
        .into_iter()
        .filter(|item| status.map_or(true, |wanted| item.status == wanted))
        .collect();
    let now = unix_millis_now();

    if as_json {
        let views = items
            .iter()
            .map(|item| item_to_view(item, now))
            .collect::<Vec<QueueItemView>>();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }
    for line in format_item_lines(&items, now) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_drain(ctx: &CommandContext) -> Result<(), CliError> {
    ctx.ensure_delivery_configured()?;
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    println!("{}", describe_outcome(queue.process_queue().await));
    Ok(())
}

pub async fn run_retry(ctx: &CommandContext) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    let reset = queue.retry_failed().await?;
    println!("Returned {reset} failed item(s) to pending");

    if reset > 0 && ctx.delivery_configured() {
        println!("{}", describe_outcome(queue.process_queue().await));
    }
    Ok(())
}

pub async fn run_clear(ctx: &CommandContext, all: bool) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    if all {
        let removed = queue.clear_all().await?;
        println!("Removed all {removed} item(s)");
    } else {
        let removed = queue.clear_completed().await?;
        println!("Removed {removed} completed item(s)");
    }
    Ok(())
}

pub async fn run_cleanup(ctx: &CommandContext) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    let purged = queue.cleanup_old_items().await?;
    println!("Purged {purged} expired item(s)");
    Ok(())
}

pub async fn run_remove(ctx: &CommandContext, id: &str) -> Result<(), CliError> {
    let id = id.trim();
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    if queue.remove(&ItemId::from(id)).await? {
        println!("Removed {id}");
        Ok(())
    } else {
        Err(CliError::ItemNotFound(id.to_string()))
    }
}
