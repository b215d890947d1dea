use crate::services::Scheduler;
use crate::state::SharedState;

pub async fn cmd_import_dataset(state: &SharedState, refresh: bool) -> anyhow::Result<()> {
    println!("Importing offline dataset...");
    let inserted = state.importer.import_dataset(refresh).await?;
    println!("Inserted {inserted} new records");
    Ok(())
}

pub async fn cmd_backfill(state: &SharedState) -> anyhow::Result<()> {
    println!("Backfilling missing year/season...");
    let patched = state.importer.backfill_missing_fields().await?;
    println!("Patched {patched} records");
    Ok(())
}

pub async fn cmd_update_season(state: &SharedState) -> anyhow::Result<()> {
    println!("Updating current season...");
    let processed = state.importer.update_current_season().await?;
    println!("Processed {processed} seasonal titles");
    Ok(())
}

pub async fn cmd_upgrade_images(state: &SharedState, limit: usize) -> anyhow::Result<()> {
    println!("Scanning for low-quality images...");
    let queued = state.images.sweep(limit).await?;
    println!("Queued {queued} upgrades, waiting for them to finish");
    state.pool.wait_idle().await;
    println!("Done");
    Ok(())
}

pub async fn cmd_maintenance(state: &SharedState) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(
        state.importer.clone(),
        state.images.clone(),
        state.config.scheduler.clone(),
    );

    println!("Running maintenance jobs...");
    let report = scheduler.run_once().await;
    state.pool.wait_idle().await;

    let show = |count: Option<usize>| count.map_or_else(|| "failed".to_string(), |n| n.to_string());
    println!("  Season update:  {}", show(report.season_processed));
    println!("  Image upgrades: {}", show(report.images_queued));

    if report.season_processed.is_none() || report.images_queued.is_none() {
        anyhow::bail!("maintenance finished with failures");
    }
    Ok(())
}
