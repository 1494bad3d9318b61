use crate::{
    collector::Collector,
    completion::DirectoryOracle,
    executors::{local::LocalExecutor, ExecutorError, OutputLayout, RunSummary},
    launcher::{LaunchOptions, Launcher},
    partition::Shard,
    rank::RankIdentity,
    unit::RecordFormat,
};
use tracing::info;

/// Run this worker's part of the batch
///
/// Every worker lists the source and the completed outputs on its own and
/// derives its shard from `rank`, no coordination between workers happens.
pub fn run_worker<L, F>(
    rank: &RankIdentity,
    collector: &Collector,
    layout: &OutputLayout,
    format: &F,
    launcher: L,
    options: LaunchOptions,
) -> Result<RunSummary, ExecutorError>
where
    L: Launcher,
    F: RecordFormat + ?Sized,
{
    layout.prepare()?;

    let oracle = DirectoryOracle::new(layout.root());
    let pending = collector.pending(format, &oracle);
    let shard = Shard::compute(pending.len(), rank.global_rank(), rank.world_size());

    info!(
        "Rank {}/{} starting at {}, ending at {} ({} pending)",
        rank.global_rank(),
        rank.world_size(),
        shard.start,
        shard.end,
        pending.len()
    );

    let executor = LocalExecutor::new(launcher, format, layout, options);

    Ok(executor.execute(shard.slice(&pending)))
}
