//! Demo driver: batches upper-casing of generated strings.
//!
//! Run with `RUST_LOG=debug` to watch groups being flushed.

use std::time::Duration;

use clap::Parser;
use opbatch::{
    build_commit_pipeline, commit_fn, BatchError, Batcher, BatcherConfig, Context, Operations,
    PipelineConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "opbatch-demo", about = "Submit operations through a batcher and print results")]
struct Args {
    /// Flush once a group holds this many operations (0 disables).
    #[arg(long, env = "OPBATCH_MAX_SIZE", default_value_t = 8)]
    max_size: usize,
    /// Flush once a group is this old in milliseconds (0 disables).
    #[arg(long, env = "OPBATCH_MAX_AGE_MS", default_value_t = 50)]
    max_age_ms: u64,
    /// Number of operations to submit.
    #[arg(long, default_value_t = 32)]
    ops: usize,
    /// Upper bound on a single commit in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    commit_timeout_ms: u64,
    /// Per-operation submit and wait timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    wait_timeout_ms: u64,
    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let commit = commit_fn(|ctx: Context, ops: Operations<String, String>| async move {
        if let Some(err) = ctx.err() {
            ops.resolve_remaining(&err);
            return;
        }
        ops.resolve_each(|value| Ok(value.to_uppercase()));
    });
    let pipeline = PipelineConfig {
        commit_timeout: Duration::from_millis(args.commit_timeout_ms),
    };
    let config = BatcherConfig::default()
        .with_max_size(args.max_size)
        .with_max_age(Duration::from_millis(args.max_age_ms));
    let batcher = Batcher::new(
        build_commit_pipeline::<String, String, _>(commit, &pipeline),
        config,
    );

    let root = Context::background();
    let run = batcher.spawn(root.clone());

    tokio::spawn({
        let root = root.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                root.cancel();
            }
        }
    });

    let wait_timeout = Duration::from_millis(args.wait_timeout_ms);
    let mut waiters = Vec::with_capacity(args.ops);
    for index in 0..args.ops {
        let batcher = batcher.clone();
        waiters.push(tokio::spawn(async move {
            let ctx = Context::background().with_timeout(wait_timeout);
            let op = batcher.submit(&ctx, format!("op-{index}")).await?;
            op.wait(&ctx).await
        }));
    }

    for (index, waiter) in waiters.into_iter().enumerate() {
        match waiter.await? {
            Ok(result) => info!(index, %result, "operation resolved"),
            Err(err) => warn!(index, %err, "operation failed"),
        }
    }

    root.cancel();
    match run.await? {
        Err(err) if err.is_context_error() => {
            info!(state = batcher.state().as_str(), "batcher stopped");
            Ok(())
        }
        Err(err) => Err(err.into()),
        Ok(()) => Ok(()),
    }
}
