use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use narrator_core::voice::VoiceListCache;
use narrator_core::Synthesizer;
use narrator_worker::{run_worker, WorkerArgs};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = WorkerArgs::parse(env::args().skip(1));

    let mut builder = Synthesizer::builder();
    if let Some(dir) = args.cache_dir {
        builder = builder.voice_cache(VoiceListCache::new(dir, args.voice_cache_ttl));
    }

    run_worker(tokio::io::stdin(), tokio::io::stdout(), Arc::new(builder.build())).await
}
