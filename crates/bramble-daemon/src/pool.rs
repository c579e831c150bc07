use std::sync::Arc;

pub(crate) const PARSE_POOL_PREFIX: &str = "bramble-parse";

/// Builds the parsing worker pool, halving the thread count whenever the OS refuses to spawn
/// threads. Returns `None` if not even one worker can be started; requests then parse serially.
pub(crate) fn build_parse_pool(threads: usize) -> Option<Arc<rayon::ThreadPool>> {
    let mut threads = threads.max(1);
    loop {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("{PARSE_POOL_PREFIX}-{idx}"))
            .build()
        {
            Ok(pool) => {
                tracing::debug!(target: "bramble.daemon", threads, "started parsing pool");
                return Some(Arc::new(pool));
            }
            Err(err) if threads > 1 => {
                tracing::debug!(
                    target: "bramble.daemon",
                    threads,
                    error = %err,
                    "failed to start parsing pool; retrying with fewer threads"
                );
                threads = (threads / 2).max(1);
            }
            Err(err) => {
                tracing::warn!(
                    target: "bramble.daemon",
                    error = %err,
                    "failed to start parsing pool; parsing serially"
                );
                return None;
            }
        }
    }
}
