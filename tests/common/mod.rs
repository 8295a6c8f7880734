#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod temp_files {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Creates a temporary file with a unique name
    pub fn create_temp_file(content: &str, ext: &str) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let path = std::env::temp_dir().join(format!(
            "routebind_test_{}_{}_{}.{}",
            std::process::id(),
            counter,
            nanos,
            ext
        ));

        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn create_temp_yaml(content: &str) -> PathBuf {
        create_temp_file(content, "yaml")
    }

    pub fn create_temp_json(content: &str) -> PathBuf {
        create_temp_file(content, "json")
    }

    /// Cleanup temporary files (best effort)
    pub fn cleanup_temp_files(paths: &[PathBuf]) {
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub mod runtime {
    use routebind::config::AppConfig;
    use routebind::dispatcher::Dispatcher;
    use routebind::worker_pool::{WorkerPool, WorkerPoolConfig};
    use std::sync::{Arc, Once};
    use std::time::Duration;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    pub fn small_pool(core: usize, max: usize, queue: usize) -> Arc<WorkerPool> {
        setup_may_runtime();
        WorkerPool::new(WorkerPoolConfig::new(core, max, queue, 0x8000)).unwrap()
    }

    /// Dispatcher with a small pool and a short async timeout.
    pub fn dispatcher_with_pool(async_timeout: Duration, fallback: Option<serde_json::Value>) -> Dispatcher {
        let config = AppConfig {
            async_timeout_ms: u64::try_from(async_timeout.as_millis()).unwrap(),
            async_timeout_fallback: fallback,
            ..AppConfig::default()
        };
        config.build_dispatcher_with_pool(small_pool(2, 4, 16))
    }
}
