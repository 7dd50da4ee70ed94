use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::engine::domain::asset_fetcher::{AssetFetcher, ProgressFn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("failed to load {url}: {reason}")]
    Fetch { url: String, reason: String },
}

type Outcome = Result<PathBuf, String>;

/// Loads engine assets at most once per URL.
///
/// Concurrent callers for the same URL share one in-flight fetch and all
/// receive its outcome. Successes stay memoized; a failure clears the
/// entry so the next call fetches again.
pub struct AssetLoader {
    fetcher: Box<dyn AssetFetcher>,
    slots: Mutex<HashMap<String, Arc<LoadSlot>>>,
}

struct LoadSlot {
    outcome: Mutex<Option<Outcome>>,
    settled: Condvar,
}

impl AssetLoader {
    pub fn new(fetcher: Box<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `url` to a local path, fetching it if no load is memoized.
    ///
    /// `progress` is only invoked when this call performs the fetch.
    pub fn load(&self, url: &str, progress: Option<ProgressFn>) -> Result<PathBuf, LoadError> {
        let (slot, is_leader) = {
            let mut slots = lock(&self.slots);
            match slots.get(url) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(LoadSlot::new());
                    slots.insert(url.to_string(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        let outcome = if is_leader {
            let outcome = self.fetch_guarded(url, progress);
            if outcome.is_err() {
                self.forget(url, &slot);
            }
            slot.settle(outcome.clone());
            outcome
        } else {
            log::debug!("Waiting for in-flight load of {url}");
            slot.wait()
        };

        outcome.map_err(|reason| LoadError::Fetch {
            url: url.to_string(),
            reason,
        })
    }

    fn fetch_guarded(&self, url: &str, progress: Option<ProgressFn>) -> Outcome {
        // A panicking fetcher must still settle the slot, or waiters block forever.
        match panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(url, progress))) {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("asset fetcher panicked".to_string()),
        }
    }

    fn forget(&self, url: &str, slot: &Arc<LoadSlot>) {
        let mut slots = lock(&self.slots);
        if slots.get(url).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(url);
        }
    }
}

impl LoadSlot {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            settled: Condvar::new(),
        }
    }

    fn settle(&self, outcome: Outcome) {
        *lock(&self.outcome) = Some(outcome);
        self.settled.notify_all();
    }

    fn wait(&self) -> Outcome {
        let mut guard = lock(&self.outcome);
        loop {
            if let Some(ref outcome) = *guard {
                return outcome.clone();
            }
            guard = self
                .settled
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use crate::engine::domain::asset_fetcher::FetchError;

    /// Counts fetches; fails the first `failures` of them.
    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        failures: usize,
        delay: Duration,
    }

    impl CountingFetcher {
        fn new(calls: Arc<AtomicUsize>, failures: usize, delay: Duration) -> Self {
            Self {
                calls,
                failures,
                delay,
            }
        }
    }

    impl AssetFetcher for CountingFetcher {
        fn fetch(&self, url: &str, progress: Option<ProgressFn>) -> Result<PathBuf, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if let Some(cb) = progress {
                cb(10, 10);
            }
            if n < self.failures {
                return Err(format!("network unreachable ({url})").into());
            }
            Ok(PathBuf::from(format!("/cache/{}", url.rsplit('/').next().unwrap())))
        }
    }

    struct PanickingFetcher;

    impl AssetFetcher for PanickingFetcher {
        fn fetch(&self, _url: &str, _progress: Option<ProgressFn>) -> Result<PathBuf, FetchError> {
            panic!("boom");
        }
    }

    fn loader(calls: &Arc<AtomicUsize>, failures: usize, delay_ms: u64) -> AssetLoader {
        AssetLoader::new(Box::new(CountingFetcher::new(
            Arc::clone(calls),
            failures,
            Duration::from_millis(delay_ms),
        )))
    }

    #[test]
    fn test_concurrent_loads_share_one_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(loader(&calls, 0, 50));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    loader.load("https://cdn.example.com/cascade.xml", None)
                })
            })
            .collect();

        for handle in handles {
            let path = handle.join().unwrap().unwrap();
            assert_eq!(path, PathBuf::from("/cache/cascade.xml"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_successful_load_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(&calls, 0, 0);

        loader.load("https://cdn.example.com/model.onnx", None).unwrap();
        loader.load("https://cdn.example.com/model.onnx", None).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_urls_fetch_separately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(&calls, 0, 0);

        loader.load("https://cdn.example.com/a.xml", None).unwrap();
        loader.load("https://cdn.example.com/b.onnx", None).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_clears_memo_and_allows_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(&calls, 1, 0);
        let url = "https://cdn.example.com/model.onnx";

        let err = loader.load(url, None).unwrap_err();
        assert!(matches!(err, LoadError::Fetch { ref reason, .. } if reason.contains("unreachable")));
        assert!(lock(&loader.slots).is_empty());

        let path = loader.load(url, None).unwrap();
        assert_eq!(path, PathBuf::from("/cache/model.onnx"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_waiters_share_the_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = Arc::new(loader(&calls, 1, 50));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let loader = Arc::clone(&loader);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    loader.load("https://cdn.example.com/model.onnx", None)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Every caller that joined the failed fetch saw the error; any caller
        // arriving after the memo was cleared triggered exactly one retry.
        let fetches = calls.load(Ordering::SeqCst);
        let failures = results.iter().filter(|r| r.is_err()).count();
        assert!(failures >= 1);
        assert!(fetches <= 2);
        if fetches == 1 {
            assert_eq!(failures, 4);
        }
    }

    #[test]
    fn test_progress_reaches_leader_only() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = loader(&calls, 0, 0);
        let reported = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let reported = Arc::clone(&reported);
            loader
                .load(
                    "https://cdn.example.com/font.ttf",
                    Some(Box::new(move |_, _| {
                        reported.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .unwrap();
        }

        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_fetcher_becomes_load_error() {
        let loader = AssetLoader::new(Box::new(PanickingFetcher));
        let err = loader.load("https://cdn.example.com/x.onnx", None).unwrap_err();
        assert!(err.to_string().contains("panicked"));
        assert!(lock(&loader.slots).is_empty());
    }
}
