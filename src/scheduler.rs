//! Refresh Scheduler and unknown-domain fallback resolution. Cache wiring,
//! the worker-pool fan-out, the warm-up barrier, and the synchronous
//! fallback lookup all live on one `Resolver` type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::BackendClient;
use crate::cache::{dedup_by_ip, EntryCache, FallbackCache};
use crate::device::Device;
use crate::entry::{Entries, Entry, SearchDeviceQuery};

/// Resolver state: entry list, backend handle, both caches, worker count,
/// refresh interval, warm-up signal.
pub struct Resolver {
    entries: Entries,
    backend: Arc<dyn BackendClient>,
    entry_cache: EntryCache,
    fallback_cache: FallbackCache,
    nb_workers: usize,
    refresh_interval: Duration,
    warmed_up: AtomicBool,
    warmup_tx: Mutex<Option<watch::Sender<bool>>>,
    warmup_rx: watch::Receiver<bool>,
    metrics_enabled: bool,
}

impl Resolver {
    pub fn new(entries: Entries, backend: Arc<dyn BackendClient>, nb_workers: usize, refresh_interval: Duration) -> Self {
        Self::with_metrics(entries, backend, nb_workers, refresh_interval, true)
    }

    pub fn with_metrics(
        entries: Entries,
        backend: Arc<dyn BackendClient>,
        nb_workers: usize,
        refresh_interval: Duration,
        metrics_enabled: bool,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            entries,
            backend,
            entry_cache: EntryCache::new(),
            fallback_cache: FallbackCache::new(),
            nb_workers: nb_workers.max(1),
            refresh_interval,
            warmed_up: AtomicBool::new(false),
            warmup_tx: Mutex::new(Some(tx)),
            warmup_rx: rx,
            metrics_enabled,
        }
    }

    pub fn entries(&self) -> &Entries {
        &self.entries
    }

    pub fn entry(&self, domain: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.domain == domain)
    }

    pub fn backend(&self) -> &(dyn BackendClient + 'static) {
        self.backend.as_ref()
    }

    /// Blocks until the first full refresh pass completes. The warm-up
    /// signal is a `watch` channel rather than a one-shot channel: any
    /// number of callers, including ones that start waiting after the
    /// signal already fired, observe it.
    pub async fn wait_warmup(&self) {
        if self.warmed_up.load(Ordering::Acquire) {
            return;
        }
        let mut rx = self.warmup_rx.clone();
        let _ = rx.wait_for(|warmed| *warmed).await;
    }

    pub fn is_warmed_up(&self) -> bool {
        self.warmed_up.load(Ordering::Acquire)
    }

    /// Read accessor with fallback behavior.
    pub async fn devices_for(&self, domain: &str) -> Arc<Vec<Device>> {
        if domain.is_empty() {
            return Arc::new(Vec::new());
        }
        if let Some(devices) = self.entry_cache.get(domain) {
            return devices;
        }
        self.resolve_fallback(domain).await
    }

    async fn resolve_fallback(&self, domain: &str) -> Arc<Vec<Device>> {
        let now = Instant::now();
        if let Some(devices) = self.fallback_cache.get(domain, now) {
            return devices;
        }

        let query = SearchDeviceQuery {
            dns: domain.to_string(),
            matchall: false,
            ..Default::default()
        };

        match self.backend.search_device(&query).await {
            Ok(devices) => {
                if self.metrics_enabled {
                    crate::metrics::record_fallback_lookup(domain, "success");
                }
                self.fallback_cache
                    .insert(domain.to_string(), devices.clone(), self.refresh_interval, now);
                Arc::new(devices)
            }
            Err(e) => {
                error!(domain, error = %e, "fallback lookup against backend failed");
                if self.metrics_enabled {
                    crate::metrics::record_fallback_lookup(domain, "failure");
                }
                Arc::new(Vec::new())
            }
        }
    }

    /// Runs the periodic worker-pool fan-out until `cancel` fires. The
    /// first tick starts immediately; subsequent ticks wait a full
    /// `refresh_interval`.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut first = true;
        loop {
            if !first {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.refresh_interval) => {}
                }
                self.fallback_cache.sweep(Instant::now());
            }
            first = false;

            if cancel.is_cancelled() {
                return;
            }

            self.run_pass(&cancel).await;

            if !self.warmed_up.load(Ordering::Acquire) {
                self.warmed_up.store(true, Ordering::Release);
                let mut guard = self.warmup_tx.lock().await;
                if let Some(tx) = guard.take() {
                    let _ = tx.send(true);
                }
                info!(nb_entries = self.entries.len(), "finished warming up entries");
            }
        }
    }

    /// One refresh pass: fan out one job per entry across `nb_workers`
    /// bounded agents.
    async fn run_pass(&self, cancel: &CancellationToken) {
        if !self.warmed_up.load(Ordering::Acquire) {
            info!(nb_entries = self.entries.len(), "warming up entries");
        }

        let (tx, rx) = async_channel::bounded::<Entry>(self.entries.len().max(1));
        for entry in self.entries.clone() {
            // Capacity matches entry count; this cannot block.
            let _ = tx.send(entry).await;
        }
        tx.close();

        let mut workers = Vec::with_capacity(self.nb_workers);
        for _ in 0..self.nb_workers {
            let rx = rx.clone();
            let cancel = cancel.clone();
            workers.push(self.refresh_worker(rx, cancel));
        }
        futures::future::join_all(workers).await;
    }

    async fn refresh_worker(&self, rx: async_channel::Receiver<Entry>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let entry = tokio::select! {
                _ = cancel.cancelled() => return,
                job = rx.recv() => match job {
                    Ok(entry) => entry,
                    Err(_) => return,
                },
            };

            debug!(entry_domain = %entry.domain, "loading entry from backend");
            match self.search_devices_by_entry(&entry).await {
                Ok(devices) => {
                    if self.metrics_enabled && entry.enable_metrics {
                        crate::metrics::record_refresh_success(&entry.domain, devices.len());
                        for device in &devices {
                            crate::metrics::record_device_info(&entry.domain, device);
                        }
                    }
                    self.entry_cache.insert(entry.domain.clone(), devices);
                    debug!(entry_domain = %entry.domain, "finished loading entry from backend");
                }
                Err(e) => {
                    error!(entry_domain = %entry.domain, error = %e, "devices could not be retrieved");
                    if self.metrics_enabled && entry.enable_metrics {
                        crate::metrics::record_refresh_failure(&entry.domain);
                    }
                }
            }
        }
    }

    async fn search_devices_by_entry(&self, entry: &Entry) -> Result<Vec<Device>, crate::backend::BackendError> {
        let mut devices = Vec::new();
        for target in &entry.targets {
            let found = self.backend.search_device(target).await?;
            devices.extend(found);
        }
        Ok(dedup_by_ip(devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FakeBackendClient;
    use crate::device::empty_for_tests;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn device(ip: &str, dns: &str) -> Device {
        Device {
            ip: ip.to_string(),
            dns: dns.to_string(),
            ..empty_for_tests()
        }
    }

    fn entry(domain: &str, targets: usize) -> Entry {
        Entry {
            domain: domain.to_string(),
            targets: (0..targets).map(|_| SearchDeviceQuery::default()).collect(),
            routing: None,
            enable_metrics: true,
        }
    }

    #[tokio::test]
    async fn devices_for_reads_entry_cache_with_zero_backend_calls_after_warmup() {
        let devices = vec![device("10.0.0.1", "sw1.example")];
        let backend = Arc::new(FakeBackendClient::new(devices));
        let resolver = Arc::new(Resolver::new(
            vec![entry("switches.example", 1)],
            backend,
            2,
            StdDuration::from_secs(3600),
        ));

        let cancel = CancellationToken::new();
        let r = resolver.clone();
        let c = cancel.clone();
        let handle = tokio::spawn(async move { r.run(c).await });

        resolver.wait_warmup().await;
        let got = resolver.devices_for("switches.example").await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].ip, "10.0.0.1");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_devices_across_targets_collapse_to_one() {
        let devices = vec![device("10.0.0.1", "sw1.example")];
        let backend = Arc::new(FakeBackendClient::new(devices));
        let resolver = Resolver::new(vec![entry("switches.example", 2)], backend, 1, StdDuration::from_secs(3600));

        resolver.run_pass(&CancellationToken::new()).await;

        let got = resolver.entry_cache.get("switches.example").unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn fallback_resolution_short_circuits_empty_domain() {
        let backend = Arc::new(FakeBackendClient::new(vec![device("10.0.0.1", "sw1.example")]));
        let resolver = Resolver::new(vec![entry("switches.example", 1)], backend, 1, StdDuration::from_secs(60));
        let got = resolver.devices_for("").await;
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn refresh_pass_bounds_concurrency_to_worker_count() {
        struct CountingBackend {
            in_flight: AtomicUsize,
            max_seen: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl BackendClient for CountingBackend {
            async fn search_device(
                &self,
                _query: &SearchDeviceQuery,
            ) -> Result<Vec<Device>, crate::backend::BackendError> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(20)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(vec![])
            }
        }

        let backend = Arc::new(CountingBackend {
            in_flight: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        });

        let entries: Entries = (0..10).map(|i| entry(&format!("e{i}.example"), 1)).collect();
        let resolver = Resolver::new(entries, backend.clone(), 3, StdDuration::from_secs(3600));
        resolver.run_pass(&CancellationToken::new()).await;

        assert!(backend.max_seen.load(Ordering::SeqCst) <= 3);
    }
}
