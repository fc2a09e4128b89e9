use crate::codec::site::strip_comments;
use crate::traits::{Fetch, Sourcer};
use crate::types::{MixError, Result, SourceSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use interfaces::{SourceSpec, SourceType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Failure backoff is `2^failures` seconds; the exponent stops growing here.
const MAX_BACKOFF_EXPONENT: u32 = 30;

/// Shortest scheduler period; `interval_at` rejects a zero period.
const MIN_CHECK_PERIOD: Duration = Duration::from_secs(1);

struct SourceEntry {
    spec: SourceSpec,
    data: Option<Bytes>,
    last_update: Option<Instant>,
    updated_at: Option<DateTime<Utc>>,
    last_error: Option<Instant>,
    last_error_message: Option<String>,
    error_count: u32,
    refreshing: bool,
    /// Bumped after every commit so waiting `get` calls can re-read.
    done: watch::Sender<u64>,
}

impl SourceEntry {
    fn new(spec: SourceSpec) -> Self {
        let (done, _) = watch::channel(0);
        Self {
            spec,
            data: None,
            last_update: None,
            updated_at: None,
            last_error: None,
            last_error_message: None,
            error_count: 0,
            refreshing: false,
            done,
        }
    }

    /// Never fetched, or older than its interval.
    fn is_expired(&self, now: Instant) -> bool {
        match (&self.data, self.last_update) {
            (Some(_), Some(last_update)) => match self.spec.refresh_interval() {
                Some(interval) => now.duration_since(last_update) > interval,
                None => false,
            },
            _ => true,
        }
    }

    fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        let last_error = self.last_error?;
        let backoff = Duration::from_secs(1u64 << self.error_count.min(MAX_BACKOFF_EXPONENT));
        let elapsed = now.duration_since(last_error);
        (elapsed < backoff).then(|| backoff - elapsed)
    }

    fn snapshot(&self) -> Option<SourceSnapshot> {
        Some(SourceSnapshot {
            name: self.spec.name.clone(),
            url: self.spec.url.clone(),
            source_type: self.spec.source_type,
            data: self.data.clone()?,
            updated_at: self.updated_at?,
        })
    }
}

enum Signal {
    Refresh { force: bool },
    Close,
}

/// Result of asking for a refresh.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// This call fetched and committed a new payload.
    Refreshed,
    /// Another refresh was already running; the receiver changes when it commits.
    InFlight(watch::Receiver<u64>),
}

struct Inner {
    sources: RwLock<HashMap<String, SourceEntry>>,
    fetcher: Arc<dyn Fetch>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: Mutex<Option<mpsc::UnboundedReceiver<Signal>>>,
}

/// In-memory cache of every configured source, refreshed on demand and by a
/// background scheduler.
#[derive(Clone)]
pub struct SourceManager {
    inner: Arc<Inner>,
}

impl SourceManager {
    /// Duplicate names collide; the last spec wins.
    pub fn new(sources: impl IntoIterator<Item = SourceSpec>, fetcher: Arc<dyn Fetch>) -> Self {
        let mut map = HashMap::new();
        for spec in sources {
            if map.contains_key(&spec.name) {
                warn!("Duplicate source name {}, keeping the last definition", spec.name);
            }
            map.insert(spec.name.clone(), SourceEntry::new(spec));
        }

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                sources: RwLock::new(map),
                fetcher,
                signal_tx,
                signal_rx: Mutex::new(Some(signal_rx)),
            }),
        }
    }

    /// Spawn the scheduler that rescans sources every `check_period`,
    /// raised to at least one second. Returns `None` if it is already running.
    pub fn start(&self, check_period: Duration) -> Option<JoinHandle<()>> {
        let check_period = check_period.max(MIN_CHECK_PERIOD);
        let receiver = match self.inner.signal_rx.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(receiver) = receiver else {
            warn!("Source refresh loop already started");
            return None;
        };

        let manager = self.clone();
        Some(tokio::spawn(async move {
            manager.refresh_loop(receiver, check_period).await;
        }))
    }

    /// Ask the scheduler to scan now; `force` refreshes every source.
    pub fn trigger_refresh(&self, force: bool) {
        if self.inner.signal_tx.send(Signal::Refresh { force }).is_err() {
            debug!("Refresh loop is gone, ignoring refresh trigger");
        }
    }

    /// Stop scheduling. Refreshes already running are left to finish.
    pub fn close(&self) {
        let _ = self.inner.signal_tx.send(Signal::Close);
    }

    pub async fn source_names(&self) -> Vec<String> {
        self.inner.sources.read().await.keys().cloned().collect()
    }

    /// Current payload of `name`, refreshing first when it was never fetched or
    /// has expired. A failed refresh is returned even when older data exists.
    pub async fn get(&self, name: &str) -> Result<SourceSnapshot> {
        {
            let sources = self.inner.sources.read().await;
            let entry = sources.get(name).ok_or_else(|| not_found(name))?;
            if !entry.is_expired(Instant::now()) {
                if let Some(snapshot) = entry.snapshot() {
                    debug!("Cache hit for source {} (updated {})", name, snapshot.updated_at.to_rfc3339());
                    return Ok(snapshot);
                }
            }
        }

        if let RefreshOutcome::InFlight(mut done) = self.refresh_source(name).await? {
            // The sender lives as long as the entry, so this only fails on shutdown.
            let _ = done.changed().await;
            let sources = self.inner.sources.read().await;
            if let Some(message) = sources.get(name).and_then(|e| e.last_error_message.clone()) {
                return Err(MixError::Fetch {
                    name: name.to_string(),
                    message,
                });
            }
        }

        let sources = self.inner.sources.read().await;
        sources
            .get(name)
            .and_then(SourceEntry::snapshot)
            .ok_or_else(|| MixError::Fetch {
                name: name.to_string(),
                message: "no data fetched yet".to_string(),
            })
    }

    /// Fetch `name` unless a refresh is already running or its backoff is active.
    pub async fn refresh_source(&self, name: &str) -> Result<RefreshOutcome> {
        let (url, source_type) = {
            let mut sources = self.inner.sources.write().await;
            let entry = sources.get_mut(name).ok_or_else(|| not_found(name))?;

            if entry.refreshing {
                return Ok(RefreshOutcome::InFlight(entry.done.subscribe()));
            }

            if let Some(remaining) = entry.backoff_remaining(Instant::now()) {
                return Err(MixError::BackoffActive {
                    name: name.to_string(),
                    retry_in_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
                });
            }

            entry.refreshing = true;
            (entry.spec.url.clone(), entry.spec.source_type)
        };

        // Run the fetch in its own task so a dropped caller cannot leave the
        // source marked as refreshing.
        let manager = self.clone();
        let owned_name = name.to_string();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let result = manager
                .inner
                .fetcher
                .fetch(&url)
                .await
                .map(|data| normalize(source_type, data));
            manager.commit(&owned_name, result, started).await
        });

        match task.await {
            Ok(result) => result.map(|()| RefreshOutcome::Refreshed),
            Err(join_error) => {
                let err = MixError::Fetch {
                    name: name.to_string(),
                    message: join_error.to_string(),
                };
                self.commit(name, Err(err), Instant::now())
                    .await
                    .map(|()| RefreshOutcome::Refreshed)
            }
        }
    }

    async fn commit(&self, name: &str, result: Result<Bytes>, started: Instant) -> Result<()> {
        let mut sources = self.inner.sources.write().await;
        let Some(entry) = sources.get_mut(name) else {
            return result.map(|_| ());
        };
        entry.refreshing = false;

        let outcome = match result {
            Ok(data) => {
                info!(
                    "Refreshed source {} ({} bytes in {}ms)",
                    name,
                    data.len(),
                    started.elapsed().as_millis()
                );
                entry.data = Some(data);
                entry.last_update = Some(Instant::now());
                entry.updated_at = Some(Utc::now());
                entry.last_error = None;
                entry.last_error_message = None;
                entry.error_count = 0;
                Ok(())
            }
            Err(e) => {
                entry.last_error = Some(Instant::now());
                entry.last_error_message = Some(e.to_string());
                entry.error_count = entry.error_count.saturating_add(1);
                warn!(
                    "Refresh of source {} failed ({} consecutive): {}",
                    name, entry.error_count, e
                );
                Err(e)
            }
        };

        entry.done.send_modify(|generation| *generation = generation.wrapping_add(1));
        outcome
    }

    async fn refresh_loop(&self, mut signals: mpsc::UnboundedReceiver<Signal>, check_period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + check_period, check_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Source refresh loop started (every {:?})", check_period);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_expired_sources(false).await,
                signal = signals.recv() => match signal {
                    Some(Signal::Refresh { force }) => self.refresh_expired_sources(force).await,
                    Some(Signal::Close) | None => break,
                },
            }
        }

        info!("Source refresh loop stopped");
    }

    async fn refresh_expired_sources(&self, force: bool) {
        let now = Instant::now();
        let names: Vec<String> = {
            let sources = self.inner.sources.read().await;
            sources
                .iter()
                .filter(|(_, entry)| force || entry.is_expired(now))
                .map(|(name, _)| name.clone())
                .collect()
        };
        debug!("Refresh scan (force={}): {} sources due", force, names.len());

        for name in names {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.refresh_source(&name).await {
                    debug!("Scheduled refresh of {} not applied: {}", name, e);
                }
            });
        }
    }
}

#[async_trait]
impl Sourcer for SourceManager {
    async fn get_source(&self, name: &str) -> Result<SourceSnapshot> {
        self.get(name).await
    }
}

fn not_found(name: &str) -> MixError {
    MixError::SourceNotFound {
        name: name.to_string(),
    }
}

fn normalize(source_type: SourceType, data: Bytes) -> Bytes {
    if source_type.is_site_directory() {
        strip_comments(&data)
    } else {
        data
    }
}
