//! Scheduler (§4.7): a cron-style timer set keyed by feed ID feeding a
//! bounded job queue drained by a single serializing worker. Overlapping
//! fires for the same feed are dropped rather than queued twice; shutdown
//! is cooperative via a [`CancellationToken`] the way the rest of the
//! engine's blocking operations are (§5 "context propagation").
//!
//! The `cron` crate has no notion of a plain interval, so `Schedule::Interval`
//! feeds get a `tokio::time::interval` timer instead of a synthesized cron
//! expression — only `Schedule::Cron`/`Schedule::Both` actually go through
//! `cron::Schedule::from_str`.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::constants::scheduler::QUEUE_CAPACITY;
use crate::models::{Feed, Schedule};

/// Feed ID → the next time its timer is due to fire, refreshed by each timer
/// task immediately after it computes its next wakeup (§4.7 step 2: "report
/// the next-fire time after each run").
type NextFireMap = Arc<Mutex<HashMap<String, DateTime<Utc>>>>;

/// Invoked by the worker with the feed ID whose turn it is to update. The
/// Feed Updater's `update` method is wrapped into this shape by the caller
/// so the scheduler never depends on the pipeline directly.
pub type UpdateFn = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct Timer {
    feed_id: String,
    handle: JoinHandle<()>,
}

/// Owns every per-feed timer task plus the single worker task. Dropping a
/// `Scheduler` does not stop anything — call [`Scheduler::shutdown`] and
/// await [`Scheduler::join`] for a graceful stop.
pub struct Scheduler {
    timers: Vec<Timer>,
    worker: JoinHandle<()>,
    cancellation: CancellationToken,
    in_flight: Arc<Mutex<HashSet<String>>>,
    next_fire: NextFireMap,
}

impl Scheduler {
    /// Registers one timer per feed and starts the worker loop. Feeds with
    /// `has_explicit_cron_schedule() == false` are pushed onto the queue
    /// immediately as a boot-time kick (§4.7 step 3).
    pub fn start(feeds: &[Feed], on_fire: UpdateFn, cancellation: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let next_fire: NextFireMap = Arc::new(Mutex::new(HashMap::new()));

        let mut timers = Vec::with_capacity(feeds.len());
        for feed in feeds {
            let feed_id = feed.id.clone();
            let sender = sender.clone();
            let in_flight = in_flight.clone();
            let cancellation = cancellation.clone();
            let next_fire = next_fire.clone();

            if !feed.schedule.has_explicit_cron_schedule() {
                enqueue(&sender, &in_flight, feed_id.clone());
            }

            let handle = match &feed.schedule {
                Schedule::Interval { period_seconds } => {
                    let period = std::time::Duration::from_secs(*period_seconds);
                    tokio::spawn(interval_timer(
                        feed_id.clone(),
                        period,
                        sender,
                        in_flight,
                        next_fire,
                        cancellation,
                    ))
                }
                Schedule::Cron { expression } | Schedule::Both { expression, .. } => {
                    match cron::Schedule::from_str(expression) {
                        Ok(schedule) => tokio::spawn(cron_timer(
                            feed_id.clone(),
                            schedule,
                            sender,
                            in_flight,
                            next_fire,
                            cancellation,
                        )),
                        Err(err) => {
                            warn!(feed_id, %err, "invalid cron expression, feed will never fire on a timer");
                            tokio::spawn(async {})
                        }
                    }
                }
            };
            timers.push(Timer { feed_id, handle });
        }

        let worker = tokio::spawn(worker_loop(receiver, on_fire, in_flight.clone(), cancellation.clone()));

        Self {
            timers,
            worker,
            cancellation,
            in_flight,
            next_fire,
        }
    }

    /// Cancels the root context; the worker exits once it observes
    /// cancellation between episodes and timers stop scheduling new fires.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    /// Awaits every timer task and the worker task to completion. Intended
    /// to be called after [`Scheduler::shutdown`].
    pub async fn join(self) {
        for timer in self.timers {
            let _ = timer.handle.await;
        }
        let _ = self.worker.await;
    }

    /// Feed IDs currently queued or mid-update, for diagnostics.
    pub fn in_flight_feeds(&self) -> Vec<String> {
        self.in_flight.lock().iter().cloned().collect()
    }

    /// The next time `feed_id`'s timer is due to fire, if it has a
    /// registered timer and that timer has computed at least one wakeup
    /// (§4.7 step 2). Updated by the timer task itself, so this reflects the
    /// schedule after every run rather than a one-time computation at boot.
    pub fn next_fire(&self, feed_id: &str) -> Option<DateTime<Utc>> {
        self.next_fire.lock().get(feed_id).copied()
    }

    /// Every feed with a live timer and its next scheduled fire time.
    pub fn next_fires(&self) -> HashMap<String, DateTime<Utc>> {
        self.next_fire.lock().clone()
    }
}

fn enqueue(sender: &mpsc::Sender<String>, in_flight: &Arc<Mutex<HashSet<String>>>, feed_id: String) {
    let mut guard = in_flight.lock();
    if guard.contains(&feed_id) {
        return;
    }
    match sender.try_send(feed_id.clone()) {
        Ok(()) => {
            guard.insert(feed_id);
        }
        Err(err) => {
            warn!(feed_id, %err, "scheduler queue full or closed, dropping this fire");
        }
    }
}

async fn interval_timer(
    feed_id: String,
    period: std::time::Duration,
    sender: mpsc::Sender<String>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    next_fire: NextFireMap,
    cancellation: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await; // first tick fires immediately; the boot-time kick already queued feed_id once.
    record_next_fire(&next_fire, &feed_id, period);
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = ticker.tick() => {
                enqueue(&sender, &in_flight, feed_id.clone());
                record_next_fire(&next_fire, &feed_id, period);
            }
        }
    }
}

fn record_next_fire(next_fire: &NextFireMap, feed_id: &str, period: std::time::Duration) {
    let delay = chrono::Duration::from_std(period).unwrap_or(chrono::Duration::zero());
    next_fire.lock().insert(feed_id.to_string(), Utc::now() + delay);
}

async fn cron_timer(
    feed_id: String,
    schedule: cron::Schedule,
    sender: mpsc::Sender<String>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    next_fire: NextFireMap,
    cancellation: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(chrono::Utc).next() else {
            warn!(feed_id, "cron schedule has no upcoming fires, stopping timer");
            next_fire.lock().remove(&feed_id);
            return;
        };
        next_fire.lock().insert(feed_id.clone(), next);
        let delay = (next - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::select! {
            _ = cancellation.cancelled() => return,
            _ = tokio::time::sleep(delay) => enqueue(&sender, &in_flight, feed_id.clone()),
        }
    }
}

async fn worker_loop(
    mut receiver: mpsc::Receiver<String>,
    on_fire: UpdateFn,
    in_flight: Arc<Mutex<HashSet<String>>>,
    cancellation: CancellationToken,
) {
    loop {
        let feed_id = tokio::select! {
            _ = cancellation.cancelled() => {
                receiver.close();
                return;
            }
            next = receiver.recv() => match next {
                Some(feed_id) => feed_id,
                None => return,
            },
        };

        info!(feed_id = %feed_id, "scheduler dispatching feed update");
        on_fire(feed_id.clone()).await;
        in_flight.lock().remove(&feed_id);
    }
}
