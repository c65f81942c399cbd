//! Watermark advancement loop.
//!
//! Keeps the verification watermark from lagging the chain's finalized
//! height by periodically issuing a privileged record-verified-height
//! call. At most one advancement is ever outstanding; ticks that land
//! while one is in flight perform no work, so under sustained lag the
//! loop issues roughly one call per (interval + confirmation latency),
//! not one per tick.

use crate::config::WatcherConfig;
use crate::waiter::current_watermark;
use chain_client::{BlockNumber, ChainClient, DispatchOutcome, PrivilegedCall, TxStatus};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Terminal state of one advancement attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Submitted, finalization not yet observed.
    InFlight,
    /// The call finalized and dispatched successfully.
    Succeeded,
    /// The call was rejected, the transport died, or the attempt was
    /// abandoned.
    Failed,
}

/// One privileged call targeting a block number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvancementAttempt {
    /// Correlation id for logs.
    pub id: Uuid,
    /// Height the call asserts as verified.
    pub target: BlockNumber,
    /// Where the attempt ended up.
    pub outcome: AttemptOutcome,
}

/// Observable counters for the advancement loop.
#[derive(Clone, Debug, Default)]
pub struct AdvancerStats {
    /// Ticks the loop has run.
    pub ticks: u64,
    /// Ticks skipped because an advancement was still outstanding.
    pub skipped_in_flight: u64,
    /// Ticks skipped inside a failure cooldown.
    pub skipped_cooldown: u64,
    /// Ticks where the watermark had already caught up.
    pub noop_ticks: u64,
    /// Advancement calls submitted.
    pub attempts: u64,
    /// Attempts that finalized successfully.
    pub succeeded: u64,
    /// Attempts that failed or were abandoned.
    pub failed: u64,
    /// Ticks where dry-run mode suppressed a submission.
    pub dry_runs: u64,
    /// Most recent attempt, if any.
    pub last_attempt: Option<AdvancementAttempt>,
}

/// The advancement loop. Construct via [`WatermarkAdvancer::spawn`].
pub struct WatermarkAdvancer<C: ChainClient + 'static> {
    client: Arc<C>,
    config: WatcherConfig,
    stats: Arc<RwLock<AdvancerStats>>,
}

/// Handle to a running advancement loop.
pub struct AdvancerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<RwLock<AdvancerStats>>,
}

impl AdvancerHandle {
    /// Snapshot of the loop's counters.
    #[must_use]
    pub fn stats(&self) -> AdvancerStats {
        self.stats.read().clone()
    }

    /// Signal stop and wait for the loop to wind down. Honored within one
    /// tick boundary; an outstanding advancement gets the configured grace
    /// period before being abandoned.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

impl<C: ChainClient + 'static> WatermarkAdvancer<C> {
    /// Start the loop on the shared chain connection.
    pub fn spawn(client: Arc<C>, config: WatcherConfig) -> AdvancerHandle {
        let stats = Arc::new(RwLock::new(AdvancerStats::default()));
        let (stop_tx, stop_rx) = watch::channel(false);
        let advancer = Self {
            client,
            config,
            stats: stats.clone(),
        };
        let task = tokio::spawn(advancer.run(stop_rx));
        AdvancerHandle {
            stop: stop_tx,
            task,
            stats,
        }
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Loop-owned state: the single-flight guard and the cooldown are
        // not shared with anything outside this task.
        let mut pending: Option<JoinHandle<bool>> = None;
        let mut cooldown_until: Option<Instant> = None;

        info!(
            interval_secs = self.config.poll_interval_secs,
            dry_run = self.config.dry_run,
            "watermark advancement loop started"
        );
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    self.tick(&mut pending, &mut cooldown_until).await;
                }
            }
        }

        if let Some(mut attempt) = pending.take() {
            match timeout(self.config.stop_grace(), &mut attempt).await {
                Ok(_) => debug!("outstanding advancement completed before shutdown"),
                Err(_) => {
                    warn!("grace period elapsed, abandoning outstanding advancement");
                    attempt.abort();
                }
            }
        }
        info!("watermark advancement loop stopped");
    }

    async fn tick(
        &self,
        pending: &mut Option<JoinHandle<bool>>,
        cooldown_until: &mut Option<Instant>,
    ) {
        self.stats.write().ticks += 1;

        // Single-flight guard: harvest a finished attempt, or skip the
        // tick entirely while one is still outstanding.
        if let Some(attempt) = pending.take() {
            if attempt.is_finished() {
                let succeeded = matches!(attempt.await, Ok(true));
                if !succeeded {
                    *cooldown_until = Some(Instant::now() + self.config.failure_cooldown());
                    debug!(
                        cooldown_secs = self.config.failure_cooldown_secs,
                        "advancement failed, cooling down"
                    );
                }
            } else {
                *pending = Some(attempt);
                self.stats.write().skipped_in_flight += 1;
                trace!("advancement still in flight, tick performs no work");
                return;
            }
        }

        if let Some(until) = *cooldown_until {
            if Instant::now() < until {
                self.stats.write().skipped_cooldown += 1;
                trace!("inside failure cooldown, tick performs no work");
                return;
            }
            *cooldown_until = None;
        }

        let (height, watermark) = tokio::join!(
            self.client.finalized_height(),
            current_watermark(self.client.as_ref()),
        );
        let (height, watermark) = match (height, watermark) {
            (Ok(height), Ok(watermark)) => (height, watermark),
            (Err(error), _) => {
                warn!(%error, "finalized height read failed, cooling down");
                *cooldown_until = Some(Instant::now() + self.config.failure_cooldown());
                return;
            }
            (_, Err(error)) => {
                warn!(%error, "watermark read failed, cooling down");
                *cooldown_until = Some(Instant::now() + self.config.failure_cooldown());
                return;
            }
        };

        if height <= watermark.0 {
            self.stats.write().noop_ticks += 1;
            trace!(height, %watermark, "watermark caught up, nothing to record");
            return;
        }

        if self.config.dry_run {
            info!(
                height,
                %watermark,
                pallet = %self.config.pallet,
                "dry-run: would record verified height"
            );
            self.stats.write().dry_runs += 1;
            return;
        }

        debug!(height, %watermark, "watermark lagging, submitting advancement");
        let client = self.client.clone();
        let stats = self.stats.clone();
        let pallet = self.config.pallet.clone();
        *pending = Some(tokio::spawn(advance_once(client, stats, pallet)));
    }
}

/// Submit one advancement and await its finalization. Returns whether the
/// call dispatched successfully.
async fn advance_once<C: ChainClient>(
    client: Arc<C>,
    stats: Arc<RwLock<AdvancerStats>>,
    pallet: String,
) -> bool {
    // Re-read the height at submission time: it may have moved past the
    // lag the tick observed, and one call covering the latest height
    // beats one call per intermediate value.
    let target = match client.finalized_height().await {
        Ok(height) => height,
        Err(error) => {
            warn!(%error, "height re-read failed, abandoning advancement");
            return false;
        }
    };

    let id = Uuid::new_v4();
    {
        let mut stats = stats.write();
        stats.attempts += 1;
        stats.last_attempt = Some(AdvancementAttempt {
            id,
            target,
            outcome: AttemptOutcome::InFlight,
        });
    }
    info!(%id, target, pallet = %pallet, "recording verified height");

    let call = PrivilegedCall::record_verified_height(pallet, target);
    let mut statuses = match client.submit_privileged(call).await {
        Ok(statuses) => statuses,
        Err(error) => {
            warn!(%id, %error, "advancement submission failed");
            finish(&stats, id, AttemptOutcome::Failed);
            return false;
        }
    };

    loop {
        match statuses.next().await {
            Some(TxStatus::Finalized { outcome, .. }) => match outcome {
                DispatchOutcome::Success => {
                    info!(%id, target, "watermark advancement finalized");
                    finish(&stats, id, AttemptOutcome::Succeeded);
                    return true;
                }
                DispatchOutcome::Failed(error) => {
                    warn!(%id, %error, docs = %error.description(), "advancement dispatch failed");
                    finish(&stats, id, AttemptOutcome::Failed);
                    return false;
                }
            },
            Some(status) => trace!(%id, ?status, "advancement progressing"),
            None => {
                warn!(%id, "advancement status stream ended before finalization");
                finish(&stats, id, AttemptOutcome::Failed);
                return false;
            }
        }
    }
}

fn finish(stats: &Arc<RwLock<AdvancerStats>>, id: Uuid, outcome: AttemptOutcome) {
    let mut stats = stats.write();
    match outcome {
        AttemptOutcome::Succeeded => stats.succeeded += 1,
        AttemptOutcome::Failed => stats.failed += 1,
        AttemptOutcome::InFlight => {}
    }
    if let Some(last) = stats.last_attempt.as_mut() {
        if last.id == id {
            last.outcome = outcome;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_client::{DispatchError, MockChainClient};
    use std::time::Duration;

    fn config() -> WatcherConfig {
        WatcherConfig {
            poll_interval_secs: 1,
            failure_cooldown_secs: 10,
            stop_grace_secs: 1,
            ..WatcherConfig::for_testing()
        }
    }

    async fn settle(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    /// Spin until the predicate holds, bounded by paused-clock time.
    async fn eventually<P: Fn() -> bool>(predicate: P) {
        tokio::time::timeout(Duration::from_secs(60), async {
            while !predicate() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(start_paused = true)]
    async fn tick_is_a_noop_when_watermark_matches_height() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(10);
        mock.set_watermark(10);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        settle(5).await;

        assert!(mock.privileged_calls().is_empty());
        let stats = handle.stats();
        assert!(stats.ticks >= 2);
        assert_eq!(stats.noop_ticks, stats.ticks);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_never_submits_regardless_of_lag() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(20);
        mock.set_watermark(10);
        let config = WatcherConfig {
            dry_run: true,
            ..config()
        };

        let handle = WatermarkAdvancer::spawn(mock.clone(), config);
        settle(5).await;

        assert!(mock.privileged_calls().is_empty());
        assert!(handle.stats().dry_runs >= 2);
        // The watermark was left untouched.
        assert_eq!(
            crate::waiter::current_watermark(mock.as_ref()).await.unwrap().0,
            10
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_advancement_outstanding_across_ticks() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(20);
        mock.set_watermark(10);
        mock.set_hold_privileged(true);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        eventually(|| mock.pending_privileged() == 1).await;

        // Many ticks elapse while the call is outstanding; none submits.
        settle(6).await;
        assert_eq!(mock.privileged_calls().len(), 1);
        assert!(handle.stats().skipped_in_flight >= 3);

        // Once the call finalizes the watermark is caught up; no new call.
        mock.release_privileged(DispatchOutcome::Success);
        settle(4).await;
        assert_eq!(mock.privileged_calls().len(), 1);
        assert_eq!(handle.stats().succeeded, 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn climbing_height_produces_one_call_at_the_stabilized_value() {
        // Height samples 10, 10, 11, 12 observed while the watermark sits
        // at 10: the first two ticks are no-ops, the third detects lag,
        // and the single in-flight attempt targets the stabilized height
        // 12 rather than issuing one call per intermediate value.
        let mock = Arc::new(MockChainClient::new());
        mock.script_finalized([10, 10, 11, 12]);
        mock.set_watermark(10);
        mock.set_hold_privileged(true);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        eventually(|| mock.pending_privileged() == 1).await;
        settle(4).await;

        mock.release_privileged(DispatchOutcome::Success);
        settle(4).await;

        let calls = mock.privileged_calls();
        assert_eq!(calls.len(), 1, "one advancement, not one per sample");
        assert_eq!(calls[0].target, 12);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_advancement_cools_down_then_retries() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(20);
        mock.set_watermark(10);
        mock.set_hold_privileged(true);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        eventually(|| mock.pending_privileged() == 1).await;

        mock.release_privileged(DispatchOutcome::Failed(DispatchError::new(
            "secureFinality",
            "BadOrigin",
        )));

        // Inside the cooldown no new call goes out.
        settle(5).await;
        assert_eq!(mock.privileged_calls().len(), 1);
        assert!(handle.stats().failed >= 1);

        // After the cooldown the loop resumes and retries.
        eventually(|| mock.privileged_calls().len() == 2).await;
        assert_eq!(mock.privileged_calls()[1].target, 20);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_cool_down_without_killing_the_loop() {
        let mock = Arc::new(MockChainClient::new());
        mock.fail_finalized_height(true);
        mock.set_watermark(10);
        let config = WatcherConfig {
            failure_cooldown_secs: 3,
            ..config()
        };

        let handle = WatermarkAdvancer::spawn(mock.clone(), config);
        settle(2).await;
        assert!(mock.privileged_calls().is_empty());

        // Transport recovers; the loop picks the lag up by itself.
        mock.fail_finalized_height(false);
        mock.set_finalized(20);
        eventually(|| mock.privileged_calls().len() == 1).await;
        assert_eq!(mock.privileged_calls()[0].target, 20);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_an_outstanding_attempt_after_grace() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(20);
        mock.set_watermark(10);
        mock.set_hold_privileged(true);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        eventually(|| mock.pending_privileged() == 1).await;

        // Never released: shutdown must still return once the grace
        // period elapses.
        tokio::time::timeout(Duration::from_secs(30), handle.shutdown())
            .await
            .expect("shutdown did not complete within grace");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_is_honored_while_idle() {
        let mock = Arc::new(MockChainClient::new());
        mock.set_finalized(10);
        mock.set_watermark(10);

        let handle = WatermarkAdvancer::spawn(mock.clone(), config());
        settle(2).await;
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("idle shutdown must be prompt");
    }
}
