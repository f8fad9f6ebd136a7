//! Background balance refresh for the active wallet.
//!
//! The task ticks every `interval` while a wallet is active, refreshes
//! immediately when the wallet changes, and forces a refresh on request.
//! Results are published on a watch channel. The task belongs to the
//! [`BalanceRefreshScheduler`] handle and is aborted when the handle drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use ww_core::constants::BALANCE_REFRESH_INTERVAL_SECS;
use ww_core::Address;

use crate::balance_cache::{BalanceCache, BalanceFetch};

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(BALANCE_REFRESH_INTERVAL_SECS),
        }
    }
}

enum Command {
    SetWallet(Option<Address>),
    Refresh(oneshot::Sender<Option<BalanceFetch>>),
}

pub struct BalanceRefreshScheduler {
    commands: mpsc::Sender<Command>,
    latest: watch::Receiver<Option<BalanceFetch>>,
    task: JoinHandle<()>,
}

impl BalanceRefreshScheduler {
    /// Spawn the refresh task, refreshing `initial` right away. With `None`
    /// it stays idle until a wallet is set.
    pub fn spawn(cache: Arc<BalanceCache>, config: SchedulerConfig, initial: Option<Address>) -> Self {
        let (commands, rx) = mpsc::channel(16);
        let (tx, latest) = watch::channel(None);
        let task = tokio::spawn(run(cache, config, initial, rx, tx));
        Self {
            commands,
            latest,
            task,
        }
    }

    /// Switch the active wallet, or go idle with `None`.
    pub async fn set_wallet(&self, wallet: Option<Address>) {
        if self.commands.send(Command::SetWallet(wallet)).await.is_err() {
            debug!("balance scheduler already stopped");
        }
    }

    /// Force a refresh of the active wallet and wait for its result.
    /// `None` when no wallet is active.
    pub async fn refresh_now(&self) -> Option<BalanceFetch> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(Command::Refresh(reply)).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Most recent fetch published by the task.
    pub fn latest(&self) -> Option<BalanceFetch> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<BalanceFetch>> {
        self.latest.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.task.abort();
        let _ = (&mut self.task).await;
    }
}

impl Drop for BalanceRefreshScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    cache: Arc<BalanceCache>,
    config: SchedulerConfig,
    initial: Option<Address>,
    mut commands: mpsc::Receiver<Command>,
    publish: watch::Sender<Option<BalanceFetch>>,
) {
    let mut wallet = initial;
    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if let Some(active) = wallet {
        info!(wallet = %active, "balance refresh started");
        publish.send_replace(Some(cache.get(active, false).await));
        ticker.reset();
    }

    loop {
        tokio::select! {
            _ = ticker.tick(), if wallet.is_some() => {
                if let Some(active) = wallet {
                    let fetch = cache.get(active, false).await;
                    publish.send_replace(Some(fetch));
                }
            }
            command = commands.recv() => match command {
                None => break,
                Some(Command::SetWallet(next)) => {
                    if next == wallet {
                        continue;
                    }
                    wallet = next;
                    match wallet {
                        Some(active) => {
                            info!(wallet = %active, "balance refresh started");
                            let fetch = cache.get(active, false).await;
                            publish.send_replace(Some(fetch));
                            ticker.reset();
                        }
                        None => {
                            info!("balance refresh idle");
                            publish.send_replace(None);
                        }
                    }
                }
                Some(Command::Refresh(reply)) => {
                    let fetch = match wallet {
                        Some(active) => Some(cache.get(active, true).await),
                        None => None,
                    };
                    if fetch.is_some() {
                        publish.send_replace(fetch.clone());
                    }
                    let _ = reply.send(fetch);
                }
            },
        }
    }
    debug!("balance scheduler stopped");
}
