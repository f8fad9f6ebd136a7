//! The logged-in wallet and its background balance refresh.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use ww_assets::{BalanceCache, BalanceRefreshScheduler, SchedulerConfig};
use ww_core::error::ChainError;
use ww_core::traits::{IdentityProvider, Signer};
use ww_core::Address;

/// How the user's wallet signs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    /// Held by the identity provider.
    #[default]
    Embedded,
    /// Unlocked on the RPC node.
    External,
}

/// Builds the signer for a wallet once, at login.
pub type SignerFactory =
    Arc<dyn Fn(WalletKind, Address) -> Result<Arc<dyn Signer>, ChainError> + Send + Sync>;

struct ActiveSession {
    signer: Arc<dyn Signer>,
    scheduler: Arc<BalanceRefreshScheduler>,
}

/// In-process identity provider. Owns the refresh task of the active wallet;
/// replacing or ending the session drops it.
pub struct Session {
    cache: Arc<BalanceCache>,
    scheduler_config: SchedulerConfig,
    active: Mutex<Option<ActiveSession>>,
}

impl Session {
    pub fn new(cache: Arc<BalanceCache>, scheduler_config: SchedulerConfig) -> Self {
        Self {
            cache,
            scheduler_config,
            active: Mutex::new(None),
        }
    }

    /// Refresh task of the active wallet.
    pub fn scheduler(&self) -> Option<Arc<BalanceRefreshScheduler>> {
        self.active.lock().as_ref().map(|a| a.scheduler.clone())
    }
}

impl IdentityProvider for Session {
    fn login(&self, signer: Arc<dyn Signer>) -> Address {
        let address = signer.address();
        let scheduler = BalanceRefreshScheduler::spawn(
            self.cache.clone(),
            self.scheduler_config.clone(),
            Some(address),
        );
        let previous = self.active.lock().replace(ActiveSession {
            signer: signer.clone(),
            scheduler: Arc::new(scheduler),
        });
        if let Some(previous) = previous {
            info!(wallet = %previous.signer.address(), "session replaced");
        }
        info!(wallet = %address, signer = signer.kind(), "logged in");
        address
    }

    fn current_address(&self) -> Option<Address> {
        self.active.lock().as_ref().map(|a| a.signer.address())
    }

    fn active_signer(&self) -> Option<Arc<dyn Signer>> {
        self.active.lock().as_ref().map(|a| a.signer.clone())
    }

    fn logout(&self) {
        if let Some(previous) = self.active.lock().take() {
            info!(wallet = %previous.signer.address(), "logged out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ww_assets::BalanceCacheConfig;
    use ww_core::ManualClock;
    use ww_tests::helpers::{addr, FakeChain, FakeSigner};

    fn session(chain: Arc<FakeChain>) -> Session {
        let config = BalanceCacheConfig {
            ttl: chrono::Duration::zero(),
            ..BalanceCacheConfig::default()
        };
        let cache = Arc::new(BalanceCache::new(config, chain, Arc::new(ManualClock::at_epoch())));
        Session::new(cache, SchedulerConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn login_then_logout() {
        let session = session(Arc::new(FakeChain::new()));
        assert!(session.current_address().is_none());

        let address = session.login(Arc::new(FakeSigner::new(addr(3))));
        assert_eq!(address, addr(3));
        assert_eq!(session.current_address(), Some(addr(3)));
        assert_eq!(session.active_signer().map(|s| s.address()), Some(addr(3)));

        session.logout();
        assert!(session.current_address().is_none());
        assert!(session.scheduler().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_refresh() {
        let chain = Arc::new(FakeChain::new());
        let session = session(chain.clone());
        session.login(Arc::new(FakeSigner::new(addr(3))));

        let mut updates = session.scheduler().unwrap().subscribe();
        updates.changed().await.unwrap();
        session.logout();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(chain.native_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn relogin_switches_wallet() {
        let session = session(Arc::new(FakeChain::new()));
        session.login(Arc::new(FakeSigner::new(addr(3))));
        session.login(Arc::new(FakeSigner::new(addr(4))));

        let scheduler = session.scheduler().unwrap();
        let mut updates = scheduler.subscribe();
        updates.changed().await.unwrap();
        assert_eq!(scheduler.latest().unwrap().snapshot.wallet, addr(4));
    }
}
