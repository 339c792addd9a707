use std::sync::Arc;

use printquota_core::LedgerResult;
use printquota_infra::{open_store, AppConfig};
use printquota_ledger::{Ledger, LedgerStore};

pub type SharedLedger = Ledger<Arc<dyn LedgerStore>>;

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub ledger: SharedLedger,
}

impl AppServices {
    pub fn new(ledger: SharedLedger) -> Self {
        Self { ledger }
    }
}

pub async fn build_services(config: &AppConfig) -> LedgerResult<AppServices> {
    let store = open_store(&config.database).await?;
    tracing::info!(
        opening_balance = config.policy.opening_balance,
        auto_create_accounts = config.policy.auto_create_accounts,
        "ledger ready"
    );
    Ok(AppServices::new(Ledger::new(store, config.policy)))
}
