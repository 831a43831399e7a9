use strum::{Display, IntoStaticStr};
use tracing::debug;

/// Steps of the forward patch transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum TransactionState {
    #[strum(serialize = "idle")]
    Idle,
    #[strum(serialize = "located")]
    Located,
    #[strum(serialize = "preflighted")]
    Preflighted,
    #[strum(serialize = "hash read")]
    HashRead,
    #[strum(serialize = "hash verified")]
    HashVerified,
    #[strum(serialize = "backed up")]
    BackedUp,
    #[strum(serialize = "extracted")]
    Extracted,
    #[strum(serialize = "injected")]
    Injected,
    #[strum(serialize = "repacked")]
    Repacked,
    #[strum(serialize = "executable hash patched")]
    RehashedHashPatched,
    #[strum(serialize = "marked")]
    Marked,
    #[strum(serialize = "done")]
    Done,
    #[strum(serialize = "rolled back")]
    RolledBack,
}

/// Tracks and logs the current step.
#[derive(Debug)]
pub(crate) struct Transaction {
    state: TransactionState,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            state: TransactionState::Idle,
        }
    }

    pub fn advance(&mut self, next: TransactionState) {
        debug!("Transaction: {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }
}
