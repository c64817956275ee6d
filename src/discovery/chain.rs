//! Chain scan: owned agents read straight from the ledger.
//!
//! Lists token accounts under both token programs at once, keeps the ones
//! with a positive balance, and resolves metadata for at most `mint_cap`
//! unique mints through a bounded fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::identity::AgentCard;
use crate::identity::wallet::{Pubkey, TOKEN_2022_PROGRAM, TOKEN_PROGRAM};
use crate::ledger::{LedgerClient, MetadataResolver, RpcError, TokenAccount};

/// Unique mints resolved per scan unless configured otherwise.
pub const DEFAULT_MINT_CAP: usize = 120;

/// Metadata lookups in flight at once unless configured otherwise.
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 8;

/// Mints held by an owner across both token programs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldMints {
    /// Unique mints, legacy program first, in first-seen order.
    pub mints: Vec<String>,
    /// Positive-balance accounts under the legacy token program.
    pub legacy: usize,
    /// Positive-balance accounts under Token-2022.
    pub token_2022: usize,
}

/// Result of a chain scan.
#[derive(Debug, Clone, Default)]
pub struct ChainScan {
    pub cards: Vec<AgentCard>,
    pub legacy: usize,
    pub token_2022: usize,
    /// Unique mints past the cap that were never resolved.
    pub truncated: usize,
}

pub struct ChainScanner {
    ledger: Arc<dyn LedgerClient>,
    resolver: Arc<dyn MetadataResolver>,
    mint_cap: usize,
    concurrency: usize,
}

fn held_mints(accounts: Vec<TokenAccount>) -> Vec<String> {
    accounts
        .into_iter()
        .filter(TokenAccount::is_held)
        .filter_map(|a| a.mint)
        .collect()
}

impl ChainScanner {
    pub fn new(ledger: Arc<dyn LedgerClient>, resolver: Arc<dyn MetadataResolver>) -> Self {
        Self {
            ledger,
            resolver,
            mint_cap: DEFAULT_MINT_CAP,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }

    pub fn with_mint_cap(mut self, cap: usize) -> Self {
        self.mint_cap = cap;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &Arc<dyn MetadataResolver> {
        &self.resolver
    }

    /// List both token programs concurrently and union the held mints.
    ///
    /// Either listing failing fails the whole call.
    pub async fn held_mints(&self, owner: &Pubkey) -> Result<HeldMints, RpcError> {
        let (legacy, token_2022) = tokio::try_join!(
            self.ledger.token_accounts_by_owner(owner, &TOKEN_PROGRAM),
            self.ledger.token_accounts_by_owner(owner, &TOKEN_2022_PROGRAM),
        )?;
        let legacy = held_mints(legacy);
        let token_2022 = held_mints(token_2022);

        let mut seen = HashSet::new();
        let mints = legacy
            .iter()
            .chain(token_2022.iter())
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect();

        Ok(HeldMints {
            mints,
            legacy: legacy.len(),
            token_2022: token_2022.len(),
        })
    }

    /// Resolve one mint, degrading to a bare card on any failure.
    async fn resolve_card(&self, mint: String) -> AgentCard {
        match self.resolver.resolve(&mint).await {
            Ok(meta) => meta.to_card(),
            Err(e) => {
                debug!(mint = %mint, error = %e, "metadata unresolvable, using bare card");
                AgentCard::bare(mint)
            }
        }
    }

    pub async fn scan(&self, owner: &Pubkey) -> Result<ChainScan, RpcError> {
        let held = self.held_mints(owner).await?;
        info!(
            owner = %owner,
            legacy = held.legacy,
            token_2022 = held.token_2022,
            unique = held.mints.len(),
            "token accounts listed"
        );

        let mut mints = held.mints;
        let truncated = mints.len().saturating_sub(self.mint_cap);
        if truncated > 0 {
            warn!(
                owner = %owner,
                cap = self.mint_cap,
                truncated,
                "wallet holds more mints than the resolution cap; extra mints skipped"
            );
            mints.truncate(self.mint_cap);
        }

        let cards: Vec<AgentCard> = stream::iter(mints)
            .map(|mint| self.resolve_card(mint))
            .buffered(self.concurrency)
            .collect()
            .await;

        Ok(ChainScan {
            cards,
            legacy: held.legacy,
            token_2022: held.token_2022,
            truncated,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::ledger::metadata::{MetadataAccount, MetadataError, ResolvedMetadata};

    /// Ledger with fixed token accounts per program.
    #[derive(Default)]
    pub(crate) struct FakeLedger {
        pub accounts: HashMap<Pubkey, Vec<TokenAccount>>,
        pub fail_program: Option<Pubkey>,
    }

    fn to_accounts(list: Vec<(&str, u128)>) -> Vec<TokenAccount> {
        list.into_iter()
            .map(|(mint, amount)| TokenAccount {
                mint: Some(mint.to_string()),
                amount,
            })
            .collect()
    }

    impl FakeLedger {
        pub(crate) fn with(legacy: Vec<(&str, u128)>, token_2022: Vec<(&str, u128)>) -> Self {
            let mut accounts = HashMap::new();
            accounts.insert(*TOKEN_PROGRAM, to_accounts(legacy));
            accounts.insert(*TOKEN_2022_PROGRAM, to_accounts(token_2022));
            Self {
                accounts,
                fail_program: None,
            }
        }
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn token_accounts_by_owner(
            &self,
            _owner: &Pubkey,
            program_id: &Pubkey,
        ) -> Result<Vec<TokenAccount>, RpcError> {
            if self.fail_program.as_ref() == Some(program_id) {
                return Err(RpcError::Status(503));
            }
            Ok(self.accounts.get(program_id).cloned().unwrap_or_default())
        }

        async fn account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError> {
            Ok(None)
        }
    }

    /// Resolver that names each mint `Agent <mint>` and records calls.
    #[derive(Default)]
    pub(crate) struct FakeResolver {
        pub failing: HashSet<String>,
        pub calls: Mutex<Vec<String>>,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl FakeResolver {
        pub(crate) fn resolved(&self) -> BTreeSet<String> {
            self.calls.lock().unwrap().iter().cloned().collect()
        }
    }

    #[async_trait]
    impl MetadataResolver for FakeResolver {
        async fn resolve(&self, mint: &str) -> Result<ResolvedMetadata, MetadataError> {
            self.calls.lock().unwrap().push(mint.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(mint) {
                return Err(MetadataError::MissingUri);
            }
            Ok(ResolvedMetadata {
                mint: mint.to_string(),
                account: MetadataAccount {
                    update_authority: Pubkey::new([0; 32]),
                    mint: Pubkey::new([0; 32]),
                    name: String::new(),
                    symbol: String::new(),
                    uri: "https://example/meta.json".to_string(),
                },
                json: json!({
                    "name": format!("Agent {mint}"),
                    "image": format!("https://img/{mint}.png"),
                    "x402_agent": {"model": "m"}
                }),
            })
        }
    }

    pub(crate) fn owner() -> Pubkey {
        Pubkey::new([7; 32])
    }

    fn scanner(ledger: FakeLedger, resolver: Arc<FakeResolver>) -> ChainScanner {
        ChainScanner::new(Arc::new(ledger), resolver)
    }

    #[tokio::test]
    async fn unions_positive_balances_across_programs() {
        let ledger = FakeLedger::with(vec![("A", 1), ("B", 1), ("C", 0)], vec![("B", 1), ("D", 5)]);
        let resolver = Arc::new(FakeResolver::default());
        let scan = scanner(ledger, resolver.clone()).scan(&owner()).await.unwrap();

        let expected: BTreeSet<String> = ["A", "B", "D"].iter().map(|s| s.to_string()).collect();
        assert_eq!(resolver.resolved(), expected);
        assert_eq!(resolver.calls.lock().unwrap().len(), 3);
        assert_eq!(scan.cards.len(), 3);
        assert_eq!(scan.legacy, 2);
        assert_eq!(scan.token_2022, 2);
        assert_eq!(scan.truncated, 0);
    }

    #[tokio::test]
    async fn caps_resolution_at_120_mints() {
        let names: Vec<String> = (0..150).map(|i| format!("M{i:03}")).collect();
        let legacy = names.iter().map(|n| (n.as_str(), 1)).collect();
        let ledger = FakeLedger::with(legacy, vec![]);
        let resolver = Arc::new(FakeResolver::default());
        let scan = scanner(ledger, resolver.clone()).scan(&owner()).await.unwrap();

        let calls = resolver.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 120);
        assert!(!calls.iter().any(|m| m.as_str() >= "M120"));
        assert_eq!(scan.cards.len(), 120);
        assert_eq!(scan.truncated, 30);
        assert_eq!(scan.legacy, 150);
    }

    #[tokio::test]
    async fn one_failed_lookup_yields_one_bare_card() {
        let ledger = FakeLedger::with(
            vec![("A", 1), ("B", 1), ("C", 1), ("D", 1), ("E", 1)],
            vec![],
        );
        let resolver = Arc::new(FakeResolver {
            failing: ["C".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let scan = scanner(ledger, resolver).scan(&owner()).await.unwrap();

        assert_eq!(scan.cards.len(), 5);
        let bare: Vec<&AgentCard> = scan.cards.iter().filter(|c| c.name == c.mint).collect();
        assert_eq!(bare.len(), 1);
        assert_eq!(bare[0], &AgentCard::bare("C"));
        // order follows the held-mint order
        let mints: Vec<&str> = scan.cards.iter().map(|c| c.mint.as_str()).collect();
        assert_eq!(mints, ["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn fan_out_is_bounded() {
        let names: Vec<String> = (0..40).map(|i| format!("M{i}")).collect();
        let ledger = FakeLedger::with(names.iter().map(|n| (n.as_str(), 1)).collect(), vec![]);
        let resolver = Arc::new(FakeResolver::default());
        scanner(ledger, resolver.clone())
            .with_concurrency(4)
            .scan(&owner())
            .await
            .unwrap();

        assert!(resolver.max_in_flight.load(Ordering::SeqCst) <= 4);
        assert_eq!(resolver.calls.lock().unwrap().len(), 40);
    }

    #[tokio::test]
    async fn failing_program_listing_aborts_scan() {
        let mut ledger = FakeLedger::with(vec![("A", 1)], vec![("B", 1)]);
        ledger.fail_program = Some(*TOKEN_2022_PROGRAM);
        let resolver = Arc::new(FakeResolver::default());
        let result = scanner(ledger, resolver.clone()).scan(&owner()).await;

        assert!(matches!(result, Err(RpcError::Status(503))));
        assert!(resolver.calls.lock().unwrap().is_empty());
    }
}
