//! Reconstruction of the accounts holding a role from its grant and revoke
//! history.

pub mod cancellation;
pub mod pacing;
pub mod scanner;

use {
    self::{
        cancellation::CancellationHandle,
        scanner::{AbortReason, ScanConfig, scan},
    },
    crate::traits::LogQuerying,
    alloy::primitives::{Address, B256, keccak256},
    ethrpc::BlockRange,
    std::{
        collections::BTreeSet,
        sync::{Arc, LazyLock},
    },
};

/// The role that may change registry entries and mint test tokens.
pub static ADMIN_ROLE: LazyLock<B256> = LazyLock::new(|| keccak256("ADMIN_ROLE"));

pub type AdminSet = BTreeSet<Address>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Granted,
    Revoked,
}

/// A decoded `RoleGranted` or `RoleRevoked` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEvent {
    pub change: RoleChange,
    pub role: B256,
    pub account: Address,
    pub block_number: u64,
    pub log_index: u64,
}

/// Replays the events for `role` in chain order. Events for other roles are
/// ignored and the input order does not matter.
pub fn reconstruct_admin_set<'a>(
    role: B256,
    events: impl IntoIterator<Item = &'a RoleEvent>,
) -> AdminSet {
    let mut events: Vec<_> = events.into_iter().filter(|e| e.role == role).collect();
    events.sort_by_key(|e| (e.block_number, e.log_index));
    events.into_iter().fold(AdminSet::new(), |mut admins, event| {
        match event.change {
            RoleChange::Granted => admins.insert(event.account),
            RoleChange::Revoked => admins.remove(&event.account),
        };
        admins
    })
}

/// Outcome of reconstructing an admin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminScan {
    /// Every block of the window was scanned except for `skipped_blocks`.
    Complete {
        range: BlockRange,
        admins: AdminSet,
        skipped_blocks: Vec<u64>,
    },
    /// The scan stopped early. `admins` only reflects the blocks scanned
    /// before it stopped.
    Partial {
        range: BlockRange,
        admins: AdminSet,
        reason: AbortReason,
        skipped_blocks: Vec<u64>,
    },
    /// Nothing could be fetched; the admin set is unknown, which is not the
    /// same as empty.
    Undetermined { reason: String },
}

impl AdminScan {
    pub fn admins(&self) -> Option<&AdminSet> {
        match self {
            AdminScan::Complete { admins, .. } | AdminScan::Partial { admins, .. } => Some(admins),
            AdminScan::Undetermined { .. } => None,
        }
    }

    /// Whether the set covers the whole window without gaps.
    pub fn is_exhaustive(&self) -> bool {
        matches!(self, AdminScan::Complete { skipped_blocks, .. } if skipped_blocks.is_empty())
    }
}

/// Rebuilds admin sets from the recent event history of a contract.
pub struct AdminSetReconstructor {
    logs: Arc<dyn LogQuerying>,
    config: ScanConfig,
}

impl AdminSetReconstructor {
    pub fn new(logs: Arc<dyn LogQuerying>, config: ScanConfig) -> Self {
        Self { logs, config }
    }

    /// Scans the last `config.window` blocks of `contract` for changes of
    /// `role` and replays them.
    pub async fn reconstruct(
        &self,
        contract: Address,
        role: B256,
        cancel: &CancellationHandle,
    ) -> AdminScan {
        let head = match self.logs.block_number().await {
            Ok(head) => head,
            Err(err) => {
                tracing::warn!(?err, "failed to fetch current block");
                return AdminScan::Undetermined {
                    reason: format!("failed to fetch current block: {err:#}"),
                };
            }
        };
        let range = BlockRange::recent(head, self.config.window.max(1));
        tracing::info!(%contract, %range, "reconstructing admin set");

        let report = scan(
            self.logs.as_ref(),
            contract,
            role,
            range,
            &self.config,
            cancel,
        )
        .await;
        if report.budget.succeeded == 0 {
            // Nothing was read, skipped blocks included.
            let reason = match report.aborted {
                Some(reason) => reason.to_string(),
                None => format!("all {} requests failed", report.budget.requests),
            };
            tracing::warn!(%range, %reason, "admin set could not be determined");
            return AdminScan::Undetermined { reason };
        }
        let admins = reconstruct_admin_set(role, &report.events);

        match report.aborted {
            Some(reason) => AdminScan::Partial {
                range,
                admins,
                reason,
                skipped_blocks: report.skipped_blocks,
            },
            None => {
                tracing::info!(
                    admins = admins.len(),
                    requests = report.budget.requests,
                    "admin set reconstructed"
                );
                AdminScan::Complete {
                    range,
                    admins,
                    skipped_blocks: report.skipped_blocks,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            admins::pacing::Backoff,
            traits::MockLogQuerying,
        },
        anyhow::anyhow,
        maplit::btreeset,
        std::time::Duration,
    };

    const A: Address = Address::with_last_byte(0xa);
    const B: Address = Address::with_last_byte(0xb);

    fn event(
        change: RoleChange,
        account: Address,
        block_number: u64,
        log_index: u64,
    ) -> RoleEvent {
        RoleEvent {
            change,
            role: *ADMIN_ROLE,
            account,
            block_number,
            log_index,
        }
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            request_interval: Duration::ZERO,
            backoff: Backoff {
                initial: Duration::ZERO,
                max: Duration::ZERO,
            },
            ..Default::default()
        }
    }

    #[test]
    fn admin_role_hash() {
        assert_eq!(
            *ADMIN_ROLE,
            "0xa49807205ce4d355092ef5a8a18f56e8913cf4a201fbe287825b095693c21775"
                .parse::<B256>()
                .unwrap()
        );
    }

    #[test]
    fn replays_grants_and_revokes() {
        let events = [
            event(RoleChange::Granted, A, 10, 0),
            event(RoleChange::Granted, B, 12, 0),
            event(RoleChange::Revoked, A, 15, 0),
        ];
        assert_eq!(reconstruct_admin_set(*ADMIN_ROLE, &events), btreeset! {B});
    }

    #[test]
    fn order_of_input_does_not_matter() {
        let events = [
            event(RoleChange::Revoked, A, 15, 0),
            event(RoleChange::Granted, A, 10, 0),
            event(RoleChange::Granted, B, 12, 0),
        ];
        assert_eq!(reconstruct_admin_set(*ADMIN_ROLE, &events), btreeset! {B});
    }

    #[test]
    fn same_block_events_apply_in_log_order() {
        let events = [
            event(RoleChange::Granted, A, 20, 3),
            event(RoleChange::Revoked, A, 20, 1),
        ];
        assert_eq!(reconstruct_admin_set(*ADMIN_ROLE, &events), btreeset! {A});

        let events = [
            event(RoleChange::Revoked, A, 20, 3),
            event(RoleChange::Granted, A, 20, 1),
        ];
        assert!(reconstruct_admin_set(*ADMIN_ROLE, &events).is_empty());
    }

    #[test]
    fn repeated_grants_and_revokes_are_idempotent() {
        let events = [
            event(RoleChange::Granted, A, 1, 0),
            event(RoleChange::Granted, A, 2, 0),
            event(RoleChange::Revoked, B, 3, 0),
        ];
        assert_eq!(reconstruct_admin_set(*ADMIN_ROLE, &events), btreeset! {A});
    }

    #[test]
    fn replaying_the_same_log_twice_gives_the_same_set() {
        let events = [
            event(RoleChange::Granted, A, 10, 0),
            event(RoleChange::Granted, B, 12, 0),
            event(RoleChange::Revoked, A, 15, 0),
            event(RoleChange::Granted, A, 15, 1),
        ];
        let first = reconstruct_admin_set(*ADMIN_ROLE, &events);
        let second = reconstruct_admin_set(*ADMIN_ROLE, &events);
        assert_eq!(first, second);
        assert_eq!(first, btreeset! {A, B});
    }

    #[test]
    fn other_roles_are_ignored() {
        let mut minter = event(RoleChange::Granted, B, 1, 0);
        minter.role = keccak256("MINTER_ROLE");
        let events = [event(RoleChange::Granted, A, 1, 1), minter];
        assert_eq!(reconstruct_admin_set(*ADMIN_ROLE, &events), btreeset! {A});
    }

    #[tokio::test]
    async fn complete_scan_of_recent_window() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number().returning(|| Ok(100_000));
        logs.expect_role_events()
            .times(25)
            .returning(|_, _, range| {
                Ok(match range.start() {
                    50_001 => vec![event(RoleChange::Granted, A, 50_010, 0)],
                    98_001 => vec![event(RoleChange::Granted, B, 99_000, 0)],
                    _ => vec![],
                })
            });
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), fast_config());

        let scan = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &CancellationHandle::never())
            .await;
        assert!(scan.is_exhaustive());
        assert_eq!(
            scan,
            AdminScan::Complete {
                range: BlockRange::try_new(50_001, 100_000).unwrap(),
                admins: btreeset! {A, B},
                skipped_blocks: vec![],
            }
        );
    }

    #[tokio::test]
    async fn unknown_head_is_undetermined() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number()
            .returning(|| Err(anyhow!("connection refused")));
        logs.expect_role_events().never();
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), fast_config());

        let scan = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &CancellationHandle::never())
            .await;
        assert!(matches!(scan, AdminScan::Undetermined { .. }));
        assert_eq!(scan.admins(), None);
    }

    #[tokio::test]
    async fn scan_without_any_successful_request_is_undetermined() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number().returning(|| Ok(100_000));
        logs.expect_role_events()
            .returning(|_, _, _| Err(anyhow!("unavailable")));
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), fast_config());

        let scan = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &CancellationHandle::never())
            .await;
        assert_eq!(
            scan,
            AdminScan::Undetermined {
                reason: "10 requests failed in a row".to_string()
            }
        );
    }

    #[tokio::test]
    async fn short_window_with_only_failures_is_undetermined() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number().returning(|| Ok(1_000));
        logs.expect_role_events()
            .returning(|_, _, _| Err(anyhow!("unavailable")));
        let config = ScanConfig {
            window: 2,
            ..fast_config()
        };
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), config);

        let scan = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &CancellationHandle::never())
            .await;
        // Both blocks are skipped after their retries, well below the
        // consecutive failure limit.
        assert!(matches!(scan, AdminScan::Undetermined { .. }));
        assert_eq!(scan.admins(), None);
    }

    #[tokio::test]
    async fn reconstruction_is_repeatable() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number().returning(|| Ok(100_000));
        logs.expect_role_events().returning(|_, _, range| {
            Ok(if range.start() == 50_001 {
                vec![
                    event(RoleChange::Granted, A, 50_010, 0),
                    event(RoleChange::Granted, B, 50_011, 0),
                    event(RoleChange::Revoked, A, 50_012, 0),
                ]
            } else {
                vec![]
            })
        });
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), fast_config());
        let cancel = CancellationHandle::never();

        let first = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &cancel)
            .await;
        let second = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &cancel)
            .await;
        assert_eq!(first, second);
        assert_eq!(first.admins(), Some(&btreeset! {B}));
    }

    #[tokio::test]
    async fn aborted_scan_keeps_partial_admins() {
        let mut logs = MockLogQuerying::new();
        logs.expect_block_number().returning(|| Ok(100_000));
        logs.expect_role_events().returning(|_, _, range| {
            if range.start() == 50_001 {
                Ok(vec![event(RoleChange::Granted, A, 50_002, 0)])
            } else {
                Err(anyhow!("unavailable"))
            }
        });
        let reconstructor = AdminSetReconstructor::new(Arc::new(logs), fast_config());

        let scan = reconstructor
            .reconstruct(Address::ZERO, *ADMIN_ROLE, &CancellationHandle::never())
            .await;
        assert!(!scan.is_exhaustive());
        assert!(matches!(
            scan,
            AdminScan::Partial {
                reason: AbortReason::ConsecutiveFailures { failures: 10 },
                ..
            }
        ));
        assert_eq!(scan.admins(), Some(&btreeset! {A}));
    }
}
