use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{Address, Block, Fingerprint, Seed, WalletId},
    config::RegistryConfig,
    dkg::{
        DkgState, DkgTracker, GroupParameters, InvalidResult, ResultValidator, ResultWindow,
        Submission, Timeout,
    },
    error::RegistryError,
    events::{EmittedEvent, RegistryEvent},
    governance::{DkgParameters, Governance, ParameterId, PendingUpdate},
    pool::{PoolError, SortitionPool},
    result::{self, DkgResult},
    wallet_owner::WalletOwner,
    wallets::{wallet_id, Wallet, Wallets},
};

fn log_target() -> String {
    "registry".to_owned()
}

/// Everything the registry owns. Collaborators live next to it in
/// [WalletRegistry].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryState {
    pub address: Address,
    pub random_beacon: Address,
    pub group: GroupParameters,
    pub dkg: DkgTracker,
    pub governance: Governance,
    pub wallets: Wallets,
    #[serde(default)]
    pub events: Vec<EmittedEvent>,
}

impl RegistryState {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            address: config.registry,
            random_beacon: config.random_beacon,
            group: config.group,
            dkg: DkgTracker::default(),
            governance: Governance::new(
                config.governance_owner,
                config.wallet_owner,
                config.parameters,
                config.governance_delay,
            ),
            wallets: Wallets::default(),
            events: Vec::new(),
        }
    }
}

/// Ledger driving wallet creation through DKG.
///
/// Every operation is all-or-nothing: checks run first, then the fallible
/// calls into the pool and the wallet owner (undone if a later call fails),
/// and only then is the registry's own state changed and events emitted.
pub struct WalletRegistry<P: SortitionPool, W: WalletOwner> {
    state: RegistryState,
    pool: P,
    wallet_owner: W,
}

impl<P: SortitionPool, W: WalletOwner> WalletRegistry<P, W> {
    pub fn new(config: &RegistryConfig, pool: P, wallet_owner: W) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self::from_parts(RegistryState::new(config), pool, wallet_owner))
    }

    pub fn from_parts(state: RegistryState, pool: P, wallet_owner: W) -> Self {
        Self {
            state,
            pool,
            wallet_owner,
        }
    }

    pub fn into_parts(self) -> (RegistryState, P, W) {
        (self.state, self.pool, self.wallet_owner)
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    pub fn wallet_owner(&self) -> &W {
        &self.wallet_owner
    }

    pub fn wallet_owner_mut(&mut self) -> &mut W {
        &mut self.wallet_owner
    }

    fn emit(&mut self, now: Block, event: RegistryEvent) {
        log::info!(target: &log_target(), "{} at block {}", event.to_string().green(), now.number);
        log::debug!(target: &log_target(), "{:?}", event);
        self.state.events.push(EmittedEvent {
            block: now.number,
            event,
        });
    }

    /// Materialize a timeout that has elapsed by `now`.
    fn settle_timeout(&mut self, now: Block) {
        let params = self.parameters();
        match self.state.dkg.apply_timeout(now.number, &params) {
            Some(Timeout::Seed) => self.emit(now, RegistryEvent::DkgSeedTimedOut),
            Some(Timeout::ResultSubmission) => self.emit(now, RegistryEvent::DkgTimedOut),
            None => {}
        }
    }

    fn expect_state(&self, expected: DkgState, now: Block) -> Result<(), RegistryError> {
        self.state.dkg.expect(expected, now.number, &self.parameters())
    }

    fn resolve(&self, member_id: u32) -> Result<Address, RegistryError> {
        self.pool
            .resolve_operator(member_id)
            .ok_or(RegistryError::ResolutionFailed { member_id })
    }

    fn current_submission(&self) -> Result<Submission, RegistryError> {
        self.state
            .dkg
            .submission()
            .cloned()
            .ok_or(RegistryError::StateMismatch {
                expected: DkgState::Challenge,
                actual: self.state.dkg.state(),
            })
    }

    fn check_fingerprint(&self, submission: &Submission, result: &DkgResult) -> Result<(), RegistryError> {
        let actual = result::fingerprint(result)?;
        if actual != submission.fingerprint {
            log::debug!(
                target: &log_target(),
                "rejected: fingerprint {} does not match submitted {}",
                actual.short().red(),
                submission.fingerprint.short()
            );
            return Err(RegistryError::HashMismatch {
                expected: submission.fingerprint,
                actual,
            });
        }
        Ok(())
    }

    pub fn request_new_wallet(&mut self, caller: Address, now: Block) -> Result<(), RegistryError> {
        if caller != self.state.governance.wallet_owner() {
            return Err(RegistryError::Unauthorized {
                caller,
                action: "request a new wallet",
            });
        }
        self.expect_state(DkgState::Idle, now)?;
        if self.pool.is_locked() {
            return Err(RegistryError::PoolLocked);
        }

        self.settle_timeout(now);
        self.state.dkg.lock(now.number);
        self.emit(
            now,
            RegistryEvent::DkgStarted {
                start_block: now.number,
            },
        );
        Ok(())
    }

    pub fn deliver_seed(&mut self, caller: Address, seed: Seed, now: Block) -> Result<(), RegistryError> {
        if caller != self.state.random_beacon {
            return Err(RegistryError::Unauthorized {
                caller,
                action: "deliver the DKG seed",
            });
        }
        self.expect_state(DkgState::AwaitingSeed, now)?;

        self.state.dkg.start(seed, now.number);
        self.emit(now, RegistryEvent::DkgSeedDelivered { seed });
        Ok(())
    }

    /// Accept `result` for the challenge period and lock the pool.
    pub fn submit_result(
        &mut self,
        caller: Address,
        result: &DkgResult,
        seed: Seed,
        now: Block,
    ) -> Result<Fingerprint, RegistryError> {
        self.expect_state(DkgState::AwaitingResult, now)?;
        result.check_indices()?;
        let submitter = self.resolve(result.submitter_member_id()?)?;
        if caller != submitter {
            return Err(RegistryError::Unauthorized {
                caller,
                action: "submit a result for another member",
            });
        }
        if let Some(expected) = self.state.dkg.seed() {
            if expected != seed {
                return Err(RegistryError::SeedMismatch {
                    expected,
                    actual: seed,
                });
            }
        }
        let fingerprint = result::fingerprint(result)?;

        self.pool.lock(self.state.address).map_err(|e| match e {
            PoolError::AlreadyLocked => RegistryError::PoolLocked,
            e => RegistryError::PoolLockFailed(e),
        })?;

        self.state.dkg.submit(Submission {
            fingerprint,
            submitted_at_block: now.number,
            seed,
            submitter: caller,
        });
        self.emit(
            now,
            RegistryEvent::DkgResultSubmitted {
                fingerprint,
                seed,
                result: result.clone(),
            },
        );
        Ok(fingerprint)
    }

    /// Approve the submitted result once the challenge period is over and
    /// create its wallet.
    pub fn approve_result(&mut self, caller: Address, result: &DkgResult, now: Block) -> Result<WalletId, RegistryError> {
        self.expect_state(DkgState::Challenge, now)?;
        let submission = self.current_submission()?;
        self.check_fingerprint(&submission, result)?;
        result.check_indices()?;

        let window = ResultWindow::new(submission.submitted_at_block, &self.parameters());
        if now.number < window.challenge_end {
            return Err(RegistryError::WindowNotElapsed {
                challenge_end: window.challenge_end,
                current: now.number,
            });
        }
        let submitter = self.resolve(result.submitter_member_id()?)?;
        window.check_approval(now.number, caller, submitter)?;
        let misbehaved_operators = result
            .misbehaved_member_ids()?
            .into_iter()
            .map(|id| self.resolve(id))
            .collect::<Result<Vec<_>, _>>()?;
        let id = wallet_id(&result.group_pub_key);
        if self.state.wallets.contains(&id) {
            log::debug!(target: &log_target(), "rejected: wallet {} already exists", id.short());
            return Err(RegistryError::WalletAlreadyExists(id));
        }

        self.pool
            .unlock(self.state.address)
            .map_err(RegistryError::PoolUnlockFailed)?;
        if let Err(e) = self.wallet_owner.on_wallet_created(id, &result.group_pub_key) {
            let reason = e.to_string();
            log::debug!(target: &log_target(), "rejected: wallet owner refused {}: {}", id.short(), reason);
            if let Err(error) = self.pool.lock(self.state.address) {
                log::error!(target: &log_target(), "could not restore pool lock: {}", error);
                return Err(RegistryError::PoolRelockFailed { reason, error });
            }
            return Err(RegistryError::WalletOwnerRejected(reason));
        }

        self.state.wallets.insert(Wallet {
            id,
            public_key: result.group_pub_key.clone(),
            members_hash: result.members_hash,
            created_at_block: now.number,
        });
        self.state.dkg.complete();
        self.emit(
            now,
            RegistryEvent::DkgResultApproved {
                fingerprint: submission.fingerprint,
                approver: caller,
                misbehaved_operators,
            },
        );
        self.emit(
            now,
            RegistryEvent::WalletCreated {
                wallet_id: id,
                fingerprint: submission.fingerprint,
            },
        );
        Ok(id)
    }

    /// Reject the submitted result if it is invalid, discarding it and
    /// unlocking the pool. A fresh wallet request is needed afterwards.
    pub fn challenge_result(
        &mut self,
        caller: Address,
        result: &DkgResult,
        now: Block,
    ) -> Result<InvalidResult, RegistryError> {
        self.expect_state(DkgState::Challenge, now)?;
        let submission = self.current_submission()?;
        ResultWindow::new(submission.submitted_at_block, &self.parameters()).check_challenge(now.number)?;
        self.check_fingerprint(&submission, result)?;
        let reason = match self.is_result_valid(result) {
            Ok(()) => return Err(RegistryError::NothingToChallenge),
            Err(reason) => reason,
        };

        self.pool
            .unlock(self.state.address)
            .map_err(RegistryError::PoolUnlockFailed)?;

        self.state.dkg.complete();
        self.emit(
            now,
            RegistryEvent::DkgResultChallenged {
                fingerprint: submission.fingerprint,
                challenger: caller,
                reason: reason.to_string(),
            },
        );
        Ok(reason)
    }

    fn notify_timeout(&mut self, timeout: Timeout, pending: DkgState, now: Block) -> Result<(), RegistryError> {
        let stored = self.state.dkg.state();
        if stored != pending {
            return Err(RegistryError::StateMismatch {
                expected: pending,
                actual: stored,
            });
        }
        if self.state.dkg.elapsed_timeout(now.number, &self.parameters()) != Some(timeout) {
            return Err(RegistryError::StateMismatch {
                expected: DkgState::Idle,
                actual: stored,
            });
        }
        self.settle_timeout(now);
        Ok(())
    }

    pub fn notify_seed_timeout(&mut self, now: Block) -> Result<(), RegistryError> {
        self.notify_timeout(Timeout::Seed, DkgState::AwaitingSeed, now)
    }

    pub fn notify_dkg_timeout(&mut self, now: Block) -> Result<(), RegistryError> {
        self.notify_timeout(Timeout::ResultSubmission, DkgState::AwaitingResult, now)
    }

    pub fn begin_parameter_update(
        &mut self,
        caller: Address,
        parameter: ParameterId,
        value: u64,
        now: Block,
    ) -> Result<PendingUpdate<u64>, RegistryError> {
        let update = self
            .state
            .governance
            .begin_update(caller, parameter, value, now.timestamp)?;
        self.emit(
            now,
            RegistryEvent::ParameterUpdateStarted {
                parameter,
                new_value: value,
                initiated_at: update.initiated_at,
            },
        );
        Ok(update)
    }

    pub fn finalize_parameter_update(
        &mut self,
        caller: Address,
        parameter: ParameterId,
        now: Block,
    ) -> Result<u64, RegistryError> {
        let value = self
            .state
            .governance
            .ready_update(caller, parameter, now.timestamp)?;
        if parameter.is_dkg_parameter() {
            self.expect_state(DkgState::Idle, now)?;
            self.settle_timeout(now);
        }

        self.state.governance.apply_update(parameter);
        self.emit(now, RegistryEvent::ParameterUpdated { parameter, value });
        Ok(value)
    }

    pub fn begin_wallet_owner_update(
        &mut self,
        caller: Address,
        new_owner: Address,
        now: Block,
    ) -> Result<PendingUpdate<Address>, RegistryError> {
        let update = self
            .state
            .governance
            .begin_wallet_owner_update(caller, new_owner, now.timestamp)?;
        self.emit(
            now,
            RegistryEvent::WalletOwnerUpdateStarted {
                new_owner,
                initiated_at: update.initiated_at,
            },
        );
        Ok(update)
    }

    pub fn finalize_wallet_owner_update(&mut self, caller: Address, now: Block) -> Result<Address, RegistryError> {
        let wallet_owner = self
            .state
            .governance
            .ready_wallet_owner_update(caller, now.timestamp)?;

        self.state.governance.apply_wallet_owner_update();
        self.emit(now, RegistryEvent::WalletOwnerUpdated { wallet_owner });
        Ok(wallet_owner)
    }

    pub fn state_at(&self, now: Block) -> DkgState {
        self.state.dkg.state_at(now.number, &self.parameters())
    }

    pub fn parameters(&self) -> DkgParameters {
        self.state.governance.parameters()
    }

    pub fn governance_delay(&self) -> u64 {
        self.state.governance.governance_delay()
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.state.dkg.submission()
    }

    /// Challenge/precedence boundaries of the current submission.
    pub fn result_window(&self) -> Option<ResultWindow> {
        self.submission()
            .map(|s| ResultWindow::new(s.submitted_at_block, &self.parameters()))
    }

    pub fn pending_updates(&self) -> impl Iterator<Item = (ParameterId, &PendingUpdate<u64>)> {
        self.state.governance.pending_updates()
    }

    pub fn remaining_update_time(&self, parameter: ParameterId, now: Block) -> Result<u64, RegistryError> {
        self.state
            .governance
            .remaining_update_time(parameter, now.timestamp)
    }

    pub fn remaining_wallet_owner_update_time(&self, now: Block) -> Result<u64, RegistryError> {
        self.state
            .governance
            .remaining_wallet_owner_update_time(now.timestamp)
    }

    pub fn is_result_valid(&self, result: &DkgResult) -> Result<(), InvalidResult> {
        ResultValidator::new(self.state.group).validate(result, &self.pool)
    }

    pub fn has_seed_timed_out(&self, now: Block) -> bool {
        self.state.dkg.elapsed_timeout(now.number, &self.parameters()) == Some(Timeout::Seed)
    }

    pub fn has_dkg_timed_out(&self, now: Block) -> bool {
        self.state.dkg.elapsed_timeout(now.number, &self.parameters())
            == Some(Timeout::ResultSubmission)
    }

    pub fn wallet(&self, id: &WalletId) -> Option<&Wallet> {
        self.state.wallets.get(id)
    }

    pub fn is_wallet_registered(&self, id: &WalletId) -> bool {
        self.state.wallets.contains(id)
    }

    pub fn events(&self) -> &[EmittedEvent] {
        &self.state.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dkg::{PUBLIC_KEY_BYTE_SIZE, SIGNATURE_BYTE_SIZE},
        pool::{LocalSortitionPool, MembershipResolver},
        result::members_hash,
        wallet_owner::RecordingWalletOwner,
    };

    type TestRegistry = WalletRegistry<LocalSortitionPool, RecordingWalletOwner>;

    const DELAY: u64 = 100;

    fn config() -> RegistryConfig {
        RegistryConfig {
            parameters: DkgParameters {
                seed_timeout: 10,
                result_challenge_period_length: 10,
                result_challenge_extra_gas: 0,
                result_submission_timeout: 30,
                submitter_precedence_period_length: 5,
            },
            governance_delay: DELAY,
            group: GroupParameters {
                group_size: 5,
                group_threshold: 3,
            },
            ..RegistryConfig::default()
        }
    }

    fn operator(seat: u64) -> Address {
        Address::from_low_u64(100 + seat)
    }

    fn registry() -> TestRegistry {
        let config = config();
        let mut pool = LocalSortitionPool::new(config.registry);
        for seat in 1..=5 {
            pool.insert_operator(operator(seat));
        }
        let wallet_owner = RecordingWalletOwner::default();
        WalletRegistry::new(&config, pool, wallet_owner).unwrap()
    }

    /// Valid result submitted by seat 1 with seat 4 misbehaving.
    fn valid_result() -> DkgResult {
        let active: Vec<Address> = [1, 2, 3, 5].into_iter().map(operator).collect();
        DkgResult {
            submitter_member_index: 1,
            group_pub_key: vec![0x11; PUBLIC_KEY_BYTE_SIZE],
            misbehaved_members_indices: vec![4],
            signatures: vec![0x22; 3 * SIGNATURE_BYTE_SIZE],
            signing_members_indices: vec![1, 2, 3],
            members: vec![1, 2, 3, 4, 5],
            members_hash: members_hash(&active),
        }
    }

    fn seed() -> Seed {
        Seed::from_low_u64(0x5eed)
    }

    fn at(number: u64) -> Block {
        Block::new(number, number * 12)
    }

    fn event_names(registry: &TestRegistry) -> Vec<String> {
        registry.events().iter().map(|e| e.event.to_string()).collect()
    }

    /// Registry with `result` submitted at block 102.
    fn submitted(result: &DkgResult) -> TestRegistry {
        let mut registry = registry();
        let config = config();
        registry.request_new_wallet(config.wallet_owner, at(100)).unwrap();
        registry.deliver_seed(config.random_beacon, seed(), at(101)).unwrap();
        registry.submit_result(operator(1), result, seed(), at(102)).unwrap();
        registry
    }

    #[derive(Debug, Clone, Copy)]
    enum Operation {
        Request,
        Seed,
        Submit,
        Approve,
        Challenge,
    }

    impl Operation {
        const ALL: [Operation; 5] = [
            Operation::Request,
            Operation::Seed,
            Operation::Submit,
            Operation::Approve,
            Operation::Challenge,
        ];

        fn phase(&self) -> DkgState {
            match self {
                Operation::Request => DkgState::Idle,
                Operation::Seed => DkgState::AwaitingSeed,
                Operation::Submit => DkgState::AwaitingResult,
                Operation::Approve | Operation::Challenge => DkgState::Challenge,
            }
        }

        fn apply(&self, registry: &mut TestRegistry, result: &DkgResult, now: Block) -> Result<(), RegistryError> {
            let config = config();
            match self {
                Operation::Request => registry.request_new_wallet(config.wallet_owner, now),
                Operation::Seed => registry.deliver_seed(config.random_beacon, seed(), now),
                Operation::Submit => registry.submit_result(operator(1), result, seed(), now).map(drop),
                Operation::Approve => registry.approve_result(operator(1), result, now).map(drop),
                Operation::Challenge => registry.challenge_result(operator(2), result, now).map(drop),
            }
        }
    }

    /// Registry driven into `phase`, one operation per block from block 100.
    fn registry_in(phase: DkgState, result: &DkgResult) -> TestRegistry {
        let mut registry = registry();
        let steps = [Operation::Request, Operation::Seed, Operation::Submit];
        for (block, operation) in (100..).zip(steps.iter().take(phase.code() as usize)) {
            operation.apply(&mut registry, result, at(block)).unwrap();
        }
        assert_eq!(registry.state().dkg.state(), phase);
        registry
    }

    /// Pool that can be told to refuse locking.
    struct StubbornPool {
        inner: LocalSortitionPool,
        refuse_lock: bool,
    }

    impl MembershipResolver for StubbornPool {
        fn resolve_operator(&self, member_id: u32) -> Option<Address> {
            self.inner.resolve_operator(member_id)
        }
    }

    impl SortitionPool for StubbornPool {
        fn owner(&self) -> Address {
            self.inner.owner()
        }

        fn is_locked(&self) -> bool {
            self.inner.is_locked()
        }

        fn lock(&mut self, caller: Address) -> Result<(), PoolError> {
            if self.refuse_lock {
                return Err(PoolError::NotOwner {
                    caller,
                    owner: Address::ZERO,
                });
            }
            self.inner.lock(caller)
        }

        fn unlock(&mut self, caller: Address) -> Result<(), PoolError> {
            self.inner.unlock(caller)
        }
    }

    #[test]
    fn wallet_creation_end_to_end() {
        let result = valid_result();
        let mut registry = submitted(&result);
        assert_eq!(registry.state_at(at(102)), DkgState::Challenge);
        assert!(registry.pool().is_locked());
        assert_eq!(
            registry.submission().map(|s| s.fingerprint),
            Some(result::fingerprint(&result).unwrap())
        );

        let id = registry.approve_result(operator(1), &result, at(112)).unwrap();

        assert_eq!(registry.state_at(at(112)), DkgState::Idle);
        assert!(!registry.pool().is_locked());
        assert!(registry.is_wallet_registered(&id));
        assert_eq!(registry.wallet(&id).unwrap().created_at_block, 112);
        assert_eq!(registry.wallet_owner().created.len(), 1);
        assert_eq!(
            event_names(&registry),
            vec![
                "DkgStarted",
                "DkgSeedDelivered",
                "DkgResultSubmitted",
                "DkgResultApproved",
                "WalletCreated"
            ]
        );
        assert!(matches!(
            &registry.events()[3].event,
            RegistryEvent::DkgResultApproved { misbehaved_operators, .. }
                if misbehaved_operators == &vec![operator(4)]
        ));
    }

    #[test]
    fn request_guards() {
        let config = config();
        let mut registry = registry();

        assert!(matches!(
            registry.request_new_wallet(config.governance_owner, at(1)),
            Err(RegistryError::Unauthorized { .. })
        ));

        registry.pool_mut().lock(config.registry).unwrap();
        assert_eq!(
            registry.request_new_wallet(config.wallet_owner, at(1)),
            Err(RegistryError::PoolLocked)
        );
        registry.pool_mut().unlock(config.registry).unwrap();

        registry.request_new_wallet(config.wallet_owner, at(1)).unwrap();
        assert_eq!(
            registry.request_new_wallet(config.wallet_owner, at(2)),
            Err(RegistryError::StateMismatch {
                expected: DkgState::Idle,
                actual: DkgState::AwaitingSeed
            })
        );
        assert!(matches!(
            registry.deliver_seed(config.wallet_owner, seed(), at(2)),
            Err(RegistryError::Unauthorized { .. })
        ));
    }

    #[test]
    fn seed_timeout_applies_lazily() {
        let config = config();
        let mut registry = registry();
        registry.request_new_wallet(config.wallet_owner, at(100)).unwrap();

        assert!(!registry.has_seed_timed_out(at(110)));
        assert!(registry.has_seed_timed_out(at(111)));
        assert_eq!(registry.state_at(at(111)), DkgState::Idle);

        // a failing operation leaves the stored state alone
        assert_eq!(
            registry.deliver_seed(config.random_beacon, seed(), at(111)),
            Err(RegistryError::StateMismatch {
                expected: DkgState::AwaitingSeed,
                actual: DkgState::Idle
            })
        );
        assert_eq!(registry.state().dkg.state(), DkgState::AwaitingSeed);
        assert_eq!(registry.events().len(), 1);

        registry.request_new_wallet(config.wallet_owner, at(111)).unwrap();
        assert_eq!(
            event_names(&registry),
            vec!["DkgStarted", "DkgSeedTimedOut", "DkgStarted"]
        );
        assert_eq!(registry.state().dkg.start_block(), 111);
    }

    #[test]
    fn explicit_timeout_notification() {
        let config = config();
        let mut registry = registry();
        assert!(matches!(
            registry.notify_seed_timeout(at(1)),
            Err(RegistryError::StateMismatch { .. })
        ));

        registry.request_new_wallet(config.wallet_owner, at(100)).unwrap();
        registry.deliver_seed(config.random_beacon, seed(), at(105)).unwrap();
        assert!(matches!(
            registry.notify_dkg_timeout(at(135)),
            Err(RegistryError::StateMismatch { .. })
        ));
        assert!(registry.has_dkg_timed_out(at(136)));

        registry.notify_dkg_timeout(at(136)).unwrap();
        assert_eq!(registry.state().dkg.state(), DkgState::Idle);
        assert_eq!(event_names(&registry).last().unwrap(), "DkgTimedOut");
        assert!(registry.notify_dkg_timeout(at(137)).is_err());
    }

    #[test]
    fn submission_guards() {
        let config = config();
        let mut registry = registry();
        let result = valid_result();
        assert!(matches!(
            registry.submit_result(operator(1), &result, seed(), at(1)),
            Err(RegistryError::StateMismatch { .. })
        ));

        registry.request_new_wallet(config.wallet_owner, at(100)).unwrap();
        registry.deliver_seed(config.random_beacon, seed(), at(101)).unwrap();

        assert!(matches!(
            registry.submit_result(operator(2), &result, seed(), at(102)),
            Err(RegistryError::Unauthorized { .. })
        ));
        assert_eq!(
            registry.submit_result(operator(1), &result, Seed::from_low_u64(1), at(102)),
            Err(RegistryError::SeedMismatch {
                expected: seed(),
                actual: Seed::from_low_u64(1)
            })
        );

        let mut bad = result.clone();
        bad.signing_members_indices = vec![1, 6];
        assert!(matches!(
            registry.submit_result(operator(1), &bad, seed(), at(102)),
            Err(RegistryError::IndexOutOfBounds { index: 6, .. })
        ));

        let mut unknown = result.clone();
        unknown.members[0] = 42;
        assert_eq!(
            registry.submit_result(operator(1), &unknown, seed(), at(102)),
            Err(RegistryError::ResolutionFailed { member_id: 42 })
        );
        assert!(!registry.pool().is_locked());
        assert_eq!(registry.state().dkg.state(), DkgState::AwaitingResult);

        registry.submit_result(operator(1), &result, seed(), at(102)).unwrap();
        let mut other = result.clone();
        other.submitter_member_index = 2;
        assert_eq!(
            registry.submit_result(operator(2), &other, seed(), at(103)),
            Err(RegistryError::StateMismatch {
                expected: DkgState::AwaitingResult,
                actual: DkgState::Challenge
            })
        );
    }

    #[test]
    fn approval_window() {
        let result = valid_result();
        let mut registry = submitted(&result);

        assert_eq!(
            registry.approve_result(operator(1), &result, at(111)),
            Err(RegistryError::WindowNotElapsed {
                challenge_end: 112,
                current: 111
            })
        );
        assert_eq!(
            registry.approve_result(operator(2), &result, at(112)),
            Err(RegistryError::PrecedenceViolation {
                submitter: operator(1),
                precedence_end: 117
            })
        );
        assert!(registry.approve_result(operator(2), &result, at(117)).is_ok());
    }

    #[test]
    fn approval_requires_the_submitted_record() {
        let result = valid_result();
        let mut registry = submitted(&result);
        let mut altered = result.clone();
        altered.misbehaved_members_indices = vec![5];

        assert!(matches!(
            registry.approve_result(operator(1), &altered, at(120)),
            Err(RegistryError::HashMismatch { .. })
        ));
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert_eq!(registry.events().len(), 3);
    }

    #[test]
    fn unlock_failure_leaves_everything_unchanged() {
        let config = config();
        let result = valid_result();
        let mut registry = submitted(&result);
        let elsewhere = Address::from_low_u64(0xdead);
        registry
            .pool_mut()
            .transfer_ownership(config.registry, elsewhere)
            .unwrap();

        assert!(matches!(
            registry.approve_result(operator(1), &result, at(112)),
            Err(RegistryError::PoolUnlockFailed(PoolError::NotOwner { .. }))
        ));
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert!(registry.pool().is_locked());
        assert!(registry.state().wallets.is_empty());
        assert!(registry.wallet_owner().created.is_empty());
        assert_eq!(registry.events().len(), 3);

        registry
            .pool_mut()
            .transfer_ownership(elsewhere, config.registry)
            .unwrap();
        assert!(registry.approve_result(operator(1), &result, at(112)).is_ok());
    }

    #[test]
    fn wallet_owner_rejection_restores_the_lock() {
        let result = valid_result();
        let mut registry = submitted(&result);
        registry.wallet_owner_mut().rejection = Some("paused".to_owned());

        assert_eq!(
            registry.approve_result(operator(1), &result, at(112)),
            Err(RegistryError::WalletOwnerRejected("paused".to_owned()))
        );
        assert!(registry.pool().is_locked());
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert!(registry.state().wallets.is_empty());

        registry.wallet_owner_mut().rejection = None;
        assert!(registry.approve_result(operator(1), &result, at(112)).is_ok());
    }

    #[test]
    fn operations_outside_their_phase_change_nothing() {
        let result = valid_result();
        for phase in [
            DkgState::Idle,
            DkgState::AwaitingSeed,
            DkgState::AwaitingResult,
            DkgState::Challenge,
        ] {
            for operation in Operation::ALL {
                if operation.phase() == phase {
                    continue;
                }
                let mut registry = registry_in(phase, &result);
                let tracker = registry.state().dkg.clone();
                let events = registry.events().len();
                let locked = registry.pool().is_locked();

                assert_eq!(
                    operation.apply(&mut registry, &result, at(103)),
                    Err(RegistryError::StateMismatch {
                        expected: operation.phase(),
                        actual: phase
                    }),
                    "{:?} in {}",
                    operation,
                    phase
                );
                assert_eq!(registry.state().dkg, tracker);
                assert_eq!(registry.events().len(), events);
                assert_eq!(registry.pool().is_locked(), locked);
                assert!(registry.state().wallets.is_empty());
            }
        }
    }

    #[test]
    fn group_key_backs_a_single_wallet() {
        let config = config();
        let result = valid_result();
        let mut registry = submitted(&result);
        let id = registry.approve_result(operator(1), &result, at(112)).unwrap();

        registry.request_new_wallet(config.wallet_owner, at(200)).unwrap();
        registry.deliver_seed(config.random_beacon, seed(), at(201)).unwrap();
        registry.submit_result(operator(1), &result, seed(), at(202)).unwrap();
        let events = registry.events().len();

        assert_eq!(
            registry.approve_result(operator(1), &result, at(212)),
            Err(RegistryError::WalletAlreadyExists(id))
        );
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert!(registry.pool().is_locked());
        assert_eq!(registry.events().len(), events);
        assert_eq!(registry.state().wallets.len(), 1);
        assert_eq!(registry.wallet(&id).unwrap().created_at_block, 112);
        assert_eq!(registry.wallet_owner().created.len(), 1);
        let created = registry
            .events()
            .iter()
            .filter(|e| matches!(e.event, RegistryEvent::WalletCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }

    #[test]
    fn failed_relock_is_reported_with_the_rejection() {
        let config = config();
        let mut inner = LocalSortitionPool::new(config.registry);
        for seat in 1..=5 {
            inner.insert_operator(operator(seat));
        }
        let pool = StubbornPool {
            inner,
            refuse_lock: false,
        };
        let wallet_owner = RecordingWalletOwner {
            rejection: Some("paused".to_owned()),
            ..RecordingWalletOwner::default()
        };
        let mut registry = WalletRegistry::new(&config, pool, wallet_owner).unwrap();
        let result = valid_result();
        registry.request_new_wallet(config.wallet_owner, at(100)).unwrap();
        registry.deliver_seed(config.random_beacon, seed(), at(101)).unwrap();
        registry.submit_result(operator(1), &result, seed(), at(102)).unwrap();
        registry.pool_mut().refuse_lock = true;

        assert_eq!(
            registry.approve_result(operator(1), &result, at(112)),
            Err(RegistryError::PoolRelockFailed {
                reason: "paused".to_owned(),
                error: PoolError::NotOwner {
                    caller: config.registry,
                    owner: Address::ZERO
                }
            })
        );
        assert!(!registry.pool().is_locked());
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert!(registry.state().wallets.is_empty());
        assert_eq!(registry.events().len(), 3);
    }

    #[test]
    fn challenge_targets_the_submitted_record() {
        let mut result = valid_result();
        result.misbehaved_members_indices.clear();
        let mut registry = submitted(&result);

        // a record other than the submitted one cannot discard the submission
        let mut other = result.clone();
        other.signatures[0] ^= 1;
        assert!(matches!(
            registry.challenge_result(operator(3), &other, at(105)),
            Err(RegistryError::HashMismatch { .. })
        ));
        assert_eq!(registry.state().dkg.state(), DkgState::Challenge);
        assert!(registry.pool().is_locked());
        assert_eq!(registry.events().len(), 3);

        assert!(registry.challenge_result(operator(3), &result, at(105)).is_ok());
        assert_eq!(registry.state().dkg.state(), DkgState::Idle);
    }

    #[test]
    fn valid_result_cannot_be_challenged() {
        let result = valid_result();
        let mut registry = submitted(&result);
        assert_eq!(registry.is_result_valid(&result), Ok(()));
        assert_eq!(
            registry.challenge_result(operator(3), &result, at(105)),
            Err(RegistryError::NothingToChallenge)
        );

        let mut other = result.clone();
        other.group_pub_key[0] ^= 1;
        assert!(matches!(
            registry.challenge_result(operator(3), &other, at(105)),
            Err(RegistryError::HashMismatch { .. })
        ));
    }

    #[test]
    fn invalid_result_is_challenged() {
        let mut result = valid_result();
        result.misbehaved_members_indices.clear();
        let mut registry = submitted(&result);

        assert_eq!(
            registry.challenge_result(operator(3), &result, at(112)),
            Err(RegistryError::ChallengePeriodElapsed {
                challenge_end: 112,
                current: 112
            })
        );

        let reason = registry.challenge_result(operator(3), &result, at(111)).unwrap();
        assert!(matches!(reason, InvalidResult::InvalidMembersHash { .. }));
        assert_eq!(registry.state().dkg.state(), DkgState::Idle);
        assert!(!registry.pool().is_locked());
        assert!(matches!(
            &registry.events().last().unwrap().event,
            RegistryEvent::DkgResultChallenged { challenger, .. } if *challenger == operator(3)
        ));
        assert!(matches!(
            registry.approve_result(operator(1), &result, at(120)),
            Err(RegistryError::StateMismatch { .. })
        ));
    }

    #[test]
    fn dkg_parameters_change_only_when_idle() {
        let config = config();
        let owner = config.governance_owner;
        let mut registry = registry();

        registry
            .begin_parameter_update(owner, ParameterId::ResultChallengePeriodLength, 20, at(0))
            .unwrap();
        registry.request_new_wallet(config.wallet_owner, at(1)).unwrap();

        let ready = at(DELAY / 12 + 1);
        assert_eq!(registry.remaining_update_time(ParameterId::ResultChallengePeriodLength, ready), Ok(0));
        assert!(matches!(
            registry.finalize_parameter_update(owner, ParameterId::ResultChallengePeriodLength, ready),
            Err(RegistryError::StateMismatch { .. })
        ));

        // the seed times out, which makes the registry idle again
        let later = at(20);
        assert_eq!(
            registry.finalize_parameter_update(owner, ParameterId::ResultChallengePeriodLength, later),
            Ok(20)
        );
        assert_eq!(registry.parameters().result_challenge_period_length, 20);
        assert_eq!(
            event_names(&registry),
            vec![
                "ParameterUpdateStarted",
                "DkgStarted",
                "DkgSeedTimedOut",
                "ParameterUpdated"
            ]
        );
        assert_eq!(
            registry.finalize_parameter_update(owner, ParameterId::ResultChallengePeriodLength, later),
            Err(RegistryError::NoUpdatePending("ResultChallengePeriodLength".to_owned()))
        );
    }

    #[test]
    fn governance_timelock() {
        let owner = config().governance_owner;
        let mut registry = registry();

        registry
            .begin_parameter_update(owner, ParameterId::GovernanceDelay, 50, at(10))
            .unwrap();
        assert!(matches!(
            registry.finalize_parameter_update(owner, ParameterId::GovernanceDelay, at(10)),
            Err(RegistryError::DelayNotElapsed { .. })
        ));
        // governance delay is not a DKG parameter and can change mid-DKG
        registry
            .request_new_wallet(config().wallet_owner, at(11))
            .unwrap();
        let ready = Block::new(12, 120 + DELAY);
        assert_eq!(
            registry.finalize_parameter_update(owner, ParameterId::GovernanceDelay, ready),
            Ok(50)
        );
        assert_eq!(registry.governance_delay(), 50);
        assert_eq!(registry.pending_updates().count(), 0);
    }

    #[test]
    fn wallet_owner_handover() {
        let config = config();
        let new_owner = Address::from_low_u64(0x7777);
        let mut registry = registry();

        registry
            .begin_wallet_owner_update(config.governance_owner, new_owner, at(0))
            .unwrap();
        assert_eq!(registry.remaining_wallet_owner_update_time(at(0)), Ok(DELAY));
        assert_eq!(
            registry.finalize_wallet_owner_update(config.governance_owner, Block::new(1, DELAY)),
            Ok(new_owner)
        );

        assert!(registry.request_new_wallet(config.wallet_owner, at(2)).is_err());
        assert!(registry.request_new_wallet(new_owner, at(2)).is_ok());
    }
}
