use colored::Colorize;
use enum_display::EnumDisplay;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{Address, Fingerprint, Seed},
    dkg::{log_target, DkgState},
    error::RegistryError,
    governance::DkgParameters,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumDisplay)]
pub enum Timeout {
    Seed,
    ResultSubmission,
}

/// Result accepted into the challenge period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub fingerprint: Fingerprint,
    pub submitted_at_block: u64,
    pub seed: Seed,
    pub submitter: Address,
}

/// Holds the DKG phase and the data recorded on the way through it.
///
/// Timeouts are evaluated lazily: [DkgTracker::state_at] reports the phase as
/// it is at a given block, while the stored phase only moves when an
/// operation applies the timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DkgTracker {
    state: DkgState,
    start_block: u64,
    seed: Option<Seed>,
    result_submission_start_block: u64,
    submission: Option<Submission>,
}

impl DkgTracker {
    /// Stored phase, without timeouts applied.
    pub fn state(&self) -> DkgState {
        self.state
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn seed(&self) -> Option<Seed> {
        self.seed
    }

    pub fn result_submission_start_block(&self) -> u64 {
        self.result_submission_start_block
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// Last block at which the seed may still arrive.
    pub fn seed_deadline(&self, params: &DkgParameters) -> Option<u64> {
        (self.state == DkgState::AwaitingSeed)
            .then(|| self.start_block.saturating_add(params.seed_timeout))
    }

    /// Last block at which a result may still be submitted.
    pub fn submission_deadline(&self, params: &DkgParameters) -> Option<u64> {
        (self.state == DkgState::AwaitingResult).then(|| {
            self.result_submission_start_block
                .saturating_add(params.result_submission_timeout)
        })
    }

    pub fn elapsed_timeout(&self, now: u64, params: &DkgParameters) -> Option<Timeout> {
        if matches!(self.seed_deadline(params), Some(deadline) if now > deadline) {
            return Some(Timeout::Seed);
        }
        if matches!(self.submission_deadline(params), Some(deadline) if now > deadline) {
            return Some(Timeout::ResultSubmission);
        }
        None
    }

    /// Phase at block `now`, with any elapsed timeout taken into account.
    pub fn state_at(&self, now: u64, params: &DkgParameters) -> DkgState {
        match self.elapsed_timeout(now, params) {
            Some(_) => DkgState::Idle,
            None => self.state,
        }
    }

    pub fn expect(&self, expected: DkgState, now: u64, params: &DkgParameters) -> Result<(), RegistryError> {
        let actual = self.state_at(now, params);
        if actual != expected {
            log::debug!(
                target: &log_target(),
                "rejected: state is {}, expected {}",
                actual.to_string().red(),
                expected
            );
            return Err(RegistryError::StateMismatch { expected, actual });
        }
        Ok(())
    }

    /// Move the stored phase to IDLE if a timeout has elapsed by `now`.
    pub(crate) fn apply_timeout(&mut self, now: u64, params: &DkgParameters) -> Option<Timeout> {
        let timeout = self.elapsed_timeout(now, params)?;
        log::info!(target: &log_target(), "{} timeout elapsed at block {}", timeout, now);
        self.reset();
        Some(timeout)
    }

    pub(crate) fn lock(&mut self, now: u64) {
        self.start_block = now;
        self.transition(DkgState::AwaitingSeed);
    }

    pub(crate) fn start(&mut self, seed: Seed, now: u64) {
        self.seed = Some(seed);
        self.result_submission_start_block = now;
        self.transition(DkgState::AwaitingResult);
    }

    pub(crate) fn submit(&mut self, submission: Submission) {
        self.submission = Some(submission);
        self.transition(DkgState::Challenge);
    }

    pub(crate) fn complete(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.start_block = 0;
        self.seed = None;
        self.result_submission_start_block = 0;
        self.submission = None;
        self.transition(DkgState::Idle);
    }

    fn transition(&mut self, next: DkgState) {
        log::info!(
            target: &log_target(),
            "Transitioning state: {} => {}",
            self.state.to_string().cyan(),
            next.to_string().cyan()
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DkgParameters {
        DkgParameters {
            seed_timeout: 10,
            result_submission_timeout: 20,
            ..DkgParameters::default()
        }
    }

    #[test]
    fn seed_timeout_is_lazy() {
        let params = params();
        let mut tracker = DkgTracker::default();
        tracker.lock(100);

        assert_eq!(tracker.state_at(110, &params), DkgState::AwaitingSeed);
        assert_eq!(tracker.state_at(111, &params), DkgState::Idle);
        assert_eq!(tracker.state(), DkgState::AwaitingSeed);
        assert_eq!(
            tracker.expect(DkgState::AwaitingSeed, 111, &params),
            Err(RegistryError::StateMismatch {
                expected: DkgState::AwaitingSeed,
                actual: DkgState::Idle
            })
        );

        assert_eq!(tracker.apply_timeout(110, &params), None);
        assert_eq!(tracker.apply_timeout(111, &params), Some(Timeout::Seed));
        assert_eq!(tracker, DkgTracker::default());
    }

    #[test]
    fn submission_timeout_counts_from_seed() {
        let params = params();
        let mut tracker = DkgTracker::default();
        tracker.lock(100);
        tracker.start(Seed::from_low_u64(7), 105);

        assert_eq!(tracker.result_submission_start_block(), 105);
        assert_eq!(tracker.submission_deadline(&params), Some(125));
        assert_eq!(tracker.state_at(125, &params), DkgState::AwaitingResult);
        assert_eq!(tracker.elapsed_timeout(126, &params), Some(Timeout::ResultSubmission));
    }

    #[test]
    fn challenge_has_no_timeout() {
        let params = params();
        let mut tracker = DkgTracker::default();
        tracker.lock(1);
        tracker.start(Seed::from_low_u64(7), 2);
        tracker.submit(Submission {
            fingerprint: Fingerprint::default(),
            submitted_at_block: 3,
            seed: Seed::from_low_u64(7),
            submitter: Address::from_low_u64(1),
        });
        assert_eq!(tracker.state_at(u64::MAX, &params), DkgState::Challenge);

        tracker.complete();
        assert_eq!(tracker.state(), DkgState::Idle);
        assert!(tracker.submission().is_none());
    }
}
