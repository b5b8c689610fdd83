use std::fmt::Display;

use colored::Colorize;

use crate::{
    chain::{Address, Block, Fingerprint},
    dkg::DkgState,
    pool::SortitionPool,
    registry::WalletRegistry,
    result::{DkgResult, EncodingError, EncodingSchema},
    wallet_owner::WalletOwner,
    wallets::wallet_id,
};

/// One precondition of approving a result.
#[derive(Debug, Clone)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn new(name: &'static str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            detail: detail.into(),
        }
    }
}

impl Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mark = if self.passed { "PASS".green() } else { "FAIL".red() };
        write!(f, "[{}] {}: {}", mark, self.name, self.detail)
    }
}

/// Evaluate every approval condition separately, so that all failing ones
/// show up instead of only the first.
pub fn approval_checks<P: SortitionPool, W: WalletOwner>(
    registry: &WalletRegistry<P, W>,
    caller: Address,
    result: &DkgResult,
    now: Block,
) -> Vec<Check> {
    let mut checks = Vec::new();

    let state = registry.state_at(now);
    checks.push(Check::new(
        "DKG state",
        state == DkgState::Challenge,
        format!("{} (code {}), expected {}", state, state.code(), DkgState::Challenge),
    ));

    match registry.result_window() {
        Some(window) => checks.push(Check::new(
            "challenge period",
            now.number >= window.challenge_end,
            format!("ends at block {}, current block {}", window.challenge_end, now.number),
        )),
        None => checks.push(Check::new("challenge period", false, "no submission")),
    }

    if let Some(submission) = registry.submission() {
        checks.push(match crate::result::fingerprint(result) {
            Ok(actual) => Check::new(
                "fingerprint",
                actual == submission.fingerprint,
                format!("submitted {}, computed {}", submission.fingerprint, actual),
            ),
            Err(e) => Check::new("fingerprint", false, e.to_string()),
        });
    }

    let indices = result.check_indices();
    checks.push(Check::new(
        "index bounds",
        indices.is_ok(),
        match &indices {
            Ok(()) => format!("all indices within [1, {}]", result.members.len()),
            Err(e) => e.to_string(),
        },
    ));

    let submitter = result
        .submitter_member_id()
        .ok()
        .and_then(|id| registry.pool().resolve_operator(id).map(|op| (id, op)));
    checks.push(match submitter {
        Some((id, operator)) => Check::new(
            "submitter operator",
            true,
            format!("member {} is operator {}", id, operator),
        ),
        None => Check::new("submitter operator", false, "submitter does not resolve"),
    });

    if let (Some(window), Some((_, operator))) = (registry.result_window(), submitter) {
        let outcome = window.check_approval(now.number, caller, operator);
        checks.push(Check::new(
            "precedence",
            outcome.is_ok(),
            match outcome {
                Ok(()) if now.number < window.precedence_end => {
                    format!("only the submitter until block {}", window.precedence_end)
                }
                Ok(()) => "anyone may approve".to_owned(),
                Err(e) => e.to_string(),
            },
        ));
    }

    let unresolved: Vec<String> = result
        .misbehaved_member_ids()
        .unwrap_or_default()
        .into_iter()
        .filter(|id| registry.pool().resolve_operator(*id).is_none())
        .map(|id| id.to_string())
        .collect();
    checks.push(Check::new(
        "misbehaved operators",
        unresolved.is_empty(),
        if unresolved.is_empty() {
            format!("{} resolved", result.misbehaved_members_indices.len())
        } else {
            format!("unresolved members {}", unresolved.join(", "))
        },
    ));

    let id = wallet_id(&result.group_pub_key);
    checks.push(Check::new(
        "wallet",
        !registry.is_wallet_registered(&id),
        if registry.is_wallet_registered(&id) {
            format!("{} already exists", id)
        } else {
            format!("{} not registered yet", id)
        },
    ));

    let pool = registry.pool();
    let address = registry.state().address;
    checks.push(Check::new(
        "sortition pool",
        pool.is_locked() && pool.owner() == address,
        format!(
            "locked: {}, owner {} (registry {})",
            pool.is_locked(),
            pool.owner(),
            address
        ),
    ));

    checks
}

pub struct SchemaReport {
    pub schema: EncodingSchema,
    pub fingerprint: Result<Fingerprint, EncodingError>,
    pub matches: bool,
}

/// Fingerprint of `result` under every known layout, flagging the ones
/// that reproduce `stored`.
pub fn encoding_report(result: &DkgResult, stored: Option<Fingerprint>) -> Vec<SchemaReport> {
    EncodingSchema::ALL
        .into_iter()
        .map(|schema| {
            let fingerprint = schema.fingerprint(result);
            let matches = matches!((&fingerprint, stored), (Ok(f), Some(s)) if *f == s);
            SchemaReport {
                schema,
                fingerprint,
                matches,
            }
        })
        .collect()
}
