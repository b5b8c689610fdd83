use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::{
    chain::{keccak256, Address, Block, Seed},
    config::RegistryConfig,
    dkg::{GroupParameters, PUBLIC_KEY_BYTE_SIZE, SIGNATURE_BYTE_SIZE},
    governance::{DkgParameters, ParameterId},
    pool::{LocalSortitionPool, MembershipResolver},
    registry::WalletRegistry,
    result::{members_hash, DkgResult},
    wallet_owner::RecordingWalletOwner,
};

use super::{operator_address, LocalRegistry, SECONDS_PER_BLOCK};

fn log_target() -> String {
    "demo".to_owned()
}

/// Build a well-formed result for the first `group_size` pool members.
/// Every seat not listed in `misbehaved` signs. Key and signature bytes are
/// derived from `seed`; they are placeholders, not real threshold material.
pub fn build_result(
    pool: &LocalSortitionPool,
    group: GroupParameters,
    submitter: u64,
    misbehaved: &[u8],
    seed: Seed,
) -> Result<DkgResult> {
    let members: Vec<u32> = pool.member_ids().into_iter().take(group.group_size).collect();
    if members.len() < group.group_size {
        bail!(
            "pool has {} members, group needs {}",
            members.len(),
            group.group_size
        );
    }

    let mut misbehaved = misbehaved.to_vec();
    misbehaved.sort_unstable();
    misbehaved.dedup();

    let is_misbehaved = |seat: usize| misbehaved.iter().any(|&m| m as usize == seat);
    let signing: Vec<u64> = (1..=members.len())
        .filter(|&seat| !is_misbehaved(seat))
        .map(|seat| seat as u64)
        .collect();
    if signing.len() < group.group_threshold {
        bail!(
            "{} signers left, threshold is {}",
            signing.len(),
            group.group_threshold
        );
    }

    let active = members
        .iter()
        .enumerate()
        .filter(|(i, _)| !is_misbehaved(i + 1))
        .map(|(_, &id)| {
            pool.resolve_operator(id)
                .with_context(|| format!("member {} has no operator", id))
        })
        .collect::<Result<Vec<Address>>>()?;

    let mut group_pub_key = Vec::with_capacity(PUBLIC_KEY_BYTE_SIZE);
    let mut word = keccak256(seed.as_bytes());
    while group_pub_key.len() < PUBLIC_KEY_BYTE_SIZE {
        group_pub_key.extend_from_slice(word.as_bytes());
        word = keccak256(word.as_bytes());
    }
    group_pub_key.truncate(PUBLIC_KEY_BYTE_SIZE);

    let signatures = signing
        .iter()
        .flat_map(|seat| {
            let mut signature = keccak256(&[seed.as_bytes().as_slice(), seat.to_be_bytes().as_slice()].concat())
                .as_bytes()
                .to_vec();
            signature.resize(SIGNATURE_BYTE_SIZE, *seat as u8);
            signature
        })
        .collect();

    Ok(DkgResult {
        submitter_member_index: submitter,
        group_pub_key,
        misbehaved_members_indices: misbehaved,
        signatures,
        signing_members_indices: signing,
        members,
        members_hash: members_hash(&active),
    })
}

pub fn demo_config() -> RegistryConfig {
    RegistryConfig {
        parameters: DkgParameters {
            seed_timeout: 20,
            result_challenge_period_length: 10,
            result_challenge_extra_gas: 50_000,
            result_submission_timeout: 30,
            submitter_precedence_period_length: 5,
        },
        governance_delay: 3_600,
        group: GroupParameters {
            group_size: 5,
            group_threshold: 3,
        },
        ..RegistryConfig::default()
    }
}

/// Walk a fresh registry through one approved wallet, one challenged
/// result and one parameter update.
pub fn run_demo() -> Result<LocalRegistry> {
    let config = demo_config();
    let mut pool = LocalSortitionPool::new(config.registry);
    for n in 1..=config.group.group_size as u64 {
        pool.insert_operator(operator_address(n));
    }
    let mut registry = WalletRegistry::new(
        &config,
        pool,
        RecordingWalletOwner::default(),
    )?;
    let mut now = Block::new(1, 1_700_000_000);
    let mut mine = |blocks: u64| {
        now = now.mine(blocks, SECONDS_PER_BLOCK);
        now
    };
    let params = config.parameters;

    log::info!(target: &log_target(), "{}", "round 1: honest result".bold());
    registry.request_new_wallet(config.wallet_owner, mine(1))?;
    let seed = keccak256(b"demo round 1");
    registry.deliver_seed(config.random_beacon, seed, mine(1))?;
    let result = build_result(registry.pool(), config.group, 2, &[4], seed)?;
    registry.submit_result(operator_address(2), &result, seed, mine(1))?;

    let early = registry.approve_result(operator_address(2), &result, mine(1));
    log::info!(target: &log_target(), "early approval: {}", describe(&early));
    let other = registry.approve_result(
        operator_address(3),
        &result,
        mine(params.result_challenge_period_length),
    );
    log::info!(target: &log_target(), "approval by a non-submitter: {}", describe(&other));
    let wallet_id = registry.approve_result(operator_address(2), &result, mine(1))?;
    log::info!(target: &log_target(), "wallet {} created", wallet_id.to_string().green());

    log::info!(target: &log_target(), "{}", "round 2: corrupted result".bold());
    registry.request_new_wallet(config.wallet_owner, mine(1))?;
    let seed = keccak256(b"demo round 2");
    registry.deliver_seed(config.random_beacon, seed, mine(1))?;
    let mut corrupted = build_result(registry.pool(), config.group, 1, &[], seed)?;
    corrupted.members_hash = keccak256(b"not the group");
    registry.submit_result(operator_address(1), &corrupted, seed, mine(1))?;
    let reason = registry.challenge_result(operator_address(5), &corrupted, mine(2))?;
    log::info!(target: &log_target(), "result challenged: {}", reason);

    log::info!(target: &log_target(), "{}", "round 3: governance".bold());
    let update = registry.begin_parameter_update(
        config.governance_owner,
        ParameterId::ResultChallengePeriodLength,
        20,
        mine(1),
    )?;
    let early = registry.finalize_parameter_update(
        config.governance_owner,
        ParameterId::ResultChallengePeriodLength,
        mine(1),
    );
    log::info!(target: &log_target(), "early finalize: {}", describe(&early));
    let blocks = registry.remaining_update_time(ParameterId::ResultChallengePeriodLength, mine(0))?
        / SECONDS_PER_BLOCK
        + 1;
    registry.finalize_parameter_update(
        config.governance_owner,
        ParameterId::ResultChallengePeriodLength,
        mine(blocks),
    )?;
    log::info!(
        target: &log_target(),
        "challenge period {} => {} (started at {})",
        params.result_challenge_period_length,
        registry.parameters().result_challenge_period_length,
        update.initiated_at
    );

    Ok(registry)
}

fn describe<T>(outcome: &Result<T, crate::error::RegistryError>) -> String {
    match outcome {
        Ok(_) => "accepted".green().to_string(),
        Err(e) => format!("{} ({})", "rejected".red(), e),
    }
}
