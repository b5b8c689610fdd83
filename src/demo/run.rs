use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    chain::{keccak256, Address, Block, Seed},
    config::RegistryConfig,
    dkg::DkgState,
    events::RegistryEvent,
    governance::ParameterId,
    pool::{MembershipResolver, SortitionPool},
    result::{fingerprint, DkgResult, RawDkgResult},
};

use super::{
    diagnose::{approval_checks, encoding_report},
    scenario::{build_result, run_demo},
    LocalRegistry, SaveData, SECONDS_PER_BLOCK,
};

#[derive(Parser)]
#[command(author, version, about = "DKG result lifecycle registry", long_about = None)]
pub struct Cli {
    /// registry configuration (JSON), read by `init`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh ledger snapshot
    Init {
        #[arg(short, long, default_value = "5")]
        operators: u64,

        #[arg(long, default_value = "1")]
        block: u64,

        /// unix time of the first block, defaults to now
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Show state, parameters, pending updates and wallets
    Status,
    /// Advance the chain
    Mine {
        #[arg(default_value = "1")]
        blocks: u64,

        #[arg(long = "seconds-per-block", default_value = "12")]
        seconds_per_block: u64,
    },
    /// Request a new wallet (as the wallet owner)
    Request {
        #[arg(long)]
        from: Option<Address>,
    },
    /// Deliver the DKG seed (as the random beacon)
    Seed {
        #[arg(long)]
        value: Option<Seed>,

        #[arg(long)]
        from: Option<Address>,
    },
    /// Write a well-formed result for the current pool
    SampleResult {
        #[arg(long, default_value = "1")]
        submitter: u64,

        #[arg(long, value_delimiter = ',')]
        misbehaved: Vec<u8>,

        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Submit a result (as the operator of the submitter seat)
    Submit {
        result: PathBuf,

        #[arg(long)]
        from: Option<Address>,

        /// defaults to the delivered seed
        #[arg(long)]
        seed: Option<Seed>,
    },
    /// Approve the submitted result, by default the one from the last submission event
    Approve {
        result: Option<PathBuf>,

        #[arg(long)]
        from: Option<Address>,
    },
    /// Challenge the submitted result
    Challenge {
        result: Option<PathBuf>,

        #[arg(long, required = true)]
        from: Address,
    },
    /// Apply an elapsed seed or result submission timeout
    NotifyTimeout,
    BeginUpdate {
        parameter: ParameterId,
        value: u64,

        #[arg(long)]
        from: Option<Address>,
    },
    FinalizeUpdate {
        parameter: ParameterId,

        #[arg(long)]
        from: Option<Address>,
    },
    BeginWalletOwnerUpdate {
        address: Address,

        #[arg(long)]
        from: Option<Address>,
    },
    FinalizeWalletOwnerUpdate {
        #[arg(long)]
        from: Option<Address>,
    },
    /// Print the canonical fingerprint of a result file
    Hash { result: PathBuf },
    /// Check every approval condition and compare encodings against the stored fingerprint
    Diagnose {
        result: Option<PathBuf>,

        #[arg(long)]
        from: Option<Address>,
    },
    /// Run a complete in-memory scenario
    Demo,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init {
            operators,
            block,
            timestamp,
        } => {
            let config = match &cli.config {
                Some(path) => RegistryConfig::load(path)
                    .with_context(|| format!("could not load config {:?}", path))?,
                None => RegistryConfig::default(),
            };
            let timestamp = match timestamp {
                Some(t) => t,
                None => OffsetDateTime::now_utc().unix_timestamp().try_into()?,
            };
            let data = SaveData::create(config, operators, Block::new(block, timestamp))?;
            data.save()?;
            log::info!("ledger initialized with {} operators at block {}", operators, data.block);
            Ok(())
        }
        Command::Hash { result } => {
            let raw = read_raw(&result)?;
            let record = DkgResult::try_from(&raw)?;
            let computed = fingerprint(&record)?;
            println!("{}", computed);
            if let Some(stored) = raw.stored_fingerprint()? {
                if stored == computed {
                    println!("{} stored hash", "matches".green());
                } else {
                    println!("{} stored hash {}", "differs from".red(), stored);
                }
            }
            Ok(())
        }
        Command::Demo => {
            let registry = run_demo()?;
            print_events(&registry);
            Ok(())
        }
        command => {
            let (mut registry, config, block) = SaveData::load()
                .context("no ledger snapshot, run `init` first")?
                .into_registry();
            let block = execute(command, &mut registry, block)?;
            SaveData::from_registry(registry, config, block).save()?;
            Ok(())
        }
    }
}

/// Run a command against the loaded ledger and return the block to persist.
/// Transactions are mined into the next block.
fn execute(command: Command, registry: &mut LocalRegistry, block: Block) -> Result<Block> {
    let next = block.mine(1, SECONDS_PER_BLOCK);
    match command {
        Command::Status => {
            print_status(registry, block);
            Ok(block)
        }
        Command::Mine {
            blocks,
            seconds_per_block,
        } => {
            let mined = block.mine(blocks, seconds_per_block);
            log::info!("mined {} blocks, now at {}", blocks, mined);
            Ok(mined)
        }
        Command::Request { from } => {
            let caller = from.unwrap_or_else(|| registry.state().governance.wallet_owner());
            registry.request_new_wallet(caller, next)?;
            Ok(next)
        }
        Command::Seed { value, from } => {
            let caller = from.unwrap_or(registry.state().random_beacon);
            let seed = value.unwrap_or_else(|| keccak256(&next.number.to_be_bytes()));
            registry.deliver_seed(caller, seed, next)?;
            println!("{}", seed);
            Ok(next)
        }
        Command::SampleResult {
            submitter,
            misbehaved,
            out,
        } => {
            let seed = registry.state().dkg.seed().unwrap_or_default();
            let result = build_result(registry.pool(), registry.state().group, submitter, &misbehaved, seed)?;
            let json = serde_json::to_string_pretty(&result)?;
            match out {
                Some(path) => fs::write(&path, json)?,
                None => println!("{}", json),
            }
            Ok(block)
        }
        Command::Submit { result, from, seed } => {
            let record = read_result(&result)?;
            let caller = match from {
                Some(caller) => caller,
                None => submitter_operator(registry, &record)?,
            };
            let seed = match seed.or(registry.state().dkg.seed()) {
                Some(seed) => seed,
                None => bail!("no seed delivered yet"),
            };
            let fingerprint = registry.submit_result(caller, &record, seed, next)?;
            println!("{}", fingerprint);
            Ok(next)
        }
        Command::Approve { result, from } => {
            let record = load_or_latest(registry, result)?;
            let caller = match from {
                Some(caller) => caller,
                None => submitter_operator(registry, &record)?,
            };
            let wallet_id = registry.approve_result(caller, &record, next)?;
            println!("{}", wallet_id);
            Ok(next)
        }
        Command::Challenge { result, from } => {
            let record = load_or_latest(registry, result)?;
            let reason = registry.challenge_result(from, &record, next)?;
            println!("{}", reason);
            Ok(next)
        }
        Command::NotifyTimeout => {
            match registry.state().dkg.state() {
                DkgState::AwaitingSeed => registry.notify_seed_timeout(next)?,
                DkgState::AwaitingResult => registry.notify_dkg_timeout(next)?,
                state => bail!("no timeout can elapse in state {}", state),
            }
            Ok(next)
        }
        Command::BeginUpdate {
            parameter,
            value,
            from,
        } => {
            let caller = from.unwrap_or(registry.state().governance.owner());
            registry.begin_parameter_update(caller, parameter, value, next)?;
            Ok(next)
        }
        Command::FinalizeUpdate { parameter, from } => {
            let caller = from.unwrap_or(registry.state().governance.owner());
            registry.finalize_parameter_update(caller, parameter, next)?;
            Ok(next)
        }
        Command::BeginWalletOwnerUpdate { address, from } => {
            let caller = from.unwrap_or(registry.state().governance.owner());
            registry.begin_wallet_owner_update(caller, address, next)?;
            Ok(next)
        }
        Command::FinalizeWalletOwnerUpdate { from } => {
            let caller = from.unwrap_or(registry.state().governance.owner());
            registry.finalize_wallet_owner_update(caller, next)?;
            Ok(next)
        }
        Command::Diagnose { result, from } => {
            let (record, stored) = match result {
                Some(path) => {
                    let raw = read_raw(&path)?;
                    (DkgResult::try_from(&raw)?, raw.stored_fingerprint()?)
                }
                None => (latest_submitted(registry)?, None),
            };
            let stored = stored.or(registry.submission().map(|s| s.fingerprint));
            let caller = match from {
                Some(caller) => caller,
                None => submitter_operator(registry, &record).unwrap_or_default(),
            };

            println!("{}", "Approval conditions".bold());
            for check in approval_checks(registry, caller, &record, next) {
                println!("  {}", check);
            }
            match registry.is_result_valid(&record) {
                Ok(()) => println!("  result is {}", "valid".green()),
                Err(reason) => println!("  result is {}: {}", "invalid".red(), reason),
            }

            println!("{}", "Encodings".bold());
            for report in encoding_report(&record, stored) {
                let fingerprint = match &report.fingerprint {
                    Ok(f) => f.to_string(),
                    Err(e) => e.to_string().red().to_string(),
                };
                let mark = if report.matches { "<= stored".green().to_string() } else { String::new() };
                println!("  {:<20} {} {}", report.schema.name, fingerprint, mark);
                println!(
                    "  {:<20} version {} {}",
                    "",
                    report.schema.version,
                    report.schema.signature().dimmed()
                );
            }
            Ok(block)
        }
        Command::Init { .. } | Command::Hash { .. } | Command::Demo => {
            bail!("command does not run against a ledger snapshot")
        }
    }
}

fn read_raw(path: &PathBuf) -> Result<RawDkgResult> {
    let data = fs::read_to_string(path).with_context(|| format!("could not read {:?}", path))?;
    Ok(serde_json::from_str(&data)?)
}

fn read_result(path: &PathBuf) -> Result<DkgResult> {
    Ok(DkgResult::try_from(read_raw(path)?)?)
}

fn latest_submitted(registry: &LocalRegistry) -> Result<DkgResult> {
    registry
        .events()
        .iter()
        .rev()
        .find_map(|e| match &e.event {
            RegistryEvent::DkgResultSubmitted { result, .. } => Some(result.clone()),
            _ => None,
        })
        .context("no DkgResultSubmitted event found")
}

fn load_or_latest(registry: &LocalRegistry, path: Option<PathBuf>) -> Result<DkgResult> {
    match path {
        Some(path) => read_result(&path),
        None => latest_submitted(registry),
    }
}

fn submitter_operator(registry: &LocalRegistry, result: &DkgResult) -> Result<Address> {
    let member_id = result.submitter_member_id()?;
    registry
        .pool()
        .resolve_operator(member_id)
        .with_context(|| format!("member {} does not resolve to an operator", member_id))
}

fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_status(registry: &LocalRegistry, block: Block) {
    let state = registry.state_at(block);
    let dkg = &registry.state().dkg;
    println!(
        "block {} at {}",
        block.number,
        format_timestamp(block.timestamp)
    );
    println!(
        "state {} (code {}), stored {}",
        state.to_string().cyan(),
        state.code(),
        dkg.state()
    );

    let params = registry.parameters();
    if let Some(deadline) = dkg.seed_deadline(&params) {
        println!("seed expected until block {}", deadline);
    }
    if let Some(deadline) = dkg.submission_deadline(&params) {
        println!(
            "result submission open from block {} until block {}",
            dkg.result_submission_start_block(),
            deadline
        );
    }
    if let (Some(submission), Some(window)) = (registry.submission(), registry.result_window()) {
        println!(
            "submitted {} by {} at block {}",
            submission.fingerprint, submission.submitter, submission.submitted_at_block
        );
        println!(
            "challenge period ends at block {}, submitter precedence at {}",
            window.challenge_end, window.precedence_end
        );
    }

    println!("{}", "Parameters".bold());
    for id in ParameterId::ALL {
        println!("  {:<34} {}", id, registry.state().governance.value(id));
    }
    for (id, update) in registry.pending_updates() {
        let remaining = registry.remaining_update_time(id, block).unwrap_or_default();
        println!(
            "  pending {} => {} since {} ({}s left)",
            id,
            update.new_value,
            format_timestamp(update.initiated_at),
            remaining
        );
    }
    if let Some(update) = registry.state().governance.pending_wallet_owner() {
        let remaining = registry.remaining_wallet_owner_update_time(block).unwrap_or_default();
        println!(
            "  pending wallet owner => {} ({}s left)",
            update.new_value, remaining
        );
    }

    println!("{}", "Sortition pool".bold());
    let pool = registry.pool();
    println!("  owner {}, locked {}", pool.owner(), pool.is_locked());
    for (id, operator) in pool.operators() {
        println!("  member {:>3} {}", id, operator);
    }

    println!("{}", "Wallets".bold());
    for wallet in registry.state().wallets.iter() {
        println!("  {} created at block {}", wallet.id, wallet.created_at_block);
    }
}

fn print_events(registry: &LocalRegistry) {
    for emitted in registry.events() {
        println!("{:>6} {}", emitted.block, emitted.event.to_string().green());
    }
}
