use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use primitive_types::U256;
use rand::{seq::index::sample, Rng};

use lotto_common::{
    coordinate::{CELL_COUNT, PICKS_PER_ENTRY},
    selection::{StrategyKind, UniformIndex, SEED_SIZE},
    Address, Coordinate, CoordinateSet, RoundId,
};
use lotto_drawer::{
    config::{defaults, ConfigValidator, DrawerConfig},
    endpoint::{Endpoint, EndpointPool, PoolMember, ResolveMode},
    fetcher::ChainStateFetcher,
    journal::{DrawJournal, DrawStatus},
    logger::{self, LogLevel, LoggerConfig},
    pipeline::{DrawError, DrawOutcome, DrawPipeline, DrawRequest},
    MemoryLedger,
};

/// Contract address used by the in-memory settlement layer
const SIMULATED_CONTRACT: Address = Address::new([0x10; 20]);

#[derive(Parser, Clone, Debug)]
#[command(name = "lotto-drawer")]
#[command(about = "Grid Lotto draw service - fair, reproducible winner selection")]
pub struct CliConfig {
    /// Set log level
    #[clap(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Disable the log file
    #[clap(long)]
    disable_file_logging: bool,

    /// Disable the usage of colors in log
    #[clap(long)]
    disable_log_color: bool,

    /// Log filename
    #[clap(long, default_value_t = String::from(defaults::FILENAME_LOG))]
    filename_log: String,

    /// Logs directory
    #[clap(long, default_value_t = String::from(defaults::LOGS_PATH))]
    logs_path: String,

    /// Directory of the draw journal
    #[clap(long, default_value_t = String::from(defaults::JOURNAL_PATH))]
    journal_path: String,

    /// Read endpoint as `name=url` or `url`, repeat in priority order
    #[clap(long = "endpoint", value_parser = parse_endpoint)]
    endpoints: Vec<Endpoint>,

    /// Settlement contract address
    #[clap(long)]
    contract: Option<Address>,

    /// Node-managed account sending finalizeDraw
    #[clap(long)]
    operator: Option<Address>,

    /// Winner selection strategy (uniform, minimum_collision)
    #[clap(long, default_value_t = StrategyKind::Uniform)]
    strategy: StrategyKind,

    /// Endpoint resolution (sequential, race)
    #[clap(long, default_value_t = ResolveMode::Sequential)]
    resolve_mode: ResolveMode,

    /// Uniform strategy multiplier
    #[clap(long, default_value_t = UniformIndex::default().k1)]
    k1: u64,

    /// Uniform strategy offset
    #[clap(long, default_value_t = UniformIndex::default().k2)]
    k2: u64,

    /// Advanced: per-endpoint read timeout in milliseconds
    #[clap(long, default_value_t = defaults::ATTEMPT_TIMEOUT_MS)]
    attempt_timeout_ms: u64,

    /// Advanced: connection timeout in milliseconds
    #[clap(long, default_value_t = defaults::CONNECTION_TIMEOUT_MS)]
    connection_timeout_ms: u64,

    /// Enable strict configuration validation
    #[clap(long)]
    strict_validation: bool,

    /// Disable auto-fix of configuration issues
    #[clap(long)]
    no_auto_fix: bool,

    /// JSON File to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Select and submit the winner of a round
    Draw {
        /// Round to draw, defaults to the contract's current round
        #[clap(long)]
        round: Option<u64>,
        /// Public 32-byte randomness (hex) mixed into the draw seed
        #[clap(long, value_parser = parse_beacon)]
        beacon: Option<[u8; SEED_SIZE]>,
    },
    /// Endpoint health and round state
    Status {
        #[clap(long)]
        round: Option<u64>,
    },
    /// Amount owed to a participant
    Pending { participant: Address },
    /// Claim a participant's winnings through its node-managed account
    Claim { participant: Address },
    /// Recent draw attempts from the journal
    History {
        #[clap(long, default_value_t = 10)]
        limit: usize,
    },
    /// Run draws against an in-memory settlement layer
    Simulate {
        #[clap(long, default_value_t = 3)]
        rounds: u64,
        #[clap(long, default_value_t = 12)]
        entries: usize,
        #[clap(long, default_value_t = 5)]
        participants: usize,
    },
}

impl CliConfig {
    pub fn to_drawer_config(&self) -> DrawerConfig {
        let endpoints = if self.endpoints.is_empty() {
            DrawerConfig::default().endpoints
        } else {
            self.endpoints.clone()
        };

        DrawerConfig {
            log_level: self.log_level,
            disable_file_logging: self.disable_file_logging,
            disable_log_color: self.disable_log_color,
            filename_log: self.filename_log.clone(),
            logs_path: self.logs_path.clone(),
            journal_path: self.journal_path.clone(),
            endpoints,
            contract_address: self.contract,
            operator_address: self.operator,
            strategy: self.strategy,
            uniform: UniformIndex::new(self.k1, self.k2),
            resolve_mode: self.resolve_mode,
            attempt_timeout_ms: self.attempt_timeout_ms,
            connection_timeout_ms: self.connection_timeout_ms,
            auto_fix_config: !self.no_auto_fix,
            strict_validation: self.strict_validation,
        }
    }
}

fn parse_endpoint(value: &str) -> Result<Endpoint, String> {
    match value.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => Ok(Endpoint::new(name, url)),
        Some(_) => Err(format!("invalid endpoint '{}', expected name=url", value)),
        None => Ok(Endpoint::new(value, value)),
    }
}

fn parse_beacon(value: &str) -> Result<[u8; SEED_SIZE], hex::FromHexError> {
    let mut beacon = [0u8; SEED_SIZE];
    hex::decode_to_slice(value.strip_prefix("0x").unwrap_or(value), &mut beacon)?;
    Ok(beacon)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_config = CliConfig::parse();

    if let Some(path) = cli_config.config_file.as_ref() {
        if cli_config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                eprintln!("Use a different path or remove the existing file");
                return Ok(());
            }

            DrawerConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            println!("Edit the file and run the application with --config-file {path}");
            return Ok(());
        }
    }

    let (mut config, config_messages) = if let Some(config_path) = &cli_config.config_file {
        println!("Loading configuration from: {config_path}");
        DrawerConfig::from_file(
            config_path,
            cli_config.strict_validation,
            !cli_config.no_auto_fix,
        )?
    } else {
        let mut config = cli_config.to_drawer_config();
        let validator = ConfigValidator::new(config.strict_validation, config.auto_fix_config);
        let messages = validator.validate(&mut config)?;
        (config, messages)
    };

    if !config_messages.is_empty() {
        println!(
            "Configuration validation completed with {} message(s)",
            config_messages.len()
        );
    }

    // Addresses given on the command line win over the file
    if cli_config.contract.is_some() {
        config.contract_address = cli_config.contract;
    }
    if cli_config.operator.is_some() {
        config.operator_address = cli_config.operator;
    }

    logger::init(LoggerConfig {
        level: config.log_level,
        dir_path: &config.logs_path,
        filename_log: &config.filename_log,
        disable_file_logging: config.disable_file_logging,
        disable_colors: config.disable_log_color,
    })?;

    if log::log_enabled!(log::Level::Info) {
        info!("Grid Lotto drawer v{} starting...", env!("CARGO_PKG_VERSION"));
    }
    for message in &config_messages {
        if log::log_enabled!(log::Level::Warn) {
            warn!("Config: {}", message);
        }
    }

    match cli_config.command.clone() {
        Some(Command::Draw { round, beacon }) => {
            run_draw(&config, round.map(RoundId), beacon).await
        }
        Some(Command::Status { round }) => run_status(&config, round.map(RoundId)).await,
        Some(Command::Pending { participant }) => run_pending(&config, participant).await,
        Some(Command::Claim { participant }) => run_claim(&config, participant).await,
        Some(Command::History { limit }) => run_history(&config, limit).await,
        Some(Command::Simulate {
            rounds,
            entries,
            participants,
        }) => run_simulation(&config, rounds, entries, participants).await,
        None => {
            warn!("No command given, see --help");
            Ok(())
        }
    }
}

async fn run_draw(
    config: &DrawerConfig,
    round: Option<RoundId>,
    beacon: Option<[u8; SEED_SIZE]>,
) -> Result<()> {
    let pipeline = config.build_pipeline()?;
    let mut journal = DrawJournal::open(config.journal_dir()).await?;

    let round = match round {
        Some(round) => round,
        None => match pipeline.fetcher().current_round().await {
            Ok(resolved) => resolved.value,
            Err(e) => {
                let e = DrawError::from(e);
                journal.record_unresolved(&e).await?;
                error!("Could not determine the round to draw [{}]: {}", e.category(), e);
                return Err(e.into());
            }
        },
    };

    let outcome = pipeline.draw(DrawRequest { round: Some(round), beacon }).await;
    journal.record(round, &outcome).await?;

    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(e) => {
            error!("Draw for round {} failed [{}]: {}", round, e.category(), e);
            if e.is_retryable() {
                println!("The draw can be retried later");
            }
            Err(e.into())
        }
    }
}

async fn run_status(config: &DrawerConfig, round: Option<RoundId>) -> Result<()> {
    let clients = config.build_clients()?;
    for (endpoint, client) in &clients {
        let health = client.health_check().await;
        if health.is_healthy {
            println!(
                "{}: healthy, chain id {}, block {}, {:?}",
                endpoint,
                health.chain_id.unwrap_or_default(),
                health.block_number.map_or_else(|| "?".to_string(), |b| b.to_string()),
                health.response_time
            );
        } else {
            println!(
                "{}: unhealthy ({})",
                endpoint,
                health.error_message.unwrap_or_default()
            );
        }
    }

    let fetcher = config.build_fetcher(&clients)?;
    let round = match round {
        Some(round) => round,
        None => fetcher.current_round().await?.value,
    };
    let open = fetcher.is_round_open(round).await?.value;
    let count = fetcher.entry_count(round).await?;
    println!(
        "Round {}: {}, {} entries (answered by {})",
        round,
        if open { "open" } else { "closed" },
        count.value,
        count.endpoint
    );

    let journal = DrawJournal::open(config.journal_dir()).await?;
    if let Some(record) = journal.get(round) {
        println!("Journal: {} attempt(s), last {}", record.attempts, describe(&record.status));
    }
    Ok(())
}

async fn run_pending(config: &DrawerConfig, participant: Address) -> Result<()> {
    let clients = config.build_clients()?;
    let fetcher = config.build_fetcher(&clients)?;
    let pending = fetcher.pending_winnings(participant).await?;
    println!("{} is owed {}", participant, pending.value);
    Ok(())
}

async fn run_claim(config: &DrawerConfig, participant: Address) -> Result<()> {
    let pipeline = config.build_pipeline()?;
    let claimed = pipeline.claim(participant).await?;
    println!(
        "{} claimed {} in {}",
        claimed.participant, claimed.amount, claimed.receipt.tx_hash
    );
    Ok(())
}

async fn run_history(config: &DrawerConfig, limit: usize) -> Result<()> {
    let journal = DrawJournal::open(config.journal_dir()).await?;
    if journal.is_empty() {
        println!("No draws recorded");
    }
    for record in journal.recent(limit) {
        println!(
            "Round {}: {} attempt(s), {}",
            record.round,
            record.attempts,
            describe(&record.status)
        );
    }
    for attempt in journal.unresolved(limit) {
        println!(
            "Unknown round at {}: failed [{}]{}: {}",
            attempt.at,
            attempt.category,
            if attempt.retryable { " (retryable)" } else { "" },
            attempt.reason
        );
    }
    Ok(())
}

fn describe(status: &DrawStatus) -> String {
    match status {
        DrawStatus::Settled { result, tx_hash } => format!(
            "settled by {}: entry {} of {} in {}",
            result.strategy, result.winner, result.entry_count, tx_hash
        ),
        DrawStatus::Empty => "empty round".to_string(),
        DrawStatus::Failed {
            category,
            reason,
            retryable,
        } => format!(
            "failed [{}]{}: {}",
            category,
            if *retryable { " (retryable)" } else { "" },
            reason
        ),
    }
}

fn print_outcome(outcome: &DrawOutcome) {
    match outcome {
        DrawOutcome::Settled { result, receipt } => {
            println!("Round {} settled in {}", result.round, receipt.tx_hash);
            println!("  strategy:  {}", result.strategy);
            println!("  winner:    entry {} of {}", result.winner, result.entry_count);
            if let Some(participant) = result.participant {
                println!("  player:    {}", participant);
            }
            if let Some(score) = result.score {
                println!("  score:     {}", score);
            }
            println!("  seed:      {}", result.seed);
        }
        DrawOutcome::EmptyRound { round } => {
            println!("Round {} has no entries, nothing submitted", round)
        }
    }
}

fn random_ticket<R: Rng>(rng: &mut R) -> Result<CoordinateSet> {
    let cells = sample(rng, CELL_COUNT as usize, PICKS_PER_ENTRY)
        .into_iter()
        .map(|i| Coordinate::new(i as u8 + 1))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CoordinateSet::new(cells)?)
}

async fn run_simulation(
    config: &DrawerConfig,
    rounds: u64,
    entries: usize,
    participants: usize,
) -> Result<()> {
    if participants == 0 {
        return Err(anyhow!("at least one participant is required"));
    }

    let ledger = Arc::new(MemoryLedger::new(SIMULATED_CONTRACT, U256::from(1_000u64)));
    let members = vec![PoolMember::new(Endpoint::new("memory", "memory://ledger"), ledger.clone())];
    let pool = EndpointPool::new(members, config.attempt_timeout(), config.resolve_mode)?;
    let pipeline = DrawPipeline::new(
        ChainStateFetcher::new(Arc::new(pool), SIMULATED_CONTRACT),
        ledger.clone(),
        config.build_strategy(),
    );

    let mut rng = rand::thread_rng();
    let players: Vec<Address> = (0..participants).map(|_| Address::new(rng.gen())).collect();

    for _ in 0..rounds {
        let round = ledger.current_round();
        for _ in 0..entries {
            let player = players[rng.gen_range(0..players.len())];
            ledger.buy_entry(player, random_ticket(&mut rng)?, ledger.price())?;
        }

        let outcome = pipeline.draw(DrawRequest::round(round)).await?;
        print_outcome(&outcome);

        if let DrawOutcome::Settled { result, .. } = &outcome {
            if let Some(winner) = result.participant {
                let claimed = pipeline.claim(winner).await?;
                println!("  claimed:   {}", claimed.amount);
            }
        }
    }

    let counters = ledger.counters();
    println!(
        "{} finalize call(s), {} claim(s), {} read(s)",
        counters.finalize_calls, counters.claim_calls, counters.reads
    );
    Ok(())
}
