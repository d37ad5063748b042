use activity_ledger::{
    app::{
        ActivityLedger,
        FailurePolicy,
        RunState,
        SnapshotReport,
        actix_query_api::ActixQueryApi,
        etherscan_log_source::EtherscanLogSource,
        in_memory_ledger_store::InMemoryLedgerStore,
        ledger_store::NoopLedgerStore,
    },
    init_tracing,
};
use alloy_primitives::Address;
use anyhow::Context;
use clap::{
    ArgGroup,
    Parser,
    Subcommand,
};
use explorer_config::{
    API_KEY_VAR,
    BASE_URL_VAR,
    CHAIN_ID_VAR,
    ExplorerConfig,
    ExplorerConfigFile,
    ExplorerNetwork,
};
use std::{
    path::PathBuf,
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    group(
        ArgGroup::new("network")
            .args(["mainnet", "sepolia", "local"])
    )
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true)]
    mainnet: bool,

    #[arg(long, global = true)]
    sepolia: bool,

    #[arg(long, global = true)]
    local: bool,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, env = API_KEY_VAR, hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = BASE_URL_VAR)]
    base_url: Option<String>,

    #[arg(long, global = true, env = CHAIN_ID_VAR)]
    chain_id: Option<u64>,

    #[arg(long, global = true)]
    page_size: Option<u64>,

    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[arg(long, global = true, default_value = "false")]
    strict: bool,

    #[arg(short, long, global = true, default_value = "false")]
    tracing: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the snapshot for one player
    Snapshot {
        #[arg(long)]
        contract: Address,
        #[arg(long)]
        user: Address,
    },
    /// Print the ordered ledger for one player
    Ledger {
        #[arg(long)]
        contract: Address,
        #[arg(long)]
        user: Address,
    },
    /// Serve snapshots and ledgers over HTTP, refreshing incrementally
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Args {
    fn network(&self) -> Option<ExplorerNetwork> {
        if self.mainnet {
            Some(ExplorerNetwork::Mainnet)
        } else if self.sepolia {
            Some(ExplorerNetwork::Sepolia)
        } else if self.local {
            Some(ExplorerNetwork::Local)
        } else {
            None
        }
    }

    fn policy(&self) -> FailurePolicy {
        if self.strict {
            FailurePolicy::Strict
        } else {
            FailurePolicy::Tolerate
        }
    }

    fn explorer_config(&self) -> anyhow::Result<ExplorerConfig> {
        let file = match &self.config {
            Some(path) => ExplorerConfigFile::load(path)?,
            None => ExplorerConfigFile::default(),
        };
        let mut config = match self.network() {
            Some(network) => file.apply(ExplorerConfig::for_network(network))?,
            None => file.base_config(ExplorerNetwork::default())?,
        };
        if let Some(key) = &self.api_key {
            config = config.with_api_key(key.clone());
        }
        if let Some(url) = &self.base_url {
            config = config.with_base_url(url)?;
        }
        if let Some(chain_id) = self.chain_id {
            config = config.with_chain_id(chain_id);
        }
        if let Some(page_size) = self.page_size {
            config = config.with_page_size(page_size)?;
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_request_timeout(Some(Duration::from_secs(secs)));
        }
        Ok(config)
    }
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("rendering output")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }
    let config = args.explorer_config().context("resolving explorer config")?;
    tracing::info!(
        "Using {} explorer at {} (chain id {:?})",
        config.network,
        config.base_url,
        config.chain_id
    );
    let source = EtherscanLogSource::new(&config)?;
    let policy = args.policy();

    match args.command {
        Command::Snapshot { contract, user } => {
            let app = ActivityLedger::new(source, NoopLedgerStore).with_policy(policy);
            let reconstruction = app.reconstruct(contract, user).await?;
            print_json(&SnapshotReport::from_reconstruction(&reconstruction))
        }
        Command::Ledger { contract, user } => {
            let app = ActivityLedger::new(source, NoopLedgerStore).with_policy(policy);
            let reconstruction = app.reconstruct(contract, user).await?;
            print_json(&reconstruction)
        }
        Command::Serve { port } => {
            let mut api = ActixQueryApi::new(port).await?;
            let mut app =
                ActivityLedger::new(source, InMemoryLedgerStore::new()).with_policy(policy);

            tracing::info!("Starting activity ledger service");
            loop {
                let interrupt = handle_interupt();
                match app.run(&mut api, interrupt).await? {
                    RunState::Continue => continue,
                    RunState::Exit => {
                        tracing::info!("Exiting activity ledger service");
                        return Ok(());
                    }
                }
            }
        }
    }
}
