use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledger_webapp::api::{AppState, create_router};
use ledger_webapp::config::{NetworkTopology, Settings};
use ledger_webapp::network::{Chain, FabricProfile, SimulatedFabric};
use ledger_webapp::workflow::{
    ChainSession, ChaincodeCall, DeploymentDescriptor, WorkflowEngine,
};
use log::{error, info};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "ledger-webapp", about = "Crowd-fund web application on a Fabric network")]
struct Cli {
    /// IP address of the Docker host running membersrvc and the peers
    docker_host_ip: IpAddr,

    #[arg(value_enum)]
    network: NetworkTopology,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy the crowd-fund chaincode and serve the web application
    Serve {
        #[arg(long, env = "APP_PORT")]
        port: Option<u16>,

        /// Wait for each transaction to commit before responding
        #[arg(long)]
        confirm_commits: bool,
    },
    /// Deploy chaincode_example02 and move 10 units from a to b
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env(cli.docker_host_ip, cli.network)
        .context("Failed to load settings")?;

    let chain: Arc<dyn Chain> = Arc::new(SimulatedFabric::new(
        &settings.chain_name,
        FabricProfile::default(),
    ));
    info!("Setting membersrvc address to {}", settings.membersrvc_address());
    let session = ChainSession::open(
        chain.clone(),
        &settings.peer_addresses(),
        &settings.event_hub_address(),
    )
    .context("Failed to open chain session")?;

    let outcome = match cli.command.unwrap_or(Command::Serve {
        port: None,
        confirm_commits: false,
    }) {
        Command::Serve {
            port,
            confirm_commits,
        } => {
            if let Some(port) = port {
                settings.api_port = port;
            }
            settings.confirm_commits |= confirm_commits;
            serve(chain, &settings).await
        }
        Command::Demo => demo(chain, &settings).await,
    };

    if let Err(e) = &outcome {
        error!("{:#}", e);
    }
    drop(session);
    outcome
}

async fn serve(chain: Arc<dyn Chain>, settings: &Settings) -> Result<()> {
    let engine = Arc::new(WorkflowEngine::new(chain, settings.engine_options()));
    let deployment = DeploymentDescriptor::new(
        "crowd_fund_chaincode",
        "init",
        &[settings.account.as_str(), "0"],
    );
    let ready = engine
        .bootstrap(&settings.workflow_plan(deployment))
        .await
        .context("Failed to bootstrap the chaincode")?;

    let app = create_router(AppState {
        engine,
        user: ready.user,
        account: settings.account.clone(),
        confirm_commits: settings.confirm_commits,
    });

    let address = settings.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Crowd-fund web application listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")
}

async fn demo(chain: Arc<dyn Chain>, settings: &Settings) -> Result<()> {
    // Fresh TCert for every request unless configured otherwise.
    let options = settings.engine_options_with_batch(NonZeroUsize::MIN);
    let engine = WorkflowEngine::new(chain, options);
    let deployment =
        DeploymentDescriptor::new("chaincode_example02", "init", &["a", "100", "b", "200"]);
    let ready = engine.bootstrap(&settings.workflow_plan(deployment)).await?;

    let query = |name: &str| ChaincodeCall::new("query", vec![name.to_string()]);
    let before = engine.query(&ready.user, query("a")).await?;
    info!("a = {}", before.result_string());

    let transfer = ChaincodeCall::new(
        "invoke",
        vec!["a".to_string(), "b".to_string(), "10".to_string()],
    );
    engine.invoke_and_confirm(&ready.user, transfer).await?;

    for name in ["a", "b"] {
        let value = engine.query(&ready.user, query(name)).await?;
        info!("{} = {}", name, value.result_string());
    }
    Ok(())
}
