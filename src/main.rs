use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use exgate::config::{self, Cli, Credentials};
use exgate::exchange::BinanceClient;
use exgate::middleware::next_nano_id;
use exgate::supervisor::termination_signal;
use exgate::{Controller, Error, Server, ShutdownContext, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    exgate::logging::init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    config::load_dotenv();
    let credentials = Credentials::from_env()?;
    let client = BinanceClient::new(&credentials)?;

    let ctrl = Controller::new(Arc::new(client), Arc::new(next_nano_id));
    let server = Server::bind(&cli.addr).await?;

    let done = Supervisor::new(server.handle(), ctrl.readiness().clone())
        .arm(&ShutdownContext::background(), termination_signal()?);

    ctrl.readiness().mark_ready();
    info!(addr = %server.addr(), "server is ready to handle requests");

    server.serve(ctrl.app()).await?;
    done.done().await;

    info!("server stopped");
    Ok(())
}
