use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use evc_core::{ModbusTcpTransport, Orchestrator};
use evcsrv::bootstrap::{Args, Command};
use evcsrv::logging::init_logging;
use evcsrv::{service, shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_config());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.config_loader().load()?;
    debug!(
        "Controller {} unit {} base {} timeout {:.1}s",
        config.socket_addr(),
        config.unit_id,
        config.address_base.offset(),
        config.timeout_secs
    );

    let mut orchestrator = Orchestrator::new(ModbusTcpTransport::new(config));
    let mut stdout = std::io::stdout().lock();

    match args.action() {
        Command::Read { format } => {
            service::read(&mut orchestrator, format, &mut stdout).await?;
        },
        Command::SetCurrent {
            amperes,
            target,
            format,
        } => {
            service::set_current(&mut orchestrator, target, amperes, format, &mut stdout).await?;
        },
        Command::Serve { bind } => {
            drop(stdout);
            let token = CancellationToken::new();
            shutdown::spawn_signal_watcher(token.clone());
            service::serve(orchestrator, &bind, token).await?;
        },
    }
    Ok(())
}
