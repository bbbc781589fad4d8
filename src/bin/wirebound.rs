use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use dotenv::dotenv;
use tokio::runtime;
use tracing::{error, info};
use wirebound::{setup_tracing, MessageHandler, NetResult, Request, Server, ServerConfig};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    PrintConfig,
}

/// Demo handler: echoes every frame back with its own message id.
struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, request: Request) {
        info!(
            "connection {} msg {} ({} bytes)",
            request.connection().id(),
            request.msg_id(),
            request.payload().len()
        );
        if let Err(err) = request
            .connection()
            .send(request.msg_id(), request.payload())
            .await
        {
            error!("echo reply failed: {}", err);
        }
    }
}

fn main() -> NetResult<()> {
    dotenv().ok();

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    let _log_guard = setup_tracing();

    //setup config
    let commandline: CommandLine = CommandLine::parse();
    let config_path = commandline.conf.as_ref().map_or_else(
        || {
            let mut path = PathBuf::from("./");
            path.push("conf.toml");
            path
        },
        PathBuf::from,
    );
    let server_config = ServerConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", server_config);
        return Ok(());
    }

    let server = Server::new(server_config, Arc::new(EchoHandler));
    rt.block_on(server.serve())?;

    Ok(())
}
