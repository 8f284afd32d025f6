use std::net::SocketAddr;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use futures::{StreamExt, TryStreamExt};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{error, info, info_span, trace, Instrument};
use tracing_subscriber::EnvFilter;

use simplesocks::config::ServerConfig;
use simplesocks::forward;
use simplesocks::socks::Credentials;

#[derive(Parser, Debug)]
#[command(name = "simplesocks")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to accept proxy clients on
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: SocketAddr,

    /// Require username/password authentication with this username
    #[arg(short, long, requires = "password")]
    username: Option<String>,

    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Refuse SOCKS4 and SOCKS4a clients
    #[arg(long)]
    no_socks4: bool,

    /// More output, repeat for trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                ServerConfig::with_credentials(Credentials::new(username, password)?)
            }
            _ => ServerConfig::default(),
        };
        config.allow_socks4 &= !self.no_socks4;
        config.validate()?;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let format = tracing_subscriber::fmt::format()
        .without_time()
        .with_level(false)
        .with_target(false)
        .pretty()
        .with_source_location(false);
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(filter)
        .init();

    let config = Arc::new(args.server_config()?);

    let socket = TcpListener::bind(args.listen).await?;

    info!(address = ?socket.local_addr()?, "Bound, Ctrl+C to stop");

    TcpListenerStream::new(socket)
        .take_until(tokio::signal::ctrl_c())
        .try_for_each(|client_conn| {
            let config = config.clone();
            async move {
                let _connection_span = info_span!(
                    "connection",
                    peer_addr = client_conn.peer_addr()?.to_string()
                )
                .entered();
                trace!("accepted new connection");

                tokio::spawn(
                    async move {
                        if let Err(e) = forward::serve(client_conn, config).await {
                            error!(
                                error = e.as_ref() as &dyn std::error::Error,
                                "failed to forward connection"
                            );
                        }
                    }
                    .in_current_span(),
                );

                Ok(())
            }
        })
        .await?;

    Ok(())
}
