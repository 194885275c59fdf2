use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley_gateway::{Config, Daemon};

/// Parley - turn and dispatch coordinator for a voice proxy
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "PARLEY_PORT")]
    port: Option<u16>,

    /// Main agent base URL (overrides config)
    #[arg(long, env = "PARLEY_AGENT_URL")]
    agent_url: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved configuration
    Config,
    /// Print the coordinator state of a running gateway
    State,
    /// Send a raw JSON event to a running gateway
    Send {
        /// Event payload, e.g. '{"type":"command","kind":"queue"}'
        payload: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,parley_gateway=info",
        1 => "info,parley_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.agent_url {
        config.agent.url = Some(url);
        config.validate()?;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Config => {
                print_config(&config);
                Ok(())
            }
            Command::State => cmd_state(&config).await,
            Command::Send { payload } => cmd_send(&config, payload).await,
        };
    }

    tracing::info!(
        addr = %config.bind_addr(),
        agent = config.agent.url.as_deref().unwrap_or("<unconfigured>"),
        "starting parley gateway"
    );

    Daemon::new(config).run().await?;
    Ok(())
}

fn print_config(config: &Config) {
    let path = parley_gateway::config::file::config_file_path()
        .map_or_else(|| "<none>".to_string(), |p| p.display().to_string());

    println!("config file:       {path}");
    println!("listen:            {}", config.bind_addr());
    println!("dispatch delay:    {}s", config.dispatch.delay.as_secs());
    println!("require brief:     {}", config.dispatch.require_brief);
    println!("max attempts:      {}", config.dispatch.max_dispatch_attempts);
    println!("brief max chars:   {}", config.dispatch.brief_max_chars);
    println!("tick interval:     {}ms", config.dispatch.tick_interval.as_millis());
    println!(
        "agent url:         {}",
        config.agent.url.as_deref().unwrap_or("<unconfigured>")
    );
    println!(
        "agent token:       {}",
        if config.agent.token.is_some() { "<set>" } else { "<none>" }
    );
    println!("agent timeout:     {}s", config.agent.timeout.as_secs());
}

fn local_url(config: &Config, path: &str) -> String {
    let host = match config.server.host.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        host => host,
    };
    format!("http://{host}:{}{path}", config.server.port)
}

async fn cmd_state(config: &Config) -> anyhow::Result<()> {
    let state: serde_json::Value = reqwest::get(local_url(config, "/api/state"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn cmd_send(config: &Config, payload: String) -> anyhow::Result<()> {
    let response = reqwest::Client::new()
        .post(local_url(config, "/api/events"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(payload)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        anyhow::bail!("gateway returned {status}: {body}");
    }
    println!("{body}");
    Ok(())
}
