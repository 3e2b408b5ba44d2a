//! Calls the PingPong service through either surface of the gateway.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use rpc_gateway::net::tls::DialOptions;
use rpc_gateway::rpc::{CallContext, LoopbackEngine, MethodDescriptor, RpcCall, RpcEngine};
use rpc_gateway::services::pingpong;

#[derive(Parser)]
#[command(name = "pingpong-client")]
#[command(about = "Call the PingPong service over REST or native RPC", long_about = None)]
struct Cli {
    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// PEM certificate the gateway serves.
    #[arg(short, long, default_value = "cert.pem")]
    cert: PathBuf,

    #[arg(long, value_enum, default_value_t = Protocol::Rest)]
    protocol: Protocol,

    /// Call deadline in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Protocol {
    Rest,
    Rpc,
}

#[derive(Subcommand)]
enum Commands {
    /// Ping with a sender name
    Ping {
        #[arg(short, long, default_value = "John")]
        sender: String,
    },
    /// Ask for the fixed greeting
    Pong,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cert = std::fs::read(&cli.cert)?;
    let timeout = cli.timeout_ms.map(Duration::from_millis);

    let (descriptor, message) = match &cli.command {
        Commands::Ping { sender } => (pingpong::ping_descriptor(), json!({ "sender": sender })),
        Commands::Pong => (pingpong::no_ping_descriptor(), json!({})),
    };

    let start = Instant::now();
    let reply = match cli.protocol {
        Protocol::Rest => call_rest(&cli, &cert, &descriptor, message, timeout).await?,
        Protocol::Rpc => call_rpc(&cli, &cert, descriptor, message, timeout).await?,
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);
    eprintln!("completed in {:?}", start.elapsed());
    Ok(())
}

async fn call_rest(
    cli: &Cli,
    cert: &[u8],
    descriptor: &MethodDescriptor,
    message: Value,
    timeout: Option<Duration>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut builder = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(cert)?)
        .tls_built_in_root_certs(false);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build()?;

    let base = format!("https://{}:{}/pingpong", cli.host, cli.port);
    let request = if descriptor.method == pingpong::PING {
        client.post(format!("{}/ping", base)).json(&message)
    } else {
        client.get(format!("{}/pong", base))
    };

    let response = request.send().await?;
    let status = response.status();
    let body: Value = response.json().await?;
    if !status.is_success() {
        return Err(format!("gateway returned {}: {}", status, body).into());
    }
    Ok(body)
}

async fn call_rpc(
    cli: &Cli,
    cert: &[u8],
    descriptor: MethodDescriptor,
    message: Value,
    timeout: Option<Duration>,
) -> Result<Value, Box<dyn std::error::Error>> {
    let dial = DialOptions::trusting_pem(cert, &cli.host, cli.port)?;
    let engine = LoopbackEngine::new(dial, [descriptor.clone()]);

    let mut ctx = CallContext::default();
    if let Some(timeout) = timeout {
        ctx = ctx.with_timeout(timeout);
    }

    let outcome = engine.dispatch(RpcCall::new(&descriptor, message), &ctx).await;
    for (key, value) in outcome.header.iter() {
        eprintln!("header {}: {}", key, value);
    }
    for (key, value) in outcome.trailer.iter() {
        eprintln!("trailer {}: {}", key, value);
    }
    Ok(outcome.result?)
}
