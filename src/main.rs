use anyhow::{Result, anyhow, bail};
use replicated_kv::client::KvClient;
use replicated_kv::config::{CoordinatorConfig, ReplicaConfig};
use replicated_kv::node::{MasterNode, ReplicaNode};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn print_usage(program: &str) {
    eprintln!("Usage:");
    eprintln!(
        "  {} master [--config <file>] [--registration <addr:port>] [--http <addr:port>] [--timeout-ms <n>]",
        program
    );
    eprintln!(
        "  {} replica --id <n> [--config <file>] [--bind <addr:port>] [--advertise <host>] [--master <addr:port>] [--log <file>] [--snapshot <file>] [--latency-ms <n>]",
        program
    );
    eprintln!(
        "  {} client [--master <addr:port>] put <key> <value> | get <key> | delete <key> | replicas | cache | ignore-next <id>",
        program
    );
    eprintln!("Example: {} master --registration 127.0.0.1:9090 --http 127.0.0.1:8080", program);
    eprintln!(
        "Example: {} replica --id 10 --bind 127.0.0.1:9101 --master 127.0.0.1:9090 --log ./data/r10.log",
        program
    );
}

/// Splits `--flag value` pairs from positional arguments.
fn parse_flags(args: &[String]) -> Result<(HashMap<String, String>, Vec<String>)> {
    let mut flags = HashMap::new();
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        if let Some(name) = arg.strip_prefix("--") {
            let value = args
                .get(i + 1)
                .ok_or_else(|| anyhow!("--{} needs a value", name))?;
            flags.insert(name.to_string(), value.clone());
            i += 2;
        } else {
            positional.push(arg.clone());
            i += 1;
        }
    }

    Ok((flags, positional))
}

async fn run_master(flags: HashMap<String, String>) -> Result<()> {
    let mut config = match flags.get("config") {
        Some(path) => CoordinatorConfig::load(path).map_err(|e| anyhow!(e))?,
        None => CoordinatorConfig::default(),
    };
    if let Some(addr) = flags.get("registration") {
        config.registration_addr = addr.clone();
    }
    if let Some(addr) = flags.get("http") {
        config.http_addr = addr.clone();
    }
    if let Some(ms) = flags.get("timeout-ms") {
        config.timeout_ms = ms.parse()?;
    }

    let master = MasterNode::start(&config).await?;
    tracing::info!(
        "Master ready: registration on {}, HTTP on {}",
        master.registration_addr(),
        master.http_addr()
    );
    tracing::info!("Press Ctrl+C to shutdown");

    master.wait().await
}

async fn run_replica(flags: HashMap<String, String>) -> Result<()> {
    let mut config = match (flags.get("config"), flags.get("id")) {
        (Some(path), _) => ReplicaConfig::load(path).map_err(|e| anyhow!(e))?,
        (None, Some(id)) => ReplicaConfig::new(id.parse()?),
        (None, None) => bail!("replica needs --id or --config"),
    };
    if let Some(id) = flags.get("id") {
        config.id = id.parse()?;
    }
    if let Some(addr) = flags.get("bind") {
        config.bind_addr = addr.clone();
    }
    if let Some(host) = flags.get("advertise") {
        config.advertise_host = host.clone();
    }
    if let Some(addr) = flags.get("master") {
        config.master_addr = addr.clone();
    }
    if let Some(path) = flags.get("log") {
        config.log_path = PathBuf::from(path);
    }
    if let Some(path) = flags.get("snapshot") {
        config.snapshot_path = Some(PathBuf::from(path));
    }
    if let Some(ms) = flags.get("latency-ms") {
        config.store_latency_ms = ms.parse()?;
    }

    let mut replica = ReplicaNode::start(&config).await?;
    tracing::info!("Replica {} ready", replica.info());
    tracing::info!("Press Ctrl+C to shutdown");

    tokio::select! {
        result = replica.stopped() => return result,
        signal = tokio::signal::ctrl_c() => signal?,
    }

    tracing::info!("Shutting down replica {}", replica.info());
    replica.shutdown();
    if let Some(path) = &config.snapshot_path {
        replica.dump_snapshot(path).await?;
    }
    Ok(())
}

async fn run_client(flags: HashMap<String, String>, command: &[String]) -> Result<()> {
    let master = flags
        .get("master")
        .map(String::as_str)
        .unwrap_or("127.0.0.1:8080");
    let client = KvClient::new(master, Duration::from_secs(10))?;

    let arg = |i: usize| {
        command
            .get(i)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing argument {} for client command", i))
    };

    match arg(0)? {
        "put" => {
            let response = client.put(arg(1)?, arg(2)?).await?;
            report(response.success, response.message)
        }
        "get" => match client.get(arg(1)?).await? {
            Some(value) => {
                println!("{}", value);
                Ok(())
            }
            None => bail!("Does not exist"),
        },
        "delete" => {
            let response = client.delete(arg(1)?).await?;
            report(response.success, response.message)
        }
        "replicas" => {
            for replica in client.replicas().await? {
                println!("{}", replica);
            }
            Ok(())
        }
        "cache" => {
            let sets = client.cache_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&sets)?);
            Ok(())
        }
        "ignore-next" => {
            let response = client.ignore_next(arg(1)?.parse()?).await?;
            report(response.success, response.message)
        }
        other => bail!("unknown client command {}", other),
    }
}

fn report(success: bool, message: Option<String>) -> Result<()> {
    if success {
        println!("Success");
        Ok(())
    } else {
        bail!("{}", message.unwrap_or_default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let (flags, positional) = parse_flags(&args[2..])?;

    match args[1].as_str() {
        "master" => run_master(flags).await,
        "replica" => run_replica(flags).await,
        "client" => run_client(flags, &positional).await,
        _ => {
            print_usage(&args[0]);
            std::process::exit(1);
        }
    }
}
