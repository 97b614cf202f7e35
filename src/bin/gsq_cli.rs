use clap::Parser;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use config::{Config, Environment, File};
use gridsql::client::{RemoteClient, Statement};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// GridSQL CLI client: submits a statement, waits for completion, prints
/// the result rows and the captured execution log.
#[derive(Parser, Debug)]
#[command(name = "gsq_cli")]
#[command(about = "GridSQL command line client", long_about = None)]
struct Args {
    /// Server host
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Query timeout in seconds (0 = none)
    #[arg(short = 't', long, default_value_t = 0)]
    timeout: u64,

    /// Also print the operation's execution log
    #[arg(long)]
    logs: bool,

    /// SQL statements to execute, in order
    #[arg(required = true)]
    sql: Vec<String>,
}

/// Client configuration
#[derive(Debug, Deserialize)]
struct ClientConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
const fn default_port() -> u16 {
    7432
}

impl ClientConfig {
    /// Load configuration with priority: CLI args > ENV > config file > defaults
    fn load(args: &Args) -> Self {
        let config_paths = ["/etc/gridsql/gridsql.toml", "./gridsql.toml"];

        let mut builder = Config::builder();
        for path in &config_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
        builder = builder.add_source(Environment::with_prefix("GRIDSQL").separator("_"));

        let mut config = builder
            .build()
            .ok()
            .and_then(|c| c.try_deserialize::<Self>().ok())
            .unwrap_or_else(|| Self {
                host: default_host(),
                port: default_port(),
            });

        if let Some(host) = &args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        config
    }
}

fn print_rows(statement: &mut Statement<RemoteClient>, rows: Vec<gridsql::Row>) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    if let Some(schema) = statement.result_set().and_then(|rs| rs.schema()) {
        table.set_header(schema.column_names());
    }
    let count = rows.len();
    for row in rows {
        table.add_row(row.values.iter().map(|v| Cell::new(v.to_string())));
    }
    println!("{table}");
    println!("({count} row{})", if count == 1 { "" } else { "s" });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ClientConfig::load(&args);
    let addr = format!("{}:{}", config.host, config.port);

    let client = Arc::new(RemoteClient::connect(&addr).await?);
    let mut statement = Statement::new(client, Uuid::new_v4());
    statement.set_query_timeout(args.timeout);

    for sql in &args.sql {
        println!("> {sql}");
        match statement.execute(sql).await {
            Ok(true) => {
                let rows = match statement.result_set() {
                    Some(rs) => rs.collect_rows().await?,
                    None => Vec::new(),
                };
                print_rows(&mut statement, rows);
            }
            Ok(false) => println!("OK"),
            Err(err) => eprintln!("error: {err}"),
        }
        if args.logs {
            for line in statement.query_log(false, 1000).await? {
                println!("LOG: {line}");
            }
        }
    }

    statement.close().await?;
    Ok(())
}
