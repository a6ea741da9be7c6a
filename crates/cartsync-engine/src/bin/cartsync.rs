//! # cartsync CLI
//!
//! Drives a SyncEngine from the shell and prints the resulting snapshot.
//!
//! ## Usage
//! ```bash
//! # Guest cart in the default data directory
//! cartsync add 64f1c0ffee 2
//! cartsync show
//!
//! # Signed-in cart on the shop API
//! cartsync --token "$TOKEN" update 64f1c0ffee 3
//!
//! # Explicit config file
//! cartsync --config ./cartsync.toml wish 64f1c0ffee
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter); the snapshot
//! JSON goes to stdout.

use std::env;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use cartsync::{AuthSignal, EngineConfig, EngineError, SyncEngine};

fn print_help() {
    println!("cartsync - cart and wishlist sync");
    println!();
    println!("Usage: cartsync [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("Commands:");
    println!("  show                 Print cart and wishlist");
    println!("  add <ID> [QTY]       Add QTY (default 1) of a product");
    println!("  update <ID> <QTY>    Set a line's quantity");
    println!("  remove <ID>          Remove a product's line");
    println!("  clear                Empty the cart");
    println!("  wish <ID>            Add a product to the wishlist");
    println!("  unwish <ID>          Remove a product from the wishlist");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Config file (default: platform config dir)");
    println!("  -t, --token <TOKEN>  Bearer token; signs in to the shop API");
    println!("  -h, --help           Show this help message");
}

/// Initializes the tracing subscriber for structured logging.
///
/// - `RUST_LOG=debug` - Show debug messages
/// - Default: INFO, DEBUG for cartsync
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cartsync=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn usage_error(message: &str) -> Box<dyn std::error::Error> {
    Box::new(EngineError::Validation(message.to_string()))
}

fn arg<'a>(
    rest: &'a [String],
    index: usize,
    name: &str,
) -> Result<&'a str, Box<dyn std::error::Error>> {
    rest.get(index)
        .map(String::as_str)
        .ok_or_else(|| usage_error(&format!("missing <{}>", name)))
}

/// The value following the flag at `args[index]`.
fn flag_value<'a>(
    args: &'a [String],
    index: usize,
    flag: &str,
) -> Result<&'a str, Box<dyn std::error::Error>> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| usage_error(&format!("{} requires a value", flag)))
}

fn quantity(raw: &str) -> Result<i64, Box<dyn std::error::Error>> {
    raw.parse::<i64>()
        .map_err(|_| usage_error(&format!("quantity must be an integer, got '{}'", raw)))
}

/// Parsed command line.
#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    token: Option<String>,
    help: bool,
    /// Command and its positional arguments.
    rest: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, Box<dyn std::error::Error>> {
    let mut parsed = CliArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                parsed.config_path = Some(PathBuf::from(flag_value(args, i, "--config")?));
                i += 1;
            }
            "--token" | "-t" => {
                parsed.token = Some(flag_value(args, i, "--token")?.to_string());
                i += 1;
            }
            "--help" | "-h" => parsed.help = true,
            other => parsed.rest.push(other.to_string()),
        }
        i += 1;
    }

    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let CliArgs {
        config_path,
        token,
        help,
        rest,
    } = parse_args(&args)?;

    if help {
        print_help();
        return Ok(());
    }

    let Some(command) = rest.first().cloned() else {
        print_help();
        return Ok(());
    };

    init_tracing();

    let config = EngineConfig::load(config_path)?;
    let signal = AuthSignal::from_token(token.or_else(|| config.remote.auth_token.clone()));
    let engine = SyncEngine::from_config(&config, signal)?;

    engine.refresh().await?;

    match command.as_str() {
        "show" => {}
        "add" => {
            let id = arg(&rest, 1, "ID")?;
            match rest.get(2) {
                Some(raw) => engine.add_item_quantity(id, quantity(raw)?).await?,
                None => engine.add_item(id).await?,
            }
        }
        "update" => {
            let id = arg(&rest, 1, "ID")?;
            let qty = quantity(arg(&rest, 2, "QTY")?)?;
            engine.update_quantity(id, qty).await?;
        }
        "remove" => engine.remove_item(arg(&rest, 1, "ID")?).await?,
        "clear" => engine.clear_cart().await?,
        "wish" => engine.add_wishlist(arg(&rest, 1, "ID")?).await?,
        "unwish" => engine.remove_wishlist(arg(&rest, 1, "ID")?).await?,
        other => {
            print_help();
            return Err(usage_error(&format!("unknown command '{}'", other)));
        }
    }

    println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);
    Ok(())
}
