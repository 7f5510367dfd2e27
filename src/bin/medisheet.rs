//! Command-line front end for the paid spreadsheet actions.
//!
//! Each invocation connects a wallet (JSON-RPC, or an offline JSON ledger with
//! `--offline`), refreshes the credit balance for the wallet's network and runs
//! one menu action against a sheet kept in a local file.

#[cfg(feature = "net")]
use medisheet::net::{parse_signing_key, HttpContentStore, RpcWallet};
use medisheet::{
    known_chain, network::chain_id_hex, spawn_chain_watcher,
    validate_name, ActionCoordinator, Address, ChainClient, Config, ContentStore, FileStore,
    LocalStore, MemoryContentStore, MemoryLedger, Menu, MenuItem, MenuOutcome, Prompt, SheetFile,
    TerminalPrompt, TokenAmount, DEFAULT_FILE,
};
#[cfg(feature = "net")]
use medisheet::config::ENV_PRIVATE_KEY;
#[cfg(feature = "net")]
use rpassword::prompt_password;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG: &str = "medisheet.json";
const OFFLINE_FALLBACK_CHAIN: u64 = 314;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: medisheet [--config <file>] [--offline <ledger.json>] [--verbose] <command> ...");
    println!("  networks");
    println!("  balance");
    println!("  print --sheet <file> [--out <file>]");
    println!("  save --file <name> --sheet <file>");
    println!("  save-as [--name <name>] --sheet <file>");
    println!("  new-file [--file <name>] --sheet <file>");
    println!("  files");
    println!("  validate-name <name>");
    println!("  watch");
    println!("  fund <amount>            (offline ledger only)");
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[derive(Debug, Default)]
struct Globals {
    config: Option<PathBuf>,
    offline: Option<PathBuf>,
    verbose: bool,
}

fn split_globals(args: Vec<String>) -> (Globals, Vec<String>) {
    let mut globals = Globals::default();
    let mut rest = Vec::new();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--config requires a path"));
                globals.config = Some(PathBuf::from(value));
            }
            "--offline" => {
                let value = iter
                    .next()
                    .unwrap_or_else(|| fatal("--offline requires a ledger path"));
                globals.offline = Some(PathBuf::from(value));
            }
            "--verbose" | "-v" => globals.verbose = true,
            _ => rest.push(arg),
        }
    }
    (globals, rest)
}

#[derive(Debug, Default)]
struct Flags {
    sheet: Option<PathBuf>,
    out: Option<PathBuf>,
    file: Option<String>,
    name: Option<String>,
}

fn parse_flags(command: &str, tail: Vec<String>) -> Flags {
    let mut flags = Flags::default();
    let mut iter = tail.into_iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .unwrap_or_else(|| fatal(&format!("{flag} requires a value")))
        };
        match arg.as_str() {
            "--sheet" => flags.sheet = Some(PathBuf::from(value("--sheet"))),
            "--out" => flags.out = Some(PathBuf::from(value("--out"))),
            "--file" => flags.file = Some(value("--file")),
            "--name" => flags.name = Some(value("--name")),
            other => fatal(&format!("unknown argument for {command}: {other}")),
        }
    }
    flags
}

fn require_sheet(command: &str, flags: &Flags) -> SheetFile {
    let path = flags
        .sheet
        .clone()
        .unwrap_or_else(|| fatal(&format!("{command} requires --sheet <file>")));
    SheetFile::new(path)
}

/// Answers the save-as prompt from `--name` when given, otherwise asks on the terminal.
struct PresetPrompt {
    answer: Option<String>,
}

impl Prompt for PresetPrompt {
    fn alert(&self, message: &str) {
        TerminalPrompt.alert(message);
    }

    fn prompt(&self, question: &str) -> Option<String> {
        match &self.answer {
            Some(answer) => Some(answer.clone()),
            None => TerminalPrompt.prompt(question),
        }
    }
}

struct Backends {
    chain: Arc<dyn ChainClient>,
    content: Arc<dyn ContentStore>,
    ledger: Option<Arc<MemoryLedger>>,
}

fn offline_backends(config: &Config, path: &Path) -> Backends {
    let default_chain = config
        .networks
        .iter()
        .next()
        .map(|profile| profile.chain_id)
        .unwrap_or(OFFLINE_FALLBACK_CHAIN);
    let ledger = MemoryLedger::open(path, Address::zero(), default_chain)
        .unwrap_or_else(|err| fatal(&format!("failed to open ledger {}: {err}", path.display())));
    let ledger = Arc::new(ledger);
    Backends {
        chain: ledger.clone(),
        content: Arc::new(MemoryContentStore::new()),
        ledger: Some(ledger),
    }
}

#[cfg(feature = "net")]
fn online_backends(config: &Config) -> Backends {
    let url = config
        .rpc_url
        .clone()
        .or_else(|| {
            config
                .networks
                .iter()
                .find_map(|profile| profile.rpc_endpoint().map(str::to_string))
        })
        .unwrap_or_else(|| fatal("no RPC endpoint configured; set MEDISHEET_RPC_URL or rpc_url"));
    let secret = match env::var(ENV_PRIVATE_KEY) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => prompt_password("Wallet private key: ")
            .unwrap_or_else(|err| fatal(&format!("failed to read private key: {err}"))),
    };
    let key = parse_signing_key(&secret).unwrap_or_else(|err| fatal(&format!("{err}")));
    let user_agent = config.app.user_agent();
    let wallet = RpcWallet::new(url, key, config.receipt, &user_agent)
        .unwrap_or_else(|err| fatal(&format!("failed to create wallet: {err}")));
    info!(account = %wallet.account(), url = wallet.url(), "wallet connected");
    let content = HttpContentStore::new(config.storage.endpoint.clone(), &user_agent)
        .unwrap_or_else(|err| fatal(&format!("failed to create storage client: {err}")));
    Backends {
        chain: Arc::new(wallet),
        content: Arc::new(content),
        ledger: None,
    }
}

#[cfg(not(feature = "net"))]
fn online_backends(_config: &Config) -> Backends {
    fatal("built without the `net` feature; pass --offline <ledger.json>")
}

fn backends(config: &Config, globals: &Globals) -> Backends {
    match &globals.offline {
        Some(path) => offline_backends(config, path),
        None => online_backends(config),
    }
}

fn coordinator(
    config: &Config,
    backends: &Backends,
    sheet: SheetFile,
    selected: &str,
) -> Arc<ActionCoordinator> {
    Arc::new(ActionCoordinator::new(
        backends.chain.clone(),
        backends.content.clone(),
        Arc::new(LocalStore::new(config.files_path.clone())),
        Arc::new(sheet),
        config.coordinator_settings(),
        selected,
    ))
}

async fn run_menu(config: &Config, globals: &Globals, command: &str, tail: Vec<String>) {
    let flags = parse_flags(command, tail);
    let sheet = require_sheet(command, &flags);
    let (item, selected) = match command {
        "print" => (MenuItem::Print, DEFAULT_FILE.to_string()),
        "save" => {
            let file = flags
                .file
                .clone()
                .unwrap_or_else(|| fatal("save requires --file <name>"));
            (MenuItem::Save, file)
        }
        "save-as" => (MenuItem::SaveAs, DEFAULT_FILE.to_string()),
        _ => (
            MenuItem::NewFile,
            flags.file.clone().unwrap_or_else(|| DEFAULT_FILE.to_string()),
        ),
    };
    let backends = backends(config, globals);
    let coordinator = coordinator(config, &backends, sheet, &selected);
    if let Err(err) = coordinator.refresh_balance().await {
        warn!(error = %err, "error fetching user tokens");
    }
    let prompt = Arc::new(PresetPrompt {
        answer: flags.name.clone(),
    });
    let menu = Menu::new(coordinator, prompt);
    info!("{}", menu.balance_label());

    match menu.run(item).await {
        Some(MenuOutcome::Printed(html)) => match &flags.out {
            Some(path) => {
                fs::write(path, html)
                    .unwrap_or_else(|err| fatal(&format!("failed to write {}: {err}", path.display())));
                println!("printable sheet written to {}", path.display());
            }
            None => print!("{html}"),
        },
        Some(MenuOutcome::Cancelled) => println!("save cancelled"),
        Some(MenuOutcome::NewFile) => println!("blank sheet opened as {DEFAULT_FILE}"),
        Some(MenuOutcome::Saved(_)) | Some(MenuOutcome::SavedAs { .. }) => {}
        None => std::process::exit(1),
    }
    println!("{}", menu.balance_label());
}

async fn cmd_balance(config: &Config, globals: &Globals) {
    let backends = backends(config, globals);
    let coordinator = coordinator(config, &backends, SheetFile::new(""), DEFAULT_FILE);
    let profile = coordinator
        .active_network()
        .await
        .unwrap_or_else(|err| fatal(&format!("{err}")));
    let balance = coordinator
        .refresh_balance()
        .await
        .unwrap_or_else(|err| fatal(&format!("error fetching user tokens: {err}")));
    println!(
        "{} ({}) account {}: {} tokens",
        profile.name,
        chain_id_hex(profile.chain_id),
        backends.chain.account(),
        balance.format_fixed(2)
    );
}

async fn cmd_watch(config: &Config, globals: &Globals) {
    let backends = backends(config, globals);
    let coordinator = coordinator(config, &backends, SheetFile::new(""), DEFAULT_FILE);
    let (chain_ids, watcher) = spawn_chain_watcher(backends.chain.clone(), config.watch_interval());
    println!("watching wallet network changes; press Ctrl-C to stop");
    let follower = coordinator.clone().follow_chain(chain_ids);
    if let Err(err) = follower.await {
        warn!(error = %err, "chain follower stopped");
    }
    watcher.abort();
}

async fn cmd_fund(config: &Config, globals: &Globals, tail: Vec<String>) {
    let amount = tail
        .first()
        .unwrap_or_else(|| fatal("Usage: medisheet --offline <ledger.json> fund <amount>"));
    let amount = TokenAmount::parse_ether(amount)
        .unwrap_or_else(|err| fatal(&format!("invalid amount `{amount}`: {err}")));
    let backends = backends(config, globals);
    let ledger = backends
        .ledger
        .clone()
        .unwrap_or_else(|| fatal("fund only works with --offline <ledger.json>"));
    let chain_id = backends
        .chain
        .chain_id()
        .await
        .unwrap_or_else(|err| fatal(&format!("{err}")));
    ledger
        .fund(chain_id, &backends.chain.account(), amount)
        .unwrap_or_else(|err| fatal(&format!("failed to fund ledger: {err}")));
    println!(
        "funded {} on {}: balance {}",
        backends.chain.account(),
        chain_id_hex(chain_id),
        ledger.balance_of(chain_id, &backends.chain.account())
    );
}

fn cmd_networks(config: &Config) {
    if config.networks.is_empty() {
        println!("no networks configured");
        return;
    }
    for profile in config.networks.iter() {
        let label = known_chain(profile.chain_id)
            .map(|chain| chain.label)
            .unwrap_or("custom");
        println!(
            "{:<22} {:<10} {:<24} token={} invoice={}",
            profile.name,
            chain_id_hex(profile.chain_id),
            label,
            profile.token_address,
            profile.invoice_address
        );
    }
}

fn cmd_files(config: &Config) {
    let store = LocalStore::new(config.files_path.clone());
    let files = store
        .list()
        .unwrap_or_else(|err| fatal(&format!("failed to read files: {err}")));
    if files.is_empty() {
        println!("no saved files");
    }
    for record in files {
        println!("{:<30} modified {}", record.name, record.modified.to_rfc3339());
    }
}

fn cmd_validate_name(tail: Vec<String>) {
    let name = tail.join(" ");
    if validate_name(&name) {
        println!("valid");
    } else {
        println!("invalid");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn main() {
    let (globals, args) = split_globals(env::args().skip(1).collect());
    init_logging(globals.verbose);
    let mut args = args.into_iter();
    let command = args.next();
    let tail: Vec<String> = args.collect();

    let config_path = globals
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = Config::load(&config_path).unwrap_or_else(|err| fatal(&format!("{err}")));

    match command.as_deref() {
        Some("networks") => cmd_networks(&config),
        Some("files") => cmd_files(&config),
        Some("validate-name") => cmd_validate_name(tail),
        Some("balance") => cmd_balance(&config, &globals).await,
        Some("watch") => cmd_watch(&config, &globals).await,
        Some("fund") => cmd_fund(&config, &globals, tail).await,
        Some(cmd @ ("print" | "save" | "save-as" | "new-file")) => {
            run_menu(&config, &globals, cmd, tail).await
        }
        Some("-h") | Some("--help") | Some("help") => print_help(),
        _ => {
            print_help();
            std::process::exit(1);
        }
    }
}
