use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::Context;
use cairn_store::{Score, Store, StoreConfig};
use colored::Colorize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::New => cmd_new(&config, cli.format),
        Command::Put(args) => cmd_put(&config, args, cli.format),
        Command::Get(args) => cmd_get(&config, args),
        Command::Stat(args) => cmd_stat(&config, args, cli.format),
        Command::Rebuild(args) => cmd_rebuild(&config, args),
        Command::Delete(args) => cmd_delete(&config, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    Ok(config)
}

fn cmd_new(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = Store::new(config)?;
    match format {
        OutputFormat::Text => println!("{} Created store {}", "✓".green().bold(), store.name().bold()),
        OutputFormat::Json => println!("{}", serde_json::json!({ "name": store.name() })),
    }
    store.close()?;
    Ok(())
}

fn cmd_put(config: &StoreConfig, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = read_input(args.file.as_deref())?;
    let store = Store::open(&args.store, config)?;
    let score = store.write(&data)?;
    match format {
        OutputFormat::Text => println!("{}", score.to_hex().yellow()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "score": score.to_hex(), "bytes": data.len() })
        ),
    }
    store.close()?;
    Ok(())
}

fn cmd_get(config: &StoreConfig, args: GetArgs) -> anyhow::Result<()> {
    let score: Score = args
        .score
        .parse()
        .with_context(|| format!("invalid score {:?}", args.score))?;
    let store = Store::open(&args.store, config)?;
    let data = store.read(&score)?;
    store.close()?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

fn cmd_stat(config: &StoreConfig, args: StoreArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = Store::open(&args.store, config)?;
    let records = store.len()?;
    let bytes = store.data_size()?;
    match format {
        OutputFormat::Text => {
            println!("Store {}", store.name().bold());
            println!("  Records: {}", records.to_string().cyan());
            println!("  Data: {} bytes", bytes.to_string().cyan());
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "name": store.name(), "records": records, "bytes": bytes })
        ),
    }
    store.close()?;
    Ok(())
}

fn cmd_rebuild(config: &StoreConfig, args: StoreArgs) -> anyhow::Result<()> {
    let store = Store::open(&args.store, config)?;
    let records = store.rebuild_index()?;
    store.close()?;
    println!("{} Rebuilt index: {} records", "✓".green().bold(), records);
    Ok(())
}

fn cmd_delete(config: &StoreConfig, args: StoreArgs) -> anyhow::Result<()> {
    let store = Store::open(&args.store, config)?;
    store.delete()?;
    println!("{} Deleted store {}", "✓".green().bold(), args.store.bold());
    Ok(())
}

fn read_input(file: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) if path != Path::new("-") => {
            fs::read(path).with_context(|| format!("reading {}", path.display()))
        }
        _ => {
            let mut data = Vec::new();
            io::stdin().lock().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}
