//! klv_dump - parse a raw KLV metadata file and print its items

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use tempest_kernel::{find_item, parse_klv, KlvBuffer, KlvKey, KLV_KEY_LEN};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// File containing raw KLV bytes.
    input: PathBuf,
    /// Only print the first item matching this 16-byte key (32 hex chars).
    #[arg(long)]
    key: Option<String>,
    /// Bytes of value to print per item.
    #[arg(long, default_value_t = 32)]
    value_bytes: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let data = std::fs::read(&args.input)
        .map_err(|e| anyhow!("read {}: {}", args.input.display(), e))?;
    let buffer = KlvBuffer::new(data, 0, 0);
    let items = parse_klv(&buffer)?;

    if let Some(raw_key) = args.key.as_deref() {
        let key = parse_key(raw_key)?;
        match find_item(&items, &key) {
            Some(item) => print_item(0, item, args.value_bytes),
            None => println!("key {} not present", key),
        }
        return Ok(());
    }

    println!("{} items in {} bytes", items.len(), buffer.len());
    for (idx, item) in items.iter().enumerate() {
        print_item(idx, item, args.value_bytes);
    }
    Ok(())
}

fn parse_key(raw: &str) -> Result<KlvKey> {
    let bytes = hex::decode(raw.trim()).map_err(|e| anyhow!("bad key hex: {}", e))?;
    let bytes: [u8; KLV_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| anyhow!("key must be exactly {} bytes", KLV_KEY_LEN))?;
    Ok(KlvKey::new(bytes))
}

fn print_item(idx: usize, item: &tempest_kernel::KlvItem<'_>, value_bytes: usize) {
    let shown = &item.value[..item.value.len().min(value_bytes)];
    let suffix = if item.value.len() > value_bytes {
        "..."
    } else {
        ""
    };
    println!(
        "[{:>3}] key={} len={:>5} value={}{}",
        idx,
        item.key,
        item.length,
        hex::encode(shown),
        suffix
    );
}
