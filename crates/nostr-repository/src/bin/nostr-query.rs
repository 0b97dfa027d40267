use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nostr_repository::{
    trust_from_name, Filter, NostrEvent, QueryOptions, Repository, RepositoryConfig,
};

#[derive(Debug, Parser)]
#[command(name = "nostr-query")]
#[command(about = "Load Nostr events from JSON lines and run NIP-01 filters over them")]
struct Args {
    /// JSON-lines file of events; `-` reads stdin.
    #[arg(long, default_value = "-")]
    input: PathBuf,
    /// NIP-01 filter as JSON. Repeat to union several filters.
    #[arg(long = "filter", default_value = "{}")]
    filters: Vec<String>,
    #[arg(long)]
    include_deleted: bool,
    /// none, id or signature. Overrides NOSTR_REPOSITORY_TRUST.
    #[arg(long)]
    trust: Option<String>,
    /// Overrides NOSTR_REPOSITORY_CHUNK_SIZE.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Print every stored event instead of querying.
    #[arg(long)]
    dump: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let mut config = RepositoryConfig::from_env()?;
    if let Some(name) = &args.trust {
        config = config.with_trust(trust_from_name(name)?);
    }
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }

    let filters = args
        .filters
        .iter()
        .map(|raw| serde_json::from_str::<Filter>(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let events = read_events(&args.input)?;
    let repository = Repository::new(config);
    let stats = repository.load(events).await?;
    info!(
        stored = repository.len(),
        accepted = stats.accepted,
        "Repository ready"
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if args.dump {
        for event in repository.dump() {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
    } else {
        let options = QueryOptions {
            include_deleted: args.include_deleted,
        };
        for event in repository.query_with(&filters, options) {
            writeln!(out, "{}", serde_json::to_string(event.as_ref())?)?;
        }
    }
    out.flush()?;

    Ok(())
}

fn read_events(path: &Path) -> io::Result<Vec<NostrEvent>> {
    let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(path)?))
    };

    let mut events = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<NostrEvent>(&line) {
            Ok(event) => events.push(event),
            Err(err) => warn!(line = number + 1, error = %err, "Skipping malformed event"),
        }
    }
    Ok(events)
}
