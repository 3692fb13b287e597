//! `FieldCrypt` CLI for key generation, migration and validation.

#![warn(clippy::pedantic, clippy::nursery)]

mod report;
mod settings;
mod snapshot;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use fieldcrypt::codec::{FieldCodec, FieldCrypto};
use fieldcrypt::keys::{KeyMaterial, BLIND_INDEX_KEY_NAME, ENCRYPTION_KEY_NAME};
use fieldcrypt::migration::{MigrationEngine, Mode, DEFAULT_VERIFY_SAMPLE};
use fieldcrypt::schema::TableSpec;
use fieldcrypt::validation::{Selector, Validator, DEFAULT_LIMIT};
use fieldcrypt_key_file::{generate_key_pair, FileKeyProvider};
use settings::Settings;
use snapshot::SnapshotStore;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fieldcrypt")]
#[command(about = "FieldCrypt key generation, migration and validation CLI", long_about = None)]
struct Cli {
    /// Read keys from encryption.key and blind_index.key in this directory
    /// instead of ENCRYPTION_KEY and BLIND_INDEX_KEY
    #[arg(long, global = true)]
    key_dir: Option<PathBuf>,

    /// JSON store snapshot (defaults to STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh pair of keys
    Keygen {
        /// Write the keys into this directory instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Encrypt plaintext rows in place
    Migrate {
        /// Report what would change without writing
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Rows per table to validate after a live run
        #[arg(long, default_value_t = DEFAULT_VERIFY_SAMPLE)]
        verify_sample: usize,
        /// Skip the post-migration check
        #[arg(long, conflicts_with = "verify_sample")]
        no_verify: bool,
    },
    /// Decrypt stored rows and check their blind indexes
    Validate(ValidateArgs),
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["user_id", "user_email", "entry_id", "all_users", "all_entries"]),
))]
struct ValidateArgs {
    /// Validate one user by id
    #[arg(long)]
    user_id: Option<i64>,
    /// Find a user through the email blind index
    #[arg(long)]
    user_email: Option<String>,
    /// Validate one journal entry by id
    #[arg(long)]
    entry_id: Option<i64>,
    /// Validate every user
    #[arg(long)]
    all_users: bool,
    /// Validate the most recent journal entries
    #[arg(long)]
    all_entries: bool,
    /// Maximum rows for --all-users and --all-entries
    #[arg(long)]
    limit: Option<usize>,
}

impl ValidateArgs {
    fn target(self) -> (TableSpec, Selector) {
        if let Some(id) = self.user_id {
            (TableSpec::users(), Selector::Id(id))
        } else if let Some(email) = self.user_email {
            (TableSpec::users(), Selector::Search(email))
        } else if let Some(id) = self.entry_id {
            (TableSpec::journal_entries(), Selector::Id(id))
        } else if self.all_users {
            (TableSpec::users(), Selector::All { limit: self.limit })
        } else {
            let latest = Selector::Latest(self.limit.unwrap_or(DEFAULT_LIMIT));
            (TableSpec::journal_entries(), latest)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    init_logging(&settings.log_level)?;

    let store_path = cli.store.unwrap_or_else(|| settings.store_path.clone());

    match cli.command {
        Commands::Keygen { output } => keygen(output.as_deref()),
        Commands::Migrate {
            dry_run,
            verify_sample,
            no_verify,
        } => {
            let codec = load_codec(cli.key_dir.as_deref(), &settings)?;
            let mode = if dry_run { Mode::DryRun } else { Mode::Live };
            let sample = (!no_verify).then_some(verify_sample);
            migrate(codec, mode, sample, &store_path)
        }
        Commands::Validate(args) => {
            let codec = load_codec(cli.key_dir.as_deref(), &settings)?;
            validate(&codec, args, &store_path)
        }
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid LOG_LEVEL: {level}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))
}

fn load_codec(key_dir: Option<&Path>, settings: &Settings) -> Result<FieldCodec> {
    let keys = match key_dir {
        Some(dir) => KeyMaterial::from_provider(&FileKeyProvider::new(dir)?),
        None => KeyMaterial::from_provider(settings),
    }
    .context("failed to load keys")?;

    Ok(FieldCodec::new(&keys)?)
}

fn keygen(output: Option<&Path>) -> Result<()> {
    if let Some(dir) = output {
        FileKeyProvider::init(dir)
            .with_context(|| format!("failed to write keys to {}", dir.display()))?;
        info!(key_dir = %dir.display(), "keys written");
        println!("Keys written to {}", dir.display());
        return Ok(());
    }

    let (encryption_key, blind_index_key) = generate_key_pair();
    println!("{ENCRYPTION_KEY_NAME}={}", encryption_key.as_str());
    println!("{BLIND_INDEX_KEY_NAME}={}", blind_index_key.as_str());
    Ok(())
}

fn migrate<C: FieldCrypto>(
    codec: C,
    mode: Mode,
    verify_sample: Option<usize>,
    store_path: &Path,
) -> Result<()> {
    let mut store = SnapshotStore::open(store_path)?;
    let engine = MigrationEngine::new(codec, mode).with_verify_sample(verify_sample);

    let summary = engine.run(&mut store, &[TableSpec::users(), TableSpec::journal_entries()]);
    print!("{}", report::MigrationView(&summary));

    if mode == Mode::Live {
        store.save()?;
        info!(path = %store.path().display(), "store snapshot updated");
    }

    if let Some(err) = summary.abort_error() {
        anyhow::bail!("migration aborted: {err}");
    }
    let unverified = summary
        .verification
        .iter()
        .any(|check| !matches!(check, Ok(sample) if sample.is_clean()));
    if unverified {
        warn!("post-migration check found rows that do not verify");
    }
    Ok(())
}

fn validate(codec: &FieldCodec, args: ValidateArgs, store_path: &Path) -> Result<()> {
    let mut store = SnapshotStore::open(store_path)?;
    let (table, selector) = args.target();

    let outcome = Validator::new(codec).validate(&mut store, &table, &selector)?;
    print!("{}", report::ValidationView(&outcome));
    Ok(())
}
