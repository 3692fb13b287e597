//! Basic usage example for `FieldCrypt`.

use fieldcrypt::prelude::*;
use fieldcrypt_key_file::FileKeyProvider;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("FieldCrypt Basic Usage Example");
    println!("==============================\n");

    // Setup: create a key directory on first run
    let key_dir = PathBuf::from("./example_keys");
    if !key_dir.exists() {
        println!("Initializing key directory at {}...", key_dir.display());
        FileKeyProvider::init(&key_dir)?;
        println!("✓ Key directory initialized\n");
    }

    let provider = FileKeyProvider::new(&key_dir)?;
    let keys = KeyMaterial::from_provider(&provider)?;
    let codec = FieldCodec::new(&keys)?;
    println!("✓ Codec created with AES-256-GCM and HMAC-SHA256\n");

    // Encrypt a searchable field
    let email = codec.encrypt_with_index("alice@example.com")?;
    println!("Ciphertext:  {}", email.ciphertext);
    println!("Blind index: {}\n", email.blind_index);

    // A plaintext table, as it would look before migration
    let mut store = MemoryStore::new();
    store.insert("users", Row::new(1).with("email", "bob@example.com").with("goal", "run 5k"));
    store.insert("users", Row::new(2).with("email", "carol@example.com").with_null("goal"));
    store.insert("journal_entries", Row::new(1).with("topics", "running, sleep"));

    let tables = [TableSpec::users(), TableSpec::journal_entries()];

    // Preview, then migrate
    let preview = MigrationEngine::new(codec.clone(), Mode::DryRun).run(&mut store, &tables);
    for pass in &preview.passes {
        println!("[DRY RUN] {}: would migrate {} rows", pass.table, pass.counts.migrated);
    }

    let summary = MigrationEngine::new(codec.clone(), Mode::Live).run(&mut store, &tables);
    for pass in &summary.passes {
        println!("{}: migrated {} rows", pass.table, pass.counts.migrated);
    }
    println!();

    // Look a user up by email without decrypting the table
    let report = Validator::new(&codec).validate(
        &mut store,
        &TableSpec::users(),
        &Selector::Search("bob@example.com".to_string()),
    )?;
    for row in &report.rows {
        println!("Row {} verified: {}", row.id, row.is_verified());
        for (column, plaintext) in &row.decrypted {
            println!("  {column}: {plaintext}");
        }
    }

    println!("\n✓ Example completed successfully!");
    Ok(())
}
