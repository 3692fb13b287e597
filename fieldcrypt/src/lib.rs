//! # `FieldCrypt`
//!
//! Searchable field-level encryption for relational columns, with an
//! in-place migration from plaintext and a read-only audit tool.
//!
//! ## Features
//!
//! - AES-256-GCM field encryption with a fresh nonce per value
//! - HMAC-SHA256 blind indexes for equality lookups
//! - Idempotent, transactional plaintext-to-ciphertext migration
//! - Validation of stored ciphertext against its blind index
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldcrypt::prelude::*;
//!
//! let keys = KeyMaterial::from_provider(&provider)?;
//! let codec = FieldCodec::new(&keys)?;
//!
//! let email = codec.encrypt_with_index("alice@example.com")?;
//! let plaintext = codec.decrypt(&email.ciphertext)?;
//!
//! let engine = MigrationEngine::new(codec, Mode::Live);
//! let summary = engine.run(&mut store, &[TableSpec::users(), TableSpec::journal_entries()]);
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod blind_index;
pub mod cipher;
pub mod codec;
pub mod error;
pub mod keys;
mod memory;
pub mod migration;
pub mod schema;
pub mod store;
pub mod validation;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::codec::{FieldCodec, FieldCrypto, IndexedField};
    pub use crate::error::{Error, KeyProviderError, StoreError};
    pub use crate::keys::{KeyMaterial, KeyProvider};
    pub use crate::migration::{MigrationEngine, MigrationSummary, Mode, PassReport};
    pub use crate::schema::{FieldSpec, TableSpec};
    pub use crate::store::{MemoryStore, Predicate, Query, Row, RowStore};
    pub use crate::validation::{Selector, ValidationReport, Validator};
}
