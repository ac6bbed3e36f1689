//! OpenPGP signature verification of signed Debian documents against an
//! ordered set of keyrings, with gpgv or sequoia-openpgp as the backend.

pub mod backend;
pub mod error;
pub mod gpg;
pub mod keyring;
pub mod sequoia;
pub mod status;
pub mod verify;

#[cfg(test)]
mod testing;

pub use backend::CryptoBackend;
pub use error::VerifyError;
pub use gpg::GpgBackend;
pub use keyring::{
    Keyring, KeyringSet, MISSING_KEYRINGS_HINT, default_search_dirs, load_keyring_certs,
};
pub use sequoia::SequoiaBackend;
pub use status::{ErrSig, StatusRecord, StatusReport, ValidSig};
pub use verify::SignatureVerifier;
