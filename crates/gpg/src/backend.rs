//! The cryptographic primitives the verifier relies on.

use anyhow::Result;

use crate::keyring::Keyring;
use crate::status::StatusReport;

/// Signature checking and cleartext extraction against a single keyring.
///
/// `Err` is reserved for failures to run the check at all (missing program,
/// unreadable keyring, timeout). A signature that does not verify is an
/// `Ok` report without `GOODSIG`/`VALIDSIG`.
pub trait CryptoBackend {
    /// Check the signature of `document` using only the keys in `keyring`.
    fn evaluate(&self, document: &[u8], keyring: &Keyring) -> Result<StatusReport>;

    /// Extract the signed payload of `document`.
    fn decrypt(&self, document: &[u8], keyring: &Keyring) -> Result<Vec<u8>>;
}

impl<B: CryptoBackend + ?Sized> CryptoBackend for &B {
    fn evaluate(&self, document: &[u8], keyring: &Keyring) -> Result<StatusReport> {
        (**self).evaluate(document, keyring)
    }

    fn decrypt(&self, document: &[u8], keyring: &Keyring) -> Result<Vec<u8>> {
        (**self).decrypt(document, keyring)
    }
}

impl<B: CryptoBackend + ?Sized> CryptoBackend for Box<B> {
    fn evaluate(&self, document: &[u8], keyring: &Keyring) -> Result<StatusReport> {
        (**self).evaluate(document, keyring)
    }

    fn decrypt(&self, document: &[u8], keyring: &Keyring) -> Result<Vec<u8>> {
        (**self).decrypt(document, keyring)
    }
}
