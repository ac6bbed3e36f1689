//! Signature verification against an ordered set of keyrings.

use debhist_core::diagnostics::{Diagnostics, tracing_diagnostics};
use debhist_core::{SigInfo, count_signature_blocks};
use std::sync::Arc;

use crate::backend::CryptoBackend;
use crate::error::VerifyError;
use crate::keyring::{KeyringSet, MISSING_KEYRINGS_HINT};
use crate::status::{StatusReport, ValidSig};

/// Finds the keyring that validates a signed document and describes the
/// signature.
pub struct SignatureVerifier<B> {
    backend: B,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<B: CryptoBackend> SignatureVerifier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            diagnostics: tracing_diagnostics(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verify `document` with the first keyring of `keyrings` that accepts it.
    ///
    /// `description` names the document in error messages, e.g. the file
    /// name of a `.dsc`.
    #[tracing::instrument(
        skip(self, keyrings, document),
        fields(doc_len = document.len(), keyrings = keyrings.len())
    )]
    pub fn verify(
        &self,
        keyrings: &KeyringSet,
        document: &[u8],
        description: &str,
    ) -> Result<SigInfo, VerifyError> {
        if count_signature_blocks(document) > 1 {
            self.diagnostics.warn(&format!(
                "{description} carries more than one signature block, only one is checked"
            ));
        }

        let mut accepted = None;
        let mut last = None;
        for keyring in keyrings {
            tracing::debug!(keyring = %keyring.name, "Trying keyring");
            let report = match self.backend.evaluate(document, keyring) {
                Ok(report) => report,
                Err(e) => {
                    self.diagnostics.debug(&format!(
                        "Keyring {} could not be checked: {e:#}",
                        keyring.name
                    ));
                    StatusReport::new(Vec::new(), format!("{e:#}"))
                }
            };
            if report.valid() {
                accepted = Some((keyring, report));
                break;
            }
            self.diagnostics.debug(&format!(
                "Keyring {} did not validate {description}: {report}",
                keyring.name
            ));
            last = Some(report);
        }

        let Some((keyring, report)) = accepted else {
            let no_pubkey = last.as_ref().is_some_and(StatusReport::has_no_pubkey);
            if keyrings.missing() && (no_pubkey || last.is_none()) {
                self.diagnostics.warn(MISSING_KEYRINGS_HINT);
            }
            let detail = last.map_or_else(
                || "no keyrings available".to_string(),
                |report| report.to_string(),
            );
            return Err(VerifyError::NoValidSignature {
                description: description.to_string(),
                detail,
                no_pubkey,
            });
        };

        let Some((sig_type, key_id, uid)) = report.classification() else {
            return Err(VerifyError::NotGoodSignature {
                description: description.to_string(),
                detail: report.to_string(),
            });
        };

        let cleartext = self.backend.decrypt(document, keyring).map_err(|source| {
            tracing::error!(
                keyring = %keyring.name,
                error = %source,
                "Keyring validated the signature but cleartext extraction failed"
            );
            VerifyError::BackendInvariant {
                description: description.to_string(),
                keyring: keyring.name.clone(),
                source: source.into(),
            }
        })?;

        let sig_ts = report
            .valid_sig()
            .and_then(ValidSig::signed_at)
            .ok_or_else(|| VerifyError::MalformedStatus {
                description: description.to_string(),
                detail: report.to_string(),
            })?;

        tracing::info!(
            keyring = %keyring.name,
            key_id = %key_id,
            sig_type = %sig_type,
            "Signature verified"
        );

        Ok(SigInfo {
            kr_name: keyring.name.clone(),
            key_id: key_id.to_string(),
            uid: uid.to_string(),
            sig_ts,
            sig_type,
            cleartext,
        })
    }
}
