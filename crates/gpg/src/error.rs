//! Signature verification errors.

/// Why a document could not be accepted.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// No keyring validated the document.
    #[error("No valid signature on {description} {detail}")]
    NoValidSignature {
        description: String,
        detail: String,
        /// The last check reported a missing public key.
        no_pubkey: bool,
    },

    /// The signature is valid but carries none of the recognised
    /// classifications.
    #[error("Not a good signature {detail}")]
    NotGoodSignature { description: String, detail: String },

    /// The backend accepted the signature but did not describe it.
    #[error("Malformed signature status for {description}: {detail}")]
    MalformedStatus { description: String, detail: String },

    /// Cleartext extraction failed after the same keyring validated the
    /// signature.
    #[error("Could not extract the cleartext of {description} with keyring {keyring}")]
    BackendInvariant {
        description: String,
        keyring: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
