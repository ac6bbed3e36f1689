//! In-process `CryptoBackend` built on sequoia-openpgp.
//!
//! Produces the same status records gpgv would for the cases the verifier
//! distinguishes. sequoia judges the signing key at signature time, gpgv
//! judges it now. A good signature by a key that has expired or been revoked
//! since is reported as `EXPKEYSIG`/`REVKEYSIG` together with `VALIDSIG`. A
//! key that was already dead when it signed yields `EXPKEYSIG`/`REVKEYSIG`
//! without `VALIDSIG`.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use openpgp::cert::amalgamation::ValidAmalgamation;
use openpgp::packet::Signature;
use openpgp::parse::Parse;
use openpgp::parse::stream::*;
use openpgp::policy::{Policy, StandardPolicy};
use openpgp::types::RevocationStatus;
use openpgp::{Cert, Fingerprint, KeyHandle, KeyID};
use sequoia_openpgp as openpgp;
use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use crate::backend::CryptoBackend;
use crate::keyring::{Keyring, load_keyring_certs};
use crate::status::{ErrSig, StatusRecord, StatusReport, ValidSig};

struct Helper<'a> {
    policy: &'a dyn Policy,
    certs: Vec<Cert>,
    records: Rc<RefCell<Vec<StatusRecord>>>,
}

impl VerificationHelper for Helper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(self.certs.clone())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        // Record every outcome; the verifier decides what is acceptable.
        let mut records = self.records.borrow_mut();
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    records.extend(self.describe(result));
                }
            }
        }
        Ok(())
    }
}

impl Helper<'_> {
    fn describe(&self, result: VerificationResult<'_>) -> Vec<StatusRecord> {
        match result {
            Ok(good) => {
                let cert = good.ka.cert();
                let fingerprint = good.ka.key().fingerprint();
                let key_id = good.ka.key().keyid().to_hex();
                let uid = primary_uid(cert, self.policy);
                let valid = valid_sig(good.sig, fingerprint.to_hex(), cert.fingerprint().to_hex());
                let record = match key_state_now(cert, &fingerprint, self.policy) {
                    KeyState::Live => StatusRecord::GoodSig { key_id, uid },
                    KeyState::Expired => StatusRecord::ExpKeySig { key_id, uid },
                    KeyState::Revoked => StatusRecord::RevKeySig { key_id, uid },
                };
                vec![record, StatusRecord::ValidSig(valid)]
            }
            Err(VerificationError::MissingKey { sig, .. }) => {
                let key_id = issuer_hex(sig);
                vec![
                    StatusRecord::ErrSig(ErrSig {
                        key_id: key_id.clone(),
                        pk_algo: Some(sig.pk_algo().into()),
                        hash_algo: Some(sig.hash_algo().into()),
                        sig_class: Some(format!("{:02x}", u8::from(sig.typ()))),
                        timestamp: created_at(sig).map(|t| t.timestamp().to_string()),
                        rc: Some(9),
                    }),
                    StatusRecord::NoPubkey { key_id },
                ]
            }
            Err(VerificationError::BadKey { ka, .. }) => {
                let key_id = ka.key().keyid().to_hex();
                let uid = primary_uid(ka.cert(), self.policy);
                if is_revoked(&ka.valid_cert().revocation_status())
                    || is_revoked(&ka.revocation_status())
                {
                    vec![StatusRecord::RevKeySig { key_id, uid }]
                } else {
                    vec![StatusRecord::ExpKeySig { key_id, uid }]
                }
            }
            Err(VerificationError::BadSignature { ka, .. }) => {
                let key_id = ka.key().keyid().to_hex();
                let uid = primary_uid(ka.cert(), self.policy);
                vec![StatusRecord::BadSig { key_id, uid }]
            }
            Err(e) => vec![StatusRecord::Other {
                keyword: "ERROR".to_string(),
                args: vec![e.to_string()],
            }],
        }
    }
}

enum KeyState {
    Live,
    Expired,
    Revoked,
}

/// State of the signing key and its certificate at the current time.
fn key_state_now(cert: &Cert, fingerprint: &Fingerprint, policy: &dyn Policy) -> KeyState {
    let Ok(vc) = cert.with_policy(policy, None) else {
        return KeyState::Expired;
    };
    let key = vc.keys().key_handle(fingerprint.clone()).next();
    if is_revoked(&vc.revocation_status())
        || key.as_ref().is_some_and(|ka| is_revoked(&ka.revocation_status()))
    {
        KeyState::Revoked
    } else if vc.alive().is_err() || key.is_none_or(|ka| ka.alive().is_err()) {
        KeyState::Expired
    } else {
        KeyState::Live
    }
}

fn is_revoked(status: &RevocationStatus<'_>) -> bool {
    matches!(status, RevocationStatus::Revoked(_))
}

/// The primary user ID as gpgv prints it, or the first one when no user ID
/// is valid now.
fn primary_uid(cert: &Cert, policy: &dyn Policy) -> String {
    let lossy = |uid: &openpgp::packet::UserID| String::from_utf8_lossy(uid.value()).to_string();
    cert.with_policy(policy, None)
        .ok()
        .and_then(|vc| vc.primary_userid().ok().map(|ua| lossy(ua.userid())))
        .or_else(|| cert.userids().next().map(|ua| lossy(ua.userid())))
        .unwrap_or_default()
}

fn issuer_hex(sig: &Signature) -> String {
    match sig.get_issuers().into_iter().next() {
        Some(KeyHandle::KeyID(kid)) => kid.to_hex(),
        Some(KeyHandle::Fingerprint(fpr)) => KeyID::from(&fpr).to_hex(),
        None => "0000000000000000".to_string(),
    }
}

fn created_at(sig: &Signature) -> Option<DateTime<Utc>> {
    sig.signature_creation_time().map(DateTime::<Utc>::from)
}

fn valid_sig(sig: &Signature, fingerprint: String, primary_fingerprint: String) -> ValidSig {
    let created = created_at(sig);
    let expires = sig
        .signature_expiration_time()
        .map_or(0, |t| DateTime::<Utc>::from(t).timestamp());
    ValidSig {
        fingerprint,
        sig_date: created
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        sig_ts: created.map(|t| t.timestamp().to_string()).unwrap_or_default(),
        exp_ts: Some(expires.to_string()),
        sig_version: Some(sig.version()),
        reserved: Some("0".to_string()),
        pk_algo: Some(sig.pk_algo().into()),
        hash_algo: Some(sig.hash_algo().into()),
        sig_class: Some(format!("{:02x}", u8::from(sig.typ()))),
        primary_fingerprint: Some(primary_fingerprint),
    }
}

struct Outcome {
    report: StatusReport,
    cleartext: Vec<u8>,
}

/// Verifies signatures in-process against the certificates of a keyring file.
#[derive(Debug)]
pub struct SequoiaBackend {
    policy: StandardPolicy<'static>,
}

impl Default for SequoiaBackend {
    fn default() -> Self {
        Self {
            policy: StandardPolicy::new(),
        }
    }
}

impl SequoiaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: StandardPolicy<'static>) -> Self {
        Self { policy }
    }

    fn check(&self, document: &[u8], keyring: &Keyring) -> Result<Outcome> {
        let certs = load_keyring_certs(&keyring.path)?;
        let records = Rc::new(RefCell::new(Vec::new()));
        let helper = Helper {
            policy: &self.policy,
            certs,
            records: records.clone(),
        };

        let mut cleartext = Vec::new();
        let verified = VerifierBuilder::from_bytes(document)
            .and_then(|builder| builder.with_policy(&self.policy, None, helper))
            .and_then(|mut verifier| {
                verifier.read_to_end(&mut cleartext)?;
                Ok(())
            });

        // A message that cannot be parsed is a failed check, not a backend
        // failure.
        let diagnostics = match verified {
            Ok(()) => String::new(),
            Err(e) => {
                tracing::debug!(error = %e, "Message did not verify");
                format!("{e:#}")
            }
        };
        let records = records.take();
        Ok(Outcome {
            report: StatusReport::new(records, diagnostics),
            cleartext,
        })
    }
}

impl CryptoBackend for SequoiaBackend {
    #[tracing::instrument(
        skip(self, document, keyring),
        fields(doc_len = document.len(), keyring = %keyring.name)
    )]
    fn evaluate(&self, document: &[u8], keyring: &Keyring) -> Result<StatusReport> {
        Ok(self.check(document, keyring)?.report)
    }

    #[tracing::instrument(
        skip(self, document, keyring),
        fields(doc_len = document.len(), keyring = %keyring.name)
    )]
    fn decrypt(&self, document: &[u8], keyring: &Keyring) -> Result<Vec<u8>> {
        let outcome = self.check(document, keyring)?;
        if !outcome.report.valid() {
            bail!(
                "Signature does not verify with keyring {}: {}",
                keyring.name,
                outcome.report
            );
        }
        Ok(outcome.cleartext)
    }
}
