//! Certificates, clearsigned documents and keyring files for tests.

use openpgp::cert::prelude::*;
use openpgp::packet::signature::SignatureBuilder;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::Serialize;
use openpgp::serialize::stream::{Message, Signer};
use openpgp::types::{ReasonForRevocation, SignatureType};
use sequoia_openpgp as openpgp;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::keyring::Keyring;

pub fn generate_cert(uid: &str) -> Cert {
    let (cert, _revocation) = CertBuilder::new()
        .add_userid(uid)
        .add_signing_subkey()
        .generate()
        .unwrap();
    cert
}

/// A certificate created at `created` that expires after `validity`.
pub fn generate_cert_at(uid: &str, created: SystemTime, validity: Duration) -> Cert {
    let (cert, _revocation) = CertBuilder::new()
        .set_creation_time(created)
        .set_validity_period(validity)
        .add_userid(uid)
        .add_signing_subkey()
        .generate()
        .unwrap();
    cert
}

/// Retire `cert` as of now; signatures made before stay valid.
pub fn retire(cert: Cert) -> Cert {
    let mut signer = cert
        .primary_key()
        .key()
        .clone()
        .parts_into_secret()
        .unwrap()
        .into_keypair()
        .unwrap();
    let revocation = cert
        .revoke(&mut signer, ReasonForRevocation::KeyRetired, b"Retired")
        .unwrap();
    let (cert, _changed) = cert.insert_packets(std::iter::once(revocation)).unwrap();
    cert
}

/// Clearsign `body` with the signing subkey of `cert`.
pub fn clearsign(cert: &Cert, body: &[u8]) -> Vec<u8> {
    clearsign_at(cert, body, SystemTime::now())
}

/// Clearsign `body` with the signing subkey of `cert` as of `time`.
pub fn clearsign_at(cert: &Cert, body: &[u8], time: SystemTime) -> Vec<u8> {
    let policy = StandardPolicy::new();
    let keypair = cert
        .keys()
        .unencrypted_secret()
        .with_policy(&policy, time)
        .alive()
        .revoked(false)
        .for_signing()
        .next()
        .unwrap()
        .key()
        .clone()
        .into_keypair()
        .unwrap();

    let mut document = Vec::new();
    let message = Message::new(&mut document);
    let mut signer =
        Signer::with_template(message, keypair, SignatureBuilder::new(SignatureType::Text))
            .unwrap()
            .creation_time(time)
            .cleartext()
            .build()
            .unwrap();
    signer.write_all(body).unwrap();
    signer.finalize().unwrap();
    document
}

/// Write the public parts of `certs` to `<dir>/<name>.gpg`.
pub fn write_keyring(dir: &Path, name: &str, certs: &[&Cert]) -> Keyring {
    let path = dir.join(format!("{name}.gpg"));
    let mut file = std::fs::File::create(&path).unwrap();
    for cert in certs {
        cert.serialize(&mut file).unwrap();
    }
    Keyring {
        name: name.to_string(),
        path,
    }
}
