#![cfg(unix)]

use debhist_core::{Diagnostics, SigType};
use debhist_gpg::{GpgBackend, KeyringSet, MISSING_KEYRINGS_HINT, SignatureVerifier, VerifyError};
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const DSC: &[u8] = b"-----BEGIN PGP SIGNED MESSAGE-----
Hash: SHA256

Format: 3.0 (quilt)
Source: hello
Version: 2.10-3
-----BEGIN PGP SIGNATURE-----

iHUEARYIAB0WIQQ6jC9efRuQRsHi0/SltsfY6fABEgUCY7F0wAAKCRA=
=abcd
-----END PGP SIGNATURE-----
";

#[derive(Default)]
struct Recorder {
    warnings: Mutex<Vec<String>>,
}

impl Diagnostics for Recorder {
    fn warn(&self, msg: &str) {
        self.warnings.lock().unwrap().push(msg.to_string());
    }

    fn debug(&self, _msg: &str) {}
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// gpgv that only knows the signer when given `debian-maintainers.gpg`.
fn fake_gpgv(dir: &Path) -> PathBuf {
    script(
        dir,
        "gpgv",
        r#"cat > /dev/null
case "$4" in
  */debian-maintainers.gpg)
    echo "[GNUPG:] GOODSIG A5B6C7D8E9F00112 Jane Doe <jane@debian.org>"
    echo "[GNUPG:] VALIDSIG 3A8C2F5E7D1B9046C1E2D3F4A5B6C7D8E9F00112 2023-01-01 1672574400 0 4 0 1 10 01 3A8C2F5E7D1B9046C1E2D3F4A5B6C7D8E9F00112"
    ;;
  *)
    echo "[GNUPG:] ERRSIG A5B6C7D8E9F00112 1 10 01 1672574400 9"
    echo "[GNUPG:] NO_PUBKEY A5B6C7D8E9F00112"
    echo "gpgv: Can't check signature: No public key" >&2
    exit 2
    ;;
esac"#,
    )
}

/// gpg that prints the body of a clearsigned document.
fn fake_gpg(dir: &Path) -> PathBuf {
    script(
        dir,
        "gpg",
        "awk 'body && /^-----BEGIN PGP SIGNATURE-----$/ { exit } body { print } /^$/ { body = 1 }'",
    )
}

fn touch(dir: &Path, name: &str) {
    std::fs::write(dir.join(name), b"").unwrap();
}

#[test]
#[serial]
fn discovered_keyrings_are_tried_in_order() {
    let bin = tempfile::tempdir().unwrap();
    let keyrings = tempfile::tempdir().unwrap();
    for name in [
        "debian-keyring.gpg",
        "debian-maintainers.gpg",
        "emeritus-keyring.gpg",
    ] {
        touch(keyrings.path(), name);
    }

    let backend = GpgBackend::new()
        .with_gpgv(fake_gpgv(bin.path()))
        .with_gpg(fake_gpg(bin.path()));
    let set = KeyringSet::discover(&[keyrings.path()]);
    assert!(set.missing());

    let info = SignatureVerifier::new(backend)
        .verify(&set, DSC, "hello_2.10-3.dsc")
        .unwrap();
    assert_eq!(info.kr_name, "debian-maintainers");
    assert_eq!(info.sig_type, SigType::Good);
    assert_eq!(info.uid, "Jane Doe <jane@debian.org>");
    assert_eq!(info.sig_ts.timestamp(), 1_672_574_400);
    assert_eq!(
        info.cleartext_lossy(),
        "Format: 3.0 (quilt)\nSource: hello\nVersion: 2.10-3\n"
    );
}

#[test]
#[serial]
fn unknown_key_with_missing_keyrings_warns_once() {
    let bin = tempfile::tempdir().unwrap();
    let keyrings = tempfile::tempdir().unwrap();
    touch(keyrings.path(), "debian-keyring.gpg");
    touch(keyrings.path(), "removed-keys.gpg");

    let recorder = Arc::new(Recorder::default());
    let backend = GpgBackend::new()
        .with_gpgv(fake_gpgv(bin.path()))
        .with_gpg(fake_gpg(bin.path()));
    let err = SignatureVerifier::new(backend)
        .with_diagnostics(recorder.clone())
        .verify(
            &KeyringSet::discover(&[keyrings.path()]),
            DSC,
            "hello_2.10-3.dsc",
        )
        .unwrap_err();

    assert!(matches!(
        err,
        VerifyError::NoValidSignature { no_pubkey: true, .. }
    ));
    let message = err.to_string();
    assert!(message.starts_with("No valid signature on hello_2.10-3.dsc"));
    assert!(message.contains("NO_PUBKEY A5B6C7D8E9F00112"));
    assert!(message.contains("No public key"));
    assert_eq!(*recorder.warnings.lock().unwrap(), [MISSING_KEYRINGS_HINT]);
}

#[test]
#[serial]
fn broken_gpg_after_good_gpgv_is_an_invariant_violation() {
    let bin = tempfile::tempdir().unwrap();
    let keyrings = tempfile::tempdir().unwrap();
    touch(keyrings.path(), "debian-maintainers.gpg");

    let gpg = script(
        bin.path(),
        "gpg",
        "cat > /dev/null\necho 'gpg: decryption failed' >&2\nexit 2",
    );
    let backend = GpgBackend::new()
        .with_gpgv(fake_gpgv(bin.path()))
        .with_gpg(gpg);
    let err = SignatureVerifier::new(backend)
        .verify(
            &KeyringSet::discover(&[keyrings.path()]),
            DSC,
            "hello_2.10-3.dsc",
        )
        .unwrap_err();

    let VerifyError::BackendInvariant { keyring, source, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(keyring, "debian-maintainers");
    assert!(source.to_string().contains("decryption failed"));
}
