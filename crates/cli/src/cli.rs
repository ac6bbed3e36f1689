use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "debhist",
    about = "Debian package history from changelogs and signed source descriptions",
    long_about = "Parse debian/changelog stanzas and verify clearsigned Debian documents \
                  (.dsc, .changes) against the Debian keyrings."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output machine-readable JSON to stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging (debug level unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a debian/changelog file
    Changelog {
        /// Path to the changelog
        input: PathBuf,

        /// Stop at this version when it appears below the top stanza (can be provided multiple times)
        #[arg(long = "skip-version", value_name = "VERSION")]
        skip_versions: Vec<String>,

        /// Only read the top stanza
        #[arg(long)]
        just_one: bool,
    },

    /// Verify a clearsigned document against a set of keyrings
    Verify {
        /// Path to the signed document
        input: PathBuf,

        /// Keyring to try, in order (can be provided multiple times)
        /// If omitted, the well-known Debian keyrings are discovered
        #[arg(short, long = "keyring", value_name = "NAME=PATH", value_parser = parse_keyring)]
        keyrings: Vec<(String, PathBuf)>,

        /// Directory searched for the well-known Debian keyrings (can be provided multiple times)
        #[arg(long = "keyring-dir", value_name = "DIR")]
        keyring_dirs: Vec<PathBuf>,

        /// Verification backend to use
        #[arg(short, long, value_enum, default_value = "gpg")]
        backend: VerifyBackend,

        /// gpgv program (gpg backend only)
        #[arg(long, env = "DEBHIST_GPGV", default_value = "gpgv")]
        gpgv: PathBuf,

        /// gpg program used to extract the cleartext (gpg backend only)
        #[arg(long, env = "DEBHIST_GPG", default_value = "gpg")]
        gpg: PathBuf,

        /// Seconds allowed per gpg invocation, 0 for no limit (gpg backend only)
        #[arg(long, env = "DEBHIST_GPG_TIMEOUT", value_name = "SECS", default_value_t = 60)]
        timeout: u64,

        /// Write the verified cleartext to stdout
        #[arg(long)]
        cleartext: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VerifyBackend {
    /// gpgv and gpg child processes
    Gpg,
    /// In-process sequoia-openpgp
    Sequoia,
}

fn parse_keyring(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got {raw:?}")),
    }
}
