//! Changelog and verify commands.

use anyhow::{Context, Result};
use console::style;
use debhist_core::{ParseResult, parse_changelog};
use debhist_gpg::{
  CryptoBackend, GpgBackend, KeyringSet, SequoiaBackend, SignatureVerifier, default_search_dirs,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::VerifyBackend;
use crate::json::{ChangelogJson, VerifyJson};

pub fn changelog(
  input: PathBuf,
  skip_versions: Vec<String>,
  just_one: bool,
  json: bool,
) -> Result<()> {
  let text = std::fs::read_to_string(&input)
    .with_context(|| format!("Failed to read changelog: {}", input.display()))?;
  let skip: HashSet<String> = skip_versions.into_iter().collect();

  let parsed = parse_changelog(text.lines(), &skip, just_one)
    .with_context(|| format!("Failed to parse changelog: {}", input.display()))?;

  let (versions, complete) = match &parsed {
    ParseResult::Top(top) => (vec![top.version.clone()], false),
    ParseResult::History(history) => (history.versions.clone(), true),
  };

  if json {
    let payload = ChangelogJson {
      status: "ok",
      command: "changelog",
      input: input.display().to_string(),
      author: parsed.author().to_string(),
      date: parsed.date().to_rfc3339(),
      versions,
      complete,
    };
    println!("{}", serde_json::to_string(&payload)?);
  } else {
    eprintln!(
      "{} {} by {}",
      style("==>").cyan().bold(),
      style(parsed.top_version()).cyan(),
      style(parsed.author()).cyan()
    );
    eprintln!("    Date: {}", style(parsed.date().to_rfc2822()).dim());
    for version in &versions {
      println!("{version}");
    }
  }

  Ok(())
}

pub struct VerifyArgs {
  pub input: PathBuf,
  pub keyrings: Vec<(String, PathBuf)>,
  pub keyring_dirs: Vec<PathBuf>,
  pub backend: VerifyBackend,
  pub gpgv: PathBuf,
  pub gpg: PathBuf,
  pub timeout: u64,
  pub cleartext: bool,
}

pub fn verify(args: VerifyArgs, json: bool) -> Result<()> {
  eprintln!("{}", style("==> Verifying signed document").cyan().bold());

  let spinner = ProgressBar::new_spinner();
  spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
  spinner.enable_steady_tick(Duration::from_millis(80));
  spinner.set_message(format!(
    "Reading {}",
    style(args.input.display()).cyan()
  ));

  let document = std::fs::read(&args.input)
    .with_context(|| format!("Failed to read signed document: {}", args.input.display()))?;

  let keyrings = keyring_set(args.keyrings, &args.keyring_dirs);
  tracing::debug!(count = keyrings.len(), missing = keyrings.missing(), "Keyring set ready");
  spinner.set_message(format!(
    "Checking signature against {} keyring(s)",
    style(keyrings.len()).cyan()
  ));

  let backend: Box<dyn CryptoBackend> = match args.backend {
    VerifyBackend::Gpg => {
      let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
      Box::new(
        GpgBackend::new()
          .with_gpgv(args.gpgv)
          .with_gpg(args.gpg)
          .with_timeout(timeout),
      )
    }
    VerifyBackend::Sequoia => Box::new(SequoiaBackend::new()),
  };

  let description = describe(&args.input);
  let result = SignatureVerifier::new(backend).verify(&keyrings, &document, &description);
  spinner.finish_and_clear();
  let info = result?;

  eprintln!(
    "\n{} {}",
    style("[VALID]").green().bold(),
    style(format!("{} signature", info.sig_type)).green()
  );
  eprintln!("    Signer:  {}", style(&info.uid).cyan());
  eprintln!("    Key ID:  {}", style(&info.key_id).cyan());
  eprintln!("    Keyring: {}", style(&info.kr_name).cyan());
  eprintln!("    Signed:  {}", style(info.sig_ts.to_rfc3339()).cyan());

  if json {
    let payload = VerifyJson {
      status: "ok",
      command: "verify",
      input: args.input.display().to_string(),
      keyring: info.kr_name.clone(),
      key_id: info.key_id.clone(),
      uid: info.uid.clone(),
      sig_type: info.sig_type.to_string(),
      signed_at: info.sig_ts.to_rfc3339(),
      cleartext: args.cleartext.then(|| info.cleartext_lossy().into_owned()),
    };
    println!("{}", serde_json::to_string(&payload)?);
  } else if args.cleartext {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&info.cleartext)?;
    stdout.flush()?;
  } else {
    // Only print "OK" when stdout is piped (for pipeline composition)
    use std::io::IsTerminal;
    if !std::io::stdout().is_terminal() {
      println!("OK");
    }
  }

  Ok(())
}

/// Explicit keyrings are tried first, then the well-known ones found in
/// `dirs`. Without explicit keyrings or directories, the default search
/// directories are used.
fn keyring_set(explicit: Vec<(String, PathBuf)>, dirs: &[PathBuf]) -> KeyringSet {
  if explicit.is_empty() {
    return if dirs.is_empty() {
      KeyringSet::discover(default_search_dirs().as_slice())
    } else {
      KeyringSet::discover(dirs)
    };
  }

  let mut set = KeyringSet::new();
  for (name, path) in explicit {
    set.push(name, path);
  }
  if !dirs.is_empty() {
    let discovered = KeyringSet::discover(dirs);
    for keyring in &discovered {
      if set.get(&keyring.name).is_none() {
        set.push(keyring.name.clone(), keyring.path.clone());
      }
    }
    set.set_missing(discovered.missing());
  }
  set
}

fn describe(input: &Path) -> String {
  input
    .file_name()
    .map_or_else(|| input.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn explicit_keyrings_come_first() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("debian-keyring.gpg"), b"").unwrap();
    std::fs::write(dir.path().join("debian-maintainers.gpg"), b"").unwrap();

    let set = keyring_set(
      vec![
        ("local".to_string(), PathBuf::from("/srv/local.gpg")),
        ("debian".to_string(), PathBuf::from("/srv/debian.gpg")),
      ],
      &[dir.path().to_path_buf()],
    );
    let names: Vec<_> = set.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, ["local", "debian", "debian-maintainers"]);
    assert_eq!(set.get("debian").unwrap().path, Path::new("/srv/debian.gpg"));
    assert!(set.missing());
  }

  #[test]
  fn explicit_keyrings_alone_are_complete() {
    let set = keyring_set(vec![("local".to_string(), PathBuf::from("k.gpg"))], &[]);
    assert_eq!(set.len(), 1);
    assert!(!set.missing());
  }

  #[test]
  fn describes_documents_by_file_name() {
    assert_eq!(describe(Path::new("pool/h/hello/hello_2.10-3.dsc")), "hello_2.10-3.dsc");
  }
}
