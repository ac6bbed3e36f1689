//! GnuPG machine-readable status output (`--status-fd`).
//!
//! See `doc/DETAILS` in the GnuPG sources for the record formats. Only the
//! records needed to judge a signature are modelled; everything else is kept
//! as [`StatusRecord::Other`].

use chrono::{DateTime, NaiveDateTime, Utc};
use debhist_core::SigType;
use std::fmt;

/// Prefix of every status line.
pub const STATUS_PREFIX: &str = "[GNUPG:] ";

/// One `[GNUPG:] KEYWORD args...` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRecord {
    GoodSig { key_id: String, uid: String },
    /// The signature itself has expired.
    ExpSig { key_id: String, uid: String },
    /// Good signature made by a key that has since expired.
    ExpKeySig { key_id: String, uid: String },
    /// Good signature made by a key that has since been revoked.
    RevKeySig { key_id: String, uid: String },
    BadSig { key_id: String, uid: String },
    ErrSig(ErrSig),
    NoPubkey { key_id: String },
    ValidSig(ValidSig),
    Other { keyword: String, args: Vec<String> },
}

/// `ERRSIG`: the signature could not be checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrSig {
    pub key_id: String,
    pub pk_algo: Option<u8>,
    pub hash_algo: Option<u8>,
    pub sig_class: Option<String>,
    pub timestamp: Option<String>,
    /// 4 is an unsupported algorithm, 9 a missing public key.
    pub rc: Option<u8>,
}

/// `VALIDSIG`: details of a cryptographically valid signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSig {
    pub fingerprint: String,
    pub sig_date: String,
    /// Seconds since the epoch, or an ISO 8601 `YYYYMMDDTHHMMSS` string.
    pub sig_ts: String,
    /// `0` when the signature does not expire.
    pub exp_ts: Option<String>,
    pub sig_version: Option<u8>,
    pub reserved: Option<String>,
    pub pk_algo: Option<u8>,
    pub hash_algo: Option<u8>,
    pub sig_class: Option<String>,
    pub primary_fingerprint: Option<String>,
}

impl ValidSig {
    /// Signature creation time.
    pub fn signed_at(&self) -> Option<DateTime<Utc>> {
        parse_status_time(&self.sig_ts)
    }
}

fn parse_status_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl StatusRecord {
    /// Parse one status line; `None` when the line is not a status record.
    pub fn parse_line(line: &str) -> Option<StatusRecord> {
        let rest = line.trim_end().strip_prefix(STATUS_PREFIX)?;
        let (keyword, args) = rest.split_once(' ').unwrap_or((rest, ""));
        let record = match keyword {
            "GOODSIG" | "EXPSIG" | "EXPKEYSIG" | "REVKEYSIG" | "BADSIG" => {
                let (key_id, uid) = args.split_once(' ').unwrap_or((args, ""));
                let (key_id, uid) = (key_id.to_string(), uid.to_string());
                match keyword {
                    "GOODSIG" => StatusRecord::GoodSig { key_id, uid },
                    "EXPSIG" => StatusRecord::ExpSig { key_id, uid },
                    "EXPKEYSIG" => StatusRecord::ExpKeySig { key_id, uid },
                    "REVKEYSIG" => StatusRecord::RevKeySig { key_id, uid },
                    _ => StatusRecord::BadSig { key_id, uid },
                }
            }
            "NO_PUBKEY" => StatusRecord::NoPubkey {
                key_id: args.split_whitespace().next().unwrap_or_default().to_string(),
            },
            "ERRSIG" => {
                let fields: Vec<&str> = args.split_whitespace().collect();
                StatusRecord::ErrSig(ErrSig {
                    key_id: fields.first().copied().unwrap_or_default().to_string(),
                    pk_algo: field(&fields, 1),
                    hash_algo: field(&fields, 2),
                    sig_class: field(&fields, 3),
                    timestamp: field(&fields, 4),
                    rc: field(&fields, 5),
                })
            }
            "VALIDSIG" => {
                let fields: Vec<&str> = args.split_whitespace().collect();
                if fields.len() < 3 {
                    return Some(other(keyword, args));
                }
                StatusRecord::ValidSig(ValidSig {
                    fingerprint: fields[0].to_string(),
                    sig_date: fields[1].to_string(),
                    sig_ts: fields[2].to_string(),
                    exp_ts: field(&fields, 3),
                    sig_version: field(&fields, 4),
                    reserved: field(&fields, 5),
                    pk_algo: field(&fields, 6),
                    hash_algo: field(&fields, 7),
                    sig_class: field(&fields, 8),
                    primary_fingerprint: field(&fields, 9),
                })
            }
            _ => other(keyword, args),
        };
        Some(record)
    }

    pub fn keyword(&self) -> &str {
        match self {
            StatusRecord::GoodSig { .. } => "GOODSIG",
            StatusRecord::ExpSig { .. } => "EXPSIG",
            StatusRecord::ExpKeySig { .. } => "EXPKEYSIG",
            StatusRecord::RevKeySig { .. } => "REVKEYSIG",
            StatusRecord::BadSig { .. } => "BADSIG",
            StatusRecord::ErrSig(_) => "ERRSIG",
            StatusRecord::NoPubkey { .. } => "NO_PUBKEY",
            StatusRecord::ValidSig(_) => "VALIDSIG",
            StatusRecord::Other { keyword, .. } => keyword.as_str(),
        }
    }
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize) -> Option<T> {
    fields.get(index).and_then(|f| f.parse().ok())
}

fn other(keyword: &str, args: &str) -> StatusRecord {
    StatusRecord::Other {
        keyword: keyword.to_string(),
        args: args.split_whitespace().map(str::to_string).collect(),
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| "-".to_string(), T::to_string)
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusRecord::GoodSig { key_id, uid }
            | StatusRecord::ExpSig { key_id, uid }
            | StatusRecord::ExpKeySig { key_id, uid }
            | StatusRecord::RevKeySig { key_id, uid }
            | StatusRecord::BadSig { key_id, uid } => {
                write!(f, "{} {key_id} {uid}", self.keyword())
            }
            StatusRecord::NoPubkey { key_id } => write!(f, "NO_PUBKEY {key_id}"),
            StatusRecord::ErrSig(e) => write!(
                f,
                "ERRSIG {} {} {} {} {} {}",
                e.key_id,
                opt(&e.pk_algo),
                opt(&e.hash_algo),
                opt(&e.sig_class),
                opt(&e.timestamp),
                opt(&e.rc)
            ),
            StatusRecord::ValidSig(v) => write!(
                f,
                "VALIDSIG {} {} {} {}",
                v.fingerprint,
                v.sig_date,
                v.sig_ts,
                opt(&v.exp_ts)
            ),
            StatusRecord::Other { keyword, args } => {
                f.write_str(keyword)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything a backend reported about one signature check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub records: Vec<StatusRecord>,
    /// Human-oriented output of the backend (gpg's stderr).
    pub diagnostics: String,
}

impl StatusReport {
    pub fn new(records: Vec<StatusRecord>, diagnostics: impl Into<String>) -> Self {
        Self {
            records,
            diagnostics: diagnostics.into(),
        }
    }

    /// Collect the status records of `status` output, ignoring other lines.
    pub fn parse(status: &str, diagnostics: impl Into<String>) -> Self {
        Self::new(
            status.lines().filter_map(StatusRecord::parse_line).collect(),
            diagnostics,
        )
    }

    /// A `GOODSIG` or `VALIDSIG` record is present.
    pub fn valid(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(
                r,
                StatusRecord::GoodSig { .. } | StatusRecord::ValidSig(_)
            )
        })
    }

    /// The signing key was not found in the keyring.
    pub fn has_no_pubkey(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(r, StatusRecord::NoPubkey { .. })
                || matches!(r, StatusRecord::ErrSig(e) if e.rc == Some(9))
        })
    }

    /// Classification with key id and user id, by priority: good, then
    /// revoked key, then expired key.
    pub fn classification(&self) -> Option<(SigType, &str, &str)> {
        SigType::PRIORITY.into_iter().find_map(|wanted| {
            self.records.iter().find_map(|r| match (wanted, r) {
                (SigType::Good, StatusRecord::GoodSig { key_id, uid })
                | (SigType::RevokedKey, StatusRecord::RevKeySig { key_id, uid })
                | (SigType::ExpiredKey, StatusRecord::ExpKeySig { key_id, uid }) => {
                    Some((wanted, key_id.as_str(), uid.as_str()))
                }
                _ => None,
            })
        })
    }

    pub fn valid_sig(&self) -> Option<&ValidSig> {
        self.records.iter().find_map(|r| match r {
            StatusRecord::ValidSig(v) => Some(v),
            _ => None,
        })
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{record}")?;
        }
        f.write_str("]")?;
        let diagnostics = self.diagnostics.trim();
        if !diagnostics.is_empty() {
            write!(f, " {diagnostics}")?;
        }
        Ok(())
    }
}
