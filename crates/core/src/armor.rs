//! OpenPGP cleartext signature framing (RFC 4880 §7).
//!
//! Only the framing is handled here: headers, dash-escaped body and the
//! armored signature block. Nothing in this module checks a signature.

use crate::error::ArmorError;

const SIGNED_BEGIN: &[u8] = b"-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIG_BEGIN: &[u8] = b"-----BEGIN PGP SIGNATURE-----";
const PGP_SIG_END: &[u8] = b"-----END PGP SIGNATURE-----";

/// A cleartext-signed document split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearsignedDocument {
    /// Armor headers of the signed message, usually `Hash: ...` lines.
    pub headers: Vec<String>,
    /// Dash-unescaped body as `gpg --decrypt` prints it: the line ending
    /// that precedes the signature block is kept as the final byte(s).
    pub cleartext: Vec<u8>,
    /// The armored signature block, including at most one trailing line ending.
    pub signature: Vec<u8>,
}

impl ClearsignedDocument {
    /// Frame `cleartext` with this document's headers and signature.
    ///
    /// A cleartext that does not end in a newline gets one, so output from
    /// backends that strip the final line ending frames the same way.
    pub fn rewrap(&self, cleartext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(cleartext.len() + self.signature.len() + 128);
        out.extend_from_slice(SIGNED_BEGIN);
        out.push(b'\n');
        for header in &self.headers {
            out.extend_from_slice(header.as_bytes());
            out.push(b'\n');
        }
        out.push(b'\n');
        for line in cleartext.split_inclusive(|&b| b == b'\n') {
            if line.starts_with(b"-") {
                out.extend_from_slice(b"- ");
            }
            out.extend_from_slice(line);
        }
        if !cleartext.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(&self.signature);
        out
    }
}

enum Section {
    Preamble,
    Headers,
    Body,
}

/// Split a cleartext-signed document.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn split_clearsigned(data: &[u8]) -> Result<ClearsignedDocument, ArmorError> {
    let mut section = Section::Preamble;
    let mut headers = Vec::new();
    let mut body: Vec<&[u8]> = Vec::new();
    let mut sig_start = None;
    let mut offset = 0;

    for raw in data.split_inclusive(|&b| b == b'\n') {
        let start = offset;
        offset += raw.len();
        let line = trim_eol(raw);
        match section {
            Section::Preamble => {
                if line == SIGNED_BEGIN {
                    section = Section::Headers;
                }
            }
            Section::Headers => {
                if line.is_empty() {
                    section = Section::Body;
                } else {
                    headers.push(String::from_utf8_lossy(line).into_owned());
                }
            }
            Section::Body => {
                if line == PGP_SIG_BEGIN {
                    sig_start = Some(start);
                    break;
                }
                body.push(raw);
            }
        }
    }

    let sig_start = match section {
        Section::Preamble => {
            return Err(ArmorError::MissingMarker {
                marker: "BEGIN PGP SIGNED MESSAGE",
            });
        }
        Section::Headers => return Err(ArmorError::UnterminatedHeaders),
        Section::Body => sig_start.ok_or(ArmorError::MissingMarker {
            marker: "BEGIN PGP SIGNATURE",
        })?,
    };

    let end = find_subslice(data, PGP_SIG_END, sig_start).ok_or(ArmorError::MissingMarker {
        marker: "END PGP SIGNATURE",
    })?;
    let mut end_pos = end + PGP_SIG_END.len();
    if data[end_pos..].starts_with(b"\r\n") {
        end_pos += 2;
    } else if data[end_pos..].starts_with(b"\n") {
        end_pos += 1;
    }

    let mut cleartext = Vec::new();
    for line in body {
        cleartext.extend_from_slice(line.strip_prefix(b"- ").unwrap_or(line));
    }

    Ok(ClearsignedDocument {
        headers,
        cleartext,
        signature: data[sig_start..end_pos].to_vec(),
    })
}

/// Number of complete armored signature blocks in `data`.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn count_signature_blocks(data: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while let Some(begin) = find_subslice(data, PGP_SIG_BEGIN, i) {
        let Some(end) = find_subslice(data, PGP_SIG_END, begin) else {
            break;
        };
        count += 1;
        i = end + PGP_SIG_END.len();
    }
    count
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNATURE: &str = "\
-----BEGIN PGP SIGNATURE-----
Version: GnuPG v1.0.7 (GNU/Linux)

iD8DBQE99jvzfXwGNsdvONIRAuLnAJ9sdY3WcIV5qi2WJ2fvlJ8M3MbfUgCgkJ7f
=abcd
-----END PGP SIGNATURE-----
";

    fn dsc() -> String {
        format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\n\
Hash: SHA1\n\
\n\
Format: 1.0\n\
Source: wget\n\
- --- not a marker\n\
Version: 1.8.2-5\n\
\n\
{SIGNATURE}"
        )
    }

    #[test]
    fn splits_headers_body_and_signature() {
        let doc = split_clearsigned(dsc().as_bytes()).unwrap();
        assert_eq!(doc.headers, ["Hash: SHA1"]);
        assert_eq!(
            doc.cleartext,
            b"Format: 1.0\nSource: wget\n--- not a marker\nVersion: 1.8.2-5\n\n"
        );
        assert_eq!(doc.signature, SIGNATURE.as_bytes());
    }

    #[test]
    fn rewrap_restores_original_framing() {
        let original = dsc();
        let doc = split_clearsigned(original.as_bytes()).unwrap();
        assert_eq!(doc.rewrap(&doc.cleartext), original.as_bytes());
    }

    #[test]
    fn rewrap_adds_missing_final_newline() {
        let original = format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nSource: hello\n{SIGNATURE}"
        );
        let doc = split_clearsigned(original.as_bytes()).unwrap();
        assert_eq!(doc.cleartext, b"Source: hello\n");
        assert_eq!(doc.rewrap(b"Source: hello"), original.as_bytes());
    }

    #[test]
    fn handles_crlf_documents() {
        let original = dsc().replace('\n', "\r\n");
        let doc = split_clearsigned(original.as_bytes()).unwrap();
        assert_eq!(doc.headers, ["Hash: SHA1"]);
        assert!(doc.cleartext.starts_with(b"Format: 1.0\r\nSource: wget\r\n"));
        assert!(doc.cleartext.ends_with(b"Version: 1.8.2-5\r\n\r\n"));
        assert!(doc.signature.ends_with(b"-----END PGP SIGNATURE-----\r\n"));
    }

    #[test]
    fn reports_missing_markers() {
        assert!(matches!(
            split_clearsigned(b"Source: wget\n"),
            Err(ArmorError::MissingMarker { .. })
        ));
        assert!(matches!(
            split_clearsigned(b"-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA1\n"),
            Err(ArmorError::UnterminatedHeaders)
        ));
        assert!(matches!(
            split_clearsigned(b"-----BEGIN PGP SIGNED MESSAGE-----\n\nSource: wget\n"),
            Err(ArmorError::MissingMarker {
                marker: "BEGIN PGP SIGNATURE"
            })
        ));
    }

    #[test]
    fn counts_signature_blocks() {
        let twice = format!("{}{SIGNATURE}", dsc());
        assert_eq!(count_signature_blocks(dsc().as_bytes()), 1);
        assert_eq!(count_signature_blocks(twice.as_bytes()), 2);
        assert_eq!(count_signature_blocks(b"no signature"), 0);
    }
}
