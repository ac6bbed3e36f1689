//! Common types and result structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// How a valid signature was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigType {
    /// Made with a key that is currently good.
    #[serde(rename = "GOODSIG")]
    Good,
    /// Made with a key that has since been revoked.
    #[serde(rename = "REVKEYSIG")]
    RevokedKey,
    /// Made with a key that has since expired.
    #[serde(rename = "EXPKEYSIG")]
    ExpiredKey,
}

impl SigType {
    /// Classification priority: the first present wins.
    pub const PRIORITY: [SigType; 3] = [SigType::Good, SigType::RevokedKey, SigType::ExpiredKey];

    /// GnuPG status keyword for this classification.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigType::Good => "GOODSIG",
            SigType::RevokedKey => "REVKEYSIG",
            SigType::ExpiredKey => "EXPKEYSIG",
        }
    }
}

impl fmt::Display for SigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SigInfo {
    /// Logical name of the keyring that validated the signature.
    pub kr_name: String,
    pub key_id: String,
    pub uid: String,
    pub sig_ts: DateTime<Utc>,
    pub sig_type: SigType,
    /// Signed payload, recovered from the document.
    #[serde(serialize_with = "serialize_lossy")]
    pub cleartext: Vec<u8>,
}

impl SigInfo {
    /// Cleartext as text, with invalid UTF-8 replaced.
    pub fn cleartext_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.cleartext)
    }
}

fn serialize_lossy<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sig_type_serializes_as_status_keyword() {
        let json = serde_json::to_string(&SigType::ExpiredKey).unwrap();
        assert_eq!(json, "\"EXPKEYSIG\"");
        assert_eq!(SigType::RevokedKey.to_string(), "REVKEYSIG");
    }

    #[test]
    fn cleartext_is_rendered_as_text() {
        let info = SigInfo {
            kr_name: "debian".into(),
            key_id: "0123456789ABCDEF".into(),
            uid: "Jane Doe <jane@debian.org>".into(),
            sig_ts: Utc.timestamp_opt(1_039_606_003, 0).unwrap(),
            sig_type: SigType::Good,
            cleartext: b"Source: wget\n\xff".to_vec(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["kr_name"], "debian");
        assert_eq!(value["sig_type"], "GOODSIG");
        assert_eq!(value["cleartext"], "Source: wget\n\u{fffd}");
    }
}
