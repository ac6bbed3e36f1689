//! JSON output formats.

use serde::Serialize;

#[derive(Serialize)]
pub struct ChangelogJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub author: String,
    /// RFC 3339, with the offset of the changelog.
    pub date: String,
    pub versions: Vec<String>,
    /// False when only the top stanza was read.
    pub complete: bool,
}

#[derive(Serialize)]
pub struct VerifyJson<'a> {
    pub status: &'a str,
    pub command: &'a str,
    pub input: String,
    pub keyring: String,
    pub key_id: String,
    pub uid: String,
    pub sig_type: String,
    pub signed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleartext: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub status: &'a str,
    pub error: String,
    pub causes: Vec<String>,
}
