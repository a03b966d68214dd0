//! Compromised-password check against the Have I Been Pwned range API.
//!
//! Uses the k-anonymity interface: only the first five hex characters of
//! the SHA-1 digest leave the machine, the suffix is matched against the
//! returned candidate list locally.

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};

const RANGE_API: &str = "https://api.pwnedpasswords.com/range/";

/// Returns how often the password appears in known breaches, zero if it is
/// unknown to the database.
pub fn breach_count(password: &str) -> Result<u64> {
    let digest = Sha1::digest(password.as_bytes());
    let hexdigest = hex::encode_upper(digest);
    let (prefix, suffix) = hexdigest.split_at(5);

    let body = reqwest::blocking::get(format!("{RANGE_API}{prefix}"))
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .context("breach database query failed")?;

    for line in body.lines() {
        let Some((candidate, count)) = line.split_once(':') else { continue };
        if candidate.eq_ignore_ascii_case(suffix) {
            return Ok(count.trim().parse().unwrap_or(0));
        }
    }
    Ok(0)
}
