//! Short issue identifiers.
//!
//! Ids look like `fl-3k9x2a`: a fixed prefix plus six base-36 characters
//! taken from a BLAKE3 digest of the title, actor, creation instant and a
//! process-local counter. They are opaque to every other module and are
//! never reused once assigned.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix shared by every generated issue id.
pub const ID_PREFIX: &str = "fl-";

const ID_LEN: usize = 6;
const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh issue id.
#[must_use]
pub fn generate_issue_id(title: &str, actor: &str, at: DateTime<Utc>) -> String {
    let nonce = COUNTER.fetch_add(1, Ordering::Relaxed);
    let input = format!(
        "{title}\u{1f}{actor}\u{1f}{}\u{1f}{nonce}\u{1f}{}",
        at.timestamp_nanos_opt().unwrap_or_default(),
        std::process::id()
    );
    let digest = blake3::hash(input.as_bytes());

    let mut n = digest
        .as_bytes()
        .iter()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut id = String::with_capacity(ID_PREFIX.len() + ID_LEN);
    id.push_str(ID_PREFIX);
    for _ in 0..ID_LEN {
        id.push(char::from(ALPHABET[(n % 36) as usize]));
        n /= 36;
    }
    id
}
