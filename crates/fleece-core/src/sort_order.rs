//! Fractional sort keys for sibling ordering.
//!
//! A child's position under a parent is a string over `a..=z` compared
//! lexicographically. A key strictly between any two existing keys always
//! exists, so moving or inserting a child never renumbers its siblings.
//!
//! Generated keys never end in `a`; this keeps room below every key.

const MIN_DIGIT: u8 = b'a';
const BASE: u8 = 26;

/// Return a key that sorts strictly between `before` and `after`.
///
/// `None` means unbounded on that side. When `before >= after` the bound
/// on `after` cannot be honoured and the result only sorts after `before`.
#[must_use]
pub fn key_between(before: Option<&str>, after: Option<&str>) -> String {
    let lo = before.map(digits).unwrap_or_default();
    let hi = after.map(digits).filter(|h| !h.is_empty());
    let hi = hi.filter(|h| lo.as_slice() < h.as_slice());

    midpoint(&lo, hi.as_deref())
        .into_iter()
        .map(|d| char::from(MIN_DIGIT + d))
        .collect()
}

/// Return a key that sorts after `last` (or a middle key when there is none).
#[must_use]
pub fn key_after(last: Option<&str>) -> String {
    key_between(last, None)
}

fn digits(key: &str) -> Vec<u8> {
    key.bytes()
        .map(|b| b.clamp(MIN_DIGIT, b'z') - MIN_DIGIT)
        .collect()
}

fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Vec<u8> {
    if let Some(hi) = hi {
        let mut n = 0;
        while n < hi.len() && lo.get(n).copied().unwrap_or(0) == hi[n] {
            n += 1;
        }
        if n > 0 {
            let rest_lo = lo.get(n..).unwrap_or(&[]);
            let rest_hi = Some(&hi[n..]).filter(|h| !h.is_empty());
            let mut out = hi[..n].to_vec();
            out.extend(midpoint(rest_lo, rest_hi));
            return out;
        }
    }

    let d_lo = lo.first().copied().unwrap_or(0);
    let d_hi = hi.and_then(|h| h.first().copied()).unwrap_or(BASE);

    if d_hi > d_lo + 1 {
        return vec![(d_lo + d_hi) / 2];
    }

    if let Some(hi) = hi.filter(|h| h.len() > 1) {
        return vec![hi[0]];
    }

    let mut out = vec![d_lo];
    out.extend(midpoint(lo.get(1..).unwrap_or(&[]), None));
    out
}
