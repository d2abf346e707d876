//! Fractional order keys.
//!
//! A key is a string over `a..=z` read as a base-26 fraction. Between any
//! two distinct keys there is always another one, so a block can be placed
//! between its neighbours without renumbering anyone else. Generated keys
//! never end in `a`, which keeps room below every key.
//!
//! Keys handed out for inserts and moves carry a suffix encoding the
//! writer's stamp (see [`stamped`]), so two writers picking the same slot
//! still end up with distinct keys that sort like their stamps.

use crate::clock::Stamp;

const BASE: u8 = 26;

fn digit(key: &str, index: usize) -> u8 {
    key.as_bytes()
        .get(index)
        .map(|b| b.saturating_sub(b'a').min(BASE - 1))
        .unwrap_or(0)
}

fn push_digit(key: &mut String, digit: u8) {
    key.push(char::from(b'a' + digit));
}

/// A key sorting strictly after `lo` and strictly before `hi`.
///
/// `None` means unbounded. When `lo >= hi` the bound `hi` is ignored and the
/// key lands right after `lo`.
pub fn key_between(lo: Option<&str>, hi: Option<&str>) -> String {
    let lo = lo.unwrap_or("");
    let hi = match hi {
        Some(hi) if !lo.is_empty() && lo >= hi => None,
        other => other,
    };

    let mut key = String::new();
    let mut bounded = hi;
    for index in 0.. {
        let l = digit(lo, index);
        let h = match bounded {
            Some(hi) if index >= hi.len() => return key_between(Some(lo), None),
            Some(hi) => digit(hi, index),
            None => BASE,
        };

        if h > l + 1 {
            push_digit(&mut key, (l + h) / 2);
            break;
        }
        push_digit(&mut key, l);
        if h == l + 1 {
            // Everything below this prefix already sorts before `hi`
            bounded = None;
        }
    }
    key
}

/// Base-25 digits (`b..=z`) behind a length digit, so longer numbers sort
/// after shorter ones
fn push_number(key: &mut String, mut n: u64) {
    let radix = u64::from(BASE - 1);
    let mut digits = Vec::new();
    loop {
        digits.push((n % radix) as u8 + 1);
        n /= radix;
        if n == 0 {
            break;
        }
    }
    push_digit(key, digits.len() as u8);
    for d in digits.into_iter().rev() {
        push_digit(key, d);
    }
}

/// Make `key` unique to `stamp`.
///
/// The suffix orders the same way stamps do. `key` must come from
/// [`key_between`], which never returns a prefix of its upper bound, so the
/// result stays strictly inside the same slot.
pub fn stamped(mut key: String, stamp: &Stamp) -> String {
    push_number(&mut key, stamp.wall_ms);
    push_number(&mut key, u64::from(stamp.counter));
    for byte in stamp.actor.as_str().bytes() {
        push_digit(&mut key, byte / (BASE - 1) + 1);
        push_digit(&mut key, byte % (BASE - 1) + 1);
    }
    key
}

/// `count` increasing, evenly spread keys of equal width
pub fn spread(count: usize) -> Vec<String> {
    const DIGITS: usize = (BASE - 1) as usize;
    let mut width = 1;
    let mut capacity = DIGITS;
    while capacity < count {
        width += 1;
        capacity = capacity.saturating_mul(DIGITS);
    }

    (0..count)
        .map(|index| {
            let mut digits = vec![0u8; width];
            let mut rest = index;
            for slot in digits.iter_mut().rev() {
                *slot = (rest % DIGITS) as u8 + 1;
                rest /= DIGITS;
            }
            let mut key = String::with_capacity(width);
            for d in digits {
                push_digit(&mut key, d);
            }
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn between(lo: Option<&str>, hi: Option<&str>) -> String {
        let key = key_between(lo, hi);
        if let Some(lo) = lo {
            assert!(key.as_str() > lo, "{key} should sort after {lo}");
        }
        if let (Some(lo), Some(hi)) = (lo, hi) {
            if lo < hi {
                assert!(key.as_str() < hi, "{key} should sort before {hi}");
            }
        }
        assert!(!key.ends_with('a'));
        key
    }

    #[test]
    fn test_unbounded() {
        assert_eq!(between(None, None), "n");
        assert_eq!(between(Some("n"), None), "t");
        assert_eq!(between(Some("z"), None), "zn");
    }

    #[test]
    fn test_adjacent_keys_go_deeper() {
        assert_eq!(between(Some("b"), Some("c")), "bn");
        assert_eq!(between(None, Some("b")), "an");
        between(Some("bz"), Some("c"));
        between(Some("bzz"), Some("c"));
    }

    #[test]
    fn test_repeated_inserts_at_front_and_middle() {
        let mut first = "n".to_string();
        for _ in 0..50 {
            first = between(None, Some(&first));
        }

        let (mut lo, hi) = ("m".to_string(), "n".to_string());
        for _ in 0..50 {
            lo = between(Some(&lo), Some(&hi));
        }
    }

    #[test]
    fn test_equal_bounds_land_after_lo() {
        assert_eq!(key_between(Some("n"), Some("n")), "t");
        assert_eq!(key_between(Some("t"), Some("n")), "w");
    }

    #[test]
    fn test_stamped_keys_stay_in_slot_and_sort_by_stamp() {
        let base = key_between(Some("b"), Some("c"));
        let early = stamped(base.clone(), &Stamp::new(100, 0, "ben"));
        let late = stamped(base.clone(), &Stamp::new(100, 1, "ana"));
        let later = stamped(base.clone(), &Stamp::new(2_000_000, 0, "ana"));
        let tie = stamped(base, &Stamp::new(100, 1, "anna"));

        for key in [&early, &late, &later, &tie] {
            assert!(key.as_str() > "b" && key.as_str() < "c", "{key} left its slot");
            assert!(!key.ends_with('a'));
        }
        assert!(early < late);
        assert!(late < tie);
        assert!(tie < later);

        // Room between two neighbours that share a slot
        let middle = between(Some(&early), Some(&late));
        assert!(middle < late);
    }

    #[test]
    fn test_spread_is_increasing() {
        let keys = spread(700);
        assert_eq!(keys[0], "bbb");
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(spread(3), vec!["b", "c", "d"]);
        assert!(spread(0).is_empty());
    }
}
