//! Password comparison that does not reveal where the first mismatch is.

use subtle::ConstantTimeEq;

/// Whether `presented` equals `expected`.
///
/// Every position up to the longer length is compared, reading missing bytes
/// as zero, and the lengths are folded into the same result.
pub fn constant_time_compare(presented: &[u8], expected: &[u8]) -> bool {
    let mut equal = presented.len().ct_eq(&expected.len());
    for i in 0..presented.len().max(expected.len()) {
        let a = presented.get(i).copied().unwrap_or(0);
        let b = expected.get(i).copied().unwrap_or(0);
        equal &= a.ct_eq(&b);
    }
    equal.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(constant_time_compare(b"", b""));
        assert!(!constant_time_compare(b"secret", b"Secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secrets"));
        assert!(!constant_time_compare(b"", b"\xff"));
        // A missing byte is not the same as a zero byte
        assert!(!constant_time_compare(b"abc", b"abc\0"));
    }

    #[test]
    fn test_mismatch_at_every_position() {
        let reference = b"0123456789abcdef";
        for position in 0..reference.len() {
            let mut candidate = *reference;
            candidate[position] ^= 0x01;
            assert!(!constant_time_compare(reference, &candidate));
        }
    }

    proptest! {
        #[test]
        fn prop_agrees_with_eq(a in proptest::collection::vec(any::<u8>(), 0..32),
                               b in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assert_eq!(constant_time_compare(&a, &b), a == b);
        }
    }
}
