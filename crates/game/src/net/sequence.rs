//! Wraparound-aware arithmetic for 16-bit packet sequence numbers.
//!
//! Newness is only meaningful between sequences less than half the domain
//! apart. `sequence_greater_than` is therefore not transitive across the whole
//! domain: `a > b` and `b > c` does not imply `a > c` once the three values
//! span more than `SEQUENCE_DOMAIN / 2`. Callers must keep every in-flight
//! sequence inside that window.

pub const SEQUENCE_DOMAIN: u32 = 1 << 16;

const SEQUENCE_WRAP_THRESHOLD: u16 = (SEQUENCE_DOMAIN / 2) as u16;

#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

/// Reduces any integer, including negative ones, into `[0, SEQUENCE_DOMAIN)`.
#[inline]
pub fn wrap_sequence(value: i64) -> u16 {
    value.rem_euclid(SEQUENCE_DOMAIN as i64) as u16
}

/// Number of steps from `older` forward to `newer`, modulo the domain.
#[inline]
pub fn sequence_distance(newer: u16, older: u16) -> u16 {
    newer.wrapping_sub(older)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u16::MAX));
        assert!(!sequence_greater_than(u16::MAX, 0));
        assert!(!sequence_greater_than(7, 7));
    }

    #[test]
    fn test_half_domain_boundary() {
        assert!(sequence_greater_than(32768, 0));
        assert!(!sequence_greater_than(0, 32768));
        assert!(!sequence_greater_than(32769, 0));
        assert!(sequence_greater_than(0, 32769));
    }

    #[test]
    fn test_wrap_negative_and_large() {
        assert_eq!(wrap_sequence(-1), u16::MAX);
        assert_eq!(wrap_sequence(65536), 0);
        assert_eq!(wrap_sequence(65537 + 65536), 1);
        assert_eq!(wrap_sequence(-65536 * 3 + 5), 5);
    }

    #[test]
    fn test_distance_wraps() {
        assert_eq!(sequence_distance(2, u16::MAX), 3);
        assert_eq!(sequence_distance(10, 10), 0);
    }
}
