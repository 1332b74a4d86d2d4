//! Dice resolution subsystems.
//!
//! Attribute and skill checks count successes in a d6 pool; accuracy and
//! initiative checks total 2d6 with three-keep-two advantage.

pub mod d6;
pub mod pool;

use std::collections::HashMap;

/// Whether two or more of `faces` show the same value at or above `threshold`.
pub fn has_critical_pair(faces: &[u32], threshold: u32) -> bool {
    let mut seen: HashMap<u32, usize> = HashMap::new();
    for &face in faces.iter().filter(|&&f| f >= threshold) {
        let count = seen.entry(face).or_default();
        *count += 1;
        if *count >= 2 {
            return true;
        }
    }
    false
}

fn count_ones(faces: &[u32]) -> usize {
    faces.iter().filter(|&&f| f == 1).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_pair() {
        assert!(has_critical_pair(&[6, 6], 6));
        assert!(!has_critical_pair(&[6, 5], 6));
        assert!(has_critical_pair(&[5, 2, 5], 5));
        assert!(!has_critical_pair(&[4, 4], 5));
        // Default threshold 7 can never crit on a d6.
        assert!(!has_critical_pair(&[6, 6, 6], 7));
    }
}
