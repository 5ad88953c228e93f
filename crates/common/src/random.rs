//! Random names for generated fixtures

use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use std::collections::HashSet;

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generator of names that never repeat within one run
#[derive(Debug, Default)]
pub struct RandomNames {
    issued: HashSet<String>,
}

impl RandomNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// A name of `len` characters that starts with a letter and has not been
    /// returned before by this generator
    pub fn name(&mut self, len: usize) -> String {
        loop {
            let candidate = random_name(len);
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.len()
    }
}

fn random_name(len: usize) -> String {
    if len == 0 {
        return String::new();
    }
    let mut rng = rand::thread_rng();
    let first = LETTERS[rng.gen_range(0..LETTERS.len())] as char;
    let mut name = String::with_capacity(len);
    name.push(first);
    name.push_str(&Alphanumeric.sample_string(&mut rng, len - 1));
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_shape() {
        let mut names = RandomNames::new();
        for _ in 0..50 {
            let name = names.name(8);
            assert_eq!(name.len(), 8);
            assert!(name.chars().next().unwrap().is_ascii_alphabetic());
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
        }
        assert_eq!(names.issued(), 50);
    }

    #[test]
    fn test_short_names_do_not_repeat() {
        let mut names = RandomNames::new();
        let mut seen = HashSet::new();
        for _ in 0..40 {
            assert!(seen.insert(names.name(2)));
        }
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(random_name(0), "");
    }
}
