//! Hierarchical name/value configuration, passed through explicitly
//! rather than kept as a process-wide singleton.
//!
//! Keys are `*`-separated paths (`"column*quantity*nbins"`); lookup tries
//! the full key, then drops the leftmost segment and retries, so a more
//! specific entry always wins over a more general one.

use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct Config {
    entries: HashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Config {
            entries: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up `key`, trying progressively shorter `*`-separated suffixes
    /// of it until a match is found: `a*b*c`, then `b*c`, then `c`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut rest = key;
        loop {
            if let Some(v) = self.entries.get(rest) {
                return Some(v);
            }
            match rest.find('*') {
                Some(idx) => rest = &rest[idx + 1..],
                None => return None,
            }
        }
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key)?.parse().ok()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("1") | Some("true") | Some("yes"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn longest_prefix_wins() {
        let mut cfg = Config::new();
        cfg.set("nbins", "50");
        cfg.set("column*quantity*nbins", "100");
        assert_eq!(cfg.get("column*quantity*nbins"), Some("100"));
        assert_eq!(cfg.get("column*price*nbins"), Some("50"));
        assert_eq!(cfg.get("column*price*ncoarse"), None);
    }

    #[test]
    fn typed_accessors() {
        let mut cfg = Config::new();
        cfg.set("column*x*nbins", "32");
        cfg.set("column*x*uncompressed", "true");
        assert_eq!(cfg.get_usize("column*x*nbins"), Some(32));
        assert!(cfg.get_bool("column*x*uncompressed"));
        assert!(!cfg.get_bool("column*x*nbins"));
    }
}
