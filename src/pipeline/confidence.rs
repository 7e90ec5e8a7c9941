//! Categorical confidence labels mapped onto an ordinal scale.

use std::collections::BTreeMap;

use crate::error::{ConfigError, invalid_config};

/// Label → ordinal table. Labels are matched trimmed and ASCII-lowercased.
///
/// | Label           | Ordinal |
/// |-----------------|---------|
/// | `l`, `low`      | 1       |
/// | `n`, `nominal`  | 2       |
/// | `h`, `high`     | 3       |
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceTable {
    entries: BTreeMap<String, u32>,
}

impl Default for ConfidenceTable {
    fn default() -> Self {
        let entries = [
            ("l", 1),
            ("low", 1),
            ("n", 2),
            ("nominal", 2),
            ("h", 3),
            ("high", 3),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self { entries }
    }
}

impl ConfidenceTable {
    pub fn new(entries: BTreeMap<String, u32>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(invalid_config("confidence table is empty"));
        }

        let mut normalized = BTreeMap::new();
        for (label, ordinal) in entries {
            let key = normalize_label(&label);
            if key.is_empty() {
                return Err(invalid_config("confidence table has an empty label"));
            }
            if ordinal == 0 {
                return Err(invalid_config(format!("confidence label '{label}' has ordinal 0")));
            }
            if normalized.insert(key, ordinal).is_some() {
                return Err(invalid_config(format!("duplicate confidence label '{label}'")));
            }
        }

        Ok(Self { entries: normalized })
    }

    /// Returns the ordinal for `label`, or `None` when it is empty or not in the table.
    pub fn encode(&self, label: &str) -> Option<u32> {
        self.entries.get(&normalize_label(label)).copied()
    }
}

fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let t = ConfidenceTable::default();
        assert_eq!(t.encode("l"), Some(1));
        assert_eq!(t.encode("nominal"), Some(2));
        assert_eq!(t.encode(" H "), Some(3));
    }

    #[test]
    fn test_unknown_labels() {
        let t = ConfidenceTable::default();
        assert_eq!(t.encode(""), None);
        assert_eq!(t.encode("x"), None);
        // numeric MODIS confidences are not part of the default vocabulary
        assert_eq!(t.encode("85"), None);
    }

    #[test]
    fn test_rejects_duplicates_after_normalization() {
        let entries = [("h".to_string(), 3), ("H".to_string(), 4)].into_iter().collect();
        assert!(ConfidenceTable::new(entries).is_err());
    }

    #[test]
    fn test_rejects_zero_and_empty() {
        assert!(ConfidenceTable::new(BTreeMap::new()).is_err());
        let entries = [("low".to_string(), 0)].into_iter().collect();
        assert!(ConfidenceTable::new(entries).is_err());
        let entries = [(" ".to_string(), 1)].into_iter().collect();
        assert!(ConfidenceTable::new(entries).is_err());
    }
}
