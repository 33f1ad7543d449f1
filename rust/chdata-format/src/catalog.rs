//! Case-aware name lookup shared by the data type and aggregate function catalogs.

use std::collections::BTreeSet;

use ahash::AHashMap;
use chdata_common::{Result, error::Error};

/// One catalog entry: canonical name, case sensitivity, aliases and the value itself.
pub(crate) struct Entry<T> {
    pub name: &'static str,
    pub case_sensitive: bool,
    pub aliases: &'static [&'static str],
    pub value: T,
}

/// Immutable name and alias index.
///
/// Case-insensitive names and every alias are stored upper-cased. Lookup tries the
/// name as given first and the upper-cased name second.
pub(crate) struct NameCatalog<T> {
    by_name: AHashMap<String, T>,
    aliases: BTreeSet<String>,
}

impl<T: Copy> NameCatalog<T> {
    /// Builds the index, failing on the first name or alias that is already taken.
    pub fn build(entries: impl IntoIterator<Item = Entry<T>>) -> Result<NameCatalog<T>> {
        let mut by_name = AHashMap::<String, (T, &'static str)>::new();
        let mut aliases = BTreeSet::new();
        for entry in entries {
            let key = if entry.case_sensitive {
                entry.name.to_string()
            } else {
                entry.name.to_uppercase()
            };
            Self::insert(&mut by_name, key, entry.value, entry.name)?;

            for alias in entry.aliases {
                let key = alias.to_uppercase();
                aliases.insert(key.clone());
                Self::insert(&mut by_name, key, entry.value, entry.name)?;
            }
        }

        Ok(NameCatalog {
            by_name: by_name.into_iter().map(|(k, (v, _))| (k, v)).collect(),
            aliases,
        })
    }

    fn insert(
        map: &mut AHashMap<String, (T, &'static str)>,
        key: String,
        value: T,
        owner: &'static str,
    ) -> Result<()> {
        if let Some((_, used)) = map.get(&key) {
            return Err(Error::invalid_format(
                "catalog",
                format!("[{key}] is used by type [{used}]"),
            ));
        }
        map.insert(key, (value, owner));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<T> {
        self.by_name
            .get(name)
            .or_else(|| self.by_name.get(&name.to_uppercase()))
            .copied()
    }

    /// All aliases, upper-cased, in lexicographic order.
    pub fn aliases(&self) -> &BTreeSet<String> {
        &self.aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &'static str, aliases: &'static [&'static str], value: u8) -> Entry<u8> {
        Entry {
            name,
            case_sensitive: false,
            aliases,
            value,
        }
    }

    #[test]
    fn test_lookup_is_case_aware() {
        let catalog = NameCatalog::build([
            Entry {
                name: "sum",
                case_sensitive: true,
                aliases: &[],
                value: 1,
            },
            entry("Float64", &["DOUBLE", "double precision"], 2),
        ])
        .unwrap();
        assert_eq!(catalog.lookup("sum"), Some(1));
        assert_eq!(catalog.lookup("SUM"), None);
        assert_eq!(catalog.lookup("float64"), Some(2));
        assert_eq!(catalog.lookup("Double Precision"), Some(2));
        assert!(catalog.aliases().contains("DOUBLE PRECISION"));
    }

    #[test]
    fn test_duplicate_alias_fails() {
        let err = NameCatalog::build([entry("A", &["X"], 1), entry("B", &["x"], 2)])
            .err()
            .unwrap();
        assert!(err.to_string().contains("[X] is used by type [A]"));
    }
}
