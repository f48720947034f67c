use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde_json::Value;

pub const NS_MAIN: i32 = 0;
pub const MAIN_FOLDER: &str = "Main";

/// Namespace display name to numeric index, main namespace excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMap {
    entries: BTreeMap<String, i32>,
}

impl NamespaceMap {
    /// Build from the `query.namespaces` object of a siteinfo response. Records are
    /// keyed by index; the display name is read from `key` (`name`, or `*` on the
    /// legacy format).
    pub fn from_siteinfo(namespaces: &Value, key: &str) -> Result<Self> {
        let records = match namespaces {
            Value::Object(records) => records,
            Value::Null => bail!("siteinfo response has no namespaces"),
            _ => bail!("siteinfo namespaces must be an object"),
        };

        let mut entries = BTreeMap::new();
        for (index, record) in records {
            let Some(name) = record.get(key).and_then(Value::as_str) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let id = match record.get("id").and_then(Value::as_i64) {
                Some(id) => i32::try_from(id)?,
                None => index
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| anyhow::anyhow!("invalid namespace index `{index}`"))?,
            };
            entries.insert(name.to_string(), id);
        }
        Ok(Self { entries })
    }

    pub fn index_of(&self, name: &str) -> Option<i32> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.entries.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Split a title into `(namespace folder, bare name)`. Titles without a known
    /// prefix belong to `Main`.
    pub fn split_title<'a>(&self, title: &'a str) -> (&'a str, &'a str) {
        for name in self.entries.keys() {
            if let Some(rest) = title.strip_prefix(name.as_str())
                && let Some(bare) = rest.strip_prefix(':')
            {
                return (&title[..name.len()], bare);
            }
        }
        (MAIN_FOLDER, title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn siteinfo_v2() -> Value {
        json!({
            "-2": {"id": -2, "name": "Media", "canonical": "Media"},
            "0": {"id": 0, "name": ""},
            "1": {"id": 1, "name": "Talk"},
            "10": {"id": 10, "name": "Template"},
            "14": {"id": 14, "name": "Category"}
        })
    }

    #[test]
    fn keeps_only_records_with_display_names() {
        let map = NamespaceMap::from_siteinfo(&siteinfo_v2(), "name").expect("map");
        assert_eq!(map.len(), 4);
        assert_eq!(map.index_of("Template"), Some(10));
        assert_eq!(map.index_of("Media"), Some(-2));
        assert_eq!(map.index_of(""), None);
    }

    #[test]
    fn reads_legacy_star_key() {
        let namespaces = json!({
            "0": {"id": 0, "*": "", "case": "first-letter"},
            "4": {"id": 4, "*": "Project"},
            "6": {"id": 6, "*": "File"}
        });
        let map = NamespaceMap::from_siteinfo(&namespaces, "*").expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map.index_of("File"), Some(6));

        let by_name = NamespaceMap::from_siteinfo(&namespaces, "name").expect("map");
        assert!(by_name.is_empty());
    }

    #[test]
    fn falls_back_to_object_key_for_index() {
        let namespaces = json!({"3000": {"name": "Lore"}});
        let map = NamespaceMap::from_siteinfo(&namespaces, "name").expect("map");
        assert_eq!(map.index_of("Lore"), Some(3000));
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(NamespaceMap::from_siteinfo(&json!([]), "name").is_err());
        assert!(NamespaceMap::from_siteinfo(&Value::Null, "name").is_err());
    }

    #[test]
    fn split_title_uses_known_prefixes() {
        let map = NamespaceMap::from_siteinfo(&siteinfo_v2(), "name").expect("map");
        assert_eq!(map.split_title("Template:Infobox"), ("Template", "Infobox"));
        assert_eq!(map.split_title("Talk:A:B"), ("Talk", "A:B"));
        assert_eq!(map.split_title("Title"), ("Main", "Title"));
        assert_eq!(map.split_title("Ratio: A Story"), ("Main", "Ratio: A Story"));
    }
}
