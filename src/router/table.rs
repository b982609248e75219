use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static GROUP_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());

/// Destination for one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingEntry {
    #[serde(rename = "id")]
    pub role_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// A display name maps to one entry, or to several when the name spans groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberRoute {
    Single(RoutingEntry),
    Group(Vec<RoutingEntry>),
}

impl MemberRoute {
    fn entries(&self) -> &[RoutingEntry] {
        match self {
            MemberRoute::Single(entry) => std::slice::from_ref(entry),
            MemberRoute::Group(entries) => entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New display name
    Inserted,
    /// Name already existed with other roles; the entry joined its group
    MergedIntoGroup,
    /// The role id was already routed; nothing changed
    AlreadyPresent,
}

/// Role id -> destination channel mapping, keyed by display name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    #[serde(default)]
    members: BTreeMap<String, MemberRoute>,
}

impl RoutingTable {
    /// Find the entry for a role, searching inside groups by role id
    pub fn lookup(&self, role_id: &str) -> Option<(&str, &RoutingEntry)> {
        self.members.iter().find_map(|(name, route)| {
            route
                .entries()
                .iter()
                .find(|entry| entry.role_id == role_id)
                .map(|entry| (name.as_str(), entry))
        })
    }

    /// Add an entry under an already sanitized display name.
    ///
    /// Role ids stay unique across the whole table: a role that is already
    /// routed is left untouched. A name collision with a different role turns
    /// the name into a group instead of overwriting it.
    pub fn insert(&mut self, name: &str, entry: RoutingEntry) -> InsertOutcome {
        if self.lookup(&entry.role_id).is_some() {
            return InsertOutcome::AlreadyPresent;
        }

        match self.members.remove(name) {
            None => {
                self.members
                    .insert(name.to_string(), MemberRoute::Single(entry));
                InsertOutcome::Inserted
            }
            Some(MemberRoute::Single(existing)) => {
                self.members
                    .insert(name.to_string(), MemberRoute::Group(vec![existing, entry]));
                InsertOutcome::MergedIntoGroup
            }
            Some(MemberRoute::Group(mut entries)) => {
                entries.push(entry);
                self.members
                    .insert(name.to_string(), MemberRoute::Group(entries));
                InsertOutcome::MergedIntoGroup
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&MemberRoute> {
        self.members.get(name)
    }

    pub fn name_count(&self) -> usize {
        self.members.len()
    }

    pub fn role_count(&self) -> usize {
        self.members.values().map(|route| route.entries().len()).sum()
    }
}

/// Split a bracketed group tag out of a display name.
///
/// `"Jane [GroupX]"` becomes `("Jane", Some("GroupX"))`. Only the first tag
/// becomes the group; every tag is removed from the name.
pub fn split_group_tag(display_name: &str) -> (String, Option<String>) {
    let group = GROUP_TAG
        .captures(display_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|g| !g.is_empty());

    let stripped = GROUP_TAG.replace_all(display_name, " ");
    let name = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    (name, group)
}

/// JSON document backing the routing table
pub struct RouteStore {
    path: PathBuf,
}

impl RouteStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read the document; a missing file is an empty table
    pub fn load(&self) -> Result<RoutingTable> {
        if !self.path.exists() {
            debug!(
                "Routing document {} not found, starting empty",
                self.path.display()
            );
            return Ok(RoutingTable::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read routing document: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse routing document: {}", self.path.display()))
    }

    /// Rewrite the whole document
    pub async fn save(&self, table: &RoutingTable) -> Result<()> {
        let json = serde_json::to_string_pretty(table).context("Failed to serialize routing table")?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(role_id: &str, channel_id: &str, group: Option<&str>) -> RoutingEntry {
        RoutingEntry {
            role_id: role_id.to_string(),
            channel_id: channel_id.to_string(),
            group: group.map(str::to_string),
        }
    }

    const DOCUMENT: &str = r#"{
        "members": {
            "Jane": { "id": "111111111111111111", "channel_id": "900000000000000001" },
            "Mina": [
                { "id": "222222222222222222", "channel_id": "900000000000000002", "group": "Alpha" },
                { "id": "333333333333333333", "channel_id": "900000000000000003", "group": "Beta" }
            ]
        }
    }"#;

    #[test]
    fn test_lookup_single_and_group_entries() {
        let table: RoutingTable = serde_json::from_str(DOCUMENT).unwrap();

        let (name, found) = table.lookup("111111111111111111").unwrap();
        assert_eq!(name, "Jane");
        assert_eq!(found.channel_id, "900000000000000001");

        let (name, found) = table.lookup("333333333333333333").unwrap();
        assert_eq!(name, "Mina");
        assert_eq!(found.channel_id, "900000000000000003");
        assert_eq!(found.group.as_deref(), Some("Beta"));

        assert!(table.lookup("444444444444444444").is_none());
        assert_eq!(table.name_count(), 2);
        assert_eq!(table.role_count(), 3);
    }

    #[test]
    fn test_lookup_does_not_match_names() {
        let table: RoutingTable = serde_json::from_str(DOCUMENT).unwrap();
        assert!(table.lookup("Jane").is_none());
    }

    #[test]
    fn test_insert_new_name() {
        let mut table = RoutingTable::default();
        let outcome = table.insert("Jane", entry("1", "10", Some("GroupX")));
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(
            table.get("Jane"),
            Some(&MemberRoute::Single(entry("1", "10", Some("GroupX"))))
        );
    }

    #[test]
    fn test_insert_name_collision_merges_into_group() {
        let mut table = RoutingTable::default();
        table.insert("Jane", entry("1", "10", Some("A")));
        assert_eq!(
            table.insert("Jane", entry("2", "20", Some("B"))),
            InsertOutcome::MergedIntoGroup
        );
        assert_eq!(
            table.insert("Jane", entry("3", "30", None)),
            InsertOutcome::MergedIntoGroup
        );

        match table.get("Jane").unwrap() {
            MemberRoute::Group(entries) => {
                let ids: Vec<&str> = entries.iter().map(|e| e.role_id.as_str()).collect();
                assert_eq!(ids, vec!["1", "2", "3"]);
            }
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(table.lookup("2").unwrap().1.channel_id, "20");
    }

    #[test]
    fn test_insert_existing_role_is_noop() {
        let mut table = RoutingTable::default();
        table.insert("Jane", entry("1", "10", None));
        assert_eq!(
            table.insert("Someone Else", entry("1", "99", None)),
            InsertOutcome::AlreadyPresent
        );
        assert_eq!(table.name_count(), 1);
        assert_eq!(table.lookup("1").unwrap().1.channel_id, "10");
    }

    #[test]
    fn test_split_group_tag() {
        assert_eq!(
            split_group_tag("Jane [GroupX]"),
            ("Jane".to_string(), Some("GroupX".to_string()))
        );
        assert_eq!(
            split_group_tag("[Alpha] Mina  Lee"),
            ("Mina Lee".to_string(), Some("Alpha".to_string()))
        );
        assert_eq!(split_group_tag("Solo"), ("Solo".to_string(), None));
        assert_eq!(split_group_tag("Empty []"), ("Empty".to_string(), None));
    }

    #[test]
    fn test_serialized_shape() {
        let mut table = RoutingTable::default();
        table.insert("Jane", entry("1", "10", Some("GroupX")));
        table.insert("Solo", entry("2", "20", None));

        let value = serde_json::to_value(&table).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "members": {
                    "Jane": { "id": "1", "channel_id": "10", "group": "GroupX" },
                    "Solo": { "id": "2", "channel_id": "20" }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RouteStore::new(dir.path().join("db.json"));

        let mut table = store.load().unwrap();
        assert_eq!(table.name_count(), 0);

        table.insert("Jane", entry("1", "10", Some("GroupX")));
        table.insert("Jane", entry("2", "20", None));
        store.save(&table).await.unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, table);
        let (_, found) = reloaded.lookup("1").unwrap();
        assert_eq!(found, &entry("1", "10", Some("GroupX")));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\n  \"members\""));
    }

    #[test]
    fn test_load_rejects_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(RouteStore::new(path).load().is_err());
    }

    #[tokio::test]
    async fn test_save_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = RouteStore::new(dir.path().join("missing").join("db.json"));
        assert!(store.save(&RoutingTable::default()).await.is_err());
    }
}
