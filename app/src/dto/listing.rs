use domain::model::vo::{ParsedRow, Value};
use serde::{Deserialize, Deserializer};

/// Body of the `listdirectory` endpoint.
#[derive(Debug, Deserialize)]
pub struct ListingReply {
    pub path: Option<String>,
    pub dirs: Option<Vec<DirEntry>>,
    #[serde(default)]
    pub files: Vec<DirEntry>,
    #[serde(default)]
    pub links: Vec<DirEntry>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirEntry {
    #[serde(default)]
    pub perms: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub group: String,
    #[serde(default, deserialize_with = "size")]
    pub size: u64,
    #[serde(rename = "lastmodified", default)]
    pub last_modified: String,
    #[serde(default)]
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryListing {
    pub path: String,
    /// Directories first, then files, then links, each in service order.
    pub entries: Vec<DirEntry>,
}

impl ListingReply {
    /// `None` when the service reported an error or omitted the entries.
    pub fn into_listing(self, requested: &str) -> Option<DirectoryListing> {
        if self.error.as_deref().is_some_and(|e| !e.is_empty()) {
            return None;
        }
        let mut entries = self.dirs?;
        entries.extend(self.files);
        entries.extend(self.links);
        Some(DirectoryListing {
            path: self.path.unwrap_or_else(|| requested.to_owned()),
            entries,
        })
    }
}

impl DirEntry {
    /// From a row of the `ls -l --time-style=long-iso` shape.
    pub fn from_ls_row(row: &ParsedRow, dir: &str) -> Option<Self> {
        let perms = row.text("permissions")?.to_owned();
        let name = row.text("name")?.to_owned();
        let kind = match perms.chars().next() {
            Some('d') => "dir",
            Some('l') => "link",
            _ => "file",
        };
        Some(Self {
            kind: kind.to_owned(),
            owner: row.text("owner").unwrap_or_default().to_owned(),
            group: row.text("group").unwrap_or_default().to_owned(),
            size: row.get("size").and_then(Value::as_i64).unwrap_or(0).max(0) as u64,
            last_modified: row.get("modified").map(ToString::to_string).unwrap_or_default(),
            path: format!("{}/{name}", dir.trim_end_matches('/')),
            perms,
            name,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == "dir" || self.perms.starts_with('d')
    }
}

fn size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Number(n) => Ok(n),
        Size::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
