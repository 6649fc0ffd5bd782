use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use domain::error::{ConfigError, ValidationError};

const BUILTIN: &str = include_str!("node_types.csv");

/// Cores per node for every node type of every known system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypes {
    systems: BTreeMap<String, BTreeMap<String, u32>>,
}

impl NodeTypes {
    /// The table shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_reader(BUILTIN.as_bytes(), "builtin").expect("builtin node types table is valid")
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let source_name = path.display().to_string();
        let file = File::open(path).map_err(|e| ConfigError::NodeTypes {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;
        Self::from_reader(file, &source_name)
    }

    /// Reads `system,<type>,…` rows. An empty cell means the system has no
    /// nodes of that type.
    pub fn from_reader(reader: impl Read, source_name: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::NodeTypes {
            source_name: source_name.to_owned(),
            message,
        };

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers().map_err(|e| invalid(e.to_string()))?.clone();
        if headers.get(0) != Some("system") {
            return Err(invalid("first column must be `system`".to_owned()));
        }

        let mut systems = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| invalid(e.to_string()))?;
            let Some(system) = record.get(0).filter(|s| !s.is_empty()) else {
                continue;
            };

            let mut types = BTreeMap::new();
            for (node_type, cell) in headers.iter().zip(record.iter()).skip(1) {
                if cell.is_empty() {
                    continue;
                }
                let cores = cell.parse::<u32>().map_err(|_| {
                    invalid(format!("`{cell}` is not a core count ({system}, {node_type})"))
                })?;
                types.insert(node_type.to_owned(), cores);
            }
            systems.insert(system.to_lowercase(), types);
        }

        Ok(Self { systems })
    }

    pub fn systems(&self) -> Vec<String> {
        self.systems.keys().cloned().collect()
    }

    pub fn node_types(&self, system: &str) -> Result<Vec<String>, ValidationError> {
        Ok(self.types_of(system)?.keys().cloned().collect())
    }

    pub fn cores(&self, system: &str, node_type: &str) -> Result<u32, ValidationError> {
        let types = self.types_of(system)?;
        types
            .get(node_type)
            .copied()
            .ok_or_else(|| ValidationError::UnknownNodeType {
                system: system.to_owned(),
                node_type: node_type.to_owned(),
                known: types.keys().cloned().collect(),
            })
    }

    fn types_of(&self, system: &str) -> Result<&BTreeMap<String, u32>, ValidationError> {
        self.systems
            .get(&system.to_lowercase())
            .ok_or_else(|| ValidationError::UnknownSystem {
                system: system.to_owned(),
                known: self.systems(),
            })
    }
}

impl Default for NodeTypes {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use domain::error::ValidationError;
    use indoc::indoc;

    use super::NodeTypes;

    #[test]
    fn builtin_table() {
        let table = NodeTypes::builtin();
        assert_eq!(128, table.cores("narwhal", "compute").unwrap());
        assert_eq!(1, table.cores("Narwhal", "transfer").unwrap());
        assert_eq!(64, table.cores("onyx", "knl").unwrap());
        assert!(table.systems().contains(&"carpenter".to_owned()));
    }

    #[test]
    fn empty_cells_are_unavailable() {
        let err = NodeTypes::builtin().cores("narwhal", "knl").unwrap_err();
        match err {
            ValidationError::UnknownNodeType { known, .. } => {
                assert_eq!(vec!["bigmem", "compute", "gpu", "transfer"], known)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            NodeTypes::builtin().cores("nowhere", "compute"),
            Err(ValidationError::UnknownSystem { .. })
        ));
    }

    #[test]
    fn custom_table() {
        let csv = indoc! {"
            system, compute, gpu
            mine, 12, 4
        "};
        let table = NodeTypes::from_reader(csv.as_bytes(), "test").unwrap();
        assert_eq!(4, table.cores("mine", "gpu").unwrap());

        let bad = "system,compute\nmine,lots\n";
        assert!(NodeTypes::from_reader(bad.as_bytes(), "test").is_err());
        assert!(NodeTypes::from_reader("name,compute\n".as_bytes(), "test").is_err());
    }
}
