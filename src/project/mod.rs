pub mod dag;
mod item;
mod path;

pub use dag::{Dag, ExecutionPermits};
pub use item::{Connection, ItemDict, ItemType, shorten};
pub use path::{PathKind, SerializedPath};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::error::ToolboxError;
use crate::spec::ToolSpecification;

/// Project file version this build reads and writes
pub const LATEST_PROJECT_VERSION: u64 = 10;

/// Directory holding project configuration
pub const CONFIG_DIR: &str = ".spinetoolbox";

const PROJECT_FILE: &str = "project.json";
const LOCAL_DATA_FILE: &str = "project_local_data.json";

/// The `project` section of a project file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSection {
    pub version: u64,
    #[serde(default)]
    pub description: String,
    /// Specification files by item type
    #[serde(default)]
    pub specifications: BTreeMap<String, Vec<SerializedPath>>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub jumps: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of `project.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub project: ProjectSection,
    #[serde(default)]
    pub items: BTreeMap<String, ItemDict>,
}

impl ProjectDocument {
    /// An empty project at the latest version
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            project: ProjectSection {
                version: LATEST_PROJECT_VERSION,
                description: description.into(),
                specifications: BTreeMap::new(),
                connections: Vec::new(),
                jumps: Vec::new(),
                extra: Map::new(),
            },
            items: BTreeMap::new(),
        }
    }
}

/// An opened project
#[derive(Debug, Clone)]
pub struct Project {
    dir: PathBuf,
    pub document: ProjectDocument,
    /// Tool specifications by name
    pub specifications: BTreeMap<String, ToolSpecification>,
}

impl Project {
    /// Create a new, empty project in `dir`
    pub fn create(dir: &Path, description: &str) -> Result<Self, ToolboxError> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory: {}", dir.display()))?;
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to resolve directory: {}", dir.display()))?;
        let project = Self {
            dir,
            document: ProjectDocument::new(description),
            specifications: BTreeMap::new(),
        };
        project.save()?;
        info!(dir = %project.dir.display(), "created project");
        Ok(project)
    }

    /// Open the project in `dir`
    pub fn open(dir: &Path) -> Result<Self, ToolboxError> {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("project directory not found: {}", dir.display()))?;
        let config_dir = dir.join(CONFIG_DIR);
        let project_file = config_dir.join(PROJECT_FILE);
        if !project_file.is_file() {
            return Err(ToolboxError::Project(format!(
                "project file not found: {}",
                project_file.display()
            )));
        }

        let mut project_dict = read_json(&project_file)?;
        check_version(&project_dict)?;

        let local_data_file = config_dir.join("local").join(LOCAL_DATA_FILE);
        if local_data_file.is_file() {
            let local_data = read_json(&local_data_file)?;
            merge_dicts(local_data, &mut project_dict);
            debug!(path = %local_data_file.display(), "merged local project data");
        }

        if !is_valid(&project_dict) {
            return Err(ToolboxError::Project(format!(
                "project file is not valid: {}",
                project_file.display()
            )));
        }
        let document: ProjectDocument = serde_json::from_value(project_dict)
            .with_context(|| format!("failed to parse project file: {}", project_file.display()))?;

        let specifications = load_specifications(&document, &dir);
        info!(
            dir = %dir.display(),
            items = document.items.len(),
            specifications = specifications.len(),
            "opened project"
        );
        Ok(Self {
            dir,
            document,
            specifications,
        })
    }

    /// Write `project.json`
    pub fn save(&self) -> Result<(), ToolboxError> {
        let config_dir = self.dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("failed to create directory: {}", config_dir.display()))?;
        let path = config_dir.join(PROJECT_FILE);
        let json = serde_json::to_string_pretty(&self.document)
            .context("failed to serialize project")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write project file: {}", path.display()))?;
        debug!(path = %path.display(), "saved project");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Data directory of an item
    pub fn item_data_dir(&self, name: &str) -> PathBuf {
        self.dir.join(CONFIG_DIR).join("items").join(shorten(name))
    }

    pub fn item(&self, name: &str) -> Option<&ItemDict> {
        self.document.items.get(name)
    }

    pub fn items(&self) -> &BTreeMap<String, ItemDict> {
        &self.document.items
    }

    pub fn connections(&self) -> &[Connection] {
        &self.document.project.connections
    }

    /// Find the connection between two items
    pub fn find_connection(&self, source: &str, destination: &str) -> Option<&Connection> {
        self.connections()
            .iter()
            .find(|c| c.source() == source && c.destination() == destination)
    }

    /// Add an item; names must be unique, also after shortening
    pub fn add_item(&mut self, name: &str, item: ItemDict) -> Result<(), ToolboxError> {
        if name.trim().is_empty() {
            return Err(ToolboxError::Project("item name is empty".to_string()));
        }
        let short = shorten(name);
        if self.document.items.keys().any(|n| shorten(n) == short) {
            return Err(ToolboxError::Project(format!(
                "an item named '{}' already exists",
                name
            )));
        }
        self.document.items.insert(name.to_string(), item);
        debug!(name, "added item");
        Ok(())
    }

    /// Remove an item and its connections
    pub fn remove_item(&mut self, name: &str) -> Option<ItemDict> {
        let removed = self.document.items.remove(name)?;
        self.document
            .project
            .connections
            .retain(|c| c.source() != name && c.destination() != name);
        debug!(name, "removed item");
        Some(removed)
    }

    /// Rename an item, updating its connections
    pub fn rename_item(&mut self, old_name: &str, new_name: &str) -> Result<(), ToolboxError> {
        let item = self
            .document
            .items
            .get(old_name)
            .cloned()
            .ok_or_else(|| ToolboxError::Project(format!("no item named '{}'", old_name)))?;
        self.document.items.remove(old_name);
        if let Err(e) = self.add_item(new_name, item.clone()) {
            self.document.items.insert(old_name.to_string(), item);
            return Err(e);
        }
        for connection in &mut self.document.project.connections {
            if connection.from.0 == old_name {
                connection.from.0 = new_name.to_string();
            }
            if connection.to.0 == old_name {
                connection.to.0 = new_name.to_string();
            }
        }
        Ok(())
    }

    /// Connect two items, replacing an existing connection between them
    ///
    /// Returns the replaced connection.
    pub fn add_connection(
        &mut self,
        connection: Connection,
    ) -> Result<Option<Connection>, ToolboxError> {
        for name in [connection.source(), connection.destination()] {
            if !self.document.items.contains_key(name) {
                return Err(ToolboxError::Project(format!("no item named '{}'", name)));
            }
        }
        if connection.source() == connection.destination() {
            return Err(ToolboxError::Project(format!(
                "cannot connect '{}' to itself",
                connection.source()
            )));
        }
        let connections = &mut self.document.project.connections;
        let existing = connections.iter().position(|c| {
            c.source() == connection.source() && c.destination() == connection.destination()
        });
        let replaced = existing.map(|i| connections.remove(i));
        connections.push(connection);
        Ok(replaced)
    }

    pub fn remove_connection(&mut self, source: &str, destination: &str) -> Option<Connection> {
        let connections = &mut self.document.project.connections;
        let index = connections
            .iter()
            .position(|c| c.source() == source && c.destination() == destination)?;
        Some(connections.remove(index))
    }

    /// Register a Tool specification file with the project
    pub fn add_specification(&mut self, path: &Path) -> Result<(), ToolboxError> {
        let path = path
            .canonicalize()
            .with_context(|| format!("specification file not found: {}", path.display()))?;
        let spec = ToolSpecification::load(&path)?;
        if self.specifications.contains_key(&spec.name) {
            return Err(ToolboxError::Project(format!(
                "a specification named '{}' already exists",
                spec.name
            )));
        }
        let serialized = SerializedPath::from_path(&path, &self.dir);
        self.document
            .project
            .specifications
            .entry(ItemType::Tool.to_string())
            .or_default()
            .push(serialized);
        self.specifications.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Split the project into its DAGs
    pub fn dags(&self) -> Vec<Dag> {
        Dag::from_project(self.items().keys(), self.connections())
    }
}

fn read_json(path: &Path) -> Result<Value, ToolboxError> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    Ok(value)
}

/// Refuse projects that were not written at the latest version
pub fn check_version(project_dict: &Value) -> Result<(), ToolboxError> {
    let version = project_dict
        .get("project")
        .and_then(|p| p.get("version"))
        .and_then(Value::as_u64)
        .ok_or_else(|| ToolboxError::Project("project version missing".to_string()))?;
    if version > LATEST_PROJECT_VERSION {
        error!(
            version,
            "Failed to open a project that is newer than what is supported by this version of Toolbox."
        );
        return Err(ToolboxError::ProjectTooNew {
            found: version,
            supported: LATEST_PROJECT_VERSION,
        });
    }
    if version < LATEST_PROJECT_VERSION {
        error!(
            version,
            "Unsupported project version. Open project in Toolbox GUI to upgrade it."
        );
        return Err(ToolboxError::ProjectTooOld { found: version });
    }
    Ok(())
}

/// Check that a project dictionary has every required key
pub fn is_valid(project_dict: &Value) -> bool {
    let Some(project) = project_dict.get("project").and_then(Value::as_object) else {
        return false;
    };
    let required = ["version", "description", "specifications", "connections"];
    required.iter().all(|key| project.contains_key(*key))
        && project_dict.get("items").is_some_and(Value::is_object)
}

/// Deep merge `source` into `target`; objects merge, other values overwrite
pub fn merge_dicts(source: Value, target: &mut Value) {
    match (source, target) {
        (Value::Object(source), Value::Object(target)) => {
            for (key, value) in source {
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_dicts(value, existing);
                    }
                    _ => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (source, target) => *target = source,
    }
}

/// Load Tool specifications; broken files are logged and skipped
fn load_specifications(
    document: &ProjectDocument,
    project_dir: &Path,
) -> BTreeMap<String, ToolSpecification> {
    let mut specifications = BTreeMap::new();
    for (item_type, paths) in &document.project.specifications {
        if ItemType::from(item_type.clone()) != ItemType::Tool {
            debug!(item_type, count = paths.len(), "skipping non-Tool specifications");
            continue;
        }
        for serialized in paths {
            let path = serialized.resolve(project_dir);
            if !path.is_file() {
                error!(path = %path.display(), "Specification file does not exist");
                continue;
            }
            match ToolSpecification::load(&path) {
                Ok(spec) => {
                    specifications.insert(spec.name.clone(), spec);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Item specification file not valid");
                }
            }
        }
    }
    specifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::ToolType;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_project(dir: &Path, value: &Value) {
        let config_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(PROJECT_FILE),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    fn latest_project_dict() -> Value {
        json!({
            "project": {
                "version": LATEST_PROJECT_VERSION,
                "description": "",
                "specifications": {
                    "Tool": [{"type": "path", "relative": true, "path": "tool_specs/a.json"}]
                },
                "connections": [{"from": ["Data 1", "right"], "to": ["Tool 1", "left"]}],
                "jumps": []
            },
            "items": {
                "Data 1": {"type": "Data Connection", "description": "", "x": 0.0, "y": 0.0, "references": []},
                "Tool 1": {"type": "Tool", "description": "", "x": 10.0, "y": 0.0, "specification": "A", "execute_in_work": true, "cmd_line_args": []}
            }
        })
    }

    #[test]
    fn open_loads_items_connections_and_specifications() {
        let dir = tempdir().unwrap();
        write_project(dir.path(), &latest_project_dict());
        ToolSpecification::new("A", ToolType::Python, "a.py")
            .save(&dir.path().join("tool_specs").join("a.json"))
            .unwrap();

        let project = Project::open(dir.path()).unwrap();
        assert_eq!(project.items().len(), 2);
        assert_eq!(project.connections().len(), 1);
        assert!(project.find_connection("Data 1", "Tool 1").is_some());
        assert!(project.find_connection("Tool 1", "Data 1").is_none());
        assert_eq!(project.specifications["A"].tooltype, ToolType::Python);
    }

    #[test]
    fn missing_specification_file_is_skipped() {
        let dir = tempdir().unwrap();
        write_project(dir.path(), &latest_project_dict());
        let project = Project::open(dir.path()).unwrap();
        assert!(project.specifications.is_empty());
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempdir().unwrap();
        let mut dict = latest_project_dict();
        dict["project"]["version"] = json!(LATEST_PROJECT_VERSION + 1);
        write_project(dir.path(), &dict);
        let err = Project::open(dir.path()).unwrap_err();
        assert!(matches!(err, ToolboxError::ProjectTooNew { .. }));
        assert!(err.to_string().contains("newer than what is supported"));
    }

    #[test]
    fn older_version_is_rejected() {
        let mut dict = latest_project_dict();
        dict["project"]["version"] = json!(5);
        let err = check_version(&dict).unwrap_err();
        assert!(matches!(err, ToolboxError::ProjectTooOld { found: 5 }));
        assert!(err.to_string().contains("Open project in Toolbox GUI to upgrade it"));
    }

    #[test]
    fn missing_project_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = Project::open(dir.path()).unwrap_err();
        assert!(err.to_string().contains("project file not found"));
    }

    #[test]
    fn validity_requires_all_sections() {
        assert!(is_valid(&latest_project_dict()));
        assert!(!is_valid(&json!({"project": {}, "items": {}})));
        let mut dict = latest_project_dict();
        dict.as_object_mut().unwrap().remove("items");
        assert!(!is_valid(&dict));
    }

    #[test]
    fn local_data_is_merged_into_project() {
        let dir = tempdir().unwrap();
        write_project(dir.path(), &latest_project_dict());
        let local_dir = dir.path().join(CONFIG_DIR).join("local");
        std::fs::create_dir_all(&local_dir).unwrap();
        std::fs::write(
            local_dir.join(LOCAL_DATA_FILE),
            r#"{"items": {"Tool 1": {"execute_in_work": false}}}"#,
        )
        .unwrap();

        let project = Project::open(dir.path()).unwrap();
        let tool = project.item("Tool 1").unwrap();
        assert_eq!(tool.execute_in_work(), Some(false));
        assert_eq!(tool.specification(), Some("A"));
    }

    #[test]
    fn merge_dicts_recurses_into_objects() {
        let mut target = json!({"a": {"b": 1, "c": 2}, "d": [1]});
        merge_dicts(json!({"a": {"b": 10}, "d": [2], "e": "new"}), &mut target);
        assert_eq!(target, json!({"a": {"b": 10, "c": 2}, "d": [2], "e": "new"}));
    }

    #[test]
    fn save_and_open_round_trip() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test project").unwrap();
        project
            .add_item("Input", ItemDict::new(ItemType::DataConnection))
            .unwrap();
        project
            .add_item(
                "Model",
                ItemDict::new(ItemType::Tool).with_property("specification", json!("A")),
            )
            .unwrap();
        project.add_connection(Connection::new("Input", "Model")).unwrap();
        project.save().unwrap();

        let reopened = Project::open(dir.path()).unwrap();
        assert_eq!(reopened.document, project.document);
    }

    #[test]
    fn duplicate_item_names_are_rejected() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        project.add_item("Data Store", ItemDict::new(ItemType::DataStore)).unwrap();
        assert!(project
            .add_item("data store", ItemDict::new(ItemType::DataStore))
            .is_err());
    }

    #[test]
    fn removing_item_removes_its_connections() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        for name in ["A", "B", "C"] {
            project.add_item(name, ItemDict::new(ItemType::View)).unwrap();
        }
        project.add_connection(Connection::new("A", "B")).unwrap();
        project.add_connection(Connection::new("B", "C")).unwrap();

        assert!(project.remove_item("B").is_some());
        assert!(project.connections().is_empty());
        assert!(project.remove_item("B").is_none());
    }

    #[test]
    fn rename_updates_connections() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        project.add_item("A", ItemDict::new(ItemType::View)).unwrap();
        project.add_item("B", ItemDict::new(ItemType::View)).unwrap();
        project.add_connection(Connection::new("A", "B")).unwrap();

        project.rename_item("A", "Source").unwrap();
        assert!(project.item("A").is_none());
        assert!(project.find_connection("Source", "B").is_some());
        assert!(project.rename_item("Source", "B").is_err());
        assert!(project.item("Source").is_some());
    }

    #[test]
    fn connection_to_unknown_item_is_rejected() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        project.add_item("A", ItemDict::new(ItemType::View)).unwrap();
        assert!(project.add_connection(Connection::new("A", "Missing")).is_err());
        assert!(project.add_connection(Connection::new("A", "A")).is_err());
    }

    #[test]
    fn adding_same_connection_replaces_it() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        project.add_item("A", ItemDict::new(ItemType::View)).unwrap();
        project.add_item("B", ItemDict::new(ItemType::View)).unwrap();
        assert!(project.add_connection(Connection::new("A", "B")).unwrap().is_none());
        let replaced = project.add_connection(Connection::new("A", "B")).unwrap();
        assert!(replaced.is_some());
        assert_eq!(project.connections().len(), 1);
        assert!(project.remove_connection("A", "B").is_some());
        assert!(project.connections().is_empty());
    }

    #[test]
    fn add_specification_stores_relative_path() {
        let dir = tempdir().unwrap();
        let mut project = Project::create(dir.path(), "").unwrap();
        let spec_path = dir.path().join("tool_specs").join("model.json");
        ToolSpecification::new("Model", ToolType::Julia, "model.jl")
            .save(&spec_path)
            .unwrap();

        project.add_specification(&spec_path).unwrap();
        let paths = &project.document.project.specifications["Tool"];
        assert_eq!(paths[0].path, "tool_specs/model.json");
        assert!(paths[0].relative);
        assert!(project.add_specification(&spec_path).is_err());
    }

    #[test]
    fn item_data_dir_uses_short_name() {
        let dir = tempdir().unwrap();
        let project = Project::create(dir.path(), "").unwrap();
        assert_eq!(
            project.item_data_dir("Data Store 1"),
            project.dir().join(".spinetoolbox/items/data_store_1")
        );
    }
}
