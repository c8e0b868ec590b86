use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::SerializedPath;

/// Type of a project item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    DataConnection,
    DataStore,
    Tool,
    Importer,
    Exporter,
    GdxExporter,
    Merger,
    View,
    DataTransformer,
    Gimlet,
    Other(String),
}

impl From<String> for ItemType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Data Connection" => Self::DataConnection,
            "Data Store" => Self::DataStore,
            "Tool" => Self::Tool,
            "Importer" => Self::Importer,
            "Exporter" => Self::Exporter,
            "GdxExporter" => Self::GdxExporter,
            // Combiner is the pre-rename name of Merger
            "Merger" | "Combiner" => Self::Merger,
            "View" => Self::View,
            "Data Transformer" => Self::DataTransformer,
            "Gimlet" => Self::Gimlet,
            _ => Self::Other(s),
        }
    }
}

impl From<ItemType> for String {
    fn from(t: ItemType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataConnection => write!(f, "Data Connection"),
            Self::DataStore => write!(f, "Data Store"),
            Self::Tool => write!(f, "Tool"),
            Self::Importer => write!(f, "Importer"),
            Self::Exporter => write!(f, "Exporter"),
            Self::GdxExporter => write!(f, "GdxExporter"),
            Self::Merger => write!(f, "Merger"),
            Self::View => write!(f, "View"),
            Self::DataTransformer => write!(f, "Data Transformer"),
            Self::Gimlet => write!(f, "Gimlet"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

/// A project item as stored in the project file
///
/// Type specific properties are kept verbatim in `properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDict {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl ItemDict {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            description: String::new(),
            x: 0.0,
            y: 0.0,
            properties: Map::new(),
        }
    }

    /// Set a type specific property
    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Name of the specification the item uses, if any
    pub fn specification(&self) -> Option<&str> {
        self.properties
            .get("specification")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Tool item override of the specification's `execute_in_work`
    pub fn execute_in_work(&self) -> Option<bool> {
        self.properties.get("execute_in_work").and_then(Value::as_bool)
    }

    /// Item level command line arguments
    ///
    /// Entries are plain strings or `{"type": ..., "arg": ...}` objects.
    pub fn cmd_line_args(&self) -> Vec<String> {
        let Some(Value::Array(args)) = self.properties.get("cmd_line_args") else {
            return Vec::new();
        };
        args.iter()
            .filter_map(|arg| match arg {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj.get("arg").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    /// File references of a Data Connection
    pub fn file_references(&self, project_dir: &Path) -> Vec<PathBuf> {
        ["file_references", "references"]
            .iter()
            .filter_map(|key| self.properties.get(*key))
            .filter_map(|value| {
                serde_json::from_value::<Vec<SerializedPath>>(value.clone()).ok()
            })
            .flatten()
            .map(|p| p.resolve(project_dir))
            .collect()
    }

    /// Database URL of a Data Store
    pub fn database_url(&self, project_dir: &Path) -> Option<String> {
        let url = self.properties.get("url")?.as_object()?;
        let dialect = url.get("dialect").and_then(Value::as_str).unwrap_or("sqlite");
        let database = url.get("database")?;

        if dialect == "sqlite" {
            let path = match database {
                Value::String(s) => PathBuf::from(s),
                other => {
                    let serialized: SerializedPath = serde_json::from_value(other.clone()).ok()?;
                    if let Some(url) = serialized.resolve_url(project_dir) {
                        return Some(url);
                    }
                    serialized.resolve(project_dir)
                }
            };
            return Some(format!(
                "sqlite:///{}",
                path.to_string_lossy().replace('\\', "/")
            ));
        }

        let field = |key: &str| url.get(key).and_then(Value::as_str).unwrap_or_default();
        let database = database.as_str()?;
        let credentials = match (field("username"), field("password")) {
            ("", _) => String::new(),
            (user, "") => format!("{}@", user),
            (user, password) => format!("{}:{}@", user, password),
        };
        let port = match url.get("port") {
            Some(Value::Number(n)) => format!(":{}", n),
            Some(Value::String(s)) if !s.is_empty() => format!(":{}", s),
            _ => String::new(),
        };
        Some(format!(
            "{}://{}{}{}/{}",
            dialect,
            credentials,
            field("host"),
            port,
            database
        ))
    }
}

/// A link between two project items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Source item name and connector position
    pub from: (String, String),
    /// Destination item name and connector position
    pub to: (String, String),
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Connection {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            from: (source.into(), "right".to_string()),
            to: (destination.into(), "left".to_string()),
            properties: Map::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.from.0
    }

    pub fn destination(&self) -> &str {
        &self.to.0
    }
}

/// Short form of an item name used for directory names
pub fn shorten(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shorten_lowercases_and_replaces_spaces() {
        assert_eq!(shorten("Data Store 1"), "data_store_1");
        assert_eq!(shorten("Tool"), "tool");
    }

    #[test]
    fn item_type_round_trips_names() {
        for name in [
            "Data Connection",
            "Data Store",
            "Tool",
            "Importer",
            "Exporter",
            "GdxExporter",
            "Merger",
            "View",
            "Data Transformer",
            "Gimlet",
            "Custom Thing",
        ] {
            let item_type = ItemType::from(name.to_string());
            assert_eq!(item_type.to_string(), name);
        }
        assert_eq!(ItemType::from("Combiner".to_string()), ItemType::Merger);
    }

    #[test]
    fn item_dict_keeps_unknown_properties() {
        let value = json!({
            "type": "Importer",
            "description": "",
            "x": -226.7,
            "y": -47.5,
            "cancel_on_error": true,
            "mapping_selection": [],
            "specification": "",
            "file_selection": []
        });
        let item: ItemDict = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(item.item_type, ItemType::Importer);
        assert_eq!(item.specification(), None);
        assert_eq!(serde_json::to_value(&item).unwrap(), value);
    }

    #[test]
    fn tool_item_properties() {
        let item: ItemDict = serde_json::from_value(json!({
            "type": "Tool",
            "specification": "Preprocessing Tool",
            "execute_in_work": false,
            "cmd_line_args": ["-a", {"type": "literal", "arg": "b c"}]
        }))
        .unwrap();
        assert_eq!(item.specification(), Some("Preprocessing Tool"));
        assert_eq!(item.execute_in_work(), Some(false));
        assert_eq!(item.cmd_line_args(), vec!["-a", "b c"]);
    }

    #[test]
    fn sqlite_data_store_url() {
        let item: ItemDict = serde_json::from_value(json!({
            "type": "Data Store",
            "url": {
                "dialect": "sqlite",
                "username": "",
                "password": "",
                "host": "",
                "port": "",
                "database": {
                    "type": "path",
                    "relative": true,
                    "path": ".spinetoolbox/items/data_store_1/db.sqlite"
                }
            }
        }))
        .unwrap();
        let url = item.database_url(Path::new("/project")).unwrap();
        assert_eq!(url, "sqlite:////project/.spinetoolbox/items/data_store_1/db.sqlite");
    }

    #[test]
    fn file_url_database_uses_its_scheme() {
        let item: ItemDict = serde_json::from_value(json!({
            "type": "Data Store",
            "url": {
                "dialect": "sqlite",
                "database": {
                    "type": "file_url",
                    "relative": true,
                    "path": "db.sqlite",
                    "scheme": "sqlite"
                }
            }
        }))
        .unwrap();
        let url = item.database_url(Path::new("/project")).unwrap();
        assert_eq!(url, "sqlite:////project/db.sqlite");
    }

    #[test]
    fn server_data_store_url() {
        let item: ItemDict = serde_json::from_value(json!({
            "type": "Data Store",
            "url": {
                "dialect": "mysql",
                "username": "spine",
                "password": "",
                "host": "db.example.org",
                "port": 3306,
                "database": "energy"
            }
        }))
        .unwrap();
        let url = item.database_url(Path::new("/project")).unwrap();
        assert_eq!(url, "mysql://spine@db.example.org:3306/energy");
    }

    #[test]
    fn data_connection_references_resolve() {
        let item: ItemDict = serde_json::from_value(json!({
            "type": "Data Connection",
            "references": [
                {"type": "path", "relative": true, "path": "data/a.csv"},
                {"type": "path", "relative": false, "path": "/shared/b.csv"}
            ]
        }))
        .unwrap();
        let refs = item.file_references(Path::new("/project"));
        assert_eq!(
            refs,
            vec![
                PathBuf::from("/project/data/a.csv"),
                PathBuf::from("/shared/b.csv")
            ]
        );
    }

    #[test]
    fn connection_parses_project_file_form() {
        let value = json!({"from": ["Importer 1", "right"], "to": ["Data Store 1", "left"]});
        let connection: Connection = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(connection.source(), "Importer 1");
        assert_eq!(connection.destination(), "Data Store 1");
        assert_eq!(serde_json::to_value(&connection).unwrap(), value);
    }
}
