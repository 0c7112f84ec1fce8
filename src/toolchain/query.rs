//! JSON queries against the board manager.
//!
//! The manager's JSON output is an integration contract we do not control, so
//! every response is decoded with serde types whose fields all default:
//! missing keys, `null`s and arrays that turn out not to be arrays all decode
//! to empty values. Only output that is empty or not JSON at all is an error,
//! and callers decide what conservative default to fall back to.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use super::ToolCli;

/// Failure to obtain a usable answer from the board manager.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to run `{command}`: {message}")]
    Exec { command: String, message: String },

    #[error("`{command}` produced no output")]
    Empty { command: String },

    #[error("malformed JSON from `{command}`: {source}")]
    Malformed {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Tool(String),
}

/// An installed or updatable library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// An installed or updatable platform core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct PlatformEntry {
    pub id: Option<String>,
    pub installed_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LibListResponse {
    #[serde(deserialize_with = "lenient_seq")]
    installed_libraries: Vec<InstalledLibrary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InstalledLibrary {
    #[serde(deserialize_with = "lenient")]
    library: LibraryInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LibraryInfo {
    #[serde(deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoreListResponse {
    #[serde(deserialize_with = "lenient_seq")]
    platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigDump {
    #[serde(deserialize_with = "lenient")]
    config: ConfigSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigSection {
    #[serde(deserialize_with = "lenient")]
    board_manager: BoardManagerSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoardManagerSection {
    #[serde(deserialize_with = "lenient_seq")]
    additional_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexUpdateResponse {
    error: Option<Value>,
}

/// Decode a value, falling back to the default if its shape is wrong.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Decode a sequence, treating non-arrays as empty and skipping bad elements.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// Parse a response, tolerating log noise around the JSON object.
fn parse_response<T>(command: &str, output: &str) -> Result<T, QueryError>
where
    T: DeserializeOwned,
{
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(QueryError::Empty {
            command: command.to_string(),
        });
    }

    match serde_json::from_str(trimmed) {
        Ok(parsed) => Ok(parsed),
        Err(source) => {
            // stderr is merged into the output; retry with just the object.
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(parsed) = serde_json::from_str(&trimmed[start..=end]) {
                        return Ok(parsed);
                    }
                }
            }
            Err(QueryError::Malformed {
                command: command.to_string(),
                source,
            })
        }
    }
}

/// Typed queries issued through a [`ToolCli`].
pub struct ToolQuery<'a> {
    cli: &'a ToolCli<'a>,
}

impl<'a> ToolQuery<'a> {
    /// Create a query interface.
    pub fn new(cli: &'a ToolCli<'a>) -> Self {
        ToolQuery { cli }
    }

    fn fetch<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, QueryError> {
        let command = args.join(" ");
        let output = self
            .cli
            .capture_json(args)
            .map_err(|e| QueryError::Exec {
                command: command.clone(),
                message: format!("{:#}", e),
            })?;
        parse_response(&command, &output)
    }

    fn libraries(&self, args: &[&str]) -> Result<Vec<LibraryEntry>, QueryError> {
        let response: LibListResponse = self.fetch(args)?;
        Ok(response
            .installed_libraries
            .into_iter()
            .map(|lib| LibraryEntry {
                name: lib.library.name,
                version: lib.library.version,
            })
            .collect())
    }

    /// Libraries currently installed.
    pub fn installed_libraries(&self) -> Result<Vec<LibraryEntry>, QueryError> {
        self.libraries(&["lib", "list"])
    }

    /// Names of installed libraries.
    pub fn installed_library_names(&self) -> Result<BTreeSet<String>, QueryError> {
        Ok(self
            .installed_libraries()?
            .into_iter()
            .filter_map(|lib| lib.name)
            .collect())
    }

    /// Installed libraries with a newer release available.
    pub fn updatable_libraries(&self) -> Result<Vec<LibraryEntry>, QueryError> {
        self.libraries(&["lib", "list", "--updatable"])
    }

    /// Installed platform cores.
    pub fn installed_platforms(&self) -> Result<Vec<PlatformEntry>, QueryError> {
        let response: CoreListResponse = self.fetch(&["core", "list"])?;
        Ok(response.platforms)
    }

    /// Installed platform cores with a newer release available.
    pub fn updatable_platforms(&self) -> Result<Vec<PlatformEntry>, QueryError> {
        let response: CoreListResponse = self.fetch(&["core", "list", "--updatable"])?;
        Ok(response.platforms)
    }

    /// Additional board manager URLs from the manager's configuration.
    pub fn board_manager_urls(&self) -> Result<Vec<String>, QueryError> {
        let response: ConfigDump = self.fetch(&["config", "dump", "--format", "json"])?;
        Ok(response.config.board_manager.additional_urls)
    }

    /// Refresh the core index, reporting an `error` field as a failure.
    pub fn update_core_index(&self) -> Result<(), QueryError> {
        let response: IndexUpdateResponse = self.fetch(&["core", "update-index"])?;
        match response.error {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(msg)) => Err(QueryError::Tool(msg)),
            Some(other) => Err(QueryError::Tool(other.to_string())),
        }
    }
}

/// Whether `id` appears in a platform list.
pub fn contains_platform(platforms: &[PlatformEntry], id: &str) -> bool {
    platforms.iter().any(|p| p.id.as_deref() == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_array_is_empty() {
        let response: LibListResponse = parse_response("lib list", "{}").unwrap();
        assert!(response.installed_libraries.is_empty());

        let response: CoreListResponse = parse_response("core list", "{}").unwrap();
        assert!(response.platforms.is_empty());
    }

    #[test]
    fn test_non_array_field_is_empty() {
        let response: LibListResponse =
            parse_response("lib list", r#"{"installed_libraries": "nope"}"#).unwrap();
        assert!(response.installed_libraries.is_empty());

        let response: CoreListResponse =
            parse_response("core list", r#"{"platforms": {"id": "arduino:avr"}}"#).unwrap();
        assert!(response.platforms.is_empty());
    }

    #[test]
    fn test_library_names() {
        let json = r#"{"installed_libraries": [
            {"library": {"name": "OneWire", "version": "2.3.8"}},
            {"library": {}},
            {"release": {"name": "Ignored"}},
            "garbage"
        ]}"#;
        let response: LibListResponse = parse_response("lib list", json).unwrap();
        let names: Vec<_> = response
            .installed_libraries
            .iter()
            .filter_map(|l| l.library.name.clone())
            .collect();
        assert_eq!(names, vec!["OneWire"]);
        // Entries without a name still count.
        assert_eq!(response.installed_libraries.len(), 3);
    }

    #[test]
    fn test_platforms() {
        let json = r#"{"platforms": [
            {"id": "arduino:avr", "installed_version": "1.8.6"},
            {"id": 42},
            {"installed_version": "1.0"}
        ]}"#;
        let response: CoreListResponse = parse_response("core list", json).unwrap();
        assert_eq!(response.platforms.len(), 2);
        assert!(contains_platform(&response.platforms, "arduino:avr"));
        assert!(!contains_platform(&response.platforms, "esp32:esp32"));
        assert_eq!(
            response.platforms[0].installed_version.as_deref(),
            Some("1.8.6")
        );
    }

    #[test]
    fn test_config_dump() {
        let json = r#"{"config": {"board_manager": {"additional_urls": ["https://a", 3, "https://b"]}}}"#;
        let response: ConfigDump = parse_response("config dump", json).unwrap();
        assert_eq!(
            response.config.board_manager.additional_urls,
            vec!["https://a", "https://b"]
        );

        let response: ConfigDump =
            parse_response("config dump", r#"{"config": {"board_manager": null}}"#).unwrap();
        assert!(response.config.board_manager.additional_urls.is_empty());

        let response: ConfigDump = parse_response("config dump", r#"{"config": 7}"#).unwrap();
        assert!(response.config.board_manager.additional_urls.is_empty());
    }

    #[test]
    fn test_empty_and_malformed_output() {
        assert!(matches!(
            parse_response::<LibListResponse>("lib list", "  \n"),
            Err(QueryError::Empty { .. })
        ));
        assert!(matches!(
            parse_response::<LibListResponse>("lib list", "Error: not json"),
            Err(QueryError::Malformed { .. })
        ));
    }

    #[test]
    fn test_noise_around_object() {
        let output = "Downloading index...\n{\"platforms\": [{\"id\": \"arduino:avr\"}]}\n";
        let response: CoreListResponse = parse_response("core list", output).unwrap();
        assert_eq!(response.platforms.len(), 1);
    }

    #[test]
    fn test_index_error_field() {
        let response: IndexUpdateResponse =
            parse_response("core update-index", r#"{"error": "network down"}"#).unwrap();
        assert_eq!(response.error, Some(Value::String("network down".into())));

        let response: IndexUpdateResponse =
            parse_response("core update-index", r#"{"updated_indexes": []}"#).unwrap();
        assert!(response.error.is_none());
    }
}
