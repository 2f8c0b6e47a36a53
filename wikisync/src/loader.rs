use serde_json::{Map, Value};
use thiserror::Error;
use wikisync_core::{GithubError, RemoteTree};

use crate::slug;
use crate::sync::paths::relative_to;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("remote error: {0}")]
    Remote(#[from] GithubError),
}

/// Why a single file could not become an entry. Never fatal to a load.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("expected an object at the top level")]
    NotAnObject,
    #[error("frontmatter is not terminated")]
    UnterminatedFrontmatter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataEntry {
    pub id: String,
    pub source_path: String,
    pub data: Map<String, Value>,
}

pub trait EntryParser: Send + Sync {
    fn parse(&self, content: &str, path: &str) -> Result<DataEntry, ValidationError>;
}

/// One JSON object per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEntryParser;

impl EntryParser for JsonEntryParser {
    fn parse(&self, content: &str, path: &str) -> Result<DataEntry, ValidationError> {
        match serde_json::from_str::<Value>(content)? {
            Value::Object(data) => Ok(entry_from(data, path)),
            _ => Err(ValidationError::NotAnObject),
        }
    }
}

/// Markdown with an optional YAML frontmatter block; the body lands under `content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontmatterEntryParser;

impl EntryParser for FrontmatterEntryParser {
    fn parse(&self, content: &str, path: &str) -> Result<DataEntry, ValidationError> {
        let (frontmatter, body) = split_frontmatter(content)?;
        let mut data = match frontmatter {
            Some(yaml) => yaml_object(yaml)?,
            None => Map::new(),
        };
        data.insert("content".to_string(), Value::String(body.to_string()));
        Ok(entry_from(data, path))
    }
}

/// A YAML document whose top level is a mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlEntryParser;

impl EntryParser for YamlEntryParser {
    fn parse(&self, content: &str, path: &str) -> Result<DataEntry, ValidationError> {
        Ok(entry_from(yaml_object(content)?, path))
    }
}

/// Loads structured entries from the files of one repository directory.
pub struct DataLoader<'a, R: RemoteTree> {
    remote: &'a R,
    directory: String,
    pattern: glob::Pattern,
}

impl<'a, R: RemoteTree> DataLoader<'a, R> {
    /// `pattern` is matched against file names, e.g. `*.json`.
    pub fn new(remote: &'a R, directory: &str, pattern: &str) -> Result<Self, LoaderError> {
        Ok(Self {
            remote,
            directory: directory.trim_matches('/').to_string(),
            pattern: glob::Pattern::new(pattern)?,
        })
    }

    pub async fn load(
        &self,
        reference: &str,
        parser: &dyn EntryParser,
    ) -> Result<Vec<DataEntry>, LoaderError> {
        let tree = self.remote.tree(reference).await?;
        let files: Vec<_> = tree
            .iter()
            .filter(|entry| entry.is_file())
            .filter(|entry| {
                relative_to(&entry.path, &self.directory).is_some_and(|relative| !relative.is_empty())
            })
            .filter(|entry| self.pattern.matches(slug::file_name(&entry.path)))
            .collect();
        tracing::info!(
            directory = %self.directory,
            pattern = %self.pattern,
            files = files.len(),
            "loading data entries"
        );

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let bytes = match self.remote.blob(&file.content_hash).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(path = %file.path, "failed to fetch data file: {err}");
                    continue;
                }
            };
            match parser.parse(&String::from_utf8_lossy(&bytes), &file.path) {
                Ok(entry) => {
                    tracing::debug!(path = %file.path, id = %entry.id, "parsed data entry");
                    entries.push(entry);
                }
                Err(err) => tracing::warn!(path = %file.path, "skipping invalid data file: {err}"),
            }
        }
        Ok(entries)
    }
}

fn entry_from(mut data: Map<String, Value>, path: &str) -> DataEntry {
    let id = match data.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => {
            let id = file_stem(path).to_string();
            data.insert("id".to_string(), Value::String(id.clone()));
            id
        }
    };
    DataEntry {
        id,
        source_path: path.to_string(),
        data,
    }
}

fn yaml_object(yaml: &str) -> Result<Map<String, Value>, ValidationError> {
    match serde_yaml::from_str::<Value>(yaml)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ValidationError::NotAnObject),
    }
}

/// `---\n<yaml>\n---\n<body>`; documents without a leading fence have no frontmatter.
fn split_frontmatter(content: &str) -> Result<(Option<&str>, &str), ValidationError> {
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return Ok((None, content));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &rest[offset + line.len()..];
            return Ok((Some(&rest[..offset]), body.trim_start_matches(['\r', '\n'])));
        }
        offset += line.len();
    }
    Err(ValidationError::UnterminatedFrontmatter)
}

fn file_stem(path: &str) -> &str {
    let name = slug::file_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wikisync_core::{GithubClient, RepositoryRef};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn json_parser_keeps_explicit_id() {
        let entry = JsonEntryParser
            .parse(r#"{"id": "acme", "name": "Acme"}"#, "data/orgs/acme-co.json")
            .unwrap();
        assert_eq!(entry.id, "acme");
        assert_eq!(entry.data["name"], "Acme");
    }

    #[test]
    fn json_parser_derives_id_from_file_stem() {
        let entry = JsonEntryParser
            .parse(r#"{"name": "Acme"}"#, "data/orgs/acme-co.json")
            .unwrap();
        assert_eq!(entry.id, "acme-co");
        assert_eq!(entry.data["id"], "acme-co");
    }

    #[test]
    fn json_parser_rejects_arrays() {
        assert!(matches!(
            JsonEntryParser.parse("[1, 2]", "data/list.json"),
            Err(ValidationError::NotAnObject)
        ));
        assert!(matches!(
            JsonEntryParser.parse("{", "data/broken.json"),
            Err(ValidationError::Json(_))
        ));
    }

    #[test]
    fn frontmatter_parser_splits_body() {
        let content = "---\nname: Acme\ntags:\n  - dao\n---\n\n# About\nBody text\n";
        let entry = FrontmatterEntryParser
            .parse(content, "data/orgs/acme.md")
            .unwrap();

        assert_eq!(entry.id, "acme");
        assert_eq!(entry.data["name"], "Acme");
        assert_eq!(entry.data["tags"], json!(["dao"]));
        assert_eq!(entry.data["content"], "# About\nBody text\n");
    }

    #[test]
    fn frontmatter_is_optional_but_must_be_closed() {
        let entry = FrontmatterEntryParser
            .parse("Just text", "data/plain.md")
            .unwrap();
        assert_eq!(entry.data["content"], "Just text");

        assert!(matches!(
            FrontmatterEntryParser.parse("---\nname: x\n", "data/open.md"),
            Err(ValidationError::UnterminatedFrontmatter)
        ));
    }

    #[test]
    fn yaml_parser_reads_mapping() {
        let entry = YamlEntryParser
            .parse("id: 42\nname: Offer\n", "data/offers/x.yaml")
            .unwrap();
        assert_eq!(entry.id, "42");
    }

    #[tokio::test]
    async fn loads_matching_files_and_skips_invalid_ones() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/handbook/git/trees/main"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "t1",
                "truncated": false,
                "tree": [
                    { "path": "data/orgs", "type": "tree", "sha": "d1" },
                    { "path": "data/orgs/acme.json", "type": "blob", "sha": "b-acme" },
                    { "path": "data/orgs/broken.json", "type": "blob", "sha": "b-broken" },
                    { "path": "data/orgs/notes.md", "type": "blob", "sha": "b-notes" },
                    { "path": "data/people/ada.json", "type": "blob", "sha": "b-ada" }
                ]
            })))
            .mount(&server)
            .await;
        for (sha, content) in [("b-acme", r#"{"name": "Acme"}"#), ("b-broken", "{ nope")] {
            Mock::given(method("GET"))
                .and(path(format!("/repos/acme/handbook/git/blobs/{sha}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "sha": sha,
                    "content": content,
                    "encoding": "utf-8"
                })))
                .mount(&server)
                .await;
        }

        let client = GithubClient::with_base_url(
            &server.uri(),
            RepositoryRef::new("acme", "handbook"),
            "test-token",
        )
        .unwrap();
        let loader = DataLoader::new(&client, "data/orgs/", "*.json").unwrap();
        let entries = loader.load("main", &JsonEntryParser).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "acme");
        assert_eq!(entries[0].source_path, "data/orgs/acme.json");
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let client = GithubClient::new(RepositoryRef::new("acme", "handbook"), "test-token").unwrap();
        assert!(matches!(
            DataLoader::new(&client, "data", "[*.json"),
            Err(LoaderError::Pattern(_))
        ));
    }
}
