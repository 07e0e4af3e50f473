//! Data module documents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the display label inside a module document.
const LABEL_KEY: &str = "label";
/// Key of the server-side identifier inside a module document.
const IDENTIFIER_KEY: &str = "identifier";
/// Key of the query subject list.
const QUERY_SUBJECT_KEY: &str = "querySubject";
/// Key of the upstream reference list.
const USE_SPEC_KEY: &str = "useSpec";

/// A data module document as served by the modules endpoint.
///
/// The document is kept exactly as received, so pushing it to another server
/// loses nothing: empty arrays and explicit nulls survive. The attributes the
/// validator and migrator look at are read through typed views.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleDefinition {
    /// The raw JSON object.
    document: Map<String, Value>,
}

impl ModuleDefinition {
    /// Wrap a raw module document.
    #[must_use]
    pub fn from_document(document: Map<String, Value>) -> Self {
        Self { document }
    }

    /// The raw module document.
    #[must_use]
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// The display label, if the document carries a string one.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.document.get(LABEL_KEY).and_then(Value::as_str)
    }

    /// The server-side identifier, if the document carries a string one.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.document.get(IDENTIFIER_KEY).and_then(Value::as_str)
    }

    /// Replace the display label.
    pub fn set_label(&mut self, label: &str) {
        self.document
            .insert(LABEL_KEY.to_owned(), Value::String(label.to_owned()));
    }

    /// Take `label` and `identifier` from `other` verbatim; a key `other`
    /// lacks is removed here too.
    pub fn keep_identity_of(&mut self, other: &ModuleDefinition) {
        for key in [LABEL_KEY, IDENTIFIER_KEY] {
            match other.document.get(key) {
                Some(value) => {
                    self.document.insert(key.to_owned(), value.clone());
                }
                None => {
                    self.document.remove(key);
                }
            }
        }
    }

    /// Typed view of the `querySubject` entries. Entries that do not fit the
    /// view are left out.
    #[must_use]
    pub fn query_subjects(&self) -> Vec<QuerySubject> {
        self.entries(QUERY_SUBJECT_KEY)
    }

    /// Typed view of the `useSpec` entries. Entries that do not fit the view
    /// are left out.
    #[must_use]
    pub fn use_specs(&self) -> Vec<UseSpec> {
        self.entries(USE_SPEC_KEY)
    }

    /// Names of the upstream data sources, taken from the first ancestor of
    /// every `useSpec` entry that has one.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        self.use_specs()
            .into_iter()
            .filter_map(|spec| spec.ancestors?.into_iter().next()?.default_name)
            .collect()
    }

    /// Query subjects that embed a raw SQL statement, as `(label, sql)`.
    ///
    /// A subject with an `sqlQuery` but no text still counts, with empty SQL.
    #[must_use]
    pub fn sql_subjects(&self) -> Vec<(String, String)> {
        self.query_subjects()
            .into_iter()
            .filter_map(|subject| {
                let query = subject.sql_query?;
                Some((
                    subject.label.unwrap_or_else(|| "<unnamed>".to_owned()),
                    query.sql_text.unwrap_or_default(),
                ))
            })
            .collect()
    }

    /// Decode every element of the array under `key` that fits `T`.
    fn entries<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        self.document
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| T::deserialize(item).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Read view of one `querySubject` entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySubject {
    /// Display label of the subject.
    #[serde(default)]
    pub label: Option<String>,
    /// Present when the subject is backed by a raw SQL statement.
    #[serde(default)]
    pub sql_query: Option<SqlQuery>,
}

/// Read view of a subject's `sqlQuery`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQuery {
    /// The statement text.
    #[serde(default)]
    pub sql_text: Option<String>,
}

/// Read view of a reference from a module (or report) to something it is built on.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseSpec {
    /// Search path of the referenced object.
    #[serde(default)]
    pub search_path: Option<String>,
    /// Chain of containers above the referenced object, outermost first.
    #[serde(default)]
    pub ancestors: Option<Vec<Ancestor>>,
}

/// Read view of one ancestor entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ancestor {
    /// Display name of the container.
    #[serde(default)]
    pub default_name: Option<String>,
}

/// The specification of an object, shaped by its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Specification {
    /// Report or dashboard specification XML.
    Document(String),
    /// Data module definition.
    Module(ModuleDefinition),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ModuleDefinition {
        serde_json::from_value(json!({
            "label": "Orders",
            "identifier": "orders_1",
            "version": "14.0",
            "querySubject": [
                {"label": "plain", "item": []},
                {"label": "custom", "sqlQuery": {"sqlText": "select 1", "dialect": "native"}},
                {"label": "blank", "sqlQuery": {"sqlText": null}}
            ],
            "useSpec": [
                {"searchPath": "CAMID(\"x\")", "ancestors": [{"defaultName": "Greenplum"}, {"defaultName": "schema"}]},
                {"searchPath": "/content/folder[@name='A']"},
                {"ancestors": []}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn sources_take_first_ancestor() {
        assert_eq!(sample().sources(), vec!["Greenplum"]);
    }

    #[test]
    fn sql_subjects_only_lists_custom_sql() {
        assert_eq!(
            sample().sql_subjects(),
            vec![
                ("custom".to_owned(), "select 1".to_owned()),
                ("blank".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn unknown_attributes_survive_a_round_trip() {
        let document = json!({
            "label": null,
            "identifier": "orders_1",
            "version": "14.0",
            "querySubject": [],
            "useSpec": null,
            "expressionSet": [{"items": []}],
            "dataRetrievalMode": {"queryMode": null}
        });
        let module: ModuleDefinition = serde_json::from_value(document.clone()).unwrap();
        assert_eq!(serde_json::to_value(&module).unwrap(), document);
        assert!(module.label().is_none());
        assert!(module.use_specs().is_empty());
    }

    #[test]
    fn mistyped_entries_are_left_out_of_views() {
        let module: ModuleDefinition = serde_json::from_value(json!({
            "useSpec": [{"searchPath": 42}, {"searchPath": "/content/folder[@name='A']"}],
            "querySubject": "not a list"
        }))
        .unwrap();
        assert_eq!(module.use_specs().len(), 1);
        assert!(module.query_subjects().is_empty());
    }

    #[test]
    fn identity_is_copied_verbatim() {
        let mut source = sample();
        let target = ModuleDefinition::from_document(
            json!({"label": "Prod", "other": 1})
                .as_object()
                .cloned()
                .unwrap(),
        );
        source.keep_identity_of(&target);
        assert_eq!(source.label(), Some("Prod"));
        assert!(source.identifier().is_none());
        assert_eq!(source.document()["version"], "14.0");
    }
}
