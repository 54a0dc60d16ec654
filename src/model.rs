//! Core data model: registries, schema descriptors, and API wire formats.
//!
//! These types are the uniform in-memory representation every registry kind
//! indexes into, and the JSON projection that the selector engine matches
//! against.

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::uri::IgluUri;

/// Deployment environment a schema instance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "LOCAL",
            Environment::Dev => "DEV",
            Environment::Prod => "PROD",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a schema describes a self-contained event or an attachable
/// entity. Only the organization API annotates this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Event,
    Entity,
}

/// A discovered source of schemas.
///
/// Identity is the `(kind, id)` pair. Registries are replaced wholesale on
/// re-discovery, never mutated in place. The JSON projection is internally
/// tagged on `kind` so selectors can match `{registry: {kind, id}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RegistryDescriptor {
    /// A local folder containing `.../jsonschema/<version>` schema files.
    Workspace {
        id: String,
        name: String,
        root: PathBuf,
    },
    /// A public HTTP repository enumerating its contents in a manifest.
    Static {
        id: String,
        name: String,
        base_url: String,
        manifest: String,
    },
    /// An authenticated remote organization.
    Organization {
        id: String,
        name: String,
        organization_id: String,
    },
}

impl RegistryDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryDescriptor::Workspace { .. } => "workspace",
            RegistryDescriptor::Static { .. } => "static",
            RegistryDescriptor::Organization { .. } => "organization",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RegistryDescriptor::Workspace { id, .. }
            | RegistryDescriptor::Static { id, .. }
            | RegistryDescriptor::Organization { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegistryDescriptor::Workspace { name, .. }
            | RegistryDescriptor::Static { name, .. }
            | RegistryDescriptor::Organization { name, .. } => name,
        }
    }
}

/// One schema instance within one registry, with a lazily-fetched body.
///
/// Descriptors are created during indexing and shared as
/// `Arc<SchemaDescriptor>`, so a body cached by any fetch attempt is
/// visible to every later query. The body is written at most once; it is
/// only superseded when a re-index of the registry kind builds a fresh
/// descriptor list.
#[derive(Debug)]
pub struct SchemaDescriptor {
    pub uri: IgluUri,
    pub registry: RegistryDescriptor,
    /// Registry-scoped content address joining every version and
    /// environment of the same schema family.
    pub hash: String,
    /// Where the body is fetched from: an absolute file path (workspace),
    /// a scheme-less URL (static), or an API request path (organization).
    pub location: String,
    pub env: Environment,
    pub schema_type: Option<SchemaType>,
    body: OnceLock<Value>,
}

impl SchemaDescriptor {
    pub fn new(
        uri: IgluUri,
        registry: RegistryDescriptor,
        location: String,
        env: Environment,
        schema_type: Option<SchemaType>,
    ) -> Self {
        let hash = uri.hash(registry.id());
        Self {
            uri,
            registry,
            hash,
            location,
            env,
            schema_type,
            body: OnceLock::new(),
        }
    }

    /// Construct with the body already in hand (workspace indexing reads
    /// the file before it can check the shape, so the content is free).
    pub fn with_body(
        uri: IgluUri,
        registry: RegistryDescriptor,
        location: String,
        env: Environment,
        schema_type: Option<SchemaType>,
        body: Value,
    ) -> Self {
        let descriptor = Self::new(uri, registry, location, env, schema_type);
        let _ = descriptor.body.set(body);
        descriptor
    }

    /// The cached schema body, if this descriptor has been resolved.
    pub fn body(&self) -> Option<&Value> {
        self.body.get()
    }

    /// Record a fetched body. The first write wins; later calls return the
    /// already-cached value.
    pub(crate) fn cache_body(&self, body: Value) -> Value {
        self.body.get_or_init(|| body).clone()
    }

    /// JSON projection used by selector matching.
    ///
    /// The `body` key is present only once the descriptor has been
    /// resolved; `schema_type` only when the registry annotated it.
    pub fn as_subject(&self) -> Value {
        let mut subject = serde_json::json!({
            "uri": &self.uri,
            "registry": &self.registry,
            "hash": &self.hash,
            "location": &self.location,
            "env": self.env,
        });
        if let Some(schema_type) = self.schema_type {
            subject["schema_type"] = serde_json::json!(schema_type);
        }
        if let Some(body) = self.body() {
            subject["body"] = body.clone();
        }
        subject
    }
}

/// Resource returned by the organization data-structures listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStructure {
    /// Content hash as declared by the API; checked against the locally
    /// recomputed value during indexing.
    pub hash: String,
    pub vendor: String,
    pub name: String,
    pub format: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub meta: DataStructureMeta,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStructureMeta {
    #[serde(default)]
    pub schema_type: Option<SchemaType>,
}

/// One deployed (version, environment) instance of a schema family.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub version: String,
    #[serde(default)]
    pub patch_level: i64,
    #[serde(default)]
    pub content_hash: String,
    pub env: Environment,
}

/// Extract the `self` descriptor from a schema document.
///
/// A document is a schema only if it has a `self` object whose `vendor`,
/// `name`, `format`, and `version` members are all strings. Returns `None`
/// for anything else.
pub fn self_descriptor(document: &Value) -> Option<IgluUri> {
    let section = document.get("self")?.as_object()?;
    Some(IgluUri {
        vendor: section.get("vendor")?.as_str()?.to_string(),
        name: section.get("name")?.as_str()?.to_string(),
        format: section.get("format")?.as_str()?.to_string(),
        version: section.get("version")?.as_str()?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shape_check_accepts_self_describing_schema() {
        let document = json!({
            "$schema": "http://iglucentral.com/schemas/com.snowplowanalytics.self-desc/schema/jsonschema/1-0-0#",
            "self": {
                "vendor": "com.acme",
                "name": "checkout",
                "format": "jsonschema",
                "version": "1-0-0"
            },
            "type": "object"
        });

        let uri = self_descriptor(&document).unwrap();
        assert_eq!(uri.to_string(), "iglu:com.acme/checkout/jsonschema/1-0-0");
    }

    #[test]
    fn shape_check_rejects_missing_or_non_string_members() {
        assert!(self_descriptor(&json!({})).is_none());
        assert!(self_descriptor(&json!({"self": "not an object"})).is_none());
        assert!(self_descriptor(&json!({"self": {"vendor": "v", "name": "n", "format": "f"}})).is_none());
        assert!(self_descriptor(
            &json!({"self": {"vendor": "v", "name": "n", "format": "f", "version": 100}})
        )
        .is_none());
    }

    #[test]
    fn environment_wire_format_is_uppercase() {
        assert_eq!(serde_json::to_value(Environment::Dev).unwrap(), json!("DEV"));
        let parsed: Environment = serde_json::from_value(json!("PROD")).unwrap();
        assert_eq!(parsed, Environment::Prod);
    }

    #[test]
    fn registry_projection_is_kind_tagged() {
        let registry = RegistryDescriptor::Static {
            id: "http://iglucentral.com/schemas".to_string(),
            name: "Iglu Central".to_string(),
            base_url: "http://iglucentral.com/schemas".to_string(),
            manifest: String::new(),
        };
        let value = serde_json::to_value(&registry).unwrap();
        assert_eq!(value["kind"], "static");
        assert_eq!(value["id"], "http://iglucentral.com/schemas");
    }

    #[test]
    fn data_structure_parses_camel_case() {
        let listing = json!([{
            "hash": "abc",
            "vendor": "com.acme",
            "name": "checkout",
            "format": "jsonschema",
            "meta": { "schemaType": "event" },
            "deployments": [
                { "version": "1-0-0", "patchLevel": 0, "contentHash": "abc", "env": "DEV" },
                { "version": "1-0-0", "patchLevel": 0, "contentHash": "abc", "env": "PROD" }
            ]
        }]);

        let parsed: Vec<DataStructure> = serde_json::from_value(listing).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].meta.schema_type, Some(SchemaType::Event));
        assert_eq!(parsed[0].deployments[1].env, Environment::Prod);
    }

    #[test]
    fn descriptor_body_writes_once() {
        let uri = IgluUri::from_parts("com.acme", "checkout", None, None);
        let registry = RegistryDescriptor::Workspace {
            id: "ws".to_string(),
            name: "ws".to_string(),
            root: PathBuf::from("/tmp"),
        };
        let descriptor = SchemaDescriptor::new(
            uri,
            registry,
            "/tmp/schema".to_string(),
            Environment::Local,
            None,
        );

        assert!(descriptor.body().is_none());
        let first = descriptor.cache_body(json!({"first": true}));
        let second = descriptor.cache_body(json!({"second": true}));
        assert_eq!(first, second);
        assert_eq!(descriptor.body().unwrap(), &json!({"first": true}));
    }

    #[test]
    fn subject_omits_unset_optional_fields() {
        let uri = IgluUri::from_parts("com.acme", "checkout", None, None);
        let registry = RegistryDescriptor::Workspace {
            id: "ws".to_string(),
            name: "ws".to_string(),
            root: PathBuf::from("/tmp"),
        };
        let descriptor = SchemaDescriptor::new(
            uri,
            registry,
            "/tmp/schema".to_string(),
            Environment::Local,
            None,
        );

        let subject = descriptor.as_subject();
        assert!(subject.get("schema_type").is_none());
        assert!(subject.get("body").is_none());
        assert_eq!(subject["env"], "LOCAL");
        assert_eq!(subject["uri"]["vendor"], "com.acme");
    }
}
