//! Description model.
//!
//! Mirrors the API Blueprint AST emitted by `drafter --format json`. The tree
//! is read once at startup and never mutated. Unknown keys are ignored so that
//! newer parser versions keep loading.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Status sent when a response name is not a usable HTTP status code.
pub const FALLBACK_STATUS: u16 = 200;

/// Matches bodies of the form `[Note][]`, i.e. "an array of this resource's model".
static MODEL_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*\]\[\]").expect("model reference pattern is valid"));

/// A parsed description document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Blueprint {
    #[serde(rename = "_version")]
    pub version: String,
    pub name: String,
    pub description: String,
    pub metadata: Vec<Metadata>,
    pub resource_groups: Vec<ResourceGroup>,
}

impl Blueprint {
    /// Value of a metadata entry such as `FORMAT` or `HOST`.
    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .map(|m| m.value.as_str())
    }

    /// Iterate every resource across all groups, in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resource_groups.iter().flat_map(|g| g.resources.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Metadata {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResourceGroup {
    pub name: String,
    pub description: String,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub name: String,
    pub description: String,
    pub uri_template: String,
    /// Body substituted for `[Model][]` references.
    pub model: Payload,
    pub parameters: Vec<Parameter>,
    pub headers: Vec<Header>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Action {
    pub name: String,
    pub description: String,
    pub method: String,
    pub parameters: Vec<Parameter>,
    pub headers: Vec<Header>,
    pub examples: Vec<Example>,
}

/// One transaction example: the requests it documents and the responses it may produce.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Example {
    pub name: String,
    pub description: String,
    pub requests: Vec<Payload>,
    pub responses: Vec<Payload>,
}

/// Request, response, or model payload. `schema` is carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Payload {
    pub name: String,
    pub description: String,
    pub headers: Vec<Header>,
    pub body: String,
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub default: String,
    pub example: String,
    pub values: Vec<ParameterValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ParameterValue {
    pub value: String,
}

/// A response payload prepared for serving.
///
/// The status code and the model-reference check are resolved here, once,
/// so the request path never re-parses the description text.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseVariant {
    /// Human label; by convention also the decimal status code.
    pub name: String,
    pub description: String,
    pub headers: Vec<Header>,
    pub body: String,
    pub schema: String,
    /// Status written on the wire.
    pub status: u16,
    /// Whether the body should be replaced by the resource model body.
    pub uses_resource_model: bool,
}

impl ResponseVariant {
    /// Prepare a response payload. `status` is the already-resolved status code.
    pub fn new(payload: &Payload, status: u16) -> Self {
        Self {
            name: payload.name.clone(),
            description: payload.description.clone(),
            headers: payload.headers.clone(),
            body: payload.body.clone(),
            schema: payload.schema.clone(),
            status,
            uses_resource_model: is_model_reference(&payload.body),
        }
    }
}

/// Parse a response name as an HTTP status code.
///
/// Returns `None` for anything that is not an integer in `100..=599`.
pub fn parse_status(name: &str) -> Option<u16> {
    name.trim()
        .parse::<u16>()
        .ok()
        .filter(|code| (100..=599).contains(code))
}

/// Whether a body is a `[Model][]` placeholder rather than literal content.
pub fn is_model_reference(body: &str) -> bool {
    MODEL_REFERENCE.is_match(body)
}
