use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Capability tag kinds understood by both the route binder and generated clients
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKind {
    StreamResponse,
    WithAuthorization,
    HttpGet,
    PrependMiddleware,
    AppendMiddleware,
    CustomRequestBody,
    CustomHeaders,
    RoleAuthorization,
    CacheServer,
    CacheClient,
    Custom(String),
}

impl TagKind {
    pub const BUILTIN: [TagKind; 10] = [
        TagKind::StreamResponse,
        TagKind::WithAuthorization,
        TagKind::HttpGet,
        TagKind::PrependMiddleware,
        TagKind::AppendMiddleware,
        TagKind::CustomRequestBody,
        TagKind::CustomHeaders,
        TagKind::RoleAuthorization,
        TagKind::CacheServer,
        TagKind::CacheClient,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TagKind::StreamResponse => "streamResponse",
            TagKind::WithAuthorization => "withAuthorization",
            TagKind::HttpGet => "httpGet",
            TagKind::PrependMiddleware => "prependMiddleware",
            TagKind::AppendMiddleware => "appendMiddleware",
            TagKind::CustomRequestBody => "customRequestBody",
            TagKind::CustomHeaders => "customHeaders",
            TagKind::RoleAuthorization => "roleAuthorization",
            TagKind::CacheServer => "cacheServer",
            TagKind::CacheClient => "cacheClient",
            TagKind::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, TagKind::Custom(_))
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TagKind::BUILTIN
            .iter()
            .find(|kind| kind.as_str() == s)
            .cloned()
            .unwrap_or_else(|| TagKind::Custom(s.to_string())))
    }
}

impl Serialize for TagKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TagKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(name.parse().unwrap_or_else(|never| match never {}))
    }
}

/// Tag kind to payload. Ordered so two equal maps always serialize identically.
pub type TagMap = BTreeMap<TagKind, Value>;

/// Per-handler tag maps of one API, keyed by handler name
pub type PlugsMap = BTreeMap<String, TagMap>;

/// The set of tag kinds `tags_of` reports: every builtin plus registered custom kinds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownTags {
    custom: BTreeSet<String>,
}

impl KnownTags {
    pub fn register(&mut self, name: impl Into<String>) {
        self.custom.insert(name.into());
    }

    pub fn contains(&self, kind: &TagKind) -> bool {
        kind.is_builtin() || matches!(kind, TagKind::Custom(name) if self.custom.contains(name))
    }
}

/// Anything tags can be attached to: a handler or a whole API
pub trait Taggable {
    fn tag_map(&self) -> &TagMap;
    fn tag_map_mut(&mut self) -> &mut TagMap;

    /// Attach `payload` under `kind`. Re-tagging with the same payload is a no-op.
    fn tag(&mut self, kind: TagKind, payload: Value) {
        self.tag_map_mut().insert(kind, payload);
    }

    fn has_tag(&self, kind: &TagKind) -> Option<&Value> {
        self.tag_map().get(kind)
    }

    /// Truthiness check in the way payloads are read by the binder and clients
    fn is_tagged(&self, kind: &TagKind) -> bool {
        self.has_tag(kind).is_some_and(is_truthy)
    }

    fn tags_of(&self, known: &KnownTags) -> TagMap {
        self.tag_map()
            .iter()
            .filter(|(kind, _)| known.contains(kind))
            .map(|(kind, payload)| (kind.clone(), payload.clone()))
            .collect()
    }
}

/// Builder-style taggers available on every `Taggable`
pub trait TagBuilder: Taggable + Sized {
    fn tagged(mut self, kind: TagKind, payload: Value) -> Self {
        self.tag(kind, payload);
        self
    }

    fn stream_response(self) -> Self {
        self.tagged(TagKind::StreamResponse, Value::Bool(true))
    }

    fn with_authorization(self) -> Self {
        self.tagged(TagKind::WithAuthorization, Value::Bool(true))
    }

    fn http_get(self) -> Self {
        self.tagged(TagKind::HttpGet, Value::Bool(true))
    }

    fn custom_request_body(self) -> Self {
        self.tagged(TagKind::CustomRequestBody, Value::Bool(true))
    }

    /// Headers every client call to this handler carries
    fn custom_headers(self, headers: Value) -> Self {
        self.tagged(TagKind::CustomHeaders, headers)
    }

    /// Restrict to tokens whose role is in `roles`. Repeated calls widen the set.
    fn role_authorization(mut self, roles: impl IntoIterator<Item = u32>) -> Self {
        let mut set = roles_of(self.has_tag(&TagKind::RoleAuthorization));
        set.extend(roles);
        if !self.is_tagged(&TagKind::WithAuthorization) {
            self.tag(TagKind::WithAuthorization, Value::Bool(true));
        }
        self.tagged(TagKind::RoleAuthorization, roles_payload(&set))
    }

    fn cache_server(self, max_age_secs: u64) -> Self {
        self.tagged(TagKind::CacheServer, json!({ "maxAgeSecs": max_age_secs }))
    }

    fn cache_client(self, max_age_secs: u64) -> Self {
        self.tagged(TagKind::CacheClient, json!({ "maxAgeSecs": max_age_secs }))
    }
}

impl<T: Taggable> TagBuilder for T {}

/// JSON truthiness: null, false, 0 and "" are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Role set carried by a `roleAuthorization` payload
pub fn roles_of(payload: Option<&Value>) -> BTreeSet<u32> {
    payload
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_u64)
                .filter_map(|r| u32::try_from(r).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn roles_payload(roles: &BTreeSet<u32>) -> Value {
    json!(roles.iter().collect::<Vec<_>>())
}

/// `maxAgeSecs` of a cache policy payload
pub fn cache_max_age(payload: Option<&Value>) -> Option<u64> {
    payload?.get("maxAgeSecs")?.as_u64()
}

/// Tag map as shipped to clients: role tags collapse into plain authorization
pub fn client_tag_map(tags: &TagMap) -> TagMap {
    let mut out = tags.clone();
    if out.remove(&TagKind::RoleAuthorization).is_some() {
        out.insert(TagKind::WithAuthorization, Value::Bool(true));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_by_name() {
        for kind in TagKind::BUILTIN.iter() {
            let parsed: TagKind = kind.as_str().parse().unwrap();
            assert_eq!(&parsed, kind);
        }
        let custom: TagKind = "auditTrail".parse().unwrap();
        assert_eq!(custom, TagKind::Custom("auditTrail".into()));
    }

    #[test]
    fn tag_map_serializes_with_camel_case_keys() {
        let mut tags = TagMap::new();
        tags.insert(TagKind::StreamResponse, Value::Bool(true));
        assert_eq!(serde_json::to_string(&tags).unwrap(), r#"{"streamResponse":true}"#);
    }

    #[test]
    fn unknown_custom_kinds_are_filtered() {
        struct Subject(TagMap);
        impl Taggable for Subject {
            fn tag_map(&self) -> &TagMap {
                &self.0
            }
            fn tag_map_mut(&mut self) -> &mut TagMap {
                &mut self.0
            }
        }

        let mut subject = Subject(TagMap::new());
        subject.tag(TagKind::HttpGet, Value::Bool(true));
        subject.tag(TagKind::Custom("internalState".into()), json!({"x": 1}));
        subject.tag(TagKind::Custom("audit".into()), Value::Bool(true));

        let mut known = KnownTags::default();
        known.register("audit");
        let visible = subject.tags_of(&known);
        assert_eq!(visible.len(), 2);
        assert!(visible.contains_key(&TagKind::Custom("audit".into())));
        assert!(!visible.contains_key(&TagKind::Custom("internalState".into())));
    }

    #[test]
    fn role_tag_is_downgraded_for_clients() {
        let mut tags = TagMap::new();
        tags.insert(TagKind::RoleAuthorization, json!([2, 3]));
        tags.insert(TagKind::WithAuthorization, Value::Bool(true));
        let client = client_tag_map(&tags);
        assert!(!client.contains_key(&TagKind::RoleAuthorization));
        assert_eq!(client.get(&TagKind::WithAuthorization), Some(&Value::Bool(true)));
    }

    #[test]
    fn role_sets_widen_and_imply_authorization() {
        struct Subject(TagMap);
        impl Taggable for Subject {
            fn tag_map(&self) -> &TagMap {
                &self.0
            }
            fn tag_map_mut(&mut self) -> &mut TagMap {
                &mut self.0
            }
        }

        let subject = Subject(TagMap::new()).role_authorization([3]).role_authorization([2]);
        assert!(subject.is_tagged(&TagKind::WithAuthorization));
        assert_eq!(
            roles_of(subject.has_tag(&TagKind::RoleAuthorization)),
            BTreeSet::from([2, 3])
        );
    }

    #[test]
    fn truthiness_follows_json_rules() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([1])));
    }
}
