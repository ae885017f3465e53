//! Generated client stub modules.
//!
//! A stub module is an ES module whose default export is the API object with
//! one empty method per handler, followed by the `plugsMap` export carrying
//! each handler's client tag map:
//!
//! ```text
//! // Generated by resi. Do not edit.
//! import * as user from '../models/user.js';
//! export default {
//!   name: 'users',
//!   a(x){},
//!   b(y,z){},
//! };
//!
//! export const plugsMap = {"b":{"streamResponse":true}};
//! ```
//!
//! `parse` reads back exactly what `render` writes; it is not a JavaScript parser.

use crate::api::PlugsMap;
use crate::synthesis::SynthesisError;
use crate::types::MODELS_DIRECTORY;

const HEADER: &str = "// Generated by resi. Do not edit.";
const PLUGS_PREFIX: &str = "export const plugsMap = ";

/// An empty client method with the handler's name and declared parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    pub name: String,
    pub params: Vec<String>,
}

impl Stub {
    pub fn render(&self) -> String {
        format!("{}({}){{}}", self.name, self.params.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StubModule {
    pub api_name: String,
    /// Model file names imported from the models directory
    pub models: Vec<String>,
    pub stubs: Vec<Stub>,
    pub plugs_map: PlugsMap,
}

impl StubModule {
    pub fn file_name(&self) -> String {
        format!("{}.js", self.api_name)
    }

    pub fn render(&self) -> Result<String, SynthesisError> {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');

        for model in &self.models {
            out.push_str(&format!(
                "import * as {} from '../{}/{}';\n",
                model_binding(model),
                MODELS_DIRECTORY,
                model
            ));
        }

        out.push_str("export default {\n");
        out.push_str(&format!("  name: '{}',\n", self.api_name));
        for stub in &self.stubs {
            out.push_str(&format!("  {},\n", stub.render()));
        }
        out.push_str("};\n\n");

        out.push_str(PLUGS_PREFIX);
        out.push_str(&serde_json::to_string(&self.plugs_map)?);
        out.push_str(";\n");
        Ok(out)
    }

    pub fn parse(file: &str, content: &str) -> Result<Self, SynthesisError> {
        let fail = |reason: &str| SynthesisError::Parse {
            file: file.to_string(),
            reason: reason.to_string(),
        };

        let mut module = StubModule::default();
        let mut in_body = false;
        let mut plugs = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("import * as ") {
                let model = rest
                    .split('\'')
                    .nth(1)
                    .and_then(|path| path.rsplit('/').next())
                    .ok_or_else(|| fail("malformed model import"))?;
                module.models.push(model.to_string());
            } else if trimmed == "export default {" {
                in_body = true;
            } else if trimmed == "};" {
                in_body = false;
            } else if let Some(json) = trimmed.strip_prefix(PLUGS_PREFIX) {
                plugs = Some(serde_json::from_str(json.trim_end_matches(';'))?);
            } else if in_body {
                if let Some(name) = trimmed.strip_prefix("name: '") {
                    module.api_name = name.trim_end_matches(',').trim_end_matches('\'').to_string();
                } else if let Some(signature) = trimmed.strip_suffix("){},") {
                    let (name, params) = signature
                        .split_once('(')
                        .ok_or_else(|| fail("malformed stub signature"))?;
                    module.stubs.push(Stub {
                        name: name.to_string(),
                        params: params
                            .split(',')
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(String::from)
                            .collect(),
                    });
                }
            }
        }

        if module.api_name.is_empty() {
            return Err(fail("missing API name"));
        }
        module.plugs_map = plugs.ok_or_else(|| fail("missing plugsMap export"))?;
        Ok(module)
    }
}

/// JavaScript binding for a model import: the file stem with anything that is
/// not an identifier character replaced by `_`
pub fn model_binding(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let mut binding: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    if binding.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        binding.insert(0, '_');
    }
    binding
}

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do", "else",
    "export", "extends", "finally", "for", "function", "if", "import", "in", "instanceof", "new", "return",
    "super", "switch", "this", "throw", "try", "typeof", "var", "void", "while", "with", "yield",
];

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}
