use crate::fingerprint::FieldValue;
use crate::steps::ExecStep;
use std::collections::BTreeMap;

pub const SRC: &str = "SRC";
pub const SRCS: &str = "SRCS";
pub const OUT: &str = "OUT";
pub const OUT_DIR: &str = "OUT_DIR";
pub const IMPORT_PATH: &str = "IMPORT_PATH";
pub const MODULE_NAME: &str = "MODULE_NAME";
pub const PACKAGE: &str = "PACKAGE";
pub const FLAGS: &str = "FLAGS";

/// A command line template used by the built-in rules.
///
/// Arguments and environment values may use `{{NAME}}` placeholders, which are filled in when
/// the rule produces its steps. An argument that is exactly a list placeholder (like `{{SRCS}}`)
/// expands into one argument per element.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl Tool {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            env: BTreeMap::new(),
        }
    }

    pub fn arg<A: Into<String>>(mut self, arg: A) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// The tool as it goes into a rule key: the templates, not their expansion.
    pub fn to_field_value(&self) -> FieldValue {
        FieldValue::map([
            ("program", FieldValue::from(self.program.as_str())),
            ("args", FieldValue::list(self.args.iter())),
            (
                "env",
                FieldValue::map(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            ),
        ])
    }

    pub fn to_step(&self, placeholders: &Placeholders) -> ExecStep {
        let mut step = ExecStep::new(placeholders.fill(&self.program));
        for arg in &self.args {
            step = step.args(placeholders.expand(arg));
        }
        for (key, value) in &self.env {
            step = step.env(key, placeholders.fill(value));
        }
        step
    }
}

impl From<&str> for Tool {
    fn from(program: &str) -> Self {
        Tool::new(program)
    }
}

/// The values that `{{NAME}}` placeholders are replaced with.
///
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: BTreeMap<&'static str, String>,
    lists: BTreeMap<&'static str, Vec<String>>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<V: Into<String>>(mut self, name: &'static str, value: V) -> Self {
        self.values.insert(name, value.into());
        self
    }

    pub fn set_list<I, V>(mut self, name: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.lists
            .insert(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Replace every scalar placeholder in `template`. Lists are joined with spaces.
    pub fn fill(&self, template: &str) -> String {
        let mut filled = template.to_string();
        for (name, value) in &self.values {
            filled = filled.replace(&format!("{{{{{}}}}}", name), value);
        }
        for (name, values) in &self.lists {
            filled = filled.replace(&format!("{{{{{}}}}}", name), &values.join(" "));
        }
        filled
    }

    /// Like `fill`, but an argument that is exactly a list placeholder becomes the list.
    pub fn expand(&self, arg: &str) -> Vec<String> {
        let list = arg
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .and_then(|name| self.lists.get(name));
        match list {
            Some(values) => values.clone(),
            None => vec![self.fill(arg)],
        }
    }
}
