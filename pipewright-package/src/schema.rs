//! Option descriptors and `key=value` override parsing.

use pipewright_types::{ConfigMap, ConfigValue};
use serde::Deserialize;
use thiserror::Error;

/// Value type of a configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Str,
    Int,
    Float,
    Bool,
    List,
}

impl OptionType {
    pub fn as_str(self) -> &'static str {
        match self {
            OptionType::Str => "str",
            OptionType::Int => "int",
            OptionType::Float => "float",
            OptionType::Bool => "bool",
            OptionType::List => "list",
        }
    }
}

/// One configuration option.
///
/// An option whose default is [`ConfigValue::Null`] is required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    #[serde(default)]
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    #[serde(default)]
    pub default: ConfigValue,
    #[serde(default)]
    pub choices: Vec<ConfigValue>,
}

impl ConfigOption {
    pub fn new(name: &str, kind: OptionType) -> Self {
        Self {
            name: name.to_string(),
            msg: String::new(),
            kind,
            default: ConfigValue::Null,
            choices: Vec::new(),
        }
    }

    pub fn msg(mut self, msg: &str) -> Self {
        self.msg = msg.to_string();
        self
    }

    pub fn default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = value.into();
        self
    }

    pub fn choices<V: Into<ConfigValue>>(mut self, choices: impl IntoIterator<Item = V>) -> Self {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_null()
    }

    /// Convert command-line text into a typed value.
    pub fn coerce(&self, raw: &str) -> Result<ConfigValue, SchemaError> {
        let invalid = || SchemaError::InvalidValue {
            name: self.name.clone(),
            value: raw.to_string(),
            expected: self.kind.as_str(),
        };
        let value = match self.kind {
            OptionType::Str => ConfigValue::Str(raw.to_string()),
            OptionType::Int => ConfigValue::Int(raw.trim().parse().map_err(|_| invalid())?),
            OptionType::Float => ConfigValue::Float(raw.trim().parse().map_err(|_| invalid())?),
            OptionType::Bool => ConfigValue::Bool(parse_bool(raw).ok_or_else(invalid)?),
            OptionType::List => ConfigValue::List(parse_list(raw)),
        };
        self.check_choice(&value)?;
        Ok(value)
    }

    fn check_choice(&self, value: &ConfigValue) -> Result<(), SchemaError> {
        if self.choices.is_empty() || self.choices.contains(value) {
            return Ok(());
        }
        Err(SchemaError::InvalidChoice {
            name: self.name.clone(),
            value: value.to_string(),
            choices: self
                .choices
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("unknown option '{name}'")]
    UnknownOption { name: String },

    #[error("invalid value '{value}' for option '{name}' (expected {expected})")]
    InvalidValue {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid value '{value}' for option '{name}' (choices: {choices})")]
    InvalidChoice {
        name: String,
        value: String,
        choices: String,
    },

    #[error("option '{name}' expects a value")]
    MissingValue { name: String },

    #[error("unexpected argument '{arg}' (use key=value)")]
    UnexpectedArgument { arg: String },
}

/// Options every package accepts, appended after its own options.
pub fn common_options() -> Vec<ConfigOption> {
    vec![
        ConfigOption::new("deploy_mode", OptionType::Str)
            .msg("Where the package runs")
            .default("default")
            .choices(["default", "container"]),
        ConfigOption::new("interceptors", OptionType::List)
            .msg("Interceptor aliases applied before start")
            .default(ConfigValue::List(Vec::new())),
        ConfigOption::new("sleep", OptionType::Int)
            .msg("Seconds to sleep after start")
            .default(0),
        ConfigOption::new("do_dbg", OptionType::Bool)
            .msg("Launch under a debugger")
            .default(false),
        ConfigOption::new("dbg_port", OptionType::Int)
            .msg("Debugger port")
            .default(1234),
        ConfigOption::new("timeout", OptionType::Int)
            .msg("Command timeout in seconds")
            .default(300),
        ConfigOption::new("retry_count", OptionType::Int)
            .msg("Retries for failed commands")
            .default(3),
        ConfigOption::new("hide_output", OptionType::Bool)
            .msg("Suppress command output")
            .default(false),
        ConfigOption::new("hostfile", OptionType::Str)
            .msg("Package hostfile (empty inherits the pipeline's)")
            .default(""),
    ]
}

/// Ordered options of one package: its own, then the common suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSchema {
    options: Vec<ConfigOption>,
}

impl ConfigSchema {
    pub fn with_common(mut own: Vec<ConfigOption>) -> Self {
        let common = common_options();
        own.retain(|o| !common.iter().any(|c| c.name == o.name));
        own.extend(common);
        Self { options: own }
    }

    pub fn options(&self) -> &[ConfigOption] {
        &self.options
    }

    pub fn get(&self, name: &str) -> Option<&ConfigOption> {
        self.options.iter().find(|o| o.name == name)
    }

    /// Every non-null default.
    pub fn defaults(&self) -> ConfigMap {
        self.options
            .iter()
            .filter(|o| !o.default.is_null())
            .map(|o| (o.name.clone(), o.default.clone()))
            .collect()
    }

    /// Fill in defaults for keys absent from `config`.
    pub fn apply_defaults(&self, config: &mut ConfigMap) {
        for (k, v) in self.defaults() {
            config.entry(k).or_insert(v);
        }
    }

    /// Required options left unset (missing or null) in `config`, in schema order.
    pub fn missing_required(&self, config: &ConfigMap) -> Vec<String> {
        self.options
            .iter()
            .filter(|o| o.is_required())
            .filter(|o| config.get(&o.name).is_none_or(ConfigValue::is_null))
            .map(|o| o.name.clone())
            .collect()
    }

    /// Parse `key=value`, `--key=value`, `--key value`, `+flag` and `-flag`.
    pub fn parse_overrides<S: AsRef<str>>(&self, args: &[S]) -> Result<ConfigMap, SchemaError> {
        let mut out = ConfigMap::new();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_ref();
            if let Some(rest) = arg.strip_prefix("--") {
                if let Some((k, v)) = rest.split_once('=') {
                    let opt = self.lookup(k)?;
                    out.insert(opt.name.clone(), opt.coerce(v)?);
                } else {
                    let opt = self.lookup(rest)?;
                    match args.get(i + 1).map(AsRef::as_ref) {
                        Some(next) if !looks_like_flag(next) => {
                            out.insert(opt.name.clone(), opt.coerce(next)?);
                            i += 1;
                        }
                        _ if opt.kind == OptionType::Bool => {
                            out.insert(opt.name.clone(), ConfigValue::Bool(true));
                        }
                        _ => {
                            return Err(SchemaError::MissingValue {
                                name: opt.name.clone(),
                            });
                        }
                    }
                }
            } else if let Some((k, v)) = arg.split_once('=') {
                let opt = self.lookup(k)?;
                out.insert(opt.name.clone(), opt.coerce(v)?);
            } else if let Some(k) = arg.strip_prefix('+') {
                out.insert(self.lookup_bool(k)?, ConfigValue::Bool(true));
            } else if let Some(k) = arg.strip_prefix('-') {
                out.insert(self.lookup_bool(k)?, ConfigValue::Bool(false));
            } else {
                return Err(SchemaError::UnexpectedArgument {
                    arg: arg.to_string(),
                });
            }
            i += 1;
        }
        Ok(out)
    }

    fn lookup(&self, name: &str) -> Result<&ConfigOption, SchemaError> {
        self.get(name.trim()).ok_or_else(|| SchemaError::UnknownOption {
            name: name.trim().to_string(),
        })
    }

    fn lookup_bool(&self, name: &str) -> Result<String, SchemaError> {
        let opt = self.lookup(name)?;
        if opt.kind != OptionType::Bool {
            return Err(SchemaError::InvalidValue {
                name: opt.name.clone(),
                value: name.to_string(),
                expected: opt.kind.as_str(),
            });
        }
        Ok(opt.name.clone())
    }
}

fn looks_like_flag(s: &str) -> bool {
    s.starts_with("--") || s.contains('=') || (s.starts_with('+') && s.len() > 1)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_list(raw: &str) -> Vec<ConfigValue> {
    let raw = raw.trim();
    let inner = match raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        Some(inner) => inner,
        None if raw.is_empty() => return Vec::new(),
        None => return vec![ConfigValue::Str(raw.to_string())],
    };
    inner
        .split(',')
        .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .map(|s| ConfigValue::Str(s.to_string()))
        .collect()
}
