//! Translation-unit configuration for exception-handling lowering.
//!
//! Settings resolve in three layers: built-in defaults, an optional YAML file
//! (`eh.yaml`), then `EH_*` environment variables.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default configuration file name looked up by [`EhConfig::resolve`].
pub const CONFIG_FILE_NAME: &str = "eh.yaml";

/// How the target unwinds through frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnwindModel {
    /// Table-driven unwinding; protected regions are plain range markers.
    Tables,
    /// setjmp/longjmp unwinding; regions can only be entered through their top.
    SetjmpLongjmp,
}

impl UnwindModel {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "tables" | "table" | "dwarf" => Some(Self::Tables),
            "setjmp-longjmp" | "sjlj" => Some(Self::SetjmpLongjmp),
            _ => None,
        }
    }
}

impl fmt::Display for UnwindModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnwindModel::Tables => "tables",
            UnwindModel::SetjmpLongjmp => "setjmp-longjmp",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EhConfig {
    /// When false every EH construct is rejected once per unit.
    pub exceptions: bool,
    /// Declare `terminate` inside namespace `std`.
    pub honor_std: bool,
    pub unwind_model: UnwindModel,
}

impl EhConfig {
    pub const DEFAULT: Self = Self {
        exceptions: true,
        honor_std: true,
        unwind_model: UnwindModel::Tables,
    };

    #[must_use]
    pub fn with_exceptions(mut self, enabled: bool) -> Self {
        self.exceptions = enabled;
        self
    }

    #[must_use]
    pub fn with_honor_std(mut self, honor_std: bool) -> Self {
        self.honor_std = honor_std;
        self
    }

    #[must_use]
    pub fn with_unwind_model(mut self, model: UnwindModel) -> Self {
        self.unwind_model = model;
        self
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::DEFAULT);
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            Error::Config { message } => {
                Error::config(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Resolve the configuration for a unit: `dir/eh.yaml` when present,
    /// then the process environment.
    pub fn resolve(dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::DEFAULT;
        if let Some(dir) = dir {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                config = Self::load(&path)?;
            }
        }
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `EH_EXCEPTIONS`, `EH_HONOR_STD` and `EH_UNWIND_MODEL` overrides
    /// fetched through `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("EH_EXCEPTIONS") {
            self.exceptions = parse_flag("EH_EXCEPTIONS", &value)?;
        }
        if let Some(value) = lookup("EH_HONOR_STD") {
            self.honor_std = parse_flag("EH_HONOR_STD", &value)?;
        }
        if let Some(value) = lookup("EH_UNWIND_MODEL") {
            self.unwind_model = UnwindModel::parse(&value).ok_or_else(|| {
                Error::config(format!("EH_UNWIND_MODEL: unknown unwind model `{value}`"))
            })?;
        }
        Ok(self)
    }
}

impl Default for EhConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!(
            "{key}: expected a boolean, found `{other}`"
        ))),
    }
}
