//! Configuration management utilities.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use dirs_next::config_dir;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::app::components::ComponentBags;
use crate::infra::parser::{DEFAULT_MAX_YAML_CODEPOINTS, ParserOptions};
use crate::infra::serializer::Serializer;
use crate::infra::workspace::ContentKind;

static DEFAULT_CONFIG: Lazy<&'static str> =
    Lazy::new(|| include_str!("../../assets/default-config.toml"));
static DEFAULT_WORKSPACE_CONFIG_PATH: &str = ".refbundle/config.toml";

/// Layered configuration loaded from defaults, user, workspace, and env.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub parser: Parser,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub output: Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parser {
    #[serde(default = "Parser::default_max_yaml_codepoints")]
    pub max_yaml_codepoints: usize,
}

impl Parser {
    fn default_max_yaml_codepoints() -> usize {
        DEFAULT_MAX_YAML_CODEPOINTS
    }

    pub fn options(&self) -> ParserOptions {
        ParserOptions {
            max_yaml_codepoints: self.max_yaml_codepoints,
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            max_yaml_codepoints: Self::default_max_yaml_codepoints(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    #[serde(default = "Placement::default_component_bags")]
    pub component_bags: Vec<String>,
}

impl Placement {
    fn default_component_bags() -> Vec<String> {
        vec!["components/*".into(), "definitions".into()]
    }

    pub fn component_bags(&self) -> ComponentBags {
        ComponentBags::from_patterns(&self.component_bags)
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            component_bags: Self::default_component_bags(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    pretty: Option<bool>,
}

impl Output {
    fn default_pretty() -> bool {
        true
    }

    pub fn pretty(&self) -> bool {
        self.pretty.unwrap_or_else(Self::default_pretty)
    }

    /// Forced output format, if one is configured.
    pub fn format(&self) -> Result<Option<ContentKind>> {
        self.format
            .as_deref()
            .map(parse_format)
            .transpose()
    }

    pub fn serializer(&self) -> Result<Serializer> {
        Ok(Serializer::new(self.format()?, self.pretty()))
    }
}

impl Default for Output {
    fn default() -> Self {
        Self {
            format: None,
            pretty: Some(Self::default_pretty()),
        }
    }
}

fn parse_format(value: &str) -> Result<ContentKind> {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(ContentKind::Json),
        "yaml" | "yml" => Ok(ContentKind::Yaml),
        other => Err(anyhow!("unknown output format '{other}'")),
    }
}

/// Environment overrides for critical settings.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    max_yaml_codepoints: Option<String>,
    output_format: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        Self {
            max_yaml_codepoints: env::var("REFBUNDLE_MAX_YAML_CODEPOINTS").ok(),
            output_format: env::var("REFBUNDLE_OUTPUT_FORMAT").ok(),
        }
    }

    #[cfg(test)]
    fn for_tests(max_yaml_codepoints: &str, output_format: &str) -> Self {
        Self {
            max_yaml_codepoints: Some(max_yaml_codepoints.to_owned()),
            output_format: Some(output_format.to_owned()),
        }
    }
}

impl Config {
    /// Load configuration from defaults, user/global config, workspace config, and env overrides.
    pub fn load() -> Result<Self> {
        let env = EnvOverrides::from_env();
        let global = global_config_path();
        let workspace = workspace_config_path()?;
        Self::load_with_layers(global, workspace, env)
    }

    fn load_with_layers(
        global: Option<PathBuf>,
        workspace: Option<PathBuf>,
        env_overrides: EnvOverrides,
    ) -> Result<Self> {
        let mut layers: Vec<Config> = Vec::new();

        layers.push(Self::from_str(&DEFAULT_CONFIG)?);

        if let Some(global_path) = global.filter(|path| path.exists()) {
            layers.push(Self::from_file(&global_path)?);
        }

        if let Some(workspace_path) = workspace.filter(|path| path.exists()) {
            layers.push(Self::from_file(&workspace_path)?);
        }

        let merged = layers.into_iter().reduce(Config::merge).unwrap_or_default();
        apply_env_overrides(merged, env_overrides)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_str(&data)
    }

    fn from_str(contents: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(contents).with_context(|| "failed to parse TOML config".to_string())?;
        config.output.format()?;
        Ok(config)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            parser: merge_parser(self.parser, other.parser),
            placement: merge_placement(self.placement, other.placement),
            output: merge_output(self.output, other.output),
        }
    }
}

fn merge_parser(base: Parser, overlay: Parser) -> Parser {
    Parser {
        max_yaml_codepoints: if overlay.max_yaml_codepoints != Parser::default_max_yaml_codepoints()
        {
            overlay.max_yaml_codepoints
        } else {
            base.max_yaml_codepoints
        },
    }
}

fn merge_placement(base: Placement, overlay: Placement) -> Placement {
    Placement {
        component_bags: if overlay.component_bags != Placement::default_component_bags() {
            overlay.component_bags
        } else {
            base.component_bags
        },
    }
}

fn merge_output(mut base: Output, overlay: Output) -> Output {
    if let Some(value) = overlay.format {
        base.format = Some(value);
    }
    if let Some(value) = overlay.pretty {
        base.pretty = Some(value);
    }
    base
}

fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|base| base.join("refbundle/config.toml"))
}

fn workspace_config_path() -> Result<Option<PathBuf>> {
    let cwd = env::current_dir()?;
    let root = find_repo_root(&cwd).unwrap_or(cwd);
    Ok(Some(root.join(DEFAULT_WORKSPACE_CONFIG_PATH)))
}

fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(mut config: Config, env: EnvOverrides) -> Result<Config> {
    if let Some(limit) = env.max_yaml_codepoints {
        config.parser.max_yaml_codepoints = limit
            .trim()
            .parse()
            .with_context(|| format!("invalid REFBUNDLE_MAX_YAML_CODEPOINTS value '{limit}'"))?;
    }
    if let Some(format) = env.output_format {
        parse_format(&format)?;
        config.output.format = Some(format);
    }
    Ok(config)
}
