//! Filepath: src/infra/config.rs
//! Layered configuration: defaults, then a config file, then
//! `ANCHORPATCH__*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{AppContext, InitArgs},
    core::{
        apply::ApplyOptions,
        context::ContextOptions,
        index::{StrategyChain, SymbolIndexer},
        select::SelectOptions,
        symbols::Strategy,
    },
};

/// Config file names probed in the working directory, first hit wins
pub const CONFIG_FILES: [&str; 4] = ["anchorpatch.toml", "anchorpatch.yaml", "anchorpatch.json", ".anchorpatch.toml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Keep full suggestion previews in diagnostics
    pub verbose: bool,

    /// Symbol indexing and context selection
    pub extract: ExtractConfig,

    /// Patch application
    pub apply: ApplyConfig,

    /// Retry loop
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig
{
    pub strategy: Strategy,
    /// Tried after `strategy`; the heuristic scanner always closes the chain
    pub fallback: Vec<Strategy>,
    pub budget_lines: usize,
    pub surrounding_lines: usize,
    pub small_file_bytes: usize,
    pub header_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig
{
    pub allow_overwrite: bool,
    pub suggestion_limit: usize,
    pub min_similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig
{
    pub max_attempts: usize,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            verbose: false,
            extract: ExtractConfig::default(),
            apply: ApplyConfig::default(),
            workflow: WorkflowConfig::default(),
        }
    }
}

impl Default for ExtractConfig
{
    fn default() -> Self
    {
        Self {
            strategy: Strategy::Grammar,
            fallback: Vec::new(),
            budget_lines: 50,
            surrounding_lines: 3,
            small_file_bytes: 5 * 1024,
            header_lines: 25,
        }
    }
}

impl Default for ApplyConfig
{
    fn default() -> Self
    {
        Self {
            allow_overwrite: false,
            suggestion_limit: 3,
            min_similarity: 0.0,
        }
    }
}

impl Default for WorkflowConfig
{
    fn default() -> Self
    {
        Self { max_attempts: 3 }
    }
}

impl Config
{
    pub fn strategy_chain(&self) -> StrategyChain
    {
        StrategyChain::new(self.extract.strategy, &self.extract.fallback)
    }

    pub fn indexer(&self) -> SymbolIndexer
    {
        SymbolIndexer::new(self.strategy_chain())
    }

    pub fn context_options(&self) -> ContextOptions
    {
        ContextOptions {
            select: SelectOptions {
                budget_lines: self.extract.budget_lines,
                surrounding_lines: self.extract.surrounding_lines,
                header_lines: self.extract.header_lines,
            },
            small_file_bytes: self.extract.small_file_bytes,
        }
    }

    pub fn apply_options(&self) -> ApplyOptions
    {
        ApplyOptions {
            allow_overwrite: self.apply.allow_overwrite,
            suggestion_limit: self.apply.suggestion_limit,
            min_similarity: self.apply.min_similarity,
            verbose: self.verbose,
        }
    }
}

/// Load configuration; `explicit` replaces the probed file names
pub fn load_config(explicit: Option<&Path>) -> Result<Config>
{
    let mut builder = config::Config::builder();

    match explicit
    {
        Some(path) =>
        {
            if !path.exists()
            {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }
        None =>
        {
            if let Some(path) = CONFIG_FILES
                .iter()
                .find(|p| Path::new(p).exists())
            {
                builder = builder.add_source(config::File::with_name(path));
            }
        }
    }

    // ANCHORPATCH__EXTRACT__BUDGET_LINES=80
    builder = builder.add_source(
        config::Environment::with_prefix("ANCHORPATCH")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("extract.fallback")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    if parsed
        .extract
        .budget_lines
        == 0
    {
        anyhow::bail!("extract.budget_lines must be at least 1");
    }

    Ok(parsed)
}

/// Write a default `anchorpatch.toml` into `args.path`
pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<PathBuf>
{
    let config_path = args
        .path
        .join(CONFIG_FILES[0]);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let toml_string =
        toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(config_path)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() -> Result<()>
    {
        let text = toml::to_string_pretty(&Config::default())?;
        assert!(text.contains("budget_lines = 50"));
        assert!(text.contains("strategy = \"grammar\""));
        let back: Config = toml::from_str(&text)?;
        assert_eq!(back, Config::default());
        Ok(())
    }

    #[test]
    fn explicit_file_overrides_defaults() -> Result<()>
    {
        let dir = tempfile::tempdir()?;
        let path = dir
            .path()
            .join("custom.toml");
        std::fs::write(
            &path,
            "verbose = true\n[extract]\nstrategy = \"syntax_tree\"\nfallback = [\"grammar\"]\n[workflow]\nmax_attempts = 5\n",
        )?;

        let cfg = load_config(Some(&path))?;
        assert!(cfg.verbose);
        assert_eq!(cfg.workflow.max_attempts, 5);
        assert_eq!(cfg.extract.budget_lines, 50);
        assert_eq!(
            cfg.strategy_chain()
                .strategies(),
            [Strategy::SyntaxTree, Strategy::Grammar, Strategy::Heuristic]
        );
        Ok(())
    }

    #[test]
    fn zero_budget_is_rejected() -> Result<()>
    {
        let dir = tempfile::tempdir()?;
        let path = dir
            .path()
            .join("zero.toml");
        std::fs::write(&path, "[extract]\nbudget_lines = 0\n")?;

        let err = load_config(Some(&path)).unwrap_err();
        assert!(
            err.to_string()
                .contains("budget_lines")
        );
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error()
    {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(
            err.to_string()
                .contains("not found")
        );
    }
}
