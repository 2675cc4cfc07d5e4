use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::command::{Caching, DecoderArgs};
use ttx::process::decode::DecoderConfig;
use ttx::process::store::CachingControl;
use ttx::structs::page::page_hex_to_index;

/// Decoder settings read from a `--config` YAML file.
///
/// ```yaml
/// caching: second-chance
/// max_pages: 200
/// substitute_spaces: true
/// initial_page: "100"
/// ```
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub caching: Option<Caching>,
    pub max_pages: Option<usize>,
    pub substitute_spaces: Option<bool>,
    pub initial_page: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }
}

impl From<Caching> for CachingControl {
    fn from(caching: Caching) -> Self {
        match caching {
            Caching::Normal => CachingControl::Normal,
            Caching::SecondChance => CachingControl::SecondChance,
            Caching::AlwaysUpdate => CachingControl::AlwaysUpdate,
        }
    }
}

/// Parses a page number written in hex, with or without a `0x` prefix.
pub fn parse_page_hex(text: &str) -> Result<u16> {
    let digits = text.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);

    let page = u16::from_str_radix(digits, 16)
        .with_context(|| format!("Page number is not hexadecimal: {text:?}"))?;
    page_hex_to_index(page).with_context(|| format!("Page number out of range: {text:?}"))?;

    Ok(page)
}

/// Builds the decoder configuration; command-line values win over the file.
pub fn resolve(args: &DecoderArgs, file: &FileConfig) -> Result<DecoderConfig> {
    let defaults = DecoderConfig::default();

    let initial_page = match args.page.as_deref().or(file.initial_page.as_deref()) {
        Some(text) => parse_page_hex(text)?,
        None => defaults.initial_page,
    };

    let max_page_num = args.max_pages.or(file.max_pages).unwrap_or(defaults.max_page_num);
    if max_page_num == 0 {
        anyhow::bail!("max_pages must be at least 1");
    }

    Ok(DecoderConfig {
        caching: args
            .caching
            .or(file.caching)
            .map_or(defaults.caching, CachingControl::from),
        max_page_num,
        substitute_spaces: args.substitute_spaces
            || file.substitute_spaces.unwrap_or(defaults.substitute_spaces),
        initial_page,
    })
}

/// Loads the optional config file and merges it with `args`.
pub fn load_decoder_config(path: Option<&Path>, args: &DecoderArgs) -> Result<DecoderConfig> {
    let file = match path {
        Some(path) => {
            log::debug!("Loading decoder settings from {}", path.display());
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    resolve(args, &file)
}
