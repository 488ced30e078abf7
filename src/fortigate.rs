// This file is a part of Audit-Inspector
// Copyright (C) 2024 Kiersten Gross

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use core::fmt;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    str::FromStr,
};
use clap::ValueEnum;
use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::info::{ConfigInfo, HOSTNAME_UNKNOWN};
use crate::node::{close_config_block, Node, Section};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no info in {0}")]
    NoInfo(String),

    #[error("unknown encoding label {0}")]
    UnknownEncoding(String),

    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid saved configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which half of a parsed configuration a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Vdom,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "global" => Ok(Scope::Global),
            "vdom" => Ok(Scope::Vdom),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scope::Global => write!(f, "global"),
            Scope::Vdom => write!(f, "vdom"),
        }
    }
}

/// A FortiGate backup split into its global and per-VDOM halves.
///
/// In single-VDOM mode `vdom_config` holds exactly one key, `root`. In
/// multi-VDOM mode its keys are the VDOM names in backup order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FortiGateConfig {
    #[serde(rename = "global")]
    pub global_config: Node,
    #[serde(rename = "vdom")]
    pub vdom_config: Node,
    pub info: ConfigInfo,
}

impl FortiGateConfig {
    /// Parses the lines of a backup. `source` only names the input in errors.
    pub fn parse<I, S>(lines: I, source: &str) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (tree, info) = parse_tree(lines);
        let mut info = info.ok_or_else(|| ConfigError::NoInfo(source.to_string()))?;

        let (global_config, vdom_config) = split_scopes(tree, &info);
        info.hostname = match global_config.lookup("system/global/hostname") {
            Some(hostname) => hostname.to_string(),
            None => HOSTNAME_UNKNOWN.to_string(),
        };
        debug!("Parsed {} ({} {})", source, info.model, info.os_version);

        Ok(Self {
            global_config,
            vdom_config,
            info,
        })
    }

    /// Reads a backup from disk, or a document written by [`FortiGateConfig::save`]
    /// when the file ends in `.json`.
    pub fn from_path(path: &Path, encoding: Option<&str>) -> Result<Self, ConfigError> {
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            return Self::load(path);
        }

        let encoding = match encoding {
            Some(label) => Some(
                Encoding::for_label(label.as_bytes())
                    .ok_or_else(|| ConfigError::UnknownEncoding(label.to_string()))?,
            ),
            None => None,
        };

        // No explicit encoding means BOM sniffing with a UTF-8 fallback.
        let in_file = File::open(path)?;
        let mut decoder = DecodeReaderBytesBuilder::new()
            .encoding(encoding)
            .strip_bom(true)
            .build(in_file);
        let mut content = String::new();
        decoder.read_to_string(&mut content)?;

        Self::parse(content.lines(), &path.display().to_string())
    }

    pub fn get_configuration(&self, scope: Scope, path: &str) -> Option<&Node> {
        match scope {
            Scope::Global => self.global_config.lookup(path),
            Scope::Vdom => self.vdom_config.lookup(path),
        }
    }

    /// VDOM names in backup order; empty in single-VDOM mode.
    pub fn get_vdoms(&self) -> Vec<String> {
        if !self.info.is_multi_vdom() {
            return Vec::new();
        }
        match self.vdom_config.as_block() {
            Some(vdoms) => vdoms.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Saved parsed configuration to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        info!("Loaded parsed configuration from {}", path.display());
        Ok(config)
    }
}

/// Builds the raw tree of a backup and the header metadata, if any was found.
pub fn parse_tree<I, S>(lines: I) -> (Section, Option<ConfigInfo>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = Parser {
        lines: lines.into_iter(),
        path: Vec::new(),
        info: ConfigInfo::new(),
        has_info: false,
    };
    let tree = match parser.parse_block() {
        Node::Block(section) => section,
        _ => {
            warn!("Unbalanced `end` at the top level, discarding the parsed blocks");
            Section::new()
        }
    };
    let info = if parser.has_info { Some(parser.info) } else { None };
    (tree, info)
}

fn split_scopes(mut tree: Section, info: &ConfigInfo) -> (Node, Node) {
    if info.is_multi_vdom() {
        let global = tree.shift_remove("global").unwrap_or_else(Node::empty);
        let vdom = tree.shift_remove("vdom").unwrap_or_else(Node::empty);
        return (global, vdom);
    }

    let mut global = Section::new();
    if let Some(system) = tree.shift_remove("system") {
        global.insert("system".to_string(), system);
    }
    let mut vdom = Section::new();
    vdom.insert("root".to_string(), Node::Block(tree));
    (Node::Block(global), Node::Block(vdom))
}

/// One parse of one backup. The block path lives here so separate parses
/// never share state.
struct Parser<I> {
    lines: I,
    path: Vec<String>,
    info: ConfigInfo,
    has_info: bool,
}

impl<I, S> Parser<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    /// Consumes lines up to the `end`/`next` closing the current block.
    fn parse_block(&mut self) -> Node {
        let mut current = Section::new();
        let mut multiline: Option<(String, String)> = None;

        while let Some(raw) = self.lines.next() {
            let line = raw.as_ref().trim();

            if let Some((key, mut buffer)) = multiline.take() {
                buffer.push('\n');
                buffer.push_str(line);
                if line.ends_with('"') {
                    current.insert(key, Node::Leaf(strip_enclosing_quotes(&buffer)));
                } else {
                    multiline = Some((key, buffer));
                }
                continue;
            }

            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                if self.info.parse_comment(line) > 0 {
                    self.has_info = true;
                }
                continue;
            }

            let (keyword, rest) = split_keyword(line);
            match keyword {
                "set" => {
                    let (key, value) = split_keyword(rest);
                    if key.is_empty() {
                        continue;
                    }
                    if value.matches('"').count() % 2 == 1 && !value.ends_with('"') {
                        multiline = Some((key.to_string(), value.to_string()));
                    } else {
                        current.insert(key.to_string(), Node::Leaf(normalize_value(value)));
                    }
                }
                "config" => self.parse_config(&mut current, rest),
                "edit" => {
                    let name = unquote(rest);
                    self.path.push(name.clone());
                    let block = self.parse_block();
                    current.insert(name, block);
                }
                "end" => {
                    self.path.pop();
                    return close_config_block(current);
                }
                "next" => {
                    self.path.pop();
                    return Node::Block(current);
                }
                _ => {}
            }
        }

        // Input ran out inside a quoted value.
        if let Some((key, buffer)) = multiline {
            current.insert(key, Node::Leaf(strip_enclosing_quotes(&buffer)));
        }
        Node::Block(current)
    }

    fn parse_config(&mut self, current: &mut Section, rest: &str) {
        let names: Vec<String> = rest.split_whitespace().map(unquote).collect();
        let (first, nested) = match names.split_first() {
            Some(v) => v,
            None => return,
        };
        self.path.push(names.join(" "));

        if nested.is_empty() && first == "vdom" && self.path.len() == 1 {
            let block = self.parse_block();
            merge_vdoms(current, block);
            return;
        }

        let block = self.parse_block();
        if nested.is_empty() {
            current.insert(first.clone(), block);
            return;
        }

        // `config a b c` stores the block at a/b/c, keeping siblings under a.
        let chain = nested.iter().rev().fold(block, |inner, name| {
            let mut section = Section::new();
            section.insert(name.clone(), inner);
            Node::Block(section)
        });
        let target = current.entry(first.clone()).or_insert_with(Node::empty);
        if target.as_block().is_none() {
            *target = Node::empty();
        }
        if let (Some(target), Node::Block(chain)) = (target.as_block_mut(), chain) {
            target.extend(chain);
        }
    }
}

/// Folds one top level `config vdom` wrapper into the `vdom` key.
fn merge_vdoms(current: &mut Section, block: Node) {
    let incoming = match block {
        Node::Block(section) => section,
        other => {
            current.insert("vdom".to_string(), other);
            return;
        }
    };

    let target = current.entry("vdom".to_string()).or_insert_with(Node::empty);
    if target.as_block().is_none() {
        *target = Node::empty();
    }
    if let Some(vdoms) = target.as_block_mut() {
        for (name, node) in incoming {
            match vdoms.get_mut(&name) {
                Some(Node::Block(existing)) if node.as_block().is_some() => {
                    if let Node::Block(entries) = node {
                        existing.extend(entries);
                    }
                }
                _ => {
                    vdoms.insert(name, node);
                }
            }
        }
    }
}

fn split_keyword(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    }
}

fn unquote(value: &str) -> String {
    value.replace('"', "").trim().to_string()
}

fn normalize_value(value: &str) -> String {
    value.replace('"', "").split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn strip_enclosing_quotes(value: &str) -> String {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value).to_string()
}
