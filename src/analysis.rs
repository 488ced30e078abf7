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
use std::str::FromStr;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fortigate::{FortiGateConfig, Scope};
use crate::node::{path_segments, Node};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("no checks defined")]
    NoChecks,
}

/// Why a single rule was skipped. Never fatal for the run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("`checks` is empty")]
    EmptyChecks,

    #[error("unsupported check type `{0}`")]
    UnsupportedType(String),

    #[error("unsupported scope `{0}`")]
    UnsupportedScope(String),

    #[error("malformed rule: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Count,
    Exist,
    Value,
    ValueInList,
}

impl FromStr for CheckKind {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "count" => Ok(CheckKind::Count),
            "exist" => Ok(CheckKind::Exist),
            "value" => Ok(CheckKind::Value),
            "value_in_list" => Ok(CheckKind::ValueInList),
            other => Err(RuleError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CheckKind::Count => "count",
            CheckKind::Exist => "exist",
            CheckKind::Value => "value",
            CheckKind::ValueInList => "value_in_list",
        };
        write!(f, "{}", name)
    }
}

/// A rule exactly as it appears in a check bundle.
#[derive(Debug, Default, Deserialize)]
struct RawRule {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    scope: Option<String>,
    path: Option<String>,
    checks: Option<Mapping>,
    #[serde(rename = "filter-info")]
    filter_info: Option<Mapping>,
    #[serde(rename = "filter-config")]
    filter_config: Option<Mapping>,
    #[serde(default)]
    inverse: bool,
    #[serde(default)]
    ignore_missing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckRule {
    pub name: Option<String>,
    pub kind: CheckKind,
    pub scope: Scope,
    pub path: String,
    pub checks: Vec<(String, Value)>,
    pub inverse: bool,
    pub ignore_missing: bool,
}

impl TryFrom<RawRule> for CheckRule {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let kind = raw.kind.ok_or(RuleError::MissingKey("type"))?;
        let scope = raw.scope.ok_or(RuleError::MissingKey("scope"))?;
        let path = raw.path.ok_or(RuleError::MissingKey("path"))?;
        let checks = raw.checks.ok_or(RuleError::MissingKey("checks"))?;
        if checks.is_empty() {
            return Err(RuleError::EmptyChecks);
        }

        Ok(Self {
            name: raw.name,
            kind: kind.parse::<CheckKind>()?,
            scope: scope.parse::<Scope>().map_err(RuleError::UnsupportedScope)?,
            path,
            checks: checks
                .iter()
                .map(|(key, value)| (scalar_to_string(key), value.clone()))
                .collect(),
            inverse: raw.inverse,
            ignore_missing: raw.ignore_missing,
        })
    }
}

/// Runs check bundles against one parsed configuration and reports failures.
pub struct ConfigCheck<'a> {
    config: &'a FortiGateConfig,
}

impl<'a> ConfigCheck<'a> {
    pub fn new(config: &'a FortiGateConfig) -> Self {
        Self { config }
    }

    /// Evaluates every rule in order. Rules that are filtered out or invalid
    /// contribute nothing; only an empty rule list is an error.
    pub fn execute(&self, checks: &[Value]) -> Result<Vec<String>, CheckError> {
        if checks.is_empty() {
            return Err(CheckError::NoChecks);
        }

        let mut results: Vec<String> = Vec::new();
        for (index, check) in checks.iter().enumerate() {
            let raw: RawRule = match serde_yaml::from_value(check.clone()) {
                Ok(v) => v,
                Err(e) => {
                    warn!("Skipping check #{}: {}", index + 1, RuleError::Malformed(e.to_string()));
                    continue;
                }
            };
            let label = raw.name.clone().unwrap_or_else(|| format!("#{}", index + 1));

            if !self.info_matches(&raw) {
                debug!("Check {} skipped by filter-info", label);
                continue;
            }
            if !self.config_matches(&raw) {
                debug!("Check {} skipped by filter-config", label);
                continue;
            }

            match CheckRule::try_from(raw) {
                Ok(rule) => results.extend(self.run_rule(&rule)),
                Err(e) => warn!("Skipping check {}: {}", label, e),
            }
        }

        let hostname = &self.config.info.hostname;
        Ok(results
            .into_iter()
            .map(|message| format!("[{}]: {}", hostname, message))
            .collect())
    }

    // `<` and `>` prefixes compare as strings, anything else must be equal.
    fn info_matches(&self, raw: &RawRule) -> bool {
        let filters = match &raw.filter_info {
            Some(v) => v,
            None => return true,
        };

        for (field, expected) in filters {
            let field = scalar_to_string(field);
            let expected = scalar_to_string(expected);
            let actual = match self.config.info.field(&field) {
                Some(v) => v,
                None => {
                    warn!("filter-info uses unknown field {}", field);
                    return false;
                }
            };

            let matched = if let Some(bound) = expected.strip_prefix('<') {
                actual < bound.trim()
            } else if let Some(bound) = expected.strip_prefix('>') {
                actual > bound.trim()
            } else {
                actual == expected
            };
            if !matched {
                return false;
            }
        }
        true
    }

    fn config_matches(&self, raw: &RawRule) -> bool {
        let filters = match &raw.filter_config {
            Some(v) => v,
            None => return true,
        };
        // Without a usable scope the rule is rejected by validation instead.
        let scope = match raw.scope.as_deref().map(Scope::from_str) {
            Some(Ok(v)) => v,
            _ => return true,
        };

        filters.iter().all(|(path, expected)| {
            let actual = self.config.get_configuration(scope, &scalar_to_string(path));
            actual.map(|node| node.to_string()) == Some(scalar_to_string(expected))
        })
    }

    /// Paths a rule is evaluated at. A vdom rule on a multi-VDOM device runs
    /// once per VDOM.
    fn targets(&self, rule: &CheckRule) -> Vec<(Scope, String)> {
        let segments: Vec<&str> = path_segments(&rule.path).collect();
        let relative = segments.join("/");

        match rule.scope {
            Scope::Global => vec![(Scope::Global, relative)],
            Scope::Vdom if !self.config.info.is_multi_vdom() => {
                if segments.first() == Some(&"system") {
                    vec![(Scope::Global, relative)]
                } else {
                    vec![(Scope::Vdom, format!("root/{}", relative))]
                }
            }
            Scope::Vdom => self
                .config
                .get_vdoms()
                .into_iter()
                .map(|vdom| (Scope::Vdom, format!("{}/{}", vdom, relative)))
                .collect(),
        }
    }

    fn run_rule(&self, rule: &CheckRule) -> Vec<String> {
        let mut messages = Vec::new();

        for (scope, path) in self.targets(rule) {
            let node = self.config.get_configuration(scope, &path);
            let shown = format!("/{}", path.trim_end_matches('/'));
            let details = match rule.kind {
                CheckKind::Count => check_count(node, rule, &shown),
                CheckKind::Exist => check_exist(node, rule),
                CheckKind::Value => check_value(node, rule),
                CheckKind::ValueInList => check_value_in_list(node, rule, &shown),
            };
            messages.extend(details.into_iter().map(|detail| format_message(rule, &shown, &detail)));
        }

        messages
    }
}

fn format_message(rule: &CheckRule, path: &str, detail: &str) -> String {
    let mut message = format!("[{}]: {}: {}", rule.kind, path, detail);
    if let Some(name) = &rule.name {
        message += &format!(" (check_name: {})", name);
    }
    message
}

/// Renders a bundle scalar the way configuration leaves are stored.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

// An empty `config ... end` block has no entries to match.
fn table_rows(node: &Node) -> Option<&[Node]> {
    match node {
        Node::Block(section) if section.is_empty() => Some(&[][..]),
        node => node.as_table(),
    }
}

/// Only a table is counted. An empty block is still a block and is skipped.
pub fn check_count(node: Option<&Node>, rule: &CheckRule, path: &str) -> Vec<String> {
    let rows = match node.and_then(Node::as_table) {
        Some(v) => v,
        None => {
            warn!("count check on {} which is not a list", path);
            return Vec::new();
        }
    };
    let actual = rows.len() as i64;

    let mut details = Vec::new();
    for (operator, expected) in &rule.checks {
        let expected = match expected.as_i64().or_else(|| scalar_to_string(expected).parse().ok()) {
            Some(v) => v,
            None => {
                warn!("count check on {} has a non integer value for {}", path, operator);
                continue;
            }
        };
        let passed = match operator.as_str() {
            "eq" => actual == expected,
            "gt" => actual > expected,
            "lt" => actual < expected,
            other => {
                warn!("count check on {} has unknown operator {}", path, other);
                continue;
            }
        };
        if !passed {
            details.push(format!("count is {}, expected {} {}", actual, operator, expected));
        }
    }
    details
}

pub fn check_exist(node: Option<&Node>, rule: &CheckRule) -> Vec<String> {
    let mut details = Vec::new();
    for (key, expected) in &rule.checks {
        let expected = match expected {
            Value::Bool(b) => *b,
            other => {
                warn!("exist check for {} expects a boolean, got {}", key, scalar_to_string(other));
                continue;
            }
        };
        let present = node.map(|n| n.contains_key(key)).unwrap_or(false);
        if present != expected {
            if expected {
                details.push(format!("{} is missing", key));
            } else {
                details.push(format!("{} should not be present", key));
            }
        }
    }
    details
}

pub fn check_value(node: Option<&Node>, rule: &CheckRule) -> Vec<String> {
    let mut details = Vec::new();
    for (key, expected) in &rule.checks {
        let expected = scalar_to_string(expected);
        match node.and_then(Node::as_block).and_then(|section| section.get(key)) {
            Some(actual) => {
                let actual = actual.to_string();
                if actual != expected {
                    details.push(format!("{} is '{}', expected '{}'", key, actual, expected));
                }
            }
            None if rule.ignore_missing => {}
            None => details.push(format!("{} is missing, expected '{}'", key, expected)),
        }
    }
    details
}

/// Passes when some row holds the value, or with `inverse` when none does.
pub fn check_value_in_list(node: Option<&Node>, rule: &CheckRule, path: &str) -> Vec<String> {
    let rows = match node {
        None => &[][..],
        Some(node) => match table_rows(node) {
            Some(v) => v,
            None => {
                warn!("value_in_list check on {} which is not a list", path);
                return Vec::new();
            }
        },
    };

    let mut details = Vec::new();
    for (key, expected) in &rule.checks {
        let expected = scalar_to_string(expected);
        let found = rows
            .iter()
            .any(|row| row.get(key).map(|v| v.to_string() == expected).unwrap_or(false));
        let success = if rule.inverse { !found } else { found };
        if !success {
            if rule.inverse {
                details.push(format!("an entry with {} '{}' is present", key, expected));
            } else {
                details.push(format!("no entry with {} '{}'", key, expected));
            }
        }
    }
    details
}
