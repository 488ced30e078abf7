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
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Keys of a block in the order they appeared in the backup.
pub type Section = IndexMap<String, Node>;

/// One value of the configuration tree.
///
/// Serialized untagged so a saved tree is plain JSON: strings for `set`
/// values, integers for table row ids, objects for blocks and arrays for
/// tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(String),
    Id(u64),
    Block(Section),
    // Every row is a `Block` carrying an `id`.
    Table(Vec<Node>),
}

impl Node {
    pub fn empty() -> Self {
        Node::Block(Section::new())
    }

    pub fn as_block(&self) -> Option<&Section> {
        match self {
            Node::Block(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Section> {
        match self {
            Node::Block(section) => Some(section),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&[Node]> {
        match self {
            Node::Table(rows) => Some(rows),
            _ => None,
        }
    }

    /// Child of a block by key, or row of a table by its id.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Block(section) => section.get(key),
            Node::Table(rows) => {
                let id = numeric_id(key)?;
                rows.iter().find(|row| row.get("id") == Some(&Node::Id(id)))
            }
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.as_block().map(|s| s.contains_key(key)).unwrap_or(false)
    }

    /// Walks a slash separated path. Empty segments are ignored, so
    /// `/system/global/`, `system//global` and `system/global` are the same.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        path_segments(path).try_fold(self, |node, segment| node.get(segment))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Leaf(value) => write!(f, "{}", value),
            Node::Id(id) => write!(f, "{}", id),
            _ => {
                let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{}", rendered)
            }
        }
    }
}

pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

pub fn numeric_id(key: &str) -> Option<u64> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse::<u64>().ok()
    } else {
        None
    }
}

/// Result of closing a `config` block with `end`.
///
/// A non-empty block whose keys are all numeric becomes a table ordered by
/// id, each row gaining an `id` field. Anything else stays a block.
pub fn close_config_block(section: Section) -> Node {
    if section.is_empty() {
        return Node::Block(section);
    }
    let ids: Option<Vec<u64>> = section.keys().map(|key| numeric_id(key)).collect();
    let ids = match ids {
        Some(v) => v,
        None => return Node::Block(section),
    };

    let mut rows: Vec<(u64, Section)> = ids
        .into_iter()
        .zip(section.into_values())
        .map(|(id, value)| {
            let row = match value {
                Node::Block(fields) => fields,
                other => {
                    let mut fields = Section::new();
                    fields.insert("value".to_string(), other);
                    fields
                }
            };
            (id, row)
        })
        .collect();
    rows.sort_by_key(|(id, _)| *id);

    Node::Table(
        rows.into_iter()
            .map(|(id, mut row)| {
                row.shift_remove("id");
                row.insert("id".to_string(), Node::Id(id));
                Node::Block(row)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: &str) -> Node {
        Node::Leaf(value.to_string())
    }

    fn block(pairs: Vec<(&str, Node)>) -> Section {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_numeric_block_becomes_table() {
        let section = block(vec![
            ("2", Node::Block(block(vec![("a", leaf("y"))]))),
            ("1", Node::Block(block(vec![("a", leaf("x"))]))),
        ]);

        let expected = Node::Table(vec![
            Node::Block(block(vec![("a", leaf("x")), ("id", Node::Id(1))])),
            Node::Block(block(vec![("a", leaf("y")), ("id", Node::Id(2))])),
        ]);
        assert_eq!(close_config_block(section), expected);
    }

    #[test]
    fn test_named_and_empty_blocks_stay_blocks() {
        let named = block(vec![("foo", Node::Block(block(vec![("a", leaf("x"))])))]);
        assert_eq!(close_config_block(named.clone()), Node::Block(named));

        let mixed = block(vec![("1", Node::empty()), ("port1", Node::empty())]);
        assert_eq!(close_config_block(mixed.clone()), Node::Block(mixed));

        assert_eq!(close_config_block(Section::new()), Node::empty());
    }

    #[test]
    fn test_numeric_leaf_becomes_value_row() {
        let section = block(vec![("7", leaf("x"))]);
        let expected = Node::Table(vec![Node::Block(block(vec![("value", leaf("x")), ("id", Node::Id(7))]))]);
        assert_eq!(close_config_block(section), expected);
    }

    #[test]
    fn test_numeric_id() {
        assert_eq!(numeric_id("42"), Some(42));
        assert_eq!(numeric_id(""), None);
        assert_eq!(numeric_id("-1"), None);
        assert_eq!(numeric_id("1a"), None);
    }

    #[test]
    fn test_lookup_ignores_empty_segments() {
        let tree = Node::Block(block(vec![(
            "system",
            Node::Block(block(vec![("global", Node::Block(block(vec![("hostname", leaf("FGT1"))])))])),
        )]));

        let expected = Some(&Node::Leaf("FGT1".to_string()));
        assert_eq!(tree.lookup("/system/global/hostname"), expected);
        assert_eq!(tree.lookup("system/global/hostname"), expected);
        assert_eq!(tree.lookup("//system//global/hostname/"), expected);
        assert_eq!(tree.lookup("/system/nope/hostname"), None);
        assert_eq!(tree.lookup("/system/global/hostname/deeper"), None);
        assert_eq!(tree.lookup(""), Some(&tree));
    }

    #[test]
    fn test_lookup_table_row_by_id() {
        let table = close_config_block(block(vec![
            ("1", Node::Block(block(vec![("name", leaf("allow"))]))),
            ("3", Node::Block(block(vec![("name", leaf("deny"))]))),
        ]));
        let tree = Node::Block(block(vec![("policy", table)]));

        assert_eq!(tree.lookup("policy/3/name"), Some(&leaf("deny")));
        assert_eq!(tree.lookup("policy/2/name"), None);
        assert_eq!(tree.lookup("policy/name"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(leaf("enable").to_string(), "enable");
        assert_eq!(Node::Id(5).to_string(), "5");
        assert_eq!(Node::Block(block(vec![("a", leaf("b"))])).to_string(), "{\"a\":\"b\"}");
    }
}
