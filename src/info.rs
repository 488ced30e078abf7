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
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const HOSTNAME_UNKNOWN: &str = "HOSTNAME UNKNOWN";

/// Metadata taken from the `#` header lines of a FortiGate backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigInfo {
    pub model: String,
    pub os_version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub opmode: String,
    pub vdom: String,
    pub user: String,
    pub buildno: String,
    pub conf_file_ver: String,
    pub global_vdom: String,
    pub hostname: String,
}

impl ConfigInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when `key` is not a known field.
    pub fn set_field(&mut self, key: &str, value: &str) -> bool {
        let value = value.to_string();
        match key {
            "model" => self.model = value,
            "os_version" => self.os_version = value,
            "type" => self.kind = value,
            "opmode" => self.opmode = value,
            "vdom" => self.vdom = value,
            "user" => self.user = value,
            "buildno" => self.buildno = value,
            "conf_file_ver" => self.conf_file_ver = value,
            "global_vdom" => self.global_vdom = value,
            "hostname" => self.hostname = value,
            _ => return false,
        }
        true
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields()
            .into_iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> [(&'static str, &str); 10] {
        [
            ("model", self.model.as_str()),
            ("os_version", self.os_version.as_str()),
            ("type", self.kind.as_str()),
            ("opmode", self.opmode.as_str()),
            ("vdom", self.vdom.as_str()),
            ("user", self.user.as_str()),
            ("buildno", self.buildno.as_str()),
            ("conf_file_ver", self.conf_file_ver.as_str()),
            ("global_vdom", self.global_vdom.as_str()),
            ("hostname", self.hostname.as_str()),
        ]
    }

    pub fn is_multi_vdom(&self) -> bool {
        self.vdom == "1"
    }

    /// Reads one header comment line and returns how many fields it set.
    ///
    /// `#config-version=FGT60E-6.4.5-FW-build1828-210217:opmode=0:vdom=0:user=admin`
    /// fills model, os_version and type from the dash separated head, then every
    /// further colon separated `key=value` pair. Any other comment holding exactly
    /// one `=` is a single `key=value` pair.
    pub fn parse_comment(&mut self, line: &str) -> usize {
        let comment = line.trim().trim_start_matches('#').trim();
        let mut count = 0;

        if comment.starts_with("config-version") {
            let value = comment.split_once('=').map(|(_, v)| v).unwrap_or("");
            let head = value.split(':').next().unwrap_or("");
            let parts: Vec<&str> = head.split('-').collect();
            for (key, part) in ["model", "os_version", "type"].iter().zip(parts.iter()) {
                if self.set_field(key, part.trim()) {
                    count += 1;
                }
            }
            for segment in comment.split(':').skip(1) {
                if let Some((key, value)) = segment.split_once('=') {
                    count += self.set_known(key.trim(), value.trim());
                }
            }
        } else if comment.matches('=').count() == 1 {
            if let Some((key, value)) = comment.split_once('=') {
                count += self.set_known(key.trim(), value.trim());
            }
        }

        count
    }

    fn set_known(&mut self, key: &str, value: &str) -> usize {
        if self.set_field(key, value) {
            1
        } else {
            debug!("Ignoring unknown header field {}={}", key, value);
            0
        }
    }
}

impl fmt::Display for ConfigInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut output_string = String::new();
        for (name, value) in self.fields() {
            output_string += &format!("{:<14}{}\n", name, value);
        }

        write!(f, "{}", output_string.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_version_comment() {
        let mut info = ConfigInfo::new();
        let count = info.parse_comment("#config-version=FGT999-9.9.9-FW-build9999-210217:opmode=1:vdom=2:user=pi");

        assert_eq!(count, 6);
        assert_eq!(info.model, "FGT999");
        assert_eq!(info.os_version, "9.9.9");
        assert_eq!(info.kind, "FW");
        assert_eq!(info.opmode, "1");
        assert_eq!(info.vdom, "2");
        assert_eq!(info.user, "pi");
        assert_eq!(info.buildno, "");
    }

    #[test]
    fn test_single_pair_comment() {
        let mut info = ConfigInfo::new();
        assert_eq!(info.parse_comment("#buildno=8303"), 1);
        assert_eq!(info.buildno, "8303");

        assert_eq!(info.parse_comment("#global_vdom=1"), 1);
        assert_eq!(info.global_vdom, "1");
    }

    #[test]
    fn test_comment_without_fields() {
        let mut info = ConfigInfo::new();
        assert_eq!(info.parse_comment("#"), 0);
        assert_eq!(info.parse_comment("# just a remark"), 0);
        assert_eq!(info.parse_comment("#a=b=c"), 0);
        assert_eq!(info.parse_comment("#private-encryption-key=x"), 0);
        assert_eq!(info, ConfigInfo::new());
    }

    #[test]
    fn test_field_lookup() {
        let mut info = ConfigInfo::new();
        info.set_field("type", "FW");
        info.set_field("vdom", "1");

        assert_eq!(info.field("type"), Some("FW"));
        assert_eq!(info.field("nope"), None);
        assert_eq!(info.is_multi_vdom(), true);
        assert_eq!(info.set_field("nope", "x"), false);
    }
}
