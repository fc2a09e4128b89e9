//! Site-directory JSON documents (single repository and multi-repository index).

use bytes::Bytes;
use regex::bytes::Regex;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

use crate::types::Result;

static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*//.*$|/\*[\s\S]*?\*/").expect("comment pattern is valid"));

/// Drop whole-line `//` comments and `/* */` blocks that hand-edited repositories carry.
pub fn strip_comments(data: &[u8]) -> Bytes {
    Bytes::from(COMMENTS.replace_all(data, &b""[..]).into_owned())
}

/// Integer that also accepts numeric strings, as repositories mix both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlexInt(pub i64);

impl FlexInt {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Serialize for FlexInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for FlexInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FlexIntVisitor;

        impl Visitor<'_> for FlexIntVisitor {
            type Value = FlexInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an integer or a string holding one")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<FlexInt, E> {
                Ok(FlexInt(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<FlexInt, E> {
                i64::try_from(v).map(FlexInt).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<FlexInt, E> {
                Ok(FlexInt(v as i64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<FlexInt, E> {
                v.trim()
                    .parse()
                    .map(FlexInt)
                    .map_err(|e| E::custom(format!("FlexInt: {e}")))
            }
        }

        deserializer.deserialize_any(FlexIntVisitor)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteRepo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spider: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lives: Vec<Live>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wallpaper: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sites: Vec<Site>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parses: Vec<Parse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub doh: Vec<Doh>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ads: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logo: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Site {
    pub key: String,
    pub name: String,
    #[serde(rename = "type")]
    pub site_type: FlexInt,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api: String,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub searchable: FlexInt,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub quick_search: FlexInt,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub filterable: FlexInt,
    /// Free-form; only a string value is treated as a reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub jar: String,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub player_type: FlexInt,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub changeable: FlexInt,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub timeout: FlexInt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Doh {
    pub name: String,
    pub url: String,
    pub ips: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Live {
    pub name: String,
    #[serde(rename = "type")]
    pub live_type: FlexInt,
    pub url: String,
    pub player_type: FlexInt,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ua: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub epg: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logo: String,
    #[serde(skip_serializing_if = "FlexInt::is_zero")]
    pub timeout: FlexInt,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parse {
    pub name: String,
    #[serde(rename = "type")]
    pub parse_type: FlexInt,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub name: String,
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regex: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub script: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiRepo {
    #[serde(rename = "urls", default)]
    pub repos: Vec<RepoUrl>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoUrl {
    pub url: String,
    pub name: String,
}

pub fn parse_repo(data: &[u8]) -> Result<SiteRepo> {
    Ok(serde_json::from_slice(data)?)
}
