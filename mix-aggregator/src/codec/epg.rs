//! XMLTV programme guide.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::types::{MixError, Result};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "tv")]
pub struct Guide {
    #[serde(rename = "channel", default)]
    pub channels: Vec<Channel>,
    #[serde(rename = "programme", default)]
    pub programmes: Vec<Programme>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "display-name", default, skip_serializing_if = "Vec::is_empty")]
    pub display_names: Vec<Text>,
    #[serde(rename = "url", default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(rename = "icon", default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Programme {
    #[serde(rename = "@channel")]
    pub channel: String,
    #[serde(rename = "@start", default)]
    pub start: String,
    #[serde(rename = "@stop", default, skip_serializing_if = "String::is_empty")]
    pub stop: String,
    #[serde(rename = "title", default, skip_serializing_if = "Vec::is_empty")]
    pub titles: Vec<Text>,
    #[serde(rename = "sub-title", default, skip_serializing_if = "Vec::is_empty")]
    pub sub_titles: Vec<Text>,
    #[serde(rename = "desc", default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<Text>,
    #[serde(rename = "date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "category", default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Text>,
    #[serde(rename = "icon", default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    #[serde(rename = "episode-num", default, skip_serializing_if = "Vec::is_empty")]
    pub episode_nums: Vec<EpisodeNum>,
    #[serde(rename = "previously-shown", default, skip_serializing_if = "Option::is_none")]
    pub previously_shown: Option<PreviouslyShown>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premiere: Option<Text>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtitles: Vec<Subtitles>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rating: Vec<Rating>,
    #[serde(rename = "star-rating", default, skip_serializing_if = "Vec::is_empty")]
    pub star_rating: Vec<Rating>,
}

impl Programme {
    /// First title, which is what filters match against.
    pub fn title(&self) -> &str {
        self.titles.first().map(|t| t.text.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Text {
    #[serde(rename = "@lang", default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(rename = "$text", default)]
    pub text: String,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            lang: None,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    #[serde(rename = "@src", default)]
    pub src: String,
    #[serde(rename = "@width", default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(rename = "@height", default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeNum {
    #[serde(rename = "@system", default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(rename = "$text", default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviouslyShown {
    #[serde(rename = "@start", default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(rename = "@channel", default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subtitles {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(rename = "@system", default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub value: String,
}

pub fn parse(data: &[u8]) -> Result<Guide> {
    quick_xml::de::from_reader(data).map_err(|e| MixError::Parse(format!("guide: {e}")))
}

pub fn to_xml(guide: &Guide) -> Result<String> {
    let body = quick_xml::se::to_string(guide).map_err(|e| MixError::Parse(format!("guide: {e}")))?;
    Ok(format!("{XML_HEADER}{body}\n"))
}

/// Serialized guide, gzip-compressed.
pub fn to_gzip(guide: &Guide) -> Result<Vec<u8>> {
    let xml = to_xml(guide)?;
    let mut encoder = GzEncoder::new(Vec::with_capacity(xml.len() / 4), Compression::default());
    encoder.write_all(xml.as_bytes())?;
    Ok(encoder.finish()?)
}
