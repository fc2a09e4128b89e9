use serde::{Deserialize, Serialize};

/// Refresh interval value that disables scheduled expiry for a source.
pub const NEVER_EXPIRE: i64 = -1;

/// Interval applied when a source leaves `interval` unset (or zero).
pub const DEFAULT_INTERVAL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Single site-directory repository (JSON).
    TvboxSingle,
    /// Multi-repository index (JSON).
    TvboxMulti,
    /// XMLTV programme guide.
    Epg,
    /// M3U playlist.
    M3u,
}

impl SourceType {
    pub fn is_site_directory(self) -> bool {
        matches!(self, SourceType::TvboxSingle | SourceType::TvboxMulti)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceType::TvboxSingle => "tvbox_single",
            SourceType::TvboxMulti => "tvbox_multi",
            SourceType::Epg => "epg",
            SourceType::M3u => "m3u",
        };
        f.write_str(name)
    }
}

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    /// `http(s)://` URL or `file://` path.
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    /// Seconds between refreshes, `-1` never expires.
    #[serde(default)]
    pub interval: i64,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, source_type: SourceType, interval: i64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            source_type,
            interval,
        }
    }

    /// `None` when the source never expires.
    pub fn refresh_interval(&self) -> Option<std::time::Duration> {
        if self.interval == NEVER_EXPIRE {
            return None;
        }
        let secs = if self.interval <= 0 { DEFAULT_INTERVAL_SECS } else { self.interval };
        Some(std::time::Duration::from_secs(secs as u64))
    }
}

/// Selects one scalar field out of a named source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixOpt {
    pub source_name: String,
    /// Dot-separated path; filled in by [`crate::config::Config::fixture`] for known outputs.
    pub field: String,
    pub disabled: bool,
}

impl MixOpt {
    pub fn new(source_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            field: field.into(),
            disabled: false,
        }
    }

    /// The rule's own source name, or `fallback` when left blank.
    pub fn resolve_source_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.source_name.is_empty() { fallback } else { &self.source_name }
    }
}

/// Selects an array out of a named source and filters its elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayMixOpt {
    #[serde(flatten)]
    pub mix: MixOpt,
    /// Path inside each element holding the value matched against the patterns.
    pub filter_by: String,
    /// Regex patterns, matched case-insensitively; prefix `(?-i)` for exact case.
    pub include: String,
    pub exclude: String,
}

impl ArrayMixOpt {
    pub fn new(source_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            mix: MixOpt::new(source_name, field),
            ..Default::default()
        }
    }

    pub fn filter_by(mut self, filter_by: impl Into<String>) -> Self {
        self.filter_by = filter_by.into();
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include = pattern.into();
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude = pattern.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteRepoOpt {
    pub disable: bool,
    pub spider: MixOpt,
    pub wallpaper: MixOpt,
    pub logo: MixOpt,
    pub sites: Vec<ArrayMixOpt>,
    pub doh: Vec<ArrayMixOpt>,
    pub lives: Vec<ArrayMixOpt>,
    pub parses: Vec<ArrayMixOpt>,
    pub flags: Vec<ArrayMixOpt>,
    pub rules: Vec<ArrayMixOpt>,
    pub ads: Vec<ArrayMixOpt>,
    /// Source used by any rule above that leaves `source_name` blank.
    pub fallback: MixOpt,
}

impl SiteRepoOpt {
    pub fn fallback_source(&self) -> &str {
        &self.fallback.source_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiRepoOpt {
    pub disable: bool,
    /// Prepend an entry pointing at this proxy's own merged repository.
    pub include_single_repo: bool,
    pub repos: Vec<ArrayMixOpt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpgFilterType {
    ChannelId,
    ProgramTitle,
}

impl EpgFilterType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "channel_id" => Some(EpgFilterType::ChannelId),
            "program_title" => Some(EpgFilterType::ProgramTitle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpgOpt {
    pub disable: bool,
    /// `filter_by` is either `channel_id` or `program_title`.
    pub filters: Vec<ArrayMixOpt>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistOpt {
    pub disable: bool,
    pub media_playlist_fallback: MixOpt,
    pub media_playlist_filters: Vec<ArrayMixOpt>,
}
