use interfaces::{Config, SourceType};
use tracing::debug;

use crate::codec::m3u::{self, Playlist};
use crate::filter::Filter;
use crate::traits::Sourcer;
use crate::types::{Result, SourceSnapshot};

const FIELD: &str = "media_playlist";

async fn playlist_source<S>(name: &str, sourcer: &S) -> Result<Option<(SourceSnapshot, Playlist)>>
where
    S: Sourcer + ?Sized,
{
    let source = sourcer.get_source(name).await.map_err(|e| e.in_rule(FIELD))?;
    if source.source_type != SourceType::M3u {
        debug!("Skipping playlist rule on non-playlist source {}", source.name);
        return Ok(None);
    }
    let playlist = m3u::parse(source.data()).map_err(|e| e.in_rule(FIELD))?;
    Ok(Some((source, playlist)))
}

/// Header tags and version come from the fallback source; tracks and
/// variant streams come from each filter rule in order, matched by name.
pub async fn mix_playlist<S>(config: &Config, sourcer: &S) -> Result<Playlist>
where
    S: Sourcer + ?Sized,
{
    let opt = &config.m3u;
    let mut merged = Playlist::default();
    if opt.disable {
        return Ok(merged);
    }

    let fallback = &opt.media_playlist_fallback;
    if !fallback.disabled && !fallback.source_name.is_empty() {
        if let Some((_, playlist)) = playlist_source(&fallback.source_name, sourcer).await? {
            merged.tags = playlist.tags;
            merged.version = playlist.version;
        }
    }

    for rule in &opt.media_playlist_filters {
        if rule.mix.disabled {
            continue;
        }
        let name = rule.mix.resolve_source_name(&fallback.source_name);
        if name.is_empty() {
            continue;
        }
        let Some((source, playlist)) = playlist_source(name, sourcer).await? else {
            continue;
        };

        let filter = Filter::from_rule(rule);
        let before = merged.tracks.len() + merged.variant_streams.len();
        merged
            .tracks
            .extend(playlist.tracks.into_iter().filter(|t| filter.test(&t.name)));
        merged
            .variant_streams
            .extend(playlist.variant_streams.into_iter().filter(|s| filter.test(&s.name)));
        debug!(
            "Playlist rule on {} kept {} entries",
            source.name,
            merged.tracks.len() + merged.variant_streams.len() - before
        );
    }

    Ok(merged)
}
