use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use interfaces::{ArrayMixOpt, Config, MixOpt, SourceType};
use mix_aggregator::codec::{epg, m3u, site::Site};
use mix_aggregator::mixer::{self, mix_array, mix_scalar};
use mix_aggregator::{MixError, Result, SourceSnapshot, Sourcer};
use std::collections::HashMap;
use std::sync::Once;
use tracing::info;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Fixed documents keyed by source name.
#[derive(Default)]
struct StaticSources {
    sources: HashMap<String, SourceSnapshot>,
}

impl StaticSources {
    fn with(mut self, name: &str, url: &str, source_type: SourceType, data: &str) -> Self {
        self.sources.insert(
            name.to_string(),
            SourceSnapshot {
                name: name.to_string(),
                url: url.to_string(),
                source_type,
                data: Bytes::from(data.to_string()),
                updated_at: Utc::now(),
            },
        );
        self
    }
}

#[async_trait]
impl Sourcer for StaticSources {
    async fn get_source(&self, name: &str) -> Result<SourceSnapshot> {
        self.sources.get(name).cloned().ok_or_else(|| MixError::SourceNotFound {
            name: name.to_string(),
        })
    }
}

const REPO_A: &str = r#"{
  "spider": "./jar/spider.jar",
  "wallpaper": "http://img.test/bg.png",
  "sites": [
    {"key": "apple", "name": "Apple", "type": 3, "api": "./api/apple.js", "ext": "./ext/apple.json"},
    {"key": "ax", "name": "Ax", "type": "1", "api": "csp_Ax"},
    {"key": "banana", "name": "Banana", "type": 0, "api": "http://b.test/api"}
  ],
  "lives": [{"name": "Local", "type": 0, "url": "./live.txt"}],
  "flags": ["youku", "qq", "iqiyi"],
  "rules": [{"name": "ads", "hosts": ["a.test"], "regex": ["\\.ad\\."]}]
}"#;

const REPO_B: &str = r#"{
  "sites": [{"key": "cherry", "name": "Cherry", "type": 1, "api": "./cherry.js"}],
  "parses": [{"name": "Default", "type": 0, "url": "./parse?url="}],
  "doh": [{"name": "Cloudflare", "url": "https://1.1.1.1/dns-query", "ips": ["1.1.1.1"]}],
  "ads": ["ads.test"]
}"#;

fn site_sources() -> StaticSources {
    StaticSources::default()
        .with("a", "http://h/dir/a.json", SourceType::TvboxSingle, REPO_A)
        .with("b", "https://cdn.test/repos/b.json", SourceType::TvboxSingle, REPO_B)
        .with(
            "multi",
            "http://h/multi/index.json",
            SourceType::TvboxMulti,
            r#"{"urls": [{"name": "Main", "url": "./main.json"}, {"name": "Test", "url": "http://t/x.json"}]}"#,
        )
}

#[tokio::test]
async fn test_mix_scalar_missing_path_is_empty() -> Result<()> {
    init_tracing();
    let sources = site_sources();

    let (value, source) = mix_scalar(&MixOpt::new("a", "no.such.field"), "", &sources).await?;
    assert_eq!(value, "");
    assert_eq!(source.name, "a");

    let (value, _) = mix_scalar(&MixOpt::new("", "wallpaper"), "a", &sources).await?;
    assert_eq!(value, "http://img.test/bg.png");
    Ok(())
}

#[tokio::test]
async fn test_mix_scalar_wraps_source_errors_with_field() {
    init_tracing();
    let sources = site_sources();

    let err = mix_scalar(&MixOpt::new("nope", "spider"), "", &sources).await.unwrap_err();
    assert!(matches!(&err, MixError::Rule { field, .. } if field == "spider"));
    assert!(matches!(err.root(), MixError::SourceNotFound { .. }));
}

#[tokio::test]
async fn test_mix_array_include_exclude() -> Result<()> {
    init_tracing();
    let sources = site_sources();
    let rule = ArrayMixOpt::new("a", "sites").filter_by("name").include("^A").exclude("X");

    let (sites, _) = mix_array::<Site, _>(&rule, "", &sources).await?;
    let names: Vec<_> = sites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Apple"]);
    Ok(())
}

#[tokio::test]
async fn test_mix_array_decode_failure_fails_rule() {
    init_tracing();
    let sources = StaticSources::default().with(
        "bad",
        "http://h/bad.json",
        SourceType::TvboxSingle,
        r#"{"sites": [{"key": "ok", "name": "Ok"}, {"key": "broken", "name": "Broken", "type": "three"}]}"#,
    );
    let rule = ArrayMixOpt::new("bad", "sites");

    let err = mix_array::<Site, _>(&rule, "", &sources).await.unwrap_err();
    assert!(matches!(err.root(), MixError::Merge(_)), "unexpected error: {err}");
}

fn site_config() -> Config {
    let mut config = Config::default();
    let opt = &mut config.tvbox_single_repo_opt;
    opt.fallback = MixOpt::new("a", "");
    opt.sites = vec![
        ArrayMixOpt::new("", "").exclude("^Banana$"),
        ArrayMixOpt::new("b", ""),
        ArrayMixOpt {
            mix: MixOpt {
                disabled: true,
                ..MixOpt::new("nope", "")
            },
            ..Default::default()
        },
    ];
    opt.lives = vec![ArrayMixOpt::new("", "")];
    opt.parses = vec![ArrayMixOpt::new("b", "")];
    opt.doh = vec![ArrayMixOpt::new("b", "")];
    opt.flags = vec![ArrayMixOpt::new("", "").exclude("qq")];
    opt.rules = vec![ArrayMixOpt::new("", "")];
    opt.ads = vec![ArrayMixOpt::new("b", "")];
    config.tvbox_multi_repo_opt.include_single_repo = true;
    config.tvbox_multi_repo_opt.repos = vec![ArrayMixOpt::new("multi", "").exclude("^Test$")];
    config.external_url = "http://proxy.lan:8080/".to_string();
    config.fixture();
    config
}

#[tokio::test]
async fn test_mix_site_repo() -> Result<()> {
    init_tracing();
    let sources = site_sources();
    let config = site_config();

    let repo = mixer::mix_site_repo(&config, &sources).await?;

    assert_eq!(repo.spider, "http://h/dir/jar/spider.jar");
    assert_eq!(repo.wallpaper, "http://img.test/bg.png");
    assert_eq!(repo.logo, "");

    let keys: Vec<_> = repo.sites.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["apple", "ax", "cherry"]);
    assert_eq!(repo.sites[0].api, "http://h/dir/api/apple.js");
    assert_eq!(repo.sites[0].ext, Some(serde_json::json!("http://h/dir/ext/apple.json")));
    assert_eq!(repo.sites[1].api, "csp_Ax");
    assert_eq!(repo.sites[2].api, "https://cdn.test/repos/cherry.js");

    assert_eq!(repo.lives[0].url, "http://h/dir/live.txt");
    assert_eq!(repo.parses[0].url, "https://cdn.test/repos/parse?url=");
    assert_eq!(repo.doh[0].ips, vec!["1.1.1.1".to_string()]);
    assert_eq!(repo.flags, vec!["youku".to_string(), "iqiyi".to_string()]);
    assert_eq!(repo.rules[0].hosts, vec!["a.test".to_string()]);
    assert_eq!(repo.ads, vec!["ads.test".to_string()]);

    let json = serde_json::to_value(&repo)?;
    assert!(json.get("logo").is_none());
    info!("Merged repo: {}", json);
    Ok(())
}

#[tokio::test]
async fn test_mix_site_repo_propagates_missing_source() {
    init_tracing();
    let sources = site_sources();
    let mut config = site_config();
    config.tvbox_single_repo_opt.sites.push(ArrayMixOpt::new("gone", "sites"));

    let err = mixer::mix_site_repo(&config, &sources).await.unwrap_err();
    assert_eq!(err.to_string(), "mixing sites: source not found: gone");
}

#[tokio::test]
async fn test_mix_multi_repo_includes_self() -> Result<()> {
    init_tracing();
    let sources = site_sources();
    let config = site_config();

    let multi = mixer::mix_multi_repo(&config, &sources).await?;
    assert_eq!(multi.repos.len(), 2);
    assert_eq!(multi.repos[0].name, "MixProxy");
    assert_eq!(multi.repos[0].url, "http://proxy.lan:8080/v1/tvbox/repo");
    assert_eq!(multi.repos[1].name, "Main");
    assert_eq!(multi.repos[1].url, "http://h/multi/main.json");

    let json = serde_json::to_string(&multi)?;
    assert!(json.starts_with(r#"{"urls":["#));
    Ok(())
}

fn guide_xml(channels: &[(&str, &str)], programmes: &[(&str, &str)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<tv>\n");
    for (id, name) in channels {
        xml.push_str(&format!("<channel id=\"{id}\"><display-name>{name}</display-name></channel>\n"));
    }
    for (channel, title) in programmes {
        xml.push_str(&format!(
            "<programme channel=\"{channel}\" start=\"20240101000000 +0000\" stop=\"20240101010000 +0000\"><title>{title}</title></programme>\n"
        ));
    }
    xml.push_str("</tv>\n");
    xml
}

fn guide_sources() -> StaticSources {
    StaticSources::default()
        .with(
            "g1",
            "http://epg.test/1.xml",
            SourceType::Epg,
            &guide_xml(&[("c1", "One"), ("c2", "Two")], &[("c1", "News"), ("c2", "Movie")]),
        )
        .with(
            "g2",
            "http://epg.test/2.xml",
            SourceType::Epg,
            &guide_xml(&[("c1", "One (HD)"), ("c3", "Three")], &[("c1", "Sports"), ("c3", "Movie Night")]),
        )
        .with("repo", "http://h/a.json", SourceType::TvboxSingle, REPO_A)
}

#[tokio::test]
async fn test_mix_epg_by_channel_id() -> Result<()> {
    init_tracing();
    let sources = guide_sources();
    let mut config = Config::default();
    config.epg.filters = vec![
        ArrayMixOpt::new("g1", "").filter_by("channel_id").include("^c1$"),
        ArrayMixOpt::new("g2", "").filter_by("channel_id").include("^c1$"),
        ArrayMixOpt::new("repo", "").filter_by("channel_id"),
    ];

    let guide = mixer::mix_epg(&config, &sources).await?;
    assert_eq!(guide.channels.len(), 1);
    assert_eq!(guide.channels[0].id, "c1");
    assert_eq!(guide.channels[0].display_names[0].text, "One (HD)");

    let titles: Vec<_> = guide.programmes.iter().map(|p| p.title()).collect();
    assert_eq!(titles, vec!["News", "Sports"]);
    assert!(guide.programmes.iter().all(|p| p.channel == "c1"));
    Ok(())
}

#[tokio::test]
async fn test_mix_epg_by_programme_title() -> Result<()> {
    init_tracing();
    let sources = guide_sources();
    let mut config = Config::default();
    config.epg.filters = vec![
        ArrayMixOpt::new("g1", "").filter_by("program_title").include("movie"),
        ArrayMixOpt::new("g2", "").filter_by("program_title").include("movie"),
    ];

    let guide = mixer::mix_epg(&config, &sources).await?;
    let ids: Vec<_> = guide.channels.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c2", "c3"]);
    assert_eq!(guide.programmes.len(), 2);

    let xml = epg::to_xml(&guide)?;
    assert_eq!(epg::parse(xml.as_bytes())?, guide);
    Ok(())
}

#[tokio::test]
async fn test_mix_epg_disabled_is_empty() -> Result<()> {
    init_tracing();
    let mut config = Config::default();
    config.epg.disable = true;
    config.epg.filters = vec![ArrayMixOpt::new("missing", "").filter_by("channel_id")];

    let guide = mixer::mix_epg(&config, &StaticSources::default()).await?;
    assert!(guide.channels.is_empty() && guide.programmes.is_empty());
    Ok(())
}

const HEADER_PLAYLIST: &str = "#EXTM3U x-tvg-url=\"http://epg.test/1.xml\"\n#EXT-X-VERSION:3\n";
const PLAYLIST_1: &str = "#EXTM3U\n#EXTINF:-1 tvg-id=\"c1\",CCTV-1\nhttp://live.test/1.m3u8\n#EXTINF:-1,Shopping\nhttp://live.test/s.m3u8\n";
const PLAYLIST_2: &str = "#EXTM3U\n#EXTINF:-1,CCTV-5\nhttp://live.test/5.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=800000,NAME=\"Radio\"\nhttp://live.test/radio.m3u8\n";

fn playlist_sources() -> StaticSources {
    StaticSources::default()
        .with("header", "http://live.test/header.m3u", SourceType::M3u, HEADER_PLAYLIST)
        .with("p1", "http://live.test/1.m3u", SourceType::M3u, PLAYLIST_1)
        .with("p2", "http://live.test/2.m3u", SourceType::M3u, PLAYLIST_2)
        .with("guide", "http://epg.test/1.xml", SourceType::Epg, "<tv/>")
}

#[tokio::test]
async fn test_mix_playlist_fallback_header_without_tracks() -> Result<()> {
    init_tracing();
    let sources = playlist_sources();
    let mut config = Config::default();
    config.m3u.media_playlist_fallback = MixOpt::new("header", "");
    config.m3u.media_playlist_filters = vec![ArrayMixOpt::new("p1", "").include("^nothing$")];

    let playlist = mixer::mix_playlist(&config, &sources).await?;
    assert!(playlist.tracks.is_empty());
    assert_eq!(playlist.version, 3);
    assert_eq!(playlist.tags, vec![m3u::Tag::new("X-TVG-URL", "http://epg.test/1.xml")]);
    Ok(())
}

#[tokio::test]
async fn test_mix_playlist_rule_order() -> Result<()> {
    init_tracing();
    let sources = playlist_sources();
    let mut config = Config::default();
    config.m3u.media_playlist_fallback = MixOpt::new("header", "");
    config.m3u.media_playlist_filters = vec![
        ArrayMixOpt::new("p2", "").include("^CCTV"),
        ArrayMixOpt::new("guide", ""),
        ArrayMixOpt::new("p1", "").include("^CCTV"),
    ];

    let playlist = mixer::mix_playlist(&config, &sources).await?;
    let names: Vec<_> = playlist.tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["CCTV-5", "CCTV-1"]);
    assert!(playlist.variant_streams.is_empty());

    let text = playlist.to_string();
    assert!(text.starts_with("#EXTM3U X-TVG-URL=\"http://epg.test/1.xml\"\n#EXT-X-VERSION:3\n"));
    assert_eq!(m3u::parse(text.as_bytes())?, playlist);
    Ok(())
}

#[tokio::test]
async fn test_mix_playlist_keeps_matching_variant_streams() -> Result<()> {
    init_tracing();
    let sources = playlist_sources();
    let mut config = Config::default();
    config.m3u.media_playlist_filters = vec![
        ArrayMixOpt::new("p2", "").include("radio|cctv"),
        ArrayMixOpt::new("p1", "").exclude("shopping"),
    ];

    let playlist = mixer::mix_playlist(&config, &sources).await?;
    let names: Vec<_> = playlist.tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["CCTV-5", "CCTV-1"]);
    assert_eq!(playlist.variant_streams.len(), 1);
    let stream = &playlist.variant_streams[0];
    assert_eq!(stream.name, "Radio");
    assert_eq!(stream.bandwidth, 800_000);
    assert_eq!(stream.uri, "http://live.test/radio.m3u8");

    // Tracks are written before variant streams.
    let text = playlist.to_string();
    let last_track = text.find("http://live.test/1.m3u8").unwrap();
    let stream_line = text.find("#EXT-X-STREAM-INF:").unwrap();
    assert!(last_track < stream_line);
    assert!(text.ends_with("http://live.test/radio.m3u8\n"));
    Ok(())
}
