//! Extended M3U playlists: `#EXTINF` media tracks and `#EXT-X-STREAM-INF` variant streams.

use regex::Regex;
use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use crate::types::{MixError, Result};

const HEADER: &str = "#EXTM3U";
const TRACK: &str = "#EXTINF:";
const STREAM: &str = "#EXT-X-STREAM-INF:";
const VERSION: &str = "#EXT-X-VERSION:";

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([a-zA-Z0-9_-]+)=("[^"]+"|[^",]+)"#).expect("attribute pattern is valid"));

/// A `KEY="value"` attribute. Keys are stored upper-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: String,
    pub duration: f64,
    pub uri: String,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantStream {
    pub name: String,
    pub uri: String,
    pub resolution: String,
    pub bandwidth: u64,
    pub average_bandwidth: u64,
    pub frame_rate: f64,
    pub codecs: String,
    pub hdcp_level: String,
    pub video: String,
    pub audio: String,
    pub subtitles: String,
    pub closed_captions: String,
    /// Attributes without a dedicated field.
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    pub tracks: Vec<Track>,
    pub variant_streams: Vec<VariantStream>,
    pub version: u32,
    /// Attributes on the `#EXTM3U` line, eg. `x-tvg-url`.
    pub tags: Vec<Tag>,
}

enum Last {
    None,
    Track,
    Stream,
}

pub fn parse(data: &[u8]) -> Result<Playlist> {
    let text = std::str::from_utf8(data).map_err(|e| MixError::Parse(format!("playlist: {e}")))?;
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));

    let first = lines.next().unwrap_or_default();
    let Some(header) = first.trim_start_matches('\u{feff}').strip_prefix(HEADER) else {
        return Err(MixError::Parse("playlist: missing #EXTM3U header".to_string()));
    };

    let mut playlist = Playlist {
        tags: parse_attributes(header),
        ..Default::default()
    };
    let mut last = Last::None;

    for (index, line) in lines.enumerate() {
        let line_no = index + 2;
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(TRACK) {
            playlist.tracks.push(parse_track(rest, line_no)?);
            last = Last::Track;
        } else if let Some(rest) = line.strip_prefix(STREAM) {
            playlist.variant_streams.push(parse_stream(rest, line_no)?);
            last = Last::Stream;
        } else if let Some(rest) = line.strip_prefix(VERSION) {
            playlist.version = rest
                .trim()
                .parse()
                .map_err(|e| MixError::Parse(format!("playlist line {line_no}: version: {e}")))?;
        } else if line.is_empty() || line.starts_with('#') {
            continue;
        } else {
            let slot = match last {
                Last::Track => playlist.tracks.last_mut().map(|t| &mut t.uri),
                Last::Stream => playlist.variant_streams.last_mut().map(|s| &mut s.uri),
                Last::None => None,
            };
            let Some(uri) = slot else {
                return Err(MixError::Parse(format!(
                    "playlist line {line_no}: URI without a preceding track or stream"
                )));
            };
            *uri = line.to_string();
        }
    }

    Ok(playlist)
}

fn parse_attributes(line: &str) -> Vec<Tag> {
    ATTRIBUTE
        .captures_iter(line)
        .map(|caps| Tag::new(caps[1].trim().to_uppercase(), caps[2].trim_matches(|c| c == '"' || c == ' ')))
        .collect()
}

/// Index of the first comma outside double quotes.
fn split_comma(line: &str) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_track(line: &str, line_no: usize) -> Result<Track> {
    let Some(comma) = split_comma(line) else {
        return Err(MixError::Parse(format!(
            "playlist line {line_no}: #EXTINF needs a duration and a name"
        )));
    };
    let (info, name) = (&line[..comma], &line[comma + 1..]);

    let duration_text = info.split_whitespace().next().unwrap_or_default();
    let duration = duration_text
        .parse()
        .map_err(|_| MixError::Parse(format!("playlist line {line_no}: bad duration {duration_text:?}")))?;

    Ok(Track {
        name: name.trim().to_string(),
        duration,
        uri: String::new(),
        tags: parse_attributes(&info[duration_text.len()..]),
    })
}

fn parse_stream(line: &str, line_no: usize) -> Result<VariantStream> {
    let bad = |what: &str, value: &str| MixError::Parse(format!("playlist line {line_no}: bad {what} {value:?}"));

    let mut stream = VariantStream::default();
    for Tag { name, value } in parse_attributes(line) {
        match name.as_str() {
            "BANDWIDTH" => stream.bandwidth = value.parse().map_err(|_| bad("bandwidth", &value))?,
            "AVERAGE-BANDWIDTH" => {
                stream.average_bandwidth = value.parse().map_err(|_| bad("average bandwidth", &value))?
            }
            "FRAME-RATE" => stream.frame_rate = value.parse().map_err(|_| bad("frame rate", &value))?,
            "RESOLUTION" => stream.resolution = value,
            "CODECS" => stream.codecs = value,
            "HDCP-LEVEL" => stream.hdcp_level = value,
            "VIDEO" => stream.video = value,
            "AUDIO" => stream.audio = value,
            "SUBTITLES" => stream.subtitles = value,
            "CLOSED-CAPTIONS" => stream.closed_captions = value,
            "NAME" => stream.name = value,
            _ => stream.tags.push(Tag { name, value }),
        }
    }
    Ok(stream)
}

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(HEADER)?;
        for tag in &self.tags {
            write!(f, " {}=\"{}\"", tag.name, tag.value)?;
        }
        f.write_char('\n')?;
        if self.version > 0 {
            writeln!(f, "{VERSION}{}", self.version)?;
        }

        for track in &self.tracks {
            write!(f, "{TRACK}{}", track.duration)?;
            for tag in &track.tags {
                write!(f, " {}=\"{}\"", tag.name, tag.value)?;
            }
            writeln!(f, ",{}", track.name)?;
            writeln!(f, "{}", track.uri)?;
        }

        for stream in &self.variant_streams {
            writeln!(f, "{STREAM}{}", stream_attributes(stream).join(","))?;
            writeln!(f, "{}", stream.uri)?;
        }
        Ok(())
    }
}

fn stream_attributes(stream: &VariantStream) -> Vec<String> {
    let mut args = Vec::new();
    if stream.bandwidth > 0 {
        args.push(format!("BANDWIDTH={}", stream.bandwidth));
    }
    if stream.average_bandwidth > 0 {
        args.push(format!("AVERAGE-BANDWIDTH={}", stream.average_bandwidth));
    }
    if !stream.resolution.is_empty() {
        args.push(format!("RESOLUTION={}", stream.resolution));
    }
    if stream.frame_rate > 0.0 {
        args.push(format!("FRAME-RATE={:.3}", stream.frame_rate));
    }
    if !stream.hdcp_level.is_empty() {
        args.push(format!("HDCP-LEVEL={}", stream.hdcp_level));
    }
    for (key, value) in [
        ("CODECS", &stream.codecs),
        ("VIDEO", &stream.video),
        ("AUDIO", &stream.audio),
        ("SUBTITLES", &stream.subtitles),
        ("CLOSED-CAPTIONS", &stream.closed_captions),
        ("NAME", &stream.name),
    ] {
        if !value.is_empty() {
            args.push(format!("{key}=\"{value}\""));
        }
    }
    args.extend(stream.tags.iter().map(|t| format!("{}=\"{}\"", t.name, t.value)));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"#EXTM3U x-tvg-url="http://epg.example/guide.xml"
#EXT-X-VERSION:3
#EXTINF:-1 tvg-id="cctv1" group-title="News, Daily",CCTV-1 综合
http://live.example/cctv1.m3u8
#EXTINF:10.5,Clip
clip.ts
#EXT-X-STREAM-INF:BANDWIDTH=1280000,AVERAGE-BANDWIDTH=1000000,RESOLUTION=1280x720,CODECS="avc1.4d401f,mp4a.40.2",NAME="720p"
http://live.example/720.m3u8
"#;

    #[test]
    fn parses_header_tracks_and_streams() {
        let playlist = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(playlist.version, 3);
        assert_eq!(playlist.tags, vec![Tag::new("X-TVG-URL", "http://epg.example/guide.xml")]);

        assert_eq!(playlist.tracks.len(), 2);
        let live = &playlist.tracks[0];
        assert_eq!(live.name, "CCTV-1 综合");
        assert_eq!(live.duration, -1.0);
        assert_eq!(live.uri, "http://live.example/cctv1.m3u8");
        assert_eq!(
            live.tags,
            vec![Tag::new("TVG-ID", "cctv1"), Tag::new("GROUP-TITLE", "News, Daily")]
        );
        assert_eq!(playlist.tracks[1].duration, 10.5);
        assert_eq!(playlist.tracks[1].uri, "clip.ts");

        let stream = &playlist.variant_streams[0];
        assert_eq!(stream.bandwidth, 1_280_000);
        assert_eq!(stream.average_bandwidth, 1_000_000);
        assert_eq!(stream.resolution, "1280x720");
        assert_eq!(stream.codecs, "avc1.4d401f,mp4a.40.2");
        assert_eq!(stream.name, "720p");
        assert_eq!(stream.uri, "http://live.example/720.m3u8");
    }

    #[test]
    fn serialized_playlist_parses_back() {
        let playlist = parse(SAMPLE.as_bytes()).unwrap();
        let text = playlist.to_string();
        assert!(text.starts_with("#EXTM3U X-TVG-URL=\"http://epg.example/guide.xml\"\n#EXT-X-VERSION:3\n"));
        assert_eq!(parse(text.as_bytes()).unwrap(), playlist);
    }

    #[test]
    fn rejects_missing_header() {
        let err = parse(b"#EXTINF:-1,A\nhttp://a\n").unwrap_err();
        assert!(err.to_string().contains("#EXTM3U"));
    }

    #[test]
    fn rejects_uri_before_any_entry() {
        assert!(matches!(parse(b"#EXTM3U\nhttp://orphan\n"), Err(MixError::Parse(_))));
    }
}
