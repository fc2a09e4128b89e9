//! Byte codecs for the three feed formats.

pub mod epg;
pub mod m3u;
pub mod site;
