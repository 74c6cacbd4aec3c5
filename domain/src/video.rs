//! Media reference extraction for externally hosted videos.
//!
//! Content records store raw video URLs; the rendering layer only needs the
//! 11-character identifier to build an embed. A URL that carries no
//! identifier is a normal negative result, not an error.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Identifiers are exactly this long; matching anchors on the length so
/// trailing path or query noise is never captured.
pub const VIDEO_ID_LEN: usize = 11;

/// Markers tried in priority order: watch/short-link form before embed form.
const URL_MARKERS: [&str; 3] = ["youtube.com/watch?v=", "youtu.be/", "youtube.com/embed/"];

/// An 11-character video identifier extracted from a hosted-video URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Extract an identifier from any accepted URL shape, or `None` if the
    /// URL (possibly empty) matches none of them.
    pub fn from_url(url: &str) -> Option<Self> {
        for marker in URL_MARKERS {
            if let Some(pos) = url.find(marker) {
                let tail = &url[pos + marker.len()..];
                if let Some(id) = take_id(tail) {
                    return Some(Self(id.to_string()));
                }
            }
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VideoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// First 11 characters of `tail` if all are identifier characters.
fn take_id(tail: &str) -> Option<&str> {
    let id = tail.get(..VIDEO_ID_LEN)?;
    if id.chars().all(is_id_char) {
        Some(id)
    } else {
        None
    }
}
