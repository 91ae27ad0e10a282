use std::fmt::Write as _;

/// One `.ts` entry in the playlist.
#[derive(Debug, Clone)]
pub struct PlaylistSegment {
    pub uri: String,
    pub duration_secs: f64,
    /// Set on the first segment of a batch whose MP4 starts a new GOP
    /// lineage (i.e. every batch boundary).
    pub discontinuity: bool,
}

/// In-memory EVENT-type HLS playlist for one task. Mirrored to the object
/// store after every append and again at finalize.
#[derive(Debug, Clone)]
pub struct HlsPlaylist {
    pub version: u32,
    pub target_duration: u32,
    pub media_sequence: u64,
    pub is_endlist: bool,
    pub segments: Vec<PlaylistSegment>,
}

impl HlsPlaylist {
    pub fn new(target_duration: u32) -> Self {
        Self {
            version: 3,
            target_duration,
            media_sequence: 0,
            is_endlist: false,
            segments: Vec::new(),
        }
    }

    pub fn to_m3u8(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "#EXTM3U");
        let _ = writeln!(out, "#EXT-X-VERSION:{}", self.version);
        let _ = writeln!(out, "#EXT-X-TARGETDURATION:{}", self.target_duration);
        let _ = writeln!(out, "#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence);
        let _ = writeln!(out, "#EXT-X-PLAYLIST-TYPE:EVENT");
        let _ = writeln!(out, "#EXT-X-ALLOW-CACHE:NO");
        for seg in &self.segments {
            if seg.discontinuity {
                let _ = writeln!(out, "#EXT-X-DISCONTINUITY");
            }
            let _ = writeln!(out, "#EXTINF:{:.3},", seg.duration_secs);
            let _ = writeln!(out, "{}", seg.uri);
        }
        if self.is_endlist {
            let _ = writeln!(out, "#EXT-X-ENDLIST");
        }
        out
    }

    /// Parse a previously-published playlist back into memory. Used by the
    /// resumption path: adopt `segments` and `media_sequence` so the next
    /// `add_segment` call continues the sequence instead of restarting it.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut playlist = HlsPlaylist::new(10);
        let mut pending_duration: Option<f64> = None;
        let mut pending_discontinuity = false;

        for line in text.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("#EXT-X-VERSION:") {
                playlist.version = rest.trim().parse().unwrap_or(3);
            } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = rest.trim().parse().unwrap_or(10);
            } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = rest.trim().parse().unwrap_or(0);
            } else if line == "#EXT-X-DISCONTINUITY" {
                pending_discontinuity = true;
            } else if line == "#EXT-X-ENDLIST" {
                playlist.is_endlist = true;
            } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
                let duration = rest
                    .trim_end_matches(',')
                    .split(',')
                    .next()
                    .unwrap_or("0")
                    .parse()
                    .unwrap_or(0.0);
                pending_duration = Some(duration);
            } else if !line.is_empty() && !line.starts_with('#') {
                playlist.segments.push(PlaylistSegment {
                    uri: line.to_string(),
                    duration_secs: pending_duration.take().unwrap_or(0.0),
                    discontinuity: std::mem::take(&mut pending_discontinuity),
                });
            }
        }

        Ok(playlist)
    }

    pub fn append_segment(&mut self, uri: String, duration_secs: f64, discontinuity: bool) {
        self.segments.push(PlaylistSegment { uri, duration_secs, discontinuity });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_m3u8_text() {
        let mut playlist = HlsPlaylist::new(10);
        playlist.append_segment("segment_0001_000.ts".to_string(), 9.98, true);
        playlist.append_segment("segment_0001_001.ts".to_string(), 10.0, false);

        let text = playlist.to_m3u8();
        let parsed = HlsPlaylist::parse(&text).unwrap();

        assert_eq!(parsed.segments.len(), 2);
        assert!(parsed.segments[0].discontinuity);
        assert!(!parsed.segments[1].discontinuity);
        assert_eq!(parsed.target_duration, 10);
    }

    #[test]
    fn monotonicity_holds_across_appends() {
        let mut playlist = HlsPlaylist::new(10);
        let mut previous_len = playlist.segments.len();
        for i in 0..5 {
            playlist.append_segment(format!("segment_{i}.ts"), 10.0, i == 0);
            assert!(playlist.segments.len() > previous_len);
            previous_len = playlist.segments.len();
        }
    }
}
