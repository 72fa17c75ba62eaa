//! Codec preference rewriting for session descriptions.
//!
//! Only `m=` lines and `a=rtpmap`/`a=fmtp` attribute lines are looked at;
//! every other line passes through untouched and in place.

use crate::error::FormatError;
use crate::peer::types::MediaKind;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

const CRLF: &str = "\r\n";

const VIDEO_CODEC_PARAM_START_BITRATE: &str = "x-google-start-bitrate";
const AUDIO_CODEC_PARAM_BITRATE: &str = "maxaveragebitrate";

// a=rtpmap:<payload type> <encoding name>/<clock rate>[/<encoding parameters>]
static RTPMAP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^a=rtpmap:(\d+) ([^/\s]+)/(\d+)(?:/\S+)?$").expect("rtpmap pattern is valid")
});

static FMTP_WITH_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^a=fmtp:(\d+) \w+=\d+").expect("fmtp pattern is valid"));

/// Description split into lines, remembering whether it ended in CRLF.
struct Lines<'a> {
    lines: Vec<&'a str>,
    trailing_crlf: bool,
}

impl<'a> Lines<'a> {
    fn split(sdp: &'a str) -> Self {
        let (body, trailing_crlf) = match sdp.strip_suffix(CRLF) {
            Some(body) => (body, true),
            None => (sdp, false),
        };
        Lines {
            lines: body.split(CRLF).collect(),
            trailing_crlf,
        }
    }

    fn join_with(&self, index: usize, replacement: &str) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push_str(CRLF);
            }
            out.push_str(if i == index { replacement } else { *line });
        }
        if self.trailing_crlf {
            out.push_str(CRLF);
        }
        out
    }
}

fn media_prefix(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "m=audio ",
        MediaKind::Video => "m=video ",
    }
}

/// Payload types bound to `codec` (case-sensitive), in order of appearance.
fn codec_payload_types<'a>(lines: &[&'a str], codec: &str) -> Vec<&'a str> {
    let mut found: Vec<&str> = Vec::new();
    for &line in lines {
        if let Some(caps) = RTPMAP.captures(line) {
            let (Some(pt), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            if name.as_str() == codec && !found.contains(&pt.as_str()) {
                found.push(pt.as_str());
            }
        }
    }
    found
}

/// Moves the payload types for `codec` to the front of the first `kind`
/// media line.
///
/// Returns the input unchanged when there is no such media line or no
/// payload type carries that codec. A media line with fewer than four
/// tokens is reported as [`FormatError::MalformedMediaLine`].
pub fn try_prefer_codec(sdp: &str, codec: &str, kind: MediaKind) -> Result<String, FormatError> {
    let parsed = Lines::split(sdp);
    let prefix = media_prefix(kind);

    let Some(m_index) = parsed.lines.iter().position(|l| l.starts_with(prefix)) else {
        debug!("No {kind} media description line, so can't prefer {codec}");
        return Ok(sdp.to_owned());
    };

    let preferred = codec_payload_types(&parsed.lines, codec);
    if preferred.is_empty() {
        debug!("No payload types with name {codec}");
        return Ok(sdp.to_owned());
    }

    let m_line = parsed.lines[m_index];
    let parts: Vec<&str> = m_line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(FormatError::MalformedMediaLine(m_line.to_owned()));
    }
    let (header, payload_types) = parts.split_at(3);

    let mut reordered: Vec<&str> = Vec::with_capacity(payload_types.len());
    for pt in &preferred {
        if payload_types.contains(pt) && !reordered.contains(pt) {
            reordered.push(pt);
        }
    }
    for pt in payload_types {
        if !reordered.contains(pt) {
            reordered.push(pt);
        }
    }

    if reordered == payload_types {
        return Ok(sdp.to_owned());
    }

    let new_m_line = format!("{} {}", header.join(" "), reordered.join(" "));
    debug!("Change media description from: {m_line} to {new_m_line}");
    Ok(parsed.join_with(m_index, &new_m_line))
}

/// Like [`try_prefer_codec`], but logs a malformed media line and hands
/// the description back untouched.
pub fn prefer_codec(sdp: &str, codec: &str, kind: MediaKind) -> String {
    match try_prefer_codec(sdp, codec, kind) {
        Ok(rewritten) => rewritten,
        Err(err) => {
            warn!("{err}");
            sdp.to_owned()
        }
    }
}

/// Adds a start bitrate parameter to the fmtp line of the first payload
/// type bound to `codec`, inserting the fmtp line when there is none.
pub fn set_start_bitrate(sdp: &str, codec: &str, kind: MediaKind, bitrate_kbps: u32) -> String {
    let parsed = Lines::split(sdp);

    let rtpmap = parsed.lines.iter().enumerate().find_map(|(i, line)| {
        let caps = RTPMAP.captures(line)?;
        if caps.get(2)?.as_str() == codec {
            Some((i, caps.get(1)?.as_str()))
        } else {
            None
        }
    });
    let Some((rtpmap_index, pt)) = rtpmap else {
        warn!("No rtpmap for {codec} codec");
        return sdp.to_owned();
    };

    let param = match kind {
        MediaKind::Video => format!("{VIDEO_CODEC_PARAM_START_BITRATE}={bitrate_kbps}"),
        MediaKind::Audio => {
            format!("{AUDIO_CODEC_PARAM_BITRATE}={}", u64::from(bitrate_kbps) * 1000)
        }
    };

    let fmtp_index = parsed.lines.iter().position(|line| {
        FMTP_WITH_PARAMS
            .captures(line)
            .and_then(|caps| caps.get(1))
            .is_some_and(|m| m.as_str() == pt)
    });

    let mut out: Vec<String> = Vec::with_capacity(parsed.lines.len() + 1);
    for (i, line) in parsed.lines.iter().enumerate() {
        if Some(i) == fmtp_index {
            let updated = format!("{line}; {param}");
            debug!("Update remote SDP line: {updated}");
            out.push(updated);
        } else {
            out.push((*line).to_owned());
        }
        if fmtp_index.is_none() && i == rtpmap_index {
            let added = format!("a=fmtp:{pt} {param}");
            debug!("Add remote SDP line: {added}");
            out.push(added);
        }
    }

    let mut joined = out.join(CRLF);
    if parsed.trailing_crlf {
        joined.push_str(CRLF);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIO_ONLY: &str = "v=0\r\n\
        o=- 1 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111 103 9\r\n\
        a=rtpmap:111 opus/48000/2\r\n\
        a=rtpmap:103 ISAC/16000\r\n\
        a=rtpmap:9 G722/8000\r\n";

    const AUDIO_VIDEO: &str = "v=0\r\n\
        s=-\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111 103\r\n\
        a=rtpmap:111 opus/48000/2\r\n\
        a=fmtp:111 minptime=10;useinbandfec=1\r\n\
        a=rtpmap:103 ISAC/16000\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 100 101 102\r\n\
        a=rtpmap:100 VP9/90000\r\n\
        a=rtpmap:101 VP8/90000\r\n\
        a=rtpmap:102 H264/90000\r\n";

    #[test]
    fn moves_matching_payload_type_to_front() {
        let out = try_prefer_codec(AUDIO_VIDEO, "VP8", MediaKind::Video).unwrap();
        let expected = AUDIO_VIDEO.replace(
            "m=video 9 UDP/TLS/RTP/SAVPF 100 101 102",
            "m=video 9 UDP/TLS/RTP/SAVPF 101 100 102",
        );
        assert_eq!(out, expected);
        assert_eq!(out.lines().count(), AUDIO_VIDEO.lines().count());
    }

    #[test]
    fn missing_media_kind_is_byte_identical() {
        let out = try_prefer_codec(AUDIO_ONLY, "VP8", MediaKind::Video).unwrap();
        assert_eq!(out, AUDIO_ONLY);

        let no_trailer = AUDIO_ONLY.trim_end_matches("\r\n");
        assert_eq!(prefer_codec(no_trailer, "H264", MediaKind::Video), no_trailer);
    }

    #[test]
    fn unknown_codec_is_noop() {
        assert_eq!(prefer_codec(AUDIO_VIDEO, "AV1", MediaKind::Video), AUDIO_VIDEO);
    }

    #[test]
    fn codec_match_is_case_sensitive() {
        assert_eq!(prefer_codec(AUDIO_VIDEO, "vp8", MediaKind::Video), AUDIO_VIDEO);
        let out = prefer_codec(AUDIO_ONLY, "ISAC", MediaKind::Audio);
        assert!(out.contains("m=audio 9 UDP/TLS/RTP/SAVPF 103 111 9\r\n"));
        assert_eq!(prefer_codec(AUDIO_ONLY, "isac", MediaKind::Audio), AUDIO_ONLY);
    }

    #[test]
    fn rewriting_twice_matches_rewriting_once() {
        let once = prefer_codec(AUDIO_VIDEO, "H264", MediaKind::Video);
        let twice = prefer_codec(&once, "H264", MediaKind::Video);
        assert_eq!(once, twice);
        assert!(once.contains("m=video 9 UDP/TLS/RTP/SAVPF 102 100 101\r\n"));
    }

    #[test]
    fn several_payload_types_keep_collection_order() {
        let sdp = "m=video 9 RTP/AVPF 96 97 98 99\r\n\
            a=rtpmap:96 VP8/90000\r\n\
            a=rtpmap:97 H264/90000\r\n\
            a=rtpmap:98 VP9/90000\r\n\
            a=rtpmap:99 H264/90000\r\n";
        let out = prefer_codec(sdp, "H264", MediaKind::Video);
        assert!(out.starts_with("m=video 9 RTP/AVPF 97 99 96 98\r\n"));
    }

    #[test]
    fn only_targeted_media_line_changes() {
        let out = prefer_codec(AUDIO_VIDEO, "ISAC", MediaKind::Audio);
        let before: Vec<&str> = AUDIO_VIDEO.split("\r\n").collect();
        let after: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(before.len(), after.len());
        let changed: Vec<usize> = (0..before.len()).filter(|&i| before[i] != after[i]).collect();
        assert_eq!(changed, vec![2]);
        assert_eq!(after[2], "m=audio 9 UDP/TLS/RTP/SAVPF 103 111");
    }

    #[test]
    fn payload_type_from_another_section_is_not_inserted() {
        let sdp = "m=audio 9 RTP/AVP 0 8\r\n\
            a=rtpmap:0 PCMU/8000\r\n\
            m=video 9 RTP/AVP 96\r\n\
            a=rtpmap:96 VP8/90000\r\n";
        assert_eq!(prefer_codec(sdp, "VP8", MediaKind::Audio), sdp);
    }

    #[test]
    fn malformed_media_line_reports_and_keeps_input() {
        let sdp = "m=video 9 RTP/AVP\r\na=rtpmap:96 VP8/90000\r\n";
        assert_eq!(
            try_prefer_codec(sdp, "VP8", MediaKind::Video),
            Err(FormatError::MalformedMediaLine("m=video 9 RTP/AVP".into()))
        );
        assert_eq!(prefer_codec(sdp, "VP8", MediaKind::Video), sdp);
    }

    #[test]
    fn start_bitrate_extends_existing_fmtp() {
        let out = set_start_bitrate(AUDIO_VIDEO, "opus", MediaKind::Audio, 32);
        assert!(out.contains("a=fmtp:111 minptime=10;useinbandfec=1; maxaveragebitrate=32000\r\n"));
        assert_eq!(out.lines().count(), AUDIO_VIDEO.lines().count());
    }

    #[test]
    fn start_bitrate_inserts_fmtp_after_rtpmap() {
        let out = set_start_bitrate(AUDIO_VIDEO, "VP8", MediaKind::Video, 800);
        assert!(out.contains(
            "a=rtpmap:101 VP8/90000\r\na=fmtp:101 x-google-start-bitrate=800\r\na=rtpmap:102"
        ));
        assert_eq!(out.lines().count(), AUDIO_VIDEO.lines().count() + 1);
    }

    #[test]
    fn start_bitrate_above_u32_bits_per_second() {
        let out = set_start_bitrate(AUDIO_VIDEO, "opus", MediaKind::Audio, u32::MAX);
        assert!(out.contains("; maxaveragebitrate=4294967295000\r\n"));
    }

    #[test]
    fn start_bitrate_without_codec_is_noop() {
        assert_eq!(set_start_bitrate(AUDIO_ONLY, "AV1", MediaKind::Video, 500), AUDIO_ONLY);
    }
}
