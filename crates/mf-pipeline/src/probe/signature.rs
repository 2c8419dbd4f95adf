//! Container detection from leading bytes.

use mf_core::Container;

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
const TS_PACKET: usize = 188;
const TS_SYNC: u8 = 0x47;

/// Identify the container from the first bytes of a file.
///
/// `head` should hold at least a few hundred bytes for MPEG-TS detection,
/// which checks sync bytes on consecutive packets.
pub fn sniff(head: &[u8]) -> Option<Container> {
    if head.len() >= 12 {
        match &head[4..8] {
            b"ftyp" => {
                return Some(if &head[8..12] == b"qt  " {
                    Container::Mov
                } else {
                    Container::Mp4
                });
            }
            // Pre-ftyp QuickTime files start directly with a top-level atom.
            b"moov" | b"mdat" | b"wide" | b"free" | b"skip" => return Some(Container::Mov),
            _ => {}
        }
    }

    if head.starts_with(&EBML_MAGIC) {
        return Some(if contains(head, b"webm") {
            Container::Webm
        } else {
            Container::Matroska
        });
    }

    if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"AVI " {
        return Some(Container::Avi);
    }

    if head.len() >= 4 && &head[0..3] == b"FLV" && head[3] == 0x01 {
        return Some(Container::Flv);
    }

    if head.first() == Some(&TS_SYNC) {
        let packets = head.len().div_ceil(TS_PACKET).min(3);
        if packets >= 2 && (0..packets).all(|i| head[i * TS_PACKET] == TS_SYNC) {
            return Some(Container::MpegTs);
        }
    }

    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
