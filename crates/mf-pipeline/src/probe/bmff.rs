//! ISO BMFF (MP4 / QuickTime) box parsing.
//!
//! Only the `moov` subtree is parsed: movie header for duration, and the
//! first video track for dimensions, codec, and frame rate.

use std::io::{self, Cursor, Read};

/// A parsed box header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    /// 4-byte box type (e.g. b"moov").
    pub box_type: [u8; 4],
    /// Total size of the box including the header. Zero means "to end of file".
    pub size: u64,
    /// Size of the header itself (8 or 16 for extended-size boxes).
    pub header_size: u64,
}

impl BoxHeader {
    /// Size of the box content (size - header_size).
    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }
}

/// Read a box header from the current position.
///
/// Returns `Ok(None)` at EOF, `Ok(Some(header))` otherwise.
pub fn read_box_header<R: Read>(reader: &mut R) -> io::Result<Option<BoxHeader>> {
    let mut buf = [0u8; 8];
    match reader.read_exact(&mut buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size32 = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let box_type = [buf[4], buf[5], buf[6], buf[7]];

    let (size, header_size) = match size32 {
        1 => (read_u64(reader)?, 16),
        n => (u64::from(n), 8),
    };

    Ok(Some(BoxHeader {
        box_type,
        size,
        header_size,
    }))
}

fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

fn read_fourcc<R: Read>(reader: &mut R) -> io::Result<[u8; 4]> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, n: u64) -> io::Result<()> {
    io::copy(&mut reader.take(n), &mut io::sink()).map(|_| ())
}

/// Read a fullbox header (1 byte version + 3 bytes flags) and return the version.
fn read_version<R: Read>(reader: &mut R) -> io::Result<u8> {
    Ok((read_u32(reader)? >> 24) as u8)
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Split a container box's content into its children.
fn children(data: &[u8]) -> io::Result<Vec<(BoxHeader, &[u8])>> {
    let mut out = Vec::new();
    let mut cur = Cursor::new(data);
    while let Some(header) = read_box_header(&mut cur)? {
        let start = cur.position() as usize;
        let end = if header.size == 0 {
            data.len()
        } else {
            if header.size < header.header_size {
                return Err(invalid(format!(
                    "box {} has size {} below its header",
                    fourcc_str(&header.box_type),
                    header.size
                )));
            }
            start
                .checked_add(header.content_size() as usize)
                .filter(|&end| end <= data.len())
                .ok_or_else(|| invalid(format!("box {} overruns its parent", fourcc_str(&header.box_type))))?
        };
        out.push((header, &data[start..end]));
        cur.set_position(end as u64);
    }
    Ok(out)
}

fn child<'a>(data: &'a [u8], box_type: &[u8; 4]) -> io::Result<Option<&'a [u8]>> {
    Ok(children(data)?
        .into_iter()
        .find(|(h, _)| &h.box_type == box_type)
        .map(|(_, body)| body))
}

pub(crate) fn fourcc_str(code: &[u8; 4]) -> String {
    String::from_utf8_lossy(code).trim().to_string()
}

/// Map a sample-entry fourcc to a codec name.
fn codec_name(format: &[u8; 4]) -> String {
    match format {
        b"avc1" | b"avc3" => "h264".into(),
        b"hvc1" | b"hev1" => "hevc".into(),
        b"av01" => "av1".into(),
        b"vp08" => "vp8".into(),
        b"vp09" => "vp9".into(),
        b"mp4v" => "mpeg4".into(),
        b"apcn" | b"apch" | b"apcs" | b"apco" | b"ap4h" => "prores".into(),
        other => fourcc_str(other).to_lowercase(),
    }
}

/// Timescale and duration from an `mvhd` or `mdhd` body.
fn read_time_header(body: &[u8]) -> io::Result<(u32, u64)> {
    let mut cur = Cursor::new(body);
    if read_version(&mut cur)? == 1 {
        skip(&mut cur, 16)?;
        let timescale = read_u32(&mut cur)?;
        Ok((timescale, read_u64(&mut cur)?))
    } else {
        skip(&mut cur, 8)?;
        let timescale = read_u32(&mut cur)?;
        Ok((timescale, u64::from(read_u32(&mut cur)?)))
    }
}

fn seconds(timescale: u32, duration: u64) -> Option<f64> {
    (timescale > 0 && duration > 0).then(|| duration as f64 / f64::from(timescale))
}

/// Facts extracted from a `moov` box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Default)]
struct TrackInfo {
    handler: Option<[u8; 4]>,
    width: u32,
    height: u32,
    codec: Option<String>,
    timescale: u32,
    duration: u64,
    sample_count: u64,
}

fn parse_trak(body: &[u8]) -> io::Result<TrackInfo> {
    let mut track = TrackInfo::default();

    if let Some(tkhd) = child(body, b"tkhd")? {
        // Width and height are the final two 16.16 fixed-point fields.
        if tkhd.len() >= 8 {
            let mut cur = Cursor::new(&tkhd[tkhd.len() - 8..]);
            track.width = read_u32(&mut cur)? >> 16;
            track.height = read_u32(&mut cur)? >> 16;
        }
    }

    let Some(mdia) = child(body, b"mdia")? else {
        return Ok(track);
    };

    if let Some(mdhd) = child(mdia, b"mdhd")? {
        let (timescale, duration) = read_time_header(mdhd)?;
        track.timescale = timescale;
        track.duration = duration;
    }

    if let Some(hdlr) = child(mdia, b"hdlr")? {
        let mut cur = Cursor::new(hdlr);
        skip(&mut cur, 8)?;
        track.handler = Some(read_fourcc(&mut cur)?);
    }

    let stbl = match child(mdia, b"minf")? {
        Some(minf) => child(minf, b"stbl")?,
        None => None,
    };
    if let Some(stbl) = stbl {
        if let Some(stsd) = child(stbl, b"stsd")? {
            let mut cur = Cursor::new(stsd);
            skip(&mut cur, 4)?;
            if read_u32(&mut cur)? > 0 {
                let _entry_size = read_u32(&mut cur)?;
                track.codec = Some(codec_name(&read_fourcc(&mut cur)?));
            }
        }
        if let Some(stts) = child(stbl, b"stts")? {
            let mut cur = Cursor::new(stts);
            skip(&mut cur, 4)?;
            let entries = read_u32(&mut cur)?;
            for _ in 0..entries {
                let count = read_u32(&mut cur)?;
                let _delta = read_u32(&mut cur)?;
                track.sample_count += u64::from(count);
            }
        }
    }

    Ok(track)
}

/// Parse the content of a `moov` box.
pub fn parse_moov(moov: &[u8]) -> io::Result<MovieInfo> {
    let mut info = MovieInfo::default();
    let mut video: Option<TrackInfo> = None;

    for (header, body) in children(moov)? {
        match &header.box_type {
            b"mvhd" => {
                let (timescale, duration) = read_time_header(body)?;
                info.duration_secs = seconds(timescale, duration);
            }
            b"trak" if video.is_none() => {
                let track = parse_trak(body)?;
                if track.handler == Some(*b"vide") {
                    video = Some(track);
                }
            }
            _ => {}
        }
    }

    if let Some(track) = video {
        let track_secs = seconds(track.timescale, track.duration);
        info.duration_secs = info.duration_secs.or(track_secs);
        info.width = (track.width > 0).then_some(track.width);
        info.height = (track.height > 0).then_some(track.height);
        info.codec = track.codec;
        info.frame_rate = track_secs
            .filter(|_| track.sample_count > 0)
            .map(|secs| round3(track.sample_count as f64 / secs));
    }

    Ok(info)
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
