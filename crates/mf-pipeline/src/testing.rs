//! Synthetic media for test suites.

/// Shape of a generated MP4 file.
#[derive(Debug, Clone)]
pub struct Mp4Fixture {
    pub major_brand: [u8; 4],
    pub width: u32,
    pub height: u32,
    pub timescale: u32,
    /// Duration in `timescale` units.
    pub duration: u32,
    pub frames: u32,
    pub codec: [u8; 4],
    /// Size of the `mdat` payload.
    pub payload_len: usize,
    /// Place `moov` after `mdat`, as non-faststart encoders do.
    pub moov_at_end: bool,
}

impl Default for Mp4Fixture {
    fn default() -> Self {
        Self {
            major_brand: *b"isom",
            width: 640,
            height: 360,
            timescale: 1000,
            duration: 4000,
            frames: 100,
            codec: *b"avc1",
            payload_len: 2048,
            moov_at_end: false,
        }
    }
}

fn bx(box_type: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
    out.extend_from_slice(box_type);
    out.extend_from_slice(body);
    out
}

fn be(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Build a structurally valid MP4 with one video track.
pub fn mp4_bytes(f: &Mp4Fixture) -> Vec<u8> {
    let mut ftyp = f.major_brand.to_vec();
    ftyp.extend_from_slice(&be(&[0x200]));
    ftyp.extend_from_slice(b"isommp42");

    // version/flags, creation, modification, timescale, duration, then padding.
    let mut mvhd = be(&[0, 0, 0, f.timescale, f.duration]);
    mvhd.resize(100, 0);

    let mut tkhd = vec![0u8; 76];
    tkhd.extend_from_slice(&be(&[f.width << 16, f.height << 16]));

    let mut mdhd = be(&[0, 0, 0, f.timescale, f.duration]);
    mdhd.extend_from_slice(&[0; 4]);

    let mut hdlr = be(&[0, 0]);
    hdlr.extend_from_slice(b"vide");
    hdlr.extend_from_slice(&[0; 13]);

    let mut stsd = be(&[0, 1, 16]);
    stsd.extend_from_slice(&f.codec);
    stsd.extend_from_slice(&[0; 8]);

    let delta = if f.frames > 0 { f.duration / f.frames } else { 0 };
    let stts = be(&[0, 1, f.frames, delta]);

    let stbl = [bx(b"stsd", &stsd), bx(b"stts", &stts)].concat();
    let minf = bx(b"stbl", &stbl);
    let mdia = [bx(b"mdhd", &mdhd), bx(b"hdlr", &hdlr), bx(b"minf", &minf)].concat();
    let trak = [bx(b"tkhd", &tkhd), bx(b"mdia", &mdia)].concat();
    let moov = bx(b"moov", &[bx(b"mvhd", &mvhd), bx(b"trak", &trak)].concat());

    let payload: Vec<u8> = (0..f.payload_len).map(|i| (i * 31 % 251) as u8).collect();
    let mdat = bx(b"mdat", &payload);

    let mut out = bx(b"ftyp", &ftyp);
    if f.moov_at_end {
        out.extend_from_slice(&mdat);
        out.extend_from_slice(&moov);
    } else {
        out.extend_from_slice(&moov);
        out.extend_from_slice(&mdat);
    }
    out
}

/// A default MP4 padded (inside `mdat`) to exactly `total` bytes.
///
/// `total` must exceed the size of the boxes themselves (roughly 400 bytes).
pub fn mp4_of_size(total: usize) -> Vec<u8> {
    let base = mp4_bytes(&Mp4Fixture {
        payload_len: 0,
        ..Default::default()
    });
    mp4_bytes(&Mp4Fixture {
        payload_len: total.saturating_sub(base.len()),
        ..Default::default()
    })
}
