use std::io;
use std::io::prelude::*;

use crate::error::{Error, Result};
use crate::io::Endian;

pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const IMAGE_SEPARATOR: u8 = 0x2c;
pub const TRAILER: u8 = 0x3b;

pub const GRAPHIC_CONTROL_LABEL: u8 = 0xf9;
pub const COMMENT_LABEL: u8 = 0xfe;
pub const APPLICATION_LABEL: u8 = 0xff;

/// fixed size of an application extension's id + authentication code
pub const APPLICATION_BLOCK_SIZE: u8 = 11;

/// application id of the XMP extension; its authentication code is "XMP"
pub const XMP_APP_ID: &[u8; 8] = b"XMP Data";
pub const XMP_AUTH_CODE: &[u8; 3] = b"XMP";

pub const MAGIC_TRAILER_LEN: usize = 258;

/// Appended after a raw XMP packet so that a reader walking the packet as
/// sub-blocks always lands on a length byte that walks down to the
/// terminator: 0x01, then 0xff descending to 0x00, then 0x00.
pub const MAGIC_TRAILER: [u8; MAGIC_TRAILER_LEN] = magic_trailer();

const fn magic_trailer() -> [u8; MAGIC_TRAILER_LEN] {
    let mut t = [0u8; MAGIC_TRAILER_LEN];
    t[0] = 0x01;
    let mut i = 1;
    while i <= 256 {
        t[i] = (256 - i) as u8;
        i += 1;
    }
    t
}

/// number of bytes in a color table described by a packed-fields byte
pub fn color_table_len(packed: u8) -> usize {
    3 * (1 << ((packed & 0x07) + 1))
}

/// A chain of length-prefixed sub-blocks, kept exactly as read so it can be
/// re-emitted verbatim. The zero-length terminator is not stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubBlocks {
    raw: Vec<u8>,
}

impl SubBlocks {
    /// read sub-blocks through the terminator
    pub fn read<R: Read>(rdr: &mut R) -> Result<Self> {
        let mut raw = vec![];
        let mut buf = [0u8; 255];
        loop {
            let n = read_u8(rdr)? as usize;
            if n == 0 {
                return Ok(SubBlocks { raw });
            }
            rdr.read_exact(&mut buf[..n])?;
            raw.push(n as u8);
            raw.extend_from_slice(&buf[..n]);
        }
    }

    /// consume sub-blocks through the terminator without keeping them
    pub fn skip<R: Read>(rdr: &mut R) -> Result<()> {
        let mut buf = [0u8; 255];
        loop {
            let n = read_u8(rdr)? as usize;
            if n == 0 {
                return Ok(());
            }
            rdr.read_exact(&mut buf[..n])?;
        }
    }

    /// split data into sub-blocks of at most 255 bytes
    pub fn from_payload(data: &[u8]) -> Self {
        let mut raw = Vec::with_capacity(data.len() + data.len() / 255 + 1);
        for chunk in data.chunks(255) {
            raw.push(chunk.len() as u8);
            raw.extend_from_slice(chunk);
        }
        SubBlocks { raw }
    }

    /// bytes that already carry their own length framing
    pub(crate) fn from_raw(raw: Vec<u8>) -> Self {
        SubBlocks { raw }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// the data of each sub-block, without length bytes
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut rest = &self.raw[..];
        std::iter::from_fn(move || {
            let (&n, tail) = rest.split_first()?;
            let n = (n as usize).min(tail.len());
            let (block, tail) = tail.split_at(n);
            rest = tail;
            Some(block)
        })
    }

    /// all sub-block data concatenated
    pub fn payload(&self) -> Vec<u8> {
        self.iter().flat_map(|b| b.iter().copied()).collect()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.raw)?;
        w.write_all(&[0])
    }
}

pub(crate) fn read_u8<R: Read>(rdr: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    rdr.read_exact(&mut b)?;
    Ok(b[0])
}

/// The 7 byte logical screen descriptor following the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenDescriptor(pub [u8; 7]);

impl ScreenDescriptor {
    pub fn width(&self) -> u16 {
        Endian::Little.get_u16(&self.0[0..2])
    }

    pub fn height(&self) -> u16 {
        Endian::Little.get_u16(&self.0[2..4])
    }

    pub fn packed(&self) -> u8 {
        self.0[4]
    }

    pub fn has_global_palette(&self) -> bool {
        self.packed() & 0x80 != 0
    }

    pub fn global_palette_len(&self) -> Option<usize> {
        if self.has_global_palette() {
            Some(color_table_len(self.packed()))
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisposalMethod {
    Unspecified,
    LeaveAsIs,
    RestoreToBackground,
    RestoreToPrevious,
    /// values 4-7 are reserved
    Reserved(u8),
}

impl DisposalMethod {
    fn from_packed(packed: u8) -> Self {
        match (packed & 0x1c) >> 2 {
            0 => DisposalMethod::Unspecified,
            1 => DisposalMethod::LeaveAsIs,
            2 => DisposalMethod::RestoreToBackground,
            3 => DisposalMethod::RestoreToPrevious,
            n => DisposalMethod::Reserved(n),
        }
    }
}

/// Graphic control extension. Parsed for navigation only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicControl {
    pub disposal: DisposalMethod,
    pub user_input: bool,
    /// in hundredths of a second
    pub delay: u16,
    pub transparent_index: Option<u8>,
    data: SubBlocks,
}

impl GraphicControl {
    pub fn read<R: Read>(rdr: &mut R) -> Result<Self> {
        let data = SubBlocks::read(rdr)?;
        let fixed = data
            .iter()
            .next()
            .filter(|b| b.len() >= 4)
            .ok_or_else(|| Error::malformed("graphic control block shorter than 4 bytes"))?;

        let packed = fixed[0];
        let delay = Endian::Little.get_u16(&fixed[1..3]);
        let transparent_index = if packed & 0x01 != 0 { Some(fixed[3]) } else { None };
        Ok(GraphicControl {
            disposal: DisposalMethod::from_packed(packed),
            user_input: packed & 0x02 != 0,
            delay,
            transparent_index,
            data,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL])?;
        self.data.write_to(w)
    }
}

/// Application extension: 8 byte id, 3 byte authentication code, data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationExtension {
    pub app_id: [u8; 8],
    pub auth_code: [u8; 3],
    pub data: SubBlocks,
}

impl ApplicationExtension {
    /// read everything after the label
    pub fn read<R: Read>(rdr: &mut R) -> Result<Self> {
        let size = read_u8(rdr)?;
        if size != APPLICATION_BLOCK_SIZE {
            return Err(Error::malformed(format!("application extension block size {}, expected 11", size)));
        }
        let mut app_id = [0u8; 8];
        rdr.read_exact(&mut app_id)?;
        let mut auth_code = [0u8; 3];
        rdr.read_exact(&mut auth_code)?;
        let data = SubBlocks::read(rdr)?;
        Ok(ApplicationExtension { app_id, auth_code, data })
    }

    /// Wrap a raw XMP packet the way XMP-aware GIF writers do: the packet
    /// bytes themselves, followed by the magic trailer.
    pub fn new_xmp(packet: &[u8]) -> Result<Self> {
        if let Some(i) = packet.iter().position(|&b| b == 0) {
            return Err(Error::InvalidPayload(format!("xmp packet contains a NUL byte at {}", i)));
        }
        let mut raw = Vec::with_capacity(packet.len() + MAGIC_TRAILER_LEN - 1);
        raw.extend_from_slice(packet);
        // the final zero of the trailer is written as the terminator
        raw.extend_from_slice(&MAGIC_TRAILER[..MAGIC_TRAILER_LEN - 1]);
        Ok(ApplicationExtension {
            app_id: *XMP_APP_ID,
            auth_code: *XMP_AUTH_CODE,
            data: SubBlocks::from_raw(raw),
        })
    }

    pub fn is_xmp(&self) -> bool {
        &self.app_id == XMP_APP_ID
    }

    /// The XMP packet carried by this block, with the magic trailer removed.
    /// Blocks without the trailer are read as ordinary sub-block data.
    pub fn xmp_packet(&self) -> Option<Vec<u8>> {
        if !self.is_xmp() {
            return None;
        }
        let raw = self.data.raw();
        let tail = &MAGIC_TRAILER[..MAGIC_TRAILER_LEN - 1];
        let packet = match raw.strip_suffix(tail) {
            Some(packet) => packet.to_vec(),
            None => self.data.payload(),
        };
        if packet.is_empty() {
            None
        } else {
            Some(packet)
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, APPLICATION_BLOCK_SIZE])?;
        w.write_all(&self.app_id)?;
        w.write_all(&self.auth_code)?;
        self.data.write_to(w)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub data: SubBlocks,
}

impl Comment {
    /// utf-8 encoded, split into sub-blocks of at most 255 bytes
    pub fn new(text: &str) -> Self {
        Comment { data: SubBlocks::from_payload(text.as_bytes()) }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.data.payload()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[EXTENSION_INTRODUCER, COMMENT_LABEL])?;
        self.data.write_to(w)
    }
}

/// One image: descriptor, optional local palette and the LZW coded data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFrame {
    pub descriptor: [u8; 9],
    pub local_palette: Option<Vec<u8>>,
    pub lzw_min_code_size: u8,
    /// empty when the stream was only scanned
    pub data: SubBlocks,
}

impl ImageFrame {
    pub fn packed(&self) -> u8 {
        self.descriptor[8]
    }

    pub fn local_palette_len(&self) -> Option<usize> {
        if self.packed() & 0x80 != 0 {
            Some(color_table_len(self.packed()))
        } else {
            None
        }
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[IMAGE_SEPARATOR])?;
        w.write_all(&self.descriptor)?;
        if let Some(ref palette) = self.local_palette {
            w.write_all(palette)?;
        }
        w.write_all(&[self.lzw_min_code_size])?;
        self.data.write_to(w)
    }
}

/// A unit of a GIF stream, as produced by the scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// "GIF87a" or "GIF89a"
    Header([u8; 6]),
    ScreenDescriptor(ScreenDescriptor),
    GlobalPalette(Vec<u8>),
    GraphicControl(GraphicControl),
    Application(ApplicationExtension),
    Comment(Comment),
    /// any other extension; data is empty when the stream was only scanned
    Extension { label: u8, data: SubBlocks },
    Image(ImageFrame),
    Trailer,
}

impl Block {
    /// re-emit the block exactly as it was read
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match *self {
            Block::Header(ref sig) => w.write_all(sig),
            Block::ScreenDescriptor(ref lsd) => w.write_all(&lsd.0),
            Block::GlobalPalette(ref p) => w.write_all(p),
            Block::GraphicControl(ref gc) => gc.write_to(w),
            Block::Application(ref app) => app.write_to(w),
            Block::Comment(ref c) => c.write_to(w),
            Block::Extension { label, ref data } => {
                w.write_all(&[EXTENSION_INTRODUCER, label])?;
                data.write_to(w)
            }
            Block::Image(ref frame) => frame.write_to(w),
            Block::Trailer => w.write_all(&[TRAILER]),
        }
    }
}
