//! Byte-order aware primitives shared by every container format.

use std::io;
use std::io::prelude::*;
use std::io::SeekFrom;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Byte order of a container, fixed once its header has been parsed.
///
/// TIFF/Exif declare it with an `II` (Intel) or `MM` (Motorola) marker,
/// GIF is always little endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// map a TIFF byte order marker to an Endian
    pub fn from_marker(marker: [u8; 2]) -> Option<Self> {
        match &marker {
            b"II" => Some(Endian::Little),
            b"MM" => Some(Endian::Big),
            _ => None,
        }
    }

    pub fn marker(self) -> [u8; 2] {
        match self {
            Endian::Little => *b"II",
            Endian::Big => *b"MM",
        }
    }

    // slice codec: callers guarantee the slice is long enough

    pub fn get_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn get_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn get_u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    pub fn put_u16(self, buf: &mut [u8], v: u16) {
        match self {
            Endian::Little => LittleEndian::write_u16(buf, v),
            Endian::Big => BigEndian::write_u16(buf, v),
        }
    }

    pub fn put_u32(self, buf: &mut [u8], v: u32) {
        match self {
            Endian::Little => LittleEndian::write_u32(buf, v),
            Endian::Big => BigEndian::write_u32(buf, v),
        }
    }

    pub fn put_u64(self, buf: &mut [u8], v: u64) {
        match self {
            Endian::Little => LittleEndian::write_u64(buf, v),
            Endian::Big => BigEndian::write_u64(buf, v),
        }
    }

    // stream codec

    pub fn read_u16<R: Read>(self, rdr: &mut R) -> io::Result<u16> {
        match self {
            Endian::Little => rdr.read_u16::<LittleEndian>(),
            Endian::Big => rdr.read_u16::<BigEndian>(),
        }
    }

    pub fn read_u32<R: Read>(self, rdr: &mut R) -> io::Result<u32> {
        match self {
            Endian::Little => rdr.read_u32::<LittleEndian>(),
            Endian::Big => rdr.read_u32::<BigEndian>(),
        }
    }

    pub fn read_u64<R: Read>(self, rdr: &mut R) -> io::Result<u64> {
        match self {
            Endian::Little => rdr.read_u64::<LittleEndian>(),
            Endian::Big => rdr.read_u64::<BigEndian>(),
        }
    }

    pub fn write_u16<W: Write>(self, w: &mut W, v: u16) -> io::Result<()> {
        match self {
            Endian::Little => w.write_u16::<LittleEndian>(v),
            Endian::Big => w.write_u16::<BigEndian>(v),
        }
    }

    pub fn write_u32<W: Write>(self, w: &mut W, v: u32) -> io::Result<()> {
        match self {
            Endian::Little => w.write_u32::<LittleEndian>(v),
            Endian::Big => w.write_u32::<BigEndian>(v),
        }
    }

    pub fn write_u64<W: Write>(self, w: &mut W, v: u64) -> io::Result<()> {
        match self {
            Endian::Little => w.write_u64::<LittleEndian>(v),
            Endian::Big => w.write_u64::<BigEndian>(v),
        }
    }
}

/// Seekable writer that tracks its position relative to where it started,
/// so offsets it reports are absolute within the container being written.
///
/// Every write lands immediately at the current position, which is what
/// lets a directory slot be left blank and patched once its payload has
/// been placed.
// io::Cursor only offers this for in-memory buffers
pub struct PosWriter<T> {
    inner: T,
    base: u64,
    pos: u64,
    endian: Endian,
}

impl<T: Write + Seek> PosWriter<T> {
    pub fn new(mut inner: T, endian: Endian) -> Result<Self> {
        let base = inner.stream_position()?;
        Ok(PosWriter { inner, base, pos: 0, endian })
    }

    /// current offset from the start of the container
    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// move to any offset, written or not yet written
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        let n = self.inner.seek(SeekFrom::Start(self.base + offset))?;
        self.pos = n - self.base;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        let endian = self.endian;
        endian.write_u16(self, v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        let endian = self.endian;
        endian.write_u32(self, v)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.write_all(buf)?;
        Ok(())
    }

    /// current position as a 4-byte container offset
    pub fn offset_u32(&self) -> Result<u32> {
        u32::try_from(self.pos)
            .map_err(|_| Error::malformed(format!("offset {} exceeds the 32-bit offset range", self.pos)))
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write> Write for PosWriter<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn slice_codec_boundaries() {
        for &e in &[Endian::Little, Endian::Big] {
            let mut buf = [0u8; 8];
            for &v in &[0u16, 1, 0x1234, u16::MAX] {
                e.put_u16(&mut buf, v);
                assert_eq!(e.get_u16(&buf), v);
            }
            for &v in &[0u32, 1, 0xdead_beef, u32::MAX] {
                e.put_u32(&mut buf, v);
                assert_eq!(e.get_u32(&buf), v);
            }
            for &v in &[0u64, 1, 0x0102_0304_0506_0708, u64::MAX] {
                e.put_u64(&mut buf, v);
                assert_eq!(e.get_u64(&buf), v);
            }
        }
    }

    #[test]
    fn orders_are_not_interchangeable() {
        let mut buf = [0u8; 4];
        Endian::Big.put_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(Endian::Little.get_u32(&buf), 0x0403_0201);

        Endian::Little.put_u16(&mut buf, 0xabcd);
        assert_eq!(&buf[..2], &[0xcd, 0xab]);
    }

    #[test]
    fn stream_codec() {
        let mut out = vec![];
        Endian::Big.write_u16(&mut out, 0x2a).unwrap();
        Endian::Little.write_u32(&mut out, 8).unwrap();
        Endian::Big.write_u64(&mut out, u64::MAX - 1).unwrap();
        assert_eq!(&out[..6], &[0x00, 0x2a, 0x08, 0x00, 0x00, 0x00]);

        let mut c = Cursor::new(out);
        assert_eq!(Endian::Big.read_u16(&mut c).unwrap(), 0x2a);
        assert_eq!(Endian::Little.read_u32(&mut c).unwrap(), 8);
        assert_eq!(Endian::Big.read_u64(&mut c).unwrap(), u64::MAX - 1);
        assert!(Endian::Big.read_u16(&mut c).is_err());
    }

    #[test]
    fn markers() {
        assert_eq!(Endian::from_marker(*b"II"), Some(Endian::Little));
        assert_eq!(Endian::from_marker(*b"MM"), Some(Endian::Big));
        assert_eq!(Endian::from_marker(*b"IM"), None);
        assert_eq!(Endian::Big.marker(), *b"MM");
    }

    #[test]
    fn seek_then_write_patches_in_place() {
        let mut pw = PosWriter::new(Cursor::new(vec![]), Endian::Big).unwrap();
        pw.write_u16(0xffff).unwrap();
        let slot = pw.tell();
        pw.write_u32(0).unwrap();
        pw.write_bytes(b"payload").unwrap();
        let end = pw.tell();
        assert_eq!(end, 13);

        pw.seek_to(slot).unwrap();
        pw.write_u32(6).unwrap();
        pw.seek_to(end).unwrap();
        pw.write_bytes(b"!").unwrap();

        let out = pw.into_inner().into_inner();
        assert_eq!(out, b"\xff\xff\x00\x00\x00\x06payload!".to_vec());
    }

    #[test]
    fn offsets_are_relative_to_start() {
        let mut c = Cursor::new(vec![0xaa; 4]);
        c.seek(SeekFrom::Start(4)).unwrap();
        let mut pw = PosWriter::new(&mut c, Endian::Little).unwrap();
        assert_eq!(pw.tell(), 0);
        pw.write_u16(1).unwrap();
        pw.seek_to(0).unwrap();
        pw.write_u16(2).unwrap();
        assert_eq!(c.into_inner(), vec![0xaa, 0xaa, 0xaa, 0xaa, 0x02, 0x00]);
    }
}
