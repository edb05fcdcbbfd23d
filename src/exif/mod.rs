//! TIFF-structured tag directories, as found in TIFF files and Exif blobs.

mod field;
mod ifd;

pub use self::field::{FieldType, FieldValue, TagField, MAX_PREVIEW_LEN};
pub use self::ifd::Ifd;

use std::collections::HashSet;
use std::io::prelude::*;
use std::io::Cursor;

use log::debug;

use self::ifd::DecodeContext;
use crate::error::{Error, Result};
use crate::io::{Endian, PosWriter};
use crate::tag;
use crate::Options;

const TIFF_MAGIC: u16 = 42;
const HEADER_LEN: u32 = 8;

/// top level data structure representing an entire exif document
#[derive(Clone, Debug, PartialEq)]
pub struct Exif {
    pub endian: Endian,
    pub ifds: Vec<Ifd>,
}

impl Exif {
    /// an empty document with a single, empty IFD0
    pub fn new(endian: Endian) -> Self {
        Exif { endian, ifds: vec![Ifd::new(0)] }
    }

    /// extract Exif from the given reader, which must be positioned at the header
    pub fn decode<R: Read>(rdr: &mut R, opts: &Options) -> Result<Self> {
        // offsets are relative to the header, so work on the tail of the stream
        let mut body = vec![];
        rdr.read_to_end(&mut body)?;
        Exif::from_bytes(&body, opts)
    }

    pub fn from_bytes(buf: &[u8], opts: &Options) -> Result<Self> {
        if buf.len() < HEADER_LEN as usize {
            return Err(Error::TruncatedInput(format!("{} bytes is too short for a tiff header", buf.len())));
        }

        let endian = Endian::from_marker([buf[0], buf[1]])
            .ok_or_else(|| Error::malformed("invalid endianness marker"))?;
        if endian.get_u16(&buf[2..]) != TIFF_MAGIC {
            return Err(Error::malformed("missing tiff magic number"));
        }
        let mut offset = endian.get_u32(&buf[4..]);

        let mut rdr = Cursor::new(buf);
        let mut ctx = DecodeContext {
            rdr: &mut rdr,
            endian,
            len: buf.len() as u64,
            strict: opts.strict_field_types,
            visited: HashSet::new(),
        };

        let mut ifds = vec![];
        // a zero offset ends the chain
        for i in 0u16.. {
            if offset == 0 {
                break;
            }
            let (ifd, next) = Ifd::decode(&mut ctx, offset, i)?;
            ifds.push(ifd);
            offset = next;
        }

        debug!("decoded {:?} endian exif with {} ifds", endian, ifds.len());
        Ok(Exif { endian, ifds })
    }

    /// Write the document to the given writer in its own byte order.
    ///
    /// Only the directory structure is written; image data referenced by
    /// offset fields (strips, tiles, thumbnails) is not carried along.
    pub fn encode<W: Write + Seek>(&mut self, w: &mut W) -> Result<()> {
        let mut pw = PosWriter::new(w, self.endian)?;
        pw.write_bytes(&self.endian.marker())?;
        pw.write_u16(TIFF_MAGIC)?;
        pw.write_u32(if self.ifds.is_empty() { 0 } else { HEADER_LEN })?;

        let mut prev_next_slot = None;
        for ifd in self.ifds.iter_mut() {
            // link the previous directory to this one now that we know where it is
            if let Some(slot) = prev_next_slot {
                let here = pw.offset_u32()?;
                pw.seek_to(slot)?;
                pw.write_u32(here)?;
                pw.seek_to(here as u64)?;
            }
            prev_next_slot = Some(ifd.encode(&mut pw)?);
        }

        Ok(())
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut c = Cursor::new(vec![]);
        self.encode(&mut c)?;
        Ok(c.into_inner())
    }

    /// first field with this tag, searching each IFD and then its children
    pub fn field(&self, tag: u16) -> Option<&TagField> {
        self.ifds.iter().find_map(|ifd| {
            ifd.field(tag)
                .or_else(|| ifd.children.iter().find_map(|c| c.field(tag)))
        })
    }

    /// Add or replace a field. Maker notes go to the Exif sub-IFD, which is
    /// created if needed, everything else to IFD0.
    ///
    /// Fields encoded in the other byte order are converted to this
    /// document's. Sub-IFD pointer tags are managed through `Ifd::children`
    /// and cannot be set as plain fields.
    pub fn insert_or_update_field(&mut self, field: TagField) -> Result<Option<TagField>> {
        if tag::is_subifd_pointer(field.tag()) {
            return Err(Error::InvalidPayload(format!(
                "tag 0x{:04x} points at a sub-IFD and cannot be set directly",
                field.tag()
            )));
        }
        let field = field.to_endian(self.endian)?;

        if self.ifds.is_empty() {
            self.ifds.push(Ifd::new(0));
        }
        let ifd0 = &mut self.ifds[0];
        let prev = if field.field_type() == FieldType::MakerNote {
            ifd0.child_mut_or_insert(tag::EXIF_IFD_POINTER).insert_or_update(field)
        } else {
            ifd0.insert_or_update(field)
        };
        Ok(prev)
    }

    /// the XMP packet stored in IFD0, if any
    pub fn xmp(&self) -> Option<&[u8]> {
        self.ifds.first()?.field(tag::XMP).map(|f| f.bytes())
    }

    pub fn set_xmp(&mut self, xmp: Option<&[u8]>) -> Result<()> {
        match xmp {
            Some(packet) => {
                let field = TagField::from_value(tag::XMP, &FieldValue::Byte(packet.to_vec()), self.endian)?;
                self.insert_or_update_field(field)?;
            }
            None => {
                if let Some(ifd0) = self.ifds.first_mut() {
                    ifd0.remove(tag::XMP);
                }
            }
        }
        Ok(())
    }
}
