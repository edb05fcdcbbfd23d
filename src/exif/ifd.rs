use std::collections::HashSet;
use std::io::prelude::*;
use std::io::SeekFrom;

use log::{debug, trace, warn};

use super::field::{FieldType, TagField};
use crate::error::{Error, Result};
use crate::io::{Endian, PosWriter};
use crate::tag;

const ENTRY_LEN: u64 = 12;

/// State shared by every directory read from one container.
pub(crate) struct DecodeContext<'a, R> {
    pub rdr: &'a mut R,
    pub endian: Endian,
    pub len: u64,
    pub strict: bool,
    pub visited: HashSet<u32>,
}

impl<'a, R: Read + Seek> DecodeContext<'a, R> {
    fn seek(&mut self, offset: u32) -> Result<()> {
        if offset as u64 >= self.len {
            return Err(Error::TruncatedInput(format!("offset {} is past the end of a {} byte stream", offset, self.len)));
        }
        self.rdr.seek(SeekFrom::Start(offset as u64))?;
        Ok(())
    }

    /// remember a directory offset, rejecting cycles
    pub fn visit(&mut self, offset: u32) -> Result<()> {
        if !self.visited.insert(offset) {
            return Err(Error::malformed(format!("directory at offset {} is referenced twice", offset)));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct EntryHeader {
    tag: u16,
    field_type: FieldType,
    count: u32,
    slot: [u8; 4],
}

impl EntryHeader {
    /// Ok(None) for an unknown type that lenient decoding skips
    fn decode<R: Read>(rdr: &mut R, endian: Endian, strict: bool) -> Result<Option<Self>> {
        let tag = endian.read_u16(rdr)?;
        let code = endian.read_u16(rdr)?;
        let count = endian.read_u32(rdr)?;
        let mut slot = [0u8; 4];
        rdr.read_exact(&mut slot)?;

        match FieldType::from_code(tag, code) {
            Some(field_type) => Ok(Some(EntryHeader { tag, field_type, count, slot })),
            None if strict => Err(Error::UnsupportedFieldType { tag, code }),
            None => {
                warn!("skipping tag 0x{:04x} with unknown field type {}", tag, code);
                Ok(None)
            }
        }
    }

    fn data_size(&self) -> Result<usize> {
        self.field_type.data_size(self.count).ok_or_else(|| {
            Error::malformed(format!("tag 0x{:04x}: count {} overflows", self.tag, self.count))
        })
    }

    /// child directory offset, if this entry points at one
    fn subifd_offset(&self, endian: Endian) -> Option<u32> {
        let pointer_type = matches!(self.field_type, FieldType::Long | FieldType::Ifd);
        if tag::is_subifd_pointer(self.tag) && pointer_type && self.count == 1 {
            Some(endian.get_u32(&self.slot))
        } else {
            None
        }
    }
}

/// Image file directory - container for a collection of fields
#[derive(Clone, Debug, PartialEq)]
pub struct Ifd {
    /// position in the IFD chain, or the pointer tag for a child directory
    pub id: u16,
    pub fields: Vec<TagField>,
    pub children: Vec<Ifd>,
}

enum Slot {
    Field(usize),
    Child(usize),
}

/// an entry whose 4-byte slot still holds a placeholder
struct Pending {
    slot_pos: u64,
    target: Slot,
}

impl Ifd {
    pub fn new(id: u16) -> Self {
        Ifd { id, fields: vec![], children: vec![] }
    }

    /// read the directory at `offset`, returning it with the offset of the next one
    pub(crate) fn decode<R: Read + Seek>(ctx: &mut DecodeContext<R>, offset: u32, id: u16) -> Result<(Self, u32)> {
        ctx.visit(offset)?;
        ctx.seek(offset)?;

        let endian = ctx.endian;
        let num_entries = endian.read_u16(ctx.rdr)?;
        if offset as u64 + 2 + num_entries as u64 * ENTRY_LEN + 4 > ctx.len {
            return Err(Error::TruncatedInput(format!("directory at {} declares {} entries", offset, num_entries)));
        }

        // headers are contiguous, followed by offset_to_next_ifd and entry data
        let mut hdrs = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            if let Some(h) = EntryHeader::decode(ctx.rdr, endian, ctx.strict)? {
                hdrs.push(h);
            }
        }
        let next = endian.read_u32(ctx.rdr)?;
        debug!("ifd 0x{:x} at {}: {} entries, next {}", id, offset, num_entries, next);

        let mut ifd = Ifd::new(id);
        for h in hdrs {
            // follow known pointers to generate child directories
            match h.subifd_offset(endian) {
                Some(0) => {
                    debug!("tag 0x{:04x}: empty sub-IFD pointer dropped", h.tag);
                    continue;
                }
                Some(child_offset) => {
                    let (child, _) = Ifd::decode(ctx, child_offset, h.tag)?;
                    ifd.children.push(child);
                    continue;
                }
                None => {}
            }

            let size = h.data_size()?;
            let field = if size <= 4 {
                TagField::decoded(h.tag, h.field_type, h.count, h.slot[..size].to_vec(), None, endian)?
            } else {
                let data_offset = endian.get_u32(&h.slot);
                if data_offset as u64 + size as u64 > ctx.len {
                    return Err(Error::TruncatedInput(format!(
                        "tag 0x{:04x}: {} bytes at offset {} run past the end of the stream",
                        h.tag, size, data_offset
                    )));
                }
                let mut v = vec![0u8; size];
                ctx.seek(data_offset)?;
                ctx.rdr.read_exact(&mut v)?;
                TagField::decoded(h.tag, h.field_type, h.count, v, Some(data_offset), endian)?
            };
            trace!("  tag 0x{:04x} {:?} x {}", field.tag(), field.field_type(), field.count());
            ifd.fields.push(field);
        }

        Ok((ifd, next))
    }

    pub fn field(&self, tag: u16) -> Option<&TagField> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    /// add a field, keeping tags ascending, or replace the one with the same tag
    pub fn insert_or_update(&mut self, field: TagField) -> Option<TagField> {
        match self.fields.iter().position(|f| f.tag() == field.tag()) {
            Some(i) => Some(std::mem::replace(&mut self.fields[i], field)),
            None => {
                let i = self.fields.partition_point(|f| f.tag() < field.tag());
                self.fields.insert(i, field);
                None
            }
        }
    }

    pub fn remove(&mut self, tag: u16) -> Option<TagField> {
        let i = self.fields.iter().position(|f| f.tag() == tag)?;
        Some(self.fields.remove(i))
    }

    pub fn child(&self, tag: u16) -> Option<&Ifd> {
        self.children.iter().find(|c| c.id == tag)
    }

    pub fn child_mut_or_insert(&mut self, tag: u16) -> &mut Ifd {
        let i = match self.children.iter().position(|c| c.id == tag) {
            Some(i) => i,
            None => {
                self.children.push(Ifd::new(tag));
                self.children.len() - 1
            }
        };
        &mut self.children[i]
    }

    /// Write this directory at the current position, in two passes:
    /// entries first, with a placeholder slot for anything that does not fit
    /// inline, then each deferred payload (or child directory) appended in
    /// order and its slot patched with the absolute offset it landed at.
    ///
    /// Returns the position of the next-IFD slot, which is left as zero.
    pub fn encode<W: Write + Seek>(&mut self, pw: &mut PosWriter<W>) -> Result<u64> {
        if let Some(f) = self.fields.iter().find(|f| self.child(f.tag()).is_some()) {
            return Err(Error::InvalidPayload(format!(
                "tag 0x{:04x} is both a field and a child directory",
                f.tag()
            )));
        }

        let mut entries: Vec<(u16, Slot)> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.tag(), Slot::Field(i)))
            .chain(self.children.iter().enumerate().map(|(i, c)| (c.id, Slot::Child(i))))
            .collect();
        entries.sort_by_key(|&(tag, _)| tag);

        let num_entries = u16::try_from(entries.len())
            .map_err(|_| Error::InvalidPayload(format!("{} entries do not fit in one directory", entries.len())))?;
        pw.write_u16(num_entries)?;

        // layout phase
        let mut pending = vec![];
        for (_, slot) in entries {
            match slot {
                Slot::Field(i) => {
                    let f = &mut self.fields[i];
                    f.clear_resolved_offset();
                    pw.write_u16(f.tag())?;
                    pw.write_u16(f.field_type().code())?;
                    pw.write_u32(f.count())?;
                    match f.inline_slot() {
                        Some(data) => pw.write_bytes(&data)?,
                        None => {
                            pending.push(Pending { slot_pos: pw.tell(), target: Slot::Field(i) });
                            pw.write_u32(0)?;
                        }
                    }
                }
                Slot::Child(i) => {
                    pw.write_u16(self.children[i].id)?;
                    pw.write_u16(FieldType::Long.code())?;
                    pw.write_u32(1)?;
                    pending.push(Pending { slot_pos: pw.tell(), target: Slot::Child(i) });
                    pw.write_u32(0)?;
                }
            }
        }

        let next_slot = pw.tell();
        pw.write_u32(0)?;

        // append phase
        for p in pending {
            let offset = pw.offset_u32()?;
            match p.target {
                Slot::Field(i) => {
                    let f = &mut self.fields[i];
                    if let Some(payload) = f.payload() {
                        pw.write_bytes(payload)?;
                    }
                    f.set_resolved_offset(offset);
                    trace!("  tag 0x{:04x}: {} bytes at {}", f.tag(), f.bytes().len(), offset);
                }
                Slot::Child(i) => {
                    // children do not chain, their next-IFD slot stays zero
                    self.children[i].encode(pw)?;
                }
            }
            let end = pw.tell();
            pw.seek_to(p.slot_pos)?;
            pw.write_u32(offset)?;
            pw.seek_to(end)?;
        }

        if let Some(f) = self.fields.iter().find(|f| !f.is_inline() && f.resolved_offset().is_none()) {
            return Err(Error::OffsetResolutionFailure { tag: f.tag() });
        }

        debug!("wrote ifd 0x{:x}: {} fields, {} children", self.id, self.fields.len(), self.children.len());
        Ok(next_slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::FieldValue;
    use std::io::Cursor;

    fn decode_one(buf: Vec<u8>, endian: Endian, strict: bool) -> Result<(Ifd, u32)> {
        let len = buf.len() as u64;
        let mut c = Cursor::new(buf);
        let mut ctx = DecodeContext { rdr: &mut c, endian, len, strict, visited: HashSet::new() };
        Ifd::decode(&mut ctx, 0, 0)
    }

    fn sample(endian: Endian) -> Ifd {
        let mut ifd = Ifd::new(0);
        ifd.insert_or_update(TagField::from_value(tag::MODEL, &FieldValue::Ascii("EOS 5D".into()), endian).unwrap());
        ifd.insert_or_update(TagField::from_value(tag::ORIENTATION, &FieldValue::Short(vec![1]), endian).unwrap());
        ifd.insert_or_update(TagField::from_value(tag::MAKE, &FieldValue::Ascii("Canon".into()), endian).unwrap());
        ifd
    }

    #[test]
    fn two_pass_layout() {
        let mut ifd = sample(Endian::Little);
        let mut pw = PosWriter::new(Cursor::new(vec![]), Endian::Little).unwrap();
        let next_slot = ifd.encode(&mut pw).unwrap();
        let out = pw.into_inner().into_inner();

        // 2 + 3 * 12 + 4 = 42 bytes of directory, then "Canon\0" and "EOS 5D\0"
        assert_eq!(next_slot, 38);
        assert_eq!(out.len(), 42 + 6 + 7);
        assert_eq!(&out[0..2], &[3, 0]);

        // entries ascend by tag: make, model, orientation
        assert_eq!(&out[2..4], &[0x0f, 0x01]);
        assert_eq!(&out[10..14], &[42, 0, 0, 0]);
        assert_eq!(&out[14..16], &[0x10, 0x01]);
        assert_eq!(&out[22..26], &[48, 0, 0, 0]);
        assert_eq!(&out[26..28], &[0x12, 0x01]);
        assert_eq!(&out[34..38], &[1, 0, 0, 0]);
        assert_eq!(&out[38..42], &[0, 0, 0, 0]);
        assert_eq!(&out[42..48], b"Canon\0");
        assert_eq!(&out[48..], b"EOS 5D\0");

        assert_eq!(ifd.field(tag::MAKE).unwrap().resolved_offset(), Some(42));
        assert_eq!(ifd.field(tag::MODEL).unwrap().resolved_offset(), Some(48));
        assert_eq!(ifd.field(tag::ORIENTATION).unwrap().resolved_offset(), None);
    }

    #[test]
    fn read_back_in_both_orders() {
        for &endian in &[Endian::Little, Endian::Big] {
            let mut ifd = sample(endian);
            let mut pw = PosWriter::new(Cursor::new(vec![]), endian).unwrap();
            ifd.encode(&mut pw).unwrap();
            let out = pw.into_inner().into_inner();

            let (back, next) = decode_one(out, endian, true).unwrap();
            assert_eq!(next, 0);
            assert_eq!(back, ifd);
            assert_eq!(back.field(tag::MODEL).unwrap().resolved_offset(), Some(48));
            assert_eq!(
                back.field(tag::ORIENTATION).unwrap().value(endian).unwrap(),
                FieldValue::Short(vec![1])
            );
        }
    }

    #[test]
    fn child_directories_are_patched() {
        let endian = Endian::Big;
        let mut ifd = sample(endian);
        ifd.child_mut_or_insert(tag::EXIF_IFD_POINTER)
            .insert_or_update(TagField::maker_note(vec![0x5a; 40]).unwrap());

        let mut pw = PosWriter::new(Cursor::new(vec![]), endian).unwrap();
        ifd.encode(&mut pw).unwrap();
        let out = pw.into_inner().into_inner();

        let (back, _) = decode_one(out, endian, true).unwrap();
        assert_eq!(back, ifd);
        let exif = back.child(tag::EXIF_IFD_POINTER).unwrap();
        assert_eq!(exif.field(tag::MAKER_NOTE).unwrap().bytes(), &[0x5a; 40][..]);
    }

    #[test]
    fn insert_keeps_order_and_replaces() {
        let mut ifd = sample(Endian::Little);
        let tags: Vec<u16> = ifd.fields.iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec![tag::MAKE, tag::MODEL, tag::ORIENTATION]);

        let old = ifd.insert_or_update(TagField::from_value(tag::ORIENTATION, &FieldValue::Short(vec![6]), Endian::Little).unwrap());
        assert!(old.is_some());
        assert_eq!(ifd.fields.len(), 3);
        assert!(ifd.remove(tag::MAKE).is_some());
        assert!(ifd.remove(tag::MAKE).is_none());
    }

    #[test]
    fn unknown_type_strict_and_lenient() {
        // one entry of type 99, then next = 0
        let mut buf = vec![1, 0, 0x34, 0x12, 99, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        buf.extend_from_slice(&[0, 0, 0, 0]);

        match decode_one(buf.clone(), Endian::Little, true) {
            Err(Error::UnsupportedFieldType { tag: 0x1234, code: 99 }) => {}
            r => panic!("unexpected {:?}", r),
        }
        let (ifd, _) = decode_one(buf, Endian::Little, false).unwrap();
        assert!(ifd.fields.is_empty());
    }

    #[test]
    fn payload_past_end_is_truncated() {
        // ascii x 20 at offset 100 in an 18 byte stream
        let mut buf = vec![1, 0, 0x0f, 0x01, 2, 0, 20, 0, 0, 0, 100, 0, 0, 0];
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(decode_one(buf, Endian::Little, true), Err(Error::TruncatedInput(_))));
    }

    #[test]
    fn pointer_loop_is_malformed() {
        // exif pointer to 18, whose gps pointer leads back to 18
        let mut buf = vec![1, 0, 0x69, 0x87, 4, 0, 1, 0, 0, 0, 18, 0, 0, 0];
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&[1, 0, 0x25, 0x88, 4, 0, 1, 0, 0, 0, 18, 0, 0, 0]);
        buf.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(decode_one(buf, Endian::Little, true), Err(Error::MalformedContainer(_))));
    }

    #[test]
    fn zero_pointer_is_absent() {
        // exif pointer of 0 next to an orientation entry
        let mut buf = vec![2, 0];
        buf.extend_from_slice(&[0x12, 0x01, 3, 0, 1, 0, 0, 0, 6, 0, 0, 0]);
        buf.extend_from_slice(&[0x69, 0x87, 4, 0, 1, 0, 0, 0, 0, 0, 0, 0]);
        buf.extend_from_slice(&[0, 0, 0, 0]);

        let (ifd, _) = decode_one(buf, Endian::Little, true).unwrap();
        assert!(ifd.children.is_empty());
        assert!(ifd.field(tag::EXIF_IFD_POINTER).is_none());
        assert_eq!(ifd.field(tag::ORIENTATION).unwrap().value(Endian::Little).unwrap(), FieldValue::Short(vec![6]));
    }

    #[test]
    fn field_shadowing_child_is_rejected() {
        let mut ifd = sample(Endian::Little);
        ifd.child_mut_or_insert(tag::EXIF_IFD_POINTER);
        ifd.insert_or_update(TagField::from_value(tag::EXIF_IFD_POINTER, &FieldValue::Long(vec![5000]), Endian::Little).unwrap());

        let mut pw = PosWriter::new(Cursor::new(vec![]), Endian::Little).unwrap();
        assert!(matches!(ifd.encode(&mut pw), Err(Error::InvalidPayload(_))));
        assert!(pw.into_inner().into_inner().is_empty());
    }
}
