use std::io;
use std::io::prelude::*;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::io::Endian;
use crate::tag::{self, TagDictionary};

/// Default number of bytes rendered by `TagField::describe`.
pub const MAX_PREVIEW_LEN: usize = 10;

/// Wire type of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    SignedByte,
    Undefined,
    SignedShort,
    SignedLong,
    SignedRational,
    Float,
    Double,
    Ifd,
    /// vendor blob on the MakerNote tag, undefined on the wire
    MakerNote,
}

impl FieldType {
    pub fn from_code(tag: u16, code: u16) -> Option<Self> {
        use self::FieldType::*;
        Some(match code {
            1 => Byte,
            2 => Ascii,
            3 => Short,
            4 => Long,
            5 => Rational,
            6 => SignedByte,
            7 if tag == tag::MAKER_NOTE => MakerNote,
            7 => Undefined,
            8 => SignedShort,
            9 => SignedLong,
            10 => SignedRational,
            11 => Float,
            12 => Double,
            13 => Ifd,
            _ => return None,
        })
    }

    pub fn code(self) -> u16 {
        use self::FieldType::*;
        match self {
            Byte => 1,
            Ascii => 2,
            Short => 3,
            Long => 4,
            Rational => 5,
            SignedByte => 6,
            Undefined | MakerNote => 7,
            SignedShort => 8,
            SignedLong => 9,
            SignedRational => 10,
            Float => 11,
            Double => 12,
            Ifd => 13,
        }
    }

    /// size in bytes of one unit of this type
    pub fn unit_size(self) -> usize {
        use self::FieldType::*;
        match self {
            Byte | Ascii | SignedByte | Undefined | MakerNote => 1,
            Short | SignedShort => 2,
            Long | SignedLong | Float | Ifd => 4,
            Rational | SignedRational | Double => 8,
        }
    }

    /// total payload size, or None if it does not fit in memory
    pub fn data_size(self, count: u32) -> Option<usize> {
        (count as usize).checked_mul(self.unit_size())
    }
}

#[derive(Clone, Debug)]
enum FieldData {
    /// left-justified, zero padded
    Inline([u8; 4]),
    OutOfLine(Vec<u8>),
}

/// One entry of a tag directory.
///
/// Data of up to 4 bytes lives in the entry itself, anything larger is
/// stored out of line and referenced by an absolute offset that is only
/// known once the directory has been written.
#[derive(Clone, Debug)]
pub struct TagField {
    tag: u16,
    field_type: FieldType,
    count: u32,
    data: FieldData,
    offset: Option<u32>,
    /// byte order the data was encoded in, when known
    endian: Option<Endian>,
}

impl TagField {
    /// Build a field from raw bytes. Multi-byte values are taken to be in
    /// the byte order of whichever container the field ends up in.
    pub fn new(tag: u16, field_type: FieldType, count: u32, bytes: Vec<u8>) -> Result<Self> {
        let expected = field_type.data_size(count);
        if expected != Some(bytes.len()) {
            return Err(Error::InvalidPayload(format!(
                "tag 0x{:04x}: {} bytes given for {} x {:?}",
                tag,
                bytes.len(),
                count,
                field_type
            )));
        }

        let data = if bytes.len() <= 4 {
            let mut slot = [0u8; 4];
            slot[..bytes.len()].copy_from_slice(&bytes);
            FieldData::Inline(slot)
        } else {
            FieldData::OutOfLine(bytes)
        };

        Ok(TagField { tag, field_type, count, data, offset: None, endian: None })
    }

    pub fn from_value(tag: u16, value: &FieldValue, endian: Endian) -> Result<Self> {
        let bytes = value.encode(endian)?;
        let mut f = TagField::new(tag, value.field_type(), value.count(), bytes)?;
        f.endian = Some(endian);
        Ok(f)
    }

    pub fn maker_note(data: Vec<u8>) -> Result<Self> {
        let count = u32::try_from(data.len())
            .map_err(|_| Error::InvalidPayload("maker note larger than 4 GiB".into()))?;
        TagField::new(tag::MAKER_NOTE, FieldType::MakerNote, count, data)
    }

    pub(crate) fn decoded(
        tag: u16,
        field_type: FieldType,
        count: u32,
        bytes: Vec<u8>,
        offset: Option<u32>,
        endian: Endian,
    ) -> Result<Self> {
        let mut f = TagField::new(tag, field_type, count, bytes)?;
        f.offset = offset;
        f.endian = Some(endian);
        Ok(f)
    }

    /// The same field with its data in `endian`. Single-byte types and
    /// fields already in that order come back unchanged.
    pub fn to_endian(self, endian: Endian) -> Result<Self> {
        match self.endian {
            Some(from) if from != endian && self.field_type.unit_size() > 1 => {
                let bytes = self.value(from)?.encode(endian)?;
                let mut f = TagField::new(self.tag, self.field_type, self.count, bytes)?;
                f.endian = Some(endian);
                Ok(f)
            }
            _ => Ok(TagField { endian: Some(endian), ..self }),
        }
    }

    pub fn tag(&self) -> u16 {
        self.tag
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// None for fields built from raw bytes
    pub fn endian(&self) -> Option<Endian> {
        self.endian
    }

    /// true when the data is held in the directory slot
    pub fn is_inline(&self) -> bool {
        matches!(self.data, FieldData::Inline(_))
    }

    /// the field's data, without inline padding
    pub fn bytes(&self) -> &[u8] {
        match self.data {
            FieldData::Inline(ref slot) => &slot[..self.size()],
            FieldData::OutOfLine(ref v) => v,
        }
    }

    fn size(&self) -> usize {
        self.field_type.unit_size() * self.count as usize
    }

    /// absolute offset of out-of-line data, once written (or as read)
    pub fn resolved_offset(&self) -> Option<u32> {
        match self.data {
            FieldData::Inline(_) => None,
            FieldData::OutOfLine(_) => self.offset,
        }
    }

    pub(crate) fn inline_slot(&self) -> Option<[u8; 4]> {
        match self.data {
            FieldData::Inline(slot) => Some(slot),
            FieldData::OutOfLine(_) => None,
        }
    }

    pub(crate) fn payload(&self) -> Option<&[u8]> {
        match self.data {
            FieldData::Inline(_) => None,
            FieldData::OutOfLine(ref v) => Some(v),
        }
    }

    pub(crate) fn set_resolved_offset(&mut self, offset: u32) {
        self.offset = Some(offset);
    }

    pub(crate) fn clear_resolved_offset(&mut self) {
        self.offset = None;
    }

    pub fn value(&self, endian: Endian) -> Result<FieldValue> {
        FieldValue::decode(self.tag, self.field_type, self.count, self.bytes(), endian)
    }

    /// hex rendering of at most `max` bytes of the data
    pub fn preview(&self, max: usize) -> String {
        let bytes = self.bytes();
        let mut s = bytes
            .iter()
            .take(max)
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" ");
        if bytes.len() > max {
            s.push_str("...");
        }
        s
    }

    pub fn display_name(&self, dict: &dyn TagDictionary) -> String {
        match dict.lookup(self.tag) {
            Some(info) => info.name.to_string(),
            None => format!("Unknown(0x{:04x})", self.tag),
        }
    }

    pub fn describe(&self, dict: &dyn TagDictionary) -> String {
        format!(
            "{} [{:?} x {}]: {}",
            self.display_name(dict),
            self.field_type,
            self.count,
            self.preview(MAX_PREVIEW_LEN)
        )
    }
}

/// Equality ignores where the data happened to be placed and which byte
/// order it was recorded in.
impl PartialEq for TagField {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.field_type == other.field_type
            && self.count == other.count
            && self.bytes() == other.bytes()
    }
}

/// Typed view of a field's data
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SignedByte(Vec<i8>),
    Undefined(Vec<u8>), // or vendor specific
    SignedShort(Vec<i16>),
    SignedLong(Vec<i32>),
    SignedRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        use self::FieldValue::*;
        match *self {
            Byte(_) => FieldType::Byte,
            Ascii(_) => FieldType::Ascii,
            Short(_) => FieldType::Short,
            Long(_) => FieldType::Long,
            Rational(_) => FieldType::Rational,
            SignedByte(_) => FieldType::SignedByte,
            Undefined(_) => FieldType::Undefined,
            SignedShort(_) => FieldType::SignedShort,
            SignedLong(_) => FieldType::SignedLong,
            SignedRational(_) => FieldType::SignedRational,
            Float(_) => FieldType::Float,
            Double(_) => FieldType::Double,
        }
    }

    /// number of type-units, including the NUL of an ascii string
    pub fn count(&self) -> u32 {
        use self::FieldValue::*;
        let n = match *self {
            Byte(ref v) | Undefined(ref v) => v.len(),
            Ascii(ref v) => v.len() + 1,
            Short(ref v) => v.len(),
            Long(ref v) => v.len(),
            Rational(ref v) => v.len(),
            SignedByte(ref v) => v.len(),
            SignedShort(ref v) => v.len(),
            SignedLong(ref v) => v.len(),
            SignedRational(ref v) => v.len(),
            Float(ref v) => v.len(),
            Double(ref v) => v.len(),
        };
        n as u32
    }

    pub fn encode(&self, endian: Endian) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.count() as usize * self.field_type().unit_size());
        match endian {
            Endian::Little => self.encode_as::<_, LittleEndian>(&mut buf)?,
            Endian::Big => self.encode_as::<_, BigEndian>(&mut buf)?,
        }
        Ok(buf)
    }

    fn encode_as<W: Write, B: ByteOrder>(&self, w: &mut W) -> io::Result<()> {
        use self::FieldValue::*;
        match *self {
            Byte(ref v) | Undefined(ref v) => w.write_all(v)?,
            Ascii(ref v) => {
                w.write_all(v.as_bytes())?;
                w.write_all(b"\0")?;
            }
            Short(ref v) => for d in v { w.write_u16::<B>(*d)?; },
            Long(ref v) => for d in v { w.write_u32::<B>(*d)?; },
            Rational(ref v) => for &(n, d) in v {
                w.write_u32::<B>(n)?;
                w.write_u32::<B>(d)?;
            },
            SignedByte(ref v) => for d in v { w.write_i8(*d)?; },
            SignedShort(ref v) => for d in v { w.write_i16::<B>(*d)?; },
            SignedLong(ref v) => for d in v { w.write_i32::<B>(*d)?; },
            SignedRational(ref v) => for &(n, d) in v {
                w.write_i32::<B>(n)?;
                w.write_i32::<B>(d)?;
            },
            Float(ref v) => for d in v { w.write_f32::<B>(*d)?; },
            Double(ref v) => for d in v { w.write_f64::<B>(*d)?; },
        }
        Ok(())
    }

    pub fn decode(tag: u16, field_type: FieldType, count: u32, bytes: &[u8], endian: Endian) -> Result<Self> {
        match endian {
            Endian::Little => Self::decode_as::<LittleEndian>(tag, field_type, count, bytes),
            Endian::Big => Self::decode_as::<BigEndian>(tag, field_type, count, bytes),
        }
    }

    fn decode_as<B: ByteOrder>(tag: u16, field_type: FieldType, count: u32, bytes: &[u8]) -> Result<Self> {
        if field_type.data_size(count) != Some(bytes.len()) {
            return Err(Error::malformed(format!("tag 0x{:04x}: count {} does not match {} data bytes", tag, count, bytes.len())));
        }

        let n = count as usize;
        let mut c = io::Cursor::new(bytes);
        let v = match field_type {
            FieldType::Byte => FieldValue::Byte(bytes.to_vec()),
            FieldType::Ascii => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                FieldValue::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            FieldType::Short => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_u16::<B>()?); }
                FieldValue::Short(v)
            }
            FieldType::Long | FieldType::Ifd => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_u32::<B>()?); }
                FieldValue::Long(v)
            }
            FieldType::Rational => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push((c.read_u32::<B>()?, c.read_u32::<B>()?)); }
                FieldValue::Rational(v)
            }
            FieldType::SignedByte => FieldValue::SignedByte(bytes.iter().map(|&b| b as i8).collect()),
            FieldType::Undefined | FieldType::MakerNote => FieldValue::Undefined(bytes.to_vec()),
            FieldType::SignedShort => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_i16::<B>()?); }
                FieldValue::SignedShort(v)
            }
            FieldType::SignedLong => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_i32::<B>()?); }
                FieldValue::SignedLong(v)
            }
            FieldType::SignedRational => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push((c.read_i32::<B>()?, c.read_i32::<B>()?)); }
                FieldValue::SignedRational(v)
            }
            FieldType::Float => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_f32::<B>()?); }
                FieldValue::Float(v)
            }
            FieldType::Double => {
                let mut v = Vec::with_capacity(n);
                for _ in 0..n { v.push(c.read_f64::<B>()?); }
                FieldValue::Double(v)
            }
        };
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::BaselineTags;

    #[test]
    fn inline_threshold() {
        let f = TagField::from_value(tag::ORIENTATION, &FieldValue::Short(vec![6]), Endian::Big).unwrap();
        assert!(f.is_inline());
        assert_eq!(f.inline_slot(), Some([0x00, 0x06, 0x00, 0x00]));
        assert_eq!(f.bytes(), &[0x00, 0x06]);

        // exactly four bytes stays inline
        let f = TagField::from_value(tag::MAKE, &FieldValue::Ascii("abc".into()), Endian::Big).unwrap();
        assert!(f.is_inline());
        assert_eq!(f.count(), 4);

        let f = TagField::from_value(tag::MAKE, &FieldValue::Ascii("abcd".into()), Endian::Big).unwrap();
        assert!(!f.is_inline());
        assert_eq!(f.payload(), Some(&b"abcd\0"[..]));
        assert_eq!(f.resolved_offset(), None);
    }

    #[test]
    fn empty_field_is_inline_zeroes() {
        let f = TagField::new(0x1234, FieldType::Undefined, 0, vec![]).unwrap();
        assert!(f.is_inline());
        assert_eq!(f.inline_slot(), Some([0; 4]));
        assert!(f.bytes().is_empty());
    }

    #[test]
    fn count_must_match_bytes() {
        let e = TagField::new(0x1234, FieldType::Short, 3, vec![0; 4]).unwrap_err();
        assert!(matches!(e, Error::InvalidPayload(_)));
    }

    #[test]
    fn values_in_both_orders() {
        let values = vec![
            FieldValue::Short(vec![0, 1, u16::MAX]),
            FieldValue::Long(vec![u32::MAX, 7]),
            FieldValue::Rational(vec![(72, 1), (1, 3)]),
            FieldValue::SignedShort(vec![i16::MIN, -1]),
            FieldValue::SignedLong(vec![i32::MIN]),
            FieldValue::SignedRational(vec![(-1, 2)]),
            FieldValue::SignedByte(vec![-128, 127]),
            FieldValue::Float(vec![1.5]),
            FieldValue::Double(vec![-0.25, 1e10]),
            FieldValue::Ascii("Canon".into()),
        ];
        for &e in &[Endian::Little, Endian::Big] {
            for v in &values {
                let f = TagField::from_value(0x0100, v, e).unwrap();
                assert_eq!(&f.value(e).unwrap(), v);
            }
        }
    }

    #[test]
    fn rational_layout() {
        let b = FieldValue::Rational(vec![(1, 2)]).encode(Endian::Big).unwrap();
        assert_eq!(b, vec![0, 0, 0, 1, 0, 0, 0, 2]);
        let l = FieldValue::Rational(vec![(1, 2)]).encode(Endian::Little).unwrap();
        assert_eq!(l, vec![1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn maker_note_type() {
        assert_eq!(FieldType::from_code(tag::MAKER_NOTE, 7), Some(FieldType::MakerNote));
        assert_eq!(FieldType::from_code(tag::USER_COMMENT, 7), Some(FieldType::Undefined));
        assert_eq!(FieldType::MakerNote.code(), 7);
        assert_eq!(FieldType::from_code(0, 99), None);

        let f = TagField::maker_note(b"Nikon\0\x02\x10".to_vec()).unwrap();
        assert_eq!(f.field_type(), FieldType::MakerNote);
        assert_eq!(f.value(Endian::Little).unwrap(), FieldValue::Undefined(b"Nikon\0\x02\x10".to_vec()));
    }

    #[test]
    fn bounded_preview() {
        let f = TagField::maker_note((0u8..32).collect()).unwrap();
        assert_eq!(f.preview(4), "00 01 02 03...");
        assert_eq!(f.describe(&BaselineTags), "MakerNote [MakerNote x 32]: 00 01 02 03 04 05 06 07 08 09...");

        let f = TagField::new(0xbeef, FieldType::Byte, 2, vec![0xab, 0xcd]).unwrap();
        assert_eq!(f.preview(MAX_PREVIEW_LEN), "ab cd");
        assert_eq!(f.display_name(&BaselineTags), "Unknown(0xbeef)");
    }

    #[test]
    fn equality_ignores_placement() {
        let a = TagField::decoded(0x10f, FieldType::Ascii, 6, b"Canon\0".to_vec(), Some(100), Endian::Little).unwrap();
        let mut b = TagField::from_value(0x10f, &FieldValue::Ascii("Canon".into()), Endian::Little).unwrap();
        assert_eq!(a, b);
        b.set_resolved_offset(8);
        assert_eq!(a, b);
        assert_eq!(b.resolved_offset(), Some(8));
    }

    #[test]
    fn transcode_byte_order() {
        let f = TagField::from_value(tag::ORIENTATION, &FieldValue::Short(vec![6]), Endian::Little).unwrap();
        assert_eq!(f.endian(), Some(Endian::Little));
        assert_eq!(f.bytes(), &[0x06, 0x00]);

        let f = f.to_endian(Endian::Big).unwrap();
        assert_eq!(f.endian(), Some(Endian::Big));
        assert_eq!(f.bytes(), &[0x00, 0x06]);
        assert_eq!(f.value(Endian::Big).unwrap(), FieldValue::Short(vec![6]));

        let r = TagField::from_value(tag::X_RESOLUTION, &FieldValue::Rational(vec![(300, 1)]), Endian::Big).unwrap();
        let r = r.to_endian(Endian::Little).unwrap();
        assert_eq!(r.bytes(), &[0x2c, 0x01, 0, 0, 1, 0, 0, 0]);

        // raw bytes and single byte types are left alone
        let raw = TagField::new(tag::ORIENTATION, FieldType::Short, 1, vec![0x00, 0x03]).unwrap();
        assert_eq!(raw.endian(), None);
        assert_eq!(raw.to_endian(Endian::Little).unwrap().bytes(), &[0x00, 0x03]);
        let s = TagField::from_value(tag::MAKE, &FieldValue::Ascii("Canon".into()), Endian::Little).unwrap();
        assert_eq!(s.to_endian(Endian::Big).unwrap().bytes(), b"Canon\0");
    }
}
