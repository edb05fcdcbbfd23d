//! Read and rewrite embedded image metadata without touching image data.
//!
//! Two containers are supported:
//!
//! - TIFF-structured tag directories (TIFF files, Exif blobs), where small
//!   values live inline in a directory entry and larger ones are stored out
//!   of line behind an absolute offset.
//! - GIF block streams, where comments and XMP live in extension blocks.
//!
//! ```
//! use std::io::Cursor;
//! use imagemeta::{read_metadata, rewrite, Metadata, MetadataKind, Operation};
//!
//! let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00\x3b";
//! let mut out = vec![];
//! rewrite(&mut Cursor::new(&gif[..]), &mut out, &Operation::InsertComments(vec!["hi".into()])).unwrap();
//!
//! let map = read_metadata(&mut Cursor::new(&out)).unwrap();
//! match map.get(&MetadataKind::Comment) {
//!     Some(Metadata::Comments(c)) => assert_eq!(c.texts(), vec!["hi"]),
//!     _ => unreachable!(),
//! }
//! ```

pub mod error;
pub mod exif;
pub mod gif;
pub mod io;
mod meta;
pub mod tag;

pub use self::error::{Error, Result};
pub use self::exif::{Exif, FieldType, FieldValue, Ifd, TagField};
pub use self::io::{Endian, PosWriter};
pub use self::meta::{Comments, Metadata, MetadataKind, MetadataMap, Operation};

use std::io::prelude::*;
use std::io::{Cursor, SeekFrom};

use log::debug;

/// Knobs for reading and rewriting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// fail on unknown tag field types instead of skipping the entry
    pub strict_field_types: bool,
    /// fail when a GIF stream ends without its trailer byte
    pub require_trailer: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options { strict_field_types: true, require_trailer: false }
    }
}

/// Container kinds recognized from their first bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Container {
    Gif,
    Tiff,
}

impl Container {
    pub fn detect(magic: &[u8]) -> Option<Self> {
        if magic.starts_with(b"GIF8") {
            Some(Container::Gif)
        } else if magic.starts_with(b"II*\0") || magic.starts_with(b"MM\0*") {
            Some(Container::Tiff)
        } else {
            None
        }
    }

    fn name(self) -> &'static str {
        match self {
            Container::Gif => "gif",
            Container::Tiff => "tiff",
        }
    }
}

/// sniff the container type, leaving the reader where it was
fn sniff<R: Read + Seek>(rdr: &mut R) -> Result<Container> {
    let start = rdr.stream_position()?;
    let mut magic = Vec::with_capacity(4);
    rdr.by_ref().take(4).read_to_end(&mut magic)?;
    rdr.seek(SeekFrom::Start(start))?;

    let container = Container::detect(&magic)
        .ok_or_else(|| Error::MalformedContainer("unrecognized container signature".into()))?;
    debug!("detected {} container", container.name());
    Ok(container)
}

/// Extract every supported kind of metadata from a GIF or TIFF/Exif stream.
pub fn read_metadata<R: Read + Seek>(rdr: &mut R) -> Result<MetadataMap> {
    read_metadata_with(rdr, &Options::default())
}

pub fn read_metadata_with<R: Read + Seek>(rdr: &mut R, opts: &Options) -> Result<MetadataMap> {
    match sniff(rdr)? {
        Container::Gif => gif::read_metadata(rdr, opts),
        Container::Tiff => {
            let exif = Exif::decode(rdr, opts)?;
            let mut map = MetadataMap::new();
            if let Some(xmp) = exif.xmp() {
                map.insert(MetadataKind::Xmp, Metadata::Xmp(xmp.to_vec()));
            }
            map.insert(MetadataKind::Exif, Metadata::Exif(exif));
            Ok(map)
        }
    }
}

/// Apply `op` to the container read from `rdr`, writing the complete result
/// to `w`. Nothing is written if the operation fails.
pub fn rewrite<R: Read + Seek, W: Write>(rdr: &mut R, w: &mut W, op: &Operation) -> Result<()> {
    rewrite_with(rdr, w, op, &Options::default())
}

pub fn rewrite_with<R: Read + Seek, W: Write>(rdr: &mut R, w: &mut W, op: &Operation, opts: &Options) -> Result<()> {
    let container = sniff(rdr)?;
    match (container, op) {
        (Container::Gif, Operation::InsertComments(comments)) => gif::insert_comments(rdr, w, comments.as_slice(), opts),
        (Container::Gif, Operation::InsertOrReplaceXmp(xmp)) => gif::insert_xmp(rdr, w, xmp.as_deref(), opts),
        (Container::Tiff, Operation::InsertOrReplaceXmp(xmp)) => {
            let mut exif = Exif::decode(rdr, opts)?;
            exif.set_xmp(xmp.as_deref())?;
            write_exif(&mut exif, w)
        }
        (Container::Tiff, Operation::InsertOrUpdateField(field)) => {
            let mut exif = Exif::decode(rdr, opts)?;
            debug!("setting {}", field.describe(&tag::BaselineTags));
            exif.insert_or_update_field(field.clone())?;
            write_exif(&mut exif, w)
        }
        (container, op) => Err(Error::UnsupportedOperation {
            operation: op.name(),
            container: container.name(),
        }),
    }
}

fn write_exif<W: Write>(exif: &mut Exif, w: &mut W) -> Result<()> {
    let mut buf = Cursor::new(vec![]);
    exif.encode(&mut buf)?;
    w.write_all(buf.get_ref())?;
    Ok(())
}
