//! GIF block stream: metadata extraction and rewriting.
//!
//! https://www.w3.org/Graphics/GIF/spec-gif89a.txt
//!
//! Comments live in comment extensions, XMP in an application extension
//! identified as "XMP Data" / "XMP". Image data is passed through untouched.

mod block;
mod scanner;

pub use self::block::{
    color_table_len, ApplicationExtension, Block, Comment, DisposalMethod, GraphicControl, ImageFrame,
    ScreenDescriptor, SubBlocks, MAGIC_TRAILER, XMP_APP_ID, XMP_AUTH_CODE,
};
pub use self::scanner::{Mode, Scanner, State};

use std::io::prelude::*;

use log::debug;

use crate::error::Result;
use crate::meta::{Comments, Metadata, MetadataKind, MetadataMap};
use crate::Options;

/// Collect comments and the XMP packet from a GIF stream.
///
/// A structural error anywhere in the stream fails the whole read; no
/// partially collected metadata is returned.
pub fn read_metadata<R: Read>(rdr: R, opts: &Options) -> Result<MetadataMap> {
    let mut scanner = Scanner::new(rdr, Mode::Scan).require_trailer(opts.require_trailer);
    let mut comments = Comments::default();
    let mut xmp = None;

    while let Some(block) = scanner.next_block()? {
        match block {
            Block::Comment(c) => comments.push(c.bytes()),
            Block::Application(ref app) if app.is_xmp() => {
                if let Some(packet) = app.xmp_packet() {
                    xmp = Some(packet);
                }
            }
            _ => {}
        }
    }

    let mut map = MetadataMap::new();
    if !comments.is_empty() {
        map.insert(MetadataKind::Comment, Metadata::Comments(comments));
    }
    if let Some(packet) = xmp {
        map.insert(MetadataKind::Xmp, Metadata::Xmp(packet));
    }
    debug!("gif metadata: {:?}", map.keys().collect::<Vec<_>>());
    Ok(map)
}

/// Re-emit a stream without changes.
pub fn copy<R: Read, W: Write>(rdr: R, w: &mut W, opts: &Options) -> Result<()> {
    rewrite_blocks(rdr, w, opts, &[], false)
}

/// Insert one comment extension per string right after the global palette.
/// Existing comments are kept.
pub fn insert_comments<R: Read, W: Write, S: AsRef<str>>(rdr: R, w: &mut W, comments: &[S], opts: &Options) -> Result<()> {
    let blocks: Vec<Block> = comments
        .iter()
        .map(|c| Block::Comment(Comment::new(c.as_ref())))
        .collect();
    rewrite_blocks(rdr, w, opts, &blocks, false)
}

/// Replace any XMP application extension with `xmp`, placed right after the
/// global palette. `None` only strips the existing packet.
pub fn insert_xmp<R: Read, W: Write>(rdr: R, w: &mut W, xmp: Option<&[u8]>, opts: &Options) -> Result<()> {
    let blocks = match xmp {
        Some(packet) => vec![Block::Application(ApplicationExtension::new_xmp(packet)?)],
        None => vec![],
    };
    rewrite_blocks(rdr, w, opts, &blocks, true)
}

/// Copy every block from `rdr`, emitting `inserted` once the header, screen
/// descriptor and global palette have been copied. The output is assembled
/// in memory and only written to `w` once the whole stream has been read.
fn rewrite_blocks<R: Read, W: Write>(rdr: R, w: &mut W, opts: &Options, inserted: &[Block], drop_xmp: bool) -> Result<()> {
    let mut scanner = Scanner::new(rdr, Mode::Copy).require_trailer(opts.require_trailer);
    let mut out = vec![];
    let mut pending = Some(inserted);

    while let Some(block) = scanner.next_block()? {
        match block {
            Block::Application(ref app) if drop_xmp && app.is_xmp() => {
                debug!("dropping existing xmp block");
            }
            // extensions need 89a
            Block::Header(ref sig) if !inserted.is_empty() && sig == b"GIF87a" => {
                debug!("upgrading GIF87a header to GIF89a");
                out.extend_from_slice(b"GIF89a");
            }
            ref b => b.write_to(&mut out)?,
        }

        if scanner.state() == State::BlockLoop {
            if let Some(blocks) = pending.take() {
                for b in blocks {
                    b.write_to(&mut out)?;
                }
            }
        }
    }

    w.write_all(&out)?;
    Ok(())
}
