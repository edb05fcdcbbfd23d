use std::io;
use std::io::prelude::*;

use log::{trace, warn};

use super::block::*;
use crate::error::{Error, Result};

/// Position of the scanner in the block stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Header,
    LogicalScreenDescriptor,
    GlobalPalette { len: usize },
    BlockLoop,
    ImageDescriptor,
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// skip image data and unknown extensions instead of keeping them
    Scan,
    /// keep every byte so blocks can be re-emitted
    Copy,
}

/// Forward-only reader splitting a GIF stream into blocks.
pub struct Scanner<R> {
    rdr: R,
    state: State,
    mode: Mode,
    require_trailer: bool,
}

impl<R: Read> Scanner<R> {
    pub fn new(rdr: R, mode: Mode) -> Self {
        Scanner { rdr, state: State::Header, mode, require_trailer: false }
    }

    /// fail instead of stopping when the stream ends without a trailer
    pub fn require_trailer(mut self, require: bool) -> Self {
        self.require_trailer = require;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// the next complete block, or None once the stream has ended
    pub fn next_block(&mut self) -> Result<Option<Block>> {
        while self.state != State::Done {
            let (next, block) = self.step()?;
            self.state = next;
            if block.is_some() {
                return Ok(block);
            }
        }
        Ok(None)
    }

    /// Transition function: consume the input belonging to the current
    /// state and return the next state with the block it completed, if any.
    pub fn step(&mut self) -> Result<(State, Option<Block>)> {
        match self.state {
            State::Header => {
                let mut sig = [0u8; 6];
                self.rdr.read_exact(&mut sig)?;
                if &sig[..3] != b"GIF" {
                    return Err(Error::malformed("missing GIF signature"));
                }
                Ok((State::LogicalScreenDescriptor, Some(Block::Header(sig))))
            }
            State::LogicalScreenDescriptor => {
                let mut raw = [0u8; 7];
                self.rdr.read_exact(&mut raw)?;
                let lsd = ScreenDescriptor(raw);
                let next = match lsd.global_palette_len() {
                    Some(len) => State::GlobalPalette { len },
                    None => State::BlockLoop,
                };
                Ok((next, Some(Block::ScreenDescriptor(lsd))))
            }
            State::GlobalPalette { len } => {
                let mut palette = vec![0u8; len];
                self.rdr.read_exact(&mut palette)?;
                Ok((State::BlockLoop, Some(Block::GlobalPalette(palette))))
            }
            State::BlockLoop => {
                let marker = match read_u8(&mut self.rdr) {
                    Ok(m) => m,
                    Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof && !self.require_trailer => {
                        warn!("gif stream ended without a trailer");
                        return Ok((State::Done, None));
                    }
                    Err(e) => return Err(e.into()),
                };
                match marker {
                    TRAILER => Ok((State::Done, Some(Block::Trailer))),
                    EXTENSION_INTRODUCER => Ok((State::BlockLoop, Some(self.read_extension()?))),
                    IMAGE_SEPARATOR => Ok((State::ImageDescriptor, None)),
                    m => Err(Error::malformed(format!("unexpected block marker 0x{:02x}", m))),
                }
            }
            State::ImageDescriptor => {
                let frame = self.read_image()?;
                Ok((State::BlockLoop, Some(Block::Image(frame))))
            }
            State::Done => Ok((State::Done, None)),
        }
    }

    fn read_extension(&mut self) -> Result<Block> {
        let label = read_u8(&mut self.rdr)?;
        trace!("extension 0x{:02x}", label);
        let block = match label {
            GRAPHIC_CONTROL_LABEL => Block::GraphicControl(GraphicControl::read(&mut self.rdr)?),
            APPLICATION_LABEL => Block::Application(ApplicationExtension::read(&mut self.rdr)?),
            COMMENT_LABEL => Block::Comment(Comment { data: SubBlocks::read(&mut self.rdr)? }),
            label => Block::Extension { label, data: self.opaque()? },
        };
        Ok(block)
    }

    fn read_image(&mut self) -> Result<ImageFrame> {
        let mut descriptor = [0u8; 9];
        self.rdr.read_exact(&mut descriptor)?;
        let mut frame = ImageFrame {
            descriptor,
            local_palette: None,
            lzw_min_code_size: 0,
            data: SubBlocks::default(),
        };
        if let Some(len) = frame.local_palette_len() {
            let mut palette = vec![0u8; len];
            self.rdr.read_exact(&mut palette)?;
            frame.local_palette = Some(palette);
        }
        frame.lzw_min_code_size = read_u8(&mut self.rdr)?;
        frame.data = self.opaque()?;
        Ok(frame)
    }

    /// sub-blocks that are only kept when copying
    fn opaque(&mut self) -> Result<SubBlocks> {
        match self.mode {
            Mode::Copy => SubBlocks::read(&mut self.rdr),
            Mode::Scan => SubBlocks::skip(&mut self.rdr).map(|_| SubBlocks::default()),
        }
    }
}
