//! Byte-level access to image files.
//!
//! [ImageCursor] is the forward-writing, backward-patching cursor the writer
//! serializes through. [BlockReader] gives positioned reads on a source image.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;

use crate::progress::{CancelHandle, ProgressThrottle};
use crate::wire::BLOCK_SIZE;
use crate::Error;

/// Size of the scratch buffers used for copying and comparing contents.
pub(crate) const COPY_BUF_SIZE: usize = 100 * 1024;

const ZEROES: [u8; 2048] = [0u8; 2048];

pub(crate) struct ImageCursor<'p, W: Write + Seek> {
    inner: W,
    pos: u64,
    end: u64,
    throttle: ProgressThrottle<'p>,
    cancel: CancelHandle,
}

impl<'p, W: Write + Seek> ImageCursor<'p, W> {
    pub(crate) fn new(inner: W, throttle: ProgressThrottle<'p>, cancel: CancelHandle) -> Self {
        ImageCursor {
            inner,
            pos: 0,
            end: 0,
            throttle,
            cancel,
        }
    }

    pub(crate) fn tell(&self) -> u64 {
        self.pos
    }

    /// Highest offset written or skipped to so far.
    pub(crate) fn end(&self) -> u64 {
        self.end
    }

    /// The logical block the cursor is in.
    pub(crate) fn block(&self) -> Result<u32, Error> {
        u32::try_from(self.pos / BLOCK_SIZE)
            .map_err(|_| Error::SanityCheckFailed("image exceeds 32-bit block addressing"))
    }

    pub(crate) fn seek_to(&mut self, offset: u64) -> Result<(), Error> {
        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(Error::WriteGeneric)?;
        self.pos = offset;
        self.end = self.end.max(offset);
        Ok(())
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        self.inner.write_all(data).map_err(Error::WriteGeneric)?;
        self.pos += data.len() as u64;
        self.end = self.end.max(self.pos);
        self.throttle.report(self.end);
        Ok(())
    }

    pub(crate) fn write_zeros(&mut self, mut len: u64) -> Result<(), Error> {
        while len > 0 {
            let n = len.min(ZEROES.len() as u64) as usize;
            self.write(&ZEROES[..n])?;
            len -= n as u64;
        }
        Ok(())
    }

    /// Zero-fills up to the next block boundary.
    pub(crate) fn pad_to_block(&mut self) -> Result<(), Error> {
        let rem = self.pos % BLOCK_SIZE;
        if rem != 0 {
            self.write_zeros(BLOCK_SIZE - rem)?;
        }
        Ok(())
    }

    /// Advances without writing. Used when only the layout is computed.
    pub(crate) fn skip(&mut self, len: u64) -> Result<(), Error> {
        self.seek_to(self.pos + len)
    }

    /// Overwrites bytes at `offset` and returns to the current position.
    pub(crate) fn patch(&mut self, offset: u64, data: &[u8]) -> Result<(), Error> {
        let here = self.pos;
        self.seek_to(offset)?;
        self.write(data)?;
        self.seek_to(here)
    }

    pub(crate) fn check_cancel(&self) -> Result<(), Error> {
        self.cancel.check()
    }

    /// Copies exactly `size` bytes from `src`, polling cancellation between
    /// blocks. A short source is a read error.
    pub(crate) fn copy_exact(&mut self, src: &mut dyn Read, size: u64) -> Result<(), Error> {
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut remaining = size;
        while remaining > 0 {
            self.check_cancel()?;
            let n = remaining.min(COPY_BUF_SIZE as u64) as usize;
            src.read_exact(&mut buf[..n]).map_err(Error::ReadGeneric)?;
            self.write(&buf[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Flushes and hands out the final length.
    pub(crate) fn finish(mut self) -> Result<u64, Error> {
        self.inner.flush().map_err(Error::WriteGeneric)?;
        self.throttle.finish(self.end);
        Ok(self.end)
    }
}

/// A [Write] + [Seek] sink which only tracks its length.
#[derive(Debug, Default)]
pub(crate) struct SizeSink {
    pos: u64,
    len: u64,
}

impl Write for SizeSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pos += buf.len() as u64;
        self.len = self.len.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SizeSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let base = match pos {
            SeekFrom::Start(p) => {
                self.pos = p;
                return Ok(p);
            }
            SeekFrom::End(d) => (self.len, d),
            SeekFrom::Current(d) => (self.pos, d),
        };
        self.pos = base
            .0
            .checked_add_signed(base.1)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))?;
        Ok(self.pos)
    }
}

/// Positioned reads on a source image.
#[derive(Clone, Copy)]
pub(crate) struct BlockReader<'a> {
    file: &'a File,
}

impl<'a> BlockReader<'a> {
    pub(crate) fn new(file: &'a File) -> Self {
        BlockReader { file }
    }

    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), Error> {
        self.file
            .read_exact_at(buf, offset)
            .map_err(Error::ReadGeneric)
    }

    pub(crate) fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    pub(crate) fn read_block(&self, lba: u32) -> Result<Vec<u8>, Error> {
        self.read_vec(u64::from(lba) * BLOCK_SIZE, BLOCK_SIZE as usize)
    }
}
