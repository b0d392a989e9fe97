//! Streaming access to file contents, wherever they live.
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::fs::FileExt;

use crate::cursor::COPY_BUF_SIZE;
use crate::nodes::Location;
use crate::Error;

/// A [Read] over a byte range of the source image.
pub(crate) struct ImageSlice<'a> {
    file: &'a File,
    offset: u64,
    remaining: u64,
}

impl<'a> ImageSlice<'a> {
    pub(crate) fn new(file: &'a File, offset: u64, len: u64) -> Self {
        ImageSlice {
            file,
            offset,
            remaining: len,
        }
    }
}

impl Read for ImageSlice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.read_at(&mut buf[..want], self.offset)?;
        self.offset += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Opens the bytes behind `location`. At most `location.size()` bytes are
/// produced; the source may be shorter if it shrank since it was added.
pub(crate) fn open_location<'a>(
    location: &Location,
    source: Option<&'a File>,
) -> Result<Box<dyn Read + 'a>, Error> {
    match location {
        Location::OnFilesystem { path, size } => {
            let f = File::open(path).map_err(|e| Error::OpenRead(path.clone(), e))?;
            Ok(Box::new(f.take(u64::from(*size))))
        }
        Location::OnImage { offset, size } => {
            let image = source.ok_or(Error::NoImageOpen)?;
            Ok(Box::new(ImageSlice::new(image, *offset, u64::from(*size))))
        }
    }
}

/// Reads up to `len` leading bytes of `location`.
pub(crate) fn read_head(
    location: &Location,
    source: Option<&File>,
    len: usize,
) -> Result<Vec<u8>, Error> {
    let want = len.min(location.size() as usize);
    let mut head = vec![0u8; want];
    open_location(location, source)?
        .read_exact(&mut head)
        .map_err(Error::ReadGeneric)?;
    Ok(head)
}

/// Compares exactly `size` bytes of two readers block by block.
pub(crate) fn contents_equal(a: &mut dyn Read, b: &mut dyn Read, size: u64) -> Result<bool, Error> {
    let mut buf_a = vec![0u8; COPY_BUF_SIZE];
    let mut buf_b = vec![0u8; COPY_BUF_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let n = remaining.min(COPY_BUF_SIZE as u64) as usize;
        a.read_exact(&mut buf_a[..n]).map_err(Error::ReadGeneric)?;
        b.read_exact(&mut buf_b[..n]).map_err(Error::ReadGeneric)?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
        remaining -= n as u64;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::{contents_equal, open_location, read_head};
    use crate::nodes::Location;
    use crate::Error;

    #[test]
    fn compare_spans_buffers() {
        let a = vec![7u8; 250 * 1024];
        let mut b = a.clone();
        assert!(contents_equal(&mut a.as_slice(), &mut b.as_slice(), a.len() as u64).unwrap());
        *b.last_mut().unwrap() = 8;
        assert!(!contents_equal(&mut a.as_slice(), &mut b.as_slice(), a.len() as u64).unwrap());
    }

    #[test]
    fn compare_short_reader_fails() {
        assert!(matches!(
            contents_equal(&mut &b"abc"[..], &mut &b"ab"[..], 3),
            Err(Error::ReadGeneric(_))
        ));
    }

    #[test]
    fn image_slice_reads_range() {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"0123456789").unwrap();
        let loc = Location::OnImage { offset: 3, size: 4 };
        let mut out = String::new();
        open_location(&loc, Some(&f))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!("3456", out);
        assert_eq!(b"34".to_vec(), read_head(&loc, Some(&f), 2).unwrap());
    }

    #[test]
    fn image_location_needs_image() {
        let loc = Location::OnImage { offset: 0, size: 1 };
        assert!(matches!(open_location(&loc, None), Err(Error::NoImageOpen)));
    }
}
