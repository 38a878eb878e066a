//! Digest computation over a byte stream while it is being read.

use md5::{Digest, Md5};
use sha1::Sha1;
use std::io::{self, Read};

/// Hex-encoded digests of a complete file. A digest is `None` when its
/// computation was not requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Digests {
    pub md5: Option<String>,
    pub sha1: Option<String>,
}

/// A reader that feeds every byte it hands out to the enabled digests.
///
/// The extractor stops reading as soon as it found the control data, so
/// [`ChecksumReader::finish`] drains whatever is left of the stream before
/// finalizing; the digests therefore always cover the entire input.
pub struct ChecksumReader<R> {
    inner: R,
    md5: Option<Md5>,
    sha1: Option<Sha1>,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R, want_md5: bool, want_sha1: bool) -> Self {
        Self {
            inner,
            md5: want_md5.then(Md5::new),
            sha1: want_sha1.then(Sha1::new),
        }
    }

    /// Consume the rest of the stream and return the hex digests.
    pub fn finish(mut self) -> io::Result<Digests> {
        if self.md5.is_some() || self.sha1.is_some() {
            io::copy(&mut self, &mut io::sink())?;
        }
        Ok(Digests {
            md5: self.md5.map(|h| format!("{:x}", h.finalize())),
            sha1: self.sha1.map(|h| format!("{:x}", h.finalize())),
        })
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if let Some(md5) = self.md5.as_mut() {
            md5.update(&buf[..n]);
        }
        if let Some(sha1) = self.sha1.as_mut() {
            sha1.update(&buf[..n]);
        }
        Ok(n)
    }
}
