use std::io;

use md5::Context as MD5Context;
use md5::Digest;

/// A write-through stream that hashes every byte passing through it and counts
/// how many bytes have been written so far.
pub(crate) struct MD5HashingStream<T: io::Write> {
    pub stream: T,
    pub context: MD5Context,
    position: u64,
}

impl<T: io::Write> MD5HashingStream<T> {
    pub fn new(file: T) -> MD5HashingStream<T> {
        Self {
            stream: file,
            context: MD5Context::new(),
            position: 0,
        }
    }

    pub fn compute(&self) -> Digest {
        self.context.clone().compute()
    }

    /// The number of bytes written through this stream
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for MD5HashingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.consume(&buf[..n]);
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::prelude::*;

    #[test]
    fn test_hash_and_count() -> io::Result<()> {
        let mut stream = MD5HashingStream::new(Vec::new());
        stream.write_all(b"foo")?;
        stream.write_all(b"bar")?;
        assert_eq!(stream.position(), 6);
        assert_eq!(
            format!("{:x}", stream.compute()),
            format!("{:x}", md5::compute(b"foobar"))
        );
        assert_eq!(stream.into_inner(), b"foobar");
        Ok(())
    }
}
