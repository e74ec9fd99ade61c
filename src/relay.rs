//! Best-effort byte forwarding from the pseudoterminal to an output sink.
use std::io::{self, Read, Write};

use crate::{
    common::Error,
    cutils::{was_interrupted, would_block},
};

/// The largest number of bytes forwarded by a single [`relay_chunk`] call.
pub const CHUNK_SIZE: usize = 1023;

/// Write all of `buf` to `sink`, retrying partial writes.
///
/// Returns the number of bytes that were accepted. This is less than `buf.len()` only if the sink
/// reported an error or refused to accept any more bytes.
pub fn write_fully<W: Write + ?Sized>(sink: &mut W, buf: &[u8]) -> usize {
    let mut written = 0;

    while written < buf.len() {
        match sink.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(err) if was_interrupted(&err) => {}
            Err(_) => break,
        }
    }

    written
}

/// The outcome of a single [`relay_chunk`] call.
#[derive(Debug)]
pub enum Chunk {
    /// This many bytes were read and all of them reached the sink.
    Forwarded(usize),
    /// The source has nothing to offer right now. Interrupted reads are retried instead.
    Pending,
    /// The source reached end of file.
    Closed,
    /// Reading from the source failed.
    Failed(io::Error),
}

/// Read at most [`CHUNK_SIZE`] bytes from `source` and forward them verbatim to `sink`.
///
/// Only a failure to forward what was read is an error: source-side outcomes are reported through
/// [`Chunk`] so the caller can tell them apart.
pub fn relay_chunk<R, W>(source: &mut R, sink: &mut W) -> Result<Chunk, Error>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = [0; CHUNK_SIZE];

    let read = loop {
        match source.read(&mut buf) {
            Ok(0) => return Ok(Chunk::Closed),
            Ok(n) => break n,
            Err(err) if was_interrupted(&err) => {}
            Err(err) if would_block(&err) => return Ok(Chunk::Pending),
            Err(err) => return Ok(Chunk::Failed(err)),
        }
    };

    let written = write_fully(sink, &buf[..read]);
    if written != read {
        return Err(Error::RelayForwardingFailed { read, written });
    }
    // The chunk counts as forwarded once the sink accepted it.
    sink.flush().ok();

    Ok(Chunk::Forwarded(read))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read, Write};

    use pretty_assertions::assert_eq;

    use super::{relay_chunk, write_fully, Chunk, CHUNK_SIZE};
    use crate::common::Error;

    /// Accepts at most `step` bytes per call, up to `capacity` bytes in total.
    struct Trickle {
        data: Vec<u8>,
        step: usize,
        capacity: usize,
        interrupt_every_other: bool,
        calls: usize,
    }

    impl Trickle {
        fn new(step: usize, capacity: usize) -> Self {
            Self {
                data: Vec::new(),
                step,
                capacity,
                interrupt_every_other: false,
                calls: 0,
            }
        }
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.interrupt_every_other && self.calls % 2 == 0 {
                return Err(io::ErrorKind::Interrupted.into());
            }
            let room = self.capacity - self.data.len();
            if room == 0 {
                return Err(io::Error::from_raw_os_error(libc::ENOSPC));
            }
            let n = buf.len().min(self.step).min(room);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(libc::EPIPE))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A source replaying a fixed sequence of read results.
    struct Script(Vec<io::Result<Vec<u8>>>);

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.remove(0) {
                Ok(bytes) => {
                    assert!(bytes.len() <= buf.len());
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn write_fully_retries_partial_writes() {
        let mut sink = Trickle::new(3, 1024);
        let payload = b"echo Foooooooooooooooooooooooooo";
        assert_eq!(write_fully(&mut sink, payload), payload.len());
        assert_eq!(sink.data, payload.to_vec());
        assert!(sink.calls > 1);
    }

    #[test]
    fn write_fully_retries_interrupted_writes() {
        let mut sink = Trickle::new(2, 1024);
        sink.interrupt_every_other = true;
        assert_eq!(write_fully(&mut sink, b"set +m"), 6);
        assert_eq!(sink.data, b"set +m".to_vec());
    }

    #[test]
    fn write_fully_stops_at_the_first_error() {
        assert_eq!(write_fully(&mut Broken, b"stty -echo"), 0);

        let mut sink = Trickle::new(4, 6);
        assert_eq!(write_fully(&mut sink, b"stty -echo"), 6);
        assert_eq!(sink.data, b"stty -".to_vec());
    }

    #[test]
    fn write_fully_stops_on_a_zero_length_write() {
        let mut full: &mut [u8] = &mut [0; 2];
        assert_eq!(write_fully(&mut full, b"abc"), 2);
    }

    #[test]
    fn relay_forwards_exactly_what_was_read() {
        let mut source = Script(vec![Ok(b"hi\n".to_vec())]);
        let mut sink = Vec::new();
        assert!(matches!(
            relay_chunk(&mut source, &mut sink),
            Ok(Chunk::Forwarded(3))
        ));
        assert_eq!(sink, b"hi\n".to_vec());
    }

    #[test]
    fn relay_reads_bounded_chunks() {
        let data = vec![b'x'; 3 * CHUNK_SIZE];
        let mut source = &data[..];
        let mut sink = Vec::new();

        let mut chunks = Vec::new();
        loop {
            match relay_chunk(&mut source, &mut sink).unwrap() {
                Chunk::Forwarded(n) => chunks.push(n),
                Chunk::Closed => break,
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(chunks, vec![CHUNK_SIZE; 3]);
        assert_eq!(sink, data);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut source = Script(vec![
            Err(io::ErrorKind::Interrupted.into()),
            Err(io::ErrorKind::Interrupted.into()),
            Ok(b"late\n".to_vec()),
        ]);
        let mut sink = Vec::new();

        assert!(matches!(
            relay_chunk(&mut source, &mut sink),
            Ok(Chunk::Forwarded(5))
        ));
        assert_eq!(sink, b"late\n".to_vec());
        assert!(source.0.is_empty());
    }

    #[test]
    fn relay_reports_source_outcomes() {
        let mut source = Script(vec![
            Err(io::ErrorKind::WouldBlock.into()),
            Err(io::Error::from_raw_os_error(libc::EIO)),
            Ok(Vec::new()),
        ]);
        let mut sink = Vec::new();

        assert!(matches!(
            relay_chunk(&mut source, &mut sink),
            Ok(Chunk::Pending)
        ));
        match relay_chunk(&mut source, &mut sink) {
            Ok(Chunk::Failed(err)) => assert_eq!(err.raw_os_error(), Some(libc::EIO)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            relay_chunk(&mut source, &mut sink),
            Ok(Chunk::Closed)
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn relay_fails_distinctly_when_the_sink_falls_short() {
        let mut source = Script(vec![Ok(b"Foooooooo\n".to_vec())]);
        let mut sink = Trickle::new(4, 4);
        assert!(matches!(
            relay_chunk(&mut source, &mut sink),
            Err(Error::RelayForwardingFailed {
                read: 10,
                written: 4
            })
        ));

        let mut source = Script(vec![Ok(b"hi\n".to_vec())]);
        assert!(matches!(
            relay_chunk(&mut source, &mut Broken),
            Err(Error::RelayForwardingFailed {
                read: 3,
                written: 0
            })
        ));
    }
}
