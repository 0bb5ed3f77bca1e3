//! Frame reassembly over byte streams
//!
//! A stream read may return fewer bytes than requested. The reader keeps
//! accumulating until the requested count is reached, and reports a peer
//! close (a zero-length read) as `ConnectionClosed` rather than handing back
//! a short buffer.

use std::io::{self, ErrorKind, Read};

use clockmesh_core::{ClockError, ClockResult};

use crate::{Frame, FRAME_SIZE};

/// Read exactly `n` bytes from a blocking stream.
///
/// Returns immediately with an empty buffer for `n == 0` without touching
/// the stream. A non-blocking stream that runs dry mid-way surfaces as an
/// `Io(WouldBlock)` error; use [`FrameReader`] to resume such reads.
pub fn read_exactly<R: Read + ?Sized>(reader: &mut R, n: usize) -> ClockResult<Vec<u8>> {
    match FrameReader::with_len(n).fill_from(reader)? {
        Some(buf) => Ok(buf),
        None => Err(io::Error::from(ErrorKind::WouldBlock).into()),
    }
}

/// Resumable accumulator for one fixed-size unit at a time.
///
/// Bytes read before a `WouldBlock` stay buffered and the next call continues
/// where the previous one stopped.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    filled: usize,
}

impl FrameReader {
    /// Reader for clock frames
    pub fn new() -> Self {
        Self::with_len(FRAME_SIZE)
    }

    pub fn with_len(len: usize) -> Self {
        FrameReader {
            buf: vec![0u8; len],
            filled: 0,
        }
    }

    /// True when some bytes of the current unit have arrived
    pub fn is_mid_frame(&self) -> bool {
        self.filled > 0
    }

    /// Continue filling the current unit.
    ///
    /// `Ok(Some(bytes))` when complete, `Ok(None)` when the stream would
    /// block first, `Err(ConnectionClosed)` when the peer closed.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> ClockResult<Option<Vec<u8>>> {
        let want = self.buf.len();
        while self.filled < want {
            match reader.read(&mut self.buf[self.filled..]) {
                Ok(0) => return Err(ClockError::ConnectionClosed),
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        self.filled = 0;
        Ok(Some(std::mem::replace(&mut self.buf, vec![0u8; want])))
    }

    /// Continue filling and decode a complete clock frame
    pub fn next_frame<R: Read + ?Sized>(&mut self, reader: &mut R) -> ClockResult<Option<Frame>> {
        match self.fill_from(reader)? {
            Some(bytes) => Frame::parse(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clockmesh_core::LogicalTime;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    /// Scripted stream: each read returns the next chunk (or error)
    struct ScriptedStream {
        script: VecDeque<io::Result<Vec<u8>>>,
        reads: usize,
    }

    impl ScriptedStream {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedStream {
                script: script.into(),
                reads: 0,
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            match self.script.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.script.push_front(Ok(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_reassembles_partial_reads() {
        let mut stream = ScriptedStream::new(vec![
            Ok(vec![0x00]),
            Ok(vec![0x00, 0x01]),
            Ok(vec![0x05]),
        ]);
        let bytes = read_exactly(&mut stream, 4).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x01, 0x05]);
        assert_eq!(stream.reads, 3);
    }

    #[test]
    fn test_zero_length_reads_nothing() {
        let mut stream = ScriptedStream::new(vec![Ok(vec![1, 2, 3])]);
        let bytes = read_exactly(&mut stream, 0).unwrap();
        assert!(bytes.is_empty());
        assert_eq!(stream.reads, 0);
    }

    #[test]
    fn test_close_before_any_bytes() {
        let mut stream = ScriptedStream::new(vec![]);
        assert!(matches!(
            read_exactly(&mut stream, 4),
            Err(ClockError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_mid_frame() {
        let mut stream = ScriptedStream::new(vec![Ok(vec![0x00, 0x01])]);
        assert!(matches!(
            read_exactly(&mut stream, 4),
            Err(ClockError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_interrupted_is_retried() {
        let mut stream = ScriptedStream::new(vec![
            Ok(vec![0x00, 0x00]),
            Err(ErrorKind::Interrupted.into()),
            Ok(vec![0x00, 0x7E]),
        ]);
        assert_eq!(read_exactly(&mut stream, 4).unwrap(), vec![0, 0, 0, 0x7E]);
    }

    #[test]
    fn test_would_block_resumes_without_losing_bytes() {
        let mut stream = ScriptedStream::new(vec![
            Ok(vec![0x00, 0x00, 0x01]),
            Err(ErrorKind::WouldBlock.into()),
            Ok(vec![0x05, 0x00, 0x00, 0x00, 0x2A]),
            Err(ErrorKind::WouldBlock.into()),
        ]);
        let mut reader = FrameReader::new();

        assert_eq!(reader.next_frame(&mut stream).unwrap(), None);
        assert!(reader.is_mid_frame());

        let first = reader.next_frame(&mut stream).unwrap().unwrap();
        assert_eq!(first.clock, LogicalTime(261));
        assert!(!reader.is_mid_frame());

        let second = reader.next_frame(&mut stream).unwrap().unwrap();
        assert_eq!(second.clock, LogicalTime(42));

        assert_eq!(reader.next_frame(&mut stream).unwrap(), None);
    }

    #[test]
    fn test_read_exactly_reports_would_block() {
        let mut stream =
            ScriptedStream::new(vec![Ok(vec![0x00]), Err(ErrorKind::WouldBlock.into())]);
        match read_exactly(&mut stream, 4) {
            Err(ClockError::Io(e)) => assert_eq!(e.kind(), ErrorKind::WouldBlock),
            other => panic!("expected WouldBlock, got {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn prop_chunking_never_changes_decoded_values(
            values in proptest::collection::vec(any::<u32>(), 1..16),
            cuts in proptest::collection::vec(1usize..7, 1..64),
        ) {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
            let mut script = Vec::new();
            let mut offset = 0;
            for cut in cuts.iter().cycle() {
                if offset >= bytes.len() {
                    break;
                }
                let end = (offset + cut).min(bytes.len());
                script.push(Ok(bytes[offset..end].to_vec()));
                script.push(Err(ErrorKind::WouldBlock.into()));
                offset = end;
            }
            let mut stream = ScriptedStream::new(script);
            let mut reader = FrameReader::new();

            let mut decoded = Vec::new();
            while decoded.len() < values.len() {
                if let Some(frame) = reader.next_frame(&mut stream).unwrap() {
                    decoded.push(frame.clock.value());
                }
            }
            prop_assert_eq!(decoded, values);
        }
    }
}
