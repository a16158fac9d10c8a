//! Incremental JPEG framing for MJPEG byte streams.
//!
//! Frames are located purely by JPEG markers: the first start-of-image marker
//! (`FF D8`) and the first end-of-image marker (`FF D9`) after it. Multipart
//! boundaries and part headers are treated as garbage between frames.

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// One event produced while consuming a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A complete JPEG, markers included.
    Frame(Vec<u8>),
    /// The buffer passed the ceiling without a complete frame and was cleared.
    Malformed { discarded: usize },
}

/// Rolling buffer that turns arbitrary chunks into whole JPEG frames.
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: Vec<u8>,
    ceiling: usize,
    /// Offset where the end-marker scan resumes. Only meaningful while the
    /// buffer starts with a start marker.
    scan_from: usize,
}

impl FrameExtractor {
    pub fn new(ceiling: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            ceiling,
            scan_from: SOI.len(),
        }
    }

    /// Append a chunk and return every frame it completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Extracted> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();

        loop {
            if !self.align_to_start() {
                break;
            }
            match find_marker(&self.buffer, EOI, self.scan_from) {
                Some(end) => {
                    let frame_end = end + EOI.len();
                    let frame = self.buffer[..frame_end].to_vec();
                    self.buffer.drain(..frame_end);
                    self.scan_from = SOI.len();
                    out.push(Extracted::Frame(frame));
                }
                None => {
                    // Resume one byte early: the marker may straddle chunks.
                    self.scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
                    break;
                }
            }
        }

        if self.buffer.len() > self.ceiling {
            let discarded = self.buffer.len();
            self.reset();
            out.push(Extracted::Malformed { discarded });
        }
        out
    }

    /// Bytes currently held back waiting for a frame boundary.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan_from = SOI.len();
    }

    /// Drop leading garbage so the buffer begins at a start marker.
    ///
    /// Returns false when no start marker is present; a trailing `FF` is kept
    /// in case the marker continues in the next chunk.
    fn align_to_start(&mut self) -> bool {
        if self.buffer.starts_with(&SOI) {
            return true;
        }
        match find_marker(&self.buffer, SOI, 0) {
            Some(start) => {
                self.buffer.drain(..start);
                self.scan_from = SOI.len();
                true
            }
            None => {
                let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
                let drop_len = self.buffer.len() - keep;
                self.buffer.drain(..drop_len);
                false
            }
        }
    }
}

fn find_marker(buffer: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= buffer.len() {
        return None;
    }
    buffer[from..]
        .windows(2)
        .position(|window| window == marker)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CEILING: usize = 2 * 1024 * 1024;

    fn frames(events: Vec<Extracted>) -> Vec<Vec<u8>> {
        events
            .into_iter()
            .filter_map(|event| match event {
                Extracted::Frame(frame) => Some(frame),
                Extracted::Malformed { .. } => None,
            })
            .collect()
    }

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut out = SOI.to_vec();
        out.extend_from_slice(payload);
        out.extend_from_slice(&EOI);
        out
    }

    fn multipart_stream(count: usize) -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut stream = Vec::new();
        let mut expected = Vec::new();
        for i in 0..count {
            let frame = jpeg(format!("payload-{i}-{}", "x".repeat(i * 7)).as_bytes());
            stream.extend_from_slice(
                format!(
                    "--myboundary\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                    frame.len()
                )
                .as_bytes(),
            );
            stream.extend_from_slice(&frame);
            stream.extend_from_slice(b"\r\n");
            expected.push(frame);
        }
        (stream, expected)
    }

    #[test]
    fn yields_same_frames_for_any_chunking() {
        let (stream, expected) = multipart_stream(6);

        for chunk_size in [1, 2, 3, 5, 17, 64, stream.len()] {
            let mut extractor = FrameExtractor::new(CEILING);
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(frames(extractor.push(chunk)));
            }
            assert_eq!(got, expected, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn discards_garbage_around_a_frame() {
        let mut extractor = FrameExtractor::new(CEILING);
        let got = frames(extractor.push(b"garbage\xff\xd8body\xff\xd9trailing junk"));
        assert_eq!(got, vec![b"\xff\xd8body\xff\xd9".to_vec()]);
        assert!(extractor.buffered() <= 1);
    }

    #[test]
    fn splits_two_frames_in_both_orders_of_chunking() {
        let stream: &[u8] = b"junk\xff\xd8AAA\xff\xd9more\xff\xd8BBB\xff\xd9";
        let expected = vec![b"\xff\xd8AAA\xff\xd9".to_vec(), b"\xff\xd8BBB\xff\xd9".to_vec()];

        for split in [3, 6, 10, 14, 20] {
            let mut extractor = FrameExtractor::new(CEILING);
            let mut got = frames(extractor.push(&stream[..split]));
            got.extend(frames(extractor.push(&stream[split..])));
            assert_eq!(got, expected, "split at {split}");
        }
    }

    #[test]
    fn end_marker_before_start_is_ignored() {
        let mut extractor = FrameExtractor::new(CEILING);
        let got = frames(extractor.push(b"\xff\xd9noise\xff\xd8ok\xff\xd9"));
        assert_eq!(got, vec![b"\xff\xd8ok\xff\xd9".to_vec()]);
    }

    #[test]
    fn takes_first_end_marker_after_start() {
        let mut extractor = FrameExtractor::new(CEILING);
        let got = frames(extractor.push(b"\xff\xd8a\xff\xd8b\xff\xd9c\xff\xd9"));
        assert_eq!(got, vec![b"\xff\xd8a\xff\xd8b\xff\xd9".to_vec()]);
    }

    #[test]
    fn ceiling_resets_buffer_and_recovers() {
        let mut extractor = FrameExtractor::new(64);
        let mut open_frame = SOI.to_vec();
        open_frame.extend(std::iter::repeat(0x11).take(100));

        let events = extractor.push(&open_frame);
        assert_eq!(events, vec![Extracted::Malformed { discarded: 102 }]);
        assert_eq!(extractor.buffered(), 0);

        let got = frames(extractor.push(b"\xff\xd8fresh\xff\xd9"));
        assert_eq!(got, vec![b"\xff\xd8fresh\xff\xd9".to_vec()]);
    }

    #[test]
    fn garbage_without_markers_does_not_accumulate() {
        let mut extractor = FrameExtractor::new(64);
        for _ in 0..100 {
            let events = extractor.push(&[0x42; 50]);
            assert!(events.is_empty());
        }
        assert_eq!(extractor.buffered(), 0);
    }

    #[test]
    fn start_marker_split_across_chunks() {
        let mut extractor = FrameExtractor::new(CEILING);
        assert!(extractor.push(b"xx\xff").is_empty());
        assert!(extractor.push(b"\xd8abc\xff").is_empty());
        let got = frames(extractor.push(b"\xd9"));
        assert_eq!(got, vec![b"\xff\xd8abc\xff\xd9".to_vec()]);
    }
}
