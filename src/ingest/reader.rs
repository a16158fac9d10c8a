use std::io::{ErrorKind, Read};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};

use super::http::ByteStream;

/// Chunks in flight between the reader thread and the worker. Small on
/// purpose: a slow worker stalls the socket instead of growing memory.
const CHUNK_QUEUE_DEPTH: usize = 4;

#[derive(Debug)]
pub enum ChunkEvent {
    Data(Vec<u8>),
    Eof,
    Failed(std::io::Error),
}

/// Reads a blocking byte stream on its own thread and forwards chunks.
///
/// The worker never blocks on the socket itself, so it can observe a stop
/// request between chunks. Dropping the reader's receiver makes the thread
/// exit at its next read boundary.
pub struct ChunkReader {
    rx: Receiver<ChunkEvent>,
    join: Option<JoinHandle<()>>,
}

impl ChunkReader {
    pub fn spawn(stream: ByteStream, chunk_size: usize) -> std::io::Result<Self> {
        let (tx, rx) = bounded(CHUNK_QUEUE_DEPTH);
        let join = std::thread::Builder::new()
            .name("mjpeg-reader".to_string())
            .spawn(move || read_loop(stream, chunk_size, tx))?;
        Ok(Self {
            rx,
            join: Some(join),
        })
    }

    pub fn receiver(&self) -> &Receiver<ChunkEvent> {
        &self.rx
    }
}

impl Drop for ChunkReader {
    fn drop(&mut self) {
        // The thread may be parked in a socket read; it is detached rather than
        // joined and exits once that read returns and the send fails.
        if let Some(join) = self.join.take() {
            if join.is_finished() {
                let _ = join.join();
            }
        }
    }
}

fn read_loop(mut stream: ByteStream, chunk_size: usize, tx: Sender<ChunkEvent>) {
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let event = match stream.read(&mut chunk) {
            Ok(0) => ChunkEvent::Eof,
            Ok(read) => ChunkEvent::Data(chunk[..read].to_vec()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => ChunkEvent::Failed(err),
        };
        let last = !matches!(event, ChunkEvent::Data(_));
        if tx.send(event).is_err() || last {
            return;
        }
    }
}
