use crossbeam_channel::{bounded, Receiver, Sender};

use super::Metadata;
use crate::error::{Result, SatchelError};

/// Capacity of the secondary error channel. Per-document errors beyond this
/// are dropped; the first error and the EOF sentinel always fit because the
/// consumer drains as it goes.
const ERR_CHANNEL_CAP: usize = 64;

/// A decrypted document pulled from (or staged for) a remote bucket.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub metadata: Metadata,
    pub data: Vec<u8>,
}

/// Hand-off buffer between pull workers and the consumer: a rendezvous
/// channel of documents plus a secondary error channel.
///
/// [`DocumentBuffer::next`] returns the next document or the first pending
/// error; end-of-stream is the distinguished [`SatchelError::EndOfDocuments`],
/// delivered exactly once after the last document.
pub struct DocumentBuffer {
    doc_tx: Sender<Document>,
    doc_rx: Receiver<Document>,
    err_tx: Sender<SatchelError>,
    err_rx: Receiver<SatchelError>,
}

impl DocumentBuffer {
    pub fn new() -> Self {
        let (doc_tx, doc_rx) = bounded(0);
        let (err_tx, err_rx) = bounded(ERR_CHANNEL_CAP);
        Self {
            doc_tx,
            doc_rx,
            err_tx,
            err_rx,
        }
    }

    /// Block for the next document or error.
    pub fn next(&self) -> Result<Document> {
        crossbeam_channel::select! {
            recv(self.doc_rx) -> msg => msg.map_err(|_| SatchelError::BufferClosed),
            recv(self.err_rx) -> msg => match msg {
                Ok(err) => Err(err),
                Err(_) => Err(SatchelError::BufferClosed),
            },
        }
    }

    /// Release both channels. Producers still holding senders observe the
    /// disconnect and stop.
    pub fn close(self) {}

    /// Producer handles for worker threads.
    pub(crate) fn producer(&self) -> DocumentProducer {
        DocumentProducer {
            doc_tx: self.doc_tx.clone(),
            err_tx: self.err_tx.clone(),
        }
    }
}

impl Default for DocumentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable sending side of a [`DocumentBuffer`].
#[derive(Clone)]
pub(crate) struct DocumentProducer {
    doc_tx: Sender<Document>,
    err_tx: Sender<SatchelError>,
}

impl DocumentProducer {
    /// Hand a document to the consumer. Returns false when the buffer is
    /// gone.
    pub(crate) fn send(&self, doc: Document) -> bool {
        self.doc_tx.send(doc).is_ok()
    }

    /// Report a per-document error without blocking; dropped on
    /// backpressure.
    pub(crate) fn send_err(&self, err: SatchelError) {
        let _ = self.err_tx.try_send(err);
    }

    /// Deliver the end-of-stream sentinel. Blocks until the consumer can
    /// take it (or the buffer is gone) so it is never dropped.
    pub(crate) fn finish(&self) {
        let _ = self.err_tx.send(SatchelError::EndOfDocuments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> Document {
        Document {
            name: name.into(),
            metadata: Metadata::default(),
            data: b"data".to_vec(),
        }
    }

    #[test]
    fn documents_then_eof() {
        let buffer = DocumentBuffer::new();
        let producer = buffer.producer();

        let handle = std::thread::spawn(move || {
            assert!(producer.send(doc("a")));
            assert!(producer.send(doc("b")));
            producer.finish();
        });

        assert_eq!(buffer.next().unwrap().name, "a");
        assert_eq!(buffer.next().unwrap().name, "b");
        assert!(matches!(
            buffer.next(),
            Err(SatchelError::EndOfDocuments)
        ));
        handle.join().unwrap();
    }

    #[test]
    fn errors_are_delivered() {
        let buffer = DocumentBuffer::new();
        let producer = buffer.producer();

        producer.send_err(SatchelError::DecryptionFailed);
        producer.finish();

        assert!(matches!(
            buffer.next(),
            Err(SatchelError::DecryptionFailed)
        ));
        assert!(matches!(
            buffer.next(),
            Err(SatchelError::EndOfDocuments)
        ));
    }

    #[test]
    fn closed_buffer_unblocks_producers() {
        let buffer = DocumentBuffer::new();
        let producer = buffer.producer();
        buffer.close();
        assert!(!producer.send(doc("orphan")));
    }
}
