/// Fixed-threshold buffer for decoded records headed to one table.
///
/// `push` hands back a full chunk once the threshold is reached; `drain`
/// empties whatever remains for the final partial chunk. Single-writer,
/// single-drainer; never shared across threads.
#[derive(Debug)]
pub struct ChunkBuffer<T> {
    records: Vec<T>,
    threshold: usize,
}

impl<T> ChunkBuffer<T> {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            records: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Append one record. Returns the buffered chunk (and clears the buffer)
    /// when the threshold is reached.
    pub fn push(&mut self, record: T) -> Option<Vec<T>> {
        self.records.push(record);
        if self.records.len() >= self.threshold {
            Some(std::mem::replace(
                &mut self.records,
                Vec::with_capacity(self.threshold),
            ))
        } else {
            None
        }
    }

    /// Take everything still buffered, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_chunk_exactly_at_threshold() {
        let mut buf = ChunkBuffer::new(3);
        assert!(buf.push(1).is_none());
        assert!(buf.push(2).is_none());
        let chunk = buf.push(3).expect("third push fills the chunk");
        assert_eq!(chunk, vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn fifteen_hundred_records_at_threshold_1000_leaves_500_to_drain() {
        let mut buf = ChunkBuffer::new(1000);
        let mut flushed = Vec::new();
        for i in 0..1500 {
            if let Some(chunk) = buf.push(i) {
                flushed.push(chunk);
            }
        }
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].len(), 1000);
        let rest = buf.drain();
        assert_eq!(rest.len(), 500);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_on_empty_buffer_is_empty() {
        let mut buf: ChunkBuffer<i32> = ChunkBuffer::new(10);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn zero_threshold_is_clamped_to_one() {
        let mut buf = ChunkBuffer::new(0);
        assert_eq!(buf.threshold(), 1);
        assert_eq!(buf.push("x"), Some(vec!["x"]));
    }
}
