//! C6: ref-counted buffer blocks chained into a queue.

use std::sync::Arc;

/// A read-only window into a shared, ref-counted byte block. Cloning is a
/// refcount bump ("shadow buffer" in the source), not a copy.
#[derive(Clone)]
pub struct Buf {
    data: Arc<Vec<u8>>,
    start: usize,
    end: usize,
}

impl Buf {
    pub fn from_vec(data: Vec<u8>) -> Self {
        let end = data.len();
        Self { data: Arc::new(data), start: 0, end }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self::from_vec(Vec::with_capacity(cap))
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Produces a shadow buffer over the first `n` bytes, leaving `self`
    /// pointing at the remainder. Used when only part of a block has been
    /// consumed by a write.
    pub fn split_to(&mut self, n: usize) -> Buf {
        let n = n.min(self.len());
        let shadow = Buf { data: Arc::clone(&self.data), start: self.start, end: self.start + n };
        self.start += n;
        shadow
    }

    pub fn advance(&mut self, n: usize) {
        self.start = (self.start + n).min(self.end);
    }
}

/// An ordered queue of `Buf` blocks plus an overall byte count. Appending and
/// draining from the front are O(1) amortized, matching the source's
/// singly-linked chain with head/tail pointers.
#[derive(Default)]
pub struct Chain {
    blocks: std::collections::VecDeque<Buf>,
    len: usize,
}

impl Chain {
    pub fn new() -> Self {
        Self { blocks: std::collections::VecDeque::new(), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, buf: Buf) {
        if buf.is_empty() {
            return;
        }
        self.len += buf.len();
        self.blocks.push_back(buf);
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.push_back(Buf::from_vec(bytes.to_vec()));
    }

    /// Drops the first `n` bytes from the chain, recycling fully-consumed
    /// blocks (dropping their `Arc`) and shrinking a partially-consumed head
    /// block in place.
    pub fn consume(&mut self, mut n: usize) {
        n = n.min(self.len);
        self.len -= n;
        while n > 0 {
            let Some(front) = self.blocks.front_mut() else { break };
            if front.len() <= n {
                n -= front.len();
                self.blocks.pop_front();
            } else {
                front.advance(n);
                n = 0;
            }
        }
    }

    /// Copies up to `dst.len()` bytes out of the chain without consuming
    /// them, for writev-style fan-out; callers call `consume` afterward with
    /// however much the underlying write actually accepted.
    pub fn copy_to(&self, dst: &mut [u8]) -> usize {
        let mut written = 0;
        for block in &self.blocks {
            if written >= dst.len() {
                break;
            }
            let src = block.as_slice();
            let take = src.len().min(dst.len() - written);
            dst[written..written + take].copy_from_slice(&src[..take]);
            written += take;
        }
        written
    }

    pub fn front(&self) -> Option<&Buf> {
        self.blocks.front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_consume_across_blocks() {
        let mut chain = Chain::new();
        chain.push_bytes(b"hello");
        chain.push_bytes(b"world");
        assert_eq!(chain.len(), 10);

        let mut out = [0u8; 10];
        let n = chain.copy_to(&mut out);
        assert_eq!(n, 10);
        assert_eq!(&out, b"helloworld");

        chain.consume(3);
        assert_eq!(chain.len(), 7);
        let mut out = [0u8; 7];
        chain.copy_to(&mut out);
        assert_eq!(&out, b"loworld");
    }

    #[test]
    fn consume_exact_block_boundary_drops_block() {
        let mut chain = Chain::new();
        chain.push_bytes(b"abc");
        chain.push_bytes(b"def");
        chain.consume(3);
        assert_eq!(chain.len(), 3);
        let mut out = [0u8; 3];
        chain.copy_to(&mut out);
        assert_eq!(&out, b"def");
    }

    #[test]
    fn shadow_buffer_shares_storage() {
        let mut buf = Buf::from_vec(b"0123456789".to_vec());
        let shadow = buf.split_to(4);
        assert_eq!(shadow.as_slice(), b"0123");
        assert_eq!(buf.as_slice(), b"456789");
    }
}
