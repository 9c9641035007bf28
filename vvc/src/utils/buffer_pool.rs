/// Reusable scratch buffers for gathering access units.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<Vec<u8>>,
    max_buffers: usize,
    buffer_capacity: usize,
    reused: usize,
    allocated: usize,
}

impl BufferPool {
    /// Creates a pool keeping at most `max_buffers` idle buffers, each
    /// allocated with `buffer_capacity` bytes.
    pub fn new(max_buffers: usize, buffer_capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(max_buffers),
            max_buffers,
            buffer_capacity,
            reused: 0,
            allocated: 0,
        }
    }

    /// Takes an empty buffer from the pool, allocating when none is idle.
    pub fn acquire(&mut self) -> Vec<u8> {
        match self.free.pop() {
            Some(buffer) => {
                self.reused += 1;
                buffer
            }
            None => {
                self.allocated += 1;
                Vec::with_capacity(self.buffer_capacity)
            }
        }
    }

    /// Returns a buffer; it is cleared and kept if the pool has room.
    pub fn release(&mut self, mut buffer: Vec<u8>) {
        buffer.clear();

        if self.free.len() < self.max_buffers {
            self.free.push(buffer);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Number of `acquire` calls served from an idle buffer.
    pub fn reused(&self) -> usize {
        self.reused
    }

    pub fn allocated(&self) -> usize {
        self.allocated
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(4, 256 * 1024)
    }
}

#[test]
fn buffers_are_recycled() {
    let mut pool = BufferPool::new(1, 16);

    let mut first = pool.acquire();
    first.extend_from_slice(&[1, 2, 3]);
    let second = pool.acquire();
    assert_eq!(pool.allocated(), 2);

    pool.release(first);
    pool.release(second);
    assert_eq!(pool.idle(), 1);

    let again = pool.acquire();
    assert!(again.is_empty());
    assert_eq!(pool.reused(), 1);
}
