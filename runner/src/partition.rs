
use std::ops::Range;

/// Contiguous slice `[start, end)` of the pending list owned by one rank
///
/// All ranks but the last get `len / world_size` items, the last one absorbs
/// the remainder. With fewer items than workers every rank except the last
/// ends up with an empty shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    pub rank: usize,
    pub world_size: usize,
    pub start: usize,
    pub end: usize,
}

impl Shard {
    pub fn compute(len: usize, rank: usize, world_size: usize) -> Self {
        if world_size <= 1 {
            return Self {
                rank,
                world_size,
                start: 0,
                end: len,
            };
        }

        // ranks outside of the grid own nothing
        if rank >= world_size {
            return Self {
                rank,
                world_size,
                start: len,
                end: len,
            };
        }

        let chunk_size = len / world_size;
        let start = rank * chunk_size;
        let end = if rank + 1 == world_size {
            len
        } else {
            start + chunk_size
        };

        Self {
            rank,
            world_size,
            start,
            end,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range()]
    }
}

/// the part of `items` that belongs to `rank`
pub fn shard<T>(items: &[T], rank: usize, world_size: usize) -> &[T] {
    Shard::compute(items.len(), rank, world_size).slice(items)
}
