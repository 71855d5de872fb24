use anyhow::{Result, ensure};

/// Inclusive range of block numbers. Unlike [`std::ops::RangeInclusive`] it
/// can never be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    pub fn try_new(start: u64, end: u64) -> Result<Self> {
        ensure!(end >= start, "end has to be bigger or equal to start");
        Ok(Self { start, end })
    }

    /// The range consisting of only `block`.
    pub fn single(block: u64) -> Self {
        Self {
            start: block,
            end: block,
        }
    }

    /// The `window` most recent blocks up to and including `head`, clamped at
    /// the genesis block.
    pub fn recent(head: u64, window: u64) -> Self {
        Self {
            start: head.saturating_sub(window.saturating_sub(1)),
            end: head,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_single_block(&self) -> bool {
        self.start == self.end
    }

    /// Splits the range into consecutive sub-ranges of at most `step` blocks,
    /// in ascending order. A `step` of zero is treated as one.
    pub fn chunks(self, step: u64) -> impl DoubleEndedIterator<Item = BlockRange> {
        let step = step.max(1);
        let count = self.len().div_ceil(step);
        (0..count).map(move |i| {
            let start = self.start + i * step;
            BlockRange {
                start,
                end: start.saturating_add(step - 1).min(self.end),
            }
        })
    }

    pub fn into_inner(self) -> (u64, u64) {
        (self.start, self.end)
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        assert!(BlockRange::try_new(10, 9).is_err());
        assert_eq!(BlockRange::try_new(10, 10).unwrap().len(), 1);
    }

    #[test]
    fn recent_window_is_clamped_at_genesis() {
        assert_eq!(BlockRange::recent(100_000, 50_000).into_inner(), (50_001, 100_000));
        assert_eq!(BlockRange::recent(100, 50_000).into_inner(), (0, 100));
        assert_eq!(BlockRange::recent(100_000, 50_000).len(), 50_000);
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        let chunks: Vec<_> = BlockRange::try_new(0, 9)
            .unwrap()
            .chunks(4)
            .map(BlockRange::into_inner)
            .collect();
        assert_eq!(chunks, vec![(0, 3), (4, 7), (8, 9)]);

        let chunks: Vec<_> = BlockRange::single(5).chunks(0).collect();
        assert_eq!(chunks, vec![BlockRange::single(5)]);
    }
}
