mod block_cache;
mod range_reader;

pub use block_cache::{BlockCache, BlockKey, DEFAULT_BLOCK_CACHE_CAPACITY};
pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le,
    FileRangeReader, MemoryRangeReader, RangeReader,
};
