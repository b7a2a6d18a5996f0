//! inode 的块索引分两级：
//! - `sectors[0..12]` 直接记录数据块的 lba；
//! - `sectors[12]` 指向一个一级间接索引块，整块连续存储 128 个 lba。
//!
//! lba 为 0 表示该槽位没有数据块（数据区永远不会从 0 号扇区开始）。

use super::{get_u32, put_u32};
use crate::SECTOR_SIZE;

/// 直接索引槽位数
pub const DIRECT_COUNT: usize = 12;
/// 一级间接索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 单个 inode 可寻址的数据块上限
pub const INODE_BLOCK_CAP: usize = DIRECT_COUNT + INDIRECT_COUNT;

/// inode 表中的定长记录，多条记录共享一个扇区
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskInode {
    pub no: u32,
    pub size: u32,
    /// `[0..12)` 为直接块，`[12]` 为一级间接索引块
    pub sectors: [u32; DIRECT_COUNT + 1],
}

impl DiskInode {
    /// 记录大小恒为 64 字节（60 字节有效 + 4 字节保留）
    pub const SIZE: usize = 64;
    pub const PER_SECTOR: usize = SECTOR_SIZE / Self::SIZE;
    /// 单个文件的字节容量上限
    pub const MAX_SIZE: u32 = (INODE_BLOCK_CAP * SECTOR_SIZE) as u32;

    /// 零尺寸、无数据块的新 inode
    #[inline]
    pub fn init(no: u32) -> Self {
        Self {
            no,
            ..Default::default()
        }
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), Self::SIZE);
        buf.fill(0);
        put_u32(buf, 0, self.no);
        put_u32(buf, 4, self.size);
        for (i, &lba) in self.sectors.iter().enumerate() {
            put_u32(buf, 8 + i * 4, lba);
        }
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), Self::SIZE);
        let mut sectors = [0; DIRECT_COUNT + 1];
        for (i, lba) in sectors.iter_mut().enumerate() {
            *lba = get_u32(buf, 8 + i * 4);
        }
        Self {
            no: get_u32(buf, 0),
            size: get_u32(buf, 4),
            sectors,
        }
    }

    /// 通过编号获取 inode 记录在磁盘上的位置：**扇区号**以及**扇区内字节偏移**
    #[inline]
    pub fn table_pos(inode_table_lba: u32, no: u32) -> (u32, usize) {
        let lba = inode_table_lba + no / Self::PER_SECTOR as u32;
        let offset = no as usize % Self::PER_SECTOR * Self::SIZE;
        (lba, offset)
    }

    /// 计算容纳指定数据量需要多少个数据块
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(SECTOR_SIZE)
    }
}
