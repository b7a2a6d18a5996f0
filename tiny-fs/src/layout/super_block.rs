use super::{get_u32, put_u32};
use crate::MAGIC;
use crate::SECTOR_SIZE;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 持久化在分区的 1 号扇区（0 号留给引导块），补零至整扇区。
#[derive(Debug, Clone)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    pub magic: u32,
    /// 本分区总扇区数
    pub sec_cnt: u32,
    /// 本分区的 inode 数量
    pub inode_cnt: u32,
    /// 本分区的起始 lba 地址
    pub part_lba_base: u32,
    pub block_bitmap_lba: u32,
    pub block_bitmap_sects: u32,
    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sects: u32,
    pub inode_table_lba: u32,
    pub inode_table_sects: u32,
    /// 数据区起始扇区号
    pub data_start_lba: u32,
    /// 根目录所在的 inode 号
    pub root_inode_no: u32,
    /// 目录项记录的字节大小
    pub dir_entry_size: u32,
}

impl SuperBlock {
    /// 连同补零恰为一个扇区
    pub const SIZE: usize = SECTOR_SIZE;

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), Self::SIZE);
        buf.fill(0);
        put_u32(buf, 0, self.magic);
        put_u32(buf, 4, self.sec_cnt);
        put_u32(buf, 8, self.inode_cnt);
        put_u32(buf, 12, self.part_lba_base);
        put_u32(buf, 16, self.block_bitmap_lba);
        put_u32(buf, 20, self.block_bitmap_sects);
        put_u32(buf, 24, self.inode_bitmap_lba);
        put_u32(buf, 28, self.inode_bitmap_sects);
        put_u32(buf, 32, self.inode_table_lba);
        put_u32(buf, 36, self.inode_table_sects);
        put_u32(buf, 40, self.data_start_lba);
        put_u32(buf, 44, self.root_inode_no);
        put_u32(buf, 48, self.dir_entry_size);
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), Self::SIZE);
        Self {
            magic: get_u32(buf, 0),
            sec_cnt: get_u32(buf, 4),
            inode_cnt: get_u32(buf, 8),
            part_lba_base: get_u32(buf, 12),
            block_bitmap_lba: get_u32(buf, 16),
            block_bitmap_sects: get_u32(buf, 20),
            inode_bitmap_lba: get_u32(buf, 24),
            inode_bitmap_sects: get_u32(buf, 28),
            inode_table_lba: get_u32(buf, 32),
            inode_table_sects: get_u32(buf, 36),
            data_start_lba: get_u32(buf, 40),
            root_inode_no: get_u32(buf, 44),
            dir_entry_size: get_u32(buf, 48),
        }
    }
}
