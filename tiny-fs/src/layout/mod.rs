//! # 磁盘数据结构层
//!
//! tiny-fs 的磁盘布局：
//! 引导扇区 | 超级块 | 块位图 | inode位图 | inode表 | 数据区
//!
//! 磁盘记录一律通过显式的定长编解码出入字节缓冲，不做指针重释。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::DiskInode;
pub use inode::{DIRECT_COUNT, INDIRECT_COUNT, INODE_BLOCK_CAP};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, FileKind, NAME_LEN};

#[inline]
pub(crate) fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
