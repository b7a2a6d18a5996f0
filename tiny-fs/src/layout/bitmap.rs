use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use crate::BlockDevice;
use crate::{BITS_PER_SECTOR, SECTOR_SIZE};
use crate::{Error, Result};

/// 位图区域，常驻内存，记录其指示区域的单元分配情况。
///
/// 一位对应一个可分配单元（数据块或 inode），1 表示在用；
/// 超出真实单元数的尾部位恒为 1，分配永远不会选中它们。
#[derive(Debug)]
pub struct Bitmap {
    bits: Vec<u8>,
    /// 位图在磁盘上的起始扇区
    start_lba: u32,
    /// 位图占用扇区数
    sects: u32,
}

impl Bitmap {
    /// 全零的内存位图，格式化时使用
    pub fn new(start_lba: u32, sects: u32) -> Self {
        Self {
            bits: vec![0; sects as usize * SECTOR_SIZE],
            start_lba,
            sects,
        }
    }

    /// 从磁盘读入整个位图区域，挂载时使用
    pub fn load(device: &Arc<dyn BlockDevice>, start_lba: u32, sects: u32) -> Self {
        let mut bitmap = Self::new(start_lba, sects);
        for s in 0..sects as usize {
            device.read_sector(
                start_lba as usize + s,
                &mut bitmap.bits[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE],
            );
        }
        bitmap
    }

    /// 位图所能指示的单元总数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.sects as usize * BITS_PER_SECTOR
    }

    /// 分配一个空闲单元并返回其位序号。
    /// 先按字节找到未满的一组，再取其中最低的零位。
    pub fn alloc(&mut self) -> Result<u32> {
        let Some((byte_index, &byte)) = self
            .bits
            .iter()
            .enumerate()
            .find(|&(_, &byte)| byte != u8::MAX)
        else {
            return Err(Error::Exhausted);
        };

        let bit_index = byte.trailing_ones() as usize;
        self.bits[byte_index] |= 1 << bit_index;
        Ok((byte_index * 8 + bit_index) as u32)
    }

    /// 清除一个单元的占用位。位本就为零时等于什么都不做，
    /// 但调用方不应重复归还同一单元。
    pub fn free(&mut self, bit: u32) {
        debug_assert!(self.is_set(bit));
        self.bits[bit as usize / 8] &= !(1 << (bit % 8));
    }

    #[inline]
    pub fn set(&mut self, bit: u32) {
        self.bits[bit as usize / 8] |= 1 << (bit % 8);
    }

    #[inline]
    pub fn is_set(&self, bit: u32) -> bool {
        self.bits[bit as usize / 8] & (1 << (bit % 8)) != 0
    }

    /// 只写回指定位所在的那一个扇区。
    /// 每次分配随手同步，崩溃后位图仍与已同步的分配一致。
    pub fn sync(&self, device: &Arc<dyn BlockDevice>, bit: u32) {
        let sector = bit as usize / BITS_PER_SECTOR;
        device.write_sector(
            self.start_lba as usize + sector,
            &self.bits[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE],
        );
    }

    /// 整个位图写回磁盘，格式化时使用
    pub fn flush(&self, device: &Arc<dyn BlockDevice>) {
        for s in 0..self.sects as usize {
            device.write_sector(
                self.start_lba as usize + s,
                &self.bits[s * SECTOR_SIZE..(s + 1) * SECTOR_SIZE],
            );
        }
    }
}
