//! # 目录服务层
//!
//! 目录的数据就是一串定长目录项，既无 B 树也无哈希索引：
//! 查找是全量线性扫描，插入填第一个空槽，删除就地清槽。
//! 被清空的槽位可被后续插入复用，因此遍历顺序跟随槽位而非创建时间。

use crate::FileSystem;
use crate::SectorBuf;
use crate::layout::*;
use crate::{Error, Result};
use crate::{ROOT_INODE, SECTOR_SIZE};

/// 打开的目录：持有 inode 引用与遍历游标。
/// 同一目录可同时存在多个句柄，游标互不影响；句柄必须显式关闭。
#[derive(Debug)]
pub struct Dir {
    inode_no: u32,
    /// 游标：已读过的存活目录项字节数
    pos: u32,
}

impl Dir {
    #[inline]
    pub fn inode_no(&self) -> u32 {
        self.inode_no
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.inode_no == ROOT_INODE
    }

    /// 游标拨回目录开头
    #[inline]
    pub fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl FileSystem {
    /// 按 inode 号打开目录
    pub(crate) fn open_dir_inode(&mut self, inode_no: u32) -> Dir {
        self.open_inode(inode_no);
        Dir { inode_no, pos: 0 }
    }

    /// 关闭目录句柄
    pub fn close_dir(&mut self, dir: Dir) {
        self.close_inode(dir.inode_no);
    }

    /// 在目录下按名字查找目录项，线性扫描所有数据块，首个同名者即命中
    pub(crate) fn search_dir_entry(&self, dir: &Dir, name: &str) -> Option<DirEntry> {
        let inode = self.inode(dir.inode_no);
        let mut buf: SectorBuf = [0; SECTOR_SIZE];

        for lba in self.inode_block_table(&inode) {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut buf);
            for slot in 0..DirEntry::PER_SECTOR {
                let entry = DirEntry::decode_from(&buf[slot * DirEntry::SIZE..][..DirEntry::SIZE]);
                if !entry.is_vacant() && entry.name() == name {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// 把目录项写进第一个空槽。
    /// 现有块都没有空槽时为目录扩展一个新数据块；块分配失败即失败，不留痕迹。
    /// 目录 inode 的内存副本随之更新，写回由调用方安排。
    pub(crate) fn sync_dir_entry(&mut self, dir: &Dir, entry: &DirEntry) -> Result<()> {
        let mut inode = self.inode(dir.inode_no);
        let table = self.inode_block_table(&inode);
        let mut buf: SectorBuf = [0; SECTOR_SIZE];

        for (index, &lba) in table.iter().enumerate() {
            if lba == 0 {
                // 前面的块已无空槽，扩展新块并把目录项放在块首
                let lba = self.alloc_block()?;
                if let Err(e) = self.inode_set_block(&mut inode, index, lba) {
                    self.free_block(lba);
                    return Err(e);
                }
                buf.fill(0);
                entry.encode_into(&mut buf[..DirEntry::SIZE]);
                self.write_sector(lba, &buf);

                inode.size += DirEntry::SIZE as u32;
                *self.inode_mut(dir.inode_no) = inode;
                return Ok(());
            }

            self.read_sector(lba, &mut buf);
            for slot in 0..DirEntry::PER_SECTOR {
                let offset = slot * DirEntry::SIZE;
                if DirEntry::decode_from(&buf[offset..][..DirEntry::SIZE]).is_vacant() {
                    entry.encode_into(&mut buf[offset..offset + DirEntry::SIZE]);
                    self.write_sector(lba, &buf);

                    inode.size += DirEntry::SIZE as u32;
                    *self.inode_mut(dir.inode_no) = inode;
                    return Ok(());
                }
            }
        }

        log::error!("directory inode {} is full", dir.inode_no);
        Err(Error::Exhausted)
    }

    /// 按 inode 号删除目录项：就地清槽并持久化所在扇区。
    /// 整块被清空时把块归还给分配器；`.` 与 `..` 永不参与匹配。
    pub(crate) fn delete_dir_entry(&mut self, dir: &Dir, inode_no: u32) -> Result<()> {
        let mut inode = self.inode(dir.inode_no);
        let table = self.inode_block_table(&inode);
        let mut buf: SectorBuf = [0; SECTOR_SIZE];

        for (index, &lba) in table.iter().enumerate() {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut buf);

            let mut live = 0;
            let mut found = None;
            for slot in 0..DirEntry::PER_SECTOR {
                let entry = DirEntry::decode_from(&buf[slot * DirEntry::SIZE..][..DirEntry::SIZE]);
                if entry.is_vacant() {
                    continue;
                }
                live += 1;
                if entry.inode_no() == inode_no && !matches!(entry.name(), "." | "..") {
                    found = Some(slot);
                }
            }
            let Some(slot) = found else {
                continue;
            };

            buf[slot * DirEntry::SIZE..(slot + 1) * DirEntry::SIZE].fill(0);
            if live == 1 && index != 0 {
                // 块里只剩这一项：整块归还。0 号块有 . 与 .. 压阵，不会走到这里。
                self.free_block(lba);
                self.inode_set_block(&mut inode, index, 0)?;
                if index >= DIRECT_COUNT && self.indirect_is_empty(&inode) {
                    self.free_block(inode.sectors[DIRECT_COUNT]);
                    inode.sectors[DIRECT_COUNT] = 0;
                }
            } else {
                self.write_sector(lba, &buf);
            }

            inode.size -= DirEntry::SIZE as u32;
            *self.inode_mut(dir.inode_no) = inode;
            self.sync_inode(&inode);
            return Ok(());
        }

        Err(Error::NotFound)
    }

    /// 返回游标处的下一个存活目录项并前移游标；到尾部返回空。
    /// 空槽被跳过，不占用游标位置。
    pub fn read_dir(&self, dir: &mut Dir) -> Option<DirEntry> {
        let inode = self.inode(dir.inode_no);
        if dir.pos >= inode.size {
            return None;
        }

        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        let mut cur = 0;
        for lba in self.inode_block_table(&inode) {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut buf);
            for slot in 0..DirEntry::PER_SECTOR {
                let entry = DirEntry::decode_from(&buf[slot * DirEntry::SIZE..][..DirEntry::SIZE]);
                if entry.is_vacant() {
                    continue;
                }
                if cur < dir.pos {
                    cur += DirEntry::SIZE as u32;
                    continue;
                }
                dir.pos = cur + DirEntry::SIZE as u32;
                return Some(entry);
            }
        }
        None
    }

    /// 目录是否只剩 `.` 与 `..`
    #[inline]
    pub(crate) fn dir_is_empty(&self, dir: &Dir) -> bool {
        self.inode(dir.inode_no).size == 2 * DirEntry::SIZE as u32
    }

    /// 间接索引块是否已不含任何数据块
    fn indirect_is_empty(&self, inode: &DiskInode) -> bool {
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        self.read_sector(inode.sectors[DIRECT_COUNT], &mut buf);
        buf.iter().all(|&b| b == 0)
    }
}
