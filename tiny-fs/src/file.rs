//! # 文件描述符层
//!
//! 应用代码看到的操作面。任务侧的 [`FdTable`] 把小整数描述符映射到
//! 全局打开文件表的槽位；0/1/2 号描述符预留给标准流，写向标准输出的
//! 数据绕过文件系统、直接转发给控制台协作者。
//!
//! 多步创建操作（建文件、建目录）按阶段推进，任一阶段失败都把已提交的
//! 阶段逆序撤销后才返回错误，不让半成品落在盘上。

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;

use enumflags2::{BitFlags, bitflags};

use crate::FileSystem;
use crate::SectorBuf;
use crate::dir::Dir;
use crate::layout::*;
use crate::path;
use crate::{Error, Result};
use crate::{ROOT_INODE, SECTOR_SIZE};

pub const STDIN: usize = 0;
pub const STDOUT: usize = 1;
pub const STDERR: usize = 2;

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0b001,
    /// 读写兼备
    RDWR   = 0b010,
    /// 不存在则创建
    CREATE = 0b100,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0b000;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }
}

/// seek 的基准位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    /// 文件开头
    Set,
    /// 当前读写位置
    Cur,
    /// 文件末尾
    End,
}

/// 标准输出的去处，只承载诊断文本，不参与文件系统的正确性
pub trait Console: Debug + Send + Sync {
    fn put_str(&self, s: &str);
}

/// 全局打开文件表的表项。
/// 同一 inode 可以占据多个表项（多次打开），各表项的读写位置互不影响。
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenFile {
    pub inode_no: u32,
    pub flags: BitFlags<OpenFlag>,
    /// 文件内的读写偏移
    pub pos: u32,
}

/// 任务侧的描述符表：描述符 → 全局打开文件表下标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdEntry {
    Stdin,
    Stdout,
    Stderr,
    File(usize),
}

#[derive(Debug, Clone)]
pub struct FdTable {
    slots: Vec<Option<FdEntry>>,
}

impl FdTable {
    pub fn new() -> Self {
        Self {
            slots: vec![
                Some(FdEntry::Stdin),
                Some(FdEntry::Stdout),
                Some(FdEntry::Stderr),
            ],
        }
    }

    /// 占用编号最小的空槽位，返回新描述符
    pub(crate) fn insert(&mut self, global: usize) -> usize {
        let fd = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| {
                self.slots.push(None);
                self.slots.len() - 1
            });
        self.slots[fd] = Some(FdEntry::File(global));
        fd
    }

    pub(crate) fn remove(&mut self, fd: usize) -> Option<FdEntry> {
        self.slots.get_mut(fd)?.take()
    }

    #[inline]
    pub fn get(&self, fd: usize) -> Option<FdEntry> {
        self.slots.get(fd).copied().flatten()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem {
    /// 打开或创建文件，返回任务侧描述符。
    /// 目录请走 [`FileSystem::open_dir`]。
    pub fn open(&mut self, fdt: &mut FdTable, path: &str, flags: BitFlags<OpenFlag>) -> Result<usize> {
        if path.ends_with('/') {
            log::error!("cannot open a directory {path:?}, use open_dir instead");
            return Err(Error::IsADirectory);
        }

        let path_depth = path::depth(path);
        let (found, record) = self.search_file(path)?;
        let parent = record.parent;

        // 失败情况1：终点是目录
        if record.kind == FileKind::Directory {
            log::error!("cannot open a directory {path:?} with open(), use open_dir instead");
            self.close_dir(parent);
            return Err(Error::IsADirectory);
        }

        // 失败情况2：某个中间分量不是目录或不存在
        if path::depth(&record.searched) != path_depth {
            log::error!(
                "cannot access {path:?}: subpath {:?} does not exist",
                record.searched
            );
            self.close_dir(parent);
            return Err(Error::SubpathMissing);
        }

        // 失败情况3：存在性与 CREATE 标志不相容
        let result = match (found, flags.contains(OpenFlag::CREATE)) {
            (Some(_), true) => {
                log::error!("{path:?} already exists");
                Err(Error::AlreadyExists)
            }
            (None, false) => {
                log::error!("file {path:?} does not exist");
                Err(Error::NotFound)
            }
            (Some(inode_no), false) => self.open_existing(fdt, inode_no, flags),
            (None, true) => {
                log::debug!("creating file {path:?}");
                let name = record.searched.rsplit('/').next().unwrap();
                self.create_file(fdt, &parent, name, flags)
            }
        };

        self.close_dir(parent);
        result
    }

    /// 关闭描述符并释放其全局表项；标准流永不释放
    pub fn close(&mut self, fdt: &mut FdTable, fd: usize) -> Result<()> {
        if fd <= STDERR {
            return Err(Error::InvalidArgument);
        }
        match fdt.remove(fd) {
            Some(FdEntry::File(index)) => {
                let file = self.file_table[index].take().ok_or(Error::InvalidArgument)?;
                self.close_inode(file.inode_no);
                Ok(())
            }
            _ => Err(Error::InvalidArgument),
        }
    }

    /// 从当前读写位置读入 `buf`，返回实际读到的字节数；文件尾返回 0
    pub fn read(&mut self, fdt: &FdTable, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let index = self.fd_global(fdt, fd)?;
        let file = self.file_table[index].ok_or(Error::InvalidArgument)?;
        if file.flags.contains(OpenFlag::WRONLY) {
            log::error!("fd={fd} is write-only");
            return Err(Error::InvalidArgument);
        }

        let inode = self.inode(file.inode_no);
        let read = self.read_file_at(&inode, file.pos, buf);
        self.file_table[index].as_mut().unwrap().pos += read as u32;
        Ok(read)
    }

    /// 从当前读写位置写出 `buf`，按需扩展数据块，返回写入的字节数。
    /// 标准输出与标准错误转发给控制台，不经过文件系统。
    pub fn write(&mut self, fdt: &FdTable, fd: usize, buf: &[u8]) -> Result<usize> {
        let index = match fdt.get(fd) {
            Some(FdEntry::Stdout | FdEntry::Stderr) => {
                if let Some(console) = &self.console {
                    console.put_str(&String::from_utf8_lossy(buf));
                }
                return Ok(buf.len());
            }
            Some(FdEntry::File(index)) => index,
            _ => {
                log::error!("fd={fd} is not an open file");
                return Err(Error::InvalidArgument);
            }
        };

        let mut file = self.file_table[index].ok_or(Error::InvalidArgument)?;
        if !file.flags.intersects(OpenFlag::WRONLY | OpenFlag::RDWR) {
            log::error!("not allowed to write file without flag WRONLY or RDWR");
            return Err(Error::InvalidArgument);
        }

        let written = self.write_file_at(file.inode_no, file.pos, buf)?;
        file.pos += written as u32;
        self.file_table[index] = Some(file);
        Ok(written)
    }

    /// 重置读写位置，返回新的偏移。
    /// 合法区间是 `[0, size - 1]`，越界即错，空文件上 seek 必然失败。
    pub fn seek(&mut self, fdt: &FdTable, fd: usize, offset: i32, whence: SeekWhence) -> Result<u32> {
        let index = self.fd_global(fdt, fd)?;
        let mut file = self.file_table[index].ok_or(Error::InvalidArgument)?;
        let size = self.inode(file.inode_no).size as i64;

        let new_pos = match whence {
            SeekWhence::Set => offset as i64,
            SeekWhence::Cur => file.pos as i64 + offset as i64,
            SeekWhence::End => size + offset as i64,
        };
        if new_pos < 0 || new_pos > size - 1 {
            log::debug!("seek out of range: fd={fd} offset={offset} pos={new_pos}");
            return Err(Error::InvalidArgument);
        }

        file.pos = new_pos as u32;
        self.file_table[index] = Some(file);
        Ok(file.pos)
    }

    /// 删除普通文件：目录项清除、inode 连同数据块释放
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let path_depth = path::depth(path);
        let (found, record) = self.search_file(path)?;
        let parent = record.parent;

        if path::depth(&record.searched) != path_depth {
            log::error!(
                "cannot access {path:?}: subpath {:?} does not exist",
                record.searched
            );
            self.close_dir(parent);
            return Err(Error::SubpathMissing);
        }
        if record.kind == FileKind::Directory {
            log::error!("cannot delete a directory {path:?} with unlink(), use rmdir instead");
            self.close_dir(parent);
            return Err(Error::IsADirectory);
        }
        let Some(inode_no) = found else {
            log::error!("file {path:?} not found");
            self.close_dir(parent);
            return Err(Error::NotFound);
        };

        // 仍被某个表项打开的文件不可删除
        if self.file_table.iter().flatten().any(|f| f.inode_no == inode_no) {
            log::error!("file {path:?} is in use, not allowed to delete");
            self.close_dir(parent);
            return Err(Error::InUse);
        }

        if let Err(e) = self.delete_dir_entry(&parent, inode_no) {
            self.close_dir(parent);
            return Err(e);
        }
        self.release_inode(inode_no);
        self.close_dir(parent);
        Ok(())
    }

    /// 创建目录。分四个阶段推进，任何一步失败都逆序撤销已提交的阶段，
    /// 调用前后磁盘映像保持一致。
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let path_depth = path::depth(path);
        let (found, record) = self.search_file(path)?;
        let parent = record.parent;

        if found.is_some() {
            log::error!("file or directory {path:?} already exists");
            self.close_dir(parent);
            return Err(Error::AlreadyExists);
        }
        if path::depth(&record.searched) != path_depth {
            log::error!(
                "cannot access {path:?}: subpath {:?} does not exist",
                record.searched
            );
            self.close_dir(parent);
            return Err(Error::SubpathMissing);
        }

        // 阶段1：占用 inode 位（暂不同步）
        let inode_no = match self.alloc_inode_no() {
            Ok(no) => no,
            Err(e) => {
                self.close_dir(parent);
                return Err(e);
            }
        };

        // 要写入的三个目录项先行就绪；名字都经过解析器校验
        let name = record.searched.rsplit('/').next().unwrap();
        let dot = DirEntry::new(".", inode_no, FileKind::Directory);
        let dotdot = DirEntry::new("..", parent.inode_no(), FileKind::Directory);
        let entry = DirEntry::new(name, inode_no, FileKind::Directory);
        let (Ok(dot), Ok(dotdot), Ok(entry)) = (dot, dotdot, entry) else {
            self.free_inode_no(inode_no);
            self.close_dir(parent);
            return Err(Error::InvalidArgument);
        };

        // 阶段2：为 . 与 .. 分配并写入一个数据块，块位图随分配即刻同步
        let block = match self.alloc_block() {
            Ok(lba) => lba,
            Err(e) => {
                self.free_inode_no(inode_no);
                self.close_dir(parent);
                return Err(e);
            }
        };
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        dot.encode_into(&mut buf[..DirEntry::SIZE]);
        dotdot.encode_into(&mut buf[DirEntry::SIZE..2 * DirEntry::SIZE]);
        self.write_sector(block, &buf);

        let mut inode = DiskInode::init(inode_no);
        inode.size = 2 * DirEntry::SIZE as u32;
        inode.sectors[0] = block;

        // 阶段3：在父目录中登记自己
        if let Err(e) = self.sync_dir_entry(&parent, &entry) {
            self.free_block(block);
            self.free_inode_no(inode_no);
            self.close_dir(parent);
            return Err(e);
        }

        // 阶段4：父目录 inode、新 inode、inode 位图依次落盘
        let parent_inode = self.inode(parent.inode_no());
        self.sync_inode(&parent_inode);
        self.sync_inode(&inode);
        self.sync_inode_bitmap(inode_no);

        self.close_dir(parent);
        Ok(())
    }

    /// 删除空目录
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let path_depth = path::depth(path);
        let (found, record) = self.search_file(path)?;
        let parent = record.parent;

        if path::depth(&record.searched) != path_depth {
            log::error!(
                "cannot access {path:?}: subpath {:?} does not exist",
                record.searched
            );
            self.close_dir(parent);
            return Err(Error::SubpathMissing);
        }
        let Some(inode_no) = found else {
            log::error!("directory {path:?} not found");
            self.close_dir(parent);
            return Err(Error::NotFound);
        };
        if record.kind != FileKind::Directory {
            log::error!("{path:?} is a regular file");
            self.close_dir(parent);
            return Err(Error::NotADirectory);
        }
        if inode_no == ROOT_INODE {
            self.close_dir(parent);
            return Err(Error::InvalidArgument);
        }
        // 还有未关闭的句柄就不能释放 inode
        if self.is_inode_open(inode_no) {
            log::error!("directory {path:?} is in use, not allowed to delete");
            self.close_dir(parent);
            return Err(Error::InUse);
        }

        let dir = self.open_dir_inode(inode_no);
        let empty = self.dir_is_empty(&dir);
        self.close_dir(dir);
        if !empty {
            log::error!("directory {path:?} is not empty");
            self.close_dir(parent);
            return Err(Error::NotEmpty);
        }

        if let Err(e) = self.delete_dir_entry(&parent, inode_no) {
            self.close_dir(parent);
            return Err(e);
        }
        self.release_inode(inode_no);
        self.close_dir(parent);
        Ok(())
    }

    /// 打开目录；根目录及其 `.`/`..` 别名不经过任何查找
    pub fn open_dir(&mut self, path: &str) -> Result<Dir> {
        if matches!(path, "/" | "/." | "/..") {
            return Ok(self.open_dir_inode(ROOT_INODE));
        }

        let path_depth = path::depth(path);
        let (found, record) = self.search_file(path)?;
        let parent = record.parent;

        let result = match found {
            Some(inode_no) if record.kind == FileKind::Directory => {
                Ok(self.open_dir_inode(inode_no))
            }
            Some(_) => {
                log::error!("{path:?} is a regular file");
                Err(Error::NotADirectory)
            }
            None => {
                if path::depth(&record.searched) != path_depth {
                    log::error!(
                        "cannot access {path:?}: subpath {:?} does not exist",
                        record.searched
                    );
                    Err(Error::SubpathMissing)
                } else {
                    log::error!("directory {path:?} not found");
                    Err(Error::NotFound)
                }
            }
        };

        self.close_dir(parent);
        result
    }
}

/* 内部实现 */
impl FileSystem {
    fn fd_global(&self, fdt: &FdTable, fd: usize) -> Result<usize> {
        match fdt.get(fd) {
            Some(FdEntry::File(index)) => Ok(index),
            _ => {
                log::error!("fd={fd} is not an open file");
                Err(Error::InvalidArgument)
            }
        }
    }

    fn free_file_slot(&self) -> Result<usize> {
        self.file_table
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                log::error!("exceed max open files");
                Error::Exhausted
            })
    }

    /// 把已存在的 inode 装进一个新的全局表项
    fn open_existing(
        &mut self,
        fdt: &mut FdTable,
        inode_no: u32,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        let index = self.free_file_slot()?;
        self.open_inode(inode_no);
        self.file_table[index] = Some(OpenFile {
            inode_no,
            flags,
            pos: 0,
        });
        Ok(fdt.insert(index))
    }

    /// 创建普通文件并打开。阶段失败的撤销与 mkdir 同理。
    fn create_file(
        &mut self,
        fdt: &mut FdTable,
        parent: &Dir,
        name: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        let index = self.free_file_slot()?;

        // 阶段1：占用 inode 位（暂不同步）
        let inode_no = self.alloc_inode_no()?;

        // 阶段2：零尺寸的新 inode 进打开表
        let inode = DiskInode::init(inode_no);
        self.register_inode(inode);

        // 阶段3：在父目录中登记
        let entry = match DirEntry::new(name, inode_no, FileKind::Regular) {
            Ok(entry) => entry,
            Err(e) => {
                self.close_inode(inode_no);
                self.free_inode_no(inode_no);
                return Err(e);
            }
        };
        if let Err(e) = self.sync_dir_entry(parent, &entry) {
            self.close_inode(inode_no);
            self.free_inode_no(inode_no);
            return Err(e);
        }

        // 阶段4：新 inode、父目录 inode、inode 位图依次落盘
        self.sync_inode(&inode);
        let parent_inode = self.inode(parent.inode_no());
        self.sync_inode(&parent_inode);
        self.sync_inode_bitmap(inode_no);

        self.file_table[index] = Some(OpenFile {
            inode_no,
            flags,
            pos: 0,
        });
        Ok(fdt.insert(index))
    }

    /// 从指定偏移读出数据填充 `buf`，读取范围被文件尺寸截断
    fn read_file_at(&self, inode: &DiskInode, offset: u32, buf: &mut [u8]) -> usize {
        let mut start = offset as usize;
        let end = (start + buf.len()).min(inode.size as usize);
        if start >= end {
            return 0;
        }

        let table = self.inode_block_table(inode);
        let mut sector: SectorBuf = [0; SECTOR_SIZE];
        let mut read = 0;
        loop {
            let block_index = start / SECTOR_SIZE;
            let block_end = ((block_index + 1) * SECTOR_SIZE).min(end);
            let len = block_end - start;

            self.read_sector(table[block_index], &mut sector);
            buf[read..read + len]
                .copy_from_slice(&sector[start % SECTOR_SIZE..start % SECTOR_SIZE + len]);

            read += len;
            if block_end == end {
                break;
            }
            start = block_end;
        }
        read
    }

    /// 向指定偏移写入 `buf`，超出现有尺寸的部分逐块分配。
    /// 分配中途失败则释放本次新增的块后返回，文件保持原状。
    fn write_file_at(&mut self, inode_no: u32, offset: u32, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut inode = self.inode(inode_no);
        let end = offset as usize + buf.len();
        if end > DiskInode::MAX_SIZE as usize {
            log::error!("exceed max file size: {end} > {}", DiskInode::MAX_SIZE);
            return Err(Error::Exhausted);
        }

        // 扩块
        let had_indirect = inode.sectors[DIRECT_COUNT] != 0;
        let mut added: Vec<u32> = Vec::new();
        for index in DiskInode::count_data_block(inode.size)..DiskInode::count_data_block(end as u32)
        {
            let lba = match self.alloc_block() {
                Ok(lba) => lba,
                Err(e) => {
                    self.roll_back_grow(&added, &inode, had_indirect);
                    return Err(e);
                }
            };
            if let Err(e) = self.inode_set_block(&mut inode, index, lba) {
                self.free_block(lba);
                self.roll_back_grow(&added, &inode, had_indirect);
                return Err(e);
            }
            added.push(lba);
        }

        // 逐块拷贝；非整块的写需要先读后改
        let table = self.inode_block_table(&inode);
        let mut start = offset as usize;
        let mut sector: SectorBuf = [0; SECTOR_SIZE];
        let mut written = 0;
        loop {
            let block_index = start / SECTOR_SIZE;
            let block_end = ((block_index + 1) * SECTOR_SIZE).min(end);
            let len = block_end - start;

            if len < SECTOR_SIZE {
                self.read_sector(table[block_index], &mut sector);
            }
            sector[start % SECTOR_SIZE..start % SECTOR_SIZE + len]
                .copy_from_slice(&buf[written..written + len]);
            self.write_sector(table[block_index], &sector);

            written += len;
            if block_end == end {
                break;
            }
            start = block_end;
        }

        inode.size = inode.size.max(end as u32);
        *self.inode_mut(inode_no) = inode;
        self.sync_inode(&inode);
        Ok(written)
    }

    /// 撤销一次未完成的扩块：归还新增的数据块与本次新建的间接索引块
    fn roll_back_grow(&mut self, added: &[u32], inode: &DiskInode, had_indirect: bool) {
        for &lba in added.iter().rev() {
            self.free_block(lba);
        }
        if !had_indirect && inode.sectors[DIRECT_COUNT] != 0 {
            self.free_block(inode.sectors[DIRECT_COUNT]);
        }
    }
}
