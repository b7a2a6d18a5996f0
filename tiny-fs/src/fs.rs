//! # 分区管理层
//!
//! [`FileSystem`] 是文件系统的上下文对象：持有块设备、超级块、常驻内存的两张位图、
//! 打开 inode 表与全局打开文件表。所有操作都经由它进行，引擎内部不加锁，
//! 构造函数返回 `Arc<Mutex<_>>`，由调用方的运行时串行化各入口。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::SectorBuf;
use crate::file::{Console, OpenFile};
use crate::layout::*;
use crate::{BITS_PER_SECTOR, MAX_FILES_PER_PART, MAX_FILE_OPEN, ROOT_INODE, SECTOR_SIZE};
use crate::{BlockDevice, Error, Result};

#[derive(Debug)]
pub struct FileSystem {
    device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    block_bitmap: Bitmap,
    inode_bitmap: Bitmap,
    /// 打开 inode 表：inode 号 → 记录与引用计数
    open_inodes: BTreeMap<u32, OpenInode>,
    /// 全局打开文件表，任务侧的描述符是此表的下标
    pub(crate) file_table: [Option<OpenFile>; MAX_FILE_OPEN],
    pub(crate) console: Option<Arc<dyn Console>>,
}

/// 打开 inode 表的槽位。引用计数归零即移出，移出不触发写回。
#[derive(Debug)]
struct OpenInode {
    inode: DiskInode,
    refs: u32,
}

impl FileSystem {
    /// 在未格式化的分区上建立文件系统，然后挂载。
    ///
    /// 布局顺序固定：引导扇区、超级块、块位图、inode位图、inode表、数据区，
    /// 各区域连续且扇区数恰好加和为 `sec_cnt`。
    pub fn format(
        device: Arc<dyn BlockDevice>,
        part_lba_base: u32,
        sec_cnt: u32,
    ) -> Result<Arc<Mutex<Self>>> {
        let inode_bitmap_sects = MAX_FILES_PER_PART.div_ceil(BITS_PER_SECTOR) as u32;
        let inode_table_sects =
            (MAX_FILES_PER_PART * DiskInode::SIZE).div_ceil(SECTOR_SIZE) as u32;

        // 引导扇区与超级块各占一个扇区
        let used_sects = 2 + inode_bitmap_sects + inode_table_sects;
        if sec_cnt < used_sects + 2 {
            log::error!("partition of {sec_cnt} sectors is too small to format");
            return Err(Error::Exhausted);
        }

        // 剩余扇区在块位图与数据区之间拆分，保证位图能覆盖整个数据区
        let free_sects = sec_cnt - used_sects;
        let block_bitmap_sects =
            (free_sects + BITS_PER_SECTOR as u32) / (BITS_PER_SECTOR as u32 + 1);
        let data_sects = free_sects - block_bitmap_sects;

        let sb = SuperBlock {
            magic: crate::MAGIC,
            sec_cnt,
            inode_cnt: MAX_FILES_PER_PART as u32,
            part_lba_base,
            block_bitmap_lba: part_lba_base + 2,
            block_bitmap_sects,
            inode_bitmap_lba: part_lba_base + 2 + block_bitmap_sects,
            inode_bitmap_sects,
            inode_table_lba: part_lba_base + 2 + block_bitmap_sects + inode_bitmap_sects,
            inode_table_sects,
            data_start_lba: part_lba_base
                + 2
                + block_bitmap_sects
                + inode_bitmap_sects
                + inode_table_sects,
            root_inode_no: ROOT_INODE,
            dir_entry_size: DirEntry::SIZE as u32,
        };

        log::info!(
            "format: magic=0x{:x} part_lba_base=0x{:x} sec_cnt=0x{:x} inode_cnt=0x{:x}",
            sb.magic,
            sb.part_lba_base,
            sb.sec_cnt,
            sb.inode_cnt,
        );
        log::info!(
            "format: block_bitmap_lba=0x{:x}({}) inode_bitmap_lba=0x{:x}({}) inode_table_lba=0x{:x}({}) data_start_lba=0x{:x}",
            sb.block_bitmap_lba,
            sb.block_bitmap_sects,
            sb.inode_bitmap_lba,
            sb.inode_bitmap_sects,
            sb.inode_table_lba,
            sb.inode_table_sects,
            sb.data_start_lba,
        );

        // 1. 超级块写入分区的 1 号扇区
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        sb.encode_into(&mut buf);
        device.write_sector(sb.part_lba_base as usize + 1, &buf);

        // 2. 块位图：0 号数据块预留给根目录；位图覆盖范围超出数据区的尾部位全部置 1
        let mut block_bitmap = Bitmap::new(sb.block_bitmap_lba, sb.block_bitmap_sects);
        block_bitmap.set(0);
        for bit in data_sects..block_bitmap.capacity() as u32 {
            block_bitmap.set(bit);
        }
        block_bitmap.flush(&device);

        // 3. inode 位图：0 号 inode 分给根目录。
        // 4096 个 inode 恰好占满一个位图扇区，没有需要置 1 的尾部位。
        let mut inode_bitmap = Bitmap::new(sb.inode_bitmap_lba, sb.inode_bitmap_sects);
        inode_bitmap.set(ROOT_INODE);
        inode_bitmap.flush(&device);

        // 4. inode 表清零，0 号记录指向根目录的首个数据块
        buf.fill(0);
        for s in 1..sb.inode_table_sects {
            device.write_sector((sb.inode_table_lba + s) as usize, &buf);
        }
        let mut root = DiskInode::init(ROOT_INODE);
        root.size = 2 * DirEntry::SIZE as u32;
        root.sectors[0] = sb.data_start_lba;
        root.encode_into(&mut buf[..DiskInode::SIZE]);
        device.write_sector(sb.inode_table_lba as usize, &buf);

        // 5. 根目录的数据块：写入 . 与 ..
        buf.fill(0);
        let dot = DirEntry::new(".", ROOT_INODE, FileKind::Directory)?;
        dot.encode_into(&mut buf[..DirEntry::SIZE]);
        let dotdot = DirEntry::new("..", ROOT_INODE, FileKind::Directory)?;
        dotdot.encode_into(&mut buf[DirEntry::SIZE..2 * DirEntry::SIZE]);
        device.write_sector(sb.data_start_lba as usize, &buf);

        log::info!("format done");
        Self::mount(device, part_lba_base)
    }

    /// 装载已格式化的分区：校验魔数，把两张位图读入内存，常驻打开根目录。
    pub fn mount(device: Arc<dyn BlockDevice>, part_lba_base: u32) -> Result<Arc<Mutex<Self>>> {
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        device.read_sector(part_lba_base as usize + 1, &mut buf);
        let sb = SuperBlock::decode_from(&buf);
        if !sb.is_valid() {
            log::error!("no filesystem at lba 0x{part_lba_base:x}");
            return Err(Error::BadMagic);
        }

        let block_bitmap = Bitmap::load(&device, sb.block_bitmap_lba, sb.block_bitmap_sects);
        let inode_bitmap = Bitmap::load(&device, sb.inode_bitmap_lba, sb.inode_bitmap_sects);

        let mut fs = Self {
            device,
            super_block: sb,
            block_bitmap,
            inode_bitmap,
            open_inodes: BTreeMap::new(),
            file_table: [None; MAX_FILE_OPEN],
            console: None,
        };
        // 根目录常驻打开，句柄的开闭在此计数之上对称进行
        fs.open_inode(ROOT_INODE);

        log::info!("mount done: part_lba_base=0x{part_lba_base:x}");
        Ok(Arc::new(Mutex::new(fs)))
    }

    /// 探测分区上的文件系统，没有则先格式化再挂载
    pub fn mount_or_format(
        device: Arc<dyn BlockDevice>,
        part_lba_base: u32,
        sec_cnt: u32,
    ) -> Result<Arc<Mutex<Self>>> {
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        device.read_sector(part_lba_base as usize + 1, &mut buf);
        if SuperBlock::decode_from(&buf).is_valid() {
            log::info!("partition at lba 0x{part_lba_base:x} has filesystem");
            Self::mount(device, part_lba_base)
        } else {
            Self::format(device, part_lba_base, sec_cnt)
        }
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// 安装标准输出转发的控制台；仅用于诊断文本，不参与正确性
    #[inline]
    pub fn set_console(&mut self, console: Arc<dyn Console>) {
        self.console = Some(console);
    }
}

/* 扇区读写 */
impl FileSystem {
    #[inline]
    pub(crate) fn read_sector(&self, lba: u32, buf: &mut SectorBuf) {
        self.device.read_sector(lba as usize, buf);
    }

    #[inline]
    pub(crate) fn write_sector(&self, lba: u32, buf: &SectorBuf) {
        self.device.write_sector(lba as usize, buf);
    }
}

/* 空闲单元分配 */
impl FileSystem {
    /// 分配一个数据块并立即同步其位图扇区，返回绝对 lba
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        let bit = self.block_bitmap.alloc().inspect_err(|_| {
            log::error!("block bitmap exhausted");
        })?;
        self.block_bitmap.sync(&self.device, bit);
        Ok(self.super_block.data_start_lba + bit)
    }

    /// 归还数据块并同步其位图扇区
    pub(crate) fn free_block(&mut self, lba: u32) {
        let bit = lba - self.super_block.data_start_lba;
        self.block_bitmap.free(bit);
        self.block_bitmap.sync(&self.device, bit);
    }

    /// 只在内存位图中占用一个 inode 位。
    /// 创建操作把位图同步安排在元数据全部落盘之后，失败回滚时无痕。
    pub(crate) fn alloc_inode_no(&mut self) -> Result<u32> {
        self.inode_bitmap.alloc().inspect_err(|_| {
            log::error!("inode bitmap exhausted");
        })
    }

    /// 在内存位图中清除 inode 位，不触盘
    #[inline]
    pub(crate) fn free_inode_no(&mut self, no: u32) {
        self.inode_bitmap.free(no);
    }

    #[inline]
    pub(crate) fn sync_inode_bitmap(&self, no: u32) {
        self.inode_bitmap.sync(&self.device, no);
    }
}

/* inode 存取 */
impl FileSystem {
    /// 打开 inode：已在表中则引用计数加一，否则从磁盘读入
    pub(crate) fn open_inode(&mut self, no: u32) {
        if let Some(slot) = self.open_inodes.get_mut(&no) {
            slot.refs += 1;
            return;
        }
        let inode = self.read_disk_inode(no);
        self.open_inodes.insert(no, OpenInode { inode, refs: 1 });
    }

    /// 关闭 inode：计数归零移出打开表。写回由 [`Self::sync_inode`] 另行负责。
    pub(crate) fn close_inode(&mut self, no: u32) {
        let slot = self.open_inodes.get_mut(&no).unwrap();
        slot.refs -= 1;
        if slot.refs == 0 {
            self.open_inodes.remove(&no);
        }
    }

    /// 把新建的 inode 直接登记进打开表，引用计数为 1
    pub(crate) fn register_inode(&mut self, inode: DiskInode) {
        let no = inode.no;
        assert!(self.open_inodes.insert(no, OpenInode { inode, refs: 1 }).is_none());
    }

    /// 打开表中 inode 的副本。调用前提：该 inode 已打开。
    #[inline]
    pub(crate) fn inode(&self, no: u32) -> DiskInode {
        self.open_inodes[&no].inode
    }

    #[inline]
    pub(crate) fn inode_mut(&mut self, no: u32) -> &mut DiskInode {
        &mut self.open_inodes.get_mut(&no).unwrap().inode
    }

    #[inline]
    pub(crate) fn is_inode_open(&self, no: u32) -> bool {
        self.open_inodes.contains_key(&no)
    }

    fn read_disk_inode(&self, no: u32) -> DiskInode {
        let (lba, offset) = DiskInode::table_pos(self.super_block.inode_table_lba, no);
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        self.read_sector(lba, &mut buf);
        DiskInode::decode_from(&buf[offset..offset + DiskInode::SIZE])
    }

    /// 把 inode 记录写回 inode 表。
    /// 多条记录共享一个扇区，必须读-改-写，只覆盖本记录的字节。
    pub(crate) fn sync_inode(&self, inode: &DiskInode) {
        let (lba, offset) = DiskInode::table_pos(self.super_block.inode_table_lba, inode.no);
        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        self.read_sector(lba, &mut buf);
        inode.encode_into(&mut buf[offset..offset + DiskInode::SIZE]);
        self.write_sector(lba, &buf);
    }

    /// 释放 inode：归还其全部数据块与间接索引块，再清除位图位。
    /// 调用前提：该 inode 不在打开表中，也不再被任何目录项引用。
    pub(crate) fn release_inode(&mut self, no: u32) {
        debug_assert!(!self.is_inode_open(no));

        let inode = self.read_disk_inode(no);
        for lba in self.inode_block_table(&inode) {
            if lba != 0 {
                self.free_block(lba);
            }
        }
        if inode.sectors[DIRECT_COUNT] != 0 {
            self.free_block(inode.sectors[DIRECT_COUNT]);
        }

        self.inode_bitmap.free(no);
        self.inode_bitmap.sync(&self.device, no);
    }
}

/* inode 的数据块寻址 */
impl FileSystem {
    /// 展开 inode 的全部块索引：140 个槽位，0 表示未分配
    pub(crate) fn inode_block_table(&self, inode: &DiskInode) -> Vec<u32> {
        let mut table = Vec::with_capacity(INODE_BLOCK_CAP);
        table.extend_from_slice(&inode.sectors[..DIRECT_COUNT]);

        if inode.sectors[DIRECT_COUNT] != 0 {
            let mut buf: SectorBuf = [0; SECTOR_SIZE];
            self.read_sector(inode.sectors[DIRECT_COUNT], &mut buf);
            for i in 0..INDIRECT_COUNT {
                table.push(get_u32(&buf, i * 4));
            }
        } else {
            table.resize(INODE_BLOCK_CAP, 0);
        }
        table
    }

    /// 把 lba 填进 inode 的第 `index` 个块槽位。
    /// 首次触及间接区域时就地分配并清零间接索引块。
    pub(crate) fn inode_set_block(
        &mut self,
        inode: &mut DiskInode,
        index: usize,
        lba: u32,
    ) -> Result<()> {
        if index < DIRECT_COUNT {
            inode.sectors[index] = lba;
            return Ok(());
        }
        assert!(index < INODE_BLOCK_CAP);

        if inode.sectors[DIRECT_COUNT] == 0 {
            let indirect = self.alloc_block()?;
            let zero: SectorBuf = [0; SECTOR_SIZE];
            self.write_sector(indirect, &zero);
            inode.sectors[DIRECT_COUNT] = indirect;
        }

        let mut buf: SectorBuf = [0; SECTOR_SIZE];
        self.read_sector(inode.sectors[DIRECT_COUNT], &mut buf);
        put_u32(&mut buf, (index - DIRECT_COUNT) * 4, lba);
        self.write_sector(inode.sectors[DIRECT_COUNT], &buf);
        Ok(())
    }
}
