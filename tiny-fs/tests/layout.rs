mod common;

use std::sync::Arc;

use common::RamDisk;
use tiny_fs::{
    DirEntry, DiskInode, Error, FileKind, FileSystem, MAGIC, SECTOR_SIZE, SuperBlock,
};

#[test]
fn record_sizes() {
    assert_eq!(512, SuperBlock::SIZE);
    assert_eq!(64, DiskInode::SIZE);
    assert_eq!(8, DiskInode::PER_SECTOR);
    assert_eq!(32, DirEntry::SIZE);
    assert_eq!(16, DirEntry::PER_SECTOR);
}

#[test]
fn super_block_round_trip() {
    let sb = SuperBlock {
        magic: MAGIC,
        sec_cnt: 8192,
        inode_cnt: 4096,
        part_lba_base: 100,
        block_bitmap_lba: 102,
        block_bitmap_sects: 2,
        inode_bitmap_lba: 104,
        inode_bitmap_sects: 1,
        inode_table_lba: 105,
        inode_table_sects: 512,
        data_start_lba: 617,
        root_inode_no: 0,
        dir_entry_size: 32,
    };

    let mut buf = [0u8; SuperBlock::SIZE];
    sb.encode_into(&mut buf);
    let decoded = SuperBlock::decode_from(&buf);
    assert!(decoded.is_valid());

    let mut buf2 = [0u8; SuperBlock::SIZE];
    decoded.encode_into(&mut buf2);
    assert_eq!(buf, buf2);
}

#[test]
fn disk_inode_round_trip() {
    let mut inode = DiskInode::init(7);
    inode.size = 4096;
    inode.sectors[0] = 620;
    inode.sectors[11] = 631;
    inode.sectors[12] = 700;

    let mut buf = [0u8; DiskInode::SIZE];
    inode.encode_into(&mut buf);
    let decoded = DiskInode::decode_from(&buf);
    assert_eq!(7, decoded.no);
    assert_eq!(4096, decoded.size);
    assert_eq!(inode.sectors, decoded.sectors);
}

#[test]
fn disk_inode_table_pos() {
    // 每扇区 8 条记录
    assert_eq!((105, 0), DiskInode::table_pos(105, 0));
    assert_eq!((105, 7 * 64), DiskInode::table_pos(105, 7));
    assert_eq!((106, 0), DiskInode::table_pos(105, 8));
    assert_eq!((105 + 511, 7 * 64), DiskInode::table_pos(105, 4095));
}

#[test]
fn dir_entry_round_trip() {
    let entry = DirEntry::new("hello.txt", 42, FileKind::Regular).unwrap();

    let mut buf = [0u8; DirEntry::SIZE];
    entry.encode_into(&mut buf);
    let decoded = DirEntry::decode_from(&buf);
    assert_eq!("hello.txt", decoded.name());
    assert_eq!(42, decoded.inode_no());
    assert_eq!(FileKind::Regular, decoded.kind());
    assert!(!decoded.is_vacant());

    // 全零的槽位是空闲槽
    let vacant = DirEntry::decode_from(&[0u8; DirEntry::SIZE]);
    assert!(vacant.is_vacant());
    assert_eq!(FileKind::Unknown, vacant.kind());
}

#[test]
fn dir_entry_name_bounds() {
    assert!(DirEntry::new("", 1, FileKind::Regular).is_err());
    assert!(DirEntry::new(&"x".repeat(23), 1, FileKind::Regular).is_ok());
    assert_eq!(
        Err(Error::InvalidArgument),
        DirEntry::new(&"x".repeat(24), 1, FileKind::Regular).map(|_| ())
    );
}

#[test]
fn format_region_layout() {
    for sec_cnt in [600u32, 4096, 8192, 65536] {
        let device = Arc::new(RamDisk::new(sec_cnt as usize));
        let fs = FileSystem::format(device, 0, sec_cnt).unwrap();
        let fs = fs.lock();
        let sb = fs.super_block();

        assert!(sb.is_valid());
        assert_eq!(sec_cnt, sb.sec_cnt);
        assert_eq!(4096, sb.inode_cnt);
        assert_eq!(0, sb.root_inode_no);
        assert_eq!(32, sb.dir_entry_size);

        // 区域依次相邻：引导扇区、超级块、块位图、inode位图、inode表、数据区
        assert_eq!(sb.part_lba_base + 2, sb.block_bitmap_lba);
        assert_eq!(
            sb.block_bitmap_lba + sb.block_bitmap_sects,
            sb.inode_bitmap_lba
        );
        assert_eq!(
            sb.inode_bitmap_lba + sb.inode_bitmap_sects,
            sb.inode_table_lba
        );
        assert_eq!(sb.inode_table_lba + sb.inode_table_sects, sb.data_start_lba);

        // 扇区数恰好加和为分区总扇区数，且块位图足以覆盖整个数据区
        let data_sects = sec_cnt - (sb.data_start_lba - sb.part_lba_base);
        assert_eq!(
            sec_cnt,
            2 + sb.block_bitmap_sects
                + sb.inode_bitmap_sects
                + sb.inode_table_sects
                + data_sects
        );
        assert!(sb.block_bitmap_sects as usize * SECTOR_SIZE * 8 >= data_sects as usize);
    }
}

#[test]
fn format_with_partition_base() {
    let base = 100;
    let sec_cnt = 4096;
    let device = Arc::new(RamDisk::new(base as usize + sec_cnt as usize));
    let fs = FileSystem::format(device, base, sec_cnt).unwrap();
    let fs = fs.lock();
    let sb = fs.super_block();

    assert_eq!(base, sb.part_lba_base);
    assert_eq!(base + 2, sb.block_bitmap_lba);
    assert_eq!(sec_cnt, sb.sec_cnt);
}

#[test]
fn format_too_small() {
    let device = Arc::new(RamDisk::new(100));
    assert!(matches!(
        FileSystem::format(device, 0, 100),
        Err(Error::Exhausted)
    ));
}

#[test]
fn mount_unformatted() {
    let device = Arc::new(RamDisk::new(1024));
    assert!(matches!(
        FileSystem::mount(device, 0),
        Err(Error::BadMagic)
    ));
}

#[test]
fn remount_reads_same_super_block() {
    let device = Arc::new(RamDisk::new(8192));
    let formatted = {
        let fs = FileSystem::format(device.clone(), 0, 8192).unwrap();
        let fs = fs.lock();
        fs.super_block().clone()
    };

    let fs = FileSystem::mount(device, 0).unwrap();
    let fs = fs.lock();
    let sb = fs.super_block();
    assert_eq!(formatted.data_start_lba, sb.data_start_lba);
    assert_eq!(formatted.block_bitmap_sects, sb.block_bitmap_sects);
    assert_eq!(formatted.inode_table_lba, sb.inode_table_lba);
}
