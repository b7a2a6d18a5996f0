//! Common utilities for tests

#![allow(unused)]

use std::sync::{Arc, Mutex};

use tiny_fs::{BlockDevice, Console, FdTable, FileSystem, OpenFlag, SECTOR_SIZE};

pub const TEST_SECTORS: u32 = 8192;

/// 内存盘：一段扇区数组，测试里充当块设备驱动
#[derive(Debug)]
pub struct RamDisk(Mutex<Vec<u8>>);

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self(Mutex::new(vec![0; sectors * SECTOR_SIZE]))
    }

    /// 整盘快照，用于断言"失败的操作未留下任何痕迹"
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl BlockDevice for RamDisk {
    fn read_sector(&self, lba: usize, buf: &mut [u8]) {
        let data = self.0.lock().unwrap();
        buf.copy_from_slice(&data[lba * SECTOR_SIZE..lba * SECTOR_SIZE + buf.len()]);
    }

    fn write_sector(&self, lba: usize, buf: &[u8]) {
        let mut data = self.0.lock().unwrap();
        data[lba * SECTOR_SIZE..lba * SECTOR_SIZE + buf.len()].copy_from_slice(buf);
    }
}

/// 捕获标准输出转发的控制台
#[derive(Debug, Default)]
pub struct TestConsole(pub Mutex<String>);

impl Console for TestConsole {
    fn put_str(&self, s: &str) {
        self.0.lock().unwrap().push_str(s);
    }
}

pub fn fresh() -> (Arc<RamDisk>, Arc<spin::Mutex<FileSystem>>) {
    let device = Arc::new(RamDisk::new(TEST_SECTORS as usize));
    let fs = FileSystem::format(device.clone(), 0, TEST_SECTORS).unwrap();
    (device, fs)
}

/// 创建一个空的普通文件
pub fn touch(fs: &mut FileSystem, fdt: &mut FdTable, path: &str) {
    let fd = fs.open(fdt, path, OpenFlag::CREATE.into()).unwrap();
    fs.close(fdt, fd).unwrap();
}

/// 按遍历顺序收集目录下的所有名字
pub fn names(fs: &mut FileSystem, path: &str) -> Vec<String> {
    let mut dir = fs.open_dir(path).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = fs.read_dir(&mut dir) {
        names.push(entry.name().to_string());
    }
    fs.close_dir(dir);
    names
}
