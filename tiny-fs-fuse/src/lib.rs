
use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use tiny_fs::BlockDevice;
use tiny_fs::SECTOR_SIZE;

/// 宿主机文件充当块设备，扇区号线性映射为文件内偏移
#[derive(Debug)]
pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_sector(&self, lba: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((lba * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(file.read(buf).unwrap(), buf.len(), "not a complete sector!");
    }

    fn write_sector(&self, lba: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((lba * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            buf.len(),
            "not a complete sector!"
        );
    }
}
