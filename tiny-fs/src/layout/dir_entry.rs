use super::{get_u32, put_u32};
use crate::SECTOR_SIZE;
use crate::{Error, Result};

/// 文件名的最大字节长度，最后一字节留给 \0
pub const NAME_LEN: usize = 23;

/// 目录项：文件名到 inode 号与类型的映射，打包存放在目录自身的数据块里。
/// 文件名首字节为 0 的槽位视为空闲，可被后续插入复用。
#[derive(Debug, Default, Clone)]
pub struct DirEntry {
    name: [u8; NAME_LEN + 1],
    inode_no: u32,
    kind: FileKind,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// 不支持的文件类型
    #[default]
    Unknown,
    Regular,
    Directory,
}

impl DirEntry {
    /// 记录大小恒为32字节
    pub const SIZE: usize = 32;
    pub const PER_SECTOR: usize = SECTOR_SIZE / Self::SIZE;

    pub fn new(name: &str, inode_no: u32, kind: FileKind) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > NAME_LEN {
            log::error!("invalid file name {name:?}");
            return Err(Error::InvalidArgument);
        }

        let mut buf = [0; NAME_LEN + 1];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            name: buf,
            inode_no,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap();
        core::str::from_utf8(&self.name[..len]).unwrap()
    }

    #[inline]
    pub fn inode_no(&self) -> u32 {
        self.inode_no
    }

    #[inline]
    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// 槽位是否空闲
    #[inline]
    pub fn is_vacant(&self) -> bool {
        self.name[0] == 0
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        assert_eq!(buf.len(), Self::SIZE);
        buf[..NAME_LEN + 1].copy_from_slice(&self.name);
        put_u32(buf, 24, self.inode_no);
        put_u32(buf, 28, self.kind as u32);
    }

    pub fn decode_from(buf: &[u8]) -> Self {
        assert_eq!(buf.len(), Self::SIZE);
        let mut name = [0; NAME_LEN + 1];
        name.copy_from_slice(&buf[..NAME_LEN + 1]);
        Self {
            name,
            inode_no: get_u32(buf, 24),
            kind: FileKind::from_u32(get_u32(buf, 28)),
        }
    }
}

impl FileKind {
    fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Regular,
            2 => Self::Directory,
            _ => Self::Unknown,
        }
    }
}
