#![no_std]

extern crate alloc;

/* tiny-fs 的整体架构，自上而下 */

// 文件描述符层：open/close/read/write/seek 等操作面
mod file;
pub use file::{Console, FdEntry, FdTable, OpenFlag, SeekWhence};
pub use file::{STDERR, STDIN, STDOUT};

// 路径解析层：把路径字符串逐级映射到 inode
mod path;
pub use path::depth;

// 目录服务层：目录项的查找、增删与遍历
mod dir;
pub use dir::Dir;

// 分区管理层：构建或装载磁盘布局，持有两张位图与打开表
mod fs;
pub use fs::FileSystem;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;
pub use layout::{DirEntry, DiskInode, FileKind, NAME_LEN, SuperBlock};

// 磁盘块设备接口层：读写磁盘块设备的接口
mod block_dev;
pub use block_dev::BlockDevice;

mod error;
pub use error::{Error, Result};

/// 超级块魔数，用于识别已格式化的分区
pub const MAGIC: u32 = 0x1959_0318;
pub const SECTOR_SIZE: usize = 512;
/// 每个位图扇区容纳的位数
pub const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;
/// 每个分区最多可创建的文件数
pub const MAX_FILES_PER_PART: usize = 4096;
/// 全局打开文件表的槽位数
pub const MAX_FILE_OPEN: usize = 32;
pub const MAX_PATH_LEN: usize = 512;
/// 根目录恒占 0 号 inode
pub const ROOT_INODE: u32 = 0;

type SectorBuf = [u8; SECTOR_SIZE];
