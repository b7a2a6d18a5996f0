//! # 块设备接口层
//!
//! [`BlockDevice`] 是对扇区级读写的抽象，实现了此特质的类型称为**块设备驱动**。
//! 读写都是同步的：调用返回即 I/O 完成。

use core::any::Any;
use core::fmt::Debug;

/// 块设备驱动特质
pub trait BlockDevice: Debug + Send + Sync + Any {
    fn read_sector(&self, lba: usize, buf: &mut [u8]);
    fn write_sector(&self, lba: usize, buf: &[u8]);
}
