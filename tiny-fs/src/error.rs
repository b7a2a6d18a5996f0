//! 文件系统逻辑错误以返回值的形式向上传递，从不用 panic 做控制流。

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    AlreadyExists,
    IsADirectory,
    NotADirectory,
    /// 路径的某个中间分量无法解析
    SubpathMissing,
    /// 删除目标仍被打开
    InUse,
    NotEmpty,
    /// 位图或地址空间已无可分配单元
    Exhausted,
    /// 超级块魔数不符，分区未格式化
    BadMagic,
    InvalidArgument,
}

pub type Result<T> = core::result::Result<T, Error>;
