//! # 路径解析层
//!
//! 把绝对路径逐级拆成分量，驱动目录服务从根目录一路向下查找。
//! [`SearchRecord`] 记录解析走到了哪里：调用方比较完整路径与已解析前缀的
//! 深度，就能区分"末级名字不存在"与"中间目录不存在"。

use alloc::string::String;

use crate::FileSystem;
use crate::dir::Dir;
use crate::layout::{FileKind, NAME_LEN};
use crate::{Error, Result};
use crate::{MAX_PATH_LEN, ROOT_INODE};

/// 一次路径查找的结果
pub(crate) struct SearchRecord {
    /// 终点的直接父目录；无论成败，调用方都必须关闭它
    pub parent: Dir,
    /// 终点的文件类型，未找到时为 [`FileKind::Unknown`]
    pub kind: FileKind,
    /// 成功解析的最长前缀，包含查找失败的那个分量
    pub searched: String,
}

/// 剥下最上层的路径分量，返回 `(分量, 未解析的剩余部分)`。
/// 连续的分隔符一并跳过；字符串耗尽时剩余部分为空。
pub(crate) fn parse_component(path: &str) -> (&str, Option<&str>) {
    let path = path.trim_start_matches('/');
    match path.split_once('/') {
        Some((name, rest)) => (name, Some(rest)),
        None => (path, None),
    }
}

/// 路径深度：`/a/b/c` 为 3，`/` 为 0，重复与尾随的分隔符不计
pub fn depth(path: &str) -> usize {
    let mut depth = 0;
    let mut rest = path;
    loop {
        let (name, next) = parse_component(rest);
        if !name.is_empty() {
            depth += 1;
        }
        match next {
            Some(next) => rest = next,
            None => break,
        }
    }
    depth
}

impl FileSystem {
    /// 从根目录开始逐级查找 `path`，找到则返回终点的 inode 号。
    ///
    /// 根目录与它的 `.`/`..` 别名直接返回，不做任何磁盘查找。
    /// 中途分量命中普通文件时立即带着该文件返回——是否允许由调用方
    /// 依据深度差裁决；分量未命中时返回空，记录保留最后的父目录。
    pub(crate) fn search_file(&mut self, path: &str) -> Result<(Option<u32>, SearchRecord)> {
        if matches!(path, "/" | "/." | "/..") {
            return Ok((
                Some(ROOT_INODE),
                SearchRecord {
                    parent: self.open_dir_inode(ROOT_INODE),
                    kind: FileKind::Directory,
                    searched: String::new(),
                },
            ));
        }

        if !path.starts_with('/') || path.len() >= MAX_PATH_LEN {
            log::error!("invalid path {path:?}");
            return Err(Error::InvalidArgument);
        }

        let mut parent = self.open_dir_inode(ROOT_INODE);
        // 已进入目录的上一级 inode 号
        let mut parent_no = ROOT_INODE;
        let mut terminal_no = ROOT_INODE;
        let mut searched = String::new();

        let (mut name, mut rest) = parse_component(path);
        while !name.is_empty() {
            if name.len() > NAME_LEN {
                self.close_dir(parent);
                log::error!("component {name:?} exceeds {NAME_LEN} bytes");
                return Err(Error::InvalidArgument);
            }

            searched.push('/');
            searched.push_str(name);

            let Some(entry) = self.search_dir_entry(&parent, name) else {
                return Ok((
                    None,
                    SearchRecord {
                        parent,
                        kind: FileKind::Unknown,
                        searched,
                    },
                ));
            };

            if entry.kind() != FileKind::Directory {
                // 命中普通文件：即使路径还有剩余分量也原样返回
                return Ok((
                    Some(entry.inode_no()),
                    SearchRecord {
                        parent,
                        kind: entry.kind(),
                        searched,
                    },
                ));
            }

            // 命中目录：下沉一级
            parent_no = parent.inode_no();
            self.close_dir(parent);
            parent = self.open_dir_inode(entry.inode_no());
            terminal_no = entry.inode_no();

            match rest {
                Some(next) => (name, rest) = parse_component(next),
                None => name = "",
            }
        }

        // 整条路径都是目录：此刻 parent 是终点自身，换成终点的父目录
        self.close_dir(parent);
        Ok((
            Some(terminal_no),
            SearchRecord {
                parent: self.open_dir_inode(parent_no),
                kind: FileKind::Directory,
                searched,
            },
        ))
    }
}
