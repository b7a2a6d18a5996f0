mod common;

use common::fresh;
use tiny_fs::{Error, FdTable, OpenFlag, depth};

#[test]
fn depth_counts_components() {
    assert_eq!(0, depth("/"));
    assert_eq!(1, depth("/a"));
    assert_eq!(3, depth("/a/b/c"));
    // 重复与尾随的分隔符不计
    assert_eq!(2, depth("/a//b/"));
    assert_eq!(1, depth("///a///"));
}

#[test]
fn root_aliases_resolve_to_inode_zero() {
    let (_device, fs) = fresh();
    let mut fs = fs.lock();

    for path in ["/", "/.", "/.."] {
        let dir = fs.open_dir(path).unwrap();
        assert_eq!(0, dir.inode_no());
        assert!(dir.is_root());
        fs.close_dir(dir);
    }
}

#[test]
fn relative_path_rejected() {
    let (_device, fs) = fresh();
    let mut fs = fs.lock();
    let mut fdt = FdTable::new();

    assert_eq!(
        Err(Error::InvalidArgument),
        fs.open(&mut fdt, "a.txt", OpenFlag::CREATE.into())
    );
    assert_eq!(Err(Error::InvalidArgument), fs.mkdir("relative/dir"));
}

#[test]
fn overlong_path_rejected() {
    let (_device, fs) = fresh();
    let mut fs = fs.lock();

    let path = format!("/{}", "a/".repeat(300));
    assert_eq!(Err(Error::InvalidArgument), fs.mkdir(&path));
}

#[test]
fn overlong_component_rejected() {
    let (_device, fs) = fresh();
    let mut fs = fs.lock();

    let path = format!("/{}", "x".repeat(24));
    assert_eq!(Err(Error::InvalidArgument), fs.mkdir(&path));
}

#[test]
fn resolution_stops_at_regular_file() {
    let (_device, fs) = fresh();
    let mut fs = fs.lock();
    let mut fdt = FdTable::new();

    common::touch(&mut fs, &mut fdt, "/file");

    // 中间分量是普通文件：不可继续下钻
    assert_eq!(
        Err(Error::SubpathMissing),
        fs.open(&mut fdt, "/file/below", OpenFlag::read_only())
    );
    assert_eq!(Err(Error::AlreadyExists), fs.mkdir("/file"));
    assert_eq!(Err(Error::NotADirectory), fs.open_dir("/file").map(|_| ()));
}
