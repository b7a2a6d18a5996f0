mod cli;

use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex};

use clap::Parser;
use cli::Cli;
use tiny_fs::{FdTable, FileSystem, OpenFlag, SECTOR_SIZE};
use tiny_fs_fuse::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("image={:?} sectors={}", cli.image, cli.sectors);

    let block_file = Arc::new(BlockFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.image)?;
        fd.set_len(cli.sectors as u64 * SECTOR_SIZE as u64)?;

        fd
    })));

    let fs = FileSystem::format(block_file, 0, cli.sectors).expect("format failed");
    let mut fs = fs.lock();
    let mut fdt = FdTable::new();

    if let Some(dir) = &cli.import {
        for host in std::fs::read_dir(dir)? {
            let host = host?;
            if !host.file_type()?.is_file() {
                continue;
            }
            let name = host
                .file_name()
                .into_string()
                .expect("file name is not UTF-8");
            let bytes = std::fs::read(host.path())?;
            println!("import: /{name} ({} bytes)", bytes.len());

            let fd = fs
                .open(&mut fdt, &format!("/{name}"), OpenFlag::CREATE | OpenFlag::WRONLY)
                .expect("create failed");
            fs.write(&fdt, fd, &bytes).expect("write failed");
            fs.close(&mut fdt, fd).unwrap();
        }
    }

    Ok(())
}
