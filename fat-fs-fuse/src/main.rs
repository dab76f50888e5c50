use clap::{App, Arg};
use fat_fs::{BlockDevice, DeviceError, FatFileSystem, BLOCK_SZ};
use log::{warn, Level, LevelFilter, Log, Metadata, Record};
use std::fs::{read_dir, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

/// File-backed virtual disk.
struct BlockFile(Mutex<std::fs::File>);

impl BlockFile {
    /// Open (creating if needed) `path` sized to `total_blocks` blocks.
    fn open<P: AsRef<Path>>(path: P, total_blocks: usize) -> std::io::Result<Arc<Self>> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        f.set_len((total_blocks * BLOCK_SZ) as u64)?;
        Ok(Arc::new(BlockFile(Mutex::new(f))))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().map_err(|_| DeviceError)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
            .map_err(|_| DeviceError)?;
        file.read_exact(buf).map_err(|_| DeviceError)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        let mut file = self.0.lock().map_err(|_| DeviceError)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
            .map_err(|_| DeviceError)?;
        file.write_all(buf).map_err(|_| DeviceError)
    }
}

/// Print log records to the console with a per-level color.
struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }
    fn log(&self, record: &Record) {
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 34,  // Blue
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        println!(
            "\u{1B}[{}m[{:>5}] {}\u{1B}[0m",
            color,
            record.level(),
            record.args()
        );
    }
    fn flush(&self) {}
}

fn init_logger() {
    static LOGGER: SimpleLogger = SimpleLogger;
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(match std::env::var("LOG").as_deref() {
        Ok("error") => LevelFilter::Error,
        Ok("warn") => LevelFilter::Warn,
        Ok("info") => LevelFilter::Info,
        Ok("debug") => LevelFilter::Debug,
        Ok("trace") => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    });
}

pub fn main() {
    init_logger();
    fs_pack().expect("Error when creating the volume image");
}

/// Format a volume image and pack the files of a host directory into it.
fn fs_pack() -> std::io::Result<()> {
    let matches = App::new("FatFileSystem packer")
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .help("Volume image path"),
        )
        .arg(
            Arg::with_name("blocks")
                .short("b")
                .long("blocks")
                .takes_value(true)
                .help("Total block count of the volume"),
        )
        .arg(
            Arg::with_name("source")
                .short("s")
                .long("source")
                .takes_value(true)
                .help("Directory whose regular files are packed in"),
        )
        .get_matches();

    let image = matches.value_of("image").unwrap_or("fs.img");
    let blocks: u16 = matches
        .value_of("blocks")
        .unwrap_or("4096")
        .parse()
        .expect("blocks must be a block count");

    let device = BlockFile::open(image, blocks as usize)?;
    let mut fs = FatFileSystem::format(device, blocks).expect("formatting failed");

    if let Some(src) = matches.value_of("source") {
        for dirent in read_dir(src)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let name = match dirent.file_name().into_string() {
                Ok(name) => name,
                Err(_) => {
                    warn!("skipping file with a non-unicode name");
                    continue;
                }
            };
            let mut data = Vec::new();
            std::fs::File::open(dirent.path())?.read_to_end(&mut data)?;

            if let Err(e) = fs.create(&name) {
                warn!("skipping {}: {}", name, e);
                continue;
            }
            let fd = fs.open(&name).expect("just created");
            let written = fs.write(fd, &data).expect("write failed");
            if written < data.len() {
                warn!("{}: short write, {} of {} bytes", name, written, data.len());
            }
            fs.close(fd).expect("close failed");
            println!("packed {} ({} bytes)", name, written);
        }
    }

    println!("{}", fs.info());
    fs.unmount().expect("unmount failed");
    Ok(())
}

#[test]
fn fs_test() -> std::io::Result<()> {
    let path = std::env::temp_dir().join("fat-fs-fuse-test.img");
    let device = BlockFile::open(&path, 4096)?;
    FatFileSystem::format(device.clone(), 4096).unwrap().unmount().unwrap();
    let mut fs = FatFileSystem::mount(device.clone()).unwrap();

    fs.create("filea").unwrap();
    fs.create("fileb").unwrap();
    for entry in fs.list() {
        println!("{} ({} bytes)", entry.name, entry.size);
    }

    let fd = fs.open("filea").unwrap();
    let greet_str = "Hello, world!";
    fs.write(fd, greet_str.as_bytes()).unwrap();
    fs.seek(fd, 0).unwrap();
    let mut buffer = [0u8; 233];
    let len = fs.read(fd, &mut buffer).unwrap();
    assert_eq!(greet_str, core::str::from_utf8(&buffer[..len]).unwrap());
    fs.close(fd).unwrap();

    let random_str_test = |fs: &mut FatFileSystem, name: &str, len: usize| {
        fs.create(name).unwrap();
        let fd = fs.open(name).unwrap();
        let mut str = String::new();
        // random digits
        for _ in 0..len {
            str.push(char::from(b'0' + rand::random::<u8>() % 10));
        }
        assert_eq!(fs.write(fd, str.as_bytes()).unwrap(), len);
        fs.seek(fd, 0).unwrap();
        let mut read_buffer = [0u8; 127];
        let mut read_str = String::new();
        loop {
            let len = fs.read(fd, &mut read_buffer).unwrap();
            if len == 0 {
                break;
            }
            read_str.push_str(core::str::from_utf8(&read_buffer[..len]).unwrap());
        }
        assert_eq!(str, read_str);
        fs.close(fd).unwrap();
    };

    random_str_test(&mut fs, "rand0", 4 * BLOCK_SZ);
    random_str_test(&mut fs, "rand1", 8 * BLOCK_SZ + BLOCK_SZ / 2);
    random_str_test(&mut fs, "rand2", 100 * BLOCK_SZ);
    random_str_test(&mut fs, "rand3", 70 * BLOCK_SZ + BLOCK_SZ / 7);

    fs.unmount().unwrap();

    // everything must still be there after a remount
    let fs = FatFileSystem::mount(device).unwrap();
    let listing = fs.list();
    assert_eq!(listing.len(), 6);
    assert_eq!(listing[2].size as usize, 4 * BLOCK_SZ);
    fs.unmount().unwrap();
    Ok(())
}

#[test]
fn metadata_round_trip_is_bit_identical() -> std::io::Result<()> {
    let path = std::env::temp_dir().join("fat-fs-fuse-roundtrip.img");
    let device = BlockFile::open(&path, 64)?;
    let mut fs = FatFileSystem::format(device.clone(), 64).unwrap();
    fs.create("stable").unwrap();
    let fd = fs.open("stable").unwrap();
    fs.write(fd, &[7u8; 3 * BLOCK_SZ + 11]).unwrap();
    fs.close(fd).unwrap();
    fs.unmount().unwrap();

    let before = std::fs::read(&path)?;
    let fs = FatFileSystem::mount(device).unwrap();
    fs.unmount().unwrap();
    let after = std::fs::read(&path)?;
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn packed_volume_exhausts_cleanly() -> std::io::Result<()> {
    let path = std::env::temp_dir().join("fat-fs-fuse-exhaust.img");
    // 8 blocks leave 4 usable data blocks
    let device = BlockFile::open(&path, 8)?;
    let mut fs = FatFileSystem::format(device, 8).unwrap();
    fs.create("big").unwrap();
    let fd = fs.open("big").unwrap();
    let written = fs.write(fd, &[1u8; 6 * BLOCK_SZ]).unwrap();
    assert_eq!(written, 4 * BLOCK_SZ);
    assert_eq!(fs.info().free_data_blocks, 0);
    fs.close(fd).unwrap();
    fs.delete("big").unwrap();
    assert_eq!(fs.info().free_data_blocks, 4);
    fs.unmount().unwrap();
    Ok(())
}
