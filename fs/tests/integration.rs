use std::fs::File;
use std::io::BufWriter;

use redlilium_fs::{
    BinaryArchiveReader, BinaryArchiveWriter, FileTypeId, FsError, MountKind, PackageWriter,
    PathConfig, Vfs, VfsConfig, load_config,
};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn dir_string(dir: &tempfile::TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

/// Deterministic filler so compressed and stored entries differ.
fn payload(seed: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + seed * 7) % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Loose files through a physical mount
// ---------------------------------------------------------------------------

#[test]
fn physical_mount_roundtrip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let root = dir_string(&dir);

    let vfs = Vfs::default();
    vfs.mount_physical(&root, "/assets/", 0).unwrap();

    let resolved = vfs.resolve_virtual_path("/assets/level1.scene");
    assert_eq!(
        resolved,
        PathConfig::default().combine(&root, "level1.scene")
    );

    vfs.write_file("/assets/level1.scene", b"scene data").unwrap();
    assert!(dir.path().join("level1.scene").exists());
    assert!(vfs.file_exists("/assets/level1.scene"));

    let first = vfs
        .open(FileTypeId::BINARY_READER, "/assets/level1.scene", false)
        .unwrap();
    assert_eq!(vfs.get_file(first).unwrap().read_all().unwrap(), b"scene data");
    vfs.close(first).unwrap();
    assert!(vfs.open_handles().is_empty());

    let second = vfs
        .open(FileTypeId::BINARY_READER, "/assets/level1.scene", false)
        .unwrap();
    assert_eq!(first, second);
    vfs.close(second).unwrap();
}

#[test]
fn nested_directories_are_listed() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::default();
    vfs.mount_physical(&dir_string(&dir), "/assets/", 0).unwrap();

    vfs.write_file("/assets/textures/brick.png", b"png").unwrap();
    vfs.write_file("/assets/textures/stone.png", b"png").unwrap();
    vfs.write_file("/assets/readme.txt", b"txt").unwrap();

    assert_eq!(
        vfs.list_dir("/assets/textures").unwrap(),
        vec!["brick.png".to_string(), "stone.png".to_string()]
    );
    assert!(vfs.list_dir("/assets/").unwrap().contains(&"readme.txt".to_string()));

    vfs.remove_file("/assets/readme.txt").unwrap();
    assert!(!vfs.file_exists("/assets/readme.txt"));
}

#[test]
fn double_close_is_not_found() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::default();
    vfs.mount_physical(&dir_string(&dir), "/data/", 0).unwrap();
    vfs.write_file("/data/a.bin", &[1, 2, 3]).unwrap();

    let handle = vfs.open(FileTypeId::BINARY_READER, "/data/a.bin", false).unwrap();
    vfs.close(handle).unwrap();
    assert!(matches!(vfs.close(handle), Err(FsError::NotFound(_))));
}

#[test]
fn missing_file_is_not_found() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::default();
    vfs.mount_physical(&dir_string(&dir), "/data/", 0).unwrap();

    let err = vfs
        .open(FileTypeId::BINARY_READER, "/data/missing.bin", false)
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(vfs.read_file("/nowhere/file.bin").unwrap_err().is_not_found());
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

#[test]
fn package_roundtrip_through_router() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let package_path = dir.path().join("content.rlpk");

    let mut expected = Vec::new();
    {
        let file = BufWriter::new(File::create(&package_path).unwrap());
        let mut writer = PackageWriter::new(file).unwrap();
        for i in 0..1000 {
            let name = format!("small/entry_{i:04}.bin");
            let data = payload(i, i % 97);
            writer.write_file(&name, &data, i % 2 == 0).unwrap();
            expected.push((name, data));
        }
        for (i, len) in [64 * 1024, 512 * 1024, 1024 * 1024].into_iter().enumerate() {
            let name = format!("large/blob_{i}.bin");
            let data = payload(i, len);
            writer.write_file(&name, &data, i != 1).unwrap();
            expected.push((name, data));
        }
        writer.finish().unwrap();
    }

    let vfs = Vfs::default();
    vfs.mount_package(&package_path.to_string_lossy(), "/pkg/")
        .unwrap();

    assert_eq!(expected.len(), 1003);
    for (name, data) in &expected {
        let bytes = vfs.read_file(&format!("/pkg/{name}")).unwrap();
        assert_eq!(&bytes, data, "{name}");
    }
    assert!(vfs.open_handles().is_empty());

    assert_eq!(vfs.list_dir("/pkg/").unwrap(), vec!["large", "small"]);
    assert_eq!(vfs.list_dir("/pkg/small").unwrap().len(), 1000);

    // Packages are read-only.
    let err = vfs.write_file("/pkg/small/entry_0000.bin", b"x").unwrap_err();
    assert!(err.is_not_found() || matches!(err, FsError::Unsupported(_)));
}

#[test]
fn concurrent_readers_share_package_entries() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let package_path = dir.path().join("shared.rlpk");
    {
        let file = File::create(&package_path).unwrap();
        let mut writer = PackageWriter::new(file).unwrap();
        writer.write_file("stored.bin", &payload(1, 4096), false).unwrap();
        writer.write_file("packed.bin", &payload(2, 4096), true).unwrap();
        writer.finish().unwrap();
    }

    let vfs = Vfs::default();
    vfs.mount_package(&package_path.to_string_lossy(), "/pkg/")
        .unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let vfs = vfs.clone();
            scope.spawn(move || {
                let (path, seed) = if worker % 2 == 0 {
                    ("/pkg/stored.bin", 1)
                } else {
                    ("/pkg/packed.bin", 2)
                };
                for _ in 0..50 {
                    let handle = vfs.open(FileTypeId::BINARY_READER, path, false).unwrap();
                    let entry = vfs.get_file(handle).unwrap();
                    assert_eq!(entry.read_all().unwrap(), payload(seed, 4096));
                    vfs.close(handle).unwrap();
                }
            });
        }
    });

    assert!(vfs.open_handles().is_empty());
    assert_eq!(vfs.close_all(), 0);
}

#[test]
fn typed_binary_file_roundtrip() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::default();
    vfs.mount_physical(&dir_string(&dir), "/data/", 0).unwrap();

    let handle = vfs
        .open(FileTypeId::BINARY_WRITER, "/data/header.bin", true)
        .unwrap();
    let file = vfs.get_file(handle).unwrap();
    file.write_u32(0xCAFE_F00D).unwrap();
    file.write_i16(-3).unwrap();
    file.write_f32(2.5).unwrap();
    file.write_bool(false).unwrap();
    vfs.close(handle).unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("header.bin")).unwrap()[..4],
        [0xCA, 0xFE, 0xF0, 0x0D]
    );

    let handle = vfs
        .open(FileTypeId::BINARY_READER, "/data/header.bin", false)
        .unwrap();
    let file = vfs.get_file(handle).unwrap();
    assert_eq!(file.length().unwrap(), 11);
    assert_eq!(file.read_u32().unwrap(), 0xCAFE_F00D);
    assert_eq!(file.read_i16().unwrap(), -3);
    assert_eq!(file.read_f32().unwrap(), 2.5);
    assert!(!file.read_bool().unwrap());
    assert!(file.is_eof().unwrap());
    vfs.close(handle).unwrap();
}

#[test]
fn empty_package_mounts() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let package_path = dir.path().join("empty.rlpk");
    let file = File::create(&package_path).unwrap();
    PackageWriter::new(file).unwrap().finish().unwrap();

    let vfs = Vfs::default();
    vfs.mount_package(&package_path.to_string_lossy(), "/empty/")
        .unwrap();
    assert!(vfs.list_dir("/empty/").unwrap().is_empty());
    assert!(!vfs.file_exists("/empty/anything.bin"));
}

#[test]
fn bad_package_leaves_no_mount() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let package_path = dir.path().join("bogus.rlpk");
    std::fs::write(&package_path, [0u8; 64]).unwrap();

    let vfs = Vfs::default();
    let err = vfs
        .mount_package(&package_path.to_string_lossy(), "/bogus/")
        .unwrap_err();
    assert!(matches!(err, FsError::InvalidFormat(_)));
    assert!(vfs.mounts().is_empty());
}

#[test]
fn loose_files_override_package() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let package_path = dir.path().join("base.rlpk");
    {
        let file = File::create(&package_path).unwrap();
        let mut writer = PackageWriter::new(file).unwrap();
        writer.write_file("config.txt", b"packaged", true).unwrap();
        writer.write_file("only_packaged.txt", b"base", false).unwrap();
        writer.finish().unwrap();
    }
    let loose = dir.path().join("loose");
    std::fs::create_dir(&loose).unwrap();
    std::fs::write(loose.join("config.txt"), b"patched").unwrap();

    let vfs = Vfs::default();
    vfs.mount_package(&package_path.to_string_lossy(), "/game/")
        .unwrap();
    vfs.mount_physical(&loose.to_string_lossy(), "/game/patch/", 0)
        .unwrap();

    assert_eq!(vfs.read_file("/game/config.txt").unwrap(), b"packaged");
    assert_eq!(vfs.read_file("/game/patch/config.txt").unwrap(), b"patched");
    assert_eq!(vfs.read_file("/game/only_packaged.txt").unwrap(), b"base");
}

// ---------------------------------------------------------------------------
// Archives
// ---------------------------------------------------------------------------

#[test]
fn archive_roundtrip_through_router() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let vfs = Vfs::default();
    vfs.mount_physical(&dir_string(&dir), "/save/", 0).unwrap();

    let writer = BinaryArchiveWriter::new(Vec::new());
    writer.set_i8("i8", -8).unwrap();
    writer.set_i16("i16", -1600).unwrap();
    writer.set_i32("i32", i32::MIN).unwrap();
    writer.set_i64("i64", i64::MAX).unwrap();
    writer.set_u8("u8", 200).unwrap();
    writer.set_u16("u16", 65000).unwrap();
    writer.set_u32("u32", u32::MAX).unwrap();
    writer.set_u64("u64", 1 << 40).unwrap();
    writer.set_f32("f32", 1.5).unwrap();
    writer.set_f64("f64", -0.25).unwrap();
    writer.set_bool("flag", true).unwrap();
    writer.set_string("empty", "").unwrap();
    writer.set_string("name", "Lilium").unwrap();
    writer.begin_group("player").unwrap();
    writer.set_u32("level", 7).unwrap();
    writer.begin_group("inventory").unwrap();
    writer.end_group().unwrap();
    writer.begin_group("position").unwrap();
    writer.set_f32("x", 1.0).unwrap();
    writer.set_f32("y", 2.0).unwrap();
    writer.end_group().unwrap();
    writer.end_group().unwrap();
    vfs.save_archive("/save/slot1.sav", writer).unwrap();

    let reader = vfs.load_archive("/save/slot1.sav").unwrap();
    assert_eq!(reader.get_i8("i8", 0), -8);
    assert_eq!(reader.get_i16("i16", 0), -1600);
    assert_eq!(reader.get_i32("i32", 0), i32::MIN);
    assert_eq!(reader.get_i64("i64", 0), i64::MAX);
    assert_eq!(reader.get_u8("u8", 0), 200);
    assert_eq!(reader.get_u16("u16", 0), 65000);
    assert_eq!(reader.get_u32("u32", 0), u32::MAX);
    assert_eq!(reader.get_u64("u64", 0), 1 << 40);
    assert_eq!(reader.get_f32("f32", 0.0), 1.5);
    assert_eq!(reader.get_f64("f64", 0.0), -0.25);
    assert!(reader.get_bool("flag", false));
    assert_eq!(reader.get_string("empty", "default"), "");
    assert_eq!(reader.get_string("name", ""), "Lilium");
    assert_eq!(reader.get_u32("missing", 42), 42);

    reader.begin_group("player").unwrap();
    assert_eq!(reader.curr_key(), "player");
    assert_eq!(reader.get_u32("level", 0), 7);
    reader.begin_group("inventory").unwrap();
    assert!(!reader.has_next_item());
    reader.end_group().unwrap();
    reader.begin_group("position").unwrap();
    assert_eq!(reader.get_f32("x", 0.0), 1.0);
    assert_eq!(reader.get_f32("y", 0.0), 2.0);
    reader.end_group().unwrap();
    reader.end_group().unwrap();
    assert_eq!(reader.depth(), 0);
    reader.close();
}

#[test]
fn archive_items_iterate_in_order() {
    let writer = BinaryArchiveWriter::new(Vec::new());
    for i in 0..5u16 {
        writer.begin_group(&format!("item{i}")).unwrap();
        writer.set_u16("id", i).unwrap();
        writer.end_group().unwrap();
    }
    let reader = BinaryArchiveReader::from_bytes(&writer.close().unwrap()).unwrap();

    let mut ids = Vec::new();
    while reader.has_next_item() {
        reader.begin_group("").unwrap();
        ids.push(reader.get_u16("id", u16::MAX));
        reader.end_group().unwrap();
    }
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn truncated_archive_is_invalid_format() {
    let writer = BinaryArchiveWriter::new(Vec::new());
    writer.begin_group("g").unwrap();
    writer.set_u64("v", 9).unwrap();
    writer.end_group().unwrap();
    let bytes = writer.close().unwrap();

    let err = BinaryArchiveReader::from_bytes(&bytes[..bytes.len() - 4])
        .err()
        .unwrap();
    assert!(matches!(err, FsError::InvalidFormat(_)));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn config_file_builds_router() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    std::fs::create_dir(&assets).unwrap();
    std::fs::write(assets.join("hello.txt"), b"hello").unwrap();

    let package_path = dir.path().join("base.rlpk");
    {
        let file = File::create(&package_path).unwrap();
        let mut writer = PackageWriter::new(file).unwrap();
        writer.write_file("base.txt", b"base", true).unwrap();
        writer.finish().unwrap();
    }

    let config_path = dir.path().join("vfs.toml");
    std::fs::write(
        &config_path,
        format!(
            "[[mount]]\nalias = \"/assets/\"\npath = {:?}\n\n\
             [[mount]]\nalias = \"/base/\"\npath = {:?}\ntype = \"package\"\n",
            assets.to_string_lossy(),
            package_path.to_string_lossy()
        ),
    )
    .unwrap();

    let config: VfsConfig = load_config(&config_path).unwrap();
    assert_eq!(config.mount.len(), 2);
    assert_eq!(config.mount[1].r#type, MountKind::Package);

    let vfs = config.build().unwrap();
    assert_eq!(vfs.mounts().len(), 2);
    assert_eq!(vfs.read_file("/assets/hello.txt").unwrap(), b"hello");
    assert_eq!(vfs.read_file("/base/base.txt").unwrap(), b"base");
}
