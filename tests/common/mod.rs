use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::fixture::ChildPath;
use assert_fs::prelude::*;

/// Command for the binary with its sensitive-locations file kept inside `temp_dir`.
pub fn mediaimport(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mediaimport").unwrap();
    cmd.arg("--sensitive-locations")
        .arg(temp_dir.child("sensitive.json").path());
    cmd
}

/// Lay out an import folder: originals at the top, exports under `Exported/`.
pub fn setup_import_folder(temp_dir: &TempDir, originals: &[&str], exported: &[&str]) -> ChildPath {
    let import = temp_dir.child("import");
    for name in originals {
        import.child(name).write_str(name).unwrap();
    }
    let exported_dir = import.child("Exported");
    exported_dir.create_dir_all().unwrap();
    for name in exported {
        exported_dir.child(name).write_str(name).unwrap();
    }
    import
}
