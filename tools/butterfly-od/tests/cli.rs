use std::path::Path;
use std::process::Command;

fn butterfly_od() -> Command {
    Command::new(env!("CARGO_BIN_EXE_butterfly-od"))
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

#[test]
fn test_cli_help_works() {
    let output = butterfly_od().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("compact"));
    assert!(stdout.contains("query"));
}

#[test]
fn test_cli_version_works() {
    let output = butterfly_od().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_compact_inspect_query() {
    let dir = tempfile::tempdir().unwrap();
    let matrix = dir.path().join("od.csv");
    let points = dir.path().join("points.csv");
    let container = dir.path().join("od.odmx");
    write(&matrix, "from_id,to_id,travel_time\n1,2,300\n2,1,-1\n");
    write(&points, "id,x,y\n1,0,0\n2,0,1\n");

    let output = butterfly_od()
        .arg("compact")
        .arg("--matrix")
        .arg(&matrix)
        .arg("-o")
        .arg(&container)
        .args(["--sentinel", "-1"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 rows kept (1 unreachable"));
    assert!(container.exists());

    let output = butterfly_od().arg("inspect").arg(&container).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("All checksums valid"));

    let query = |from: &str, to: &str| {
        let output = butterfly_od()
            .arg("query")
            .arg("--container")
            .arg(&container)
            .arg("--points")
            .arg(&points)
            .args(["--from", from, "--to", to])
            .output()
            .unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    assert!(query("0,0", "0,1").contains("1 -> 2: 300s"));
    assert!(query("0,1", "0,0").contains("2 -> 1: not found"));
}

#[test]
fn test_cli_inspect_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let container = dir.path().join("bad.odmx");
    write(&container, &"x".repeat(200));
    let output = butterfly_od().arg("inspect").arg(&container).output().unwrap();
    assert!(!output.status.success());
}
